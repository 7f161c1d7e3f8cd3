//! Structured result values for operations that can be rejected.
//!
//! Per spec §7, validation errors and state-machine rejections never cross a
//! subsystem boundary as panics or exceptions -- they are returned directly
//! from the mutating call that attempted them. This module only carries the
//! *kinds*; callers match on them to decide UI feedback.

use std::fmt;

/// Rejection reason for a placement/spawn-style operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    OutOfBounds,
    FootprintOccupied,
    UnknownTemplate,
    UnknownEntity,
    InsufficientCredits,
    LandValueTooLow,
    NoRoadAccess,
    ServiceUnavailable(&'static str),
    NotOwned,
    AlreadyPlaced,
    NoAdjacentRail,
    NoWaterSource,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::OutOfBounds => write!(f, "coordinates out of bounds"),
            ValidationError::FootprintOccupied => write!(f, "footprint is occupied"),
            ValidationError::UnknownTemplate => write!(f, "unknown template id"),
            ValidationError::UnknownEntity => write!(f, "unknown entity id"),
            ValidationError::InsufficientCredits => write!(f, "insufficient credits"),
            ValidationError::LandValueTooLow => write!(f, "land value below template minimum"),
            ValidationError::NoRoadAccess => write!(f, "no road access within range"),
            ValidationError::ServiceUnavailable(service) => {
                write!(f, "{service} unavailable at this location")
            }
            ValidationError::NotOwned => write!(f, "entity not owned by caller"),
            ValidationError::AlreadyPlaced => write!(f, "something already occupies this tile"),
            ValidationError::NoAdjacentRail => write!(f, "no adjacent rail segment"),
            ValidationError::NoWaterSource => write!(f, "no water source within extraction range"),
        }
    }
}

impl std::error::Error for ValidationError {}

/// Rejection reason for demolition, specifically (spec §4.10).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DemolishError {
    EntityNotFound,
    NotOwned,
    AlreadyDeconstructed,
    InsufficientCredits,
}

impl fmt::Display for DemolishError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DemolishError::EntityNotFound => write!(f, "entity not found"),
            DemolishError::NotOwned => write!(f, "entity not owned by caller"),
            DemolishError::AlreadyDeconstructed => write!(f, "building already deconstructed"),
            DemolishError::InsufficientCredits => write!(f, "insufficient credits"),
        }
    }
}

impl std::error::Error for DemolishError {}

/// Rejection reason for a terrain modification request (spec §4.10).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerrainModError {
    OutOfBounds,
    NotTerraformable,
    AlreadyTarget,
    OperationInProgress,
    NotAuthorized,
    InsufficientCredits,
}

impl fmt::Display for TerrainModError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TerrainModError::OutOfBounds => write!(f, "coordinates out of bounds"),
            TerrainModError::NotTerraformable => write!(f, "tile is not terraformable"),
            TerrainModError::AlreadyTarget => write!(f, "tile is already the target type"),
            TerrainModError::OperationInProgress => {
                write!(f, "an operation is already running on this tile")
            }
            TerrainModError::NotAuthorized => write!(f, "caller is not authorized"),
            TerrainModError::InsufficientCredits => write!(f, "insufficient credits"),
        }
    }
}

impl std::error::Error for TerrainModError {}
