//! Core identifiers and scalar types shared across every subsystem.

use bitcode::{Decode, Encode};
use serde::{Deserialize, Serialize};

/// Monotonically allocated entity handle. `0` is reserved as the invalid id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Encode, Decode)]
pub struct EntityId(u32);

impl EntityId {
    pub const INVALID: EntityId = EntityId(0);

    #[inline]
    pub fn is_valid(self) -> bool {
        self.0 != 0
    }

    #[inline]
    pub fn raw(self) -> u32 {
        self.0
    }

    /// Construct from a raw value without validation. Used by deserializers
    /// that already trust the source bytes.
    #[inline]
    pub fn from_raw(raw: u32) -> Self {
        EntityId(raw)
    }
}

impl Default for EntityId {
    fn default() -> Self {
        EntityId::INVALID
    }
}

/// Allocates ids starting at 1; 0 is never handed out.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct EntityIdAllocator {
    next: u32,
}

impl EntityIdAllocator {
    pub fn new() -> Self {
        Self { next: 1 }
    }

    pub fn alloc(&mut self) -> EntityId {
        if self.next == 0 {
            self.next = 1;
        }
        let id = EntityId(self.next);
        self.next = self.next.wrapping_add(1);
        id
    }

    /// Advances the allocator so the next [`Self::alloc`] never reissues
    /// `id` or anything below it. Used when restoring entities from a
    /// snapshot with their original ids instead of allocating fresh ones.
    pub fn ensure_next_after(&mut self, id: EntityId) {
        let candidate = id.raw().wrapping_add(1);
        if candidate > self.next {
            self.next = candidate;
        }
    }
}

/// `0` = neutral/world, `1..=MAX_PLAYERS` are overseer slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default, Encode, Decode)]
pub struct PlayerId(pub u8);

impl PlayerId {
    pub const WORLD: PlayerId = PlayerId(0);
    pub const MAX_PLAYERS: u8 = 4;

    pub fn is_world(self) -> bool {
        self.0 == 0
    }
}

/// 64-bit monotonic tick counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default, Encode, Decode)]
pub struct Tick(pub u64);

impl Tick {
    pub const ZERO: Tick = Tick(0);

    pub fn next(self) -> Tick {
        Tick(self.0 + 1)
    }

    pub fn saturating_sub(self, rhs: Tick) -> u64 {
        self.0.saturating_sub(rhs.0)
    }
}

impl std::ops::Add<u64> for Tick {
    type Output = Tick;
    fn add(self, rhs: u64) -> Tick {
        Tick(self.0 + rhs)
    }
}

pub type Credits = i64;

/// Signed grid coordinate, the public API surface for tile addressing.
pub type Coord = i32;
