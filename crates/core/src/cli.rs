//! Operator CLI command grammar (spec §6 "Operator CLI").
//!
//! The background line-reader and the mutex-protected command queue it
//! posts to are external-collaborator concerns (spec §1's "operator CLI" is
//! explicitly out of scope, spec §4's "auxiliary threads" section) -- this
//! module only owns the pure text-to-command mapping, so a host's line
//! reader can stay a thin I/O loop that hands each line straight to
//! [`OperatorCommand::parse`].

use crate::ids::PlayerId;

/// A successfully parsed operator command (spec §6: "help, status, players,
/// kick <id>, say <msg>, save, shutdown").
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperatorCommand {
    Help,
    Status,
    Players,
    Kick(PlayerId),
    Say(String),
    Save,
    Shutdown,
}

/// Why a line failed to parse into an [`OperatorCommand`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandParseError {
    /// The verb itself wasn't recognized (spec §6: "unknown command prints
    /// a reminder").
    UnknownCommand(String),
    /// `kick` with no id, or an id that doesn't parse as a `u8`.
    MissingOrInvalidPlayerId,
    /// `say` with no message text.
    MissingMessage,
}

impl std::fmt::Display for CommandParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CommandParseError::UnknownCommand(verb) => {
                write!(f, "unknown command '{verb}' -- type 'help' for a list of commands")
            }
            CommandParseError::MissingOrInvalidPlayerId => write!(f, "usage: kick <player-id>"),
            CommandParseError::MissingMessage => write!(f, "usage: say <message>"),
        }
    }
}

impl std::error::Error for CommandParseError {}

/// The fixed text a `help` command should print, kept here so the host
/// doesn't need to duplicate the command list.
pub const HELP_TEXT: &str = "commands: help, status, players, kick <id>, say <msg>, save, shutdown";

impl OperatorCommand {
    /// Parses one line of operator input. Case-insensitive on the verb
    /// (spec §6); leading/trailing whitespace is trimmed; an empty line is
    /// an unknown command the same as any other unrecognized verb.
    pub fn parse(line: &str) -> Result<OperatorCommand, CommandParseError> {
        let trimmed = line.trim();
        let (verb, rest) = match trimmed.split_once(char::is_whitespace) {
            Some((verb, rest)) => (verb, rest.trim()),
            None => (trimmed, ""),
        };

        match verb.to_ascii_lowercase().as_str() {
            "help" => Ok(OperatorCommand::Help),
            "status" => Ok(OperatorCommand::Status),
            "players" => Ok(OperatorCommand::Players),
            "save" => Ok(OperatorCommand::Save),
            "shutdown" => Ok(OperatorCommand::Shutdown),
            "kick" => rest
                .parse::<u8>()
                .map(|id| OperatorCommand::Kick(PlayerId(id)))
                .map_err(|_| CommandParseError::MissingOrInvalidPlayerId),
            "say" => {
                if rest.is_empty() {
                    Err(CommandParseError::MissingMessage)
                } else {
                    Ok(OperatorCommand::Say(rest.to_string()))
                }
            }
            _ => Err(CommandParseError::UnknownCommand(verb.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_case_insensitive_niladic_commands() {
        assert_eq!(OperatorCommand::parse("HELP"), Ok(OperatorCommand::Help));
        assert_eq!(OperatorCommand::parse("Status"), Ok(OperatorCommand::Status));
        assert_eq!(OperatorCommand::parse("players"), Ok(OperatorCommand::Players));
        assert_eq!(OperatorCommand::parse("SAVE"), Ok(OperatorCommand::Save));
        assert_eq!(OperatorCommand::parse("shutDOWN"), Ok(OperatorCommand::Shutdown));
    }

    #[test]
    fn parses_kick_with_a_player_id() {
        assert_eq!(OperatorCommand::parse("kick 2"), Ok(OperatorCommand::Kick(PlayerId(2))));
        assert_eq!(OperatorCommand::parse("KICK 3"), Ok(OperatorCommand::Kick(PlayerId(3))));
    }

    #[test]
    fn kick_without_a_valid_id_is_rejected() {
        assert_eq!(OperatorCommand::parse("kick"), Err(CommandParseError::MissingOrInvalidPlayerId));
        assert_eq!(OperatorCommand::parse("kick abc"), Err(CommandParseError::MissingOrInvalidPlayerId));
    }

    #[test]
    fn parses_say_with_its_message_verbatim() {
        assert_eq!(
            OperatorCommand::parse("say hello there, world"),
            Ok(OperatorCommand::Say("hello there, world".to_string()))
        );
    }

    #[test]
    fn say_without_a_message_is_rejected() {
        assert_eq!(OperatorCommand::parse("say"), Err(CommandParseError::MissingMessage));
        assert_eq!(OperatorCommand::parse("say   "), Err(CommandParseError::MissingMessage));
    }

    #[test]
    fn unknown_verb_is_rejected_with_its_own_text() {
        assert_eq!(
            OperatorCommand::parse("frobnicate"),
            Err(CommandParseError::UnknownCommand("frobnicate".to_string()))
        );
    }

    #[test]
    fn surrounding_whitespace_is_trimmed() {
        assert_eq!(OperatorCommand::parse("  status  "), Ok(OperatorCommand::Status));
    }
}
