//! Command parsing.
//!
//! A line is split on whitespace; the first token is looked up
//! case-insensitively in a fixed verb table and the rest are the arguments.

use crate::model::Difficulty;
use std::fmt;
use thiserror::Error;

/// Validation errors. Shown to the player as-is; the session is not touched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("Unknown command: {0}. Type 'help' for a list of commands.")]
    UnknownCommand(String),

    #[error("No active case. Type 'new_case' to start one.")]
    NoActiveCase,

    #[error("This case is closed. Type 'new_case' for another, or 'clear_case' to put it away.")]
    CaseClosed,

    #[error("Invalid suspect number: {0}. Type 'list_suspects' to see the roster.")]
    InvalidSuspectIndex(String),

    #[error("Missing argument. Usage: {0}")]
    MissingArgument(&'static str),

    #[error("A value is required. Usage: config {0} <value>")]
    EmptyConfigValue(ConfigItem),

    #[error("Unknown config item: {0}. Use url, key or model.")]
    UnknownConfigItem(String),

    #[error("Unknown difficulty: {0}. Use easy, normal or hard.")]
    InvalidDifficulty(String),
}

/// An editable generation setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigItem {
    Url,
    Key,
    Model,
}

impl fmt::Display for ConfigItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ConfigItem::Url => "url",
            ConfigItem::Key => "key",
            ConfigItem::Model => "model",
        })
    }
}

/// A parsed command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    NewCase,
    Status,
    ListSuspects,
    Evidence,
    /// 1-based suspect number.
    Interrogate(usize),
    Recreate,
    /// 1-based suspect number.
    Submit(usize),
    Difficulty(Option<Difficulty>),
    Config(Option<(ConfigItem, String)>),
    Records,
    Achievements,
    Stats,
    ResetProgress { confirmed: bool },
    ClearCase,
    Export(Option<String>),
    Help,
    Clear,
    Exit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verb {
    NewCase,
    Status,
    ListSuspects,
    Evidence,
    Interrogate,
    Recreate,
    Submit,
    Difficulty,
    Config,
    Records,
    Achievements,
    Stats,
    ResetProgress,
    ClearCase,
    Export,
    Help,
    Clear,
    Exit,
}

const VERBS: &[(&str, Verb)] = &[
    ("new_case", Verb::NewCase),
    ("status", Verb::Status),
    ("list_suspects", Verb::ListSuspects),
    ("evidence", Verb::Evidence),
    ("interrogate", Verb::Interrogate),
    ("recreate", Verb::Recreate),
    ("submit", Verb::Submit),
    ("difficulty", Verb::Difficulty),
    ("config", Verb::Config),
    ("records", Verb::Records),
    ("achievements", Verb::Achievements),
    ("stats", Verb::Stats),
    ("reset_progress", Verb::ResetProgress),
    ("clear_case", Verb::ClearCase),
    ("export", Verb::Export),
    ("help", Verb::Help),
    ("clear", Verb::Clear),
    ("exit", Verb::Exit),
    ("quit", Verb::Exit),
];

impl Command {
    /// Parse a line. Returns `Ok(None)` for a blank line.
    pub fn parse(line: &str) -> Result<Option<Command>, CommandError> {
        let mut tokens = line.split_whitespace();
        let Some(first) = tokens.next() else {
            return Ok(None);
        };
        let args: Vec<&str> = tokens.collect();

        let lowered = first.to_lowercase();
        let verb = VERBS
            .iter()
            .find(|(name, _)| *name == lowered)
            .map(|(_, verb)| *verb)
            .ok_or_else(|| CommandError::UnknownCommand(first.to_string()))?;

        let command = match verb {
            Verb::NewCase => Command::NewCase,
            Verb::Status => Command::Status,
            Verb::ListSuspects => Command::ListSuspects,
            Verb::Evidence => Command::Evidence,
            Verb::Interrogate => {
                Command::Interrogate(suspect_number(&args, "interrogate <suspect number>")?)
            }
            Verb::Recreate => Command::Recreate,
            Verb::Submit => Command::Submit(suspect_number(&args, "submit <suspect number>")?),
            Verb::Difficulty => match args.first() {
                None => Command::Difficulty(None),
                Some(level) => Command::Difficulty(Some(
                    level
                        .parse()
                        .map_err(|_| CommandError::InvalidDifficulty(level.to_string()))?,
                )),
            },
            Verb::Config => parse_config(&args)?,
            Verb::Records => Command::Records,
            Verb::Achievements => Command::Achievements,
            Verb::Stats => Command::Stats,
            Verb::ResetProgress => Command::ResetProgress {
                confirmed: args
                    .first()
                    .is_some_and(|arg| arg.eq_ignore_ascii_case("confirm")),
            },
            Verb::ClearCase => Command::ClearCase,
            Verb::Export => Command::Export((!args.is_empty()).then(|| args.join(" "))),
            Verb::Help => Command::Help,
            Verb::Clear => Command::Clear,
            Verb::Exit => Command::Exit,
        };

        Ok(Some(command))
    }
}

fn suspect_number(args: &[&str], usage: &'static str) -> Result<usize, CommandError> {
    let arg = args.first().ok_or(CommandError::MissingArgument(usage))?;
    match arg.parse::<usize>() {
        Ok(n) if n >= 1 => Ok(n),
        _ => Err(CommandError::InvalidSuspectIndex(arg.to_string())),
    }
}

fn parse_config(args: &[&str]) -> Result<Command, CommandError> {
    let Some(item) = args.first() else {
        return Ok(Command::Config(None));
    };

    let item = match item.to_lowercase().as_str() {
        "url" => ConfigItem::Url,
        "key" => ConfigItem::Key,
        "model" => ConfigItem::Model,
        _ => return Err(CommandError::UnknownConfigItem(item.to_string())),
    };

    let value = args[1..].join(" ");
    if value.trim().is_empty() {
        return Err(CommandError::EmptyConfigValue(item));
    }

    Ok(Command::Config(Some((item, value))))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_line() {
        assert_eq!(Command::parse("   "), Ok(None));
    }

    #[test]
    fn test_verbs_are_case_insensitive() {
        assert_eq!(Command::parse("NEW_CASE"), Ok(Some(Command::NewCase)));
        assert_eq!(
            Command::parse("Interrogate 2"),
            Ok(Some(Command::Interrogate(2)))
        );
    }

    #[test]
    fn test_unknown_verb() {
        assert_eq!(
            Command::parse("dance now"),
            Err(CommandError::UnknownCommand("dance".to_string()))
        );
    }

    #[test]
    fn test_suspect_number_validation() {
        assert_eq!(
            Command::parse("submit"),
            Err(CommandError::MissingArgument("submit <suspect number>"))
        );
        assert_eq!(
            Command::parse("submit 0"),
            Err(CommandError::InvalidSuspectIndex("0".to_string()))
        );
        assert_eq!(
            Command::parse("interrogate two"),
            Err(CommandError::InvalidSuspectIndex("two".to_string()))
        );
    }

    #[test]
    fn test_config_read_and_write() {
        assert_eq!(Command::parse("config"), Ok(Some(Command::Config(None))));
        assert_eq!(
            Command::parse("config model gpt-4o"),
            Ok(Some(Command::Config(Some((
                ConfigItem::Model,
                "gpt-4o".to_string()
            )))))
        );
        assert_eq!(
            Command::parse("config key"),
            Err(CommandError::EmptyConfigValue(ConfigItem::Key))
        );
        assert_eq!(
            Command::parse("config proxy http://x"),
            Err(CommandError::UnknownConfigItem("proxy".to_string()))
        );
    }

    #[test]
    fn test_difficulty() {
        assert_eq!(
            Command::parse("difficulty"),
            Ok(Some(Command::Difficulty(None)))
        );
        assert_eq!(
            Command::parse("difficulty Hard"),
            Ok(Some(Command::Difficulty(Some(Difficulty::Hard))))
        );
        assert_eq!(
            Command::parse("difficulty nightmare"),
            Err(CommandError::InvalidDifficulty("nightmare".to_string()))
        );
    }

    #[test]
    fn test_reset_needs_literal_confirm() {
        assert_eq!(
            Command::parse("reset_progress"),
            Ok(Some(Command::ResetProgress { confirmed: false }))
        );
        assert_eq!(
            Command::parse("reset_progress yes"),
            Ok(Some(Command::ResetProgress { confirmed: false }))
        );
        assert_eq!(
            Command::parse("reset_progress confirm"),
            Ok(Some(Command::ResetProgress { confirmed: true }))
        );
    }

    #[test]
    fn test_export_path() {
        assert_eq!(Command::parse("export"), Ok(Some(Command::Export(None))));
        assert_eq!(
            Command::parse("export case.md"),
            Ok(Some(Command::Export(Some("case.md".to_string()))))
        );
    }
}
