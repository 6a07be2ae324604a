//! Turns one line of operator input into a [`Command`].
//!
//! Tokens borrow from the input line and only live for one dispatch; the
//! resulting `Command` owns its arguments.

use crate::error::{ManagerError, Result};

const DELIMITERS: [char; 3] = [' ', '\t', '\n'];

/// Splits a line into at most `max_args` tokens separated by space, tab or newline.
///
/// Returns `Ok(None)` for a blank line ("no command").
pub fn tokenize(line: &str, max_args: usize) -> Result<Option<Vec<&str>>> {
    let tokens: Vec<&str> = line
        .split(|c: char| DELIMITERS.contains(&c) || c == '\r')
        .filter(|t| !t.is_empty())
        .collect();

    if tokens.is_empty() {
        return Ok(None);
    }
    if tokens.len() > max_args {
        return Err(ManagerError::parse(format!(
            "Too many arguments given! ({} > {})",
            tokens.len(),
            max_args
        )));
    }
    Ok(Some(tokens))
}

/// One operator command, validated for arity and argument types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    CreateServer { name: String, min: usize, max: usize },
    AbortServer { name: String },
    CreateProcess { name: String },
    AbortProcess { name: String },
    DisplayStatus,
    Shutdown,
}

impl Command {
    /// Builds a command from the tokens of a single line.
    pub fn from_tokens(tokens: &[&str]) -> Result<Self> {
        let (word, args) = match tokens.split_first() {
            Some(split) => split,
            None => return Err(ManagerError::parse("empty command")),
        };

        match (*word, args) {
            ("createServer", [name, min, max]) => Ok(Command::CreateServer {
                name: name.to_string(),
                min: parse_count("min", min)?,
                max: parse_count("max", max)?,
            }),
            ("abortServer", [name]) => Ok(Command::AbortServer {
                name: name.to_string(),
            }),
            ("createProcess", [name]) => Ok(Command::CreateProcess {
                name: name.to_string(),
            }),
            ("abortProcess", [name]) => Ok(Command::AbortProcess {
                name: name.to_string(),
            }),
            ("displayStatus", []) => Ok(Command::DisplayStatus),
            ("shutdown" | "exit", []) => Ok(Command::Shutdown),
            ("createServer", _) => Err(usage("createServer <name> <min> <max>")),
            ("abortServer" | "createProcess" | "abortProcess", _) => {
                Err(usage(&format!("{} <name>", word)))
            }
            ("displayStatus" | "shutdown" | "exit", _) => Err(usage(word)),
            (other, _) => Err(ManagerError::parse(format!("unknown command '{}'", other))),
        }
    }

    /// Parses a raw line. `Ok(None)` means the line held no command.
    pub fn parse_line(line: &str, max_args: usize) -> Result<Option<Self>> {
        match tokenize(line, max_args)? {
            Some(tokens) => Self::from_tokens(&tokens).map(Some),
            None => Ok(None),
        }
    }
}

fn parse_count(field: &str, raw: &str) -> Result<usize> {
    raw.parse::<usize>().map_err(|_| {
        ManagerError::parse(format!("{} must be a non-negative integer, got '{}'", field, raw))
    })
}

fn usage(form: &str) -> ManagerError {
    ManagerError::parse(format!("usage: {}", form))
}
