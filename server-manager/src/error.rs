use crate::registry::models::GroupState;
use thiserror::Error;

/// Global error type for the server manager.
///
/// Every variant except `StreamClosed` is recoverable: the dispatcher reports it
/// to the operator and keeps the registry untouched. `Signal` never reaches the
/// operator as an error since the registry has already changed by then.
#[derive(Error, Debug)]
pub enum ManagerError {
    /// Malformed or oversized command line.
    #[error("Could not parse the command: {0}")]
    Parse(String),

    /// No server group is registered under this name.
    #[error("no server found under name {0}")]
    NotFound(String),

    /// A live server group already uses this name.
    #[error("a server named {0} already exists")]
    DuplicateName(String),

    /// Replica floor or ceiling would be breached.
    #[error("policy violation for {name}: {reason}")]
    PolicyViolation { name: String, reason: String },

    /// The group exists but is not in a state that accepts the command.
    #[error("server {name} is {state}, expected {expected}")]
    InvalidState {
        name: String,
        state: GroupState,
        expected: GroupState,
    },

    /// Process creation failed.
    #[error("Could not start server {name}: {source}")]
    Spawn {
        name: String,
        source: std::io::Error,
    },

    /// Signal delivery failed for a reason other than "already gone".
    #[error("Failed to signal process {pid}: {source}")]
    Signal { pid: u32, source: std::io::Error },

    /// End of operator input.
    #[error("There was an error reading user input: stream closed")]
    StreamClosed,
}

impl ManagerError {
    pub fn policy(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::PolicyViolation {
            name: name.into(),
            reason: reason.into(),
        }
    }

    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }
}

/// A specialized Result type for manager operations.
pub type Result<T> = std::result::Result<T, ManagerError>;
