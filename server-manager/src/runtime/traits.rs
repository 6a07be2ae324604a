use crate::registry::models::ProcessHandle;
use async_trait::async_trait;
use std::fmt;
use std::process::ExitStatus;

/// Notification that a spawned worker has exited and been reaped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExitEvent {
    pub handle: ProcessHandle,
    /// `None` when waiting on the child failed; the process is treated as gone.
    pub status: Option<ExitStatus>,
}

impl ExitEvent {
    pub fn new(handle: ProcessHandle, status: Option<ExitStatus>) -> Self {
        Self { handle, status }
    }
}

impl fmt::Display for ExitEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.status {
            Some(status) => write!(f, "{}", status),
            None => f.write_str("unknown status"),
        }
    }
}

/// The abstraction for "The Hands": process creation and signal delivery.
///
/// Implementations report every exit of a process they spawned exactly once,
/// through the channel handed to them at construction.
#[async_trait]
pub trait ProcessRuntime: Send + Sync {
    /// Starts `argv[0]` with the remaining elements as arguments.
    /// Returns as soon as the child exists; does not wait for it.
    async fn spawn(&self, argv: &[String]) -> std::io::Result<ProcessHandle>;

    /// Asks the process to shut down with an interrupt-style signal.
    /// Fire-and-forget: the exit shows up later as an [`ExitEvent`].
    async fn signal_terminate(&self, handle: ProcessHandle) -> std::io::Result<()>;
}
