//! Spawns, signals and reaps worker processes, and records the outcome in the
//! [`Registry`].
//!
//! The supervisor keeps no table of its own. Process identity lives in the
//! registry; exits arrive on a channel fed by the runtime and are applied by
//! whoever owns the registry (the dispatcher loop), one at a time.

use crate::error::{ManagerError, Result};
use crate::registry::models::{GroupState, ProcessHandle};
use crate::registry::Registry;
use crate::runtime::{ExitEvent, LocalRuntime, ProcessRuntime};
use log::{debug, error, info, warn};
use std::sync::Arc;
use tokio::sync::mpsc;

/// What a reaped exit meant for the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExitReport {
    pub name: String,
    pub event: ExitEvent,
    /// The process had been asked to terminate.
    pub requested: bool,
    /// This was the group's last process; the group is gone from the registry.
    pub group_terminated: bool,
}

pub struct Supervisor<R: ProcessRuntime> {
    runtime: Arc<R>,
    exits: mpsc::UnboundedReceiver<ExitEvent>,
}

impl Supervisor<LocalRuntime> {
    /// A supervisor driving real local processes.
    pub fn local() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self::new(Arc::new(LocalRuntime::new(tx)), rx)
    }
}

impl<R: ProcessRuntime> Supervisor<R> {
    pub fn new(runtime: Arc<R>, exits: mpsc::UnboundedReceiver<ExitEvent>) -> Self {
        Self { runtime, exits }
    }

    /// Creates one worker process for group `name`.
    pub async fn spawn(&self, name: &str, argv: &[String]) -> Result<ProcessHandle> {
        match self.runtime.spawn(argv).await {
            Ok(handle) => {
                info!("Supervisor: [{}] started successfully (PID: {})", name, handle);
                Ok(handle)
            }
            Err(source) => {
                error!("Supervisor: Failed to spawn [{}]: {}", name, source);
                Err(ManagerError::Spawn {
                    name: name.to_string(),
                    source,
                })
            }
        }
    }

    /// Requests termination of one process. Does not wait for the exit.
    ///
    /// A process that is already gone is not an error: its exit is either
    /// queued or already applied.
    pub async fn signal_terminate(&self, handle: ProcessHandle) -> Result<()> {
        match self.runtime.signal_terminate(handle).await {
            Ok(()) => Ok(()),
            Err(e) if e.raw_os_error() == Some(libc::ESRCH) => {
                debug!("Supervisor: PID {} already exited", handle);
                Ok(())
            }
            Err(source) => {
                error!("Supervisor: Failed to signal PID {}: {}", handle, source);
                Err(ManagerError::Signal {
                    pid: handle.pid(),
                    source,
                })
            }
        }
    }

    /// Non-blocking: returns at most one exit that has not been applied yet.
    pub fn reap(&mut self) -> Option<ExitEvent> {
        self.exits.try_recv().ok()
    }

    /// Waits for the next exit.
    pub async fn next_exit(&mut self) -> Option<ExitEvent> {
        self.exits.recv().await
    }

    /// Applies an exit to the registry.
    ///
    /// The replica is detached from its group. When it was the last process of
    /// the group, the group moves to `Terminated` and is removed, freeing its name.
    /// Returns `None` for processes the registry does not know.
    pub fn record_exit(&self, registry: &mut Registry, event: ExitEvent) -> Option<ExitReport> {
        let name = match registry.owner_of(event.handle) {
            Some(group) => group.name().to_string(),
            None => {
                debug!("Supervisor: Ignoring exit of unknown PID {}", event.handle);
                return None;
            }
        };

        let replica = registry.release_replica(&name, event.handle)?;
        let requested = !replica.is_running();
        if requested {
            info!("Supervisor: [{}] PID {} exited: {}", name, event.handle, event);
        } else {
            warn!(
                "Supervisor: [{}] PID {} exited unexpectedly: {}",
                name, event.handle, event
            );
        }

        let group_terminated = match registry.lookup(&name) {
            Ok(group) => group.replicas().is_empty(),
            Err(_) => false,
        };
        if group_terminated {
            let was = registry.lookup(&name).map(|g| g.state()).ok();
            if was == Some(GroupState::Running) {
                warn!("Supervisor: [{}] lost its last process", name);
            }
            if let Err(e) = registry.mark_terminated(&name) {
                error!("Supervisor: Failed to terminate [{}]: {}", name, e);
            }
            registry.remove(&name);
            info!("Supervisor: [{}] terminated and removed", name);
        }

        Some(ExitReport {
            name,
            event,
            requested,
            group_terminated,
        })
    }

    /// Applies every exit already queued.
    pub fn reap_all(&mut self, registry: &mut Registry) -> Vec<ExitReport> {
        let mut reports = Vec::new();
        while let Some(event) = self.reap() {
            if let Some(report) = self.record_exit(registry, event) {
                reports.push(report);
            }
        }
        reports
    }
}
