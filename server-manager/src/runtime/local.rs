use super::traits::{ExitEvent, ProcessRuntime};
use crate::registry::models::ProcessHandle;
use async_trait::async_trait;
use log::{debug, error, info};
use std::collections::HashMap;
use std::io;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot};

/// A request for the wait task to interrupt its child; the reply carries the `kill` result.
type SignalRequest = oneshot::Sender<io::Result<()>>;

/// Manages processes on the local machine using `tokio::process`.
///
/// Each child is owned by a small task that awaits its exit and forwards an
/// [`ExitEvent`]. Signals are delivered by that same task, so a pid is never
/// signalled after it has been reaped. Nothing here remembers which group a
/// process belongs to.
pub struct LocalRuntime {
    exits: mpsc::UnboundedSender<ExitEvent>,
    /// Map PID -> signal channel of its wait task. Entries leave when the child is reaped.
    signals: Arc<Mutex<HashMap<ProcessHandle, mpsc::UnboundedSender<SignalRequest>>>>,
}

impl LocalRuntime {
    pub fn new(exits: mpsc::UnboundedSender<ExitEvent>) -> Self {
        Self {
            exits,
            signals: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

fn already_exited() -> io::Error {
    io::Error::from_raw_os_error(libc::ESRCH)
}

/// Sends SIGINT to a child that has not been reaped yet.
fn interrupt(child: &Child) -> io::Result<()> {
    // `id()` is None once the child has been reaped.
    let pid = child.id().ok_or_else(already_exited)?;
    info!("Runtime: Sending SIGINT to PID {}", pid);
    let rc = unsafe { libc::kill(pid as libc::pid_t, libc::SIGINT) };
    if rc == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

#[async_trait]
impl ProcessRuntime for LocalRuntime {
    async fn spawn(&self, argv: &[String]) -> io::Result<ProcessHandle> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "empty argv"))?;

        info!("Runtime: Spawning {} {:?}", program, args);

        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::null()) // The operator console belongs to the manager
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(false);

        // Keep workers out of the terminal's process group so Ctrl-C reaches only the manager.
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd.spawn()?;
        let pid = child
            .id()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "child exited before start"))?;
        let handle = ProcessHandle::new(pid);

        let (signal_tx, mut signal_rx) = mpsc::unbounded_channel::<SignalRequest>();
        self.signals.lock().unwrap().insert(handle, signal_tx);

        let exits = self.exits.clone();
        let signals = self.signals.clone();
        tokio::spawn(async move {
            let status = loop {
                tokio::select! {
                    status = child.wait() => break status,
                    Some(reply) = signal_rx.recv() => {
                        let _ = reply.send(interrupt(&child));
                    }
                }
            };
            signals.lock().unwrap().remove(&handle);

            let status = match status {
                Ok(status) => Some(status),
                Err(e) => {
                    error!("Runtime: Wait error for PID {}: {}", pid, e);
                    None
                }
            };
            debug!("Runtime: PID {} reaped", pid);
            // The receiver only goes away when the manager is shutting down.
            let _ = exits.send(ExitEvent::new(handle, status));
        });

        Ok(handle)
    }

    async fn signal_terminate(&self, handle: ProcessHandle) -> io::Result<()> {
        let sender = self.signals.lock().unwrap().get(&handle).cloned();
        let sender = sender.ok_or_else(already_exited)?;

        let (reply_tx, reply_rx) = oneshot::channel();
        if sender.send(reply_tx).is_err() {
            return Err(already_exited());
        }
        // A dropped reply means the wait task reaped the child first.
        reply_rx.await.unwrap_or_else(|_| Err(already_exited()))
    }
}
