//! Scriptable runtime for unit tests: no real processes, exits are injected by hand.

use super::traits::{ExitEvent, ProcessRuntime};
use crate::registry::models::ProcessHandle;
use crate::supervisor::Supervisor;
use async_trait::async_trait;
use std::collections::HashSet;
use std::io;
use std::os::unix::process::ExitStatusExt;
use std::process::ExitStatus;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

#[derive(Default)]
struct MockState {
    next_pid: u32,
    spawned: Vec<Vec<String>>,
    signalled: Vec<ProcessHandle>,
    live: HashSet<ProcessHandle>,
    fail_spawns: bool,
    fail_signals: bool,
}

pub struct MockRuntime {
    state: Mutex<MockState>,
    exits: mpsc::UnboundedSender<ExitEvent>,
}

impl MockRuntime {
    pub fn new(exits: mpsc::UnboundedSender<ExitEvent>) -> Self {
        Self {
            state: Mutex::new(MockState {
                next_pid: 1000,
                ..Default::default()
            }),
            exits,
        }
    }

    /// A supervisor wired to a fresh mock, plus a handle to drive the mock.
    pub fn supervisor() -> (Supervisor<MockRuntime>, Arc<MockRuntime>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let runtime = Arc::new(MockRuntime::new(tx));
        (Supervisor::new(runtime.clone(), rx), runtime)
    }

    pub fn fail_spawns(&self, fail: bool) {
        self.state.lock().unwrap().fail_spawns = fail;
    }

    /// Makes every signal fail as if the manager lacked permission.
    pub fn fail_signals(&self, fail: bool) {
        self.state.lock().unwrap().fail_signals = fail;
    }

    pub fn spawned(&self) -> Vec<Vec<String>> {
        self.state.lock().unwrap().spawned.clone()
    }

    pub fn signalled(&self) -> Vec<ProcessHandle> {
        self.state.lock().unwrap().signalled.clone()
    }

    /// Simulates the process exiting with `code`.
    pub fn exit(&self, handle: ProcessHandle, code: i32) {
        self.state.lock().unwrap().live.remove(&handle);
        let status = ExitStatus::from_raw(code << 8);
        self.exits.send(ExitEvent::new(handle, Some(status))).unwrap();
    }

    /// Lets every signalled process exit cleanly.
    pub fn exit_signalled(&self) {
        let pending: Vec<ProcessHandle> = {
            let state = self.state.lock().unwrap();
            state
                .signalled
                .iter()
                .filter(|h| state.live.contains(h))
                .copied()
                .collect()
        };
        for handle in pending {
            self.exit(handle, 0);
        }
    }
}

#[async_trait]
impl ProcessRuntime for MockRuntime {
    async fn spawn(&self, argv: &[String]) -> io::Result<ProcessHandle> {
        let mut state = self.state.lock().unwrap();
        if state.fail_spawns {
            return Err(io::Error::new(io::ErrorKind::NotFound, "no such file"));
        }
        state.next_pid += 1;
        let handle = ProcessHandle::new(state.next_pid);
        state.spawned.push(argv.to_vec());
        state.live.insert(handle);
        Ok(handle)
    }

    async fn signal_terminate(&self, handle: ProcessHandle) -> io::Result<()> {
        let mut state = self.state.lock().unwrap();
        if !state.live.contains(&handle) {
            return Err(io::Error::from_raw_os_error(libc::ESRCH));
        }
        if state.fail_signals {
            return Err(io::Error::from_raw_os_error(libc::EPERM));
        }
        state.signalled.push(handle);
        Ok(())
    }
}
