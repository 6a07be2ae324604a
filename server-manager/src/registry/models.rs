use std::fmt;

/// Opaque identity of a spawned worker process (its OS pid).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProcessHandle(u32);

impl ProcessHandle {
    pub fn new(pid: u32) -> Self {
        Self(pid)
    }

    pub fn pid(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for ProcessHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle of a server group: `Pending -> Running -> Terminating -> Terminated`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupState {
    Pending,
    Running,
    Terminating,
    Terminated,
}

impl fmt::Display for GroupState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            GroupState::Pending => "Pending",
            GroupState::Running => "Running",
            GroupState::Terminating => "Terminating",
            GroupState::Terminated => "Terminated",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplicaState {
    Running,
    /// Termination was requested; waiting for the exit to be reaped.
    Terminating,
}

/// One worker process belonging to a group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Replica {
    handle: ProcessHandle,
    state: ReplicaState,
}

impl Replica {
    pub fn new(handle: ProcessHandle) -> Self {
        Self {
            handle,
            state: ReplicaState::Running,
        }
    }

    pub fn handle(&self) -> ProcessHandle {
        self.handle
    }

    pub fn state(&self) -> ReplicaState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == ReplicaState::Running
    }

    pub(crate) fn mark_terminating(&mut self) {
        self.state = ReplicaState::Terminating;
    }
}

/// A named pool of worker processes sharing one replica policy.
///
/// Only the [`Registry`](super::Registry) mutates these.
#[derive(Debug, Clone)]
pub struct ServerGroup {
    name: String,
    min_replicas: usize,
    max_replicas: usize,
    state: GroupState,
    replicas: Vec<Replica>,
}

impl ServerGroup {
    pub(crate) fn new(name: String, min_replicas: usize, max_replicas: usize) -> Self {
        Self {
            name,
            min_replicas,
            max_replicas,
            state: GroupState::Pending,
            replicas: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn min_replicas(&self) -> usize {
        self.min_replicas
    }

    pub fn max_replicas(&self) -> usize {
        self.max_replicas
    }

    pub fn state(&self) -> GroupState {
        self.state
    }

    /// Handle of the group's first live process. Present only while Running or Terminating.
    pub fn process_handle(&self) -> Option<ProcessHandle> {
        match self.state {
            GroupState::Running | GroupState::Terminating => {
                self.replicas.first().map(Replica::handle)
            }
            GroupState::Pending | GroupState::Terminated => None,
        }
    }

    /// Replicas that have not been asked to terminate.
    pub fn active_count(&self) -> usize {
        self.replicas.iter().filter(|r| r.is_running()).count()
    }

    pub fn replicas(&self) -> &[Replica] {
        &self.replicas
    }

    pub fn owns(&self, handle: ProcessHandle) -> bool {
        self.replicas.iter().any(|r| r.handle == handle)
    }

    pub(crate) fn set_state(&mut self, state: GroupState) {
        self.state = state;
    }

    pub(crate) fn replicas_mut(&mut self) -> &mut Vec<Replica> {
        &mut self.replicas
    }
}
