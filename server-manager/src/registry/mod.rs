//! In-Memory table of every server group the manager knows about.
//!
//! This struct is PURE data. It does not spawn or signal anything; the
//! [`Supervisor`](crate::supervisor::Supervisor) does, then records the outcome here.
//! It has a single owner (the dispatcher loop), so no mutation is ever observed half-done.

pub mod models;

use crate::error::{ManagerError, Result};
use log::debug;
use models::{GroupState, ProcessHandle, Replica, ServerGroup};
use std::collections::BTreeMap;

/// Name-keyed table of server groups.
#[derive(Debug, Clone)]
pub struct Registry {
    /// Maps group name -> entry. Ordered so status listings are stable.
    groups: BTreeMap<String, ServerGroup>,
    /// Minimum replica count any group may be configured with.
    floor: usize,
}

impl Registry {
    pub fn new(floor: usize) -> Self {
        Self {
            groups: BTreeMap::new(),
            floor,
        }
    }

    pub fn floor(&self) -> usize {
        self.floor
    }

    /// Registers a new `Pending` group.
    ///
    /// `min_replicas` below the floor is raised to the floor. Fails if a live
    /// group already uses `name`, or if `max_replicas` ends up below the minimum.
    pub fn insert(
        &mut self,
        name: &str,
        min_replicas: usize,
        max_replicas: usize,
    ) -> Result<&ServerGroup> {
        if let Some(existing) = self.groups.get(name) {
            if existing.state() != GroupState::Terminated {
                return Err(ManagerError::DuplicateName(name.to_string()));
            }
        }

        let min = min_replicas.max(self.floor);
        if max_replicas < min {
            return Err(ManagerError::policy(
                name,
                format!("max replicas {} is below min replicas {}", max_replicas, min),
            ));
        }

        debug!("Registry: insert '{}' (min {}, max {})", name, min, max_replicas);
        self.groups.insert(
            name.to_string(),
            ServerGroup::new(name.to_string(), min, max_replicas),
        );
        self.lookup(name)
    }

    pub fn lookup(&self, name: &str) -> Result<&ServerGroup> {
        self.groups
            .get(name)
            .ok_or_else(|| ManagerError::NotFound(name.to_string()))
    }

    fn lookup_mut(&mut self, name: &str) -> Result<&mut ServerGroup> {
        self.groups
            .get_mut(name)
            .ok_or_else(|| ManagerError::NotFound(name.to_string()))
    }

    /// Removes a `Terminated` group. Absent names are a no-op and groups in
    /// any other state are left in place.
    pub fn remove(&mut self, name: &str) -> Option<ServerGroup> {
        match self.groups.get(name) {
            Some(group) if group.state() == GroupState::Terminated => self.groups.remove(name),
            _ => None,
        }
    }

    /// Drops a group that never got a process (spawn failed).
    pub fn discard_pending(&mut self, name: &str) -> Option<ServerGroup> {
        match self.groups.get(name) {
            Some(group) if group.state() == GroupState::Pending => self.groups.remove(name),
            _ => None,
        }
    }

    /// Records the first process of a group: `Pending -> Running`.
    pub fn attach_process(&mut self, name: &str, handle: ProcessHandle) -> Result<()> {
        let group = self.lookup_mut(name)?;
        expect_state(group, GroupState::Pending)?;
        group.replicas_mut().push(Replica::new(handle));
        group.set_state(GroupState::Running);
        Ok(())
    }

    /// Checks that one more replica fits under the ceiling.
    pub fn check_scale_up(&self, name: &str) -> Result<&ServerGroup> {
        let group = self.lookup(name)?;
        expect_state(group, GroupState::Running)?;
        if group.active_count() >= group.max_replicas() {
            return Err(ManagerError::policy(
                name,
                format!("already at max replicas ({})", group.max_replicas()),
            ));
        }
        Ok(group)
    }

    /// Adds a freshly spawned replica to a running group. Returns the new active count.
    pub fn add_replica(&mut self, name: &str, handle: ProcessHandle) -> Result<usize> {
        self.check_scale_up(name)?;
        let group = self.lookup_mut(name)?;
        group.replicas_mut().push(Replica::new(handle));
        Ok(group.active_count())
    }

    /// Marks the newest running replica as terminating and returns its handle.
    ///
    /// Refuses to go below the group's floor.
    pub fn retire_replica(&mut self, name: &str) -> Result<ProcessHandle> {
        let group = self.lookup_mut(name)?;
        expect_state(group, GroupState::Running)?;
        if group.active_count() <= group.min_replicas() {
            return Err(ManagerError::policy(
                name,
                format!(
                    "active replicas ({}) already at min replicas ({})",
                    group.active_count(),
                    group.min_replicas()
                ),
            ));
        }

        let replica = group
            .replicas_mut()
            .iter_mut()
            .rev()
            .find(|r| r.is_running())
            .ok_or_else(|| ManagerError::policy(name, "no running replica to retire"))?;
        replica.mark_terminating();
        Ok(replica.handle())
    }

    /// `Running -> Terminating`. Returns the handles that still need a signal.
    ///
    /// Calling it on a group that is already terminating is a no-op and returns
    /// no handles.
    pub fn mark_terminating(&mut self, name: &str) -> Result<Vec<ProcessHandle>> {
        let group = self.lookup_mut(name)?;
        match group.state() {
            GroupState::Terminating => Ok(Vec::new()),
            GroupState::Running => {
                group.set_state(GroupState::Terminating);
                let handles = group
                    .replicas_mut()
                    .iter_mut()
                    .filter(|r| r.is_running())
                    .map(|r| {
                        r.mark_terminating();
                        r.handle()
                    })
                    .collect();
                Ok(handles)
            }
            state => Err(ManagerError::InvalidState {
                name: name.to_string(),
                state,
                expected: GroupState::Running,
            }),
        }
    }

    /// Final transition, only driven by the supervisor's reap path.
    pub(crate) fn mark_terminated(&mut self, name: &str) -> Result<()> {
        let group = self.lookup_mut(name)?;
        group.replicas_mut().clear();
        group.set_state(GroupState::Terminated);
        Ok(())
    }

    /// Finds the group that owns `handle`.
    pub fn owner_of(&self, handle: ProcessHandle) -> Option<&ServerGroup> {
        self.groups.values().find(|g| g.owns(handle))
    }

    /// Detaches an exited replica from its group.
    pub(crate) fn release_replica(&mut self, name: &str, handle: ProcessHandle) -> Option<Replica> {
        let group = self.groups.get_mut(name)?;
        let index = group.replicas().iter().position(|r| r.handle() == handle)?;
        Some(group.replicas_mut().remove(index))
    }

    /// Groups that still have live processes to stop.
    pub fn live_names(&self) -> Vec<String> {
        self.groups
            .values()
            .filter(|g| g.state() == GroupState::Running)
            .map(|g| g.name().to_string())
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ServerGroup> {
        self.groups.values()
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Number of processes, running or terminating, across all groups.
    pub fn process_count(&self) -> usize {
        self.groups.values().map(|g| g.replicas().len()).sum()
    }
}

fn expect_state(group: &ServerGroup, expected: GroupState) -> Result<()> {
    if group.state() != expected {
        return Err(ManagerError::InvalidState {
            name: group.name().to_string(),
            state: group.state(),
            expected,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn running(registry: &mut Registry, name: &str, min: usize, max: usize, pid: u32) {
        registry.insert(name, min, max).unwrap();
        registry.attach_process(name, ProcessHandle::new(pid)).unwrap();
    }

    #[test]
    fn test_insert_clamps_min_to_floor() {
        let mut registry = Registry::new(2);
        let group = registry.insert("webA", 1, 4).unwrap();
        assert_eq!(group.min_replicas(), 2);
        assert_eq!(group.max_replicas(), 4);
        assert_eq!(group.state(), GroupState::Pending);
        assert_eq!(group.process_handle(), None);

        let group = registry.insert("webB", 3, 4).unwrap();
        assert_eq!(group.min_replicas(), 3);
    }

    #[test]
    fn test_insert_rejects_max_below_min() {
        let mut registry = Registry::new(2);
        let err = registry.insert("webA", 1, 1).unwrap_err();
        assert!(matches!(err, ManagerError::PolicyViolation { .. }));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_duplicate_name_rejected_while_live() {
        let mut registry = Registry::new(2);
        running(&mut registry, "webA", 2, 4, 100);
        let err = registry.insert("webA", 2, 4).unwrap_err();
        assert!(matches!(err, ManagerError::DuplicateName(_)));

        registry.mark_terminating("webA").unwrap();
        let err = registry.insert("webA", 2, 4).unwrap_err();
        assert!(matches!(err, ManagerError::DuplicateName(_)));
    }

    #[test]
    fn test_name_reusable_after_removal() {
        let mut registry = Registry::new(2);
        running(&mut registry, "webA", 2, 4, 100);
        registry.mark_terminating("webA").unwrap();

        // Not terminated yet, so remove leaves it alone
        assert!(registry.remove("webA").is_none());

        registry.mark_terminated("webA").unwrap();
        assert!(registry.remove("webA").is_some());
        assert!(registry.remove("webA").is_none());
        assert!(registry.insert("webA", 2, 4).is_ok());
    }

    #[test]
    fn test_attach_process_only_once() {
        let mut registry = Registry::new(2);
        running(&mut registry, "webA", 2, 4, 100);
        let group = registry.lookup("webA").unwrap();
        assert_eq!(group.state(), GroupState::Running);
        assert_eq!(group.process_handle(), Some(ProcessHandle::new(100)));
        assert_eq!(group.active_count(), 1);

        let err = registry
            .attach_process("webA", ProcessHandle::new(101))
            .unwrap_err();
        assert!(matches!(err, ManagerError::InvalidState { .. }));
    }

    #[test]
    fn test_lookup_unknown_name() {
        let registry = Registry::new(2);
        assert!(matches!(
            registry.lookup("ghost"),
            Err(ManagerError::NotFound(_))
        ));
    }

    #[test]
    fn test_add_replica_stops_at_ceiling() {
        let mut registry = Registry::new(2);
        running(&mut registry, "webA", 2, 3, 100);
        assert_eq!(registry.add_replica("webA", ProcessHandle::new(101)).unwrap(), 2);
        assert_eq!(registry.add_replica("webA", ProcessHandle::new(102)).unwrap(), 3);

        let err = registry
            .add_replica("webA", ProcessHandle::new(103))
            .unwrap_err();
        assert!(matches!(err, ManagerError::PolicyViolation { .. }));
        assert_eq!(registry.lookup("webA").unwrap().active_count(), 3);
    }

    #[test]
    fn test_retire_replica_stops_at_floor() {
        let mut registry = Registry::new(2);
        running(&mut registry, "webA", 2, 4, 100);
        registry.add_replica("webA", ProcessHandle::new(101)).unwrap();
        registry.add_replica("webA", ProcessHandle::new(102)).unwrap();

        // Newest first
        assert_eq!(registry.retire_replica("webA").unwrap(), ProcessHandle::new(102));
        assert_eq!(registry.lookup("webA").unwrap().active_count(), 2);

        let err = registry.retire_replica("webA").unwrap_err();
        assert!(matches!(err, ManagerError::PolicyViolation { .. }));
        assert_eq!(registry.lookup("webA").unwrap().active_count(), 2);
        // The retired replica is still tracked until reaped
        assert_eq!(registry.lookup("webA").unwrap().replicas().len(), 3);
    }

    #[test]
    fn test_mark_terminating_is_idempotent() {
        let mut registry = Registry::new(2);
        running(&mut registry, "webA", 2, 4, 100);
        registry.add_replica("webA", ProcessHandle::new(101)).unwrap();

        let handles = registry.mark_terminating("webA").unwrap();
        assert_eq!(handles, vec![ProcessHandle::new(100), ProcessHandle::new(101)]);
        assert_eq!(registry.lookup("webA").unwrap().state(), GroupState::Terminating);
        assert_eq!(registry.lookup("webA").unwrap().active_count(), 0);
        assert!(registry.lookup("webA").unwrap().process_handle().is_some());

        assert!(registry.mark_terminating("webA").unwrap().is_empty());
    }

    #[test]
    fn test_scaling_refused_while_terminating() {
        let mut registry = Registry::new(2);
        running(&mut registry, "webA", 2, 4, 100);
        registry.mark_terminating("webA").unwrap();

        assert!(matches!(
            registry.check_scale_up("webA"),
            Err(ManagerError::InvalidState { .. })
        ));
        assert!(matches!(
            registry.retire_replica("webA"),
            Err(ManagerError::InvalidState { .. })
        ));
    }

    #[test]
    fn test_owner_and_release() {
        let mut registry = Registry::new(2);
        running(&mut registry, "webA", 2, 4, 100);
        running(&mut registry, "webB", 2, 4, 200);

        assert_eq!(registry.owner_of(ProcessHandle::new(200)).unwrap().name(), "webB");
        assert!(registry.owner_of(ProcessHandle::new(300)).is_none());

        let replica = registry
            .release_replica("webB", ProcessHandle::new(200))
            .unwrap();
        assert_eq!(replica.handle(), ProcessHandle::new(200));
        assert!(registry.owner_of(ProcessHandle::new(200)).is_none());
        assert_eq!(registry.process_count(), 1);
    }

    #[test]
    fn test_discard_pending_only_touches_pending() {
        let mut registry = Registry::new(2);
        registry.insert("webA", 2, 4).unwrap();
        running(&mut registry, "webB", 2, 4, 200);

        assert!(registry.discard_pending("webA").is_some());
        assert!(registry.discard_pending("webB").is_none());
        assert_eq!(registry.len(), 1);
    }
}
