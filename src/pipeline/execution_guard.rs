use std::sync::Arc;

use dashmap::{mapref::entry::Entry, DashMap};

use crate::database::models::run_trigger::RunTrigger;

/// In-process record of which scripts are executing right now.
///
/// Manual and scheduled runs share it, so a script never runs twice at once
/// inside one process. The partial unique index on `script_run` covers the
/// same rule at the database level.
#[derive(Debug, Clone, Default)]
pub struct ExecutionGuard {
    running: Arc<DashMap<i32, RunTrigger>>,
}

impl ExecutionGuard {
    /// Claims `script_id`, or returns `None` if it is already executing.
    pub fn try_acquire(&self, script_id: i32, trigger: RunTrigger) -> Option<ExecutionPermit> {
        match self.running.entry(script_id) {
            Entry::Occupied(_) => None,
            Entry::Vacant(entry) => {
                entry.insert(trigger);
                Some(ExecutionPermit {
                    script_id,
                    running: Arc::clone(&self.running),
                })
            }
        }
    }

    pub fn is_running(&self, script_id: i32) -> bool {
        self.running.contains_key(&script_id)
    }

    /// What started the execution currently holding `script_id`.
    pub fn holder(&self, script_id: i32) -> Option<RunTrigger> {
        self.running.get(&script_id).map(|entry| *entry.value())
    }

    pub fn running_count(&self) -> usize {
        self.running.len()
    }
}

/// Releases the script when dropped.
#[derive(Debug)]
pub struct ExecutionPermit {
    script_id: i32,
    running: Arc<DashMap<i32, RunTrigger>>,
}

impl ExecutionPermit {
    pub const fn script_id(&self) -> i32 {
        self.script_id
    }
}

impl Drop for ExecutionPermit {
    fn drop(&mut self) {
        self.running.remove(&self.script_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_one_permit_per_script() {
        let guard = ExecutionGuard::default();

        let permit = guard.try_acquire(1, RunTrigger::Scheduled).unwrap();

        assert!(guard.try_acquire(1, RunTrigger::Manual).is_none());
        assert_eq!(guard.holder(1), Some(RunTrigger::Scheduled));
        assert!(guard.try_acquire(2, RunTrigger::Manual).is_some());
        assert_eq!(permit.script_id(), 1);
    }

    #[test]
    fn test_dropping_the_permit_releases_the_script() {
        let guard = ExecutionGuard::default();

        let permit = guard.try_acquire(7, RunTrigger::Manual).unwrap();
        assert!(guard.is_running(7));

        drop(permit);

        assert!(!guard.is_running(7));
        assert_eq!(guard.running_count(), 0);
        assert!(guard.try_acquire(7, RunTrigger::Manual).is_some());
    }

    #[test]
    fn test_clones_share_state() {
        let guard = ExecutionGuard::default();
        let shared = guard.clone();

        let _permit = guard.try_acquire(3, RunTrigger::Manual).unwrap();

        assert!(shared.is_running(3));
    }
}
