//! Registry of background tasks, at most one per transaction.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Submission,
    Poll,
}

#[derive(Debug, Clone, Default)]
pub struct TaskRegistry {
    active: Arc<DashMap<Uuid, TaskKind>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `id` for a task of `kind`. `None` if another task owns it.
    pub fn claim(&self, id: Uuid, kind: TaskKind) -> Option<TaskClaim> {
        match self.active.entry(id) {
            Entry::Occupied(_) => None,
            Entry::Vacant(slot) => {
                slot.insert(kind);
                Some(TaskClaim {
                    registry: self.clone(),
                    id,
                })
            }
        }
    }

    pub fn active_kind(&self, id: Uuid) -> Option<TaskKind> {
        self.active.get(&id).map(|r| *r.value())
    }

    /// Number of live tasks.
    pub fn in_flight(&self) -> usize {
        self.active.len()
    }

    /// Wait until no tasks are live or `timeout` elapses. Returns the number
    /// still running.
    pub async fn wait_idle(&self, timeout: Duration) -> usize {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let remaining = self.in_flight();
            if remaining == 0 || tokio::time::Instant::now() >= deadline {
                return remaining;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
    }
}

/// Ownership of one transaction by one task. Released on drop.
#[derive(Debug)]
pub struct TaskClaim {
    registry: TaskRegistry,
    id: Uuid,
}

impl TaskClaim {
    /// Hand the claim to the next task stage without releasing it.
    pub fn handoff(self, kind: TaskKind) -> Self {
        if let Some(mut entry) = self.registry.active.get_mut(&self.id) {
            *entry = kind;
        }
        self
    }
}

impl Drop for TaskClaim {
    fn drop(&mut self) {
        self.registry.active.remove(&self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_claim_per_transaction() {
        let registry = TaskRegistry::new();
        let id = Uuid::new_v4();

        let claim = registry.claim(id, TaskKind::Submission).unwrap();
        assert!(registry.claim(id, TaskKind::Poll).is_none());
        assert_eq!(registry.in_flight(), 1);

        let claim = claim.handoff(TaskKind::Poll);
        assert_eq!(registry.active_kind(id), Some(TaskKind::Poll));
        assert_eq!(registry.in_flight(), 1);

        drop(claim);
        assert_eq!(registry.in_flight(), 0);
        assert!(registry.claim(id, TaskKind::Poll).is_some());
    }

    #[tokio::test]
    async fn test_wait_idle() {
        let registry = TaskRegistry::new();
        let claim = registry.claim(Uuid::new_v4(), TaskKind::Poll).unwrap();

        assert_eq!(registry.wait_idle(Duration::from_millis(50)).await, 1);

        let release = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            drop(claim);
        });
        assert_eq!(registry.wait_idle(Duration::from_secs(2)).await, 0);
        release.await.unwrap();
    }
}
