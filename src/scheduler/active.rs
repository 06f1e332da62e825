//! Active-execution registry.

use std::sync::Arc;

use dashmap::DashSet;

/// Process-local set of schedule IDs with a run executor in flight.
///
/// Admission is an atomic test-and-insert; it guards against overlapping
/// executors for one schedule inside this process only. It is volatile by
/// design: after a restart the orphan sweep clears any state the lost
/// entries were protecting. It is not a distributed lock.
#[derive(Clone, Default)]
pub struct ActiveExecutions {
    inner: Arc<DashSet<String>>,
}

impl ActiveExecutions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve a schedule for execution. Returns false if it is already
    /// in flight.
    pub fn try_admit(&self, schedule_id: &str) -> bool {
        self.inner.insert(schedule_id.to_string())
    }

    /// Release a schedule; no-op if absent.
    pub fn release(&self, schedule_id: &str) {
        self.inner.remove(schedule_id);
    }

    pub fn contains(&self, schedule_id: &str) -> bool {
        self.inner.contains(schedule_id)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admit_is_exclusive_until_release() {
        let active = ActiveExecutions::new();

        assert!(active.try_admit("s1"));
        assert!(!active.try_admit("s1"));
        assert!(active.try_admit("s2"));
        assert_eq!(active.len(), 2);

        active.release("s1");
        assert!(!active.contains("s1"));
        assert!(active.try_admit("s1"));
    }

    #[test]
    fn release_of_absent_id_is_noop() {
        let active = ActiveExecutions::new();
        active.release("never-admitted");
        assert!(active.is_empty());
    }

    #[tokio::test]
    async fn concurrent_admission_admits_exactly_one() {
        let active = ActiveExecutions::new();
        let mut handles = Vec::new();
        for _ in 0..16 {
            let active = active.clone();
            handles.push(tokio::spawn(async move { active.try_admit("s1") }));
        }

        let mut admitted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 1);
    }
}
