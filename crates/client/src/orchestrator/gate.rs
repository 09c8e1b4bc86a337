//! Per-fingerprint single-flight gate.
//!
//! At most one browser automation runs per fingerprint. Later callers wait
//! on the same async mutex and then re-check the cache and the session
//! store, so they pick up the first caller's answer instead of starting a
//! second run.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use courtfetch_core::Fingerprint;
use tokio::sync::OwnedMutexGuard;

type Slots = HashMap<Fingerprint, Arc<tokio::sync::Mutex<()>>>;

#[derive(Debug, Default)]
pub struct InflightGate {
    slots: Arc<Mutex<Slots>>,
}

impl InflightGate {
    pub fn new() -> Self {
        Self::default()
    }

    fn slots(&self) -> MutexGuard<'_, Slots> {
        self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Wait until no other holder owns this fingerprint.
    pub async fn acquire(&self, fingerprint: &Fingerprint) -> GateGuard {
        let slot = Arc::clone(self.slots().entry(fingerprint.clone()).or_default());
        let permit = slot.lock_owned().await;
        GateGuard { fingerprint: fingerprint.clone(), slots: Arc::clone(&self.slots), permit: Some(permit) }
    }

    /// Fingerprints currently held or waited on.
    pub fn in_flight(&self) -> usize {
        self.slots().len()
    }
}

/// Held for the duration of one automation; dropping it admits the next
/// waiter.
#[derive(Debug)]
pub struct GateGuard {
    fingerprint: Fingerprint,
    slots: Arc<Mutex<Slots>>,
    permit: Option<OwnedMutexGuard<()>>,
}

impl Drop for GateGuard {
    fn drop(&mut self) {
        drop(self.permit.take());

        let mut slots = self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        // Only the map itself still references an idle slot.
        if slots.get(&self.fingerprint).is_some_and(|slot| Arc::strong_count(slot) == 1) {
            slots.remove(&self.fingerprint);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courtfetch_core::Query;
    use std::time::Duration;

    fn fingerprint(number: u32) -> Fingerprint {
        Query::new("Civil Appeal", number, 2020).unwrap().fingerprint()
    }

    #[tokio::test]
    async fn test_same_fingerprint_serializes() {
        let gate = Arc::new(InflightGate::new());
        let first = gate.acquire(&fingerprint(1)).await;

        let waiter = {
            let gate = Arc::clone(&gate);
            tokio::spawn(async move {
                let _guard = gate.acquire(&fingerprint(1)).await;
            })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());

        drop(first);
        tokio::time::timeout(Duration::from_secs(1), waiter).await.unwrap().unwrap();
        assert_eq!(gate.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_distinct_fingerprints_do_not_block() {
        let gate = InflightGate::new();
        let _a = gate.acquire(&fingerprint(1)).await;
        let b = tokio::time::timeout(Duration::from_millis(100), gate.acquire(&fingerprint(2))).await;
        assert!(b.is_ok());
        assert_eq!(gate.in_flight(), 2);
    }

    #[tokio::test]
    async fn test_slot_removed_after_release() {
        let gate = InflightGate::new();
        drop(gate.acquire(&fingerprint(3)).await);
        assert_eq!(gate.in_flight(), 0);
    }
}
