use std::collections::HashSet;
use std::sync::{Condvar, Mutex, PoisonError};

use opsdeck_core::ResourceRef;

/// Per-target exclusive locks. Two operations on the same target serialize;
/// operations on different targets proceed in parallel. Blocking is fine
/// here: operations are operator-paced and short.
#[derive(Default)]
pub struct TargetLocks {
    held: Mutex<HashSet<ResourceRef>>,
    released: Condvar,
}

impl TargetLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn acquire(&self, target: &ResourceRef) -> TargetGuard<'_> {
        let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
        while held.contains(target) {
            held = self
                .released
                .wait(held)
                .unwrap_or_else(PoisonError::into_inner);
        }
        held.insert(target.clone());
        TargetGuard {
            locks: self,
            target: target.clone(),
        }
    }
}

/// Releases the target on drop.
pub struct TargetGuard<'a> {
    locks: &'a TargetLocks,
    target: ResourceRef,
}

impl Drop for TargetGuard<'_> {
    fn drop(&mut self) {
        let mut held = self
            .locks
            .held
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        held.remove(&self.target);
        self.locks.released.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn same_target_serializes() {
        let locks = Arc::new(TargetLocks::new());
        let concurrent = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..4 {
            let locks = Arc::clone(&locks);
            let concurrent = Arc::clone(&concurrent);
            let peak = Arc::clone(&peak);
            handles.push(thread::spawn(move || {
                let _guard = locks.acquire(&ResourceRef::group("g1"));
                let now = concurrent.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                thread::sleep(Duration::from_millis(10));
                concurrent.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn different_targets_do_not_block() {
        let locks = TargetLocks::new();
        let _a = locks.acquire(&ResourceRef::group("g1"));
        let _b = locks.acquire(&ResourceRef::queue("q1"));
    }

    #[test]
    fn released_target_can_be_reacquired() {
        let locks = TargetLocks::new();
        drop(locks.acquire(&ResourceRef::group("g1")));
        let _again = locks.acquire(&ResourceRef::group("g1"));
    }
}
