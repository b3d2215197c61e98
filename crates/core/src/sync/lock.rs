//! Process-local mutual exclusion for one entity type.

use std::sync::atomic::{AtomicBool, Ordering};

/// One boolean flag per entity type. A held flag makes later callers skip, never wait.
#[derive(Debug, Default)]
pub struct SyncFlag {
    running: AtomicBool,
}

impl SyncFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes the flag if it is free. The flag is released when the guard drops,
    /// including on early return or panic.
    pub fn try_acquire(&self) -> Option<SyncFlagGuard<'_>> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| SyncFlagGuard { flag: self })
    }

    pub fn is_held(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

#[derive(Debug)]
pub struct SyncFlagGuard<'a> {
    flag: &'a SyncFlag,
}

impl Drop for SyncFlagGuard<'_> {
    fn drop(&mut self) {
        self.flag.running.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_acquire_fails_until_guard_drops() {
        let flag = SyncFlag::new();
        let guard = flag.try_acquire();
        assert!(guard.is_some());
        assert!(flag.is_held());
        assert!(flag.try_acquire().is_none());

        drop(guard);
        assert!(!flag.is_held());
        assert!(flag.try_acquire().is_some());
    }

    #[test]
    fn flag_is_released_on_panic() {
        let flag = SyncFlag::new();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = flag.try_acquire().expect("free flag");
            panic!("boom");
        }));
        assert!(result.is_err());
        assert!(!flag.is_held());
    }
}
