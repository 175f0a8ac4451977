//! ---
//! fed_section: "02-federate-sync-core"
//! fed_subsection: "module"
//! fed_type: "source"
//! fed_scope: "code"
//! fed_description: "Single-shot completion signal shared by every blocking call."
//! fed_version: "v0.0.0-prealpha"
//! fed_owner: "tbd"
//! ---
//! Write-once result plus waiters. The requesting thread arms a [`OneShot`],
//! hands a clone to the callback side, issues the service request and then
//! waits; the callback thread completes it exactly once.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

enum Slot<T> {
    Empty,
    Filled(T),
    Taken,
}

struct Inner<T> {
    slot: Mutex<Slot<T>>,
    ready: Condvar,
}

pub struct OneShot<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for OneShot<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Default for OneShot<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for OneShot<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OneShot")
            .field("completed", &self.is_completed())
            .finish()
    }
}

impl<T> OneShot<T> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                slot: Mutex::new(Slot::Empty),
                ready: Condvar::new(),
            }),
        }
    }

    /// Store the result and wake all waiters. Returns `false` if the signal
    /// was already completed; the earlier result is kept.
    pub fn complete(&self, value: T) -> bool {
        let mut slot = self.inner.slot.lock();
        match *slot {
            Slot::Empty => {
                *slot = Slot::Filled(value);
                self.inner.ready.notify_all();
                true
            }
            Slot::Filled(_) | Slot::Taken => false,
        }
    }

    pub fn is_completed(&self) -> bool {
        !matches!(*self.inner.slot.lock(), Slot::Empty)
    }

    /// Block until completed or `timeout` elapses.
    ///
    /// The result is handed out once; a second successful wait, or a wait that
    /// times out, yields `None`. A completion arriving after a timeout is kept
    /// and can still be collected by a later wait.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<T> {
        let deadline = Instant::now() + timeout;
        let mut slot = self.inner.slot.lock();
        while matches!(*slot, Slot::Empty) {
            if self.inner.ready.wait_until(&mut slot, deadline).timed_out() {
                break;
            }
        }
        match std::mem::replace(&mut *slot, Slot::Taken) {
            Slot::Filled(value) => Some(value),
            Slot::Empty => {
                *slot = Slot::Empty;
                None
            }
            Slot::Taken => None,
        }
    }

    /// Whether two handles refer to the same signal.
    pub fn same_as(&self, other: &OneShot<T>) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn completion_before_wait_is_not_lost() {
        let signal = OneShot::new();
        assert!(signal.complete(7));
        assert_eq!(signal.wait_timeout(Duration::from_millis(1)), Some(7));
    }

    #[test]
    fn second_completion_is_refused() {
        let signal = OneShot::new();
        assert!(signal.complete(true));
        assert!(!signal.complete(false));
        assert_eq!(signal.wait_timeout(Duration::ZERO), Some(true));
        assert_eq!(signal.wait_timeout(Duration::ZERO), None);
    }

    #[test]
    fn waiter_is_woken_from_another_thread() {
        let signal = OneShot::new();
        let remote = signal.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            remote.complete("granted")
        });
        assert_eq!(signal.wait_timeout(Duration::from_secs(5)), Some("granted"));
        assert!(handle.join().expect("completer thread"));
    }

    #[test]
    fn timeout_leaves_signal_completable() {
        let signal: OneShot<u8> = OneShot::new();
        assert_eq!(signal.wait_timeout(Duration::from_millis(10)), None);
        assert!(!signal.is_completed());
        assert!(signal.complete(3));
        assert_eq!(signal.wait_timeout(Duration::ZERO), Some(3));
    }

    #[test]
    fn clones_compare_by_identity() {
        let a: OneShot<()> = OneShot::new();
        let b = a.clone();
        assert!(a.same_as(&b));
        assert!(!a.same_as(&OneShot::new()));
    }
}
