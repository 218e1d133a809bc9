//! Cooperative cancellation for blocking waits.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

/// Something that parks threads on a condition variable.
///
/// `wake_all` must take the same mutex the waiters hold while they check
/// [`CancelToken::is_cancelled`], otherwise a cancel can slip in between the
/// check and the sleep.
pub(crate) trait Wake: Send + Sync {
    fn wake_all(&self);
}

/// A clone-able flag that wakes every wait registered with it.
#[derive(Clone, Default)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    cancelled: AtomicBool,
    waiters: Mutex<Vec<Weak<dyn Wake>>>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel and wake all registered waiters.
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        let waiters = std::mem::take(&mut *self.inner.waiters.lock());
        for waiter in waiters.iter().filter_map(Weak::upgrade) {
            waiter.wake_all();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Register a waiter. Call before the first `is_cancelled` check.
    ///
    /// Once cancelled, nothing is kept: the waiter sees the flag on its own.
    pub(crate) fn register(&self, waiter: Weak<dyn Wake>) {
        let mut waiters = self.inner.waiters.lock();
        if self.is_cancelled() {
            return;
        }
        waiters.retain(|w| w.strong_count() > 0);
        if !waiters.iter().any(|w| w.ptr_eq(&waiter)) {
            waiters.push(waiter);
        }
    }
}

impl std::fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_state() {
        let token = CancelToken::new();
        let other = token.clone();
        assert!(!other.is_cancelled());
        token.cancel();
        assert!(other.is_cancelled());
    }

    #[test]
    fn dropped_waiters_are_skipped() {
        struct Counter(Mutex<u32>);
        impl Wake for Counter {
            fn wake_all(&self) {
                *self.0.lock() += 1;
            }
        }

        let token = CancelToken::new();
        let live = Arc::new(Counter(Mutex::new(0)));
        let gone = Arc::new(Counter(Mutex::new(0)));
        let live_weak: Weak<dyn Wake> = Arc::downgrade(&live) as Weak<dyn Wake>;
        let gone_weak: Weak<dyn Wake> = Arc::downgrade(&gone) as Weak<dyn Wake>;
        token.register(live_weak);
        token.register(gone_weak);
        drop(gone);

        token.cancel();
        assert_eq!(*live.0.lock(), 1);
    }

    #[test]
    fn register_after_cancel_keeps_nothing() {
        struct Noop;
        impl Wake for Noop {
            fn wake_all(&self) {}
        }

        let token = CancelToken::new();
        token.cancel();
        let waiter = Arc::new(Noop);
        let weak: Weak<dyn Wake> = Arc::downgrade(&waiter) as Weak<dyn Wake>;
        token.register(weak);
        assert!(token.inner.waiters.lock().is_empty());
    }
}
