//! The runtime lock.
//!
//! All bridge and host-object operations happen under a single global lock.
//! Native code that is about to block (I/O, heavy computation) drops the
//! lock around the blocking region with [`RuntimeLock::without_lock`] and
//! may hand over an unblock callback so a cross-thread interrupt can cancel
//! the region. Long computations that keep the lock instead poll
//! [`RuntimeLock::check_interrupts`].

use std::cell::Cell;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Condvar, Mutex};

use crate::error::BridgeError;

/// Identity of a bridge-visible thread, assigned on first use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ThreadToken(u64);

static NEXT_TOKEN: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static TOKEN: Cell<u64> = const { Cell::new(0) };
}

/// The calling thread's token.
pub fn current_thread_token() -> ThreadToken {
    TOKEN.with(|cell| {
        let mut id = cell.get();
        if id == 0 {
            id = NEXT_TOKEN.fetch_add(1, Ordering::Relaxed);
            cell.set(id);
        }
        ThreadToken(id)
    })
}

/// Callback that breaks the calling thread out of its blocking region.
/// Must be safe to call from any thread.
pub type UnblockFn = Arc<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct ThreadEntry {
    /// Set by [`RuntimeLock::interrupt`], consumed at the next
    /// cancellation point.
    pending: bool,
    /// Present only while the thread is inside a no-lock region.
    unblock: Option<UnblockFn>,
}

struct LockState {
    holder: Option<ThreadToken>,
    threads: HashMap<ThreadToken, ThreadEntry>,
}

/// Global runtime lock with interrupt delivery.
///
/// Not reentrant: a thread that already holds the lock must not acquire it
/// again. The tables guarded by this lock (`HandleTable`,
/// `TypedDataRegistry`, `RootRegistry`) rely on it instead of carrying
/// locks of their own.
pub struct RuntimeLock {
    inner: Mutex<LockState>,
    available: Condvar,
}

impl RuntimeLock {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(LockState { holder: None, threads: HashMap::new() }),
            available: Condvar::new(),
        }
    }

    /// Block until the lock is free and take it.
    pub fn acquire(&self) {
        let token = current_thread_token();
        let mut state = self.inner.lock();
        assert_ne!(state.holder, Some(token), "runtime lock is not reentrant");
        while state.holder.is_some() {
            self.available.wait(&mut state);
        }
        state.holder = Some(token);
    }

    /// Release the lock; panics if the caller does not hold it.
    pub fn release(&self) {
        let token = current_thread_token();
        {
            let mut state = self.inner.lock();
            assert_eq!(state.holder, Some(token), "release without holding the runtime lock");
            state.holder = None;
        }
        self.available.notify_one();
    }

    /// Whether the calling thread holds the lock.
    pub fn holds(&self) -> bool {
        self.inner.lock().holder == Some(current_thread_token())
    }

    /// Run `f` with the lock dropped, then reacquire.
    ///
    /// `unblock` is registered for the duration of the region; an
    /// [`interrupt`](Self::interrupt) aimed at this thread calls it (so the
    /// region can stop waiting) and marks the thread pending. A pending
    /// interrupt is consumed on reacquisition and turns the whole call into
    /// `Err(Interrupted)`, discarding `f`'s result.
    pub fn without_lock<R>(
        &self,
        f: impl FnOnce() -> R,
        unblock: Option<UnblockFn>,
    ) -> Result<R, BridgeError> {
        let token = current_thread_token();
        {
            let mut state = self.inner.lock();
            assert_eq!(
                state.holder,
                Some(token),
                "without_lock requires the runtime lock"
            );
            let entry = state.threads.entry(token).or_default();
            entry.unblock = unblock;
            state.holder = None;
        }
        self.available.notify_one();

        let result = f();

        let mut state = self.inner.lock();
        while state.holder.is_some() {
            self.available.wait(&mut state);
        }
        state.holder = Some(token);
        let entry = state.threads.entry(token).or_default();
        entry.unblock = None;
        let interrupted = std::mem::take(&mut entry.pending);
        drop(state);

        if interrupted {
            log::debug!("no-lock region of {token:?} cancelled by interrupt");
            Err(BridgeError::Interrupted)
        } else {
            Ok(result)
        }
    }

    /// Mark `target` pending and fire its unblock callback if it is inside
    /// a no-lock region. Never blocks on the target's progress.
    pub fn interrupt(&self, target: ThreadToken) {
        let unblock = {
            let mut state = self.inner.lock();
            let entry = state.threads.entry(target).or_default();
            entry.pending = true;
            entry.unblock.clone()
        };
        // Called outside the state lock: the callback may do arbitrary
        // signalling of its own.
        if let Some(f) = unblock {
            f();
        }
    }

    /// Cancellation point for long computations that keep the lock.
    /// Consumes a pending interrupt.
    pub fn check_interrupts(&self) -> Result<(), BridgeError> {
        let token = current_thread_token();
        let mut state = self.inner.lock();
        debug_assert_eq!(state.holder, Some(token), "check_interrupts without the lock");
        let entry = state.threads.entry(token).or_default();
        if std::mem::take(&mut entry.pending) {
            Err(BridgeError::Interrupted)
        } else {
            Ok(())
        }
    }
}

impl Default for RuntimeLock {
    fn default() -> Self {
        Self::new()
    }
}
