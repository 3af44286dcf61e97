//! Reentrant shared/exclusive lock guarding the single database connection.
//!
//! SQLite rejects concurrent writers with a retryable `SQLITE_BUSY`. Rather than
//! retrying every write, all access to the connection goes through one coarse
//! [`Synchronizer`]: reads take a shared lock for the duration of a statement,
//! mutations take the exclusive lock for their whole statement or transaction.
//!
//! Locks are reentrant per thread:
//! - a thread holding shared locks may take more shared locks without blocking;
//! - a thread that is the *only* shared holder may take the exclusive lock
//!   (upgrade) without blocking;
//! - a thread holding the exclusive lock may take shared or exclusive locks again.
//!
//! Once a writer is waiting, threads that do not already hold a lock queue
//! behind it so bounded reader churn cannot starve the writer.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};

#[derive(Debug, Default)]
struct LockState {
    shared: HashMap<ThreadId, usize>,
    exclusive: Option<(ThreadId, usize)>,
    waiting_writers: usize,
}

impl LockState {
    fn holds_shared(&self, me: ThreadId) -> bool {
        self.shared.contains_key(&me)
    }

    fn owns_exclusive(&self, me: ThreadId) -> bool {
        matches!(self.exclusive, Some((owner, _)) if owner == me)
    }
}

#[derive(Debug, Default)]
pub struct Synchronizer {
    state: Mutex<LockState>,
    released: Condvar,
}

impl Synchronizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block until a shared lock is available and return its guard.
    pub fn acquire_shared(&self) -> SharedLock<'_> {
        let me = thread::current().id();
        let mut state = self.lock_state();
        loop {
            let reentrant = state.holds_shared(me) || state.owns_exclusive(me);
            let writer_active = state.exclusive.is_some() && !state.owns_exclusive(me);
            let writer_queued = state.waiting_writers > 0 && !reentrant;
            if !writer_active && !writer_queued {
                break;
            }
            state = self.wait(state);
        }
        *state.shared.entry(me).or_insert(0) += 1;
        SharedLock {
            sync: self,
            owner: me,
            _not_send: PhantomData,
        }
    }

    /// Block until the exclusive lock is available and return its guard.
    ///
    /// Succeeds immediately when no other thread holds a shared lock, including
    /// when the caller is itself the sole shared holder. Two threads that both
    /// hold shared locks and both request the exclusive lock deadlock; callers
    /// upgrade only from short, single-threaded read sections.
    pub fn acquire_exclusive(&self) -> ExclusiveLock<'_> {
        let me = thread::current().id();
        let mut state = self.lock_state();
        state.waiting_writers += 1;
        loop {
            let exclusive_free = state.exclusive.is_none() || state.owns_exclusive(me);
            let readers_clear = state.shared.is_empty()
                || (state.shared.len() == 1 && state.holds_shared(me));
            if exclusive_free && readers_clear {
                break;
            }
            state = self.wait(state);
        }
        state.waiting_writers -= 1;
        match state.exclusive.as_mut() {
            Some((_, depth)) => *depth += 1,
            None => state.exclusive = Some((me, 1)),
        }
        ExclusiveLock {
            sync: self,
            _not_send: PhantomData,
        }
    }

    /// Number of threads currently holding at least one shared lock.
    pub fn shared_holders(&self) -> usize {
        self.lock_state().shared.len()
    }

    /// Number of threads blocked in [`Synchronizer::acquire_exclusive`].
    pub fn waiting_writers(&self) -> usize {
        self.lock_state().waiting_writers
    }

    /// Whether any thread currently holds the exclusive lock.
    pub fn is_exclusively_held(&self) -> bool {
        self.lock_state().exclusive.is_some()
    }

    fn release_shared(&self, owner: ThreadId) {
        let mut state = self.lock_state();
        if let Some(count) = state.shared.get_mut(&owner) {
            *count -= 1;
            if *count == 0 {
                state.shared.remove(&owner);
            }
        }
        drop(state);
        self.released.notify_all();
    }

    fn release_exclusive(&self) {
        let mut state = self.lock_state();
        if let Some((_, depth)) = state.exclusive.as_mut() {
            *depth -= 1;
            if *depth == 0 {
                state.exclusive = None;
            }
        }
        drop(state);
        self.released.notify_all();
    }

    // The state is only mutated in short sections that cannot panic, so a
    // poisoned mutex still holds consistent counts.
    fn lock_state(&self) -> MutexGuard<'_, LockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn wait<'a>(&self, guard: MutexGuard<'a, LockState>) -> MutexGuard<'a, LockState> {
        self.released
            .wait(guard)
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Shared lock guard; released on drop on the thread that acquired it.
#[must_use = "the shared lock is released as soon as the guard is dropped"]
#[derive(Debug)]
pub struct SharedLock<'a> {
    sync: &'a Synchronizer,
    owner: ThreadId,
    _not_send: PhantomData<*const ()>,
}

impl Drop for SharedLock<'_> {
    fn drop(&mut self) {
        self.sync.release_shared(self.owner);
    }
}

/// Exclusive lock guard; released on drop on the thread that acquired it.
#[must_use = "the exclusive lock is released as soon as the guard is dropped"]
#[derive(Debug)]
pub struct ExclusiveLock<'a> {
    sync: &'a Synchronizer,
    _not_send: PhantomData<*const ()>,
}

impl Drop for ExclusiveLock<'_> {
    fn drop(&mut self) {
        self.sync.release_exclusive();
    }
}
