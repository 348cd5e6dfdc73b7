//! Claim-counted locks
//!
//! # Safety
//!
//! Both lock types are thin wrappers over `parking_lot` primitives and contain
//! no unsafe code. They add claim accounting on top:
//! - [`Lock`] is non-recursive. A second claim from the owning thread is a
//!   programming error and panics instead of deadlocking.
//! - [`RecursiveLock`] may be claimed again by its owner; a counter tracks
//!   nesting and every release must match a claim.
//!
//! Claims are released by dropping the guard, so every exit path releases.

use core::ops::{Deref, DerefMut};
use std::cell::{Ref, RefCell, RefMut};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use parking_lot::{Mutex, MutexGuard, ReentrantMutex, ReentrantMutexGuard};

/// Process-unique token for the calling thread (never zero)
fn thread_token() -> u64 {
    static NEXT: AtomicU64 = AtomicU64::new(1);
    thread_local! {
        static TOKEN: u64 = NEXT.fetch_add(1, Ordering::Relaxed);
    }
    TOKEN.with(|token| *token)
}

// ============================================================================
// Non-recursive lock
// ============================================================================

/// Non-recursive mutual exclusion around `T`
#[derive(Debug)]
pub struct Lock<T> {
    data: Mutex<T>,
    owner: AtomicU64,
    claims: AtomicUsize,
}

impl<T> Lock<T> {
    pub fn new(value: T) -> Self {
        Self {
            data: Mutex::new(value),
            owner: AtomicU64::new(0),
            claims: AtomicUsize::new(0),
        }
    }

    /// Claims the lock, blocking until it is available.
    ///
    /// # Panics
    ///
    /// If the calling thread already holds the lock.
    pub fn claim(&self) -> LockGuard<'_, T> {
        assert!(
            !self.is_held_by_current_thread(),
            "non-recursive lock claimed twice by the same thread"
        );
        let guard = self.data.lock();
        self.enter();
        LockGuard { lock: self, guard }
    }

    /// Claims the lock if no other thread holds it.
    pub fn try_claim(&self) -> Option<LockGuard<'_, T>> {
        if self.is_held_by_current_thread() {
            return None;
        }
        let guard = self.data.try_lock()?;
        self.enter();
        Some(LockGuard { lock: self, guard })
    }

    /// Whether any thread holds the lock
    pub fn is_claimed(&self) -> bool {
        self.claims() > 0
    }

    /// Number of outstanding claims (0 or 1)
    pub fn claims(&self) -> usize {
        self.claims.load(Ordering::Acquire)
    }

    pub fn is_held_by_current_thread(&self) -> bool {
        self.owner.load(Ordering::Acquire) == thread_token()
    }

    /// Finishes the lock and returns the protected value.
    pub fn finish(self) -> T {
        assert_eq!(self.claims(), 0, "lock finished while claimed");
        self.data.into_inner()
    }

    fn enter(&self) {
        let previous = self.claims.fetch_add(1, Ordering::AcqRel);
        debug_assert_eq!(previous, 0, "non-recursive lock already claimed");
        self.owner.store(thread_token(), Ordering::Release);
    }
}

impl<T: Default> Default for Lock<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

/// Scoped claim on a [`Lock`]
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct LockGuard<'a, T> {
    lock: &'a Lock<T>,
    guard: MutexGuard<'a, T>,
}

impl<T> LockGuard<'_, T> {
    /// Releases the claim explicitly
    pub fn release(self) {}
}

impl<T> Deref for LockGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T> DerefMut for LockGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}

impl<T> Drop for LockGuard<'_, T> {
    fn drop(&mut self) {
        // owner is cleared while the mutex is still held
        self.lock.owner.store(0, Ordering::Release);
        let previous = self.lock.claims.fetch_sub(1, Ordering::AcqRel);
        debug_assert_eq!(previous, 1, "released a lock that was not claimed");
    }
}

// ============================================================================
// Recursive lock
// ============================================================================

/// Recursive-capable mutual exclusion around `T`
///
/// Data is reached through [`RefCell`] borrows on the guard, so nested
/// claims must not hold overlapping mutable borrows.
#[derive(Debug)]
pub struct RecursiveLock<T> {
    inner: ReentrantMutex<RefCell<T>>,
    claims: AtomicUsize,
}

impl<T> RecursiveLock<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: ReentrantMutex::new(RefCell::new(value)),
            claims: AtomicUsize::new(0),
        }
    }

    /// Claims the lock; the owning thread may claim again.
    pub fn claim(&self) -> RecursiveGuard<'_, T> {
        let guard = self.inner.lock();
        let previous = self.claims.fetch_add(1, Ordering::AcqRel);
        assert!(previous < usize::MAX, "recursive claim counter overflow");
        RecursiveGuard { lock: self, guard }
    }

    /// Number of nested claims currently held
    pub fn claims(&self) -> usize {
        self.claims.load(Ordering::Acquire)
    }

    pub fn is_claimed(&self) -> bool {
        self.claims() > 0
    }

    /// Finishes the lock and returns the protected value.
    pub fn finish(self) -> T {
        assert_eq!(self.claims(), 0, "recursive lock finished while claimed");
        self.inner.into_inner().into_inner()
    }
}

/// Scoped claim on a [`RecursiveLock`]
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct RecursiveGuard<'a, T> {
    lock: &'a RecursiveLock<T>,
    guard: ReentrantMutexGuard<'a, RefCell<T>>,
}

impl<T> RecursiveGuard<'_, T> {
    pub fn borrow(&self) -> Ref<'_, T> {
        self.guard.borrow()
    }

    pub fn borrow_mut(&self) -> RefMut<'_, T> {
        self.guard.borrow_mut()
    }

    /// Releases this claim explicitly
    pub fn release(self) {}
}

impl<T> Drop for RecursiveGuard<'_, T> {
    fn drop(&mut self) {
        let previous = self.lock.claims.fetch_sub(1, Ordering::AcqRel);
        assert!(previous > 0, "released a recursive lock that was not claimed");
    }
}
