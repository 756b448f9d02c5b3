//! Busy-wait locks with owner-thread tracking.
//!
//! Both locks are [`lock_api`] front-ends over [`RawSpinLock`], which records
//! *which* thread holds it instead of a plain flag, so misuse is caught at the
//! point where it happens:
//!
//! - [`SpinLock`] is not re-entrant. Locking it again from the owning thread is
//!   a fatal error rather than a silent deadlock.
//! - [`RecursiveSpinLock`] may be locked repeatedly by its owner and is released
//!   once every guard has been dropped.
//!
//! Dropping either lock while it is held is fatal as well.
//!
//! Spin locks are only suitable for very short critical sections that do not
//! call back into user code.

use std::fmt;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicUsize, Ordering};

use lock_api::{GetThreadId, GuardNoSend, RawMutex};

use crate::error::fatal;

const NO_OWNER: usize = 0;

/// A non-recursive spin lock protecting a value of type `T`.
///
/// # Examples
///
/// ```rust
/// use core_task::spin_lock::SpinLock;
///
/// let lock = SpinLock::new(Vec::new());
/// lock.lock().push(42);
/// assert_eq!(*lock.lock(), vec![42]);
/// ```
pub type SpinLock<T> = lock_api::Mutex<RawSpinLock, T>;

/// RAII guard releasing a [`SpinLock`] when dropped. It is `!Send`.
pub type SpinLockGuard<'a, T> = lock_api::MutexGuard<'a, RawSpinLock, T>;

/// A spin lock that its owning thread may acquire several times.
///
/// Guards only give shared access to the value because several of them can
/// be alive on the owning thread at once.
pub type RecursiveSpinLock<T> = lock_api::ReentrantMutex<RawSpinLock, ThreadToken, T>;

pub type RecursiveSpinLockGuard<'a, T> =
    lock_api::ReentrantMutexGuard<'a, RawSpinLock, ThreadToken, T>;

/// Process-unique, non-zero identity of the calling thread.
fn current_thread_token() -> NonZeroUsize {
    static NEXT_TOKEN: AtomicUsize = AtomicUsize::new(0);

    thread_local! {
        static TOKEN: NonZeroUsize =
            NonZeroUsize::MIN.saturating_add(NEXT_TOKEN.fetch_add(1, Ordering::Relaxed));
    }

    TOKEN.with(|token| *token)
}

/// Thread identity used by [`RecursiveSpinLock`] to recognise its owner.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadToken;

// Safety: tokens come from a global counter, so no two live threads share one.
unsafe impl GetThreadId for ThreadToken {
    const INIT: Self = ThreadToken;

    fn nonzero_thread_id(&self) -> NonZeroUsize {
        current_thread_token()
    }
}

/// The owner-tracking spin lock underneath [`SpinLock`] and
/// [`RecursiveSpinLock`].
///
/// Acquisition is a single compare-and-swap from "no owner" to the calling
/// thread's token.
pub struct RawSpinLock {
    owner: AtomicUsize,
}

// Safety: `lock` only returns once this thread swapped itself in as the owner,
// and `unlock` refuses to release a lock held by another thread.
unsafe impl RawMutex for RawSpinLock {
    #[allow(clippy::declare_interior_mutable_const)]
    const INIT: Self = Self {
        owner: AtomicUsize::new(NO_OWNER),
    };

    type GuardMarker = GuardNoSend;

    fn lock(&self) {
        let this_thread = current_thread_token().get();
        if self.owner.load(Ordering::Relaxed) == this_thread {
            fatal("Recursive spin lock acquisition is not allowed");
        }

        loop {
            if self
                .owner
                .compare_exchange(NO_OWNER, this_thread, Ordering::Acquire, Ordering::Relaxed)
                .is_ok()
            {
                return;
            }

            // Only one core may write a cache line at a time, but many may read
            // it. Waiting on a relaxed load keeps contending threads off the bus
            // until the lock looks free again.
            while self.owner.load(Ordering::Relaxed) != NO_OWNER {
                std::thread::yield_now();
            }
        }
    }

    /// Fails if any thread, including the caller, holds the lock.
    fn try_lock(&self) -> bool {
        self.owner
            .compare_exchange(
                NO_OWNER,
                current_thread_token().get(),
                Ordering::Acquire,
                Ordering::Relaxed,
            )
            .is_ok()
    }

    unsafe fn unlock(&self) {
        if self.owner.load(Ordering::Relaxed) != current_thread_token().get() {
            fatal("Spin lock released by a thread that does not own it");
        }

        self.owner.store(NO_OWNER, Ordering::Release);
    }

    fn is_locked(&self) -> bool {
        self.owner.load(Ordering::Relaxed) != NO_OWNER
    }
}

impl Drop for RawSpinLock {
    fn drop(&mut self) {
        if *self.owner.get_mut() != NO_OWNER && !std::thread::panicking() {
            fatal("Spin lock is locked while destructed");
        }
    }
}

impl fmt::Debug for RawSpinLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawSpinLock")
            .field("locked", &self.is_locked())
            .finish()
    }
}
