use crate::state::State;
use crate::RawHandle;
use futures::task::AtomicWaker;
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::error;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::Waker;
use std::time::Instant;

/// The error type a release hook reports.
pub type ReleaseError = Box<dyn error::Error + Send + Sync>;

/// A release hook which frees the native resource behind a handle.
pub(crate) type ReleaseFn = Box<dyn FnOnce(RawHandle) -> Result<(), ReleaseError> + Send>;

/// The outcome of waiting for the use count to drain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Wait {
    /// All usages have been given back.
    Drained,
    /// The wait was interrupted, or its deadline passed, with the given
    /// number of usages still outstanding.
    Interrupted(usize),
}

/// The gate used to sequence close and to block the closer until every lease
/// has been released.
///
/// The mutex guards the release hook, which is taken out exactly once by
/// whoever completes the close.
pub(crate) struct Gate {
    release: Mutex<Option<ReleaseFn>>,
    condvar: Condvar,
    /// Sticky flag set through an interrupter.
    interrupted: AtomicBool,
    /// Waker for an asynchronous closer.
    waker: AtomicWaker,
}

impl Gate {
    pub(crate) fn new(release: Option<ReleaseFn>) -> Self {
        Self {
            release: Mutex::new(release),
            condvar: Condvar::new(),
            interrupted: AtomicBool::new(false),
            waker: AtomicWaker::new(),
        }
    }

    /// Enter the gate.
    pub(crate) fn enter(&self) -> MutexGuard<'_, Option<ReleaseFn>> {
        self.release.lock()
    }

    /// Wait while holding the gate until the use count in `state` reaches
    /// zero, the gate is interrupted, or `deadline` passes.
    ///
    /// The gate is released while waiting and reacquired before returning.
    pub(crate) fn wait(
        &self,
        guard: &mut MutexGuard<'_, Option<ReleaseFn>>,
        state: &State,
        deadline: Option<Instant>,
    ) -> Wait {
        loop {
            let count = state.load().count();

            if count == 0 {
                return Wait::Drained;
            }

            if self.is_interrupted() {
                return Wait::Interrupted(count);
            }

            match deadline {
                Some(deadline) => {
                    if self.condvar.wait_until(guard, deadline).timed_out() {
                        let count = state.load().count();

                        if count == 0 {
                            return Wait::Drained;
                        }

                        return Wait::Interrupted(count);
                    }
                }
                None => {
                    self.condvar.wait(guard);
                }
            }
        }
    }

    /// Register the waker of an asynchronous closer.
    pub(crate) fn register(&self, waker: &Waker) {
        self.waker.register(waker);
    }

    /// Wake anyone waiting in the gate.
    ///
    /// The gate is entered before notifying so that a closer which has
    /// checked the count but not yet started waiting can't miss the wakeup.
    pub(crate) fn notify(&self) {
        {
            let _guard = self.release.lock();
            self.condvar.notify_all();
        }

        self.waker.wake();
    }

    /// Interrupt any current or future wait in the gate.
    pub(crate) fn interrupt(&self) {
        self.interrupted.store(true, Ordering::Release);
        self.notify();
    }

    /// Test if the gate has been interrupted.
    pub(crate) fn is_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::Acquire)
    }
}
