use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Bit set once close has been initiated.
const CLOSED: usize = 1 << (usize::BITS - 1);
/// Mask for the use count, which includes the owner count while open.
const COUNT: usize = !CLOSED;

/// The lifecycle state of a managed object, packed into a single atomic
/// word.
///
/// The word holds two things:
///
/// * The high bit, which is set once close has been initiated and never
///   cleared.
/// * The remaining bits, which hold the use count. The count starts at `1`
///   for the owner, is incremented once per lease and decremented once per
///   released lease. The owner count is consumed by close.
///
/// Packing both into one word means the check for closed and the increment
/// of a lease is a single atomic step, so a lease can never be granted after
/// close has observed the count.
pub(crate) struct State {
    word: AtomicUsize,
}

impl State {
    /// Construct a new open state holding the owner count.
    pub(crate) const fn new() -> Self {
        Self {
            word: AtomicUsize::new(1),
        }
    }

    /// Construct a state from a raw word.
    #[cfg(test)]
    const fn from_word(word: usize) -> Self {
        Self {
            word: AtomicUsize::new(word),
        }
    }

    /// Load a snapshot of the current state.
    pub(crate) fn load(&self) -> Snapshot {
        Snapshot(self.word.load(Ordering::Acquire))
    }

    /// Try to take one usage of the object, returning the use count after
    /// acquiring it.
    ///
    /// Fails without modifying the state if close has been initiated.
    pub(crate) fn acquire(&self) -> Option<usize> {
        let mut current = self.word.load(Ordering::Relaxed);

        loop {
            if current & CLOSED != 0 {
                return None;
            }

            let count = current & COUNT;

            // This many live leases can only be the result of leaked leases.
            if count == COUNT {
                panic!("lease count overflow");
            }

            match self.word.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(..) => return Some(count + 1),
                Err(actual) => current = actual,
            }
        }
    }

    /// Give back one usage of the object, returning the state after the
    /// decrement.
    pub(crate) fn release(&self) -> Snapshot {
        let previous = self.word.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(previous & COUNT != 0, "use count underflow");
        Snapshot(previous - 1)
    }

    /// Mark the state as closed and give back the owner count in one step.
    ///
    /// Returns the remaining use count if this call initiated close, or
    /// `None` if close was already initiated by someone else.
    pub(crate) fn close(&self) -> Option<usize> {
        let mut current = self.word.load(Ordering::Relaxed);

        loop {
            if current & CLOSED != 0 {
                return None;
            }

            debug_assert!(current & COUNT != 0, "owner count missing");
            let next = (current - 1) | CLOSED;

            match self.word.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(..) => return Some(next & COUNT),
                Err(actual) => current = actual,
            }
        }
    }
}

impl fmt::Debug for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.load().fmt(f)
    }
}

/// A snapshot of [State].
#[derive(Clone, Copy, PartialEq, Eq)]
pub(crate) struct Snapshot(usize);

impl Snapshot {
    /// Test if close has been initiated.
    pub(crate) fn is_closed(self) -> bool {
        self.0 & CLOSED != 0
    }

    /// The use count.
    pub(crate) fn count(self) -> usize {
        self.0 & COUNT
    }

    /// Number of leases alive, which excludes the owner count while open.
    pub(crate) fn leases(self) -> usize {
        if self.is_closed() {
            self.count()
        } else {
            self.count().saturating_sub(1)
        }
    }
}

impl fmt::Debug for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("State")
            .field("closed", &self.is_closed())
            .field("count", &self.count())
            .finish()
    }
}
