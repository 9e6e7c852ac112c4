use crate::close::Close;
use crate::error::{Error, Result};
use crate::gate::{Gate, ReleaseError, ReleaseFn, Wait};
use crate::interrupt::Interrupter;
use crate::lease::HandleLease;
use crate::state::State;
use crate::RawHandle;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Poll, Waker};
use std::time::{Duration, Instant};

/// The kind used when none has been specified.
const DEFAULT_KIND: &str = "ManagedHandle";

/// Owner of a single handle into a native library.
///
/// A managed handle guarantees that the release hook it was constructed with
/// is called exactly once, and that it is only called once every
/// [HandleLease] taken over the handle has been released.
///
/// Leases are taken with [lease][ManagedHandle::lease] around each native
/// call that consumes the handle. Closing the handle through
/// [close][ManagedHandle::close] prevents any new leases from being taken,
/// blocks until the outstanding ones have been released and then calls the
/// release hook.
///
/// Dropping a managed handle which hasn't been closed closes it.
///
/// # Examples
///
/// ```
/// use native_handle::ManagedHandle;
///
/// # fn main() -> native_handle::Result<()> {
/// let session = ManagedHandle::new("Session", 0xcafe, |handle| {
///     assert_eq!(handle, 0xcafe);
///     Ok::<_, std::io::Error>(())
/// })?;
///
/// {
///     let lease = session.lease()?;
///     assert_eq!(lease.handle(), 0xcafe);
/// }
///
/// session.close()?;
/// assert!(session.is_closed());
/// assert!(session.lease().is_err());
/// # Ok(()) }
/// ```
pub struct ManagedHandle {
    kind: &'static str,
    handle: RawHandle,
    state: State,
    gate: Arc<Gate>,
    released: AtomicBool,
}

impl ManagedHandle {
    /// Construct a managed handle of the given `kind` over an already opened
    /// native `handle`.
    ///
    /// The `release` hook is called with the handle exactly once, when the
    /// handle is closed or dropped. It's called with the gate held, so it
    /// must not take leases over or close the same object.
    ///
    /// Construction doesn't call into the native library.
    ///
    /// # Errors
    ///
    /// Errors with [Error::NullHandle] if `handle` is `0`, since that value
    /// is reserved for [null leases][HandleLease::null].
    pub fn new<F, E>(kind: &'static str, handle: RawHandle, release: F) -> Result<Self>
    where
        F: 'static + Send + FnOnce(RawHandle) -> Result<(), E>,
        E: Into<ReleaseError>,
    {
        Self::builder(handle).kind(kind).release(release).build()
    }

    /// Construct a [Builder] for a managed handle over `handle`.
    pub fn builder(handle: RawHandle) -> Builder {
        Builder {
            handle,
            kind: DEFAULT_KIND,
            release: None,
        }
    }

    /// The kind of object this handle is managed as.
    pub fn kind(&self) -> &'static str {
        self.kind
    }

    /// Access the raw handle without leasing it.
    ///
    /// Only leases hand the handle out, since nothing here prevents it from
    /// being released concurrently.
    pub(crate) fn raw(&self) -> RawHandle {
        self.handle
    }

    /// A human-readable description of this object, consisting of its kind
    /// and its handle in hex.
    ///
    /// This is safe to call at any time, including after close.
    ///
    /// ```
    /// use native_handle::ManagedHandle;
    ///
    /// # fn main() -> native_handle::Result<()> {
    /// let session = ManagedHandle::new("Session", 0xcafe, |_| Ok::<_, std::io::Error>(()))?;
    /// assert_eq!(session.description(), "Session@cafe");
    /// # Ok(()) }
    /// ```
    pub fn description(&self) -> String {
        self.to_string()
    }

    /// Check if close has been initiated.
    ///
    /// Once this returns `true` it always will.
    pub fn is_closed(&self) -> bool {
        self.state.load().is_closed()
    }

    /// Check if the release hook has been called.
    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    /// The number of leases currently outstanding.
    pub fn outstanding(&self) -> usize {
        self.state.load().leases()
    }

    /// Error with [Error::AlreadyClosed] if close has been initiated.
    pub fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(Error::AlreadyClosed { kind: self.kind });
        }

        Ok(())
    }

    /// Take a lease over the handle, exposing it for the duration of a
    /// native call.
    ///
    /// The handle is guaranteed to remain valid until the returned lease is
    /// released, even if close is initiated in the meantime.
    ///
    /// Note that calling [close][ManagedHandle::close] on the same thread
    /// which holds a lease deadlocks.
    ///
    /// # Errors
    ///
    /// Errors with [Error::AlreadyClosed] if close has been initiated.
    pub fn lease(&self) -> Result<HandleLease<'_>> {
        match self.state.acquire() {
            Some(_count) => {
                trace!(handle = %self, count = _count, "leased");
                Ok(HandleLease::new(self))
            }
            None => Err(Error::AlreadyClosed { kind: self.kind }),
        }
    }

    /// Construct an [Interrupter] which can cancel a close which is waiting
    /// for leases to be released.
    pub fn interrupter(&self) -> Interrupter {
        Interrupter::new(self.gate.clone())
    }

    /// Close the handle.
    ///
    /// The first call prevents any new leases from being taken, blocks until
    /// every outstanding lease has been released and calls the release hook.
    /// Any subsequent calls return immediately without effect, even if the
    /// first one is still waiting.
    ///
    /// # Interruption
    ///
    /// If the wait is cancelled through an [Interrupter], this returns
    /// [Error::CloseInterrupted] and the object is left *closed but not
    /// released*: no new leases can be taken and the release hook is never
    /// called, so the native resource leaks. Callers which can't tolerate
    /// the leak must not interrupt close.
    ///
    /// # Errors
    ///
    /// * [Error::CloseInterrupted] if the wait was interrupted.
    /// * [Error::ReleaseFailed] if the release hook failed. The object is
    ///   considered closed regardless.
    pub fn close(&self) -> Result<()> {
        self.close_with_deadline(None)
    }

    /// Close the handle, giving up on waiting for outstanding leases after
    /// `timeout`.
    ///
    /// Giving up has the same outcome as [interruption][Self::close]: the
    /// object is left closed without being released.
    pub fn close_timeout(&self, timeout: Duration) -> Result<()> {
        self.close_with_deadline(Instant::now().checked_add(timeout))
    }

    /// Close the handle asynchronously.
    ///
    /// The returned future waits for outstanding leases without blocking the
    /// current thread. Interrupting it has the same outcome as
    /// [interrupting close][Self::close]. Dropping it while it's waiting is
    /// treated the same as an interruption and leaks the native resource.
    pub fn close_async(&self) -> Close<'_> {
        Close::new(self)
    }

    fn close_with_deadline(&self, deadline: Option<Instant>) -> Result<()> {
        let mut guard = self.gate.enter();

        let remaining = match self.state.close() {
            Some(remaining) => remaining,
            None => {
                trace!(handle = %self, "already closed");
                return Ok(());
            }
        };

        debug!(handle = %self, outstanding = remaining, "closing");

        if remaining > 0 {
            if let Wait::Interrupted(outstanding) =
                self.gate.wait(&mut guard, &self.state, deadline)
            {
                warn!(handle = %self, outstanding, "close interrupted, native resource leaked");

                return Err(Error::CloseInterrupted {
                    kind: self.kind,
                    outstanding,
                });
            }
        }

        self.release_locked(&mut guard)
    }

    /// Prepare to close asynchronously, returning the number of leases which
    /// are outstanding or `None` if close was already initiated.
    pub(crate) fn begin_close(&self) -> Option<usize> {
        let _guard = self.gate.enter();
        let remaining = self.state.close()?;
        debug!(handle = %self, outstanding = remaining, "closing");
        Some(remaining)
    }

    /// Poll whether all leases have been released after close was initiated
    /// through [begin_close][Self::begin_close].
    pub(crate) fn poll_drained(&self, waker: &Waker) -> Poll<Wait> {
        self.gate.register(waker);

        let count = self.state.load().count();

        if count == 0 {
            return Poll::Ready(Wait::Drained);
        }

        if self.gate.is_interrupted() {
            return Poll::Ready(Wait::Interrupted(count));
        }

        Poll::Pending
    }

    /// Enter the gate and call the release hook.
    pub(crate) fn release(&self) -> Result<()> {
        let mut guard = self.gate.enter();
        self.release_locked(&mut guard)
    }

    /// Call the release hook with the gate held.
    fn release_locked(&self, slot: &mut Option<ReleaseFn>) -> Result<()> {
        let result = match slot.take() {
            Some(release) => release(self.handle),
            None => Ok(()),
        };

        self.released.store(true, Ordering::Release);
        debug!(handle = %self, ok = result.is_ok(), "released");

        result.map_err(|source| Error::ReleaseFailed {
            kind: self.kind,
            source,
        })
    }

    /// Give back a usage taken through [lease][Self::lease].
    pub(crate) fn give_back(&self) {
        let state = self.state.release();
        trace!(handle = %self, count = state.count(), "lease released");

        // The owner count keeps this above zero until close, so reaching
        // zero means a closer might be waiting on us.
        if state.count() == 0 {
            self.gate.notify();
        }
    }
}

impl fmt::Display for ManagedHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{:x}", self.kind, self.handle)
    }
}

impl fmt::Debug for ManagedHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManagedHandle")
            .field("kind", &self.kind)
            .field("handle", &format_args!("{:#x}", self.handle))
            .field("state", &self.state)
            .field("released", &self.is_released())
            .finish()
    }
}

impl Drop for ManagedHandle {
    fn drop(&mut self) {
        let mut guard = self.gate.enter();

        let remaining = match self.state.close() {
            Some(remaining) => remaining,
            None => return,
        };

        // Leases borrow the handle, so the only way for any to be outstanding
        // here is if they were forgotten. Waiting would block forever.
        if remaining > 0 {
            warn!(handle = %self, outstanding = remaining, "dropped with leaked leases, native resource leaked");
            return;
        }

        if let Err(_error) = self.release_locked(&mut guard) {
            warn!(handle = %self, error = %_error, "release failed during drop");
        }
    }
}

/// A builder for a [ManagedHandle].
///
/// Constructed through [ManagedHandle::builder].
///
/// # Examples
///
/// ```
/// use native_handle::ManagedHandle;
///
/// # fn main() -> native_handle::Result<()> {
/// let tensor = ManagedHandle::builder(0x1000)
///     .kind("Tensor")
///     .release(|_| Ok::<_, std::io::Error>(()))
///     .build()?;
///
/// assert_eq!(tensor.to_string(), "Tensor@1000");
/// # Ok(()) }
/// ```
pub struct Builder {
    handle: RawHandle,
    kind: &'static str,
    release: Option<ReleaseFn>,
}

impl Builder {
    /// Set the kind of object being managed, used in descriptions and
    /// errors.
    pub fn kind(self, kind: &'static str) -> Self {
        Self { kind, ..self }
    }

    /// Set the hook which releases the native resource.
    ///
    /// Without one, releasing the handle does nothing.
    pub fn release<F, E>(self, release: F) -> Self
    where
        F: 'static + Send + FnOnce(RawHandle) -> Result<(), E>,
        E: Into<ReleaseError>,
    {
        let release: ReleaseFn = Box::new(move |handle: RawHandle| -> Result<(), ReleaseError> {
            release(handle).map_err(Into::into)
        });

        Self {
            release: Some(release),
            ..self
        }
    }

    /// Build the [ManagedHandle].
    ///
    /// # Errors
    ///
    /// Errors with [Error::NullHandle] if the handle is `0`.
    pub fn build(self) -> Result<ManagedHandle> {
        if self.handle == 0 {
            return Err(Error::NullHandle { kind: self.kind });
        }

        Ok(ManagedHandle {
            kind: self.kind,
            handle: self.handle,
            state: State::new(),
            gate: Arc::new(Gate::new(self.release)),
            released: AtomicBool::new(false),
        })
    }
}

impl fmt::Debug for Builder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Builder")
            .field("kind", &self.kind)
            .field("handle", &format_args!("{:#x}", self.handle))
            .field("release", &self.release.is_some())
            .finish()
    }
}
