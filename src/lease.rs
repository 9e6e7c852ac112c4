use crate::error::Result;
use crate::managed_handle::ManagedHandle;
use crate::RawHandle;
use std::fmt;

/// Types which own a [ManagedHandle].
///
/// Objects which wrap a native handle keep their own state alongside a
/// [ManagedHandle] and implement this trait to expose it, which allows them
/// to be leased through [optional_lease].
///
/// # Examples
///
/// ```
/// use native_handle::{ManagedHandle, Native};
///
/// struct Session {
///     handle: ManagedHandle,
///     name: String,
/// }
///
/// impl Native for Session {
///     fn native(&self) -> &ManagedHandle {
///         &self.handle
///     }
/// }
///
/// # fn main() -> native_handle::Result<()> {
/// let session = Session {
///     handle: ManagedHandle::new("Session", 0xcafe, |_| Ok::<_, std::io::Error>(()))?,
///     name: String::from("default"),
/// };
///
/// let lease = native_handle::optional_lease(Some(&session))?;
/// assert_eq!(lease.handle(), 0xcafe);
/// # Ok(()) }
/// ```
pub trait Native {
    /// Access the managed handle of this object.
    fn native(&self) -> &ManagedHandle;
}

impl Native for ManagedHandle {
    fn native(&self) -> &ManagedHandle {
        self
    }
}

/// Take a lease over an optional object.
///
/// If `object` is `None` this returns a [null lease][HandleLease::null],
/// which is used to pass "no object" to a native call. Otherwise this is the
/// same as [ManagedHandle::lease].
///
/// ```
/// use native_handle::ManagedHandle;
///
/// # fn main() -> native_handle::Result<()> {
/// let lease = native_handle::optional_lease::<ManagedHandle>(None)?;
/// assert!(lease.is_null());
/// assert_eq!(lease.handle(), 0);
/// # Ok(()) }
/// ```
pub fn optional_lease<T>(object: Option<&T>) -> Result<HandleLease<'_>>
where
    T: ?Sized + Native,
{
    match object {
        Some(object) => object.native().lease(),
        None => Ok(HandleLease::null()),
    }
}

/// A scoped lease over the handle of a [ManagedHandle].
///
/// While the lease is alive the handle is guaranteed to stay valid, and any
/// close of the owning object waits for the lease to be released. The lease
/// is released when dropped or through [release][HandleLease::release].
///
/// A lease is the only way to get at the raw handle of a managed object:
///
/// ```compile_fail
/// use native_handle::ManagedHandle;
///
/// let session = ManagedHandle::new("Session", 0xcafe, |_| Ok::<_, std::io::Error>(())).unwrap();
/// session.close().unwrap();
/// let _ = session.raw();
/// ```
pub struct HandleLease<'a> {
    owner: Option<&'a ManagedHandle>,
}

impl<'a> HandleLease<'a> {
    /// Construct a lease over a usage already taken from `owner`.
    pub(crate) fn new(owner: &'a ManagedHandle) -> Self {
        Self { owner: Some(owner) }
    }

    /// Construct a null lease, whose handle is `0` and whose release does
    /// nothing.
    pub const fn null() -> Self {
        Self { owner: None }
    }

    /// Test if this is a null lease.
    pub fn is_null(&self) -> bool {
        self.owner.is_none()
    }

    /// The leased handle, or `0` for a null lease.
    pub fn handle(&self) -> RawHandle {
        match self.owner {
            Some(owner) => owner.raw(),
            None => 0,
        }
    }

    /// Release the lease.
    ///
    /// This is the same as dropping it.
    pub fn release(self) {
        drop(self);
    }
}

impl fmt::Debug for HandleLease<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.owner {
            Some(owner) => f.debug_tuple("HandleLease").field(&owner.description()).finish(),
            None => f.debug_tuple("HandleLease").field(&"null").finish(),
        }
    }
}

impl Drop for HandleLease<'_> {
    fn drop(&mut self) {
        if let Some(owner) = self.owner.take() {
            owner.give_back();
        }
    }
}
