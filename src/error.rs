use std::error;
use std::result;

/// The error type produced by this crate.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The object was used after close was initiated.
    ///
    /// This indicates a bug in the caller.
    #[error("{kind} has been closed already")]
    AlreadyClosed {
        /// The kind of the object.
        kind: &'static str,
    },
    /// The wait inside of close was interrupted while leases were still
    /// outstanding.
    ///
    /// The object is left closed, but the native resource has *not* been
    /// released and is leaked.
    #[error("close of {kind} interrupted with {outstanding} outstanding lease(s)")]
    CloseInterrupted {
        /// The kind of the object.
        kind: &'static str,
        /// The number of leases outstanding at the time of interruption.
        outstanding: usize,
    },
    /// The release hook reported a failure. The object is considered closed
    /// regardless.
    #[error("releasing {kind} failed")]
    ReleaseFailed {
        /// The kind of the object.
        kind: &'static str,
        /// The error reported by the release hook.
        #[source]
        source: Box<dyn error::Error + Send + Sync>,
    },
    /// A managed object was constructed over the reserved null handle.
    #[error("{kind} cannot manage the null handle")]
    NullHandle {
        /// The kind of the object.
        kind: &'static str,
    },
}

/// Result alias using [Error].
pub type Result<T, E = Error> = result::Result<T, E>;
