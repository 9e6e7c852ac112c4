//! Lifecycle management for handles owned by a native library.
//!
//! A [ManagedHandle] owns a single integer handle into a native library and
//! guarantees two things at once, even under concurrent use:
//!
//! * The native resource is released exactly once, through a release hook
//!   provided when the handle is constructed.
//! * Nobody uses the handle after release has begun.
//!
//! Native calls take a scoped [HandleLease] over the handle for their
//! duration. Closing the handle prevents new leases from being taken, waits
//! for the outstanding ones to be released and then calls the release hook.
//!
//! ```
//! use native_handle::ManagedHandle;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use std::sync::Arc;
//!
//! # fn main() -> native_handle::Result<()> {
//! let released = Arc::new(AtomicUsize::new(0));
//! let r = released.clone();
//!
//! let session = ManagedHandle::new("Session", 0x1000, move |handle| {
//!     assert_eq!(handle, 0x1000);
//!     r.fetch_add(1, Ordering::SeqCst);
//!     Ok::<_, std::io::Error>(())
//! })?;
//!
//! std::thread::scope(|s| {
//!     s.spawn(|| {
//!         if let Ok(lease) = session.lease() {
//!             // hand `lease.handle()` to a native call.
//!             assert_eq!(lease.handle(), 0x1000);
//!         }
//!     });
//!
//!     session.close()
//! })?;
//!
//! assert_eq!(released.load(Ordering::SeqCst), 1);
//! # Ok(()) }
//! ```
//!
//! # Features
//!
//! * `tracing` - Emit diagnostics through the [tracing] crate.
//!
//! [tracing]: https://docs.rs/tracing

#[macro_use]
mod macros;

mod error;
pub use self::error::{Error, Result};

mod state;

mod gate;
pub use self::gate::ReleaseError;

mod interrupt;
pub use self::interrupt::Interrupter;

mod managed_handle;
pub use self::managed_handle::{Builder, ManagedHandle};

mod lease;
pub use self::lease::{optional_lease, HandleLease, Native};

mod close;
pub use self::close::Close;

/// An opaque handle into a native library, wide enough to hold a pointer.
///
/// The value `0` is reserved for [null leases][HandleLease::null] and is
/// never managed.
pub type RawHandle = u64;
