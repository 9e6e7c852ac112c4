use native_handle::{optional_lease, Error, ManagedHandle, Native, RawHandle};
use std::convert::Infallible;
use std::io;
use std::mem;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

/// Construct a handle which records each call to its release hook.
fn recorded(kind: &'static str, raw: RawHandle) -> (ManagedHandle, Arc<Mutex<Vec<RawHandle>>>) {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let c = calls.clone();

    let handle = ManagedHandle::new(kind, raw, move |handle| {
        c.lock().unwrap().push(handle);
        Ok::<_, Infallible>(())
    })
    .unwrap();

    (handle, calls)
}

#[test]
fn test_simple_lifecycle() {
    let (handle, calls) = recorded("Session", 0xcafe);
    assert!(!handle.is_closed());
    assert!(handle.ensure_open().is_ok());

    handle.close().unwrap();

    assert_eq!(*calls.lock().unwrap(), [0xcafe]);
    assert!(handle.is_closed());
    assert!(handle.is_released());
}

#[test]
fn test_lease_during_work() {
    let (handle, calls) = recorded("Tensor", 0x1000);

    let lease = handle.lease().unwrap();
    assert_eq!(lease.handle(), 0x1000);
    assert!(!lease.is_null());
    lease.release();

    handle.close().unwrap();
    assert_eq!(*calls.lock().unwrap(), [0x1000]);
}

#[test]
fn test_close_blocks_on_outstanding_lease() {
    let (handle, calls) = recorded("Session", 0x2000);
    let lease = handle.lease().unwrap();

    thread::scope(|s| {
        let closer = s.spawn(|| handle.close());

        while !handle.is_closed() {
            thread::yield_now();
        }

        // The closer is now waiting on the lease.
        thread::sleep(Duration::from_millis(50));
        assert!(calls.lock().unwrap().is_empty());
        assert!(!handle.is_released());
        assert_eq!(lease.handle(), 0x2000);

        lease.release();
        closer.join().unwrap().unwrap();
    });

    assert_eq!(*calls.lock().unwrap(), [0x2000]);
}

#[test]
fn test_double_close() {
    let (handle, calls) = recorded("Session", 0x3000);
    handle.close().unwrap();
    handle.close().unwrap();
    handle.close().unwrap();
    assert_eq!(*calls.lock().unwrap(), [0x3000]);
}

#[test]
fn test_lease_after_close() {
    let (handle, _) = recorded("Session", 0x4000);
    handle.close().unwrap();

    assert!(handle.is_closed());
    assert!(matches!(handle.lease(), Err(Error::AlreadyClosed { kind: "Session" })));
    assert!(matches!(handle.ensure_open(), Err(Error::AlreadyClosed { .. })));
    assert_eq!(
        handle.ensure_open().unwrap_err().to_string(),
        "Session has been closed already"
    );
}

#[test]
fn test_lease_survives_close_initiation() {
    let (handle, calls) = recorded("Session", 0x5000);
    let lease = handle.lease().unwrap();

    thread::scope(|s| {
        let closer = s.spawn(|| handle.close());

        while !handle.is_closed() {
            thread::yield_now();
        }

        assert_eq!(lease.handle(), 0x5000);
        assert_eq!(handle.outstanding(), 1);
        assert!(handle.lease().is_err());
        drop(lease);

        closer.join().unwrap().unwrap();
    });

    assert_eq!(*calls.lock().unwrap(), [0x5000]);
}

#[test]
fn test_null_lease() {
    let (handle, _) = recorded("Session", 0x6000);

    let lease = optional_lease::<ManagedHandle>(None).unwrap();
    assert!(lease.is_null());
    assert_eq!(lease.handle(), 0);
    lease.release();

    assert_eq!(handle.outstanding(), 0);
    handle.close().unwrap();

    // Null leases don't care about closed objects.
    let lease = optional_lease::<ManagedHandle>(None).unwrap();
    assert_eq!(lease.handle(), 0);
}

#[test]
fn test_optional_lease_over_composed_object() {
    struct Session {
        handle: ManagedHandle,
        name: &'static str,
    }

    impl Native for Session {
        fn native(&self) -> &ManagedHandle {
            &self.handle
        }
    }

    let (handle, calls) = recorded("Session", 0x7000);
    let session = Session {
        handle,
        name: "default",
    };

    {
        let lease = optional_lease(Some(&session)).unwrap();
        assert_eq!(lease.handle(), 0x7000);
        assert_eq!(session.handle.outstanding(), 1);
        assert_eq!(session.name, "default");
    }

    session.handle.close().unwrap();
    assert_eq!(*calls.lock().unwrap(), [0x7000]);
}

#[test]
fn test_description() {
    let (handle, _) = recorded("Session", 0xcafe);
    assert_eq!(handle.description(), "Session@cafe");
    handle.close().unwrap();
    assert_eq!(handle.description(), "Session@cafe");

    let handle = ManagedHandle::builder(0xdead_beef).build().unwrap();
    assert_eq!(handle.to_string(), "ManagedHandle@deadbeef");
    assert_eq!(handle.kind(), "ManagedHandle");
    assert_eq!(handle.lease().unwrap().handle(), 0xdead_beef);
}

#[test]
fn test_null_handle_is_rejected() {
    let result = ManagedHandle::new("Session", 0, |_| Ok::<_, Infallible>(()));
    assert!(matches!(result, Err(Error::NullHandle { kind: "Session" })));
}

#[test]
fn test_release_failed() {
    let handle = ManagedHandle::new("Session", 0x8000, |_| {
        Err(io::Error::new(io::ErrorKind::Other, "native failure"))
    })
    .unwrap();

    let error = handle.close().unwrap_err();
    assert!(matches!(error, Error::ReleaseFailed { kind: "Session", .. }));
    assert_eq!(
        std::error::Error::source(&error).map(|e| e.to_string()),
        Some(String::from("native failure"))
    );

    // Considered closed regardless.
    assert!(handle.is_closed());
    assert!(handle.is_released());
    assert!(handle.close().is_ok());
}

#[test]
fn test_drop_closes() {
    let (handle, calls) = recorded("Session", 0x9000);

    {
        let _lease = handle.lease().unwrap();
    }

    drop(handle);
    assert_eq!(*calls.lock().unwrap(), [0x9000]);
}

#[test]
fn test_drop_after_close_releases_once() {
    let (handle, calls) = recorded("Session", 0xa000);
    handle.close().unwrap();
    drop(handle);
    assert_eq!(*calls.lock().unwrap(), [0xa000]);
}

#[test]
fn test_drop_with_forgotten_lease_leaks() {
    let (handle, calls) = recorded("Session", 0xb000);
    mem::forget(handle.lease().unwrap());

    // Must not block.
    drop(handle);
    assert!(calls.lock().unwrap().is_empty());
}
