use native_handle::{Error, ManagedHandle};
use std::convert::Infallible;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

const TRIALS: usize = 10_000;

/// Shared observations for a single trial.
#[derive(Default)]
struct Trial {
    released: AtomicUsize,
    active: AtomicUsize,
    hooked: AtomicBool,
}

#[test]
fn test_lease_races_close() {
    let mut leased = 0;
    let mut refused = 0;

    for n in 0..TRIALS {
        let trial = Arc::new(Trial::default());
        let t = trial.clone();
        let raw = 0x1000 + n as u64;

        let handle = ManagedHandle::new("Session", raw, move |handle| {
            assert_eq!(handle, raw);
            assert_eq!(t.active.load(Ordering::SeqCst), 0, "released with an active lease");
            t.hooked.store(true, Ordering::SeqCst);
            t.released.fetch_add(1, Ordering::SeqCst);
            Ok::<_, Infallible>(())
        })
        .unwrap();

        let outcome = thread::scope(|s| {
            let leaser = s.spawn(|| match handle.lease() {
                Ok(lease) => {
                    trial.active.fetch_add(1, Ordering::SeqCst);
                    assert!(!trial.hooked.load(Ordering::SeqCst));
                    assert_eq!(lease.handle(), raw);
                    trial.active.fetch_sub(1, Ordering::SeqCst);
                    drop(lease);
                    true
                }
                Err(Error::AlreadyClosed { .. }) => false,
                Err(error) => panic!("unexpected error: {}", error),
            });

            handle.close().unwrap();
            leaser.join().unwrap()
        });

        if outcome {
            leased += 1;
        } else {
            refused += 1;
        }

        assert_eq!(trial.released.load(Ordering::SeqCst), 1, "trial {}", n);
        assert!(handle.is_released());
    }

    assert_eq!(leased + refused, TRIALS);
}

#[test]
fn test_many_leasers_one_closer() {
    let released = Arc::new(AtomicUsize::new(0));
    let r = released.clone();

    let handle = ManagedHandle::new("Session", 0xcafe, move |_| {
        r.fetch_add(1, Ordering::SeqCst);
        Ok::<_, Infallible>(())
    })
    .unwrap();

    thread::scope(|s| {
        for _ in 0..8 {
            s.spawn(|| {
                while let Ok(lease) = handle.lease() {
                    assert_eq!(lease.handle(), 0xcafe);
                    assert_eq!(released.load(Ordering::SeqCst), 0);
                }
            });
        }

        thread::yield_now();
        handle.close().unwrap();
    });

    assert_eq!(released.load(Ordering::SeqCst), 1);
    assert_eq!(handle.outstanding(), 0);
}

#[test]
fn test_concurrent_closers() {
    let released = Arc::new(AtomicUsize::new(0));
    let r = released.clone();

    let handle = ManagedHandle::new("Session", 0xbeef, move |_| {
        r.fetch_add(1, Ordering::SeqCst);
        Ok::<_, Infallible>(())
    })
    .unwrap();

    let lease = handle.lease().unwrap();

    thread::scope(|s| {
        let closers = (0..4).map(|_| s.spawn(|| handle.close())).collect::<Vec<_>>();

        while !handle.is_closed() {
            thread::yield_now();
        }

        drop(lease);

        for closer in closers {
            closer.join().unwrap().unwrap();
        }
    });

    assert_eq!(released.load(Ordering::SeqCst), 1);
}
