use native_handle::ManagedHandle;
use std::thread;
use std::time::Duration;

fn main() -> native_handle::Result<()> {
    native_handle_demos::init_logging("trace");

    let mut it = std::env::args();
    it.next();

    let workers = match it.next() {
        Some(workers) => workers.parse::<usize>().unwrap_or(4),
        None => 4,
    };

    let session = ManagedHandle::new("Session", 0xcafe, |handle| {
        tracing::info!(handle = format_args!("{:#x}", handle), "freeing native session");
        Ok::<_, std::io::Error>(())
    })?;

    thread::scope(|s| {
        for worker in 0..workers {
            let session = &session;

            thread::Builder::new()
                .name(format!("worker-{}", worker))
                .spawn_scoped(s, move || {
                    let mut calls = 0usize;

                    while let Ok(lease) = session.lease() {
                        // Stand-in for a native call consuming the handle.
                        thread::sleep(Duration::from_millis(1));
                        debug_assert_eq!(lease.handle(), 0xcafe);
                        calls += 1;
                    }

                    tracing::info!(worker, calls, "worker done");
                })
                .expect("failed to spawn worker");
        }

        thread::sleep(Duration::from_millis(10));
        session.close()
    })?;

    tracing::info!(session = %session, released = session.is_released(), "closed");
    Ok(())
}
