use crate::error::{Error, Result};
use crate::gate::Wait;
use crate::managed_handle::ManagedHandle;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

/// The state of the close being driven.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Close has not been initiated by this future yet.
    Initial,
    /// Close has been initiated, waiting for leases to be released.
    Waiting,
    /// Close is completed.
    Complete,
}

/// A future closing a [ManagedHandle] asynchronously.
///
/// Constructed through [ManagedHandle::close_async]. Like all futures it does
/// nothing until polled. Once it has resolved, polling it again returns
/// [Poll::Pending] forever.
///
/// # Examples
///
/// ```
/// use native_handle::ManagedHandle;
///
/// # #[tokio::main] async fn main() -> native_handle::Result<()> {
/// let session = ManagedHandle::new("Session", 0xcafe, |_| Ok::<_, std::io::Error>(()))?;
/// session.close_async().await?;
/// assert!(session.is_released());
/// # Ok(()) }
/// ```
#[must_use = "futures do nothing unless you `.await` or poll them"]
pub struct Close<'a> {
    handle: &'a ManagedHandle,
    state: State,
}

impl<'a> Close<'a> {
    pub(crate) fn new(handle: &'a ManagedHandle) -> Self {
        Self {
            handle,
            state: State::Initial,
        }
    }
}

impl Future for Close<'_> {
    type Output = Result<()>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();

        loop {
            match this.state {
                State::Initial => match this.handle.begin_close() {
                    Some(..) => {
                        this.state = State::Waiting;
                    }
                    None => {
                        this.state = State::Complete;
                        return Poll::Ready(Ok(()));
                    }
                },
                State::Waiting => {
                    let wait = match this.handle.poll_drained(cx.waker()) {
                        Poll::Ready(wait) => wait,
                        Poll::Pending => return Poll::Pending,
                    };

                    this.state = State::Complete;

                    return Poll::Ready(match wait {
                        Wait::Drained => this.handle.release(),
                        Wait::Interrupted(outstanding) => {
                            warn!(handle = %this.handle, outstanding, "close interrupted, native resource leaked");

                            Err(Error::CloseInterrupted {
                                kind: this.handle.kind(),
                                outstanding,
                            })
                        }
                    });
                }
                State::Complete => return Poll::Pending,
            }
        }
    }
}

impl fmt::Debug for Close<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Close")
            .field("handle", &self.handle)
            .field("state", &self.state)
            .finish()
    }
}

impl Drop for Close<'_> {
    fn drop(&mut self) {
        if let State::Waiting = self.state {
            warn!(handle = %self.handle, outstanding = self.handle.outstanding(), "close cancelled, native resource leaked");
        }
    }
}
