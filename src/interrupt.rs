use crate::gate::Gate;
use std::fmt;
use std::sync::Arc;

/// Cancels a close which is waiting for leases to be released.
///
/// Constructed through [ManagedHandle::interrupter][crate::ManagedHandle::interrupter].
/// It can be cloned and sent to other threads, and it may outlive the object
/// it was constructed from.
///
/// Interruption is sticky: once interrupted, any close of the same object
/// which has to wait fails immediately. A close which finds no outstanding
/// leases is unaffected.
///
/// An interrupted close leaks the native resource. See
/// [ManagedHandle::close][crate::ManagedHandle::close].
#[derive(Clone)]
pub struct Interrupter {
    gate: Arc<Gate>,
}

impl Interrupter {
    pub(crate) fn new(gate: Arc<Gate>) -> Self {
        Self { gate }
    }

    /// Interrupt the close.
    pub fn interrupt(&self) {
        debug!("interrupting close");
        self.gate.interrupt();
    }

    /// Test if this has been interrupted.
    pub fn is_interrupted(&self) -> bool {
        self.gate.is_interrupted()
    }
}

impl fmt::Debug for Interrupter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Interrupter")
            .field("interrupted", &self.is_interrupted())
            .finish()
    }
}
