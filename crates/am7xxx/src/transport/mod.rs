//! USB transport abstraction
//!
//! The driver core never talks to libusb directly; it goes through the
//! [`UsbTransport`] and [`UsbHandle`] traits. The production backend
//! is [`RusbTransport`]; [`MockTransport`] provides a scriptable bus
//! for tests.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub mod mock;
pub mod rusb;

pub use self::mock::MockTransport;
pub use self::rusb::RusbTransport;

/// Transport-level error taxonomy
///
/// Maps the libusb error and transfer-status codes the driver cares
/// about; anything unrecognized lands in `Other`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// Transfer timed out
    #[error("transfer timed out")]
    Timeout,
    /// Endpoint stalled
    #[error("endpoint stalled")]
    Pipe,
    /// More data arrived than the buffer could take
    #[error("transfer overflow")]
    Overflow,
    /// Device was disconnected
    #[error("device is gone")]
    NoDevice,
    /// Device or entity not found
    #[error("entity not found")]
    NotFound,
    /// Resource busy
    #[error("resource busy")]
    Busy,
    /// Access denied
    #[error("access denied")]
    Access,
    /// Generic I/O error (also used for cancelled transfers)
    #[error("I/O error")]
    Io,
    /// Invalid parameter
    #[error("invalid parameter")]
    InvalidParam,
    /// Allocation failed inside the transport
    #[error("out of memory")]
    NoMem,
    /// A blocking call was interrupted by a signal
    #[error("interrupted")]
    Interrupted,
    /// Anything the taxonomy does not cover
    #[error("transport error: {0}")]
    Other(String),
}

/// Access to the USB subsystem: enumeration, opening and the event pump.
pub trait UsbTransport {
    /// Reference to a physical device seen during enumeration
    type DeviceRef;
    /// An open, usable device handle
    type Handle: UsbHandle;

    /// Snapshot of the currently attached devices, in bus order.
    fn list_devices(&self) -> Result<Vec<Self::DeviceRef>, TransportError>;

    /// Vendor/product IDs of a device, or `None` when the descriptor
    /// cannot be read.
    fn device_ids(&self, device: &Self::DeviceRef) -> Option<(u16, u16)>;

    /// Open a device for I/O.
    fn open(&self, device: &Self::DeviceRef) -> Result<Self::Handle, TransportError>;

    /// Process pending transport events, driving asynchronous transfer
    /// completions. Returns after `timeout` even if nothing happened.
    fn handle_events(&self, timeout: Duration) -> Result<(), TransportError>;
}

/// Operations on an open device handle.
///
/// Dropping a handle closes it; that is what makes the multi-step
/// session rollback a plain early return for the caller.
pub trait UsbHandle {
    fn active_configuration(&mut self) -> Result<u8, TransportError>;
    fn set_configuration(&mut self, configuration: u8) -> Result<(), TransportError>;
    fn set_auto_detach_kernel_driver(&mut self, enable: bool) -> Result<(), TransportError>;
    fn claim_interface(&mut self, interface: u8) -> Result<(), TransportError>;
    fn release_interface(&mut self, interface: u8) -> Result<(), TransportError>;

    /// Synchronous bulk read; returns the number of bytes received.
    fn read_bulk(&mut self, endpoint: u8, buf: &mut [u8]) -> Result<usize, TransportError>;

    /// Synchronous bulk write; returns the number of bytes sent.
    fn write_bulk(&mut self, endpoint: u8, data: &[u8]) -> Result<usize, TransportError>;

    /// Submit an asynchronous bulk OUT transfer and return immediately.
    ///
    /// The transport owns `data` from here on, so the caller's buffer
    /// is free for reuse as soon as this returns. Completion is only
    /// driven by [`UsbTransport::handle_events`].
    fn submit_bulk_out(
        &mut self,
        endpoint: u8,
        data: Vec<u8>,
    ) -> Result<PendingTransfer, TransportError>;
}

/// Completion state shared between a submitted transfer and its waiter.
///
/// The backend's completion callback records the outcome and flips the
/// flag; the waiter polls the flag while pumping events.
#[derive(Debug, Default)]
pub struct TransferState {
    completed: AtomicBool,
    error: Mutex<Option<TransportError>>,
}

impl TransferState {
    /// Record the outcome and mark the transfer complete.
    ///
    /// Idempotent: the first recorded error wins, later calls only
    /// re-assert the completion flag.
    pub fn finish(&self, result: Result<(), TransportError>) {
        if let Err(e) = result {
            let mut slot = self.error.lock().unwrap_or_else(|p| p.into_inner());
            if slot.is_none() {
                *slot = Some(e);
            }
        }
        self.completed.store(true, Ordering::Release);
    }

    pub fn is_complete(&self) -> bool {
        self.completed.load(Ordering::Acquire)
    }

    pub fn take_error(&self) -> Option<TransportError> {
        self.error
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .take()
    }
}

/// A single in-flight asynchronous transfer.
pub struct PendingTransfer {
    state: Arc<TransferState>,
    canceller: Option<Box<dyn FnMut()>>,
}

impl PendingTransfer {
    pub fn new(state: Arc<TransferState>, canceller: Box<dyn FnMut()>) -> Self {
        Self {
            state,
            canceller: Some(canceller),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.state.is_complete()
    }

    /// Ask the transport to cancel the transfer.
    ///
    /// Must only be called from the thread that pumps events, and only
    /// while the transfer is incomplete; completion still arrives
    /// through the event pump (with a cancelled status).
    pub fn cancel(&mut self) {
        if self.state.is_complete() {
            return;
        }
        if let Some(cancel) = self.canceller.as_mut() {
            cancel();
        }
    }

    /// The recorded completion error, if any. Clears it.
    pub fn take_error(&self) -> Option<TransportError> {
        self.state.take_error()
    }
}

impl std::fmt::Debug for PendingTransfer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingTransfer")
            .field("complete", &self.is_complete())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transfer_state_records_first_error() {
        let state = TransferState::default();
        assert!(!state.is_complete());

        state.finish(Err(TransportError::Timeout));
        state.finish(Err(TransportError::Io));

        assert!(state.is_complete());
        assert_eq!(state.take_error(), Some(TransportError::Timeout));
        assert_eq!(state.take_error(), None);
    }

    #[test]
    fn test_successful_finish_has_no_error() {
        let state = TransferState::default();
        state.finish(Ok(()));
        assert!(state.is_complete());
        assert_eq!(state.take_error(), None);
    }

    #[test]
    fn test_cancel_is_a_noop_after_completion() {
        let state = Arc::new(TransferState::default());
        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = cancelled.clone();
        let mut pending = PendingTransfer::new(
            state.clone(),
            Box::new(move || flag.store(true, Ordering::SeqCst)),
        );

        state.finish(Ok(()));
        pending.cancel();
        assert!(!cancelled.load(Ordering::SeqCst));
    }
}
