//! Bulk transfer helpers and the single-slot asynchronous pipeline
//!
//! All traffic goes through two bulk endpoints. Synchronous transfers
//! check for short counts; asynchronous image uploads go through a
//! [`TransferSlot`] that keeps at most one transfer in flight and waits
//! for the previous one by pumping transport events.

use crate::error::{Error, Result};
use crate::transport::{PendingTransfer, TransportError, UsbHandle, UsbTransport};
use std::time::Duration;
use tracing::{trace, warn};

/// Bulk OUT endpoint used for all host-to-device traffic.
pub const OUT_ENDPOINT: u8 = 0x01;
/// Bulk IN endpoint used for device replies.
pub const IN_ENDPOINT: u8 = 0x81;

/// How many event-pump failures we tolerate while waiting for an
/// in-flight transfer before giving up on it.
pub const MAX_EVENT_PUMP_RETRIES: u32 = 16;

const EVENT_PUMP_TIMEOUT: Duration = Duration::from_millis(100);

/// Write `data` to the OUT endpoint, failing on short transfers.
pub fn send_data<H: UsbHandle>(handle: &mut H, data: &[u8]) -> Result<()> {
    trace_dump("out", data);
    let transferred = handle.write_bulk(OUT_ENDPOINT, data)?;
    if transferred != data.len() {
        return Err(Error::ShortTransfer {
            expected: data.len(),
            transferred,
        });
    }
    Ok(())
}

/// Fill `buf` from the IN endpoint, failing on short transfers.
pub fn read_data<H: UsbHandle>(handle: &mut H, buf: &mut [u8]) -> Result<()> {
    let transferred = handle.read_bulk(IN_ENDPOINT, buf)?;
    if transferred != buf.len() {
        return Err(Error::ShortTransfer {
            expected: buf.len(),
            transferred,
        });
    }
    trace_dump("in", buf);
    Ok(())
}

fn trace_dump(direction: &str, data: &[u8]) {
    if tracing::enabled!(tracing::Level::TRACE) {
        let hex: Vec<String> = data
            .iter()
            .take(32)
            .map(|b| format!("{b:02x}"))
            .collect();
        trace!(direction, len = data.len(), bytes = %hex.join(" "));
    }
}

/// At most one asynchronous transfer in flight per device.
///
/// A new submission first waits for the previous one, so uploads stay
/// strictly ordered. Completion errors are not raised at submit time;
/// they are recorded here and can be drained with
/// [`TransferSlot::take_last_error`].
#[derive(Default)]
pub struct TransferSlot {
    pending: Option<PendingTransfer>,
    last_error: Option<TransportError>,
}

impl TransferSlot {
    pub fn is_idle(&self) -> bool {
        self.pending.is_none()
    }

    /// Error reported by the most recent completed transfer, if any.
    /// Draining resets the record.
    pub fn take_last_error(&mut self) -> Option<TransportError> {
        self.last_error.take()
    }

    /// Pump transport events until the in-flight transfer (if any)
    /// completes. A pump failure cancels the transfer and keeps
    /// pumping so the cancellation can be observed; more than
    /// [`MAX_EVENT_PUMP_RETRIES`] failures abandons the transfer.
    pub fn wait_idle<T: UsbTransport>(&mut self, transport: &T) -> Result<()> {
        let Some(mut pending) = self.pending.take() else {
            return Ok(());
        };

        let mut failures = 0u32;
        while !pending.is_complete() {
            match transport.handle_events(EVENT_PUMP_TIMEOUT) {
                Ok(()) => {}
                // A signal interrupted the wait; just try again.
                Err(TransportError::Interrupted) => {}
                Err(e) => {
                    failures += 1;
                    if failures > MAX_EVENT_PUMP_RETRIES {
                        return Err(Error::EventPumpFailed(failures));
                    }
                    warn!(error = %e, failures, "event handling failed, cancelling transfer and retrying");
                    // Cancellation still completes through the pump.
                    pending.cancel();
                }
            }
        }

        if let Some(error) = pending.take_error() {
            warn!(error = %error, "asynchronous transfer failed");
            self.last_error = Some(error);
        }
        Ok(())
    }

    /// Wait for the previous transfer, then submit `data` on the OUT
    /// endpoint. The data is copied, so the caller's buffer can be
    /// reused immediately.
    pub fn submit<T: UsbTransport>(
        &mut self,
        transport: &T,
        handle: &mut T::Handle,
        data: &[u8],
    ) -> Result<()> {
        self.wait_idle(transport)?;
        trace_dump("out-async", data);
        self.pending = Some(handle.submit_bulk_out(OUT_ENDPOINT, data.to_vec())?);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{MockTransport, UsbTransport};

    fn open_one(transport: &MockTransport) -> <MockTransport as UsbTransport>::Handle {
        transport.add_device(0x1de1, 0xc101, 2);
        let devices = transport.list_devices().unwrap();
        transport.open(&devices[0]).unwrap()
    }

    #[test]
    fn test_send_data_short_transfer() {
        let transport = MockTransport::new();
        let mut handle = open_one(&transport);
        transport.short_next_write(0, 5);

        let err = send_data(&mut handle, &[0u8; 24]).unwrap_err();
        assert!(matches!(
            err,
            Error::ShortTransfer {
                expected: 24,
                transferred: 5
            }
        ));
    }

    #[test]
    fn test_submit_waits_for_previous_transfer() {
        let transport = MockTransport::new();
        let mut handle = open_one(&transport);
        let mut slot = TransferSlot::default();

        slot.submit(&transport, &mut handle, &[1, 2, 3]).unwrap();
        assert!(!slot.is_idle());
        assert_eq!(transport.events_pumped(), 0);

        // Second submission pumps events to retire the first one.
        slot.submit(&transport, &mut handle, &[4, 5, 6]).unwrap();
        assert!(transport.events_pumped() > 0);
        assert_eq!(transport.async_written(0), vec![vec![1, 2, 3], vec![4, 5, 6]]);

        slot.wait_idle(&transport).unwrap();
        assert!(slot.is_idle());
        assert_eq!(slot.take_last_error(), None);
    }

    #[test]
    fn test_wait_idle_gives_up_after_repeated_pump_failures() {
        let transport = MockTransport::new();
        let mut handle = open_one(&transport);
        let mut slot = TransferSlot::default();

        slot.submit(&transport, &mut handle, &[0u8; 8]).unwrap();
        for _ in 0..=MAX_EVENT_PUMP_RETRIES {
            transport.fail_next_pump(TransportError::Io);
        }

        let err = slot.wait_idle(&transport).unwrap_err();
        assert!(matches!(err, Error::EventPumpFailed(n) if n > MAX_EVENT_PUMP_RETRIES));
        assert!(slot.is_idle());
    }

    #[test]
    fn test_pump_failure_cancels_and_recovers_on_next_pump() {
        let transport = MockTransport::new();
        let mut handle = open_one(&transport);
        let mut slot = TransferSlot::default();

        slot.submit(&transport, &mut handle, &[0u8; 8]).unwrap();
        transport.fail_next_pump(TransportError::Io);

        // The failed pump cancels the transfer; the next pump retires
        // it with a cancellation error, which lands in the slot.
        slot.wait_idle(&transport).unwrap();
        assert!(slot.is_idle());
        assert_eq!(slot.take_last_error(), Some(TransportError::Io));
        assert_eq!(slot.take_last_error(), None);
    }

    #[test]
    fn test_interrupted_pump_does_not_count_as_failure() {
        let transport = MockTransport::new();
        let mut handle = open_one(&transport);
        let mut slot = TransferSlot::default();

        slot.submit(&transport, &mut handle, &[0u8; 8]).unwrap();
        transport.fail_next_pump(TransportError::Interrupted);

        slot.wait_idle(&transport).unwrap();
        assert!(slot.is_idle());
    }
}
