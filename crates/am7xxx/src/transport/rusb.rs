//! rusb-backed USB transport
//!
//! The production [`UsbTransport`] implementation. Synchronous bulk
//! I/O and the session plumbing go through rusb's safe API; the
//! asynchronous bulk OUT path uses the raw libusb transfer interface
//! (`rusb::ffi`), since completion must be observable through the
//! explicit event pump rather than a blocking call.

use super::{PendingTransfer, TransferState, TransportError, UsbHandle, UsbTransport};
use ::rusb::UsbContext;
use ::rusb::ffi;
use std::os::raw::c_void;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error};

/// Map rusb errors to the transport taxonomy.
pub(crate) fn map_rusb_error(err: ::rusb::Error) -> TransportError {
    match err {
        ::rusb::Error::Timeout => TransportError::Timeout,
        ::rusb::Error::Pipe => TransportError::Pipe,
        ::rusb::Error::Overflow => TransportError::Overflow,
        ::rusb::Error::NoDevice => TransportError::NoDevice,
        ::rusb::Error::NotFound => TransportError::NotFound,
        ::rusb::Error::Busy => TransportError::Busy,
        ::rusb::Error::Access => TransportError::Access,
        ::rusb::Error::Io => TransportError::Io,
        ::rusb::Error::InvalidParam => TransportError::InvalidParam,
        ::rusb::Error::NoMem => TransportError::NoMem,
        ::rusb::Error::Interrupted => TransportError::Interrupted,
        other => TransportError::Other(other.to_string()),
    }
}

/// Map a raw libusb return code (from the ffi layer) to the taxonomy.
fn map_libusb_code(code: i32) -> TransportError {
    use ffi::constants::*;

    match code {
        LIBUSB_ERROR_TIMEOUT => TransportError::Timeout,
        LIBUSB_ERROR_PIPE => TransportError::Pipe,
        LIBUSB_ERROR_OVERFLOW => TransportError::Overflow,
        LIBUSB_ERROR_NO_DEVICE => TransportError::NoDevice,
        LIBUSB_ERROR_NOT_FOUND => TransportError::NotFound,
        LIBUSB_ERROR_BUSY => TransportError::Busy,
        LIBUSB_ERROR_ACCESS => TransportError::Access,
        LIBUSB_ERROR_IO => TransportError::Io,
        LIBUSB_ERROR_INVALID_PARAM => TransportError::InvalidParam,
        LIBUSB_ERROR_NO_MEM => TransportError::NoMem,
        LIBUSB_ERROR_INTERRUPTED => TransportError::Interrupted,
        other => TransportError::Other(format!("libusb error code {other}")),
    }
}

/// USB transport over a libusb context.
pub struct RusbTransport {
    context: ::rusb::Context,
}

impl RusbTransport {
    pub fn new() -> Result<Self, TransportError> {
        let context = ::rusb::Context::new().map_err(map_rusb_error)?;
        Ok(Self { context })
    }
}

impl UsbTransport for RusbTransport {
    type DeviceRef = ::rusb::Device<::rusb::Context>;
    type Handle = RusbHandle;

    fn list_devices(&self) -> Result<Vec<Self::DeviceRef>, TransportError> {
        let devices = self.context.devices().map_err(map_rusb_error)?;
        Ok(devices.iter().collect())
    }

    fn device_ids(&self, device: &Self::DeviceRef) -> Option<(u16, u16)> {
        let desc = device.device_descriptor().ok()?;
        Some((desc.vendor_id(), desc.product_id()))
    }

    fn open(&self, device: &Self::DeviceRef) -> Result<Self::Handle, TransportError> {
        let handle = device.open().map_err(map_rusb_error)?;
        debug!(
            "opened device on bus {} address {}",
            device.bus_number(),
            device.address()
        );
        Ok(RusbHandle { handle })
    }

    fn handle_events(&self, timeout: Duration) -> Result<(), TransportError> {
        self.context
            .handle_events(Some(timeout))
            .map_err(map_rusb_error)
    }
}

/// An open rusb device handle.
pub struct RusbHandle {
    handle: ::rusb::DeviceHandle<::rusb::Context>,
}

/// No per-call timeout on the command endpoints; the device is
/// expected to consume or produce command traffic promptly.
const NO_TIMEOUT: Duration = Duration::ZERO;

impl UsbHandle for RusbHandle {
    fn active_configuration(&mut self) -> Result<u8, TransportError> {
        self.handle.active_configuration().map_err(map_rusb_error)
    }

    fn set_configuration(&mut self, configuration: u8) -> Result<(), TransportError> {
        self.handle
            .set_active_configuration(configuration)
            .map_err(map_rusb_error)
    }

    fn set_auto_detach_kernel_driver(&mut self, enable: bool) -> Result<(), TransportError> {
        self.handle
            .set_auto_detach_kernel_driver(enable)
            .map_err(map_rusb_error)
    }

    fn claim_interface(&mut self, interface: u8) -> Result<(), TransportError> {
        self.handle.claim_interface(interface).map_err(map_rusb_error)
    }

    fn release_interface(&mut self, interface: u8) -> Result<(), TransportError> {
        self.handle
            .release_interface(interface)
            .map_err(map_rusb_error)
    }

    fn read_bulk(&mut self, endpoint: u8, buf: &mut [u8]) -> Result<usize, TransportError> {
        self.handle
            .read_bulk(endpoint, buf, NO_TIMEOUT)
            .map_err(map_rusb_error)
    }

    fn write_bulk(&mut self, endpoint: u8, data: &[u8]) -> Result<usize, TransportError> {
        self.handle
            .write_bulk(endpoint, data, NO_TIMEOUT)
            .map_err(map_rusb_error)
    }

    fn submit_bulk_out(
        &mut self,
        endpoint: u8,
        data: Vec<u8>,
    ) -> Result<PendingTransfer, TransportError> {
        let state = Arc::new(TransferState::default());
        let requested = data.len();
        let ctx = Box::new(AsyncWrite {
            state: state.clone(),
            buffer: data,
            requested,
        });

        // The raw transfer owns nothing; AsyncWrite keeps the buffer
        // alive until the completion callback reclaims the box.
        unsafe {
            let transfer = ffi::libusb_alloc_transfer(0);
            if transfer.is_null() {
                return Err(TransportError::NoMem);
            }

            (*transfer).dev_handle = self.handle.as_raw();
            (*transfer).endpoint = endpoint;
            (*transfer).transfer_type = ffi::constants::LIBUSB_TRANSFER_TYPE_BULK;
            (*transfer).timeout = 0;
            (*transfer).buffer = ctx.buffer.as_ptr() as *mut u8;
            (*transfer).length = requested as i32;
            (*transfer).callback = bulk_write_done;
            (*transfer).flags = 0;
            (*transfer).num_iso_packets = 0;

            let user_data = Box::into_raw(ctx);
            (*transfer).user_data = user_data as *mut c_void;

            let rc = ffi::libusb_submit_transfer(transfer);
            if rc < 0 {
                drop(Box::from_raw(user_data));
                ffi::libusb_free_transfer(transfer);
                return Err(map_libusb_code(rc));
            }

            // The cancel hook is only invoked from the event-pumping
            // thread while the transfer is incomplete, so the raw
            // pointer cannot have been freed by the callback yet.
            Ok(PendingTransfer::new(
                state,
                Box::new(move || {
                    ffi::libusb_cancel_transfer(transfer);
                }),
            ))
        }
    }
}

/// Per-submission bookkeeping handed to libusb as user data.
struct AsyncWrite {
    state: Arc<TransferState>,
    buffer: Vec<u8>,
    requested: usize,
}

/// Completion callback run from inside the event pump.
///
/// Maps the transfer status to the transport taxonomy, records it in
/// the shared state and frees the raw transfer. Errors are logged here
/// and surface to the caller through the device's last-async-error
/// slot, never as a return value of the submitting call.
extern "system" fn bulk_write_done(transfer: *mut ffi::libusb_transfer) {
    use ffi::constants::*;

    let (ctx, status, actual) = unsafe {
        let ctx = Box::from_raw((*transfer).user_data as *mut AsyncWrite);
        let status = (*transfer).status;
        let actual = (*transfer).actual_length as usize;
        ffi::libusb_free_transfer(transfer);
        (ctx, status, actual)
    };

    let result = match status {
        LIBUSB_TRANSFER_COMPLETED => {
            if actual == ctx.requested {
                Ok(())
            } else {
                error!("transferred: {} (expected {})", actual, ctx.requested);
                Err(TransportError::Io)
            }
        }
        LIBUSB_TRANSFER_TIMED_OUT => Err(TransportError::Timeout),
        LIBUSB_TRANSFER_STALL => Err(TransportError::Pipe),
        LIBUSB_TRANSFER_OVERFLOW => Err(TransportError::Overflow),
        LIBUSB_TRANSFER_NO_DEVICE => Err(TransportError::NoDevice),
        LIBUSB_TRANSFER_ERROR | LIBUSB_TRANSFER_CANCELLED => Err(TransportError::Io),
        other => Err(TransportError::Other(format!(
            "unrecognised transfer status {other}"
        ))),
    };

    if let Err(e) = &result {
        error!("asynchronous bulk transfer failed: {e}");
    }

    ctx.state.finish(result);
}
