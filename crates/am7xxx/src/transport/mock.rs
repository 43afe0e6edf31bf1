//! Scriptable mock transport for tests
//!
//! A simulated bus: tests attach devices (supported or not), script
//! IN replies and fault injection, run the driver against it and then
//! inspect the recorded traffic. Asynchronous submissions complete
//! only when [`UsbTransport::handle_events`] is pumped, which is what
//! makes the ordering and wait-path tests possible.

use super::{PendingTransfer, TransferState, TransportError, UsbHandle, UsbTransport};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

#[derive(Default)]
struct MockBus {
    devices: Vec<MockDeviceState>,
    events_pumped: usize,
    pump_failures: VecDeque<TransportError>,
    in_flight: Vec<MockInFlight>,
}

/// A submitted transfer; cancellation completes through the pump, as
/// on a real bus.
struct MockInFlight {
    state: Arc<TransferState>,
    cancelled: Arc<AtomicBool>,
}

#[derive(Default)]
struct MockDeviceState {
    ids: Option<(u16, u16)>,
    configuration: u8,
    configuration_after_claim: Option<u8>,
    opens: usize,
    closes: usize,
    claims: usize,
    releases: usize,
    auto_detach: bool,
    written: Vec<Vec<u8>>,
    async_written: Vec<Vec<u8>>,
    replies: VecDeque<Vec<u8>>,
    short_write: Option<usize>,
    open_error: Option<TransportError>,
    claim_error: Option<TransportError>,
}

/// Handle to a simulated bus; clones share the same bus state.
#[derive(Clone, Default)]
pub struct MockTransport {
    bus: Arc<Mutex<MockBus>>,
}

/// Position of a device on the simulated bus.
#[derive(Debug, Clone, Copy)]
pub struct MockDeviceRef(usize);

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn bus(&self) -> MutexGuard<'_, MockBus> {
        self.bus.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Attach a device with the given IDs; returns its bus position.
    pub fn add_device(&self, vendor_id: u16, product_id: u16, configuration: u8) -> usize {
        let mut bus = self.bus();
        bus.devices.push(MockDeviceState {
            ids: Some((vendor_id, product_id)),
            configuration,
            ..Default::default()
        });
        bus.devices.len() - 1
    }

    /// Attach a device whose descriptor cannot be read.
    pub fn add_unreadable_device(&self) {
        self.bus().devices.push(MockDeviceState::default());
    }

    /// Script the next IN transfer on a device to return these bytes.
    pub fn push_reply(&self, position: usize, data: Vec<u8>) {
        self.bus().devices[position].replies.push_back(data);
    }

    /// Make the next bulk write on a device report a short count.
    pub fn short_next_write(&self, position: usize, transferred: usize) {
        self.bus().devices[position].short_write = Some(transferred);
    }

    /// Simulate a configuration re-negotiation on interface claim.
    pub fn renegotiate_on_claim(&self, position: usize, configuration: u8) {
        self.bus().devices[position].configuration_after_claim = Some(configuration);
    }

    /// Make opening a device fail.
    pub fn fail_open(&self, position: usize, error: TransportError) {
        self.bus().devices[position].open_error = Some(error);
    }

    /// Make claiming the interface fail.
    pub fn fail_claim(&self, position: usize, error: TransportError) {
        self.bus().devices[position].claim_error = Some(error);
    }

    /// Script the next event-pump call to fail.
    pub fn fail_next_pump(&self, error: TransportError) {
        self.bus().pump_failures.push_back(error);
    }

    pub fn events_pumped(&self) -> usize {
        self.bus().events_pumped
    }

    pub fn claim_count(&self, position: usize) -> usize {
        self.bus().devices[position].claims
    }

    pub fn release_count(&self, position: usize) -> usize {
        self.bus().devices[position].releases
    }

    /// True when every opened handle has been dropped again.
    pub fn all_handles_closed(&self, position: usize) -> bool {
        let bus = self.bus();
        bus.devices[position].opens == bus.devices[position].closes
    }

    pub fn auto_detach_enabled(&self, position: usize) -> bool {
        self.bus().devices[position].auto_detach
    }

    pub fn configuration(&self, position: usize) -> u8 {
        self.bus().devices[position].configuration
    }

    /// All synchronous OUT transfers recorded for a device, in order.
    pub fn written(&self, position: usize) -> Vec<Vec<u8>> {
        self.bus().devices[position].written.clone()
    }

    /// All asynchronous OUT submissions recorded for a device, in order.
    pub fn async_written(&self, position: usize) -> Vec<Vec<u8>> {
        self.bus().devices[position].async_written.clone()
    }
}

impl UsbTransport for MockTransport {
    type DeviceRef = MockDeviceRef;
    type Handle = MockHandle;

    fn list_devices(&self) -> Result<Vec<MockDeviceRef>, TransportError> {
        let bus = self.bus();
        Ok((0..bus.devices.len()).map(MockDeviceRef).collect())
    }

    fn device_ids(&self, device: &MockDeviceRef) -> Option<(u16, u16)> {
        self.bus().devices[device.0].ids
    }

    fn open(&self, device: &MockDeviceRef) -> Result<MockHandle, TransportError> {
        let mut bus = self.bus();
        let state = &mut bus.devices[device.0];
        if let Some(err) = state.open_error.clone() {
            return Err(err);
        }
        state.opens += 1;
        Ok(MockHandle {
            bus: self.bus.clone(),
            position: device.0,
        })
    }

    fn handle_events(&self, _timeout: Duration) -> Result<(), TransportError> {
        let mut bus = self.bus();
        bus.events_pumped += 1;
        if let Some(err) = bus.pump_failures.pop_front() {
            return Err(err);
        }
        for transfer in bus.in_flight.drain(..) {
            if transfer.cancelled.load(Ordering::SeqCst) {
                transfer.state.finish(Err(TransportError::Io));
            } else {
                transfer.state.finish(Ok(()));
            }
        }
        Ok(())
    }
}

/// An open handle on the simulated bus.
pub struct MockHandle {
    bus: Arc<Mutex<MockBus>>,
    position: usize,
}

impl MockHandle {
    fn bus(&self) -> MutexGuard<'_, MockBus> {
        self.bus.lock().unwrap_or_else(|p| p.into_inner())
    }
}

impl Drop for MockHandle {
    fn drop(&mut self) {
        self.bus().devices[self.position].closes += 1;
    }
}

impl UsbHandle for MockHandle {
    fn active_configuration(&mut self) -> Result<u8, TransportError> {
        Ok(self.bus().devices[self.position].configuration)
    }

    fn set_configuration(&mut self, configuration: u8) -> Result<(), TransportError> {
        self.bus().devices[self.position].configuration = configuration;
        Ok(())
    }

    fn set_auto_detach_kernel_driver(&mut self, enable: bool) -> Result<(), TransportError> {
        self.bus().devices[self.position].auto_detach = enable;
        Ok(())
    }

    fn claim_interface(&mut self, _interface: u8) -> Result<(), TransportError> {
        let mut bus = self.bus();
        let state = &mut bus.devices[self.position];
        if let Some(err) = state.claim_error.clone() {
            return Err(err);
        }
        state.claims += 1;
        if let Some(configuration) = state.configuration_after_claim {
            state.configuration = configuration;
        }
        Ok(())
    }

    fn release_interface(&mut self, _interface: u8) -> Result<(), TransportError> {
        self.bus().devices[self.position].releases += 1;
        Ok(())
    }

    fn read_bulk(&mut self, _endpoint: u8, buf: &mut [u8]) -> Result<usize, TransportError> {
        let mut bus = self.bus();
        let state = &mut bus.devices[self.position];
        let Some(reply) = state.replies.pop_front() else {
            return Err(TransportError::Timeout);
        };
        let len = reply.len().min(buf.len());
        buf[..len].copy_from_slice(&reply[..len]);
        Ok(len)
    }

    fn write_bulk(&mut self, _endpoint: u8, data: &[u8]) -> Result<usize, TransportError> {
        let mut bus = self.bus();
        let state = &mut bus.devices[self.position];
        state.written.push(data.to_vec());
        match state.short_write.take() {
            Some(transferred) => Ok(transferred),
            None => Ok(data.len()),
        }
    }

    fn submit_bulk_out(
        &mut self,
        _endpoint: u8,
        data: Vec<u8>,
    ) -> Result<PendingTransfer, TransportError> {
        let mut bus = self.bus();
        let state = Arc::new(TransferState::default());
        let cancelled = Arc::new(AtomicBool::new(false));
        bus.devices[self.position].async_written.push(data);
        bus.in_flight.push(MockInFlight {
            state: state.clone(),
            cancelled: cancelled.clone(),
        });

        Ok(PendingTransfer::new(
            state,
            Box::new(move || cancelled.store(true, Ordering::SeqCst)),
        ))
    }
}
