//! Per-device state and operations
//!
//! A [`Device`] pairs a static [`DeviceDescriptor`] with the runtime
//! session state: the open transport handle, the cached device info
//! from the mandatory initial handshake, and the single asynchronous
//! transfer slot. Opening a session configures and claims the USB
//! interface; all command assembly for a device lives here.

use crate::descriptor::{DeviceDescriptor, PowerOp, ZoomOp};
use crate::error::{Error, Result};
use crate::transfer::{self, TransferSlot};
use crate::transport::{UsbHandle, UsbTransport};
use am7xxx_protocol::{
    Direction, Header, ImageFormat, PacketType, Payload, PowerMode, ZoomMode,
    deserialize_header, serialize_header, HEADER_WIRE_SIZE,
};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Firmware on the PicoPix models drops the first tele command unless
/// it is repeated after a short pause.
const PICOPIX_ZOOM_DELAY: Duration = Duration::from_millis(100);

/// Native resolution and the two still-unidentified words reported by
/// a device during the initial handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceInfo {
    pub native_width: u32,
    pub native_height: u32,
    unknown0: u32,
    unknown1: u32,
}

impl DeviceInfo {
    /// Compute output dimensions for an image of `width`x`height`.
    ///
    /// Images that already fit the native resolution pass through
    /// unchanged unless `upscale` is set. Otherwise the aspect ratio is
    /// preserved: the axis that overflows the most is pinned to the
    /// native size and the other is scaled to match.
    pub fn scaled_dimensions(&self, upscale: bool, width: u32, height: u32) -> (u32, u32) {
        if !upscale && width <= self.native_width && height <= self.native_height {
            return (width, height);
        }

        let width_ratio = width as f32 / self.native_width as f32;
        let height_ratio = height as f32 / self.native_height as f32;

        if width_ratio > height_ratio {
            (
                self.native_width,
                (height as f32 / width_ratio).round() as u32,
            )
        } else if width_ratio < height_ratio {
            (
                (width as f32 / height_ratio).round() as u32,
                self.native_height,
            )
        } else {
            (self.native_width, self.native_height)
        }
    }
}

/// A known device seen on the bus, possibly with an open session.
pub struct Device<T: UsbTransport> {
    descriptor: &'static DeviceDescriptor,
    index: usize,
    handle: Option<T::Handle>,
    /// Scratch buffer for header wire traffic
    buffer: [u8; HEADER_WIRE_SIZE],
    slot: TransferSlot,
    info: Option<DeviceInfo>,
}

impl<T: UsbTransport> Device<T> {
    pub fn new(descriptor: &'static DeviceDescriptor, index: usize) -> Self {
        Self {
            descriptor,
            index,
            handle: None,
            buffer: [0; HEADER_WIRE_SIZE],
            slot: TransferSlot::default(),
            info: None,
        }
    }

    pub fn descriptor(&self) -> &'static DeviceDescriptor {
        self.descriptor
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn is_open(&self) -> bool {
        self.handle.is_some()
    }

    /// Error reported by the most recently completed asynchronous
    /// image upload, if any. Draining resets the record.
    pub fn take_last_async_error(&mut self) -> Option<crate::transport::TransportError> {
        self.slot.take_last_error()
    }

    /// Configure the device, claim its interface and store the handle.
    ///
    /// If claiming the interface makes the device switch to a different
    /// configuration the session is rolled back and the open fails;
    /// some models renegotiate on claim and are unusable afterwards.
    pub fn open_session(&mut self, transport: &T, device: &T::DeviceRef) -> Result<()> {
        let mut handle = transport.open(device)?;

        let current = handle.active_configuration()?;
        if current != self.descriptor.configuration {
            debug!(
                device = self.descriptor.name,
                current,
                wanted = self.descriptor.configuration,
                "switching usb configuration"
            );
            handle.set_configuration(self.descriptor.configuration)?;
        }

        // Kernel driver detach failures are not fatal; the claim below
        // will fail if a driver is actually in the way.
        if let Err(e) = handle.set_auto_detach_kernel_driver(true) {
            warn!(device = self.descriptor.name, error = %e, "cannot auto-detach kernel driver");
        }

        handle.claim_interface(self.descriptor.interface_number)?;

        let after_claim = handle.active_configuration()?;
        if after_claim != self.descriptor.configuration {
            if let Err(e) = handle.release_interface(self.descriptor.interface_number) {
                warn!(device = self.descriptor.name, error = %e, "release failed during rollback");
            }
            return Err(Error::ConfigurationChanged {
                expected: self.descriptor.configuration,
                actual: after_claim,
            });
        }

        info!(device = self.descriptor.name, index = self.index, "device opened");
        self.handle = Some(handle);
        Ok(())
    }

    /// Tear the session down, waiting for any in-flight upload first.
    /// Never fails; problems are logged and teardown continues.
    pub fn close_session(&mut self, transport: &T) {
        if self.handle.is_none() {
            return;
        }

        if let Err(e) = self.slot.wait_idle(transport) {
            warn!(device = self.descriptor.name, error = %e, "could not drain pending transfer");
        }
        if let Some(e) = self.slot.take_last_error() {
            warn!(device = self.descriptor.name, error = %e, "last upload had failed");
        }
        if let Some(handle) = self.handle.as_mut() {
            if let Err(e) = handle.release_interface(self.descriptor.interface_number) {
                warn!(device = self.descriptor.name, error = %e, "interface release failed");
            }
        }
        // Dropping the handle closes the device.
        self.handle = None;
        info!(device = self.descriptor.name, index = self.index, "device closed");
    }

    fn handle(&mut self) -> Result<&mut T::Handle> {
        match self.handle.as_mut() {
            Some(handle) => Ok(handle),
            None => Err(Error::DeviceNotOpen(self.index)),
        }
    }

    fn send_header(&mut self, header: &Header) -> Result<()> {
        self.buffer = serialize_header(header);
        let Self { handle, buffer, .. } = self;
        match handle.as_mut() {
            Some(handle) => transfer::send_data(handle, buffer),
            None => Err(Error::DeviceNotOpen(self.index)),
        }
    }

    fn read_header(&mut self, expected_type: PacketType) -> Result<Header> {
        let Self { handle, buffer, .. } = self;
        match handle.as_mut() {
            Some(handle) => transfer::read_data(handle, buffer)?,
            None => return Err(Error::DeviceNotOpen(self.index)),
        }
        let header = deserialize_header(&self.buffer)?;

        if header.packet_type != expected_type.code() {
            return Err(Error::UnexpectedPacketType {
                expected: expected_type.code(),
                actual: header.packet_type,
            });
        }
        if header.direction != Direction::In {
            return Err(Error::UnexpectedDirection(header.direction.to_wire()));
        }
        Ok(header)
    }

    /// Run the device-info handshake, or return the cached result.
    ///
    /// Every session must do this once right after opening; some models
    /// (the PicoPix line) will not accept images before it.
    pub fn fetch_device_info(&mut self) -> Result<DeviceInfo> {
        if let Some(info) = self.info {
            return Ok(info);
        }

        self.send_header(&Header::command(PacketType::Devinfo))?;
        let reply = self.read_header(PacketType::Devinfo)?;

        let Payload::Devinfo {
            native_width,
            native_height,
            unknown0,
            unknown1,
        } = reply.payload
        else {
            // Unreachable once the packet type check passed, but do not
            // panic on malformed traffic.
            return Err(Error::UnexpectedPacketType {
                expected: PacketType::Devinfo.code(),
                actual: reply.packet_type,
            });
        };

        let info = DeviceInfo {
            native_width,
            native_height,
            unknown0,
            unknown1,
        };
        debug!(
            device = self.descriptor.name,
            native_width, native_height, unknown0, unknown1, "device info"
        );
        self.info = Some(info);
        Ok(info)
    }

    /// Upload an image synchronously: header, then the encoded data.
    pub fn send_image(
        &mut self,
        format: ImageFormat,
        width: u32,
        height: u32,
        data: &[u8],
    ) -> Result<()> {
        self.send_image_header(format, width, height, data)?;
        if data.is_empty() {
            return Ok(());
        }
        let handle = self.handle()?;
        transfer::send_data(handle, data)
    }

    /// Upload an image asynchronously: the header goes out right away,
    /// the data is queued on the transfer slot. Completion errors are
    /// reported through [`Device::take_last_async_error`].
    pub fn send_image_async(
        &mut self,
        transport: &T,
        format: ImageFormat,
        width: u32,
        height: u32,
        data: &[u8],
    ) -> Result<()> {
        self.send_image_header(format, width, height, data)?;
        if data.is_empty() {
            return Ok(());
        }
        let Self { handle, slot, .. } = self;
        match handle.as_mut() {
            Some(handle) => slot.submit(transport, handle, data),
            None => Err(Error::DeviceNotOpen(self.index)),
        }
    }

    fn send_image_header(
        &mut self,
        format: ImageFormat,
        width: u32,
        height: u32,
        data: &[u8],
    ) -> Result<()> {
        if data.is_empty() {
            warn!(device = self.descriptor.name, "sending image with no data");
        }
        let header = Header::image(format, width, height, data.len() as u32);
        self.send_header(&header)
    }

    /// Set the lamp power mode, using whichever command dialect this
    /// model speaks. Models without power control accept the call and
    /// do nothing.
    pub fn set_power_mode(&mut self, mode: PowerMode) -> Result<()> {
        match self.descriptor.ops.power {
            None => {
                warn!(
                    device = self.descriptor.name,
                    ?mode,
                    "power control not supported, ignoring"
                );
                Ok(())
            }
            Some(PowerOp::Default) => {
                let header = match mode {
                    PowerMode::Off => Header::power(0, 0, 0),
                    PowerMode::Low => Header::power(0, 0, 1),
                    PowerMode::Middle => Header::power(0, 1, 0),
                    PowerMode::High => Header::power(0, 1, 1),
                    PowerMode::Turbo => Header::power(1, 0, 0),
                };
                self.send_header(&header)
            }
            Some(PowerOp::Picopix) => {
                let packet_type = match mode {
                    PowerMode::Low => PacketType::PicopixPowerLow,
                    PowerMode::Middle => PacketType::PicopixPowerMedium,
                    PowerMode::High => PacketType::PicopixPowerHigh,
                    // These firmwares have no off or turbo setting.
                    PowerMode::Off | PowerMode::Turbo => {
                        return Err(Error::InvalidArgument("power mode"));
                    }
                };
                self.send_header(&Header::command(packet_type))
            }
        }
    }

    /// Set the zoom mode. Models without zoom control accept the call
    /// and do nothing.
    pub fn set_zoom_mode(&mut self, mode: ZoomMode) -> Result<()> {
        match self.descriptor.ops.zoom {
            None => {
                warn!(
                    device = self.descriptor.name,
                    ?mode,
                    "zoom control not supported, ignoring"
                );
                Ok(())
            }
            Some(ZoomOp::Default) => {
                let header = match mode {
                    ZoomMode::Original => Header::zoom(0, 0),
                    ZoomMode::H => Header::zoom(0, 1),
                    ZoomMode::HV => Header::zoom(1, 0),
                    ZoomMode::Test => Header::zoom(1, 1),
                    ZoomMode::Tele => return Err(Error::InvalidArgument("zoom mode")),
                };
                self.send_header(&header)
            }
            Some(ZoomOp::Picopix) => {
                let packet_type = match mode {
                    ZoomMode::Original => PacketType::PicopixDisableTele,
                    ZoomMode::Tele => PacketType::PicopixEnableTele,
                    ZoomMode::H | ZoomMode::HV | ZoomMode::Test => {
                        return Err(Error::InvalidArgument("zoom mode"));
                    }
                };
                let header = Header::command(packet_type);
                self.send_header(&header)?;
                std::thread::sleep(PICOPIX_ZOOM_DELAY);
                self.send_header(&header)
            }
        }
    }
}
