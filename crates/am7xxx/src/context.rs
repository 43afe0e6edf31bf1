//! Library entry point
//!
//! A [`Context`] owns a transport and the list of supported devices
//! found on the bus at creation time. Devices are addressed by their
//! stable scan index; every public operation goes through the context.
//! [`Am7xxxContext`] is the alias most applications want, backed by
//! the real USB stack.

use crate::descriptor::DeviceDescriptor;
use crate::device::{Device, DeviceInfo};
use crate::error::{Error, Result};
use crate::logging::{self, LogLevel};
use crate::scan;
use crate::transport::{RusbTransport, TransportError, UsbTransport};
use am7xxx_protocol::{ImageFormat, PowerMode, ZoomMode};
use tracing::warn;

/// What [`Context::open_device`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenOutcome {
    /// A new session was established
    Opened,
    /// The device was already open; nothing was done
    AlreadyOpen,
}

/// Driver context generic over the transport backend.
pub struct Context<T: UsbTransport> {
    transport: T,
    devices: Vec<Device<T>>,
}

/// Context backed by the real USB stack.
pub type Am7xxxContext = Context<RusbTransport>;

impl Am7xxxContext {
    /// Create a context on the system USB bus and scan for devices.
    pub fn new() -> Result<Self> {
        Self::with_transport(RusbTransport::new()?)
    }
}

impl<T: UsbTransport> Context<T> {
    /// Create a context on the given transport and scan for devices.
    ///
    /// The scan runs at trace verbosity so a first run with a
    /// misbehaving device tells the whole story, then verbosity drops
    /// to errors only until the caller picks a level.
    pub fn with_transport(transport: T) -> Result<Self> {
        logging::set_level(LogLevel::Trace);
        let mut devices = Vec::new();
        let scanned = scan::build_device_list(&transport, &mut devices);
        logging::set_level(LogLevel::Error);
        scanned?;

        Ok(Self { transport, devices })
    }

    /// Change the library's log verbosity.
    pub fn set_log_level(&self, level: LogLevel) {
        logging::set_level(level);
    }

    /// Number of supported devices found during the scan.
    pub fn device_count(&self) -> usize {
        self.devices.len()
    }

    /// Static model description of a scanned device.
    pub fn descriptor(&self, index: usize) -> Result<&'static DeviceDescriptor> {
        Ok(self.device(index)?.descriptor())
    }

    fn device(&self, index: usize) -> Result<&Device<T>> {
        self.devices.get(index).ok_or(Error::NotFound(index))
    }

    fn device_mut(&mut self, index: usize) -> Result<&mut Device<T>> {
        self.devices.get_mut(index).ok_or(Error::NotFound(index))
    }

    /// Open a session on the device at `index` and run the mandatory
    /// device-info handshake. Opening an already-open device is not an
    /// error; the call reports [`OpenOutcome::AlreadyOpen`] and leaves
    /// the session untouched.
    pub fn open_device(&mut self, index: usize) -> Result<OpenOutcome> {
        let Self { transport, devices } = self;
        let device = devices.get_mut(index).ok_or(Error::NotFound(index))?;

        if device.is_open() {
            warn!(index, "device already open");
            return Ok(OpenOutcome::AlreadyOpen);
        }

        let physical = scan::find_physical_device(transport, index)?;
        device.open_session(transport, &physical)?;

        // Devices must be probed once before accepting anything else.
        if let Err(e) = device.fetch_device_info() {
            device.close_session(transport);
            return Err(e);
        }
        Ok(OpenOutcome::Opened)
    }

    /// Close the session on the device at `index`, draining any
    /// in-flight upload first. Closing a device that is not open is a
    /// no-op.
    pub fn close_device(&mut self, index: usize) -> Result<()> {
        let Self { transport, devices } = self;
        let device = devices.get_mut(index).ok_or(Error::NotFound(index))?;
        device.close_session(transport);
        Ok(())
    }

    /// Native resolution reported by the device during the handshake.
    pub fn device_info(&mut self, index: usize) -> Result<DeviceInfo> {
        self.device_mut(index)?.fetch_device_info()
    }

    /// Compute output dimensions for an image so it fits the device's
    /// native resolution; see [`DeviceInfo::scaled_dimensions`].
    pub fn scaled_image_dimensions(
        &mut self,
        index: usize,
        upscale: bool,
        width: u32,
        height: u32,
    ) -> Result<(u32, u32)> {
        let info = self.device_mut(index)?.fetch_device_info()?;
        Ok(info.scaled_dimensions(upscale, width, height))
    }

    /// Upload an image and wait for it to be fully sent.
    pub fn send_image(
        &mut self,
        index: usize,
        format: ImageFormat,
        width: u32,
        height: u32,
        data: &[u8],
    ) -> Result<()> {
        self.device_mut(index)?.send_image(format, width, height, data)
    }

    /// Upload an image without waiting for the data transfer to
    /// finish. Back-to-back calls stay ordered; a new call first waits
    /// for the previous upload. Completion failures are reported by
    /// [`Context::take_last_async_error`], not here.
    pub fn send_image_async(
        &mut self,
        index: usize,
        format: ImageFormat,
        width: u32,
        height: u32,
        data: &[u8],
    ) -> Result<()> {
        let Self { transport, devices } = self;
        let device = devices.get_mut(index).ok_or(Error::NotFound(index))?;
        device.send_image_async(transport, format, width, height, data)
    }

    /// Error reported by the most recently completed asynchronous
    /// upload on this device, if any. Draining resets the record.
    pub fn take_last_async_error(&mut self, index: usize) -> Result<Option<TransportError>> {
        Ok(self.device_mut(index)?.take_last_async_error())
    }

    /// Set the lamp power mode.
    pub fn set_power_mode(&mut self, index: usize, mode: PowerMode) -> Result<()> {
        self.device_mut(index)?.set_power_mode(mode)
    }

    /// Set the zoom mode.
    pub fn set_zoom_mode(&mut self, index: usize, mode: ZoomMode) -> Result<()> {
        self.device_mut(index)?.set_zoom_mode(mode)
    }
}

impl<T: UsbTransport> Drop for Context<T> {
    fn drop(&mut self) {
        let Self { transport, devices } = self;
        for device in devices.iter_mut() {
            device.close_session(transport);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockTransport;
    use am7xxx_protocol::{
        serialize_header, Direction, Header, PacketType, Payload, HEADER_WIRE_SIZE,
    };

    fn devinfo_reply(native_width: u32, native_height: u32) -> Vec<u8> {
        serialize_header(&Header {
            packet_type: PacketType::Devinfo.code(),
            direction: Direction::In,
            header_data_len: 0,
            reserved0: 0,
            reserved1: 0,
            payload: Payload::Devinfo {
                native_width,
                native_height,
                unknown0: 0,
                unknown1: 1,
            },
        })
        .to_vec()
    }

    /// A bus with one Acer C110 ready to complete the open handshake.
    fn ready_bus() -> (MockTransport, Context<MockTransport>) {
        let transport = MockTransport::new();
        transport.add_device(0x1de1, 0xc101, 2);
        transport.push_reply(0, devinfo_reply(800, 480));
        let ctx = Context::with_transport(transport.clone()).unwrap();
        (transport, ctx)
    }

    #[test]
    fn test_open_runs_handshake_and_reports_info() {
        let (transport, mut ctx) = ready_bus();
        assert_eq!(ctx.device_count(), 1);

        assert_eq!(ctx.open_device(0).unwrap(), OpenOutcome::Opened);
        assert_eq!(transport.claim_count(0), 1);
        assert!(transport.auto_detach_enabled(0));

        let info = ctx.device_info(0).unwrap();
        assert_eq!((info.native_width, info.native_height), (800, 480));

        // The handshake is a single devinfo command header.
        let written = transport.written(0);
        assert_eq!(written.len(), 1);
        assert_eq!(
            written[0],
            serialize_header(&Header::command(PacketType::Devinfo)).to_vec()
        );
    }

    #[test]
    fn test_open_twice_is_not_an_error_and_does_not_reclaim() {
        let (transport, mut ctx) = ready_bus();
        assert_eq!(ctx.open_device(0).unwrap(), OpenOutcome::Opened);
        assert_eq!(ctx.open_device(0).unwrap(), OpenOutcome::AlreadyOpen);
        assert_eq!(transport.claim_count(0), 1);
    }

    #[test]
    fn test_open_unknown_index_fails() {
        let (_transport, mut ctx) = ready_bus();
        assert!(matches!(ctx.open_device(3), Err(Error::NotFound(3))));
    }

    #[test]
    fn test_open_rolls_back_when_claim_fails() {
        let transport = MockTransport::new();
        transport.add_device(0x1de1, 0xc101, 2);
        transport.fail_claim(0, TransportError::Busy);

        let mut ctx = Context::with_transport(transport.clone()).unwrap();
        assert!(ctx.open_device(0).is_err());
        assert!(transport.all_handles_closed(0));
    }

    #[test]
    fn test_open_rolls_back_when_configuration_changes_under_us() {
        let transport = MockTransport::new();
        transport.add_device(0x1de1, 0xc101, 2);
        transport.renegotiate_on_claim(0, 1);

        let mut ctx = Context::with_transport(transport.clone()).unwrap();
        let err = ctx.open_device(0).unwrap_err();
        assert!(matches!(
            err,
            Error::ConfigurationChanged {
                expected: 2,
                actual: 1
            }
        ));
        assert_eq!(transport.release_count(0), 1);
        assert!(transport.all_handles_closed(0));
    }

    #[test]
    fn test_open_sets_wanted_configuration() {
        let transport = MockTransport::new();
        transport.add_device(0x1de1, 0xc101, 1); // wrong configuration
        transport.push_reply(0, devinfo_reply(800, 480));

        let mut ctx = Context::with_transport(transport.clone()).unwrap();
        ctx.open_device(0).unwrap();
        assert_eq!(transport.configuration(0), 2);
    }

    #[test]
    fn test_close_drains_and_releases() {
        let (transport, mut ctx) = ready_bus();
        ctx.open_device(0).unwrap();
        ctx.send_image_async(0, ImageFormat::Jpeg, 800, 480, &[0xff; 64])
            .unwrap();

        ctx.close_device(0).unwrap();
        assert!(transport.events_pumped() > 0);
        assert_eq!(transport.release_count(0), 1);
        assert!(transport.all_handles_closed(0));

        // Closing again is a no-op.
        ctx.close_device(0).unwrap();
        assert_eq!(transport.release_count(0), 1);
    }

    #[test]
    fn test_reopen_after_close_reuses_cached_info() {
        let (transport, mut ctx) = ready_bus();
        ctx.open_device(0).unwrap();
        ctx.close_device(0).unwrap();

        // The info cache survives the close, so the second open needs
        // no scripted reply.
        assert_eq!(ctx.open_device(0).unwrap(), OpenOutcome::Opened);
        assert_eq!(transport.claim_count(0), 2);
        let info = ctx.device_info(0).unwrap();
        assert_eq!((info.native_width, info.native_height), (800, 480));
    }

    #[test]
    fn test_drop_closes_open_devices() {
        let (transport, ctx) = ready_bus();
        let mut ctx = ctx;
        ctx.open_device(0).unwrap();
        drop(ctx);
        assert!(transport.all_handles_closed(0));
        assert_eq!(transport.release_count(0), 1);
    }

    #[test]
    fn test_operations_require_open_device() {
        let (_transport, mut ctx) = ready_bus();
        assert!(matches!(
            ctx.send_image(0, ImageFormat::Jpeg, 800, 480, &[0; 4]),
            Err(Error::DeviceNotOpen(0))
        ));
    }

    #[test]
    fn test_sync_image_sends_header_then_data() {
        let (transport, mut ctx) = ready_bus();
        ctx.open_device(0).unwrap();

        let data = vec![0xd8u8; 100];
        ctx.send_image(0, ImageFormat::Jpeg, 800, 480, &data).unwrap();

        let written = transport.written(0);
        assert_eq!(written.len(), 3); // devinfo, image header, image data
        assert_eq!(
            written[1],
            serialize_header(&Header::image(ImageFormat::Jpeg, 800, 480, 100)).to_vec()
        );
        assert_eq!(written[2], data);
    }

    #[test]
    fn test_empty_image_sends_header_only() {
        let (transport, mut ctx) = ready_bus();
        ctx.open_device(0).unwrap();

        ctx.send_image(0, ImageFormat::Jpeg, 800, 480, &[]).unwrap();
        assert_eq!(transport.written(0).len(), 2); // devinfo + header
    }

    #[test]
    fn test_async_images_stay_ordered() {
        let (transport, mut ctx) = ready_bus();
        ctx.open_device(0).unwrap();

        ctx.send_image_async(0, ImageFormat::Jpeg, 800, 480, &[1; 8])
            .unwrap();
        ctx.send_image_async(0, ImageFormat::Jpeg, 800, 480, &[2; 8])
            .unwrap();
        ctx.send_image_async(0, ImageFormat::Jpeg, 800, 480, &[3; 8])
            .unwrap();

        // Each later submission had to retire the previous transfer.
        assert!(transport.events_pumped() >= 2);
        assert_eq!(
            transport.async_written(0),
            vec![vec![1; 8], vec![2; 8], vec![3; 8]]
        );
        assert_eq!(ctx.take_last_async_error(0).unwrap(), None);
    }

    #[test]
    fn test_headers_go_out_synchronously_even_for_async_images() {
        let (transport, mut ctx) = ready_bus();
        ctx.open_device(0).unwrap();

        ctx.send_image_async(0, ImageFormat::Nv12, 320, 240, &[9; 16])
            .unwrap();

        let written = transport.written(0);
        assert_eq!(written.len(), 2);
        assert_eq!(written[1].len(), HEADER_WIRE_SIZE);
        assert_eq!(
            written[1],
            serialize_header(&Header::image(ImageFormat::Nv12, 320, 240, 16)).to_vec()
        );
    }

    #[test]
    fn test_power_modes_use_documented_bit_patterns() {
        let (transport, mut ctx) = ready_bus();
        ctx.open_device(0).unwrap();

        ctx.set_power_mode(0, PowerMode::Off).unwrap();
        ctx.set_power_mode(0, PowerMode::Low).unwrap();
        ctx.set_power_mode(0, PowerMode::Middle).unwrap();
        ctx.set_power_mode(0, PowerMode::High).unwrap();
        ctx.set_power_mode(0, PowerMode::Turbo).unwrap();

        let written = transport.written(0);
        assert_eq!(written[1], serialize_header(&Header::power(0, 0, 0)).to_vec());
        assert_eq!(written[2], serialize_header(&Header::power(0, 0, 1)).to_vec());
        assert_eq!(written[3], serialize_header(&Header::power(0, 1, 0)).to_vec());
        assert_eq!(written[4], serialize_header(&Header::power(0, 1, 1)).to_vec());
        assert_eq!(written[5], serialize_header(&Header::power(1, 0, 0)).to_vec());
    }

    #[test]
    fn test_default_zoom_rejects_tele() {
        let (transport, mut ctx) = ready_bus();
        ctx.open_device(0).unwrap();

        ctx.set_zoom_mode(0, ZoomMode::HV).unwrap();
        assert!(matches!(
            ctx.set_zoom_mode(0, ZoomMode::Tele),
            Err(Error::InvalidArgument(_))
        ));
        assert_eq!(
            transport.written(0)[1],
            serialize_header(&Header::zoom(1, 0)).to_vec()
        );
    }

    fn ready_picopix_2055() -> (MockTransport, Context<MockTransport>) {
        let transport = MockTransport::new();
        transport.add_device(0x21e7, 0x0016, 2);
        transport.push_reply(0, devinfo_reply(854, 480));
        let mut ctx = Context::with_transport(transport.clone()).unwrap();
        ctx.open_device(0).unwrap();
        (transport, ctx)
    }

    #[test]
    fn test_picopix_tele_command_is_sent_twice() {
        let (transport, mut ctx) = ready_picopix_2055();

        ctx.set_zoom_mode(0, ZoomMode::Tele).unwrap();

        let written = transport.written(0);
        let tele = serialize_header(&Header::command(PacketType::PicopixEnableTele)).to_vec();
        assert_eq!(&written[1..], &[tele.clone(), tele]);
    }

    #[test]
    fn test_picopix_power_uses_dedicated_commands() {
        let (transport, mut ctx) = ready_picopix_2055();

        ctx.set_power_mode(0, PowerMode::High).unwrap();
        assert_eq!(
            transport.written(0)[1],
            serialize_header(&Header::command(PacketType::PicopixPowerHigh)).to_vec()
        );

        assert!(matches!(
            ctx.set_power_mode(0, PowerMode::Off),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            ctx.set_power_mode(0, PowerMode::Turbo),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_unsupported_ops_are_quietly_accepted() {
        let transport = MockTransport::new();
        transport.add_device(0x21e7, 0x0019, 1); // PicoPix 2330
        transport.push_reply(0, devinfo_reply(854, 480));

        let mut ctx = Context::with_transport(transport.clone()).unwrap();
        ctx.open_device(0).unwrap();

        ctx.set_power_mode(0, PowerMode::High).unwrap();
        ctx.set_zoom_mode(0, ZoomMode::Original).unwrap();
        assert_eq!(transport.written(0).len(), 1); // devinfo only
    }

    #[test]
    fn test_handshake_failure_rolls_the_open_back() {
        let transport = MockTransport::new();
        transport.add_device(0x1de1, 0xc101, 2);
        // No scripted reply, so the devinfo read times out.

        let mut ctx = Context::with_transport(transport.clone()).unwrap();
        assert!(matches!(
            ctx.open_device(0),
            Err(Error::Transport(TransportError::Timeout))
        ));
        assert!(transport.all_handles_closed(0));
        assert_eq!(transport.release_count(0), 1);
    }

    #[test]
    fn test_handshake_rejects_wrong_reply_type() {
        let transport = MockTransport::new();
        transport.add_device(0x1de1, 0xc101, 2);
        transport.push_reply(
            0,
            serialize_header(&Header {
                packet_type: PacketType::Zoom.code(),
                direction: Direction::In,
                header_data_len: 0,
                reserved0: 0,
                reserved1: 0,
                payload: Payload::Generic([0; 4]),
            })
            .to_vec(),
        );

        let mut ctx = Context::with_transport(transport).unwrap();
        assert!(matches!(
            ctx.open_device(0),
            Err(Error::UnexpectedPacketType { .. })
        ));
    }

    #[test]
    fn test_handshake_rejects_outbound_direction() {
        let transport = MockTransport::new();
        transport.add_device(0x1de1, 0xc101, 2);
        let mut reply = devinfo_reply(800, 480);
        reply[4] = 0; // flip the direction byte to host-to-device
        transport.push_reply(0, reply);

        let mut ctx = Context::with_transport(transport).unwrap();
        assert!(matches!(
            ctx.open_device(0),
            Err(Error::UnexpectedDirection(0))
        ));
    }

    #[test]
    fn test_device_info_is_cached() {
        let (transport, mut ctx) = ready_bus();
        ctx.open_device(0).unwrap();

        ctx.device_info(0).unwrap();
        ctx.device_info(0).unwrap();
        // Only the initial handshake went over the wire.
        assert_eq!(transport.written(0).len(), 1);
    }

    #[test]
    fn test_scaled_dimensions_use_handshake_resolution() {
        let (_transport, mut ctx) = ready_bus();
        ctx.open_device(0).unwrap();
        assert_eq!(
            ctx.scaled_image_dimensions(0, false, 1600, 480).unwrap(),
            (800, 240)
        );
    }
}
