//! Command header and payload definitions
//!
//! The header is 24 bytes on the wire: a 4-byte packet type, a
//! direction byte, the payload-struct length, two bytes the vendor
//! firmware expects but never documented, and a 16-byte payload region
//! whose interpretation depends on the packet type.

use crate::types::ImageFormat;

/// Packet types understood by AM7xxx devices.
///
/// These are stable numeric identifiers; renumbering them breaks
/// on-the-wire compatibility. The `Picopix*` codes are only accepted
/// by the Philips/Sagemcom PicoPix family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum PacketType {
    /// Query the device for its native resolution
    Devinfo = 0x01,
    /// Image payload follows the header
    Image = 0x02,
    /// Power mode packed as bit fields in the payload
    Power = 0x04,
    /// Zoom mode packed as bit fields in the payload
    Zoom = 0x05,
    /// PicoPix dedicated power-level command (low)
    PicopixPowerLow = 0x15,
    /// PicoPix dedicated power-level command (medium)
    PicopixPowerMedium = 0x16,
    /// PicoPix dedicated power-level command (high)
    PicopixPowerHigh = 0x17,
    /// PicoPix "tele" zoom enable
    PicopixEnableTele = 0x18,
    /// PicoPix "tele" zoom disable
    PicopixDisableTele = 0x19,
}

impl PacketType {
    /// The on-wire code for this packet type.
    pub const fn code(self) -> u32 {
        self as u32
    }

    /// Look up a known packet type by its wire code.
    ///
    /// Returns `None` for codes this library does not know about;
    /// the codec still passes such codes through untouched.
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            0x01 => Some(Self::Devinfo),
            0x02 => Some(Self::Image),
            0x04 => Some(Self::Power),
            0x05 => Some(Self::Zoom),
            0x15 => Some(Self::PicopixPowerLow),
            0x16 => Some(Self::PicopixPowerMedium),
            0x17 => Some(Self::PicopixPowerHigh),
            0x18 => Some(Self::PicopixEnableTele),
            0x19 => Some(Self::PicopixDisableTele),
            _ => None,
        }
    }
}

/// Direction of a packet from the host's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Host to device
    Out,
    /// Device to host
    In,
    /// Any other direction byte seen on the wire
    Unknown(u8),
}

impl Direction {
    pub const fn to_wire(self) -> u8 {
        match self {
            Self::Out => 0,
            Self::In => 1,
            Self::Unknown(raw) => raw,
        }
    }

    pub const fn from_wire(raw: u8) -> Self {
        match raw {
            0 => Self::Out,
            1 => Self::In,
            other => Self::Unknown(other),
        }
    }
}

/// The 16-byte payload region, interpreted according to the packet type.
///
/// The original protocol describes this as a union of structs; here it
/// is a tagged variant, with [`Payload::to_words`] providing the
/// generic four-word view the codec serializes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Payload {
    /// Raw view, used for zero-payload commands and unknown packet types
    Generic([u32; 4]),
    /// Reply payload of a [`PacketType::Devinfo`] round trip
    Devinfo {
        native_width: u32,
        native_height: u32,
        unknown0: u32,
        unknown1: u32,
    },
    /// Describes the image data sent after the header
    Image {
        format: u32,
        width: u32,
        height: u32,
        size: u32,
    },
    /// Bit-field encoding of the default power command
    Power { bit2: u32, bit1: u32, bit0: u32 },
    /// Bit-field encoding of the default zoom command
    Zoom { bit1: u32, bit0: u32 },
}

impl Payload {
    /// The generic four-word view of the payload.
    ///
    /// Every typed variant aliases the same 16 wire bytes, so encoding
    /// through this view is exact for all of them.
    pub const fn to_words(&self) -> [u32; 4] {
        match *self {
            Self::Generic(words) => words,
            Self::Devinfo {
                native_width,
                native_height,
                unknown0,
                unknown1,
            } => [native_width, native_height, unknown0, unknown1],
            Self::Image {
                format,
                width,
                height,
                size,
            } => [format, width, height, size],
            Self::Power { bit2, bit1, bit0 } => [bit2, bit1, bit0, 0],
            Self::Zoom { bit1, bit0 } => [bit1, bit0, 0, 0],
        }
    }

    /// Build the typed view for a known packet type, or `Generic` for
    /// anything else.
    pub fn from_words(packet_type: u32, words: [u32; 4]) -> Self {
        match PacketType::from_code(packet_type) {
            Some(PacketType::Devinfo) => Self::Devinfo {
                native_width: words[0],
                native_height: words[1],
                unknown0: words[2],
                unknown1: words[3],
            },
            Some(PacketType::Image) => Self::Image {
                format: words[0],
                width: words[1],
                height: words[2],
                size: words[3],
            },
            Some(PacketType::Power) => Self::Power {
                bit2: words[0],
                bit1: words[1],
                bit0: words[2],
            },
            Some(PacketType::Zoom) => Self::Zoom {
                bit1: words[0],
                bit0: words[1],
            },
            _ => Self::Generic(words),
        }
    }
}

/// Wire sizes of the payload structs, as carried in `header_data_len`.
const IMAGE_DATA_LEN: u8 = 16;
const POWER_DATA_LEN: u8 = 12;
const ZOOM_DATA_LEN: u8 = 8;

/// Two header bytes with unknown meaning; the vendor driver always
/// sends 0x3e 0x10 in host-built commands.
const RESERVED0: u8 = 0x3e;
const RESERVED1: u8 = 0x10;

/// A command header, 24 bytes on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Raw packet-type code; unknown codes pass through the codec unchanged
    pub packet_type: u32,
    pub direction: Direction,
    /// Length of the meaningful part of the payload region
    pub header_data_len: u8,
    pub reserved0: u8,
    pub reserved1: u8,
    pub payload: Payload,
}

impl Header {
    /// A zero-payload command such as a DEVINFO request or the PicoPix
    /// power/zoom codes.
    pub const fn command(packet_type: PacketType) -> Self {
        Self {
            packet_type: packet_type.code(),
            direction: Direction::Out,
            header_data_len: 0,
            reserved0: RESERVED0,
            reserved1: RESERVED1,
            payload: Payload::Generic([0; 4]),
        }
    }

    /// Header announcing `size` bytes of image data in the given format.
    pub const fn image(format: ImageFormat, width: u32, height: u32, size: u32) -> Self {
        Self {
            packet_type: PacketType::Image.code(),
            direction: Direction::Out,
            header_data_len: IMAGE_DATA_LEN,
            reserved0: RESERVED0,
            reserved1: RESERVED1,
            payload: Payload::Image {
                format: format.code(),
                width,
                height,
                size,
            },
        }
    }

    /// Default-encoding power command with the mode packed as bits.
    pub const fn power(bit2: u32, bit1: u32, bit0: u32) -> Self {
        Self {
            packet_type: PacketType::Power.code(),
            direction: Direction::Out,
            header_data_len: POWER_DATA_LEN,
            reserved0: RESERVED0,
            reserved1: RESERVED1,
            payload: Payload::Power { bit2, bit1, bit0 },
        }
    }

    /// Default-encoding zoom command with the mode packed as bits.
    pub const fn zoom(bit1: u32, bit0: u32) -> Self {
        Self {
            packet_type: PacketType::Zoom.code(),
            direction: Direction::Out,
            header_data_len: ZOOM_DATA_LEN,
            reserved0: RESERVED0,
            reserved1: RESERVED1,
            payload: Payload::Zoom { bit1, bit0 },
        }
    }
}
