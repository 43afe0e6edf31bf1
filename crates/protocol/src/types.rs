//! Device setting and image format vocabulary
//!
//! Numeric values match the libam7xxx public API so command-line usage
//! stays familiar (`-p 4` is still turbo).

use crate::error::{ProtocolError, Result};

/// Projector lamp/output power modes.
///
/// How a mode is put on the wire depends on the device model: most
/// models pack it as bit fields in a POWER header, the PicoPix family
/// uses dedicated command codes and supports only Low through High.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerMode {
    Off,
    Low,
    Middle,
    High,
    Turbo,
}

impl PowerMode {
    /// Parse the numeric value used by the CLI tools (0..=4).
    pub fn from_value(value: u32) -> Result<Self> {
        match value {
            0 => Ok(Self::Off),
            1 => Ok(Self::Low),
            2 => Ok(Self::Middle),
            3 => Ok(Self::High),
            4 => Ok(Self::Turbo),
            _ => Err(ProtocolError::InvalidValue {
                what: "power mode",
                value,
            }),
        }
    }
}

/// Display zoom modes.
///
/// `Tele` only exists on the PicoPix family; the bit-field encoding
/// used by the other models has no code for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZoomMode {
    /// Original size
    Original,
    /// Horizontal zoom
    H,
    /// Horizontal and vertical zoom
    HV,
    /// Test mode
    Test,
    /// Tele zoom (PicoPix only)
    Tele,
}

impl ZoomMode {
    /// Parse the numeric value used by the CLI tools (0..=4).
    pub fn from_value(value: u32) -> Result<Self> {
        match value {
            0 => Ok(Self::Original),
            1 => Ok(Self::H),
            2 => Ok(Self::HV),
            3 => Ok(Self::Test),
            4 => Ok(Self::Tele),
            _ => Err(ProtocolError::InvalidValue {
                what: "zoom mode",
                value,
            }),
        }
    }
}

/// Pixel formats the devices accept.
///
/// The library never interprets pixel content; this tag is carried in
/// the image header so the device knows how to decode what follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Jpeg,
    Nv12,
}

impl ImageFormat {
    /// The on-wire format code.
    pub const fn code(self) -> u32 {
        match self {
            Self::Jpeg => 1,
            Self::Nv12 => 2,
        }
    }

    /// Parse the numeric value used by the CLI tools (1 or 2).
    pub fn from_value(value: u32) -> Result<Self> {
        match value {
            1 => Ok(Self::Jpeg),
            2 => Ok(Self::Nv12),
            _ => Err(ProtocolError::InvalidValue {
                what: "image format",
                value,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_power_mode_values() {
        assert_eq!(PowerMode::from_value(0).unwrap(), PowerMode::Off);
        assert_eq!(PowerMode::from_value(4).unwrap(), PowerMode::Turbo);
        assert!(PowerMode::from_value(5).is_err());
    }

    #[test]
    fn test_zoom_mode_values() {
        assert_eq!(ZoomMode::from_value(0).unwrap(), ZoomMode::Original);
        assert_eq!(ZoomMode::from_value(4).unwrap(), ZoomMode::Tele);
        assert!(ZoomMode::from_value(5).is_err());
    }

    #[test]
    fn test_image_format_codes() {
        assert_eq!(ImageFormat::Jpeg.code(), 1);
        assert_eq!(ImageFormat::Nv12.code(), 2);
        assert_eq!(ImageFormat::from_value(2).unwrap(), ImageFormat::Nv12);
        assert!(ImageFormat::from_value(0).is_err());
        assert!(ImageFormat::from_value(3).is_err());
    }
}
