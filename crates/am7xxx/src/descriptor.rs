//! Static table of supported projector and picture-frame models
//!
//! Each model carries the USB configuration/interface to use and which
//! power/zoom command dialect its firmware speaks. Most devices use the
//! generic bit-pattern commands; the later Philips PicoPix models use
//! dedicated command packets, and the PicoPix 2330 accepts neither.

/// Which power command dialect a device speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerOp {
    /// Generic bit-pattern power packet
    Default,
    /// Philips PicoPix dedicated low/medium/high commands
    Picopix,
}

/// Which zoom command dialect a device speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZoomOp {
    /// Generic bit-pattern zoom packet
    Default,
    /// Philips PicoPix tele enable/disable commands
    Picopix,
}

/// Per-model operation support; `None` means the device ignores or
/// rejects that command family.
#[derive(Debug, Clone, Copy)]
pub struct Ops {
    pub power: Option<PowerOp>,
    pub zoom: Option<ZoomOp>,
}

const DEFAULT_OPS: Ops = Ops {
    power: Some(PowerOp::Default),
    zoom: Some(ZoomOp::Default),
};

/// Static description of a supported device model.
#[derive(Debug)]
pub struct DeviceDescriptor {
    pub name: &'static str,
    pub vendor_id: u16,
    pub product_id: u16,
    /// USB configuration to select before claiming the interface
    pub configuration: u8,
    pub interface_number: u8,
    pub ops: Ops,
}

/// All models the driver knows how to talk to.
pub static SUPPORTED_DEVICES: &[DeviceDescriptor] = &[
    DeviceDescriptor {
        name: "Acer C110",
        vendor_id: 0x1de1,
        product_id: 0xc101,
        configuration: 2,
        interface_number: 0,
        ops: DEFAULT_OPS,
    },
    DeviceDescriptor {
        name: "Acer C112",
        vendor_id: 0x1de1,
        product_id: 0x5501,
        configuration: 2,
        interface_number: 0,
        ops: DEFAULT_OPS,
    },
    DeviceDescriptor {
        name: "Aiptek PocketCinema T25",
        vendor_id: 0x08ca,
        product_id: 0x2144,
        configuration: 2,
        interface_number: 0,
        ops: DEFAULT_OPS,
    },
    DeviceDescriptor {
        name: "Philips/Sagemcom PicoPix 1020",
        vendor_id: 0x21e7,
        product_id: 0x000e,
        configuration: 2,
        interface_number: 0,
        ops: DEFAULT_OPS,
    },
    DeviceDescriptor {
        name: "Philips/Sagemcom PicoPix 2055",
        vendor_id: 0x21e7,
        product_id: 0x0016,
        configuration: 2,
        interface_number: 0,
        ops: Ops {
            power: Some(PowerOp::Picopix),
            zoom: Some(ZoomOp::Picopix),
        },
    },
    DeviceDescriptor {
        name: "Philips/Sagemcom PicoPix 2330",
        vendor_id: 0x21e7,
        product_id: 0x0019,
        configuration: 1,
        interface_number: 0,
        ops: Ops {
            power: None,
            zoom: None,
        },
    },
];

/// Look a model up by its USB IDs.
pub fn find_supported(vendor_id: u16, product_id: u16) -> Option<&'static DeviceDescriptor> {
    SUPPORTED_DEVICES
        .iter()
        .find(|d| d.vendor_id == vendor_id && d.product_id == product_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_by_ids() {
        let desc = find_supported(0x1de1, 0xc101).unwrap();
        assert_eq!(desc.name, "Acer C110");
        assert_eq!(desc.configuration, 2);

        assert!(find_supported(0x1de1, 0xffff).is_none());
    }

    #[test]
    fn test_picopix_2330_has_no_power_or_zoom() {
        let desc = find_supported(0x21e7, 0x0019).unwrap();
        assert!(desc.ops.power.is_none());
        assert!(desc.ops.zoom.is_none());
        assert_eq!(desc.configuration, 1);
    }

    #[test]
    fn test_no_duplicate_usb_ids() {
        for (i, a) in SUPPORTED_DEVICES.iter().enumerate() {
            for b in &SUPPORTED_DEVICES[i + 1..] {
                assert!(
                    (a.vendor_id, a.product_id) != (b.vendor_id, b.product_id),
                    "{} and {} share USB IDs",
                    a.name,
                    b.name
                );
            }
        }
    }
}
