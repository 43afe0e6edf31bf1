//! Bus enumeration
//!
//! Scanning serves two callers: building the context's device list at
//! startup, and later locating the physical device that backs a given
//! list index when the caller opens it. Both walk the bus the same way
//! and only consider models present in [`SUPPORTED_DEVICES`].
//!
//! [`SUPPORTED_DEVICES`]: crate::descriptor::SUPPORTED_DEVICES

use crate::descriptor::find_supported;
use crate::device::Device;
use crate::error::{Error, Result};
use crate::transport::UsbTransport;
use tracing::{debug, info};

/// Populate `devices` with every supported device on the bus, in bus
/// order. The list must be empty; indices handed out here stay valid
/// for the life of the context.
pub fn build_device_list<T: UsbTransport>(
    transport: &T,
    devices: &mut Vec<Device<T>>,
) -> Result<()> {
    if !devices.is_empty() {
        return Err(Error::InvalidArgument("device list already built"));
    }

    for device in transport.list_devices()? {
        // Devices with unreadable descriptors cannot be ours.
        let Some((vendor_id, product_id)) = transport.device_ids(&device) else {
            continue;
        };
        if let Some(descriptor) = find_supported(vendor_id, product_id) {
            info!(
                device = descriptor.name,
                index = devices.len(),
                vendor_id = %format_args!("{vendor_id:04x}"),
                product_id = %format_args!("{product_id:04x}"),
                "found supported device"
            );
            devices.push(Device::new(descriptor, devices.len()));
        }
    }

    debug!(count = devices.len(), "bus scan finished");
    Ok(())
}

/// Find the physical device backing list index `index` by re-walking
/// the bus and counting supported devices in bus order.
pub fn find_physical_device<T: UsbTransport>(
    transport: &T,
    index: usize,
) -> Result<T::DeviceRef> {
    let mut current = 0;
    for device in transport.list_devices()? {
        let Some((vendor_id, product_id)) = transport.device_ids(&device) else {
            continue;
        };
        if find_supported(vendor_id, product_id).is_some() {
            if current == index {
                return Ok(device);
            }
            current += 1;
        }
    }
    Err(Error::NotFound(index))
}
