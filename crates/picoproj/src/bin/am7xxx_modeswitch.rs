//! Switch an AM7xxx device from USB mass storage to generic mode.
//!
//! Some devices enumerate as a mass storage device first and need a
//! magic SCSI-like command before they expose the projector interface.
//! This is a minimal replacement for a usb-modeswitch rule; after the
//! switch the device re-enumerates with its generic product ID.

use anyhow::{bail, Context as _};
use rusb::UsbContext;
use std::time::Duration;

const AM7XXX_STORAGE_VID: u16 = 0x1de1;
const AM7XXX_STORAGE_PID: u16 = 0x1101;
const AM7XXX_STORAGE_CONFIGURATION: u8 = 1;
const AM7XXX_STORAGE_INTERFACE: u8 = 0;
const AM7XXX_STORAGE_OUT_ENDPOINT: u8 = 0x01;

/// Mass-storage command block that triggers the mode switch.
const SWITCH_COMMAND: [u8; 32] = [
    0x55, 0x53, 0x42, 0x43, 0x08, 0x70, 0x52, 0x89, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x0c,
    0xff, 0x02, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x00,
];

fn main() -> anyhow::Result<()> {
    let context = rusb::Context::new().context("cannot initialize usb")?;

    let Some(handle) =
        context.open_device_with_vid_pid(AM7XXX_STORAGE_VID, AM7XXX_STORAGE_PID)
    else {
        bail!(
            "no device in storage mode ({AM7XXX_STORAGE_VID:04x}:{AM7XXX_STORAGE_PID:04x}) found"
        );
    };

    handle
        .set_active_configuration(AM7XXX_STORAGE_CONFIGURATION)
        .context("cannot set configuration")?;

    // Best effort; the claim below fails if a driver is really in the way.
    if let Err(e) = handle.set_auto_detach_kernel_driver(true) {
        eprintln!("warning: cannot auto-detach kernel driver: {e}");
    }

    handle
        .claim_interface(AM7XXX_STORAGE_INTERFACE)
        .context("cannot claim interface")?;

    let transferred = handle
        .write_bulk(AM7XXX_STORAGE_OUT_ENDPOINT, &SWITCH_COMMAND, Duration::ZERO)
        .context("cannot send the switch command")?;
    if transferred != SWITCH_COMMAND.len() {
        bail!(
            "short transfer sending the switch command: {transferred} of {} bytes",
            SWITCH_COMMAND.len()
        );
    }

    println!("Mode switch sent; the device will now re-enumerate.");

    if let Err(e) = handle.release_interface(AM7XXX_STORAGE_INTERFACE) {
        // The device may already have dropped off the bus.
        eprintln!("warning: cannot release interface: {e}");
    }
    Ok(())
}
