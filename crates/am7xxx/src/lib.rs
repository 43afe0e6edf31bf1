//! Driver for AM7xxx based USB pico projectors and DPFs
//!
//! Supported devices (Acer C1xx, Philips/Sagemcom PicoPix, Aiptek
//! PocketCinema and friends) speak a proprietary command protocol over
//! USB bulk endpoints; see the `am7xxx-protocol` crate for the wire
//! format. This crate handles everything around it: finding supported
//! devices on the bus, claiming and configuring them, moving image
//! payloads synchronously or asynchronously, and the per-model
//! power/zoom command encodings.
//!
//! The entry point is [`Am7xxxContext`]: creating one scans the bus
//! once and builds the ordered device list; devices are then addressed
//! by their stable zero-based index.
//!
//! ```no_run
//! use am7xxx::{Am7xxxContext, ImageFormat};
//!
//! let mut ctx = Am7xxxContext::new()?;
//! ctx.open_device(0)?;
//!
//! let info = ctx.device_info(0)?;
//! println!("native resolution: {}x{}", info.native_width, info.native_height);
//!
//! let image = std::fs::read("picture.jpg")?;
//! ctx.send_image(0, ImageFormat::Jpeg, 800, 480, &image)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod context;
pub mod descriptor;
pub mod device;
pub mod error;
pub mod logging;
pub mod scan;
pub mod transfer;
pub mod transport;

pub use context::{Am7xxxContext, Context, OpenOutcome};
pub use descriptor::{DeviceDescriptor, Ops, PowerOp, SUPPORTED_DEVICES, ZoomOp};
pub use device::{Device, DeviceInfo};
pub use error::{Error, Result};
pub use logging::LogLevel;
pub use transport::{RusbTransport, TransportError, UsbHandle, UsbTransport};

// Re-export the wire vocabulary callers need for the public operations.
pub use am7xxx_protocol::{ImageFormat, PowerMode, ZoomMode};
