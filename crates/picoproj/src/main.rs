//! Test tool: upload a single image to an AM7xxx based projector.
//!
//! The image file is sent as-is; it must already be in a format the
//! device accepts (JPEG or NV12) at a resolution it can display.

use am7xxx::{Am7xxxContext, ImageFormat, LogLevel, PowerMode, ZoomMode};
use anyhow::Context as _;
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "picoproj", version, about = "Upload an image to an AM7xxx device")]
struct Args {
    /// Index of the device to use
    #[arg(short = 'd', long = "device", default_value_t = 0)]
    device: usize,

    /// Image file to upload
    #[arg(short = 'f', long = "file")]
    file: PathBuf,

    /// Image format: 1 = JPEG, 2 = NV12
    #[arg(short = 'F', long = "format", default_value_t = 1)]
    format: u32,

    /// Log level: 0 = fatal .. 5 = trace
    #[arg(short = 'l', long = "log-level", default_value_t = 3)]
    log_level: u32,

    /// Power mode to set: 0 = off .. 4 = turbo
    #[arg(short = 'p', long = "power", default_value_t = 1)]
    power: u32,

    /// Zoom mode to set: 0 = original, 1 = H, 2 = H/V, 3 = test, 4 = tele
    #[arg(short = 'z', long = "zoom", default_value_t = 0)]
    zoom: u32,

    /// Image width in pixels
    #[arg(short = 'W', long = "width", default_value_t = 800)]
    width: u32,

    /// Image height in pixels
    #[arg(short = 'H', long = "height", default_value_t = 480)]
    height: u32,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let log_level = match LogLevel::from_value(args.log_level) {
        Some(level) => level,
        None => {
            eprintln!(
                "Unsupported log level {}, falling back to errors only",
                args.log_level
            );
            LogLevel::Error
        }
    };
    am7xxx::logging::init(log_level);

    let format = ImageFormat::from_value(args.format)?;

    let image = std::fs::read(&args.file)
        .with_context(|| format!("cannot read {}", args.file.display()))?;

    let mut ctx = Am7xxxContext::new().context("cannot initialize the device context")?;
    ctx.set_log_level(log_level);

    ctx.open_device(args.device)
        .with_context(|| format!("cannot open device {}", args.device))?;

    let info = ctx.device_info(args.device)?;
    println!(
        "Native resolution: {}x{}",
        info.native_width, info.native_height
    );

    let zoom = ZoomMode::from_value(args.zoom)?;
    ctx.set_zoom_mode(args.device, zoom)
        .context("cannot set zoom mode")?;

    ctx.set_power_mode(args.device, PowerMode::from_value(args.power)?)
        .context("cannot set power mode")?;

    // The test pattern replaces the display output, so there is no
    // point in uploading the image as well.
    if zoom == ZoomMode::Test {
        println!("Test zoom mode requested, not sending the image.");
        return Ok(());
    }

    if args.width > info.native_width || args.height > info.native_height {
        eprintln!(
            "WARNING: image is {}x{}, not fitting the native resolution, it may be displayed wrongly!",
            args.width, args.height
        );
    }

    ctx.send_image(args.device, format, args.width, args.height, &image)
        .context("cannot send image")?;

    // The context closes the device on drop.
    Ok(())
}
