//! Driver error types

use crate::transport::TransportError;
use am7xxx_protocol::ProtocolError;
use thiserror::Error;

/// Errors returned by the public driver operations.
///
/// Two conditions deliberately do not appear here: opening an
/// already-open device is reported as
/// [`OpenOutcome::AlreadyOpen`](crate::OpenOutcome), and an operation a
/// model simply does not support succeeds with a warning-level
/// diagnostic instead of failing.
#[derive(Debug, Error)]
pub enum Error {
    /// No supported device with the given index
    #[error("no supported device with index {0}")]
    NotFound(usize),

    /// The operation needs an open device session
    #[error("device {0} is not open")]
    DeviceNotOpen(usize),

    /// A mode or parameter the requested operation cannot encode
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// The device configuration changed while claiming the interface
    ///
    /// Some host stacks re-negotiate the configuration on claim; the
    /// session is unusable when that happens.
    #[error("configuration changed after claiming the interface (expected {expected}, got {actual})")]
    ConfigurationChanged { expected: u8, actual: u8 },

    /// A reply carried a packet type other than the one requested
    #[error("expected packet type {expected:#04x}, got {actual:#04x}")]
    UnexpectedPacketType { expected: u32, actual: u32 },

    /// A reply was not a device-to-host packet
    #[error("expected a device-to-host packet, got direction {0}")]
    UnexpectedDirection(u8),

    /// The transport reported success but moved fewer bytes than requested
    #[error("short transfer: {transferred} of {expected} bytes")]
    ShortTransfer { expected: usize, transferred: usize },

    /// Waiting for an asynchronous transfer gave up after repeated
    /// event-pump failures
    #[error("event pump failed {0} times, giving up on the transfer")]
    EventPumpFailed(u32),

    /// USB transport error
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Wire protocol error
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// Type alias for driver results
pub type Result<T> = std::result::Result<T, Error>;
