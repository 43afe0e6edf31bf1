//! Protocol error types

use thiserror::Error;

/// Protocol-level errors
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Header buffer is not exactly the wire size
    #[error("wrong header length: expected {expected} bytes, got {actual}")]
    WrongLength { expected: usize, actual: usize },

    /// A numeric mode or format value outside the known range
    #[error("invalid {what} value: {value}")]
    InvalidValue { what: &'static str, value: u32 },
}

/// Type alias for protocol results
pub type Result<T> = std::result::Result<T, ProtocolError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ProtocolError::WrongLength {
            expected: 24,
            actual: 12,
        };
        let msg = format!("{}", err);
        assert!(msg.contains("24"));
        assert!(msg.contains("12"));

        let err = ProtocolError::InvalidValue {
            what: "power mode",
            value: 9,
        };
        assert!(format!("{}", err).contains("power mode"));
    }
}
