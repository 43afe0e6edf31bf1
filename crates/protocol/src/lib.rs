//! Wire protocol for AM7xxx based USB pico projectors and DPFs
//!
//! Every command exchanged with an AM7xxx device starts with a fixed
//! 24-byte header, sent over the bulk endpoints before any payload
//! bytes. This crate defines the header and its typed payload
//! variants, the stable packet-type codes, and the little-endian
//! codec for the on-wire layout. It knows nothing about USB itself.
//!
//! # Example
//!
//! ```
//! use am7xxx_protocol::{Header, ImageFormat};
//! use am7xxx_protocol::{serialize_header, deserialize_header, HEADER_WIRE_SIZE};
//!
//! let header = Header::image(ImageFormat::Jpeg, 800, 480, 57344);
//! let wire = serialize_header(&header);
//! assert_eq!(wire.len(), HEADER_WIRE_SIZE);
//!
//! let decoded = deserialize_header(&wire).unwrap();
//! assert_eq!(decoded, header);
//! ```

pub mod codec;
pub mod error;
pub mod header;
pub mod types;

pub use codec::{HEADER_WIRE_SIZE, deserialize_header, serialize_header};
pub use error::{ProtocolError, Result};
pub use header::{Direction, Header, PacketType, Payload};
pub use types::{ImageFormat, PowerMode, ZoomMode};
