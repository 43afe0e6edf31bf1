//! Header serialization and deserialization
//!
//! The on-wire header size is always 24 bytes, regardless of how the
//! in-memory types are laid out. All multi-byte fields are
//! little-endian irrespective of host byte order:
//!
//! ```text
//! [packet_type: u32 LE][direction: u8][header_data_len: u8]
//! [reserved0: u8][reserved1: u8][payload: 4 x u32 LE]
//! ```
//!
//! This layer performs no validation of packet-type values: unknown
//! codes round-trip unchanged, and it is up to the caller to decide
//! whether a reply is acceptable for the operation it requested.

use crate::error::{ProtocolError, Result};
use crate::header::{Direction, Header, Payload};
use byteorder::{ByteOrder, LittleEndian};

/// Size of the header on the wire.
pub const HEADER_WIRE_SIZE: usize = 24;

/// Encode a header into its exact 24-byte wire form.
pub fn serialize_header(header: &Header) -> [u8; HEADER_WIRE_SIZE] {
    let mut buf = [0u8; HEADER_WIRE_SIZE];

    LittleEndian::write_u32(&mut buf[0..4], header.packet_type);
    buf[4] = header.direction.to_wire();
    buf[5] = header.header_data_len;
    buf[6] = header.reserved0;
    buf[7] = header.reserved1;

    // Serialize through the generic four-word view; every typed
    // payload aliases the same 16 bytes.
    let words = header.payload.to_words();
    for (i, word) in words.iter().enumerate() {
        LittleEndian::write_u32(&mut buf[8 + i * 4..12 + i * 4], *word);
    }

    buf
}

/// Decode a header from its 24-byte wire form.
///
/// The exact inverse of [`serialize_header`]. Fails only on a wrong
/// input length; field values are never rejected here.
pub fn deserialize_header(buf: &[u8]) -> Result<Header> {
    if buf.len() != HEADER_WIRE_SIZE {
        return Err(ProtocolError::WrongLength {
            expected: HEADER_WIRE_SIZE,
            actual: buf.len(),
        });
    }

    let packet_type = LittleEndian::read_u32(&buf[0..4]);

    let mut words = [0u32; 4];
    for (i, word) in words.iter_mut().enumerate() {
        *word = LittleEndian::read_u32(&buf[8 + i * 4..12 + i * 4]);
    }

    Ok(Header {
        packet_type,
        direction: Direction::from_wire(buf[4]),
        header_data_len: buf[5],
        reserved0: buf[6],
        reserved1: buf[7],
        payload: Payload::from_words(packet_type, words),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::PacketType;
    use crate::types::ImageFormat;

    #[test]
    fn test_serialized_size_is_fixed() {
        let wire = serialize_header(&Header::command(PacketType::Devinfo));
        assert_eq!(wire.len(), HEADER_WIRE_SIZE);
    }

    #[test]
    fn test_image_header_wire_layout() {
        // Known-good image header captured from the vendor driver:
        // 02 00 00 00 00 10 3e 10 01 00 00 00 20 03 00 00 e0 01 00 00 53 e8 00 00
        let header = Header {
            packet_type: PacketType::Image.code(),
            direction: Direction::Out,
            header_data_len: 0x10,
            reserved0: 0x3e,
            reserved1: 0x10,
            payload: Payload::Image {
                format: 1,
                width: 0x320,
                height: 0x1e0,
                size: 0xe853,
            },
        };

        let wire = serialize_header(&header);
        assert_eq!(
            wire,
            [
                0x02, 0x00, 0x00, 0x00, 0x00, 0x10, 0x3e, 0x10, 0x01, 0x00, 0x00, 0x00, 0x20,
                0x03, 0x00, 0x00, 0xe0, 0x01, 0x00, 0x00, 0x53, 0xe8, 0x00, 0x00,
            ]
        );
    }

    #[test]
    fn test_roundtrip_typed_headers() {
        let headers = [
            Header::command(PacketType::PicopixPowerLow),
            Header::command(PacketType::PicopixEnableTele),
            Header::image(ImageFormat::Nv12, 1600, 960, 2_304_000),
            Header::power(1, 0, 0),
            Header::zoom(0, 1),
        ];

        for header in headers {
            let wire = serialize_header(&header);
            let decoded = deserialize_header(&wire).unwrap();
            assert_eq!(decoded, header);
        }
    }

    #[test]
    fn test_roundtrip_devinfo_reply() {
        let header = Header {
            packet_type: PacketType::Devinfo.code(),
            direction: Direction::In,
            header_data_len: 0x10,
            reserved0: 0,
            reserved1: 0,
            payload: Payload::Devinfo {
                native_width: 854,
                native_height: 480,
                unknown0: 0x12345678,
                unknown1: 0x9abcdef0,
            },
        };

        let wire = serialize_header(&header);
        assert_eq!(deserialize_header(&wire).unwrap(), header);
    }

    #[test]
    fn test_unknown_packet_type_passes_through() {
        let header = Header {
            packet_type: 0xdead_beef,
            direction: Direction::Unknown(9),
            header_data_len: 3,
            reserved0: 0xaa,
            reserved1: 0xbb,
            payload: Payload::Generic([1, 2, 3, 4]),
        };

        let wire = serialize_header(&header);
        let decoded = deserialize_header(&wire).unwrap();
        assert_eq!(decoded, header);
        assert_eq!(serialize_header(&decoded), wire);
    }

    #[test]
    fn test_wrong_length_rejected() {
        let result = deserialize_header(&[0u8; 23]);
        assert!(matches!(
            result,
            Err(ProtocolError::WrongLength {
                expected: 24,
                actual: 23
            })
        ));

        let result = deserialize_header(&[0u8; 25]);
        assert!(matches!(result, Err(ProtocolError::WrongLength { .. })));
    }

    #[test]
    fn test_fields_are_little_endian() {
        let wire = serialize_header(&Header::image(ImageFormat::Jpeg, 0x0102_0304, 0, 0));
        // width is the second payload word
        assert_eq!(&wire[12..16], &[0x04, 0x03, 0x02, 0x01]);
    }
}
