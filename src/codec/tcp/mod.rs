// SPDX-FileCopyrightText: Copyright (c) 2018-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Modbus TCP

use super::*;

pub mod client;
pub use crate::frame::tcp::*;

/// Size of the MBAP header that precedes every PDU.
pub const MBAP_HEADER_LEN: usize = 7;

// [MODBUS Application Protocol Specification V1.1b3](https://modbus.org/docs/Modbus_Application_Protocol_V1_1b3.pdf), page 5
// "The size of the MODBUS PDU is limited [...] to 253 bytes"
pub const MAX_PDU_LEN: usize = 253;

/// Largest possible Modbus TCP frame.
pub const MAX_FRAME_LEN: usize = MBAP_HEADER_LEN + MAX_PDU_LEN;

/// An extracted TCP PDU frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedFrame<'a> {
    pub transaction_id: TransactionId,
    pub unit_id: UnitId,
    pub pdu: &'a [u8],
}

/// Write the MBAP header for a PDU of `pdu_len` bytes.
pub fn encode_header(hdr: Header, pdu_len: usize, buf: &mut [u8]) -> Result<usize> {
    if buf.len() < MBAP_HEADER_LEN || pdu_len == 0 || pdu_len > MAX_PDU_LEN {
        return Err(ProtocolError::BufferSize);
    }
    BigEndian::write_u16(&mut buf[0..2], hdr.transaction_id);
    buf[2..4].fill(0);
    // pdu_len is bounded by MAX_PDU_LEN
    BigEndian::write_u16(&mut buf[4..6], pdu_len as u16 + 1);
    buf[6] = hdr.unit_id;
    Ok(MBAP_HEADER_LEN)
}

/// Decode an MBAP header.
///
/// Returns the header and the number of PDU bytes that follow it.
pub fn decode_header(buf: &[u8]) -> Result<(Header, usize)> {
    if buf.len() < MBAP_HEADER_LEN {
        return Err(ProtocolError::BufferSize);
    }
    let transaction_id = BigEndian::read_u16(&buf[0..2]);
    let protocol_id = BigEndian::read_u16(&buf[2..4]);
    if protocol_id != 0 {
        return Err(ProtocolError::ProtocolNotModbus(protocol_id));
    }
    let m_length = BigEndian::read_u16(&buf[4..6]);
    // unit id plus at least the function code
    if m_length < 2 || m_length as usize > MAX_PDU_LEN + 1 {
        return Err(ProtocolError::Length(m_length));
    }
    let hdr = Header {
        transaction_id,
        unit_id: buf[6],
    };
    Ok((hdr, m_length as usize - 1))
}

/// Extract the PDU out of a complete frame.
///
/// The declared MBAP length must match the number of bytes in `buf` exactly.
pub fn extract_frame(buf: &[u8]) -> Result<DecodedFrame<'_>> {
    let (hdr, pdu_len) = decode_header(buf)?;
    let pdu = &buf[MBAP_HEADER_LEN..];
    if pdu.len() != pdu_len {
        return Err(ProtocolError::LengthMismatch(pdu_len + 1, pdu.len() + 1));
    }
    Ok(DecodedFrame {
        transaction_id: hdr.transaction_id,
        unit_id: hdr.unit_id,
        pdu,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_mbap_header() {
        let buf = &mut [0xFF; 7];
        let hdr = Header {
            transaction_id: 0x0102,
            unit_id: 0x11,
        };
        assert_eq!(encode_header(hdr, 5, buf), Ok(7));
        assert_eq!(buf, &[0x01, 0x02, 0x00, 0x00, 0x00, 0x06, 0x11]);
    }

    #[test]
    fn encode_header_rejects_oversized_pdu() {
        let hdr = Header {
            transaction_id: 1,
            unit_id: 1,
        };
        let buf = &mut [0; 7];
        assert!(encode_header(hdr, MAX_PDU_LEN + 1, buf).is_err());
        assert!(encode_header(hdr, 0, buf).is_err());
        assert!(encode_header(hdr, 5, &mut [0; 6]).is_err());
    }

    #[test]
    fn decode_mbap_header() {
        let buf = &[0x01, 0x02, 0x00, 0x00, 0x00, 0x07, 0x01, 0x03];
        let (hdr, pdu_len) = decode_header(buf).unwrap();
        assert_eq!(hdr.transaction_id, 258);
        assert_eq!(hdr.unit_id, 1);
        assert_eq!(pdu_len, 6);
    }

    #[test]
    fn decode_header_with_foreign_protocol() {
        let buf = &[0x01, 0x02, 0x00, 0x01, 0x00, 0x06, 0x01];
        assert_eq!(
            decode_header(buf).err(),
            Some(ProtocolError::ProtocolNotModbus(1))
        );
    }

    #[test]
    fn decode_header_with_invalid_length() {
        let buf = &[0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x01];
        assert_eq!(decode_header(buf).err(), Some(ProtocolError::Length(1)));
        let buf = &[0x00, 0x01, 0x00, 0x00, 0x01, 0x00, 0x01];
        assert_eq!(decode_header(buf).err(), Some(ProtocolError::Length(256)));
    }

    #[test]
    fn decode_truncated_header() {
        assert_eq!(
            decode_header(&[0x00, 0x01, 0x00]).err(),
            Some(ProtocolError::BufferSize)
        );
    }

    mod frame_decoder {

        use super::*;

        #[test]
        fn extract_partly_received_tcp_frame() {
            let buf = &[
                0x01, // transaction id
                0x02, // transaction id
                0x00, // protocol id
                0x00, // protocol id
                0x00, // length
                0x07, // length
                0x01, // unit id
                0x03, // function code
                0x04, // byte count
                0x00, // data
                0x00, // data
                      // missing final data bytes
            ];
            assert_eq!(
                extract_frame(buf).err(),
                Some(ProtocolError::LengthMismatch(7, 5))
            );
        }

        #[test]
        fn extract_frame_with_trailing_bytes() {
            let buf = &[
                0x01, 0x02, 0x00, 0x00, 0x00, 0x06, 0x01, 0x06, 0x00, 0x07, 0xAB, 0xCD, 0x03,
            ];
            assert_eq!(
                extract_frame(buf).err(),
                Some(ProtocolError::LengthMismatch(6, 7))
            );
        }

        #[test]
        fn extract_usual_tcp_response_frame() {
            let buf = &[
                0x01, // transaction id
                0x02, // transaction id
                0x00, // protocol id
                0x00, // protocol id
                0x00, // length
                0x07, // length
                0x01, // unit id
                0x03, // function code
                0x04, // byte count
                0x89, //
                0x02, //
                0x42, //
                0xC7, //
            ];
            let DecodedFrame {
                transaction_id,
                unit_id,
                pdu,
            } = extract_frame(buf).unwrap();
            assert_eq!(transaction_id, 258);
            assert_eq!(unit_id, 0x01);
            assert_eq!(pdu.len(), 6);
        }
    }
}
