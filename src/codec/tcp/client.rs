// SPDX-FileCopyrightText: Copyright (c) 2018-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Modbus TCP client (master) specific functions.
use super::*;

/// Encode an TCP request.
pub fn encode_request(adu: RequestAdu, buf: &mut [u8]) -> Result<usize> {
    let RequestAdu {
        hdr,
        pdu: RequestPdu(req),
    } = adu;
    if buf.len() < MBAP_HEADER_LEN {
        return Err(ProtocolError::BufferSize);
    }
    let len = req.encode(&mut buf[MBAP_HEADER_LEN..])?;
    encode_header(hdr, len, buf)?;
    Ok(len + MBAP_HEADER_LEN)
}

/// Decode an TCP response.
///
/// `buf` must contain exactly one complete frame.
pub fn decode_response(buf: &[u8]) -> Result<ResponseAdu<'_>> {
    let DecodedFrame {
        transaction_id,
        unit_id,
        pdu,
    } = extract_frame(buf)?;
    let hdr = Header {
        transaction_id,
        unit_id,
    };
    ResponsePdu::try_from(pdu)
        .map(|pdu| ResponseAdu { hdr, pdu })
        .inspect_err(|err| {
            log::error!("Failed to decode response PDU: {err}");
        })
}
