// SPDX-FileCopyrightText: Copyright (c) 2018-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{error::ProtocolError, frame::*, util::*};
use byteorder::{BigEndian, ByteOrder};

pub mod tcp;

type Result<T> = core::result::Result<T, ProtocolError>;

impl TryFrom<u8> for Exception {
    type Error = ProtocolError;

    fn try_from(code: u8) -> Result<Self> {
        use crate::frame::Exception::*;
        let ex = match code {
            0x01 => IllegalFunction,
            0x02 => IllegalDataAddress,
            0x03 => IllegalDataValue,
            0x04 => ServerDeviceFailure,
            0x05 => Acknowledge,
            0x06 => ServerDeviceBusy,
            0x08 => MemoryParityError,
            0x0A => GatewayPathUnavailable,
            0x0B => GatewayTargetDevice,
            _ => {
                return Err(ProtocolError::ExceptionCode(code));
            }
        };
        Ok(ex)
    }
}

impl From<ExceptionResponse> for [u8; 2] {
    fn from(ex: ExceptionResponse) -> [u8; 2] {
        let fn_code: u8 = ex.function.into();
        debug_assert!(fn_code < 0x80);
        [fn_code + 0x80, ex.exception as u8]
    }
}

impl TryFrom<&[u8]> for ExceptionResponse {
    type Error = ProtocolError;

    fn try_from(bytes: &[u8]) -> Result<Self> {
        let [fn_err_code, code] = bytes else {
            return Err(ProtocolError::BufferSize);
        };
        if *fn_err_code < 0x80 {
            return Err(ProtocolError::ExceptionFnCode(*fn_err_code));
        }
        let function = (fn_err_code - 0x80).into();
        let exception = Exception::try_from(*code)?;
        Ok(ExceptionResponse {
            function,
            exception,
        })
    }
}

impl Request {
    /// Serialize the request PDU into `buf`.
    ///
    /// Returns the number of bytes written.
    pub fn encode(&self, buf: &mut [u8]) -> Result<usize> {
        let len = self.pdu_len();
        if buf.len() < len {
            return Err(ProtocolError::BufferSize);
        }
        buf[0] = FunctionCode::from(*self).value();
        let (addr, payload) = match *self {
            Self::ReadCoils(addr, quantity) | Self::ReadHoldingRegisters(addr, quantity) => {
                (addr, quantity)
            }
            Self::WriteSingleCoil(addr, state) => (addr, bool_to_u16_coil(state)),
            Self::WriteSingleRegister(addr, word) => (addr, word),
        };
        BigEndian::write_u16(&mut buf[1..3], addr);
        BigEndian::write_u16(&mut buf[3..5], payload);
        Ok(len)
    }
}

impl TryFrom<&[u8]> for Request {
    type Error = ProtocolError;

    fn try_from(bytes: &[u8]) -> Result<Self> {
        if bytes.is_empty() {
            return Err(ProtocolError::BufferSize);
        }

        let fn_code = bytes[0];

        if bytes.len() != 5 {
            return Err(ProtocolError::BufferSize);
        }

        use crate::frame::Request::*;
        use FunctionCode as f;

        let addr = BigEndian::read_u16(&bytes[1..3]);
        let payload = BigEndian::read_u16(&bytes[3..5]);
        let req = match FunctionCode::from(fn_code) {
            f::ReadCoils => ReadCoils(addr, payload),
            f::ReadHoldingRegisters => ReadHoldingRegisters(addr, payload),
            f::WriteSingleCoil => WriteSingleCoil(addr, u16_coil_to_bool(payload)?),
            f::WriteSingleRegister => WriteSingleRegister(addr, payload),
            f::Custom(code) => return Err(ProtocolError::FnCode(code)),
        };
        Ok(req)
    }
}

impl Response<'_> {
    /// Serialize the response PDU into `buf`.
    ///
    /// Returns the number of bytes written.
    pub fn encode(&self, buf: &mut [u8]) -> Result<usize> {
        let len = self.pdu_len();
        if buf.len() < len {
            return Err(ProtocolError::BufferSize);
        }
        buf[0] = FunctionCode::from(*self).value();
        match *self {
            Self::ReadCoils(coils) => {
                let packed_len = coils.packed_len();
                buf[1] = u8::try_from(packed_len).map_err(|_| ProtocolError::BufferSize)?;
                buf[2..2 + packed_len].copy_from_slice(&coils.data[..packed_len]);
            }
            Self::ReadHoldingRegisters(words) => {
                buf[1] = u8::try_from(words.len() * 2).map_err(|_| ProtocolError::BufferSize)?;
                words.copy_to(&mut buf[2..]);
            }
            Self::WriteSingleCoil(addr, state) => {
                BigEndian::write_u16(&mut buf[1..3], addr);
                BigEndian::write_u16(&mut buf[3..5], bool_to_u16_coil(state));
            }
            Self::WriteSingleRegister(addr, word) => {
                BigEndian::write_u16(&mut buf[1..3], addr);
                BigEndian::write_u16(&mut buf[3..5], word);
            }
        }
        Ok(len)
    }
}

impl<'r> TryFrom<&'r [u8]> for Response<'r> {
    type Error = ProtocolError;

    fn try_from(bytes: &'r [u8]) -> Result<Self> {
        use crate::frame::Response::*;
        if bytes.is_empty() {
            return Err(ProtocolError::BufferSize);
        }
        let fn_code = bytes[0];
        let Some(min_len) = min_response_pdu_len(fn_code.into()) else {
            return Err(ProtocolError::FnCode(fn_code));
        };
        if bytes.len() < min_len {
            return Err(ProtocolError::BufferSize);
        }
        use FunctionCode as f;
        let rsp = match FunctionCode::from(fn_code) {
            f::ReadCoils | f::ReadHoldingRegisters => {
                let byte_count = bytes[1] as usize;
                if byte_count + 2 != bytes.len() {
                    return Err(ProtocolError::ByteCount(bytes[1]));
                }
                let data = &bytes[2..];
                if fn_code == f::ReadCoils.value() {
                    // The response carries no information about the exact
                    // requested quantity, therefore the whole bytes are meant.
                    ReadCoils(Coils {
                        quantity: byte_count * 8,
                        data,
                    })
                } else {
                    if byte_count % 2 != 0 {
                        return Err(ProtocolError::ByteCount(bytes[1]));
                    }
                    ReadHoldingRegisters(Data {
                        quantity: byte_count / 2,
                        data,
                    })
                }
            }
            f::WriteSingleCoil | f::WriteSingleRegister => {
                if bytes.len() != 5 {
                    return Err(ProtocolError::BufferSize);
                }
                let addr = BigEndian::read_u16(&bytes[1..3]);
                let payload = BigEndian::read_u16(&bytes[3..5]);
                if fn_code == f::WriteSingleCoil.value() {
                    WriteSingleCoil(addr, u16_coil_to_bool(payload)?)
                } else {
                    WriteSingleRegister(addr, payload)
                }
            }
            f::Custom(code) => return Err(ProtocolError::FnCode(code)),
        };
        Ok(rsp)
    }
}

impl<'r> TryFrom<&'r [u8]> for ResponsePdu<'r> {
    type Error = ProtocolError;

    fn try_from(bytes: &'r [u8]) -> Result<Self> {
        match bytes.first() {
            None => Err(ProtocolError::BufferSize),
            Some(fn_code) if *fn_code >= 0x80 => {
                ExceptionResponse::try_from(bytes).map(|ex| ResponsePdu(Err(ex)))
            }
            Some(_) => Response::try_from(bytes).map(|rsp| ResponsePdu(Ok(rsp))),
        }
    }
}

const fn min_response_pdu_len(fn_code: FunctionCode) -> Option<usize> {
    use FunctionCode::*;
    match fn_code {
        ReadCoils | ReadHoldingRegisters => Some(2),
        WriteSingleCoil | WriteSingleRegister => Some(5),
        Custom(_) => None,
    }
}
