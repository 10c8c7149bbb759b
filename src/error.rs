// SPDX-FileCopyrightText: Copyright (c) 2018-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::io;

use thiserror::Error;

use crate::{
    frame::{Address, ExceptionResponse, FunctionCode, TransactionId, UnitId},
    value::{Number, NumberKind, RegisterValue, ValueType},
};

/// modbus-cli Error
#[derive(Debug, Error)]
pub enum Error {
    /// The connection to the device failed
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
    /// The device sent something that is not valid Modbus TCP
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),
    /// The device answered with a Modbus exception
    #[error("Device exception: {0}")]
    Exception(ExceptionResponse),
    /// The request was rejected before anything was sent
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),
    /// Some registers of a multi-register value were written, others were not.
    ///
    /// The device is left in an intermediate state.
    #[error(
        "Partial write: register {address} failed after writing register(s) {written:?}: {source}"
    )]
    PartialWrite {
        /// The register that could not be written
        address: Address,
        /// Registers that were written successfully before the failure
        written: Vec<Address>,
        source: Box<Error>,
    },
    /// Writing a value failed before any of its registers was changed
    #[error("Writing register {address} failed: {source}")]
    WriteFailed {
        /// The first register of the value
        address: Address,
        source: Box<Error>,
    },
    /// A verified write failed, the device was read back afterwards
    #[error(
        "Failed to change value from {previous}, read back {}: {source}",
        readback(.current)
    )]
    ChangeFailed {
        /// Value read before writing
        previous: RegisterValue,
        /// Value read after the failed write, if the device still answered
        current: Option<RegisterValue>,
        source: Box<Error>,
    },
    /// Invalid session configuration
    #[error("Invalid configuration: {0}")]
    Config(String),
}

fn readback(current: &Option<RegisterValue>) -> String {
    current.map_or_else(|| "nothing".to_owned(), |value| value.to_string())
}

impl From<ExceptionResponse> for Error {
    fn from(rsp: ExceptionResponse) -> Self {
        Self::Exception(rsp)
    }
}

/// Failures of the TCP connection itself.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The session has no open connection
    #[error("Not connected")]
    NotConnected,
    #[error("Failed to connect to {addr}: {source}")]
    Connect { addr: String, source: io::Error },
    #[error("Failed to send request: {0}")]
    Write(#[source] io::Error),
    #[error("Failed to receive response: {0}")]
    Read(#[source] io::Error),
}

impl TransportError {
    /// `true` if the underlying I/O operation ran into the configured timeout.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        let err = match self {
            Self::NotConnected => return false,
            Self::Connect { source, .. } => source,
            Self::Write(err) | Self::Read(err) => err,
        };
        matches!(
            err.kind(),
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock
        )
    }
}

/// Malformed or unexpected frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// Invalid coil value
    #[error("Invalid coil value: 0x{0:0>4X}")]
    CoilValue(u16),
    /// Invalid buffer size
    #[error("Invalid buffer size")]
    BufferSize,
    /// Invalid function code
    #[error("Invalid function code: 0x{0:0>2X}")]
    FnCode(u8),
    /// Invalid exception code
    #[error("Invalid exception code: 0x{0:0>2X}")]
    ExceptionCode(u8),
    /// Invalid exception function code
    #[error("Invalid exception function code: 0x{0:0>2X}")]
    ExceptionFnCode(u8),
    /// Invalid byte count
    #[error("Invalid byte count: {0}")]
    ByteCount(u8),
    /// Declared MBAP length out of range
    #[error("Invalid MBAP length field: {0}")]
    Length(u16),
    /// Length Mismatch
    #[error("Length Mismatch: Length Field: {0}, PDU Len + 1: {1}")]
    LengthMismatch(usize, usize),
    /// Protocol not Modbus
    #[error("Protocol not Modbus(0), received {0} instead")]
    ProtocolNotModbus(u16),
    /// Response does not belong to the request that was sent
    #[error("Transaction id mismatch: expected {expected}, received {actual}")]
    TransactionId {
        expected: TransactionId,
        actual: TransactionId,
    },
    /// Response comes from another unit
    #[error("Unit id mismatch: expected {expected}, received {actual}")]
    UnitId { expected: UnitId, actual: UnitId },
    /// Response has a different function code than the request
    #[error("Unexpected function code: expected {expected}, received {actual}")]
    UnexpectedFunction {
        expected: FunctionCode,
        actual: FunctionCode,
    },
    /// A single write was not echoed back verbatim
    #[error("Write response does not echo the request")]
    EchoMismatch,
}

/// Values or requests that cannot be encoded.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum CodecError {
    /// The value does not fit the requested type
    #[error("Value {value} is out of range for {ty}")]
    OutOfRange { value: Number, ty: ValueType },
    /// A fractional value was given for an integer type
    #[error("Value {value} is not an integer as required by {ty}")]
    NotAnInteger { value: Number, ty: ValueType },
    /// Number of registers does not match the value type
    #[error("{ty} needs exactly {expected} register(s), got {actual}")]
    Quantity {
        ty: ValueType,
        expected: usize,
        actual: usize,
    },
    /// No register type exists for this width and kind
    #[error("Unsupported register type: {width}-bit {kind}")]
    UnsupportedType { width: u16, kind: NumberKind },
    /// The value would run past the last register address
    #[error("{count} register(s) starting at {address} exceed the address space")]
    AddressRange { address: Address, count: usize },
}

/// Text that is neither an integer nor a float.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid number: {0:?}")]
pub struct ParseNumberError(pub String);
