// SPDX-FileCopyrightText: Copyright (c) 2018-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Reading and writing coils and typed register values.

use crate::{
    error::{CodecError, Error, ProtocolError},
    frame::{
        Address, Coil, ExceptionResponse, FunctionCode, Quantity, Request, Response, ResponsePdu,
        UnitId, Word,
    },
    session::Transport,
    util::packed_coils_len,
    value::{Number, RegisterValue, ValueType, WordOrder},
};

type Result<T> = core::result::Result<T, Error>;

/// The outcome of a verified write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Change<V> {
    /// Value read before writing
    pub previous: V,
    /// Value that was sent to the device
    pub requested: V,
    /// Value read back after writing
    pub current: V,
}

impl<V: PartialEq> Change<V> {
    /// `true` if the device stores exactly what was requested.
    #[must_use]
    pub fn is_exact(&self) -> bool {
        self.current == self.requested
    }
}

/// Modbus TCP master bound to a single unit.
#[derive(Debug)]
pub struct Client<T> {
    transport: T,
    unit_id: UnitId,
}

impl<T> Client<T> {
    pub const fn new(transport: T, unit_id: UnitId) -> Self {
        Self { transport, unit_id }
    }

    #[must_use]
    pub const fn unit_id(&self) -> UnitId {
        self.unit_id
    }

    #[must_use]
    pub const fn transport(&self) -> &T {
        &self.transport
    }

    pub fn into_transport(self) -> T {
        self.transport
    }
}

impl<T: Transport> Client<T> {
    fn call<R>(&mut self, req: Request, f: impl FnOnce(Response<'_>) -> Result<R>) -> Result<R> {
        let expected = FunctionCode::from(req);
        log::debug!("Sending {req:?} to unit {}", self.unit_id);
        let rsp = self
            .transport
            .request(self.unit_id, req)
            .map_err(|err| match err {
                Error::Exception(ex) => exception(expected, ex),
                err => err,
            })?;
        let ResponsePdu(rsp) = ResponsePdu::try_from(rsp.as_slice()).inspect_err(|err| {
            log::error!("Failed to decode response to {req:?}: {err}");
        })?;
        let rsp = rsp.map_err(|ex| exception(expected, ex))?;
        let actual = FunctionCode::from(rsp);
        if expected != actual {
            return Err(ProtocolError::UnexpectedFunction { expected, actual }.into());
        }
        f(rsp)
    }

    /// Read the coil at `address`.
    pub fn read_coil(&mut self, address: Address) -> Result<Coil> {
        self.call(Request::ReadCoils(address, 1), |rsp| match rsp {
            Response::ReadCoils(coils) if coils.packed_len() == packed_coils_len(1) => {
                coils.get(0).ok_or_else(|| ProtocolError::BufferSize.into())
            }
            Response::ReadCoils(coils) => {
                Err(ProtocolError::ByteCount(coils.packed_len() as u8).into())
            }
            rsp => Err(unexpected(FunctionCode::ReadCoils, rsp)),
        })
    }

    /// Switch the coil at `address` on or off.
    pub fn write_coil(&mut self, address: Address, state: Coil) -> Result<()> {
        self.call(Request::WriteSingleCoil(address, state), |rsp| {
            if rsp == Response::WriteSingleCoil(address, state) {
                Ok(())
            } else {
                Err(ProtocolError::EchoMismatch.into())
            }
        })
    }

    /// Read `quantity` raw holding registers.
    pub fn read_holding_registers(
        &mut self,
        address: Address,
        quantity: Quantity,
    ) -> Result<Vec<Word>> {
        self.call(Request::ReadHoldingRegisters(address, quantity), |rsp| {
            let Response::ReadHoldingRegisters(data) = rsp else {
                return Err(unexpected(FunctionCode::ReadHoldingRegisters, rsp));
            };
            if data.len() != usize::from(quantity) {
                return Err(ProtocolError::ByteCount((data.len() * 2) as u8).into());
            }
            Ok(data.to_words())
        })
    }

    /// Write a single raw holding register.
    pub fn write_single_register(&mut self, address: Address, word: Word) -> Result<()> {
        self.call(Request::WriteSingleRegister(address, word), |rsp| {
            if rsp == Response::WriteSingleRegister(address, word) {
                Ok(())
            } else {
                Err(ProtocolError::EchoMismatch.into())
            }
        })
    }

    /// Read a typed value starting at `address`.
    pub fn read_register(
        &mut self,
        address: Address,
        ty: ValueType,
        order: WordOrder,
    ) -> Result<RegisterValue> {
        let quantity = register_range(address, ty.word_count())?;
        let words = self.read_holding_registers(address, quantity)?;
        Ok(RegisterValue::from_words(&words, ty, order)?)
    }

    /// Write a typed value starting at `address`.
    ///
    /// Each word is written with its own request. If a word fails after
    /// others were already written the error is [`Error::PartialWrite`],
    /// if the first word fails it is [`Error::WriteFailed`].
    pub fn write_register(
        &mut self,
        address: Address,
        value: RegisterValue,
        order: WordOrder,
    ) -> Result<()> {
        let words = value.to_words(order);
        register_range(address, words.len())?;
        let mut written = Vec::with_capacity(words.len());
        for (i, word) in words.into_iter().enumerate() {
            // Cannot overflow, the range has been checked above.
            let reg = address + i as Address;
            if let Err(err) = self.write_single_register(reg, word) {
                if written.is_empty() {
                    return Err(Error::WriteFailed {
                        address,
                        source: Box::new(err),
                    });
                }
                log::warn!(
                    "Writing {value} to register {address} failed at register {reg}, \
                     register(s) {written:?} were already written"
                );
                return Err(Error::PartialWrite {
                    address: reg,
                    written,
                    source: Box::new(err),
                });
            }
            written.push(reg);
        }
        Ok(())
    }

    /// Convert `number` to `ty` and write it starting at `address`.
    ///
    /// Nothing is sent if the number does not fit.
    pub fn write_value(
        &mut self,
        address: Address,
        ty: ValueType,
        number: Number,
        order: WordOrder,
    ) -> Result<RegisterValue> {
        let value = ty.coerce(number)?;
        self.write_register(address, value, order)?;
        Ok(value)
    }

    /// Read, write and read back a coil.
    ///
    /// If the write fails the coil is still read back, the error is
    /// [`Error::ChangeFailed`].
    pub fn change_coil(&mut self, address: Address, state: Coil) -> Result<Change<Coil>> {
        let previous = self.read_coil(address)?;
        if let Err(err) = self.write_coil(address, state) {
            let current = self.read_coil(address).ok();
            return Err(change_failed(
                RegisterValue::Bool(previous),
                current.map(RegisterValue::Bool),
                err,
            ));
        }
        let current = self.read_coil(address)?;
        if current != state {
            log::warn!("Coil {address} reads {current} after writing {state}");
        }
        Ok(Change {
            previous,
            requested: state,
            current,
        })
    }

    /// Read, write and read back a typed register value.
    ///
    /// The reported current value is what the device returns after the
    /// write, which may differ from the requested value. If the write
    /// fails the value is still read back, the error is
    /// [`Error::ChangeFailed`].
    pub fn change_register(
        &mut self,
        address: Address,
        value: RegisterValue,
        order: WordOrder,
    ) -> Result<Change<RegisterValue>> {
        let ty = value.value_type();
        let previous = self.read_register(address, ty, order)?;
        if let Err(err) = self.write_register(address, value, order) {
            let current = self.read_register(address, ty, order).ok();
            return Err(change_failed(previous, current, err));
        }
        let current = self.read_register(address, ty, order)?;
        if current != value {
            log::warn!("Register {address} reads {current} after writing {value}");
        }
        Ok(Change {
            previous,
            requested: value,
            current,
        })
    }
}

fn change_failed(previous: RegisterValue, current: Option<RegisterValue>, err: Error) -> Error {
    match current {
        Some(current) => log::warn!("Write failed, {previous} changed to {current}: {err}"),
        None => log::warn!("Write failed, cannot read back the value: {err}"),
    }
    Error::ChangeFailed {
        previous,
        current,
        source: Box::new(err),
    }
}

/// An exception is only accepted for the function that was requested.
fn exception(expected: FunctionCode, ex: ExceptionResponse) -> Error {
    if ex.function == expected {
        return Error::Exception(ex);
    }
    ProtocolError::UnexpectedFunction {
        expected,
        actual: ex.function,
    }
    .into()
}

fn unexpected(expected: FunctionCode, rsp: Response<'_>) -> Error {
    ProtocolError::UnexpectedFunction {
        expected,
        actual: rsp.into(),
    }
    .into()
}

/// Check that `count` registers starting at `address` fit into the address space.
fn register_range(address: Address, count: usize) -> core::result::Result<Quantity, CodecError> {
    let out_of_range = CodecError::AddressRange { address, count };
    if count == 0 || usize::from(address) + count > usize::from(Address::MAX) + 1 {
        return Err(out_of_range);
    }
    Quantity::try_from(count).map_err(|_| out_of_range)
}
