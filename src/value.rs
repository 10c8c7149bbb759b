// SPDX-FileCopyrightText: Copyright (c) 2018-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Typed values stored in one or more holding registers.
//!
//! A value is turned into its big-endian byte representation and split
//! into 16 bit words. [`WordOrder`] only decides in which sequence those
//! words are placed at increasing register addresses, the bytes inside
//! each word are always big-endian.

use std::{fmt, str::FromStr};

use byteorder::{BigEndian, ByteOrder};

use crate::{
    error::{CodecError, ParseNumberError},
    frame::Word,
};

type Result<T> = core::result::Result<T, CodecError>;

/// Sequence of the words of a multi-register value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WordOrder {
    /// Most significant word at the lowest address.
    BigEndianWords,
    /// Least significant word at the lowest address.
    LittleEndianWords,
}

impl WordOrder {
    /// Convert between the big-endian word sequence and the order on the wire.
    ///
    /// The operation is its own inverse.
    fn arrange(self, words: &mut [Word]) {
        if self == Self::LittleEndianWords {
            words.reverse();
        }
    }
}

impl fmt::Display for WordOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BigEndianWords => f.write_str("big-endian words"),
            Self::LittleEndianWords => f.write_str("little-endian words"),
        }
    }
}

/// Numeric interpretation selected by the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumberKind {
    Int,
    Uint,
    Float,
}

impl fmt::Display for NumberKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int => f.write_str("INT"),
            Self::Uint => f.write_str("UINT"),
            Self::Float => f.write_str("FLOAT"),
        }
    }
}

/// The tag of a [`RegisterValue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    Bool,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    UInt64,
    Float32,
    Float64,
}

impl ValueType {
    /// Select the type for a register width in bits and a number kind.
    pub const fn from_width(width: u16, kind: NumberKind) -> Result<Self> {
        use NumberKind as K;
        let ty = match (width, kind) {
            (16, K::Int) => Self::Int16,
            (16, K::Uint) => Self::UInt16,
            (32, K::Int) => Self::Int32,
            (32, K::Uint) => Self::UInt32,
            (32, K::Float) => Self::Float32,
            (64, K::Int) => Self::Int64,
            (64, K::Uint) => Self::UInt64,
            (64, K::Float) => Self::Float64,
            _ => return Err(CodecError::UnsupportedType { width, kind }),
        };
        Ok(ty)
    }

    /// Number of consecutive registers a value of this type occupies.
    #[must_use]
    pub const fn word_count(self) -> usize {
        match self {
            Self::Bool | Self::Int16 | Self::UInt16 => 1,
            Self::Int32 | Self::UInt32 | Self::Float32 => 2,
            Self::Int64 | Self::UInt64 | Self::Float64 => 4,
        }
    }

    /// Convert a user supplied number into a value of this type.
    ///
    /// Numbers outside of the type's domain are rejected, nothing is
    /// truncated or wrapped around. Integers given for a float type are
    /// converted to the float first.
    pub fn coerce(self, number: Number) -> Result<RegisterValue> {
        let out_of_range = || CodecError::OutOfRange { value: number, ty: self };
        match self {
            Self::Bool => match number {
                Number::Integer(0) => Ok(RegisterValue::Bool(false)),
                Number::Integer(1) => Ok(RegisterValue::Bool(true)),
                Number::Float(f) if f == 0.0 => Ok(RegisterValue::Bool(false)),
                Number::Float(f) if f == 1.0 => Ok(RegisterValue::Bool(true)),
                _ => Err(out_of_range()),
            },
            Self::Int16 => i16::try_from(self.integer(number)?)
                .map(RegisterValue::Int16)
                .map_err(|_| out_of_range()),
            Self::UInt16 => u16::try_from(self.integer(number)?)
                .map(RegisterValue::UInt16)
                .map_err(|_| out_of_range()),
            Self::Int32 => i32::try_from(self.integer(number)?)
                .map(RegisterValue::Int32)
                .map_err(|_| out_of_range()),
            Self::UInt32 => u32::try_from(self.integer(number)?)
                .map(RegisterValue::UInt32)
                .map_err(|_| out_of_range()),
            Self::Int64 => i64::try_from(self.integer(number)?)
                .map(RegisterValue::Int64)
                .map_err(|_| out_of_range()),
            Self::UInt64 => u64::try_from(self.integer(number)?)
                .map(RegisterValue::UInt64)
                .map_err(|_| out_of_range()),
            Self::Float32 => match number {
                Number::Integer(i) => Ok(RegisterValue::Float32(i as f32)),
                Number::Float(f) => {
                    let narrowed = f as f32;
                    if f.is_finite() && narrowed.is_infinite() {
                        return Err(out_of_range());
                    }
                    Ok(RegisterValue::Float32(narrowed))
                }
            },
            Self::Float64 => Ok(RegisterValue::Float64(match number {
                Number::Integer(i) => i as f64,
                Number::Float(f) => f,
            })),
        }
    }

    fn integer(self, number: Number) -> Result<i128> {
        match number {
            Number::Integer(i) => Ok(i),
            Number::Float(f) if f.is_finite() && f.fract() == 0.0 => {
                // Saturates far outside of every integer type's range.
                Ok(f as i128)
            }
            Number::Float(_) => Err(CodecError::NotAnInteger {
                value: number,
                ty: self,
            }),
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Bool => "BOOL",
            Self::Int16 => "INT16",
            Self::UInt16 => "UINT16",
            Self::Int32 => "INT32",
            Self::UInt32 => "UINT32",
            Self::Int64 => "INT64",
            Self::UInt64 => "UINT64",
            Self::Float32 => "FLOAT32",
            Self::Float64 => "FLOAT64",
        };
        f.write_str(name)
    }
}

/// A number as entered by the user, before it is bound to a [`ValueType`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    Integer(i128),
    Float(f64),
}

impl FromStr for Number {
    type Err = ParseNumberError;

    fn from_str(s: &str) -> core::result::Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(i) = s.parse::<i128>() {
            return Ok(Self::Integer(i));
        }
        s.parse::<f64>()
            .map(Self::Float)
            .map_err(|_| ParseNumberError(s.to_owned()))
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer(i) => i.fmt(f),
            Self::Float(x) => x.fmt(f),
        }
    }
}

/// A typed scalar stored in holding registers.
///
/// Two values are equal if they have the same type and the same bit
/// pattern, so `NaN` equals itself and `0.0` differs from `-0.0`.
#[derive(Debug, Clone, Copy)]
pub enum RegisterValue {
    Bool(bool),
    Int16(i16),
    UInt16(u16),
    Int32(i32),
    UInt32(u32),
    Int64(i64),
    UInt64(u64),
    Float32(f32),
    Float64(f64),
}

impl RegisterValue {
    #[must_use]
    pub const fn value_type(&self) -> ValueType {
        match self {
            Self::Bool(_) => ValueType::Bool,
            Self::Int16(_) => ValueType::Int16,
            Self::UInt16(_) => ValueType::UInt16,
            Self::Int32(_) => ValueType::Int32,
            Self::UInt32(_) => ValueType::UInt32,
            Self::Int64(_) => ValueType::Int64,
            Self::UInt64(_) => ValueType::UInt64,
            Self::Float32(_) => ValueType::Float32,
            Self::Float64(_) => ValueType::Float64,
        }
    }

    /// The raw bit pattern, zero-extended to 64 bit.
    #[must_use]
    pub const fn to_bits(&self) -> u64 {
        match *self {
            Self::Bool(b) => b as u64,
            Self::Int16(v) => v as u16 as u64,
            Self::UInt16(v) => v as u64,
            Self::Int32(v) => v as u32 as u64,
            Self::UInt32(v) => v as u64,
            Self::Int64(v) => v as u64,
            Self::UInt64(v) => v,
            Self::Float32(v) => v.to_bits() as u64,
            Self::Float64(v) => v.to_bits(),
        }
    }

    /// Split the value into register words in the given order.
    #[must_use]
    pub fn to_words(&self, order: WordOrder) -> Vec<Word> {
        let count = self.value_type().word_count();
        let mut bytes = [0; 8];
        BigEndian::write_u64(&mut bytes, self.to_bits());
        let mut words: Vec<Word> = bytes[8 - count * 2..]
            .chunks_exact(2)
            .map(BigEndian::read_u16)
            .collect();
        order.arrange(&mut words);
        words
    }

    /// Join register words that were read in the given order.
    pub fn from_words(words: &[Word], ty: ValueType, order: WordOrder) -> Result<Self> {
        let expected = ty.word_count();
        if words.len() != expected {
            return Err(CodecError::Quantity {
                ty,
                expected,
                actual: words.len(),
            });
        }
        let mut words = words.to_vec();
        order.arrange(&mut words);
        let bits = words
            .iter()
            .fold(0u64, |bits, word| (bits << 16) | u64::from(*word));
        let value = match ty {
            ValueType::Bool => Self::Bool(bits != 0),
            ValueType::Int16 => Self::Int16(bits as u16 as i16),
            ValueType::UInt16 => Self::UInt16(bits as u16),
            ValueType::Int32 => Self::Int32(bits as u32 as i32),
            ValueType::UInt32 => Self::UInt32(bits as u32),
            ValueType::Int64 => Self::Int64(bits as i64),
            ValueType::UInt64 => Self::UInt64(bits),
            ValueType::Float32 => Self::Float32(f32::from_bits(bits as u32)),
            ValueType::Float64 => Self::Float64(f64::from_bits(bits)),
        };
        Ok(value)
    }
}

impl PartialEq for RegisterValue {
    fn eq(&self, other: &Self) -> bool {
        self.value_type() == other.value_type() && self.to_bits() == other.to_bits()
    }
}

impl Eq for RegisterValue {}

impl fmt::Display for RegisterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => v.fmt(f),
            Self::Int16(v) => v.fmt(f),
            Self::UInt16(v) => v.fmt(f),
            Self::Int32(v) => v.fmt(f),
            Self::UInt32(v) => v.fmt(f),
            Self::Int64(v) => v.fmt(f),
            Self::UInt64(v) => v.fmt(f),
            Self::Float32(v) => v.fmt(f),
            Self::Float64(v) => v.fmt(f),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use WordOrder::*;

    fn samples() -> Vec<RegisterValue> {
        use RegisterValue as V;
        vec![
            V::Bool(false),
            V::Bool(true),
            V::Int16(0),
            V::Int16(-1),
            V::Int16(i16::MIN),
            V::Int16(i16::MAX),
            V::UInt16(0xABCD),
            V::UInt16(u16::MAX),
            V::Int32(-123_456),
            V::Int32(i32::MIN),
            V::UInt32(0xDEAD_BEEF),
            V::Int64(i64::MIN),
            V::Int64(-2),
            V::UInt64(u64::MAX),
            V::UInt64(0x0102_0304_0506_0708),
            V::Float32(98.6),
            V::Float32(-0.0),
            V::Float32(f32::NAN),
            V::Float32(f32::from_bits(0x7FC0_0001)),
            V::Float32(f32::INFINITY),
            V::Float32(f32::MIN_POSITIVE),
            V::Float64(-0.0),
            V::Float64(f64::NAN),
            V::Float64(f64::from_bits(0xFFF8_0000_0000_0001)),
            V::Float64(f64::NEG_INFINITY),
            V::Float64(1.0e-310),
        ]
    }

    #[test]
    fn round_trip_in_both_word_orders() {
        for value in samples() {
            for order in [BigEndianWords, LittleEndianWords] {
                let words = value.to_words(order);
                assert_eq!(words.len(), value.value_type().word_count());
                let decoded = RegisterValue::from_words(&words, value.value_type(), order).unwrap();
                assert_eq!(decoded.to_bits(), value.to_bits(), "{value:?} {order}");
                assert_eq!(decoded, value);
            }
        }
    }

    #[test]
    fn little_endian_words_are_reversed() {
        for value in samples() {
            let mut be = value.to_words(BigEndianWords);
            let le = value.to_words(LittleEndianWords);
            if value.value_type().word_count() == 1 {
                assert_eq!(be, le);
            }
            be.reverse();
            assert_eq!(be, le);
        }
    }

    #[test]
    fn bytes_within_a_word_stay_big_endian() {
        let value = RegisterValue::UInt32(0x1122_3344);
        assert_eq!(value.to_words(BigEndianWords), [0x1122, 0x3344]);
        assert_eq!(value.to_words(LittleEndianWords), [0x3344, 0x1122]);
    }

    #[test]
    fn float32_bit_pattern() {
        let value = RegisterValue::Float32(98.6);
        assert_eq!(value.to_words(BigEndianWords), [0x42C5, 0x3333]);
    }

    #[test]
    fn integer_for_float_uses_float_bit_pattern() {
        let value = ValueType::Float32.coerce(Number::Integer(5)).unwrap();
        assert_eq!(value, RegisterValue::Float32(5.0));
        assert_eq!(value.to_words(BigEndianWords), [0x40A0, 0x0000]);

        let value = ValueType::Float64.coerce(Number::Integer(5)).unwrap();
        assert_eq!(
            value.to_words(BigEndianWords),
            [0x4014, 0x0000, 0x0000, 0x0000]
        );
    }

    #[test]
    fn signed_values_use_twos_complement() {
        assert_eq!(
            RegisterValue::Int16(-2).to_words(BigEndianWords),
            [0xFFFE]
        );
        assert_eq!(
            RegisterValue::Int32(-2).to_words(LittleEndianWords),
            [0xFFFE, 0xFFFF]
        );
    }

    #[test]
    fn mismatched_word_order_gives_another_value() {
        let value = RegisterValue::UInt64(1 << 32);
        let words = value.to_words(LittleEndianWords);
        assert_eq!(words, [0x0000, 0x0000, 0x0001, 0x0000]);
        let decoded = RegisterValue::from_words(&words, ValueType::UInt64, BigEndianWords).unwrap();
        assert_eq!(decoded, RegisterValue::UInt64(65_536));
    }

    #[test]
    fn bool_register() {
        assert_eq!(RegisterValue::Bool(true).to_words(BigEndianWords), [1]);
        assert_eq!(RegisterValue::Bool(false).to_words(BigEndianWords), [0]);
        assert_eq!(
            RegisterValue::from_words(&[0x0100], ValueType::Bool, BigEndianWords),
            Ok(RegisterValue::Bool(true))
        );
    }

    #[test]
    fn reject_wrong_word_count() {
        assert_eq!(
            RegisterValue::from_words(&[1, 2, 3], ValueType::Float32, BigEndianWords),
            Err(CodecError::Quantity {
                ty: ValueType::Float32,
                expected: 2,
                actual: 3
            })
        );
        assert!(RegisterValue::from_words(&[], ValueType::Int16, BigEndianWords).is_err());
    }

    #[test]
    fn equality_compares_bit_patterns() {
        assert_eq!(RegisterValue::Float32(f32::NAN), RegisterValue::Float32(f32::NAN));
        assert_ne!(RegisterValue::Float64(0.0), RegisterValue::Float64(-0.0));
        assert_ne!(RegisterValue::Int16(1), RegisterValue::UInt16(1));
    }

    mod coerce {
        use super::*;

        #[test]
        fn integers_in_range() {
            assert_eq!(
                ValueType::UInt16.coerce(Number::Integer(40_000)),
                Ok(RegisterValue::UInt16(40_000))
            );
            assert_eq!(
                ValueType::Int64.coerce(Number::Integer(i64::MIN.into())),
                Ok(RegisterValue::Int64(i64::MIN))
            );
            assert_eq!(
                ValueType::UInt64.coerce(Number::Integer(u64::MAX.into())),
                Ok(RegisterValue::UInt64(u64::MAX))
            );
            assert_eq!(
                ValueType::Int32.coerce(Number::Float(-7.0)),
                Ok(RegisterValue::Int32(-7))
            );
        }

        #[test]
        fn negative_into_unsigned() {
            for ty in [ValueType::UInt16, ValueType::UInt32, ValueType::UInt64] {
                assert_eq!(
                    ty.coerce(Number::Integer(-1)),
                    Err(CodecError::OutOfRange {
                        value: Number::Integer(-1),
                        ty
                    })
                );
            }
        }

        #[test]
        fn too_large_for_width() {
            assert!(ValueType::Int16.coerce(Number::Integer(40_000)).is_err());
            assert!(
                ValueType::UInt32
                    .coerce(Number::Integer(1 << 32))
                    .is_err()
            );
            assert!(
                ValueType::UInt64
                    .coerce(Number::Integer(i128::from(u64::MAX) + 1))
                    .is_err()
            );
            assert!(ValueType::Int64.coerce(Number::Float(1.0e30)).is_err());
            assert!(ValueType::Float32.coerce(Number::Float(1.0e300)).is_err());
        }

        #[test]
        fn fraction_into_integer() {
            assert_eq!(
                ValueType::Int32.coerce(Number::Float(5.5)),
                Err(CodecError::NotAnInteger {
                    value: Number::Float(5.5),
                    ty: ValueType::Int32
                })
            );
            assert!(ValueType::UInt16.coerce(Number::Float(f64::NAN)).is_err());
        }

        #[test]
        fn floats_keep_special_values() {
            let value = ValueType::Float32.coerce(Number::Float(f64::INFINITY)).unwrap();
            assert_eq!(value, RegisterValue::Float32(f32::INFINITY));
            let value = ValueType::Float64.coerce(Number::Float(-0.0)).unwrap();
            assert_eq!(value, RegisterValue::Float64(-0.0));
        }

        #[test]
        fn bool_accepts_zero_and_one() {
            assert_eq!(
                ValueType::Bool.coerce(Number::Integer(1)),
                Ok(RegisterValue::Bool(true))
            );
            assert_eq!(
                ValueType::Bool.coerce(Number::Float(0.0)),
                Ok(RegisterValue::Bool(false))
            );
            assert!(ValueType::Bool.coerce(Number::Integer(2)).is_err());
        }
    }

    #[test]
    fn value_type_from_width() {
        assert_eq!(
            ValueType::from_width(16, NumberKind::Int),
            Ok(ValueType::Int16)
        );
        assert_eq!(
            ValueType::from_width(32, NumberKind::Float),
            Ok(ValueType::Float32)
        );
        assert_eq!(
            ValueType::from_width(64, NumberKind::Uint),
            Ok(ValueType::UInt64)
        );
        assert_eq!(
            ValueType::from_width(16, NumberKind::Float),
            Err(CodecError::UnsupportedType {
                width: 16,
                kind: NumberKind::Float
            })
        );
        assert!(ValueType::from_width(8, NumberKind::Uint).is_err());
    }

    #[test]
    fn parse_numbers() {
        assert_eq!("42".parse::<Number>(), Ok(Number::Integer(42)));
        assert_eq!(" -7 ".parse::<Number>(), Ok(Number::Integer(-7)));
        assert_eq!("98.6".parse::<Number>(), Ok(Number::Float(98.6)));
        assert_eq!("1e3".parse::<Number>(), Ok(Number::Float(1000.0)));
        assert_eq!(
            "abc".parse::<Number>(),
            Err(ParseNumberError("abc".to_owned()))
        );
    }

    #[test]
    fn display_values() {
        assert_eq!(RegisterValue::Float32(98.6).to_string(), "98.6");
        assert_eq!(RegisterValue::Int16(-3).to_string(), "-3");
        assert_eq!(RegisterValue::Bool(true).to_string(), "true");
        assert_eq!(ValueType::UInt64.to_string(), "UINT64");
    }
}
