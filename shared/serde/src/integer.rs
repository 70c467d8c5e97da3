use crate::{BitReader, BitWrite, ConstBitLength, Serde, SerdeErr};

pub trait SerdeIntegerConversion<const SIGNED: bool, const VARIABLE: bool, const BITS: u8> {
    fn from(value: &SerdeInteger<SIGNED, VARIABLE, BITS>) -> Self;
}

pub type UnsignedInteger<const BITS: u8> = SerdeInteger<false, false, BITS>;
pub type SignedInteger<const BITS: u8> = SerdeInteger<true, false, BITS>;
pub type UnsignedVariableInteger<const BITS: u8> = SerdeInteger<false, true, BITS>;
pub type SignedVariableInteger<const BITS: u8> = SerdeInteger<true, true, BITS>;

/// Integer packed into a fixed number of bits, optionally with a sign bit.
///
/// Variable-width integers are written in `BITS`-sized chunks, each preceded
/// by a flag telling the reader whether another chunk follows.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub struct SerdeInteger<const SIGNED: bool, const VARIABLE: bool, const BITS: u8> {
    value: i64,
}

impl<const SIGNED: bool, const VARIABLE: bool, const BITS: u8> SerdeInteger<SIGNED, VARIABLE, BITS> {
    pub fn new<T: Into<i64>>(value: T) -> Self {
        let value = value.into();
        Self::check(value);
        Self { value }
    }

    pub fn get(&self) -> i64 {
        self.value
    }

    pub fn set<T: Into<i64>>(&mut self, value: T) {
        let value = value.into();
        Self::check(value);
        self.value = value;
    }

    pub fn to<T: SerdeIntegerConversion<SIGNED, VARIABLE, BITS>>(&self) -> T {
        T::from(self)
    }

    fn check(value: i64) {
        if BITS == 0 || BITS > 63 {
            panic!("integer width must be between 1 and 63 bits, got {}", BITS);
        }
        if !SIGNED && value < 0 {
            panic!("can't encode a negative number with an unsigned integer");
        }
        if !VARIABLE && value.unsigned_abs() >= (1u64 << BITS) {
            panic!("with {} bits, can't encode {}", BITS, value);
        }
    }
}

impl<const SIGNED: bool, const VARIABLE: bool, const BITS: u8> Serde
    for SerdeInteger<SIGNED, VARIABLE, BITS>
{
    fn ser(&self, writer: &mut dyn BitWrite) {
        if SIGNED {
            writer.write_bit(self.value < 0);
        }
        let mut magnitude = self.value.unsigned_abs();

        if !VARIABLE {
            writer.write_bits(magnitude, BITS);
            return;
        }

        loop {
            let proceed = magnitude >= (1u64 << BITS);
            writer.write_bit(proceed);
            writer.write_bits(magnitude, BITS);
            magnitude >>= BITS;
            if !proceed {
                return;
            }
        }
    }

    fn de(reader: &mut BitReader) -> Result<Self, SerdeErr> {
        let negative = SIGNED && reader.read_bit()?;

        let magnitude = if VARIABLE {
            let mut output: u64 = 0;
            let mut shift: u32 = 0;
            loop {
                let proceed = reader.read_bit()?;
                let chunk = reader.read_bits(BITS)?;
                if shift >= 64 {
                    return Err(SerdeErr);
                }
                output |= chunk << shift;
                shift += BITS as u32;
                if !proceed {
                    break output;
                }
            }
        } else {
            reader.read_bits(BITS)?
        };

        let Ok(value) = i64::try_from(magnitude) else {
            return Err(SerdeErr);
        };
        Ok(Self {
            value: if negative { -value } else { value },
        })
    }

    fn bit_length(&self) -> u32 {
        let sign_bits = if SIGNED { 1 } else { 0 };
        if !VARIABLE {
            return sign_bits + BITS as u32;
        }
        let mut magnitude = self.value.unsigned_abs();
        let mut output = sign_bits;
        loop {
            output += 1 + BITS as u32;
            if magnitude < (1u64 << BITS) {
                return output;
            }
            magnitude >>= BITS;
        }
    }
}

impl<const SIGNED: bool, const BITS: u8> ConstBitLength for SerdeInteger<SIGNED, false, BITS> {
    fn const_bit_length() -> u32 {
        let sign_bits = if SIGNED { 1 } else { 0 };
        sign_bits + BITS as u32
    }
}

impl<const SIGNED: bool, const VARIABLE: bool, const BITS: u8, T: Into<i64>> From<T>
    for SerdeInteger<SIGNED, VARIABLE, BITS>
{
    fn from(value: T) -> Self {
        Self::new(value)
    }
}

impl<const SIGNED: bool, const VARIABLE: bool, const BITS: u8, T: TryFrom<i64>>
    SerdeIntegerConversion<SIGNED, VARIABLE, BITS> for T
{
    fn from(value: &SerdeInteger<SIGNED, VARIABLE, BITS>) -> Self {
        let Ok(t_value) = T::try_from(value.value) else {
            panic!("SerdeInteger's value is out of range to convert to this type.");
        };
        t_value
    }
}
