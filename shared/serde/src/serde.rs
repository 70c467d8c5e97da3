use crate::{BitReader, BitWrite, SerdeErr, UnsignedVariableInteger};

/// A type that can be packed into and read back from a bit stream.
pub trait Serde: Sized + Clone + PartialEq {
    fn ser(&self, writer: &mut dyn BitWrite);
    fn de(reader: &mut BitReader) -> Result<Self, SerdeErr>;
    fn bit_length(&self) -> u32;
}

/// A type whose packed size never depends on its value.
pub trait ConstBitLength {
    fn const_bit_length() -> u32;
}

// bool

impl Serde for bool {
    fn ser(&self, writer: &mut dyn BitWrite) {
        writer.write_bit(*self);
    }

    fn de(reader: &mut BitReader) -> Result<Self, SerdeErr> {
        reader.read_bit()
    }

    fn bit_length(&self) -> u32 {
        1
    }
}

impl ConstBitLength for bool {
    fn const_bit_length() -> u32 {
        1
    }
}

// unit

impl Serde for () {
    fn ser(&self, _: &mut dyn BitWrite) {}

    fn de(_: &mut BitReader) -> Result<Self, SerdeErr> {
        Ok(())
    }

    fn bit_length(&self) -> u32 {
        0
    }
}

// primitive integers

macro_rules! impl_serde_for_primitive {
    ($impl_type:ty, $bits:expr) => {
        impl Serde for $impl_type {
            fn ser(&self, writer: &mut dyn BitWrite) {
                writer.write_bits(u64::from_le_bytes(
                    widen_le_bytes(&self.to_le_bytes()),
                ), $bits);
            }

            fn de(reader: &mut BitReader) -> Result<Self, SerdeErr> {
                let raw = reader.read_bits($bits)?.to_le_bytes();
                let mut bytes = [0u8; $bits / 8];
                bytes.copy_from_slice(&raw[..$bits / 8]);
                Ok(<$impl_type>::from_le_bytes(bytes))
            }

            fn bit_length(&self) -> u32 {
                $bits
            }
        }

        impl ConstBitLength for $impl_type {
            fn const_bit_length() -> u32 {
                $bits
            }
        }
    };
}

fn widen_le_bytes(bytes: &[u8]) -> [u8; 8] {
    let mut output = [0u8; 8];
    output[..bytes.len()].copy_from_slice(bytes);
    output
}

impl_serde_for_primitive!(u8, 8);
impl_serde_for_primitive!(u16, 16);
impl_serde_for_primitive!(u32, 32);
impl_serde_for_primitive!(u64, 64);
impl_serde_for_primitive!(i8, 8);
impl_serde_for_primitive!(i16, 16);
impl_serde_for_primitive!(i32, 32);
impl_serde_for_primitive!(i64, 64);

// String

impl Serde for String {
    fn ser(&self, writer: &mut dyn BitWrite) {
        let length = UnsignedVariableInteger::<9>::new(self.len() as i64);
        length.ser(writer);
        for byte in self.as_bytes() {
            writer.write_byte(*byte);
        }
    }

    fn de(reader: &mut BitReader) -> Result<Self, SerdeErr> {
        let length: usize = UnsignedVariableInteger::<9>::de(reader)?.to();
        if length > reader.bits_remaining() / 8 {
            return Err(SerdeErr);
        }
        let mut bytes = Vec::with_capacity(length);
        for _ in 0..length {
            bytes.push(reader.read_byte()?);
        }
        String::from_utf8(bytes).map_err(|_| SerdeErr)
    }

    fn bit_length(&self) -> u32 {
        let length = UnsignedVariableInteger::<9>::new(self.len() as i64);
        length.bit_length() + (self.len() as u32) * 8
    }
}

// Option

impl<T: Serde> Serde for Option<T> {
    fn ser(&self, writer: &mut dyn BitWrite) {
        match self {
            Some(value) => {
                writer.write_bit(true);
                value.ser(writer);
            }
            None => writer.write_bit(false),
        }
    }

    fn de(reader: &mut BitReader) -> Result<Self, SerdeErr> {
        if reader.read_bit()? {
            Ok(Some(T::de(reader)?))
        } else {
            Ok(None)
        }
    }

    fn bit_length(&self) -> u32 {
        match self {
            Some(value) => 1 + value.bit_length(),
            None => 1,
        }
    }
}

// Vec

impl<T: Serde> Serde for Vec<T> {
    fn ser(&self, writer: &mut dyn BitWrite) {
        for item in self {
            writer.write_bit(true);
            item.ser(writer);
        }
        writer.write_bit(false);
    }

    fn de(reader: &mut BitReader) -> Result<Self, SerdeErr> {
        let mut output = Vec::new();
        while reader.read_bit()? {
            output.push(T::de(reader)?);
        }
        Ok(output)
    }

    fn bit_length(&self) -> u32 {
        self.iter().map(|item| 1 + item.bit_length()).sum::<u32>() + 1
    }
}
