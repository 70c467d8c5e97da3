use wraith_serde::{BitReader, BitWrite, Serde, SerdeErr, UnsignedInteger};

use crate::strings::{
    connection_string_table::{ConnectionStringTable, ENTRY_BIT_SIZE},
    net_string::NetStringHandle,
};

/// Longest string a `CString` code can carry, in bytes.
pub const MAX_CSTRING_LENGTH: usize = 255;

/// 2-bit tag in front of every packed string.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StringCode {
    NullString = 0,
    CString = 1,
    TagString = 2,
    Integer = 3,
}

impl StringCode {
    fn from_bits(bits: u64) -> Self {
        match bits {
            0 => StringCode::NullString,
            1 => StringCode::CString,
            2 => StringCode::TagString,
            _ => StringCode::Integer,
        }
    }
}

/// Write-side access to a connection's string table. Without a table every
/// string travels literally.
pub struct StringPacker<'t> {
    table: Option<&'t mut ConnectionStringTable>,
}

impl<'t> StringPacker<'t> {
    pub fn new(table: Option<&'t mut ConnectionStringTable>) -> Self {
        Self { table }
    }

    pub fn literal() -> Self {
        Self { table: None }
    }

    pub fn translates(&self) -> bool {
        self.table.is_some()
    }

    /// Reborrows the packer, e.g. to measure a value before writing it.
    pub fn reborrow(&mut self) -> StringPacker<'_> {
        StringPacker {
            table: self.table.as_deref_mut(),
        }
    }

    /// Whether a mapping announcement still describes the slot's contents.
    pub fn is_mapping_current(&self, index: u8, string: &NetStringHandle) -> bool {
        match &self.table {
            Some(table) => table.is_current(index, string),
            None => false,
        }
    }

    /// Interns tagged strings ahead of time so the remote side learns the
    /// mapping before the string is used.
    pub fn validate_send_string(&mut self, value: &str) {
        let Some(table) = self.table.as_deref_mut() else {
            return;
        };
        let handle = NetStringHandle::new(value);
        if handle.is_tagged() {
            table.check_string(&handle);
        }
    }

    /// Packs a string with the cheapest applicable code.
    ///
    /// Decimal integers are sent as integers, tagged strings as a table
    /// index once the remote side confirmed the mapping, everything else
    /// literally.
    pub fn pack_string(&mut self, value: &str, writer: &mut dyn BitWrite) {
        if value.is_empty() {
            write_code(StringCode::NullString, writer);
            return;
        }

        if let Some(number) = canonical_integer(value) {
            write_code(StringCode::Integer, writer);
            write_integer(number, writer);
            return;
        }

        if let Some(table) = self.table.as_deref_mut() {
            let handle = NetStringHandle::new(value);
            if handle.is_tagged() {
                let (index, confirmed) = table.check_string(&handle);
                if confirmed {
                    write_code(StringCode::TagString, writer);
                    writer.write_bits(u64::from(index), ENTRY_BIT_SIZE);
                    return;
                }
            }
        }

        write_code(StringCode::CString, writer);
        write_cstring(value, writer);
    }

    /// Packs an optional interned handle: a validity flag, then either the
    /// confirmed table index or the literal text.
    pub fn pack_string_handle(
        &mut self,
        handle: Option<&NetStringHandle>,
        writer: &mut dyn BitWrite,
    ) {
        let Some(handle) = handle else {
            writer.write_bit(false);
            return;
        };
        writer.write_bit(true);

        if let Some(table) = self.table.as_deref_mut() {
            let (index, confirmed) = table.check_string(handle);
            writer.write_bit(confirmed);
            if confirmed {
                writer.write_bits(u64::from(index), ENTRY_BIT_SIZE);
                return;
            }
        } else {
            writer.write_bit(false);
        }
        write_cstring(handle.as_str(), writer);
    }
}

/// Read-side access to a connection's string table.
pub struct StringUnpacker<'t> {
    table: Option<&'t ConnectionStringTable>,
}

impl<'t> StringUnpacker<'t> {
    pub fn new(table: Option<&'t ConnectionStringTable>) -> Self {
        Self { table }
    }

    pub fn literal() -> Self {
        Self { table: None }
    }

    pub fn unpack_string(&self, reader: &mut BitReader) -> Result<String, SerdeErr> {
        match StringCode::from_bits(reader.read_bits(2)?) {
            StringCode::NullString => Ok(String::new()),
            StringCode::CString => read_cstring(reader),
            StringCode::TagString => {
                let handle = self.lookup(reader)?;
                Ok(handle.as_str().to_string())
            }
            StringCode::Integer => Ok(read_integer(reader)?.to_string()),
        }
    }

    pub fn unpack_string_handle(
        &self,
        reader: &mut BitReader,
    ) -> Result<Option<NetStringHandle>, SerdeErr> {
        if !reader.read_bit()? {
            return Ok(None);
        }
        if reader.read_bit()? {
            return Ok(Some(self.lookup(reader)?.clone()));
        }
        Ok(Some(NetStringHandle::from(read_cstring(reader)?)))
    }

    fn lookup(&self, reader: &mut BitReader) -> Result<&'t NetStringHandle, SerdeErr> {
        let index = reader.read_bits(ENTRY_BIT_SIZE)? as u8;
        self.table
            .and_then(|table| table.lookup_string(index))
            .ok_or(SerdeErr)
    }
}

fn write_code(code: StringCode, writer: &mut dyn BitWrite) {
    writer.write_bits(code as u64, 2);
}

/// Text that parses as an `i32` and prints back identically.
fn canonical_integer(value: &str) -> Option<i32> {
    let number: i32 = value.parse().ok()?;
    if number == i32::MIN || number.to_string() != value {
        return None;
    }
    Some(number)
}

fn write_integer(number: i32, writer: &mut dyn BitWrite) {
    writer.write_bit(number < 0);
    let magnitude = u64::from(number.unsigned_abs());
    if magnitude < 128 {
        writer.write_bit(true);
        UnsignedInteger::<7>::new(magnitude as i64).ser(writer);
    } else if magnitude < 32768 {
        writer.write_bit(false);
        writer.write_bit(true);
        UnsignedInteger::<15>::new(magnitude as i64).ser(writer);
    } else {
        writer.write_bit(false);
        writer.write_bit(false);
        UnsignedInteger::<31>::new(magnitude as i64).ser(writer);
    }
}

fn read_integer(reader: &mut BitReader) -> Result<i64, SerdeErr> {
    let negative = reader.read_bit()?;
    let bits = if reader.read_bit()? {
        7
    } else if reader.read_bit()? {
        15
    } else {
        31
    };
    let magnitude = reader.read_bits(bits)? as i64;
    Ok(if negative { -magnitude } else { magnitude })
}

/// u8 length followed by raw bytes, cut at a character boundary if longer
/// than 255 bytes.
pub(crate) fn write_cstring(value: &str, writer: &mut dyn BitWrite) {
    let mut length = value.len().min(MAX_CSTRING_LENGTH);
    while !value.is_char_boundary(length) {
        length -= 1;
    }
    writer.write_byte(length as u8);
    for byte in &value.as_bytes()[..length] {
        writer.write_byte(*byte);
    }
}

pub(crate) fn read_cstring(reader: &mut BitReader) -> Result<String, SerdeErr> {
    let length = usize::from(reader.read_byte()?);
    let mut bytes = Vec::with_capacity(length);
    for _ in 0..length {
        bytes.push(reader.read_byte()?);
    }
    String::from_utf8(bytes).map_err(|_| SerdeErr)
}
