use wraith_serde::{BitReader, BitWrite, Serde, SerdeErr};

use crate::connection::error::HandshakeError;

/// First packet of a connection, resent until answered.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectRequest {
    pub connect_sequence: u32,
    pub net_class_group: u8,
    /// CRC of the sender's class data for `net_class_group`
    pub class_crc: u32,
}

impl ConnectRequest {
    /// Checks the peer's class data against ours.
    pub fn validate(&self, net_class_group: u8, class_crc: u32) -> Result<(), HandshakeError> {
        if self.net_class_group != net_class_group || self.class_crc != class_crc {
            return Err(HandshakeError::ClassCrcMismatch {
                expected_group: net_class_group,
                expected_crc: class_crc,
                group: self.net_class_group,
                crc: self.class_crc,
            });
        }
        Ok(())
    }
}

impl Serde for ConnectRequest {
    fn ser(&self, writer: &mut dyn BitWrite) {
        self.connect_sequence.ser(writer);
        self.net_class_group.ser(writer);
        self.class_crc.ser(writer);
    }

    fn de(reader: &mut BitReader) -> Result<Self, SerdeErr> {
        Ok(Self {
            connect_sequence: u32::de(reader)?,
            net_class_group: u8::de(reader)?,
            class_crc: u32::de(reader)?,
        })
    }

    fn bit_length(&self) -> u32 {
        self.connect_sequence.bit_length()
            + self.net_class_group.bit_length()
            + self.class_crc.bit_length()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectAccept {
    pub connect_sequence: u32,
}

impl Serde for ConnectAccept {
    fn ser(&self, writer: &mut dyn BitWrite) {
        self.connect_sequence.ser(writer);
    }

    fn de(reader: &mut BitReader) -> Result<Self, SerdeErr> {
        Ok(Self {
            connect_sequence: u32::de(reader)?,
        })
    }

    fn bit_length(&self) -> u32 {
        self.connect_sequence.bit_length()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectReject {
    pub connect_sequence: u32,
    /// Textual rejection code, e.g. `CHR_INVALID`
    pub reason: String,
}

impl Serde for ConnectReject {
    fn ser(&self, writer: &mut dyn BitWrite) {
        self.connect_sequence.ser(writer);
        self.reason.ser(writer);
    }

    fn de(reader: &mut BitReader) -> Result<Self, SerdeErr> {
        Ok(Self {
            connect_sequence: u32::de(reader)?,
            reason: String::de(reader)?,
        })
    }

    fn bit_length(&self) -> u32 {
        self.connect_sequence.bit_length() + self.reason.bit_length()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Disconnect {
    pub reason: String,
}

impl Serde for Disconnect {
    fn ser(&self, writer: &mut dyn BitWrite) {
        self.reason.ser(writer);
    }

    fn de(reader: &mut BitReader) -> Result<Self, SerdeErr> {
        Ok(Self {
            reason: String::de(reader)?,
        })
    }

    fn bit_length(&self) -> u32 {
        self.reason.bit_length()
    }
}
