use wraith_serde::{BitReader, BitWrite, Serde, SerdeErr};

use crate::{connection::packet_type::PacketType, types::PacketIndex};

/// Prefix of every datagram.
///
/// `sender_ack_index` is the newest data packet the sender has received from
/// us; bit `n` of `sender_ack_bitfield` says whether data packet
/// `sender_ack_index - n` was received, so bit 0 is always set once anything
/// has arrived.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct StandardHeader {
    packet_type: PacketType,
    connect_sequence_parity: bool,
    sender_packet_index: PacketIndex,
    sender_ack_index: PacketIndex,
    sender_ack_bitfield: u32,
}

impl StandardHeader {
    pub fn new(
        packet_type: PacketType,
        connect_sequence_parity: bool,
        sender_packet_index: PacketIndex,
        sender_ack_index: PacketIndex,
        sender_ack_bitfield: u32,
    ) -> Self {
        Self {
            packet_type,
            connect_sequence_parity,
            sender_packet_index,
            sender_ack_index,
            sender_ack_bitfield,
        }
    }

    /// Header for packets sent before a connection exists.
    pub fn handshake(packet_type: PacketType) -> Self {
        Self::new(packet_type, false, 0, PacketIndex::MAX, 0)
    }

    pub fn packet_type(&self) -> PacketType {
        self.packet_type
    }

    pub fn connect_sequence_parity(&self) -> bool {
        self.connect_sequence_parity
    }

    pub fn sender_packet_index(&self) -> PacketIndex {
        self.sender_packet_index
    }

    pub fn sender_ack_index(&self) -> PacketIndex {
        self.sender_ack_index
    }

    pub fn sender_ack_bitfield(&self) -> u32 {
        self.sender_ack_bitfield
    }
}

impl Serde for StandardHeader {
    fn ser(&self, writer: &mut dyn BitWrite) {
        self.packet_type.ser(writer);
        self.connect_sequence_parity.ser(writer);
        self.sender_packet_index.ser(writer);
        self.sender_ack_index.ser(writer);
        self.sender_ack_bitfield.ser(writer);
    }

    fn de(reader: &mut BitReader) -> Result<Self, SerdeErr> {
        let packet_type = PacketType::de(reader)?;
        let connect_sequence_parity = bool::de(reader)?;
        let sender_packet_index = PacketIndex::de(reader)?;
        let sender_ack_index = PacketIndex::de(reader)?;
        let sender_ack_bitfield = u32::de(reader)?;

        Ok(Self {
            packet_type,
            connect_sequence_parity,
            sender_packet_index,
            sender_ack_index,
            sender_ack_bitfield,
        })
    }

    fn bit_length(&self) -> u32 {
        self.packet_type.bit_length()
            + self.connect_sequence_parity.bit_length()
            + self.sender_packet_index.bit_length()
            + self.sender_ack_index.bit_length()
            + self.sender_ack_bitfield.bit_length()
    }
}
