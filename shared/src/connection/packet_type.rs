use wraith_serde::{BitReader, BitWrite, ConstBitLength, Serde, SerdeErr, UnsignedInteger};

/// Every kind of datagram exchanged between two connection endpoints.
#[derive(Copy, Debug, Clone, Eq, PartialEq)]
pub enum PacketType {
    // Carries the rate header, the event block and the ghost block
    Data,
    // Keep-alive probe sent after a period of silence, answered with an Ack
    Ping,
    // Header-only packet carrying acknowledgments, never itself acknowledged
    Ack,
    // Sent by the initiating side until accepted, rejected or timed out
    ConnectRequest,
    ConnectAccept,
    ConnectReject,
    // Carries the reason the sender is tearing the connection down
    Disconnect,
}

impl PacketType {
    pub fn is_handshake(&self) -> bool {
        matches!(
            self,
            PacketType::ConnectRequest | PacketType::ConnectAccept | PacketType::ConnectReject
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            PacketType::Data => "Data",
            PacketType::Ping => "Ping",
            PacketType::Ack => "Ack",
            PacketType::ConnectRequest => "ConnectRequest",
            PacketType::ConnectAccept => "ConnectAccept",
            PacketType::ConnectReject => "ConnectReject",
            PacketType::Disconnect => "Disconnect",
        }
    }

    fn to_index(self) -> u8 {
        match self {
            PacketType::Data => 0,
            PacketType::Ping => 0,
            PacketType::Ack => 1,
            PacketType::ConnectRequest => 2,
            PacketType::ConnectAccept => 3,
            PacketType::ConnectReject => 4,
            PacketType::Disconnect => 5,
        }
    }
}

// Data packets dominate the traffic, so they cost a single bit.
impl Serde for PacketType {
    fn ser(&self, writer: &mut dyn BitWrite) {
        let is_data = *self == PacketType::Data;
        is_data.ser(writer);

        if is_data {
            return;
        }

        UnsignedInteger::<3>::new(self.to_index()).ser(writer);
    }

    fn de(reader: &mut BitReader) -> Result<Self, SerdeErr> {
        let is_data = bool::de(reader)?;
        if is_data {
            return Ok(PacketType::Data);
        }

        match UnsignedInteger::<3>::de(reader)?.get() {
            0 => Ok(PacketType::Ping),
            1 => Ok(PacketType::Ack),
            2 => Ok(PacketType::ConnectRequest),
            3 => Ok(PacketType::ConnectAccept),
            4 => Ok(PacketType::ConnectReject),
            5 => Ok(PacketType::Disconnect),
            _ => Err(SerdeErr),
        }
    }

    fn bit_length(&self) -> u32 {
        if *self == PacketType::Data {
            return 1;
        }
        1 + <UnsignedInteger<3> as ConstBitLength>::const_bit_length()
    }
}
