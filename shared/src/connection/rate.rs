use wraith_serde::{BitReader, BitWrite, SerdeErr};

pub const MIN_PACKET_RATE_TO_SERVER: u32 = 8;
pub const MAX_PACKET_RATE_TO_SERVER: u32 = 32;
pub const MIN_PACKET_RATE_TO_CLIENT: u32 = 1;
pub const MAX_PACKET_RATE_TO_CLIENT: u32 = 32;
pub const MIN_PACKET_SIZE: u32 = 100;
pub const MAX_PACKET_SIZE: u32 = 450;

/// Both rate fields travel as 10-bit integers.
pub const RATE_FIELD_BITS: u8 = 10;
const MAX_UPDATE_DELAY: u32 = (1 << RATE_FIELD_BITS) - 1;

pub const DEFAULT_UPDATE_DELAY: u32 = 102;
pub const DEFAULT_PACKET_SIZE: u32 = 200;

/// Packet pacing parameters: milliseconds between packets and the byte
/// budget of each packet.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NetRate {
    pub update_delay: u32,
    pub packet_size: u32,
    /// Set when the values must be (re)announced to the remote side.
    pub changed: bool,
}

impl NetRate {
    pub fn new(update_delay: u32, packet_size: u32) -> Self {
        Self {
            update_delay: update_delay.min(MAX_UPDATE_DELAY),
            packet_size,
            changed: false,
        }
    }

    /// Rate for a given packets-per-second figure, clamped to the range
    /// allowed for the direction of travel.
    pub fn from_config(packet_rate: u32, packet_size: u32, to_server: bool) -> Self {
        let packet_rate = if to_server {
            packet_rate.clamp(MIN_PACKET_RATE_TO_SERVER, MAX_PACKET_RATE_TO_SERVER)
        } else {
            packet_rate.clamp(MIN_PACKET_RATE_TO_CLIENT, MAX_PACKET_RATE_TO_CLIENT)
        };
        let packet_size = packet_size.clamp(MIN_PACKET_SIZE, MAX_PACKET_SIZE);
        Self::new(1024 / packet_rate, packet_size)
    }

    pub fn same_values(&self, other: &NetRate) -> bool {
        self.update_delay == other.update_delay && self.packet_size == other.packet_size
    }

    /// Narrows a remotely announced maximum by our own: the slower delay and
    /// the smaller packet win.
    pub fn negotiate(local_max: &NetRate, remote_max: &NetRate) -> NetRate {
        NetRate::new(
            remote_max.update_delay.max(local_max.update_delay),
            remote_max.packet_size.min(local_max.packet_size),
        )
    }

    pub fn write_fields(&self, writer: &mut dyn BitWrite) {
        writer.write_bits(u64::from(self.update_delay), RATE_FIELD_BITS);
        writer.write_bits(u64::from(self.packet_size), RATE_FIELD_BITS);
    }

    /// Reads announced fields. The received packet size is clamped so a
    /// peer can never push our packets past the allowed bounds.
    pub fn read_fields(reader: &mut BitReader) -> Result<NetRate, SerdeErr> {
        let update_delay = reader.read_bits(RATE_FIELD_BITS)? as u32;
        let packet_size = reader.read_bits(RATE_FIELD_BITS)? as u32;
        Ok(NetRate::new(
            update_delay.max(1),
            packet_size.clamp(MIN_PACKET_SIZE, MAX_PACKET_SIZE),
        ))
    }
}

impl Default for NetRate {
    fn default() -> Self {
        NetRate::new(DEFAULT_UPDATE_DELAY, DEFAULT_PACKET_SIZE)
    }
}
