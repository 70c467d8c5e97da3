use crate::demo::DemoError;

pub const DEMO_VERSION: u32 = 1;
/// Largest payload a block header can describe.
pub const MAX_BLOCK_SIZE: usize = (1 << 12) - 1;

/// Each block starts with `(type << 12) | size` as a little endian u16.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DemoBlockType {
    /// A datagram the connection received
    Packet,
    /// The connection decided to send a data packet
    SendPacket,
}

impl DemoBlockType {
    pub(crate) fn to_bits(self) -> u16 {
        match self {
            DemoBlockType::Packet => 0,
            DemoBlockType::SendPacket => 1,
        }
    }

    pub(crate) fn from_bits(bits: u16) -> Result<Self, DemoError> {
        match bits {
            0 => Ok(DemoBlockType::Packet),
            1 => Ok(DemoBlockType::SendPacket),
            _ => Err(DemoError::InvalidBlockType {
                block_type: bits as u8,
            }),
        }
    }
}

pub(crate) fn block_header(block_type: DemoBlockType, size: usize) -> Result<[u8; 2], DemoError> {
    if size > MAX_BLOCK_SIZE {
        return Err(DemoError::BlockTooLarge {
            size,
            max_size: MAX_BLOCK_SIZE,
        });
    }
    Ok(((block_type.to_bits() << 12) | size as u16).to_le_bytes())
}

pub(crate) fn parse_block_header(header: [u8; 2]) -> Result<(DemoBlockType, usize), DemoError> {
    let header = u16::from_le_bytes(header);
    let block_type = DemoBlockType::from_bits(header >> 12)?;
    Ok((block_type, usize::from(header & 0x0FFF)))
}
