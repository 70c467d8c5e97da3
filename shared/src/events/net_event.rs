use wraith_serde::{BitReader, BitWrite, SerdeErr};

use crate::{
    events::EventError,
    ghosts::GHOST_ID_BIT_SIZE,
    strings::{
        connection_string_table::ENTRY_BIT_SIZE,
        net_string::NetStringHandle,
        string_codec::{read_cstring, write_cstring, StringPacker, StringUnpacker},
    },
};

const EVENT_KIND_BITS: u8 = 2;
const CONNECTION_MESSAGE_BITS: u8 = 3;
const GHOST_COUNT_BITS: u8 = GHOST_ID_BIT_SIZE + 1;

/// Delivery guarantee of an event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventGuarantee {
    /// Delivered exactly once, in posting order relative to other ordered events
    GuaranteedOrdered,
    /// Delivered exactly once, as soon as it arrives
    Guaranteed,
    /// Sent once; lost if its packet is lost
    Unguaranteed,
}

impl EventGuarantee {
    pub fn is_reliable(&self) -> bool {
        !matches!(self, EventGuarantee::Unguaranteed)
    }
}

/// Application-defined event payload.
///
/// `pack` may be run more than once for the same event (once against a
/// counter to measure it, once for real), so it must write the same bits
/// every time it is given the same string table state.
pub trait Event: Sized + Clone {
    fn guarantee(&self) -> EventGuarantee;
    fn pack(&self, strings: &mut StringPacker, writer: &mut dyn BitWrite);
    fn unpack(strings: &StringUnpacker, reader: &mut BitReader) -> Result<Self, SerdeErr>;
}

/// Control messages driving the ghosting handshake.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GhostControl {
    /// The sender is about to start ghosting objects to the receiver
    StartGhosting,
    /// The receiver is ready for ghosts of the announced sequence
    ReadyForGhosts,
    /// The sender dropped every ghost; the receiver should do the same
    EndGhosting,
}

impl GhostControl {
    fn to_bits(self) -> u64 {
        match self {
            GhostControl::StartGhosting => 0,
            GhostControl::ReadyForGhosts => 1,
            GhostControl::EndGhosting => 2,
        }
    }

    fn from_bits(bits: u64) -> Result<Self, EventError> {
        match bits {
            0 => Ok(GhostControl::StartGhosting),
            1 => Ok(GhostControl::ReadyForGhosts),
            2 => Ok(GhostControl::EndGhosting),
            _ => Err(EventError::UnknownConnectionMessage {
                message: bits as u8,
            }),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConnectionMessage {
    pub message: GhostControl,
    /// Ghosting sequence the message belongs to; stale ones are ignored
    pub sequence: u32,
    pub ghost_count: u16,
}

/// Everything that travels in a packet's event block.
#[derive(Clone, Debug, PartialEq)]
pub enum NetEvent<E> {
    /// Binds a slot of the sender's string table to a string
    StringMapping { index: u8, string: NetStringHandle },
    ConnectionMessage(ConnectionMessage),
    Application(E),
}

impl<E: Event> NetEvent<E> {
    pub fn guarantee(&self) -> EventGuarantee {
        match self {
            NetEvent::StringMapping { .. } => EventGuarantee::Guaranteed,
            NetEvent::ConnectionMessage(_) => EventGuarantee::GuaranteedOrdered,
            NetEvent::Application(event) => event.guarantee(),
        }
    }

    pub fn pack(&self, strings: &mut StringPacker, writer: &mut dyn BitWrite) {
        match self {
            NetEvent::StringMapping { index, string } => {
                writer.write_bits(0, EVENT_KIND_BITS);
                writer.write_bits(u64::from(*index), ENTRY_BIT_SIZE);
                write_cstring(string.as_str(), writer);
            }
            NetEvent::ConnectionMessage(message) => {
                writer.write_bits(1, EVENT_KIND_BITS);
                writer.write_bits(message.message.to_bits(), CONNECTION_MESSAGE_BITS);
                writer.write_bits(u64::from(message.sequence), 32);
                writer.write_bits(u64::from(message.ghost_count), GHOST_COUNT_BITS);
            }
            NetEvent::Application(event) => {
                writer.write_bits(2, EVENT_KIND_BITS);
                event.pack(strings, writer);
            }
        }
    }

    pub fn unpack(strings: &StringUnpacker, reader: &mut BitReader) -> Result<Self, EventError> {
        match reader.read_bits(EVENT_KIND_BITS)? {
            0 => {
                let index = reader.read_bits(ENTRY_BIT_SIZE)? as u8;
                let string = NetStringHandle::from(read_cstring(reader)?);
                Ok(NetEvent::StringMapping { index, string })
            }
            1 => {
                let message = GhostControl::from_bits(reader.read_bits(CONNECTION_MESSAGE_BITS)?)?;
                let sequence = reader.read_bits(32)? as u32;
                let ghost_count = reader.read_bits(GHOST_COUNT_BITS)? as u16;
                Ok(NetEvent::ConnectionMessage(ConnectionMessage {
                    message,
                    sequence,
                    ghost_count,
                }))
            }
            2 => Ok(NetEvent::Application(E::unpack(strings, reader)?)),
            kind => Err(EventError::UnknownEventKind { kind: kind as u8 }),
        }
    }
}
