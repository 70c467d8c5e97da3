//! # Wraith Shared
//! Reliable, ordered, ghost-replicated connections over an unreliable
//! datagram transport.

#![deny(trivial_numeric_casts, unstable_features, unused_import_braces)]

#[macro_use]
extern crate cfg_if;

pub use wraith_serde::{
    BitCounter, BitReader, BitWrite, BitWriter, ConstBitLength, Serde, SerdeErr,
    SerdeIntegerConversion, SignedInteger, SignedVariableInteger, UnsignedInteger,
    UnsignedVariableInteger, MTU_SIZE_BITS, MTU_SIZE_BYTES,
};

mod connection;
mod demo;
mod events;
mod ghosts;
mod interface;
mod strings;
mod transport;
mod types;
mod wrapping_number;

pub use connection::{
    ack_manager::{AckManager, AckReport, ACK_MASK_BITS},
    connection_config::{
        class_crc, ConnectionConfig, DEFAULT_PING_RETRY_COUNT, DEFAULT_WINDOW_SIZE,
        MAX_GHOST_COUNT, PING_TIMEOUT_MS,
    },
    connection_event::{ConnectionEvent, ConnectionState},
    error::{ConnectionError, HandshakeError, PacketError, CLASS_CRC_MISMATCH_CODE},
    handshake::{ConnectAccept, ConnectReject, ConnectRequest, Disconnect},
    net_connection::{NetConnection, MAX_SEND_DELAY_CREDIT},
    network_stats::NetworkStats,
    packet_type::PacketType,
    rate::{
        NetRate, MAX_PACKET_RATE_TO_CLIENT, MAX_PACKET_RATE_TO_SERVER, MAX_PACKET_SIZE,
        MIN_PACKET_RATE_TO_CLIENT, MIN_PACKET_RATE_TO_SERVER, MIN_PACKET_SIZE, RATE_FIELD_BITS,
    },
    standard_header::StandardHeader,
};
pub use demo::{DemoBlockType, DemoError, DemoPlayer, DemoRecorder, DEMO_VERSION, MAX_BLOCK_SIZE};
pub use events::{
    event_manager::{EventManager, FIRST_VALID_SEND_EVENT_SEQ, ORDERED_EVENT_WINDOW},
    net_event::{ConnectionMessage, Event, EventGuarantee, GhostControl, NetEvent},
    EventError,
};
pub use ghosts::{
    ghost_receiver::GhostReceiver,
    ghost_sender::GhostSender,
    replicate::{GhostSource, Replicate, ScopeSet},
    GhostError, GhostEvent, GHOST_ID_BIT_SIZE,
};
pub use interface::{ConnectionRegistry, NetInterface, MAX_REMOVED_CONNECTIONS};
pub use strings::{
    connection_string_table::{ConnectionStringTable, ENTRY_BIT_SIZE, ENTRY_COUNT},
    net_string::{NetStringHandle, STRING_TAG_PREFIX_BYTE},
    string_codec::{StringPacker, StringUnpacker, MAX_CSTRING_LENGTH},
};
pub use transport::{
    LinkConditioner, LinkConditionerConfig, PacketReceiver, PacketSender, TransportError,
};
pub use types::{
    ClassId, ConnectionKey, EventSeq, GhostId, Millis, ObjectId, PacketIndex, StateMask,
    FULL_STATE_MASK,
};
pub use wrapping_number::{sequence_greater_than, sequence_less_than, wrapping_diff};

cfg_if! {
    if #[cfg(feature = "transport_udp")] {
        pub use transport::{UdpPacketReceiver, UdpPacketSender, UdpTransport};
    }
}
