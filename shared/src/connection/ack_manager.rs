use wraith_serde::{BitReader, BitWrite, Serde, SerdeErr};

use crate::{
    connection::{error::PacketError, packet_type::PacketType, standard_header::StandardHeader},
    sequence_greater_than,
    types::PacketIndex,
    wrapping_diff,
};

/// Width of the acknowledgment mask carried by every header.
pub const ACK_MASK_BITS: u16 = 32;

/// Result of reading the ack portion of an incoming header.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct AckReport {
    /// Fate of each of our outstanding data packets that the header
    /// resolved, oldest first. `true` means delivered.
    pub notifications: Vec<bool>,
    /// Whether the packet itself is new data that should be processed.
    pub accepted: bool,
}

/// Keeps track of sent & received packets, and of which sent packets the
/// remote host has reported as received or lost.
///
/// Data packets are numbered consecutively. Anything else reuses the index
/// of the newest data packet and is never acknowledged.
pub struct AckManager {
    next_packet_index: PacketIndex,
    highest_acked: PacketIndex,
    last_received: PacketIndex,
    received_mask: u32,
    ack_owed: bool,
    window_size: u16,
}

impl AckManager {
    pub fn new(window_size: u16) -> Self {
        Self {
            next_packet_index: 0,
            highest_acked: PacketIndex::MAX,
            last_received: PacketIndex::MAX,
            received_mask: 0,
            ack_owed: false,
            window_size: window_size.clamp(1, ACK_MASK_BITS - 1),
        }
    }

    /// Process an incoming header, resolving the fate of outstanding packets
    /// and deciding whether the packet is fresh data.
    ///
    /// Late or duplicate data packets are not accepted; the remote side will
    /// already have been told they were lost.
    pub fn process_incoming_header(
        &mut self,
        header: &StandardHeader,
    ) -> Result<AckReport, PacketError> {
        let ack_index = header.sender_ack_index();
        let last_sent = self.last_sent_index();
        let ack_is_new = sequence_greater_than(ack_index, self.highest_acked);
        if ack_is_new
            && wrapping_diff(self.highest_acked, ack_index)
                > wrapping_diff(self.highest_acked, last_sent)
        {
            return Err(PacketError::UnexpectedAck {
                ack_index,
                last_sent,
            });
        }

        let is_data = header.packet_type() == PacketType::Data;
        let packet_index = header.sender_packet_index();
        let is_fresh = is_data && sequence_greater_than(packet_index, self.last_received);
        let gap = packet_index.wrapping_sub(self.last_received);
        if is_fresh && gap >= ACK_MASK_BITS {
            return Err(PacketError::SequenceGap { packet_index, gap });
        }

        let mut report = AckReport::default();

        if ack_is_new {
            let mut index = self.highest_acked;
            while index != ack_index {
                index = index.wrapping_add(1);
                let offset = ack_index.wrapping_sub(index);
                let delivered = header.sender_ack_bitfield() & (1 << offset) != 0;
                report.notifications.push(delivered);
            }
            self.highest_acked = ack_index;
        }

        if is_fresh {
            self.received_mask = (self.received_mask << gap) | 1;
            self.last_received = packet_index;
            self.ack_owed = true;
            report.accepted = true;
        }

        Ok(report)
    }

    /// Builds the header for the next outgoing packet. Only data packets
    /// consume a packet index.
    pub fn next_outgoing_packet_header(
        &mut self,
        packet_type: PacketType,
        connect_sequence_parity: bool,
    ) -> StandardHeader {
        let packet_index = if packet_type == PacketType::Data {
            let index = self.next_packet_index;
            self.next_packet_index = self.next_packet_index.wrapping_add(1);
            index
        } else {
            self.last_sent_index()
        };
        self.ack_owed = false;

        StandardHeader::new(
            packet_type,
            connect_sequence_parity,
            packet_index,
            self.last_received,
            self.received_mask,
        )
    }

    pub fn next_sender_packet_index(&self) -> PacketIndex {
        self.next_packet_index
    }

    /// Number of data packets sent whose fate is still unknown.
    pub fn packets_in_flight(&self) -> u16 {
        self.last_sent_index().wrapping_sub(self.highest_acked)
    }

    pub fn window_full(&self) -> bool {
        self.packets_in_flight() >= self.window_size
    }

    /// Whether the remote side is owed an acknowledgment for data it sent.
    pub fn ack_owed(&self) -> bool {
        self.ack_owed
    }

    fn last_sent_index(&self) -> PacketIndex {
        self.next_packet_index.wrapping_sub(1)
    }

    // Demo

    pub fn write_start_block(&self, writer: &mut dyn BitWrite) {
        self.next_packet_index.ser(writer);
        self.highest_acked.ser(writer);
        self.last_received.ser(writer);
        self.received_mask.ser(writer);
    }

    pub fn read_start_block(&mut self, reader: &mut BitReader) -> Result<(), SerdeErr> {
        self.next_packet_index = PacketIndex::de(reader)?;
        self.highest_acked = PacketIndex::de(reader)?;
        self.last_received = PacketIndex::de(reader)?;
        self.received_mask = u32::de(reader)?;
        self.ack_owed = false;
        Ok(())
    }
}
