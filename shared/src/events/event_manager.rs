use std::collections::{BTreeMap, BTreeSet, VecDeque};

use log::{trace, warn};

use wraith_serde::{BitCounter, BitReader, BitWrite, BitWriter, Serde};

use crate::{
    events::{
        net_event::{Event, EventGuarantee, NetEvent},
        EventError,
    },
    strings::{
        connection_string_table::ConnectionStringTable,
        string_codec::{StringPacker, StringUnpacker},
    },
    types::EventSeq,
};

pub const FIRST_VALID_SEND_EVENT_SEQ: EventSeq = 0;
/// Ordered events that may be in flight beyond the last contiguously
/// acknowledged one. Receivers reconstruct sequences from 7 bits, so this
/// must stay below 128.
pub const ORDERED_EVENT_WINDOW: EventSeq = 126;

const SEQ_LOW_BITS: u8 = 7;
const SEQ_LOW_MASK: EventSeq = (1 << SEQ_LOW_BITS) - 1;

struct SentEvent<E> {
    seq: Option<EventSeq>,
    event: NetEvent<E>,
}

/// Reliable events carried by one data packet.
pub struct EventPacketRecord<E> {
    events: Vec<SentEvent<E>>,
}

impl<E> EventPacketRecord<E> {
    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

impl<E> Default for EventPacketRecord<E> {
    fn default() -> Self {
        Self { events: Vec::new() }
    }
}

/// Handles both directions of the event protocol for one connection.
///
/// Outgoing unordered events (reliable or not) go out in posting order.
/// Ordered events carry a sequence number and are released to the
/// receiving application strictly in that order, however their packets
/// arrive.
pub struct EventManager<E> {
    unordered_queue: VecDeque<NetEvent<E>>,
    ordered_queue: VecDeque<(EventSeq, NetEvent<E>)>,
    next_send_seq: EventSeq,
    acked_below: EventSeq,
    acked_ahead: BTreeSet<EventSeq>,
    next_receive_seq: EventSeq,
    waiting: BTreeMap<EventSeq, NetEvent<E>>,
}

impl<E: Event> EventManager<E> {
    pub fn new() -> Self {
        Self {
            unordered_queue: VecDeque::new(),
            ordered_queue: VecDeque::new(),
            next_send_seq: FIRST_VALID_SEND_EVENT_SEQ,
            acked_below: FIRST_VALID_SEND_EVENT_SEQ,
            acked_ahead: BTreeSet::new(),
            next_receive_seq: FIRST_VALID_SEND_EVENT_SEQ,
            waiting: BTreeMap::new(),
        }
    }

    // Outgoing

    pub fn post_event(&mut self, event: NetEvent<E>) {
        if event.guarantee() == EventGuarantee::GuaranteedOrdered {
            let seq = self.next_send_seq;
            self.next_send_seq = self.next_send_seq.wrapping_add(1);
            self.ordered_queue.push_back((seq, event));
        } else {
            self.unordered_queue.push_back(event);
        }
    }

    /// Measures an event against the largest event block a packet of
    /// `max_packet_bits` could hold.
    pub fn check_event_size(
        event: &NetEvent<E>,
        strings: &mut StringPacker,
        max_packet_bits: u32,
    ) -> Result<(), EventError> {
        let mut counter = BitCounter::new(0, max_packet_bits);
        // continue flag, sequence flag and low bits, both terminators
        counter.count_bits(1 + 1 + u32::from(SEQ_LOW_BITS) + 2);
        event.pack(strings, &mut counter);
        if counter.overflowed() {
            return Err(EventError::EventTooLarge {
                bits: counter.bits_needed(),
                max_bits: max_packet_bits,
            });
        }
        Ok(())
    }

    pub fn has_outgoing(&self) -> bool {
        if !self.unordered_queue.is_empty() {
            return true;
        }
        self.ordered_queue
            .front()
            .is_some_and(|(seq, _)| self.in_window(*seq))
    }

    pub fn outgoing_len(&self) -> usize {
        self.unordered_queue.len() + self.ordered_queue.len()
    }

    /// Newest ordered sequence such that it and every earlier one have been
    /// acknowledged.
    pub fn last_acked_event_seq(&self) -> Option<EventSeq> {
        self.acked_below.checked_sub(1)
    }

    fn in_window(&self, seq: EventSeq) -> bool {
        seq.wrapping_sub(self.acked_below) < ORDERED_EVENT_WINDOW
    }

    /// Writes as many queued events as fit, unordered ones first. Events that
    /// do not fit stay queued for the next packet.
    pub fn write_packet(
        &mut self,
        writer: &mut BitWriter,
        strings: &mut StringPacker,
    ) -> EventPacketRecord<E> {
        let mut record = EventPacketRecord::default();

        // room for both section terminators
        writer.reserve_bits(2);

        // unordered section
        while let Some(event) = self.unordered_queue.front() {
            if let NetEvent::StringMapping { index, string } = event {
                if !strings.is_mapping_current(*index, string) {
                    trace!("discarding stale mapping for slot {}", index);
                    self.unordered_queue.pop_front();
                    continue;
                }
            }

            let mut counter = writer.counter();
            counter.write_bit(true);
            event.pack(&mut strings.reborrow(), &mut counter);
            if counter.overflowed() {
                break;
            }

            writer.write_bit(true);
            event.pack(strings, writer);

            let Some(event) = self.unordered_queue.pop_front() else {
                break;
            };
            if event.guarantee().is_reliable() {
                record.events.push(SentEvent { seq: None, event });
            }
        }
        writer.release_bits(1);
        writer.write_bit(false);

        // ordered section
        let mut previous_seq: Option<EventSeq> = None;
        while let Some((seq, event)) = self.ordered_queue.front() {
            let seq = *seq;
            if !self.in_window(seq) {
                break;
            }
            let follows_previous = previous_seq == Some(seq.wrapping_sub(1));

            let mut counter = writer.counter();
            counter.write_bit(true);
            Self::write_seq(&mut counter, seq, follows_previous);
            event.pack(&mut strings.reborrow(), &mut counter);
            if counter.overflowed() {
                break;
            }

            writer.write_bit(true);
            Self::write_seq(writer, seq, follows_previous);
            event.pack(strings, writer);

            let Some((seq, event)) = self.ordered_queue.pop_front() else {
                break;
            };
            record.events.push(SentEvent {
                seq: Some(seq),
                event,
            });
            previous_seq = Some(seq);
        }
        writer.release_bits(1);
        writer.write_bit(false);

        record
    }

    fn write_seq(writer: &mut dyn BitWrite, seq: EventSeq, follows_previous: bool) {
        writer.write_bit(follows_previous);
        if !follows_previous {
            writer.write_bits(u64::from(seq & SEQ_LOW_MASK), SEQ_LOW_BITS);
        }
    }

    /// The packet carrying `record` arrived: free its events and advance
    /// the acknowledged high-water mark.
    pub fn packet_received(
        &mut self,
        record: EventPacketRecord<E>,
        strings: &mut ConnectionStringTable,
    ) {
        for sent in record.events {
            if let NetEvent::StringMapping { index, string } = &sent.event {
                strings.confirm_string_received(string, *index);
            }
            if let Some(seq) = sent.seq {
                if seq.wrapping_sub(self.acked_below) < ORDERED_EVENT_WINDOW {
                    self.acked_ahead.insert(seq);
                }
                while self.acked_ahead.remove(&self.acked_below) {
                    self.acked_below = self.acked_below.wrapping_add(1);
                }
            }
        }
    }

    /// The packet carrying `record` was lost: queue its reliable events
    /// again, ahead of anything posted since, keeping their relative order.
    pub fn packet_dropped(&mut self, record: EventPacketRecord<E>, strings: &ConnectionStringTable) {
        for sent in record.events.into_iter().rev() {
            match sent.seq {
                Some(seq) => {
                    let base = self.acked_below;
                    let position = self.ordered_queue.partition_point(|(queued, _)| {
                        queued.wrapping_sub(base) < seq.wrapping_sub(base)
                    });
                    self.ordered_queue.insert(position, (seq, sent.event));
                }
                None => {
                    if let NetEvent::StringMapping { index, string } = &sent.event {
                        if !strings.is_current(*index, string) {
                            continue;
                        }
                    }
                    self.unordered_queue.push_front(sent.event);
                }
            }
        }
    }

    // Incoming

    /// Reads an event block, pushing the events ready for delivery onto
    /// `delivered` in delivery order. String mappings are applied
    /// immediately. On a decode error everything read before it is still
    /// applied and delivered.
    pub fn read_packet(
        &mut self,
        reader: &mut BitReader,
        strings: &mut ConnectionStringTable,
        delivered: &mut Vec<NetEvent<E>>,
    ) -> Result<(), EventError> {
        let result = self.read_sections(reader, strings, delivered);

        while let Some(event) = self.waiting.remove(&self.next_receive_seq) {
            delivered.push(event);
            self.next_receive_seq = self.next_receive_seq.wrapping_add(1);
        }

        result
    }

    fn read_sections(
        &mut self,
        reader: &mut BitReader,
        strings: &mut ConnectionStringTable,
        delivered: &mut Vec<NetEvent<E>>,
    ) -> Result<(), EventError> {
        while bool::de(reader)? {
            let event = NetEvent::unpack(&StringUnpacker::new(Some(&*strings)), reader)?;
            match event {
                NetEvent::StringMapping { index, string } => {
                    trace!("peer mapped slot {} to {:?}", index, string);
                    strings.map_string(index, string);
                }
                event => delivered.push(event),
            }
        }

        let mut previous_seq: Option<EventSeq> = None;
        while bool::de(reader)? {
            let seq = if bool::de(reader)? {
                previous_seq
                    .ok_or(EventError::MissingOrderedPredecessor)?
                    .wrapping_add(1)
            } else {
                let low = reader.read_bits(SEQ_LOW_BITS)? as EventSeq;
                let mut seq = (self.next_receive_seq & !SEQ_LOW_MASK) | low;
                if seq < self.next_receive_seq {
                    seq = seq.wrapping_add(SEQ_LOW_MASK + 1);
                }
                seq
            };
            previous_seq = Some(seq);

            let event = NetEvent::unpack(&StringUnpacker::new(Some(&*strings)), reader)?;
            if seq.wrapping_sub(self.next_receive_seq) > SEQ_LOW_MASK {
                warn!("ordered event {} outside the receive window, ignored", seq);
                continue;
            }
            self.waiting.insert(seq, event);
        }

        Ok(())
    }

    /// Ordered events received but still waiting on an earlier sequence.
    pub fn waiting_len(&self) -> usize {
        self.waiting.len()
    }

    // Demo

    pub fn write_start_block(&self, writer: &mut dyn BitWrite) {
        self.next_receive_seq.ser(writer);
        let mut strings = StringPacker::literal();
        for (seq, event) in &self.waiting {
            true.ser(writer);
            seq.ser(writer);
            event.pack(&mut strings, writer);
        }
        false.ser(writer);
    }

    pub fn read_start_block(&mut self, reader: &mut BitReader) -> Result<(), EventError> {
        self.next_receive_seq = EventSeq::de(reader)?;
        self.waiting.clear();
        while bool::de(reader)? {
            let seq = EventSeq::de(reader)?;
            let event = NetEvent::unpack(&StringUnpacker::literal(), reader)?;
            self.waiting.insert(seq, event);
        }
        Ok(())
    }

    /// Drops everything queued in either direction.
    pub fn clear(&mut self) {
        self.unordered_queue.clear();
        self.ordered_queue.clear();
        self.acked_ahead.clear();
        self.waiting.clear();
    }
}

impl<E: Event> Default for EventManager<E> {
    fn default() -> Self {
        Self::new()
    }
}
