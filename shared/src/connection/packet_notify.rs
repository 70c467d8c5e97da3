use std::collections::VecDeque;

use log::trace;

use crate::{
    events::event_manager::EventPacketRecord, ghosts::ghost_info::GhostPacketRecord,
    types::Millis,
};

/// What one outstanding data packet carried.
pub struct PacketNotify<E> {
    pub send_time: Millis,
    pub rate_changed: bool,
    pub max_rate_changed: bool,
    pub events: EventPacketRecord<E>,
    pub ghosts: GhostPacketRecord,
}

impl<E> PacketNotify<E> {
    pub fn new(send_time: Millis) -> Self {
        Self {
            send_time,
            rate_changed: false,
            max_rate_changed: false,
            events: EventPacketRecord::default(),
            ghosts: GhostPacketRecord::default(),
        }
    }
}

/// Outstanding data packets in send order. Acknowledgments resolve them
/// strictly from the front.
pub struct PacketNotifyQueue<E> {
    queue: VecDeque<PacketNotify<E>>,
    rtt: f32,
}

impl<E> PacketNotifyQueue<E> {
    pub fn new() -> Self {
        Self {
            queue: VecDeque::new(),
            rtt: 0.0,
        }
    }

    pub fn allocate(&mut self, notify: PacketNotify<E>) {
        self.queue.push_back(notify);
    }

    /// Pops the oldest record. A delivered packet feeds the round trip
    /// estimate.
    pub fn consume_head(&mut self, now: Millis, delivered: bool) -> Option<PacketNotify<E>> {
        let notify = self.queue.pop_front()?;
        if delivered {
            let sample = now.wrapping_sub(notify.send_time) as f32;
            self.rtt = (self.rtt + sample) * 0.5;
            trace!("packet delivered, rtt {:.1}ms", self.rtt);
        }
        Some(notify)
    }

    /// Records still in flight, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &PacketNotify<E>> {
        self.queue.iter()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn rtt(&self) -> f32 {
        self.rtt
    }

    pub fn set_rtt(&mut self, rtt: f32) {
        self.rtt = rtt;
    }
}

impl<E> Default for PacketNotifyQueue<E> {
    fn default() -> Self {
        Self::new()
    }
}
