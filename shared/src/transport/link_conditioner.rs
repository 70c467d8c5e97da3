use std::{
    cmp::Reverse,
    collections::BinaryHeap,
    net::SocketAddr,
};

use log::trace;

use crate::types::Millis;

/// Simulated network conditions applied to outgoing datagrams.
#[derive(Clone, Debug, PartialEq)]
pub struct LinkConditionerConfig {
    /// Delay added to every datagram
    pub latency_ms: Millis,
    /// Random extra delay of up to this much in either direction
    pub jitter_ms: Millis,
    /// Share of datagrams dropped, from 0.0 to 1.0
    pub loss: f32,
    /// Seed for reproducible loss and jitter
    pub seed: u64,
}

impl LinkConditionerConfig {
    pub fn new(latency_ms: Millis, jitter_ms: Millis, loss: f32) -> Self {
        Self {
            latency_ms,
            jitter_ms,
            loss: loss.clamp(0.0, 1.0),
            seed: 0,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn perfect_condition() -> Self {
        Self::new(1, 0, 0.0)
    }

    pub fn good_condition() -> Self {
        Self::new(40, 6, 0.002)
    }

    pub fn average_condition() -> Self {
        Self::new(100, 15, 0.02)
    }

    pub fn poor_condition() -> Self {
        Self::new(200, 30, 0.1)
    }
}

struct Delayed {
    deliver_at: Millis,
    order: u64,
    address: SocketAddr,
    payload: Vec<u8>,
}

impl PartialEq for Delayed {
    fn eq(&self, other: &Self) -> bool {
        (self.deliver_at, self.order) == (other.deliver_at, other.order)
    }
}

impl Eq for Delayed {}

impl PartialOrd for Delayed {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Delayed {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.deliver_at, self.order).cmp(&(other.deliver_at, other.order))
    }
}

/// Drops and delays datagrams according to a [`LinkConditionerConfig`].
pub struct LinkConditioner {
    config: LinkConditionerConfig,
    rng: fastrand::Rng,
    queue: BinaryHeap<Reverse<Delayed>>,
    next_order: u64,
}

impl LinkConditioner {
    pub fn new(config: LinkConditionerConfig) -> Self {
        Self {
            rng: fastrand::Rng::with_seed(config.seed),
            config,
            queue: BinaryHeap::new(),
            next_order: 0,
        }
    }

    pub fn config(&self) -> &LinkConditionerConfig {
        &self.config
    }

    /// Either drops the datagram or queues it for delivery after the
    /// simulated latency.
    pub fn condition(&mut self, now: Millis, address: SocketAddr, payload: Vec<u8>) {
        if self.config.loss > 0.0 && self.rng.f32() < self.config.loss {
            trace!("link conditioner dropped {} bytes to {}", payload.len(), address);
            return;
        }

        let mut delay = self.config.latency_ms;
        if self.config.jitter_ms > 0 {
            let jitter = self.rng.u32(0..=self.config.jitter_ms * 2);
            delay = (delay + jitter).saturating_sub(self.config.jitter_ms);
        }

        self.queue.push(Reverse(Delayed {
            deliver_at: now.wrapping_add(delay),
            order: self.next_order,
            address,
            payload,
        }));
        self.next_order += 1;
    }

    /// Next datagram whose delivery time has come.
    pub fn pop_ready(&mut self, now: Millis) -> Option<(SocketAddr, Vec<u8>)> {
        if self.queue.peek()?.0.deliver_at > now {
            return None;
        }
        self.queue
            .pop()
            .map(|Reverse(delayed)| (delayed.address, delayed.payload))
    }

    pub fn queued_len(&self) -> usize {
        self.queue.len()
    }
}
