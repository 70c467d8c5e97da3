/// In-memory datagram network for end-to-end tests.
/// Every endpoint gets a queue keyed by its address; nothing touches a socket.
use std::{
    collections::{HashMap, VecDeque},
    net::SocketAddr,
    sync::{Arc, Mutex, MutexGuard},
};

use wraith_shared::{PacketReceiver, PacketSender, TransportError};

type Datagram = (SocketAddr, Vec<u8>);

/// Decides per datagram whether it is lost: `(from, to, payload) -> drop`.
pub type LossFn = Box<dyn FnMut(&SocketAddr, &SocketAddr, &[u8]) -> bool + Send>;

#[derive(Default)]
struct Inner {
    queues: HashMap<SocketAddr, VecDeque<Datagram>>,
    loss: Option<LossFn>,
    sent: u64,
    dropped: u64,
}

/// Shared hub routing datagrams between local endpoints.
#[derive(Clone, Default)]
pub struct LocalNetwork {
    inner: Arc<Mutex<Inner>>,
}

impl LocalNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sender and receiver halves for an endpoint bound at `address`.
    pub fn bind(&self, address: SocketAddr) -> (Box<dyn PacketSender>, Box<dyn PacketReceiver>) {
        self.lock().queues.entry(address).or_default();
        let sender = LocalSender {
            network: self.clone(),
            from: address,
        };
        let receiver = LocalReceiver {
            network: self.clone(),
            address,
        };
        (Box::new(sender), Box::new(receiver))
    }

    /// Installs a loss rule consulted for every datagram.
    pub fn set_loss(&self, loss: impl FnMut(&SocketAddr, &SocketAddr, &[u8]) -> bool + Send + 'static) {
        self.lock().loss = Some(Box::new(loss));
    }

    pub fn clear_loss(&self) {
        self.lock().loss = None;
    }

    /// Drops everything towards `address` until cleared.
    pub fn cut(&self, address: SocketAddr) {
        self.set_loss(move |_, to, _| *to == address);
    }

    /// Datagrams waiting for `address`.
    pub fn pending(&self, address: &SocketAddr) -> usize {
        self.lock().queues.get(address).map_or(0, VecDeque::len)
    }

    /// Throws away everything still in flight.
    pub fn flush(&self) {
        for queue in self.lock().queues.values_mut() {
            queue.clear();
        }
    }

    pub fn datagrams_sent(&self) -> u64 {
        self.lock().sent
    }

    pub fn datagrams_dropped(&self) -> u64 {
        self.lock().dropped
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

// Sender

struct LocalSender {
    network: LocalNetwork,
    from: SocketAddr,
}

impl PacketSender for LocalSender {
    fn send(&mut self, address: &SocketAddr, payload: &[u8]) -> Result<(), TransportError> {
        let mut inner = self.network.lock();
        inner.sent += 1;
        let lost = match inner.loss.as_mut() {
            Some(loss) => loss(&self.from, address, payload),
            None => false,
        };
        if lost {
            inner.dropped += 1;
            return Ok(());
        }
        // datagrams to an unbound address vanish, like on a real network
        if let Some(queue) = inner.queues.get_mut(address) {
            queue.push_back((self.from, payload.to_vec()));
        }
        Ok(())
    }
}

// Receiver

struct LocalReceiver {
    network: LocalNetwork,
    address: SocketAddr,
}

impl PacketReceiver for LocalReceiver {
    fn receive(&mut self) -> Result<Option<(SocketAddr, Vec<u8>)>, TransportError> {
        Ok(self
            .network
            .lock()
            .queues
            .get_mut(&self.address)
            .and_then(VecDeque::pop_front))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    #[test]
    fn datagrams_reach_the_bound_address() {
        let network = LocalNetwork::new();
        let (mut a_send, _a_recv) = network.bind(addr(1));
        let (_b_send, mut b_recv) = network.bind(addr(2));

        a_send.send(&addr(2), &[1, 2, 3]).unwrap();
        a_send.send(&addr(9), &[4]).unwrap();

        assert_eq!(b_recv.receive().unwrap(), Some((addr(1), vec![1, 2, 3])));
        assert_eq!(b_recv.receive().unwrap(), None);
        assert_eq!(network.datagrams_sent(), 2);
    }

    #[test]
    fn cut_link_drops_datagrams() {
        let network = LocalNetwork::new();
        let (mut a_send, _a_recv) = network.bind(addr(1));
        let (_b_send, mut b_recv) = network.bind(addr(2));

        network.cut(addr(2));
        a_send.send(&addr(2), &[1]).unwrap();
        assert_eq!(b_recv.receive().unwrap(), None);
        assert_eq!(network.datagrams_dropped(), 1);

        network.clear_loss();
        a_send.send(&addr(2), &[2]).unwrap();
        assert_eq!(network.pending(&addr(2)), 1);
    }
}
