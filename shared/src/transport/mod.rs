cfg_if! {
    if #[cfg(feature = "transport_udp")] {
        mod udp;
        pub use udp::{UdpPacketReceiver, UdpPacketSender, UdpTransport};
    } else {}
}

mod error;
mod link_conditioner;

pub use error::TransportError;
pub use link_conditioner::{LinkConditioner, LinkConditionerConfig};

use std::{collections::VecDeque, net::SocketAddr};

/// Outgoing half of an unreliable datagram transport.
pub trait PacketSender {
    fn send(&mut self, address: &SocketAddr, payload: &[u8]) -> Result<(), TransportError>;
}

/// Incoming half of an unreliable datagram transport. Never blocks.
pub trait PacketReceiver {
    /// Next datagram, or `None` if nothing is waiting
    fn receive(&mut self) -> Result<Option<(SocketAddr, Vec<u8>)>, TransportError>;
}

/// Collects datagrams instead of sending them.
impl PacketSender for Vec<(SocketAddr, Vec<u8>)> {
    fn send(&mut self, address: &SocketAddr, payload: &[u8]) -> Result<(), TransportError> {
        self.push((*address, payload.to_vec()));
        Ok(())
    }
}

/// Hands out queued datagrams in order.
impl PacketReceiver for VecDeque<(SocketAddr, Vec<u8>)> {
    fn receive(&mut self) -> Result<Option<(SocketAddr, Vec<u8>)>, TransportError> {
        Ok(self.pop_front())
    }
}
