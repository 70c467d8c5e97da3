use std::{collections::VecDeque, net::SocketAddr};

use log::{debug, info, trace, warn};

use wraith_serde::{BitReader, BitWriter, Serde};

use crate::{
    connection::{
        connection_config::ConnectionConfig,
        connection_event::ConnectionEvent,
        handshake::{ConnectReject, ConnectRequest},
        net_connection::NetConnection,
        packet_type::PacketType,
        standard_header::StandardHeader,
    },
    events::net_event::Event,
    ghosts::replicate::{GhostSource, Replicate},
    interface::registry::ConnectionRegistry,
    transport::{PacketReceiver, PacketSender},
    types::{ConnectionKey, Millis, ObjectId, StateMask},
};

/// Removed connections kept for [`NetInterface::take_removed_connections`].
/// Past this the oldest are dropped.
pub const MAX_REMOVED_CONNECTIONS: usize = 64;

/// One endpoint of the protocol: a datagram transport plus every
/// connection made through it.
///
/// Incoming datagrams are routed by sender address. Connect requests from
/// unknown addresses are validated against our class data and either
/// accepted or rejected.
pub struct NetInterface<E, R> {
    config: ConnectionConfig,
    sender: Box<dyn PacketSender>,
    receiver: Box<dyn PacketReceiver>,
    registry: ConnectionRegistry<E, R>,
    next_connect_sequence: u32,
    allow_connections: bool,
    connection_events: VecDeque<(ConnectionKey, ConnectionEvent)>,
    removed: VecDeque<(ConnectionKey, NetConnection<E, R>)>,
}

impl<E: Event, R: Replicate> NetInterface<E, R> {
    pub fn new(
        config: ConnectionConfig,
        sender: Box<dyn PacketSender>,
        receiver: Box<dyn PacketReceiver>,
    ) -> Self {
        Self {
            config,
            sender,
            receiver,
            registry: ConnectionRegistry::new(),
            next_connect_sequence: fastrand::u32(..),
            allow_connections: true,
            connection_events: VecDeque::new(),
            removed: VecDeque::new(),
        }
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Whether connect requests from unknown peers are answered at all.
    pub fn set_allow_connections(&mut self, allow: bool) {
        self.allow_connections = allow;
    }

    /// Starts connecting to a peer. An existing connection to the same
    /// address is dropped first.
    pub fn connect(&mut self, address: SocketAddr, now: Millis) -> ConnectionKey {
        if let Some(key) = self.registry.key_for(&address) {
            warn!("Interface Error: replacing connection to {}", address);
            self.remove_connection(key, now);
        }
        let connect_sequence = self.next_connect_sequence;
        self.next_connect_sequence = self.next_connect_sequence.wrapping_add(1);

        let connection = NetConnection::connect(self.config.clone(), address, connect_sequence, now);
        let key = self.registry.insert(connection);
        info!("connecting to {} as {}", address, key);
        key
    }

    /// Sends a disconnect to the peer and drops the connection.
    pub fn disconnect(&mut self, key: ConnectionKey, reason: &str, now: Millis) {
        let Some(connection) = self.registry.get_mut(key) else {
            return;
        };
        if let Err(error) = connection.disconnect(now, reason, self.sender.as_mut()) {
            warn!("Interface Error: Cannot send disconnect to {}: {}", connection.address(), error);
        }
        self.remove_connection(key, now);
    }

    pub fn connection(&self, key: ConnectionKey) -> Option<&NetConnection<E, R>> {
        self.registry.get(key)
    }

    pub fn connection_mut(&mut self, key: ConnectionKey) -> Option<&mut NetConnection<E, R>> {
        self.registry.get_mut(key)
    }

    pub fn connection_keys(&self) -> Vec<ConnectionKey> {
        self.registry.keys()
    }

    /// Established connections, most recently established first.
    pub fn established_keys(&self) -> Vec<ConnectionKey> {
        self.registry.established_keys().collect()
    }

    pub fn connection_count(&self) -> usize {
        self.registry.len()
    }

    /// Marks state bits of an object dirty on every connection.
    pub fn object_changed(&mut self, object: ObjectId, mask: StateMask) {
        for (_, connection) in self.registry.iter_mut() {
            connection.object_changed(object, mask);
        }
    }

    pub fn take_connection_events(&mut self) -> Vec<(ConnectionKey, ConnectionEvent)> {
        self.connection_events.drain(..).collect()
    }

    /// Connections removed since the last call, oldest first, with whatever
    /// events they still held. Only the last [`MAX_REMOVED_CONNECTIONS`] are
    /// kept between calls.
    pub fn take_removed_connections(&mut self) -> Vec<(ConnectionKey, NetConnection<E, R>)> {
        self.removed.drain(..).collect()
    }

    // Tick

    /// Reads every waiting datagram, then drives each connection. Finished
    /// connections are removed.
    pub fn tick(&mut self, now: Millis, source: &dyn GhostSource<R>) {
        self.maintain_socket(now);

        for key in self.registry.keys() {
            let Some(connection) = self.registry.get_mut(key) else {
                continue;
            };
            if let Err(error) = connection.tick(now, self.sender.as_mut(), source) {
                warn!("Interface Error: {} for {}", error, connection.address());
            }
            self.collect_events(key);
        }

        for key in self.registry.keys() {
            let finished = self
                .registry
                .get(key)
                .is_some_and(|connection| connection.state().is_terminal());
            if finished {
                self.remove_connection(key, now);
            }
        }
    }

    fn maintain_socket(&mut self, now: Millis) {
        loop {
            match self.receiver.receive() {
                Ok(Some((address, payload))) => self.route_packet(now, address, &payload),
                Ok(None) => break,
                Err(error) => {
                    warn!("Interface Error: {}", error);
                    break;
                }
            }
        }
    }

    fn route_packet(&mut self, now: Millis, address: SocketAddr, payload: &[u8]) {
        let mut reader = BitReader::new(payload);
        let Ok(header) = StandardHeader::de(&mut reader) else {
            warn!("Interface Error: malformed packet from {}", address);
            return;
        };

        let Some(key) = self.registry.key_for(&address) else {
            if header.packet_type() == PacketType::ConnectRequest {
                self.handle_connect_request(now, address, &mut reader, payload);
            } else {
                trace!("ignoring {} packet from unknown {}", header.packet_type().name(), address);
            }
            return;
        };

        // a peer that restarted connects again with a new sequence
        if header.packet_type() == PacketType::ConnectRequest {
            if let Ok(request) = ConnectRequest::de(&mut reader) {
                let restarted = self.registry.get(key).is_some_and(|connection| {
                    !connection.is_initiator()
                        && connection.connect_sequence() != request.connect_sequence
                });
                if restarted {
                    info!("{} reconnected", address);
                    self.remove_connection(key, now);
                    let mut reader = BitReader::new(payload);
                    let _ = StandardHeader::de(&mut reader);
                    self.handle_connect_request(now, address, &mut reader, payload);
                    return;
                }
            }
        }

        let Some(connection) = self.registry.get_mut(key) else {
            return;
        };
        if let Err(error) = connection.process_packet(now, payload, self.sender.as_mut()) {
            warn!("Interface Error: dropped packet from {}: {}", address, error);
        }
        if connection.is_established() {
            self.registry.establish(key);
        }
        self.collect_events(key);
    }

    fn handle_connect_request(
        &mut self,
        now: Millis,
        address: SocketAddr,
        reader: &mut BitReader,
        payload: &[u8],
    ) {
        if !self.allow_connections {
            trace!("refusing connect request from {}", address);
            return;
        }
        let Ok(request) = ConnectRequest::de(reader) else {
            warn!("Interface Error: malformed connect request from {}", address);
            return;
        };

        if let Err(error) = request.validate(self.config.net_class_group, self.config.class_crc) {
            warn!("Interface Error: rejecting {}: {}", address, error);
            let reject = ConnectReject {
                connect_sequence: request.connect_sequence,
                reason: error.reject_code(),
            };
            let mut writer = BitWriter::new();
            StandardHeader::handshake(PacketType::ConnectReject).ser(&mut writer);
            reject.ser(&mut writer);
            if self.sender.send(&address, &writer.to_bytes()).is_err() {
                warn!("Interface Error: Cannot send reject to {}", address);
            }
            return;
        }

        let connection =
            NetConnection::accept(self.config.clone(), address, request.connect_sequence, now);
        let key = self.registry.insert(connection);
        self.registry.establish(key);
        info!("accepted {} as {}", address, key);

        // the connection answers its own request with an accept
        if let Some(connection) = self.registry.get_mut(key) {
            if let Err(error) = connection.process_packet(now, payload, self.sender.as_mut()) {
                warn!("Interface Error: Cannot accept {}: {}", address, error);
            }
        }
        self.collect_events(key);
    }

    fn collect_events(&mut self, key: ConnectionKey) {
        let Some(connection) = self.registry.get_mut(key) else {
            return;
        };
        for event in connection.take_connection_events() {
            self.connection_events.push_back((key, event));
        }
    }

    fn remove_connection(&mut self, key: ConnectionKey, now: Millis) {
        self.collect_events(key);
        let Some(mut connection) = self.registry.remove(key) else {
            return;
        };
        connection.on_remove(now);
        info!("removed {} ({})", key, connection.address());
        if self.removed.len() >= MAX_REMOVED_CONNECTIONS {
            if let Some((dropped, _)) = self.removed.pop_front() {
                debug!("removed connection {} was never collected", dropped);
            }
        }
        self.removed.push_back((key, connection));
    }
}
