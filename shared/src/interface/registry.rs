use std::{
    collections::{BTreeMap, HashMap, VecDeque},
    net::SocketAddr,
};

use crate::{
    connection::net_connection::NetConnection,
    events::net_event::Event,
    ghosts::replicate::Replicate,
    types::ConnectionKey,
};

/// Owns every connection of an interface, addressable by key or by remote
/// address, plus the list of established ones (most recent first).
pub struct ConnectionRegistry<E, R> {
    connections: BTreeMap<ConnectionKey, NetConnection<E, R>>,
    addresses: HashMap<SocketAddr, ConnectionKey>,
    established: VecDeque<ConnectionKey>,
    next_key: u64,
}

impl<E: Event, R: Replicate> ConnectionRegistry<E, R> {
    pub fn new() -> Self {
        Self {
            connections: BTreeMap::new(),
            addresses: HashMap::new(),
            established: VecDeque::new(),
            next_key: 0,
        }
    }

    /// Adds a connection. Its address must not be registered yet.
    pub fn insert(&mut self, connection: NetConnection<E, R>) -> ConnectionKey {
        let key = ConnectionKey::from_u64(self.next_key);
        self.next_key += 1;

        let previous = self.addresses.insert(connection.address(), key);
        debug_assert!(previous.is_none(), "address registered twice");
        self.connections.insert(key, connection);
        key
    }

    /// Moves a connection onto the established list.
    pub fn establish(&mut self, key: ConnectionKey) {
        if !self.connections.contains_key(&key) || self.established.contains(&key) {
            return;
        }
        self.established.push_front(key);
    }

    pub fn remove(&mut self, key: ConnectionKey) -> Option<NetConnection<E, R>> {
        let connection = self.connections.remove(&key)?;
        self.addresses.remove(&connection.address());
        self.established.retain(|established| *established != key);
        Some(connection)
    }

    pub fn get(&self, key: ConnectionKey) -> Option<&NetConnection<E, R>> {
        self.connections.get(&key)
    }

    pub fn get_mut(&mut self, key: ConnectionKey) -> Option<&mut NetConnection<E, R>> {
        self.connections.get_mut(&key)
    }

    pub fn key_for(&self, address: &SocketAddr) -> Option<ConnectionKey> {
        self.addresses.get(address).copied()
    }

    /// Every key, in insertion order.
    pub fn keys(&self) -> Vec<ConnectionKey> {
        self.connections.keys().copied().collect()
    }

    /// Established connections, most recently established first.
    pub fn established_keys(&self) -> impl Iterator<Item = ConnectionKey> + '_ {
        self.established.iter().copied()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (ConnectionKey, &mut NetConnection<E, R>)> {
        self.connections
            .iter_mut()
            .map(|(key, connection)| (*key, connection))
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

impl<E: Event, R: Replicate> Default for ConnectionRegistry<E, R> {
    fn default() -> Self {
        Self::new()
    }
}
