use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

use log::debug;

use wraith_shared::{ConnectionConfig, ConnectionEvent, ConnectionKey, Millis, NetConnection, NetInterface};

use crate::{
    local_socket::LocalNetwork,
    test_protocol::{class_names, TestEvent, TestObject},
    test_world::TestWorld,
};

pub const CLIENT_ADDR: SocketAddr =
    SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::new(127, 0, 0, 1), 12345));
pub const SERVER_ADDR: SocketAddr =
    SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::new(127, 0, 0, 1), 54321));

pub type TestInterface = NetInterface<TestEvent, TestObject>;
pub type TestConnection = NetConnection<TestEvent, TestObject>;

/// Default configuration with the test protocol's classes.
pub fn test_config() -> ConnectionConfig {
    ConnectionConfig::default().with_classes(0, class_names())
}

/// A client and a server interface joined by a [`LocalNetwork`], each with
/// its own world. Connection events are collected as they happen.
pub struct TestPair {
    pub network: LocalNetwork,
    pub client: TestInterface,
    pub server: TestInterface,
    pub client_world: TestWorld,
    pub server_world: TestWorld,
    pub now: Millis,
    pub client_events: Vec<(ConnectionKey, ConnectionEvent)>,
    pub server_events: Vec<(ConnectionKey, ConnectionEvent)>,
}

impl TestPair {
    pub fn new() -> Self {
        Self::with_configs(test_config(), test_config())
    }

    pub fn with_configs(client_config: ConnectionConfig, server_config: ConnectionConfig) -> Self {
        let network = LocalNetwork::new();
        let (client_sender, client_receiver) = network.bind(CLIENT_ADDR);
        let (server_sender, server_receiver) = network.bind(SERVER_ADDR);
        Self {
            client: NetInterface::new(client_config, client_sender, client_receiver),
            server: NetInterface::new(server_config, server_sender, server_receiver),
            network,
            client_world: TestWorld::new(),
            server_world: TestWorld::new(),
            now: 0,
            client_events: Vec::new(),
            server_events: Vec::new(),
        }
    }

    /// Starts the client's connect handshake towards the server.
    pub fn connect(&mut self) -> ConnectionKey {
        self.client.connect(SERVER_ADDR, self.now)
    }

    /// Connects and runs until both sides are established. Returns the
    /// client's and the server's key for the connection.
    pub fn establish(&mut self) -> (ConnectionKey, ConnectionKey) {
        let client_key = self.connect();
        let established = self.run_until(12_000, |pair| {
            pair.client_connection(client_key)
                .is_some_and(|connection| connection.is_established())
                && pair.server_key().is_some()
        });
        assert!(established, "handshake did not complete");
        let server_key = self.server_key().expect("server connection");
        debug!("{} and {} established at {}ms", client_key, server_key, self.now);
        (client_key, server_key)
    }

    /// The server's most recently established connection.
    pub fn server_key(&self) -> Option<ConnectionKey> {
        self.server.established_keys().first().copied()
    }

    pub fn client_connection(&mut self, key: ConnectionKey) -> Option<&mut TestConnection> {
        self.client.connection_mut(key)
    }

    pub fn server_connection(&mut self, key: ConnectionKey) -> Option<&mut TestConnection> {
        self.server.connection_mut(key)
    }

    pub fn client_saw(&self, event: &ConnectionEvent) -> bool {
        self.client_events.iter().any(|(_, seen)| seen == event)
    }

    pub fn server_saw(&self, event: &ConnectionEvent) -> bool {
        self.server_events.iter().any(|(_, seen)| seen == event)
    }
}

impl Default for TestPair {
    fn default() -> Self {
        Self::new()
    }
}
