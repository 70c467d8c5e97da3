use wraith_shared::{
    ConnectionConfig, ConnectionEvent, ConnectionKey, ConnectionState, CLASS_CRC_MISMATCH_CODE,
    DEFAULT_PING_RETRY_COUNT, MAX_REMOVED_CONNECTIONS, PING_TIMEOUT_MS,
};
use wraith_test::{
    init_logging, test_config, LocalNetwork, TestInterface, TestPair, CLIENT_ADDR, SERVER_ADDR,
};

#[test]
fn client_and_server_connect() {
    init_logging();
    let mut pair = TestPair::new();

    let (client_key, server_key) = pair.establish();

    assert!(pair.client_saw(&ConnectionEvent::Connected));
    assert!(pair.server_saw(&ConnectionEvent::Connected));
    assert_eq!(pair.server.connection_count(), 1);

    let client = pair.client.connection(client_key).unwrap();
    let server = pair.server.connection(server_key).unwrap();
    assert!(client.is_initiator());
    assert!(!server.is_initiator());
    assert_eq!(client.address(), SERVER_ADDR);
    assert_eq!(server.address(), CLIENT_ADDR);
    assert_eq!(client.connect_sequence(), server.connect_sequence());
}

#[test]
fn class_mismatch_is_rejected() {
    init_logging();
    let server_config = ConnectionConfig::default().with_classes(0, ["SomethingElse"]);
    let mut pair = TestPair::with_configs(test_config(), server_config);

    pair.connect();
    let rejected = pair.run_until(1_000, |pair| {
        pair.client_saw(&ConnectionEvent::ConnectionRejected {
            reason: CLASS_CRC_MISMATCH_CODE.to_string(),
        })
    });

    assert!(rejected);
    assert_eq!(pair.client.connection_count(), 0);
    assert_eq!(pair.server.connection_count(), 0);
    assert!(!pair.client_saw(&ConnectionEvent::Connected));
}

#[test]
fn refused_connections_get_no_answer() {
    init_logging();
    let mut pair = TestPair::new();
    pair.server.set_allow_connections(false);

    let key = pair.connect();
    pair.advance(1_000);

    assert_eq!(pair.server.connection_count(), 0);
    assert_eq!(
        pair.client.connection(key).map(|connection| connection.state()),
        Some(ConnectionState::Connecting)
    );
}

#[test]
fn unanswered_connect_times_out() {
    init_logging();
    let mut pair = TestPair::new();
    pair.network.cut(SERVER_ADDR);

    pair.connect();
    let timed_out = pair.run_until(12_000, |pair| {
        pair.client_saw(&ConnectionEvent::ConnectTimedOut)
    });

    assert!(timed_out);
    // four requests at 2.5s intervals, then a last interval of silence
    assert!(pair.now >= 10_000);
    assert_eq!(pair.network.datagrams_dropped(), 4);
    assert_eq!(pair.client.connection_count(), 0);
    assert_eq!(pair.client.take_removed_connections().len(), 1);
}

#[test]
fn lost_requests_are_retried() {
    init_logging();
    let mut pair = TestPair::new();
    let mut dropped = 0;
    pair.network.set_loss(move |_, to, _| {
        if *to == SERVER_ADDR && dropped < 2 {
            dropped += 1;
            return true;
        }
        false
    });

    let (client_key, _) = pair.establish();

    assert!(pair.client.connection(client_key).unwrap().is_established());
    assert!(pair.now >= 5_000);
}

#[test]
fn silent_peers_time_out_after_every_ping() {
    init_logging();
    let mut pair = TestPair::new();
    pair.establish();
    pair.advance(500);

    pair.network.set_loss(|_, _, _| true);
    let silent_at = pair.now;
    let timed_out = pair.run_until(80_000, |pair| {
        pair.client_saw(&ConnectionEvent::TimedOut) && pair.server_saw(&ConnectionEvent::TimedOut)
    });

    assert!(timed_out);
    assert!(pair.now - silent_at >= DEFAULT_PING_RETRY_COUNT * PING_TIMEOUT_MS);
    assert_eq!(pair.client.connection_count(), 0);
    assert_eq!(pair.server.connection_count(), 0);
}

#[test]
fn brief_loss_burst_is_survived() {
    init_logging();
    let mut pair = TestPair::new();
    let (client_key, server_key) = pair.establish();

    pair.network.set_loss(|_, _, _| true);
    pair.advance(1_000);
    pair.network.clear_loss();
    pair.advance(2_000);

    assert!(!pair.client_saw(&ConnectionEvent::TimedOut));
    let client = pair.client.connection(client_key).unwrap();
    assert!(client.is_established());
    assert!(client.stats().packets_dropped > 0);
    assert!(pair.server.connection(server_key).unwrap().is_established());
}

#[test]
fn disconnect_reaches_the_peer() {
    init_logging();
    let mut pair = TestPair::new();
    let (client_key, _) = pair.establish();

    let now = pair.now;
    pair.client.disconnect(client_key, "quitting", now);
    assert_eq!(pair.client.connection_count(), 0);

    let told = pair.run_until(1_000, |pair| {
        pair.server_saw(&ConnectionEvent::Disconnected {
            reason: "quitting".to_string(),
        })
    });

    assert!(told);
    assert_eq!(pair.server.connection_count(), 0);
    // the side that hung up hears nothing about it
    assert!(pair
        .client_events
        .iter()
        .all(|(_, event)| !matches!(event, ConnectionEvent::Disconnected { .. })));
}

#[test]
fn restarted_client_reconnects() {
    init_logging();
    let mut pair = TestPair::new();
    let (old_key, _) = pair.establish();

    let new_key = pair.connect();
    assert_ne!(old_key, new_key);
    assert_eq!(pair.client.connection_count(), 1);

    let reconnected = pair.run_until(5_000, |pair| {
        pair.client
            .connection(new_key)
            .is_some_and(|connection| connection.is_established())
    });
    assert!(reconnected);

    let new_sequence = pair.client.connection(new_key).unwrap().connect_sequence();
    assert_eq!(pair.server.connection_count(), 1);
    let server_key = pair.server_key().unwrap();
    assert_eq!(
        pair.server.connection(server_key).unwrap().connect_sequence(),
        new_sequence
    );
    let connected = pair
        .server_events
        .iter()
        .filter(|(_, event)| *event == ConnectionEvent::Connected)
        .count();
    assert_eq!(connected, 2);
}

#[test]
fn uncollected_removals_are_capped() {
    init_logging();
    let network = LocalNetwork::new();
    let (sender, receiver) = network.bind(CLIENT_ADDR);
    let mut client = TestInterface::new(test_config(), sender, receiver);

    let mut keys = Vec::new();
    for _ in 0..MAX_REMOVED_CONNECTIONS + 8 {
        let key = client.connect(SERVER_ADDR, 0);
        client.disconnect(key, "changed my mind", 0);
        keys.push(key);
    }

    let removed: Vec<ConnectionKey> = client
        .take_removed_connections()
        .into_iter()
        .map(|(key, _)| key)
        .collect();
    assert_eq!(removed, keys[8..].to_vec());
    assert!(client.take_removed_connections().is_empty());
}
