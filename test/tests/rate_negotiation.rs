use wraith_shared::{ConnectionConfig, NetRate};
use wraith_test::{init_logging, test_config, TestPair};

#[test]
fn both_sides_settle_on_the_slower_rate() {
    init_logging();
    let client_config = ConnectionConfig {
        packet_rate_to_client: 5,
        ..test_config()
    };
    let mut pair = TestPair::with_configs(client_config, test_config());
    let (client_key, server_key) = pair.establish();
    pair.advance(2_000);

    let expected = NetRate::new(1024 / 5, 200);
    let client = pair.client.connection(client_key).unwrap();
    let server = pair.server.connection(server_key).unwrap();
    assert!(client.cur_rate().same_values(&expected));
    assert!(server.cur_rate().same_values(&expected));
    assert!(server.max_rate().same_values(&NetRate::new(1024 / 32, 200)));
}

#[test]
fn lowered_maximum_is_renegotiated() {
    init_logging();
    let mut pair = TestPair::new();
    let (client_key, server_key) = pair.establish();
    pair.advance(1_000);

    pair.server_connection(server_key)
        .unwrap()
        .set_max_rate(8, 120);
    pair.advance(2_000);

    let expected = NetRate::new(1024 / 8, 120);
    let client = pair.client.connection(client_key).unwrap();
    let server = pair.server.connection(server_key).unwrap();
    assert!(client.cur_rate().same_values(&expected));
    assert!(server.cur_rate().same_values(&expected));
    assert!(client.max_rate().same_values(&NetRate::new(1024 / 10, 200)));
}

#[test]
fn data_packets_follow_the_negotiated_delay() {
    init_logging();
    let client_config = ConnectionConfig {
        packet_rate_to_client: 5,
        ..test_config()
    };
    let mut pair = TestPair::with_configs(client_config, test_config());
    let (client_key, _) = pair.establish();
    pair.advance(2_000);

    let before = pair.client.connection(client_key).unwrap().stats().packets_sent;
    pair.advance(2_040);
    let sent = pair.client.connection(client_key).unwrap().stats().packets_sent - before;

    // one packet every 204ms
    assert!((9..=11).contains(&sent), "sent {} packets", sent);
}
