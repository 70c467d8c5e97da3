use wraith_shared::{ConnectionConfig, NetStringHandle, ENTRY_COUNT};
use wraith_test::{init_logging, test_config, TestEvent, TestPair};

fn tag(text: &str) -> String {
    NetStringHandle::tagged(text).as_str().to_string()
}

fn send_and_collect(pair: &mut TestPair, texts: &[String]) -> Vec<TestEvent> {
    let (client_key, server_key) = (pair.client.connection_keys()[0], pair.server_key().unwrap());
    for text in texts {
        pair.client_connection(client_key)
            .unwrap()
            .post_event(TestEvent::Chat(text.clone()))
            .unwrap();
    }
    let mut received = Vec::new();
    pair.run_until(10_000, |pair| {
        received.extend(pair.server_connection(server_key).unwrap().take_events());
        received.len() >= texts.len()
    });
    received
}

fn chats(texts: &[String]) -> Vec<TestEvent> {
    texts.iter().cloned().map(TestEvent::Chat).collect()
}

#[test]
fn tagged_strings_are_confirmed_then_indexed() {
    init_logging();
    let mut pair = TestPair::new();
    let (client_key, _) = pair.establish();
    let greeting = tag("a rather long greeting that repeats a lot");

    let first = send_and_collect(&mut pair, &[greeting.clone()]);
    assert_eq!(first, chats(&[greeting.clone()]));

    pair.advance(1_000);
    let table = pair.client.connection(client_key).unwrap().string_table();
    assert!(table.is_confirmed(&NetStringHandle::new(&greeting)));

    // once confirmed the string costs a table index instead of its bytes
    let bits_before = pair.client.connection(client_key).unwrap().stats().bits_sent;
    let repeated = vec![greeting; 20];
    let received = send_and_collect(&mut pair, &repeated);
    let bits_spent = pair.client.connection(client_key).unwrap().stats().bits_sent - bits_before;

    assert_eq!(received, chats(&repeated));
    let literal_bits = 20 * 8 * repeated[0].len() as u64;
    assert!(bits_spent < literal_bits);
}

#[test]
fn validated_strings_are_announced_before_use() {
    init_logging();
    let mut pair = TestPair::new();
    let (client_key, _) = pair.establish();
    let name = tag("announced early");

    pair.client_connection(client_key)
        .unwrap()
        .validate_send_string(&name);
    pair.advance(1_000);

    let table = pair.client.connection(client_key).unwrap().string_table();
    assert!(table.is_confirmed(&NetStringHandle::new(&name)));
}

#[test]
fn evicted_strings_still_arrive_intact() {
    init_logging();
    let mut pair = TestPair::new();
    pair.establish();

    let texts: Vec<String> = (0..ENTRY_COUNT + 8).map(|i| tag(&format!("tag {}", i))).collect();
    assert_eq!(send_and_collect(&mut pair, &texts), chats(&texts));
    pair.advance(1_000);

    // the oldest tags lost their slots to the newest ones
    let reused: Vec<String> = texts[..8].to_vec();
    assert_eq!(send_and_collect(&mut pair, &reused), chats(&reused));
    let mixed: Vec<String> = texts.iter().rev().step_by(3).cloned().collect();
    assert_eq!(send_and_collect(&mut pair, &mixed), chats(&mixed));
}

#[test]
fn translation_can_be_switched_off() {
    init_logging();
    let client_config = ConnectionConfig {
        translate_strings: false,
        ..test_config()
    };
    let mut pair = TestPair::with_configs(client_config, test_config());
    let (client_key, _) = pair.establish();
    let label = tag("never interned");

    let received = send_and_collect(&mut pair, &[label.clone(), label.clone()]);
    pair.advance(1_000);

    assert_eq!(received, chats(&[label.clone(), label.clone()]));
    let table = pair.client.connection(client_key).unwrap().string_table();
    assert!(!table.is_confirmed(&NetStringHandle::new(&label)));
}
