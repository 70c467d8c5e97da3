use proptest::prelude::*;

use wraith_shared::{ConnectionConfig, ConnectionError, EventError};
use wraith_test::{init_logging, test_config, TestEvent, TestPair, CLIENT_ADDR};

fn chat(text: &str) -> TestEvent {
    TestEvent::Chat(text.to_string())
}

#[test]
fn chat_reaches_server_in_order() {
    init_logging();
    let mut pair = TestPair::new();
    let (client_key, server_key) = pair.establish();

    let sent: Vec<TestEvent> = (0..50).map(|i| chat(&format!("line {}", i))).collect();
    for event in &sent {
        pair.client_connection(client_key)
            .unwrap()
            .post_event(event.clone())
            .unwrap();
    }

    let mut received = Vec::new();
    let done = pair.run_until(5_000, |pair| {
        received.extend(pair.server_connection(server_key).unwrap().take_events());
        received.len() >= sent.len()
    });

    assert!(done);
    assert_eq!(received, sent);
}

#[test]
fn server_events_reach_the_client() {
    init_logging();
    let mut pair = TestPair::new();
    let (client_key, server_key) = pair.establish();

    let server = pair.server_connection(server_key).unwrap();
    server.post_event(TestEvent::Score(-12)).unwrap();
    server.post_event(chat("welcome")).unwrap();

    let mut received = Vec::new();
    let done = pair.run_until(2_000, |pair| {
        received.extend(pair.client_connection(client_key).unwrap().take_events());
        received.len() >= 2
    });

    assert!(done);
    assert!(received.contains(&TestEvent::Score(-12)));
    assert!(received.contains(&chat("welcome")));
}

#[test]
fn unguaranteed_events_are_not_resent() {
    init_logging();
    let mut pair = TestPair::new();
    let (client_key, server_key) = pair.establish();
    pair.advance(500);

    pair.network.set_loss(|_, _, _| true);
    pair.client_connection(client_key)
        .unwrap()
        .post_event(TestEvent::Position { x: 3, y: -4 })
        .unwrap();
    pair.advance(300);
    pair.network.clear_loss();
    pair.advance(2_000);

    assert!(pair.server_connection(server_key).unwrap().take_events().is_empty());
}

#[test]
fn disabled_events_are_refused() {
    init_logging();
    let client_config = ConnectionConfig {
        send_events: false,
        ..test_config()
    };
    let mut pair = TestPair::with_configs(client_config, test_config());
    let (client_key, _) = pair.establish();

    let result = pair.client_connection(client_key).unwrap().post_event(chat("hi"));

    assert!(matches!(
        result,
        Err(ConnectionError::Event(EventError::EventsDisabled))
    ));
}

#[test]
fn oversized_events_are_refused() {
    init_logging();
    let mut pair = TestPair::new();
    let (client_key, _) = pair.establish();

    let result = pair
        .client_connection(client_key)
        .unwrap()
        .post_event(chat(&"x".repeat(200)));

    assert!(matches!(
        result,
        Err(ConnectionError::Event(EventError::EventTooLarge { .. }))
    ));
}

#[test]
fn any_single_lost_datagram_is_recovered() {
    init_logging();
    for lost in 1..=20u32 {
        let mut pair = TestPair::new();
        let (client_key, server_key) = pair.establish();

        let mut sent_from_client = 0;
        pair.network.set_loss(move |from, _, _| {
            if *from != CLIENT_ADDR {
                return false;
            }
            sent_from_client += 1;
            sent_from_client == lost
        });

        let sent: Vec<TestEvent> = (0..20).map(|i| chat(&format!("line {}", i))).collect();
        for event in &sent {
            pair.client_connection(client_key)
                .unwrap()
                .post_event(event.clone())
                .unwrap();
        }

        let mut received = Vec::new();
        pair.run_until(5_000, |pair| {
            received.extend(pair.server_connection(server_key).unwrap().take_events());
            received.len() >= sent.len()
        });

        assert_eq!(received, sent, "losing client datagram {}", lost);
    }
}

fn any_event() -> impl Strategy<Value = TestEvent> {
    prop_oneof![
        "[a-zA-Z ]{0,40}".prop_map(TestEvent::Chat),
        any::<i32>().prop_map(TestEvent::Score),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn reliable_events_arrive_intact(events in prop::collection::vec(any_event(), 1..40)) {
        let mut pair = TestPair::new();
        let (client_key, server_key) = pair.establish();
        for event in &events {
            pair.client_connection(client_key).unwrap().post_event(event.clone()).unwrap();
        }

        let mut received = Vec::new();
        pair.run_until(10_000, |pair| {
            received.extend(pair.server_connection(server_key).unwrap().take_events());
            received.len() >= events.len()
        });

        let chats = |list: &[TestEvent]| -> Vec<TestEvent> {
            list.iter().filter(|e| matches!(e, TestEvent::Chat(_))).cloned().collect()
        };
        let scores = |list: &[TestEvent]| -> Vec<TestEvent> {
            let mut scores: Vec<TestEvent> =
                list.iter().filter(|e| matches!(e, TestEvent::Score(_))).cloned().collect();
            scores.sort_by_key(|e| match e {
                TestEvent::Score(score) => *score,
                _ => 0,
            });
            scores
        };
        prop_assert_eq!(received.len(), events.len());
        prop_assert_eq!(chats(&received), chats(&events));
        prop_assert_eq!(scores(&received), scores(&events));
    }

    #[test]
    fn ordered_events_survive_loss(
        count in 1usize..40,
        loss in 0.0f32..0.3,
        seed in any::<u64>(),
    ) {
        let mut pair = TestPair::new();
        let (client_key, server_key) = pair.establish();

        let mut rng = fastrand::Rng::with_seed(seed);
        pair.network.set_loss(move |_, _, _| rng.f32() < loss);

        let sent: Vec<TestEvent> = (0..count).map(|i| chat(&format!("msg {}", i))).collect();
        for event in &sent {
            pair.client_connection(client_key).unwrap().post_event(event.clone()).unwrap();
        }

        let mut received = Vec::new();
        pair.run_until(30_000, |pair| {
            received.extend(pair.server_connection(server_key).unwrap().take_events());
            received.len() >= sent.len()
        });
        pair.advance(1_000);
        received.extend(pair.server_connection(server_key).unwrap().take_events());

        prop_assert_eq!(received, sent);
    }
}
