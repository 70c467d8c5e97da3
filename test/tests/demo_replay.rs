use std::{
    io::{self, Write},
    sync::{Arc, Mutex},
};

use wraith_shared::{ConnectionKey, DemoPlayer, NetConnection};
use wraith_test::{
    init_logging, test_config, TestConnection, TestEvent, TestObject, TestPair, SERVER_ADDR,
};

/// Demo sink whose bytes stay readable after the recorder takes it.
#[derive(Clone, Default)]
struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    fn bytes(&self) -> Vec<u8> {
        self.0.lock().unwrap().clone()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn replay(buffer: &SharedBuffer, now: u32) -> TestConnection {
    let mut player = DemoPlayer::open(buffer.bytes()).unwrap();
    NetConnection::play_demo(test_config(), SERVER_ADDR, &mut player, now).unwrap()
}

fn assert_same_ghosts(live: &TestConnection, replayed: &TestConnection) {
    assert_eq!(live.ghost_count(), replayed.ghost_count());
    for id in live.ghost_receiver().ghost_ids() {
        assert_eq!(live.ghost(id), replayed.ghost(id), "ghost {}", id);
    }
}

fn move_everything(pair: &mut TestPair, step: i32) {
    for id in 1..=3 {
        let changed = pair.server_world.move_to(id, step, step * id as i32);
        pair.server.object_changed(id, changed);
    }
}

fn start_recording(pair: &mut TestPair, client_key: ConnectionKey) -> SharedBuffer {
    let buffer = SharedBuffer::default();
    pair.client_connection(client_key)
        .unwrap()
        .start_demo_recording(Box::new(buffer.clone()))
        .unwrap();
    buffer
}

#[test]
fn replay_reproduces_events_and_ghosts() {
    init_logging();
    let mut pair = TestPair::new();
    for id in 1..=3 {
        pair.server_world.spawn(id, TestObject::new(0, 0, &format!("prop {}", id)));
    }
    let (client_key, server_key) = pair.establish();
    pair.advance(500);
    pair.client_connection(client_key).unwrap().take_events();

    let buffer = start_recording(&mut pair, client_key);
    let server = pair.server_connection(server_key).unwrap();
    server.activate_ghosting().unwrap();
    server.post_event(TestEvent::Chat("round one".to_string())).unwrap();
    server.post_event(TestEvent::Score(3)).unwrap();

    let mut live_events = Vec::new();
    for step in 1..=20 {
        move_everything(&mut pair, step);
        pair.advance(100);
        live_events.extend(pair.client_connection(client_key).unwrap().take_events());
    }

    let live = pair.client_connection(client_key).unwrap();
    assert!(live.stop_demo_recording().unwrap().is_some());
    assert!(!live.is_recording_demo());
    assert_eq!(live.ghost_count(), 3);

    let mut replayed = replay(&buffer, pair.now);

    let live = pair.client.connection(client_key).unwrap();
    assert_same_ghosts(live, &replayed);
    assert_eq!(replayed.take_events(), live_events);
    assert_eq!(live_events.len(), 2);
}

#[test]
fn start_block_carries_existing_ghosts() {
    init_logging();
    let mut pair = TestPair::new();
    for id in 1..=3 {
        pair.server_world.spawn(id, TestObject::new(id as i32, 0, "\u{1}shared name"));
    }
    let (client_key, server_key) = pair.establish();
    pair.server_connection(server_key)
        .unwrap()
        .activate_ghosting()
        .unwrap();
    let synced = pair.run_until(5_000, |pair| {
        pair.client.connection(client_key).unwrap().ghost_count() == 3
    });
    assert!(synced);
    pair.advance(1_000);

    let buffer = start_recording(&mut pair, client_key);
    for step in 1..=10 {
        move_everything(&mut pair, step * 2);
        pair.advance(100);
    }
    pair.client_connection(client_key)
        .unwrap()
        .stop_demo_recording()
        .unwrap();

    let replayed = replay(&buffer, pair.now);

    assert!(replayed.is_established());
    assert_same_ghosts(pair.client.connection(client_key).unwrap(), &replayed);
}
