//! `BroadcastSocket` and `StreamPool` are the two primitives every
//! higher crate builds fan-out and stream-numbering on top of; these
//! scenarios exercise them the way a session actually would, across
//! membership changes and concurrent acquisition.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use gw_wire::{BroadcastSocket, InstructionBuilder, Socket, StreamPool};

struct RecordingSocket {
    received: Mutex<Vec<String>>,
    open: AtomicBool,
}

impl RecordingSocket {
    fn new() -> Arc<Self> {
        Arc::new(Self { received: Mutex::new(Vec::new()), open: AtomicBool::new(true) })
    }
}

impl Socket for RecordingSocket {
    fn write_instruction(&self, rendered: &str) {
        if self.is_open() {
            self.received.lock().unwrap().push(rendered.to_string());
        }
    }
    fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }
}

#[test]
fn a_user_that_leaves_mid_session_stops_receiving_broadcasts_but_keeps_earlier_ones() {
    let broadcast = BroadcastSocket::new();
    let joiner = RecordingSocket::new();
    let leaver = RecordingSocket::new();
    broadcast.add(joiner.clone() as Arc<dyn Socket>);
    broadcast.add(leaver.clone() as Arc<dyn Socket>);

    broadcast.write_instruction(&InstructionBuilder::new("sync").int(1).build());
    broadcast.remove_where(|m| Arc::ptr_eq(m, &(leaver.clone() as Arc<dyn Socket>)));
    broadcast.write_instruction(&InstructionBuilder::new("sync").int(2).build());

    assert_eq!(joiner.received.lock().unwrap().len(), 2);
    assert_eq!(leaver.received.lock().unwrap().len(), 1);
    assert_eq!(broadcast.len(), 1);
}

#[test]
fn closing_a_socket_silently_drops_its_share_of_a_broadcast() {
    let broadcast = BroadcastSocket::new();
    let a = RecordingSocket::new();
    let b = RecordingSocket::new();
    broadcast.add(a.clone() as Arc<dyn Socket>);
    broadcast.add(b.clone() as Arc<dyn Socket>);

    a.open.store(false, Ordering::Release);
    broadcast.write_instruction(&InstructionBuilder::new("ready").str("id").build());

    assert!(a.received.lock().unwrap().is_empty());
    assert_eq!(b.received.lock().unwrap().len(), 1);
    // Membership is unaffected by a socket merely closing; only an
    // explicit remove_where shrinks it.
    assert_eq!(broadcast.len(), 2);
}

#[test]
fn stream_pool_hands_out_a_fresh_index_for_each_concurrent_sequence() {
    use std::collections::HashSet;
    use std::sync::Mutex as StdMutex;

    let next = StdMutex::new(1i32);
    let in_use: StdMutex<HashSet<i32>> = StdMutex::new(HashSet::new());
    let acquire = || {
        let mut n = next.lock().unwrap();
        let v = *n;
        *n += 2; // mimics the odd-indexed session stream table
        assert!(in_use.lock().unwrap().insert(v), "stream index handed out while still in use");
        v
    };
    let release = |v: i32| {
        assert!(in_use.lock().unwrap().remove(&v));
    };
    let pool = StreamPool::new(&acquire, &release);

    for _ in 0..5 {
        pool.with(|stream| {
            assert!(in_use.lock().unwrap().contains(&stream));
        });
    }
    assert!(in_use.lock().unwrap().is_empty());
}
