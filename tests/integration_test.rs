#![cfg(not(feature = "loom"))]

use rcu_chain::{NodeId, Writer};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

#[ctor::ctor]
fn init_logger() {
    let _ = env_logger::builder()
        .is_test(true)
        .filter_level(log::LevelFilter::Debug)
        .try_init();
}

/// Records its id into a shared log when dropped
struct Tracked {
    id: u64,
    log: Arc<Mutex<Vec<u64>>>,
}

impl Tracked {
    fn new(id: NodeId, log: &Arc<Mutex<Vec<u64>>>) -> Self {
        Self {
            id: id.get(),
            log: log.clone(),
        }
    }
}

impl Drop for Tracked {
    fn drop(&mut self) {
        self.log.lock().unwrap().push(self.id);
    }
}

fn ids<T>(writer: &Writer<T>) -> Vec<u64> {
    writer.iter().map(|node| node.id().get()).collect()
}

#[test]
fn test_publish_prepends_and_assigns_ids() {
    let (mut writer, mut reader) = Writer::new();
    assert!(writer.is_empty());
    assert_eq!(writer.last_id(), None);

    let a = writer.publish("a").unwrap();
    let b = writer.publish("b").unwrap();
    let c = writer.publish("c").unwrap();
    assert_eq!([a.get(), b.get(), c.get()], [1, 2, 3]);
    assert_eq!(writer.last_id(), Some(c));
    assert_eq!(writer.next_id().get(), 4);

    let session = reader.begin();
    let seen: Vec<_> = session.iter().map(|node| (node.id().get(), *node)).collect();
    assert_eq!(seen, [(3, "c"), (2, "b"), (1, "a")]);
    assert_eq!(session.head().map(|node| *node), Some("c"));
}

#[test]
fn test_empty_chain_session_ends_immediately() {
    let (_writer, mut reader) = Writer::<u32>::new();
    let session = reader.begin();
    assert!(session.head().is_none());
    assert_eq!(session.iter().count(), 0);
    session.end();

    assert_eq!(reader.read(|iter| iter.count()), 0);
}

#[test]
fn test_publish_with_derives_payload_from_id() {
    let (mut writer, mut reader) = Writer::new();
    for _ in 0..3 {
        writer.publish_with(|id| format!("node_{id}")).unwrap();
    }

    reader.read(|iter| {
        for node in iter {
            assert_eq!(*node, format!("node_{}", node.id()));
        }
    });
}

#[test]
fn test_sliding_window_scenario() {
    // Publish 1..=4, retiring the node two generations behind from id 3 on
    let log = Arc::new(Mutex::new(Vec::new()));
    let (mut writer, _reader) = Writer::new();

    for expected in 1..=4u64 {
        let id = writer.publish_with(|id| Tracked::new(id, &log)).unwrap();
        assert_eq!(id.get(), expected);

        if let Some(old) = id.generations_back(2) {
            let node = writer.unlink_id(old).expect("window node is linked");
            assert_eq!(node.id(), old);
            drop(writer.retire(node));
        }

        if expected == 3 {
            assert_eq!(*log.lock().unwrap(), [1]);
            assert_eq!(ids(&writer), [3, 2]);
        }
    }

    assert_eq!(ids(&writer), [4, 3]);
    assert_eq!(*log.lock().unwrap(), [1, 2]);
}

#[test]
fn test_unlink_not_found_is_benign() {
    let (mut writer, _reader) = Writer::new();
    let first = writer.publish(10).unwrap();
    assert!(writer.unlink(|node| *node == 99).is_none());

    let node = writer.unlink_id(first).unwrap();
    assert_eq!(writer.retire(node), 10);
    // Already gone
    assert!(writer.unlink_id(first).is_none());
    assert!(writer.is_empty());
}

#[test]
fn test_unlink_from_middle_keeps_order() {
    let (mut writer, _reader) = Writer::new();
    for value in 0..5 {
        writer.publish(value).unwrap();
    }

    let node = writer.unlink(|node| *node == 2).unwrap();
    assert_eq!(*node, 2);
    assert_eq!(ids(&writer), [5, 4, 2, 1]);
    writer.retire(node);
    assert_eq!(writer.len(), 4);
}

#[test]
fn test_reader_steps_past_node_unlinked_under_it() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let (mut writer, mut reader) = Writer::new();
    let published: Vec<NodeId> = (0..3)
        .map(|_| writer.publish_with(|id| Tracked::new(id, &log)).unwrap())
        .collect();
    let two = published[1];

    let session = reader.begin();
    let mut iter = session.iter();
    let standing = iter.nth(1).unwrap();
    assert_eq!(standing.id(), two);

    let (tx, rx) = mpsc::channel();
    let retirer = thread::spawn(move || {
        let node = writer.unlink_id(two).unwrap();
        tx.send(()).unwrap();
        drop(writer.retire(node));
        writer
    });

    rx.recv().unwrap();
    thread::sleep(Duration::from_millis(50));
    // The session is still open, so node 2 must not be reclaimed yet
    assert!(log.lock().unwrap().is_empty());
    assert_eq!(standing.value().id, 2);

    let rest: Vec<u64> = iter.map(|node| node.id().get()).collect();
    assert_eq!(rest, [1]);
    drop(session);

    let writer = retirer.join().unwrap();
    assert_eq!(*log.lock().unwrap(), [2]);
    assert_eq!(ids(&writer), [3, 1]);
}

#[test]
fn test_session_started_after_unlink_never_sees_node() {
    let (mut writer, mut reader) = Writer::new();
    let first = writer.publish(1).unwrap();
    writer.publish(2).unwrap();

    let node = writer.unlink_id(first).unwrap();
    let seen: Vec<_> = reader.read(|iter| iter.map(|node| *node).collect());
    assert_eq!(seen, [2]);
    writer.retire(node);
}

#[test]
fn test_forgotten_session_does_not_hide_the_next_one() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let (mut writer, mut reader) = Writer::new();
    let id = writer.publish_with(|id| Tracked::new(id, &log)).unwrap();

    std::mem::forget(reader.begin());
    let session = reader.begin();
    let standing = session.head().unwrap();

    let (done_tx, done_rx) = mpsc::channel();
    let retirer = thread::spawn(move || {
        let node = writer.unlink_id(id).unwrap();
        drop(writer.retire(node));
        done_tx.send(()).unwrap();
    });

    assert!(done_rx.recv_timeout(Duration::from_millis(100)).is_err());
    assert!(log.lock().unwrap().is_empty());
    assert_eq!(standing.value().id, 1);

    drop(session);
    done_rx
        .recv_timeout(Duration::from_secs(5))
        .expect("retire did not finish after the session ended");
    retirer.join().unwrap();
    assert_eq!(*log.lock().unwrap(), [1]);
}

#[test]
fn test_dropping_reader_closes_forgotten_session() {
    let (mut writer, mut reader) = Writer::new();
    let id = writer.publish(7u32).unwrap();
    std::mem::forget(reader.begin());

    let (done_tx, done_rx) = mpsc::channel();
    let retirer = thread::spawn(move || {
        let node = writer.unlink_id(id).unwrap();
        done_tx.send(writer.retire(node)).unwrap();
    });

    assert!(done_rx.recv_timeout(Duration::from_millis(100)).is_err());
    drop(reader);
    assert_eq!(
        done_rx
            .recv_timeout(Duration::from_secs(5))
            .expect("retire stalled on a dropped reader"),
        7
    );
    retirer.join().unwrap();
}

#[test]
fn test_dropping_unlinked_reclaims() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let (mut writer, _reader) = Writer::new();
    let id = writer.publish_with(|id| Tracked::new(id, &log)).unwrap();

    let node = writer.unlink_id(id).unwrap();
    assert!(log.lock().unwrap().is_empty());
    drop(node);
    assert_eq!(*log.lock().unwrap(), [1]);
}

#[test]
fn test_drain_reclaims_everything() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let (mut writer, mut reader) = Writer::new();
    for _ in 0..5 {
        writer.publish_with(|id| Tracked::new(id, &log)).unwrap();
    }

    assert_eq!(writer.drain(), 5);
    assert!(writer.is_empty());
    assert_eq!(reader.read(|iter| iter.count()), 0);

    let mut reclaimed = log.lock().unwrap().clone();
    reclaimed.sort_unstable();
    assert_eq!(reclaimed, [1, 2, 3, 4, 5]);

    assert_eq!(writer.drain(), 0);
    // Ids keep advancing after a drain
    assert_eq!(writer.publish_with(|id| Tracked::new(id, &log)).unwrap().get(), 6);
}

#[test]
fn test_dropping_all_handles_frees_linked_nodes() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let (mut writer, reader) = Writer::new();
    for _ in 0..3 {
        writer.publish_with(|id| Tracked::new(id, &log)).unwrap();
    }
    let extra = writer.reader();

    drop(writer);
    drop(reader);
    assert!(log.lock().unwrap().is_empty(), "a reader still holds the chain");

    drop(extra);
    assert_eq!(log.lock().unwrap().len(), 3);
}

#[test]
fn test_grace_period_without_sessions_returns_immediately() {
    let (writer, reader) = Writer::<u8>::new();
    let _idle = reader.clone();

    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        writer.wait_for_grace_period();
        drop(reader);
        tx.send(()).unwrap();
    });

    rx.recv_timeout(Duration::from_secs(5))
        .expect("grace period stalled with no open session");
}

#[test]
fn test_grace_period_waits_for_open_session() {
    let (writer, mut reader) = Writer::<u8>::new();
    let (opened_tx, opened_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel::<()>();

    let holder = thread::spawn(move || {
        let session = reader.begin();
        opened_tx.send(()).unwrap();
        release_rx.recv().unwrap();
        drop(session);
    });

    opened_rx.recv().unwrap();
    let (done_tx, done_rx) = mpsc::channel();
    let waiter = thread::spawn(move || {
        writer.wait_for_grace_period();
        done_tx.send(()).unwrap();
    });

    assert!(done_rx.recv_timeout(Duration::from_millis(100)).is_err());
    release_tx.send(()).unwrap();
    done_rx
        .recv_timeout(Duration::from_secs(5))
        .expect("grace period did not end with the session");

    holder.join().unwrap();
    waiter.join().unwrap();
}
