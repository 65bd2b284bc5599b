//! SA table integration tests.

use std::sync::{Arc, Barrier};
use std::thread;

use tcpsig::{Config, FlushPolicy, KeyStore};

use crate::common::sa;

#[test]
fn test_racing_adds_link_one_sa() {
    let store = Arc::new(KeyStore::new());
    let threads = 8;
    let barrier = Arc::new(Barrier::new(threads));

    let handles: Vec<_> = (0..threads)
        .map(|i| {
            let store = Arc::clone(&store);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let key = format!("key-{}", i);
                barrier.wait();
                store.add(
                    sa("10.0.0.1:0"),
                    sa("10.0.0.2:0"),
                    key.as_bytes(),
                    (key.len() * 8) as u16,
                )
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let ok = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(ok, 1);
    assert!(
        results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(|e| e.is_duplicate())
    );
    assert_eq!(store.len(), 1);
}

#[test]
fn test_racing_adds_of_mapped_and_plain_pair() {
    let store = Arc::new(KeyStore::new());
    let barrier = Arc::new(Barrier::new(2));

    let spawn = |src: &'static str, dst: &'static str| {
        let store = Arc::clone(&store);
        let barrier = Arc::clone(&barrier);
        thread::spawn(move || {
            barrier.wait();
            store.add(sa(src), sa(dst), b"secret", 48)
        })
    };
    let a = spawn("10.0.0.1:0", "10.0.0.2:0");
    let b = spawn("[::ffff:10.0.0.1]:0", "[::ffff:10.0.0.2]:0");

    let ok = [a.join().unwrap(), b.join().unwrap()]
        .iter()
        .filter(|r| r.is_ok())
        .count();
    assert_eq!(ok, 1);
    assert_eq!(store.len(), 1);
}

#[test]
fn test_flush_never_frees_held_sa() {
    let store = Arc::new(KeyStore::with_config(
        Config::new().flush_policy(FlushPolicy::Retain),
    ));
    store
        .add(sa("10.0.0.1:0"), sa("10.0.0.2:0"), b"secret", 48)
        .unwrap();

    let held = store.find(&sa("10.0.0.1:179"), &sa("10.0.0.2:9")).unwrap();

    let flusher = {
        let store = Arc::clone(&store);
        thread::spawn(move || (0..100).map(|_| store.flush().retained).sum::<usize>())
    };
    let retained = flusher.join().unwrap();
    assert_eq!(retained, 100);
    assert_eq!(store.len(), 1);
    assert!(!held.is_detached());

    drop(held);
    let report = store.flush();
    assert_eq!(report.removed, 1);
    assert!(store.is_empty());
}

#[test]
fn test_lookups_during_flush_see_consistent_holders() {
    let store = Arc::new(KeyStore::new());
    for i in 1..=16u8 {
        store
            .add(
                sa(&format!("10.0.1.{}:0", i)),
                sa("10.0.0.2:0"),
                b"k",
                8,
            )
            .unwrap();
    }

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                let mut held = Vec::new();
                for i in 1..=16u8 {
                    if let Some(r) = store.find(&sa(&format!("10.0.1.{}:5", i)), &sa("10.0.0.2:6")) {
                        held.push(r);
                    }
                }
                // Every guard still points at a live SA with at least our hold.
                held.iter().all(|r| r.holders() >= 1)
            })
        })
        .collect();

    store.flush();
    for r in readers {
        assert!(r.join().unwrap());
    }
    store.flush();
    assert!(store.is_empty());
}
