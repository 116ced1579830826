// Concurrent Access Tests for scalebloom
// These tests share one filter between threads through SharedFilter

use scalebloom::{Options, ScalingBloom, SharedFilter};
use std::sync::{Arc, Barrier};
use std::thread;
use tempfile::TempDir;

fn shared(dir: &TempDir, capacity: u64) -> SharedFilter {
    env_logger::try_init().ok();
    let path = dir.path().join("filter.bin");
    let filter = ScalingBloom::create(path, Options::new(capacity, 0.01)).unwrap();
    SharedFilter::new(filter)
}

/// Test concurrent writers on disjoint key ranges
#[test]
fn test_concurrent_writers() {
    let dir = TempDir::new().unwrap();
    let filter = shared(&dir, 500);
    let num_threads = 8;
    let keys_per_thread = 250u64;
    let barrier = Arc::new(Barrier::new(num_threads));

    let handles: Vec<_> = (0..num_threads)
        .map(|t| {
            let filter = filter.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for i in 0..keys_per_thread {
                    let id = t as u64 * keys_per_thread + i;
                    filter.add(format!("t{}_k{}", t, i).as_bytes(), id).unwrap();
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(filter.mem_seqnum(), num_threads as u64 * keys_per_thread);
    for t in 0..num_threads {
        for i in 0..keys_per_thread {
            assert!(filter.check(format!("t{}_k{}", t, i).as_bytes()));
        }
    }
    assert_eq!(filter.stats().num_layers, 4);
}

/// Test readers running alongside a writer and a flusher
#[test]
fn test_readers_writer_and_flusher() {
    let dir = TempDir::new().unwrap();
    let filter = shared(&dir, 200);

    for i in 0..100u64 {
        filter.add(format!("seed_{}", i).as_bytes(), i).unwrap();
    }

    let barrier = Arc::new(Barrier::new(6));
    let mut handles = Vec::new();

    for _ in 0..4 {
        let filter = filter.clone();
        let barrier = Arc::clone(&barrier);
        handles.push(thread::spawn(move || {
            barrier.wait();
            for round in 0..20 {
                for i in 0..100u64 {
                    assert!(
                        filter.contains(format!("seed_{}", i).as_bytes()),
                        "round {} lost seed_{}",
                        round,
                        i
                    );
                }
            }
        }));
    }

    {
        let filter = filter.clone();
        let barrier = Arc::clone(&barrier);
        handles.push(thread::spawn(move || {
            barrier.wait();
            for i in 100..600u64 {
                filter.add(format!("new_{}", i).as_bytes(), i).unwrap();
            }
        }));
    }

    {
        let filter = filter.clone();
        let barrier = Arc::clone(&barrier);
        handles.push(thread::spawn(move || {
            barrier.wait();
            for _ in 0..10 {
                filter.flush().unwrap();
                assert!(filter.disk_seqnum() <= filter.mem_seqnum());
            }
        }));
    }

    for handle in handles {
        handle.join().unwrap();
    }

    filter.flush().unwrap();
    assert_eq!(filter.disk_seqnum(), 600);
    assert_eq!(filter.mem_seqnum(), 600);
}

/// Test concurrent removals of distinct keys
#[test]
fn test_concurrent_removes() {
    let dir = TempDir::new().unwrap();
    let filter = shared(&dir, 1000);

    for i in 0..400u64 {
        filter.add(format!("key_{}", i).as_bytes(), i).unwrap();
    }

    let handles: Vec<_> = (0..4u64)
        .map(|t| {
            let filter = filter.clone();
            thread::spawn(move || {
                // Each thread removes the even keys in its quarter
                (t * 100..(t + 1) * 100)
                    .filter(|i| i % 2 == 0)
                    .filter(|&i| filter.remove(format!("key_{}", i).as_bytes(), i))
                    .count()
            })
        })
        .collect();

    let removed: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
    assert_eq!(removed, 200);
    assert_eq!(filter.mem_seqnum(), 600);

    for i in (1..400u64).step_by(2) {
        assert!(filter.check(format!("key_{}", i).as_bytes()));
    }

    let filter = filter.try_unwrap().unwrap();
    assert_eq!(filter.live_keys(), 200);
}
