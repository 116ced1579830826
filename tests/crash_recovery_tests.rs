// Crash Recovery Tests for scalebloom
// These tests verify what a reloaded filter reports after clean and unclean shutdowns

use scalebloom::{CounterWidth, Error, Options, ScalingBloom};
use tempfile::TempDir;

/// Helper function to simulate a crash by dropping the filter without cleanup
/// Uses mem::forget to prevent Drop from running (simulates abrupt termination)
fn simulate_crash(filter: ScalingBloom) {
    std::mem::forget(filter);
}

fn options() -> Options {
    Options::new(100, 0.01)
}

/// Test create, add, flush, load round trip
#[test]
fn test_roundtrip_after_flush() {
    env_logger::try_init().ok();
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("filter.bin");

    {
        let mut filter = ScalingBloom::create(&path, options()).unwrap();
        for i in 0..250u64 {
            filter.add(format!("key_{}", i).as_bytes(), i).unwrap();
        }
        filter.flush().unwrap();
        assert_eq!(filter.num_layers(), 3);
    }

    let filter = ScalingBloom::load(&path, options()).unwrap();
    assert_eq!(filter.num_layers(), 3);
    assert_eq!(filter.disk_seqnum(), 250);
    assert_eq!(filter.mem_seqnum(), 250);
    assert_eq!(filter.max_id(), 249);
    assert_eq!(filter.live_keys(), 250);

    for i in 0..250u64 {
        assert!(filter.check(format!("key_{}", i).as_bytes()), "key_{} lost after reload", i);
    }
}

/// Test that removals survive a reload
#[test]
fn test_roundtrip_with_removals() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("filter.bin");

    {
        let mut filter = ScalingBloom::create(&path, options()).unwrap();
        filter.add(b"keep", 1).unwrap();
        filter.add(b"drop", 2).unwrap();
        assert!(filter.remove(b"drop", 2));
        filter.flush().unwrap();
    }

    let mut filter = ScalingBloom::load(&path, options()).unwrap();
    assert!(filter.check(b"keep"));
    assert!(!filter.check(b"drop"));
    assert!(!filter.remove(b"drop", 2));
    assert!(filter.remove(b"keep", 1));
}

/// Test that a reloaded filter keeps scaling
#[test]
fn test_reload_then_scale() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("filter.bin");

    {
        let mut filter = ScalingBloom::create(&path, options()).unwrap();
        for i in 0..150u64 {
            filter.add(format!("a{}", i).as_bytes(), i).unwrap();
        }
        filter.flush().unwrap();
    }

    {
        let mut filter = ScalingBloom::load(&path, options()).unwrap();
        for i in 150..300u64 {
            filter.add(format!("a{}", i).as_bytes(), i).unwrap();
        }
        assert_eq!(filter.num_layers(), 3);
        assert_eq!(filter.mem_seqnum(), 300);
        filter.flush().unwrap();
    }

    let filter = ScalingBloom::load(&path, options()).unwrap();
    for i in 0..300u64 {
        assert!(filter.check(format!("a{}", i).as_bytes()));
    }
}

/// Test that dropping without flush does not advance the disk sequence number
#[test]
fn test_drop_does_not_flush() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("filter.bin");

    {
        let mut filter = ScalingBloom::create(&path, options()).unwrap();
        for i in 0..5u64 {
            filter.add(format!("k{}", i).as_bytes(), i).unwrap();
        }
        assert_eq!(filter.disk_seqnum(), 0);
    }

    let filter = ScalingBloom::load(&path, options()).unwrap();
    assert_eq!(filter.disk_seqnum(), 0);
    assert_eq!(filter.mem_seqnum(), 0);
}

/// Test recovery after a crash with unflushed mutations
#[test]
fn test_recovery_after_crash() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("filter.bin");

    {
        let mut filter = ScalingBloom::create(&path, options()).unwrap();
        for i in 0..80u64 {
            filter.add(format!("stable_{}", i).as_bytes(), i).unwrap();
        }
        filter.flush().unwrap();

        for i in 80..120u64 {
            filter.add(format!("partial_{}", i).as_bytes(), i).unwrap();
        }
        assert_eq!(filter.mem_seqnum(), 120);
        assert_eq!(filter.disk_seqnum(), 80);

        simulate_crash(filter);
    }

    let filter = ScalingBloom::load(&path, options()).unwrap();

    // The durable prefix is exactly what was flushed
    assert_eq!(filter.disk_seqnum(), 80);
    assert_eq!(filter.mem_seqnum(), 80);

    for i in 0..80u64 {
        assert!(filter.check(format!("stable_{}", i).as_bytes()));
    }
}

/// Test that sequence numbers keep counting from the durable point
#[test]
fn test_seqnum_continues_after_reload() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("filter.bin");

    {
        let mut filter = ScalingBloom::create(&path, options()).unwrap();
        filter.add(b"x", 1).unwrap();
        filter.add(b"y", 2).unwrap();
        filter.flush().unwrap();
        filter.add(b"z", 3).unwrap();
    }

    let mut filter = ScalingBloom::load(&path, options()).unwrap();
    assert_eq!(filter.mem_seqnum(), 2);
    filter.add(b"w", 4).unwrap();
    assert_eq!(filter.mem_seqnum(), 3);
    assert_eq!(filter.disk_seqnum(), 2);
}

/// Test open() creating then loading
#[test]
fn test_open_creates_then_loads() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("filter.bin");

    {
        let mut filter = ScalingBloom::open(&path, options()).unwrap();
        assert_eq!(filter.mem_seqnum(), 0);
        filter.add(b"persisted", 10).unwrap();
        filter.flush().unwrap();
    }

    let filter = ScalingBloom::open(&path, options()).unwrap();
    assert!(filter.check(b"persisted"));
    assert_eq!(filter.disk_seqnum(), 1);
}

/// Test that create() replaces an existing file
#[test]
fn test_create_truncates_existing() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("filter.bin");

    {
        let mut filter = ScalingBloom::create(&path, options()).unwrap();
        for i in 0..200u64 {
            filter.add(format!("old{}", i).as_bytes(), i).unwrap();
        }
        filter.flush().unwrap();
    }

    let filter = ScalingBloom::create(&path, options()).unwrap();
    assert_eq!(filter.num_layers(), 1);
    assert_eq!(filter.disk_seqnum(), 0);
    assert!(!filter.check(b"old0"));
}

/// Test loading with options that do not match the file
#[test]
fn test_load_with_mismatched_options() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("filter.bin");
    ScalingBloom::create(&path, options()).unwrap();

    let err = ScalingBloom::load(&path, Options::new(200, 0.01)).unwrap_err();
    assert!(matches!(err, Error::ConfigMismatch(_)));

    let err = ScalingBloom::load(&path, Options::new(100, 0.05)).unwrap_err();
    assert!(matches!(err, Error::ConfigMismatch(_)));

    let err = ScalingBloom::load(&path, options().counter_width(CounterWidth::Eight)).unwrap_err();
    assert!(matches!(err, Error::ConfigMismatch(_)));

    assert!(ScalingBloom::load(&path, options()).is_ok());
}

/// Test round trip with each counter width
#[test]
fn test_roundtrip_all_counter_widths() {
    for width in [CounterWidth::Two, CounterWidth::Four, CounterWidth::Eight] {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("filter.bin");
        let opts = Options::new(50, 0.01).counter_width(width);

        {
            let mut filter = ScalingBloom::create(&path, opts.clone()).unwrap();
            for i in 0..120u64 {
                filter.add(&i.to_be_bytes(), i).unwrap();
            }
            filter.flush().unwrap();
        }

        let filter = ScalingBloom::load(&path, opts).unwrap();
        assert_eq!(filter.counter_width(), width);
        for i in 0..120u64 {
            assert!(filter.check(&i.to_be_bytes()), "width {:?} lost key {}", width, i);
        }
    }
}
