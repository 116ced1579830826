//! Basic usage example for scalebloom
//!
//! This example demonstrates the fundamental operations:
//! - Creating a filter
//! - Adding, checking and removing keys
//! - Scaling past the configured capacity
//! - Flushing and reloading

use anyhow::Context;
use scalebloom::{Options, ScalingBloom};

fn main() -> anyhow::Result<()> {
    // Initialize logger
    env_logger::init();

    let dir = tempfile::tempdir()?;
    let path = dir.path().join("users.bloom");

    // 100 keys per layer at a 1% false positive rate
    let options = Options::new(100, 0.01);

    let mut filter = ScalingBloom::create(&path, options.clone()).context("creating filter")?;
    println!("Filter created at {:?}", path);

    // Add some keys, each under a caller-chosen identifier
    println!("Adding keys...");
    filter.add(b"user:1", 1)?;
    filter.add(b"user:2", 2)?;
    filter.add(b"user:3", 3)?;

    println!("user:2 present? {}", filter.check(b"user:2"));
    println!("user:9 present? {}", filter.check(b"user:9"));

    // Remove with the identifier the key was added under
    println!("Removing user:2...");
    if filter.remove(b"user:2", 2) {
        println!("user:2 removed; present? {}", filter.check(b"user:2"));
    }

    // Go past the first layer's capacity
    for i in 4..=250u64 {
        filter.add(format!("user:{}", i).as_bytes(), i)?;
    }
    println!("{} layers after 250 adds", filter.num_layers());

    println!("mem_seqnum={} disk_seqnum={}", filter.mem_seqnum(), filter.disk_seqnum());
    filter.flush().context("flushing filter")?;
    println!("Flushed: disk_seqnum={}", filter.disk_seqnum());

    println!("Stats:\n{}", filter.stats().to_json()?);
    drop(filter);

    // Reload and confirm the keys survived
    let filter = ScalingBloom::load(&path, options).context("loading filter")?;
    println!(
        "Reloaded {} layers; user:250 present? {}; version {}",
        filter.num_layers(),
        filter.check(b"user:250"),
        scalebloom::version()
    );

    Ok(())
}
