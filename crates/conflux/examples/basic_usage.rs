//! Basic Conflux Usage Example
//!
//! This example demonstrates:
//! - Creating sources with persisted transform logs
//! - Syncing one source into another
//! - Truncating logs once every source has a transform
//! - Logging source events
//!
//! Run with: cargo run --example basic_usage

use conflux::prelude::*;
use conflux_file_bucket::{FileBucket, FileBucketConfig};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter("conflux=info")
        .init();

    let temp_dir = tempfile::tempdir()?;
    let bucket = Arc::new(FileBucket::open(
        "logs",
        FileBucketConfig::new(temp_dir.path()).with_pretty(true),
    )?);

    // ========================================
    // 1. Sources
    // ========================================
    println!("Step 1: Creating sources");
    let memory = Source::builder("memory", Arc::new(MemoryBackend::new()))
        .with_bucket(bucket.clone())
        .build();
    let backup = Source::builder("backup", Arc::new(MemoryBackend::new()))
        .with_bucket(bucket.clone())
        .build();
    println!("   Logs stored under {}\n", temp_dir.path().display());

    // ========================================
    // 2. Strategies
    // ========================================
    println!("Step 2: Wiring strategies");
    let coordinator = Coordinator::builder()
        .with_source(memory.clone())
        .with_source(backup.clone())
        .with_strategy(
            SyncStrategy::builder("memory", "backup")
                .blocking(true)
                .build()?,
        )
        .with_strategy(LogTruncationStrategy::new())
        .with_strategy(EventLoggingStrategy::new())
        .build()?;
    coordinator.activate(ActivationOptions::new()).await?;
    println!("   Active strategies: {:?}\n", coordinator.strategy_names());

    // ========================================
    // 3. Push
    // ========================================
    println!("Step 3: Pushing records");
    for (id, name) in [("jupiter", "Jupiter"), ("saturn", "Saturn")] {
        let planet = Record::new("planet", id).with_attribute("name", name);
        let applied = memory.push(Operation::add_record(planet)).await?;
        println!("   Applied transform {}", applied[0].id);
    }

    let planets = backup.query(QueryExpression::find_records("planet")).await?;
    println!("   Backup holds: {}", planets);
    println!(
        "   Log lengths after truncation: memory={} backup={}\n",
        memory.transform_log().len(),
        backup.transform_log().len()
    );

    // ========================================
    // 4. Shutdown
    // ========================================
    coordinator.deactivate().await?;
    println!("Done");
    Ok(())
}
