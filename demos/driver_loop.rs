//! Event-loop driver with a fake location feed.
//!
//! Run with: cargo run --example driver_loop --features runtime

use std::time::Duration;

use clover_engine::{CloverEngine, Coordinate, EngineConfig, EngineDriver, LocationFix};

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let config = EngineConfig {
        spawn_tick_interval_ms: 500,
        stay_duration_ms: 1_000,
        ..EngineConfig::default()
    };
    let handle = EngineDriver::spawn(CloverEngine::new(config));
    let here = Coordinate::new(37.3349, -122.00902);

    let start = chrono::Utc::now().timestamp_millis();
    for step in 0..20 {
        let fix = LocationFix::new(here, start + step * 400);
        if !handle.send_fix(fix).await {
            break;
        }
        tokio::time::sleep(Duration::from_millis(400)).await;
    }

    let snapshot = handle.snapshot().await;
    println!("Markers: {}", snapshot.markers.len());
    for marker in &snapshot.markers {
        println!(
            "  {} ({:.6}, {:.6}) special={}",
            marker.id, marker.coordinate.latitude, marker.coordinate.longitude, marker.is_special
        );
    }
    if let Some(counts) = snapshot.counts_here {
        println!("Here: {} three-leaf, {} four-leaf", counts.ordinary, counts.special);
    }
    println!("Stayed: {}ms", snapshot.elapsed_ms);

    handle.shutdown().await;
}
