//! Simulated day: stay at a cafe, walk to a park, stay again, cross midnight.
//!
//! Run with: cargo run --example daily_walk

use chrono::{FixedOffset, NaiveDate, TimeZone};
use clover_engine::{
    CloverEngine, Coordinate, ElapsedFormat, EngineConfig, LocationFix, StayEvent,
};

fn stay(engine: &mut CloverEngine, at: Coordinate, t_ms: &mut i64, spawns: usize) {
    for _ in 0..spawns {
        engine.handle_location(LocationFix::new(at, *t_ms));
        *t_ms += 3_000;
        engine.handle_location(LocationFix::new(at, *t_ms));
        *t_ms += 2_000;
        let token = engine.spawn_token();
        if let Some(marker) = engine.handle_spawn_tick(token, *t_ms) {
            println!(
                "   {} clover at ({:.6}, {:.6})",
                if marker.is_special { "four-leaf " } else { "three-leaf" },
                marker.coordinate.latitude,
                marker.coordinate.longitude
            );
        }
        for _ in 0..5 {
            engine.handle_elapsed_tick();
        }
    }
}

fn main() {
    let config = EngineConfig::default();
    let mut engine = CloverEngine::with_seed(config.clone(), 2024)
        .with_reset_date(NaiveDate::from_ymd_opt(2024, 8, 21).unwrap());

    let cafe = Coordinate::new(37.3349, -122.00902);
    let park = Coordinate::new(37.3370, -122.00902); // ~230m north

    println!("Clover Engine Demo\n");
    println!(
        "Config: stay={}ms, threshold={}m, every {}th clover is four-leaf\n",
        config.stay_duration_ms, config.distance_threshold_meters, config.special_every_nth
    );

    let mut t = 0;
    println!("1. Staying at the cafe:");
    stay(&mut engine, cafe, &mut t, 6);
    let counts = engine.counts_at(&cafe);
    println!(
        "   Near cafe: {} three-leaf, {} four-leaf (stayed {})\n",
        counts.ordinary,
        counts.special,
        engine.elapsed_display(ElapsedFormat::Korean)
    );

    println!("2. Walking to the park:");
    if let StayEvent::Moved { distance_meters } = engine.handle_location(LocationFix::new(park, t)) {
        println!("   Moved {:.0}m, new stay episode\n", distance_meters);
    }

    println!("3. Staying at the park:");
    stay(&mut engine, park, &mut t, 4);
    let counts = engine.counts_at(&park);
    println!(
        "   Near park: {} three-leaf, {} four-leaf\n",
        counts.ordinary, counts.special
    );

    println!("4. Midnight:");
    let now = FixedOffset::east_opt(9 * 3600)
        .unwrap()
        .with_ymd_and_hms(2024, 8, 22, 0, 0, 30)
        .unwrap();
    if engine.handle_midnight_check(&now) {
        println!("   Reset at {} -> {} clover(s) left", now, engine.markers().len());
    } else {
        println!("   No reset");
    }
}
