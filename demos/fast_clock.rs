use std::time::Duration;

use tokenbucket::{FastClock, GLOBAL_CLOCK_TICK, TokenBucket};

fn main() {
    // every bucket built on the global clock shares one upkeep thread
    let api = TokenBucket::with_clock(20.0, 10.0, FastClock::global());
    let uploads = TokenBucket::with_clock(1_000.0, 500.0, FastClock::global());
    println!("global clock tick: {GLOBAL_CLOCK_TICK:?}");

    assert!(api.try_consume(20.0));
    assert!(uploads.try_consume(1_000.0));
    println!("sleeping for 1 second...");
    std::thread::sleep(Duration::from_secs(1));
    println!("api level: {}", api.level());
    println!("uploads level: {}", uploads.level());
    assert!(api.try_consume(5.0));
    println!("consumed 5, api level: {}", api.level());
}
