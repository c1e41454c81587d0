use std::time::Duration;

use tokenbucket::{RateLimit, TokenBucket};

fn main() {
    let tb = TokenBucket::from_limit(RateLimit::per_second(10.0).with_capacity(20.0));
    // drain the initial burst
    assert!(tb.try_consume(20.0));
    assert!(!tb.try_consume(1.0));
    // after two seconds bucket should be full again
    std::thread::sleep(Duration::from_secs(2));
    assert_eq!(20.0, tb.level());
    assert!(tb.try_consume(5.0));
}
