//! Multi-rate policy example — up to three rates composed on one
//! policy, with the tightest rate deciding admission and its retry/reset
//! surfacing to the caller.
//!
//! Run with:
//! ```
//! cargo run --example multi_rate_policy --features memory
//! ```

use std::net::IpAddr;

use pacer_rs::{KeySpec, LimiterConfigBuilder, MemoryStore, Policy, Rate, RateLimiter, RequestParts};

struct DemoRequest {
    peer: IpAddr,
}

impl RequestParts for DemoRequest {
    fn header(&self, _name: &str) -> Option<&str> {
        None
    }

    fn peer_addr(&self) -> Option<IpAddr> {
        Some(self.peer)
    }

    fn path(&self) -> &str {
        "/"
    }

    fn method(&self) -> &str {
        "GET"
    }

    fn query_param(&self, _name: &str) -> Option<&str> {
        None
    }

    fn auth_field(&self, _name: &str) -> Option<&str> {
        None
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // A burst allowance of 20/second, an hourly ceiling of 1000, and a
    // daily ceiling of 5000 — every request must clear all three.
    let policy = Policy::new(
        vec![
            Rate::new(20, "1s", 10)?,
            Rate::new(1000, "1h", 0)?,
            Rate::new(5000, "1d", 0)?,
        ],
        KeySpec::Ip,
        "multi-rate",
    )?;
    let limiter = RateLimiter::new(
        MemoryStore::new(),
        policy,
        LimiterConfigBuilder::new().app_name("multi-rate-demo").build()?,
    );
    limiter.startup().await?;

    let request = DemoRequest {
        peer: "203.0.113.50".parse().unwrap(),
    };

    println!("=== Multi-Rate Policy Demo ===\n");
    println!("Rates: 20/second (burst 10), 1000/hour, 5000/day — all must admit\n");

    for i in 1..=35 {
        let decision = limiter.check(&request, None).await?;
        if decision.is_allowed() {
            println!(
                "Request {i}: allowed (matched rate index {}, remaining {})",
                decision.matched_index(),
                decision.remaining()
            );
        } else {
            println!(
                "Request {i}: denied by rate index {} (retry after {}ms)",
                decision.matched_index(),
                decision.retry_after_ms()
            );
        }
    }

    Ok(())
}
