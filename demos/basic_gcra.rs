//! Basic GCRA rate limiting example.
//!
//! Run with:
//! ```
//! cargo run --example basic_gcra --features memory
//! ```

use std::net::IpAddr;
use std::time::Duration;

use pacer_rs::{LimiterConfigBuilder, MemoryStore, Policy, Rate, RateLimiter, RequestParts};

/// A minimal stand-in for a framework request, implementing just enough
/// of `RequestParts` for this demo's `ip` selector.
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
    // 10 requests/second, burst of 5 extra.
    let policy = Policy::single(Rate::new(10, "1s", 5)?, "ip", "basic-gcra")?;
    let limiter = RateLimiter::new(
        MemoryStore::new(),
        policy,
        LimiterConfigBuilder::new().app_name("basic-gcra-demo").build()?,
    );
    limiter.startup().await?;

    let request = DemoRequest {
        peer: "198.51.100.7".parse().unwrap(),
    };

    println!("=== Basic GCRA Rate Limiting Demo ===\n");
    println!("Policy: 10 requests/second, burst: 5\n");

    for i in 1..=15 {
        let decision = limiter.check(&request, None).await?;

        if decision.is_allowed() {
            println!("Request {i}: allowed (remaining: {})", decision.remaining());
        } else {
            println!(
                "Request {i}: denied (retry after: {}ms)",
                decision.retry_after_ms()
            );
        }
    }

    println!("\n--- Waiting 1 second for recovery ---\n");
    tokio::time::sleep(Duration::from_secs(1)).await;

    let decision = limiter.check(&request, None).await?;
    println!(
        "After recovery: {} (remaining: {})",
        if decision.is_allowed() { "allowed" } else { "denied" },
        decision.remaining()
    );

    println!("\n--- Rate Limit Headers ---");
    for (name, value) in limiter.response_headers(&decision) {
        println!("{name}: {value}");
    }

    Ok(())
}
