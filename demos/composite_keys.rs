//! Composite key example — rate limit by IP and route together.
//!
//! `ScopeMode::Route` folds the request path into the store key
//! alongside whatever principal the policy's `KeySpec` selects, so a
//! single `ip` policy already limits by the (IP, path) pair.
//!
//! Run with:
//! ```
//! cargo run --example composite_keys --features memory
//! ```

use std::net::IpAddr;

use pacer_rs::{LimiterConfigBuilder, MemoryStore, Policy, Rate, RateLimiter, RequestParts, ScopeMode};

struct MockRequest {
    ip: IpAddr,
    path: &'static str,
}

impl RequestParts for MockRequest {
    fn header(&self, _name: &str) -> Option<&str> {
        None
    }

    fn peer_addr(&self) -> Option<IpAddr> {
        Some(self.ip)
    }

    fn path(&self) -> &str {
        self.path
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
    let policy = Policy::single(Rate::new(5, "1m", 0)?, "ip", "composite")?;
    let limiter = RateLimiter::new(
        MemoryStore::new(),
        policy,
        LimiterConfigBuilder::new()
            .app_name("composite-keys-demo")
            .scope_mode(ScopeMode::Route)
            .build()?,
    );
    limiter.startup().await?;

    println!("=== Composite Key Rate Limiting Demo ===\n");
    println!("Policy: 5 requests per minute per (IP, path) combination\n");

    let scenarios = [
        ("192.168.1.1", "/api/users", 3),
        ("192.168.1.1", "/api/posts", 3),
        ("192.168.1.2", "/api/users", 3),
        ("192.168.1.1", "/api/users", 5),
    ];

    for (ip, path, count) in scenarios {
        let request = MockRequest {
            ip: ip.parse().unwrap(),
            path,
        };
        println!("Requests from {ip} to {path}:");

        for i in 1..=count {
            let decision = limiter.check(&request, None).await?;
            let verdict = if decision.is_allowed() { "allowed" } else { "denied" };
            println!("  Request {i}: {verdict} (remaining: {})", decision.remaining());
        }
        println!();
    }

    Ok(())
}
