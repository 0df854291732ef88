//! Per-route rate limiting example.
//!
//! One `RateLimiter` with `ScopeMode::Route` scopes every policy's store
//! keys by request path automatically, so a single default policy yields
//! independent buckets per route without a route-to-quota lookup table.
//!
//! Run with:
//! ```
//! cargo run --example per_route_limits --features memory
//! ```

use std::net::IpAddr;

use pacer_rs::{LimiterConfigBuilder, MemoryStore, Policy, Rate, RateLimiter, RequestParts, ScopeMode};

struct RouteRequest {
    peer: IpAddr,
    path: &'static str,
}

impl RequestParts for RouteRequest {
    fn header(&self, _name: &str) -> Option<&str> {
        None
    }

    fn peer_addr(&self) -> Option<IpAddr> {
        Some(self.peer)
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
    let policy = Policy::single(Rate::new(5, "1m", 0)?, "ip", "per-route")?;
    let limiter = RateLimiter::new(
        MemoryStore::new(),
        policy,
        LimiterConfigBuilder::new()
            .app_name("per-route-demo")
            .scope_mode(ScopeMode::Route)
            .build()?,
    );
    limiter.startup().await?;

    println!("=== Per-Route Rate Limiting Demo ===\n");
    println!("Policy: 5 requests/minute per (IP, route)\n");

    let routes = ["/api/search", "/api/auth/login", "/api/users"];
    let peer: IpAddr = "203.0.113.20".parse().unwrap();

    for route in routes {
        let request = RouteRequest { peer, path: route };
        let mut allowed = 0;
        let mut denied = 0;

        for _ in 0..8 {
            let decision = limiter.check(&request, None).await?;
            if decision.is_allowed() {
                allowed += 1;
            } else {
                denied += 1;
            }
        }

        println!("{route}: allowed={allowed}, denied={denied}");
    }

    Ok(())
}
