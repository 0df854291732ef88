//! End-to-end scenario tests driving the admission facade
//! (`RateLimiter::check`) rather than the store adapter directly.

use std::net::IpAddr;
use std::sync::Arc;

use pacer_rs::error::Result;
use pacer_rs::{FailMode, KeySpec, LimiterConfigBuilder, MemoryStore, Policy, Rate, RateLimiter, RequestParts, ScriptVerdict, Store};

struct Req(IpAddr);

impl RequestParts for Req {
    fn header(&self, _name: &str) -> Option<&str> {
        None
    }
    fn peer_addr(&self) -> Option<IpAddr> {
        Some(self.0)
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

fn req(ip: &str) -> Req {
    Req(ip.parse().unwrap())
}

#[tokio::test]
async fn burst_then_block() {
    let policy = Policy::single(Rate::new(3, "1s", 2).unwrap(), "ip", "burst").unwrap();
    let limiter = RateLimiter::new(
        MemoryStore::new(),
        policy,
        LimiterConfigBuilder::new().app_name("scenario").build().unwrap(),
    );
    let r = req("203.0.113.1");

    for i in 1..=5 {
        let decision = limiter.check(&r, None).await.unwrap();
        assert!(decision.is_allowed(), "request {i} within burst+permits should admit");
    }

    let decision = limiter.check(&r, None).await.unwrap();
    assert!(decision.is_denied(), "6th request must exceed permits + burst");
}

#[tokio::test]
async fn idle_recovery_after_reset() {
    let policy = Policy::single(Rate::new(1, "0.05s", 0).unwrap(), "ip", "idle").unwrap();
    let limiter = RateLimiter::new(
        MemoryStore::new(),
        policy,
        LimiterConfigBuilder::new().app_name("scenario").build().unwrap(),
    );
    let r = req("203.0.113.2");

    assert!(limiter.check(&r, None).await.unwrap().is_allowed());
    assert!(limiter.check(&r, None).await.unwrap().is_denied());

    tokio::time::sleep(std::time::Duration::from_millis(120)).await;

    assert!(
        limiter.check(&r, None).await.unwrap().is_allowed(),
        "request after the emission interval has elapsed should admit"
    );
}

#[tokio::test]
async fn two_principals_are_isolated() {
    let policy = Policy::single(Rate::new(1, "1h", 0).unwrap(), "ip", "isolation").unwrap();
    let limiter = RateLimiter::new(
        MemoryStore::new(),
        policy,
        LimiterConfigBuilder::new().app_name("scenario").build().unwrap(),
    );
    let a = req("203.0.113.3");
    let b = req("203.0.113.4");

    assert!(limiter.check(&a, None).await.unwrap().is_allowed());
    assert!(limiter.check(&a, None).await.unwrap().is_denied());
    assert!(
        limiter.check(&b, None).await.unwrap().is_allowed(),
        "a different principal must have its own bucket"
    );
}

#[tokio::test]
async fn multi_rate_tightest_wins() {
    let policy = Policy::new(
        vec![Rate::new(100, "1s", 50).unwrap(), Rate::new(1, "1h", 0).unwrap()],
        KeySpec::Ip,
        "tightest",
    )
    .unwrap();
    let limiter = RateLimiter::new(
        MemoryStore::new(),
        policy,
        LimiterConfigBuilder::new().app_name("scenario").build().unwrap(),
    );
    let r = req("203.0.113.5");

    assert!(limiter.check(&r, None).await.unwrap().is_allowed());
    let second = limiter.check(&r, None).await.unwrap();
    assert!(second.is_denied(), "the 1/hour rate should reject even though the burst rate would admit");
}

#[tokio::test]
async fn ttl_expiry_resets_the_bucket() {
    let policy = Policy::single(Rate::new(1, "0.01s", 0).unwrap(), "ip", "ttl").unwrap();
    let limiter = RateLimiter::new(
        MemoryStore::new(),
        policy,
        LimiterConfigBuilder::new().app_name("scenario").build().unwrap(),
    );
    let r = req("203.0.113.6");

    assert!(limiter.check(&r, None).await.unwrap().is_allowed());
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert!(
        limiter.check(&r, None).await.unwrap().is_allowed(),
        "the bucket should behave as empty once its TTL has elapsed"
    );
}

struct AlwaysUnavailable;

impl Store for AlwaysUnavailable {
    async fn check_policy(&self, _keys: &[String], _policy: &Policy, _now_ms: u64) -> Result<ScriptVerdict> {
        Err(pacer_rs::RateLimitError::StoreUnavailable(
            pacer_rs::ConnectionError::Closed,
        ))
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn fail_open_admits_when_the_store_is_unreachable() {
    let policy = Policy::single(Rate::new(5, "1s", 0).unwrap(), "ip", "fail-open").unwrap();
    let limiter = Arc::new(RateLimiter::new(
        AlwaysUnavailable,
        policy,
        LimiterConfigBuilder::new()
            .app_name("scenario")
            .fail_mode(FailMode::Open)
            .build()
            .unwrap(),
    ));
    let r = req("203.0.113.7");

    let decision = limiter.check(&r, None).await.unwrap();
    assert!(decision.is_allowed(), "fail-open must admit when the store errors");
}

#[tokio::test]
async fn fail_closed_rejects_when_the_store_is_unreachable() {
    let policy = Policy::single(Rate::new(5, "1s", 0).unwrap(), "ip", "fail-closed").unwrap();
    let limiter = Arc::new(RateLimiter::new(
        AlwaysUnavailable,
        policy,
        LimiterConfigBuilder::new()
            .app_name("scenario")
            .fail_mode(FailMode::Closed)
            .build()
            .unwrap(),
    ));
    let r = req("203.0.113.8");

    let decision = limiter.check(&r, None).await.unwrap();
    assert!(decision.is_denied(), "fail-closed must reject when the store errors");
}
