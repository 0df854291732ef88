//! Property-style integration tests for the atomic GCRA decision
//! (spec §8, P1-P7), exercised against `MemoryStore`.

use pacer_rs::{KeySpec, MemoryStore, Policy, Rate, Store};

fn single_rate(permits: u32, period: &str, burst: u32) -> Policy {
    Policy::new(vec![Rate::new(permits, period, burst).unwrap()], KeySpec::Ip, "prop").unwrap()
}

/// P1: within any sliding window of `period`, at most `permits + burst`
/// admissions land.
#[tokio::test]
async fn p1_single_rate_cap_holds_over_a_window() {
    let store = MemoryStore::new();
    let policy = single_rate(5, "1s", 2);
    let keys = vec!["p1:key".to_string()];

    let mut admitted_at = Vec::new();
    let base = 1_700_000_000_000u64;
    for i in 0..20u64 {
        let now = base + i * 50;
        let verdict = store.check_policy(&keys, &policy, now).await.unwrap();
        if verdict.allowed {
            admitted_at.push(now);
        }
    }

    for &t_i in &admitted_at {
        let count = admitted_at.iter().filter(|&&t_j| t_j >= t_i && t_j < t_i + 1000).count();
        assert!(count <= 7, "window starting at {t_i} admitted {count} > 7");
    }
}

/// P2: monotonic TAT — once a key is past its burst, it takes strictly
/// increasing time to admit each subsequent request.
#[tokio::test]
async fn p2_denied_retry_after_never_decreases_while_saturated() {
    let store = MemoryStore::new();
    let policy = single_rate(1, "1s", 0);
    let keys = vec!["p2:key".to_string()];
    let base = 1_700_000_000_000u64;

    store.check_policy(&keys, &policy, base).await.unwrap();

    let mut last_retry = 0u64;
    for i in 1..5u64 {
        let verdict = store.check_policy(&keys, &policy, base + i).await.unwrap();
        assert!(!verdict.allowed);
        assert!(verdict.retry_after_ms >= last_retry.saturating_sub(1));
        last_retry = verdict.retry_after_ms;
    }
}

/// P3: atomicity — burst + 1 concurrent first-touch requests against the
/// same key admit exactly `1 + burst` of them.
#[tokio::test]
async fn p3_concurrent_first_touch_admits_exactly_burst_plus_one() {
    let store = std::sync::Arc::new(MemoryStore::new());
    let policy = std::sync::Arc::new(single_rate(10, "1s", 3));
    let keys = vec!["p3:key".to_string()];
    let now = 1_700_000_000_000u64;

    let mut handles = Vec::new();
    for _ in 0..20 {
        let store = store.clone();
        let policy = policy.clone();
        let keys = keys.clone();
        handles.push(tokio::spawn(async move {
            store.check_policy(&keys, &policy, now).await.unwrap().allowed
        }));
    }

    let mut admitted = 0;
    for h in handles {
        if h.await.unwrap() {
            admitted += 1;
        }
    }

    assert_eq!(admitted, 4, "expected 1 + burst(3) = 4 admissions");
}

/// P4: isolation — two principals never affect each other's decisions.
#[tokio::test]
async fn p4_different_keys_are_isolated() {
    let store = MemoryStore::new();
    let policy = single_rate(1, "1s", 0);
    let now = 1_700_000_000_000u64;

    let a = vec!["p4:a".to_string()];
    let b = vec!["p4:b".to_string()];

    assert!(store.check_policy(&a, &policy, now).await.unwrap().allowed);
    assert!(!store.check_policy(&a, &policy, now + 1).await.unwrap().allowed);
    assert!(
        store.check_policy(&b, &policy, now + 1).await.unwrap().allowed,
        "principal b must be unaffected by principal a's exhaustion"
    );
}

/// P5: TTL recovery — a key quiescent past its TTL behaves as if new.
#[tokio::test]
async fn p5_quiescent_key_recovers_after_ttl() {
    let store = MemoryStore::new();
    let policy = single_rate(1, "0.1s", 0);
    let keys = vec!["p5:key".to_string()];
    let now = 1_700_000_000_000u64;

    assert!(store.check_policy(&keys, &policy, now).await.unwrap().allowed);

    let ttl = policy.ttl_ms();
    let verdict = store.check_policy(&keys, &policy, now + ttl + 10).await.unwrap();
    assert!(verdict.allowed, "key should behave as empty once past its TTL");
}

/// P6: multi-rate all-must-pass — a tighter secondary rate can reject a
/// request the primary rate would admit, and `matched_index` names it.
#[tokio::test]
async fn p6_multi_rate_all_must_pass() {
    let store = MemoryStore::new();
    let policy = Policy::new(
        vec![Rate::new(100, "1s", 50).unwrap(), Rate::new(1, "1h", 0).unwrap()],
        KeySpec::Ip,
        "p6",
    )
    .unwrap();
    let keys = vec!["p6:key:r0".to_string(), "p6:key:r1".to_string()];
    let now = 1_700_000_000_000u64;

    let first = store.check_policy(&keys, &policy, now).await.unwrap();
    assert!(first.allowed);

    let second = store.check_policy(&keys, &policy, now + 1).await.unwrap();
    assert!(!second.allowed, "hourly rate of 1 must reject the second request");
    assert_eq!(second.matched_index, 1, "the hourly rate (index 1) should be named");
}

/// P7: header invariants on the rendered decision.
#[tokio::test]
async fn p7_header_invariants_hold() {
    use pacer_rs::headers::names;
    use pacer_rs::{LimiterConfigBuilder, RateLimiter, RequestParts};
    use std::net::IpAddr;

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

    let policy = single_rate(1, "1s", 0);
    let limiter = RateLimiter::new(
        MemoryStore::new(),
        policy,
        LimiterConfigBuilder::new().app_name("p7").build().unwrap(),
    );
    let req = Req("198.51.100.99".parse().unwrap());

    let admitted = limiter.check(&req, None).await.unwrap();
    assert!(admitted.is_allowed());
    let headers = limiter.response_headers(&admitted);
    assert!(!headers.iter().any(|(k, _)| *k == names::RETRY_AFTER));

    let denied = limiter.check(&req, None).await.unwrap();
    assert!(denied.is_denied());
    let headers = limiter.response_headers(&denied);
    let reset: u64 = headers
        .iter()
        .find(|(k, _)| *k == names::RATE_LIMIT_RESET)
        .map(|(_, v)| v.parse().unwrap())
        .unwrap();
    assert!(reset >= 1);
    assert!(headers.iter().any(|(k, _)| *k == names::RETRY_AFTER));
}
