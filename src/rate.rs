//! Rate: a single `(permits, period, burst)` triple and its derived GCRA
//! parameters.
//!
//! Grounded in `original_source/src/pacer/policies.py`'s `Rate` dataclass
//! (`_parse_duration`, `period_ms`, `emission_interval_ms`,
//! `burst_capacity_ms`, `ttl_ms`), reimplemented with integer-millisecond
//! arithmetic throughout (the teacher's `Quota` used `Duration::from_secs_f64`
//! float math, which this spec's truncation rules explicitly rule out).

use crate::error::ConfigError;

/// `(\d+(\.\d+)?)(s|m|h|d)` — the duration grammar accepted for `period`.
fn parse_duration_ms(period: &str) -> std::result::Result<u64, ConfigError> {
    let bytes = period.as_bytes();
    if bytes.is_empty() {
        return Err(ConfigError::InvalidRate(format!(
            "empty duration string: {period:?}"
        )));
    }
    let unit = bytes[bytes.len() - 1] as char;
    let multiplier_ms: f64 = match unit {
        's' => 1_000.0,
        'm' => 60_000.0,
        'h' => 3_600_000.0,
        'd' => 86_400_000.0,
        _ => {
            return Err(ConfigError::InvalidRate(format!(
                "unrecognized duration unit in {period:?}, expected one of s/m/h/d"
            )));
        }
    };
    let value_str = &period[..period.len() - 1];
    let value: f64 = value_str.parse().map_err(|_| {
        ConfigError::InvalidRate(format!("malformed numeric value in duration {period:?}"))
    })?;
    if value < 0.0 || !value.is_finite() {
        return Err(ConfigError::InvalidRate(format!(
            "duration value must be a non-negative finite number, got {value} in {period:?}"
        )));
    }
    Ok((value * multiplier_ms).trunc() as u64)
}

/// A single rate: `permits` requests admitted per `period`, plus `burst`
/// extra requests tolerated ahead of schedule.
///
/// `period` is kept as the original string for `X-RateLimit-Policy`
/// rendering and `Debug`; all arithmetic uses the derived millisecond
/// fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rate {
    permits: u32,
    period: String,
    period_ms: u64,
    burst: u32,
}

impl Rate {
    /// Construct a rate from `permits` admitted per `period` (e.g. `"1s"`,
    /// `"500ms"` is not valid — sub-second precision uses a fractional
    /// value on the larger unit, e.g. `"0.5s"`), with `burst` extra
    /// requests tolerated.
    pub fn new(permits: u32, period: &str, burst: u32) -> std::result::Result<Self, ConfigError> {
        if permits < 1 {
            return Err(ConfigError::InvalidRate(
                "permits must be at least 1".into(),
            ));
        }
        let period_ms = parse_duration_ms(period)?;
        if period_ms == 0 {
            return Err(ConfigError::InvalidRate(format!(
                "period {period:?} resolves to zero milliseconds"
            )));
        }
        Ok(Self {
            permits,
            period: period.to_string(),
            period_ms,
            burst,
        })
    }

    /// Convenience constructor for a rate with no burst tolerance.
    pub fn simple(permits: u32, period: &str) -> std::result::Result<Self, ConfigError> {
        Self::new(permits, period, 0)
    }

    pub fn permits(&self) -> u32 {
        self.permits
    }

    pub fn period(&self) -> &str {
        &self.period
    }

    pub fn burst(&self) -> u32 {
        self.burst
    }

    /// `P`, the period in integer milliseconds.
    pub fn period_ms(&self) -> u64 {
        self.period_ms
    }

    /// `T = P / permits`, truncated to integer ms — the mean spacing
    /// between admitted requests.
    pub fn emission_interval_ms(&self) -> u64 {
        self.period_ms / self.permits as u64
    }

    /// `B = burst * T` — the tolerance window ahead of TAT.
    pub fn burst_capacity_ms(&self) -> u64 {
        self.burst as u64 * self.emission_interval_ms()
    }

    /// `tau = max(P + B, 2P)` — how long a quiescent key survives before
    /// being treated as a fresh one.
    pub fn ttl_ms(&self) -> u64 {
        (self.period_ms + self.burst_capacity_ms()).max(self.period_ms * 2)
    }

    /// The `{permits}/{period}` suffix used in store key derivation and the
    /// `X-RateLimit-Policy` header.
    pub fn descriptor(&self) -> String {
        format!("{}/{}", self.permits, self.period)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_each_unit() {
        assert_eq!(parse_duration_ms("1s").unwrap(), 1_000);
        assert_eq!(parse_duration_ms("1m").unwrap(), 60_000);
        assert_eq!(parse_duration_ms("1h").unwrap(), 3_600_000);
        assert_eq!(parse_duration_ms("1d").unwrap(), 86_400_000);
        assert_eq!(parse_duration_ms("0.5s").unwrap(), 500);
    }

    #[test]
    fn rejects_malformed_duration() {
        assert!(parse_duration_ms("1x").is_err());
        assert!(parse_duration_ms("s").is_err());
        assert!(parse_duration_ms("").is_err());
        assert!(parse_duration_ms("-1s").is_err());
    }

    #[test]
    fn derives_gcra_parameters() {
        // 10 permits / 1s, burst 5 -> T=100ms, B=500ms
        let rate = Rate::new(10, "1s", 5).unwrap();
        assert_eq!(rate.period_ms(), 1_000);
        assert_eq!(rate.emission_interval_ms(), 100);
        assert_eq!(rate.burst_capacity_ms(), 500);
        assert_eq!(rate.ttl_ms(), 2_000);
        assert_eq!(rate.descriptor(), "10/1s");
    }

    #[test]
    fn ttl_floors_at_two_periods() {
        // burst=0 means P + B == P, so ttl must still be max(P, 2P) = 2P.
        let rate = Rate::new(2, "1s", 0).unwrap();
        assert_eq!(rate.ttl_ms(), 2_000);
    }

    #[test]
    fn rejects_zero_permits() {
        assert!(Rate::new(0, "1s", 0).is_err());
    }

    #[test]
    fn truncates_emission_interval() {
        // 3 permits / 1s -> T = 1000/3 = 333 (truncated, not rounded).
        let rate = Rate::new(3, "1s", 0).unwrap();
        assert_eq!(rate.emission_interval_ms(), 333);
    }
}
