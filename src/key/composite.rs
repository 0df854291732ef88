//! `compose()`: join several selectors into one, `:`-separated (spec §4.2).
//!
//! Generalizes the teacher's `CompositeKey`/`CompositeKey3` combinators
//! (`examples/setulabs-skp-ratelimit/src/key/composite.rs`), which joined a
//! fixed arity of two or three typed keys, into a single variadic
//! combinator over the new trait-object `KeySpec`. The teacher's
//! `EitherKey`/`OptionalKey` fallback shapes have no counterpart in this
//! spec (a sub-selector never "fails" — it always returns a string, with a
//! literal standing in for absence), so they are not carried forward.

use std::panic::{AssertUnwindSafe, catch_unwind};

use super::KeySpec;

/// Join the given selectors' outputs with `:`. A selector that panics is
/// replaced by the literal `error` so a broken custom selector can never
/// crash admission.
pub fn compose(specs: Vec<KeySpec>) -> KeySpec {
    KeySpec::custom(move |req| {
        specs
            .iter()
            .map(|spec| {
                catch_unwind(AssertUnwindSafe(|| spec.select(req)))
                    .unwrap_or_else(|_| "error".to_string())
            })
            .collect::<Vec<_>>()
            .join(":")
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::test_support::FakeRequest;

    #[test]
    fn joins_with_colon() {
        let spec = compose(vec![
            KeySpec::custom(|_| "a".to_string()),
            KeySpec::custom(|_| "b".to_string()),
        ]);
        let req = FakeRequest::default();
        assert_eq!(spec.select(&req), "a:b");
    }

    #[test]
    fn panicking_sub_selector_becomes_literal_error() {
        let spec = compose(vec![
            KeySpec::custom(|_| "ok".to_string()),
            KeySpec::custom(|_| panic!("boom")),
        ]);
        let req = FakeRequest::default();
        assert_eq!(spec.select(&req), "ok:error");
    }

    #[test]
    fn composes_built_ins() {
        let mut req = FakeRequest::default();
        req.peer = Some("10.0.0.5".parse().unwrap());
        req.auth.insert("user_id".into(), "u-1".into());
        let spec = compose(vec![KeySpec::Ip, KeySpec::User]);
        assert_eq!(spec.select(&req), "10.0.0.5:u-1");
    }
}
