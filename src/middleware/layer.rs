//! Tower `Layer`/`Service` wiring the admission facade into Axum.
//!
//! Generalizes the teacher's `RateLimitLayer`/`RateLimitService`
//! (`examples/setulabs-skp-ratelimit/src/middleware/layer.rs`) from a
//! single `Algorithm`/`Quota`/`Key<R>` triple to `RateLimiter::check` +
//! `RateLimiter::response_headers`. The request-key-extraction workaround
//! that file had (a comment admitting the lifetime shortcut "format!(
//! \"axum:{}\", path)" ignoring the configured key extractor entirely) is
//! gone: [`AxumRequestParts`] borrows the live request for the duration
//! of one `RequestParts` call, so the real selector chain runs.

use std::future::Future;
use std::net::{IpAddr, SocketAddr};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::{
    body::Body,
    http::{Request, Response, StatusCode},
};
use tower::{Layer, Service};

use crate::key::RequestParts;
use crate::manager::RateLimiter;
use crate::storage::Store;

/// Upstream-populated authentication state (spec §4.2's `user`/`org`
/// selectors read fields like `user_id`, `org.id` "placed on the request
/// by upstream middleware"). A framework's auth layer inserts one of
/// these into the request extensions before this layer runs.
pub trait AuthContext: Send + Sync {
    fn field(&self, name: &str) -> Option<&str>;
}

struct AxumRequestParts<'a> {
    parts: &'a axum::http::request::Parts,
}

impl RequestParts for AxumRequestParts<'_> {
    fn header(&self, name: &str) -> Option<&str> {
        self.parts.headers.get(name)?.to_str().ok()
    }

    fn peer_addr(&self) -> Option<IpAddr> {
        self.parts
            .extensions
            .get::<axum::extract::ConnectInfo<SocketAddr>>()
            .map(|ci| ci.0.ip())
    }

    fn path(&self) -> &str {
        self.parts.uri.path()
    }

    fn method(&self) -> &str {
        self.parts.method.as_str()
    }

    fn query_param(&self, name: &str) -> Option<&str> {
        let query = self.parts.uri.query()?;
        query.split('&').find_map(|pair| {
            let (k, v) = pair.split_once('=')?;
            (k == name).then_some(v)
        })
    }

    fn auth_field(&self, name: &str) -> Option<&str> {
        self.parts
            .extensions
            .get::<Arc<dyn AuthContext>>()
            .and_then(|ctx| ctx.field(name))
    }
}

/// Tower layer applying a [`RateLimiter`] to every request it wraps.
pub struct RateLimitLayer<St: Store> {
    limiter: Arc<RateLimiter<St>>,
}

impl<St: Store> RateLimitLayer<St> {
    pub fn new(limiter: Arc<RateLimiter<St>>) -> Self {
        Self { limiter }
    }
}

impl<St: Store> Clone for RateLimitLayer<St> {
    fn clone(&self) -> Self {
        Self {
            limiter: self.limiter.clone(),
        }
    }
}

impl<St: Store, Inner> Layer<Inner> for RateLimitLayer<St> {
    type Service = RateLimitService<St, Inner>;

    fn layer(&self, inner: Inner) -> Self::Service {
        RateLimitService {
            inner,
            limiter: self.limiter.clone(),
        }
    }
}

pub struct RateLimitService<St: Store, Inner> {
    inner: Inner,
    limiter: Arc<RateLimiter<St>>,
}

impl<St: Store, Inner: Clone> Clone for RateLimitService<St, Inner> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            limiter: self.limiter.clone(),
        }
    }
}

impl<St, Inner> Service<Request<Body>> for RateLimitService<St, Inner>
where
    St: Store,
    Inner: Service<Request<Body>, Response = Response<Body>> + Clone + Send + 'static,
    Inner::Future: Send,
{
    type Response = Response<Body>;
    type Error = Inner::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<Body>) -> Self::Future {
        let limiter = self.limiter.clone();
        let mut inner = self.inner.clone();

        Box::pin(async move {
            let (parts, body) = request.into_parts();
            let req_parts = AxumRequestParts { parts: &parts };

            // `check` never returns Err for store failures (fail-mode
            // absorbs those); only a closed/errored limiter propagates.
            let decision = match limiter.check(&req_parts, None).await {
                Ok(decision) => decision,
                Err(err) => {
                    tracing::error!(error = %err, "rate limiter unavailable");
                    let request = Request::from_parts(parts, body);
                    return inner.call(request).await;
                }
            };

            let headers = limiter.response_headers(&decision);
            let request = Request::from_parts(parts, body);

            if decision.is_allowed() {
                let mut response = inner.call(request).await?;
                apply_headers(response.headers_mut(), &headers);
                Ok(response)
            } else {
                Ok(rejection_response(&headers, decision.retry_after_ms()))
            }
        })
    }
}

fn apply_headers(headers: &mut axum::http::HeaderMap, pairs: &[(&'static str, String)]) {
    for (name, value) in pairs {
        if let Ok(header_value) = value.parse() {
            headers.insert(*name, header_value);
        }
    }
}

/// The literal rejection body of spec §6:
/// `{"detail":"rate_limited","retry_after_ms":<int>}`, status 429.
fn rejection_response(headers: &[(&'static str, String)], retry_after_ms: u64) -> Response<Body> {
    let body = crate::headers::RejectionBody::new(retry_after_ms).to_json();
    let mut response = Response::new(Body::from(body));
    *response.status_mut() = StatusCode::TOO_MANY_REQUESTS;
    response
        .headers_mut()
        .insert("content-type", "application/json".parse().unwrap());
    apply_headers(response.headers_mut(), headers);
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::KeySpec;
    use crate::manager::LimiterConfigBuilder;
    use crate::policy::Policy;
    use crate::rate::Rate;
    use crate::storage::MemoryStore;

    fn test_limiter() -> Arc<RateLimiter<MemoryStore>> {
        let policy = Policy::single(Rate::new(2, "1s", 0).unwrap(), "ip", "t").unwrap();
        Arc::new(RateLimiter::new(
            MemoryStore::new(),
            policy,
            LimiterConfigBuilder::new().app_name("axum-test").build().unwrap(),
        ))
    }

    #[test]
    fn layer_clones_share_the_limiter() {
        let layer = RateLimitLayer::new(test_limiter());
        let cloned = layer.clone();
        assert!(Arc::ptr_eq(&layer.limiter, &cloned.limiter));
    }

    #[test]
    fn rejection_body_matches_spec_shape() {
        let response = rejection_response(&[], 250);
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    }
}
