//! Actix-web `Transform`/`Service` wiring the admission facade in.
//!
//! Generalizes the teacher's `actix.rs` (a single `Algorithm`/`Quota`
//! pair) to `RateLimiter::check` + `RateLimiter::response_headers`,
//! grounded in the same `Transform`/`Service`/`EitherBody` shape.

use std::future::{Future, Ready, ready};
use std::net::IpAddr;
use std::pin::Pin;
use std::sync::Arc;

use actix_service::{Service, Transform};
use actix_web::{Error, HttpResponse, body::EitherBody, dev::ServiceRequest, dev::ServiceResponse, http::StatusCode};

use crate::key::RequestParts;
use crate::manager::RateLimiter;
use crate::storage::Store;

struct ActixRequestParts<'a> {
    request: &'a ServiceRequest,
}

impl RequestParts for ActixRequestParts<'_> {
    fn header(&self, name: &str) -> Option<&str> {
        self.request.headers().get(name)?.to_str().ok()
    }

    fn peer_addr(&self) -> Option<IpAddr> {
        self.request.peer_addr().map(|a| a.ip())
    }

    fn path(&self) -> &str {
        self.request.path()
    }

    fn method(&self) -> &str {
        self.request.method().as_str()
    }

    fn query_param(&self, name: &str) -> Option<&str> {
        self.request.query_string().split('&').find_map(|pair| {
            let (k, v) = pair.split_once('=')?;
            (k == name).then_some(v)
        })
    }

    fn auth_field(&self, _name: &str) -> Option<&str> {
        None
    }
}

/// Actix-web middleware factory applying a [`RateLimiter`] to every
/// request it wraps.
pub struct RateLimitMiddleware<St: Store> {
    limiter: Arc<RateLimiter<St>>,
}

impl<St: Store> RateLimitMiddleware<St> {
    pub fn new(limiter: Arc<RateLimiter<St>>) -> Self {
        Self { limiter }
    }
}

impl<St: Store> Clone for RateLimitMiddleware<St> {
    fn clone(&self) -> Self {
        Self {
            limiter: self.limiter.clone(),
        }
    }
}

impl<S, B, St> Transform<S, ServiceRequest> for RateLimitMiddleware<St>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
    St: Store,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Transform = RateLimitService<S, St>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(RateLimitService {
            service,
            limiter: self.limiter.clone(),
        }))
    }
}

pub struct RateLimitService<S, St: Store> {
    service: S,
    limiter: Arc<RateLimiter<St>>,
}

impl<S, B, St> Service<ServiceRequest> for RateLimitService<S, St>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
    St: Store,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    actix_service::forward_ready!(service);

    fn call(&self, request: ServiceRequest) -> Self::Future {
        let limiter = self.limiter.clone();
        let fut = self.service.call(request.clone());

        Box::pin(async move {
            let req_parts = ActixRequestParts { request: &request };
            let decision = match limiter.check(&req_parts, None).await {
                Ok(decision) => decision,
                Err(err) => {
                    tracing::error!(error = %err, "rate limiter unavailable");
                    let response = fut.await?;
                    return Ok(response.map_into_left_body());
                }
            };
            let headers = limiter.response_headers(&decision);

            if decision.is_allowed() {
                let response = fut.await?;
                let mut response = response.map_into_left_body();
                apply_headers(response.headers_mut(), &headers);
                Ok(response)
            } else {
                let body = crate::headers::RejectionBody::new(decision.retry_after_ms()).to_json();
                let mut http_response = HttpResponse::build(StatusCode::TOO_MANY_REQUESTS)
                    .content_type("application/json")
                    .body(body);
                apply_headers(http_response.headers_mut(), &headers);
                Ok(request.into_response(http_response).map_into_right_body())
            }
        })
    }
}

fn apply_headers(headers: &mut actix_web::http::header::HeaderMap, pairs: &[(&'static str, String)]) {
    for (name, value) in pairs {
        if let (Ok(name), Ok(value)) = (
            actix_web::http::header::HeaderName::from_bytes(name.as_bytes()),
            actix_web::http::header::HeaderValue::from_str(value),
        ) {
            headers.insert(name, value);
        }
    }
}
