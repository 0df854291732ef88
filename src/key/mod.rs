//! Identity selectors (C2): map an incoming request to a stable principal
//! string.
//!
//! The built-in tags are pure functions looked up from a small table
//! (spec §9, "selector as capability, not class"); a custom selector is
//! just another function of the same shape. `Policy` stays independent of
//! any HTTP framework by going through [`RequestParts`], an object-safe
//! trait that framework adapters (see `middleware`) implement once per
//! request type — generalizing the teacher's `Key<R>` / `HasHeaders`
//! pattern (`examples/setulabs-skp-ratelimit/src/key/mod.rs`,
//! `key/extractors.rs`) into a single trait object instead of a family of
//! marker traits, since the spec's selector closed set does not need to be
//! generic over the request type.

mod builtins;
mod composite;

pub use composite::compose;

use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;

use crate::error::ConfigError;

/// The parts of an HTTP request a selector may read. Implemented once per
/// framework integration (axum, actix, or a test double).
pub trait RequestParts: Send + Sync {
    /// A header value, case-insensitively. `None` if absent.
    fn header(&self, name: &str) -> Option<&str>;

    /// The socket peer address, if the transport exposes one.
    fn peer_addr(&self) -> Option<IpAddr>;

    /// The request path, e.g. `/v1/widgets/42`.
    fn path(&self) -> &str;

    /// The HTTP method, upper-case, e.g. `GET`.
    fn method(&self) -> &str;

    /// A query-string parameter value.
    fn query_param(&self, name: &str) -> Option<&str>;

    /// A field from upstream-populated authentication state (e.g.
    /// `user_id`, `org.id`). Absent unless some earlier middleware placed
    /// it there.
    fn auth_field(&self, name: &str) -> Option<&str>;
}

/// A selector function: request parts in, principal string out. Selectors
/// never fail outward — a selector that would panic is caught by
/// [`compose`] and replaced with the literal `error`.
pub type SelectorFn = Arc<dyn Fn(&dyn RequestParts) -> String + Send + Sync>;

/// Either one of the closed-set built-in identity tags, or an opaque
/// caller-supplied selector.
#[derive(Clone)]
pub enum KeySpec {
    Ip,
    ApiKey,
    User,
    Org,
    Custom(SelectorFn),
}

impl fmt::Debug for KeySpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ip => write!(f, "KeySpec::Ip"),
            Self::ApiKey => write!(f, "KeySpec::ApiKey"),
            Self::User => write!(f, "KeySpec::User"),
            Self::Org => write!(f, "KeySpec::Org"),
            Self::Custom(_) => write!(f, "KeySpec::Custom(..)"),
        }
    }
}

impl KeySpec {
    /// Parse one of the closed-set string tags (`ip`, `api_key`, `user`,
    /// `org`). Anything else is `ConfigInvalid`.
    pub fn from_tag(tag: &str) -> Result<Self, ConfigError> {
        match tag {
            "ip" => Ok(Self::Ip),
            "api_key" => Ok(Self::ApiKey),
            "user" => Ok(Self::User),
            "org" => Ok(Self::Org),
            other => Err(ConfigError::InvalidKeySpec(format!(
                "{other:?} is not one of the built-in tags ip/api_key/user/org"
            ))),
        }
    }

    /// Wrap an arbitrary function as a custom selector.
    pub fn custom(f: impl Fn(&dyn RequestParts) -> String + Send + Sync + 'static) -> Self {
        Self::Custom(Arc::new(f))
    }

    /// Resolve this spec against a request, producing a principal string.
    pub fn select(&self, req: &dyn RequestParts) -> String {
        match self {
            Self::Ip => builtins::select_ip(req),
            Self::ApiKey => builtins::select_api_key(req),
            Self::User => builtins::select_user(req),
            Self::Org => builtins::select_org(req),
            Self::Custom(f) => f(req),
        }
    }
}
