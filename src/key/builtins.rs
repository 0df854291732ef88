//! The four closed-set identity selectors: `ip`, `api_key`, `user`, `org`.
//!
//! Header precedence and hashing rules are specified exactly (not left to
//! the teacher's looser `IpKey`/`HeaderKey` extractors in
//! `examples/setulabs-skp-ratelimit/src/key/extractors.rs`, which this
//! module supersedes); the fallback-chain *shape* — try a sequence of
//! sources, stop at the first hit — is kept from that file and from
//! `original_source/src/pacer/extractors.py`.

use std::net::IpAddr;

use sha2::{Digest, Sha256};

use super::RequestParts;

pub(super) fn select_ip(req: &dyn RequestParts) -> String {
    if let Some(v) = req.header("CF-Connecting-IP") {
        return canonicalize_ip(v.trim());
    }
    if let Some(v) = req.header("X-Real-IP") {
        return canonicalize_ip(v.trim());
    }
    if let Some(v) = req.header("X-Forwarded-For") {
        if let Some(first) = v.split(',').next() {
            return canonicalize_ip(first.trim());
        }
    }
    match req.peer_addr() {
        Some(ip) => canonicalize_ip(&ip.to_string()),
        None => String::new(),
    }
}

/// Parses IPv4/IPv6, stripping a trailing `:port` and an IPv6 zone id.
/// Malformed input is returned unmodified, per spec §4.2.
fn canonicalize_ip(raw: &str) -> String {
    if raw.is_empty() {
        return raw.to_string();
    }
    if let Ok(ip) = raw.parse::<IpAddr>() {
        return ip.to_string();
    }
    // bracketed IPv6 with port, e.g. "[::1]:8080"
    if let Some(rest) = raw.strip_prefix('[') {
        if let Some(end) = rest.find(']') {
            let host = &rest[..end];
            let host = host.split('%').next().unwrap_or(host);
            if let Ok(ip) = host.parse::<IpAddr>() {
                return ip.to_string();
            }
        }
    }
    // IPv4 with port, e.g. "1.2.3.4:8080"
    if let Some((host, _port)) = raw.rsplit_once(':') {
        if host.matches('.').count() == 3 {
            if let Ok(ip) = host.parse::<IpAddr>() {
                return ip.to_string();
            }
        }
    }
    // IPv6 zone id without brackets, e.g. "fe80::1%eth0"
    if let Some(host) = raw.split('%').next() {
        if host != raw {
            if let Ok(ip) = host.parse::<IpAddr>() {
                return ip.to_string();
            }
        }
    }
    raw.to_string()
}

pub(super) fn select_api_key(req: &dyn RequestParts) -> String {
    let raw = req
        .header("X-API-Key")
        .map(|s| s.to_string())
        .or_else(|| {
            req.header("Authorization")
                .and_then(|v| v.strip_prefix("Bearer "))
                .map(|s| s.to_string())
        })
        .or_else(|| req.query_param("api_key").map(|s| s.to_string()));

    match raw {
        Some(key) if !key.is_empty() => hash_api_key(&key),
        _ => "no_api_key".to_string(),
    }
}

fn hash_api_key(key: &str) -> String {
    let digest = Sha256::digest(key.as_bytes());
    let hex = digest.iter().map(|b| format!("{b:02x}")).collect::<String>();
    hex[..32].to_string()
}

const USER_ID_FIELDS: &[&str] = &["user_id", "user.id"];
const ORG_ID_FIELDS: &[&str] = &["org_id", "organization_id", "org.id"];

pub(super) fn select_user(req: &dyn RequestParts) -> String {
    for field in USER_ID_FIELDS {
        if let Some(v) = req.auth_field(field) {
            if !v.is_empty() {
                return v.to_string();
            }
        }
    }
    "anonymous".to_string()
}

pub(super) fn select_org(req: &dyn RequestParts) -> String {
    for field in ORG_ID_FIELDS {
        if let Some(v) = req.auth_field(field) {
            if !v.is_empty() {
                return v.to_string();
            }
        }
    }
    "no_org".to_string()
}
