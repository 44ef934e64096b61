use super::types::{Lookup, RateLimitOptions, Whitelist};
use axum::extract::ConnectInfo;
use axum::http::request::Parts;
use std::net::SocketAddr;

/// Header carrying the original caller address behind proxies
pub const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";

/// Resolve the caller address.
///
/// The forwarded-for header is used verbatim when present; otherwise the peer
/// address from `ConnectInfo`.
pub fn client_address(request: &Parts) -> String {
    if let Some(forwarded) = request
        .headers
        .get(FORWARDED_FOR_HEADER)
        .and_then(|v| v.to_str().ok())
    {
        return forwarded.to_string();
    }

    request
        .extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Build the identity string used in the rate limit key.
///
/// Components keep their order and are joined with `:`; duplicates are kept.
pub fn calc_lookups(options: &RateLimitOptions, request: &Parts) -> String {
    let mut looks = match &options.lookup {
        Lookup::Fixed(values) => values.clone(),
        Lookup::Resolver(resolve) => resolve(request),
    };

    if !options.noip {
        looks.push(client_address(request));
    }

    looks.join(":")
}

/// Whether the request bypasses rate limiting entirely
pub fn check_whitelist(options: &RateLimitOptions, request: &Parts) -> bool {
    match &options.whitelist {
        Whitelist::Addresses(addresses) => addresses.contains(&client_address(request)),
        Whitelist::Predicate(predicate) => predicate(request).is_bypass(),
        Whitelist::None => false,
    }
}
