use axum::extract::Request;
use axum::http::request::Parts;
use axum::http::{HeaderMap, HeaderName, HeaderValue};
use axum::response::Response;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// Default quota per window
pub const DEFAULT_COUNT: u32 = 250;
/// Default window length (5 minutes) in milliseconds
pub const DEFAULT_EXPIRE_MS: u64 = 1000 * 60 * 5;

pub const HEADER_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
pub const HEADER_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");
pub const HEADER_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
pub const HEADER_RETRY_AFTER: HeaderName = HeaderName::from_static("retry-after");

/// Computes identity components from a request
pub type LookupFn = Arc<dyn Fn(&Parts) -> Vec<String> + Send + Sync>;
/// Decides whether a request bypasses rate limiting
pub type WhitelistFn = Arc<dyn Fn(&Parts) -> WhitelistVerdict + Send + Sync>;
/// Produces the rejection response for a rate limited request
pub type OnRateLimited = Arc<dyn Fn(&mut Request, &WindowState) -> Response + Send + Sync>;

/// Per-key window state, persisted as JSON in the store.
///
/// The serialized shape `{"total":..,"remaining":..,"reset":..}` is shared with
/// other deployments reading the same store and must not change.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct WindowState {
    /// Quota of the window
    pub total: u64,
    /// Requests left in the window, floored at -1
    pub remaining: i64,
    /// Epoch milliseconds at which the window ends
    pub reset: u64,
}

impl WindowState {
    /// A full window starting at `now`
    pub fn fresh(count: u32, expire_ms: u64, now: u64) -> Self {
        Self {
            total: u64::from(count),
            remaining: i64::from(count),
            reset: now.saturating_add(expire_ms),
        }
    }

    /// Parse a stored value. Absent or malformed values yield `None`.
    pub fn parse(raw: Option<&str>) -> Option<Self> {
        raw.and_then(|value| serde_json::from_str(value).ok())
    }

    pub fn is_expired(&self, now: u64) -> bool {
        now > self.reset
    }

    /// Consume one request from the window, replacing it first if it has expired.
    ///
    /// `total` survives a reset; only `remaining` and `reset` are replaced.
    pub fn advance(mut self, count: u32, expire_ms: u64, now: u64) -> Self {
        if self.is_expired(now) {
            self.reset = now.saturating_add(expire_ms);
            self.remaining = i64::from(count);
        }

        self.remaining = (self.remaining - 1).max(-1);
        self
    }

    /// Apply one request to optional existing state
    pub fn consume(existing: Option<Self>, count: u32, expire_ms: u64, now: u64) -> Self {
        existing
            .unwrap_or_else(|| Self::fresh(count, expire_ms, now))
            .advance(count, expire_ms, now)
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining < 0
    }

    /// Whole seconds until the window resets, never negative
    pub fn retry_after_secs(&self, now: u64) -> u64 {
        self.reset.saturating_sub(now).div_ceil(1000)
    }
}

/// Identity components to key on
#[derive(Clone)]
pub enum Lookup {
    /// Fixed components, used as-is
    Fixed(Vec<String>),
    /// Components computed per request
    Resolver(LookupFn),
}

impl Lookup {
    pub fn resolver<F>(f: F) -> Self
    where
        F: Fn(&Parts) -> Vec<String> + Send + Sync + 'static,
    {
        Lookup::Resolver(Arc::new(f))
    }
}

impl Default for Lookup {
    fn default() -> Self {
        Lookup::Fixed(Vec::new())
    }
}

impl From<&str> for Lookup {
    fn from(value: &str) -> Self {
        Lookup::Fixed(vec![value.to_string()])
    }
}

impl From<String> for Lookup {
    fn from(value: String) -> Self {
        Lookup::Fixed(vec![value])
    }
}

impl From<Vec<String>> for Lookup {
    fn from(values: Vec<String>) -> Self {
        Lookup::Fixed(values)
    }
}

impl fmt::Debug for Lookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Lookup::Fixed(values) => f.debug_tuple("Fixed").field(values).finish(),
            Lookup::Resolver(_) => f.write_str("Resolver(..)"),
        }
    }
}

/// What a whitelist predicate returned.
///
/// Any `true`, non-empty string or non-empty list bypasses the limiter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WhitelistVerdict {
    Bypass(bool),
    Token(String),
    Tokens(Vec<String>),
}

impl WhitelistVerdict {
    pub fn is_bypass(&self) -> bool {
        match self {
            WhitelistVerdict::Bypass(bypass) => *bypass,
            WhitelistVerdict::Token(token) => !token.is_empty(),
            WhitelistVerdict::Tokens(tokens) => !tokens.is_empty(),
        }
    }
}

impl From<bool> for WhitelistVerdict {
    fn from(value: bool) -> Self {
        WhitelistVerdict::Bypass(value)
    }
}

impl From<String> for WhitelistVerdict {
    fn from(value: String) -> Self {
        WhitelistVerdict::Token(value)
    }
}

impl From<&str> for WhitelistVerdict {
    fn from(value: &str) -> Self {
        WhitelistVerdict::Token(value.to_string())
    }
}

impl From<Vec<String>> for WhitelistVerdict {
    fn from(value: Vec<String>) -> Self {
        WhitelistVerdict::Tokens(value)
    }
}

/// Bypass rule
#[derive(Clone, Default)]
pub enum Whitelist {
    /// Nothing bypasses
    #[default]
    None,
    /// Caller addresses that bypass
    Addresses(HashSet<String>),
    /// Predicate over the request
    Predicate(WhitelistFn),
}

impl Whitelist {
    pub fn predicate<F, V>(f: F) -> Self
    where
        F: Fn(&Parts) -> V + Send + Sync + 'static,
        V: Into<WhitelistVerdict>,
    {
        Whitelist::Predicate(Arc::new(move |req: &Parts| -> WhitelistVerdict {
            f(req).into()
        }))
    }
}

impl From<Vec<String>> for Whitelist {
    fn from(addresses: Vec<String>) -> Self {
        Whitelist::Addresses(addresses.into_iter().collect())
    }
}

impl From<&[&str]> for Whitelist {
    fn from(addresses: &[&str]) -> Self {
        Whitelist::Addresses(addresses.iter().map(|a| a.to_string()).collect())
    }
}

impl fmt::Debug for Whitelist {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Whitelist::None => f.write_str("None"),
            Whitelist::Addresses(set) => f.debug_tuple("Addresses").field(set).finish(),
            Whitelist::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}

/// What the middleware does after the rejection handler ran
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainPolicy {
    /// Run the rest of the chain as well; the client still receives the rejection
    #[default]
    AlwaysAdvance,
    /// Stop at the rejection response
    Halt,
}

/// Rate limiter options
#[derive(Clone)]
pub struct RateLimitOptions {
    pub lookup: Lookup,
    /// Requests allowed per window
    pub count: u32,
    /// Window length in milliseconds
    pub expire: u64,
    pub whitelist: Whitelist,
    /// Custom rejection handler, the default 429 handler when unset
    pub on_rate_limited: Option<OnRateLimited>,
    pub skip_headers: bool,
    /// Leave the caller address out of the key
    pub noip: bool,
    /// Path used in the key instead of the request path
    pub path: Option<String>,
    /// Method used in the key instead of the request method
    pub method: Option<String>,
    pub chain_policy: ChainPolicy,
}

impl Default for RateLimitOptions {
    fn default() -> Self {
        Self {
            lookup: Lookup::default(),
            count: DEFAULT_COUNT,
            expire: DEFAULT_EXPIRE_MS,
            whitelist: Whitelist::None,
            on_rate_limited: None,
            skip_headers: false,
            noip: false,
            path: None,
            method: None,
            chain_policy: ChainPolicy::default(),
        }
    }
}

impl RateLimitOptions {
    pub fn with_lookup_fn<F>(mut self, f: F) -> Self
    where
        F: Fn(&Parts) -> Vec<String> + Send + Sync + 'static,
    {
        self.lookup = Lookup::resolver(f);
        self
    }

    pub fn with_whitelist_fn<F, V>(mut self, f: F) -> Self
    where
        F: Fn(&Parts) -> V + Send + Sync + 'static,
        V: Into<WhitelistVerdict>,
    {
        self.whitelist = Whitelist::predicate(f);
        self
    }

    pub fn with_on_rate_limited<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut Request, &WindowState) -> Response + Send + Sync + 'static,
    {
        self.on_rate_limited = Some(Arc::new(f));
        self
    }
}

impl fmt::Debug for RateLimitOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimitOptions")
            .field("lookup", &self.lookup)
            .field("count", &self.count)
            .field("expire", &self.expire)
            .field("whitelist", &self.whitelist)
            .field("on_rate_limited", &self.on_rate_limited.is_some())
            .field("skip_headers", &self.skip_headers)
            .field("noip", &self.noip)
            .field("path", &self.path)
            .field("method", &self.method)
            .field("chain_policy", &self.chain_policy)
            .finish()
    }
}

/// Header values describing a window
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitHeaders {
    pub limit: u64,
    /// Window end in UTC epoch seconds
    pub reset: u64,
    pub remaining: u64,
    pub retry_after: Option<u64>,
}

impl RateLimitHeaders {
    pub fn from_state(state: &WindowState) -> Self {
        Self {
            limit: state.total,
            reset: state.reset.div_ceil(1000),
            remaining: u64::try_from(state.remaining.max(0)).unwrap_or(0),
            retry_after: None,
        }
    }

    pub fn with_retry_after(mut self, secs: u64) -> Self {
        self.retry_after = Some(secs);
        self
    }

    /// Write the headers into a header map
    pub fn apply(&self, headers: &mut HeaderMap) {
        headers.insert(HEADER_LIMIT, HeaderValue::from(self.limit));
        headers.insert(HEADER_RESET, HeaderValue::from(self.reset));
        headers.insert(HEADER_REMAINING, HeaderValue::from(self.remaining));

        if let Some(retry) = self.retry_after {
            headers.insert(HEADER_RETRY_AFTER, HeaderValue::from(retry));
        }
    }
}

/// Why a request skipped accounting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BypassReason {
    /// An upstream layer already answered the request
    Responded,
    Whitelisted,
}

/// Outcome of a rate limit check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LimitDecision {
    Bypass(BypassReason),
    Allowed {
        key: String,
        state: WindowState,
        headers: Option<RateLimitHeaders>,
    },
    Rejected {
        key: String,
        state: WindowState,
        headers: Option<RateLimitHeaders>,
    },
    /// The store failed; the request proceeds unaccounted
    FailOpen,
}

impl LimitDecision {
    pub fn is_rejected(&self) -> bool {
        matches!(self, LimitDecision::Rejected { .. })
    }

    pub fn state(&self) -> Option<&WindowState> {
        match self {
            LimitDecision::Allowed { state, .. } | LimitDecision::Rejected { state, .. } => {
                Some(state)
            }
            _ => None,
        }
    }

    pub fn headers(&self) -> Option<&RateLimitHeaders> {
        match self {
            LimitDecision::Allowed { headers, .. } | LimitDecision::Rejected { headers, .. } => {
                headers.as_ref()
            }
            _ => None,
        }
    }
}

/// Request extension set by upstream layers that already produced a response
#[derive(Debug, Clone, Copy, Default)]
pub struct ResponseCommitted;

/// Request extension set by the default rejection handler
#[derive(Debug, Clone)]
pub struct RateLimitExceeded {
    pub message: String,
    pub state: WindowState,
}
