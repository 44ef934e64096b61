use super::clock::{Clock, SystemClock};
use super::local::MemoryStore;
use super::resolver::{calc_lookups, check_whitelist};
use super::store::WindowStore;
use super::types::{
    BypassReason, LimitDecision, RateLimitHeaders, RateLimitOptions, ResponseCommitted,
};
use crate::error::{LimiterError, Result};
use crate::metrics;
use axum::http::request::Parts;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Fixed-window rate limiter over a shared window store
pub struct RateLimiter {
    /// Store namespace all windows are written under
    namespace: String,
    options: RateLimitOptions,
    store: Arc<dyn WindowStore>,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    /// Create a rate limiter writing into `store` under `namespace`
    pub fn new(
        namespace: impl Into<String>,
        options: RateLimitOptions,
        store: Arc<dyn WindowStore>,
    ) -> Result<Self> {
        let namespace = namespace.into();
        if namespace.is_empty() {
            return Err(LimiterError::Config(
                "The rate limiter store namespace can not be omitted".to_string(),
            ));
        }

        info!(
            namespace = %namespace,
            count = options.count,
            expire_ms = options.expire,
            "Initializing rate limiter"
        );

        Ok(Self {
            namespace,
            options,
            store,
            clock: Arc::new(SystemClock),
        })
    }

    /// Create a rate limiter backed by a fresh in-memory store
    pub fn with_memory_store(
        namespace: impl Into<String>,
        options: RateLimitOptions,
    ) -> Result<Self> {
        Self::new(namespace, options, Arc::new(MemoryStore::new()))
    }

    /// Replace the clock used to stamp windows
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn options(&self) -> &RateLimitOptions {
        &self.options
    }

    pub fn store(&self) -> &Arc<dyn WindowStore> {
        &self.store
    }

    /// Identity string for the request
    pub fn calc_lookups(&self, request: &Parts) -> String {
        calc_lookups(&self.options, request)
    }

    /// Whether the request bypasses rate limiting
    pub fn check_whitelist(&self, request: &Parts) -> bool {
        check_whitelist(&self.options, request)
    }

    /// Store key for the request: `ratelimit:{path}:{method}:{lookups}`
    pub fn key_for(&self, request: &Parts) -> String {
        let path = self
            .options
            .path
            .as_deref()
            .unwrap_or_else(|| request.uri.path());
        let method = self
            .options
            .method
            .as_deref()
            .unwrap_or_else(|| request.method.as_str())
            .to_lowercase();

        format!("ratelimit:{}:{}:{}", path, method, self.calc_lookups(request))
    }

    /// Account for the request and decide whether it may proceed.
    ///
    /// Store failures never reject: they are logged and the request fails open.
    pub async fn limit(&self, request: &Parts) -> LimitDecision {
        let decision = self.decide(request).await;
        metrics::record_decision(&decision);
        decision
    }

    async fn decide(&self, request: &Parts) -> LimitDecision {
        if request.extensions.get::<ResponseCommitted>().is_some() {
            debug!("Request already answered, skipping rate limit");
            return LimitDecision::Bypass(BypassReason::Responded);
        }

        if self.check_whitelist(request) {
            debug!("Whitelisted from rate limit");
            return LimitDecision::Bypass(BypassReason::Whitelisted);
        }

        let key = self.key_for(request);
        let timestamp = self.clock.now_millis();

        let state = match self
            .store
            .consume(
                &self.namespace,
                &key,
                self.options.count,
                self.options.expire,
                timestamp,
            )
            .await
        {
            Ok(state) => state,
            Err(e) => {
                error!("Rate limit store error for key {}: {}", key, e);
                return LimitDecision::FailOpen;
            }
        };

        let headers =
            (!self.options.skip_headers).then(|| RateLimitHeaders::from_state(&state));

        if !state.is_exhausted() {
            debug!(
                "Rate limit check passed for key {}, remaining: {}",
                key, state.remaining
            );
            return LimitDecision::Allowed { key, state, headers };
        }

        warn!("Rate limit exceeded for key: {}", key);
        let now = self.clock.now_millis();
        let headers = headers.map(|h| h.with_retry_after(state.retry_after_secs(now)));

        LimitDecision::Rejected { key, state, headers }
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("namespace", &self.namespace)
            .field("options", &self.options)
            .field("clock", &self.clock)
            .finish()
    }
}
