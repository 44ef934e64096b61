//! Rate limiting module
//!
//! Fixed-window request rate limiting backed by a shared window store:
//!
//! - **Key derivation**: `ratelimit:{path}:{method}:{lookups}`, where lookups are
//!   caller-chosen identity components followed by the caller address
//! - **Whitelist bypass** by address set or predicate
//! - **Window store** abstraction with in-memory and Redis backends
//! - Rate limit headers in responses (`X-RateLimit-*`, `Retry-After`)
//! - Fail-open on store errors
//!
//! # Example
//!
//! ```rust,no_run
//! use axum::{middleware, routing::get, Router};
//! use std::sync::Arc;
//! use window_limiter::rate_limit::{rate_limit_middleware, RateLimitOptions, RateLimiter};
//!
//! #[tokio::main]
//! async fn main() {
//!     let options = RateLimitOptions {
//!         count: 100,
//!         expire: 60_000,
//!         ..Default::default()
//!     };
//!
//!     // In-memory store; use `RedisStore` to share windows between instances
//!     let limiter = Arc::new(RateLimiter::with_memory_store("api", options).unwrap());
//!
//!     let app: Router = Router::new()
//!         .route("/", get(|| async { "ok" }))
//!         .layer(middleware::from_fn_with_state(limiter, rate_limit_middleware));
//! }
//! ```

pub mod clock;
pub mod local;
pub mod lua_scripts;
pub mod middleware;
pub mod redis;
pub mod resolver;
pub mod service;
pub mod store;
pub mod types;

// Re-export commonly used types
pub use clock::{Clock, ManualClock, SystemClock};
pub use local::MemoryStore;
pub use middleware::{default_on_rate_limited, rate_limit_middleware};
pub use redis::RedisStore;
pub use resolver::{calc_lookups, check_whitelist, client_address};
pub use service::RateLimiter;
pub use store::WindowStore;
pub use types::{
    BypassReason, ChainPolicy, LimitDecision, Lookup, RateLimitExceeded, RateLimitHeaders,
    RateLimitOptions, ResponseCommitted, Whitelist, WhitelistVerdict, WindowState,
};
