//! Service layer module
//!
//! Contains the rate limiter, HTTP transport, request dispatcher and the
//! client façade

pub mod client;
pub mod dispatcher;
pub mod rate_limiter;
pub mod transport;

pub use client::{ChatGptClient, RequestOptions, Session, AVAILABLE_MODELS};
pub use dispatcher::{Endpoint, RequestDispatcher, RetryPolicy};
pub use rate_limiter::{Clock, ManualClock, RateLimitStatus, RateLimiter, SystemClock};
pub use transport::{HttpReply, HttpTransport, Transport, TransportFailure};
