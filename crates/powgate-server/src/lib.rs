//! Listener runtime for the powgate proof-of-work quote service.
//!
//! The server gates every quote behind a hashcash exchange: connections are
//! admitted against a sliding-window rate limit and a connection cap, issued
//! a challenge bound to their address, and answered only once they present a
//! nonce whose verification digest meets the configured difficulty.

pub mod config;
mod handler;
pub mod observability;
pub mod quotes;
pub mod rate_limit;
mod server;

pub use crate::config::{
    ListenerConfig, PowConfig, RateLimitConfig, ServerConfig, ServerConfigOverrides,
};
pub use crate::observability::{ObservabilitySnapshot, ServerObservability};
pub use crate::quotes::{NoQuotes, QuoteStore};
pub use crate::rate_limit::RateLimiter;
pub use crate::server::Server;
