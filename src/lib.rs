//! Client for the budget-tracker REST API.
//!
//! [`api::AuthClient`] attaches the session's bearer token to every request
//! and recovers from an expired access token with a single shared refresh.
//! [`tracker::Tracker`] layers a query cache on top, keyed by resource and
//! filters, that mutations invalidate according to fixed dependency rules.

pub mod api;
pub mod cache;
pub mod config;
pub mod session;
pub mod tracker;

pub use api::{ApiError, AuthClient, HttpTransport, LogoutReason};
pub use cache::{CacheKey, CacheLayer, Filters, Mutation, ResourceType};
pub use config::Config;
pub use session::Session;
pub use tracker::Tracker;
