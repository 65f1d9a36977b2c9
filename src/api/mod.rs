//! Access to the budget-tracker REST API.

pub mod client;
pub mod error;
pub mod transport;
pub mod types;

#[cfg(test)]
pub(crate) mod mock;

pub use client::{AuthClient, LogoutHook, LogoutReason};
pub use error::{ApiError, Result};
pub use transport::{ApiRequest, ApiResponse, HttpTransport, Method, Transport};
