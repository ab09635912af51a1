//! REST client module for the care team backend.
//!
//! The data store only reads through `ApiClient::get_json`; the write helpers
//! exist for callers that perform the POST/PATCH/DELETE half of an optimistic
//! update themselves.

pub mod client;
pub mod error;

pub use client::ApiClient;
pub use error::ApiError;
