//! REST access to the backend.

mod client;
mod error;

pub use client::{ApiClient, ApiNamespace};
pub use error::ApiError;
