//! Codeship API v2 client

pub mod client;
pub mod types;

pub use client::{CodeshipClient, CodeshipError, DEFAULT_API_URL};
pub use types::*;
