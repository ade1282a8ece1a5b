//! Google Play billing adapter.
//!
//! - `client` - `BillingVerificationClient` over the Android Publisher REST API
//! - `token_source` - static or metadata-server OAuth tokens
//! - `dto` - wire types and their conversion into domain state

mod client;
mod dto;
mod token_source;

pub use client::GooglePlayBillingClient;
pub use token_source::AccessTokenSource;
