//! Client for the external OAuth users service behind "sign in with Google".
//!
//! The service owns the provider handshake. This crate asks it for the
//! provider redirect, trades the returned code for an upstream session
//! token, resolves that token to a user profile and revokes it on logout.

pub mod client;
pub mod error;
pub mod types;

pub use client::UsersServiceClient;
pub use error::UsersServiceError;
pub use types::{ProviderProfile, UpstreamUser};
