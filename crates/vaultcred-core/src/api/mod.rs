//! Vault HTTP API module.
//!
//! This module provides the `VaultApi` trait the cascade talks through and
//! `HttpVaultClient`, its reqwest implementation. Requests authenticate with
//! the `X-Vault-Token` header.

pub mod client;
pub mod error;

pub use client::{HttpVaultClient, SealStatus, TokenInfo, VaultApi};
pub use error::ApiError;
