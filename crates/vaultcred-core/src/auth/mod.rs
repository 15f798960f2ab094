//! Authentication module for obtaining a Vault session.
//!
//! This module provides:
//! - `SessionAuthenticator`: reuses a still-valid token or performs a login
//! - `Session`: the token and metadata for the rest of the invocation
//! - `PasswordSource`: where the login password is read from
//!
//! Sessions live in memory only; persisting a token is left to the caller.

pub mod credentials;
pub mod session;

pub use credentials::PasswordSource;
pub use session::{Session, SessionAuthenticator, SessionState, DEFAULT_AUTH_METHOD};
