//! vaultcred core library.
//!
//! Resolves the credentials a provisioning tool needs from a Vault-compatible
//! secret store:
//! - `config`: setting lookup by override, environment, config file, default, prompt
//! - `auth`: session reuse or login with a password that never touches argv
//! - `secrets`: reads that accept both KV engine layouts
//! - `assemble`: the cascade that ties them together into a `CredentialBundle`

pub mod api;
pub mod assemble;
pub mod auth;
pub mod config;
pub mod error;
pub mod prompt;
pub mod secret;
pub mod secrets;

pub use assemble::{AssemblyDefaults, CredentialAssembler, CredentialBundle, DEFAULT_USERNAME};
pub use error::CredentialError;
pub use secret::SecretString;
