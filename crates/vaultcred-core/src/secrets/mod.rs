//! Secret reads.
//!
//! KV engines answer reads in one of two layouts; `shape` detects which and
//! locates the field mapping, `store` drives the read conventions and
//! enforces the mandatory `password` field.

pub mod shape;
pub mod store;

pub use shape::{KvShape, SecretShape};
pub use store::{versioned_path, SecretRecord, SecretStoreClient, PASSWORD_FIELD};
