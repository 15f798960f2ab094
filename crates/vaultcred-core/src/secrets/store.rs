use std::collections::BTreeMap;
use std::fmt;

use tracing::debug;

use super::shape::{KvShape, SecretShape};
use crate::api::{ApiError, VaultApi};
use crate::auth::Session;
use crate::error::CredentialError;

/// Field every usable secret must carry.
pub const PASSWORD_FIELD: &str = "password";

/// A secret read at one path, normalized to a flat field mapping.
#[derive(Clone)]
pub struct SecretRecord {
    pub path: String,
    pub shape: KvShape,
    fields: BTreeMap<String, String>,
}

impl SecretRecord {
    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields
            .get(field)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    pub fn password(&self) -> &str {
        self.get(PASSWORD_FIELD).unwrap_or_default()
    }

    pub fn field_names(&self) -> Vec<&str> {
        self.fields.keys().map(String::as_str).collect()
    }

    pub fn fields(&self) -> &BTreeMap<String, String> {
        &self.fields
    }

    pub fn into_fields(self) -> BTreeMap<String, String> {
        self.fields
    }
}

impl fmt::Debug for SecretRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretRecord")
            .field("path", &self.path)
            .field("shape", &self.shape)
            .field("fields", &self.field_names())
            .finish_non_exhaustive()
    }
}

/// Path used by the versioned read convention: `data` inserted after the
/// mount, so `secret/app` becomes `secret/data/app`. `None` for a bare mount.
pub fn versioned_path(path: &str) -> Option<String> {
    let (mount, rest) = path.trim_matches('/').split_once('/')?;
    if mount.is_empty() || rest.is_empty() {
        return None;
    }
    Some(format!("{}/data/{}", mount, rest))
}

/// Reads secrets with an established session. Nothing is cached; every
/// call queries the store.
pub struct SecretStoreClient<'a> {
    api: &'a dyn VaultApi,
    session: &'a Session,
}

impl<'a> SecretStoreClient<'a> {
    pub fn new(api: &'a dyn VaultApi, session: &'a Session) -> Self {
        Self { api, session }
    }

    /// Read the secret at `path`, trying the versioned convention first and
    /// the literal path second.
    pub async fn read_secret(&self, path: &str) -> Result<SecretRecord, CredentialError> {
        let path = path.trim_matches('/');
        if path.is_empty() {
            return Err(CredentialError::SecretNotFound {
                path: path.to_string(),
                reason: "empty secret path".to_string(),
            });
        }

        if let Some(versioned) = versioned_path(path) {
            match self.api.read(self.session.token(), &versioned).await {
                Ok(body) => {
                    debug!(path, api_path = %versioned, "Read secret via versioned convention");
                    return self.normalize(path, &body);
                }
                Err(e) => {
                    self.check_transport(&e)?;
                    debug!(path, error = %e, "Versioned read failed, falling back to raw path");
                }
            }
        }

        match self.api.read(self.session.token(), path).await {
            Ok(body) => {
                debug!(path, "Read secret via raw path");
                self.normalize(path, &body)
            }
            Err(e) => {
                self.check_transport(&e)?;
                Err(CredentialError::SecretNotFound {
                    path: path.to_string(),
                    reason: e.to_string(),
                })
            }
        }
    }

    fn check_transport(&self, error: &ApiError) -> Result<(), CredentialError> {
        if error.is_transport() {
            return Err(CredentialError::StoreUnreachable {
                addr: self.api.address().to_string(),
                reason: error.to_string(),
            });
        }
        Ok(())
    }

    fn normalize(&self, path: &str, body: &serde_json::Value) -> Result<SecretRecord, CredentialError> {
        let shape = SecretShape::detect(body).ok_or_else(|| CredentialError::SecretMalformed {
            path: path.to_string(),
            reason: "response has no 'data' object".to_string(),
        })?;

        let record = SecretRecord {
            path: path.to_string(),
            shape: shape.kind(),
            fields: shape.fields(),
        };

        if record.get(PASSWORD_FIELD).is_none() {
            return Err(CredentialError::SecretMalformed {
                path: path.to_string(),
                reason: format!("no '{}' field (found: {})", PASSWORD_FIELD, record.field_names().join(", ")),
            });
        }

        debug!(path, shape = ?record.shape, fields = ?record.field_names(), "Secret normalized");
        Ok(record)
    }
}
