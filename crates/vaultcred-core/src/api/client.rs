//! HTTP client for the Vault API.
//!
//! `VaultApi` is the seam between the cascade and the store. The cascade only
//! ever sees the five calls below; `HttpVaultClient` is the production
//! implementation and tests substitute in-process fakes.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client, Url};
use serde::Deserialize;
use tracing::debug;

use super::ApiError;
use crate::secret::SecretString;

/// HTTP request timeout in seconds.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Header carrying the session token on every authenticated request.
const TOKEN_HEADER: &str = "X-Vault-Token";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct SealStatus {
    pub sealed: bool,
}

/// Metadata returned by a token self-lookup.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TokenInfo {
    #[serde(default)]
    pub display_name: String,
    /// Remaining lifetime in seconds. Zero means the token never expires.
    #[serde(default)]
    pub ttl: i64,
}

#[derive(Debug, Deserialize)]
struct LookupResponse {
    data: TokenInfo,
}

#[async_trait]
pub trait VaultApi: Send + Sync {
    /// Base address of the store, for diagnostics.
    fn address(&self) -> &str;

    async fn seal_status(&self) -> Result<SealStatus, ApiError>;

    /// Liveness probe for an existing token.
    async fn lookup_self(&self, token: &SecretString) -> Result<TokenInfo, ApiError>;

    /// Perform a login exchange and return the raw response body.
    async fn login(
        &self,
        method: &str,
        principal: &str,
        password: &SecretString,
    ) -> Result<String, ApiError>;

    /// Read the logical path exactly as given.
    async fn read(&self, token: &SecretString, path: &str) -> Result<serde_json::Value, ApiError>;
}

/// Reject plain HTTP unless it targets the local machine, and any address
/// carrying userinfo.
fn validate_url_scheme(url: &str) -> Result<(), ApiError> {
    let parsed = Url::parse(url).map_err(|_| ApiError::InsecureAddress(url.to_string()))?;
    if !parsed.username().is_empty() || parsed.password().is_some() {
        return Err(ApiError::InsecureAddress(url.to_string()));
    }
    match parsed.scheme() {
        "https" => Ok(()),
        "http" if matches!(parsed.host_str(), Some("localhost" | "127.0.0.1")) => Ok(()),
        _ => Err(ApiError::InsecureAddress(url.to_string())),
    }
}

/// Percent-encode a single URL path component. `@` is a valid path
/// character and is kept so principals like `jane@corp.com` stay readable.
fn percent_encode_component(input: &str) -> String {
    const HEX: &[u8; 16] = b"0123456789ABCDEF";
    let mut out = String::with_capacity(input.len());
    for b in input.bytes() {
        if b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.' | b'~' | b'@') {
            out.push(b as char);
        } else {
            out.push('%');
            out.push(HEX[(b >> 4) as usize] as char);
            out.push(HEX[(b & 0x0F) as usize] as char);
        }
    }
    out
}

/// Percent-encode each segment of a slash-delimited path.
fn encode_path(path: &str) -> String {
    path.trim_matches('/')
        .split('/')
        .map(percent_encode_component)
        .collect::<Vec<_>>()
        .join("/")
}

/// Vault REST API client.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Debug, Clone)]
pub struct HttpVaultClient {
    client: Client,
    base_url: String,
}

impl HttpVaultClient {
    fn user_agent() -> String {
        format!("vaultcred/{}", env!("CARGO_PKG_VERSION"))
    }

    /// Create a client for the store at `addr`.
    pub fn new(addr: &str) -> Result<Self, ApiError> {
        let base_url = addr.trim_end_matches('/').to_string();
        validate_url_scheme(&base_url)?;

        let client = Client::builder()
            .user_agent(Self::user_agent())
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self { client, base_url })
    }

    fn url(&self, path: &str) -> String {
        self.url_encoded(&encode_path(path))
    }

    /// Join an already percent-encoded path onto the API root.
    fn url_encoded(&self, encoded: &str) -> String {
        format!("{}/v1/{}", self.base_url, encoded)
    }

    /// Check if response is successful, returning an error with body if not.
    async fn check_response(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body))
        }
    }
}

#[async_trait]
impl VaultApi for HttpVaultClient {
    fn address(&self) -> &str {
        &self.base_url
    }

    async fn seal_status(&self) -> Result<SealStatus, ApiError> {
        let response = self
            .client
            .get(self.url("sys/seal-status"))
            .header(header::ACCEPT, "application/json")
            .send()
            .await?;
        let response = Self::check_response(response).await?;
        Ok(response.json().await?)
    }

    async fn lookup_self(&self, token: &SecretString) -> Result<TokenInfo, ApiError> {
        let response = self
            .client
            .get(self.url("auth/token/lookup-self"))
            .header(TOKEN_HEADER, token.expose())
            .header(header::ACCEPT, "application/json")
            .send()
            .await?;
        let response = Self::check_response(response).await?;
        let lookup: LookupResponse = response.json().await?;
        Ok(lookup.data)
    }

    async fn login(
        &self,
        method: &str,
        principal: &str,
        password: &SecretString,
    ) -> Result<String, ApiError> {
        let url = self.url_encoded(&format!(
            "auth/{}/login/{}",
            encode_path(method),
            percent_encode_component(principal)
        ));
        debug!(method, principal, "Sending login request");

        // The secret travels only in the request body.
        let body = serde_json::json!({ "password": password.expose() });
        let response = self
            .client
            .post(url)
            .header(header::ACCEPT, "application/json")
            .json(&body)
            .send()
            .await?;
        let response = Self::check_response(response).await?;
        Ok(response.text().await?)
    }

    async fn read(&self, token: &SecretString, path: &str) -> Result<serde_json::Value, ApiError> {
        let response = self
            .client
            .get(self.url(path))
            .header(TOKEN_HEADER, token.expose())
            .header(header::ACCEPT, "application/json")
            .send()
            .await?;
        let response = Self::check_response(response).await?;
        Ok(response.json().await?)
    }
}
