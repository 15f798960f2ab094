use chrono::{DateTime, Duration, Utc};
use tracing::{debug, error, info};

use super::credentials::{extract_token, PasswordSource};
use crate::api::VaultApi;
use crate::error::CredentialError;
use crate::prompt::Prompter;
use crate::secret::SecretString;

/// Auth method used when none is configured.
pub const DEFAULT_AUTH_METHOD: &str = "userpass";

/// An authenticated session for one invocation. Never written to disk.
#[derive(Debug, Clone)]
pub struct Session {
    token: SecretString,
    pub principal: String,
    /// Zero means the store reported no expiry.
    pub ttl_seconds: i64,
    pub validated_at: DateTime<Utc>,
}

impl Session {
    pub fn token(&self) -> &SecretString {
        &self.token
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        (self.ttl_seconds > 0).then(|| self.validated_at + Duration::seconds(self.ttl_seconds))
    }
}

/// Outcome of checking a candidate token, computed once per invocation.
#[derive(Debug)]
pub enum SessionState {
    NoSession,
    Valid(Session),
    Invalid,
}

/// The single gate for obtaining a session token.
pub struct SessionAuthenticator<'a> {
    api: &'a dyn VaultApi,
    prompter: &'a dyn Prompter,
    method: String,
    password_source: PasswordSource,
}

impl<'a> SessionAuthenticator<'a> {
    pub fn new(api: &'a dyn VaultApi, prompter: &'a dyn Prompter) -> Self {
        Self {
            api,
            prompter,
            method: DEFAULT_AUTH_METHOD.to_string(),
            password_source: PasswordSource::default(),
        }
    }

    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = method.into();
        self
    }

    pub fn with_password_source(mut self, source: PasswordSource) -> Self {
        self.password_source = source;
        self
    }

    /// Probe a candidate token once.
    pub async fn check(
        &self,
        principal: &str,
        candidate: Option<SecretString>,
    ) -> Result<SessionState, CredentialError> {
        let Some(token) = candidate.filter(|t| !t.is_empty()) else {
            return Ok(SessionState::NoSession);
        };

        match self.api.lookup_self(&token).await {
            Ok(info) => {
                let principal = if info.display_name.is_empty() {
                    principal.to_string()
                } else {
                    info.display_name
                };
                Ok(SessionState::Valid(Session {
                    token,
                    principal,
                    ttl_seconds: info.ttl,
                    validated_at: Utc::now(),
                }))
            }
            Err(e) if e.is_transport() => Err(CredentialError::StoreUnreachable {
                addr: self.api.address().to_string(),
                reason: e.to_string(),
            }),
            Err(e) => {
                debug!(error = %e, "Token lookup failed");
                Ok(SessionState::Invalid)
            }
        }
    }

    /// Reuse the candidate token if the store still accepts it, otherwise
    /// log in as `principal`. A failed login is never retried.
    pub async fn ensure_session(
        &self,
        principal: &str,
        candidate: Option<SecretString>,
    ) -> Result<Session, CredentialError> {
        match self.check(principal, candidate).await? {
            SessionState::Valid(session) => {
                info!(
                    display_name = %session.principal,
                    ttl_secs = session.ttl_seconds,
                    "Reusing existing Vault session"
                );
                Ok(session)
            }
            SessionState::Invalid => {
                info!(principal, "Existing Vault token is no longer valid, logging in");
                self.login(principal).await
            }
            SessionState::NoSession => {
                debug!(principal, "No Vault token available, logging in");
                self.login(principal).await
            }
        }
    }

    fn rejected(&self, principal: &str, reason: String) -> CredentialError {
        CredentialError::AuthenticationFailed {
            principal: principal.to_string(),
            method: self.method.clone(),
            reason,
        }
    }

    async fn login(&self, principal: &str) -> Result<Session, CredentialError> {
        let password = self.password_source.read(self.prompter, principal)?;
        if password.is_empty() {
            return Err(self.rejected(principal, "no password supplied".to_string()));
        }

        let body = self
            .api
            .login(&self.method, principal, &password)
            .await
            .map_err(|e| {
                if e.is_transport() {
                    CredentialError::StoreUnreachable {
                        addr: self.api.address().to_string(),
                        reason: e.to_string(),
                    }
                } else {
                    error!(principal, method = %self.method, error = %e, "Vault login rejected");
                    self.rejected(principal, e.to_string())
                }
            })?;
        drop(password);

        let issued = extract_token(&body).map_err(|reason| {
            error!(principal, %reason, "Vault login returned no usable token");
            self.rejected(principal, reason)
        })?;

        info!(principal, method = %self.method, "Vault login successful");
        Ok(Session {
            token: issued.token,
            principal: principal.to_string(),
            ttl_seconds: issued.lease_duration,
            validated_at: Utc::now(),
        })
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::api::{ApiError, SealStatus, TokenInfo, VaultApi};
    use crate::secret::SecretString;

    /// In-process store with call counters.
    #[derive(Debug)]
    pub struct FakeVault {
        pub sealed: bool,
        pub valid_token: Option<String>,
        pub login_body: Result<String, u16>,
        pub secrets: HashMap<String, serde_json::Value>,
        pub status_calls: AtomicUsize,
        pub lookup_calls: AtomicUsize,
        pub login_calls: AtomicUsize,
        pub reads: Mutex<Vec<String>>,
    }

    impl Default for FakeVault {
        fn default() -> Self {
            Self {
                sealed: false,
                valid_token: None,
                login_body: Ok(r#"{"auth":{"client_token":"issued","lease_duration":3600}}"#.to_string()),
                secrets: HashMap::new(),
                status_calls: AtomicUsize::new(0),
                lookup_calls: AtomicUsize::new(0),
                login_calls: AtomicUsize::new(0),
                reads: Mutex::new(Vec::new()),
            }
        }
    }

    impl FakeVault {
        pub fn logins(&self) -> usize {
            self.login_calls.load(Ordering::SeqCst)
        }

        pub fn lookups(&self) -> usize {
            self.lookup_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl VaultApi for FakeVault {
        fn address(&self) -> &str {
            "https://fake:8200"
        }

        async fn seal_status(&self) -> Result<SealStatus, ApiError> {
            self.status_calls.fetch_add(1, Ordering::SeqCst);
            Ok(SealStatus { sealed: self.sealed })
        }

        async fn lookup_self(&self, token: &SecretString) -> Result<TokenInfo, ApiError> {
            self.lookup_calls.fetch_add(1, Ordering::SeqCst);
            match &self.valid_token {
                Some(valid) if valid == token.expose() => Ok(TokenInfo {
                    display_name: "userpass-deploy".to_string(),
                    ttl: 1800,
                }),
                _ => Err(ApiError::AccessDenied("permission denied".to_string())),
            }
        }

        async fn login(
            &self,
            _method: &str,
            _principal: &str,
            _password: &SecretString,
        ) -> Result<String, ApiError> {
            self.login_calls.fetch_add(1, Ordering::SeqCst);
            match &self.login_body {
                Ok(body) => Ok(body.clone()),
                Err(_) => Err(ApiError::AccessDenied("invalid username or password".to_string())),
            }
        }

        async fn read(&self, _token: &SecretString, path: &str) -> Result<serde_json::Value, ApiError> {
            if let Ok(mut reads) = self.reads.lock() {
                reads.push(path.to_string());
            }
            self.secrets
                .get(path)
                .cloned()
                .ok_or_else(|| ApiError::NotFound(path.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::FakeVault;
    use super::*;
    use crate::prompt::testing::ScriptedPrompter;

    #[tokio::test]
    async fn test_no_candidate_is_no_session() {
        let vault = FakeVault::default();
        let prompter = ScriptedPrompter::default();
        let auth = SessionAuthenticator::new(&vault, &prompter);

        let state = auth.check("deploy", None).await.unwrap();
        assert!(matches!(state, SessionState::NoSession));
        assert_eq!(vault.lookups(), 0);
    }

    #[tokio::test]
    async fn test_valid_session_is_reused_without_login() {
        let vault = FakeVault {
            valid_token: Some("s.live".to_string()),
            ..Default::default()
        };
        let prompter = ScriptedPrompter::default();
        let auth = SessionAuthenticator::new(&vault, &prompter);

        let session = auth
            .ensure_session("deploy", Some(SecretString::new("s.live")))
            .await
            .unwrap();

        assert_eq!(session.token().expose(), "s.live");
        assert_eq!(session.principal, "userpass-deploy");
        assert_eq!(session.ttl_seconds, 1800);
        assert_eq!(vault.logins(), 0);
        assert_eq!(vault.lookups(), 1);
        assert!(prompter.asked.borrow().is_empty(), "reuse must not prompt");
    }

    #[tokio::test]
    async fn test_invalid_session_triggers_login() {
        let vault = FakeVault {
            valid_token: Some("s.live".to_string()),
            ..Default::default()
        };
        let prompter = ScriptedPrompter::new(&["pw"]);
        let auth = SessionAuthenticator::new(&vault, &prompter);

        let session = auth
            .ensure_session("deploy", Some(SecretString::new("s.stale")))
            .await
            .unwrap();

        assert_eq!(session.token().expose(), "issued");
        assert_eq!(session.principal, "deploy");
        assert!(session.expires_at().is_some());
        assert_eq!(vault.lookups(), 1);
        assert_eq!(vault.logins(), 1);
    }

    #[tokio::test]
    async fn test_raw_token_login_response() {
        let vault = FakeVault {
            login_body: Ok("s.raw\n".to_string()),
            ..Default::default()
        };
        let prompter = ScriptedPrompter::new(&["pw"]);
        let auth = SessionAuthenticator::new(&vault, &prompter).with_method("ldap");

        let session = auth.ensure_session("deploy", None).await.unwrap();
        assert_eq!(session.token().expose(), "s.raw");
        assert_eq!(session.expires_at(), None);
    }

    #[tokio::test]
    async fn test_null_token_is_authentication_failure() {
        let vault = FakeVault {
            login_body: Ok("null".to_string()),
            ..Default::default()
        };
        let prompter = ScriptedPrompter::new(&["pw"]);
        let auth = SessionAuthenticator::new(&vault, &prompter);

        let err = auth.ensure_session("deploy", None).await.unwrap_err();
        assert!(matches!(err, CredentialError::AuthenticationFailed { .. }));
    }

    #[tokio::test]
    async fn test_rejected_password_is_not_retried() {
        let vault = FakeVault {
            login_body: Err(403),
            ..Default::default()
        };
        let prompter = ScriptedPrompter::new(&["wrong", "right"]);
        let auth = SessionAuthenticator::new(&vault, &prompter);

        let err = auth.ensure_session("deploy", None).await.unwrap_err();
        assert!(matches!(err, CredentialError::AuthenticationFailed { .. }));
        assert!(err.hint().contains("-method=userpass"));
        assert_eq!(vault.logins(), 1);
        assert_eq!(prompter.asked.borrow().len(), 1);
    }

    #[tokio::test]
    async fn test_empty_password_fails_without_login() {
        let vault = FakeVault::default();
        let prompter = ScriptedPrompter::new(&[""]);
        let auth = SessionAuthenticator::new(&vault, &prompter).with_method("ldap");

        let err = auth.ensure_session("jane", None).await.unwrap_err();
        match err {
            CredentialError::AuthenticationFailed { ref method, .. } => assert_eq!(method, "ldap"),
            ref other => panic!("unexpected error: {other:?}"),
        }
        assert!(err.hint().contains("vault login -method=ldap username=jane"));
        assert_eq!(vault.logins(), 0);
    }
}
