//! Credential assembly.
//!
//! `CredentialAssembler` drives the whole cascade: resolve where the store
//! is and who to log in as, confirm the store is usable, obtain a session,
//! read the target secret, then fill endpoint and username from the secret
//! or the resolver. The password only ever comes from the secret.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use tracing::{debug, info, warn};

use crate::api::{ApiError, VaultApi};
use crate::auth::{PasswordSource, Session, SessionAuthenticator, DEFAULT_AUTH_METHOD};
use crate::config::{ConfigResolver, SettingSource, SettingSpec};
use crate::error::CredentialError;
use crate::secret::SecretString;
use crate::secrets::{SecretRecord, SecretStoreClient};

/// Username used when neither the secret nor configuration names one.
pub const DEFAULT_USERNAME: &str = "promtail";

/// Token helper file written by the `vault` CLI.
const TOKEN_HELPER_FILE: &str = ".vault-token";

/// Secret field that overrides the configured endpoint.
const SECRET_URL_FIELD: &str = "url";

/// Secret field that overrides the configured username.
const SECRET_USERNAME_FIELD: &str = "username";

/// Setting names consumed by the cascade.
pub mod settings {
    pub const VAULT_ADDR: &str = "vault_addr";
    pub const VAULT_USERNAME: &str = "vault_username";
    pub const VAULT_AUTH_METHOD: &str = "vault_auth_method";
    pub const VAULT_TOKEN: &str = "vault_token";
    pub const VAULT_SECRET_PATH: &str = "vault_secret_path";
    pub const TARGET_URL: &str = "target_url";
    pub const TARGET_USERNAME: &str = "target_username";
}

/// Caller-supplied fallbacks, used only when no higher tier has a value.
#[derive(Debug, Clone)]
pub struct AssemblyDefaults {
    pub secret_path: Option<String>,
    pub endpoint: Option<String>,
    pub username: String,
}

impl Default for AssemblyDefaults {
    fn default() -> Self {
        Self {
            secret_path: None,
            endpoint: None,
            username: DEFAULT_USERNAME.to_string(),
        }
    }
}

/// Connection parameters handed to the downstream consumer.
#[derive(Clone)]
pub struct CredentialBundle {
    endpoint: String,
    username: String,
    secret_fields: BTreeMap<String, String>,
}

impl CredentialBundle {
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn secret_fields(&self) -> &BTreeMap<String, String> {
        &self.secret_fields
    }

    pub fn password(&self) -> &str {
        self.secret_fields
            .get(crate::secrets::PASSWORD_FIELD)
            .map(String::as_str)
            .unwrap_or_default()
    }
}

impl fmt::Debug for CredentialBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialBundle")
            .field("endpoint", &self.endpoint)
            .field("username", &self.username)
            .field("secret_fields", &self.secret_fields.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Runs the cascade against a store reached through `connect`.
pub struct CredentialAssembler<'r, F> {
    resolver: &'r ConfigResolver,
    connect: F,
    password_source: PasswordSource,
    token_helper: Option<PathBuf>,
}

impl<'r, A, F> CredentialAssembler<'r, F>
where
    A: VaultApi,
    F: Fn(&str) -> Result<A, ApiError>,
{
    pub fn new(resolver: &'r ConfigResolver, connect: F) -> Self {
        Self {
            resolver,
            connect,
            password_source: PasswordSource::default(),
            token_helper: dirs::home_dir().map(|home| home.join(TOKEN_HELPER_FILE)),
        }
    }

    pub fn with_password_source(mut self, source: PasswordSource) -> Self {
        self.password_source = source;
        self
    }

    /// Token helper file consulted when no token setting is present.
    /// `None` disables the lookup.
    pub fn with_token_helper(mut self, path: Option<PathBuf>) -> Self {
        self.token_helper = path;
        self
    }

    fn address(&self) -> Result<String, CredentialError> {
        Ok(self
            .resolver
            .resolve(SettingSpec::required(settings::VAULT_ADDR, "Vault address"))?
            .value)
    }

    fn principal(&self) -> Result<String, CredentialError> {
        Ok(self
            .resolver
            .resolve(SettingSpec::required(settings::VAULT_USERNAME, "Vault username"))?
            .value)
    }

    /// Resolve the store address, connect, and fail fast if the store is
    /// unreachable or sealed.
    pub async fn connect(&self) -> Result<A, CredentialError> {
        let addr = self.address()?;
        self.open(addr).await
    }

    /// Resolve the store address and login principal, then confirm the
    /// store is usable. Returns the connection and the principal.
    pub async fn preflight(&self) -> Result<(A, String), CredentialError> {
        let addr = self.address()?;
        let principal = self.principal()?;
        Ok((self.open(addr).await?, principal))
    }

    async fn open(&self, addr: String) -> Result<A, CredentialError> {
        let api = (self.connect)(&addr).map_err(|e| CredentialError::StoreUnreachable {
            addr: addr.clone(),
            reason: e.to_string(),
        })?;

        let status = api
            .seal_status()
            .await
            .map_err(|e| CredentialError::StoreUnreachable {
                addr: addr.clone(),
                reason: e.to_string(),
            })?;
        if status.sealed {
            warn!(addr = %addr, "Vault is sealed");
            return Err(CredentialError::StoreSealed { addr });
        }

        debug!(addr = %addr, "Vault reachable and unsealed");
        Ok(api)
    }

    /// Obtain a session for `principal`, reusing an existing token when the
    /// store accepts it.
    pub async fn authenticate(&self, api: &A, principal: &str) -> Result<Session, CredentialError> {
        let method = self
            .resolver
            .resolve(SettingSpec::optional(settings::VAULT_AUTH_METHOD).with_default(DEFAULT_AUTH_METHOD))?
            .value;

        SessionAuthenticator::new(api, self.resolver.prompter())
            .with_method(method)
            .with_password_source(self.password_source)
            .ensure_session(principal, self.candidate_token()?)
            .await
    }

    fn candidate_token(&self) -> Result<Option<SecretString>, CredentialError> {
        let setting = self
            .resolver
            .lookup(SettingSpec::optional(settings::VAULT_TOKEN).sensitive())?;
        if let Some(setting) = setting {
            return Ok(Some(SecretString::from(setting.value)));
        }

        let Some(path) = self.token_helper.as_ref().filter(|p| p.exists()) else {
            return Ok(None);
        };
        match std::fs::read_to_string(path) {
            Ok(contents) => {
                debug!(path = %path.display(), "Using token from token helper file");
                Ok(Some(SecretString::new(contents.trim())))
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read token helper file");
                Ok(None)
            }
        }
    }

    /// Read one secret with an established session.
    pub async fn read_secret(
        &self,
        api: &A,
        session: &Session,
        path: &str,
    ) -> Result<SecretRecord, CredentialError> {
        SecretStoreClient::new(api, session).read_secret(path).await
    }

    /// Run the full cascade.
    pub async fn assemble(&self, defaults: &AssemblyDefaults) -> Result<CredentialBundle, CredentialError> {
        let (api, principal) = self.preflight().await?;
        let session = self.authenticate(&api, &principal).await?;

        let mut path_spec = SettingSpec::required(settings::VAULT_SECRET_PATH, "Vault secret path");
        if let Some(default) = defaults.secret_path.as_deref() {
            path_spec = path_spec.with_default(default);
        }
        let path = self.resolver.resolve(path_spec)?.value;
        let record = self.read_secret(&api, &session, &path).await?;

        let endpoint = match record.get(SECRET_URL_FIELD) {
            Some(url) => url.to_string(),
            None => {
                let mut spec = SettingSpec::required(settings::TARGET_URL, "Endpoint URL");
                if let Some(default) = defaults.endpoint.as_deref() {
                    spec = spec.with_default(default);
                }
                self.resolver.resolve(spec)?.value
            }
        };

        let username = match record.get(SECRET_USERNAME_FIELD) {
            Some(username) => username.to_string(),
            None => {
                let setting = self.resolver.resolve(
                    SettingSpec::required(settings::TARGET_USERNAME, "Endpoint username")
                        .with_default(&defaults.username),
                )?;
                if setting.source == SettingSource::Default {
                    warn!(
                        username = %setting.value,
                        path = %record.path,
                        "No username in secret or configuration, using default; set target_username to silence"
                    );
                }
                setting.value
            }
        };

        info!(
            endpoint = %endpoint,
            username = %username,
            path = %record.path,
            fields = ?record.field_names(),
            "Credentials assembled"
        );

        Ok(CredentialBundle {
            endpoint,
            username,
            secret_fields: record.into_fields(),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::auth::session::testing::FakeVault;
    use crate::config::ConfigFile;
    use crate::prompt::testing::ScriptedPrompter;
    use crate::prompt::NonInteractive;

    /// Shares one fake between the test and the assembler.
    struct Shared(Arc<FakeVault>);

    #[async_trait::async_trait]
    impl VaultApi for Shared {
        fn address(&self) -> &str {
            self.0.address()
        }
        async fn seal_status(&self) -> Result<crate::api::SealStatus, ApiError> {
            self.0.seal_status().await
        }
        async fn lookup_self(&self, token: &SecretString) -> Result<crate::api::TokenInfo, ApiError> {
            self.0.lookup_self(token).await
        }
        async fn login(&self, method: &str, principal: &str, password: &SecretString) -> Result<String, ApiError> {
            self.0.login(method, principal, password).await
        }
        async fn read(&self, token: &SecretString, path: &str) -> Result<serde_json::Value, ApiError> {
            self.0.read(token, path).await
        }
    }

    fn resolver(prompter: ScriptedPrompter, file: &str) -> ConfigResolver {
        ConfigResolver::new(Box::new(prompter))
            .with_env(HashMap::new())
            .with_config_file(ConfigFile::parse(file))
    }

    fn vault_with(path: &str, body: serde_json::Value) -> Arc<FakeVault> {
        let mut vault = FakeVault::default();
        vault.secrets.insert(path.to_string(), body);
        Arc::new(vault)
    }

    const FILE: &str = "vault_addr = https://v:8200\nvault_username = deploy\nvault_secret_path = secret/loki\n";

    #[tokio::test]
    async fn test_secret_fields_win_over_configuration() {
        let vault = vault_with(
            "secret/data/loki",
            json!({"data": {"data": {"password": "p", "url": "https://from-secret", "username": "svc"}}}),
        );
        let resolver = resolver(
            ScriptedPrompter::new(&["pw"]),
            &format!("{FILE}target_url = https://from-file\ntarget_username = file-user\n"),
        );
        let handle = vault.clone();
        let assembler = CredentialAssembler::new(&resolver, move |_: &str| Ok(Shared(handle.clone())))
            .with_token_helper(None);

        let bundle = assembler.assemble(&AssemblyDefaults::default()).await.unwrap();
        assert_eq!(bundle.endpoint(), "https://from-secret");
        assert_eq!(bundle.username(), "svc");
        assert_eq!(bundle.password(), "p");
    }

    #[tokio::test]
    async fn test_configuration_fills_missing_secret_fields() {
        let vault = vault_with("secret/data/loki", json!({"data": {"data": {"password": "p"}}}));
        let resolver = resolver(
            ScriptedPrompter::new(&["pw"]),
            &format!("{FILE}target_url = https://from-file\n"),
        );
        let handle = vault.clone();
        let assembler = CredentialAssembler::new(&resolver, move |_: &str| Ok(Shared(handle.clone())))
            .with_token_helper(None);

        let bundle = assembler.assemble(&AssemblyDefaults::default()).await.unwrap();
        assert_eq!(bundle.endpoint(), "https://from-file");
        assert_eq!(bundle.username(), DEFAULT_USERNAME);
    }

    #[tokio::test]
    async fn test_sealed_store_fails_before_login() {
        let vault = Arc::new(FakeVault {
            sealed: true,
            ..Default::default()
        });
        let resolver = resolver(ScriptedPrompter::new(&["pw"]), FILE);
        let handle = vault.clone();
        let assembler = CredentialAssembler::new(&resolver, move |_: &str| Ok(Shared(handle.clone())))
            .with_token_helper(None);

        let err = assembler.assemble(&AssemblyDefaults::default()).await.unwrap_err();
        assert!(matches!(err, CredentialError::StoreSealed { .. }));
        assert_eq!(vault.logins(), 0);
        assert_eq!(vault.lookups(), 0);
    }

    #[tokio::test]
    async fn test_missing_principal_reported_before_seal_check() {
        let vault = Arc::new(FakeVault {
            sealed: true,
            ..Default::default()
        });
        let resolver = ConfigResolver::new(Box::new(NonInteractive))
            .with_env(HashMap::new())
            .with_config_file(ConfigFile::parse("vault_addr = https://v:8200\n"));
        let handle = vault.clone();
        let assembler = CredentialAssembler::new(&resolver, move |_: &str| Ok(Shared(handle.clone())))
            .with_token_helper(None);

        let err = assembler.assemble(&AssemblyDefaults::default()).await.unwrap_err();
        assert!(matches!(err, CredentialError::MissingRequiredSetting { ref name, .. } if name == "vault_username"));
        assert_eq!(vault.status_calls.load(std::sync::atomic::Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_reuses_token_from_setting() {
        let mut fake = FakeVault {
            valid_token: Some("s.live".to_string()),
            ..Default::default()
        };
        fake.secrets.insert(
            "secret/data/loki".to_string(),
            json!({"data": {"data": {"password": "p"}}}),
        );
        let vault = Arc::new(fake);
        let resolver = resolver(ScriptedPrompter::default(), FILE).with_override(settings::VAULT_TOKEN, "s.live");
        let handle = vault.clone();
        let assembler = CredentialAssembler::new(&resolver, move |_: &str| Ok(Shared(handle.clone())))
            .with_token_helper(None)
            .with_password_source(PasswordSource::Prompt);

        let defaults = AssemblyDefaults {
            endpoint: Some("https://default".to_string()),
            ..Default::default()
        };
        let bundle = assembler.assemble(&defaults).await.unwrap();
        assert_eq!(bundle.endpoint(), "https://default");
        assert_eq!(vault.logins(), 0);
    }

    #[tokio::test]
    async fn test_reuses_token_from_helper_file() {
        let dir = tempfile::tempdir().unwrap();
        let helper = dir.path().join(".vault-token");
        std::fs::write(&helper, "s.live\n").unwrap();

        let mut fake = FakeVault {
            valid_token: Some("s.live".to_string()),
            ..Default::default()
        };
        fake.secrets.insert(
            "secret/data/loki".to_string(),
            json!({"data": {"data": {"password": "p", "url": "u"}}}),
        );
        let vault = Arc::new(fake);
        let resolver = resolver(ScriptedPrompter::default(), FILE);
        let handle = vault.clone();
        let assembler = CredentialAssembler::new(&resolver, move |_: &str| Ok(Shared(handle.clone())))
            .with_token_helper(Some(helper));

        assembler.assemble(&AssemblyDefaults::default()).await.unwrap();
        assert_eq!(vault.logins(), 0);
        assert_eq!(vault.lookups(), 1);
    }

    #[tokio::test]
    async fn test_missing_address_in_automation() {
        let resolver = ConfigResolver::new(Box::new(NonInteractive)).with_env(HashMap::new());
        let assembler = CredentialAssembler::new(&resolver, |_: &str| Ok(FakeVault::default()))
            .with_token_helper(None);

        let err = assembler.assemble(&AssemblyDefaults::default()).await.unwrap_err();
        assert!(matches!(err, CredentialError::MissingRequiredSetting { ref name, .. } if name == "vault_addr"));
    }

    #[tokio::test]
    async fn test_rejected_address_is_unreachable() {
        let resolver = resolver(ScriptedPrompter::default(), FILE);
        let assembler = CredentialAssembler::new(&resolver, |addr: &str| {
            Err::<FakeVault, _>(ApiError::InsecureAddress(addr.to_string()))
        });

        let err = assembler.connect().await.unwrap_err();
        assert!(matches!(err, CredentialError::StoreUnreachable { .. }));
    }

    #[test]
    fn test_bundle_debug_hides_secret_values() {
        let bundle = CredentialBundle {
            endpoint: "https://e".to_string(),
            username: "u".to_string(),
            secret_fields: [("password".to_string(), "hunter2".to_string())].into(),
        };
        let debug = format!("{:?}", bundle);
        assert!(debug.contains("password"));
        assert!(!debug.contains("hunter2"));
    }
}
