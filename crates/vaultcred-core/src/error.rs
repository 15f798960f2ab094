use thiserror::Error;

/// Every way the credential cascade can fail.
///
/// All variants are terminal for the current invocation. None of them is
/// retried automatically; each carries a corrective hint via [`hint`].
///
/// [`hint`]: CredentialError::hint
#[derive(Error, Debug)]
pub enum CredentialError {
    #[error("Missing required setting '{name}'")]
    MissingRequiredSetting { name: String, env_var: String },

    #[error("Vault at {addr} is unreachable: {reason}")]
    StoreUnreachable { addr: String, reason: String },

    #[error("Vault at {addr} is sealed")]
    StoreSealed { addr: String },

    #[error("Authentication failed for '{principal}' via {method}: {reason}")]
    AuthenticationFailed {
        principal: String,
        method: String,
        reason: String,
    },

    #[error("Secret not found at '{path}': {reason}")]
    SecretNotFound { path: String, reason: String },

    #[error("Secret at '{path}' is malformed: {reason}")]
    SecretMalformed { path: String, reason: String },

    #[error("Failed to read input for '{name}': {source}")]
    Prompt {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read config file {path}: {source}")]
    Config {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl CredentialError {
    /// Remediation the operator can act on directly.
    pub fn hint(&self) -> String {
        match self {
            CredentialError::MissingRequiredSetting { name, env_var } => format!(
                "set {env_var} in the environment, add `{name} = <value>` to the config file, \
                 or pass --set {name}=<value>"
            ),
            CredentialError::StoreUnreachable { addr, .. } => format!(
                "check that VAULT_ADDR is correct and reachable: curl -s {addr}/v1/sys/health"
            ),
            CredentialError::StoreSealed { addr } => format!(
                "unseal the store before retrying: VAULT_ADDR={addr} vault operator unseal"
            ),
            CredentialError::AuthenticationFailed { principal, method, .. } => format!(
                "verify the password by logging in manually: \
                 vault login -method={method} username={principal}"
            ),
            CredentialError::SecretNotFound { path, .. } => format!(
                "confirm the path exists and your policy can read it: vault kv get {path}"
            ),
            CredentialError::SecretMalformed { path, .. } => format!(
                "add the missing field: vault kv patch {path} password=<value>"
            ),
            CredentialError::Prompt { name, .. } => format!(
                "run from an interactive terminal or supply '{name}' via the environment"
            ),
            CredentialError::Config { path, .. } => {
                format!("check that {path} exists and is readable")
            }
        }
    }
}
