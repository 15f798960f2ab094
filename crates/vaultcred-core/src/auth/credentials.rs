use std::io::{self, BufRead};

use serde::Deserialize;

use crate::error::CredentialError;
use crate::prompt::Prompter;
use crate::secret::SecretString;

/// Literal some login endpoints return in place of a missing token.
const NULL_TOKEN: &str = "null";

/// Where the login password comes from.
///
/// Neither variant accepts the password as a command-line argument, since
/// argument lists are readable by every process on the host.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PasswordSource {
    /// Hidden terminal prompt.
    #[default]
    Prompt,
    /// First line of standard input.
    Stdin,
}

impl PasswordSource {
    /// Read the password. An empty result is returned as-is; the caller
    /// decides how to report it.
    pub fn read(&self, prompter: &dyn Prompter, principal: &str) -> Result<SecretString, CredentialError> {
        let password = match self {
            PasswordSource::Prompt => prompter
                .prompt_hidden(&format!("Vault password for {}", principal))
                .map_err(|e| prompt_error(principal, e))?,
            PasswordSource::Stdin => {
                read_first_line(io::stdin().lock()).map_err(|e| prompt_error(principal, e))?
            }
        };
        Ok(SecretString::from(password))
    }
}

fn prompt_error(principal: &str, source: io::Error) -> CredentialError {
    CredentialError::Prompt {
        name: format!("password for {}", principal),
        source,
    }
}

fn read_first_line(mut reader: impl BufRead) -> io::Result<String> {
    let mut line = String::new();
    reader.read_line(&mut line)?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

/// A token issued by a login exchange.
#[derive(Debug)]
pub(crate) struct IssuedToken {
    pub token: SecretString,
    /// Zero when the response did not say.
    pub lease_duration: i64,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    auth: Option<LoginAuth>,
}

#[derive(Debug, Deserialize)]
struct LoginAuth {
    client_token: Option<String>,
    #[serde(default)]
    lease_duration: i64,
}

/// Pull the session token out of a login response body.
///
/// Bodies starting with `{` are structured (`{"auth":{"client_token":..}}`);
/// anything else is taken as the raw token text.
pub(crate) fn extract_token(body: &str) -> Result<IssuedToken, String> {
    let body = body.trim();

    let (token, lease_duration) = if body.starts_with('{') {
        let response: LoginResponse = serde_json::from_str(body)
            .map_err(|e| format!("unparseable login response: {}", e))?;
        let auth = response
            .auth
            .ok_or_else(|| "login response has no 'auth' block".to_string())?;
        (auth.client_token.unwrap_or_default(), auth.lease_duration)
    } else {
        (body.to_string(), 0)
    };

    if token.is_empty() || token == NULL_TOKEN {
        return Err("store returned no client token".to_string());
    }

    Ok(IssuedToken {
        token: SecretString::from(token),
        lease_duration,
    })
}
