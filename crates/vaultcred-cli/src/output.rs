//! Rendering of resolved credentials for downstream tools.
//!
//! Output goes to stdout only; logs and prompts use stderr.

use std::collections::BTreeMap;

use clap::ValueEnum;
use vaultcred_core::config::env_var_name;
use vaultcred_core::CredentialBundle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Format {
    /// `KEY='value'` lines suitable for `eval` or an env file
    Env,
    /// A single JSON object
    Json,
}

/// Quote a value for POSIX shells.
fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

fn env_lines(pairs: impl IntoIterator<Item = (String, String)>) -> String {
    pairs
        .into_iter()
        .map(|(key, value)| format!("{}={}\n", key, shell_quote(&value)))
        .collect()
}

fn secret_pairs(fields: &BTreeMap<String, String>) -> impl Iterator<Item = (String, String)> + '_ {
    fields
        .iter()
        .map(|(key, value)| (format!("SECRET_{}", env_var_name(key)), value.clone()))
}

pub fn render_bundle(bundle: &CredentialBundle, format: Format) -> String {
    match format {
        Format::Env => {
            let head = [
                ("ENDPOINT".to_string(), bundle.endpoint().to_string()),
                ("USERNAME".to_string(), bundle.username().to_string()),
            ];
            env_lines(head.into_iter().chain(secret_pairs(bundle.secret_fields())))
        }
        Format::Json => {
            let value = serde_json::json!({
                "endpoint": bundle.endpoint(),
                "username": bundle.username(),
                "secret_fields": bundle.secret_fields(),
            });
            format!("{}\n", value)
        }
    }
}

pub fn render_fields(fields: &BTreeMap<String, String>, format: Format) -> String {
    match format {
        Format::Env => env_lines(secret_pairs(fields)),
        Format::Json => format!("{}\n", serde_json::json!(fields)),
    }
}
