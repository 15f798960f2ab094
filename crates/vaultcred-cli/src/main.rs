//! vaultcred - resolve provisioning credentials from Vault.
//!
//! Looks up the store address, login principal and secret path, reuses or
//! establishes a Vault session, reads the secret and prints the assembled
//! credentials for a downstream tool to consume.

mod output;

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Result};
use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use output::Format;
use vaultcred_core::api::{HttpVaultClient, VaultApi};
use vaultcred_core::assemble::settings;
use vaultcred_core::auth::PasswordSource;
use vaultcred_core::config::{ConfigFile, ConfigResolver};
use vaultcred_core::prompt::{NonInteractive, Prompter, TerminalPrompter};
use vaultcred_core::{AssemblyDefaults, CredentialAssembler, CredentialError, DEFAULT_USERNAME};

/// Application name used for the config directory
const APP_NAME: &str = "vaultcred";

/// Config file name
const CONFIG_FILE: &str = "vaultcred.conf";

#[derive(Debug, Parser)]
#[command(name = "vaultcred", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// `key = value` config file [default: <config dir>/vaultcred/vaultcred.conf]
    #[arg(long, global = true, env = "VAULTCRED_CONFIG")]
    config: Option<PathBuf>,

    /// Vault address (overrides VAULT_ADDR)
    #[arg(long, global = true)]
    addr: Option<String>,

    /// Vault login principal (overrides VAULT_USERNAME)
    #[arg(long, short = 'u', global = true)]
    username: Option<String>,

    /// Vault auth method mount
    #[arg(long, global = true)]
    auth_method: Option<String>,

    /// Secret path (overrides VAULT_SECRET_PATH)
    #[arg(long, global = true)]
    path: Option<String>,

    /// Override any setting; repeatable
    #[arg(long = "set", value_name = "NAME=VALUE", value_parser = parse_key_val, global = true)]
    set: Vec<(String, String)>,

    /// Never prompt; fail when a required setting is missing
    #[arg(long, global = true)]
    non_interactive: bool,

    /// Read the Vault login password from the first line of stdin
    #[arg(long, global = true)]
    password_stdin: bool,

    /// Output format
    #[arg(long, value_enum, default_value_t = Format::Env, global = true)]
    format: Format,

    /// Increase log verbosity (-v info, -vv debug); RUST_LOG takes precedence
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Also write logs to this file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Resolve endpoint, username and secret fields (default)
    Credentials {
        /// Secret path used when none is configured
        #[arg(long)]
        default_path: Option<String>,

        /// Endpoint used when neither the secret nor configuration has one
        #[arg(long)]
        default_endpoint: Option<String>,

        /// Username used when neither the secret nor configuration has one
        #[arg(long, default_value = DEFAULT_USERNAME)]
        default_username: String,
    },
    /// Print the fields of one secret
    Read {
        /// Secret path
        secret_path: String,
    },
    /// Check that the store is reachable and unsealed
    Status,
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=VALUE, got '{}'", s))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty setting name in '{}'", s));
    }
    Ok((key.to_string(), value.to_string()))
}

/// Initialize the tracing subscriber for logging
fn init_tracing(verbose: u8, log_file: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let (file_layer, guard) = match log_file {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let name = path
                .file_name()
                .ok_or_else(|| anyhow!("--log-file must name a file: {}", path.display()))?;
            let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(dir, name));
            (Some(fmt::layer().with_writer(writer).with_ansi(false)), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();
    Ok(guard)
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_NAME).join(CONFIG_FILE))
}

fn build_resolver(cli: &Cli) -> Result<ConfigResolver> {
    // With --password-stdin, stdin belongs to the password.
    let prompter: Box<dyn Prompter> = if cli.non_interactive || cli.password_stdin {
        Box::new(NonInteractive)
    } else {
        Box::new(TerminalPrompter)
    };

    let mut overrides = HashMap::new();
    for (name, value) in &cli.set {
        if name == settings::VAULT_TOKEN {
            bail!(
                "refusing to take {} from the command line where other processes can read it; \
                 export VAULT_TOKEN instead",
                settings::VAULT_TOKEN
            );
        }
        overrides.insert(name.clone(), value.clone());
    }
    let flags = [
        (settings::VAULT_ADDR, &cli.addr),
        (settings::VAULT_USERNAME, &cli.username),
        (settings::VAULT_AUTH_METHOD, &cli.auth_method),
        (settings::VAULT_SECRET_PATH, &cli.path),
    ];
    for (name, value) in flags {
        if let Some(value) = value {
            overrides.insert(name.to_string(), value.clone());
        }
    }

    let file = match &cli.config {
        Some(path) => ConfigFile::load(path)?,
        None => match default_config_path() {
            Some(path) => ConfigFile::load_if_exists(&path)?,
            None => ConfigFile::default(),
        },
    };

    Ok(ConfigResolver::new(prompter)
        .with_overrides(overrides)
        .with_config_file(file))
}

async fn run(cli: Cli) -> Result<()> {
    let resolver = build_resolver(&cli)?;
    let password_source = if cli.password_stdin {
        PasswordSource::Stdin
    } else {
        PasswordSource::Prompt
    };
    let assembler =
        CredentialAssembler::new(&resolver, HttpVaultClient::new).with_password_source(password_source);

    let command = cli.command.unwrap_or(Command::Credentials {
        default_path: None,
        default_endpoint: None,
        default_username: DEFAULT_USERNAME.to_string(),
    });

    match command {
        Command::Credentials {
            default_path,
            default_endpoint,
            default_username,
        } => {
            let defaults = AssemblyDefaults {
                secret_path: default_path,
                endpoint: default_endpoint,
                username: default_username,
            };
            let bundle = assembler.assemble(&defaults).await?;
            print!("{}", output::render_bundle(&bundle, cli.format));
        }
        Command::Read { secret_path } => {
            let (api, principal) = assembler.preflight().await?;
            let session = assembler.authenticate(&api, &principal).await?;
            let record = assembler.read_secret(&api, &session, &secret_path).await?;
            print!("{}", output::render_fields(record.fields(), cli.format));
        }
        Command::Status => {
            let api = assembler.connect().await?;
            println!("{}: reachable, unsealed", api.address());
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let guard = match init_tracing(cli.verbose, cli.log_file.as_deref()) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    };
    info!("vaultcred starting");

    let code = match run(cli).await {
        Ok(()) => 0,
        Err(e) => {
            error!(error = %e, "vaultcred failed");
            eprintln!("Error: {:#}", e);
            if let Some(err) = e.downcast_ref::<CredentialError>() {
                eprintln!("hint: {}", err.hint());
            }
            1
        }
    };

    // Flush the file writer before exiting.
    drop(guard);
    std::process::exit(code);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_key_val() {
        assert_eq!(
            parse_key_val("target_url=https://h/push?a=b").unwrap(),
            ("target_url".to_string(), "https://h/push?a=b".to_string())
        );
        assert!(parse_key_val("novalue").is_err());
        assert!(parse_key_val("=x").is_err());
    }

    #[test]
    fn test_cli_defaults_to_credentials() {
        let cli = Cli::try_parse_from(["vaultcred", "--addr", "https://v:8200"]).unwrap();
        assert!(cli.command.is_none());
        assert_eq!(cli.addr.as_deref(), Some("https://v:8200"));
        assert_eq!(cli.format, Format::Env);
    }

    #[test]
    fn test_cli_subcommand_with_global_flags() {
        let cli = Cli::try_parse_from([
            "vaultcred",
            "read",
            "secret/loki",
            "--format",
            "json",
            "--set",
            "vault_auth_method=ldap",
            "-vv",
        ])
        .unwrap();
        assert!(matches!(cli.command, Some(Command::Read { ref secret_path }) if secret_path == "secret/loki"));
        assert_eq!(cli.format, Format::Json);
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.set, vec![("vault_auth_method".to_string(), "ldap".to_string())]);
    }

    #[test]
    fn test_token_cannot_be_passed_on_command_line() {
        let cli = Cli::try_parse_from([
            "vaultcred",
            "--config",
            "/nonexistent/ignored",
            "--set",
            "vault_token=s.abc",
        ])
        .unwrap();
        let err = build_resolver(&cli).err().unwrap();
        assert!(err.to_string().contains("export VAULT_TOKEN"));
    }
}
