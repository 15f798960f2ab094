//! Setting resolution.
//!
//! Every value the cascade needs is looked up by name through
//! `ConfigResolver`, which walks a fixed precedence order:
//! - explicit override (command line)
//! - process environment (`VAULT_ADDR` for `vault_addr`)
//! - `key = value` config file
//! - caller-supplied default
//! - interactive prompt (required settings only)

pub mod file;
pub mod resolver;

pub use file::ConfigFile;
pub use resolver::{env_var_name, ConfigResolver, ResolvedSetting, SettingSource, SettingSpec};
