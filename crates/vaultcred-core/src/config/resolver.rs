use std::collections::HashMap;
use std::fmt;

use tracing::debug;

use super::ConfigFile;
use crate::error::CredentialError;
use crate::prompt::Prompter;

/// Where a resolved setting came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingSource {
    Override,
    Environment,
    ConfigFile,
    Default,
    Prompt,
}

#[derive(Clone, PartialEq, Eq)]
pub struct ResolvedSetting {
    pub name: String,
    pub value: String,
    pub source: SettingSource,
    sensitive: bool,
}

impl ResolvedSetting {
    pub fn is_sensitive(&self) -> bool {
        self.sensitive
    }
}

impl fmt::Debug for ResolvedSetting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = if self.sensitive { "[REDACTED]" } else { self.value.as_str() };
        f.debug_struct("ResolvedSetting")
            .field("name", &self.name)
            .field("value", &value)
            .field("source", &self.source)
            .finish()
    }
}

/// How a single setting should be looked up.
#[derive(Debug, Clone, Copy)]
pub struct SettingSpec<'a> {
    pub name: &'a str,
    pub default: Option<&'a str>,
    /// Prompt text. A setting with a prompt is required.
    pub prompt: Option<&'a str>,
    pub sensitive: bool,
}

impl<'a> SettingSpec<'a> {
    pub fn required(name: &'a str, prompt: &'a str) -> Self {
        Self {
            name,
            default: None,
            prompt: Some(prompt),
            sensitive: false,
        }
    }

    pub fn optional(name: &'a str) -> Self {
        Self {
            name,
            default: None,
            prompt: None,
            sensitive: false,
        }
    }

    pub fn with_default(mut self, default: &'a str) -> Self {
        self.default = Some(default);
        self
    }

    pub fn sensitive(mut self) -> Self {
        self.sensitive = true;
        self
    }
}

/// Environment variable name for a setting: uppercase, with every
/// non-alphanumeric character replaced by `_`.
pub fn env_var_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}

enum Environment {
    Process,
    Fixed(HashMap<String, String>),
}

impl Environment {
    fn get(&self, key: &str) -> Option<String> {
        match self {
            Environment::Process => std::env::var(key).ok(),
            Environment::Fixed(vars) => vars.get(key).cloned(),
        }
    }
}

/// Resolves named settings by fixed precedence:
/// override, environment, config file, default, then prompt.
///
/// Empty values count as absent at every tier.
pub struct ConfigResolver {
    overrides: HashMap<String, String>,
    env: Environment,
    file: ConfigFile,
    prompter: Box<dyn Prompter>,
}

impl ConfigResolver {
    pub fn new(prompter: Box<dyn Prompter>) -> Self {
        Self {
            overrides: HashMap::new(),
            env: Environment::Process,
            file: ConfigFile::default(),
            prompter,
        }
    }

    pub fn with_overrides(mut self, overrides: HashMap<String, String>) -> Self {
        self.overrides = overrides;
        self
    }

    pub fn with_override(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.overrides.insert(name.into(), value.into());
        self
    }

    pub fn with_config_file(mut self, file: ConfigFile) -> Self {
        self.file = file;
        self
    }

    /// Replace the process environment with a fixed set of variables.
    pub fn with_env(mut self, vars: HashMap<String, String>) -> Self {
        self.env = Environment::Fixed(vars);
        self
    }

    pub fn prompter(&self) -> &dyn Prompter {
        self.prompter.as_ref()
    }

    /// Resolve a setting that must produce a value.
    pub fn resolve(&self, spec: SettingSpec<'_>) -> Result<ResolvedSetting, CredentialError> {
        self.lookup(spec)?
            .ok_or_else(|| CredentialError::MissingRequiredSetting {
                name: spec.name.to_string(),
                env_var: env_var_name(spec.name),
            })
    }

    /// Resolve a setting, returning `None` when an optional setting has no
    /// value anywhere. Required settings never return `None`; they prompt
    /// and fail on empty input instead.
    pub fn lookup(&self, spec: SettingSpec<'_>) -> Result<Option<ResolvedSetting>, CredentialError> {
        let found = self
            .from_non_interactive(&spec)
            .map(Ok)
            .or_else(|| self.from_prompt(&spec));

        let resolved = match found {
            Some(result) => {
                let (value, source) = result?;
                Some(ResolvedSetting {
                    name: spec.name.to_string(),
                    value,
                    source,
                    sensitive: spec.sensitive,
                })
            }
            None => None,
        };

        match &resolved {
            Some(setting) => {
                let shown = if spec.sensitive { "[REDACTED]" } else { setting.value.as_str() };
                debug!(setting = spec.name, source = ?setting.source, value = shown, "Resolved setting");
            }
            None => debug!(setting = spec.name, "Optional setting not set"),
        }
        Ok(resolved)
    }

    fn from_non_interactive(&self, spec: &SettingSpec<'_>) -> Option<(String, SettingSource)> {
        if let Some(value) = self.overrides.get(spec.name).filter(|v| !v.is_empty()) {
            return Some((value.clone(), SettingSource::Override));
        }
        if let Some(value) = self.env.get(&env_var_name(spec.name)).filter(|v| !v.is_empty()) {
            return Some((value, SettingSource::Environment));
        }
        if let Some(value) = self.file.get(spec.name).filter(|v| !v.is_empty()) {
            return Some((value.to_string(), SettingSource::ConfigFile));
        }
        spec.default
            .filter(|v| !v.is_empty())
            .map(|v| (v.to_string(), SettingSource::Default))
    }

    fn from_prompt(
        &self,
        spec: &SettingSpec<'_>,
    ) -> Option<Result<(String, SettingSource), CredentialError>> {
        let text = spec.prompt?;
        let answer = if spec.sensitive {
            self.prompter.prompt_hidden(text)
        } else {
            self.prompter.prompt(text)
        };

        Some(match answer {
            Ok(value) if !value.is_empty() => Ok((value, SettingSource::Prompt)),
            Ok(_) => Err(CredentialError::MissingRequiredSetting {
                name: spec.name.to_string(),
                env_var: env_var_name(spec.name),
            }),
            Err(e) => Err(CredentialError::Prompt {
                name: spec.name.to_string(),
                source: e,
            }),
        })
    }
}
