//! Configuration management for solod.
use regex::{Captures, Regex};
use serde::Deserialize;
use std::{
    collections::HashMap,
    env, fs,
    path::{Path, PathBuf},
};
use tracing::{error, warn};

use crate::error::ServiceError;

/// Describes a single self-daemonized service.
#[derive(Debug, Deserialize, Clone)]
pub struct ServiceConfig {
    /// Service identity name. Used to derive default lock file paths.
    pub name: String,
    /// Optional human-friendly name.
    pub display_name: Option<String>,
    /// Executable that becomes the daemon image.
    pub executable: String,
    /// Arguments passed after the executable path.
    #[serde(default)]
    pub arguments: Vec<String>,
    /// Extra environment for the daemon.
    pub env: Option<EnvConfig>,
    /// Explicit identity lock file path.
    pub lock_file: Option<String>,
    /// Explicit operations lock file path.
    pub operations_lock_file: Option<String>,
    /// Base directory for relative paths. Set to the config file's directory when loaded from disk.
    pub working_dir: Option<String>,
}

/// Represents environment variables for a service.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct EnvConfig {
    /// Optional path to an environment file.
    pub file: Option<String>,
    /// Key-value pairs of environment variables.
    pub vars: Option<HashMap<String, String>>,
}

impl EnvConfig {
    /// Resolves the full path to the env file based on a base directory.
    pub fn path(&self, base: &Path) -> Option<PathBuf> {
        self.file.as_ref().map(|f| {
            let path = Path::new(f);
            if path.is_absolute() {
                path.to_path_buf()
            } else {
                base.join(path)
            }
        })
    }
}

impl ServiceConfig {
    /// Creates a config with no arguments, environment or path overrides.
    pub fn new(name: impl Into<String>, executable: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            display_name: None,
            executable: executable.into(),
            arguments: Vec::new(),
            env: None,
            lock_file: None,
            operations_lock_file: None,
            working_dir: None,
        }
    }

    /// Sets the arguments passed to the executable.
    pub fn with_arguments<I, S>(mut self, arguments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.arguments = arguments.into_iter().map(Into::into).collect();
        self
    }

    /// Adds one inline environment variable.
    pub fn with_env_var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env
            .get_or_insert_with(EnvConfig::default)
            .vars
            .get_or_insert_with(HashMap::new)
            .insert(key.into(), value.into());
        self
    }

    /// Overrides the identity lock file path.
    pub fn with_lock_file(mut self, path: impl AsRef<Path>) -> Self {
        self.lock_file = Some(path.as_ref().to_string_lossy().into_owned());
        self
    }

    /// Overrides the operations lock file path.
    pub fn with_operations_lock_file(mut self, path: impl AsRef<Path>) -> Self {
        self.operations_lock_file = Some(path.as_ref().to_string_lossy().into_owned());
        self
    }

    /// Base directory for relative paths; falls back to the current directory.
    pub fn base_dir(&self) -> PathBuf {
        match &self.working_dir {
            Some(dir) => PathBuf::from(dir),
            None => env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        }
    }

    /// Builds the configured environment, giving inline `env.vars` precedence over entries
    /// loaded from `env.file`.
    pub fn configured_env(&self) -> HashMap<String, String> {
        let mut resolved = HashMap::new();

        let Some(env_config) = &self.env else {
            return resolved;
        };

        if let Some(file_path) = env_config.path(&self.base_dir()) {
            match fs::read_to_string(&file_path) {
                Ok(content) => {
                    for (key, value) in parse_env_file(&content, &self.name) {
                        resolved.entry(key).or_insert(value);
                    }
                }
                Err(err) => {
                    error!(
                        "Failed to read env file {} for '{}': {}",
                        file_path.display(),
                        self.name,
                        err
                    );
                }
            }
        }

        if let Some(vars) = &env_config.vars {
            for (key, value) in vars {
                resolved.insert(key.clone(), value.clone());
            }
        }

        resolved
    }
}

/// Parses dotenv-style content into key/value pairs.
fn parse_env_file(content: &str, service_name: &str) -> Vec<(String, String)> {
    let mut entries = Vec::new();
    for raw_line in content.lines() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        if let Some((key, value)) = line.split_once('=') {
            let key = key.trim().to_string();
            let mut value = value.trim();

            if value.len() >= 2 && value.starts_with('"') && value.ends_with('"') {
                value = &value[1..value.len() - 1];
            }

            entries.push((key, value.to_string()));
        } else {
            warn!("Ignoring malformed line in env file for '{service_name}': {line}");
        }
    }
    entries
}

/// Expands `$VAR` and `${VAR}` references using the supplied lookup.
fn expand_env_vars<F>(input: &str, lookup: F) -> Result<String, ServiceError>
where
    F: Fn(&str) -> Option<String>,
{
    let re = Regex::new(r"\$\{?([A-Za-z_][A-Za-z0-9_]*)\}?").expect("static regex");
    let mut missing = None;
    let result = re.replace_all(input, |caps: &Captures| {
        let var_name = &caps[1];
        match lookup(var_name) {
            Some(value) => value,
            None => {
                missing.get_or_insert_with(|| var_name.to_string());
                String::new()
            }
        }
    });

    match missing {
        Some(name) => Err(ServiceError::MissingEnvVar { name }),
        None => Ok(result.into_owned()),
    }
}

/// Loads and parses a service configuration file, expanding environment variables.
pub fn load_config(config_path: &Path) -> Result<ServiceConfig, ServiceError> {
    let content = fs::read_to_string(config_path).map_err(|source| ServiceError::ConfigRead {
        path: config_path.to_path_buf(),
        source,
    })?;

    let expanded = expand_env_vars(&content, |name| env::var(name).ok())?;
    let mut config: ServiceConfig = serde_yaml::from_str(&expanded)?;

    let base_path = config_path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let base_path = base_path
        .canonicalize()
        .unwrap_or_else(|_| base_path.to_path_buf());

    config.working_dir = Some(match config.working_dir.take() {
        Some(dir) if Path::new(&dir).is_absolute() => dir,
        Some(dir) => base_path.join(dir).to_string_lossy().into_owned(),
        None => base_path.to_string_lossy().into_owned(),
    });

    Ok(config)
}
