use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Glob pattern (wrapper type for clarity).
/// Stored as a plain String, compiled by `PathFilter` at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Pattern(pub String);

/// One configured pairing of a local subtree with a remote subtree,
/// both relative to their respective roots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingConfig {
    pub local:  PathBuf,
    pub remote: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// `host` or `host:port`
    pub remote_host:      String,
    /// Empty means "the current local user".
    #[serde(default)]
    pub remote_username:  String,
    /// Empty means "key authentication, then prompt".
    #[serde(default)]
    pub remote_password:  String,
    pub local_root_path:  PathBuf,
    pub remote_root_path: String,
    #[serde(default)]
    pub ignore_patterns:  Vec<Pattern>,
    #[serde(default)]
    pub path_mappings:    Vec<MappingConfig>,
    /// Extra private key tried before the default `~/.ssh` keys.
    #[serde(default)]
    pub identity_file:    Option<PathBuf>,
    /// Allowed host key fingerprints (OpenSSH SHA256) or base64 keys.
    #[serde(default)]
    pub host_fingerprints: Option<Vec<String>>,
    /// Stop mirroring after this many failed operations in a row; 0 disables.
    #[serde(default)]
    pub max_consecutive_failures: u32,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("couldn't read configuration file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("configuration file {path} is invalid: {reason}")]
    Parse { path: PathBuf, reason: String },
    #[error("invalid ignore pattern {pattern:?}: {source}")]
    Pattern {
        pattern: String,
        source: globset::Error,
    },
    #[error("no remote_username configured and the local user name could not be determined")]
    Username,
}

impl Config {
    /// Read and parse a configuration file. `.json` files are parsed as JSON,
    /// everything else as YAML.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let ext = path.extension().and_then(|s| s.to_str()).unwrap_or("");
        Self::parse(&text, ext).map_err(|reason| ConfigError::Parse {
            path: path.to_path_buf(),
            reason,
        })
    }

    fn parse(text: &str, ext: &str) -> Result<Self, String> {
        match ext {
            "json" => serde_json::from_str(text).map_err(|e| e.to_string()),
            _ => serde_yaml::from_str(text).map_err(|e| e.to_string()),
        }
    }

    /// The configured user name, falling back to the local login name.
    pub fn username(&self) -> Result<String, ConfigError> {
        if !self.remote_username.is_empty() {
            return Ok(self.remote_username.clone());
        }
        whoami::fallible::username().map_err(|_| ConfigError::Username)
    }

    pub fn password(&self) -> Option<&str> {
        if self.remote_password.is_empty() {
            None
        } else {
            Some(&self.remote_password)
        }
    }

    pub fn escalation_threshold(&self) -> Option<u32> {
        (self.max_consecutive_failures > 0).then_some(self.max_consecutive_failures)
    }
}

/// Expand a leading `~` to the home directory and make the path absolute
/// against the current working directory.
pub fn expand_path(path: &Path) -> PathBuf {
    let expanded = match path.strip_prefix("~") {
        Ok(rest) => match dirs::home_dir() {
            Some(home) => home.join(rest),
            None => path.to_path_buf(),
        },
        Err(_) => path.to_path_buf(),
    };
    if expanded.is_absolute() {
        expanded
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(&expanded))
            .unwrap_or(expanded)
    }
}
