//! Engine configuration
//!
//! Read from `wikit.toml` in the user config directory (or an explicit path),
//! then overridden from the environment:
//!
//! ```toml
//! dict_dir = "/home/user/.local/share/wikit/dicts"
//! prefix_limit = 10
//! max_resident = 8
//! lazy_threshold = 33554432
//! ```

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

fn default_dict_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("wikit")
        .join("dicts")
}

fn default_prefix_limit() -> usize {
    10
}

fn default_lazy_threshold() -> u64 {
    32 << 20
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Directory holding one sub-directory per dictionary
    pub dict_dir: PathBuf,
    /// Maximum entries returned for a prefix match
    pub prefix_limit: usize,
    /// Cap on resident parsed dictionaries, unlimited when unset
    pub max_resident: Option<usize>,
    /// Data files larger than this many bytes are parsed lazily
    pub lazy_threshold: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            dict_dir: default_dict_dir(),
            prefix_limit: default_prefix_limit(),
            max_resident: None,
            lazy_threshold: default_lazy_threshold(),
        }
    }
}

impl EngineConfig {
    /// Default location of the config file
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("wikit").join("wikit.toml"))
    }

    /// Load the config file from its default location if present, then apply
    /// environment overrides
    pub fn load() -> Result<Self> {
        let mut config = match Self::default_path() {
            Some(path) if path.exists() => Self::from_path(&path)?,
            _ => Self::default(),
        };
        config.apply_env()?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        debug!(path = %path.display(), "loading config");
        let text = fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: EngineConfig = toml::from_str(text).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `WIKIT_*` environment overrides
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_vars(|name| env::var(name).ok())
    }

    fn apply_vars(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<()> {
        fn parse<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
            value
                .trim()
                .parse()
                .map_err(|_| Error::Config(format!("{} has invalid value {:?}", name, value)))
        }

        if let Some(dir) = var("WIKIT_DICT_DIR") {
            self.dict_dir = PathBuf::from(dir);
        }
        if let Some(v) = var("WIKIT_PREFIX_LIMIT") {
            self.prefix_limit = parse("WIKIT_PREFIX_LIMIT", &v)?;
        }
        if let Some(v) = var("WIKIT_MAX_RESIDENT") {
            self.max_resident = Some(parse("WIKIT_MAX_RESIDENT", &v)?);
        }
        if let Some(v) = var("WIKIT_LAZY_THRESHOLD") {
            self.lazy_threshold = parse("WIKIT_LAZY_THRESHOLD", &v)?;
        }
        self.validate()
    }

    fn validate(&self) -> Result<()> {
        if self.prefix_limit == 0 {
            return Err(Error::Config("prefix_limit must be at least 1".to_string()));
        }
        if self.max_resident == Some(0) {
            return Err(Error::Config("max_resident must be at least 1".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = EngineConfig::from_toml_str("prefix_limit = 5\n").unwrap();
        assert_eq!(config.prefix_limit, 5);
        assert_eq!(config.max_resident, None);
        assert_eq!(config.lazy_threshold, 32 << 20);
        assert!(config.dict_dir.ends_with("dicts"));
    }

    #[test]
    fn test_invalid_toml() {
        assert!(matches!(
            EngineConfig::from_toml_str("prefix_limit = \"many\""),
            Err(Error::Config(_))
        ));
        assert!(EngineConfig::from_toml_str("prefix_limit = 0").is_err());
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("WIKIT_DICT_DIR", "/srv/dicts"),
            ("WIKIT_PREFIX_LIMIT", "3"),
            ("WIKIT_MAX_RESIDENT", "2"),
        ]
        .into_iter()
        .collect();
        let mut config = EngineConfig::default();
        config
            .apply_vars(|name| vars.get(name).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.dict_dir, PathBuf::from("/srv/dicts"));
        assert_eq!(config.prefix_limit, 3);
        assert_eq!(config.max_resident, Some(2));

        let mut config = EngineConfig::default();
        assert!(config
            .apply_vars(|name| (name == "WIKIT_LAZY_THRESHOLD").then(|| "big".to_string()))
            .is_err());
    }
}
