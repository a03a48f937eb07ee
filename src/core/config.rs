//! Toolkit configuration.
//!
//! A small TOML file with four sections. Every field has a default, so an
//! empty file (or no file) gives the stock timeouts and endpoints.
//!
//! ```toml
//! [http]
//! timeout_secs = 10
//!
//! [translator]
//! deepl_api_key = "..."
//!
//! [lora]
//! database_path = "lora_info.json"
//! ```

use crate::core::error::{UtkError, UtkResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

/// Environment variable naming a config file to load on first use.
pub const CONFIG_ENV: &str = "UTK_CONFIG";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ToolkitConfig {
    pub http: HttpConfig,
    pub translator: TranslatorConfig,
    pub lora: LoraConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HttpConfig {
    /// Timeout for translator and catalog requests
    pub timeout_secs: u64,
    /// Timeout for the image-generation POST
    pub image_post_timeout_secs: u64,
    /// Timeout for downloading a generated image
    pub image_download_timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            image_post_timeout_secs: 60,
            image_download_timeout_secs: 30,
        }
    }
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn image_post_timeout(&self) -> Duration {
        Duration::from_secs(self.image_post_timeout_secs)
    }

    pub fn image_download_timeout(&self) -> Duration {
        Duration::from_secs(self.image_download_timeout_secs)
    }
}

/// Default keys for the paid translators; a key passed to the node wins.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TranslatorConfig {
    pub deepl_api_key: Option<String>,
    pub azure_api_key: Option<String>,
    pub azure_region: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoraConfig {
    /// Side-car JSON file holding cached catalog records
    pub database_path: PathBuf,
    /// Root of the remote catalog API
    pub catalog_base_url: String,
    /// Directory searched for LoRA files given by bare name
    pub lora_dir: Option<PathBuf>,
}

impl Default for LoraConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("lora_info.json"),
            catalog_base_url: "https://civitai.com/api/v1".to_string(),
            lora_dir: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter when RUST_LOG is unset
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl ToolkitConfig {
    pub fn from_toml_str(text: &str) -> UtkResult<Self> {
        toml::from_str(text).map_err(|e| UtkError::Config(e.to_string()))
    }

    pub fn from_file(path: impl AsRef<Path>) -> UtkResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text).map_err(|e| UtkError::Config(format!("{}: {}", path.display(), e)))
    }

    pub fn to_toml_string(&self) -> UtkResult<String> {
        toml::to_string_pretty(self).map_err(|e| UtkError::Config(e.to_string()))
    }

    /// Load from `$UTK_CONFIG` when set, otherwise defaults.
    pub fn from_env() -> UtkResult<Self> {
        match std::env::var_os(CONFIG_ENV) {
            Some(path) => Self::from_file(PathBuf::from(path)),
            None => Ok(Self::default()),
        }
    }
}

static GLOBAL: OnceLock<Arc<ToolkitConfig>> = OnceLock::new();

/// Install the process-wide configuration. Only the first call wins; returns
/// false when a configuration was already in place.
pub fn install(config: ToolkitConfig) -> bool {
    GLOBAL.set(Arc::new(config)).is_ok()
}

/// Process-wide configuration. Falls back to `$UTK_CONFIG` or the defaults
/// when nothing was installed.
pub fn global() -> Arc<ToolkitConfig> {
    GLOBAL
        .get_or_init(|| {
            let config = ToolkitConfig::from_env().unwrap_or_else(|e| {
                log::warn!("Ignoring unreadable configuration: {}", e);
                ToolkitConfig::default()
            });
            Arc::new(config)
        })
        .clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = ToolkitConfig::default();
        assert_eq!(config.http.timeout(), Duration::from_secs(10));
        assert_eq!(config.http.image_post_timeout_secs, 60);
        assert_eq!(config.http.image_download_timeout_secs, 30);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_partial_toml() {
        let config = ToolkitConfig::from_toml_str(
            r#"
            [http]
            timeout_secs = 3

            [translator]
            deepl_api_key = "abc"
            "#,
        )
        .unwrap();
        assert_eq!(config.http.timeout_secs, 3);
        assert_eq!(config.http.image_post_timeout_secs, 60);
        assert_eq!(config.translator.deepl_api_key.as_deref(), Some("abc"));
        assert_eq!(config.lora.database_path, PathBuf::from("lora_info.json"));
    }

    #[test]
    fn test_from_file_and_errors() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[logging]\nlevel = \"debug\"").unwrap();
        let config = ToolkitConfig::from_file(file.path()).unwrap();
        assert_eq!(config.logging.level, "debug");

        assert!(ToolkitConfig::from_toml_str("[http]\ntimeout_secs = \"soon\"").is_err());
    }
}
