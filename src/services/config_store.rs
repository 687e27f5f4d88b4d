// Configuration Storage Service
// Loads the service config file and applies environment overrides

use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DEFAULT_MODEL_NAME: &str = "openai-community/roberta-base-openai-detector";
pub const DEFAULT_HUB_URL: &str = "https://huggingface.co";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("Invalid value for {key}: {value}")]
    InvalidEnv { key: String, value: String },
    #[error("Invalid bind address {0}")]
    InvalidAddress(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub cors: CorsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        let raw = format!("{}:{}", self.host, self.port);
        raw.parse().map_err(|_| ConfigError::InvalidAddress(raw))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelConfig {
    /// Hub repository id, or a local directory holding the artifacts.
    #[serde(default = "default_model_name")]
    pub name: String,
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,
    #[serde(default = "default_revision")]
    pub revision: String,
    #[serde(default = "default_hub_url")]
    pub hub_url: String,
    #[serde(default = "default_model_file")]
    pub model_file: String,
    #[serde(default = "default_tokenizer_file")]
    pub tokenizer_file: String,
    #[serde(default = "default_max_length")]
    pub max_length: usize,
    #[serde(default = "default_ai_class_index")]
    pub ai_class_index: usize,
    #[serde(default = "default_intra_threads")]
    pub intra_threads: usize,
    #[serde(default, skip_serializing)]
    pub hub_token: Option<String>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            name: default_model_name(),
            cache_dir: None,
            revision: default_revision(),
            hub_url: default_hub_url(),
            model_file: default_model_file(),
            tokenizer_file: default_tokenizer_file(),
            max_length: default_max_length(),
            ai_class_index: default_ai_class_index(),
            intra_threads: default_intra_threads(),
            hub_token: None,
        }
    }
}

impl ModelConfig {
    /// Cache root, falling back to the user cache directory.
    pub fn resolved_cache_dir(&self) -> PathBuf {
        self.cache_dir
            .clone()
            .or_else(|| dirs::cache_dir().map(|p| p.join("ai-detector")))
            .unwrap_or_else(|| PathBuf::from(".cache"))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CorsConfig {
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: default_allowed_origins(),
        }
    }
}

impl CorsConfig {
    pub fn allows_any(&self) -> bool {
        self.allowed_origins.iter().any(|o| o.trim() == "*")
    }
}

fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8000 }
fn default_model_name() -> String { DEFAULT_MODEL_NAME.to_string() }
fn default_revision() -> String { "main".to_string() }
fn default_hub_url() -> String { DEFAULT_HUB_URL.to_string() }
fn default_model_file() -> String { "onnx/model.onnx".to_string() }
fn default_tokenizer_file() -> String { "tokenizer.json".to_string() }
fn default_max_length() -> usize { 512 }
fn default_ai_class_index() -> usize { 1 }
fn default_intra_threads() -> usize { 4 }
fn default_allowed_origins() -> Vec<String> { vec!["*".to_string()] }

impl AppConfig {
    /// Apply environment overrides. `lookup` is `std::env::var` in production.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(host) = get("HOST") {
            self.server.host = host;
        }
        if let Some(port) = get("PORT") {
            self.server.port = port.trim().parse().map_err(|_| ConfigError::InvalidEnv {
                key: "PORT".to_string(),
                value: port.clone(),
            })?;
        }
        if let Some(name) = get("MODEL_NAME") {
            self.model.name = name;
        }
        if let Some(dir) = get("MODEL_CACHE_DIR").or_else(|| get("HF_HOME")) {
            self.model.cache_dir = Some(PathBuf::from(dir));
        }
        if let Some(url) = get("MODEL_HUB_URL") {
            self.model.hub_url = url;
        }
        if let Some(token) = get("HF_TOKEN") {
            self.model.hub_token = Some(token);
        }
        Ok(())
    }
}

pub struct ConfigStore {
    config_file: PathBuf,
}

impl ConfigStore {
    pub fn new(config_file: PathBuf) -> Self {
        Self { config_file }
    }

    /// `$DETECTOR_CONFIG`, else the per-user config directory
    pub fn from_env() -> Self {
        let config_file = match std::env::var("DETECTOR_CONFIG") {
            Ok(p) if !p.trim().is_empty() => PathBuf::from(p),
            _ => Self::default_config_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("config.json"),
        };
        Self::new(config_file)
    }

    /// Get default config directory
    pub fn default_config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("ai-detector"))
    }

    pub fn path(&self) -> &Path {
        &self.config_file
    }

    /// Load configuration from file; a missing file yields defaults
    pub fn load(&self) -> Result<AppConfig, ConfigError> {
        if !self.config_file.exists() {
            return Ok(AppConfig::default());
        }

        let content = fs::read_to_string(&self.config_file).map_err(|source| ConfigError::Read {
            path: self.config_file.clone(),
            source,
        })?;

        serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: self.config_file.clone(),
            source,
        })
    }

    /// File config with process environment applied on top
    pub fn load_effective(&self) -> Result<AppConfig, ConfigError> {
        let mut config = self.load()?;
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.model.name, DEFAULT_MODEL_NAME);
        assert_eq!(config.model.max_length, 512);
        assert_eq!(config.model.ai_class_index, 1);
        assert!(config.cors.allows_any());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let config: AppConfig =
            serde_json::from_str(r#"{"model": {"name": "local/detector", "maxLength": 256}}"#).unwrap();
        assert_eq!(config.model.name, "local/detector");
        assert_eq!(config.model.max_length, 256);
        assert_eq!(config.model.revision, "main");
        assert_eq!(config.server.host, "0.0.0.0");
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(dir.path().join("absent.json"));
        let config = store.load().unwrap();
        assert_eq!(config.server.port, 8000);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"server": {"port": 9100}, "cors": {"allowedOrigins": ["https://app.example"]}}"#).unwrap();
        let config = ConfigStore::new(path).load().unwrap();
        assert_eq!(config.server.port, 9100);
        assert!(!config.cors.allows_any());
    }

    #[test]
    fn test_malformed_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{not json").unwrap();
        let err = ConfigStore::new(path).load().unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_env_overrides() {
        let env = env_of(&[
            ("PORT", "7000"),
            ("MODEL_NAME", "org/other"),
            ("HF_HOME", "/srv/hf"),
            ("HF_TOKEN", "secret"),
        ]);
        let mut config = AppConfig::default();
        config.apply_env_overrides(|k| env.get(k).cloned()).unwrap();
        assert_eq!(config.server.port, 7000);
        assert_eq!(config.model.name, "org/other");
        assert_eq!(config.model.cache_dir, Some(PathBuf::from("/srv/hf")));
        assert_eq!(config.model.hub_token.as_deref(), Some("secret"));
    }

    #[test]
    fn test_model_cache_dir_wins_over_hf_home() {
        let env = env_of(&[("MODEL_CACHE_DIR", "/a"), ("HF_HOME", "/b")]);
        let mut config = AppConfig::default();
        config.apply_env_overrides(|k| env.get(k).cloned()).unwrap();
        assert_eq!(config.model.cache_dir, Some(PathBuf::from("/a")));
    }

    #[test]
    fn test_invalid_port_env() {
        let env = env_of(&[("PORT", "eighty")]);
        let mut config = AppConfig::default();
        let err = config.apply_env_overrides(|k| env.get(k).cloned()).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnv { .. }));
    }

    #[test]
    fn test_token_never_serialized() {
        let mut config = AppConfig::default();
        config.model.hub_token = Some("secret".to_string());
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("secret"));
    }

    #[test]
    fn test_bind_addr() {
        let server = ServerConfig { host: "127.0.0.1".to_string(), port: 8080 };
        assert_eq!(server.bind_addr().unwrap().port(), 8080);
        let bad = ServerConfig { host: "not a host".to_string(), port: 1 };
        assert!(bad.bind_addr().is_err());
    }
}
