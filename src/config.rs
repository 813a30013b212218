use crate::i18n::Language;
use anyhow::Context;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Service configuration, read from a TOML file
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    /// HTTP listener
    #[serde(default)]
    pub server: ServerConfig,

    /// Diagnostic probe settings
    #[serde(default)]
    pub probes: ProbeConfig,

    /// Record store settings
    #[serde(default)]
    pub store: StoreConfig,

    /// Localization settings
    #[serde(default)]
    pub i18n: I18nConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// Bind address (default: 127.0.0.1)
    #[serde(default = "default_bind_address")]
    pub bind: String,

    /// Listen port (default: 3000); 0 picks an ephemeral port
    #[serde(default = "default_listen_port")]
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> anyhow::Result<SocketAddr> {
        format!("{}:{}", self.bind, self.port)
            .parse()
            .with_context(|| format!("Invalid bind address {}:{}", self.bind, self.port))
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind_address(),
            port: default_listen_port(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ProbeConfig {
    /// TCP connect deadline for connection tests in milliseconds (default: 10000)
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,
}

impl ProbeConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: default_connect_timeout(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    /// Load the sample gateway mappings at startup (default: true)
    #[serde(default = "default_true")]
    pub seed: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { seed: default_true() }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct I18nConfig {
    /// Fallback language for missing translations (default: "en")
    #[serde(default = "default_language")]
    pub default_language: String,
}

impl I18nConfig {
    pub fn language(&self) -> anyhow::Result<Language> {
        self.default_language
            .parse::<Language>()
            .map_err(|e| anyhow::anyhow!("i18n.default_language: {}", e))
    }
}

impl Default for I18nConfig {
    fn default() -> Self {
        Self {
            default_language: default_language(),
        }
    }
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_listen_port() -> u16 {
    3000
}

fn default_connect_timeout() -> u64 {
    10_000
}

fn default_true() -> bool {
    true
}

fn default_language() -> String {
    "en".to_string()
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path`, or fall back to defaults when the file does not exist
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            info!(path = %path.display(), "Config file not found, using defaults");
            return Ok(Self::default());
        }
        Self::load(path)
    }

    /// Validate all configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        let mut errors = Vec::new();

        if let Err(e) = self.server.socket_addr() {
            errors.push(e.to_string());
        }
        if self.probes.connect_timeout_ms == 0 {
            errors.push("probes.connect_timeout_ms must be greater than 0".to_string());
        }
        if let Err(e) = self.i18n.language() {
            errors.push(e.to_string());
        }

        if !errors.is_empty() {
            anyhow::bail!("Configuration errors:\n  - {}", errors.join("\n  - "));
        }

        Ok(())
    }
}
