use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    pub webhook: Option<WebhookConfig>,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub epics: EpicsConfig,
    #[serde(default)]
    pub tenants: Vec<TenantConfig>,
}

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8787".to_string()
}

#[derive(Debug, Deserialize, Default)]
pub struct DatabaseConfig {
    /// Defaults to `<data dir>/boardsync.db` when unset.
    pub path: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
pub struct WebhookConfig {
    pub secret: String,
}

#[derive(Debug, Deserialize)]
pub struct SyncConfig {
    #[serde(default = "default_interval_minutes")]
    pub interval_minutes: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval_minutes: default_interval_minutes(),
        }
    }
}

fn default_interval_minutes() -> u64 {
    15
}

#[derive(Debug, Deserialize, Default)]
pub struct EpicsConfig {
    #[serde(default)]
    pub scheme: crate::options::EpicScheme,
}

/// One tenant account: the token authenticates against the remote API, the
/// owner/number pair registers a board on startup.
#[derive(Debug, Deserialize)]
pub struct TenantConfig {
    pub name: String,
    pub token: String,
    pub owner: Option<String>,
    pub project_number: Option<i64>,
}

fn config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("boardsync")
        .join("config.toml")
}

pub fn data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("boardsync")
}

pub fn load_config() -> Result<AppConfig> {
    let path = std::env::var("BOARDSYNC_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| config_path());
    if !path.exists() {
        return Ok(AppConfig::default());
    }
    let contents = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read config from {}", path.display()))?;
    let mut config: AppConfig =
        toml::from_str(&contents).with_context(|| "Failed to parse config.toml")?;

    if let Ok(secret) = std::env::var("BOARDSYNC_WEBHOOK_SECRET") {
        config.webhook = Some(WebhookConfig { secret });
    }
    if let Ok(bind) = std::env::var("BOARDSYNC_BIND") {
        config.server.bind = bind;
    }
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_parses_with_defaults() {
        let config: AppConfig = toml::from_str("").unwrap();
        assert_eq!(config.server.bind, "127.0.0.1:8787");
        assert_eq!(config.sync.interval_minutes, 15);
        assert!(config.webhook.is_none());
        assert!(config.tenants.is_empty());
    }

    #[test]
    fn tenants_and_webhook_parse() {
        let config: AppConfig = toml::from_str(
            r#"
[webhook]
secret = "s3cret"

[sync]
interval_minutes = 5

[[tenants]]
name = "acme"
token = "ghp_example"
owner = "acme-org"
project_number = 7
"#,
        )
        .unwrap();
        assert_eq!(config.webhook.unwrap().secret, "s3cret");
        assert_eq!(config.sync.interval_minutes, 5);
        assert_eq!(config.tenants.len(), 1);
        assert_eq!(config.tenants[0].owner.as_deref(), Some("acme-org"));
        assert_eq!(config.tenants[0].project_number, Some(7));
    }
}
