// src/config.rs
//! Unified configuration management for the formatter service.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::PathBuf;
use tracing::info;

pub const DEFAULT_WEBHOOK_URL: &str =
    "https://n8n.srv898896.hstgr.cloud/webhook-test/6985e04a-cf39-4fd0-8248-92064764a230";
pub const DEFAULT_CORS_PROXY_URL: &str = "https://corsproxy.io/";
pub const DEFAULT_GEMINI_API_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-flash";

#[derive(Debug, Clone)]
pub struct ConfigManager {
    pub environment: EnvironmentConfig,
    pub service: ServiceConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EnvironmentConfig {
    pub database_path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub webhook_url: String,
    pub cors_proxy_url: String,
    pub gemini_api_url: String,
    pub gemini_model: String,
    /// Empty when the deployment has no model credential configured; the
    /// normalization client reports this as a configuration error instead
    /// of failing server startup.
    pub gemini_api_key: String,
    pub admin_email: String,
    pub timeout_seconds: u64,
}

#[derive(Debug, Deserialize)]
struct ConfigFile {
    local: EnvironmentConfig,
    production: EnvironmentConfig,
}

impl ConfigManager {
    /// Load all configurations
    pub fn load() -> Result<Self> {
        let environment = EnvironmentConfig::load()?;
        let service = ServiceConfig::load();

        Ok(Self {
            environment,
            service,
        })
    }

    /// Ensure directories referenced by the configuration exist
    pub async fn ensure_directories(&self) -> Result<()> {
        if let Some(parent) = self.environment.database_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
        Ok(())
    }
}

impl EnvironmentConfig {
    pub fn load() -> Result<Self> {
        let environment = get_environment();
        info!("Loading configuration for environment: {}", environment);

        let config_path = PathBuf::from("config.yaml");
        if config_path.exists() {
            return Self::load_from_file(&config_path, &environment);
        }

        // No config file: derive paths from the environment alone.
        let base_dir = if environment == "production" {
            PathBuf::from("/app")
        } else {
            std::env::current_dir().context("Failed to get current directory")?
        };

        Ok(Self {
            database_path: base_dir.join("data").join("linkform.db"),
        })
    }

    fn load_from_file(config_path: &PathBuf, environment: &str) -> Result<Self> {
        let config_content =
            std::fs::read_to_string(config_path).context("Failed to read config.yaml")?;

        let config_file: ConfigFile =
            serde_yaml::from_str(&config_content).context("Failed to parse config.yaml")?;

        let env_config = match environment {
            "production" => config_file.production,
            _ => config_file.local,
        };

        Ok(Self {
            database_path: resolve_path(&env_config.database_path)?,
        })
    }
}

impl ServiceConfig {
    pub fn load() -> Self {
        let webhook_url =
            std::env::var("WEBHOOK_URL").unwrap_or_else(|_| DEFAULT_WEBHOOK_URL.to_string());
        let cors_proxy_url =
            std::env::var("CORS_PROXY_URL").unwrap_or_else(|_| DEFAULT_CORS_PROXY_URL.to_string());
        let gemini_api_url =
            std::env::var("GEMINI_API_URL").unwrap_or_else(|_| DEFAULT_GEMINI_API_URL.to_string());
        let gemini_model =
            std::env::var("GEMINI_MODEL").unwrap_or_else(|_| DEFAULT_GEMINI_MODEL.to_string());
        let gemini_api_key = std::env::var("GEMINI_API_KEY").unwrap_or_default();
        let admin_email =
            std::env::var("ADMIN_EMAIL").unwrap_or_else(|_| "admin@gmail.com".to_string());

        Self {
            webhook_url,
            cors_proxy_url,
            gemini_api_url,
            gemini_model,
            gemini_api_key,
            admin_email,
            timeout_seconds: 60,
        }
    }
}

fn get_environment() -> String {
    std::env::var("LINKFORM_ENV")
        .or_else(|_| std::env::var("ENVIRONMENT"))
        .or_else(|_| std::env::var("ENV"))
        .unwrap_or_else(|_| "local".to_string())
}

fn resolve_path(path: &PathBuf) -> Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.clone())
    } else {
        let current_dir = std::env::current_dir().context("Failed to get current directory")?;
        Ok(current_dir.join(path))
    }
}
