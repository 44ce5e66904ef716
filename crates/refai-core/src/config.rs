use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use anyhow::{Result, anyhow};

use crate::backend::AuthSession;

pub const RELAY_URL_VAR: &str = "REFAI_RELAY_URL";
pub const CLIENT_KEY_VAR: &str = "REFAI_CLIENT_KEY";
pub const BACKEND_URL_VAR: &str = "REFAI_BACKEND_URL";

const DEFAULT_RELAY_URL: &str = "http://127.0.0.1:8787";

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct Config {
    pub relay_url: Option<String>,
    pub client_key: Option<String>,
    pub backend_url: Option<String>,
    /// Signed-in session, kept across restarts until sign-out
    pub session: Option<AuthSession>,
}

impl Config {
    pub fn new() -> Self {
        Self {
            relay_url: Some(DEFAULT_RELAY_URL.to_string()),
            ..Self::default()
        }
    }

    pub fn load() -> Result<Self> {
        Self::load_from(&Self::get_config_path()?)
    }

    pub fn load_from(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            return Ok(Self::new());
        }

        let config_content = fs::read_to_string(config_path)?;
        let config: Config = serde_json::from_str(&config_content)?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::get_config_path()?)
    }

    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        // Create config directory if it doesn't exist
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let config_content = serde_json::to_string_pretty(self)?;
        fs::write(config_path, config_content)?;
        Ok(())
    }

    pub fn save_session(session: Option<&AuthSession>) -> Result<()> {
        let mut config = Self::load().unwrap_or_else(|_| Self::new());
        config.session = session.cloned();
        config.save()
    }

    /// Relay base URL - env var first, then config, then the local default
    pub fn relay_url(&self) -> String {
        std::env::var(RELAY_URL_VAR).ok()
            .or_else(|| self.relay_url.clone())
            .unwrap_or_else(|| DEFAULT_RELAY_URL.to_string())
    }

    pub fn client_key(&self) -> Option<String> {
        std::env::var(CLIENT_KEY_VAR).ok()
            .or_else(|| self.client_key.clone())
    }

    pub fn backend_url(&self) -> Option<String> {
        std::env::var(BACKEND_URL_VAR).ok()
            .or_else(|| self.backend_url.clone())
    }

    pub fn config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow!("Could not determine config directory"))?;

        Ok(config_dir.join("refai"))
    }

    fn get_config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.json"))
    }
}
