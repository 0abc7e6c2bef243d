use std::{path::PathBuf, time::Duration};

use anyhow::Result;

use crate::config;

pub const DEFAULT_API_BASE_URL: &str = "https://api.beanhub.io";
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Process-wide settings, built once in `main` and handed to every command.
#[derive(Debug, Clone)]
pub struct Environment {
    pub api_base_url: String,
    pub config_path: PathBuf,
    pub poll_interval: Duration,
}

impl Environment {
    pub fn from_env() -> Result<Self> {
        let api_base_url = std::env::var("BEANHUB_API_URL")
            .unwrap_or_else(|_| DEFAULT_API_BASE_URL.to_string());
        Ok(Self {
            api_base_url,
            config_path: config::default_config_path()?,
            poll_interval: DEFAULT_POLL_INTERVAL,
        })
    }
}

#[cfg(test)]
impl Environment {
    pub fn for_tests(home: &std::path::Path) -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            config_path: home.join(".beanhub").join("config.toml"),
            poll_interval: Duration::ZERO,
        }
    }
}
