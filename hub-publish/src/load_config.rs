//! `load_config`: reads the YAML configuration file and fills secrets from the
//! environment.
//!
//! This is the only place untrusted YAML is parsed. Every section is
//! optional and falls back to the core crate's defaults, so a file only has
//! to name what it changes.
//!
//! Secrets may be kept out of the file: `HUB_PUBLISH_PASSWORD` and
//! `HUB_PUBLISH_OAUTH2_TOKEN` fill the password and token when the file
//! leaves them unset. A value present in the file always wins.

use std::fs;
use std::path::Path;

use anyhow::Result;
use hub_publish_core::config::{DownloadsConfig, HubConfig, ProjectInfo, RepositoryConfig, SiteConfig};
use hub_publish_core::settings::Settings;
use serde::Deserialize;
use tracing::{error, info};

pub const ENV_PASSWORD: &str = "HUB_PUBLISH_PASSWORD";
pub const ENV_OAUTH2_TOKEN: &str = "HUB_PUBLISH_OAUTH2_TOKEN";

#[derive(Debug, Default, Deserialize)]
pub struct CliConfig {
    #[serde(default)]
    pub hub: HubConfig,
    #[serde(default)]
    pub repository: RepositoryConfig,
    #[serde(default)]
    pub project: Option<ProjectInfo>,
    #[serde(default)]
    pub settings: Option<Settings>,
    #[serde(default)]
    pub site: SiteConfig,
    #[serde(default)]
    pub downloads: DownloadsConfig,
}

fn env_secret(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|value| !value.is_empty())
}

/// Fill absent credentials from the environment.
fn inject_secrets(hub: &mut HubConfig) {
    if hub.password.as_deref().map_or(true, str::is_empty) {
        if let Some(password) = env_secret(ENV_PASSWORD) {
            info!(env = ENV_PASSWORD, "Injected password from environment");
            hub.password = Some(password);
        }
    }
    if hub.oauth2_token.as_deref().map_or(true, str::is_empty) {
        if let Some(token) = env_secret(ENV_OAUTH2_TOKEN) {
            info!(
                env = ENV_OAUTH2_TOKEN,
                token_len = token.len(),
                "Injected OAuth2 token from environment"
            );
            hub.oauth2_token = Some(token);
        }
    }
}

/// Load the YAML config at `path` and inject environment secrets.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<CliConfig> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let config_content = match fs::read_to_string(path_ref) {
        Ok(content) => content,
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
            return Err(anyhow::anyhow!(
                "Failed to read config file {:?}: {}",
                path_ref,
                e
            ));
        }
    };

    let mut config: CliConfig = if config_content.trim().is_empty() {
        CliConfig::default()
    } else {
        match serde_yaml::from_str(&config_content) {
            Ok(conf) => {
                info!(config_path = ?path_ref, "Parsed config YAML successfully");
                conf
            }
            Err(e) => {
                error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML");
                return Err(anyhow::anyhow!("Failed to parse config YAML: {e}"));
            }
        }
    };

    inject_secrets(&mut config.hub);
    config.hub.trace_loaded();
    Ok(config)
}
