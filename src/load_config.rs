//! Loads the static YAML settings file for the publish pipeline.
//!
//! The file carries no secrets; backend credentials come from the
//! environment (see `CloudflareDns::new_from_env`).

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::Deserialize;
use tracing::{error, info};

/// Merged pipeline settings.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Managed base hostname; sites under it get automatic DNS.
    pub base_host: String,
    /// CNAME target for managed subdomains.
    pub storage_endpoint_host: String,
    /// Directory with the renderer's body/head scripts.
    pub skeleton_dir: PathBuf,
    /// Renderer executable.
    pub renderer_bin: PathBuf,
}

#[derive(Deserialize)]
struct StaticConfig {
    publish: PublishSection,
    #[serde(default)]
    render: RenderSection,
}

#[derive(Deserialize)]
struct PublishSection {
    base_host: String,
    #[serde(default = "default_endpoint_host")]
    storage_endpoint_host: String,
}

#[derive(Deserialize, Default)]
struct RenderSection {
    skeleton_dir: Option<PathBuf>,
    renderer_bin: Option<PathBuf>,
}

fn default_endpoint_host() -> String {
    "s3-website-us-east-1.amazonaws.com".to_string()
}

/// Load and validate the settings file.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<AppConfig> {
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

    let static_conf: StaticConfig = match serde_yaml::from_str(&config_content) {
        Ok(conf) => conf,
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML");
            return Err(anyhow::anyhow!("Failed to parse config YAML: {e}"));
        }
    };

    let config = AppConfig {
        base_host: static_conf.publish.base_host,
        storage_endpoint_host: static_conf.publish.storage_endpoint_host,
        skeleton_dir: static_conf
            .render
            .skeleton_dir
            .unwrap_or_else(|| PathBuf::from("skeleton")),
        renderer_bin: static_conf
            .render
            .renderer_bin
            .unwrap_or_else(|| PathBuf::from("node_modules/.bin/sitio")),
    };

    info!(
        base_host = %config.base_host,
        endpoint = %config.storage_endpoint_host,
        renderer = %config.renderer_bin.display(),
        "Config loaded successfully"
    );
    Ok(config)
}
