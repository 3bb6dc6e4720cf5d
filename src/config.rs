use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::SvmError;

/// Config file name looked up in the home directory
pub const USER_CONFIG_FILE: &str = ".gitlabsvm.cfg";
/// System-wide config file
pub const SYSTEM_CONFIG_FILE: &str = "/etc/gitlabsvm.cfg";
/// Instance entry used when a config file exists and nothing else is requested
pub const DEFAULT_INSTANCE: &str = "gitlab";
/// Instance used when there is no config file at all
pub const DEFAULT_URL: &str = "https://www.gitlab.com";

const DEFAULT_TIMEOUT_SECS: u64 = 120;
const DEFAULT_API_VERSION: u32 = 4;

/// Contents of a gitlabsvm config file.
///
/// Every top-level table except `[global]` describes one GitLab instance,
/// keyed by the name given to `--gitlab`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub global: GlobalConfig,
    #[serde(flatten)]
    pub instances: BTreeMap<String, InstanceConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GlobalConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssl_verify: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceConfig {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssl_verify: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
}

/// Connection settings for one instance, after defaults are applied
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceSettings {
    pub url: String,
    pub api_version: u32,
    pub timeout_secs: u64,
    pub ssl_verify: bool,
}

/// An instance picked from the command line and the config file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedInstance {
    /// Config entry name, or the URL itself for bare URL instances
    pub name: String,
    pub settings: InstanceSettings,
    /// Token stored in the config entry
    pub private_token: Option<String>,
    /// True when the instance was given as a URL rather than a config entry
    pub from_url: bool,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;

        toml::from_str(&contents).map_err(|e| {
            SvmError::ConfigResolution(format!(
                "failed to parse config file {}: {}",
                path.as_ref().display(),
                e
            ))
            .into()
        })
    }

    /// Create a sample configuration file
    pub fn create_sample<P: AsRef<Path>>(path: P) -> Result<()> {
        let mut instances = BTreeMap::new();
        instances.insert(
            DEFAULT_INSTANCE.to_string(),
            InstanceConfig {
                url: "https://gitlab.com".to_string(),
                private_token: Some("your-personal-access-token-here".to_string()),
                api_version: Some(DEFAULT_API_VERSION),
                ssl_verify: None,
                timeout: Some(DEFAULT_TIMEOUT_SECS),
            },
        );

        let sample = Self {
            global: GlobalConfig {
                default: Some(DEFAULT_INSTANCE.to_string()),
                ssl_verify: Some(true),
                timeout: Some(60),
            },
            instances,
        };

        let toml_string =
            toml::to_string_pretty(&sample).context("Failed to serialize sample config")?;
        fs::write(path.as_ref(), toml_string)
            .with_context(|| format!("Failed to write sample config to {:?}", path.as_ref()))?;

        Ok(())
    }

    /// Settings shared by URL instances, taken from `[global]`
    fn url_settings(&self, url: &str) -> InstanceSettings {
        InstanceSettings {
            url: url.to_string(),
            api_version: DEFAULT_API_VERSION,
            timeout_secs: self.global.timeout.unwrap_or(DEFAULT_TIMEOUT_SECS),
            ssl_verify: self.global.ssl_verify.unwrap_or(true),
        }
    }

    fn instance_settings(&self, instance: &InstanceConfig) -> InstanceSettings {
        InstanceSettings {
            url: instance.url.clone(),
            api_version: instance.api_version.unwrap_or(DEFAULT_API_VERSION),
            timeout_secs: instance
                .timeout
                .or(self.global.timeout)
                .unwrap_or(DEFAULT_TIMEOUT_SECS),
            ssl_verify: instance
                .ssl_verify
                .or(self.global.ssl_verify)
                .unwrap_or(true),
        }
    }
}

/// Whether an instance argument is a URL instead of a config entry name
pub fn is_url(instance: &str) -> bool {
    instance.starts_with("https://") || instance.starts_with("http://")
}

/// Config files searched when no explicit path is given, in order
pub fn default_config_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Ok(home) = std::env::var("HOME") {
        paths.push(PathBuf::from(home).join(USER_CONFIG_FILE));
    }
    paths.push(PathBuf::from(SYSTEM_CONFIG_FILE));
    paths
}

/// Find the config file to use.
///
/// An explicit path must exist. Otherwise the first existing candidate wins and
/// `None` means there is no config file at all.
pub fn locate_config(explicit: Option<&Path>, candidates: &[PathBuf]) -> Result<Option<PathBuf>> {
    if let Some(path) = explicit {
        if !path.exists() {
            return Err(SvmError::ConfigResolution(format!(
                "config file {} does not exist",
                path.display()
            ))
            .into());
        }
        return Ok(Some(path.to_path_buf()));
    }

    let found = candidates.iter().find(|p| p.exists()).cloned();
    debug!("Config file: {:?}", found);
    Ok(found)
}

/// Decide which GitLab instance to talk to.
///
/// Without `--gitlab` the config default (or `gitlab`) is used when a config
/// file exists, otherwise the public gitlab.com URL. A config entry name with
/// no config file, or with no matching entry, is a configuration error.
pub fn resolve_instance(requested: Option<&str>, config: Option<&Config>) -> Result<ResolvedInstance> {
    let name = match (requested, config) {
        (Some(name), _) => name.to_string(),
        (None, Some(config)) => config
            .global
            .default
            .clone()
            .unwrap_or_else(|| DEFAULT_INSTANCE.to_string()),
        (None, None) => DEFAULT_URL.to_string(),
    };

    if is_url(&name) {
        let settings = config
            .map(|c| c.url_settings(&name))
            .unwrap_or_else(|| Config::default().url_settings(&name));
        return Ok(ResolvedInstance {
            name,
            settings,
            private_token: None,
            from_url: true,
        });
    }

    let Some(config) = config else {
        return Err(SvmError::ConfigResolution(format!(
            "--gitlab argument is pointing to a config-file entry [{}], but there is no config file available",
            name
        ))
        .into());
    };

    let instance = config.instances.get(&name).ok_or_else(|| {
        SvmError::ConfigResolution(format!("no [{}] entry in the config file", name))
    })?;

    Ok(ResolvedInstance {
        settings: config.instance_settings(instance),
        private_token: instance.private_token.clone().filter(|t| !t.is_empty()),
        name,
        from_url: false,
    })
}
