//! Configuration file support for jx

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::codeship::DEFAULT_API_URL;
use crate::helm::JENKINS_X_CHART_REPO;

/// Main configuration structure
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Settings {
    #[serde(default)]
    pub defaults: Defaults,

    #[serde(default)]
    pub colors: Colors,

    #[serde(default)]
    pub behavior: Behavior,

    #[serde(default)]
    pub versions: Versions,

    #[serde(default)]
    pub codeship: CodeshipSettings,
}

/// Default values for common operations
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Defaults {
    /// Dev namespace used when the current context has none
    #[serde(default = "default_namespace")]
    pub namespace: String,

    #[serde(default = "default_helm_binary")]
    pub helm_binary: String,

    #[serde(default = "default_chart_repository")]
    pub chart_repository: String,

    /// Seconds helm waits for a release and jx waits for Deployments
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kubeconfig_path: Option<String>,
}

/// Color and theme settings
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Colors {
    #[serde(default = "default_true")]
    pub enabled: bool,
}

/// Behavior settings
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Behavior {
    #[serde(default = "default_true")]
    pub confirm_destructive: bool,

    #[serde(default = "default_true")]
    pub show_progress: bool,
}

/// Pinned addon versions; empty means latest
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Versions {
    #[serde(default)]
    pub istio: String,

    #[serde(default)]
    pub prow: String,

    #[serde(default)]
    pub tekton: String,

    #[serde(default)]
    pub gloo: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CodeshipSettings {
    #[serde(default = "default_codeship_api_url")]
    pub api_url: String,
}

fn default_namespace() -> String {
    "jx".to_string()
}

fn default_helm_binary() -> String {
    "helm".to_string()
}

fn default_chart_repository() -> String {
    JENKINS_X_CHART_REPO.to_string()
}

fn default_timeout_secs() -> u64 {
    600
}

fn default_true() -> bool {
    true
}

fn default_codeship_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            helm_binary: default_helm_binary(),
            chart_repository: default_chart_repository(),
            timeout_secs: default_timeout_secs(),
            kubeconfig_path: None,
        }
    }
}

impl Default for Colors {
    fn default() -> Self {
        Self {
            enabled: default_true(),
        }
    }
}

impl Default for Behavior {
    fn default() -> Self {
        Self {
            confirm_destructive: default_true(),
            show_progress: default_true(),
        }
    }
}

impl Default for CodeshipSettings {
    fn default() -> Self {
        Self {
            api_url: default_codeship_api_url(),
        }
    }
}

impl Settings {
    /// Load settings from file or return defaults
    pub fn load() -> Self {
        match Self::find_config_file() {
            Some(path) => Self::load_from_file(&path).unwrap_or_else(|e| {
                crate::log_warn!("Ignoring config file: {:#}", e);
                Self::default()
            }),
            None => Self::default(),
        }
    }

    /// Load settings from a specific file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let settings: Settings = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(settings)
    }

    /// Find config file in standard locations
    /// Priority:
    /// 1. .jx.toml in current directory
    /// 2. ~/.config/jx/config.toml (XDG config directory)
    pub fn find_config_file() -> Option<PathBuf> {
        let local_config = PathBuf::from(".jx.toml");
        if local_config.exists() {
            return Some(local_config);
        }

        if let Some(config_dir) = dirs::config_dir() {
            let xdg_config = config_dir.join("jx").join("config.toml");
            if xdg_config.exists() {
                return Some(xdg_config);
            }
        }

        None
    }

    /// Save settings to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let contents = toml::to_string_pretty(self).context("Failed to serialize settings")?;

        fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Render the effective settings as TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize settings")
    }

    /// Generate example config file content
    pub fn example_config() -> String {
        format!(
            r#"# jx configuration file
# Place this file at ~/.config/jx/config.toml or .jx.toml in your project

[defaults]
# Dev namespace used when the current kube context has none
namespace = "jx"
helm_binary = "helm"
chart_repository = "{repo}"
# Seconds to wait for helm releases and Deployments
timeout_secs = 600
# kubeconfig_path = "/path/to/kubeconfig"

[colors]
enabled = true

[behavior]
confirm_destructive = true
show_progress = true

[versions]
# Leave empty to use the latest release
istio = ""
prow = ""
tekton = ""
gloo = ""

[codeship]
api_url = "{codeship}"
"#,
            repo = JENKINS_X_CHART_REPO,
            codeship = DEFAULT_API_URL,
        )
    }
}
