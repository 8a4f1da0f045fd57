//! Command implementations for the jx CLI

pub mod addon;
pub mod cluster;
pub mod codeship;
pub mod service_account;

use anyhow::Result;
use kube::Client;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::Settings;
use crate::helm::HelmCli;
use crate::k8s::{client::current_namespace, create_client, namespaces};

/// What every `create` subcommand needs besides its own flags
#[derive(Debug, Clone, Default)]
pub struct CommandContext {
    pub settings: Settings,
    pub kubeconfig: Option<PathBuf>,
}

impl CommandContext {
    pub fn new(settings: Settings) -> Self {
        let kubeconfig = settings.defaults.kubeconfig_path.as_ref().map(PathBuf::from);
        Self {
            settings,
            kubeconfig,
        }
    }

    pub fn kubeconfig(&self) -> Option<&Path> {
        self.kubeconfig.as_deref()
    }

    pub fn helm(&self) -> HelmCli {
        HelmCli::new(&self.settings.defaults.helm_binary)
    }

    pub async fn client(&self) -> Result<Client> {
        create_client(self.kubeconfig()).await
    }

    /// `--timeout` in seconds, else the configured default
    pub fn timeout_secs(&self, flag: Option<u64>) -> u64 {
        flag.unwrap_or(self.settings.defaults.timeout_secs)
    }

    pub fn timeout(&self, flag: Option<u64>) -> Duration {
        Duration::from_secs(self.timeout_secs(flag))
    }

    /// `--namespace` when given, else the team's dev namespace, else the
    /// configured default
    pub async fn dev_namespace(&self, client: &Client, flag: Option<String>) -> String {
        if let Some(ns) = flag.filter(|ns| !ns.is_empty()) {
            return ns;
        }
        let current = current_namespace(client);
        match namespaces::dev_namespace(client, &current).await {
            Ok((dev, _)) => dev,
            Err(e) => {
                let fallback = self.settings.defaults.namespace.clone();
                crate::log_debug!(
                    "unable to resolve the dev namespace from {}, using {}: {:#}",
                    current,
                    fallback,
                    e
                );
                fallback
            }
        }
    }
}

/// `Some` for non-empty values, so config entries can act as defaults
pub fn non_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}
