//! Kubernetes client construction

use anyhow::{Context, Result};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use std::path::Path;

/// Create a kube client from an optional kubeconfig path
pub async fn create_client(kubeconfig: Option<&Path>) -> Result<Client> {
    match kubeconfig {
        Some(path) => {
            let kubeconfig = Kubeconfig::read_from(path)
                .with_context(|| format!("failed to read kubeconfig {}", path.display()))?;
            let config = Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                .await
                .context("failed to load kubeconfig")?;
            Client::try_from(config).context("failed to create kubernetes client")
        }
        None => Client::try_default()
            .await
            .context("failed to create kubernetes client"),
    }
}

/// Namespace of the current context, `default` when unset
pub fn current_namespace(client: &Client) -> String {
    client.default_namespace().to_string()
}
