//! Team and environment namespace lookups

use anyhow::{Context, Result};
use k8s_openapi::api::core::v1::Namespace;
use kube::api::{Api, ObjectMeta};
use kube::Client;

use super::is_not_found;

/// Namespace label naming the team a namespace belongs to
pub const LABEL_TEAM: &str = "team";
/// Namespace label naming the environment a namespace hosts
pub const LABEL_ENV: &str = "env";

/// Resolve the team's dev namespace and environment name from `ns`.
///
/// The `team` label on the namespace wins over `ns` itself; the `env` label
/// is returned as the environment, empty when absent.
pub async fn dev_namespace(client: &Client, ns: &str) -> Result<(String, String)> {
    let api: Api<Namespace> = Api::all(client.clone());
    let namespace = api
        .get(ns)
        .await
        .with_context(|| format!("failed to get namespace {}", ns))?;

    let labels = namespace.metadata.labels.unwrap_or_default();
    let dev = labels
        .get(LABEL_TEAM)
        .filter(|team| !team.is_empty())
        .cloned()
        .unwrap_or_else(|| ns.to_string());
    let env = labels.get(LABEL_ENV).cloned().unwrap_or_default();
    Ok((dev, env))
}

/// Create `name` unless it already exists
pub async fn ensure_namespace(client: &Client, name: &str) -> Result<()> {
    let api: Api<Namespace> = Api::all(client.clone());
    match api.get(name).await {
        Ok(_) => Ok(()),
        Err(e) if is_not_found(&e) => {
            crate::log_info!("Creating namespace {}", name);
            let ns = Namespace {
                metadata: ObjectMeta {
                    name: Some(name.to_string()),
                    ..Default::default()
                },
                ..Default::default()
            };
            api.create(&super::post_params(), &ns)
                .await
                .with_context(|| format!("failed to create namespace {}", name))?;
            Ok(())
        }
        Err(e) => Err(e).with_context(|| format!("failed to get namespace {}", name)),
    }
}
