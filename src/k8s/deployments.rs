//! Deployment readiness

use anyhow::Context;
use k8s_openapi::api::apps::v1::Deployment;
use kube::Client;
use kube::api::Api;
use std::time::Duration;

use super::is_not_found;
use crate::utils::progress::WaitProgress;
use crate::utils::wait::{WaitError, poll_until};

pub const POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Ready once every desired replica is ready and the Available condition holds
pub fn is_deployment_ready(deployment: &Deployment) -> bool {
    let desired = deployment
        .spec
        .as_ref()
        .and_then(|s| s.replicas)
        .unwrap_or(1);
    let Some(status) = deployment.status.as_ref() else {
        return false;
    };
    let ready = status.ready_replicas.unwrap_or(0);
    let available = status
        .conditions
        .as_ref()
        .map(|conditions| {
            conditions
                .iter()
                .any(|c| c.type_ == "Available" && c.status == "True")
        })
        .unwrap_or(false);
    ready >= desired && available
}

/// Wait until the Deployment is ready; a missing Deployment keeps waiting
pub async fn wait_for_deployment_ready(
    client: &Client,
    name: &str,
    namespace: &str,
    timeout: Duration,
) -> Result<(), WaitError> {
    wait_for_deployment_ready_every(client, name, namespace, timeout, POLL_INTERVAL).await
}

pub async fn wait_for_deployment_ready_every(
    client: &Client,
    name: &str,
    namespace: &str,
    timeout: Duration,
    interval: Duration,
) -> Result<(), WaitError> {
    let deployments: Api<Deployment> = Api::namespaced(client.clone(), namespace);
    let progress = WaitProgress::new(&format!("deployment/{}", name), "ready");
    let what = format!("deployment {}/{}", namespace, name);

    let result = poll_until(&what, timeout, interval, || {
        let deployments = deployments.clone();
        let progress = &progress;
        async move {
            match deployments.get(name).await {
                Ok(deployment) => {
                    if is_deployment_ready(&deployment) {
                        return Ok(Some(()));
                    }
                    let ready = deployment
                        .status
                        .as_ref()
                        .and_then(|s| s.ready_replicas)
                        .unwrap_or(0);
                    progress.update(&format!("{} replicas ready", ready));
                    Ok(None)
                }
                Err(e) if is_not_found(&e) => {
                    progress.update("not created yet");
                    Ok(None)
                }
                Err(e) => Err(e).with_context(|| format!("failed to get deployment {}", name)),
            }
        }
    })
    .await;

    match &result {
        Ok(()) => progress.finish_success(),
        Err(e) => progress.finish_error(&e.to_string()),
    }
    result
}
