//! Addon installers behind `jx create addon`

pub mod addon;
pub mod environment_controller;
pub mod gloo;
pub mod ingress;
pub mod istio;
pub mod prow;

use anyhow::Result;
use kube::Client;
use std::time::Duration;

use crate::k8s::deployments;
use crate::utils::{JxError, dryrun};

/// In dry-run mode nothing was installed, so readiness waits would only
/// time out. Logs the skipped wait and returns true.
pub(crate) fn skip_waits(what: &str) -> bool {
    if dryrun::is_dry_run() {
        dryrun::log_action(&format!("wait for {} to become ready", what));
        return true;
    }
    false
}

/// Wait for a Deployment, reporting a timeout with troubleshooting hints
pub(crate) async fn wait_for_deployment(
    client: &Client,
    name: &str,
    namespace: &str,
    timeout: Duration,
) -> Result<()> {
    deployments::wait_for_deployment_ready(client, name, namespace, timeout)
        .await
        .map_err(|e| {
            if e.is_timeout() {
                JxError::deployment_not_ready(name, namespace).into()
            } else {
                anyhow::Error::from(e).context(format!("failed waiting for deployment {}", name))
            }
        })
}
