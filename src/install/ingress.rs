//! nginx ingress controller plus the Exposecontroller settings that
//! point Jenkins X at it

use anyhow::{Context, Result, bail};
use kube::Client;
use std::net::IpAddr;
use std::time::Duration;

use crate::helm::{HelmCli, InstallChartOptions, STABLE_CHART_REPO, STABLE_REPO_NAME, chart_in_repo};
use crate::k8s::config_maps::{self, ExposeControllerConfig};
use crate::k8s::{client::current_namespace, kubectl, namespaces, services};
use crate::utils::{JxError, logger::info};

pub const DEFAULT_NAMESPACE: &str = "kube-system";
pub const DEFAULT_RELEASE: &str = "jxing";
pub const DEFAULT_CHART: &str = "stable/nginx-ingress";
pub const EXPOSER: &str = "Ingress";

const ADDRESS_POLL_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct IngressOptions {
    pub namespace: String,
    pub release_name: String,
    pub chart: String,
    pub version: Option<String>,
    pub set_values: Vec<String>,
    /// Wins over the domain derived from the LoadBalancer address
    pub domain: Option<String>,
    pub http: bool,
    pub tls_acme: bool,
    pub timeout: Duration,
}

impl Default for IngressOptions {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.into(),
            release_name: DEFAULT_RELEASE.into(),
            chart: DEFAULT_CHART.into(),
            version: None,
            set_values: Vec::new(),
            domain: None,
            http: true,
            tls_acme: false,
            timeout: Duration::from_secs(600),
        }
    }
}

/// Deployment and Service name the nginx-ingress chart creates
pub fn controller_name(release: &str) -> String {
    format!("{}-nginx-ingress-controller", release)
}

/// `<ip>.nip.io` for IP addresses, hostnames unchanged; `domain` wins
pub fn ingress_domain(domain: Option<&str>, address: Option<&str>) -> Option<String> {
    if let Some(domain) = domain.filter(|d| !d.is_empty()) {
        return Some(domain.to_string());
    }
    let address = address.filter(|a| !a.is_empty())?;
    if address.parse::<IpAddr>().is_ok() {
        Some(format!("{}.nip.io", address))
    } else {
        Some(address.to_string())
    }
}

/// Merge the ingress settings into any existing Exposecontroller config
pub fn exposecontroller_config(
    existing: Option<ExposeControllerConfig>,
    domain: &str,
    opts: &IngressOptions,
) -> ExposeControllerConfig {
    let mut config = existing.unwrap_or_default();
    config.domain = domain.to_string();
    config.exposer = EXPOSER.to_string();
    config.http = opts.http;
    config.tls_acme = opts.tls_acme;
    config
}

pub async fn install(helm: &HelmCli, client: &Client, opts: &IngressOptions) -> Result<()> {
    let repo_name = helm
        .add_repo_if_missing(STABLE_CHART_REPO, STABLE_REPO_NAME)
        .context("failed to add the stable chart repository")?;

    let mut chart_opts = InstallChartOptions::new(
        chart_in_repo(&opts.chart, STABLE_REPO_NAME, &repo_name),
        &opts.release_name,
        &opts.namespace,
    );
    chart_opts.version = opts.version.clone();
    chart_opts.set_values = opts.set_values.iter().filter(|v| !v.is_empty()).cloned().collect();
    chart_opts.timeout_secs = Some(opts.timeout.as_secs());

    crate::log_info!("Installing {} into namespace {}", info(&chart_opts.chart), info(&opts.namespace));
    helm.upgrade_install(&chart_opts).context("failed to install the ingress controller")?;

    if super::skip_waits("the ingress controller") {
        return Ok(());
    }

    let controller = controller_name(&opts.release_name);
    super::wait_for_deployment(client, &controller, &opts.namespace, opts.timeout).await?;

    let address = services::wait_for_external_ip(
        client,
        &controller,
        &opts.namespace,
        opts.timeout,
        ADDRESS_POLL_INTERVAL,
    )
    .await;

    let domain = match ingress_domain(opts.domain.as_deref(), address.as_deref()) {
        Some(domain) => domain,
        None => bail!(
            "no external address for {} yet, pass --domain or check `{}`",
            controller,
            kubectl::external_ip_hint(&controller, &opts.namespace)
        ),
    };

    let current = current_namespace(client);
    let (dev_namespace, _) = namespaces::dev_namespace(client, &current).await.map_err(|e| {
        crate::log_debug!("{:#}", e);
        JxError::dev_namespace_not_found(&current)
    })?;
    let existing = config_maps::get_exposecontroller_config(client, &dev_namespace).await?;
    let config = exposecontroller_config(existing, &domain, opts);
    config_maps::update_exposecontroller_config(client, &dev_namespace, &config).await?;

    crate::log_info!("Ingress domain is {}", info(&domain));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_controller_name() {
        assert_eq!(controller_name("jxing"), "jxing-nginx-ingress-controller");
    }

    #[test]
    fn test_ingress_domain() {
        assert_eq!(ingress_domain(None, Some("35.1.2.3")).as_deref(), Some("35.1.2.3.nip.io"));
        assert_eq!(
            ingress_domain(None, Some("abc.elb.amazonaws.com")).as_deref(),
            Some("abc.elb.amazonaws.com")
        );
        assert_eq!(
            ingress_domain(Some("example.com"), Some("35.1.2.3")).as_deref(),
            Some("example.com")
        );
        assert_eq!(ingress_domain(Some(""), None), None);
    }

    #[test]
    fn test_exposecontroller_config_overwrites_ingress_fields() {
        let existing = ExposeControllerConfig {
            domain: "old.nip.io".into(),
            exposer: "NodePort".into(),
            http: false,
            tls_acme: true,
            extra: [("pathMode".to_string(), serde_yaml::Value::from("path"))].into(),
        };
        let opts = IngressOptions::default();
        let config = exposecontroller_config(Some(existing), "new.nip.io", &opts);
        assert_eq!(config.extra.get("pathMode").and_then(|v| v.as_str()), Some("path"));
        assert_eq!(config.domain, "new.nip.io");
        assert_eq!(config.exposer, "Ingress");
        assert!(config.http);
        assert!(!config.tls_acme);
    }
}
