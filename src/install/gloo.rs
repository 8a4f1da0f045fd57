//! Gloo ingress addon, installed through glooctl

use anyhow::{Context, Result, bail};
use kube::Client;
use std::path::PathBuf;
use std::time::Duration;

use crate::k8s::{config_maps, kubectl, services};
use crate::utils::{download, logger::info, process};

pub const DEFAULT_NAMESPACE: &str = "gloo-system";
pub const DEFAULT_CLUSTER_INGRESS_PROXY: &str = "clusteringress-proxy";

const PROXY_POLL_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct GlooOptions {
    pub namespace: String,
    /// glooctl release to download when it is missing; latest when unset
    pub version: Option<String>,
    pub cluster_ingress_proxy: String,
    /// Install the Knative cluster ingress instead of the API gateway
    pub knative: bool,
    pub timeout: Duration,
}

impl Default for GlooOptions {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.into(),
            version: None,
            cluster_ingress_proxy: DEFAULT_CLUSTER_INGRESS_PROXY.into(),
            knative: true,
            timeout: Duration::from_secs(600),
        }
    }
}

/// Name of the glooctl asset published for `os`
pub fn glooctl_asset(os: &str) -> Result<String> {
    let platform = match os {
        "linux" => "linux",
        "macos" => "darwin",
        "windows" => "windows",
        other => bail!("no glooctl release is published for {}", other),
    };
    let suffix = if os == "windows" { ".exe" } else { "" };
    Ok(format!("glooctl-{}-amd64{}", platform, suffix))
}

pub fn glooctl_url(version: &semver::Version, asset: &str) -> String {
    format!(
        "https://github.com/solo-io/gloo/releases/download/v{}/{}",
        version, asset
    )
}

/// Arguments for `glooctl install`
pub fn install_args(opts: &GlooOptions) -> Vec<&'static str> {
    if opts.knative {
        vec!["install", "knative"]
    } else {
        vec!["install", "gateway"]
    }
}

/// The Knative domain served through the proxy address
pub fn nip_io_domain(ip: &str) -> String {
    format!("{}.nip.io", ip)
}

/// Path of a usable glooctl, downloading it into the jx bin dir when absent
pub async fn ensure_glooctl(version: Option<&str>) -> Result<PathBuf> {
    if let Ok(path) = which::which("glooctl") {
        return Ok(path);
    }
    let dest = download::bin_dir()?.join("glooctl");
    if dest.exists() {
        return Ok(dest);
    }

    let version = match version.filter(|v| !v.is_empty()) {
        Some(v) => semver::Version::parse(v.trim_start_matches('v'))
            .with_context(|| format!("unable to parse version {}", v))?,
        None => download::latest_github_release("solo-io", "gloo").await?,
    };
    let asset = glooctl_asset(std::env::consts::OS)?;
    crate::log_info!("Downloading glooctl {}", info(&version));
    download::download_file(&glooctl_url(&version, &asset), &dest).await?;
    download::make_executable(&dest)?;
    Ok(dest)
}

pub async fn install(client: &Client, opts: &GlooOptions) -> Result<()> {
    let glooctl = ensure_glooctl(opts.version.as_deref()).await?;
    let glooctl = glooctl.display().to_string();

    process::run_mutating(&glooctl, &install_args(opts)).context("failed to install gloo")?;
    if super::skip_waits(&opts.cluster_ingress_proxy) {
        return Ok(());
    }

    crate::log_info!(
        "Waiting for deployment {} in namespace {}",
        info(&opts.cluster_ingress_proxy),
        info(&opts.namespace)
    );
    super::wait_for_deployment(client, &opts.cluster_ingress_proxy, &opts.namespace, opts.timeout).await?;

    let ip = services::wait_for_external_ip(
        client,
        &opts.cluster_ingress_proxy,
        &opts.namespace,
        opts.timeout,
        PROXY_POLL_INTERVAL,
    )
    .await;

    match ip {
        Some(ip) if opts.knative => {
            let domain = nip_io_domain(&ip);
            config_maps::set_knative_domain(client, &domain).await?;
            crate::log_info!("Knative serving domain set to {}", info(domain));
        }
        Some(ip) => crate::log_info!("Gloo proxy address: {}", info(ip)),
        None => crate::log_warn!(
            "No external IP for {} yet, you can get it with `{}`",
            opts.cluster_ingress_proxy,
            kubectl::external_ip_hint(&opts.cluster_ingress_proxy, &opts.namespace)
        ),
    }
    Ok(())
}
