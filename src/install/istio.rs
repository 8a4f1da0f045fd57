//! Istio service mesh addon

use anyhow::{Context, Result, anyhow, bail};
use kube::Client;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::helm::{HelmCli, InstallChartOptions};
use crate::k8s::{client::current_namespace, kubectl, namespaces, services};
use crate::utils::{download, logger::info};

pub const DEFAULT_NAMESPACE: &str = "istio-system";
pub const DEFAULT_RELEASE: &str = "istio";
pub const DEFAULT_PASSWORD: &str = "istio";
pub const DEFAULT_CONFIG_DIR: &str = "/istio_service_dir";
pub const DEFAULT_INGRESS_GATEWAY_SERVICE: &str = "istio-ingressgateway";

/// Chart directory inside an unpacked Istio release
pub const CHART_DIR: &str = "install/kubernetes/helm/istio";

const GATEWAY_POLL_INTERVAL: Duration = Duration::from_secs(5);
const GATEWAY_POLL_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct IstioOptions {
    pub namespace: String,
    pub release_name: String,
    /// Istio release; latest from GitHub when unset
    pub version: Option<String>,
    /// Chart to install instead of the one shipped in the release archive
    pub chart: Option<String>,
    pub password: String,
    pub config_dir: String,
    pub no_injector_webhook: bool,
    pub ingress_gateway_service: String,
    pub set_values: Vec<String>,
    pub timeout_secs: Option<u64>,
}

impl Default for IstioOptions {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.into(),
            release_name: DEFAULT_RELEASE.into(),
            version: None,
            chart: None,
            password: DEFAULT_PASSWORD.into(),
            config_dir: DEFAULT_CONFIG_DIR.into(),
            no_injector_webhook: false,
            ingress_gateway_service: DEFAULT_INGRESS_GATEWAY_SERVICE.into(),
            set_values: Vec::new(),
            timeout_secs: None,
        }
    }
}

/// Release archive suffix published for `os` (as in `std::env::consts::OS`)
pub fn archive_extension(os: &str) -> Result<&'static str> {
    match os {
        "linux" => Ok("linux.tar.gz"),
        "macos" => Ok("osx.tar.gz"),
        "windows" => bail!("the Istio win.zip release archive is not supported, pass --chart instead"),
        other => bail!("no Istio release archive is published for {}", other),
    }
}

pub fn release_url(version: &semver::Version, extension: &str) -> String {
    format!(
        "https://github.com/istio/istio/releases/download/{v}/istio-{v}-{ext}",
        v = version,
        ext = extension
    )
}

/// Helm values shared by the init and main charts
pub fn istio_values(opts: &IstioOptions) -> Vec<String> {
    let mut values = Vec::new();
    if opts.no_injector_webhook {
        values.push("sidecarInjectorWebhook.enabled=false".to_string());
    }
    values.extend(opts.set_values.iter().filter(|v| !v.is_empty()).cloned());
    values
}

async fn resolve_version(version: Option<&str>) -> Result<semver::Version> {
    match version.filter(|v| !v.is_empty()) {
        Some(v) => semver::Version::parse(v.trim_start_matches('v'))
            .with_context(|| format!("unable to parse version {}", v)),
        None => download::latest_github_release("istio", "istio")
            .await
            .context("unable to get the latest version for github.com/istio/istio"),
    }
}

/// Download and unpack an Istio release, installing `istioctl` into the jx
/// bin directory. Returns the unpacked release directory.
pub async fn fetch_release(version: Option<&str>) -> Result<PathBuf> {
    let version = resolve_version(version).await?;
    let extension = archive_extension(std::env::consts::OS)?;

    let cache_dir = download::cache_dir()?;
    let output_dir = cache_dir.join(format!("istio-{}", version));
    if output_dir.exists() {
        fs::remove_dir_all(&output_dir)
            .with_context(|| format!("Failed to clean {}", output_dir.display()))?;
    }

    let archive = cache_dir.join(format!("istio-{}-{}", version, extension));
    let cached = fs::metadata(&archive).map(|m| m.len() > 0).unwrap_or(false);
    if cached {
        crate::log_info!("Istio package already downloaded: {}", archive.display());
    } else {
        download::download_file(&release_url(&version, extension), &archive).await?;
    }

    download::untar_gz(&archive, &cache_dir)?;
    install_istioctl(&output_dir)?;
    Ok(output_dir)
}

fn install_istioctl(release_dir: &Path) -> Result<()> {
    let binary = release_dir.join("bin").join("istioctl");
    if !binary.exists() {
        return Ok(());
    }
    let dest = download::bin_dir()?.join("istioctl");
    if dest.exists() {
        fs::remove_file(&dest)?;
    }
    fs::rename(&binary, &dest)
        .with_context(|| format!("Failed to move istioctl to {}", dest.display()))?;
    crate::log_info!("Installed {}", info(dest.display()));
    Ok(())
}

/// Chart options for one of the two Istio charts
pub fn chart_options(
    opts: &IstioOptions,
    chart: &str,
    release: &str,
    dir: Option<&Path>,
) -> InstallChartOptions {
    let mut chart_opts = InstallChartOptions::new(chart, release, &opts.namespace);
    chart_opts.version = opts.version.clone();
    chart_opts.set_values = istio_values(opts);
    chart_opts.dir = dir.map(|d| d.join(chart).display().to_string());
    chart_opts.wait = true;
    chart_opts.timeout_secs = opts.timeout_secs;
    chart_opts
}

pub async fn install(helm: &HelmCli, client: &Client, opts: &IstioOptions) -> Result<()> {
    let (chart, dir) = match opts.chart.as_deref().filter(|c| !c.is_empty()) {
        Some(chart) => (chart.to_string(), None),
        None => {
            let dir = fetch_release(opts.version.as_deref()).await?;
            if !dir.join(CHART_DIR).exists() {
                return Err(anyhow!(
                    "Could not find folder {} inside istio release at {}",
                    CHART_DIR,
                    dir.display()
                ));
            }
            (CHART_DIR.to_string(), Some(dir))
        }
    };
    if opts.release_name.is_empty() {
        return Err(crate::utils::JxError::missing_option("release").into());
    }

    helm.version().context("failed to ensure that Helm is present")?;

    let (dev_namespace, _) = namespaces::dev_namespace(client, &current_namespace(client))
        .await
        .context("cannot find a dev team namespace to get existing exposecontroller config from")?;
    crate::log_info!("found dev namespace {}", dev_namespace);

    // The local chart version comes from the archive, not --version
    let mut init = chart_options(
        opts,
        &format!("{}-init", chart),
        &format!("{}-init", opts.release_name),
        dir.as_deref(),
    );
    let mut main = chart_options(opts, &chart, &opts.release_name, dir.as_deref());
    if dir.is_some() {
        init.version = None;
        main.version = None;
    }

    crate::log_info!("installing istio-init");
    helm.upgrade_install(&init)
        .map_err(|e| anyhow!("istio-init deployment failed: {}", e))?;
    crate::log_info!("installing istio");
    helm.upgrade_install(&main)
        .map_err(|e| anyhow!("istio deployment failed: {}", e))?;

    if super::skip_waits("the istio ingress gateway") {
        return Ok(());
    }
    match services::wait_for_external_ip(
        client,
        &opts.ingress_gateway_service,
        &opts.namespace,
        GATEWAY_POLL_TIMEOUT,
        GATEWAY_POLL_INTERVAL,
    )
    .await
    {
        Some(ip) => crate::log_info!("Istio ingress gateway service ip: {}", info(ip)),
        None => crate::log_info!(
            "Istio ingress gateway service ip is not yet ready, you can get it with `{}`",
            kubectl::external_ip_hint(&opts.ingress_gateway_service, &opts.namespace)
        ),
    }
    Ok(())
}
