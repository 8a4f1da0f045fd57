//! Environment Controller: handles webhooks and promotes GitOps changes
//! for clusters without the full Jenkins X control plane

use anyhow::{Context, Result};

use crate::helm::{HelmCli, InstallChartOptions, JENKINS_X_CHART_REPO};
use crate::utils::git::{GitInfo, KIND_GITS, saas_git_kind};
use crate::utils::logger::info;
use crate::utils::process::mask_secret_values;
use crate::utils::{JxError, is_batch_mode, prompt};

pub const DEFAULT_RELEASE: &str = "jxet";
pub const CHART: &str = "environment-controller";

#[derive(Debug, Clone, Default)]
pub struct EnvironmentControllerOptions {
    pub namespace: String,
    pub release_name: String,
    pub version: Option<String>,
    pub set_values: Vec<String>,
    pub timeout_secs: Option<u64>,
    pub source_url: String,
    pub git_kind: String,
    pub user: String,
    pub token: String,
    pub webhook_url: String,
    pub buildpack_url: String,
    pub buildpack_ref: String,
    pub project_id: String,
    pub cluster_rbac: bool,
    pub docker_registry: String,
    pub docker_registry_org: String,
}

/// Fill in the source repository, git kind and credentials, prompting
/// for whatever is missing unless running in batch mode.
pub fn resolve(opts: &mut EnvironmentControllerOptions) -> Result<GitInfo> {
    if opts.source_url.is_empty() && !is_batch_mode() {
        opts.source_url = prompt::input("git repository to promote from", "", "source-url")?;
    }
    if opts.source_url.is_empty() {
        return Err(JxError::missing_option("source-url").into());
    }
    let git = GitInfo::parse(&opts.source_url)?;

    if opts.git_kind.is_empty() {
        opts.git_kind = saas_git_kind(&git.provider_url()).unwrap_or_default().to_string();
    }
    if opts.git_kind.is_empty() && !is_batch_mode() {
        let kinds: Vec<String> = KIND_GITS.iter().map(|k| k.to_string()).collect();
        opts.git_kind = prompt::select("kind of git repository", &kinds, "", "git-kind")?;
    }
    if opts.git_kind.is_empty() {
        return Err(JxError::missing_option("git-kind").into());
    }

    if opts.user.is_empty() && !is_batch_mode() {
        opts.user = prompt::input(&format!("git user for {}", git.provider_url()), "", "user")?;
    }
    if opts.user.is_empty() {
        return Err(JxError::missing_option("user").into());
    }
    if opts.token.is_empty() && !is_batch_mode() {
        opts.token = prompt::password(&format!("API token for {}", opts.user), "token")?;
    }
    if opts.token.is_empty() {
        return Err(JxError::missing_option("token").into());
    }
    Ok(git)
}

/// Chart values, in the order the chart expects them
pub fn chart_values(opts: &EnvironmentControllerOptions, git: &GitInfo) -> Vec<String> {
    let server_url = git.provider_url();
    let mut values: Vec<String> = opts.set_values.iter().filter(|v| !v.is_empty()).cloned().collect();
    if !opts.webhook_url.is_empty() {
        values.push(format!("webhookUrl={}", opts.webhook_url));
    }
    values.push(format!("source.owner={}", git.organisation));
    values.push(format!("source.repo={}", git.name));
    values.push(format!("source.serverUrl={}", server_url));
    values.push(format!("tekton.auth.git.url={}", server_url));
    values.push(format!("source.gitKind={}", opts.git_kind));
    values.push(format!("source.user={}", opts.user));
    values.push(format!("tekton.auth.git.username={}", opts.user));
    values.push(format!("source.token={}", opts.token));
    values.push(format!("tekton.auth.git.password={}", opts.token));

    let optional = [
        ("projectId", &opts.project_id),
        ("buildPackURL", &opts.buildpack_url),
        ("buildPackRef", &opts.buildpack_ref),
        ("dockerRegistry", &opts.docker_registry),
        ("dockerRegistryOrg", &opts.docker_registry_org),
    ];
    for (key, value) in optional {
        if !value.is_empty() {
            values.push(format!("{}={}", key, value));
        }
    }
    values.push(format!("tekton.rbac.cluster={}", opts.cluster_rbac));
    values
}

pub fn chart_options(opts: &EnvironmentControllerOptions, values: Vec<String>) -> InstallChartOptions {
    let mut chart_opts = InstallChartOptions::new(CHART, &opts.release_name, &opts.namespace);
    chart_opts.version = opts.version.clone();
    chart_opts.repository = Some(JENKINS_X_CHART_REPO.to_string());
    chart_opts.set_values = values;
    chart_opts.timeout_secs = opts.timeout_secs;
    chart_opts
}

/// Install the chart; `opts` must have been through [`resolve`]
pub fn install(helm: &HelmCli, opts: &EnvironmentControllerOptions, git: &GitInfo) -> Result<()> {
    let values = chart_values(opts, git);
    crate::log_info!(
        "installing the Environment Controller with values: {}",
        info(mask_secret_values(&values).join(","))
    );
    helm.upgrade_install(&chart_options(opts, values))
        .context("failed to install the Environment Controller")?;
    crate::log_info!("installed the Environment Controller!");
    Ok(())
}
