//! Helm CLI driver used by every chart-backed addon

pub mod values;

use serde::Deserialize;
use std::io::Error as IoError;
use std::process::Command;
use std::string::FromUtf8Error;
use thiserror::Error;

use crate::utils::{dryrun, process::display_command};

/// Name of the Jenkins X chart repository
pub const JENKINS_X_REPO_NAME: &str = "jenkins-x";
/// URL of the Jenkins X chart repository
pub const JENKINS_X_CHART_REPO: &str = "https://storage.googleapis.com/chartmuseum.jenkins-x.io";

pub const STABLE_REPO_NAME: &str = "stable";
pub const STABLE_CHART_REPO: &str = "https://charts.helm.sh/stable";

#[derive(Error, Debug)]
pub enum HelmError {
    #[error(
        r#"Unable to find '{binary}' executable
  Please make sure helm is installed and in your PATH.
  See https://helm.sh/docs/intro/install/ for more help"#
    )]
    NotInstalled {
        binary: String,
        #[source]
        source: IoError,
    },
    #[error("helm command failed: {command}\n{stderr}")]
    CommandFailed { command: String, stderr: String },
    #[error("failed to parse helm output as UTF8")]
    Utf8 {
        #[from]
        source: FromUtf8Error,
    },
    #[error("failed to parse JSON from helm output")]
    Serde {
        #[from]
        source: serde_json::Error,
    },
}

/// Everything needed for a `helm upgrade --install`
#[derive(Debug, Clone, Default)]
pub struct InstallChartOptions {
    pub chart: String,
    pub release_name: String,
    pub version: Option<String>,
    pub namespace: String,
    pub set_values: Vec<String>,
    /// Passed with `--set-string` and masked in logs
    pub secret_values: Vec<String>,
    pub value_files: Vec<String>,
    pub repository: Option<String>,
    /// Local chart directory used instead of `chart`
    pub dir: Option<String>,
    pub wait: bool,
    pub timeout_secs: Option<u64>,
}

impl InstallChartOptions {
    pub fn new(chart: impl Into<String>, release: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            chart: chart.into(),
            release_name: release.into(),
            namespace: namespace.into(),
            ..Default::default()
        }
    }
}

/// A row of `helm list -o json`
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ReleaseSummary {
    pub name: String,
    pub namespace: String,
    #[serde(default)]
    pub revision: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub chart: String,
    #[serde(default)]
    pub app_version: String,
}

/// A row of `helm repo list -o json`
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct RepoSummary {
    pub name: String,
    pub url: String,
}

/// Thin wrapper over the helm binary
#[derive(Debug, Clone)]
pub struct HelmCli {
    binary: String,
}

impl Default for HelmCli {
    fn default() -> Self {
        Self::new("helm")
    }
}

impl HelmCli {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    pub fn binary(&self) -> &str {
        &self.binary
    }

    fn output(&self, args: &[&str]) -> Result<String, HelmError> {
        crate::log_debug!("running {}", display_command(&self.binary, args));
        let output = Command::new(&self.binary)
            .args(args)
            .output()
            .map_err(|source| HelmError::NotInstalled {
                binary: self.binary.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(HelmError::CommandFailed {
                command: display_command(&self.binary, args),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8(output.stdout)?)
    }

    fn run(&self, args: &[&str]) -> Result<(), HelmError> {
        let command = display_command(&self.binary, args);
        if dryrun::is_dry_run() {
            dryrun::log_action(&command);
            return Ok(());
        }
        crate::log_debug!("running {}", command);
        let status = Command::new(&self.binary)
            .args(args)
            .status()
            .map_err(|source| HelmError::NotInstalled {
                binary: self.binary.clone(),
                source,
            })?;
        if !status.success() {
            return Err(HelmError::CommandFailed {
                command,
                stderr: format!("exit status {}", status),
            });
        }
        Ok(())
    }

    /// Client version; also proves the binary is installed
    pub fn version(&self) -> Result<String, HelmError> {
        let out = self.output(&["version", "--short"])?;
        Ok(out.trim().trim_start_matches('v').to_string())
    }

    pub fn add_repo(&self, name: &str, url: &str) -> Result<(), HelmError> {
        crate::log_info!("Adding missing Helm repo: {} {}", name, url);
        self.run(&["repo", "add", name, url])
    }

    pub fn update_repo(&self) -> Result<(), HelmError> {
        self.run(&["repo", "update"])
    }

    pub fn list_repos(&self) -> Result<Vec<RepoSummary>, HelmError> {
        match self.output(&["repo", "list", "--output", "json"]) {
            Ok(out) => parse_repo_list(&out),
            // helm exits non-zero when no repositories are configured
            Err(HelmError::CommandFailed { stderr, .. }) if stderr.contains("no repositories") => {
                Ok(Vec::new())
            }
            Err(e) => Err(e),
        }
    }

    /// Name of the configured repository pointing at `url`, if any
    pub fn find_repo_by_url(&self, url: &str) -> Result<Option<String>, HelmError> {
        Ok(find_repo_name(&self.list_repos()?, url))
    }

    /// Add `url` as `name` unless some repository already points there.
    /// Returns the name the repository is known by.
    pub fn add_repo_if_missing(&self, url: &str, name: &str) -> Result<String, HelmError> {
        if let Some(existing) = self.find_repo_by_url(url)? {
            return Ok(existing);
        }
        self.add_repo(name, url)?;
        self.update_repo()?;
        Ok(name.to_string())
    }

    pub fn upgrade_install(&self, opts: &InstallChartOptions) -> Result<(), HelmError> {
        let args = install_args(opts);
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        self.run(&args)
    }

    /// Releases in every state, including failed and pending ones
    pub fn list_releases(&self, namespace: &str) -> Result<Vec<ReleaseSummary>, HelmError> {
        let out = self.output(&["list", "--all", "--namespace", namespace, "--output", "json"])?;
        parse_release_list(&out)
    }

    pub fn delete_release(&self, namespace: &str, name: &str) -> Result<(), HelmError> {
        self.run(&["uninstall", name, "--namespace", namespace])
    }

    /// Uninstall `name` when its first install never deployed, so that
    /// `upgrade --install` can start over. Returns whether it was removed.
    pub fn remove_failed_install(&self, namespace: &str, name: &str) -> Result<bool, HelmError> {
        let releases = self.list_releases(namespace)?;
        let Some(release) = releases.iter().find(|r| r.name == name) else {
            return Ok(false);
        };
        if !is_failed_first_install(release) {
            return Ok(false);
        }
        crate::log_warn!(
            "Removing release {} left {} by a previous install",
            name,
            release.status
        );
        self.delete_release(namespace, name)?;
        Ok(true)
    }
}

/// A release that never reached `deployed`; upgrades of it fail with
/// "has no deployed releases"
pub fn is_failed_first_install(release: &ReleaseSummary) -> bool {
    release.revision == "1" && matches!(release.status.as_str(), "failed" | "pending-install")
}

/// Point a `<default_repo>/<chart>` reference at the name the repository
/// is actually registered under
pub fn chart_in_repo(chart: &str, default_repo: &str, repo_name: &str) -> String {
    match chart.strip_prefix(&format!("{}/", default_repo)) {
        Some(name) => format!("{}/{}", repo_name, name),
        None => chart.to_string(),
    }
}

/// Arguments for `helm upgrade --install`
pub fn install_args(opts: &InstallChartOptions) -> Vec<String> {
    let chart = opts.dir.clone().unwrap_or_else(|| opts.chart.clone());
    let mut args = vec![
        "upgrade".to_string(),
        "--install".to_string(),
        opts.release_name.clone(),
        chart,
        "--namespace".to_string(),
        opts.namespace.clone(),
        "--create-namespace".to_string(),
    ];
    if let Some(version) = opts.version.as_deref().filter(|v| !v.is_empty()) {
        args.extend(["--version".to_string(), version.to_string()]);
    }
    if let Some(timeout) = opts.timeout_secs {
        args.extend(["--timeout".to_string(), format!("{}s", timeout)]);
    }
    if opts.wait {
        args.push("--wait".to_string());
    }
    if let Some(repo) = opts.repository.as_deref().filter(|r| !r.is_empty()) {
        args.extend(["--repo".to_string(), repo.to_string()]);
    }
    for value in &opts.set_values {
        args.extend(["--set".to_string(), value.clone()]);
    }
    for value in &opts.secret_values {
        args.extend(["--set-string".to_string(), value.clone()]);
    }
    for file in &opts.value_files {
        args.extend(["--values".to_string(), file.clone()]);
    }
    args
}

fn parse_release_list(out: &str) -> Result<Vec<ReleaseSummary>, HelmError> {
    if out.trim().is_empty() {
        return Ok(Vec::new());
    }
    Ok(serde_json::from_str(out)?)
}

fn parse_repo_list(out: &str) -> Result<Vec<RepoSummary>, HelmError> {
    if out.trim().is_empty() {
        return Ok(Vec::new());
    }
    Ok(serde_json::from_str(out)?)
}

fn find_repo_name(repos: &[RepoSummary], url: &str) -> Option<String> {
    let wanted = url.trim_end_matches('/');
    repos
        .iter()
        .find(|r| r.url.trim_end_matches('/') == wanted)
        .map(|r| r.name.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_install_args() {
        let mut opts = InstallChartOptions::new("jenkins-x/prow", "jx-prow", "jx");
        opts.version = Some("0.0.9".into());
        opts.timeout_secs = Some(600);
        opts.wait = true;
        opts.set_values = vec!["tekton.enabled=true".into()];
        opts.secret_values = vec!["hmacToken=abc".into()];
        opts.value_files = vec!["values.yaml".into()];

        assert_eq!(
            install_args(&opts),
            vec![
                "upgrade", "--install", "jx-prow", "jenkins-x/prow", "--namespace", "jx",
                "--create-namespace", "--version", "0.0.9", "--timeout", "600s", "--wait",
                "--set", "tekton.enabled=true", "--set-string", "hmacToken=abc",
                "--values", "values.yaml",
            ]
        );
    }

    #[test]
    fn test_chart_in_repo() {
        assert_eq!(chart_in_repo("jenkins-x/prow", "jenkins-x", "jx"), "jx/prow");
        assert_eq!(chart_in_repo("stable/nginx-ingress", "stable", "stable"), "stable/nginx-ingress");
        assert_eq!(chart_in_repo("./charts/prow", "jenkins-x", "jx"), "./charts/prow");
    }

    #[test]
    fn test_install_args_uses_dir() {
        let mut opts = InstallChartOptions::new("istio", "istio", "istio-system");
        opts.dir = Some("/tmp/istio/install/kubernetes/helm/istio".into());
        opts.version = Some(String::new());
        let args = install_args(&opts);
        assert_eq!(args[3], "/tmp/istio/install/kubernetes/helm/istio");
        assert!(!args.contains(&"--version".to_string()));
    }

    #[test]
    fn test_parse_release_list() {
        let out = r#"[{"name":"jx-prow","namespace":"jx","revision":"2","updated":"","status":"deployed","chart":"prow-0.0.9","app_version":""}]"#;
        let releases = parse_release_list(out).unwrap();
        assert_eq!(releases.len(), 1);
        assert_eq!(releases[0].name, "jx-prow");
        assert_eq!(releases[0].status, "deployed");
        assert!(parse_release_list("").unwrap().is_empty());
    }

    #[test]
    fn test_find_repo_name() {
        let repos = parse_repo_list(
            r#"[{"name":"jx","url":"https://storage.googleapis.com/chartmuseum.jenkins-x.io/"}]"#,
        )
        .unwrap();
        assert_eq!(find_repo_name(&repos, JENKINS_X_CHART_REPO), Some("jx".to_string()));
        assert_eq!(find_repo_name(&repos, STABLE_CHART_REPO), None);
    }

    #[test]
    fn test_is_failed_first_install() {
        let release = |revision: &str, status: &str| ReleaseSummary {
            name: "jx-prow".into(),
            namespace: "jx".into(),
            revision: revision.into(),
            status: status.into(),
            chart: "prow-0.0.9".into(),
            app_version: String::new(),
        };
        assert!(is_failed_first_install(&release("1", "failed")));
        assert!(is_failed_first_install(&release("1", "pending-install")));
        assert!(!is_failed_first_install(&release("1", "deployed")));
        // a failed upgrade still has an earlier deployed revision
        assert!(!is_failed_first_install(&release("3", "failed")));
    }

    #[test]
    fn test_mutations_skipped_in_dry_run() {
        let _guard = crate::utils::env_lock();
        let helm = HelmCli::new("helm-binary-that-does-not-exist");
        let opts = InstallChartOptions::new("jenkins-x/prow", "jx-prow", "jx");

        unsafe { std::env::remove_var(dryrun::DRY_RUN_ENV) };
        assert!(matches!(helm.upgrade_install(&opts), Err(HelmError::NotInstalled { .. })));

        unsafe { std::env::set_var(dryrun::DRY_RUN_ENV, "1") };
        let installed = helm.upgrade_install(&opts);
        let deleted = helm.delete_release("jx", "jx-prow");
        let added = helm.add_repo(JENKINS_X_REPO_NAME, JENKINS_X_CHART_REPO);
        unsafe { std::env::remove_var(dryrun::DRY_RUN_ENV) };

        assert!(installed.is_ok());
        assert!(deleted.is_ok());
        assert!(added.is_ok());
    }

    #[test]
    fn test_missing_binary() {
        let helm = HelmCli::new("helm-binary-that-does-not-exist");
        assert!(matches!(helm.version(), Err(HelmError::NotInstalled { .. })));
    }
}
