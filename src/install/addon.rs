//! Chart-backed addons that only need a helm install

use anyhow::{Context, Result, anyhow};
use std::path::{Path, PathBuf};

use crate::helm::values::{combine_value_files_to_file, is_local_chart, set_values_to_map};
use crate::helm::{
    HelmCli, InstallChartOptions, JENKINS_X_CHART_REPO, JENKINS_X_REPO_NAME, STABLE_CHART_REPO,
    STABLE_REPO_NAME, chart_in_repo,
};
use crate::utils::logger::info;

/// A chart-backed addon known to `jx create addon <name>`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddonSpec {
    pub name: &'static str,
    /// `<repo>/<chart>` reference
    pub chart: &'static str,
    pub repo_name: &'static str,
    pub repo_url: &'static str,
    pub release: &'static str,
    /// Namespace used when `--namespace` is not given; the dev namespace otherwise
    pub namespace: Option<&'static str>,
}

const fn jx_chart(name: &'static str, chart: &'static str, release: &'static str) -> AddonSpec {
    AddonSpec {
        name,
        chart,
        repo_name: JENKINS_X_REPO_NAME,
        repo_url: JENKINS_X_CHART_REPO,
        release,
        namespace: None,
    }
}

pub const ADDONS: &[AddonSpec] = &[
    AddonSpec {
        name: "ambassador",
        chart: "datawire/ambassador",
        repo_name: "datawire",
        repo_url: "https://www.getambassador.io",
        release: "ambassador",
        namespace: Some("kube-system"),
    },
    AddonSpec {
        name: "anchore",
        chart: "stable/anchore-engine",
        repo_name: STABLE_REPO_NAME,
        repo_url: STABLE_CHART_REPO,
        release: "anchore",
        namespace: Some("anchore"),
    },
    AddonSpec {
        name: "flagger",
        chart: "flagger/flagger",
        repo_name: "flagger",
        repo_url: "https://flagger.app",
        release: "flagger",
        namespace: Some("istio-system"),
    },
    jx_chart("gitea", "jenkins-x/gitea", "jx-gitea"),
    AddonSpec {
        name: "kubeless",
        chart: "incubator/kubeless",
        repo_name: "incubator",
        repo_url: "https://charts.helm.sh/incubator",
        release: "kubeless",
        namespace: None,
    },
    jx_chart("owasp-zap", "jenkins-x/owasp-zap", "owasp-zap"),
    jx_chart("pipeline-events", "jenkins-x/pipeline-events", "jx-pipeline-events"),
    AddonSpec {
        name: "prometheus",
        chart: "stable/prometheus",
        repo_name: STABLE_REPO_NAME,
        repo_url: STABLE_CHART_REPO,
        release: "prometheus",
        namespace: None,
    },
    jx_chart("vault-operator", "jenkins-x/vault-operator", "vault-operator"),
    jx_chart("knative-build", "jenkins-x/knative-build", "knative-build"),
];

pub fn find_addon(name: &str) -> Result<&'static AddonSpec> {
    ADDONS.iter().find(|a| a.name == name).ok_or_else(|| {
        anyhow!(
            "unknown addon '{}', available addons are: {}",
            name,
            available_addons().join(", ")
        )
    })
}

pub fn available_addons() -> Vec<&'static str> {
    let mut names: Vec<&str> = ADDONS.iter().map(|a| a.name).collect();
    names.sort_unstable();
    names
}

#[derive(Debug, Clone, Default)]
pub struct AddonOptions {
    pub namespace: String,
    pub release_name: Option<String>,
    /// Overrides the addon's chart, for example a local chart directory
    pub chart: Option<String>,
    pub version: Option<String>,
    pub set_values: Vec<String>,
    pub value_files: Vec<String>,
    pub timeout_secs: Option<u64>,
    /// GitOps environment repository; values are written there instead of installing
    pub env_dir: Option<PathBuf>,
}

/// Install options for `addon` with the repository known as `repo_name`
pub fn chart_options(addon: &AddonSpec, opts: &AddonOptions, repo_name: &str) -> InstallChartOptions {
    let chart = match opts.chart.as_deref().filter(|c| !c.is_empty()) {
        Some(chart) => chart.to_string(),
        None => chart_in_repo(addon.chart, addon.repo_name, repo_name),
    };
    let release = opts
        .release_name
        .clone()
        .filter(|r| !r.is_empty())
        .unwrap_or_else(|| addon.release.to_string());

    let mut chart_opts = InstallChartOptions::new(chart, release, &opts.namespace);
    if is_local_chart(&chart_opts.chart) {
        chart_opts.dir = Some(chart_opts.chart.clone());
    } else {
        chart_opts.version = opts.version.clone();
    }
    chart_opts.set_values = opts.set_values.clone();
    chart_opts.value_files = opts.value_files.clone();
    chart_opts.timeout_secs = opts.timeout_secs;
    chart_opts
}

/// Values file the environment pipeline applies for `env_dir`
pub fn env_values_file(env_dir: &Path) -> PathBuf {
    env_dir.join("env").join("values.yaml")
}

/// Record the addon values in a GitOps environment repository, nested under
/// the chart name the environment's umbrella chart depends on
pub fn write_env_values(addon: &AddonSpec, opts: &AddonOptions, env_dir: &Path) -> Result<PathBuf> {
    let out = env_values_file(env_dir);
    let inputs: Vec<&Path> = opts.value_files.iter().map(Path::new).collect();
    let extra = set_values_to_map(&opts.set_values);
    let chart_name = addon.chart.rsplit('/').next().unwrap_or(addon.chart);
    combine_value_files_to_file(&out, &inputs, chart_name, &extra)?;
    Ok(out)
}

pub fn install(helm: &HelmCli, addon: &AddonSpec, opts: &AddonOptions) -> Result<()> {
    if let Some(env_dir) = &opts.env_dir {
        let out = write_env_values(addon, opts, env_dir)?;
        crate::log_info!(
            "Added {} values to {}, commit and push the environment to apply them",
            info(addon.name),
            info(out.display())
        );
        return Ok(());
    }

    let local = opts.chart.as_deref().is_some_and(is_local_chart);
    let repo_name = if local {
        addon.repo_name.to_string()
    } else {
        helm.add_repo_if_missing(addon.repo_url, addon.repo_name)
            .with_context(|| format!("failed to add chart repository {}", addon.repo_url))?
    };

    let chart_opts = chart_options(addon, opts, &repo_name);
    crate::log_info!(
        "Installing addon {} as release {} in namespace {}",
        info(addon.name),
        info(&chart_opts.release_name),
        info(&chart_opts.namespace)
    );
    helm.upgrade_install(&chart_opts)
        .with_context(|| format!("failed to install addon {}", addon.name))?;
    crate::log_info!("Addon {} installed", info(addon.name));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_find_addon() {
        let addon = find_addon("anchore").unwrap();
        assert_eq!(addon.chart, "stable/anchore-engine");

        let err = find_addon("nope").unwrap_err().to_string();
        assert!(err.contains("unknown addon 'nope'"));
        assert!(err.contains("ambassador, anchore"));
    }

    #[test]
    fn test_addon_names_are_unique() {
        let mut names = available_addons();
        names.dedup();
        assert_eq!(names.len(), ADDONS.len());
    }

    #[test]
    fn test_chart_options_defaults() {
        let addon = find_addon("gitea").unwrap();
        let opts = AddonOptions {
            namespace: "jx".into(),
            version: Some("1.0.0".into()),
            ..Default::default()
        };
        let chart = chart_options(addon, &opts, "jx-charts");
        assert_eq!(chart.chart, "jx-charts/gitea");
        assert_eq!(chart.release_name, "jx-gitea");
        assert_eq!(chart.version.as_deref(), Some("1.0.0"));
        assert!(chart.dir.is_none());
    }

    #[test]
    fn test_chart_options_local_chart() {
        let addon = find_addon("prometheus").unwrap();
        let opts = AddonOptions {
            namespace: "monitoring".into(),
            release_name: Some("prom".into()),
            chart: Some("./charts/prometheus".into()),
            version: Some("1.0.0".into()),
            ..Default::default()
        };
        let chart = chart_options(addon, &opts, STABLE_REPO_NAME);
        assert_eq!(chart.dir.as_deref(), Some("./charts/prometheus"));
        assert_eq!(chart.release_name, "prom");
        assert!(chart.version.is_none());
    }

    #[test]
    fn test_write_env_values() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("env")).unwrap();
        let values = dir.path().join("extra.yaml");
        fs::write(&values, "persistence:\n  enabled: true\n").unwrap();

        let addon = find_addon("anchore").unwrap();
        let opts = AddonOptions {
            set_values: vec!["postgresql.enabled=false".into()],
            value_files: vec![values.display().to_string()],
            ..Default::default()
        };
        let out = write_env_values(addon, &opts, dir.path()).unwrap();

        let text = fs::read_to_string(out).unwrap();
        let written: serde_yaml::Mapping = serde_yaml::from_str(&text).unwrap();
        let expected: serde_yaml::Mapping = serde_yaml::from_str(
            "anchore-engine:\n  persistence:\n    enabled: true\n  postgresql:\n    enabled: false\n",
        )
        .unwrap();
        assert_eq!(written, expected);
    }
}
