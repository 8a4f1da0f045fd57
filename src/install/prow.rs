//! Prow addon with either Tekton or Knative build as the pipeline engine

use anyhow::{Context, Result};
use k8s_openapi::api::core::v1::Service;
use kube::Client;
use serde_json::json;
use std::collections::BTreeMap;
use std::time::Duration;

use crate::helm::{
    HelmCli, InstallChartOptions, JENKINS_X_CHART_REPO, JENKINS_X_REPO_NAME, chart_in_repo,
};
use crate::k8s::{config_maps, namespaces, secrets, services};
use crate::utils::{logger::info, process::retry};

pub const DEFAULT_RELEASE: &str = "jx-prow";
pub const DEFAULT_CHART: &str = "jenkins-x/prow";
pub const HMAC_TOKEN_LENGTH: usize = 41;

const TEKTON_RELEASE: &str = "tekton";
const KNATIVE_BUILD_RELEASE: &str = "knative-build";
const BUILD_TEMPLATES_RELEASE: &str = "jx-build-templates";
const HOOK: &str = "hook";

/// Secret the Prow chart stores the webhook HMAC token in
pub const HMAC_SECRET: &str = "hmac-token";
const HMAC_SECRET_KEY: &str = "hmac";

pub const CONFIG_MAP: &str = "config";
pub const PLUGINS_CONFIG_MAP: &str = "plugins";
const CONFIG_FILE: &str = "config.yaml";
const PLUGINS_FILE: &str = "plugins.yaml";
/// Placeholder repository so tide does not scan every repository on the git server
const PLACEHOLDER_REPO: &str = "jenkins-x/dummy";

const PLUGINS: &[&str] = &[
    "config-updater", "approve", "assign", "blunderbuss", "help", "hold", "lgtm", "lifecycle",
    "size", "trigger", "wip", "heart", "cat", "override",
];
const TIDE_MISSING_LABELS: &[&str] = &[
    "do-not-merge",
    "do-not-merge/hold",
    "do-not-merge/work-in-progress",
    "needs-ok-to-test",
    "needs-rebase",
];
const PRESUBMIT_CONTEXT: &str = "serverless-jenkins";
const TEST_TRIGGER: &str = "(?m)^/test( all| this),?(\\s+|$)";

const RETRY_ATTEMPTS: usize = 2;
const RETRY_DELAY: Duration = Duration::from_secs(1);

/// Prow install settings with credentials already resolved
#[derive(Debug, Clone)]
pub struct ProwOptions {
    pub namespace: String,
    pub release_name: String,
    pub chart: String,
    pub version: Option<String>,
    pub set_values: Vec<String>,
    pub value_files: Vec<String>,
    pub tekton: bool,
    pub hmac_token: String,
    pub oauth_token: String,
    pub username: String,
    pub timeout_secs: Option<u64>,
}

fn base_options(opts: &ProwOptions, chart: String, release: &str) -> InstallChartOptions {
    let mut chart_opts = InstallChartOptions::new(chart, release, &opts.namespace);
    chart_opts.timeout_secs = opts.timeout_secs;
    chart_opts
}

pub fn tekton_chart_options(opts: &ProwOptions, repo_name: &str) -> InstallChartOptions {
    let mut chart_opts = base_options(opts, format!("{}/tekton", repo_name), TEKTON_RELEASE);
    chart_opts.set_values = vec![format!("auth.git.username={}", opts.username)];
    chart_opts.secret_values = vec![format!("auth.git.password={}", opts.oauth_token)];
    chart_opts
}

fn user_set_values(opts: &ProwOptions) -> impl Iterator<Item = String> + '_ {
    opts.set_values.iter().filter(|v| !v.is_empty()).cloned()
}

fn credential_values(opts: &ProwOptions) -> Vec<String> {
    vec![
        format!("user={}", opts.username),
        format!("oauthToken={}", opts.oauth_token),
        format!("hmacToken={}", opts.hmac_token),
    ]
}

pub fn knative_build_chart_options(opts: &ProwOptions, repo_name: &str) -> InstallChartOptions {
    let mut chart_opts =
        base_options(opts, format!("{}/knative-build", repo_name), KNATIVE_BUILD_RELEASE);
    chart_opts.set_values = vec![format!("build.auth.git.username={}", opts.username)];
    chart_opts.set_values.extend(user_set_values(opts));
    chart_opts.secret_values = vec![format!("build.auth.git.password={}", opts.oauth_token)];
    chart_opts
}

pub fn prow_chart_options(opts: &ProwOptions, repo_name: &str) -> InstallChartOptions {
    let mut chart_opts = base_options(
        opts,
        chart_in_repo(&opts.chart, JENKINS_X_REPO_NAME, repo_name),
        &opts.release_name,
    );
    chart_opts.version = opts.version.clone();
    chart_opts.set_values = user_set_values(opts).collect();
    if opts.tekton {
        chart_opts.set_values.extend([
            "buildnum.enabled=false".to_string(),
            "build.enabled=false".to_string(),
            "pipelinerunner.enabled=true".to_string(),
        ]);
    }
    chart_opts.secret_values = credential_values(opts);
    chart_opts.value_files = opts.value_files.clone();
    chart_opts
}

pub fn build_templates_chart_options(opts: &ProwOptions, repo_name: &str) -> InstallChartOptions {
    let mut chart_opts = base_options(
        opts,
        format!("{}/jx-build-templates", repo_name),
        BUILD_TEMPLATES_RELEASE,
    );
    chart_opts.set_values = user_set_values(opts).collect();
    chart_opts.secret_values = credential_values(opts);
    chart_opts
}

/// The pipeline agent Prow jobs are run with
fn agent(tekton: bool) -> &'static str {
    if tekton { "tekton" } else { "knative-build" }
}

/// `config.yaml` for a fresh install: tide, presubmit and postsubmit entries
/// for the placeholder repository only
pub fn initial_config(namespace: &str, tekton: bool) -> Result<String> {
    let config = json!({
        "prowjob_namespace": namespace,
        "pod_namespace": namespace,
        "tide": {
            "queries": [{
                "repos": [PLACEHOLDER_REPO],
                "labels": ["approved"],
                "missingLabels": TIDE_MISSING_LABELS,
            }]
        },
        "presubmits": {
            PLACEHOLDER_REPO: [{
                "name": PRESUBMIT_CONTEXT,
                "context": PRESUBMIT_CONTEXT,
                "agent": agent(tekton),
                "always_run": true,
                "skip_report": false,
                "rerun_command": "/test this",
                "trigger": TEST_TRIGGER,
            }]
        },
        "postsubmits": {
            PLACEHOLDER_REPO: [{
                "name": "release",
                "agent": agent(tekton),
                "branches": ["master"],
            }]
        },
    });
    serde_yaml::to_string(&config).context("failed to render the prow config")
}

/// `plugins.yaml` for a fresh install
pub fn initial_plugins() -> Result<String> {
    let plugins = json!({
        "config_updater": {
            "maps": {
                "prow/config.yaml": { "name": CONFIG_MAP },
                "prow/plugins.yaml": { "name": PLUGINS_CONFIG_MAP },
            }
        },
        "plugins": { PLACEHOLDER_REPO: PLUGINS },
        "welcome": [{ "message_template": "Welcome" }],
    });
    serde_yaml::to_string(&plugins).context("failed to render the prow plugins config")
}

/// Create the Prow config and plugins ConfigMaps unless a config already exists
pub async fn ensure_initial_config(client: &Client, namespace: &str, tekton: bool) -> Result<()> {
    let config = BTreeMap::from([(CONFIG_FILE.to_string(), initial_config(namespace, tekton)?)]);
    if !config_maps::create_config_map_if_missing(client, namespace, CONFIG_MAP, config).await? {
        crate::log_debug!("Prow config map already exists in {}", namespace);
        return Ok(());
    }
    crate::log_info!("Created initial Prow config in namespace {}", info(namespace));
    let plugins = BTreeMap::from([(PLUGINS_FILE.to_string(), initial_plugins()?)]);
    config_maps::create_config_map_if_missing(client, namespace, PLUGINS_CONFIG_MAP, plugins)
        .await?;
    Ok(())
}

/// HMAC token of an earlier install, so reinstalling keeps existing webhooks valid
pub async fn existing_hmac_token(client: &Client, namespace: &str) -> Option<String> {
    match secrets::secret_value(client, namespace, HMAC_SECRET, HMAC_SECRET_KEY).await {
        Ok(token) => token.filter(|t| !t.is_empty()),
        Err(e) => {
            crate::log_debug!("unable to read the existing hmac token: {:#}", e);
            None
        }
    }
}

/// `fabric8.io/exposeUrl` for a hook Service reachable through its LoadBalancer
/// that nothing has recorded a URL for yet
pub fn hook_url_annotation(svc: &Service) -> Option<BTreeMap<String, String>> {
    let recorded = svc
        .metadata
        .annotations
        .as_ref()
        .is_some_and(|a| a.contains_key(services::EXPOSE_URL_ANNOTATION));
    if recorded {
        return None;
    }
    let url = services::service_url(svc)?;
    Some(BTreeMap::from([(services::EXPOSE_URL_ANNOTATION.to_string(), url)]))
}

async fn install_with_retry(helm: &HelmCli, chart_opts: &InstallChartOptions) -> Result<()> {
    retry(RETRY_ATTEMPTS, RETRY_DELAY, || {
        helm.remove_failed_install(&chart_opts.namespace, &chart_opts.release_name)?;
        helm.upgrade_install(chart_opts).map_err(anyhow::Error::from)
    })
    .await
    .with_context(|| format!("failed to install chart {}", chart_opts.chart))
}

/// Print the hook URL, asking Exposecontroller for an Ingress when the
/// Service has no address of its own
async fn publish_hook(client: &Client, namespace: &str) -> Result<()> {
    let svc = services::get_service(client, namespace, HOOK).await?;
    if let Some(annotations) = hook_url_annotation(&svc) {
        services::annotate_service(client, namespace, HOOK, &annotations).await?;
    }
    match services::service_url(&svc) {
        Some(url) => crate::log_info!("Prow webhook URL: {}hook", info(url)),
        None => {
            services::expose_service(client, namespace, HOOK).await?;
            crate::log_info!(
                "Prow {} service has no external URL yet, Exposecontroller will publish it",
                HOOK
            );
        }
    }
    Ok(())
}

pub async fn install(
    helm: &HelmCli,
    client: &Client,
    opts: &ProwOptions,
    timeout: Duration,
) -> Result<()> {
    let repo_name = helm
        .add_repo_if_missing(JENKINS_X_CHART_REPO, JENKINS_X_REPO_NAME)
        .context("failed to add the jenkins-x chart repository")?;

    namespaces::ensure_namespace(client, &opts.namespace).await?;
    ensure_initial_config(client, &opts.namespace, opts.tekton).await?;

    if opts.tekton {
        crate::log_info!("Installing Tekton into namespace {}", info(&opts.namespace));
        install_with_retry(helm, &tekton_chart_options(opts, &repo_name)).await?;
    } else {
        crate::log_info!("Installing Knative Build into namespace {}", info(&opts.namespace));
        install_with_retry(helm, &knative_build_chart_options(opts, &repo_name)).await?;
    }

    crate::log_info!("Installing Prow into namespace {}", info(&opts.namespace));
    install_with_retry(helm, &prow_chart_options(opts, &repo_name)).await?;

    if !opts.tekton {
        crate::log_info!("Installing BuildTemplates into namespace {}", info(&opts.namespace));
        install_with_retry(helm, &build_templates_chart_options(opts, &repo_name)).await?;
    }

    if super::skip_waits("prow hook") {
        return Ok(());
    }
    crate::log_info!("Waiting for Prow {} to be ready", HOOK);
    super::wait_for_deployment(client, HOOK, &opts.namespace, timeout).await?;

    if let Err(e) = publish_hook(client, &opts.namespace).await {
        crate::log_warn!("Unable to publish the {} service: {:#}", HOOK, e);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(tekton: bool) -> ProwOptions {
        ProwOptions {
            namespace: "jx".into(),
            release_name: DEFAULT_RELEASE.into(),
            chart: DEFAULT_CHART.into(),
            version: None,
            set_values: vec!["foo=bar".into()],
            value_files: Vec::new(),
            tekton,
            hmac_token: "hmac".into(),
            oauth_token: "oauth".into(),
            username: "jenkins-x-bot".into(),
            timeout_secs: Some(600),
        }
    }

    #[test]
    fn test_tekton_mode_values() {
        let opts = options(true);
        let tekton = tekton_chart_options(&opts, "jenkins-x");
        assert_eq!(tekton.chart, "jenkins-x/tekton");
        assert_eq!(tekton.set_values, vec!["auth.git.username=jenkins-x-bot"]);
        assert_eq!(tekton.secret_values, vec!["auth.git.password=oauth"]);

        let prow = prow_chart_options(&opts, "jenkins-x");
        assert_eq!(
            prow.set_values,
            vec![
                "foo=bar",
                "buildnum.enabled=false",
                "build.enabled=false",
                "pipelinerunner.enabled=true"
            ]
        );
        assert_eq!(
            prow.secret_values,
            vec!["user=jenkins-x-bot", "oauthToken=oauth", "hmacToken=hmac"]
        );
    }

    #[test]
    fn test_knative_mode_values() {
        let opts = options(false);
        let build = knative_build_chart_options(&opts, "jenkins-x");
        assert_eq!(build.release_name, "knative-build");
        assert_eq!(build.set_values, vec!["build.auth.git.username=jenkins-x-bot", "foo=bar"]);
        assert_eq!(build.secret_values, vec!["build.auth.git.password=oauth"]);

        let prow = prow_chart_options(&opts, "jenkins-x");
        assert_eq!(prow.set_values, vec!["foo=bar"]);

        let templates = build_templates_chart_options(&opts, "jx");
        assert_eq!(templates.chart, "jx/jx-build-templates");
        assert_eq!(templates.release_name, "jx-build-templates");
        assert_eq!(templates.set_values, vec!["foo=bar"]);
        assert_eq!(
            templates.secret_values,
            vec!["user=jenkins-x-bot", "oauthToken=oauth", "hmacToken=hmac"]
        );
    }

    #[test]
    fn test_initial_config() {
        let config: serde_yaml::Value =
            serde_yaml::from_str(&initial_config("jx", true).unwrap()).unwrap();
        assert_eq!(config["prowjob_namespace"].as_str(), Some("jx"));
        assert_eq!(config["pod_namespace"].as_str(), Some("jx"));
        assert_eq!(config["tide"]["queries"][0]["repos"][0].as_str(), Some("jenkins-x/dummy"));
        let presubmit = &config["presubmits"]["jenkins-x/dummy"][0];
        assert_eq!(presubmit["name"].as_str(), Some("serverless-jenkins"));
        assert_eq!(presubmit["agent"].as_str(), Some("tekton"));
        assert_eq!(presubmit["trigger"].as_str(), Some("(?m)^/test( all| this),?(\\s+|$)"));
        let postsubmit = &config["postsubmits"]["jenkins-x/dummy"][0];
        assert_eq!(postsubmit["branches"][0].as_str(), Some("master"));

        let knative: serde_yaml::Value =
            serde_yaml::from_str(&initial_config("jx", false).unwrap()).unwrap();
        assert_eq!(
            knative["presubmits"]["jenkins-x/dummy"][0]["agent"].as_str(),
            Some("knative-build")
        );
    }

    #[test]
    fn test_initial_plugins() {
        let plugins: serde_yaml::Value = serde_yaml::from_str(&initial_plugins().unwrap()).unwrap();
        assert_eq!(
            plugins["config_updater"]["maps"]["prow/config.yaml"]["name"].as_str(),
            Some("config")
        );
        let enabled = plugins["plugins"]["jenkins-x/dummy"].as_sequence().unwrap();
        assert_eq!(enabled.len(), PLUGINS.len());
        assert_eq!(enabled[0].as_str(), Some("config-updater"));
    }

    fn hook_service(value: serde_json::Value) -> Service {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_hook_url_annotation() {
        let balanced = hook_service(json!({
            "metadata": {"name": "hook"},
            "spec": {"type": "LoadBalancer", "ports": [{"port": 80}]},
            "status": {"loadBalancer": {"ingress": [{"ip": "35.1.2.3"}]}}
        }));
        let annotations = hook_url_annotation(&balanced).unwrap();
        assert_eq!(
            annotations.get(services::EXPOSE_URL_ANNOTATION).map(String::as_str),
            Some("http://35.1.2.3/")
        );

        let recorded = hook_service(json!({
            "metadata": {
                "name": "hook",
                "annotations": {"fabric8.io/exposeUrl": "http://hook.jx.example.com"}
            },
            "spec": {"type": "ClusterIP"}
        }));
        assert_eq!(hook_url_annotation(&recorded), None);

        let internal =
            hook_service(json!({"metadata": {"name": "hook"}, "spec": {"type": "ClusterIP"}}));
        assert_eq!(hook_url_annotation(&internal), None);
    }

    #[tokio::test]
    async fn test_existing_hmac_token() {
        use crate::k8s::testing::{mock_client, not_found, respond};

        let (client, mut handle) = mock_client();
        let server = tokio::spawn(async move {
            let req = respond(
                &mut handle,
                200,
                json!({
                    "apiVersion": "v1", "kind": "Secret",
                    "metadata": {"name": "hmac-token", "namespace": "jx"},
                    "data": {"hmac": "c2VjcmV0"}
                }),
            )
            .await;
            assert_eq!(req.path, "/api/v1/namespaces/jx/secrets/hmac-token");
            respond(&mut handle, 404, not_found()).await;
        });

        assert_eq!(existing_hmac_token(&client, "jx").await.as_deref(), Some("secret"));
        assert_eq!(existing_hmac_token(&client, "jx").await, None);
        server.await.unwrap();
    }
}
