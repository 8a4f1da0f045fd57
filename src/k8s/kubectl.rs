//! Kubectl wrapper utilities

use anyhow::Result;
use std::path::Path;

use crate::utils::{dryrun, process};

fn with_kubeconfig<'a>(args: &[&'a str], kubeconfig: Option<&'a str>) -> Vec<&'a str> {
    let mut all = args.to_vec();
    if let Some(kc) = kubeconfig {
        all.extend(["--kubeconfig", kc]);
    }
    all
}

/// Run a kubectl command with optional kubeconfig
pub fn run_kubectl(args: &[&str], kubeconfig: Option<&Path>) -> Result<()> {
    let kc = kubeconfig.map(|p| p.to_string_lossy().into_owned());
    process::run("kubectl", &with_kubeconfig(args, kc.as_deref()))
}

/// Run kubectl and capture output
pub fn run_kubectl_output(args: &[&str], kubeconfig: Option<&Path>) -> Result<String> {
    let kc = kubeconfig.map(|p| p.to_string_lossy().into_owned());
    process::run_output("kubectl", &with_kubeconfig(args, kc.as_deref()))
}

/// Name of the current kube context
pub fn current_context(kubeconfig: Option<&Path>) -> Result<String> {
    run_kubectl_output(&["config", "current-context"], kubeconfig)
}

/// User of the current kube context, empty when it has none
pub fn current_user(kubeconfig: Option<&Path>) -> Result<String> {
    run_kubectl_output(
        &[
            "config",
            "view",
            "--minify",
            "-o",
            "jsonpath={.contexts[0].context.user}",
        ],
        kubeconfig,
    )
}

/// Point `context` at `namespace`
pub fn set_context_namespace(context: &str, namespace: &str, kubeconfig: Option<&Path>) -> Result<()> {
    let ns_arg = format!("--namespace={}", namespace);
    let args = ["config", "set-context", context, ns_arg.as_str()];
    dryrun::exec_unless_dry_run(&format!("kubectl {}", args.join(" ")), || {
        run_kubectl(&args, kubeconfig)
    })
}

/// The command users can run later to read a LoadBalancer address
pub fn external_ip_hint(service: &str, namespace: &str) -> String {
    format!(
        "kubectl get service {} -n {} -o jsonpath='{{.status.loadBalancer.ingress[0].ip}}'",
        service, namespace
    )
}
