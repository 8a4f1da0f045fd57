//! Running the external binaries jx drives (helm, gcloud, glooctl, git)

use anyhow::{Context, Result, anyhow};
use std::process::Command;
use std::time::Duration;

use crate::utils::dryrun;

/// True for value keys that carry credentials
pub fn is_secret_key(key: &str) -> bool {
    let key = key.to_lowercase();
    key.contains("token") || key.contains("password")
}

/// `key=value` with the value hidden
pub fn mask_value(entry: &str) -> String {
    match entry.split_once('=') {
        Some((k, _)) => format!("{}=****", k),
        None => "****".to_string(),
    }
}

/// Mask the entries of `key=value` pairs whose key looks secret
pub fn mask_secret_values(values: &[String]) -> Vec<String> {
    values
        .iter()
        .map(|v| match v.split_once('=') {
            Some((k, _)) if is_secret_key(k) => mask_value(v),
            _ => v.clone(),
        })
        .collect()
}

/// Render a command line for logs, hiding `--set-string` values and
/// `--set` values with secret keys
pub fn display_command(bin: &str, args: &[&str]) -> String {
    let mut parts = vec![bin.to_string()];
    let mut previous = "";
    for arg in args {
        let secret = match previous {
            "--set-string" => true,
            "--set" => arg.split_once('=').is_some_and(|(k, _)| is_secret_key(k)),
            _ => false,
        };
        parts.push(if secret { mask_value(arg) } else { arg.to_string() });
        previous = *arg;
    }
    parts.join(" ")
}

/// Run a command inheriting stdout/stderr
pub fn run(bin: &str, args: &[&str]) -> Result<()> {
    crate::log_debug!("running {}", display_command(bin, args));
    let status = Command::new(bin)
        .args(args)
        .status()
        .with_context(|| format!("Failed to run {}", bin))?;

    if !status.success() {
        return Err(anyhow!(
            "{} failed: {}",
            bin,
            display_command(bin, args)
        ));
    }

    Ok(())
}

/// Run a command and capture trimmed stdout
pub fn run_output(bin: &str, args: &[&str]) -> Result<String> {
    crate::log_debug!("running {}", display_command(bin, args));
    let output = Command::new(bin)
        .args(args)
        .output()
        .with_context(|| format!("Failed to run {}", bin))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(anyhow!(
            "{} failed: {}\n{}",
            bin,
            display_command(bin, args),
            stderr.trim()
        ));
    }

    Ok(String::from_utf8(output.stdout)?.trim().to_string())
}

/// Run a command that changes state; skipped and logged in dry-run mode
pub fn run_mutating(bin: &str, args: &[&str]) -> Result<()> {
    dryrun::exec_unless_dry_run(&display_command(bin, args), || run(bin, args))
}

/// Retry `f` up to `attempts` times sleeping `delay` between failures
pub async fn retry<T, F>(attempts: usize, delay: Duration, mut f: F) -> Result<T>
where
    F: FnMut() -> Result<T>,
{
    let mut attempt = 1;
    loop {
        match f() {
            Ok(v) => return Ok(v),
            Err(e) if attempt < attempts => {
                crate::log_warn!("Attempt {}/{} failed: {:#}", attempt, attempts, e);
                attempt += 1;
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_command_masks_secrets() {
        let line = display_command(
            "helm",
            &["upgrade", "--set-string", "oauthToken=abc", "--set", "a=b"],
        );
        assert_eq!(line, "helm upgrade --set-string oauthToken=**** --set a=b");
    }

    #[test]
    fn test_display_command_masks_secret_set_values() {
        let line = display_command(
            "helm",
            &["upgrade", "--set", "source.token=abc", "--set", "source.user=bot"],
        );
        assert_eq!(line, "helm upgrade --set source.token=**** --set source.user=bot");
    }

    #[test]
    fn test_mask_secret_values() {
        let values = vec![
            "source.user=bot".to_string(),
            "tekton.auth.git.password=abc".to_string(),
        ];
        assert_eq!(
            mask_secret_values(&values),
            vec!["source.user=bot", "tekton.auth.git.password=****"]
        );
    }

    #[test]
    fn test_run_output() {
        let out = run_output("sh", &["-c", "echo hello"]).unwrap();
        assert_eq!(out, "hello");
    }

    #[test]
    fn test_run_failure_reports_command() {
        let err = run_output("sh", &["-c", "echo nope >&2; exit 3"]).unwrap_err();
        assert!(err.to_string().contains("nope"));
    }

    #[tokio::test]
    async fn test_retry_succeeds_second_time() {
        let mut calls = 0;
        let result = retry(2, Duration::from_millis(1), || {
            calls += 1;
            if calls == 1 { Err(anyhow!("flaky")) } else { Ok(calls) }
        })
        .await
        .unwrap();
        assert_eq!(result, 2);
    }

    #[tokio::test]
    async fn test_retry_gives_up() {
        let mut calls = 0;
        let result: Result<()> = retry(2, Duration::from_millis(1), || {
            calls += 1;
            Err(anyhow!("always"))
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls, 2);
    }
}
