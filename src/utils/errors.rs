//! Enhanced error types with actionable suggestions

use colored::Colorize;
use thiserror::Error;

/// Error with suggestions and documentation links
#[derive(Error, Debug)]
#[error("{message}")]
pub struct JxError {
    pub message: String,
    pub suggestions: Vec<String>,
    pub docs_link: Option<String>,
}

impl JxError {
    /// Create a new error with suggestions
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            suggestions: Vec::new(),
            docs_link: None,
        }
    }

    /// Add a suggestion to the error
    pub fn suggest(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }

    /// Add a documentation link
    pub fn with_docs(mut self, link: impl Into<String>) -> Self {
        self.docs_link = Some(link.into());
        self
    }

    /// Display the error with suggestions
    pub fn display(&self) {
        crate::log_error!("{}", self.message);

        if !self.suggestions.is_empty() {
            eprintln!();
            eprintln!("{}", "Suggestions:".yellow().bold());
            for suggestion in &self.suggestions {
                eprintln!("  {} {}", "→".blue(), suggestion);
            }
        }

        if let Some(docs) = &self.docs_link {
            eprintln!();
            eprintln!("{} {}", "Documentation:".cyan(), docs);
        }
    }

    /// A required flag was not supplied and could not be prompted for
    pub fn missing_option(name: &str) -> Self {
        Self::new(format!("missing option: --{}", name))
            .suggest(format!("Pass the value with --{}", name))
            .suggest("Run without --batch-mode to be prompted for missing values")
    }

    /// A required binary is not on the PATH
    pub fn tool_not_found(tool: &str, install_hint: &str) -> Self {
        Self::new(format!("Required tool '{}' not found", tool))
            .suggest(format!("Install with: {}", install_hint))
            .suggest("Ensure the tool is in your PATH")
            .suggest("Run 'jx check' to see all prerequisites")
    }

    /// No dev namespace could be resolved
    pub fn dev_namespace_not_found(namespace: &str) -> Self {
        Self::new(format!(
            "cannot find a dev team namespace from namespace '{}'",
            namespace
        ))
        .suggest("Switch to the team namespace: kubectl config set-context --current --namespace jx")
        .suggest("Pass --namespace explicitly")
    }

    /// A Deployment never became ready
    pub fn deployment_not_ready(name: &str, namespace: &str) -> Self {
        Self::new(format!(
            "Deployment {}/{} failed to become ready",
            namespace, name
        ))
        .suggest(format!("Check pod status: kubectl get pods -n {}", namespace))
        .suggest(format!(
            "Describe the deployment: kubectl describe deployment {} -n {}",
            name, namespace
        ))
        .suggest("Increase the wait with --timeout")
    }

    /// Permission denied talking to the cluster or cloud
    pub fn permission_denied(operation: &str) -> Self {
        Self::new(format!("Permission denied: {}", operation))
            .suggest("Verify you have sufficient cluster permissions")
            .suggest("Check if you need the cluster-admin role")
    }

    /// The cluster did not answer in time
    pub fn connection_timeout(resource: &str) -> Self {
        Self::new(format!("Timeout waiting for {}", resource))
            .suggest("Check if the cluster is healthy")
            .suggest("Verify network connectivity")
            .suggest("Check for pending pods: kubectl get pods --all-namespaces")
    }

    /// gcloud is not authenticated
    pub fn gcloud_not_logged_in() -> Self {
        Self::new("Not logged into Google Cloud")
            .suggest("Log in with: gcloud auth login")
            .suggest("Or drop --skip-login so jx runs the login for you")
    }

    /// Codeship rejected the project request
    pub fn codeship_project_failed(reason: &str) -> Self {
        Self::new(format!("failed to create project: {}", reason))
            .suggest("Check Codeship is configured to authenticate against your Git provider")
            .with_docs("https://app.codeship.com/authentications")
    }
}

/// Convert anyhow error to JxError when possible
pub fn enhance_error(err: &anyhow::Error) -> JxError {
    if let Some(jx) = err.downcast_ref::<JxError>() {
        return JxError {
            message: jx.message.clone(),
            suggestions: jx.suggestions.clone(),
            docs_link: jx.docs_link.clone(),
        };
    }

    let err_str = format!("{:#}", err);
    let lower = err_str.to_lowercase();

    if lower.contains("connection refused") || lower.contains("timed out") {
        return JxError::connection_timeout("cluster");
    }

    if lower.contains("unauthorized") || lower.contains("forbidden") {
        return JxError::permission_denied("cluster operation");
    }

    if lower.contains("gcloud auth login") || lower.contains("no credentialed accounts") {
        return JxError::gcloud_not_logged_in();
    }

    JxError::new(err_str)
        .suggest("Run with -v for more details")
        .suggest("Re-run with --dry-run to see what would be executed")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_option_error() {
        let err = JxError::missing_option("source-url");
        assert_eq!(err.message, "missing option: --source-url");
        assert_eq!(err.suggestions.len(), 2);
    }

    #[test]
    fn test_error_with_docs() {
        let err = JxError::new("test error").with_docs("https://jenkins-x.io");
        assert!(err.docs_link.is_some());
    }

    #[test]
    fn test_enhance_keeps_jx_error() {
        let err = anyhow::Error::new(JxError::missing_option("name"));
        let enhanced = enhance_error(&err);
        assert_eq!(enhanced.message, "missing option: --name");
    }

    #[test]
    fn test_enhance_forbidden() {
        let err = anyhow::anyhow!("services is forbidden: User cannot get resource");
        let enhanced = enhance_error(&err);
        assert!(enhanced.message.starts_with("Permission denied"));
    }

    #[test]
    fn test_enhance_default_suggestions() {
        let err = anyhow::anyhow!("boom");
        let enhanced = enhance_error(&err);
        assert_eq!(enhanced.message, "boom");
        assert_eq!(enhanced.suggestions.len(), 2);
    }
}
