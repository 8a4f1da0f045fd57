//! Prerequisite checking for the binaries jx shells out to

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PrereqError {
    #[error("Tool '{name}' not found")]
    NotFound { name: String, hint: String },
}

/// Trait for checking prerequisites
pub trait Prerequisite {
    /// Name of the prerequisite tool
    fn name(&self) -> &str;

    /// Check if the tool is available
    fn check(&self) -> Result<(), PrereqError>;

    /// Installation hint for the user
    fn install_hint(&self) -> &str;
}

/// Prerequisite satisfied by an executable on the PATH
pub struct CommandPrereq {
    pub name: String,
    pub hint: String,
}

impl CommandPrereq {
    pub fn new(name: impl Into<String>, hint: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            hint: hint.into(),
        }
    }
}

impl Prerequisite for CommandPrereq {
    fn name(&self) -> &str {
        &self.name
    }

    fn check(&self) -> Result<(), PrereqError> {
        which::which(&self.name).map_err(|_| PrereqError::NotFound {
            name: self.name.clone(),
            hint: self.hint.clone(),
        })?;
        Ok(())
    }

    fn install_hint(&self) -> &str {
        &self.hint
    }
}

/// The external tools used by the create commands
pub struct CommonPrereqs;

impl CommonPrereqs {
    pub fn helm() -> CommandPrereq {
        CommandPrereq::new("helm", "Install from: https://helm.sh/docs/intro/install/")
    }

    pub fn kubectl() -> CommandPrereq {
        CommandPrereq::new(
            "kubectl",
            "Install from: https://kubernetes.io/docs/tasks/tools/",
        )
    }

    pub fn gcloud() -> CommandPrereq {
        CommandPrereq::new(
            "gcloud",
            "Install from: https://cloud.google.com/sdk/docs/install",
        )
    }

    /// glooctl is downloaded on demand by `jx create addon gloo`
    pub fn glooctl() -> CommandPrereq {
        CommandPrereq::new(
            "glooctl",
            "Run 'jx create addon gloo' or install from: https://docs.solo.io/gloo-edge/latest/installation/",
        )
    }

    /// istioctl is unpacked from the istio release by `jx create addon istio`
    pub fn istioctl() -> CommandPrereq {
        CommandPrereq::new(
            "istioctl",
            "Run 'jx create addon istio' or install from: https://istio.io/latest/docs/setup/getting-started/",
        )
    }

    pub fn git() -> CommandPrereq {
        CommandPrereq::new("git", "Install from: https://git-scm.com/downloads")
    }

    /// Every tool any create subcommand may need
    pub fn all() -> Vec<CommandPrereq> {
        vec![
            Self::helm(),
            Self::kubectl(),
            Self::gcloud(),
            Self::git(),
            Self::glooctl(),
            Self::istioctl(),
        ]
    }

    /// Check all prerequisites and return detailed results
    /// Returns (found_tools, missing_tools)
    pub fn check_all(prereqs: &[&dyn Prerequisite]) -> (Vec<String>, Vec<(String, String)>) {
        let mut found = Vec::new();
        let mut missing = Vec::new();

        for prereq in prereqs {
            match prereq.check() {
                Ok(_) => {
                    found.push(prereq.name().to_string());
                }
                Err(PrereqError::NotFound { name, hint }) => {
                    missing.push((name, hint));
                }
            }
        }

        (found, missing)
    }
}

/// Fail with an actionable error when a required tool is missing
pub fn require(prereq: &dyn Prerequisite) -> anyhow::Result<()> {
    prereq.check().map_err(|_| {
        crate::utils::errors::JxError::tool_not_found(prereq.name(), prereq.install_hint()).into()
    })
}
