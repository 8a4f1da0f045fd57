//! Google Kubernetes Engine via the gcloud CLI

use std::fs;
use std::io::Error as IoError;
use std::path::{Path, PathBuf};
use std::process::Command;
use thiserror::Error;

use crate::utils::dryrun;
use crate::utils::process::display_command;

pub const DEFAULT_MACHINE_TYPE: &str = "n1-standard-2";

/// Scopes granted when `--enhanced-scopes` is used
pub const ENHANCED_SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/cloud-platform",
    "https://www.googleapis.com/auth/compute",
    "https://www.googleapis.com/auth/devstorage.full_control",
    "https://www.googleapis.com/auth/service.management",
    "https://www.googleapis.com/auth/servicecontrol",
    "https://www.googleapis.com/auth/logging.write",
    "https://www.googleapis.com/auth/monitoring",
];

/// APIs enabled on every project a cluster is created in
pub const REQUIRED_APIS: &[&str] = &["container", "compute"];
/// APIs enabled with `--enhanced-apis`
pub const ENHANCED_APIS: &[&str] = &["cloudbuild", "containerregistry", "containeranalysis"];

/// Default minimum node count for zonal (false) or regional (true) clusters
pub fn default_min_nodes(regional: bool) -> u32 {
    if regional { 1 } else { 3 }
}

/// Default maximum node count for zonal (false) or regional (true) clusters
pub fn default_max_nodes(regional: bool) -> u32 {
    if regional { 2 } else { 5 }
}

#[derive(Error, Debug)]
pub enum GcloudError {
    #[error("Unable to find 'gcloud' executable. See https://cloud.google.com/sdk/docs/install")]
    NotInstalled {
        #[source]
        source: IoError,
    },
    #[error("gcloud command failed: {command}\n{stderr}")]
    CommandFailed { command: String, stderr: String },
    #[error("cannot {0} without a project id")]
    MissingProject(&'static str),
    #[error("failed to write service account key directory {path}: {source}")]
    KeyDir {
        path: PathBuf,
        #[source]
        source: IoError,
    },
}

/// Where a cluster lives
#[derive(Debug, Clone, PartialEq)]
pub enum Location {
    Zone(String),
    Region(String),
}

impl Location {
    pub fn flag(&self) -> (&'static str, &str) {
        match self {
            Location::Zone(z) => ("--zone", z),
            Location::Region(r) => ("--region", r),
        }
    }

    pub fn is_regional(&self) -> bool {
        matches!(self, Location::Region(_))
    }
}

/// Everything `gcloud container clusters create` needs
#[derive(Debug, Clone)]
pub struct GkeClusterSpec {
    pub name: String,
    pub location: Location,
    pub machine_type: String,
    pub min_nodes: u32,
    pub max_nodes: u32,
    pub disk_size: Option<String>,
    pub cluster_ipv4_cidr: Option<String>,
    pub cluster_version: Option<String>,
    pub auto_upgrade: bool,
    pub image_type: Option<String>,
    pub network: Option<String>,
    pub subnetwork: Option<String>,
    pub scopes: Vec<String>,
    pub preemptible: bool,
    /// Comma separated `k=v` labels
    pub labels: String,
}

/// Arguments for `gcloud container clusters create`
pub fn cluster_create_args(spec: &GkeClusterSpec) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "container".into(),
        "clusters".into(),
        "create".into(),
        spec.name.clone(),
        "--num-nodes".into(),
        spec.min_nodes.to_string(),
        "--machine-type".into(),
        spec.machine_type.clone(),
        "--enable-autoscaling".into(),
        "--min-nodes".into(),
        spec.min_nodes.to_string(),
        "--max-nodes".into(),
        spec.max_nodes.to_string(),
    ];

    let (flag, value) = spec.location.flag();
    args.extend([flag.to_string(), value.to_string()]);

    let optional = [
        ("--disk-size", &spec.disk_size),
        ("--cluster-ipv4-cidr", &spec.cluster_ipv4_cidr),
        ("--cluster-version", &spec.cluster_version),
    ];
    for (flag, value) in optional {
        if let Some(v) = value.as_deref().filter(|v| !v.is_empty()) {
            args.extend([flag.to_string(), v.to_string()]);
        }
    }

    if spec.auto_upgrade {
        args.push("--enable-autoupgrade".into());
    }

    let optional = [
        ("--image-type", &spec.image_type),
        ("--network", &spec.network),
        ("--subnetwork", &spec.subnetwork),
    ];
    for (flag, value) in optional {
        if let Some(v) = value.as_deref().filter(|v| !v.is_empty()) {
            args.extend([flag.to_string(), v.to_string()]);
        }
    }

    if !spec.scopes.is_empty() {
        args.push(format!("--scopes={}", spec.scopes.join(",")));
    }
    if spec.preemptible {
        args.push("--preemptible".into());
    }
    if !spec.labels.is_empty() {
        args.push(format!("--labels={}", spec.labels.to_lowercase()));
    }
    args
}

/// `europe-west1-b` -> `europe-west1`; a region is returned unchanged
pub fn region_from_zone(zone: &str) -> String {
    match (zone.find('-'), zone.rfind('-')) {
        (Some(first), Some(last)) if first != last => zone[..last].to_string(),
        _ => zone.to_string(),
    }
}

/// Fully qualified service account email
pub fn service_account_email(name: &str, project: &str) -> String {
    format!("{}@{}.iam.gserviceaccount.com", name, project)
}

/// First column of a gcloud table, header row skipped
fn first_column(output: &str) -> Vec<String> {
    output
        .lines()
        .skip(1)
        .filter_map(|l| l.split_whitespace().next())
        .map(String::from)
        .collect()
}

/// Names from `gcloud services list --enabled`
fn parse_enabled_apis(output: &str) -> Vec<String> {
    output
        .lines()
        .filter(|l| !l.contains("NAME"))
        .filter_map(|l| l.split_whitespace().next())
        .map(String::from)
        .collect()
}

/// Fully qualified names from `apis` that are not yet in `enabled`
pub fn apis_to_enable(apis: &[&str], enabled: &[String]) -> Vec<String> {
    apis.iter()
        .map(|a| format!("{}.googleapis.com", a))
        .filter(|full| !enabled.contains(full))
        .collect()
}

/// Thin wrapper over the gcloud binary
#[derive(Debug, Clone)]
pub struct Gcloud {
    binary: String,
}

impl Default for Gcloud {
    fn default() -> Self {
        Self {
            binary: "gcloud".into(),
        }
    }
}

impl Gcloud {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    fn output(&self, args: &[&str]) -> Result<String, GcloudError> {
        crate::log_debug!("running {}", display_command(&self.binary, args));
        let output = Command::new(&self.binary)
            .args(args)
            .output()
            .map_err(|source| GcloudError::NotInstalled { source })?;
        if !output.status.success() {
            return Err(GcloudError::CommandFailed {
                command: display_command(&self.binary, args),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Run a state changing command; skipped in dry-run mode
    fn run(&self, args: &[&str]) -> Result<(), GcloudError> {
        let command = display_command(&self.binary, args);
        if dryrun::is_dry_run() {
            dryrun::log_action(&command);
            return Ok(());
        }
        crate::log_debug!("running {}", command);
        let status = Command::new(&self.binary)
            .args(args)
            .status()
            .map_err(|source| GcloudError::NotInstalled { source })?;
        if !status.success() {
            return Err(GcloudError::CommandFailed {
                command,
                stderr: format!("exit status {}", status),
            });
        }
        Ok(())
    }

    /// Interactive browser login
    pub fn login(&self) -> Result<(), GcloudError> {
        self.run(&["auth", "login", "--brief"])
    }

    pub fn set_project(&self, project: &str) -> Result<(), GcloudError> {
        self.run(&["config", "set", "project", project])
    }

    pub fn current_project(&self) -> Result<String, GcloudError> {
        self.output(&["config", "list", "--format", "value(core.project)"])
    }

    pub fn list_projects(&self) -> Result<Vec<String>, GcloudError> {
        let out = self.output(&["projects", "list", "--format", "value(projectId)"])?;
        Ok(out.lines().map(str::trim).filter(|l| !l.is_empty()).map(String::from).collect())
    }

    pub fn zones(&self, project: &str) -> Result<Vec<String>, GcloudError> {
        self.compute_names("zones", project)
    }

    pub fn regions(&self, project: &str) -> Result<Vec<String>, GcloudError> {
        self.compute_names("regions", project)
    }

    fn compute_names(&self, resource: &str, project: &str) -> Result<Vec<String>, GcloudError> {
        let out = self.output(&[
            "compute", resource, "list", "--project", project, "--format", "value(name)",
        ])?;
        Ok(out.lines().map(String::from).collect())
    }

    pub fn enabled_apis(&self, project: &str) -> Result<Vec<String>, GcloudError> {
        let out = self.output(&["services", "list", "--enabled", "--project", project])?;
        Ok(parse_enabled_apis(&out))
    }

    /// Enable the APIs from `apis` that are not enabled yet
    pub fn enable_apis(&self, project: &str, apis: &[&str]) -> Result<(), GcloudError> {
        let missing = apis_to_enable(apis, &self.enabled_apis(project)?);
        if missing.is_empty() {
            crate::log_debug!(
                "No apis need to be enabled as they are already enabled: {}",
                apis.join(" ")
            );
            return Ok(());
        }
        let mut args = vec!["services", "enable"];
        args.extend(missing.iter().map(String::as_str));
        args.extend(["--project", project]);
        self.run(&args)
    }

    pub fn create_cluster(&self, spec: &GkeClusterSpec) -> Result<(), GcloudError> {
        let args = cluster_create_args(spec);
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        self.run(&args)
    }

    /// Write kubeconfig credentials for the cluster
    pub fn get_credentials(
        &self,
        name: &str,
        location: &Location,
        project: &str,
    ) -> Result<(), GcloudError> {
        let (flag, value) = location.flag();
        self.run(&[
            "container", "clusters", "get-credentials", name, flag, value, "--project", project,
        ])
    }

    pub fn find_service_account(&self, name: &str, project: &str) -> bool {
        let args = ["iam", "service-accounts", "list", "--filter", name, "--project", project];
        match self.output(&args) {
            Ok(out) => !out.is_empty() && out != "Listed 0 items.",
            Err(_) => false,
        }
    }

    fn create_service_account_key(
        &self,
        name: &str,
        project: &str,
        key_path: &Path,
    ) -> Result<(), GcloudError> {
        let email = service_account_email(name, project);
        let key = key_path.to_string_lossy();
        self.run(&[
            "iam", "service-accounts", "keys", "create", &key, "--iam-account", &email,
            "--project", project,
        ])
    }

    pub fn service_account_keys(
        &self,
        name: &str,
        project: &str,
    ) -> Result<Vec<String>, GcloudError> {
        let email = service_account_email(name, project);
        let out = self.output(&[
            "iam", "service-accounts", "keys", "list", "--iam-account", &email,
            "--project", project,
        ])?;
        Ok(first_column(&out))
    }

    /// Delete every key of the account; individual failures are only logged
    pub fn cleanup_service_account_keys(
        &self,
        name: &str,
        project: &str,
    ) -> Result<(), GcloudError> {
        let email = service_account_email(name, project);
        crate::log_info!(
            "Cleaning up the keys of the service account {}",
            crate::utils::logger::info(name)
        );
        for key in self.service_account_keys(name, project)? {
            let deleted = self.run(&[
                "iam", "service-accounts", "keys", "delete", &key, "--iam-account", &email,
                "--project", project, "--quiet",
            ]);
            match deleted {
                Ok(()) => crate::log_info!("Key {} was removed from service account {}", key, name),
                Err(e) => crate::log_warn!(
                    "Cannot delete the key {} from service account {}: {}",
                    key,
                    name,
                    e
                ),
            }
        }
        Ok(())
    }

    /// Find or create the service account, bind `roles` to a new account and
    /// download a key into `dir`. Returns the key path.
    pub fn get_or_create_service_account(
        &self,
        name: &str,
        project: &str,
        dir: &Path,
        roles: &[&str],
    ) -> Result<PathBuf, GcloudError> {
        if project.is_empty() {
            return Err(GcloudError::MissingProject("get or create a service account"));
        }

        if self.find_service_account(name, project) {
            crate::log_info!("Service Account exists");
        } else {
            crate::log_info!("Creating service account {}", crate::utils::logger::info(name));
            self.run(&[
                "iam", "service-accounts", "create", name, "--project", project, "--display-name",
                name,
            ])?;

            let member = format!("serviceAccount:{}", service_account_email(name, project));
            for role in roles {
                crate::log_info!("Assigning role {}", role);
                self.run(&[
                    "projects", "add-iam-policy-binding", project, "--member", &member, "--role",
                    role, "--project", project,
                ])?;
            }
        }

        fs::create_dir_all(dir).map_err(|source| GcloudError::KeyDir {
            path: dir.to_path_buf(),
            source,
        })?;
        let key_path = dir.join(format!("{}.key.json", name));

        if key_path.exists() {
            crate::log_info!("Key already exists");
            return Ok(key_path);
        }

        crate::log_info!("Downloading service account key");
        if self.create_service_account_key(name, project, &key_path).is_err() {
            crate::log_info!(
                "Exceeds the maximum number of keys on service account {}",
                crate::utils::logger::info(name)
            );
            self.cleanup_service_account_keys(name, project)?;
            self.create_service_account_key(name, project, &key_path)?;
        }
        Ok(key_path)
    }
}
