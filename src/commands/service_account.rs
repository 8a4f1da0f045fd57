//! `jx create service-account` and `jx create gke-service-account`

use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;

use super::CommandContext;
use crate::cloud::Gcloud;
use crate::k8s::service_accounts;
use crate::utils::prereqs::require;
use crate::utils::{CommonPrereqs, JxError, download, logger::info, prompt};

/// Roles bound to a new GKE service account
pub const GKE_SERVICE_ACCOUNT_ROLES: &[&str] = &[
    "roles/storage.admin",
    "roles/storage.objectAdmin",
    "roles/storage.objectCreator",
    "roles/container.clusterAdmin",
    "roles/iam.serviceAccountUser",
];

#[derive(Args, Debug)]
pub struct ServiceAccountArgs {
    /// Name of the service account
    pub name: String,

    /// The namespace of the service account, otherwise the current namespace
    #[arg(short, long)]
    pub namespace: Option<String>,

    /// Role to bind to the service account in its namespace
    #[arg(long)]
    pub role: Option<String>,

    /// ClusterRole to bind to the service account
    #[arg(long)]
    pub cluster_role: Option<String>,
}

#[derive(Args, Debug, Default)]
pub struct GkeServiceAccountArgs {
    /// The name of the service account to create
    #[arg(short, long, default_value = "")]
    pub name: String,

    /// The Google Project ID to create the service account in
    #[arg(short, long, default_value = "")]
    pub project_id: String,

    /// Skip Google Cloud login
    #[arg(long)]
    pub skip_login: bool,

    /// Directory the key file is written to
    #[arg(long)]
    pub dir: Option<PathBuf>,
}

pub async fn create_service_account(ctx: &CommandContext, args: ServiceAccountArgs) -> Result<()> {
    let client = ctx.client().await?;
    let namespace = match args.namespace.filter(|ns| !ns.is_empty()) {
        Some(ns) => ns,
        None => crate::k8s::client::current_namespace(&client),
    };

    if service_accounts::create_service_account(&client, &namespace, &args.name).await? {
        crate::log_info!("Created service account {} in namespace {}", info(&args.name), info(&namespace));
    } else {
        crate::log_info!("Service account {} already exists in namespace {}", info(&args.name), info(&namespace));
    }

    if let Some(role) = args.role.filter(|r| !r.is_empty()) {
        let binding = service_accounts::bind_role(&client, &namespace, &args.name, &role, false).await?;
        crate::log_info!("Bound role {} with RoleBinding {}", info(role), info(binding));
    }
    if let Some(role) = args.cluster_role.filter(|r| !r.is_empty()) {
        let binding = service_accounts::bind_role(&client, &namespace, &args.name, &role, true).await?;
        crate::log_info!("Bound cluster role {} with ClusterRoleBinding {}", info(role), info(binding));
    }
    Ok(())
}

/// Default directory for downloaded service account keys
pub fn default_key_dir() -> Result<PathBuf> {
    Ok(download::jx_home()?.join("gke-service-accounts"))
}

/// `--project-id`, else a project picked from `gcloud projects list`, else
/// the current gcloud project
pub fn resolve_project(gcloud: &Gcloud, flag: &str) -> Result<String> {
    if !flag.is_empty() {
        return Ok(flag.to_string());
    }
    let current = gcloud.current_project().unwrap_or_default();
    let projects = gcloud.list_projects().unwrap_or_default();
    let project = match projects.len() {
        0 => current,
        1 => projects[0].clone(),
        _ => prompt::select("Google Cloud Project:", &projects, &current, "project-id")?,
    };
    if project.is_empty() {
        return Err(JxError::missing_option("project-id").into());
    }
    Ok(project)
}

/// Create the account and download a key; returns the key path
pub fn create_gke_service_account(args: GkeServiceAccountArgs) -> Result<PathBuf> {
    require(&CommonPrereqs::gcloud())?;
    let gcloud = Gcloud::default();
    if !args.skip_login {
        gcloud.login().context("failed to login to Google Cloud")?;
    }

    let name = if args.name.is_empty() {
        prompt::input("Name for the service account:", "", "name")?
    } else {
        args.name
    };
    if name.is_empty() {
        return Err(JxError::missing_option("name").into());
    }

    let project = resolve_project(&gcloud, &args.project_id)?;
    let dir = match args.dir {
        Some(dir) => dir,
        None => default_key_dir()?,
    };

    let key_path = gcloud.get_or_create_service_account(&name, &project, &dir, GKE_SERVICE_ACCOUNT_ROLES)?;
    crate::log_info!("Created service account key {}", info(key_path.display()));
    Ok(key_path)
}
