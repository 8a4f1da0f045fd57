//! `jx create codeship`

use anyhow::{Context, Result};
use clap::Args;
use std::fs;
use std::path::{Path, PathBuf};

use super::CommandContext;
use super::service_account::{GkeServiceAccountArgs, create_gke_service_account};
use crate::cloud::Gcloud;
use crate::codeship::{
    CodeshipClient, EnvironmentVariable, ProjectCreateRequest, ProjectType, ProjectUpdateRequest,
};
use crate::utils::prereqs::require;
use crate::utils::{CommonPrereqs, JxError, download, dryrun, git, logger::info, names, prompt};

pub const DEFAULT_ORGANISATION_GIT_REPO: &str = "https://github.com/jenkins-x/default-organisation.git";
pub const SETUP_COMMAND: &str = "./build.sh";
pub const BUILD_REF: &str = "heads/master";

#[derive(Args, Debug, Default)]
pub struct CodeshipArgs {
    /// Skip Google auth if already logged in via gcloud auth
    #[arg(long)]
    pub skip_login: bool,

    /// The organisation name used for the git repo containing cluster details, the repo will be organisation-<org name>
    #[arg(short, long, default_value = "")]
    pub organisation_name: String,

    /// The username to login to Codeship with, this will not be stored anywhere
    #[arg(long, default_value = "")]
    pub codeship_username: String,

    /// The password to login to Codeship with, this will not be stored anywhere
    #[arg(long, default_value = "")]
    pub codeship_password: String,

    /// The Codeship organisation to use, this will not be stored anywhere
    #[arg(long, default_value = "")]
    pub codeship_organisation: String,

    /// The git repository used as the fork when creating new organisation git repos
    #[arg(short, long, default_value = DEFAULT_ORGANISATION_GIT_REPO)]
    pub fork_git_repo: String,

    /// The name to use for any git commits
    #[arg(long, default_value = "Codeship")]
    pub git_user: String,

    /// The email to use for any git commits
    #[arg(long, default_value = "codeship@jenkins-x.io")]
    pub git_email: String,

    /// Path of the GKE service account key to use, one is created when empty
    #[arg(long, default_value = "")]
    pub gke_service_account: String,

    /// The git provider username the build pushes with
    #[arg(long, default_value = "")]
    pub git_username: String,

    /// The git provider API token the build pushes with
    #[arg(long, default_value = "")]
    pub git_api_token: String,

    /// Owner of the organisation repository, otherwise the git username
    #[arg(long, default_value = "")]
    pub repo_owner: String,

    /// Install Prow in the created clusters
    #[arg(long)]
    pub prow: bool,

    /// Use GitOps to manage the created clusters
    #[arg(long)]
    pub gitops: bool,

    /// Google Project ID used when creating the service account
    #[arg(short, long, default_value = "")]
    pub project_id: String,
}

/// Local checkout of the organisation repository
pub fn organisation_dir(jx_home: &Path, org: &str) -> PathBuf {
    jx_home.join("organisations").join(format!("organisation-{}", org))
}

/// `<name>=gke` for every directory under `clusters_dir`, sorted by name
pub fn find_clusters(clusters_dir: &Path) -> Result<Vec<String>> {
    let mut clusters = Vec::new();
    let entries = fs::read_dir(clusters_dir)
        .with_context(|| format!("failed to read clusters from {}", clusters_dir.display()))?;
    for entry in entries {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            clusters.push(format!("{}=gke", entry.file_name().to_string_lossy()));
        }
    }
    clusters.sort();
    Ok(clusters)
}

/// Clusters of the organisation checkout; in dry-run the checkout may never have been cloned
fn organisation_clusters(repo_dir: &Path) -> Result<Vec<String>> {
    let clusters_dir = repo_dir.join("clusters");
    if dryrun::is_dry_run() && !clusters_dir.exists() {
        dryrun::log_action(&format!("read clusters from {}", clusters_dir.display()));
        return Ok(Vec::new());
    }
    find_clusters(&clusters_dir)
}

/// Contents of the service account key; in dry-run the key may never have been created
fn read_service_account_key(path: &Path) -> Result<String> {
    if dryrun::is_dry_run() && !path.exists() {
        dryrun::log_action(&format!("read service account key {}", path.display()));
        return Ok(String::new());
    }
    fs::read_to_string(path)
        .with_context(|| format!("failed to read service account key {}", path.display()))
}

/// Arguments the build passes on to `jx create cluster`
pub fn create_args(prow: bool, gitops: bool) -> Vec<&'static str> {
    let mut args = vec!["--skip-login"];
    if prow {
        args.push("--prow");
    }
    if gitops {
        args.push("--gitops");
    }
    args
}

/// Everything the Codeship build needs, in the order it is sent
pub struct BuildEnvironment<'a> {
    pub service_account_json: String,
    pub organisation: &'a str,
    pub git_username: &'a str,
    pub git_api_token: &'a str,
    pub git_user: &'a str,
    pub git_email: &'a str,
    pub clusters: Vec<String>,
    pub create_args: Vec<&'static str>,
}

impl BuildEnvironment<'_> {
    pub fn variables(&self) -> Vec<EnvironmentVariable> {
        vec![
            EnvironmentVariable::new("GKE_SA_JSON", &self.service_account_json),
            EnvironmentVariable::new("ORG", self.organisation),
            EnvironmentVariable::new("GIT_USERNAME", self.git_username),
            EnvironmentVariable::new("GIT_API_TOKEN", self.git_api_token),
            EnvironmentVariable::new("JX_VERSION", env!("CARGO_PKG_VERSION")),
            EnvironmentVariable::new("GIT_USER", self.git_user),
            EnvironmentVariable::new("GIT_EMAIL", self.git_email),
            EnvironmentVariable::new("BUILD_NUMBER", "1"),
            EnvironmentVariable::new("ENVIRONMENTS", self.clusters.join(",")),
            EnvironmentVariable::new("CREATE_ARGS", self.create_args.join(" ")),
            EnvironmentVariable::new("HELM3", "false"),
        ]
    }
}

fn ask(value: String, message: &str, option: &str) -> Result<String> {
    if value.is_empty() {
        prompt::input(message, "", option)
    } else {
        Ok(value)
    }
}

fn ask_password(value: String, message: &str, option: &str) -> Result<String> {
    if value.is_empty() {
        prompt::password(message, option)
    } else {
        Ok(value)
    }
}

/// Clone the organisation repository when absent, otherwise pull it
fn sync_organisation_repo(fork_url: &str, dir: &Path) -> Result<()> {
    if dir.exists() {
        crate::log_info!("local directory {} already exists, pulling", info(dir.display()));
        git::pull(dir)
    } else {
        if let Some(parent) = dir.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        crate::log_info!("cloning {} into {}", info(fork_url), info(dir.display()));
        git::clone(fork_url, dir)
    }
}

pub async fn create_codeship(ctx: &CommandContext, mut args: CodeshipArgs) -> Result<()> {
    require(&CommonPrereqs::gcloud())?;
    require(&CommonPrereqs::git())?;
    if !args.skip_login {
        Gcloud::default().login().context("failed to login to Google Cloud")?;
    }

    if args.organisation_name.is_empty() {
        args.organisation_name = names::silly_name();
        crate::log_info!("No organisation name provided so using {}", info(&args.organisation_name));
    }
    let org = args.organisation_name.clone();

    if args.gke_service_account.is_empty() {
        let home = dirs::home_dir().ok_or_else(|| anyhow::anyhow!("Could not determine home directory"))?;
        let key = create_gke_service_account(GkeServiceAccountArgs {
            name: org.clone(),
            project_id: args.project_id.clone(),
            skip_login: true,
            dir: Some(home),
        })?;
        args.gke_service_account = key.display().to_string();
    }

    let username = ask(args.codeship_username, "Username for Codeship", "codeship-username")?;
    let password = ask_password(args.codeship_password, "Password for Codeship", "codeship-password")?;
    let cs_org_name = ask(args.codeship_organisation, "Codeship organisation", "codeship-organisation")?;
    let git_username = ask(args.git_username, "Git username", "git-username")?;
    let git_api_token = ask_password(args.git_api_token, "Git API token", "git-api-token")?;
    let owner = if args.repo_owner.is_empty() {
        git_username.clone()
    } else {
        args.repo_owner
    };

    let repo_dir = organisation_dir(&download::jx_home()?, &org);
    let repo_name = format!("organisation-{}", org);
    sync_organisation_repo(&args.fork_git_repo, &repo_dir)?;
    let clusters = organisation_clusters(&repo_dir)?;

    let service_account_json = read_service_account_key(Path::new(&args.gke_service_account))?;
    let env = BuildEnvironment {
        service_account_json,
        organisation: &org,
        git_username: &git_username,
        git_api_token: &git_api_token,
        git_user: &args.git_user,
        git_email: &args.git_email,
        clusters,
        create_args: create_args(args.prow, args.gitops),
    };

    let client = CodeshipClient::authenticate(&ctx.settings.codeship.api_url, &username, &password).await?;
    let cs_org = client.organization(&cs_org_name)?;

    let uuid = match client.project_exists(&cs_org, &cs_org_name, &repo_name).await? {
        Some(uuid) => {
            let request = ProjectUpdateRequest {
                project_type: ProjectType::Basic,
                setup_commands: vec![SETUP_COMMAND.to_string()],
                environment_variables: env.variables(),
            };
            let project = client.update_project(&cs_org, &uuid, &request).await?;
            crate::log_info!("Updated Project {}", info(&project.name));
            uuid
        }
        None => {
            let request = ProjectCreateRequest {
                project_type: ProjectType::Basic,
                repository_url: format!("git@github.com:{}/{}", owner, repo_name),
                setup_commands: vec![SETUP_COMMAND.to_string()],
                environment_variables: env.variables(),
            };
            let project = client
                .create_project(&cs_org, &request)
                .await
                .map_err(|e| JxError::codeship_project_failed(&e.to_string()))?;
            crate::log_info!("Created Project {}", info(&project.name));
            project.uuid
        }
    };

    crate::log_info!("Triggering build for {}", info(&uuid));
    client.create_build(&cs_org, &uuid, BUILD_REF).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use tempfile::tempdir;

    #[derive(Parser, Debug)]
    struct TestCli {
        #[command(flatten)]
        args: CodeshipArgs,
    }

    #[test]
    fn test_parse_defaults() {
        let cli = TestCli::try_parse_from(["codeship", "-o", "acme", "--prow"]).unwrap();
        assert_eq!(cli.args.organisation_name, "acme");
        assert_eq!(cli.args.fork_git_repo, DEFAULT_ORGANISATION_GIT_REPO);
        assert_eq!(cli.args.git_user, "Codeship");
        assert_eq!(cli.args.git_email, "codeship@jenkins-x.io");
        assert!(cli.args.prow);
        assert!(!cli.args.gitops);
    }

    #[test]
    fn test_organisation_dir() {
        let dir = organisation_dir(Path::new("/home/me/.jx"), "acme");
        assert_eq!(dir, PathBuf::from("/home/me/.jx/organisations/organisation-acme"));
    }

    #[test]
    fn test_find_clusters_only_lists_directories() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("prod")).unwrap();
        fs::create_dir(dir.path().join("dev")).unwrap();
        fs::write(dir.path().join("README.md"), "clusters").unwrap();

        assert_eq!(find_clusters(dir.path()).unwrap(), vec!["dev=gke", "prod=gke"]);
    }

    #[test]
    fn test_find_clusters_missing_dir() {
        let dir = tempdir().unwrap();
        assert!(find_clusters(&dir.path().join("clusters")).is_err());
    }

    #[test]
    fn test_dry_run_tolerates_missing_checkout_and_key() {
        let _guard = crate::utils::env_lock();
        let dir = tempdir().unwrap();
        let repo = dir.path().join("organisation-acme");
        let key = dir.path().join("acme.key.json");

        unsafe { std::env::remove_var(dryrun::DRY_RUN_ENV) };
        assert!(organisation_clusters(&repo).is_err());
        assert!(read_service_account_key(&key).is_err());

        unsafe { std::env::set_var(dryrun::DRY_RUN_ENV, "1") };
        let clusters = organisation_clusters(&repo);
        let json = read_service_account_key(&key);
        unsafe { std::env::remove_var(dryrun::DRY_RUN_ENV) };

        assert!(clusters.unwrap().is_empty());
        assert_eq!(json.unwrap(), "");
    }

    #[test]
    fn test_existing_key_is_read() {
        let _guard = crate::utils::env_lock();
        let dir = tempdir().unwrap();
        let key = dir.path().join("acme.key.json");
        fs::write(&key, "{\"type\":\"service_account\"}").unwrap();
        assert_eq!(read_service_account_key(&key).unwrap(), "{\"type\":\"service_account\"}");
    }

    #[test]
    fn test_create_args_order() {
        assert_eq!(create_args(false, false), vec!["--skip-login"]);
        assert_eq!(create_args(true, true), vec!["--skip-login", "--prow", "--gitops"]);
    }

    #[test]
    fn test_build_environment_variables() {
        let env = BuildEnvironment {
            service_account_json: "{\"type\":\"service_account\"}".into(),
            organisation: "acme",
            git_username: "bot",
            git_api_token: "secret",
            git_user: "Codeship",
            git_email: "codeship@jenkins-x.io",
            clusters: vec!["dev=gke".into(), "prod=gke".into()],
            create_args: create_args(true, false),
        };
        let vars = env.variables();
        let names: Vec<&str> = vars.iter().map(|v| v.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "GKE_SA_JSON", "ORG", "GIT_USERNAME", "GIT_API_TOKEN", "JX_VERSION", "GIT_USER",
                "GIT_EMAIL", "BUILD_NUMBER", "ENVIRONMENTS", "CREATE_ARGS", "HELM3",
            ]
        );
        let value = |name: &str| vars.iter().find(|v| v.name == name).map(|v| v.value.clone());
        assert_eq!(value("ENVIRONMENTS").as_deref(), Some("dev=gke,prod=gke"));
        assert_eq!(value("CREATE_ARGS").as_deref(), Some("--skip-login --prow"));
        assert_eq!(value("HELM3").as_deref(), Some("false"));
        assert_eq!(value("BUILD_NUMBER").as_deref(), Some("1"));
    }
}
