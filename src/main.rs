//! jx CLI - create Jenkins X addons, clusters and integrations

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{Shell, generate};
use jx::commands::addon::AddonArgs;
use jx::commands::cluster::ClusterCommands;
use jx::commands::codeship::CodeshipArgs;
use jx::commands::service_account::{GkeServiceAccountArgs, ServiceAccountArgs};
use jx::commands::{self, CommandContext};
use jx::config::Settings;
use jx::utils::errors::enhance_error;
use jx::utils::{CommonPrereqs, Prerequisite, dryrun, prompt};
use jx::{log_error, log_info, log_warn};
use std::io;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "jx")]
#[command(author, version, about = "Create Jenkins X addons, clusters and integrations", long_about = None)]
struct Cli {
    /// Verbose output (-v: DEBUG, -vv: TRACE)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Dry-run mode: show what would be done without making changes
    #[arg(long, global = true)]
    dry_run: bool,

    /// Never prompt; missing values are reported as errors
    #[arg(short, long, global = true)]
    batch_mode: bool,

    /// Path to kubeconfig file
    #[arg(long, global = true, env = "KUBECONFIG")]
    kubeconfig: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new resource
    Create {
        #[command(subcommand)]
        command: CreateCommands,
    },

    /// Check the tools jx shells out to are installed
    Check,

    /// Show or generate the jx configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },

    /// Generate shell completion scripts
    Completion {
        /// Shell type
        #[arg(value_enum)]
        shell: Shell,
    },

    /// Show version information
    Version,
}

#[derive(Subcommand)]
enum CreateCommands {
    /// Create an addon, such as istio, prow or a chart-backed addon by name
    Addon(AddonArgs),

    /// Create a Kubernetes service account with optional role bindings
    #[command(alias = "sa")]
    ServiceAccount(ServiceAccountArgs),

    /// Create a GKE service account and download its key
    GkeServiceAccount(GkeServiceAccountArgs),

    /// Create a new Kubernetes cluster
    Cluster {
        #[command(subcommand)]
        command: ClusterCommands,
    },

    /// Create a Codeship build that creates and updates clusters from an organisation repository
    Codeship(CodeshipArgs),
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Print an example configuration file
    Example,

    /// Show the effective configuration
    Show,
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    // Process env is set before the runtime spawns its worker threads
    if cli.dry_run {
        dryrun::enable();
        log_info!("🔍 DRY RUN MODE: No changes will be made");
    }
    if cli.batch_mode {
        prompt::enable_batch_mode();
    }

    let result = tokio::runtime::Runtime::new()
        .map_err(anyhow::Error::from)
        .and_then(|runtime| runtime.block_on(run(cli)));

    if let Err(e) = result {
        enhance_error(&e).display();
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut settings = Settings::load();
    if let Some(kubeconfig) = cli.kubeconfig {
        settings.defaults.kubeconfig_path = Some(kubeconfig);
    }
    let ctx = CommandContext::new(settings);

    match cli.command {
        Commands::Create { command } => handle_create_command(&ctx, command).await,
        Commands::Check => handle_check_command(),
        Commands::Config { command } => handle_config_command(&ctx, command),
        Commands::Completion { shell } => handle_completion_command(shell),
        Commands::Version => handle_version_command(),
    }
}

async fn handle_create_command(ctx: &CommandContext, command: CreateCommands) -> Result<()> {
    match command {
        CreateCommands::Addon(args) => commands::addon::run(ctx, args).await,
        CreateCommands::ServiceAccount(args) => {
            commands::service_account::create_service_account(ctx, args).await
        }
        CreateCommands::GkeServiceAccount(args) => {
            commands::service_account::create_gke_service_account(args).map(|_| ())
        }
        CreateCommands::Cluster { command } => commands::cluster::run(ctx, command),
        CreateCommands::Codeship(args) => commands::codeship::create_codeship(ctx, args).await,
    }
}

fn handle_check_command() -> Result<()> {
    log_info!("Checking prerequisites...");

    let tools = CommonPrereqs::all();
    let prereqs: Vec<&dyn Prerequisite> = tools.iter().map(|t| t as &dyn Prerequisite).collect();
    let (found, missing) = CommonPrereqs::check_all(&prereqs);

    for name in &found {
        log_info!("✓ {}", name);
    }
    for (name, hint) in &missing {
        log_warn!("✗ {} not found. {}", name, hint);
    }
    if missing.is_empty() {
        log_info!("✓ All prerequisites satisfied!");
        Ok(())
    } else {
        log_error!("{} of {} tools are missing", missing.len(), tools.len());
        std::process::exit(1);
    }
}

fn handle_config_command(ctx: &CommandContext, command: ConfigCommands) -> Result<()> {
    match command {
        ConfigCommands::Example => {
            print!("{}", Settings::example_config());
            Ok(())
        }
        ConfigCommands::Show => {
            match Settings::find_config_file() {
                Some(path) => log_info!("Configuration loaded from {}", path.display()),
                None => log_info!("No configuration file found, using defaults"),
            }
            print!("{}", ctx.settings.to_toml()?);
            Ok(())
        }
    }
}

fn handle_completion_command(shell: Shell) -> Result<()> {
    let mut cmd = Cli::command();
    generate(shell, &mut cmd, "jx", &mut io::stdout());
    Ok(())
}

fn handle_version_command() -> Result<()> {
    println!("jx {}", env!("CARGO_PKG_VERSION"));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_create_cluster_gke() {
        let cli = Cli::try_parse_from(["jx", "-b", "create", "cluster", "gke", "-z", "us-east1-b"]).unwrap();
        assert!(cli.batch_mode);
        assert!(matches!(
            cli.command,
            Commands::Create {
                command: CreateCommands::Cluster { .. }
            }
        ));
    }

    #[test]
    fn test_parse_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["jx", "create", "addon", "gitea", "--dry-run", "-vv"]).unwrap();
        assert!(cli.dry_run);
        assert_eq!(cli.verbose, 2);
    }
}
