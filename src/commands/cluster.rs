//! `jx create cluster gke`

use anyhow::{Context, Result, bail};
use clap::{Args, Subcommand};

use super::CommandContext;
use crate::cloud::Gcloud;
use crate::cloud::gke::{
    self, DEFAULT_MACHINE_TYPE, ENHANCED_APIS, ENHANCED_SCOPES, GkeClusterSpec, Location, REQUIRED_APIS,
};
use crate::k8s::kubectl;
use crate::utils::labels::{add_label, validate_cluster_name};
use crate::utils::logger::{info, question_answer, yes_no};
use crate::utils::progress::with_spinner_result;
use crate::utils::prereqs::require;
use crate::utils::{CommonPrereqs, names, prompt};

/// Format of the `create-time` label; colons are sanitized to dashes
pub const CREATE_TIME_FORMAT: &str = "%a-%b-%-d-%Y-%H:%M:%S";

#[derive(Subcommand, Debug)]
pub enum ClusterCommands {
    /// Create a new Kubernetes cluster on Google Kubernetes Engine
    Gke(GkeArgs),
}

#[derive(Args, Debug, Default)]
pub struct GkeArgs {
    /// The name of this cluster, a name is generated when empty
    #[arg(short = 'n', long, default_value = "")]
    pub cluster_name: String,

    /// The IP address range for the pods in this cluster in CIDR notation (e.g. 10.0.0.0/14)
    #[arg(short = 'c', long, default_value = "")]
    pub cluster_ipv4_cidr: String,

    /// The Kubernetes version to use for the master and nodes
    #[arg(long, default_value = "")]
    pub kubernetes_version: String,

    /// Size in GB for node VM boot disks, defaults to 100GB
    #[arg(short = 'd', long, default_value = "")]
    pub disk_size: String,

    /// Sets autoupgrade feature for a cluster's default node-pool(s)
    #[arg(long)]
    pub enable_autoupgrade: bool,

    /// The type of machine to use for nodes
    #[arg(short = 'm', long, default_value = "")]
    pub machine_type: String,

    /// The minimum number of nodes to be created in each of the cluster's zones
    #[arg(long)]
    pub min_num_nodes: Option<u32>,

    /// The maximum number of nodes to be created in each of the cluster's zones
    #[arg(long)]
    pub max_num_nodes: Option<u32>,

    /// Google Project ID to create cluster in
    #[arg(short = 'p', long, default_value = "")]
    pub project_id: String,

    /// The Compute Engine Network that the cluster will connect to
    #[arg(long, default_value = "")]
    pub network: String,

    /// The image type for the nodes in the cluster
    #[arg(long, default_value = "")]
    pub image_type: String,

    /// The Google Compute Engine subnetwork to which the cluster is connected
    #[arg(long, default_value = "")]
    pub subnetwork: String,

    /// The compute zone (e.g. us-central1-a) for the cluster
    #[arg(short = 'z', long, default_value = "")]
    pub zone: String,

    /// Compute region (e.g. us-central1) for the cluster
    #[arg(short = 'r', long, default_value = "")]
    pub region: String,

    /// Skip Google Cloud login
    #[arg(long)]
    pub skip_login: bool,

    /// Prompt for advanced options such as a regional cluster
    #[arg(long)]
    pub advanced: bool,

    /// The labels to add to the cluster being created such as 'foo=bar,whatnot=123'
    #[arg(long, default_value = "")]
    pub labels: String,

    /// The OAuth scopes to be added to the cluster
    #[arg(long = "scope")]
    pub scopes: Vec<String>,

    /// Use preemptible VMs in the node-pool
    #[arg(long)]
    pub preemptible: bool,

    /// Use enhanced OAuth scopes for access to GCS/GCR
    #[arg(long)]
    pub enhanced_scopes: bool,

    /// Enable the Cloud Build, Container Registry and Container Analysis APIs
    #[arg(long)]
    pub enhanced_apis: bool,

    /// The namespace the kube context is switched to after creation
    #[arg(long, default_value = "jx")]
    pub namespace: String,
}

pub fn run(ctx: &CommandContext, command: ClusterCommands) -> Result<()> {
    match command {
        ClusterCommands::Gke(args) => create_gke(ctx, args),
    }
}

/// OS user recorded in the `created-by` label
fn os_user() -> Option<String> {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .ok()
        .filter(|u| !u.is_empty())
}

/// User labels plus `created-by` and `create-time`
pub fn cluster_labels(labels: &str, user: Option<&str>, now: chrono::DateTime<chrono::Local>) -> String {
    let mut labels = labels.to_string();
    if let Some(user) = user {
        labels = add_label(&labels, "created-by", user);
    }
    add_label(&labels, "create-time", &now.format(CREATE_TIME_FORMAT).to_string())
}

/// Zone or region from the flags, prompting for a zone when neither is set
const DEFAULT_ZONE: &str = "us-west1-a";
const REGIONAL: &str = "Regional";
const ZONAL: &str = "Zonal";

/// Region offered first when creating a regional cluster
fn default_region() -> String {
    gke::region_from_zone(DEFAULT_ZONE)
}

pub fn resolve_location(
    gcloud: &Gcloud,
    project: &str,
    zone: &str,
    region: &str,
    advanced: bool,
) -> Result<Location> {
    if !region.is_empty() {
        return Ok(Location::Region(region.to_string()));
    }
    if !zone.is_empty() {
        return Ok(Location::Zone(zone.to_string()));
    }
    if prompt::is_batch_mode() {
        bail!("in batchmode, either a region or a zone must be set");
    }

    let cluster_type = if advanced {
        let types = [REGIONAL.to_string(), ZONAL.to_string()];
        prompt::select("What type of cluster would you like to create", &types, ZONAL, "zone")?
    } else {
        crate::log_info!("{}", question_answer("Defaulting to cluster type", ZONAL));
        ZONAL.to_string()
    };

    if cluster_type == REGIONAL {
        let regions = gcloud.regions(project).context("failed to list compute regions")?;
        let region = prompt::select("Google Cloud Region:", &regions, &default_region(), "region")?;
        return Ok(Location::Region(region));
    }
    let zones = gcloud.zones(project).context("failed to list compute zones")?;
    let zone = prompt::select("Google Cloud Zone:", &zones, DEFAULT_ZONE, "zone")?;
    Ok(Location::Zone(zone))
}

/// Build the cluster spec from flags, filling in the defaults
pub fn cluster_spec(args: &GkeArgs, name: String, location: Location, labels: String) -> GkeClusterSpec {
    let regional = location.is_regional();
    let machine_type = if args.machine_type.is_empty() {
        crate::log_info!("{}", question_answer("Defaulting to machine type", DEFAULT_MACHINE_TYPE));
        DEFAULT_MACHINE_TYPE.to_string()
    } else {
        args.machine_type.clone()
    };
    let min_nodes = args.min_num_nodes.unwrap_or_else(|| gke::default_min_nodes(regional));
    let max_nodes = args.max_num_nodes.unwrap_or_else(|| gke::default_max_nodes(regional));

    let scopes = if args.enhanced_scopes {
        ENHANCED_SCOPES.iter().map(|s| s.to_string()).collect()
    } else {
        args.scopes.clone()
    };

    let opt = |v: &str| super::non_empty(v);
    GkeClusterSpec {
        name,
        location,
        machine_type,
        min_nodes,
        max_nodes,
        disk_size: opt(&args.disk_size),
        cluster_ipv4_cidr: opt(&args.cluster_ipv4_cidr),
        cluster_version: opt(&args.kubernetes_version),
        auto_upgrade: args.enable_autoupgrade,
        image_type: opt(&args.image_type),
        network: opt(&args.network),
        subnetwork: opt(&args.subnetwork),
        scopes,
        preemptible: args.preemptible,
        labels,
    }
}

pub fn create_gke(ctx: &CommandContext, mut args: GkeArgs) -> Result<()> {
    validate_cluster_name(&args.cluster_name)?;
    require(&CommonPrereqs::gcloud())?;
    require(&CommonPrereqs::kubectl())?;
    let gcloud = Gcloud::default();

    if !args.skip_login {
        gcloud.login().context("failed to login to Google Cloud")?;
    }

    let project = super::service_account::resolve_project(&gcloud, &args.project_id)?;
    gcloud.set_project(&project)?;
    crate::log_debug!("Ensuring {} are enabled on project {}", REQUIRED_APIS.join(" and "), project);
    gcloud.enable_apis(&project, REQUIRED_APIS)?;

    let name = if args.cluster_name.is_empty() {
        let name = names::silly_name();
        crate::log_info!("{}", question_answer("No cluster name provided so using a generated one", &name));
        name
    } else {
        crate::log_info!("{}", question_answer("Configured cluster name", &args.cluster_name));
        args.cluster_name.clone()
    };
    validate_cluster_name(&name)?;

    let location = resolve_location(&gcloud, &project, &args.zone, &args.region, args.advanced)?;

    if !prompt::is_batch_mode() && args.scopes.is_empty() && !args.enhanced_scopes {
        args.enhanced_scopes = true;
        crate::log_info!(
            "{}",
            question_answer("Defaulting access to Google Cloud Storage / Google Container Registry", yes_no(true))
        );
    }
    if !prompt::is_batch_mode() && args.enhanced_scopes && !args.enhanced_apis {
        args.enhanced_apis = true;
        crate::log_info!(
            "{}",
            question_answer("Defaulting enabling Cloud Build, Container Registry & Container Analysis APIs", yes_no(true))
        );
    }
    if args.enhanced_apis {
        crate::log_debug!("checking if we need to enable APIs for GCB and GCR");
        gcloud.enable_apis(&project, ENHANCED_APIS)?;
    }

    let labels = cluster_labels(&args.labels, os_user().as_deref(), chrono::Local::now());
    let spec = cluster_spec(&args, name, location, labels);

    with_spinner_result(
        &format!("Creating cluster {}...", spec.name),
        &format!("Cluster {} created", spec.name),
        || gcloud.create_cluster(&spec),
    )?;

    crate::log_info!("Initialising cluster ...");
    gcloud.get_credentials(&spec.name, &spec.location, &project)?;

    let context = kubectl::current_context(ctx.kubeconfig()).unwrap_or_default();
    kubectl::set_context_namespace(&context, &args.namespace, ctx.kubeconfig())
        .with_context(|| format!("failed to switch context to namespace {}", args.namespace))?;

    crate::log_info!("Cluster {} created in project {}", info(&spec.name), info(&project));
    Ok(())
}
