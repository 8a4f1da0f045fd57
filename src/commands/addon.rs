//! `jx create addon ...`

use anyhow::{Result, bail};
use clap::{ArgAction, Args, Subcommand};
use std::path::PathBuf;

use super::{CommandContext, non_empty};
use crate::helm::values::split_set_values;
use crate::install::addon::{self, AddonOptions};
use crate::install::environment_controller::{self, EnvironmentControllerOptions};
use crate::install::gloo::{self, GlooOptions};
use crate::install::ingress::{self, IngressOptions};
use crate::install::istio::{self, IstioOptions};
use crate::install::prow::{self, ProwOptions};
use crate::k8s::{client::current_namespace, kubectl};
use crate::utils::{names, prompt};

#[derive(Args, Debug)]
#[command(args_conflicts_with_subcommands = true)]
pub struct AddonArgs {
    #[command(subcommand)]
    pub command: Option<AddonCommands>,

    #[command(flatten)]
    pub generic: GenericAddonArgs,
}

#[derive(Subcommand, Debug)]
pub enum AddonCommands {
    /// Create the Istio addon for service mesh
    Istio(IstioArgs),

    /// Create the Gloo addon for serverless ingress
    Gloo(GlooArgs),

    /// Create the Prow addon for ChatOps and webhook handling
    Prow(ProwArgs),

    /// Create an Environment Controller to handle webhooks and promote changes from GitOps
    #[command(alias = "envctl")]
    EnvironmentController(EnvironmentControllerArgs),

    /// Create the nginx ingress controller and configure Exposecontroller
    Ingress(IngressArgs),
}

#[derive(Args, Debug)]
pub struct IstioArgs {
    /// The namespace to install Istio into
    #[arg(short, long, default_value = istio::DEFAULT_NAMESPACE)]
    pub namespace: String,

    /// The chart release name
    #[arg(short, long, default_value = istio::DEFAULT_RELEASE)]
    pub release: String,

    /// The Istio release to install, otherwise the latest
    #[arg(long)]
    pub version: Option<String>,

    /// The name of the chart to use instead of the one in the Istio release
    #[arg(short, long)]
    pub chart: Option<String>,

    /// The default password to use for Istio
    #[arg(short, long, default_value = istio::DEFAULT_PASSWORD)]
    pub password: String,

    /// The config directory to use
    #[arg(short = 'd', long, default_value = istio::DEFAULT_CONFIG_DIR)]
    pub config_dir: String,

    /// Disables the injector webhook
    #[arg(long)]
    pub no_injector_webhook: bool,

    /// The name of the ingress gateway service created by Istio
    #[arg(long, default_value = istio::DEFAULT_INGRESS_GATEWAY_SERVICE)]
    pub ingress_gateway_service: String,

    /// Chart set values, separated by commas: key1=val1,key2=val2
    #[arg(long, default_value = "")]
    pub set: String,

    /// Seconds to wait for the install to succeed
    #[arg(long)]
    pub timeout: Option<u64>,
}

#[derive(Args, Debug)]
pub struct GlooArgs {
    /// The namespace Gloo is installed into
    #[arg(short, long, default_value = gloo::DEFAULT_NAMESPACE)]
    pub namespace: String,

    /// The glooctl release to download when glooctl is missing
    #[arg(long)]
    pub version: Option<String>,

    /// The name of the cluster ingress proxy Deployment and Service
    #[arg(long, default_value = gloo::DEFAULT_CLUSTER_INGRESS_PROXY)]
    pub cluster_ingress_proxy: String,

    /// Install the Knative cluster ingress and set the Knative domain
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    pub knative: bool,

    /// Seconds to wait for the proxy to be ready
    #[arg(long)]
    pub timeout: Option<u64>,
}

#[derive(Args, Debug)]
pub struct ProwArgs {
    /// The namespace to install Prow into, otherwise the dev namespace
    #[arg(short, long)]
    pub namespace: Option<String>,

    /// The chart release name
    #[arg(short, long, default_value = prow::DEFAULT_RELEASE)]
    pub release: String,

    /// The chart to install
    #[arg(short, long, default_value = prow::DEFAULT_CHART)]
    pub chart: String,

    /// The chart version, otherwise the latest
    #[arg(long)]
    pub version: Option<String>,

    /// Chart set values, separated by commas: key1=val1,key2=val2
    #[arg(long, default_value = "")]
    pub set: String,

    /// Use Tekton as the pipeline engine instead of Knative Build
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    pub tekton: bool,

    /// HMAC token Prow uses to validate webhooks, generated when missing
    #[arg(long, default_value = "")]
    pub hmac_token: String,

    /// OAuth token Prow uses to call the git provider
    #[arg(long, default_value = "")]
    pub oauth_token: String,

    /// Git username for the OAuth token, otherwise the kube context user
    #[arg(long, default_value = "")]
    pub username: String,

    /// Extra values files
    #[arg(long = "values")]
    pub values: Vec<String>,

    /// Seconds to wait for the install to succeed
    #[arg(long)]
    pub timeout: Option<u64>,
}

#[derive(Args, Debug)]
pub struct EnvironmentControllerArgs {
    /// The namespace to install the controller, otherwise the current namespace
    #[arg(short, long)]
    pub namespace: Option<String>,

    /// The chart release name
    #[arg(short, long, default_value = environment_controller::DEFAULT_RELEASE)]
    pub release: String,

    /// Chart set values, separated by commas: key1=val1,key2=val2
    #[arg(long, default_value = "")]
    pub set: String,

    /// The chart version, otherwise the latest
    #[arg(long)]
    pub version: Option<String>,

    /// Seconds to wait for the install to succeed
    #[arg(long)]
    pub timeout: Option<u64>,

    /// The git URL of the environment repository to promote from
    #[arg(short, long, default_value = "")]
    pub source_url: String,

    /// The kind of git repository: github, bitbucketserver, bitbucketcloud, gitea or gitlab
    #[arg(long, default_value = "")]
    pub git_kind: String,

    /// The git user to clone and tag the git repository with
    #[arg(short, long, default_value = "")]
    pub user: String,

    /// The git token to clone and tag the git repository with
    #[arg(short, long, default_value = "")]
    pub token: String,

    /// The webhook URL registered with the git provider
    #[arg(short, long, default_value = "")]
    pub webhook_url: String,

    /// The URL of the build pack git repository
    #[arg(long, default_value = "")]
    pub buildpack_url: String,

    /// The git reference (branch, tag, sha) of the build pack repository
    #[arg(long, default_value = "")]
    pub buildpack_ref: String,

    /// The cloud project ID
    #[arg(long, default_value = "")]
    pub project_id: String,

    /// Enable cluster level RBAC on Tekton
    #[arg(long)]
    pub cluster_rbac: bool,

    /// The Docker registry host prefixed to images
    #[arg(long, default_value = "")]
    pub docker_registry: String,

    /// The Docker registry organisation, otherwise the git repository owner
    #[arg(long, default_value = "")]
    pub docker_registry_org: String,
}

#[derive(Args, Debug)]
pub struct IngressArgs {
    /// The namespace to install the ingress controller into
    #[arg(short, long, default_value = ingress::DEFAULT_NAMESPACE)]
    pub namespace: String,

    /// The chart release name
    #[arg(short, long, default_value = ingress::DEFAULT_RELEASE)]
    pub release: String,

    /// The ingress controller chart
    #[arg(short, long, default_value = ingress::DEFAULT_CHART)]
    pub chart: String,

    /// The chart version, otherwise the latest
    #[arg(long)]
    pub version: Option<String>,

    /// Chart set values, separated by commas: key1=val1,key2=val2
    #[arg(long, default_value = "")]
    pub set: String,

    /// The domain to expose services on, otherwise derived from the LoadBalancer
    #[arg(long)]
    pub domain: Option<String>,

    /// Expose services over plain HTTP
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    pub http: bool,

    /// Request TLS certificates through kube-lego ACME annotations
    #[arg(long)]
    pub tls_acme: bool,

    /// Seconds to wait for the controller to be ready
    #[arg(long)]
    pub timeout: Option<u64>,
}

#[derive(Args, Debug)]
pub struct GenericAddonArgs {
    /// Addon to install
    pub name: Option<String>,

    /// The namespace to install into, otherwise the addon's default or the dev namespace
    #[arg(short, long)]
    pub namespace: Option<String>,

    /// The chart release name, otherwise the addon's default
    #[arg(short, long)]
    pub release: Option<String>,

    /// Chart to install instead of the addon's chart, such as a local chart directory
    #[arg(long)]
    pub chart: Option<String>,

    /// The chart version, otherwise the latest
    #[arg(long)]
    pub version: Option<String>,

    /// Chart set values, separated by commas: key1=val1,key2=val2
    #[arg(long, default_value = "")]
    pub set: String,

    /// Extra values files
    #[arg(long = "values")]
    pub values: Vec<String>,

    /// Record the values in this GitOps environment repository instead of installing
    #[arg(long)]
    pub env_dir: Option<PathBuf>,

    /// Seconds to wait for the install to succeed
    #[arg(long)]
    pub timeout: Option<u64>,
}

pub async fn run(ctx: &CommandContext, args: AddonArgs) -> Result<()> {
    match args.command {
        Some(AddonCommands::Istio(args)) => create_istio(ctx, args).await,
        Some(AddonCommands::Gloo(args)) => create_gloo(ctx, args).await,
        Some(AddonCommands::Prow(args)) => create_prow(ctx, args).await,
        Some(AddonCommands::EnvironmentController(args)) => {
            create_environment_controller(ctx, args).await
        }
        Some(AddonCommands::Ingress(args)) => create_ingress(ctx, args).await,
        None => create_generic(ctx, args.generic).await,
    }
}

pub async fn create_istio(ctx: &CommandContext, args: IstioArgs) -> Result<()> {
    let client = ctx.client().await?;
    let opts = IstioOptions {
        namespace: args.namespace,
        release_name: args.release,
        version: args.version.or_else(|| non_empty(&ctx.settings.versions.istio)),
        chart: args.chart,
        password: args.password,
        config_dir: args.config_dir,
        no_injector_webhook: args.no_injector_webhook,
        ingress_gateway_service: args.ingress_gateway_service,
        set_values: split_set_values(&args.set),
        timeout_secs: Some(ctx.timeout_secs(args.timeout)),
    };
    istio::install(&ctx.helm(), &client, &opts).await
}

pub async fn create_gloo(ctx: &CommandContext, args: GlooArgs) -> Result<()> {
    let client = ctx.client().await?;
    let opts = GlooOptions {
        namespace: args.namespace,
        version: args.version.or_else(|| non_empty(&ctx.settings.versions.gloo)),
        cluster_ingress_proxy: args.cluster_ingress_proxy,
        knative: args.knative,
        timeout: ctx.timeout(args.timeout),
    };
    gloo::install(&client, &opts).await
}

pub async fn create_prow(ctx: &CommandContext, args: ProwArgs) -> Result<()> {
    let client = ctx.client().await?;
    let namespace = ctx.dev_namespace(&client, args.namespace).await;

    let hmac_token = if !args.hmac_token.is_empty() {
        args.hmac_token
    } else if let Some(existing) = prow::existing_hmac_token(&client, &namespace).await {
        crate::log_info!("Reusing the HMAC token from the existing {} secret", prow::HMAC_SECRET);
        existing
    } else {
        names::random_token(prow::HMAC_TOKEN_LENGTH)
    };
    let oauth_token = if args.oauth_token.is_empty() {
        prompt::password("Git OAuth token for Prow", "oauth-token")?
    } else {
        args.oauth_token
    };
    let mut username = args.username;
    if username.is_empty() {
        username = kubectl::current_user(ctx.kubeconfig()).unwrap_or_default();
    }
    if username.is_empty() {
        username = prompt::input("Git username for the OAuth token", "", "username")?;
    }

    let opts = ProwOptions {
        namespace,
        release_name: args.release,
        chart: args.chart,
        version: args.version.or_else(|| non_empty(&ctx.settings.versions.prow)),
        set_values: split_set_values(&args.set),
        value_files: args.values,
        tekton: args.tekton,
        hmac_token,
        oauth_token,
        username,
        timeout_secs: Some(ctx.timeout_secs(args.timeout)),
    };
    prow::install(&ctx.helm(), &client, &opts, ctx.timeout(args.timeout)).await
}

pub async fn create_environment_controller(
    ctx: &CommandContext,
    args: EnvironmentControllerArgs,
) -> Result<()> {
    let mut opts = EnvironmentControllerOptions {
        namespace: args.namespace.unwrap_or_default(),
        release_name: args.release,
        version: args.version,
        set_values: split_set_values(&args.set),
        timeout_secs: Some(ctx.timeout_secs(args.timeout)),
        source_url: args.source_url,
        git_kind: args.git_kind,
        user: args.user,
        token: args.token,
        webhook_url: args.webhook_url,
        buildpack_url: args.buildpack_url,
        buildpack_ref: args.buildpack_ref,
        project_id: args.project_id,
        cluster_rbac: args.cluster_rbac,
        docker_registry: args.docker_registry,
        docker_registry_org: args.docker_registry_org,
    };
    let git = environment_controller::resolve(&mut opts)?;
    if opts.namespace.is_empty() {
        let client = ctx.client().await?;
        opts.namespace = current_namespace(&client);
    }
    environment_controller::install(&ctx.helm(), &opts, &git)
}

pub async fn create_ingress(ctx: &CommandContext, args: IngressArgs) -> Result<()> {
    let client = ctx.client().await?;
    let opts = IngressOptions {
        namespace: args.namespace,
        release_name: args.release,
        chart: args.chart,
        version: args.version,
        set_values: split_set_values(&args.set),
        domain: args.domain,
        http: args.http,
        tls_acme: args.tls_acme,
        timeout: ctx.timeout(args.timeout),
    };
    ingress::install(&ctx.helm(), &client, &opts).await
}

pub async fn create_generic(ctx: &CommandContext, args: GenericAddonArgs) -> Result<()> {
    let Some(name) = args.name.filter(|n| !n.is_empty()) else {
        bail!(
            "missing addon name, available addons are: istio, gloo, prow, environment-controller, ingress, {}",
            addon::available_addons().join(", ")
        );
    };
    let spec = addon::find_addon(&name)?;

    let namespace = match (args.namespace, spec.namespace, &args.env_dir) {
        (Some(ns), _, _) if !ns.is_empty() => ns,
        (_, Some(ns), _) => ns.to_string(),
        // GitOps mode writes files only, no cluster needed
        (_, None, Some(_)) => ctx.settings.defaults.namespace.clone(),
        (_, None, None) => {
            let client = ctx.client().await?;
            ctx.dev_namespace(&client, None).await
        }
    };

    let opts = AddonOptions {
        namespace,
        release_name: args.release,
        chart: args.chart,
        version: args.version,
        set_values: split_set_values(&args.set),
        value_files: args.values,
        timeout_secs: Some(ctx.timeout_secs(args.timeout)),
        env_dir: args.env_dir,
    };
    addon::install(&ctx.helm(), spec, &opts)
}
