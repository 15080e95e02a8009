use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use aiven_operator::{controller, crd, remote, Error, OperatorConfig, RequeuePolicy};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the operator
    Run(RunArgs),
    /// Print the CustomResourceDefinitions as YAML
    Crdgen,
    /// Show version and build information
    Version,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Parser, Debug)]
struct RunArgs {
    /// Aiven API token used for objects without authSecretRef
    #[arg(long, env = "AIVEN_TOKEN", hide_env_values = true)]
    token: String,

    /// Aiven API base URL
    #[arg(long, env = "AIVEN_API_URL", default_value = remote::aiven::DEFAULT_API_URL)]
    api_url: String,

    /// Only watch this namespace (all namespaces when unset)
    #[arg(long, env = "WATCH_NAMESPACE")]
    watch_namespace: Option<String>,

    /// Concurrent reconcile workers per kind
    #[arg(long, env = "WORKERS", default_value_t = 4)]
    workers: usize,

    /// Poll interval while a service is transitioning
    #[arg(long, env = "POLL_INTERVAL_SECS", default_value_t = 30)]
    poll_interval_secs: u64,

    /// Resync interval for stable services and terminal errors
    #[arg(long, env = "RESYNC_INTERVAL_SECS", default_value_t = 1800)]
    resync_interval_secs: u64,

    #[arg(long, env = "BACKOFF_BASE_SECS", default_value_t = 5)]
    backoff_base_secs: u64,

    #[arg(long, env = "BACKOFF_MAX_SECS", default_value_t = 300)]
    backoff_max_secs: u64,

    /// Timeout for each Aiven API request
    #[arg(long, env = "REQUEST_TIMEOUT_SECS", default_value_t = 30)]
    request_timeout_secs: u64,

    /// Listen address for /health and /metrics
    #[arg(long, env = "METRICS_ADDR", default_value = "0.0.0.0:8080")]
    metrics_addr: SocketAddr,

    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

impl RunArgs {
    fn to_config(&self) -> OperatorConfig {
        OperatorConfig {
            api_token: self.token.clone(),
            api_url: self.api_url.clone(),
            watch_namespace: self.watch_namespace.clone().filter(|ns| !ns.is_empty()),
            workers: self.workers,
            requeue: RequeuePolicy {
                poll_interval: Duration::from_secs(self.poll_interval_secs),
                resync_interval: Duration::from_secs(self.resync_interval_secs),
                backoff_base: Duration::from_secs(self.backoff_base_secs),
                backoff_max: Duration::from_secs(self.backoff_max_secs),
            },
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            metrics_addr: self.metrics_addr,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    let args = Args::parse();

    match args.command {
        Commands::Version => {
            println!("Aiven Operator v{}", env!("CARGO_PKG_VERSION"));
            println!("Build Date: {}", env!("BUILD_DATE"));
            println!("Git SHA: {}", env!("GIT_SHA"));
            Ok(())
        }
        Commands::Crdgen => {
            let yaml = crd::render_crds()
                .map_err(|e| Error::ConfigError(format!("Failed to render CRDs: {e}")))?;
            print!("{yaml}");
            Ok(())
        }
        Commands::Run(run_args) => run_operator(run_args).await,
    }
}

fn init_tracing(format: LogFormat) {
    let env_filter = EnvFilter::builder()
        .with_default_directive(Level::INFO.into())
        .from_env_lossy();

    let registry = tracing_subscriber::registry().with(env_filter);
    match format {
        LogFormat::Json => registry.with(fmt::layer().json().with_target(true)).init(),
        LogFormat::Text => registry.with(fmt::layer().with_target(true)).init(),
    }
}

async fn run_operator(args: RunArgs) -> Result<(), Error> {
    init_tracing(args.log_format);

    let config = args.to_config();
    config.validate()?;

    info!("Starting Aiven Operator v{}", env!("CARGO_PKG_VERSION"));

    // Initialize Kubernetes client
    let client = kube::Client::try_default()
        .await
        .map_err(Error::KubeError)?;

    info!("Connected to Kubernetes cluster");

    let state = Arc::new(controller::ControllerState { client, config });

    // Start the REST API server
    #[cfg(feature = "rest-api")]
    {
        let api_state = state.clone();
        tokio::spawn(async move {
            if let Err(e) = aiven_operator::rest_api::run_server(api_state).await {
                tracing::error!("REST API server error: {:?}", e);
            }
        });
    }

    controller::run_controller(state).await
}
