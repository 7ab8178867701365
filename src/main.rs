//! Devicetree Node Labeller
//!
//! Publishes device tree `compatible` strings as Kubernetes node labels.
//!
//! # Modes
//!
//! ```text
//! k8s-dt-node-labeller            scan once, then keep the node's labels reconciled
//! k8s-dt-node-labeller -d         print discovered identifiers and exit
//! k8s-dt-node-labeller -f         write the NFD feature file and exit
//! k8s-dt-node-labeller -n gpu ... also scan nodes named gpu, gpu@..., gpuN@...
//! ```

use std::convert::Infallible;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{CommandFactory, Parser};
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use kube::Client;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use dt_node_labeller::adapters::KubeNodeStore;
use dt_node_labeller::controller::{self, resolve_local_node, ControllerContext};
use dt_node_labeller::error::{Error, Result};
use dt_node_labeller::features::{render_display, FeatureFileWriter};
use dt_node_labeller::{discover, metrics, CompatibilityMap, LabellerConfig};

// =============================================================================
// CLI Arguments
// =============================================================================

/// devicetree Node Labeller for Kubernetes
#[derive(Parser, Debug)]
#[command(name = "k8s-dt-node-labeller", author, version, about, long_about = None)]
struct Args {
    /// Additional devicetree node names
    #[arg(short = 'n', value_name = "NAME")]
    node_names: Option<String>,

    /// Display discovered devicetree properties and exit
    #[arg(short = 'd')]
    display: bool,

    /// Write discovered features for node-feature-discovery and exit
    #[arg(short = 'f')]
    features: bool,

    /// Further devicetree node names (requires -n)
    #[arg(value_name = "NAMES")]
    extra_node_names: Vec<String>,

    /// Name of the Kubernetes node to label (defaults to the hostname)
    #[arg(long, env = "NODE_NAME")]
    node_name: Option<String>,

    /// Labeller configuration file (YAML)
    #[arg(long, env = "DT_LABELLER_CONFIG")]
    config: Option<PathBuf>,

    /// Device tree root
    #[arg(long, env = "DEVICE_TREE_PATH")]
    device_tree: Option<PathBuf>,

    /// node-feature-discovery features directory
    #[arg(long, env = "NFD_FEATURES_DIR")]
    features_dir: Option<PathBuf>,

    /// Metrics server bind address
    #[arg(long, env = "METRICS_ADDR", default_value = "0.0.0.0:8080")]
    metrics_addr: String,

    /// Health server bind address
    #[arg(long, env = "HEALTH_ADDR", default_value = "0.0.0.0:8081")]
    health_addr: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

impl Args {
    /// The `-n` node name, if one was given and is non-empty
    fn extra_node_name(&self) -> Option<&str> {
        self.node_names.as_deref().filter(|name| !name.is_empty())
    }

    /// Positional node names are only accepted together with `-n`
    fn is_valid(&self) -> bool {
        self.extra_node_name().is_some() || self.extra_node_names.is_empty()
    }

    fn load_config(&self) -> Result<LabellerConfig> {
        let mut config = match &self.config {
            Some(path) => LabellerConfig::from_file(path)?,
            None => LabellerConfig::default(),
        };

        if let Some(name) = self.extra_node_name() {
            config.node_names.push(name.to_string());
            config
                .node_names
                .extend(self.extra_node_names.iter().cloned());
        }
        if let Some(path) = &self.device_tree {
            config.device_tree_path = path.clone();
        }
        if let Some(dir) = &self.features_dir {
            config.features_dir = dir.clone();
        }

        config.validate()?;
        Ok(config)
    }
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    if !args.is_valid() {
        eprintln!("{}", Args::command().render_help());
        std::process::exit(1);
    }

    init_logging(&args);

    let config = args.load_config()?;
    info!(
        device_tree = %config.device_tree_path.display(),
        node_names = ?config.node_names,
        "Scanning device tree"
    );

    let compat = discover(&config)?;

    if args.display || args.features {
        if args.display {
            display(&compat, &config);
        }
        if args.features {
            FeatureFileWriter::new(&config.features_dir).write(&compat, &config.labels)?;
        }
        return Ok(());
    }

    run_controller(&args, &config, &compat).await
}

fn display(compat: &CompatibilityMap, config: &LabellerConfig) {
    print!("{}", render_display(compat, &config.labels));

    let grouped = config.groups.generate(compat);
    if !grouped.is_empty() {
        println!("\nGrouped labels:\n");
        for label in grouped {
            println!("{}", label);
        }
    }
}

async fn run_controller(
    args: &Args,
    config: &LabellerConfig,
    compat: &CompatibilityMap,
) -> Result<()> {
    let local_node = resolve_local_node(args.node_name.as_deref())?;
    let desired = config.labels.desired_labels(compat, &config.groups);
    metrics::set_desired_labels(desired.len());

    info!("Starting devicetree node labeller");
    info!("  Node: {}", local_node);
    info!("  Namespace: {}", config.labels.namespace);
    info!("  Labels: {}", desired.len());

    let client = Client::try_default().await.map_err(|e| {
        error!("Failed to create Kubernetes client: {}", e);
        Error::Internal(format!("Kubernetes client creation failed: {}", e))
    })?;
    info!("Connected to Kubernetes cluster");

    let store = Arc::new(KubeNodeStore::new(client).watching_node(&local_node));
    let ctx = ControllerContext::new(store, local_node, config.labels.clone(), desired);

    let shutdown = CancellationToken::new();
    tokio::spawn(wait_for_signal(shutdown.clone()));

    let health_addr = args.health_addr.clone();
    tokio::spawn(async move {
        if let Err(e) = run_http_server("Health", &health_addr, health_response).await {
            error!("Health server error: {}", e);
        }
    });

    let metrics_addr = args.metrics_addr.clone();
    tokio::spawn(async move {
        if let Err(e) = run_http_server("Metrics", &metrics_addr, metrics_response).await {
            error!("Metrics server error: {}", e);
        }
    });

    controller::run(ctx, shutdown).await?;

    info!("Labeller shutdown complete");
    Ok(())
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("{},hyper=warn,kube=info,tower=warn", level))
    });

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }
}

async fn wait_for_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!("Shutdown signal received");
    shutdown.cancel();
}

// =============================================================================
// Health and Metrics Servers
// =============================================================================

fn respond(status: StatusCode, content_type: &str, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    if let Ok(value) = HeaderValue::from_str(content_type) {
        response.headers_mut().insert(CONTENT_TYPE, value);
    }
    response
}

fn health_response(path: &str) -> Response<Full<Bytes>> {
    match path {
        "/healthz" | "/livez" | "/readyz" => respond(StatusCode::OK, "text/plain", "ok"),
        _ => respond(StatusCode::NOT_FOUND, "text/plain", "not found"),
    }
}

fn metrics_response(path: &str) -> Response<Full<Bytes>> {
    match path {
        "/metrics" => match metrics::gather() {
            Ok((content_type, body)) => respond(StatusCode::OK, &content_type, body),
            Err(e) => respond(
                StatusCode::INTERNAL_SERVER_ERROR,
                "text/plain",
                e.to_string(),
            ),
        },
        _ => respond(StatusCode::NOT_FOUND, "text/plain", "not found"),
    }
}

async fn run_http_server(
    name: &'static str,
    addr: &str,
    handler: fn(&str) -> Response<Full<Bytes>>,
) -> Result<()> {
    let addr: SocketAddr = addr
        .parse()
        .map_err(|e| Error::Internal(format!("Invalid {} server address: {}", name, e)))?;

    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| Error::Internal(format!("Failed to bind {} server: {}", name, e)))?;

    info!("{} server listening on {}", name, addr);

    loop {
        let (stream, _) = listener
            .accept()
            .await
            .map_err(|e| Error::Internal(format!("{} server accept error: {}", name, e)))?;

        let io = TokioIo::new(stream);
        let service = service_fn(move |req: Request<hyper::body::Incoming>| async move {
            Ok::<_, Infallible>(handler(req.uri().path()))
        });

        tokio::spawn(async move {
            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                error!("{} server connection error: {}", name, e);
            }
        });
    }
}
