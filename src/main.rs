mod config;
mod health;
mod service;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use config::Config;
use service::{SearchOptions, Shiftscope};
use shiftscope_k8s::{ClusterAccess, KubeClient, ManagedClusterApi, OcmClient};
use shiftscope_types::LogLevel;

/// Shiftscope - query operators, accelerator hardware and logs on OpenShift
#[derive(Parser, Debug)]
#[command(name = "shiftscope")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Config file (default: $XDG_CONFIG_HOME/shiftscope/config.toml)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Kubernetes context name (overrides the config file)
    #[arg(long, global = true)]
    context: Option<String>,

    /// Kubeconfig path (overrides the config file)
    #[arg(long, global = true, value_name = "PATH")]
    kubeconfig: Option<PathBuf>,

    /// Print single-line JSON
    #[arg(long, global = true)]
    compact: bool,

    /// Log verbosity on stderr (-v info, -vv debug)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// OpenShift version and available backends
    Info,

    /// Projects with display names and quota usage
    Projects,

    /// Routes, services, configmaps, secrets (keys only) or imagestreams
    Resources {
        /// routes, services, configmaps, secrets or imagestreams
        resource_type: String,

        #[arg(short, long, default_value = "all")]
        namespace: String,
    },

    /// Classified operators (OLM, Helm, Custom)
    Operators {
        #[arg(short, long, default_value = "all")]
        namespace: String,

        /// Only operators of the NVIDIA accelerator stack
        #[arg(long)]
        nvidia: bool,
    },

    /// Pods managed by one operator
    OperatorPods {
        name: String,

        #[arg(short, long, default_value = "all")]
        namespace: String,
    },

    /// Every pod in scope with the operator that claims it
    ClaimPods {
        #[arg(short, long, default_value = "all")]
        namespace: String,
    },

    /// Node hardware profiles
    Nodes {
        #[arg(long, value_enum)]
        family: Option<Family>,

        /// A single node by name
        #[arg(long, conflicts_with = "family")]
        name: Option<String>,
    },

    /// Pods requesting accelerator resources
    Workloads {
        #[arg(short, long, default_value = "all")]
        namespace: String,

        #[arg(long, value_enum)]
        family: Option<Family>,
    },

    /// Search pod, build, event and OCM logs
    Search {
        query: String,

        /// Namespace to search; repeat for several (default: all)
        #[arg(short, long = "namespace")]
        namespaces: Vec<String>,

        #[command(flatten)]
        search: SearchArgs,
    },

    /// All logs for one operator, pod or build
    Logs {
        /// operator, pod or build
        resource_type: String,

        name: String,

        #[arg(short, long, default_value = "all")]
        namespace: String,

        /// Log sources, e.g. "pod,event" or "all"
        #[arg(long = "types", default_value = "all")]
        types: String,

        #[arg(short, long)]
        lines: Option<usize>,
    },

    /// Search the GPU operator and OpenShift AI logs
    GpuLogs {
        query: String,

        #[command(flatten)]
        search: SearchArgs,
    },

    /// Search the network operator and SR-IOV logs
    DpuLogs {
        query: String,

        #[command(flatten)]
        search: SearchArgs,
    },

    /// NVIDIA GPU Operator health report
    GpuHealth,

    /// BlueField DPU health report
    DpuHealth,

    /// Clusters managed through OCM
    OcmClusters {
        /// Only clusters in this state, e.g. ready
        #[arg(long)]
        state: Option<String>,
    },

    /// One OCM cluster by id
    OcmCluster { cluster_id: String },

    /// Service logs of one OCM cluster
    OcmLogs {
        cluster_id: String,

        /// Only entries containing this text
        #[arg(short, long, default_value = "")]
        query: String,

        #[arg(short, long)]
        lines: Option<usize>,
    },
}

#[derive(clap::Args, Debug)]
struct SearchArgs {
    /// Log sources, e.g. "pod,event" or "all"
    #[arg(long = "types", default_value = "all")]
    types: String,

    #[arg(short, long)]
    lines: Option<usize>,

    /// Treat the query as a regular expression
    #[arg(long)]
    regex: bool,

    /// Drop entries below this severity (trace, debug, info, warn, error, fatal)
    #[arg(long, value_parser = parse_level)]
    level: Option<LogLevel>,
}

impl SearchArgs {
    fn options(&self) -> SearchOptions {
        SearchOptions {
            regex: self.regex,
            min_level: self.level,
            max_lines: self.lines,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Family {
    Gpu,
    Dpu,
}

fn parse_level(s: &str) -> Result<LogLevel, String> {
    match LogLevel::from_str(s) {
        LogLevel::Unknown => Err(format!("unknown level '{s}'")),
        level => Ok(level),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let level = match args.verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        _ => tracing::Level::DEBUG,
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let result = run(args).await;

    if let Err(e) = &result {
        eprintln!("Error: {:#}", e);
    }

    result
}

async fn run(args: Args) -> Result<()> {
    let mut config = Config::load(args.config.as_deref())?;
    if args.context.is_some() {
        config.context = args.context.clone();
    }
    if args.kubeconfig.is_some() {
        config.kubeconfig = args.kubeconfig.clone();
    }

    let cluster: Arc<dyn ClusterAccess> = Arc::new(
        KubeClient::connect(config.kubeconfig.as_deref(), config.context.as_deref()).await?,
    );
    let ocm: Option<Arc<dyn ManagedClusterApi>> = match config.ocm.credentials() {
        Some(credentials) => {
            let client = OcmClient::new(config.ocm.api_base.clone(), credentials)
                .context("Failed to create OCM client")?;
            Some(Arc::new(client) as Arc<dyn ManagedClusterApi>)
        }
        None => {
            debug!("No OCM credentials configured");
            None
        }
    };

    let service = Shiftscope::new(cluster, ocm, config.engine_config())
        .with_default_max_lines(config.default_max_lines)
        .with_ocm_clusters(config.ocm.cluster_ids.clone());

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted; cancelling outstanding fetches");
            on_interrupt.cancel();
        }
    });

    let compact = args.compact;
    match args.command {
        Command::Info => emit(&service.cluster_info().await, compact),
        Command::Projects => emit(&service.get_projects().await?, compact),
        Command::Resources {
            resource_type,
            namespace,
        } => emit(
            &service
                .get_openshift_resources(&resource_type, &namespace)
                .await?,
            compact,
        ),
        Command::Operators { namespace, nvidia } => {
            let report = if nvidia {
                service.get_nvidia_operators(&namespace).await?
            } else {
                service.get_all_operators(&namespace).await?
            };
            emit(&report, compact)
        }
        Command::OperatorPods { name, namespace } => {
            emit(&service.get_operator_pods(&name, &namespace).await?, compact)
        }
        Command::ClaimPods { namespace } => emit(&service.claim_pods(&namespace).await?, compact),
        Command::Nodes { family, name } => match (name, family) {
            (Some(name), _) => emit(&service.get_node(&name).await?, compact),
            (None, Some(Family::Gpu)) => emit(&service.get_gpu_nodes().await?, compact),
            (None, Some(Family::Dpu)) => emit(&service.get_dpu_nodes().await?, compact),
            (None, None) => emit(&service.get_nodes().await?, compact),
        },
        Command::Workloads { namespace, family } => {
            let workloads = match family {
                Some(Family::Gpu) => service.get_gpu_workloads(&namespace).await?,
                Some(Family::Dpu) => service.get_dpu_workloads(&namespace).await?,
                None => service.get_workloads(&namespace).await?,
            };
            emit(&workloads, compact)
        }
        Command::Search {
            query,
            namespaces,
            search,
        } => {
            let result = service
                .search_all_logs(&query, &namespaces, &search.types, &search.options(), &cancel)
                .await?;
            emit(&result, compact)
        }
        Command::Logs {
            resource_type,
            name,
            namespace,
            types,
            lines,
        } => {
            let result = service
                .get_comprehensive_logs(&resource_type, &name, &namespace, &types, lines, &cancel)
                .await?;
            emit(&result, compact)
        }
        Command::GpuLogs { query, search } => {
            let result = service
                .search_gpu_logs(&query, &search.types, &search.options(), &cancel)
                .await?;
            emit(&result, compact)
        }
        Command::DpuLogs { query, search } => {
            let result = service
                .search_dpu_logs(&query, &search.types, &search.options(), &cancel)
                .await?;
            emit(&result, compact)
        }
        Command::GpuHealth => emit(&service.gpu_operator_health(&cancel).await?, compact),
        Command::DpuHealth => emit(&service.dpu_health(&cancel).await?, compact),
        Command::OcmClusters { state } => {
            emit(&service.ocm_clusters(state.as_deref()).await?, compact)
        }
        Command::OcmCluster { cluster_id } => {
            emit(&service.ocm_cluster(&cluster_id).await?, compact)
        }
        Command::OcmLogs {
            cluster_id,
            query,
            lines,
        } => {
            let options = SearchOptions {
                max_lines: lines,
                ..Default::default()
            };
            let result = service
                .ocm_cluster_logs(&cluster_id, &query, &options, &cancel)
                .await?;
            emit(&result, compact)
        }
    }
}

/// Write a record to stdout as JSON
fn emit<T: Serialize>(value: &T, compact: bool) -> Result<()> {
    let json = if compact {
        serde_json::to_string(value)?
    } else {
        serde_json::to_string_pretty(value)?
    };
    println!("{json}");
    Ok(())
}
