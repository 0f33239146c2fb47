use std::str::FromStr;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use krr_core::{ClusterLabel, WorkloadRef, DEFAULT_CLUSTER_LABEL};
use krr_kubehub::WorkloadKind;
use krr_query::{BuiltQuery, QueryPlan, QueryVariant};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "krrctl", version, about = "Build Prometheus memory queries for Kubernetes workloads")]
struct Cli {
    /// Output format
    #[arg(short = 'o', long = "output", value_enum, global = true, default_value_t = Output::Human)]
    output: Output,

    /// Kubernetes namespace of the workload
    #[arg(long = "ns", global = true, default_value = "default")]
    namespace: String,

    /// Label carrying the cluster name in Prometheus
    #[arg(long = "cluster-label-name", env = "KRR_PROMETHEUS_LABEL", global = true, default_value = DEFAULT_CLUSTER_LABEL)]
    cluster_label_name: String,

    /// Cluster name to match; omit when Prometheus serves a single cluster
    #[arg(long = "cluster", env = "KRR_PROMETHEUS_CLUSTER_LABEL", global = true)]
    cluster: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Output { Human, Json }

#[derive(clap::Args, Debug, Clone)]
struct Window {
    /// Query variant (usage, max-usage, usage-samples, oom-killed-max); all when omitted
    #[arg(long = "variant")]
    variant: Option<QueryVariant>,
    /// History window, in Prometheus duration syntax
    #[arg(long = "duration", default_value = "336h")]
    duration: String,
    /// Subquery resolution, in Prometheus duration syntax
    #[arg(long = "step", default_value = "1m")]
    step: String,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Build queries for an explicit set of pods
    Query {
        /// Pod name; repeat or comma-separate for several
        #[arg(long = "pod", required = true, num_args = 1.., value_delimiter = ',')]
        pods: Vec<String>,
        /// Container name
        #[arg(long = "container")]
        container: String,
        #[command(flatten)]
        window: Window,
    },
    /// Resolve a workload's pods from the cluster, then build queries
    Resolve {
        /// Workload kind: deployment, statefulset, daemonset or job
        kind: WorkloadKind,
        /// Workload name
        name: String,
        /// Container name (default: first container in the pod template)
        #[arg(long = "container")]
        container: Option<String>,
        #[command(flatten)]
        window: Window,
    },
}

fn init_tracing() {
    let env = std::env::var("KRR_LOG").unwrap_or_else(|_| "info".to_string());
    let filter = tracing_subscriber::EnvFilter::from_str(&env).unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).with_writer(std::io::stderr).init();
}

fn init_metrics() {
    if let Ok(addr) = std::env::var("KRR_METRICS_ADDR") {
        if let Ok(sock) = addr.parse::<std::net::SocketAddr>() {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            match builder.with_http_listener(sock).install() {
                Ok(_) => tracing::info!(addr = %addr, "Prometheus metrics exporter listening"),
                Err(e) => tracing::warn!(error = %e, "failed to install metrics exporter"),
            }
        } else {
            tracing::warn!(addr = %addr, "invalid KRR_METRICS_ADDR; expected host:port");
        }
    }
}

impl Cli {
    fn cluster(&self) -> Option<ClusterLabel> {
        ClusterLabel::from_settings(Some(&self.cluster_label_name), self.cluster.as_deref())
    }
}

fn build(workload: &WorkloadRef, window: &Window) -> Vec<BuiltQuery> {
    let plan = QueryPlan::new(workload);
    let variants: Vec<QueryVariant> = match window.variant {
        Some(v) => vec![v],
        None => QueryVariant::ALL.to_vec(),
    };
    variants.into_iter().map(|v| v.build(&plan, &window.duration, &window.step)).collect()
}

fn render(output: Output, workload: &WorkloadRef, queries: &[BuiltQuery]) -> Result<()> {
    match output {
        Output::Human => {
            println!("# {}/{} • {} pod(s)", workload.namespace, workload.container, workload.pods.len());
            for q in queries {
                let warn = if q.kind.warn_on_no_data { "warn-on-empty" } else { "quiet" };
                println!();
                println!("# {} • {} • {}", q.variant, q.kind.mode.api_path(), warn);
                println!("{}", q.query);
            }
        }
        Output::Json => {
            let doc = serde_json::json!({ "workload": workload, "queries": queries });
            println!("{}", serde_json::to_string_pretty(&doc)?);
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    init_metrics();
    let cli = Cli::parse();
    let cluster = cli.cluster();

    match &cli.command {
        Commands::Query { pods, container, window } => {
            info!(ns = %cli.namespace, container = %container, pods = pods.len(), "query invoked");
            let workload = WorkloadRef::new(cli.namespace.clone(), pods.iter().cloned(), container.clone()).with_cluster(cluster);
            workload.validate().context("invalid workload")?;
            render(cli.output, &workload, &build(&workload, window))?;
        }
        Commands::Resolve { kind, name, container, window } => {
            info!(kind = %kind, ns = %cli.namespace, name = %name, "resolve invoked");
            let client = krr_kubehub::get_kube_client().await?;
            let workload = match krr_kubehub::resolve_workload(client, *kind, &cli.namespace, name, container.as_deref(), cluster).await {
                Ok(w) => w,
                Err(e) => {
                    error!(error = ?e, "resolve failed");
                    return Err(e);
                }
            };
            workload.validate().with_context(|| format!("{} {}/{} cannot be queried", kind, cli.namespace, name))?;
            render(cli.output, &workload, &build(&workload, window))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_args_parse() {
        let cli = Cli::try_parse_from([
            "krrctl", "--ns", "prod", "--cluster", "eu-west", "query", "--pod", "app-1,app-2", "--pod", "app-3",
            "--container", "web", "--variant", "max", "--duration", "1h", "--step", "5m",
        ])
        .expect("parse");
        assert_eq!(cli.namespace, "prod");
        assert_eq!(cli.cluster().map(|c| c.value), Some("eu-west".to_string()));
        match cli.command {
            Commands::Query { pods, container, window } => {
                assert_eq!(pods, vec!["app-1", "app-2", "app-3"]);
                assert_eq!(container, "web");
                assert_eq!(window.variant, Some(QueryVariant::MaxUsage));
                assert_eq!((window.duration.as_str(), window.step.as_str()), ("1h", "5m"));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn resolve_args_parse() {
        let cli = Cli::try_parse_from(["krrctl", "resolve", "sts", "db", "-o", "json"]).expect("parse");
        assert_eq!(cli.output, Output::Json);
        match cli.command {
            Commands::Resolve { kind, name, container, window } => {
                assert_eq!(kind, WorkloadKind::StatefulSet);
                assert_eq!(name, "db");
                assert_eq!(container, None);
                assert_eq!(window.variant, None);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn unknown_variant_rejected() {
        let res = Cli::try_parse_from(["krrctl", "query", "--pod", "a", "--container", "c", "--variant", "cpu"]);
        assert!(res.is_err());
    }

    #[test]
    fn build_without_variant_yields_all() {
        let w = WorkloadRef::new("prod", ["a"], "web");
        let window = Window { variant: None, duration: "1h".into(), step: "5m".into() };
        assert_eq!(build(&w, &window).len(), QueryVariant::ALL.len());
        let window = Window { variant: Some(QueryVariant::OomKilledMax), ..window };
        let out = build(&w, &window);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].variant, QueryVariant::OomKilledMax);
    }
}
