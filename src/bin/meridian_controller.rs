//! The reconciler-daemon process entry point (§2, §5).
//!
//! Wires the three reconciliation engines into independent `tokio` worker
//! loops: sleep, check whether shutdown was requested, do one pass, sleep
//! again. This is
//! the process that would sit behind the (out-of-scope) HTTP submission
//! surface in production — it takes no network input of its own here,
//! only the in-process fakes, since implementing that surface is
//! explicitly out of scope (§1).

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use meridian_controlplane::config::ControlPlaneConfig;
use meridian_controlplane::external::fakes::{FakeCloudApi, FakeConfigServer, FakeOrchestrator};
use meridian_controlplane::forwarder::NameServiceForwarder;
use meridian_controlplane::nodes::NodeLifecycleManager;
use meridian_controlplane::pipeline::{NoopStepHandler, PipelineRunner};
use meridian_controlplane::routing::RoutingPolicyReconciler;
use meridian_controlplane::store::Store;

/// Meridian control plane reconciler daemon.
#[derive(Parser, Debug)]
#[command(name = "meridian-controller")]
#[command(version, about = "Runs the node, routing, and pipeline reconciliation loops")]
struct Cli {
    /// Path to a `toml` config file. Missing is fine — defaults apply.
    #[arg(long, env = "MERIDIAN_CONFIG", default_value = "meridian.toml")]
    config: PathBuf,

    /// Whether the owning cloud performs dynamic host provisioning.
    #[arg(long, env = "MERIDIAN_DYNAMIC_PROVISIONING")]
    dynamic_provisioning: bool,

    /// Applications to reconcile routing policies for, comma-separated.
    #[arg(long, env = "MERIDIAN_APPLICATIONS", value_delimiter = ',', default_value = "")]
    applications: Vec<String>,
}

#[tokio::main]
async fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();
    let mut config = ControlPlaneConfig::load(&cli.config).unwrap_or_else(|err| {
        tracing::warn!(%err, "failed to load config file, using defaults");
        ControlPlaneConfig::default()
    });
    config = config.with_env_overrides();
    if cli.dynamic_provisioning {
        config.dynamic_provisioning = true;
    }

    tracing::info!(?config, "starting meridian-controller");

    let store = Arc::new(Store::new());
    let forwarder = Arc::new(NameServiceForwarder::new(config.noop_dns_zones.clone()));
    let node_manager = Arc::new(NodeLifecycleManager::new(store.clone(), config.dynamic_provisioning, config.is_cd_zone));
    let routing_reconciler = Arc::new(RoutingPolicyReconciler::new(store.clone(), forwarder.clone()));
    let pipeline_runner = Arc::new(PipelineRunner::new(store.clone(), Arc::new(NoopStepHandler), config.backoff_initial()));

    let config_server = Arc::new(FakeConfigServer::new());
    // `FakeCloudApi` stands in for the host provisioner this process would
    // call from a capacity-allocation loop; nothing in this binary invokes
    // node provisioning yet, so it is constructed only to show the wiring
    // point a real deployment would hang its allocator off of.
    let _cloud_api = Arc::new(FakeCloudApi::default());
    let orchestrator = Arc::new(FakeOrchestrator::default());

    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("shutdown requested");
                shutdown.store(true, Ordering::SeqCst);
            }
        });
    }

    let applications = cli.applications.clone();
    let routing_handle = tokio::spawn(routing_loop(
        routing_reconciler,
        config_server,
        applications,
        config.tick_interval(),
        shutdown.clone(),
    ));
    let pipeline_handle = tokio::spawn(pipeline_loop(
        pipeline_runner,
        cli.applications.clone(),
        config.job_types.clone(),
        config.tick_interval(),
        shutdown.clone(),
    ));
    let node_handle = tokio::spawn(node_loop(node_manager, orchestrator, config.tick_interval(), shutdown));

    let _ = tokio::join!(routing_handle, pipeline_handle, node_handle);
}

/// §5: "A maintenance job invoked while shutdown is requested must exit at
/// its next safe checkpoint" — the top of the loop, before starting a new
/// pass, is that checkpoint for all three loops here.
async fn routing_loop(
    reconciler: Arc<RoutingPolicyReconciler>,
    config_server: Arc<FakeConfigServer>,
    applications: Vec<String>,
    tick: Duration,
    shutdown: Arc<AtomicBool>,
) {
    while !shutdown.load(Ordering::SeqCst) {
        for application in &applications {
            let zones: Vec<String> = Vec::new();
            let outcome = reconciler
                .reconcile(
                    config_server.as_ref(),
                    application,
                    "default",
                    &zones,
                    &Default::default(),
                    &[],
                )
                .await;
            if let Err(err) = outcome {
                tracing::warn!(application, %err, "routing reconciliation pass failed, will retry next tick");
            }
        }
        tokio::time::sleep(tick).await;
    }
    tracing::info!("routing loop exiting at safe checkpoint");
}

async fn pipeline_loop(
    runner: Arc<PipelineRunner>,
    applications: Vec<String>,
    job_types: Vec<String>,
    tick: Duration,
    shutdown: Arc<AtomicBool>,
) {
    while !shutdown.load(Ordering::SeqCst) {
        for application in &applications {
            for job_type in &job_types {
                if let Err(err) = runner.advance(application, job_type).await {
                    tracing::warn!(application, job_type, %err, "pipeline advance failed, will retry next tick");
                }
            }
        }
        tokio::time::sleep(tick).await;
    }
    tracing::info!("pipeline loop exiting at safe checkpoint");
}

async fn node_loop(
    manager: Arc<NodeLifecycleManager>,
    orchestrator: Arc<FakeOrchestrator>,
    tick: Duration,
    shutdown: Arc<AtomicBool>,
) {
    while !shutdown.load(Ordering::SeqCst) {
        let counts = manager.count_by_state();
        for (state, count) in counts {
            meridian_controlplane::metrics::set_nodes_by_state(&format!("{:?}", state), count as i64);
        }
        match manager.is_working(orchestrator.as_ref()).await {
            Ok(working) if !working => tracing::warn!("cluster health heuristic reports not working"),
            Ok(_) => {}
            Err(err) => tracing::warn!(%err, "is_working check failed"),
        }
        tokio::time::sleep(tick).await;
    }
    tracing::info!("node loop exiting at safe checkpoint");
}
