//! KFServing Webhook Lifecycle Operator
//!
//! Main entry point. Loads configuration and static resources, joins leader
//! election, and feeds lifecycle events to the reconciliation driver.

use std::sync::Arc;

use futures::stream;
use kube::Client;
use tokio::signal;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use kfserving_operator::{
    adapters::oci_image::OciImageResource,
    certs::{CertificateStore, FileCertificateStore},
    config::{OperatorConfig, PortConfig},
    controllers::{
        lease_name, run_events, Driver, EventKind, LeaderElector, LeaderFlag, Trigger,
    },
    crd::StaticResources,
    metrics,
    reconcilers::KubeApplier,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    info!("Starting KFServing webhook operator");

    let config = OperatorConfig::load()?;
    info!(
        app = %config.app_name,
        namespace = %config.namespace,
        "Loaded operator configuration"
    );

    let resources = StaticResources::load(&config.resources_dir)?;
    info!(
        "Loaded {} CRDs and {} config fragments from {}",
        resources.crds.len(),
        resources.config_fragments.len(),
        config.resources_dir.display()
    );

    let client = Client::try_default().await?;
    info!("Connected to Kubernetes API server");

    let cancel = CancellationToken::new();
    let (leader, leader_handle) = if config.leader_election {
        let elector = Arc::new(LeaderElector::new(
            client.clone(),
            &lease_name(&config.app_name),
            &config.namespace,
            &config.identity,
        ));
        let (flag, handle) = elector.start(cancel.clone()).await;
        (flag, Some(handle))
    } else {
        info!("Leader election disabled, acting as leader");
        (LeaderFlag::fixed(true), None)
    };

    let store = FileCertificateStore::new(&config.state_dir);
    let first_event = if store.get()?.is_none() {
        EventKind::Install
    } else {
        EventKind::UpgradeCharm
    };

    let mut driver = Driver::new(
        config.identity(),
        resources,
        store,
        OciImageResource::new(&config.image_resource),
        KubeApplier::new(client, &config.app_name, &config.namespace),
        leader,
    );

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            shutdown_signal().await;
            info!("Received shutdown signal, stopping operator");
            shutdown.cancel();
        }
    });

    let metrics_handle = tokio::spawn(metrics::serve(config.operator_metrics_port));
    info!(
        "Metrics server starting on port {}",
        config.operator_metrics_port
    );
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            match metrics_handle.await {
                Ok(Err(e)) => error!("Metrics server failed: {}", e),
                _ => error!("Metrics server exited unexpectedly"),
            }
            shutdown.cancel();
        }
    });

    let (tx, mut rx) = mpsc::channel(1);
    let producer = tokio::spawn(async move {
        if let Err(e) = produce_events(tx, first_event, config).await {
            error!("Event source failed: {}", e);
        }
    });
    let events = Box::pin(stream::poll_fn(move |cx| rx.poll_recv(cx)));

    run_events(&mut driver, events, shutdown).await;

    producer.abort();
    cancel.cancel();
    if let Some(handle) = leader_handle {
        let _ = handle.await;
    }

    info!("KFServing webhook operator stopped");
    Ok(())
}

/// Emit lifecycle triggers for the event loop
///
/// `first_event` goes out immediately; config-changed follows every SIGHUP and
/// every resync interval, with configuration re-read each time. A full
/// channel holds the source back until the driver is free.
async fn produce_events(
    tx: mpsc::Sender<Trigger>,
    first_event: EventKind,
    config: OperatorConfig,
) -> anyhow::Result<()> {
    let mut ports = config.ports();
    if tx.send(Trigger::new(first_event, ports)).await.is_err() {
        return Ok(());
    }

    let mut resync = tokio::time::interval(config.resync_interval());
    resync.tick().await;

    #[cfg(unix)]
    let mut hangup = signal::unix::signal(signal::unix::SignalKind::hangup())?;

    loop {
        #[cfg(unix)]
        tokio::select! {
            _ = resync.tick() => {}
            _ = hangup.recv() => info!("Received SIGHUP, reloading configuration"),
        }
        #[cfg(not(unix))]
        resync.tick().await;

        ports = reload_ports(ports);
        if tx
            .send(Trigger::new(EventKind::ConfigChanged, ports))
            .await
            .is_err()
        {
            return Ok(());
        }
    }
}

/// Ports from freshly loaded configuration, or `current` if loading fails
fn reload_ports(current: PortConfig) -> PortConfig {
    match OperatorConfig::load() {
        Ok(config) => config.ports(),
        Err(e) => {
            warn!("Keeping previous configuration: {}", e);
            current
        }
    }
}

/// Initialize tracing subscriber
fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("info,kfserving_operator=debug,kube=warn,hyper=warn")
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().json())
        .init();
}

/// Wait for shutdown signal (SIGTERM or SIGINT)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install CTRL+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received CTRL+C signal");
        }
        _ = terminate => {
            info!("Received SIGTERM signal");
        }
    }
}
