use anyhow::{bail, Context};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use wimt_tracker::config::AppConfig;
use wimt_tracker::error::PositioningErrorCode;
use wimt_tracker::queue::DurableQueue;
use wimt_tracker::sampler::{
    ErrorCallback, LineSource, PointCallback, PositionSource, Sampler, SamplerOptions,
    WatchOptions,
};
use wimt_tracker::sync::{ConnectivityMonitor, HttpTransport, SyncConfig, SyncEngine, SyncEvent};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load config
    let config = AppConfig::load()?;

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(&config.log_level)
        .init();

    info!("Starting wimt tracking agent...");

    if config.session_id.trim().is_empty() {
        bail!("SESSION_ID must be set before tracking can start");
    }

    let queue = Arc::new(DurableQueue::new(Some(config.queue_database_url.clone())));
    if !queue.is_supported() {
        warn!("Offline queue disabled, undeliverable points will be dropped");
    }

    // Connectivity
    let shutdown = CancellationToken::new();
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(15))
        .build()?;
    let transport = HttpTransport::with_client(client, config.collector_url.clone());
    let connectivity = Arc::new(ConnectivityMonitor::new(transport.probe().await));
    let probe = connectivity.spawn_probe(
        transport.clone(),
        Duration::from_secs(config.probe_interval_secs),
        shutdown.clone(),
    );

    let engine = SyncEngine::new(
        queue.clone(),
        Arc::new(transport),
        connectivity,
        SyncConfig {
            recovery_interval: Duration::from_secs(config.recovery_interval_secs),
            ..SyncConfig::default()
        },
    );
    engine.set_session_id(config.session_id.clone());
    let event_log = spawn_event_log(engine.subscribe());

    // Sampling
    let (source, exhausted) = open_fix_source(&config.fix_source).await?;
    let sampler = Sampler::new(
        Some(source),
        None,
        SamplerOptions {
            watch: WatchOptions {
                timeout: Duration::from_millis(config.position_timeout_ms),
                ..WatchOptions::default()
            },
            throttle: Duration::from_millis(config.throttle_ms),
        },
    );

    let (tx, mut rx) = mpsc::unbounded_channel();
    let on_point: PointCallback = Arc::new(move |point| {
        let _ = tx.send(point);
    });
    let denied = shutdown.clone();
    let on_error: ErrorCallback = Arc::new(move |err| {
        if err.code == PositioningErrorCode::PermissionDenied {
            error!("Location permission denied, stopping");
            denied.cancel();
        }
    });

    if queue.is_supported() {
        engine.start_recovery_loop();
    }
    sampler.start(on_point, Some(on_error));
    info!("Tracking session {}", config.session_id);

    let forwarder = tokio::spawn({
        let engine = engine.clone();
        async move {
            while let Some(point) = rx.recv().await {
                if let Err(e) = engine.handle_location_update(point).await {
                    error!("Point lost: {}", e);
                }
            }
        }
    });

    tokio::select! {
        res = tokio::signal::ctrl_c() => {
            res.context("failed to listen for ctrl-c")?;
            info!("Interrupted, shutting down");
        }
        _ = exhausted.cancelled() => info!("Fix source exhausted, shutting down"),
        _ = shutdown.cancelled() => {}
    }

    // Dropping the sampler releases the point sender so the forwarder drains.
    drop(sampler);
    if tokio::time::timeout(Duration::from_secs(10), forwarder)
        .await
        .is_err()
    {
        warn!("Gave up waiting for in-flight points");
    }

    engine.stop_recovery_loop();
    shutdown.cancel();
    let _ = probe.await;
    event_log.abort();

    if queue.is_supported() {
        match engine.pending_count().await {
            Ok(0) => {}
            Ok(n) => info!("{} points remain buffered for the next run", n),
            Err(e) => warn!("Could not count buffered points: {}", e),
        }
        queue.close().await;
    }

    info!("Tracking agent stopped");
    Ok(())
}

async fn open_fix_source(
    path: &str,
) -> anyhow::Result<(Arc<dyn PositionSource>, CancellationToken)> {
    if path == "-" {
        let source = LineSource::new(tokio::io::stdin());
        let exhausted = source.closed();
        return Ok((Arc::new(source), exhausted));
    }

    let file = tokio::fs::File::open(path)
        .await
        .with_context(|| format!("failed to open fix source {}", path))?;
    let source = LineSource::new(file);
    let exhausted = source.closed();
    Ok((Arc::new(source), exhausted))
}

fn spawn_event_log(mut events: broadcast::Receiver<SyncEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event @ SyncEvent::SendFailed { .. })
                | Ok(event @ SyncEvent::RecoveryFailed { .. }) => warn!("{}", event),
                Ok(SyncEvent::StatusChanged { .. }) => {}
                Ok(event) => info!("{}", event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Event log skipped {} events", n)
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}
