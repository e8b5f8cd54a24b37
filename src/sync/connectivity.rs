use crate::sync::transport::HttpTransport;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Source of "network reachable" state and its changes.
pub trait Connectivity: Send + Sync {
    fn is_online(&self) -> bool;

    /// Receiver notified whenever reachability flips.
    fn subscribe(&self) -> watch::Receiver<bool>;
}

pub struct ConnectivityMonitor {
    tx: watch::Sender<bool>,
}

impl ConnectivityMonitor {
    pub fn new(online: bool) -> Self {
        let (tx, _) = watch::channel(online);
        Self { tx }
    }

    pub fn set_online(&self, online: bool) {
        let changed = self.tx.send_if_modified(|current| {
            if *current == online {
                false
            } else {
                *current = online;
                true
            }
        });
        if changed {
            info!(
                "Collector is {}",
                if online { "reachable" } else { "unreachable" }
            );
        }
    }

    /// Polls the collector's status endpoint until `token` is cancelled.
    pub fn spawn_probe(
        self: &Arc<Self>,
        transport: HttpTransport,
        every: Duration,
        token: CancellationToken,
    ) -> JoinHandle<()> {
        let monitor = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let online = transport.probe().await;
                        monitor.set_online(online);
                    }
                }
            }
        })
    }
}

impl Connectivity for ConnectivityMonitor {
    fn is_online(&self) -> bool {
        *self.tx.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}
