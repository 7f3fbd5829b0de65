use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::common::error::Result;
use crate::data::{ConfigurationStore, RuntimeStore};
use crate::hardware::{HardwareInterface, PointHandle};
use crate::thresholds::change::ChangeOptions;
use crate::thresholds::restore::RestoreOptions;

pub mod config;
pub mod coordinator;
pub mod dispatch;

pub use config::ServerConfig;
pub use coordinator::{Coordinator, CoordinatorStats};

/// State shared by every connection task.
pub struct ServerContext {
    pub config_store: Arc<dyn ConfigurationStore>,
    pub runtime_store: Arc<dyn RuntimeStore>,
    pub hardware: Arc<dyn HardwareInterface>,
    pub coordinator: Arc<Coordinator>,
    pub change_options: ChangeOptions,
    pub restore_options: RestoreOptions,
}

impl ServerContext {
    pub fn new(
        config: &ServerConfig,
        config_store: Arc<dyn ConfigurationStore>,
        runtime_store: Arc<dyn RuntimeStore>,
        hardware: Arc<dyn HardwareInterface>,
    ) -> Self {
        ServerContext {
            config_store,
            runtime_store,
            hardware,
            coordinator: Coordinator::new(),
            change_options: config.change,
            restore_options: config.restore,
        }
    }
}

pub struct ThresholdServer {
    listener: TcpListener,
    context: Arc<ServerContext>,
    housekeeping_interval: Duration,
    stats_every: u64,
    heartbeat_point: Option<String>,
}

impl ThresholdServer {
    pub async fn bind(config: &ServerConfig, context: ServerContext) -> Result<Self> {
        let listener = TcpListener::bind(config.bind_address()).await?;

        Ok(ThresholdServer {
            listener,
            context: Arc::new(context),
            housekeeping_interval: config.housekeeping_interval,
            stats_every: config.stats_every.max(1),
            heartbeat_point: config.heartbeat_point.clone(),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn stats(&self) -> CoordinatorStats {
        self.context.coordinator.stats()
    }

    /// Accepts connections until `shutdown` completes. Between accepts the loop
    /// emits the heartbeat, reaps finished connections and logs stats.
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let mut connections = JoinSet::new();
        let mut housekeeping = tokio::time::interval(self.housekeeping_interval);
        housekeeping.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut ticks: u64 = 0;

        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested, no longer accepting connections");
                    break;
                }
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let context = Arc::clone(&self.context);
                        connections.spawn(
                            async move {
                                debug!("Accepted connection");
                                if let Err(err) = dispatch::serve_connection(context, stream).await {
                                    warn!("Connection ended with error: {}", err);
                                }
                            }
                            .instrument(info_span!("connection", %peer)),
                        );
                    }
                    Err(err) => warn!("Failed to accept connection: {}", err),
                },
                _ = housekeeping.tick() => {
                    ticks += 1;
                    self.heartbeat(ticks).await;

                    if ticks % self.stats_every == 0 {
                        let stats = self.stats();
                        info!(
                            "Active R={}/W={}, Past R={}/W={}",
                            stats.active_readers,
                            stats.active_writers,
                            stats.past_readers,
                            stats.past_writers
                        );
                    }
                }
                Some(finished) = connections.join_next(), if !connections.is_empty() => {
                    if let Err(err) = finished {
                        warn!("Connection task failed: {}", err);
                    }
                }
            }
        }

        //Idle clients would keep their task alive forever, blocking store work still runs to completion
        connections.shutdown().await;
        info!("Server stopped");
        Ok(())
    }

    async fn heartbeat(&self, count: u64) {
        let Some(point) = self.heartbeat_point.clone() else {
            return;
        };
        let hardware = Arc::clone(&self.context.hardware);

        let written = tokio::task::spawn_blocking(move || {
            let handle = PointHandle::open(hardware.as_ref(), &point)?;
            handle.write(count as f64)
        })
        .await;

        match written {
            Ok(Ok(())) => {}
            Ok(Err(err)) => warn!("Cannot update heartbeat point: {}", err),
            Err(err) => warn!("Heartbeat task failed: {}", err),
        }
    }
}
