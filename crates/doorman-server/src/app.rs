//! Server assembly and lifecycle.
//!
//! [`Server::build`] opens the database, seeds the registry, builds the
//! shared directory, relay hub and dispatcher, and binds one listener per
//! configured device. [`Server::run`] announces the idle screens and serves
//! until the shutdown signal fires. Each listener drains its in-flight scans
//! before it returns, so the database is closed only once nothing can write.

use crate::config::Config;
use crate::pipeline::AccessPipeline;
use anyhow::Context;
use doorman_network::{
    DeliveryPath, DeviceDirectory, FeedbackDispatcher, IngressListener, RelayHub,
};
use doorman_storage::{Database, HolderRepository, SqliteHolderRepository};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

pub struct Server {
    database: Database,
    directory: Arc<DeviceDirectory>,
    dispatcher: Arc<FeedbackDispatcher>,
    pipeline: Arc<AccessPipeline>,
    listeners: Vec<IngressListener<AccessPipeline>>,
}

impl Server {
    pub async fn build(config: &Config) -> anyhow::Result<Self> {
        let database = Database::new(config.database_config())
            .await
            .with_context(|| format!("Failed to open database {}", config.database.path))?;

        seed_holders(&database, config).await?;

        let directory = Arc::new(DeviceDirectory::new(
            config.discovery_source(),
            config.probe(),
        ));
        for device in &config.devices {
            if let Some(address) = device.address {
                directory.insert_static(device.mac, address, device.role);
            }
        }

        let relay = Arc::new(RelayHub::new());
        let mut dispatcher = FeedbackDispatcher::new(
            config.feedback_config(),
            Arc::clone(&directory),
            Arc::clone(&relay),
        )
        .context("Failed to build feedback dispatcher")?;
        for device in &config.devices {
            dispatcher = dispatcher.with_target(device.mac, device.role, device.delivery);
        }
        let dispatcher = Arc::new(dispatcher);

        let pipeline = Arc::new(AccessPipeline::new(
            database.pool().clone(),
            Arc::clone(&dispatcher),
        ));

        let mut listeners = Vec::with_capacity(config.devices.len());
        for device in &config.devices {
            let listener = IngressListener::bind(
                config.listener_config(device),
                Arc::clone(&pipeline),
                Arc::clone(&directory),
                Arc::clone(&relay),
            )
            .await
            .with_context(|| format!("Failed to start {} listener", device.role))?;
            listeners.push(listener);
        }

        Ok(Self {
            database,
            directory,
            dispatcher,
            pipeline,
            listeners,
        })
    }

    /// Bound listener addresses, in device order.
    pub fn listener_addrs(&self) -> Vec<SocketAddr> {
        self.listeners
            .iter()
            .filter_map(|listener| listener.local_addr().ok())
            .collect()
    }

    pub fn database(&self) -> &Database {
        &self.database
    }

    pub fn directory(&self) -> &Arc<DeviceDirectory> {
        &self.directory
    }

    pub fn pipeline(&self) -> &Arc<AccessPipeline> {
        &self.pipeline
    }

    /// Serve until `shutdown` flips to `true`.
    pub async fn run(self, shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
        let mut tasks = JoinSet::new();

        let announcer = tokio::spawn(announce_devices(Arc::clone(&self.dispatcher)));

        for listener in self.listeners {
            let shutdown = shutdown.clone();
            tasks.spawn(async move { listener.run(shutdown).await });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!(error = %e, "Listener stopped with error"),
                Err(e) => error!(error = %e, "Listener task panicked"),
            }
        }

        announcer.abort();
        self.database.close().await;
        info!("Server stopped");
        Ok(())
    }
}

async fn seed_holders(database: &Database, config: &Config) -> anyhow::Result<()> {
    if config.holders.is_empty() {
        return Ok(());
    }

    let holders = SqliteHolderRepository::new(database.pool().clone());
    for seed in &config.holders {
        let holder = seed.to_holder()?;
        holders
            .upsert(&holder)
            .await
            .with_context(|| format!("Failed to seed holder {}", holder.credential))?;
    }

    info!(count = config.holders.len(), "Holder registry seeded");
    Ok(())
}

/// Locate every HTTP display and put its idle screen up.
///
/// Relay devices get theirs once they connect and introduce themselves.
async fn announce_devices(dispatcher: Arc<FeedbackDispatcher>) {
    let mut devices: Vec<_> = dispatcher.targets().collect();
    devices.sort_by_key(|(mac, _)| *mac);

    for (mac, target) in devices {
        if target.path == DeliveryPath::SessionRelay {
            debug!(mac = %mac, "Relay device, idle screen deferred");
            continue;
        }

        if dispatcher.announce_idle(mac).await {
            info!(mac = %mac, role = %target.role, "Display ready");
        } else {
            warn!(
                mac = %mac,
                role = %target.role,
                "Display not reachable yet; waiting for it to connect"
            );
        }
    }
}
