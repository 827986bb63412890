//! BACnet Polling Client
//!
//! [`Client`] owns the client's tables and drives the protocol engine. It is
//! the single consumer of the inbound frame queue: every call to
//! [`Client::tick`] lets the engine drain the queue and then decodes and
//! correlates each frame the engine was handed.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use bacnet_poller::{
//!     client::Client, config::ClientConfig, engine::ProtocolEngine,
//!     queue::InboundFrameQueue, transport::UdpTransport,
//! };
//!
//! # async fn example<E: ProtocolEngine>(engine: E) -> Result<(), Box<dyn std::error::Error>> {
//! let config = ClientConfig::default();
//! let network = config.resolve_network()?;
//! let queue = Arc::new(InboundFrameQueue::new());
//! let transport = Arc::new(UdpTransport::bind(&network, queue.clone())?);
//!
//! let client = Client::new(config, network, engine, queue, transport.clone())?;
//! client.run(async { tokio::signal::ctrl_c().await.ok(); }).await;
//! transport.shutdown();
//! # Ok(())
//! # }
//! ```

use std::{sync::Arc, time::Instant};

use log::{debug, error, info};

use crate::{
    address::ConnectionDescriptor,
    config::{ClientConfig, NetworkSettings},
    correlator::{Correlation, MessageCorrelator},
    diagnostics::Report,
    engine::ProtocolEngine,
    error::Result,
    host::ClientHost,
    pending::{PendingKey, PendingRequest, PendingRequestTable},
    poller::{PollDriver, PollSummary},
    queue::InboundFrameQueue,
    registry::DeviceRegistry,
    store::{LocalProperties, PropertyStore},
    transport::FrameSink,
};

#[cfg(feature = "async")]
use std::future::Future;

#[cfg(feature = "async")]
use tokio::time::{interval, MissedTickBehavior};

pub struct Client<E: ProtocolEngine> {
    config: ClientConfig,
    engine: E,
    host: ClientHost,
    queue: Arc<InboundFrameQueue>,
    registry: Arc<DeviceRegistry>,
    pending: Arc<PendingRequestTable>,
    store: Arc<PropertyStore>,
    local: Arc<LocalProperties>,
    correlator: MessageCorrelator,
    poller: PollDriver,
}

impl<E: ProtocolEngine> Client<E> {
    /// Create a client around `engine`. Frames arriving on `queue` are handed
    /// to the engine; frames the engine sends go to `sink`.
    pub fn new(
        config: ClientConfig,
        network: NetworkSettings,
        engine: E,
        queue: Arc<InboundFrameQueue>,
        sink: Arc<dyn FrameSink>,
    ) -> Result<Self> {
        config.validate()?;

        let registry = Arc::new(DeviceRegistry::new());
        let pending = Arc::new(PendingRequestTable::new());
        let store = Arc::new(PropertyStore::new());
        let local = Arc::new(LocalProperties::for_device(
            config.device_instance,
            config.device_name.clone(),
        ));

        let host = ClientHost::new(
            queue.clone(),
            sink,
            network,
            local.clone(),
            config.max_frame_len,
        );
        let correlator = MessageCorrelator::new(registry.clone(), pending.clone(), store.clone());
        let poller = PollDriver::new(registry.clone(), pending.clone());

        info!(
            "Client started as device {} ({:?})",
            config.device_instance, config.device_name
        );

        Ok(Self {
            config,
            engine,
            host,
            queue,
            registry,
            pending,
            store,
            local,
            correlator,
            poller,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn queue(&self) -> &Arc<InboundFrameQueue> {
        &self.queue
    }

    pub fn registry(&self) -> &Arc<DeviceRegistry> {
        &self.registry
    }

    pub fn pending(&self) -> &Arc<PendingRequestTable> {
        &self.pending
    }

    pub fn store(&self) -> &Arc<PropertyStore> {
        &self.store
    }

    /// Properties the engine serves for the client's own device
    pub fn local_properties(&self) -> &Arc<LocalProperties> {
        &self.local
    }

    /// Run one engine tick and apply every frame it consumed
    pub fn tick(&mut self) -> Vec<Correlation> {
        self.engine.tick(&mut self.host);

        let mut applied = Vec::new();
        for frame in self.host.take_served() {
            let rendered = match self.engine.render(&frame.payload) {
                Ok(rendered) => rendered,
                Err(e) => {
                    error!("Engine could not render packet from {}: {}", frame.sender, e);
                    continue;
                }
            };
            if let Some(correlation) =
                self.correlator
                    .handle(&rendered, &frame.payload, frame.sender)
            {
                applied.push(correlation);
            }
        }
        applied
    }

    /// Broadcast a Who-Is on the local subnet
    pub fn discover(&mut self) -> Result<()> {
        let network = *self.host.network();
        let destination = ConnectionDescriptor::new(network.broadcast_address(), network.port);
        debug!("Sending Who-Is to {}", destination);
        self.engine.send_who_is(&mut self.host, destination)
    }

    /// Drop requests older than the configured TTL
    pub fn reap_expired(&self) -> Vec<(PendingKey, PendingRequest)> {
        match self.config.pending_ttl {
            Some(ttl) => self.pending.evict_expired(ttl, Instant::now()),
            None => Vec::new(),
        }
    }

    /// Reap expired requests, then issue one read per known device
    pub fn poll(&mut self) -> PollSummary {
        self.reap_expired();
        let summary = self.poller.poll_round(&mut self.engine, &mut self.host);
        debug!(
            "Poll round: {} issued, {} duplicate, {} failed",
            summary.issued, summary.duplicates, summary.failed
        );
        summary
    }

    pub fn report(&self) -> Report {
        Report::capture(&self.registry, &self.store, &self.pending)
    }

    /// Log the current contents of every table
    pub fn dump(&self) {
        info!("Database:\n{}", self.report());
    }

    /// Drive the client on its configured intervals until `shutdown` resolves
    #[cfg(feature = "async")]
    pub async fn run<F>(mut self, shutdown: F) -> Self
    where
        F: Future<Output = ()>,
    {
        let mut tick = interval(self.config.tick_interval);
        let mut discovery = interval(self.config.discovery_interval);
        let mut poll = interval(self.config.poll_interval);
        let mut dump = interval(self.config.dump_interval);
        for timer in [&mut tick, &mut discovery, &mut poll, &mut dump] {
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        }

        tokio::pin!(shutdown);
        info!("Client running");

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = tick.tick() => {
                    self.tick();
                }
                _ = discovery.tick() => {
                    if let Err(e) = self.discover() {
                        error!("Failed to send Who-Is: {}", e);
                    }
                }
                _ = poll.tick() => {
                    self.poll();
                }
                _ = dump.tick() => self.dump(),
            }
        }

        info!("Client stopped");
        self
    }
}
