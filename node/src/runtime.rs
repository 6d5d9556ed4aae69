// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Wires the append path, the in-process channel, the fan-out processor,
//! the query service and optional periodic checkpoints into one handle.

use crate::channel::InMemoryChannel;
use crate::checkpoint::CheckpointService;
use crate::config::LedgerConfig;
use crate::errors::{LedgerError, Result};
use crate::ledger::{FileTailStore, LedgerDeps, MemoryTailStore, NeuralLedger, TailStore};
use crate::processor::{FanOutProcessor, StoragePorts};
use crate::query::QueryService;
use crate::signer::{EventSigner, KeyCustody};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub struct LedgerRuntime {
    pub ledger: NeuralLedger,
    pub processor: Arc<FanOutProcessor>,
    pub query: QueryService,
    pub checkpoints: Arc<CheckpointService>,
    pub ports: StoragePorts,
    channel: Arc<InMemoryChannel>,
    shutdown: CancellationToken,
    sequencer: JoinHandle<()>,
    tasks: Vec<JoinHandle<()>>,
}

impl LedgerRuntime {
    pub async fn start(config: &LedgerConfig, custody: Arc<dyn KeyCustody>, ports: StoragePorts) -> Result<Self> {
        let tail_store: Arc<dyn TailStore> = match &config.tail_path {
            Some(path) => Arc::new(FileTailStore::open(path)?),
            None => Arc::new(MemoryTailStore::new()),
        };
        let processor = Arc::new(FanOutProcessor::new(ports.clone(), config));
        Self::start_with(config, custody, ports, tail_store, processor).await
    }

    /// Start with an explicit tail store and a pre-configured processor.
    pub async fn start_with(
        config: &LedgerConfig,
        custody: Arc<dyn KeyCustody>,
        ports: StoragePorts,
        tail_store: Arc<dyn TailStore>,
        processor: Arc<FanOutProcessor>,
    ) -> Result<Self> {
        let channel = Arc::new(InMemoryChannel::new(config.channel_capacity));
        let subscription = channel.subscribe().await.ok_or(LedgerError::Shutdown)?;
        let shutdown = CancellationToken::new();

        let (ledger, sequencer) = NeuralLedger::start(
            config,
            LedgerDeps {
                custody: custody.clone(),
                channel: channel.clone(),
                tail_store,
            },
        )
        .await?;

        let mut tasks = vec![tokio::spawn(processor.clone().run(subscription, shutdown.clone()))];

        let checkpoints = Arc::new(CheckpointService::new(&ports));
        if let Some(interval) = config.checkpoint_interval {
            tracing::info!("Periodic checkpoints every {:?}", interval);
            tasks.push(checkpoints.clone().spawn_periodic(interval, shutdown.clone()));
        }

        let signer = EventSigner::new(custody, config.signing_key_id.clone(), config.signer_retry);
        let query = QueryService::new(&ports, config).with_signer(signer);

        Ok(Self {
            ledger,
            processor,
            query,
            checkpoints,
            ports,
            channel,
            shutdown,
            sequencer,
            tasks,
        })
    }

    /// Wait until every published event has been handled by the processor.
    /// Returns false on timeout.
    pub async fn drain(&self, timeout: Duration) -> bool {
        drain_until(&self.processor, &self.channel, timeout).await
    }

    /// Stop admitting, let the sequencer finish its queue, drain, then stop
    /// the processor and checkpoint tasks.
    ///
    /// The sequencer exits once every [`NeuralLedger`] clone is dropped;
    /// clones still held elsewhere keep it running past `timeout`.
    pub async fn shutdown(self, timeout: Duration) {
        let LedgerRuntime {
            ledger,
            processor,
            channel,
            shutdown,
            sequencer,
            tasks,
            ..
        } = self;

        drop(ledger);
        match tokio::time::timeout(timeout, sequencer).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::error!("Sequencer task failed: {}", e),
            Err(_) => tracing::warn!("Sequencer still running after {:?}; ledger handles outlive the runtime", timeout),
        }

        drain_until(&processor, &channel, timeout).await;
        shutdown.cancel();
        for task in tasks {
            if let Err(e) = task.await {
                tracing::error!("Background task failed: {}", e);
            }
        }
    }
}

async fn drain_until(processor: &FanOutProcessor, channel: &InMemoryChannel, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while processor.delivered() < channel.published() {
        if Instant::now() >= deadline {
            tracing::warn!(
                "Drain timed out: {} of {} deliveries handled",
                processor.delivered(),
                channel.published()
            );
            return false;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    true
}
