// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use super::sequencer::{AppendRequest, Sequencer};
use super::tail::{ChainTail, TailStore};
use crate::channel::MessageChannel;
use crate::config::LedgerConfig;
use crate::errors::{LedgerError, Result};
use crate::signer::{EventSigner, KeyCustody};
use neural_ledger_core::canonical::MetadataLimits;
use neural_ledger_core::{EventRequest, EventType, LedgerEvent, Metadata};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// External collaborators of the append path.
#[derive(Clone)]
pub struct LedgerDeps {
    pub custody: Arc<dyn KeyCustody>,
    pub channel: Arc<dyn MessageChannel>,
    pub tail_store: Arc<dyn TailStore>,
}

/// Handle to a running ledger. Cheap to clone; the sequencer stops once
/// every clone is dropped.
#[derive(Clone)]
pub struct NeuralLedger {
    requests: mpsc::Sender<AppendRequest>,
    limits: MetadataLimits,
}

impl NeuralLedger {
    /// Restore the tail and spawn the sequencer.
    pub async fn start(config: &LedgerConfig, deps: LedgerDeps) -> Result<(Self, JoinHandle<()>)> {
        let store = deps.tail_store.clone();
        let restored = tokio::task::spawn_blocking(move || store.load())
            .await
            .map_err(|_| LedgerError::Shutdown)??;

        let tail = match restored {
            Some(tail) => {
                tracing::info!("Restored chain tail at sequence {}", tail.next_sequence);
                tail
            }
            None => {
                tracing::info!("No chain tail found, starting from genesis");
                ChainTail::genesis()
            }
        };

        let (tx, rx) = mpsc::channel(config.request_queue_depth.max(1));
        let sequencer = Sequencer {
            tail,
            signer: EventSigner::new(deps.custody, config.signing_key_id.clone(), config.signer_retry),
            policy: config.critical_policy(),
            channel: deps.channel,
            topic: config.topic.clone(),
            publish_retry: config.publish_retry,
            tail_store: deps.tail_store,
        };
        let handle = tokio::spawn(sequencer.run(rx));

        Ok((
            Self {
                requests: tx,
                limits: config.metadata_limits,
            },
            handle,
        ))
    }

    /// Admit one event. On `Ok` the event is chain-linked and queued for
    /// durable storage; on `Err` nothing was recorded.
    pub async fn log_event(&self, request: EventRequest) -> Result<LedgerEvent> {
        let start = Instant::now();
        let event_type = request.event_type;
        let result = self.admit(request).await;

        match &result {
            Ok(_) => {
                metrics::counter!("neural_ledger_events_logged_total", 1, "event_type" => event_type.as_str());
                metrics::histogram!("neural_ledger_log_event_duration_seconds", start.elapsed().as_secs_f64());
            }
            Err(e) => {
                tracing::warn!("log_event({}) rejected: {}", event_type, e);
                metrics::counter!("neural_ledger_events_rejected_total", 1, "reason" => rejection_reason(e));
            }
        }
        result
    }

    async fn admit(&self, request: EventRequest) -> Result<LedgerEvent> {
        // Validation and canonicalization happen here, outside the sequencer.
        let draft = request.into_draft(&self.limits)?;

        let (reply, rx) = oneshot::channel();
        self.requests
            .send(AppendRequest { draft, reply })
            .await
            .map_err(|_| LedgerError::Shutdown)?;
        rx.await.map_err(|_| LedgerError::Shutdown)?
    }

    pub async fn log_session_created(
        &self,
        session_id: &str,
        user_id: &str,
        device_id: &str,
        metadata: Metadata,
    ) -> Result<LedgerEvent> {
        self.log_event(
            EventRequest::new(EventType::SessionCreated)
                .session(session_id)
                .user(user_id)
                .device(device_id)
                .metadata(metadata),
        )
        .await
    }

    pub async fn log_session_started(&self, session_id: &str, metadata: Metadata) -> Result<LedgerEvent> {
        self.log_event(EventRequest::new(EventType::SessionStarted).session(session_id).metadata(metadata))
            .await
    }

    pub async fn log_session_ended(&self, session_id: &str, metadata: Metadata) -> Result<LedgerEvent> {
        self.log_event(EventRequest::new(EventType::SessionEnded).session(session_id).metadata(metadata))
            .await
    }

    pub async fn log_data_ingested(
        &self,
        session_id: &str,
        device_id: &str,
        data_hash: &str,
        size_bytes: u64,
        metadata: Metadata,
    ) -> Result<LedgerEvent> {
        self.log_event(
            EventRequest::new(EventType::DataIngested)
                .session(session_id)
                .device(device_id)
                .data(data_hash, size_bytes)
                .metadata(metadata),
        )
        .await
    }

    pub async fn log_data_exported(
        &self,
        session_id: &str,
        user_id: &str,
        destination: &str,
        metadata: Metadata,
    ) -> Result<LedgerEvent> {
        self.log_event(
            EventRequest::new(EventType::DataExported)
                .session(session_id)
                .user(user_id)
                .metadata(metadata)
                .meta("destination", destination),
        )
        .await
    }

    pub async fn log_access_event(
        &self,
        user_id: &str,
        granted: bool,
        resource: &str,
        metadata: Metadata,
    ) -> Result<LedgerEvent> {
        let event_type = if granted { EventType::AccessGranted } else { EventType::AccessDenied };
        self.log_event(
            EventRequest::new(event_type)
                .user(user_id)
                .metadata(metadata)
                .meta("resource", resource),
        )
        .await
    }

    pub async fn log_auth_event(
        &self,
        user_id: &str,
        success: bool,
        method: &str,
        metadata: Metadata,
    ) -> Result<LedgerEvent> {
        let event_type = if success { EventType::AuthSuccess } else { EventType::AuthFailure };
        self.log_event(
            EventRequest::new(event_type)
                .user(user_id)
                .metadata(metadata)
                .meta("method", method),
        )
        .await
    }

    pub async fn log_model_inference(
        &self,
        session_id: &str,
        user_id: &str,
        model_id: &str,
        metadata: Metadata,
    ) -> Result<LedgerEvent> {
        self.log_event(
            EventRequest::new(EventType::ModelInference)
                .session(session_id)
                .user(user_id)
                .metadata(metadata)
                .meta("model_id", model_id),
        )
        .await
    }

    pub async fn log_consent_event(
        &self,
        user_id: &str,
        granted: bool,
        scope: &str,
        metadata: Metadata,
    ) -> Result<LedgerEvent> {
        let event_type = if granted { EventType::ConsentGranted } else { EventType::ConsentWithdrawn };
        self.log_event(
            EventRequest::new(event_type)
                .user(user_id)
                .metadata(metadata)
                .meta("scope", scope),
        )
        .await
    }
}

fn rejection_reason(e: &LedgerError) -> &'static str {
    match e {
        LedgerError::Validation(_) => "validation",
        LedgerError::Signing(_) => "signing",
        LedgerError::Publish(_) => "publish",
        LedgerError::Shutdown => "shutdown",
        _ => "other",
    }
}
