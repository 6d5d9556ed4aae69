// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! The single writer.
//!
//! One task owns the [`ChainTail`] and serves append requests strictly in
//! queue order, so no two events ever link onto the same predecessor.
//! The tail only advances after the event has been published; any
//! earlier failure leaves it exactly as it was.

use super::tail::{ChainTail, TailStore};
use crate::channel::MessageChannel;
use crate::errors::{LedgerError, PublishError};
use crate::retry::{retry_with_backoff, RetryPolicy};
use crate::signer::EventSigner;
use chrono::{DateTime, Duration, DurationRound, Utc};
use neural_ledger_core::{CriticalEventPolicy, EventDraft, LedgerEvent};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

pub(crate) struct AppendRequest {
    pub draft: EventDraft,
    pub reply: oneshot::Sender<Result<LedgerEvent, LedgerError>>,
}

pub(crate) struct Sequencer {
    pub tail: ChainTail,
    pub signer: EventSigner,
    pub policy: CriticalEventPolicy,
    pub channel: Arc<dyn MessageChannel>,
    pub topic: String,
    pub publish_retry: RetryPolicy,
    pub tail_store: Arc<dyn TailStore>,
}

impl Sequencer {
    pub async fn run(mut self, mut requests: mpsc::Receiver<AppendRequest>) {
        tracing::info!(
            "Sequencer started at sequence {} (tail {})",
            self.tail.next_sequence,
            self.tail.last_hash
        );
        while let Some(request) = requests.recv().await {
            let result = self.append(request.draft).await;
            if request.reply.send(result).is_err() {
                // Caller went away; the event (if admitted) stays admitted.
                tracing::debug!("log_event caller dropped before reply");
            }
        }
        tracing::info!("Sequencer stopped at sequence {}", self.tail.next_sequence);
    }

    async fn append(&mut self, draft: EventDraft) -> Result<LedgerEvent, LedgerError> {
        let timestamp = next_timestamp(Utc::now(), self.tail.last_timestamp);
        let mut event = draft.link(self.tail.next_sequence, timestamp, self.tail.last_hash);

        if self.policy.requires_signature(event.event_type) {
            let sig = self.signer.sign_event_hash(&event.event_hash).await?;
            event = event.with_signature(sig.key_id, sig.signature);
        }

        let payload = serde_json::to_vec(&event).map_err(|e| PublishError::Encode(e.to_string()))?;
        let channel = &self.channel;
        let topic = self.topic.as_str();
        retry_with_backoff(&self.publish_retry, "publish", || channel.publish(topic, payload.clone()))
            .await
            .map_err(|e| PublishError::from_retry(topic, e))?;

        let next = self.tail.advance(&event);
        self.tail = next;
        self.persist_tail(next).await;

        tracing::debug!(
            "Admitted {} #{} ({})",
            event.event_type,
            event.sequence,
            event.event_hash
        );
        Ok(event)
    }

    /// The event is already handed off, so a failure here is only logged.
    async fn persist_tail(&self, tail: ChainTail) {
        let store = self.tail_store.clone();
        let outcome = tokio::task::spawn_blocking(move || store.persist(&tail)).await;
        let failure = match outcome {
            Ok(Ok(())) => return,
            Ok(Err(e)) => e.to_string(),
            Err(join) => join.to_string(),
        };
        tracing::error!("Failed to persist chain tail at sequence {}: {}", tail.next_sequence, failure);
        metrics::counter!("neural_ledger_tail_persist_failures_total", 1);
    }
}

/// Microsecond-truncated `now`, never earlier than the previous event.
pub(crate) fn next_timestamp(now: DateTime<Utc>, last: Option<DateTime<Utc>>) -> DateTime<Utc> {
    let now = now.duration_trunc(Duration::microseconds(1)).unwrap_or(now);
    match last {
        Some(last) if last > now => last,
        _ => now,
    }
}
