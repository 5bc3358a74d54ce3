//! Sequential batch vectorization with paced external calls.
//!
//! Throughput against the provider is deliberately serialized: one
//! in-flight call at a time with a fixed inter-item delay, enforced by
//! a `governor` direct rate limiter so the pacing policy is a value,
//! not a sprinkle of sleeps. One item's failure never aborts the rest
//! of the batch, and each successful vector is durable before the next
//! item starts.

use std::time::Duration;

use async_trait::async_trait;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::timeout;
use tracing::{info, warn};

use super::{EmbedInput, ProviderError, VectorProvider};
use crate::run_id;

#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct SinkError(pub String);

/// Where generated vectors land, one write per item. Writes must be
/// independently durable; the vectorizer never batches them.
#[async_trait]
pub trait VectorSink: Send + Sync {
    async fn store(&self, item_id: i64, vector: &[f32]) -> Result<(), SinkError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchItem {
    pub id: i64,
    pub input: EmbedInput,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    Generated { dimension: usize },
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchItemReport {
    pub item_id: i64,
    pub outcome: ItemOutcome,
}

/// Per-run summary. `items` holds one entry per item actually
/// attempted; on cancellation the untouched tail is absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchReport {
    pub run_id: String,
    pub success_count: usize,
    pub failure_count: usize,
    pub cancelled: bool,
    pub items: Vec<BatchItemReport>,
}

#[derive(Debug, Clone)]
pub struct BatchVectorizerConfig {
    /// Hard per-call bound; an elapsed timeout counts as that item's
    /// failure, never a retry loop.
    pub item_timeout: Duration,
    /// Fixed delay between consecutive provider calls.
    pub inter_item_delay: Duration,
}

impl Default for BatchVectorizerConfig {
    fn default() -> Self {
        Self {
            item_timeout: Duration::from_secs(30),
            inter_item_delay: Duration::from_millis(1000),
        }
    }
}

impl BatchVectorizerConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let parse = |key: &str| std::env::var(key).ok().and_then(|v| v.parse::<u64>().ok());

        Self {
            item_timeout: parse("PM_EMBED_TIMEOUT_SECONDS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.item_timeout),
            inter_item_delay: parse("PM_EMBED_DELAY_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.inter_item_delay),
        }
    }
}

pub struct BatchVectorizer {
    config: BatchVectorizerConfig,
    limiter: Option<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>,
}

impl BatchVectorizer {
    pub fn new(config: BatchVectorizerConfig) -> Self {
        let limiter = Quota::with_period(config.inter_item_delay).map(RateLimiter::direct);
        Self { config, limiter }
    }

    /// Vectorize one item and persist it through the sink.
    pub async fn generate_one(
        &self,
        provider: &dyn VectorProvider,
        sink: &dyn VectorSink,
        item: &BatchItem,
    ) -> ItemOutcome {
        let result = match timeout(self.config.item_timeout, provider.embed(&item.input)).await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Timeout(self.config.item_timeout)),
        };

        match result {
            Ok(vector) => match sink.store(item.id, &vector).await {
                Ok(()) => ItemOutcome::Generated {
                    dimension: vector.len(),
                },
                Err(err) => {
                    warn!(item_id = item.id, error = %err, "vector store write failed");
                    ItemOutcome::Failed {
                        reason: err.to_string(),
                    }
                }
            },
            Err(err) => {
                warn!(item_id = item.id, error = %err, "vector generation failed");
                ItemOutcome::Failed {
                    reason: err.to_string(),
                }
            }
        }
    }

    /// Run a whole batch strictly sequentially. A `stop` receiver set
    /// to true halts the run after the current item; already-stored
    /// vectors stay stored.
    pub async fn run(
        &self,
        provider: &dyn VectorProvider,
        sink: &dyn VectorSink,
        items: &[BatchItem],
        stop: Option<&watch::Receiver<bool>>,
    ) -> BatchReport {
        let run_id = run_id::generate();
        let mut report = BatchReport {
            run_id: run_id.clone(),
            success_count: 0,
            failure_count: 0,
            cancelled: false,
            items: Vec::with_capacity(items.len()),
        };

        for item in items {
            if stop.map(|rx| *rx.borrow()).unwrap_or(false) {
                report.cancelled = true;
                break;
            }

            if let Some(limiter) = &self.limiter {
                limiter.until_ready().await;
            }

            let outcome = self.generate_one(provider, sink, item).await;
            match outcome {
                ItemOutcome::Generated { .. } => report.success_count += 1,
                ItemOutcome::Failed { .. } => report.failure_count += 1,
            }
            report.items.push(BatchItemReport {
                item_id: item.id,
                outcome,
            });
        }

        info!(
            run_id = %run_id,
            provider = provider.name(),
            requested = items.len(),
            success = report.success_count,
            failure = report.failure_count,
            cancelled = report.cancelled,
            "batch vectorization finished"
        );
        report
    }
}
