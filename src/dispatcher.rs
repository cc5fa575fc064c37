//! Serialized work queue between the node-facing facade and the processor.
//! A single consumer drains a bounded FIFO channel; a full queue blocks the
//! producer, pushing back on the node. Failed items retry with exponential
//! backoff when the error kind allows it, and are dropped otherwise so one
//! poisoned block cannot stall the rest of the chain.

use crate::data::{
    AlteredAccountData, Body, Header, OutportBlockWithHeader, RoundInfo, ValidatorRatingInfo,
};
use crate::errors::IndexerError;
use crate::process::ElasticProcessor;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const BACKOFF_MULTIPLIER: f64 = 1.5;
const MAX_BACKOFF: Duration = Duration::from_secs(6 * 60);
const MAX_ATTEMPTS: u32 = 10;

/// One queued indexing job.
#[derive(Debug)]
pub enum WorkItem {
    SaveBlock(Box<OutportBlockWithHeader>),
    RevertBlock {
        header: Header,
        body: Body,
    },
    SaveRounds(Vec<RoundInfo>),
    SaveValidatorsPubKeys {
        pub_keys: HashMap<u32, Vec<Vec<u8>>>,
        epoch: u32,
    },
    SaveValidatorsRating {
        index_id: String,
        ratings: Vec<ValidatorRatingInfo>,
    },
    SaveAccounts {
        timestamp: u64,
        accounts: HashMap<String, AlteredAccountData>,
    },
    FinalizedBlock {
        hash: Vec<u8>,
    },
}

impl WorkItem {
    fn kind(&self) -> &'static str {
        match self {
            WorkItem::SaveBlock(_) => "save block",
            WorkItem::RevertBlock { .. } => "revert block",
            WorkItem::SaveRounds(_) => "save rounds",
            WorkItem::SaveValidatorsPubKeys { .. } => "save validators pubkeys",
            WorkItem::SaveValidatorsRating { .. } => "save validators rating",
            WorkItem::SaveAccounts { .. } => "save accounts",
            WorkItem::FinalizedBlock { .. } => "finalized block",
        }
    }
}

/// The consumer side: whatever executes work items.
pub trait WorkHandler: Send + Sync + 'static {
    fn handle<'a>(&'a self, item: &'a WorkItem) -> BoxFuture<'a, Result<(), IndexerError>>;
}

impl WorkHandler for ElasticProcessor {
    fn handle<'a>(&'a self, item: &'a WorkItem) -> BoxFuture<'a, Result<(), IndexerError>> {
        async move {
            match item {
                WorkItem::SaveBlock(block) => self.save_block(block).await,
                WorkItem::RevertBlock { header, body } => self.remove_block(header, body).await,
                WorkItem::SaveRounds(rounds) => self.save_rounds(rounds).await,
                WorkItem::SaveValidatorsPubKeys { pub_keys, epoch } => {
                    self.save_validators_pub_keys(pub_keys, *epoch).await
                }
                WorkItem::SaveValidatorsRating { index_id, ratings } => {
                    self.save_validators_rating(index_id, ratings).await
                }
                WorkItem::SaveAccounts {
                    timestamp,
                    accounts,
                } => self.save_accounts(*timestamp, accounts).await,
                WorkItem::FinalizedBlock { hash } => {
                    tracing::debug!(hash = %hex::encode(hash), "block finalized");
                    Ok(())
                }
            }
        }
        .boxed()
    }
}

pub struct Dispatcher {
    sender: mpsc::Sender<WorkItem>,
    consumer: JoinHandle<()>,
}

impl Dispatcher {
    pub fn start(handler: Arc<dyn WorkHandler>, queue_capacity: usize) -> Self {
        let (sender, receiver) = mpsc::channel(queue_capacity.max(1));
        let consumer = tokio::spawn(consume(receiver, handler));
        Self { sender, consumer }
    }

    /// Enqueues a work item; blocks when the queue is full.
    pub async fn add(&self, item: WorkItem) -> Result<(), IndexerError> {
        self.sender
            .send(item)
            .await
            .map_err(|_| IndexerError::Input("dispatcher is closed".into()))
    }

    /// Stops intake, drains the queued items best-effort and waits for the
    /// consumer to finish.
    pub async fn close(self) {
        drop(self.sender);
        if let Err(err) = self.consumer.await {
            tracing::warn!(?err, "dispatcher consumer ended abnormally");
        }
    }
}

async fn consume(mut receiver: mpsc::Receiver<WorkItem>, handler: Arc<dyn WorkHandler>) {
    while let Some(item) = receiver.recv().await {
        handle_with_retry(handler.as_ref(), &item).await;
    }
    tracing::debug!("dispatcher queue drained, consumer stopping");
}

async fn handle_with_retry(handler: &dyn WorkHandler, item: &WorkItem) {
    let kind = item.kind();
    let mut backoff = INITIAL_BACKOFF;

    for attempt in 1..=MAX_ATTEMPTS {
        match handler.handle(item).await {
            Ok(()) => return,
            Err(err) if !err.is_retryable() => {
                tracing::warn!(%err, kind, "work item cannot succeed, dropping");
                return;
            }
            Err(err) if attempt == MAX_ATTEMPTS => {
                tracing::error!(%err, kind, attempt, "work item exhausted retries, dropping");
                return;
            }
            Err(err) => {
                tracing::warn!(%err, kind, attempt, ?backoff, "work item failed, retrying");
                tokio::time::sleep(backoff).await;
                backoff = backoff.mul_f64(BACKOFF_MULTIPLIER).min(MAX_BACKOFF);
            }
        }
    }
}
