//! The node-facing entry points. `DataIndexer` wraps every call into a work
//! item and queues it; `NilIndexer` satisfies the same contract when
//! indexing is disabled.

use crate::data::{
    AlteredAccountData, Body, Header, OutportBlockWithHeader, RoundInfo, ValidatorRatingInfo,
};
use crate::dispatcher::{Dispatcher, WorkHandler, WorkItem};
use crate::errors::IndexerError;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::collections::HashMap;
use std::sync::Arc;

pub trait Indexer: Send + Sync {
    fn save_block(&self, block: OutportBlockWithHeader)
        -> BoxFuture<'_, Result<(), IndexerError>>;

    fn revert_indexed_block(
        &self,
        header: Header,
        body: Body,
    ) -> BoxFuture<'_, Result<(), IndexerError>>;

    fn save_rounds_info(&self, rounds: Vec<RoundInfo>) -> BoxFuture<'_, Result<(), IndexerError>>;

    fn save_validators_rating(
        &self,
        index_id: String,
        ratings: Vec<ValidatorRatingInfo>,
    ) -> BoxFuture<'_, Result<(), IndexerError>>;

    fn save_validators_pub_keys(
        &self,
        pub_keys: HashMap<u32, Vec<Vec<u8>>>,
        epoch: u32,
    ) -> BoxFuture<'_, Result<(), IndexerError>>;

    fn save_accounts(
        &self,
        timestamp: u64,
        accounts: HashMap<String, AlteredAccountData>,
    ) -> BoxFuture<'_, Result<(), IndexerError>>;

    fn finalized_block(&self, hash: Vec<u8>) -> BoxFuture<'_, Result<(), IndexerError>>;

    fn close(&mut self) -> BoxFuture<'_, Result<(), IndexerError>>;

    fn is_nil_indexer(&self) -> bool {
        false
    }
}

pub struct DataIndexer {
    dispatcher: Option<Dispatcher>,
}

impl DataIndexer {
    pub fn new(handler: Arc<dyn WorkHandler>, queue_capacity: usize) -> Self {
        Self {
            dispatcher: Some(Dispatcher::start(handler, queue_capacity)),
        }
    }

    async fn enqueue(&self, item: WorkItem) -> Result<(), IndexerError> {
        let Some(dispatcher) = &self.dispatcher else {
            return Err(IndexerError::Input("indexer is closed".into()));
        };
        dispatcher.add(item).await
    }
}

impl Indexer for DataIndexer {
    fn save_block(
        &self,
        block: OutportBlockWithHeader,
    ) -> BoxFuture<'_, Result<(), IndexerError>> {
        tracing::debug!(
            nonce = block.header.nonce,
            round = block.header.round,
            "queueing block for indexing"
        );
        self.enqueue(WorkItem::SaveBlock(Box::new(block))).boxed()
    }

    fn revert_indexed_block(
        &self,
        header: Header,
        body: Body,
    ) -> BoxFuture<'_, Result<(), IndexerError>> {
        self.enqueue(WorkItem::RevertBlock { header, body }).boxed()
    }

    fn save_rounds_info(&self, rounds: Vec<RoundInfo>) -> BoxFuture<'_, Result<(), IndexerError>> {
        self.enqueue(WorkItem::SaveRounds(rounds)).boxed()
    }

    fn save_validators_rating(
        &self,
        index_id: String,
        ratings: Vec<ValidatorRatingInfo>,
    ) -> BoxFuture<'_, Result<(), IndexerError>> {
        self.enqueue(WorkItem::SaveValidatorsRating { index_id, ratings })
            .boxed()
    }

    fn save_validators_pub_keys(
        &self,
        pub_keys: HashMap<u32, Vec<Vec<u8>>>,
        epoch: u32,
    ) -> BoxFuture<'_, Result<(), IndexerError>> {
        self.enqueue(WorkItem::SaveValidatorsPubKeys { pub_keys, epoch })
            .boxed()
    }

    fn save_accounts(
        &self,
        timestamp: u64,
        accounts: HashMap<String, AlteredAccountData>,
    ) -> BoxFuture<'_, Result<(), IndexerError>> {
        self.enqueue(WorkItem::SaveAccounts {
            timestamp,
            accounts,
        })
        .boxed()
    }

    fn finalized_block(&self, hash: Vec<u8>) -> BoxFuture<'_, Result<(), IndexerError>> {
        self.enqueue(WorkItem::FinalizedBlock { hash }).boxed()
    }

    fn close(&mut self) -> BoxFuture<'_, Result<(), IndexerError>> {
        let dispatcher = self.dispatcher.take();
        async move {
            if let Some(dispatcher) = dispatcher {
                dispatcher.close().await;
            }
            Ok(())
        }
        .boxed()
    }
}

/// Accepts everything, indexes nothing.
#[derive(Default)]
pub struct NilIndexer;

impl NilIndexer {
    pub fn new() -> Self {
        Self
    }
}

impl Indexer for NilIndexer {
    fn save_block(
        &self,
        _block: OutportBlockWithHeader,
    ) -> BoxFuture<'_, Result<(), IndexerError>> {
        async { Ok(()) }.boxed()
    }

    fn revert_indexed_block(
        &self,
        _header: Header,
        _body: Body,
    ) -> BoxFuture<'_, Result<(), IndexerError>> {
        async { Ok(()) }.boxed()
    }

    fn save_rounds_info(&self, _rounds: Vec<RoundInfo>) -> BoxFuture<'_, Result<(), IndexerError>> {
        async { Ok(()) }.boxed()
    }

    fn save_validators_rating(
        &self,
        _index_id: String,
        _ratings: Vec<ValidatorRatingInfo>,
    ) -> BoxFuture<'_, Result<(), IndexerError>> {
        async { Ok(()) }.boxed()
    }

    fn save_validators_pub_keys(
        &self,
        _pub_keys: HashMap<u32, Vec<Vec<u8>>>,
        _epoch: u32,
    ) -> BoxFuture<'_, Result<(), IndexerError>> {
        async { Ok(()) }.boxed()
    }

    fn save_accounts(
        &self,
        _timestamp: u64,
        _accounts: HashMap<String, AlteredAccountData>,
    ) -> BoxFuture<'_, Result<(), IndexerError>> {
        async { Ok(()) }.boxed()
    }

    fn finalized_block(&self, _hash: Vec<u8>) -> BoxFuture<'_, Result<(), IndexerError>> {
        async { Ok(()) }.boxed()
    }

    fn close(&mut self) -> BoxFuture<'_, Result<(), IndexerError>> {
        async { Ok(()) }.boxed()
    }

    fn is_nil_indexer(&self) -> bool {
        true
    }
}
