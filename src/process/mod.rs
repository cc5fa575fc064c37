//! The per-block orchestrator: fans one node output into every enabled
//! index, accumulates the bulk payloads and flushes them.

pub mod accounts;
pub mod block;
pub mod logsevents;
pub mod miniblocks;
pub mod operations;
pub mod statistics;
pub mod tags;
pub mod transactions;
pub mod validators;

use crate::converters::BalanceConverter;
use crate::core::{
    Codec, FeeCalculator, Hasher, PubkeyConverter, ShardCoordinator, METACHAIN_SHARD_ID,
};
use crate::data::{
    AlteredAccountData, AlteredAccounts, AlteredMarker, Body, BufferSlice, Header,
    OutportBlockWithHeader, RoundInfo, TokensInfo, ValidatorRatingInfo,
};
use crate::elastic::{indices, DatabaseClient};
use crate::errors::IndexerError;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

pub struct ElasticProcessorArgs {
    pub client: Arc<dyn DatabaseClient>,
    pub hasher: Arc<dyn Hasher>,
    pub codec: Arc<dyn Codec>,
    pub pubkey_converter: Arc<dyn PubkeyConverter>,
    pub validator_pubkey_converter: Arc<dyn PubkeyConverter>,
    pub shard_coordinator: Arc<dyn ShardCoordinator>,
    pub fee_calculator: Arc<dyn FeeCalculator>,
    pub enabled_indexes: Vec<String>,
    pub denomination: i32,
    pub bulk_request_max_size: usize,
    pub is_in_import_db_mode: bool,
}

pub struct ElasticProcessor {
    client: Arc<dyn DatabaseClient>,
    enabled: HashSet<String>,
    bulk_max_size: usize,
    self_shard: u32,
    accounts: accounts::AccountsProcessor,
    block: block::BlockProcessor,
    miniblocks: miniblocks::MiniblocksProcessor,
    transactions: transactions::TransactionsProcessor,
    logs_events: logsevents::LogsEventsProcessor,
    validators: validators::ValidatorsProcessor,
    statistics: statistics::StatisticsProcessor,
    operations: operations::OperationsProcessor,
}

impl ElasticProcessor {
    pub fn new(args: ElasticProcessorArgs) -> Result<Self, IndexerError> {
        if args.enabled_indexes.is_empty() {
            return Err(IndexerError::EmptyEnabledIndexes);
        }
        let balance_converter = Arc::new(BalanceConverter::new(args.denomination)?);
        let self_shard = args.shard_coordinator.self_id();

        Ok(Self {
            enabled: args.enabled_indexes.into_iter().collect(),
            bulk_max_size: args.bulk_request_max_size,
            self_shard,
            accounts: accounts::AccountsProcessor::new(
                args.pubkey_converter.clone(),
                balance_converter.clone(),
                self_shard,
            ),
            block: block::BlockProcessor::new(args.hasher.clone(), args.codec.clone()),
            miniblocks: miniblocks::MiniblocksProcessor::new(
                self_shard,
                args.hasher.clone(),
                args.codec.clone(),
            ),
            transactions: transactions::TransactionsProcessor::new(
                args.pubkey_converter.clone(),
                args.fee_calculator,
                args.shard_coordinator.clone(),
                args.hasher.clone(),
                args.codec.clone(),
                args.is_in_import_db_mode,
            ),
            logs_events: logsevents::LogsEventsProcessor::new(
                args.pubkey_converter.clone(),
                args.shard_coordinator.clone(),
                args.hasher,
                args.codec,
                balance_converter,
            ),
            validators: validators::ValidatorsProcessor::new(args.validator_pubkey_converter),
            statistics: statistics::StatisticsProcessor::new(),
            operations: operations::OperationsProcessor::new(
                args.pubkey_converter,
                args.shard_coordinator,
                args.is_in_import_db_mode,
            ),
            client: args.client,
        })
    }

    /// Wires a processor from the loaded configuration, deriving the shard
    /// coordinator from the configured shard layout.
    pub fn from_config(
        config: &crate::config::Config,
        client: Arc<dyn DatabaseClient>,
        hasher: Arc<dyn Hasher>,
        codec: Arc<dyn Codec>,
        pubkey_converter: Arc<dyn PubkeyConverter>,
        validator_pubkey_converter: Arc<dyn PubkeyConverter>,
        fee_calculator: Arc<dyn FeeCalculator>,
    ) -> Result<Self, IndexerError> {
        config.validate()?;
        Self::new(ElasticProcessorArgs {
            client,
            hasher,
            codec,
            pubkey_converter,
            validator_pubkey_converter,
            shard_coordinator: Arc::new(crate::core::MaskShardCoordinator::new(
                config.self_shard_id,
                config.num_shards,
            )),
            fee_calculator,
            enabled_indexes: config.enabled_indexes.clone(),
            denomination: config.denomination,
            bulk_request_max_size: config.bulk_request_max_size,
            is_in_import_db_mode: config.is_in_import_db_mode,
        })
    }

    fn is_enabled(&self, index: &str) -> bool {
        self.enabled.contains(index)
    }

    fn new_buffer(&self) -> BufferSlice {
        BufferSlice::new(self.bulk_max_size)
    }

    async fn flush(&self, buffer: &BufferSlice) -> Result<(), IndexerError> {
        for chunk in buffer.buffers() {
            self.client.do_bulk_request("", chunk).await?;
        }
        Ok(())
    }

    /// Verifies templates/policies and creates the enabled indices. Run once
    /// at startup.
    pub async fn create_indices(
        &self,
        templates: &HashMap<String, Value>,
        policies: &HashMap<String, Value>,
    ) -> Result<(), IndexerError> {
        for (name, template) in templates {
            self.client.check_and_create_template(name, template).await?;
        }
        for (name, policy) in policies {
            self.client.check_and_create_policy(name, policy).await?;
        }
        for index in &self.enabled {
            self.client.check_and_create_index(index).await?;
        }
        Ok(())
    }

    /// Indexes one block across every enabled index. Any failure aborts the
    /// block and is handed back to the dispatcher.
    pub async fn save_block(&self, obh: &OutportBlockWithHeader) -> Result<(), IndexerError> {
        let header = &obh.header;
        let timestamp = header.time_stamp;
        let mut buffer = self.new_buffer();

        let mb_hashes = self.miniblocks.get_miniblocks_hashes_hex(&obh.body)?;
        let block = self
            .block
            .prepare_block_for_db(header, &obh.body, mb_hashes.clone())?;

        if self.is_enabled(indices::BLOCKS) {
            self.block
                .serialize_block(&block, &mut buffer, indices::BLOCKS)?;
        }
        let is_meta_epoch_start = header.shard_id == METACHAIN_SHARD_ID && header.epoch_start;
        if is_meta_epoch_start && self.is_enabled(indices::EPOCH_INFO) {
            self.block
                .serialize_epoch_info(header, &mut buffer, indices::EPOCH_INFO)?;
        }

        if self.is_enabled(indices::MINIBLOCKS) && !obh.body.mini_blocks.is_empty() {
            let docs = self
                .miniblocks
                .prepare_db_miniblocks(header, &obh.body, &block.hash)?;
            let existing = self
                .client
                .do_multi_get(indices::MINIBLOCKS, &mb_hashes, false)
                .await?;
            let in_db: HashMap<String, bool> = existing
                .into_iter()
                .map(|doc| (doc.id, doc.found))
                .collect();
            self.miniblocks
                .serialize_bulk_miniblocks(&docs, &in_db, &mut buffer, indices::MINIBLOCKS)?;
        }

        let mut prepared = self
            .transactions
            .prepare_transactions_for_database(header, &obh.body, &obh.pool)?;
        let mut logs_results =
            self.logs_events
                .extract_data_from_logs(&obh.pool.logs, &mut prepared, timestamp);

        if self.is_enabled(indices::TRANSACTIONS) {
            self.transactions.serialize_transactions(
                &prepared.transactions,
                &prepared.tx_hash_status,
                &mut buffer,
                indices::TRANSACTIONS,
            )?;
        }
        if self.is_enabled(indices::SCRESULTS) {
            self.transactions
                .serialize_scresults(&prepared.scrs, &mut buffer, indices::SCRESULTS)?;
        }
        if self.is_enabled(indices::RECEIPTS) {
            self.transactions
                .serialize_receipts(&prepared.receipts, &mut buffer, indices::RECEIPTS)?;
        }
        if self.is_enabled(indices::OPERATIONS) {
            let (op_txs, op_scrs) = self
                .operations
                .process_transactions_and_scrs(&prepared.transactions, &prepared.scrs);
            self.transactions.serialize_transactions(
                &op_txs,
                &HashMap::new(),
                &mut buffer,
                indices::OPERATIONS,
            )?;
            self.operations
                .serialize_scrs(&op_scrs, &mut buffer, indices::OPERATIONS)?;
        }

        if self.is_enabled(indices::LOGS) || self.is_enabled(indices::EVENTS) {
            let (log_docs, event_docs) =
                self.logs_events
                    .prepare_logs_for_db(&obh.pool.logs, timestamp, self.self_shard);
            if self.is_enabled(indices::LOGS) {
                self.logs_events
                    .serialize_logs(&log_docs, &mut buffer, indices::LOGS)?;
            }
            if self.is_enabled(indices::EVENTS) {
                self.logs_events
                    .serialize_events(&event_docs, &mut buffer, indices::EVENTS)?;
            }
        }

        let (regular, esdt) = self
            .accounts
            .get_accounts(&prepared.altered, &obh.altered_accounts);
        let regular_map = self.accounts.prepare_regular_accounts_map(&regular);
        let (esdt_map, account_tokens) =
            self.accounts
                .prepare_accounts_map_esdt(timestamp, &esdt, &mut logs_results.tags);

        if self.is_enabled(indices::ACCOUNTS) {
            self.accounts
                .serialize_accounts(&regular_map, &mut buffer, indices::ACCOUNTS)?;
        }
        if self.is_enabled(indices::ACCOUNTS_ESDT) {
            self.accounts
                .serialize_accounts_esdt(&esdt_map, &mut buffer, indices::ACCOUNTS_ESDT)?;
        }
        if self.is_enabled(indices::ACCOUNTS_HISTORY) {
            let history = self.accounts.prepare_accounts_history(timestamp, &regular_map);
            self.accounts.serialize_accounts_history(
                &history,
                &mut buffer,
                indices::ACCOUNTS_HISTORY,
            )?;
        }
        if self.is_enabled(indices::ACCOUNTS_ESDT_HISTORY) {
            let history = self.accounts.prepare_accounts_history(timestamp, &esdt_map);
            self.accounts.serialize_accounts_history(
                &history,
                &mut buffer,
                indices::ACCOUNTS_ESDT_HISTORY,
            )?;
        }

        let mut tokens = logs_results.tokens;
        self.accounts
            .put_token_metadata_in_tokens(&mut tokens, &obh.altered_accounts);
        for token in account_tokens.get_all() {
            tokens.add(token.clone());
        }
        if self.is_enabled(indices::TOKENS) {
            self.logs_events
                .serialize_tokens(&tokens, &mut buffer, indices::TOKENS)?;
            self.logs_events.serialize_roles_data(
                &logs_results.token_roles,
                &mut buffer,
                indices::TOKENS,
            )?;
        }

        self.backfill_token_types(&tokens, &mut buffer).await?;

        if self.is_enabled(indices::SC_DEPLOYS) {
            self.logs_events.serialize_sc_deploys(
                &logs_results.sc_deploys,
                &mut buffer,
                indices::SC_DEPLOYS,
            )?;
        }
        if self.is_enabled(indices::DELEGATORS) {
            self.logs_events.serialize_delegators(
                &logs_results.delegators,
                &mut buffer,
                indices::DELEGATORS,
            )?;
        }
        if self.is_enabled(indices::TOKENS_INFO) {
            self.logs_events.serialize_supply_data(
                &logs_results.tokens_supply,
                &mut buffer,
                indices::TOKENS_INFO,
            )?;
        }
        if self.is_enabled(indices::TAGS) {
            logs_results.tags.serialize(&mut buffer, indices::TAGS);
        }

        self.flush(&buffer).await
    }

    /// A token-type issue observed after create events means existing NFT
    /// documents were written without a type; look them up and fill it in.
    async fn backfill_token_types(
        &self,
        tokens: &TokensInfo,
        buffer: &mut BufferSlice,
    ) -> Result<(), IndexerError> {
        for token in tokens.get_all() {
            if token.token_type.is_empty() || token.nonce != 0 {
                continue;
            }

            let query = json!({
                "query": { "match": { "token": token.token } },
                "_source": false,
                "size": 1000,
            });

            if self.is_enabled(indices::ACCOUNTS_ESDT) {
                let hits = self.client.do_scroll(indices::ACCOUNTS_ESDT, query.clone()).await?;
                let ids: Vec<String> = hits.into_iter().map(|hit| hit.id).collect();
                self.accounts.serialize_type_for_provided_ids(
                    &ids,
                    &token.token_type,
                    buffer,
                    indices::ACCOUNTS_ESDT,
                )?;
            }
            if self.is_enabled(indices::TOKENS) {
                let hits = self.client.do_scroll(indices::TOKENS, query).await?;
                let ids: Vec<String> = hits
                    .into_iter()
                    .map(|hit| hit.id)
                    .filter(|id| id != &token.token)
                    .collect();
                self.accounts.serialize_type_for_provided_ids(
                    &ids,
                    &token.token_type,
                    buffer,
                    indices::TOKENS,
                )?;
            }
        }
        Ok(())
    }

    /// Deletes exactly the documents a block introduced and rolls back the
    /// delegator list edits. Issue reverts in reverse block order.
    pub async fn remove_block(&self, header: &Header, body: &Body) -> Result<(), IndexerError> {
        let mut buffer = self.new_buffer();

        let block_hash = hex::encode(self.block.compute_header_hash(header)?);
        put_deletes(&mut buffer, indices::BLOCKS, &[block_hash]);

        let mb_hashes = self.miniblocks.get_miniblocks_hashes_hex(body)?;
        put_deletes(&mut buffer, indices::MINIBLOCKS, &mb_hashes);

        let (tx_hashes, scr_hashes) = self.transactions.get_hex_encoded_hashes_for_remove(body);
        put_deletes(&mut buffer, indices::TRANSACTIONS, &tx_hashes);
        put_deletes(&mut buffer, indices::SCRESULTS, &scr_hashes);
        put_deletes(&mut buffer, indices::OPERATIONS, &tx_hashes);
        put_deletes(&mut buffer, indices::OPERATIONS, &scr_hashes);
        put_deletes(&mut buffer, indices::LOGS, &tx_hashes);

        self.flush(&buffer).await?;

        if self.is_enabled(indices::DELEGATORS) {
            let query = self
                .logs_events
                .prepare_delegators_query_for_revert(header.time_stamp);
            self.client.update_by_query(indices::DELEGATORS, query).await?;
        }
        Ok(())
    }

    /// Chain-independent account snapshot (the node reports balance changes
    /// outside block processing, e.g. at genesis or on trie sync).
    pub async fn save_accounts(
        &self,
        timestamp: u64,
        node_accounts: &HashMap<String, AlteredAccountData>,
    ) -> Result<(), IndexerError> {
        let mut tracked = AlteredAccounts::new();
        for (address, account) in node_accounts {
            tracked.add(address.clone(), AlteredMarker::default());
            for token in &account.tokens {
                tracked.add(
                    address.clone(),
                    AlteredMarker {
                        is_esdt_operation: true,
                        token_identifier: token.identifier.clone(),
                        nft_nonce: token.nonce,
                        ..Default::default()
                    },
                );
            }
        }

        let mut buffer = self.new_buffer();
        let mut tags = tags::CountTags::new();
        let (regular, esdt) = self.accounts.get_accounts(&tracked, node_accounts);
        let regular_map = self.accounts.prepare_regular_accounts_map(&regular);
        let (esdt_map, _) = self
            .accounts
            .prepare_accounts_map_esdt(timestamp, &esdt, &mut tags);

        if self.is_enabled(indices::ACCOUNTS) {
            self.accounts
                .serialize_accounts(&regular_map, &mut buffer, indices::ACCOUNTS)?;
        }
        if self.is_enabled(indices::ACCOUNTS_ESDT) {
            self.accounts
                .serialize_accounts_esdt(&esdt_map, &mut buffer, indices::ACCOUNTS_ESDT)?;
        }
        if self.is_enabled(indices::ACCOUNTS_HISTORY) {
            let history = self.accounts.prepare_accounts_history(timestamp, &regular_map);
            self.accounts.serialize_accounts_history(
                &history,
                &mut buffer,
                indices::ACCOUNTS_HISTORY,
            )?;
        }
        if self.is_enabled(indices::ACCOUNTS_ESDT_HISTORY) {
            let history = self.accounts.prepare_accounts_history(timestamp, &esdt_map);
            self.accounts.serialize_accounts_history(
                &history,
                &mut buffer,
                indices::ACCOUNTS_ESDT_HISTORY,
            )?;
        }

        self.flush(&buffer).await
    }

    pub async fn save_rounds(&self, rounds: &[RoundInfo]) -> Result<(), IndexerError> {
        if !self.is_enabled(indices::ROUNDS) {
            return Ok(());
        }
        let mut buffer = self.new_buffer();
        self.statistics
            .serialize_rounds_info(rounds, &mut buffer, indices::ROUNDS)?;
        self.flush(&buffer).await
    }

    pub async fn save_validators_pub_keys(
        &self,
        pub_keys_per_shard: &HashMap<u32, Vec<Vec<u8>>>,
        epoch: u32,
    ) -> Result<(), IndexerError> {
        if !self.is_enabled(indices::VALIDATORS) {
            return Ok(());
        }
        let mut buffer = self.new_buffer();
        let mut shards: Vec<_> = pub_keys_per_shard.iter().collect();
        shards.sort_by_key(|(shard, _)| **shard);
        for (shard, keys) in shards {
            let doc = self.validators.prepare_validators_public_keys(keys);
            self.validators.serialize_validators_pub_keys(
                *shard,
                epoch,
                &doc,
                &mut buffer,
                indices::VALIDATORS,
            )?;
        }
        self.flush(&buffer).await
    }

    pub async fn save_validators_rating(
        &self,
        index_id: &str,
        ratings: &[ValidatorRatingInfo],
    ) -> Result<(), IndexerError> {
        if !self.is_enabled(indices::RATING) {
            return Ok(());
        }
        let mut buffer = self.new_buffer();
        self.validators
            .serialize_validators_rating(index_id, ratings, &mut buffer, indices::RATING)?;
        self.flush(&buffer).await
    }
}

fn put_deletes(buffer: &mut BufferSlice, index: &str, ids: &[String]) {
    for id in ids {
        let meta = format!(r#"{{ "delete" : {{ "_index": "{index}", "_id" : "{id}" }} }}"#);
        buffer.put(meta.as_bytes(), None);
    }
}
