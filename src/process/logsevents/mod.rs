//! Interprets the events emitted by executed transactions: token transfers
//! and lifecycle changes, delegation bookkeeping, contract deploys and role
//! grants. Each event is offered to the sub-processors in turn until one
//! claims it.

mod delegators;
mod fungible;
mod issue;
mod nfts;
mod scdeploys;
mod serialize;

use crate::converters::BalanceConverter;
use crate::core::{Codec, Hasher, PubkeyConverter, ShardCoordinator};
use crate::data::{
    AlteredAccounts, Event, EventData, EventDoc, LogData, Logs, PreparedLogsResults,
    PreparedResults,
};
use crate::process::transactions::TX_STATUS_FAIL;
use std::collections::HashMap;
use std::sync::Arc;

pub const ISSUE_FUNGIBLE: &str = "issue";
pub const ISSUE_SEMI_FUNGIBLE: &str = "issueSemiFungible";
pub const ISSUE_NON_FUNGIBLE: &str = "issueNonFungible";
pub const REGISTER_META_ESDT: &str = "registerMetaESDT";

pub const DELEGATE: &str = "delegate";
pub const UN_DELEGATE: &str = "unDelegate";
pub const WITHDRAW: &str = "withdraw";

pub const SC_DEPLOY: &str = "SCDeploy";
pub const CHANGE_OWNER: &str = "changeOwner";
pub const ESDT_SET_BURN_ROLE_FOR_ALL: &str = "ESDTSetBurnRoleForAll";
pub const ROLE_PREFIX: &str = "ESDTRole";

pub const SIGNAL_ERROR: &str = "signalError";
pub const INTERNAL_VM_ERRORS: &str = "internalVMErrors";

pub const FUNGIBLE_ESDT: &str = "FungibleESDT";
pub const SEMI_FUNGIBLE_ESDT: &str = "SemiFungibleESDT";
pub const NON_FUNGIBLE_ESDT: &str = "NonFungibleESDT";
pub const META_ESDT: &str = "MetaESDT";

/// Mutable state the sub-processors write into while one block's logs are
/// interpreted.
pub(crate) struct EventContext<'a> {
    pub timestamp: u64,
    pub tx_hash_hex: &'a str,
    pub log_address: &'a [u8],
    pub altered: &'a mut AlteredAccounts,
    pub results: &'a mut PreparedLogsResults,
    pub tx_hash_status: &'a mut HashMap<String, String>,
}

/// What a sub-processor reports back for one event.
#[derive(Debug, Default)]
pub(crate) struct EventOutput {
    pub processed: bool,
    pub identifier: Option<String>,
    pub value: Option<String>,
    pub receiver: Option<String>,
    pub receiver_shard_id: Option<u32>,
}

pub(crate) trait EventProcessor: Send + Sync {
    fn process(&self, event: &EventData, ctx: &mut EventContext) -> EventOutput;
}

pub struct LogsEventsProcessor {
    processors: Vec<Box<dyn EventProcessor>>,
    pubkey_converter: Arc<dyn PubkeyConverter>,
    hasher: Arc<dyn Hasher>,
}

impl LogsEventsProcessor {
    pub fn new(
        pubkey_converter: Arc<dyn PubkeyConverter>,
        shard_coordinator: Arc<dyn ShardCoordinator>,
        hasher: Arc<dyn Hasher>,
        codec: Arc<dyn Codec>,
        balance_converter: Arc<BalanceConverter>,
    ) -> Self {
        let processors: Vec<Box<dyn EventProcessor>> = vec![
            Box::new(fungible::FungibleEsdtProcessor::new(
                pubkey_converter.clone(),
                shard_coordinator.clone(),
            )),
            Box::new(nfts::NftsProcessor::new(
                pubkey_converter.clone(),
                shard_coordinator.clone(),
                codec,
            )),
            Box::new(issue::TokenIssueProcessor::new(pubkey_converter.clone())),
            Box::new(delegators::DelegatorsProcessor::new(
                pubkey_converter.clone(),
                balance_converter,
            )),
            Box::new(scdeploys::ScDeploysProcessor::new(pubkey_converter.clone())),
        ];

        Self {
            processors,
            pubkey_converter,
            hasher,
        }
    }

    /// Walks every event of every log, dispatching to the sub-processors and
    /// attaching recognized token operations back onto the owning tx/SCR.
    pub fn extract_data_from_logs(
        &self,
        logs: &[LogData],
        prepared: &mut PreparedResults,
        timestamp: u64,
    ) -> PreparedLogsResults {
        let mut results = PreparedLogsResults::default();

        let tx_index: HashMap<String, usize> = prepared
            .transactions
            .iter()
            .enumerate()
            .map(|(i, tx)| (tx.hash.clone(), i))
            .collect();
        let scr_index: HashMap<String, usize> = prepared
            .scrs
            .iter()
            .enumerate()
            .map(|(i, scr)| (scr.hash.clone(), i))
            .collect();

        for log_data in logs {
            let tx_hash_hex = hex::encode(&log_data.tx_hash);
            for event in &log_data.log.events {
                self.record_informative_event(event, &tx_hash_hex, prepared);

                let mut ctx = EventContext {
                    timestamp,
                    tx_hash_hex: &tx_hash_hex,
                    log_address: &log_data.log.address,
                    altered: &mut prepared.altered,
                    results: &mut results,
                    tx_hash_status: &mut prepared.tx_hash_status,
                };

                let mut output = EventOutput::default();
                for processor in &self.processors {
                    output = processor.process(event, &mut ctx);
                    if output.processed {
                        break;
                    }
                }
                if !output.processed {
                    continue;
                }
                if let Some(shard) = output.receiver_shard_id {
                    tracing::trace!(
                        receiver = output.receiver.as_deref().unwrap_or_default(),
                        shard,
                        tx = %tx_hash_hex,
                        "token transfer receiver attribution"
                    );
                }

                let (Some(identifier), Some(value)) = (output.identifier, output.value) else {
                    continue;
                };
                if let Some(&i) = tx_index.get(&tx_hash_hex) {
                    prepared.transactions[i].esdt_token_identifier = identifier;
                    prepared.transactions[i].esdt_value = value;
                } else if let Some(&i) = scr_index.get(&tx_hash_hex) {
                    prepared.scrs[i].esdt_token_identifier = identifier;
                    prepared.scrs[i].esdt_value = value;
                }
            }
        }

        results
    }

    /// `signalError` and VM-error events flip the owning transaction to
    /// failed on the destination shard.
    fn record_informative_event(
        &self,
        event: &EventData,
        tx_hash_hex: &str,
        prepared: &mut PreparedResults,
    ) {
        if event.identifier == SIGNAL_ERROR || event.identifier == INTERNAL_VM_ERRORS {
            prepared
                .tx_hash_status
                .insert(tx_hash_hex.to_string(), TX_STATUS_FAIL.to_string());
        }
    }

    /// Builds the `logs` documents and the flattened per-event documents.
    pub fn prepare_logs_for_db(
        &self,
        logs: &[LogData],
        timestamp: u64,
        shard_id: u32,
    ) -> (Vec<Logs>, Vec<EventDoc>) {
        let mut log_docs = Vec::new();
        let mut event_docs = Vec::new();

        for log_data in logs {
            let id = hex::encode(&log_data.tx_hash);
            let log_address = self.pubkey_converter.encode(&log_data.log.address);

            let events: Vec<Event> = log_data
                .log
                .events
                .iter()
                .enumerate()
                .map(|(order, event)| Event {
                    address: self.pubkey_converter.encode(&event.address),
                    identifier: event.identifier.clone(),
                    topics: event.topics.clone(),
                    data: event.data.clone(),
                    order,
                })
                .collect();

            for event in &events {
                event_docs.push(EventDoc {
                    id: format!("{id}-{}", event.order),
                    tx_hash: id.clone(),
                    log_address: log_address.clone(),
                    address: event.address.clone(),
                    identifier: event.identifier.clone(),
                    topics: event.topics.clone(),
                    data: event.data.clone(),
                    order: event.order,
                    shard_id,
                    timestamp,
                });
            }

            log_docs.push(Logs {
                id,
                address: log_address,
                events,
                timestamp,
            });
        }

        (log_docs, event_docs)
    }

    fn compute_delegator_id(&self, address: &str, contract: &str) -> String {
        use base64::{engine::general_purpose::STANDARD, Engine as _};
        let hash = self
            .hasher
            .compute(format!("{address}{contract}").as_bytes());
        STANDARD.encode(hash)
    }
}
