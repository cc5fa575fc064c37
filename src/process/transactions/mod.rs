//! Transforms a block's miniblocks and transaction pool into `transactions`,
//! `scresults` and `receipts` documents.

mod builder;
mod esdt;
mod grouper;
mod serialize;

pub use builder::DbTransactionBuilder;
pub use esdt::{parse_esdt_tx, EsdtInfo};

use self::grouper::TxGrouper;
use crate::core::{Codec, FeeCalculator, Hasher, PubkeyConverter, ShardCoordinator};
use crate::data::{Body, Header, MiniBlockType, PreparedResults, TransactionPool};
use crate::errors::IndexerError;
use std::collections::HashMap;
use std::sync::Arc;

pub const TX_STATUS_SUCCESS: &str = "success";
pub const TX_STATUS_PENDING: &str = "pending";
pub const TX_STATUS_INVALID: &str = "invalid";
pub const TX_STATUS_FAIL: &str = "fail";

pub struct TransactionsProcessor {
    grouper: TxGrouper,
    builder: Arc<DbTransactionBuilder>,
    hasher: Arc<dyn Hasher>,
    codec: Arc<dyn Codec>,
    pub(crate) self_shard: u32,
}

impl TransactionsProcessor {
    pub fn new(
        pubkey_converter: Arc<dyn PubkeyConverter>,
        fee_calculator: Arc<dyn FeeCalculator>,
        shard_coordinator: Arc<dyn ShardCoordinator>,
        hasher: Arc<dyn Hasher>,
        codec: Arc<dyn Codec>,
        import_mode: bool,
    ) -> Self {
        let self_shard = shard_coordinator.self_id();
        let builder = Arc::new(DbTransactionBuilder::new(
            pubkey_converter,
            fee_calculator,
            shard_coordinator,
        ));
        Self {
            grouper: TxGrouper::new(builder.clone(), self_shard, import_mode),
            builder,
            hasher,
            codec,
            self_shard,
        }
    }

    pub fn prepare_transactions_for_database(
        &self,
        header: &Header,
        body: &Body,
        pool: &TransactionPool,
    ) -> Result<PreparedResults, IndexerError> {
        let mut results = PreparedResults::default();
        let mut txs_map = HashMap::new();

        for miniblock in &body.mini_blocks {
            let encoded = self
                .codec
                .encode_miniblock(miniblock)
                .map_err(|err| IndexerError::Input(format!("cannot encode miniblock: {err}")))?;
            let mb_hash = hex::encode(self.hasher.compute(&encoded));

            match miniblock.mb_type {
                MiniBlockType::Tx => txs_map.extend(self.grouper.group_normal_txs(
                    miniblock,
                    &mb_hash,
                    header,
                    &pool.items,
                    &mut results.altered,
                )),
                MiniBlockType::Rewards => txs_map.extend(self.grouper.group_reward_txs(
                    miniblock,
                    &mb_hash,
                    header,
                    &pool.items,
                    &mut results.altered,
                )),
                MiniBlockType::Invalid => txs_map.extend(self.grouper.group_invalid_txs(
                    miniblock,
                    &mb_hash,
                    header,
                    &pool.items,
                    &mut results.altered,
                )),
                _ => {}
            }
        }

        let mut scrs = self.grouper.group_scrs(header, &pool.items);
        scrs.sort_by(|a, b| a.hash.cmp(&b.hash));
        for scr in &scrs {
            if let Some(tx) = txs_map.get_mut(&scr.original_tx_hash) {
                tx.smart_contract_results.push(scr.hash.clone());
            }
        }
        self.builder
            .add_scrs_receiver_to_altered(&mut results.altered, &scrs);

        let mut receipts = self.grouper.group_receipts(header, &pool.items);
        receipts.sort_by(|a, b| a.hash.cmp(&b.hash));

        let mut transactions: Vec<_> = txs_map.into_values().collect();
        transactions.sort_by(|a, b| a.hash.cmp(&b.hash));

        results.transactions = transactions;
        results.scrs = scrs;
        results.receipts = receipts;
        Ok(results)
    }

    /// Hex IDs of the transaction and SCR documents a block introduced, for
    /// the revert path.
    pub fn get_hex_encoded_hashes_for_remove(
        &self,
        body: &Body,
    ) -> (Vec<String>, Vec<String>) {
        let mut tx_hashes = Vec::new();
        let mut scr_hashes = Vec::new();

        for miniblock in &body.mini_blocks {
            let hashes = miniblock.tx_hashes.iter().map(|hash| hex::encode(hash));
            match miniblock.mb_type {
                MiniBlockType::Tx | MiniBlockType::Rewards | MiniBlockType::Invalid => {
                    tx_hashes.extend(hashes)
                }
                MiniBlockType::SmartContractResult => scr_hashes.extend(hashes),
                _ => {}
            }
        }

        (tx_hashes, scr_hashes)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::core::{HexPubkeyConverter, JsonCodec, MaskShardCoordinator};
    use crate::data::{MiniBlock, PoolItem, ScrData, TransactionData};
    use num_bigint::BigInt;

    struct GasPriceFee;

    impl FeeCalculator for GasPriceFee {
        fn compute_gas_limit(&self, _tx: &TransactionData) -> u64 {
            50_000
        }
        fn compute_fee_for_gas(&self, tx: &TransactionData, gas_used: u64) -> BigInt {
            BigInt::from(gas_used) * BigInt::from(tx.gas_price)
        }
    }

    struct TestHasher;

    impl Hasher for TestHasher {
        fn compute(&self, data: &[u8]) -> Vec<u8> {
            let mut sum = 0u32;
            for byte in data {
                sum = sum.wrapping_mul(31).wrapping_add(u32::from(*byte));
            }
            sum.to_be_bytes().to_vec()
        }
    }

    pub(crate) fn processor_for_shard(self_shard: u32) -> TransactionsProcessor {
        TransactionsProcessor::new(
            Arc::new(HexPubkeyConverter),
            Arc::new(GasPriceFee),
            Arc::new(MaskShardCoordinator::new(self_shard, 2)),
            Arc::new(TestHasher),
            Arc::new(JsonCodec),
            false,
        )
    }

    #[test]
    fn groups_pool_into_prepared_results() {
        let processor = processor_for_shard(0);
        let header = Header {
            time_stamp: 5000,
            ..Default::default()
        };
        let body = Body {
            mini_blocks: vec![MiniBlock {
                sender_shard_id: 0,
                receiver_shard_id: 0,
                mb_type: crate::data::MiniBlockType::Tx,
                tx_hashes: vec![b"t1".to_vec()],
            }],
        };
        let pool = TransactionPool {
            items: HashMap::from([
                (
                    b"t1".to_vec(),
                    PoolItem::Normal(TransactionData {
                        sender: b"addb".to_vec(),
                        receiver: b"addd".to_vec(),
                        value: "12".into(),
                        ..Default::default()
                    }),
                ),
                (
                    b"s1".to_vec(),
                    PoolItem::Scr(ScrData {
                        sender: b"addb".to_vec(),
                        receiver: b"addd".to_vec(),
                        value: "1".into(),
                        original_tx_hash: b"t1".to_vec(),
                        ..Default::default()
                    }),
                ),
            ]),
            logs: Vec::new(),
        };

        let results = processor
            .prepare_transactions_for_database(&header, &body, &pool)
            .unwrap();

        assert_eq!(results.transactions.len(), 1);
        assert_eq!(results.scrs.len(), 1);
        assert_eq!(
            results.transactions[0].smart_contract_results,
            vec![hex::encode(b"s1")]
        );
        // SCR receiver moved value, so it lands in the altered set too.
        assert!(results.altered.get(&hex::encode(b"addd")).is_some());
    }

    #[test]
    fn reprocessing_yields_identical_results() {
        let processor = processor_for_shard(0);
        let header = Header::default();
        let body = Body {
            mini_blocks: vec![MiniBlock {
                sender_shard_id: 0,
                receiver_shard_id: 0,
                mb_type: crate::data::MiniBlockType::Tx,
                tx_hashes: vec![b"t1".to_vec(), b"t2".to_vec()],
            }],
        };
        let pool = TransactionPool {
            items: HashMap::from([
                (b"t1".to_vec(), PoolItem::Normal(TransactionData::default())),
                (b"t2".to_vec(), PoolItem::Normal(TransactionData::default())),
            ]),
            logs: Vec::new(),
        };

        let first = processor
            .prepare_transactions_for_database(&header, &body, &pool)
            .unwrap();
        let second = processor
            .prepare_transactions_for_database(&header, &body, &pool)
            .unwrap();

        let serialize = |results: &PreparedResults| {
            results
                .transactions
                .iter()
                .map(|tx| serde_json::to_string(tx).unwrap())
                .collect::<Vec<_>>()
        };
        assert_eq!(serialize(&first), serialize(&second));
    }

    #[test]
    fn removal_hashes_split_by_miniblock_type() {
        let processor = processor_for_shard(0);
        let body = Body {
            mini_blocks: vec![
                MiniBlock {
                    sender_shard_id: 0,
                    receiver_shard_id: 0,
                    mb_type: crate::data::MiniBlockType::Tx,
                    tx_hashes: vec![b"t1".to_vec()],
                },
                MiniBlock {
                    sender_shard_id: 0,
                    receiver_shard_id: 0,
                    mb_type: crate::data::MiniBlockType::SmartContractResult,
                    tx_hashes: vec![b"s1".to_vec()],
                },
                MiniBlock {
                    sender_shard_id: 0,
                    receiver_shard_id: 0,
                    mb_type: crate::data::MiniBlockType::Peer,
                    tx_hashes: vec![b"p1".to_vec()],
                },
            ],
        };

        let (txs, scrs) = processor.get_hex_encoded_hashes_for_remove(&body);
        assert_eq!(txs, vec![hex::encode(b"t1")]);
        assert_eq!(scrs, vec![hex::encode(b"s1")]);
    }
}
