//! Buckets a miniblock's transaction hashes by pool tag and builds the
//! corresponding documents.

use super::builder::DbTransactionBuilder;
use super::{TX_STATUS_INVALID, TX_STATUS_PENDING, TX_STATUS_SUCCESS};
use crate::core::ALL_SHARDS_ID;
use crate::data::{
    AlteredAccounts, AlteredMarker, Header, MiniBlock, PoolItem, Receipt, ScResult, Transaction,
};
use std::collections::HashMap;
use std::sync::Arc;

pub(super) struct TxGrouper {
    builder: Arc<DbTransactionBuilder>,
    self_shard: u32,
    import_mode: bool,
}

impl TxGrouper {
    pub(super) fn new(builder: Arc<DbTransactionBuilder>, self_shard: u32, import_mode: bool) -> Self {
        Self {
            builder,
            self_shard,
            import_mode,
        }
    }

    pub(super) fn group_normal_txs(
        &self,
        miniblock: &MiniBlock,
        mb_hash: &str,
        header: &Header,
        items: &HashMap<Vec<u8>, PoolItem>,
        altered: &mut AlteredAccounts,
    ) -> HashMap<String, Transaction> {
        let mut transactions = HashMap::new();
        let status = compute_status(self.self_shard, miniblock.receiver_shard_id);

        for tx_hash in &miniblock.tx_hashes {
            let Some(PoolItem::Normal(tx)) = items.get(tx_hash) else {
                continue;
            };

            let doc = self
                .builder
                .prepare_transaction(tx, tx_hash, mb_hash, miniblock, header, status);
            add_to_altered(&doc, altered, miniblock, self.self_shard, false);
            if self.should_index(miniblock.receiver_shard_id) {
                transactions.insert(doc.hash.clone(), doc);
            }
        }

        transactions
    }

    pub(super) fn group_reward_txs(
        &self,
        miniblock: &MiniBlock,
        mb_hash: &str,
        header: &Header,
        items: &HashMap<Vec<u8>, PoolItem>,
        altered: &mut AlteredAccounts,
    ) -> HashMap<String, Transaction> {
        let mut rewards = HashMap::new();
        let status = compute_status(self.self_shard, miniblock.receiver_shard_id);

        for tx_hash in &miniblock.tx_hashes {
            let Some(PoolItem::Reward(reward)) = items.get(tx_hash) else {
                continue;
            };

            let doc = self
                .builder
                .prepare_reward_transaction(reward, tx_hash, mb_hash, miniblock, header, status);
            add_to_altered(&doc, altered, miniblock, self.self_shard, true);
            if self.should_index(miniblock.receiver_shard_id) {
                rewards.insert(doc.hash.clone(), doc);
            }
        }

        rewards
    }

    /// Invalid transactions are always indexed: they only ever exist on the
    /// sender shard and are charged their whole gas limit.
    pub(super) fn group_invalid_txs(
        &self,
        miniblock: &MiniBlock,
        mb_hash: &str,
        header: &Header,
        items: &HashMap<Vec<u8>, PoolItem>,
        altered: &mut AlteredAccounts,
    ) -> HashMap<String, Transaction> {
        let mut transactions = HashMap::new();

        for tx_hash in &miniblock.tx_hashes {
            let Some(PoolItem::Invalid(tx)) = items.get(tx_hash) else {
                continue;
            };

            let mut doc = self.builder.prepare_transaction(
                tx,
                tx_hash,
                mb_hash,
                miniblock,
                header,
                TX_STATUS_INVALID,
            );
            add_to_altered(&doc, altered, miniblock, self.self_shard, false);

            doc.gas_used = doc.gas_limit;
            doc.fee = self.builder.compute_fee_for_gas(tx, doc.gas_used).to_string();
            transactions.insert(doc.hash.clone(), doc);
        }

        transactions
    }

    pub(super) fn group_receipts(
        &self,
        header: &Header,
        items: &HashMap<Vec<u8>, PoolItem>,
    ) -> Vec<Receipt> {
        items
            .iter()
            .filter_map(|(hash, item)| match item {
                PoolItem::Receipt(receipt) => {
                    Some(self.builder.prepare_receipt(hash, receipt, header))
                }
                _ => None,
            })
            .collect()
    }

    pub(super) fn group_scrs(
        &self,
        header: &Header,
        items: &HashMap<Vec<u8>, PoolItem>,
    ) -> Vec<ScResult> {
        items
            .iter()
            .filter_map(|(hash, item)| match item {
                PoolItem::Scr(scr) => {
                    Some(self.builder.prepare_smart_contract_result(hash, scr, header))
                }
                _ => None,
            })
            .collect()
    }

    fn should_index(&self, destination_shard: u32) -> bool {
        if !self.import_mode {
            return true;
        }
        self.self_shard == destination_shard
    }
}

fn compute_status(self_shard: u32, receiver_shard: u32) -> &'static str {
    if self_shard == receiver_shard {
        TX_STATUS_SUCCESS
    } else {
        TX_STATUS_PENDING
    }
}

fn add_to_altered(
    tx: &Transaction,
    altered: &mut AlteredAccounts,
    miniblock: &MiniBlock,
    self_shard: u32,
    is_reward: bool,
) {
    let is_esdt = !tx.esdt_token_identifier.is_empty() && !tx.esdt_value.is_empty();

    if self_shard == miniblock.sender_shard_id && !is_reward {
        altered.add(
            tx.sender.clone(),
            AlteredMarker {
                is_sender: true,
                is_esdt_operation: is_esdt,
                token_identifier: tx.esdt_token_identifier.clone(),
                ..Default::default()
            },
        );
    }

    // The receiver of an invalid transaction never sees a state change.
    if tx.status == TX_STATUS_INVALID {
        return;
    }

    if self_shard == miniblock.receiver_shard_id || miniblock.receiver_shard_id == ALL_SHARDS_ID {
        altered.add(
            tx.receiver.clone(),
            AlteredMarker {
                is_sender: false,
                is_esdt_operation: is_esdt,
                token_identifier: tx.esdt_token_identifier.clone(),
                ..Default::default()
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{FeeCalculator, HexPubkeyConverter, ShardCoordinator};
    use crate::data::{MiniBlockType, TransactionData};
    use num_bigint::BigInt;

    struct UnitFee;

    impl FeeCalculator for UnitFee {
        fn compute_gas_limit(&self, _tx: &TransactionData) -> u64 {
            50_000
        }
        fn compute_fee_for_gas(&self, tx: &TransactionData, gas_used: u64) -> BigInt {
            BigInt::from(gas_used) * BigInt::from(tx.gas_price)
        }
    }

    struct SingleShard;

    impl ShardCoordinator for SingleShard {
        fn self_id(&self) -> u32 {
            0
        }
        fn num_shards(&self) -> u32 {
            1
        }
        fn compute_id(&self, _address: &[u8]) -> u32 {
            0
        }
    }

    fn grouper(self_shard: u32, import_mode: bool) -> TxGrouper {
        let builder = Arc::new(DbTransactionBuilder::new(
            Arc::new(HexPubkeyConverter),
            Arc::new(UnitFee),
            Arc::new(SingleShard),
        ));
        TxGrouper::new(builder, self_shard, import_mode)
    }

    fn pool_with_normal(hash: &[u8]) -> HashMap<Vec<u8>, PoolItem> {
        HashMap::from([(
            hash.to_vec(),
            PoolItem::Normal(TransactionData {
                sender: b"addr".to_vec(),
                receiver: b"receiver".to_vec(),
                value: "5".into(),
                gas_price: 1_000_000_000,
                gas_limit: 1_000_000,
                ..Default::default()
            }),
        )])
    }

    fn miniblock(sender: u32, receiver: u32, hashes: &[&[u8]]) -> MiniBlock {
        MiniBlock {
            sender_shard_id: sender,
            receiver_shard_id: receiver,
            mb_type: MiniBlockType::Tx,
            tx_hashes: hashes.iter().map(|h| h.to_vec()).collect(),
        }
    }

    #[test]
    fn normal_tx_status_depends_on_destination() {
        let header = Header::default();
        let mut altered = AlteredAccounts::new();

        let intra = grouper(0, false).group_normal_txs(
            &miniblock(0, 0, &[b"h1"]),
            "mb",
            &header,
            &pool_with_normal(b"h1"),
            &mut altered,
        );
        assert_eq!(intra[&hex::encode(b"h1")].status, "success");

        let cross = grouper(0, false).group_normal_txs(
            &miniblock(0, 1, &[b"h1"]),
            "mb",
            &header,
            &pool_with_normal(b"h1"),
            &mut altered,
        );
        assert_eq!(cross[&hex::encode(b"h1")].status, "pending");
    }

    #[test]
    fn intra_shard_tx_alters_both_parties() {
        let header = Header::default();
        let mut altered = AlteredAccounts::new();

        grouper(0, false).group_normal_txs(
            &miniblock(0, 0, &[b"h1"]),
            "mb",
            &header,
            &pool_with_normal(b"h1"),
            &mut altered,
        );

        let sender = altered.get("61646472").unwrap();
        assert!(sender[0].is_sender);
        assert!(altered.get("7265636569766572").is_some());
    }

    #[test]
    fn invalid_tx_charges_full_gas_and_skips_receiver() {
        let header = Header::default();
        let mut altered = AlteredAccounts::new();
        let pool = HashMap::from([(
            b"h1".to_vec(),
            PoolItem::Invalid(TransactionData {
                sender: b"addr".to_vec(),
                receiver: b"receiver".to_vec(),
                gas_price: 1_000_000_000,
                gas_limit: 1_000_000,
                ..Default::default()
            }),
        )]);

        let txs = grouper(0, false).group_invalid_txs(
            &miniblock(0, 0, &[b"h1"]),
            "mb",
            &header,
            &pool,
            &mut altered,
        );

        let tx = &txs[&hex::encode(b"h1")];
        assert_eq!(tx.status, "invalid");
        assert_eq!(tx.gas_used, 1_000_000);
        assert_eq!(tx.fee, "1000000000000000");

        assert!(altered.get("61646472").is_some());
        assert!(altered.get("7265636569766572").is_none());
    }

    #[test]
    fn import_mode_skips_source_only_normal_txs_but_not_invalid() {
        let header = Header::default();
        let mut altered = AlteredAccounts::new();

        let normal = grouper(0, true).group_normal_txs(
            &miniblock(0, 1, &[b"h1"]),
            "mb",
            &header,
            &pool_with_normal(b"h1"),
            &mut altered,
        );
        assert!(normal.is_empty());

        let pool = HashMap::from([(
            b"h1".to_vec(),
            PoolItem::Invalid(TransactionData::default()),
        )]);
        let invalid = grouper(0, true).group_invalid_txs(
            &miniblock(0, 1, &[b"h1"]),
            "mb",
            &header,
            &pool,
            &mut altered,
        );
        assert_eq!(invalid.len(), 1);
    }

    #[test]
    fn mismatched_pool_tags_are_skipped() {
        let header = Header::default();
        let mut altered = AlteredAccounts::new();
        // A reward item under a tx miniblock hash is another bucket's job.
        let pool = HashMap::from([(
            b"h1".to_vec(),
            PoolItem::Reward(crate::data::RewardData::default()),
        )]);

        let txs = grouper(0, false).group_normal_txs(
            &miniblock(0, 0, &[b"h1"]),
            "mb",
            &header,
            &pool,
            &mut altered,
        );
        assert!(txs.is_empty());
    }
}
