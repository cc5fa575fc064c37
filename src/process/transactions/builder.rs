//! Maps pool entries onto their database documents.

use super::esdt;
use crate::core::{FeeCalculator, PubkeyConverter, ShardCoordinator, METACHAIN_SHARD_ID};
use crate::data::{
    AlteredAccounts, AlteredMarker, Header, MiniBlock, Receipt, ReceiptData, RewardData, ScResult,
    ScrData, Transaction, TransactionData,
};
use std::sync::Arc;

pub struct DbTransactionBuilder {
    pubkey_converter: Arc<dyn PubkeyConverter>,
    fee_calculator: Arc<dyn FeeCalculator>,
    shard_coordinator: Arc<dyn ShardCoordinator>,
}

impl DbTransactionBuilder {
    pub fn new(
        pubkey_converter: Arc<dyn PubkeyConverter>,
        fee_calculator: Arc<dyn FeeCalculator>,
        shard_coordinator: Arc<dyn ShardCoordinator>,
    ) -> Self {
        Self {
            pubkey_converter,
            fee_calculator,
            shard_coordinator,
        }
    }

    pub fn prepare_transaction(
        &self,
        tx: &TransactionData,
        tx_hash: &[u8],
        mb_hash: &str,
        miniblock: &MiniBlock,
        header: &Header,
        status: &str,
    ) -> Transaction {
        let esdt_info = esdt::parse_esdt_tx(&tx.data).unwrap_or_default();

        let gas_used = self.fee_calculator.compute_gas_limit(tx);
        let fee = self.fee_calculator.compute_fee_for_gas(tx, gas_used);

        Transaction {
            hash: hex::encode(tx_hash),
            mini_block_hash: mb_hash.to_string(),
            nonce: tx.nonce,
            round: header.round,
            value: tx.value.clone(),
            receiver: self.pubkey_converter.encode(&tx.receiver),
            sender: self.pubkey_converter.encode(&tx.sender),
            receiver_shard: miniblock.receiver_shard_id,
            sender_shard: miniblock.sender_shard_id,
            gas_price: tx.gas_price,
            gas_limit: tx.gas_limit,
            gas_used,
            fee: fee.to_string(),
            data: tx.data.clone(),
            signature: hex::encode(&tx.signature),
            timestamp: header.time_stamp,
            status: status.to_string(),
            esdt_token_identifier: esdt_info.identifier,
            esdt_value: esdt_info.value,
            sender_user_name: String::from_utf8(tx.sender_username.clone()).unwrap_or_default(),
            receiver_user_name: String::from_utf8(tx.receiver_username.clone()).unwrap_or_default(),
            smart_contract_results: Vec::new(),
            operation_type: String::new(),
            receiver_address_bytes: tx.receiver.clone(),
        }
    }

    pub fn prepare_reward_transaction(
        &self,
        reward: &RewardData,
        tx_hash: &[u8],
        mb_hash: &str,
        miniblock: &MiniBlock,
        header: &Header,
        status: &str,
    ) -> Transaction {
        Transaction {
            hash: hex::encode(tx_hash),
            mini_block_hash: mb_hash.to_string(),
            round: reward.round,
            value: reward.value.clone(),
            receiver: self.pubkey_converter.encode(&reward.receiver),
            sender: METACHAIN_SHARD_ID.to_string(),
            receiver_shard: miniblock.receiver_shard_id,
            sender_shard: miniblock.sender_shard_id,
            timestamp: header.time_stamp,
            status: status.to_string(),
            receiver_address_bytes: reward.receiver.clone(),
            ..Default::default()
        }
    }

    pub fn prepare_smart_contract_result(
        &self,
        scr_hash: &[u8],
        scr: &ScrData,
        header: &Header,
    ) -> ScResult {
        let esdt_info = esdt::parse_esdt_tx(&scr.data).unwrap_or_default();
        let relayer_addr = if scr.relayer.is_empty() {
            String::new()
        } else {
            self.pubkey_converter.encode(&scr.relayer)
        };

        ScResult {
            hash: hex::encode(scr_hash),
            nonce: scr.nonce,
            gas_limit: scr.gas_limit,
            gas_price: scr.gas_price,
            value: scr.value.clone(),
            sender: self.pubkey_converter.encode(&scr.sender),
            receiver: self.pubkey_converter.encode(&scr.receiver),
            relayer_addr,
            relayed_value: scr.relayed_value.clone(),
            code: String::from_utf8(scr.code.clone()).unwrap_or_default(),
            data: scr.data.clone(),
            prev_tx_hash: hex::encode(&scr.prev_tx_hash),
            original_tx_hash: hex::encode(&scr.original_tx_hash),
            call_type: scr.call_type.to_string(),
            code_metadata: scr.code_metadata.clone(),
            return_message: String::from_utf8(scr.return_message.clone()).unwrap_or_default(),
            esdt_token_identifier: esdt_info.identifier,
            esdt_value: esdt_info.value,
            timestamp: header.time_stamp,
            operation_type: String::new(),
        }
    }

    /// Recomputed fee for an overridden gas amount (invalid transactions are
    /// charged their full gas limit).
    pub fn compute_fee_for_gas(&self, tx: &TransactionData, gas_used: u64) -> num_bigint::BigInt {
        self.fee_calculator.compute_fee_for_gas(tx, gas_used)
    }

    pub fn prepare_receipt(&self, rec_hash: &[u8], receipt: &ReceiptData, header: &Header) -> Receipt {
        Receipt {
            hash: hex::encode(rec_hash),
            value: receipt.value.clone(),
            sender: self.pubkey_converter.encode(&receipt.sender),
            data: String::from_utf8(receipt.data.clone()).unwrap_or_default(),
            tx_hash: hex::encode(&receipt.tx_hash),
            timestamp: header.time_stamp,
        }
    }

    /// SCR receivers on the self shard whose balance actually moved belong in
    /// the altered-accounts set.
    pub fn add_scrs_receiver_to_altered(
        &self,
        altered: &mut AlteredAccounts,
        scrs: &[ScResult],
    ) {
        for scr in scrs {
            let Ok(receiver_bytes) = self.pubkey_converter.decode(&scr.receiver) else {
                continue;
            };
            let shard = self.shard_coordinator.compute_id(&receiver_bytes);
            if shard != self.shard_coordinator.self_id() {
                continue;
            }

            let egld_unchanged = scr.value.is_empty() || scr.value == "0";
            let esdt_unchanged = scr.esdt_value.is_empty() || scr.esdt_value == "0";
            if egld_unchanged && esdt_unchanged {
                continue;
            }

            altered.add(
                scr.receiver.clone(),
                AlteredMarker {
                    is_esdt_operation: !scr.esdt_token_identifier.is_empty()
                        && !scr.esdt_value.is_empty(),
                    token_identifier: scr.esdt_token_identifier.clone(),
                    ..Default::default()
                },
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::HexPubkeyConverter;
    use crate::data::MiniBlockType;
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

    fn builder() -> DbTransactionBuilder {
        DbTransactionBuilder::new(
            Arc::new(HexPubkeyConverter),
            Arc::new(GasPriceFee),
            Arc::new(SingleShard),
        )
    }

    fn miniblock() -> MiniBlock {
        MiniBlock {
            sender_shard_id: 0,
            receiver_shard_id: 0,
            mb_type: MiniBlockType::Tx,
            tx_hashes: Vec::new(),
        }
    }

    #[test]
    fn builds_transaction_document() {
        let tx = TransactionData {
            nonce: 3,
            value: "1000".into(),
            sender: b"addr".to_vec(),
            receiver: b"receiver".to_vec(),
            gas_price: 1_000_000_000,
            gas_limit: 70_000,
            signature: vec![0xab],
            ..Default::default()
        };
        let header = Header {
            round: 12,
            time_stamp: 5000,
            ..Default::default()
        };

        let doc = builder().prepare_transaction(&tx, b"txh", "mbhash", &miniblock(), &header, "success");

        assert_eq!(doc.hash, hex::encode(b"txh"));
        assert_eq!(doc.sender, "61646472");
        assert_eq!(doc.receiver, "7265636569766572");
        assert_eq!(doc.gas_used, 50_000);
        assert_eq!(doc.fee, "50000000000000");
        assert_eq!(doc.status, "success");
        assert_eq!(doc.signature, "ab");
    }

    #[test]
    fn reward_sender_is_the_metachain() {
        let reward = RewardData {
            round: 9,
            value: "77".into(),
            receiver: b"receiver".to_vec(),
        };
        let doc = builder().prepare_reward_transaction(
            &reward,
            b"rh",
            "mbhash",
            &miniblock(),
            &Header::default(),
            "success",
        );

        assert_eq!(doc.sender, METACHAIN_SHARD_ID.to_string());
        assert_eq!(doc.value, "77");
        assert_eq!(doc.gas_limit, 0);
    }

    #[test]
    fn altered_tracks_only_value_moving_scrs() {
        let builder = builder();
        let mut altered = AlteredAccounts::new();

        let scrs = vec![
            ScResult {
                receiver: hex::encode(b"rcv1"),
                value: "0".into(),
                ..Default::default()
            },
            ScResult {
                receiver: hex::encode(b"rcv2"),
                value: "10".into(),
                ..Default::default()
            },
        ];
        builder.add_scrs_receiver_to_altered(&mut altered, &scrs);

        assert!(altered.get(&hex::encode(b"rcv1")).is_none());
        assert!(altered.get(&hex::encode(b"rcv2")).is_some());
    }
}
