//! Mirrors transactions and smart-contract results into the unified
//! `operations` index, tagged by kind.

use crate::core::{PubkeyConverter, ShardCoordinator};
use crate::data::{BufferSlice, ScResult, Transaction};
use crate::errors::IndexerError;
use serde_json::json;
use std::sync::Arc;

pub const OPERATION_TYPE_NORMAL: &str = "normal";
pub const OPERATION_TYPE_UNSIGNED: &str = "unsigned";

pub struct OperationsProcessor {
    pubkey_converter: Arc<dyn PubkeyConverter>,
    shard_coordinator: Arc<dyn ShardCoordinator>,
    import_mode: bool,
}

impl OperationsProcessor {
    pub fn new(
        pubkey_converter: Arc<dyn PubkeyConverter>,
        shard_coordinator: Arc<dyn ShardCoordinator>,
        import_mode: bool,
    ) -> Self {
        Self {
            pubkey_converter,
            shard_coordinator,
            import_mode,
        }
    }

    pub fn process_transactions_and_scrs(
        &self,
        txs: &[Transaction],
        scrs: &[ScResult],
    ) -> (Vec<Transaction>, Vec<ScResult>) {
        let self_shard = self.shard_coordinator.self_id();
        let txs = txs
            .iter()
            .filter(|tx| !self.import_mode || tx.receiver_shard == self_shard)
            .map(|tx| {
                let mut tx = tx.clone();
                tx.operation_type = OPERATION_TYPE_NORMAL.to_string();
                // The dedicated index already carries the full SCR list.
                tx.smart_contract_results = Vec::new();
                tx
            })
            .collect();

        let scrs = scrs
            .iter()
            .map(|scr| {
                let mut scr = scr.clone();
                scr.operation_type = OPERATION_TYPE_UNSIGNED.to_string();
                scr
            })
            .collect();

        (txs, scrs)
    }

    /// SCRs follow the same shard-aware rule as transactions: the source
    /// shard of a cross-shard result only creates, never overwrites.
    pub fn serialize_scrs(
        &self,
        scrs: &[ScResult],
        buffer: &mut BufferSlice,
        index: &str,
    ) -> Result<(), IndexerError> {
        for scr in scrs {
            let serialized = serde_json::to_value(scr)
                .map_err(|err| IndexerError::Input(format!("cannot serialize scr: {err}")))?;

            if self.is_cross_shard_on_source(scr) {
                let meta = format!(
                    r#"{{ "update" : {{ "_index": "{index}", "_id" : "{}" }} }}"#,
                    scr.hash
                );
                let payload = json!({
                    "script": { "source": "return" },
                    "upsert": serialized,
                });
                buffer.put(meta.as_bytes(), Some(payload.to_string().as_bytes()));
                continue;
            }

            let meta =
                format!(r#"{{ "index" : {{ "_index": "{index}", "_id" : "{}" }} }}"#, scr.hash);
            buffer.put(
                meta.as_bytes(),
                Some(&serde_json::to_vec(&serialized).expect("value serializes")),
            );
        }
        Ok(())
    }

    fn is_cross_shard_on_source(&self, scr: &ScResult) -> bool {
        let shard_of = |encoded: &str| {
            self.pubkey_converter
                .decode(encoded)
                .ok()
                .map(|bytes| self.shard_coordinator.compute_id(&bytes))
        };

        match (shard_of(&scr.sender), shard_of(&scr.receiver)) {
            (Some(sender_shard), Some(receiver_shard)) => {
                sender_shard != receiver_shard
                    && sender_shard == self.shard_coordinator.self_id()
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{HexPubkeyConverter, MaskShardCoordinator};

    fn processor(self_shard: u32, import_mode: bool) -> OperationsProcessor {
        OperationsProcessor::new(
            Arc::new(HexPubkeyConverter),
            Arc::new(MaskShardCoordinator::new(self_shard, 2)),
            import_mode,
        )
    }

    #[test]
    fn tags_transactions_and_scrs() {
        let txs = vec![Transaction {
            hash: "aa".into(),
            smart_contract_results: vec!["bb".into()],
            ..Default::default()
        }];
        let scrs = vec![ScResult {
            hash: "bb".into(),
            ..Default::default()
        }];

        let (txs, scrs) = processor(0, false).process_transactions_and_scrs(&txs, &scrs);
        assert_eq!(txs[0].operation_type, "normal");
        assert!(txs[0].smart_contract_results.is_empty());
        assert_eq!(scrs[0].operation_type, "unsigned");
    }

    #[test]
    fn import_mode_keeps_only_destination_transactions() {
        let txs = vec![
            Transaction {
                hash: "aa".into(),
                receiver_shard: 0,
                ..Default::default()
            },
            Transaction {
                hash: "bb".into(),
                receiver_shard: 1,
                ..Default::default()
            },
        ];

        let (txs, _) = processor(0, true).process_transactions_and_scrs(&txs, &[]);
        assert_eq!(txs.len(), 1);
        assert_eq!(txs[0].hash, "aa");
    }

    #[test]
    fn cross_shard_scr_on_source_only_creates() {
        let scrs = vec![ScResult {
            hash: "cc".into(),
            // Last address byte decides the shard: 0x00 -> 0, 0x01 -> 1.
            sender: "aa00".into(),
            receiver: "aa01".into(),
            ..Default::default()
        }];

        let mut buffer = BufferSlice::default();
        processor(0, false)
            .serialize_scrs(&scrs, &mut buffer, "operations")
            .unwrap();
        let body = String::from_utf8(buffer.buffers().next().unwrap().to_vec()).unwrap();
        assert!(body.contains(r#""script":{"source":"return"}"#));

        let mut buffer = BufferSlice::default();
        processor(1, false)
            .serialize_scrs(&scrs, &mut buffer, "operations")
            .unwrap();
        let body = String::from_utf8(buffer.buffers().next().unwrap().to_vec()).unwrap();
        assert!(body.contains(r#"{ "index" : { "_index": "operations", "_id" : "cc" } }"#));
    }
}
