//! Bulk serialization for transactions, smart-contract results and receipts.
//! The write form depends on where the document sits relative to the shard
//! pair: the source shard of a cross-shard transaction must never overwrite
//! the status written by the destination shard.

use super::{esdt, TransactionsProcessor};
use crate::converters::format_painless_source;
use crate::data::{BufferSlice, Receipt, ScResult, Transaction};
use crate::errors::IndexerError;
use serde_json::json;
use std::collections::HashMap;

impl TransactionsProcessor {
    pub fn serialize_transactions(
        &self,
        transactions: &[Transaction],
        tx_hash_status: &HashMap<String, String>,
        buffer: &mut BufferSlice,
        index: &str,
    ) -> Result<(), IndexerError> {
        for tx in transactions {
            let (meta, payload) = self.prepare_serialized_transaction(tx, index)?;
            buffer.put(meta.as_bytes(), Some(&payload));
        }

        let mut statuses: Vec<_> = tx_hash_status.iter().collect();
        statuses.sort_by_key(|(tx_hash, _)| tx_hash.clone());
        for (tx_hash, status) in statuses {
            let meta =
                format!(r#"{{ "update" : {{ "_index": "{index}", "_id" : "{tx_hash}" }} }}"#);
            let payload = json!({
                "script": {
                    "source": "ctx._source.status = params.status",
                    "lang": "painless",
                    "params": { "status": status },
                },
                "upsert": { "status": status },
            });
            buffer.put(meta.as_bytes(), Some(payload.to_string().as_bytes()));
        }
        Ok(())
    }

    fn prepare_serialized_transaction(
        &self,
        tx: &Transaction,
        index: &str,
    ) -> Result<(String, Vec<u8>), IndexerError> {
        let serialized = serde_json::to_value(tx)
            .map_err(|err| IndexerError::Input(format!("cannot serialize transaction: {err}")))?;

        let is_cross_shard_on_source =
            tx.sender_shard != tx.receiver_shard && tx.sender_shard == self.self_shard;
        if is_cross_shard_on_source {
            // Create-if-absent only: the destination shard owns the final
            // status and payload.
            let meta =
                format!(r#"{{ "update" : {{ "_index": "{index}", "_id" : "{}" }} }}"#, tx.hash);
            let payload = json!({
                "script": { "source": "return" },
                "upsert": serialized,
            });
            return Ok((meta, payload.to_string().into_bytes()));
        }

        let is_nft_transfer = tx.sender_shard == tx.receiver_shard
            && esdt::is_nft_transfer_or_multi(&tx.data);
        if is_nft_transfer {
            let source = format_painless_source(
                "def status = ctx._source.status;
                 ctx._source = params.tx;
                 ctx._source.status = status",
            );
            let meta =
                format!(r#"{{ "update" : {{ "_index": "{index}", "_id" : "{}" }} }}"#, tx.hash);
            let payload = json!({
                "script": {
                    "source": source,
                    "lang": "painless",
                    "params": { "tx": serialized },
                },
                "upsert": serialized,
            });
            return Ok((meta, payload.to_string().into_bytes()));
        }

        // Intra-shard, invalid, or cross-shard with destination here.
        let meta = format!(r#"{{ "index" : {{ "_index": "{index}", "_id" : "{}" }} }}"#, tx.hash);
        Ok((meta, serde_json::to_vec(&serialized).expect("value serializes")))
    }

    pub fn serialize_scresults(
        &self,
        scrs: &[ScResult],
        buffer: &mut BufferSlice,
        index: &str,
    ) -> Result<(), IndexerError> {
        for scr in scrs {
            let meta =
                format!(r#"{{ "index" : {{ "_index": "{index}", "_id" : "{}" }} }}"#, scr.hash);
            let payload = serde_json::to_vec(scr)
                .map_err(|err| IndexerError::Input(format!("cannot serialize scr: {err}")))?;
            buffer.put(meta.as_bytes(), Some(&payload));
        }
        Ok(())
    }

    pub fn serialize_receipts(
        &self,
        receipts: &[Receipt],
        buffer: &mut BufferSlice,
        index: &str,
    ) -> Result<(), IndexerError> {
        for receipt in receipts {
            let meta = format!(
                r#"{{ "index" : {{ "_index": "{index}", "_id" : "{}" }} }}"#,
                receipt.hash
            );
            let payload = serde_json::to_vec(receipt)
                .map_err(|err| IndexerError::Input(format!("cannot serialize receipt: {err}")))?;
            buffer.put(meta.as_bytes(), Some(&payload));
        }
        Ok(())
    }
}
