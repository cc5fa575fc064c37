//! Derives `miniblocks` documents. A miniblock crossing shards is written by
//! both sides: each run fills only its own role's fields so neither shard
//! clobbers the other, whatever the arrival order.

use crate::converters::format_painless_source;
use crate::core::{Codec, Hasher};
use crate::data::{Body, BufferSlice, Header, MiniBlock, Miniblock};
use crate::errors::IndexerError;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;

pub struct MiniblocksProcessor {
    self_shard: u32,
    hasher: Arc<dyn Hasher>,
    codec: Arc<dyn Codec>,
}

impl MiniblocksProcessor {
    pub fn new(self_shard: u32, hasher: Arc<dyn Hasher>, codec: Arc<dyn Codec>) -> Self {
        Self {
            self_shard,
            hasher,
            codec,
        }
    }

    pub fn compute_miniblock_hash(&self, miniblock: &MiniBlock) -> Result<Vec<u8>, IndexerError> {
        let encoded = self
            .codec
            .encode_miniblock(miniblock)
            .map_err(|err| IndexerError::Input(format!("cannot encode miniblock: {err}")))?;
        Ok(self.hasher.compute(&encoded))
    }

    pub fn prepare_db_miniblocks(
        &self,
        header: &Header,
        body: &Body,
        block_hash: &str,
    ) -> Result<Vec<Miniblock>, IndexerError> {
        body.mini_blocks
            .iter()
            .map(|miniblock| {
                let hash = hex::encode(self.compute_miniblock_hash(miniblock)?);

                let mut doc = Miniblock {
                    hash,
                    sender_shard: miniblock.sender_shard_id,
                    receiver_shard: miniblock.receiver_shard_id,
                    mb_type: miniblock.mb_type.as_str().to_string(),
                    tx_count: miniblock.tx_hashes.len() as u32,
                    ..Default::default()
                };
                if self.self_shard == miniblock.sender_shard_id {
                    doc.sender_block_hash = block_hash.to_string();
                    doc.sender_block_timestamp = header.time_stamp;
                }
                if self.self_shard == miniblock.receiver_shard_id {
                    doc.receiver_block_hash = block_hash.to_string();
                    doc.receiver_block_timestamp = header.time_stamp;
                }
                Ok(doc)
            })
            .collect()
    }

    pub fn get_miniblocks_hashes_hex(
        &self,
        body: &Body,
    ) -> Result<Vec<String>, IndexerError> {
        body.mini_blocks
            .iter()
            .map(|miniblock| Ok(hex::encode(self.compute_miniblock_hash(miniblock)?)))
            .collect()
    }

    /// Miniblocks already present in the index get a role-scoped script
    /// update; new ones are indexed with only this shard's fields filled.
    pub fn serialize_bulk_miniblocks(
        &self,
        miniblocks: &[Miniblock],
        mbs_in_db: &HashMap<String, bool>,
        buffer: &mut BufferSlice,
        index: &str,
    ) -> Result<(), IndexerError> {
        for miniblock in miniblocks {
            let in_db = mbs_in_db.get(&miniblock.hash).copied().unwrap_or(false);
            if !in_db {
                let meta = format!(
                    r#"{{ "index" : {{ "_index": "{index}", "_id" : "{}" }} }}"#,
                    miniblock.hash
                );
                let payload = serde_json::to_vec(miniblock).map_err(|err| {
                    IndexerError::Input(format!("cannot serialize miniblock: {err}"))
                })?;
                buffer.put(meta.as_bytes(), Some(&payload));
                continue;
            }

            let is_sender = self.self_shard == miniblock.sender_shard;
            let source = if is_sender {
                "ctx._source.senderBlockHash = params.hash;
                 ctx._source.senderBlockTimestamp = params.timestamp;
                 ctx._source.type = params.type"
            } else {
                "ctx._source.receiverBlockHash = params.hash;
                 ctx._source.receiverBlockTimestamp = params.timestamp;
                 ctx._source.type = params.type"
            };
            let (hash, timestamp) = if is_sender {
                (&miniblock.sender_block_hash, miniblock.sender_block_timestamp)
            } else {
                (
                    &miniblock.receiver_block_hash,
                    miniblock.receiver_block_timestamp,
                )
            };

            let meta = format!(
                r#"{{ "update" : {{ "_index": "{index}", "_id" : "{}" }} }}"#,
                miniblock.hash
            );
            let payload = json!({
                "script": {
                    "source": format_painless_source(source),
                    "lang": "painless",
                    "params": {
                        "hash": hash,
                        "timestamp": timestamp,
                        "type": miniblock.mb_type,
                    },
                },
            });
            buffer.put(meta.as_bytes(), Some(payload.to_string().as_bytes()));
        }
        Ok(())
    }
}
