//! Derives the `blocks` and `epochinfo` documents from a header and body.

use crate::core::{Codec, Hasher};
use crate::data::{Block, Body, BufferSlice, EpochInfo, Header};
use crate::errors::IndexerError;
use std::sync::Arc;

pub struct BlockProcessor {
    hasher: Arc<dyn Hasher>,
    codec: Arc<dyn Codec>,
}

impl BlockProcessor {
    pub fn new(hasher: Arc<dyn Hasher>, codec: Arc<dyn Codec>) -> Self {
        Self { hasher, codec }
    }

    pub fn compute_header_hash(&self, header: &Header) -> Result<Vec<u8>, IndexerError> {
        let encoded = self
            .codec
            .encode_header(header)
            .map_err(|err| IndexerError::Input(format!("cannot encode header: {err}")))?;
        Ok(self.hasher.compute(&encoded))
    }

    pub fn prepare_block_for_db(
        &self,
        header: &Header,
        body: &Body,
        miniblock_hashes: Vec<String>,
    ) -> Result<Block, IndexerError> {
        let encoded_header = self
            .codec
            .encode_header(header)
            .map_err(|err| IndexerError::Input(format!("cannot encode header: {err}")))?;
        let hash = self.hasher.compute(&encoded_header);

        let mut size = encoded_header.len() as u64;
        let mut tx_count = 0u32;
        for miniblock in &body.mini_blocks {
            let encoded = self
                .codec
                .encode_miniblock(miniblock)
                .map_err(|err| IndexerError::Input(format!("cannot encode miniblock: {err}")))?;
            size += encoded.len() as u64;
            tx_count += miniblock.tx_hashes.len() as u32;
        }

        Ok(Block {
            hash: hex::encode(hash),
            nonce: header.nonce,
            round: header.round,
            epoch: header.epoch,
            shard_id: header.shard_id,
            proposer: header.proposer_index,
            validators: validators_from_bitmap(&header.pub_keys_bitmap),
            pub_key_bitmap: hex::encode(&header.pub_keys_bitmap),
            size,
            timestamp: header.time_stamp,
            state_root_hash: hex::encode(&header.state_root_hash),
            prev_hash: hex::encode(&header.prev_hash),
            tx_count,
            mini_blocks_hashes: miniblock_hashes,
            accumulated_fees: header.accumulated_fees.clone(),
            developer_fees: header.developer_fees.clone(),
            epoch_start_block: header.epoch_start,
        })
    }

    pub fn serialize_block(
        &self,
        block: &Block,
        buffer: &mut BufferSlice,
        index: &str,
    ) -> Result<(), IndexerError> {
        let meta = format!(
            r#"{{ "index" : {{ "_index": "{index}", "_id" : "{}" }} }}"#,
            block.hash
        );
        let payload = serde_json::to_vec(block)
            .map_err(|err| IndexerError::Input(format!("cannot serialize block: {err}")))?;
        buffer.put(meta.as_bytes(), Some(&payload));
        Ok(())
    }

    /// Epoch-start metachain blocks carry the per-epoch fee totals.
    pub fn serialize_epoch_info(
        &self,
        header: &Header,
        buffer: &mut BufferSlice,
        index: &str,
    ) -> Result<(), IndexerError> {
        let doc = EpochInfo {
            accumulated_fees: header.accumulated_fees.clone(),
            developer_fees: header.developer_fees.clone(),
        };
        let meta = format!(
            r#"{{ "index" : {{ "_index": "{index}", "_id" : "{}" }} }}"#,
            header.epoch
        );
        let payload = serde_json::to_vec(&doc)
            .map_err(|err| IndexerError::Input(format!("cannot serialize epoch info: {err}")))?;
        buffer.put(meta.as_bytes(), Some(&payload));
        Ok(())
    }
}

/// Indices of the set bits, LSB first within each byte.
fn validators_from_bitmap(bitmap: &[u8]) -> Vec<u64> {
    let mut validators = Vec::new();
    for (byte_index, byte) in bitmap.iter().enumerate() {
        for bit in 0..8 {
            if byte & (1 << bit) != 0 {
                validators.push((byte_index * 8 + bit) as u64);
            }
        }
    }
    validators
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::JsonCodec;
    use crate::data::{MiniBlock, MiniBlockType};

    struct SumHasher;

    impl Hasher for SumHasher {
        fn compute(&self, data: &[u8]) -> Vec<u8> {
            let sum = data.iter().fold(0u8, |acc, b| acc.wrapping_add(*b));
            vec![sum, data.len() as u8]
        }
    }

    fn processor() -> BlockProcessor {
        BlockProcessor::new(Arc::new(SumHasher), Arc::new(JsonCodec))
    }

    #[test]
    fn bitmap_to_validator_indices() {
        assert_eq!(validators_from_bitmap(&[0b0000_0101]), vec![0, 2]);
        assert_eq!(validators_from_bitmap(&[0x00, 0b1000_0001]), vec![8, 15]);
        assert!(validators_from_bitmap(&[]).is_empty());
    }

    #[test]
    fn block_hash_is_deterministic() {
        let processor = processor();
        let header = Header {
            nonce: 10,
            round: 12,
            ..Default::default()
        };

        let first = processor.compute_header_hash(&header).unwrap();
        let second = processor.compute_header_hash(&header).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn prepares_block_with_counts_and_hashes() {
        let processor = processor();
        let header = Header {
            shard_id: 1,
            nonce: 5,
            round: 7,
            epoch: 2,
            time_stamp: 6000,
            pub_keys_bitmap: vec![0b0000_0011],
            accumulated_fees: "100".into(),
            developer_fees: "10".into(),
            ..Default::default()
        };
        let body = Body {
            mini_blocks: vec![MiniBlock {
                sender_shard_id: 1,
                receiver_shard_id: 1,
                mb_type: MiniBlockType::Tx,
                tx_hashes: vec![b"t1".to_vec(), b"t2".to_vec()],
            }],
        };

        let block = processor
            .prepare_block_for_db(&header, &body, vec!["mb1".into()])
            .unwrap();

        assert_eq!(block.hash, hex::encode(processor.compute_header_hash(&header).unwrap()));
        assert_eq!(block.tx_count, 2);
        assert_eq!(block.validators, vec![0, 1]);
        assert_eq!(block.mini_blocks_hashes, vec!["mb1"]);
        assert!(block.size > 0);
    }

    #[test]
    fn serializes_block_and_epoch_info() {
        let processor = processor();
        let header = Header {
            epoch: 4,
            accumulated_fees: "55".into(),
            developer_fees: "5".into(),
            epoch_start: true,
            ..Default::default()
        };
        let block = processor
            .prepare_block_for_db(&header, &Body::default(), Vec::new())
            .unwrap();

        let mut buffer = BufferSlice::default();
        processor.serialize_block(&block, &mut buffer, "blocks").unwrap();
        processor
            .serialize_epoch_info(&header, &mut buffer, "epochinfo")
            .unwrap();

        let body = String::from_utf8(buffer.buffers().next().unwrap().to_vec()).unwrap();
        assert!(body.contains(&format!(r#""_id" : "{}""#, block.hash)));
        assert!(body.contains(r#""_index": "epochinfo", "_id" : "4""#));
        assert!(body.contains(r#""accumulatedFees":"55""#));
    }
}
