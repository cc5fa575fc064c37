//! Validator public-key and rating documents, one per `(shard, epoch)` and
//! `(pubkey, rating id)` respectively.

use crate::core::PubkeyConverter;
use crate::data::{BufferSlice, ValidatorRatingInfo, ValidatorsPublicKeys};
use crate::errors::IndexerError;
use serde_json::json;
use std::sync::Arc;

pub struct ValidatorsProcessor {
    pubkey_converter: Arc<dyn PubkeyConverter>,
}

impl ValidatorsProcessor {
    pub fn new(pubkey_converter: Arc<dyn PubkeyConverter>) -> Self {
        Self { pubkey_converter }
    }

    pub fn prepare_validators_public_keys(&self, pub_keys: &[Vec<u8>]) -> ValidatorsPublicKeys {
        ValidatorsPublicKeys {
            public_keys: pub_keys
                .iter()
                .map(|key| self.pubkey_converter.encode(key))
                .collect(),
        }
    }

    pub fn serialize_validators_pub_keys(
        &self,
        shard_id: u32,
        epoch: u32,
        keys: &ValidatorsPublicKeys,
        buffer: &mut BufferSlice,
        index: &str,
    ) -> Result<(), IndexerError> {
        let meta = format!(
            r#"{{ "index" : {{ "_index": "{index}", "_id" : "{shard_id}_{epoch}" }} }}"#
        );
        let payload = serde_json::to_vec(keys)
            .map_err(|err| IndexerError::Input(format!("cannot serialize validators: {err}")))?;
        buffer.put(meta.as_bytes(), Some(&payload));
        Ok(())
    }

    pub fn serialize_validators_rating(
        &self,
        index_id: &str,
        ratings: &[ValidatorRatingInfo],
        buffer: &mut BufferSlice,
        index: &str,
    ) -> Result<(), IndexerError> {
        for rating in ratings {
            let meta = format!(
                r#"{{ "index" : {{ "_index": "{index}", "_id" : "{}_{index_id}" }} }}"#,
                rating.public_key
            );
            let payload = json!({ "rating": rating.rating });
            buffer.put(meta.as_bytes(), Some(payload.to_string().as_bytes()));
        }
        Ok(())
    }
}
