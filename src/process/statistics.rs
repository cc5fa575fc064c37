//! Round statistics, one document per `(shard, round)`.

use crate::data::{BufferSlice, RoundInfo};
use crate::errors::IndexerError;

#[derive(Default)]
pub struct StatisticsProcessor;

impl StatisticsProcessor {
    pub fn new() -> Self {
        Self
    }

    pub fn serialize_rounds_info(
        &self,
        rounds: &[RoundInfo],
        buffer: &mut BufferSlice,
        index: &str,
    ) -> Result<(), IndexerError> {
        for round in rounds {
            let meta = format!(
                r#"{{ "index" : {{ "_index": "{index}", "_id" : "{}_{}" }} }}"#,
                round.shard_id, round.round
            );
            let payload = serde_json::to_vec(round)
                .map_err(|err| IndexerError::Input(format!("cannot serialize round: {err}")))?;
            buffer.put(meta.as_bytes(), Some(&payload));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_doc_id_is_shard_and_round() {
        let rounds = vec![RoundInfo {
            round: 100,
            signers_indexes: vec![1, 2],
            block_was_proposed: true,
            shard_id: 1,
            epoch: 3,
            timestamp: 9000,
        }];

        let mut buffer = BufferSlice::default();
        StatisticsProcessor::new()
            .serialize_rounds_info(&rounds, &mut buffer, "rounds")
            .unwrap();
        let body = String::from_utf8(buffer.buffers().next().unwrap().to_vec()).unwrap();

        assert!(body.contains(r#""_id" : "1_100""#));
        assert!(body.contains(r#""signersIndexes":[1,2]"#));
        assert!(body.contains(r#""blockWasProposed":true"#));
    }
}
