//! Fungible ESDT transfers and wipes. Topics: `[token, nonce, value,
//! receiver]`; a non-zero nonce means the event belongs to the NFT path.

use super::{EventContext, EventOutput, EventProcessor};
use crate::core::{builtin, PubkeyConverter, ShardCoordinator};
use crate::data::{AlteredMarker, EventData, TokenInfo};
use num_bigint::{BigInt, Sign};
use std::sync::Arc;

const TOPICS_WITH_RECEIVER: usize = 4;

pub(super) struct FungibleEsdtProcessor {
    pubkey_converter: Arc<dyn PubkeyConverter>,
    shard_coordinator: Arc<dyn ShardCoordinator>,
}

impl FungibleEsdtProcessor {
    pub(super) fn new(
        pubkey_converter: Arc<dyn PubkeyConverter>,
        shard_coordinator: Arc<dyn ShardCoordinator>,
    ) -> Self {
        Self {
            pubkey_converter,
            shard_coordinator,
        }
    }

    fn handles(&self, identifier: &str) -> bool {
        identifier == builtin::ESDT_TRANSFER || identifier == builtin::ESDT_WIPE
    }
}

impl EventProcessor for FungibleEsdtProcessor {
    fn process(&self, event: &EventData, ctx: &mut EventContext) -> EventOutput {
        if !self.handles(&event.identifier) || event.topics.len() < 3 {
            return EventOutput::default();
        }

        let nonce = BigInt::from_bytes_be(Sign::Plus, &event.topics[1]);
        if nonce != BigInt::from(0) {
            return EventOutput::default();
        }

        let Ok(token) = String::from_utf8(event.topics[0].clone()) else {
            return EventOutput::default();
        };
        let value = BigInt::from_bytes_be(Sign::Plus, &event.topics[2]).to_string();

        let sender_shard = self.shard_coordinator.compute_id(&event.address);
        if sender_shard == self.shard_coordinator.self_id() {
            ctx.altered.add(
                self.pubkey_converter.encode(&event.address),
                AlteredMarker {
                    is_esdt_operation: true,
                    token_identifier: token.clone(),
                    ..Default::default()
                },
            );

            if event.identifier == builtin::ESDT_WIPE {
                ctx.results.tokens_supply.add(TokenInfo {
                    token: token.clone(),
                    identifier: token.clone(),
                    timestamp: ctx.timestamp,
                    ..Default::default()
                });
            }
        }

        let mut output = EventOutput {
            processed: true,
            identifier: Some(token.clone()),
            value: Some(value),
            ..Default::default()
        };
        if event.topics.len() < TOPICS_WITH_RECEIVER {
            return output;
        }

        let receiver = &event.topics[3];
        let encoded_receiver = self.pubkey_converter.encode(receiver);
        let receiver_shard = self.shard_coordinator.compute_id(receiver);
        output.receiver = Some(encoded_receiver.clone());
        output.receiver_shard_id = Some(receiver_shard);
        if receiver_shard != self.shard_coordinator.self_id() {
            return output;
        }

        ctx.altered.add(
            encoded_receiver,
            AlteredMarker {
                is_esdt_operation: true,
                token_identifier: token,
                ..Default::default()
            },
        );
        output
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::FixedShards;
    use super::*;
    use crate::core::HexPubkeyConverter;
    use crate::data::{AlteredAccounts, PreparedLogsResults};
    use std::collections::HashMap;

    fn transfer_event(identifier: &str) -> EventData {
        EventData {
            address: b"addr".to_vec(),
            identifier: identifier.to_string(),
            topics: vec![
                b"my-token".to_vec(),
                Vec::new(),
                vec![0x64],
                b"receiver".to_vec(),
            ],
            data: Vec::new(),
        }
    }

    fn run(
        processor: &FungibleEsdtProcessor,
        event: &EventData,
        altered: &mut AlteredAccounts,
    ) -> EventOutput {
        let mut results = PreparedLogsResults::default();
        let mut statuses = HashMap::new();
        let mut ctx = EventContext {
            timestamp: 10000,
            tx_hash_hex: "aabb",
            log_address: b"contract",
            altered,
            results: &mut results,
            tx_hash_status: &mut statuses,
        };
        processor.process(event, &mut ctx)
    }

    fn intra_shard() -> FungibleEsdtProcessor {
        FungibleEsdtProcessor::new(
            Arc::new(HexPubkeyConverter),
            Arc::new(FixedShards {
                self_id: 0,
                mapping: Vec::new(),
            }),
        )
    }

    #[test]
    fn intra_shard_transfer_alters_both_parties() {
        let mut altered = AlteredAccounts::new();
        let output = run(&intra_shard(), &transfer_event(builtin::ESDT_TRANSFER), &mut altered);

        assert!(output.processed);
        assert_eq!(output.identifier.unwrap(), "my-token");
        assert_eq!(output.value.unwrap(), "100");

        let sender = altered.get("61646472").unwrap();
        assert_eq!(
            sender[0],
            AlteredMarker {
                is_esdt_operation: true,
                token_identifier: "my-token".into(),
                ..Default::default()
            }
        );
        assert!(altered.get("7265636569766572").is_some());
    }

    #[test]
    fn cross_shard_on_source_skips_receiver() {
        let processor = FungibleEsdtProcessor::new(
            Arc::new(HexPubkeyConverter),
            Arc::new(FixedShards {
                self_id: 0,
                mapping: vec![(b"receiver".to_vec(), 1)],
            }),
        );
        let mut altered = AlteredAccounts::new();
        let output = run(&processor, &transfer_event(builtin::ESDT_TRANSFER), &mut altered);

        assert!(output.processed);
        assert_eq!(output.receiver_shard_id, Some(1));
        assert!(altered.get("61646472").is_some());
        assert!(altered.get("7265636569766572").is_none());
    }

    #[test]
    fn cross_shard_on_destination_skips_sender() {
        let processor = FungibleEsdtProcessor::new(
            Arc::new(HexPubkeyConverter),
            Arc::new(FixedShards {
                self_id: 0,
                mapping: vec![(b"addr".to_vec(), 1)],
            }),
        );
        let mut altered = AlteredAccounts::new();
        let output = run(&processor, &transfer_event(builtin::ESDT_TRANSFER), &mut altered);

        assert!(output.processed);
        assert!(altered.get("61646472").is_none());
        assert!(altered.get("7265636569766572").is_some());
    }

    #[test]
    fn wipe_records_supply_and_both_parties() {
        let mut altered = AlteredAccounts::new();
        let processor = intra_shard();
        let event = EventData {
            address: b"addr".to_vec(),
            identifier: builtin::ESDT_WIPE.to_string(),
            topics: vec![
                b"esdt-0123".to_vec(),
                Vec::new(),
                Vec::new(),
                b"receiver".to_vec(),
            ],
            data: Vec::new(),
        };

        let mut results = PreparedLogsResults::default();
        let mut statuses = HashMap::new();
        let mut ctx = EventContext {
            timestamp: 10000,
            tx_hash_hex: "aabb",
            log_address: b"contract",
            altered: &mut altered,
            results: &mut results,
            tx_hash_status: &mut statuses,
        };
        let output = processor.process(&event, &mut ctx);

        assert!(output.processed);
        assert_eq!(output.identifier.unwrap(), "esdt-0123");
        assert_eq!(output.value.unwrap(), "0");
        assert_eq!(results.tokens_supply.get_all().len(), 1);
        assert!(altered.get("61646472").is_some());
        assert!(altered.get("7265636569766572").is_some());
    }

    #[test]
    fn nonzero_nonce_is_left_to_the_nft_path() {
        let mut altered = AlteredAccounts::new();
        let mut event = transfer_event(builtin::ESDT_WIPE);
        event.topics[1] = vec![0x02];

        let output = run(&intra_shard(), &event, &mut altered);
        assert!(!output.processed);
        assert!(altered.is_empty());
    }
}
