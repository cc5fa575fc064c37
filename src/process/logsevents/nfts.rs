//! NFT/SFT lifecycle events. Topics: `[token, nonce, value, receiver-or-
//! token-data]`; topic 3 holds the receiver address for transfers and the
//! encoded digital token for creates. Nonce 0 means fungible, which is not
//! this processor's business.

use super::{EventContext, EventOutput, EventProcessor};
use crate::converters::{compute_token_identifier, prepare_token_meta_data};
use crate::core::{builtin, Codec, PubkeyConverter, ShardCoordinator};
use crate::data::{AlteredMarker, EventData, TokenInfo};
use num_bigint::{BigInt, Sign};
use num_traits::ToPrimitive;
use std::sync::Arc;

const TOPICS_WITH_RECEIVER: usize = 4;

pub(super) struct NftsProcessor {
    pubkey_converter: Arc<dyn PubkeyConverter>,
    shard_coordinator: Arc<dyn ShardCoordinator>,
    codec: Arc<dyn Codec>,
}

impl NftsProcessor {
    pub(super) fn new(
        pubkey_converter: Arc<dyn PubkeyConverter>,
        shard_coordinator: Arc<dyn ShardCoordinator>,
        codec: Arc<dyn Codec>,
    ) -> Self {
        Self {
            pubkey_converter,
            shard_coordinator,
            codec,
        }
    }

    fn handles(&self, identifier: &str) -> bool {
        matches!(
            identifier,
            builtin::ESDT_NFT_TRANSFER
                | builtin::ESDT_NFT_BURN
                | builtin::ESDT_NFT_ADD_QUANTITY
                | builtin::ESDT_NFT_CREATE
                | builtin::MULTI_ESDT_NFT_TRANSFER
                | builtin::ESDT_WIPE
        )
    }

    fn should_add_receiver(&self, event: &EventData) -> bool {
        let is_transfer = event.identifier == builtin::ESDT_NFT_TRANSFER
            || event.identifier == builtin::MULTI_ESDT_NFT_TRANSFER;
        is_transfer && event.topics.len() >= TOPICS_WITH_RECEIVER
    }

    fn process_event_on_sender(&self, event: &EventData, nonce: u64, ctx: &mut EventContext) {
        let token = String::from_utf8_lossy(&event.topics[0]).to_string();
        let encoded_sender = self.pubkey_converter.encode(&event.address);

        let is_burn_or_wipe = event.identifier == builtin::ESDT_NFT_BURN
            || event.identifier == builtin::ESDT_WIPE;
        if is_burn_or_wipe {
            ctx.results.tokens_supply.add(TokenInfo {
                token: token.clone(),
                identifier: compute_token_identifier(&token, nonce),
                timestamp: ctx.timestamp,
                nonce,
                ..Default::default()
            });
        }

        let is_nft_create = event.identifier == builtin::ESDT_NFT_CREATE;
        ctx.altered.add(
            encoded_sender,
            AlteredMarker {
                is_nft_operation: true,
                token_identifier: token.clone(),
                nft_nonce: nonce,
                is_nft_create,
                ..Default::default()
            },
        );

        if !is_nft_create || event.topics.len() < TOPICS_WITH_RECEIVER {
            return;
        }

        let token_data = match self.codec.decode_digital_token(&event.topics[3]) {
            Ok(token_data) => token_data,
            Err(err) => {
                tracing::warn!(?err, token, "cannot decode digital token from create event");
                return;
            }
        };
        let meta = prepare_token_meta_data(self.pubkey_converter.as_ref(), &token_data);
        if let Some(meta) = &meta {
            ctx.results.tags.parse_tags(&meta.tags);
        }
        ctx.results.tokens.add(TokenInfo {
            token: token.clone(),
            identifier: compute_token_identifier(&token, nonce),
            timestamp: ctx.timestamp,
            data: meta,
            nonce,
            ..Default::default()
        });
    }
}

impl EventProcessor for NftsProcessor {
    fn process(&self, event: &EventData, ctx: &mut EventContext) -> EventOutput {
        if !self.handles(&event.identifier) || event.topics.len() < 3 {
            return EventOutput::default();
        }

        let nonce = BigInt::from_bytes_be(Sign::Plus, &event.topics[1])
            .to_u64()
            .unwrap_or(0);
        if nonce == 0 {
            // Fungible amount, the fungible processor owns it.
            return EventOutput::default();
        }

        let sender_shard = self.shard_coordinator.compute_id(&event.address);
        if sender_shard == self.shard_coordinator.self_id() {
            self.process_event_on_sender(event, nonce, ctx);
        }

        let token = String::from_utf8_lossy(&event.topics[0]).to_string();
        let identifier = compute_token_identifier(&token, nonce);
        let value = BigInt::from_bytes_be(Sign::Plus, &event.topics[2]).to_string();

        let mut output = EventOutput {
            processed: true,
            identifier: Some(identifier),
            value: Some(value),
            ..Default::default()
        };
        if !self.should_add_receiver(event) {
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
                is_nft_operation: true,
                token_identifier: token,
                nft_nonce: nonce,
                ..Default::default()
            },
        );
        output
    }
}
