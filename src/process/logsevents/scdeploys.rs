//! Smart-contract deploy and ownership-change events.

use super::{EventContext, EventOutput, EventProcessor, CHANGE_OWNER, SC_DEPLOY};
use crate::core::PubkeyConverter;
use crate::data::{EventData, ScDeployInfo};
use std::sync::Arc;

pub(super) struct ScDeploysProcessor {
    pubkey_converter: Arc<dyn PubkeyConverter>,
}

impl ScDeploysProcessor {
    pub(super) fn new(pubkey_converter: Arc<dyn PubkeyConverter>) -> Self {
        Self { pubkey_converter }
    }
}

impl EventProcessor for ScDeploysProcessor {
    fn process(&self, event: &EventData, ctx: &mut EventContext) -> EventOutput {
        match event.identifier.as_str() {
            // Topics: [deployed contract, deployer].
            SC_DEPLOY if event.topics.len() >= 2 => {
                let contract = self.pubkey_converter.encode(&event.topics[0]);
                ctx.results.sc_deploys.insert(
                    contract,
                    ScDeployInfo {
                        tx_hash: ctx.tx_hash_hex.to_string(),
                        creator: self.pubkey_converter.encode(&event.topics[1]),
                        timestamp: ctx.timestamp,
                        ..Default::default()
                    },
                );
            }
            // Topics: [new owner]; the event address is the contract.
            CHANGE_OWNER if !event.topics.is_empty() => {
                let contract = self.pubkey_converter.encode(&event.address);
                ctx.results.sc_deploys.insert(
                    contract,
                    ScDeployInfo {
                        current_owner: self.pubkey_converter.encode(&event.topics[0]),
                        timestamp: ctx.timestamp,
                        ..Default::default()
                    },
                );
            }
            _ => return EventOutput::default(),
        }

        EventOutput {
            processed: true,
            ..Default::default()
        }
    }
}
