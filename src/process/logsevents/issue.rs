//! Token issue events from the metachain system contract, plus role grants
//! and revocations. Both end up in the `tokens` index.

use super::{
    EventContext, EventOutput, EventProcessor, ESDT_SET_BURN_ROLE_FOR_ALL, ISSUE_FUNGIBLE,
    ISSUE_NON_FUNGIBLE, ISSUE_SEMI_FUNGIBLE, REGISTER_META_ESDT, ROLE_PREFIX,
};
use crate::core::PubkeyConverter;
use crate::data::{EventData, RoleData, TokenInfo};
use std::sync::Arc;

/// Synthetic role recorded for `ESDTSetBurnRoleForAll`.
pub const BURN_ROLE_FOR_ALL: &str = "ESDTRoleBurnForAll";

pub(super) struct TokenIssueProcessor {
    pubkey_converter: Arc<dyn PubkeyConverter>,
}

impl TokenIssueProcessor {
    pub(super) fn new(pubkey_converter: Arc<dyn PubkeyConverter>) -> Self {
        Self { pubkey_converter }
    }

    fn process_issue(&self, event: &EventData, ctx: &mut EventContext) -> EventOutput {
        // Topics: [token, name, ticker, type].
        if event.topics.len() < 4 {
            return EventOutput::default();
        }

        let token = String::from_utf8_lossy(&event.topics[0]).to_string();
        ctx.results.tokens.add(TokenInfo {
            token: token.clone(),
            name: String::from_utf8_lossy(&event.topics[1]).to_string(),
            ticker: String::from_utf8_lossy(&event.topics[2]).to_string(),
            token_type: String::from_utf8_lossy(&event.topics[3]).to_string(),
            issuer: self.pubkey_converter.encode(&event.address),
            timestamp: ctx.timestamp,
            ..Default::default()
        });

        EventOutput {
            processed: true,
            ..Default::default()
        }
    }

    fn process_role(&self, event: &EventData, ctx: &mut EventContext) -> EventOutput {
        if event.topics.is_empty() {
            return EventOutput::default();
        }
        let token = String::from_utf8_lossy(&event.topics[0]).to_string();

        if event.identifier == ESDT_SET_BURN_ROLE_FOR_ALL {
            ctx.results.token_roles.add_role(
                BURN_ROLE_FOR_ALL,
                RoleData {
                    token,
                    address: String::new(),
                    set: true,
                },
            );
            return EventOutput {
                processed: true,
                ..Default::default()
            };
        }

        // Role events carry the role name as identifier; the data byte
        // distinguishes grant from revocation.
        let set = event.data != b"false";
        ctx.results.token_roles.add_role(
            event.identifier.clone(),
            RoleData {
                token,
                address: self.pubkey_converter.encode(&event.address),
                set,
            },
        );

        EventOutput {
            processed: true,
            ..Default::default()
        }
    }
}

impl EventProcessor for TokenIssueProcessor {
    fn process(&self, event: &EventData, ctx: &mut EventContext) -> EventOutput {
        match event.identifier.as_str() {
            ISSUE_FUNGIBLE | ISSUE_SEMI_FUNGIBLE | ISSUE_NON_FUNGIBLE | REGISTER_META_ESDT => {
                self.process_issue(event, ctx)
            }
            ESDT_SET_BURN_ROLE_FOR_ALL => self.process_role(event, ctx),
            identifier if identifier.starts_with(ROLE_PREFIX) => self.process_role(event, ctx),
            _ => EventOutput::default(),
        }
    }
}
