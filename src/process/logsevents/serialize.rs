//! Bulk serialization for everything the logs interpreter derives. The
//! scripted upserts are written to be idempotent: replaying a block leaves
//! every document unchanged.

use super::LogsEventsProcessor;
use crate::converters::{format_painless_source, json_escape};
use crate::data::{
    BufferSlice, Delegator, EventDoc, Logs, ScDeployInfo, TokenRolesAndProperties, TokensInfo,
};
use crate::errors::IndexerError;
use serde_json::json;
use std::collections::HashMap;

const DELEGATOR_ACTIVE_STAKE_SCRIPT: &str = "
    if ('create' == ctx.op) {
        ctx._source = params.delegator
    } else {
        ctx._source.activeStake = params.delegator.activeStake;
        ctx._source.activeStakeNum = params.delegator.activeStakeNum
    }";

const DELEGATOR_UN_DELEGATE_SCRIPT: &str = "
    if ('create' == ctx.op) {
        ctx._source = params.delegator;
        ctx._source.unDelegateInfo = [params.unDelegate]
    } else {
        if (!ctx._source.containsKey('unDelegateInfo')) {
            ctx._source.unDelegateInfo = [params.unDelegate]
        } else {
            boolean exists = false;
            for (item in ctx._source.unDelegateInfo) {
                if (item.id == params.unDelegate.id) {
                    exists = true
                }
            }
            if (!exists) {
                ctx._source.unDelegateInfo.add(params.unDelegate)
            }
        }
        ctx._source.activeStake = params.delegator.activeStake;
        ctx._source.activeStakeNum = params.delegator.activeStakeNum
    }";

const DELEGATOR_WITHDRAW_SCRIPT: &str = "
    if ('create' == ctx.op) {
        ctx._source = params.delegator
    } else {
        if (ctx._source.containsKey('unDelegateInfo')) {
            ctx._source.unDelegateInfo.removeIf(item -> params.withdrawIds.contains(item.id))
        }
        ctx._source.activeStake = params.delegator.activeStake;
        ctx._source.activeStakeNum = params.delegator.activeStakeNum
    }";

const TOKEN_METADATA_SCRIPT: &str = "
    if ('create' == ctx.op) {
        ctx._source = params.token
    } else {
        if (!ctx._source.containsKey('data')) {
            ctx._source.data = params.token.data
        }
    }";

const TOKEN_ISSUE_SCRIPT: &str = "
    if ('create' == ctx.op) {
        ctx._source = params.token
    } else {
        ctx._source.type = params.token.type
    }";

const SC_DEPLOY_OWNER_SCRIPT: &str = "
    if ('create' == ctx.op) {
        ctx._source = params.deploy
    } else {
        ctx._source.currentOwner = params.deploy.currentOwner
    }";

const ROLE_SET_SCRIPT: &str = "
    if ('create' == ctx.op) {
        ctx._source = params.token
    } else {
        if (!ctx._source.containsKey('roles')) {
            ctx._source.roles = new HashMap()
        }
        if (!ctx._source.roles.containsKey(params.role)) {
            ctx._source.roles.put(params.role, [])
        }
        if (!ctx._source.roles.get(params.role).contains(params.address)) {
            ctx._source.roles.get(params.role).add(params.address)
        }
    }";

const ROLE_UNSET_SCRIPT: &str = "
    if ('create' != ctx.op && ctx._source.containsKey('roles') &&
        ctx._source.roles.containsKey(params.role)) {
        ctx._source.roles.get(params.role).removeIf(item -> item == params.address)
    }";

impl LogsEventsProcessor {
    pub fn serialize_logs(
        &self,
        logs: &[Logs],
        buffer: &mut BufferSlice,
        index: &str,
    ) -> Result<(), IndexerError> {
        for log in logs {
            let meta =
                format!(r#"{{ "index" : {{ "_index": "{index}", "_id" : "{}" }} }}"#, log.id);
            let payload = serde_json::to_vec(log)
                .map_err(|err| IndexerError::Input(format!("cannot serialize log: {err}")))?;
            buffer.put(meta.as_bytes(), Some(&payload));
        }
        Ok(())
    }

    pub fn serialize_events(
        &self,
        events: &[EventDoc],
        buffer: &mut BufferSlice,
        index: &str,
    ) -> Result<(), IndexerError> {
        for event in events {
            let meta =
                format!(r#"{{ "index" : {{ "_index": "{index}", "_id" : "{}" }} }}"#, event.id);
            let payload = serde_json::to_vec(event)
                .map_err(|err| IndexerError::Input(format!("cannot serialize event: {err}")))?;
            buffer.put(meta.as_bytes(), Some(&payload));
        }
        Ok(())
    }

    /// NFT-create tokens keep previously written fields (the issue event may
    /// have landed first); issue tokens back-fill the type on docs the
    /// create path wrote earlier.
    pub fn serialize_tokens(
        &self,
        tokens: &TokensInfo,
        buffer: &mut BufferSlice,
        index: &str,
    ) -> Result<(), IndexerError> {
        for token in tokens.get_all() {
            let serialized = serde_json::to_value(token)
                .map_err(|err| IndexerError::Input(format!("cannot serialize token: {err}")))?;

            let (id, script) = if token.nonce > 0 {
                (token.identifier.as_str(), TOKEN_METADATA_SCRIPT)
            } else {
                (token.token.as_str(), TOKEN_ISSUE_SCRIPT)
            };

            let meta = format!(
                r#"{{ "update" : {{ "_index": "{index}", "_id" : "{}" }} }}"#,
                json_escape(id)
            );
            let payload = json!({
                "scripted_upsert": true,
                "script": {
                    "source": format_painless_source(script),
                    "lang": "painless",
                    "params": { "token": serialized },
                },
                "upsert": {},
            });
            buffer.put(meta.as_bytes(), Some(payload.to_string().as_bytes()));
        }
        Ok(())
    }

    /// Burn/wipe observations, kept as plain per-identifier documents.
    pub fn serialize_supply_data(
        &self,
        supply: &TokensInfo,
        buffer: &mut BufferSlice,
        index: &str,
    ) -> Result<(), IndexerError> {
        for token in supply.get_all() {
            let meta = format!(
                r#"{{ "index" : {{ "_index": "{index}", "_id" : "{}" }} }}"#,
                json_escape(&token.identifier)
            );
            let payload = serde_json::to_vec(token)
                .map_err(|err| IndexerError::Input(format!("cannot serialize supply: {err}")))?;
            buffer.put(meta.as_bytes(), Some(&payload));
        }
        Ok(())
    }

    pub fn serialize_delegators(
        &self,
        delegators: &HashMap<String, Delegator>,
        buffer: &mut BufferSlice,
        index: &str,
    ) -> Result<(), IndexerError> {
        let mut ordered: Vec<_> = delegators.values().collect();
        ordered.sort_by(|a, b| (&a.address, &a.contract).cmp(&(&b.address, &b.contract)));

        for delegator in ordered {
            let id = self.compute_delegator_id(&delegator.address, &delegator.contract);
            if delegator.should_delete {
                let meta = format!(
                    r#"{{ "delete" : {{ "_index": "{index}", "_id" : "{}" }} }}"#,
                    json_escape(&id)
                );
                buffer.put(meta.as_bytes(), None);
                continue;
            }

            let serialized = serde_json::to_value(delegator)
                .map_err(|err| IndexerError::Input(format!("cannot serialize delegator: {err}")))?;
            let meta = format!(
                r#"{{ "update" : {{ "_index": "{index}", "_id" : "{}" }} }}"#,
                json_escape(&id)
            );

            let payload = if let Some(un_delegate) = &delegator.un_delegate_info {
                json!({
                    "scripted_upsert": true,
                    "script": {
                        "source": format_painless_source(DELEGATOR_UN_DELEGATE_SCRIPT),
                        "lang": "painless",
                        "params": { "delegator": serialized, "unDelegate": un_delegate },
                    },
                    "upsert": {},
                })
            } else if let Some(withdraw_ids) = &delegator.withdraw_fund_ids {
                json!({
                    "scripted_upsert": true,
                    "script": {
                        "source": format_painless_source(DELEGATOR_WITHDRAW_SCRIPT),
                        "lang": "painless",
                        "params": { "delegator": serialized, "withdrawIds": withdraw_ids },
                    },
                    "upsert": {},
                })
            } else {
                json!({
                    "scripted_upsert": true,
                    "script": {
                        "source": format_painless_source(DELEGATOR_ACTIVE_STAKE_SCRIPT),
                        "lang": "painless",
                        "params": { "delegator": serialized },
                    },
                    "upsert": {},
                })
            };
            buffer.put(meta.as_bytes(), Some(payload.to_string().as_bytes()));
        }
        Ok(())
    }

    pub fn serialize_sc_deploys(
        &self,
        deploys: &HashMap<String, ScDeployInfo>,
        buffer: &mut BufferSlice,
        index: &str,
    ) -> Result<(), IndexerError> {
        let mut ordered: Vec<_> = deploys.iter().collect();
        ordered.sort_by_key(|(contract, _)| contract.clone());

        for (contract, info) in ordered {
            if !info.tx_hash.is_empty() {
                let meta = format!(
                    r#"{{ "index" : {{ "_index": "{index}", "_id" : "{}" }} }}"#,
                    json_escape(contract)
                );
                let payload = serde_json::to_vec(info).map_err(|err| {
                    IndexerError::Input(format!("cannot serialize sc deploy: {err}"))
                })?;
                buffer.put(meta.as_bytes(), Some(&payload));
                continue;
            }

            let meta = format!(
                r#"{{ "update" : {{ "_index": "{index}", "_id" : "{}" }} }}"#,
                json_escape(contract)
            );
            let payload = json!({
                "scripted_upsert": true,
                "script": {
                    "source": format_painless_source(SC_DEPLOY_OWNER_SCRIPT),
                    "lang": "painless",
                    "params": { "deploy": info },
                },
                "upsert": {},
            });
            buffer.put(meta.as_bytes(), Some(payload.to_string().as_bytes()));
        }
        Ok(())
    }

    /// Role grants/revocations are merged into the `tokens` documents.
    pub fn serialize_roles_data(
        &self,
        roles: &TokenRolesAndProperties,
        buffer: &mut BufferSlice,
        index: &str,
    ) -> Result<(), IndexerError> {
        let mut ordered: Vec<_> = roles.roles().iter().collect();
        ordered.sort_by_key(|(role, _)| role.clone());

        for (role, entries) in ordered {
            for entry in entries {
                let meta = format!(
                    r#"{{ "update" : {{ "_index": "{index}", "_id" : "{}" }} }}"#,
                    json_escape(&entry.token)
                );
                let payload = if entry.set {
                    json!({
                        "scripted_upsert": true,
                        "script": {
                            "source": format_painless_source(ROLE_SET_SCRIPT),
                            "lang": "painless",
                            "params": {
                                "role": role,
                                "address": entry.address,
                                "token": {
                                    "token": entry.token,
                                    "roles": { (role.clone()): [entry.address.clone()] },
                                },
                            },
                        },
                        "upsert": {},
                    })
                } else {
                    json!({
                        "scripted_upsert": true,
                        "script": {
                            "source": format_painless_source(ROLE_UNSET_SCRIPT),
                            "lang": "painless",
                            "params": { "role": role, "address": entry.address },
                        },
                        "upsert": {},
                    })
                };
                buffer.put(meta.as_bytes(), Some(payload.to_string().as_bytes()));
            }
        }
        Ok(())
    }

    /// Update-by-query body that rolls back the un-delegate list entries a
    /// reverted block appended. Reverts must run in reverse block order.
    pub fn prepare_delegators_query_for_revert(&self, timestamp: u64) -> serde_json::Value {
        let script = "
            if (ctx._source.containsKey('unDelegateInfo')) {
                ctx._source.unDelegateInfo.removeIf(item -> item.timestamp == params.timestamp)
            }";
        json!({
            "query": { "term": { "timestamp": timestamp } },
            "script": {
                "source": format_painless_source(script),
                "lang": "painless",
                "params": { "timestamp": timestamp },
            },
        })
    }
}
