//! Projects altered accounts into the `accounts`/`accountsesdt` documents
//! and their per-timestamp history snapshots.

use crate::converters::{compute_token_identifier, convert_token_meta_data, BalanceConverter};
use crate::core::PubkeyConverter;
use crate::data::{
    AccountBalanceHistory, AccountInfo, AlteredAccountData, AlteredAccounts, BufferSlice,
    TokenInfo, TokenMetaDataRaw, TokensInfo,
};
use crate::errors::IndexerError;
use crate::process::tags::CountTags;
use std::collections::HashMap;
use std::sync::Arc;

/// Work list entry for a plain balance change.
#[derive(Clone, Debug, Default)]
pub struct Account {
    pub address: String,
    pub balance: String,
    pub nonce: u64,
    pub is_sender: bool,
}

/// Work list entry for a token balance change.
#[derive(Clone, Debug, Default)]
pub struct AccountEsdt {
    pub address: String,
    pub balance: String,
    pub token_identifier: String,
    pub token_nonce: u64,
    pub properties: String,
    pub metadata: Option<TokenMetaDataRaw>,
    pub is_sender: bool,
    pub is_nft_create: bool,
}

pub struct AccountsProcessor {
    pubkey_converter: Arc<dyn PubkeyConverter>,
    balance_converter: Arc<BalanceConverter>,
    self_shard: u32,
}

impl AccountsProcessor {
    pub fn new(
        pubkey_converter: Arc<dyn PubkeyConverter>,
        balance_converter: Arc<BalanceConverter>,
        self_shard: u32,
    ) -> Self {
        Self {
            pubkey_converter,
            balance_converter,
            self_shard,
        }
    }

    /// Resolves the tracked markers against the node-provided account data,
    /// splitting the work into regular and per-token lists.
    pub fn get_accounts(
        &self,
        tracked: &AlteredAccounts,
        node_accounts: &HashMap<String, AlteredAccountData>,
    ) -> (Vec<Account>, Vec<AccountEsdt>) {
        let mut regular = Vec::new();
        let mut esdt = Vec::new();

        for (address, markers) in tracked.iter() {
            let Some(account) = node_accounts.get(address) else {
                tracing::trace!(%address, "altered address missing from node data, skipping");
                continue;
            };

            for marker in markers {
                if !marker.is_esdt_operation && !marker.is_nft_operation {
                    regular.push(Account {
                        address: address.clone(),
                        balance: account.balance.clone(),
                        nonce: account.nonce,
                        is_sender: marker.is_sender,
                    });
                    continue;
                }

                let token = account.tokens.iter().find(|token| {
                    token.identifier == marker.token_identifier && token.nonce == marker.nft_nonce
                });
                esdt.push(AccountEsdt {
                    address: address.clone(),
                    balance: token.map_or_else(|| "0".to_string(), |t| t.balance.clone()),
                    token_identifier: marker.token_identifier.clone(),
                    token_nonce: marker.nft_nonce,
                    properties: token.map_or_else(String::new, |t| t.properties.clone()),
                    metadata: token.and_then(|t| t.metadata.clone()),
                    is_sender: marker.is_sender,
                    is_nft_create: marker.is_nft_create,
                });
            }
        }

        regular.sort_by(|a, b| a.address.cmp(&b.address));
        esdt.sort_by(|a, b| {
            (&a.address, &a.token_identifier, a.token_nonce)
                .cmp(&(&b.address, &b.token_identifier, b.token_nonce))
        });
        (regular, esdt)
    }

    pub fn prepare_regular_accounts_map(
        &self,
        accounts: &[Account],
    ) -> HashMap<String, AccountInfo> {
        accounts
            .iter()
            .map(|account| {
                (
                    account.address.clone(),
                    AccountInfo {
                        nonce: account.nonce,
                        balance: account.balance.clone(),
                        balance_num: self
                            .balance_converter
                            .compute_balance_as_float_str(&account.balance),
                        is_sender: account.is_sender,
                        shard_id: self.self_shard,
                        ..Default::default()
                    },
                )
            })
            .collect()
    }

    /// Keys are `address-token[-nonceHex]`, the accountsesdt document IDs.
    /// Observed NFTs feed the returned token list so their metadata reaches
    /// the tokens index too.
    pub fn prepare_accounts_map_esdt(
        &self,
        timestamp: u64,
        accounts: &[AccountEsdt],
        tags: &mut CountTags,
    ) -> (HashMap<String, AccountInfo>, TokensInfo) {
        let mut map = HashMap::new();
        let mut tokens = TokensInfo::new();

        for account in accounts {
            let identifier =
                compute_token_identifier(&account.token_identifier, account.token_nonce);
            let id = format!("{}-{identifier}", account.address);

            let metadata = account
                .metadata
                .as_ref()
                .map(|raw| convert_token_meta_data(self.pubkey_converter.as_ref(), raw));
            if let Some(meta) = &metadata {
                tags.parse_tags(&meta.tags);
            }

            if account.token_nonce > 0 {
                tokens.add(TokenInfo {
                    token: account.token_identifier.clone(),
                    identifier: identifier.clone(),
                    timestamp,
                    data: metadata.clone(),
                    nonce: account.token_nonce,
                    ..Default::default()
                });
            }

            map.insert(
                id,
                AccountInfo {
                    address: account.address.clone(),
                    balance: account.balance.clone(),
                    balance_num: self
                        .balance_converter
                        .compute_balance_as_float_str(&account.balance),
                    token_identifier: account.token_identifier.clone(),
                    token_nonce: account.token_nonce,
                    properties: hex::encode(account.properties.as_bytes()),
                    data: metadata,
                    is_sender: account.is_sender,
                    shard_id: self.self_shard,
                    ..Default::default()
                },
            );
        }

        (map, tokens)
    }

    /// Fills metadata into token docs the logs interpreter created without
    /// it (the node's altered-account record is the fallback source).
    pub fn put_token_metadata_in_tokens(
        &self,
        tokens: &mut TokensInfo,
        node_accounts: &HashMap<String, AlteredAccountData>,
    ) {
        for token in tokens.get_all_mut() {
            if token.data.is_some() || token.nonce == 0 {
                continue;
            }

            let metadata = node_accounts.values().find_map(|account| {
                account
                    .tokens
                    .iter()
                    .find(|t| t.identifier == token.token && t.nonce == token.nonce)
                    .and_then(|t| t.metadata.as_ref())
            });
            if let Some(raw) = metadata {
                token.data = Some(convert_token_meta_data(self.pubkey_converter.as_ref(), raw));
            }
        }
    }

    pub fn prepare_accounts_history(
        &self,
        timestamp: u64,
        accounts: &HashMap<String, AccountInfo>,
    ) -> HashMap<String, AccountBalanceHistory> {
        accounts
            .iter()
            .map(|(key, info)| {
                // Regular accounts carry the address only in the map key.
                let address = if info.address.is_empty() {
                    key.clone()
                } else {
                    info.address.clone()
                };
                let mut id = format!("{address}_{timestamp}");
                if !info.token_identifier.is_empty() {
                    id = format!(
                        "{id}_{}_{}",
                        info.token_identifier, info.token_nonce
                    );
                }
                (
                    id,
                    AccountBalanceHistory {
                        address,
                        timestamp,
                        balance: info.balance.clone(),
                        token_identifier: info.token_identifier.clone(),
                        token_nonce: info.token_nonce,
                        is_sender: info.is_sender,
                        shard_id: self.self_shard,
                    },
                )
            })
            .collect()
    }

    pub fn serialize_accounts(
        &self,
        accounts: &HashMap<String, AccountInfo>,
        buffer: &mut BufferSlice,
        index: &str,
    ) -> Result<(), IndexerError> {
        let mut ordered: Vec<_> = accounts.iter().collect();
        ordered.sort_by_key(|(id, _)| id.clone());

        for (id, info) in ordered {
            let meta = format!(r#"{{ "index" : {{ "_index": "{index}", "_id" : "{id}" }} }}"#);
            let payload = serde_json::to_vec(info)
                .map_err(|err| IndexerError::Input(format!("cannot serialize account: {err}")))?;
            buffer.put(meta.as_bytes(), Some(&payload));
        }
        Ok(())
    }

    /// Token balances that reached zero delete the document instead of
    /// writing an empty holder row.
    pub fn serialize_accounts_esdt(
        &self,
        accounts: &HashMap<String, AccountInfo>,
        buffer: &mut BufferSlice,
        index: &str,
    ) -> Result<(), IndexerError> {
        let mut ordered: Vec<_> = accounts.iter().collect();
        ordered.sort_by_key(|(id, _)| id.clone());

        for (id, info) in ordered {
            if info.balance.is_empty() || info.balance == "0" {
                let meta =
                    format!(r#"{{ "delete" : {{ "_index": "{index}", "_id" : "{id}" }} }}"#);
                buffer.put(meta.as_bytes(), None);
                continue;
            }

            let meta = format!(r#"{{ "index" : {{ "_index": "{index}", "_id" : "{id}" }} }}"#);
            let payload = serde_json::to_vec(info)
                .map_err(|err| IndexerError::Input(format!("cannot serialize account: {err}")))?;
            buffer.put(meta.as_bytes(), Some(&payload));
        }
        Ok(())
    }

    pub fn serialize_accounts_history(
        &self,
        history: &HashMap<String, AccountBalanceHistory>,
        buffer: &mut BufferSlice,
        index: &str,
    ) -> Result<(), IndexerError> {
        let mut ordered: Vec<_> = history.iter().collect();
        ordered.sort_by_key(|(id, _)| id.clone());

        for (id, snapshot) in ordered {
            let meta = format!(r#"{{ "index" : {{ "_index": "{index}", "_id" : "{id}" }} }}"#);
            let payload = serde_json::to_vec(snapshot)
                .map_err(|err| IndexerError::Input(format!("cannot serialize history: {err}")))?;
            buffer.put(meta.as_bytes(), Some(&payload));
        }
        Ok(())
    }

    /// Back-fills the token type onto documents created before the issue
    /// event was observed (metachain issues arrive on their own schedule).
    pub fn serialize_type_for_provided_ids(
        &self,
        ids: &[String],
        token_type: &str,
        buffer: &mut BufferSlice,
        index: &str,
    ) -> Result<(), IndexerError> {
        for id in ids {
            let meta = format!(
                r#"{{ "update" : {{ "_index": "{index}", "_id" : "{}" }} }}"#,
                crate::converters::json_escape(id)
            );
            let payload = serde_json::json!({
                "doc": { "type": token_type },
                "upsert": { "type": token_type },
            });
            buffer.put(meta.as_bytes(), Some(payload.to_string().as_bytes()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::HexPubkeyConverter;
    use crate::data::{AccountTokenData, AlteredMarker};

    fn processor() -> AccountsProcessor {
        AccountsProcessor::new(
            Arc::new(HexPubkeyConverter),
            Arc::new(BalanceConverter::new(10).unwrap()),
            0,
        )
    }

    fn node_account_with_token(address: &str) -> AlteredAccountData {
        AlteredAccountData {
            address: address.to_string(),
            balance: "1000".into(),
            nonce: 1,
            tokens: vec![AccountTokenData {
                identifier: "SEMI-abcd".into(),
                balance: "1000".into(),
                nonce: 2,
                properties: "ok".into(),
                metadata: Some(TokenMetaDataRaw {
                    creator: b"creator".to_vec(),
                    nonce: 2,
                    ..Default::default()
                }),
            }],
        }
    }

    #[test]
    fn partitions_regular_and_esdt_markers() {
        let processor = processor();
        let address = hex::encode(b"aaaabbbb");

        let mut tracked = AlteredAccounts::new();
        tracked.add(address.clone(), AlteredMarker::default());
        tracked.add(
            address.clone(),
            AlteredMarker {
                is_nft_operation: true,
                token_identifier: "SEMI-abcd".into(),
                nft_nonce: 2,
                is_nft_create: true,
                ..Default::default()
            },
        );
        let node = HashMap::from([(address.clone(), node_account_with_token(&address))]);

        let (regular, esdt) = processor.get_accounts(&tracked, &node);

        assert_eq!(regular.len(), 1);
        assert_eq!(regular[0].balance, "1000");
        assert_eq!(esdt.len(), 1);
        assert_eq!(esdt[0].balance, "1000");
        assert_eq!(esdt[0].token_nonce, 2);
        assert!(esdt[0].metadata.is_some());
    }

    #[test]
    fn regular_map_has_balance_and_float() {
        let processor = processor();
        let accounts = vec![Account {
            address: hex::encode(b"aaaabbbb"),
            balance: "1000".into(),
            nonce: 1,
            is_sender: false,
        }];

        let map = processor.prepare_regular_accounts_map(&accounts);
        let info = &map[&hex::encode(b"aaaabbbb")];
        assert_eq!(info.nonce, 1);
        assert_eq!(info.balance, "1000");
        assert_eq!(info.balance_num, 1e-7);
    }

    #[test]
    fn esdt_map_keys_follow_the_document_id_convention() {
        let processor = processor();
        let address = hex::encode(b"aaaabbbb");
        let accounts = vec![AccountEsdt {
            address: address.clone(),
            balance: "1000".into(),
            token_identifier: "SEMI-abcd".into(),
            token_nonce: 2,
            properties: "ok".into(),
            metadata: Some(TokenMetaDataRaw {
                creator: b"creator".to_vec(),
                nonce: 2,
                ..Default::default()
            }),
            ..Default::default()
        }];

        let mut tags = CountTags::new();
        let (map, tokens) = processor.prepare_accounts_map_esdt(5600, &accounts, &mut tags);

        let id = format!("{address}-SEMI-abcd-02");
        let info = &map[&id];
        assert_eq!(info.token_identifier, "SEMI-abcd");
        assert_eq!(info.properties, hex::encode(b"ok"));
        assert_eq!(info.data.as_ref().unwrap().creator, hex::encode(b"creator"));

        assert_eq!(tokens.get_all().len(), 1);
        assert_eq!(tokens.get_all()[0].identifier, "SEMI-abcd-02");
    }

    #[test]
    fn fungible_esdt_key_omits_the_nonce() {
        let processor = processor();
        let accounts = vec![AccountEsdt {
            address: "61".into(),
            balance: "5".into(),
            token_identifier: "TOK-0001".into(),
            token_nonce: 0,
            ..Default::default()
        }];

        let mut tags = CountTags::new();
        let (map, tokens) = processor.prepare_accounts_map_esdt(5600, &accounts, &mut tags);
        assert!(map.contains_key("61-TOK-0001"));
        assert!(tokens.is_empty());
    }

    #[test]
    fn metadata_backfill_only_touches_bare_tokens() {
        let processor = processor();
        let address = hex::encode(b"aaaabbbb");
        let node = HashMap::from([(address.clone(), node_account_with_token(&address))]);

        let mut tokens = TokensInfo::new();
        tokens.add(TokenInfo {
            token: "SEMI-abcd".into(),
            identifier: "SEMI-abcd-02".into(),
            nonce: 2,
            ..Default::default()
        });
        tokens.add(TokenInfo {
            token: "OTHER-1111".into(),
            identifier: "OTHER-1111-01".into(),
            nonce: 1,
            ..Default::default()
        });

        processor.put_token_metadata_in_tokens(&mut tokens, &node);

        let all = tokens.get_all();
        assert_eq!(
            all[0].data.as_ref().unwrap().creator,
            hex::encode(b"creator")
        );
        assert!(all[1].data.is_none());
    }

    #[test]
    fn history_ids_embed_timestamp_and_token() {
        let processor = processor();
        let regular = HashMap::from([(
            "61".to_string(),
            AccountInfo {
                balance: "112".into(),
                ..Default::default()
            },
        )]);
        let history = processor.prepare_accounts_history(100, &regular);
        assert!(history.contains_key("61_100"));
        assert_eq!(history["61_100"].balance, "112");

        let esdt = HashMap::from([(
            "61-token-112".to_string(),
            AccountInfo {
                address: "61".into(),
                balance: "112".into(),
                token_identifier: "token-112".into(),
                token_nonce: 3,
                ..Default::default()
            },
        )]);
        let history = processor.prepare_accounts_history(100, &esdt);
        assert!(history.contains_key("61_100_token-112_3"));
    }

    #[test]
    fn zero_balance_esdt_becomes_a_delete() {
        let processor = processor();
        let map = HashMap::from([
            (
                "61-tok".to_string(),
                AccountInfo {
                    address: "61".into(),
                    balance: "0".into(),
                    token_identifier: "tok".into(),
                    ..Default::default()
                },
            ),
            (
                "62-tok".to_string(),
                AccountInfo {
                    address: "62".into(),
                    balance: "7".into(),
                    token_identifier: "tok".into(),
                    ..Default::default()
                },
            ),
        ]);

        let mut buffer = BufferSlice::default();
        processor
            .serialize_accounts_esdt(&map, &mut buffer, "accountsesdt")
            .unwrap();
        let body = String::from_utf8(buffer.buffers().next().unwrap().to_vec()).unwrap();

        assert!(body.contains(r#"{ "delete" : { "_index": "accountsesdt", "_id" : "61-tok" } }"#));
        assert!(body.contains(r#"{ "index" : { "_index": "accountsesdt", "_id" : "62-tok" } }"#));
    }

    #[test]
    fn type_backfill_writes_partial_doc_updates() {
        let processor = processor();
        let ids = vec!["6161616162626262-TTTT-abcd-02".to_string()];

        let mut buffer = BufferSlice::default();
        processor
            .serialize_type_for_provided_ids(&ids, "SemiFungibleESDT", &mut buffer, "accountsesdt")
            .unwrap();
        let body = String::from_utf8(buffer.buffers().next().unwrap().to_vec()).unwrap();

        assert!(body.contains(r#""_id" : "6161616162626262-TTTT-abcd-02""#));
        assert!(body.contains(r#""doc":{"type":"SemiFungibleESDT"}"#));
    }
}
