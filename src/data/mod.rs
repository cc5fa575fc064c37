//! Input entities delivered by the node and the document types written to
//! Elasticsearch, plus the intermediate carriers the transformers exchange.

mod buffer;

pub use buffer::{BufferSlice, DEFAULT_MAX_BULK_SIZE};

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ---------------------------------------------------------------------------
// Input entities
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Header {
    pub shard_id: u32,
    pub nonce: u64,
    pub round: u64,
    pub epoch: u32,
    pub time_stamp: u64,
    pub prev_hash: Vec<u8>,
    pub state_root_hash: Vec<u8>,
    pub proposer_index: u64,
    pub pub_keys_bitmap: Vec<u8>,
    pub accumulated_fees: String,
    pub developer_fees: String,
    pub epoch_start: bool,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum MiniBlockType {
    Tx,
    Rewards,
    Invalid,
    SmartContractResult,
    Receipt,
    Peer,
}

impl MiniBlockType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MiniBlockType::Tx => "TxBlock",
            MiniBlockType::Rewards => "RewardsBlock",
            MiniBlockType::Invalid => "InvalidBlock",
            MiniBlockType::SmartContractResult => "SmartContractResultBlock",
            MiniBlockType::Receipt => "ReceiptBlock",
            MiniBlockType::Peer => "PeerBlock",
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MiniBlock {
    pub sender_shard_id: u32,
    pub receiver_shard_id: u32,
    pub mb_type: MiniBlockType,
    pub tx_hashes: Vec<Vec<u8>>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Body {
    pub mini_blocks: Vec<MiniBlock>,
}

#[derive(Clone, Debug, Default)]
pub struct TransactionData {
    pub nonce: u64,
    pub value: String,
    pub receiver: Vec<u8>,
    pub sender: Vec<u8>,
    pub gas_price: u64,
    pub gas_limit: u64,
    pub data: Vec<u8>,
    pub signature: Vec<u8>,
    pub sender_username: Vec<u8>,
    pub receiver_username: Vec<u8>,
}

#[derive(Clone, Debug, Default)]
pub struct RewardData {
    pub round: u64,
    pub value: String,
    pub receiver: Vec<u8>,
}

#[derive(Clone, Debug, Default)]
pub struct ScrData {
    pub nonce: u64,
    pub value: String,
    pub receiver: Vec<u8>,
    pub sender: Vec<u8>,
    pub relayer: Vec<u8>,
    pub relayed_value: String,
    pub code: Vec<u8>,
    pub data: Vec<u8>,
    pub prev_tx_hash: Vec<u8>,
    pub original_tx_hash: Vec<u8>,
    pub call_type: i32,
    pub code_metadata: Vec<u8>,
    pub return_message: Vec<u8>,
    pub gas_limit: u64,
    pub gas_price: u64,
}

#[derive(Clone, Debug, Default)]
pub struct ReceiptData {
    pub value: String,
    pub sender: Vec<u8>,
    pub data: Vec<u8>,
    pub tx_hash: Vec<u8>,
}

/// A pool entry, tagged by kind. Miniblock grouping dispatches on the tag
/// instead of downcasting handler objects.
#[derive(Clone, Debug)]
pub enum PoolItem {
    Normal(TransactionData),
    Reward(RewardData),
    Invalid(TransactionData),
    Scr(ScrData),
    Receipt(ReceiptData),
}

#[derive(Clone, Debug, Default)]
pub struct EventData {
    pub address: Vec<u8>,
    pub identifier: String,
    pub topics: Vec<Vec<u8>>,
    pub data: Vec<u8>,
}

#[derive(Clone, Debug, Default)]
pub struct EventLog {
    pub address: Vec<u8>,
    pub events: Vec<EventData>,
}

#[derive(Clone, Debug, Default)]
pub struct LogData {
    pub tx_hash: Vec<u8>,
    pub log: EventLog,
}

#[derive(Clone, Debug, Default)]
pub struct TransactionPool {
    pub items: HashMap<Vec<u8>, PoolItem>,
    pub logs: Vec<LogData>,
}

/// NFT metadata as reported by the node inside altered-account token records
/// and inside encoded [`DigitalToken`] payloads.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TokenMetaDataRaw {
    pub nonce: u64,
    pub name: String,
    pub creator: Vec<u8>,
    pub royalties: u32,
    pub hash: Vec<u8>,
    pub uris: Vec<Vec<u8>>,
    pub attributes: Vec<u8>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct DigitalToken {
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub properties: Vec<u8>,
    pub token_meta_data: Option<TokenMetaDataRaw>,
}

#[derive(Clone, Debug, Default)]
pub struct AccountTokenData {
    pub identifier: String,
    pub balance: String,
    pub nonce: u64,
    pub properties: String,
    pub metadata: Option<TokenMetaDataRaw>,
}

/// Per-block account snapshot delivered by the node, keyed by hex address.
#[derive(Clone, Debug, Default)]
pub struct AlteredAccountData {
    pub address: String,
    pub balance: String,
    pub nonce: u64,
    pub tokens: Vec<AccountTokenData>,
}

#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundInfo {
    pub round: u64,
    pub signers_indexes: Vec<u64>,
    pub block_was_proposed: bool,
    pub shard_id: u32,
    pub epoch: u32,
    pub timestamp: u64,
}

#[derive(Clone, Debug, Default)]
pub struct ValidatorRatingInfo {
    pub public_key: String,
    pub rating: f32,
}

/// One unit of node output: a committed block and everything observed while
/// executing it.
#[derive(Clone, Debug, Default)]
pub struct OutportBlockWithHeader {
    pub header: Header,
    pub body: Body,
    pub pool: TransactionPool,
    pub altered_accounts: HashMap<String, AlteredAccountData>,
}

// ---------------------------------------------------------------------------
// Output documents
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    #[serde(skip)]
    pub hash: String,
    pub nonce: u64,
    pub round: u64,
    pub epoch: u32,
    #[serde(rename = "shardId")]
    pub shard_id: u32,
    pub proposer: u64,
    pub validators: Vec<u64>,
    pub pub_key_bitmap: String,
    pub size: u64,
    pub timestamp: u64,
    pub state_root_hash: String,
    pub prev_hash: String,
    pub tx_count: u32,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub mini_blocks_hashes: Vec<String>,
    pub accumulated_fees: String,
    pub developer_fees: String,
    #[serde(skip_serializing_if = "std::ops::Not::not", default)]
    pub epoch_start_block: bool,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Miniblock {
    #[serde(skip)]
    pub hash: String,
    pub sender_shard: u32,
    pub receiver_shard: u32,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub sender_block_hash: String,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub receiver_block_hash: String,
    #[serde(skip_serializing_if = "is_zero", default)]
    pub sender_block_timestamp: u64,
    #[serde(skip_serializing_if = "is_zero", default)]
    pub receiver_block_timestamp: u64,
    #[serde(rename = "type")]
    pub mb_type: String,
    pub tx_count: u32,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    #[serde(skip)]
    pub hash: String,
    pub mini_block_hash: String,
    pub nonce: u64,
    pub round: u64,
    pub value: String,
    pub receiver: String,
    pub sender: String,
    pub receiver_shard: u32,
    pub sender_shard: u32,
    pub gas_price: u64,
    pub gas_limit: u64,
    pub gas_used: u64,
    pub fee: String,
    #[serde(with = "serde_base64", skip_serializing_if = "Vec::is_empty", default)]
    pub data: Vec<u8>,
    pub signature: String,
    pub timestamp: u64,
    pub status: String,
    #[serde(rename = "token", skip_serializing_if = "String::is_empty", default)]
    pub esdt_token_identifier: String,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub esdt_value: String,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub sender_user_name: String,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub receiver_user_name: String,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub smart_contract_results: Vec<String>,
    /// Set only for the `operations` index mirror.
    #[serde(rename = "type", skip_serializing_if = "String::is_empty", default)]
    pub operation_type: String,
    #[serde(skip)]
    pub receiver_address_bytes: Vec<u8>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScResult {
    #[serde(skip)]
    pub hash: String,
    pub nonce: u64,
    pub gas_limit: u64,
    pub gas_price: u64,
    pub value: String,
    pub sender: String,
    pub receiver: String,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub relayer_addr: String,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub relayed_value: String,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub code: String,
    #[serde(with = "serde_base64", skip_serializing_if = "Vec::is_empty", default)]
    pub data: Vec<u8>,
    pub prev_tx_hash: String,
    pub original_tx_hash: String,
    pub call_type: String,
    #[serde(with = "serde_base64", skip_serializing_if = "Vec::is_empty", default)]
    pub code_metadata: Vec<u8>,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub return_message: String,
    #[serde(rename = "token", skip_serializing_if = "String::is_empty", default)]
    pub esdt_token_identifier: String,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub esdt_value: String,
    pub timestamp: u64,
    /// Set only for the `operations` index mirror.
    #[serde(rename = "type", skip_serializing_if = "String::is_empty", default)]
    pub operation_type: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
    #[serde(skip)]
    pub hash: String,
    pub value: String,
    pub sender: String,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub data: String,
    pub tx_hash: String,
    pub timestamp: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountInfo {
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub address: String,
    pub nonce: u64,
    pub balance: String,
    pub balance_num: f64,
    #[serde(rename = "token", skip_serializing_if = "String::is_empty", default)]
    pub token_identifier: String,
    #[serde(skip_serializing_if = "is_zero", default)]
    pub token_nonce: u64,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub properties: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub data: Option<TokenMetaData>,
    #[serde(skip_serializing_if = "std::ops::Not::not", default)]
    pub is_sender: bool,
    #[serde(rename = "shardID")]
    pub shard_id: u32,
    #[serde(rename = "type", skip_serializing_if = "String::is_empty", default)]
    pub token_type: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountBalanceHistory {
    pub address: String,
    pub timestamp: u64,
    pub balance: String,
    #[serde(rename = "token", skip_serializing_if = "String::is_empty", default)]
    pub token_identifier: String,
    #[serde(skip_serializing_if = "is_zero", default)]
    pub token_nonce: u64,
    #[serde(skip_serializing_if = "std::ops::Not::not", default)]
    pub is_sender: bool,
    #[serde(rename = "shardID")]
    pub shard_id: u32,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenMetaData {
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub name: String,
    pub creator: String,
    #[serde(skip_serializing_if = "is_zero_u32", default)]
    pub royalties: u32,
    #[serde(with = "serde_base64", skip_serializing_if = "Vec::is_empty", default)]
    pub hash: Vec<u8>,
    #[serde(with = "serde_base64_list", skip_serializing_if = "Vec::is_empty", default)]
    pub uris: Vec<Vec<u8>>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub tags: Vec<String>,
    #[serde(with = "serde_base64", skip_serializing_if = "Vec::is_empty", default)]
    pub attributes: Vec<u8>,
    #[serde(skip_serializing_if = "is_zero", default)]
    pub nonce: u64,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenInfo {
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub name: String,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub ticker: String,
    pub token: String,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub issuer: String,
    #[serde(rename = "type", skip_serializing_if = "String::is_empty", default)]
    pub token_type: String,
    pub timestamp: u64,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub data: Option<TokenMetaData>,
    #[serde(skip_serializing_if = "is_zero", default)]
    pub nonce: u64,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub identifier: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub address: String,
    pub identifier: String,
    #[serde(with = "serde_base64_list", skip_serializing_if = "Vec::is_empty", default)]
    pub topics: Vec<Vec<u8>>,
    #[serde(with = "serde_base64", skip_serializing_if = "Vec::is_empty", default)]
    pub data: Vec<u8>,
    pub order: usize,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Logs {
    #[serde(skip)]
    pub id: String,
    pub address: String,
    pub events: Vec<Event>,
    pub timestamp: u64,
}

/// Per-event document for the `events` index, id `logHash-order`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventDoc {
    #[serde(skip)]
    pub id: String,
    pub tx_hash: String,
    pub log_address: String,
    pub address: String,
    pub identifier: String,
    #[serde(with = "serde_base64_list", skip_serializing_if = "Vec::is_empty", default)]
    pub topics: Vec<Vec<u8>>,
    #[serde(with = "serde_base64", skip_serializing_if = "Vec::is_empty", default)]
    pub data: Vec<u8>,
    pub order: usize,
    #[serde(rename = "shardID")]
    pub shard_id: u32,
    pub timestamp: u64,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScDeployInfo {
    pub tx_hash: String,
    pub creator: String,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub current_owner: String,
    pub timestamp: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnDelegateInfo {
    pub id: String,
    pub value: String,
    pub value_num: f64,
    pub timestamp: u64,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Delegator {
    pub address: String,
    pub contract: String,
    pub active_stake: String,
    pub active_stake_num: f64,
    pub timestamp: u64,
    #[serde(skip)]
    pub un_delegate_info: Option<UnDelegateInfo>,
    #[serde(skip)]
    pub withdraw_fund_ids: Option<Vec<String>>,
    #[serde(skip)]
    pub should_delete: bool,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EpochInfo {
    pub accumulated_fees: String,
    pub developer_fees: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidatorsPublicKeys {
    pub public_keys: Vec<String>,
}

// ---------------------------------------------------------------------------
// Intermediate carriers
// ---------------------------------------------------------------------------

/// Marker recorded by the tx and logs transformers for every address whose
/// state changed; the accounts transformer resolves the markers against the
/// node-provided [`AlteredAccountData`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AlteredMarker {
    pub is_sender: bool,
    pub is_esdt_operation: bool,
    pub token_identifier: String,
    pub is_nft_operation: bool,
    pub nft_nonce: u64,
    pub is_nft_create: bool,
}

#[derive(Clone, Debug, Default)]
pub struct AlteredAccounts {
    inner: HashMap<String, Vec<AlteredMarker>>,
}

impl AlteredAccounts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a marker for the address; identical markers are collapsed.
    pub fn add(&mut self, address: impl Into<String>, marker: AlteredMarker) {
        let entry = self.inner.entry(address.into()).or_default();
        if !entry.contains(&marker) {
            entry.push(marker);
        }
    }

    pub fn get(&self, address: &str) -> Option<&[AlteredMarker]> {
        self.inner.get(address).map(Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<AlteredMarker>)> {
        self.inner.iter()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

/// Insertion-ordered token collection, deduplicated by identifier.
#[derive(Clone, Debug, Default)]
pub struct TokensInfo {
    tokens: Vec<TokenInfo>,
}

impl TokensInfo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, token: TokenInfo) {
        let key = |t: &TokenInfo| (t.token.clone(), t.identifier.clone());
        if self.tokens.iter().any(|t| key(t) == key(&token)) {
            return;
        }
        self.tokens.push(token);
    }

    pub fn get_all(&self) -> &[TokenInfo] {
        &self.tokens
    }

    pub fn get_all_mut(&mut self) -> &mut [TokenInfo] {
        &mut self.tokens
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

/// Transactions/SCRs/receipts derived from one block, plus the addresses the
/// block touched.
#[derive(Debug, Default)]
pub struct PreparedResults {
    pub transactions: Vec<Transaction>,
    pub scrs: Vec<ScResult>,
    pub receipts: Vec<Receipt>,
    pub altered: AlteredAccounts,
    /// Status overrides discovered from logs (`signalError` and friends),
    /// keyed by hex tx hash.
    pub tx_hash_status: HashMap<String, String>,
}

/// Everything the logs/events interpreter extracted on top of the prepared
/// transaction results.
#[derive(Debug, Default)]
pub struct PreparedLogsResults {
    pub tokens: TokensInfo,
    pub tokens_supply: TokensInfo,
    pub tags: crate::process::tags::CountTags,
    pub sc_deploys: HashMap<String, ScDeployInfo>,
    pub delegators: HashMap<String, Delegator>,
    pub token_roles: TokenRolesAndProperties,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RoleData {
    pub token: String,
    pub address: String,
    pub set: bool,
}

/// Role grants/revocations observed in one block, grouped per role name.
#[derive(Clone, Debug, Default)]
pub struct TokenRolesAndProperties {
    roles: HashMap<String, Vec<RoleData>>,
}

impl TokenRolesAndProperties {
    pub fn add_role(&mut self, role: impl Into<String>, data: RoleData) {
        self.roles.entry(role.into()).or_default().push(data);
    }

    pub fn roles(&self) -> &HashMap<String, Vec<RoleData>> {
        &self.roles
    }

    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }
}

fn is_zero(value: &u64) -> bool {
    *value == 0
}

fn is_zero_u32(value: &u32) -> bool {
    *value == 0
}

mod serde_base64 {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}

mod serde_base64_list {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(list: &[Vec<u8>], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(list.iter().map(|bytes| STANDARD.encode(bytes)))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Vec<Vec<u8>>, D::Error> {
        let encoded = Vec::<String>::deserialize(deserializer)?;
        encoded
            .into_iter()
            .map(|item| STANDARD.decode(item).map_err(serde::de::Error::custom))
            .collect()
    }
}
