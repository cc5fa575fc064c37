//! Value conversions shared by the transformers: denominated balances,
//! composed token identifiers, JSON string escaping, painless script
//! canonicalization and NFT metadata extraction.

use crate::core::PubkeyConverter;
use crate::data::{DigitalToken, TokenMetaData};
use crate::errors::IndexerError;
use num_bigint::{BigInt, Sign};
use num_traits::ToPrimitive;

/// Converts raw chain balances into floats with `denomination` decimals of
/// accuracy.
pub struct BalanceConverter {
    divider: f64,
}

impl BalanceConverter {
    pub fn new(denomination: i32) -> Result<Self, IndexerError> {
        if denomination < 0 {
            return Err(IndexerError::NegativeDenomination(denomination));
        }
        Ok(Self {
            divider: 10f64.powi(denomination),
        })
    }

    /// `balance / 10^denomination`, rounded to `denomination` decimals.
    /// Negative balances map to 0.
    pub fn compute_balance_as_float(&self, balance: &BigInt) -> f64 {
        if balance.sign() == Sign::Minus {
            return 0.0;
        }

        let raw = balance.to_f64().unwrap_or(0.0) / self.divider;
        (raw * self.divider).round() / self.divider
    }

    /// Parses a decimal string balance; unparsable input counts as 0.
    pub fn compute_balance_as_float_str(&self, balance: &str) -> f64 {
        let parsed = balance.parse::<BigInt>().unwrap_or_default();
        self.compute_balance_as_float(&parsed)
    }

    pub fn compute_slice_of_strings_as_float(&self, balances: &[String]) -> Vec<f64> {
        balances
            .iter()
            .map(|balance| self.compute_balance_as_float_str(balance))
            .collect()
    }
}

/// `token` for fungible amounts, `token-<hexNonce>` for NFTs. The nonce hex
/// is the big-endian minimal byte representation, so it is always
/// even-length and carries no leading zero byte.
pub fn compute_token_identifier(token: &str, nonce: u64) -> String {
    if nonce == 0 {
        return token.to_string();
    }

    let bytes = nonce.to_be_bytes();
    let first = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len() - 1);
    format!("{token}-{}", hex::encode(&bytes[first..]))
}

/// Escapes a string for embedding inside a JSON document.
pub fn json_escape(value: &str) -> String {
    let quoted = serde_json::to_string(value).expect("strings always serialize");
    quoted[1..quoted.len() - 1].to_string()
}

/// Collapses a painless script into a single line: scripts are embedded in
/// bulk payloads and must not contain raw newlines. Idempotent.
pub fn format_painless_source(source: &str) -> String {
    source.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Maps a decoded token payload onto the document metadata, re-encoding the
/// creator address and pulling tags out of the attribute string.
pub fn prepare_token_meta_data(
    pubkey_converter: &dyn PubkeyConverter,
    token: &DigitalToken,
) -> Option<TokenMetaData> {
    token
        .token_meta_data
        .as_ref()
        .map(|raw| convert_token_meta_data(pubkey_converter, raw))
}

/// Node-reported metadata mapped onto the document form.
pub fn convert_token_meta_data(
    pubkey_converter: &dyn PubkeyConverter,
    raw: &crate::data::TokenMetaDataRaw,
) -> TokenMetaData {
    TokenMetaData {
        name: raw.name.clone(),
        creator: pubkey_converter.encode(&raw.creator),
        royalties: raw.royalties,
        hash: raw.hash.clone(),
        uris: raw.uris.clone(),
        tags: extract_tags_from_attributes(&raw.attributes),
        attributes: raw.attributes.clone(),
        nonce: raw.nonce,
    }
}

/// Attribute strings look like `tags:a,b,c;metadata:...`; returns the tag
/// list, empty when no tags section exists.
pub fn extract_tags_from_attributes(attributes: &[u8]) -> Vec<String> {
    let Ok(attributes) = std::str::from_utf8(attributes) else {
        return Vec::new();
    };

    attributes
        .split(';')
        .find_map(|section| section.strip_prefix("tags:"))
        .map(|tags| {
            tags.split(',')
                .map(str::trim)
                .filter(|tag| !tag.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}
