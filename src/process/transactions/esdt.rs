//! Recognizes ESDT operations from transaction data payloads of the form
//! `function@hexArg1@hexArg2...`.

use crate::core::builtin;
use num_bigint::{BigInt, Sign};

pub const AT_SEPARATOR: char = '@';

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EsdtInfo {
    pub identifier: String,
    pub value: String,
}

/// Extracts the token identifier and transferred value when the payload is a
/// recognized ESDT transfer call with its required argument count.
pub fn parse_esdt_tx(data: &[u8]) -> Option<EsdtInfo> {
    let data = std::str::from_utf8(data).ok()?;
    let parts: Vec<&str> = data.split(AT_SEPARATOR).collect();

    match parts[0] {
        // ESDTTransfer@<token>@<value>
        builtin::ESDT_TRANSFER if parts.len() >= 3 => Some(EsdtInfo {
            identifier: decode_string_arg(parts[1])?,
            value: decode_value_arg(parts[2])?,
        }),
        // ESDTNFTTransfer@<token>@<nonce>@<quantity>@<receiver>
        builtin::ESDT_NFT_TRANSFER if parts.len() >= 5 => Some(EsdtInfo {
            identifier: decode_string_arg(parts[1])?,
            value: decode_value_arg(parts[3])?,
        }),
        // MultiESDTNFTTransfer@<receiver>@<num>@<token>@<nonce>@<quantity>...
        builtin::MULTI_ESDT_NFT_TRANSFER if parts.len() >= 6 => Some(EsdtInfo {
            identifier: decode_string_arg(parts[3])?,
            value: decode_value_arg(parts[5])?,
        }),
        _ => None,
    }
}

/// Whether the payload is an NFT or multi transfer, the shape that keeps its
/// destination-written status when re-indexed intra-shard.
pub fn is_nft_transfer_or_multi(data: &[u8]) -> bool {
    let Ok(data) = std::str::from_utf8(data) else {
        return false;
    };
    let parts: Vec<&str> = data.split(AT_SEPARATOR).collect();
    if parts.len() < 4 {
        return false;
    }

    parts[0] == builtin::ESDT_NFT_TRANSFER || parts[0] == builtin::MULTI_ESDT_NFT_TRANSFER
}

fn decode_string_arg(arg: &str) -> Option<String> {
    let bytes = hex::decode(arg).ok()?;
    String::from_utf8(bytes).ok()
}

fn decode_value_arg(arg: &str) -> Option<String> {
    let bytes = hex::decode(arg).ok()?;
    Some(BigInt::from_bytes_be(Sign::Plus, &bytes).to_string())
}
