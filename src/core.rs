//! Capability contracts consumed by the indexing pipeline. The node supplies
//! concrete hashing, codec, address and fee implementations; everything in
//! the pipeline talks to these seams only.

use crate::data::{DigitalToken, Header, MiniBlock, TransactionData};
use anyhow::Result;
use num_bigint::BigInt;

/// Shard ID of the metachain.
pub const METACHAIN_SHARD_ID: u32 = 0xFFFF_FFFF;

/// Built-in function and event identifiers emitted by the chain.
pub mod builtin {
    pub const ESDT_TRANSFER: &str = "ESDTTransfer";
    pub const ESDT_NFT_TRANSFER: &str = "ESDTNFTTransfer";
    pub const ESDT_NFT_BURN: &str = "ESDTNFTBurn";
    pub const ESDT_NFT_ADD_QUANTITY: &str = "ESDTNFTAddQuantity";
    pub const ESDT_NFT_CREATE: &str = "ESDTNFTCreate";
    pub const MULTI_ESDT_NFT_TRANSFER: &str = "MultiESDTNFTTransfer";
    pub const ESDT_WIPE: &str = "ESDTWipe";
}

/// Pseudo shard ID meaning "every shard" (used by reward miniblocks).
pub const ALL_SHARDS_ID: u32 = 0xFFFF_FFFF;

pub trait Hasher: Send + Sync {
    fn compute(&self, data: &[u8]) -> Vec<u8>;
}

/// Binary codec used to hash headers/miniblocks and to decode the token
/// payloads embedded in NFT-create event topics.
pub trait Codec: Send + Sync {
    fn encode_header(&self, header: &Header) -> Result<Vec<u8>>;
    fn encode_miniblock(&self, miniblock: &MiniBlock) -> Result<Vec<u8>>;
    fn decode_digital_token(&self, bytes: &[u8]) -> Result<DigitalToken>;
}

/// Canonical JSON codec. The seam exists so callers can plug the node's
/// native wire encoding instead.
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode_header(&self, header: &Header) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(header)?)
    }

    fn encode_miniblock(&self, miniblock: &MiniBlock) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(miniblock)?)
    }

    fn decode_digital_token(&self, bytes: &[u8]) -> Result<DigitalToken> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

pub trait PubkeyConverter: Send + Sync {
    fn encode(&self, address: &[u8]) -> String;
    fn decode(&self, encoded: &str) -> Result<Vec<u8>>;
}

/// Hex address encoding. Production deployments supply the chain's
/// human-readable encoding instead.
pub struct HexPubkeyConverter;

impl PubkeyConverter for HexPubkeyConverter {
    fn encode(&self, address: &[u8]) -> String {
        hex::encode(address)
    }

    fn decode(&self, encoded: &str) -> Result<Vec<u8>> {
        Ok(hex::decode(encoded)?)
    }
}

pub trait ShardCoordinator: Send + Sync {
    fn self_id(&self) -> u32;
    fn num_shards(&self) -> u32;
    fn compute_id(&self, address: &[u8]) -> u32;
}

/// Shard assignment by masking the last address byte, falling back to the
/// low mask when the result exceeds the shard count.
pub struct MaskShardCoordinator {
    self_id: u32,
    num_shards: u32,
    mask_high: u32,
    mask_low: u32,
}

impl MaskShardCoordinator {
    pub fn new(self_id: u32, num_shards: u32) -> Self {
        let bits = (32 - (num_shards.max(1) - 1).leading_zeros()).max(1);
        Self {
            self_id,
            num_shards,
            mask_high: (1 << bits) - 1,
            mask_low: (1 << (bits - 1)) - 1,
        }
    }
}

impl ShardCoordinator for MaskShardCoordinator {
    fn self_id(&self) -> u32 {
        self.self_id
    }

    fn num_shards(&self) -> u32 {
        self.num_shards
    }

    fn compute_id(&self, address: &[u8]) -> u32 {
        let Some(last) = address.last() else {
            return METACHAIN_SHARD_ID;
        };
        if self.num_shards <= 1 {
            return 0;
        }

        let mut shard = u32::from(*last) & self.mask_high;
        if shard > self.num_shards - 1 {
            shard = u32::from(*last) & self.mask_low;
        }
        shard
    }
}

/// Transaction fee model. Supplied by the node's economics component.
pub trait FeeCalculator: Send + Sync {
    /// Gas actually charged for processing (move + data costs).
    fn compute_gas_limit(&self, tx: &TransactionData) -> u64;

    /// Fee for the given amount of used gas.
    fn compute_fee_for_gas(&self, tx: &TransactionData, gas_used: u64) -> BigInt;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shard_masks() {
        let coordinator = MaskShardCoordinator::new(0, 2);
        assert_eq!(coordinator.compute_id(&[0x00]), 0);
        assert_eq!(coordinator.compute_id(&[0x01]), 1);
        assert_eq!(coordinator.compute_id(&[0xfe]), 0);
        assert_eq!(coordinator.compute_id(&[0xff]), 1);

        // Three shards need two mask bits; values over the count fall back.
        let coordinator = MaskShardCoordinator::new(0, 3);
        assert_eq!(coordinator.compute_id(&[0x00]), 0);
        assert_eq!(coordinator.compute_id(&[0x01]), 1);
        assert_eq!(coordinator.compute_id(&[0x02]), 2);
        assert_eq!(coordinator.compute_id(&[0x03]), 1);

        assert_eq!(coordinator.compute_id(&[]), METACHAIN_SHARD_ID);
    }

    #[test]
    fn single_shard_maps_everything_to_zero() {
        let coordinator = MaskShardCoordinator::new(0, 1);
        for byte in [0x00u8, 0x7f, 0xff] {
            assert_eq!(coordinator.compute_id(&[byte]), 0);
        }
    }

    #[test]
    fn hex_converter_round_trip() {
        let converter = HexPubkeyConverter;
        assert_eq!(converter.encode(b"addr"), "61646472");
        assert_eq!(converter.decode("61646472").unwrap(), b"addr");
    }
}
