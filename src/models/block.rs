use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Workchain id of the masterchain
pub const MASTERCHAIN_WORKCHAIN: i32 = -1;

/// Shard id covering the whole workchain (`0x8000000000000000`)
pub const MASTERCHAIN_SHARD: i64 = i64::MIN;

/// Identifies a block within the ledger's block tree
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockIdentifier {
    pub workchain: i32,
    #[serde(serialize_with = "serialize_shard", deserialize_with = "deserialize_shard")]
    pub shard: i64,
    pub seqno: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_hash: Option<String>,
}

impl BlockIdentifier {
    pub fn new(workchain: i32, shard: i64, seqno: u32) -> Self {
        Self {
            workchain,
            shard,
            seqno,
            root_hash: None,
            file_hash: None,
        }
    }

    /// The masterchain block at `seqno`, without hashes
    pub fn masterchain(seqno: u32) -> Self {
        Self::new(MASTERCHAIN_WORKCHAIN, MASTERCHAIN_SHARD, seqno)
    }

    pub fn with_hashes(mut self, root_hash: impl Into<String>, file_hash: impl Into<String>) -> Self {
        self.root_hash = Some(root_hash.into());
        self.file_hash = Some(file_hash.into());
        self
    }

    pub fn is_masterchain(&self) -> bool {
        self.workchain == MASTERCHAIN_WORKCHAIN
    }
}

impl fmt::Display for BlockIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{:016x},{})", self.workchain, self.shard as u64, self.seqno)
    }
}

/// toncenter sends shard ids as signed decimal strings
fn serialize_shard<S: Serializer>(shard: &i64, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&shard.to_string())
}

fn deserialize_shard<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Shard {
        Signed(i64),
        Unsigned(u64),
        Text(String),
    }

    match Shard::deserialize(deserializer)? {
        Shard::Signed(v) => Ok(v),
        Shard::Unsigned(v) => Ok(v as i64),
        Shard::Text(s) => {
            if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
                u64::from_str_radix(hex, 16)
                    .map(|v| v as i64)
                    .map_err(serde::de::Error::custom)
            } else if let Ok(v) = s.parse::<i64>() {
                Ok(v)
            } else {
                s.parse::<u64>().map(|v| v as i64).map_err(serde::de::Error::custom)
            }
        }
    }
}

/// Response of `getMasterchainInfo`
#[derive(Debug, Clone, Deserialize)]
pub struct MasterchainInfo {
    pub last: BlockIdentifier,
    pub state_root_hash: String,
    pub init: BlockIdentifier,
}

/// Response of `getConsensusBlock`
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ConsensusBlock {
    pub consensus_block: u32,
    pub timestamp: f64,
}

/// Response of `shards`
#[derive(Debug, Clone, Deserialize)]
pub struct Shards {
    pub shards: Vec<BlockIdentifier>,
}

/// Response of `getBlockHeader`, reduced to the fields the watcher reads
#[derive(Debug, Clone, Deserialize)]
pub struct BlockHeader {
    pub id: BlockIdentifier,
    pub global_id: i32,
    pub version: u32,
    #[serde(default)]
    pub after_merge: bool,
    #[serde(default)]
    pub after_split: bool,
    #[serde(default)]
    pub before_split: bool,
    #[serde(default)]
    pub is_key_block: bool,
    #[serde(deserialize_with = "crate::models::transaction::deserialize_u64")]
    pub start_lt: u64,
    #[serde(deserialize_with = "crate::models::transaction::deserialize_u64")]
    pub end_lt: u64,
    #[serde(default)]
    pub prev_blocks: Vec<BlockIdentifier>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_masterchain_identifier() {
        let block = BlockIdentifier::masterchain(101);
        assert_eq!(block.workchain, -1);
        assert_eq!(block.shard, i64::MIN);
        assert_eq!(block.seqno, 101);
        assert!(block.is_masterchain());
        assert_eq!(block.to_string(), "(-1,8000000000000000,101)");
    }

    #[test]
    fn test_block_identifier_from_toncenter_json() {
        let json = r#"{
            "@type": "ton.blockIdExt",
            "workchain": 0,
            "shard": "-9223372036854775808",
            "seqno": 41023711,
            "root_hash": "abc=",
            "file_hash": "def="
        }"#;

        let block: BlockIdentifier = serde_json::from_str(json).expect("Failed to parse block id");
        assert_eq!(block.workchain, 0);
        assert_eq!(block.shard, MASTERCHAIN_SHARD);
        assert_eq!(block.seqno, 41023711);
        assert_eq!(block.root_hash.as_deref(), Some("abc="));
        assert!(!block.is_masterchain());
    }

    #[test]
    fn test_shard_accepts_numbers_and_hex() {
        let numeric: BlockIdentifier =
            serde_json::from_str(r#"{"workchain":0,"shard":6917529027641081856,"seqno":1}"#).unwrap();
        assert_eq!(numeric.shard, 0x6000000000000000);

        let hex: BlockIdentifier =
            serde_json::from_str(r#"{"workchain":0,"shard":"0xe000000000000000","seqno":1}"#).unwrap();
        assert_eq!(hex.shard as u64, 0xe000000000000000);
    }

    #[test]
    fn test_shard_serialized_as_string() {
        let json = serde_json::to_value(BlockIdentifier::masterchain(7)).unwrap();
        assert_eq!(json["shard"], "-9223372036854775808");
        assert!(json.get("root_hash").is_none());
    }
}
