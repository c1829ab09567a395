use serde::{Deserialize, Serialize};

use crate::models::block::BlockIdentifier;
use crate::models::transaction::{deserialize_u64, TransactionId};

/// Response of `getAddressInformation`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddressInformation {
    /// Balance in nanotons
    #[serde(deserialize_with = "deserialize_u64")]
    pub balance: u64,
    pub last_transaction_id: TransactionId,
    pub block_id: BlockIdentifier,
    pub sync_utime: u64,
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub data: String,
    #[serde(default)]
    pub frozen_hash: String,
    /// `uninitialized`, `active` or `frozen`
    #[serde(default)]
    pub state: String,
}

impl AddressInformation {
    pub fn is_active(&self) -> bool {
        self.state == "active"
    }
}

/// Response of `getWalletInformation`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalletInformation {
    /// Whether the contract is a recognised wallet
    pub wallet: bool,
    #[serde(deserialize_with = "deserialize_u64")]
    pub balance: u64,
    pub account_state: String,
    pub last_transaction_id: TransactionId,
    #[serde(default)]
    pub wallet_type: Option<String>,
    #[serde(default)]
    pub seqno: Option<u64>,
    #[serde(default)]
    pub wallet_id: Option<u64>,
}

/// One user-friendly rendering of an address
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FriendlyAddress {
    pub b64: String,
    pub b64url: String,
}

/// Response of `detectAddress`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddressForms {
    pub raw_form: String,
    pub bounceable: FriendlyAddress,
    pub non_bounceable: FriendlyAddress,
    /// Which form the queried address was written in
    pub given_type: String,
    pub test_only: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_address_information() {
        let json = r#"{
            "@type": "raw.fullAccountState",
            "balance": "1500000000",
            "code": "te6cck...",
            "data": "te6cck...",
            "last_transaction_id": {"@type": "internal.transactionId", "lt": "27000001000003", "hash": "abc="},
            "block_id": {"@type": "ton.blockIdExt", "workchain": -1, "shard": "-9223372036854775808", "seqno": 41000123, "root_hash": "r=", "file_hash": "f="},
            "frozen_hash": "",
            "sync_utime": 1650000000,
            "state": "active"
        }"#;

        let info: AddressInformation = serde_json::from_str(json).expect("Should parse");
        assert_eq!(info.balance, 1_500_000_000);
        assert_eq!(info.last_transaction_id.lt, 27_000_001_000_003);
        assert!(info.block_id.is_masterchain());
        assert!(info.is_active());
    }

    #[test]
    fn test_parse_wallet_information() {
        let json = r#"{
            "wallet": true,
            "balance": "2500",
            "account_state": "active",
            "wallet_type": "wallet v3 r2",
            "seqno": 12,
            "wallet_id": 698983191,
            "last_transaction_id": {"@type": "internal.transactionId", "lt": "1", "hash": "h="}
        }"#;

        let info: WalletInformation = serde_json::from_str(json).expect("Should parse");
        assert!(info.wallet);
        assert_eq!(info.balance, 2500);
        assert_eq!(info.seqno, Some(12));

        // Non-wallet contracts omit the wallet fields
        let json = r#"{
            "wallet": false,
            "balance": 0,
            "account_state": "uninitialized",
            "last_transaction_id": {"lt": "0", "hash": ""}
        }"#;
        let info: WalletInformation = serde_json::from_str(json).expect("Should parse");
        assert!(!info.wallet);
        assert!(info.wallet_type.is_none());
    }
}
