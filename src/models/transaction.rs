use serde::{Deserialize, Deserializer, Serialize};

use crate::models::block::BlockIdentifier;

/// toncenter encodes 64-bit integers as strings; accept either form
pub(crate) fn deserialize_u64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Number {
        Int(u64),
        Text(String),
    }

    match Number::deserialize(deserializer)? {
        Number::Int(v) => Ok(v),
        Number::Text(s) if s.is_empty() => Ok(0),
        Number::Text(s) => s.parse().map_err(serde::de::Error::custom),
    }
}

fn deserialize_amount<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Amount {
        Int(u64),
        Text(String),
    }

    Ok(match Amount::deserialize(deserializer)? {
        Amount::Int(v) => v.to_string(),
        Amount::Text(s) => s,
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransactionId {
    #[serde(deserialize_with = "deserialize_u64")]
    pub lt: u64,
    pub hash: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageData {
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub init_state: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub destination: String,
    #[serde(default, deserialize_with = "deserialize_amount")]
    pub value: String,
    #[serde(default, deserialize_with = "deserialize_amount")]
    pub fwd_fee: String,
    #[serde(default, deserialize_with = "deserialize_amount")]
    pub ihr_fee: String,
    #[serde(default, deserialize_with = "deserialize_u64")]
    pub created_lt: u64,
    #[serde(default)]
    pub body_hash: String,
    #[serde(default)]
    pub msg_data: MessageData,
    /// Text comment attached to the message, if any
    #[serde(default)]
    pub message: String,
}

/// A transaction of a single account, as returned by `getTransactions`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub utime: u64,
    #[serde(default)]
    pub data: String,
    pub transaction_id: TransactionId,
    #[serde(default, deserialize_with = "deserialize_amount")]
    pub fee: String,
    #[serde(default, deserialize_with = "deserialize_amount")]
    pub storage_fee: String,
    #[serde(default, deserialize_with = "deserialize_amount")]
    pub other_fee: String,
    #[serde(default)]
    pub in_msg: Option<Message>,
    #[serde(default)]
    pub out_msgs: Vec<Message>,
}

impl TransactionRecord {
    pub fn logical_time(&self) -> u64 {
        self.transaction_id.lt
    }

    pub fn hash(&self) -> &str {
        &self.transaction_id.hash
    }

    pub fn source(&self) -> &str {
        self.in_msg.as_ref().map(|m| m.source.as_str()).unwrap_or("")
    }

    pub fn destination(&self) -> &str {
        self.in_msg.as_ref().map(|m| m.destination.as_str()).unwrap_or("")
    }

    /// Inbound value in nanotons; `None` when absent or unparseable
    pub fn value(&self) -> Option<u64> {
        self.in_msg.as_ref().and_then(|m| m.value.parse().ok())
    }

    /// Comment carried by the inbound message
    pub fn comment(&self) -> &str {
        self.in_msg.as_ref().map(|m| m.message.as_str()).unwrap_or("")
    }

    /// An inbound transfer from an external sender to `address` that emitted
    /// no outbound messages (bounces and wallet-initiated sends excluded)
    pub fn is_inbound_payment_to(&self, address: &str) -> bool {
        match &self.in_msg {
            Some(msg) => self.out_msgs.is_empty() && !msg.source.is_empty() && msg.destination == address,
            None => false,
        }
    }
}

/// Entry of `getBlockTransactions`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionStub {
    pub mode: i32,
    pub account: String,
    #[serde(deserialize_with = "deserialize_u64")]
    pub lt: u64,
    pub hash: String,
}

impl TransactionStub {
    pub fn id(&self) -> TransactionId {
        TransactionId {
            lt: self.lt,
            hash: self.hash.clone(),
        }
    }
}

/// Response of `getBlockTransactions`
#[derive(Debug, Clone, Deserialize)]
pub struct BlockTransactions {
    pub id: BlockIdentifier,
    pub req_count: u32,
    pub incomplete: bool,
    pub transactions: Vec<TransactionStub>,
}
