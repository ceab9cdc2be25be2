use std::{
    fmt::{self, Display},
    str::FromStr,
};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::MillisatAmount;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    Incoming,
    Outgoing,
}

impl Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionType::Incoming => f.write_str("incoming"),
            TransactionType::Outgoing => f.write_str("outgoing"),
        }
    }
}

impl FromStr for TransactionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "incoming" => Ok(TransactionType::Incoming),
            "outgoing" => Ok(TransactionType::Outgoing),
            _ => Err(format!("unable to deserialize transaction type {s}")),
        }
    }
}

/// The canonical ledger entry every backend is normalised into.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Transaction {
    #[serde(rename = "type")]
    pub transaction_type: TransactionType,
    pub invoice: String,
    pub description: String,
    pub description_hash: String,
    // Only present once the payment settled.
    pub preimage: Option<String>,
    pub payment_hash: String,
    pub amount: MillisatAmount,
    pub fees_paid: MillisatAmount,
    pub created_at: i64,
    pub expires_at: Option<i64>,
    pub settled_at: Option<i64>,
    pub metadata: Option<serde_json::Value>,
}

impl Transaction {
    pub fn is_settled(&self) -> bool {
        self.settled_at.is_some()
    }
}

/// Custom TLV record attached to a spontaneous payment. The value travels as hex.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct TlvRecord {
    #[serde(rename = "type")]
    pub record_type: u64,
    #[serde(serialize_with = "to_hex", deserialize_with = "from_hex")]
    pub value: Vec<u8>,
}

fn to_hex<S: Serializer>(value: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&hex::encode(value))
}

fn from_hex<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
    let s = String::deserialize(deserializer)?;
    hex::decode(s).map_err(serde::de::Error::custom)
}

/// Zero means "not set" for every numeric field.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct ListTransactionsParams {
    pub from: u64,
    pub until: u64,
    pub limit: u64,
    pub offset: u64,
    pub unpaid: bool,
    #[serde(rename = "type")]
    pub transaction_type: Option<TransactionType>,
}

impl ListTransactionsParams {
    pub fn includes(&self, transaction_type: TransactionType) -> bool {
        self.transaction_type
            .map(|t| t == transaction_type)
            .unwrap_or(true)
    }
}
