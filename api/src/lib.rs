mod transaction;

pub use transaction::{ListTransactionsParams, TlvRecord, Transaction, TransactionType};

use std::{
    fmt::{self, Display},
    str::FromStr,
};

use serde::{Deserialize, Serialize};

/// Millisatoshis. Signed because fees reported by some backends can be negative.
pub type MillisatAmount = i64;

/// Backend specific network graph data, passed through untouched.
pub type NetworkGraph = serde_json::Value;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Default)]
pub struct NodeInfo {
    pub alias: String,
    pub color: String,
    pub pubkey: String,
    pub network: String,
    pub block_height: u32,
    pub block_hash: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Default)]
pub struct OnchainBalance {
    pub spendable: MillisatAmount,
    pub total: MillisatAmount,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct LightningBalance {
    pub total_spendable: MillisatAmount,
    pub total_receivable: MillisatAmount,
    pub next_max_spendable: MillisatAmount,
    pub next_max_receivable: MillisatAmount,
    #[serde(rename = "nextMaxSpendableMPP")]
    pub next_max_spendable_mpp: MillisatAmount,
    #[serde(rename = "nextMaxReceivableMPP")]
    pub next_max_receivable_mpp: MillisatAmount,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Default)]
pub struct Balances {
    pub onchain: OnchainBalance,
    pub lightning: LightningBalance,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Channel {
    /// Funding outpoint as `txid:index`.
    pub id: String,
    pub remote_pubkey: String,
    pub local_balance: MillisatAmount,
    pub remote_balance: MillisatAmount,
    pub active: bool,
    pub public: bool,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PeerDetails {
    pub node_id: String,
    pub address: String,
    pub is_persisted: bool,
    pub is_connected: bool,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Default)]
pub struct NodeConnectionInfo {
    pub pubkey: String,
    pub address: String,
    pub port: u16,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ConnectPeerRequest {
    pub pubkey: String,
    pub address: String,
    pub port: u16,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct OpenChannelRequest {
    pub pubkey: String,
    pub amount_sats: u64,
    pub public: bool,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct OpenChannelResponse {
    pub funding_tx_id: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CloseChannelRequest {
    /// Funding outpoint as `txid:index`.
    pub channel_id: String,
    pub node_id: String,
    pub force: bool,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Default)]
pub struct CloseChannelResponse {}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NodeStatus {
    pub is_running: bool,
    pub synced_to_chain: bool,
    pub block_height: u32,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct PayInvoiceResponse {
    pub preimage: String,
    /// Routing fee in msat, when the backend reports one.
    pub fee: Option<MillisatAmount>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct KeysendResponse {
    pub preimage: String,
    pub payment_hash: String,
}

/// Which part of the routing state to drop. The backup subsystem uses `All`.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResetRouterScope {
    #[serde(rename = "ALL")]
    All,
    NetworkGraph,
    Scorer,
    LatestRgsSyncTimestamp,
}

impl Display for ResetRouterScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResetRouterScope::All => f.write_str("ALL"),
            ResetRouterScope::NetworkGraph => f.write_str("NetworkGraph"),
            ResetRouterScope::Scorer => f.write_str("Scorer"),
            ResetRouterScope::LatestRgsSyncTimestamp => f.write_str("LatestRgsSyncTimestamp"),
        }
    }
}

impl FromStr for ResetRouterScope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ALL" => Ok(ResetRouterScope::All),
            "NetworkGraph" => Ok(ResetRouterScope::NetworkGraph),
            "Scorer" => Ok(ResetRouterScope::Scorer),
            "LatestRgsSyncTimestamp" => Ok(ResetRouterScope::LatestRgsSyncTimestamp),
            _ => Err(format!("unknown router reset scope {s}")),
        }
    }
}
