//! Native LND records as they come off the REST gateway. proto3 JSON encodes
//! 64 bit integers as strings and bytes as base64.

use std::collections::BTreeMap;

use base64::{engine::general_purpose, Engine};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct GetInfoResponse {
    pub identity_pubkey: String,
    pub alias: String,
    pub color: String,
    pub block_height: u32,
    pub block_hash: String,
    pub synced_to_chain: bool,
    pub chains: Vec<Chain>,
    pub uris: Vec<String>,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct Chain {
    pub chain: String,
    pub network: String,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct Amount {
    #[serde(deserialize_with = "int")]
    pub sat: i64,
    #[serde(deserialize_with = "int")]
    pub msat: i64,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct ChannelBalanceResponse {
    pub local_balance: Amount,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct WalletBalanceResponse {
    #[serde(deserialize_with = "int")]
    pub total_balance: i64,
    #[serde(deserialize_with = "int")]
    pub confirmed_balance: i64,
    #[serde(deserialize_with = "int")]
    pub unconfirmed_balance: i64,
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvoiceState {
    #[default]
    Open,
    Settled,
    Canceled,
    Accepted,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct Invoice {
    pub memo: String,
    #[serde(deserialize_with = "bytes")]
    pub r_preimage: Vec<u8>,
    #[serde(deserialize_with = "bytes")]
    pub r_hash: Vec<u8>,
    #[serde(deserialize_with = "int")]
    pub value_msat: i64,
    #[serde(deserialize_with = "int")]
    pub creation_date: i64,
    #[serde(deserialize_with = "int")]
    pub settle_date: i64,
    pub payment_request: String,
    #[serde(deserialize_with = "bytes")]
    pub description_hash: Vec<u8>,
    #[serde(deserialize_with = "int")]
    pub expiry: i64,
    #[serde(deserialize_with = "int")]
    pub amt_paid_msat: i64,
    pub state: InvoiceState,
    pub is_keysend: bool,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct ListInvoiceResponse {
    pub invoices: Vec<Invoice>,
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    InFlight,
    Succeeded,
    Failed,
    Initiated,
    #[default]
    #[serde(other)]
    Unknown,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct Payment {
    pub payment_hash: String,
    #[serde(deserialize_with = "int")]
    pub value_msat: i64,
    #[serde(deserialize_with = "int")]
    pub creation_date: i64,
    #[serde(deserialize_with = "int")]
    pub fee_msat: i64,
    pub payment_preimage: String,
    pub payment_request: String,
    pub status: PaymentStatus,
    #[serde(deserialize_with = "int")]
    pub creation_time_ns: i64,
    pub htlcs: Vec<HtlcAttempt>,
}

impl Payment {
    /// When the successful HTLC resolved, in unix seconds.
    pub fn settled_at(&self) -> Option<i64> {
        self.htlcs
            .iter()
            .filter(|htlc| htlc.status == HtlcStatus::Succeeded && htlc.resolve_time_ns > 0)
            .map(|htlc| htlc.resolve_time_ns / 1_000_000_000)
            .max()
    }
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HtlcStatus {
    #[default]
    InFlight,
    Succeeded,
    Failed,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct HtlcAttempt {
    pub status: HtlcStatus,
    #[serde(deserialize_with = "int")]
    pub resolve_time_ns: i64,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct ListPaymentsResponse {
    pub payments: Vec<Payment>,
}

/// Query window for invoices. Zero values are left out of the request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListInvoiceRequest {
    pub num_max_invoices: u64,
    pub index_offset: u64,
    pub reversed: bool,
    pub pending_only: bool,
    pub creation_date_start: u64,
    pub creation_date_end: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListPaymentsRequest {
    pub max_payments: u64,
    pub index_offset: u64,
    pub reversed: bool,
    pub include_incomplete: bool,
    pub creation_date_start: u64,
    pub creation_date_end: u64,
}

#[derive(Serialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct AddInvoiceRequest {
    #[serde(serialize_with = "int_string")]
    pub value_msat: i64,
    pub memo: String,
    #[serde(serialize_with = "base64_string", skip_serializing_if = "Vec::is_empty")]
    pub description_hash: Vec<u8>,
    #[serde(serialize_with = "int_string")]
    pub expiry: i64,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct AddInvoiceResponse {
    #[serde(deserialize_with = "bytes")]
    pub r_hash: Vec<u8>,
    pub payment_request: String,
}

/// Feature bit for a mandatory TLV onion, needed for keysend.
pub const TLV_ONION_REQ: i32 = 8;

#[derive(Serialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct SendRequest {
    #[serde(serialize_with = "base64_string", skip_serializing_if = "Vec::is_empty")]
    pub dest: Vec<u8>,
    #[serde(serialize_with = "int_string", skip_serializing_if = "is_zero")]
    pub amt_msat: i64,
    #[serde(serialize_with = "base64_string", skip_serializing_if = "Vec::is_empty")]
    pub payment_hash: Vec<u8>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub payment_request: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub dest_features: Vec<i32>,
    #[serde(serialize_with = "base64_map", skip_serializing_if = "BTreeMap::is_empty")]
    pub dest_custom_records: BTreeMap<u64, Vec<u8>>,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct Route {
    #[serde(deserialize_with = "int")]
    pub total_fees_msat: i64,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct SendResponse {
    pub payment_error: String,
    #[serde(deserialize_with = "bytes")]
    pub payment_preimage: Vec<u8>,
    #[serde(deserialize_with = "bytes")]
    pub payment_hash: Vec<u8>,
    pub payment_route: Option<Route>,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct SignMessageResponse {
    pub signature: String,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct NewAddressResponse {
    pub address: String,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct SendCoinsResponse {
    pub txid: String,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct Peer {
    pub pub_key: String,
    pub address: String,
    pub inbound: bool,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct ListPeersResponse {
    pub peers: Vec<Peer>,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct Channel {
    pub active: bool,
    pub remote_pubkey: String,
    pub channel_point: String,
    pub chan_id: String,
    #[serde(deserialize_with = "int")]
    pub capacity: i64,
    #[serde(deserialize_with = "int")]
    pub local_balance: i64,
    #[serde(deserialize_with = "int")]
    pub remote_balance: i64,
    pub private: bool,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct ListChannelsResponse {
    pub channels: Vec<Channel>,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct ChannelPoint {
    #[serde(deserialize_with = "bytes")]
    pub funding_txid_bytes: Vec<u8>,
    pub funding_txid_str: String,
    pub output_index: u32,
}

impl ChannelPoint {
    /// LND hands back the txid bytes in internal (reversed) order.
    pub fn txid(&self) -> String {
        if !self.funding_txid_str.is_empty() {
            return self.funding_txid_str.clone();
        }
        let mut bytes = self.funding_txid_bytes.clone();
        bytes.reverse();
        hex::encode(bytes)
    }
}

#[derive(Serialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct OpenChannelRequest {
    #[serde(serialize_with = "base64_string")]
    pub node_pubkey: Vec<u8>,
    #[serde(serialize_with = "int_string")]
    pub local_funding_amount: i64,
    pub private: bool,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct ErrorResponse {
    #[serde(default)]
    pub code: i32,
    #[serde(default, alias = "error")]
    pub message: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum IntOrString {
    Int(i64),
    Str(String),
}

fn int<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    match IntOrString::deserialize(deserializer)? {
        IntOrString::Int(i) => Ok(i),
        IntOrString::Str(s) if s.is_empty() => Ok(0),
        IntOrString::Str(s) => s.parse().map_err(serde::de::Error::custom),
    }
}

fn bytes<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
    let s = Option::<String>::deserialize(deserializer)?.unwrap_or_default();
    general_purpose::STANDARD
        .decode(s)
        .map_err(serde::de::Error::custom)
}

fn int_string<S: Serializer>(value: &i64, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&value.to_string())
}

fn base64_string<S: Serializer>(value: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&general_purpose::STANDARD.encode(value))
}

fn base64_map<S: Serializer>(
    value: &BTreeMap<u64, Vec<u8>>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_map(
        value
            .iter()
            .map(|(k, v)| (k.to_string(), general_purpose::STANDARD.encode(v))),
    )
}

fn is_zero(value: &i64) -> bool {
    *value == 0
}
