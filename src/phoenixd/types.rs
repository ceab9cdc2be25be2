use serde::Deserialize;

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct InfoResponse {
    pub node_id: String,
    pub chain: Option<String>,
    pub block_height: Option<u32>,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct BalanceResponse {
    pub balance_sat: i64,
    pub fee_credit_sat: i64,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct CreateInvoiceResponse {
    pub amount_sat: i64,
    pub payment_hash: String,
    pub serialized: String,
}

/// Timestamps are unix milliseconds, amounts satoshis.
#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct IncomingPayment {
    pub payment_hash: String,
    pub preimage: String,
    pub external_id: Option<String>,
    pub description: String,
    pub invoice: String,
    pub is_paid: bool,
    pub received_sat: i64,
    pub fees: i64,
    pub completed_at: Option<i64>,
    pub created_at: i64,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct OutgoingPayment {
    pub payment_hash: String,
    pub preimage: String,
    pub invoice: String,
    pub is_paid: bool,
    pub sent: i64,
    pub fees: i64,
    pub completed_at: Option<i64>,
    pub created_at: i64,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct PayResponse {
    pub payment_hash: String,
    pub payment_id: String,
    pub payment_preimage: String,
    pub routing_fee_sat: i64,
}
