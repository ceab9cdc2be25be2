mod convert;
pub mod types;

use std::path::PathBuf;

use anyhow::{anyhow, Context};
use api::{
    Balances, Channel, CloseChannelRequest, CloseChannelResponse, ConnectPeerRequest,
    KeysendResponse, ListTransactionsParams, MillisatAmount, NetworkGraph, NodeConnectionInfo,
    NodeInfo, NodeStatus, OnchainBalance, OpenChannelRequest, OpenChannelResponse,
    PayInvoiceResponse, PeerDetails, ResetRouterScope, TlvRecord, Transaction, TransactionType,
};
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine};
use log::{debug, error, info};
use reqwest::{header::AUTHORIZATION, Client, Method, RequestBuilder};
use serde::de::DeserializeOwned;
use settings::Settings;
use time::{OffsetDateTime, UtcOffset};

pub use convert::{incoming_to_transaction, outgoing_to_transaction};
use types::{
    BalanceResponse, CreateInvoiceResponse, IncomingPayment, InfoResponse, OutgoingPayment,
    PayResponse,
};

use crate::{
    bolt11,
    lnclient::{
        balances, timed, validate, LnClient, LnClientError, Result, INVOICE_TIMEOUT,
        PAYMENT_TIMEOUT, READ_TIMEOUT,
    },
    transactions::{merge_transactions, sat_to_msat},
};

const BACKEND: &str = "PHOENIX";

/// The invoice external id is the UTC calendar date the invoice was created on.
/// phoenixd can only list incoming payments efficiently by external id, so queries
/// must format the date exactly the same way.
pub fn external_id(at: OffsetDateTime) -> String {
    let date = at.to_offset(UtcOffset::UTC).date();
    format!(
        "{:04}-{:02}-{:02}",
        date.year(),
        u8::from(date.month()),
        date.day()
    )
}

/// The external id covering a whole `[from, until]` window, if it falls on one UTC day.
fn window_external_id(from: u64, until: u64) -> Option<String> {
    if from == 0 || until == 0 {
        return None;
    }
    let from = OffsetDateTime::from_unix_timestamp(from as i64).ok()?;
    let until = OffsetDateTime::from_unix_timestamp(until as i64).ok()?;
    let day = external_id(from);
    (day == external_id(until)).then_some(day)
}

/// A phoenixd daemon reached over its HTTP API.
pub struct PhoenixdClient {
    address: String,
    authorization: String,
    client: Client,
}

impl PhoenixdClient {
    pub fn new(address: &str, password: &str) -> anyhow::Result<PhoenixdClient> {
        let credentials = general_purpose::STANDARD.encode(format!(":{password}"));
        Ok(PhoenixdClient {
            address: address.trim_end_matches('/').to_string(),
            authorization: format!("Basic {credentials}"),
            client: Client::builder().build()?,
        })
    }

    pub async fn connect(settings: &Settings) -> anyhow::Result<PhoenixdClient> {
        let address = settings
            .phoenixd_address
            .as_deref()
            .context("phoenixd address is required for the PHOENIX backend")?;
        let password = settings
            .phoenixd_authorization
            .as_deref()
            .context("phoenixd authorization is required for the PHOENIX backend")?;
        let client = PhoenixdClient::new(address, password)?;
        let info = client.get_info().await?;
        info!("Connected to phoenixd node {} at {address}", info.pubkey);
        Ok(client)
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}{}", self.address, path))
            .header(AUTHORIZATION, &self.authorization)
    }

    async fn send<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        request: RequestBuilder,
    ) -> Result<T> {
        let response = request
            .send()
            .await
            .map_err(|e| LnClientError::transport(operation, e))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| LnClientError::transport(operation, e))?;
        if !status.is_success() {
            return Err(LnClientError::rejected(
                operation,
                format!("{status}: {body}"),
            ));
        }
        serde_json::from_str(&body).map_err(|e| {
            LnClientError::transport(operation, anyhow!("unexpected response {body}: {e}"))
        })
    }

    async fn get<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        debug!("GET {path} {query:?}");
        self.send(operation, self.request(Method::GET, path).query(query))
            .await
    }

    async fn post_form<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        path: &str,
        form: &[(&str, String)],
    ) -> Result<T> {
        self.send(operation, self.request(Method::POST, path).form(form))
            .await
    }

    async fn list_incoming(&self, params: &ListTransactionsParams) -> Result<Vec<Transaction>> {
        const OPERATION: &str = "list_transactions";
        if !params.includes(TransactionType::Incoming) {
            return Ok(vec![]);
        }
        let mut query = window_query(params);
        if let Some(external_id) = window_external_id(params.from, params.until) {
            query.push(("externalId", external_id));
        }
        let payments: Vec<IncomingPayment> = timed(
            OPERATION,
            READ_TIMEOUT,
            self.get(OPERATION, "/payments/incoming", &query),
        )
        .await?;
        payments
            .iter()
            .map(|payment| {
                incoming_to_transaction(payment).map_err(|e| LnClientError::decode(OPERATION, e))
            })
            .collect()
    }

    async fn list_outgoing(&self, params: &ListTransactionsParams) -> Result<Vec<Transaction>> {
        const OPERATION: &str = "list_transactions";
        if !params.includes(TransactionType::Outgoing) {
            return Ok(vec![]);
        }
        let query = window_query(params);
        let payments: Vec<OutgoingPayment> = timed(
            OPERATION,
            READ_TIMEOUT,
            self.get(OPERATION, "/payments/outgoing", &query),
        )
        .await?;
        let mut transactions = vec![];
        for payment in &payments {
            let transaction = outgoing_to_transaction(payment)
                .map_err(|e| LnClientError::decode(OPERATION, e))?;
            transactions.extend(transaction);
        }
        Ok(transactions)
    }
}

/// phoenixd windows by milliseconds and returns unpaid records only when asked for `all`.
fn window_query(params: &ListTransactionsParams) -> Vec<(&'static str, String)> {
    let mut query = vec![];
    if params.from > 0 {
        query.push(("from", (params.from * 1000).to_string()));
    }
    if params.until > 0 {
        query.push(("to", (params.until * 1000).to_string()));
    }
    if params.limit > 0 {
        query.push(("limit", params.limit.to_string()));
    }
    if params.offset > 0 {
        query.push(("offset", params.offset.to_string()));
    }
    query.push(("all", params.unpaid.to_string()));
    query
}

#[async_trait]
impl LnClient for PhoenixdClient {
    async fn get_info(&self) -> Result<NodeInfo> {
        const OPERATION: &str = "get_info";
        let info: InfoResponse =
            timed(OPERATION, READ_TIMEOUT, self.get(OPERATION, "/getinfo", &[])).await?;
        let network = match info.chain.as_deref() {
            None | Some("mainnet") => "bitcoin".to_string(),
            Some(chain) => chain.to_string(),
        };
        Ok(NodeInfo {
            alias: "Phoenix".to_string(),
            color: String::new(),
            pubkey: info.node_id,
            network,
            block_height: info.block_height.unwrap_or_default(),
            block_hash: String::new(),
        })
    }

    async fn get_balance(&self) -> Result<MillisatAmount> {
        const OPERATION: &str = "get_balance";
        let balance: BalanceResponse = timed(
            OPERATION,
            READ_TIMEOUT,
            self.get(OPERATION, "/getbalance", &[]),
        )
        .await?;
        Ok(sat_to_msat(balance.balance_sat + balance.fee_credit_sat))
    }

    async fn get_balances(&self) -> Result<Balances> {
        Ok(balances::from_lightning_balance(self.get_balance().await?))
    }

    async fn make_invoice(
        &self,
        amount_msat: MillisatAmount,
        description: &str,
        description_hash: &str,
        expiry: i64,
    ) -> Result<Transaction> {
        const OPERATION: &str = "make_invoice";
        validate::optional_hex32(OPERATION, "description hash", description_hash)?;
        let today = external_id(OffsetDateTime::now_utc());
        // phoenixd takes whole sats, a sub-sat remainder is dropped
        let mut form = vec![("amountSat", (amount_msat / 1000).to_string())];
        if !description_hash.is_empty() {
            form.push(("descriptionHash", description_hash.to_string()));
        } else if !description.is_empty() {
            form.push(("description", description.to_string()));
        } else {
            form.push(("description", "invoice".to_string()));
        }
        if expiry > 0 {
            form.push(("expirySeconds", expiry.to_string()));
        }
        form.push(("externalId", today.clone()));

        let created: CreateInvoiceResponse = timed(
            OPERATION,
            INVOICE_TIMEOUT,
            self.post_form(OPERATION, "/createinvoice", &form),
        )
        .await?;
        let decoded =
            bolt11::decode(&created.serialized).map_err(|e| LnClientError::decode(OPERATION, e))?;
        info!(
            "Created invoice {} for {} sat with external id {today}",
            created.payment_hash, created.amount_sat
        );
        Ok(Transaction {
            transaction_type: TransactionType::Incoming,
            invoice: created.serialized,
            description: decoded.description.clone(),
            description_hash: decoded.description_hash.clone(),
            preimage: None,
            payment_hash: created.payment_hash,
            amount: sat_to_msat(created.amount_sat),
            fees_paid: 0,
            created_at: decoded.created_at,
            expires_at: decoded.expires_at(),
            settled_at: None,
            metadata: Some(serde_json::json!({ "external_id": today })),
        })
    }

    async fn lookup_invoice(&self, payment_hash: &str) -> Result<Transaction> {
        const OPERATION: &str = "lookup_invoice";
        validate::hex32(OPERATION, "payment hash", payment_hash)?;
        let payment: IncomingPayment = timed(
            OPERATION,
            READ_TIMEOUT,
            self.get(OPERATION, &format!("/payments/incoming/{payment_hash}"), &[]),
        )
        .await
        .map_err(|e| e.with_payment_hash(payment_hash))?;
        incoming_to_transaction(&payment).map_err(|e| LnClientError::decode(OPERATION, e))
    }

    async fn list_transactions(&self, params: ListTransactionsParams) -> Result<Vec<Transaction>> {
        let (incoming, outgoing) =
            futures::try_join!(self.list_incoming(&params), self.list_outgoing(&params))?;
        Ok(merge_transactions(incoming, outgoing))
    }

    async fn send_payment_sync(&self, invoice: &str) -> Result<PayInvoiceResponse> {
        const OPERATION: &str = "send_payment_sync";
        let decoded = bolt11::decode(invoice).map_err(|e| LnClientError::decode(OPERATION, e))?;
        let form = [("invoice", invoice.to_string())];
        let result: Result<PayResponse> = timed(
            OPERATION,
            PAYMENT_TIMEOUT,
            self.post_form(OPERATION, "/payinvoice", &form),
        )
        .await;
        let result = result.and_then(|response| {
            if response.payment_preimage.is_empty() {
                Err(LnClientError::rejected(
                    OPERATION,
                    "payment completed without a preimage",
                ))
            } else {
                Ok(response)
            }
        });
        match result {
            Ok(response) => {
                info!(
                    "Paid invoice {} ({} msat, fee {} sat)",
                    decoded.payment_hash, decoded.amount_msat, response.routing_fee_sat
                );
                Ok(PayInvoiceResponse {
                    preimage: response.payment_preimage,
                    fee: Some(sat_to_msat(response.routing_fee_sat)),
                })
            }
            Err(e) => {
                let e = e.with_payment_hash(&decoded.payment_hash);
                error!("{e}");
                Err(e)
            }
        }
    }

    async fn send_keysend(
        &self,
        _amount_msat: MillisatAmount,
        _destination: &str,
        _preimage: Option<&str>,
        _custom_records: &[TlvRecord],
    ) -> Result<KeysendResponse> {
        Err(LnClientError::unsupported("send_keysend", BACKEND))
    }

    async fn get_node_connection_info(&self) -> Result<NodeConnectionInfo> {
        let info = self.get_info().await?;
        Ok(NodeConnectionInfo {
            pubkey: info.pubkey,
            address: String::new(),
            port: 0,
        })
    }

    async fn connect_peer(&self, _request: ConnectPeerRequest) -> Result<()> {
        Err(LnClientError::unsupported("connect_peer", BACKEND))
    }

    async fn disconnect_peer(&self, _peer_id: &str) -> Result<()> {
        Err(LnClientError::unsupported("disconnect_peer", BACKEND))
    }

    async fn list_peers(&self) -> Result<Vec<PeerDetails>> {
        Err(LnClientError::unsupported("list_peers", BACKEND))
    }

    async fn list_channels(&self) -> Result<Vec<Channel>> {
        Err(LnClientError::unsupported("list_channels", BACKEND))
    }

    async fn open_channel(&self, _request: OpenChannelRequest) -> Result<OpenChannelResponse> {
        Err(LnClientError::unsupported("open_channel", BACKEND))
    }

    async fn close_channel(&self, _request: CloseChannelRequest) -> Result<CloseChannelResponse> {
        Err(LnClientError::unsupported("close_channel", BACKEND))
    }

    async fn get_new_onchain_address(&self) -> Result<String> {
        Err(LnClientError::unsupported("get_new_onchain_address", BACKEND))
    }

    async fn get_onchain_balance(&self) -> Result<OnchainBalance> {
        Err(LnClientError::unsupported("get_onchain_balance", BACKEND))
    }

    async fn redeem_onchain_funds(&self, _to_address: &str) -> Result<String> {
        Err(LnClientError::unsupported("redeem_onchain_funds", BACKEND))
    }

    async fn send_payment_probes(&self, _invoice: &str) -> Result<()> {
        Err(LnClientError::unsupported("send_payment_probes", BACKEND))
    }

    async fn send_spontaneous_payment_probes(
        &self,
        _amount_msat: MillisatAmount,
        _node_id: &str,
    ) -> Result<()> {
        Err(LnClientError::unsupported(
            "send_spontaneous_payment_probes",
            BACKEND,
        ))
    }

    async fn sign_message(&self, _message: &str) -> Result<String> {
        Err(LnClientError::unsupported("sign_message", BACKEND))
    }

    async fn reset_router(&self, _scope: ResetRouterScope) -> Result<()> {
        Err(LnClientError::unsupported("reset_router", BACKEND))
    }

    fn get_storage_dir(&self) -> Result<Option<PathBuf>> {
        Ok(None)
    }

    async fn get_network_graph(&self, _node_ids: &[String]) -> Result<NetworkGraph> {
        Err(LnClientError::unsupported("get_network_graph", BACKEND))
    }

    async fn get_node_status(&self) -> Result<NodeStatus> {
        Err(LnClientError::unsupported("get_node_status", BACKEND))
    }

    async fn get_log_output(&self, _max_len: usize) -> Result<Vec<u8>> {
        Err(LnClientError::unsupported("get_log_output", BACKEND))
    }

    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }
}
