pub mod balances;
mod error;
pub mod validate;

use std::{future::Future, path::PathBuf, time::Duration};

use anyhow::anyhow;
use api::{
    Balances, Channel, CloseChannelRequest, CloseChannelResponse, ConnectPeerRequest,
    KeysendResponse, ListTransactionsParams, MillisatAmount, NetworkGraph, NodeConnectionInfo,
    NodeInfo, NodeStatus, OnchainBalance, OpenChannelRequest, OpenChannelResponse,
    PayInvoiceResponse, PeerDetails, ResetRouterScope, TlvRecord, Transaction,
};
use async_trait::async_trait;

pub use error::{LnClientError, Result};

/// Info, balance and lookup calls.
pub const READ_TIMEOUT: Duration = Duration::from_secs(5);
pub const INVOICE_TIMEOUT: Duration = Duration::from_secs(10);
/// Multi-hop routing can be slow.
pub const PAYMENT_TIMEOUT: Duration = Duration::from_secs(90);
/// Peer, channel and onchain management.
pub const MANAGEMENT_TIMEOUT: Duration = Duration::from_secs(30);

/// The one contract every lightning backend is bound to.
///
/// Implementations are stateless facades: each call is answered live from the backend
/// and amounts come back in millisatoshis, timestamps in unix seconds. Calls can be
/// cancelled by dropping the returned future, which aborts the in-flight request.
/// Nothing is retried; a failed payment call must be re-issued by the caller if at all.
///
/// Operations a backend has no way to perform fail with
/// [`LnClientError::UnsupportedOperation`] rather than returning an empty value.
#[async_trait]
pub trait LnClient: Send + Sync {
    async fn get_info(&self) -> Result<NodeInfo>;

    /// Spendable lightning balance in msat.
    async fn get_balance(&self) -> Result<MillisatAmount>;

    async fn get_balances(&self) -> Result<Balances>;

    /// `description_hash` is hex and may be empty. An `expiry` of zero leaves the
    /// backend default in place.
    async fn make_invoice(
        &self,
        amount_msat: MillisatAmount,
        description: &str,
        description_hash: &str,
        expiry: i64,
    ) -> Result<Transaction>;

    /// Read an incoming invoice by payment hash.
    ///
    /// This is not a pure read on every backend: the ecash backend checks young unpaid
    /// mint quotes with the mint and mints the tokens when the quote has been paid.
    async fn lookup_invoice(&self, payment_hash: &str) -> Result<Transaction>;

    /// Newest first. The incoming and outgoing legs are windowed independently by the
    /// backend, so the result can hold more or fewer than `limit` entries. May mint
    /// tokens on the ecash backend, like [`LnClient::lookup_invoice`].
    async fn list_transactions(&self, params: ListTransactionsParams) -> Result<Vec<Transaction>>;

    async fn send_payment_sync(&self, invoice: &str) -> Result<PayInvoiceResponse>;

    async fn send_keysend(
        &self,
        amount_msat: MillisatAmount,
        destination: &str,
        preimage: Option<&str>,
        custom_records: &[TlvRecord],
    ) -> Result<KeysendResponse>;

    async fn get_node_connection_info(&self) -> Result<NodeConnectionInfo>;

    async fn connect_peer(&self, request: ConnectPeerRequest) -> Result<()>;

    async fn disconnect_peer(&self, peer_id: &str) -> Result<()>;

    async fn list_peers(&self) -> Result<Vec<PeerDetails>>;

    async fn list_channels(&self) -> Result<Vec<Channel>>;

    async fn open_channel(&self, request: OpenChannelRequest) -> Result<OpenChannelResponse>;

    async fn close_channel(&self, request: CloseChannelRequest) -> Result<CloseChannelResponse>;

    async fn get_new_onchain_address(&self) -> Result<String>;

    async fn get_onchain_balance(&self) -> Result<OnchainBalance>;

    /// Sweep the whole onchain wallet to `to_address`, returning the txid.
    async fn redeem_onchain_funds(&self, to_address: &str) -> Result<String>;

    async fn send_payment_probes(&self, invoice: &str) -> Result<()>;

    async fn send_spontaneous_payment_probes(
        &self,
        amount_msat: MillisatAmount,
        node_id: &str,
    ) -> Result<()>;

    async fn sign_message(&self, message: &str) -> Result<String>;

    /// Drop cached routing state. Called by the backup subsystem before archiving.
    async fn reset_router(&self, scope: ResetRouterScope) -> Result<()>;

    /// Directory holding node-local files that belong in a backup, if the backend keeps any.
    fn get_storage_dir(&self) -> Result<Option<PathBuf>>;

    async fn get_network_graph(&self, node_ids: &[String]) -> Result<NetworkGraph>;

    async fn get_node_status(&self) -> Result<NodeStatus>;

    async fn get_log_output(&self, max_len: usize) -> Result<Vec<u8>>;

    /// Hint that a client wants fresh onchain data soon.
    fn update_last_wallet_sync_request(&self) {}

    async fn shutdown(&self) -> Result<()>;
}

/// Bound a backend call by its operation budget. Expiry is a transport failure.
pub async fn timed<T, F>(operation: &'static str, budget: Duration, future: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(budget, future).await {
        Ok(result) => result,
        Err(_) => Err(LnClientError::transport(
            operation,
            anyhow!("no response within {}s", budget.as_secs()),
        )),
    }
}
