mod convert;
mod mint_wallet;
mod wallet;

use std::{path::PathBuf, sync::Arc};

use api::{
    Balances, Channel, CloseChannelRequest, CloseChannelResponse, ConnectPeerRequest,
    KeysendResponse, ListTransactionsParams, MillisatAmount, NetworkGraph, NodeConnectionInfo,
    NodeInfo, NodeStatus, OnchainBalance, OpenChannelRequest, OpenChannelResponse,
    PayInvoiceResponse, PeerDetails, ResetRouterScope, TlvRecord, Transaction,
};
use async_trait::async_trait;
use log::{error, info, warn};
use settings::Settings;
use time::OffsetDateTime;

pub use convert::quote_to_transaction;
pub use mint_wallet::MintWallet;
pub use wallet::{EcashWallet, MeltResult, Quote, QuoteKind, WalletError};

use crate::{
    bolt11,
    lnclient::{
        balances, timed, validate, LnClient, LnClientError, Result, INVOICE_TIMEOUT,
        PAYMENT_TIMEOUT, READ_TIMEOUT,
    },
    transactions::{paginate_locally, sat_to_msat},
};

const BACKEND: &str = "CASHU";

pub const DEFAULT_MINT_URL: &str = "https://8333.space:3338";

/// Unpaid mint quotes older than this are no longer checked with the mint.
pub const MINT_CHECK_WINDOW_SECS: i64 = 24 * 60 * 60;

/// Ecash backend. Invoices are mint quotes and settle when the wallet claims the tokens,
/// which happens lazily on lookup and listing.
pub struct CashuClient {
    wallet: Arc<dyn EcashWallet>,
}

impl CashuClient {
    pub fn new(wallet: Arc<dyn EcashWallet>) -> CashuClient {
        CashuClient { wallet }
    }

    pub async fn connect(settings: &Settings) -> anyhow::Result<CashuClient> {
        let mint_url = if settings.cashu_mint_url.is_empty() {
            DEFAULT_MINT_URL
        } else {
            settings.cashu_mint_url.as_str()
        };
        info!("Setting up cashu wallet for mint {mint_url}");
        let wallet = MintWallet::load(settings.cashu_dir(), mint_url).await?;
        Ok(CashuClient::new(Arc::new(wallet)))
    }

    async fn find_quote(&self, operation: &'static str, payment_hash: &str) -> Result<Quote> {
        self.wallet
            .quote_by_payment_hash(payment_hash)
            .await
            .map_err(|e| wallet_error(operation, e).with_payment_hash(payment_hash))?
            .ok_or_else(|| {
                LnClientError::rejected(operation, "no invoice with this payment hash")
                    .with_payment_hash(payment_hash)
            })
    }

    /// Claim the tokens of a young unpaid mint quote if the mint says it was paid.
    /// Failures are only logged: the caller's read goes ahead with what is stored.
    /// A claim still running when the wait ends keeps going and settles the quote for
    /// a later read.
    async fn check_quote(&self, quote: &Quote) {
        info!("Checking unpaid invoice {}", quote.payment_hash);
        match tokio::time::timeout(READ_TIMEOUT, self.wallet.mint_tokens(&quote.id)).await {
            Ok(Ok(Some(amount))) => info!(
                "Minted {amount} sat for invoice {}",
                quote.payment_hash
            ),
            Ok(Ok(None)) => (),
            Ok(Err(e)) => warn!("Failed to mint for invoice {}: {e}", quote.payment_hash),
            Err(_) => warn!(
                "Mint did not answer for invoice {} within {}s",
                quote.payment_hash,
                READ_TIMEOUT.as_secs()
            ),
        }
    }
}

fn needs_check(quote: &Quote, now: i64) -> bool {
    quote.kind == QuoteKind::Mint && !quote.paid && now - quote.created_at < MINT_CHECK_WINDOW_SECS
}

fn now() -> i64 {
    OffsetDateTime::now_utc().unix_timestamp()
}

fn wallet_error(operation: &'static str, error: WalletError) -> LnClientError {
    match error {
        WalletError::Mint(_)
        | WalletError::InsufficientFunds { .. }
        | WalletError::QuoteNotFound(_) => LnClientError::rejected(operation, error.to_string()),
        WalletError::Invoice(e) => LnClientError::decode(operation, e),
        e => LnClientError::transport(operation, e),
    }
}

#[async_trait]
impl LnClient for CashuClient {
    async fn get_info(&self) -> Result<NodeInfo> {
        Ok(NodeInfo {
            alias: "NWC (Cashu)".to_string(),
            color: "#897FFF".to_string(),
            pubkey: String::new(),
            network: "bitcoin".to_string(),
            block_height: 0,
            block_hash: String::new(),
        })
    }

    async fn get_balance(&self) -> Result<MillisatAmount> {
        const OPERATION: &str = "get_balance";
        let balances = timed(OPERATION, READ_TIMEOUT, async {
            self.wallet
                .balance_by_mint()
                .await
                .map_err(|e| wallet_error(OPERATION, e))
        })
        .await?;
        let total: u64 = balances.values().sum();
        Ok(sat_to_msat(total as i64))
    }

    async fn get_balances(&self) -> Result<Balances> {
        Ok(balances::from_lightning_balance(self.get_balance().await?))
    }

    async fn make_invoice(
        &self,
        amount_msat: MillisatAmount,
        _description: &str,
        description_hash: &str,
        _expiry: i64,
    ) -> Result<Transaction> {
        const OPERATION: &str = "make_invoice";
        validate::optional_hex32(OPERATION, "description hash", description_hash)?;
        let amount_sat = amount_msat / 1000;
        if amount_sat < 1 {
            return Err(LnClientError::validation(
                OPERATION,
                format!("amount must be at least 1 sat, got {amount_msat} msat"),
            ));
        }
        let quote = timed(OPERATION, INVOICE_TIMEOUT, async {
            self.wallet
                .request_mint(amount_sat as u64)
                .await
                .map_err(|e| wallet_error(OPERATION, e))
        })
        .await?;
        info!(
            "Created mint quote {} for {amount_sat} sat with payment hash {}",
            quote.id, quote.payment_hash
        );
        quote_to_transaction(&quote).map_err(|e| LnClientError::decode(OPERATION, e))
    }

    async fn lookup_invoice(&self, payment_hash: &str) -> Result<Transaction> {
        const OPERATION: &str = "lookup_invoice";
        validate::hex32(OPERATION, "payment hash", payment_hash)?;
        let mut quote = self.find_quote(OPERATION, payment_hash).await?;
        if needs_check(&quote, now()) {
            self.check_quote(&quote).await;
            quote = self.find_quote(OPERATION, payment_hash).await?;
        }
        quote_to_transaction(&quote).map_err(|e| LnClientError::decode(OPERATION, e))
    }

    async fn list_transactions(&self, params: ListTransactionsParams) -> Result<Vec<Transaction>> {
        const OPERATION: &str = "list_transactions";
        let mut quotes = self
            .wallet
            .quotes()
            .await
            .map_err(|e| wallet_error(OPERATION, e))?;
        let now = now();
        let unpaid: Vec<&Quote> = quotes.iter().filter(|q| needs_check(q, now)).collect();
        if !unpaid.is_empty() {
            for quote in unpaid {
                self.check_quote(quote).await;
            }
            quotes = self
                .wallet
                .quotes()
                .await
                .map_err(|e| wallet_error(OPERATION, e))?;
        }
        let transactions = quotes
            .iter()
            .filter_map(|quote| match quote_to_transaction(quote) {
                Ok(transaction) => Some(transaction),
                Err(e) => {
                    warn!("Skipping quote {}: {e}", quote.id);
                    None
                }
            })
            .collect();
        Ok(paginate_locally(transactions, &params))
    }

    async fn send_payment_sync(&self, invoice: &str) -> Result<PayInvoiceResponse> {
        const OPERATION: &str = "send_payment_sync";
        let decoded = bolt11::decode(invoice).map_err(|e| LnClientError::decode(OPERATION, e))?;
        let result = timed(OPERATION, PAYMENT_TIMEOUT, async {
            self.wallet
                .melt(invoice)
                .await
                .map_err(|e| wallet_error(OPERATION, e))
        })
        .await
        .and_then(|melt| {
            if melt.preimage.is_empty() {
                Err(LnClientError::rejected(OPERATION, "no preimage in melt response"))
            } else {
                Ok(melt)
            }
        });
        let melt = match result {
            Ok(melt) => melt,
            Err(e) => {
                let e = e.with_payment_hash(&decoded.payment_hash);
                error!("{e}");
                return Err(e);
            }
        };
        let fee = match self.wallet.quote_by_payment_request(invoice).await {
            Ok(Some(quote)) => quote_to_transaction(&quote).ok().map(|t| t.fees_paid),
            Ok(None) => None,
            Err(e) => {
                warn!("Paid invoice {} but could not read its quote: {e}", decoded.payment_hash);
                None
            }
        };
        info!(
            "Paid invoice {} ({} msat) with ecash",
            decoded.payment_hash, decoded.amount_msat
        );
        Ok(PayInvoiceResponse {
            preimage: melt.preimage,
            fee,
        })
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
        Err(LnClientError::unsupported("get_node_connection_info", BACKEND))
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
        Ok(Some(self.wallet.work_dir().to_path_buf()))
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
