mod convert;
pub mod rpc;
pub mod types;

use std::{future::Future, path::PathBuf, sync::Arc, time::Duration};

use anyhow::Context;
use api::{
    Balances, Channel, CloseChannelRequest, CloseChannelResponse, ConnectPeerRequest,
    KeysendResponse, ListTransactionsParams, MillisatAmount, NetworkGraph, NodeConnectionInfo,
    NodeInfo, NodeStatus, OnchainBalance, OpenChannelRequest, OpenChannelResponse,
    PayInvoiceResponse, PeerDetails, ResetRouterScope, TlvRecord, Transaction, TransactionType,
};
use async_trait::async_trait;
use log::{error, info};
use settings::Settings;

pub use convert::{invoice_to_transaction, payment_to_transaction};
use rpc::{LndRestClient, LndRpc, RpcError, RpcResult};
use types::{
    AddInvoiceRequest, InvoiceState, ListInvoiceRequest, ListPaymentsRequest, SendRequest,
    SendResponse, TLV_ONION_REQ,
};

use crate::{
    bolt11::{self, DecodeError},
    keysend::KeysendPayment,
    lnclient::{
        balances, timed, validate, LnClient, LnClientError, Result, INVOICE_TIMEOUT,
        MANAGEMENT_TIMEOUT, PAYMENT_TIMEOUT, READ_TIMEOUT,
    },
    transactions::{merge_transactions, sat_to_msat},
};

const BACKEND: &str = "LND";

/// Full node backend. Owns the one RPC handle it was built with.
pub struct LndClient {
    rpc: Arc<dyn LndRpc>,
}

impl LndClient {
    pub fn new(rpc: Arc<dyn LndRpc>) -> LndClient {
        LndClient { rpc }
    }

    pub async fn connect(settings: &Settings) -> anyhow::Result<LndClient> {
        let address = settings
            .lnd_address
            .as_deref()
            .context("lnd address is required for the LND backend")?;
        let cert = settings
            .lnd_cert_file
            .as_deref()
            .context("lnd cert file is required for the LND backend")?;
        let macaroon = settings
            .lnd_macaroon_file
            .as_deref()
            .context("lnd macaroon file is required for the LND backend")?;
        let client = LndClient::new(Arc::new(LndRestClient::new(address, cert, macaroon)?));
        let info = client.get_info().await?;
        info!(
            "Connected to LND node {} ({}) on {}",
            info.alias, info.pubkey, info.network
        );
        Ok(client)
    }

    async fn list_incoming(&self, params: &ListTransactionsParams) -> Result<Vec<Transaction>> {
        if !params.includes(TransactionType::Incoming) {
            return Ok(vec![]);
        }
        let request = ListInvoiceRequest {
            num_max_invoices: params.limit,
            index_offset: params.offset,
            reversed: true,
            pending_only: false,
            creation_date_start: params.from,
            creation_date_end: params.until,
        };
        let response = call(
            "list_transactions",
            READ_TIMEOUT,
            self.rpc.list_invoices(request),
        )
        .await?;
        Ok(response
            .invoices
            .iter()
            .filter(|invoice| params.unpaid || invoice.state == InvoiceState::Settled)
            .map(invoice_to_transaction)
            .collect())
    }

    async fn list_outgoing(&self, params: &ListTransactionsParams) -> Result<Vec<Transaction>> {
        if !params.includes(TransactionType::Outgoing) {
            return Ok(vec![]);
        }
        let request = ListPaymentsRequest {
            max_payments: params.limit,
            index_offset: params.offset,
            reversed: true,
            include_incomplete: params.unpaid,
            creation_date_start: params.from,
            creation_date_end: params.until,
        };
        let response = call(
            "list_transactions",
            READ_TIMEOUT,
            self.rpc.list_payments(request),
        )
        .await?;
        let mut transactions = vec![];
        for payment in &response.payments {
            let transaction = payment_to_transaction(payment)
                .map_err(|e| LnClientError::decode("list_transactions", e))?;
            transactions.extend(transaction);
        }
        Ok(transactions)
    }
}

#[async_trait]
impl LnClient for LndClient {
    async fn get_info(&self) -> Result<NodeInfo> {
        let info = call("get_info", READ_TIMEOUT, self.rpc.get_info()).await?;
        Ok(NodeInfo {
            alias: info.alias,
            color: info.color,
            pubkey: info.identity_pubkey,
            network: info
                .chains
                .first()
                .map(|chain| chain.network.clone())
                .unwrap_or_default(),
            block_height: info.block_height,
            block_hash: info.block_hash,
        })
    }

    async fn get_balance(&self) -> Result<MillisatAmount> {
        let balance = call("get_balance", READ_TIMEOUT, self.rpc.channel_balance()).await?;
        Ok(balance.local_balance.msat)
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
        let description_hash =
            validate::optional_hex32(OPERATION, "description hash", description_hash)?;
        let request = AddInvoiceRequest {
            value_msat: amount_msat,
            memo: description.to_string(),
            description_hash: description_hash.map(|h| h.to_vec()).unwrap_or_default(),
            expiry,
        };
        let invoice = timed(OPERATION, INVOICE_TIMEOUT, async {
            let added = self
                .rpc
                .add_invoice(request)
                .await
                .map_err(|e| rpc_error(OPERATION, e))?;
            let payment_hash = hex::encode(&added.r_hash);
            let invoice = self.rpc.lookup_invoice(&payment_hash).await;
            invoice.map_err(|e| rpc_error(OPERATION, e).with_payment_hash(payment_hash))
        })
        .await?;
        let transaction = invoice_to_transaction(&invoice);
        info!(
            "Created invoice {} for {} msat",
            transaction.payment_hash, transaction.amount
        );
        Ok(transaction)
    }

    async fn lookup_invoice(&self, payment_hash: &str) -> Result<Transaction> {
        const OPERATION: &str = "lookup_invoice";
        validate::hex32(OPERATION, "payment hash", payment_hash)?;
        let invoice = call(OPERATION, READ_TIMEOUT, self.rpc.lookup_invoice(payment_hash))
            .await
            .map_err(|e| e.with_payment_hash(payment_hash))?;
        Ok(invoice_to_transaction(&invoice))
    }

    async fn list_transactions(&self, params: ListTransactionsParams) -> Result<Vec<Transaction>> {
        let (incoming, outgoing) =
            futures::try_join!(self.list_incoming(&params), self.list_outgoing(&params))?;
        Ok(merge_transactions(incoming, outgoing))
    }

    async fn send_payment_sync(&self, invoice: &str) -> Result<PayInvoiceResponse> {
        const OPERATION: &str = "send_payment_sync";
        let decoded = bolt11::decode(invoice).map_err(|e| LnClientError::decode(OPERATION, e))?;
        let request = SendRequest {
            payment_request: invoice.to_string(),
            ..Default::default()
        };
        let result = call(OPERATION, PAYMENT_TIMEOUT, self.rpc.send_payment_sync(request))
            .await
            .and_then(|response| payment_result(OPERATION, response));
        match result {
            Ok(response) => {
                info!(
                    "Paid invoice {} ({} msat, fee {} msat)",
                    decoded.payment_hash,
                    decoded.amount_msat,
                    response.fee.unwrap_or_default()
                );
                Ok(PayInvoiceResponse {
                    preimage: response.preimage,
                    fee: response.fee,
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
        amount_msat: MillisatAmount,
        destination: &str,
        preimage: Option<&str>,
        custom_records: &[TlvRecord],
    ) -> Result<KeysendResponse> {
        const OPERATION: &str = "send_keysend";
        let payment = KeysendPayment::new(amount_msat, destination, preimage, custom_records)?;
        let request = SendRequest {
            dest: payment.destination.serialize().to_vec(),
            amt_msat: payment.amount_msat,
            payment_hash: payment.payment_hash.0.to_vec(),
            dest_features: vec![TLV_ONION_REQ],
            dest_custom_records: payment.custom_records.clone(),
            ..Default::default()
        };
        let result = call(OPERATION, PAYMENT_TIMEOUT, self.rpc.send_payment_sync(request))
            .await
            .and_then(|response| payment_result(OPERATION, response));
        match result {
            Ok(_) => {
                info!(
                    "Keysend of {} msat to {} succeeded with payment hash {}",
                    amount_msat,
                    destination,
                    payment.payment_hash_hex()
                );
                Ok(KeysendResponse {
                    preimage: payment.preimage_hex(),
                    payment_hash: payment.payment_hash_hex(),
                })
            }
            Err(e) => {
                let e = e.with_payment_hash(payment.payment_hash_hex());
                error!("{e}");
                Err(e)
            }
        }
    }

    async fn get_node_connection_info(&self) -> Result<NodeConnectionInfo> {
        const OPERATION: &str = "get_node_connection_info";
        let info = call(OPERATION, READ_TIMEOUT, self.rpc.get_info()).await?;
        let (address, port) = match info.uris.first() {
            Some(uri) => match uri.split_once('@').and_then(|(_, host)| host.rsplit_once(':')) {
                Some((address, port)) => {
                    let port = port.parse().map_err(|e| {
                        LnClientError::decode(
                            OPERATION,
                            DecodeError {
                                input: uri.clone(),
                                message: format!("invalid port: {e}"),
                            },
                        )
                    })?;
                    (address.to_string(), port)
                }
                None => Default::default(),
            },
            None => Default::default(),
        };
        Ok(NodeConnectionInfo {
            pubkey: info.identity_pubkey,
            address,
            port,
        })
    }

    async fn connect_peer(&self, request: ConnectPeerRequest) -> Result<()> {
        const OPERATION: &str = "connect_peer";
        validate::public_key(OPERATION, &request.pubkey)?;
        let host = format!("{}:{}", request.address, request.port);
        call(
            OPERATION,
            MANAGEMENT_TIMEOUT,
            self.rpc.connect_peer(&request.pubkey, &host),
        )
        .await
    }

    async fn disconnect_peer(&self, peer_id: &str) -> Result<()> {
        const OPERATION: &str = "disconnect_peer";
        validate::public_key(OPERATION, peer_id)?;
        call(OPERATION, MANAGEMENT_TIMEOUT, self.rpc.disconnect_peer(peer_id)).await
    }

    async fn list_peers(&self) -> Result<Vec<PeerDetails>> {
        let response = call("list_peers", READ_TIMEOUT, self.rpc.list_peers()).await?;
        Ok(response
            .peers
            .into_iter()
            .map(|peer| PeerDetails {
                node_id: peer.pub_key,
                address: peer.address,
                is_persisted: false,
                is_connected: true,
            })
            .collect())
    }

    async fn list_channels(&self) -> Result<Vec<Channel>> {
        let response = call("list_channels", READ_TIMEOUT, self.rpc.list_channels()).await?;
        Ok(response
            .channels
            .into_iter()
            .map(|channel| Channel {
                id: channel.channel_point,
                remote_pubkey: channel.remote_pubkey,
                local_balance: sat_to_msat(channel.local_balance),
                remote_balance: sat_to_msat(channel.remote_balance),
                active: channel.active,
                public: !channel.private,
            })
            .collect())
    }

    async fn open_channel(&self, request: OpenChannelRequest) -> Result<OpenChannelResponse> {
        const OPERATION: &str = "open_channel";
        let node = validate::public_key(OPERATION, &request.pubkey)?;
        let amount = i64::try_from(request.amount_sats)
            .map_err(|_| LnClientError::validation(OPERATION, "channel amount is too large"))?;
        let point = call(
            OPERATION,
            MANAGEMENT_TIMEOUT,
            self.rpc.open_channel(types::OpenChannelRequest {
                node_pubkey: node.serialize().to_vec(),
                local_funding_amount: amount,
                private: !request.public,
            }),
        )
        .await?;
        let funding_tx_id = point.txid();
        info!("Opening channel to {} with funding tx {funding_tx_id}", request.pubkey);
        Ok(OpenChannelResponse { funding_tx_id })
    }

    async fn close_channel(&self, request: CloseChannelRequest) -> Result<CloseChannelResponse> {
        const OPERATION: &str = "close_channel";
        let (txid, index) = request
            .channel_id
            .split_once(':')
            .and_then(|(txid, index)| Some((txid, index.parse::<u32>().ok()?)))
            .ok_or_else(|| {
                LnClientError::validation(
                    OPERATION,
                    format!("channel id must be txid:index, got {}", request.channel_id),
                )
            })?;
        call(
            OPERATION,
            MANAGEMENT_TIMEOUT,
            self.rpc.close_channel(txid, index, request.force),
        )
        .await?;
        info!("Closing channel {}", request.channel_id);
        Ok(CloseChannelResponse {})
    }

    async fn get_new_onchain_address(&self) -> Result<String> {
        let response = call(
            "get_new_onchain_address",
            MANAGEMENT_TIMEOUT,
            self.rpc.new_address(),
        )
        .await?;
        Ok(response.address)
    }

    async fn get_onchain_balance(&self) -> Result<OnchainBalance> {
        let balance = call("get_onchain_balance", READ_TIMEOUT, self.rpc.wallet_balance()).await?;
        Ok(OnchainBalance {
            spendable: sat_to_msat(balance.confirmed_balance),
            total: sat_to_msat(balance.total_balance),
        })
    }

    async fn redeem_onchain_funds(&self, to_address: &str) -> Result<String> {
        const OPERATION: &str = "redeem_onchain_funds";
        if to_address.is_empty() {
            return Err(LnClientError::validation(OPERATION, "no address given"));
        }
        let response = call(
            OPERATION,
            MANAGEMENT_TIMEOUT,
            self.rpc.send_coins(to_address, true),
        )
        .await?;
        info!("Swept onchain funds to {to_address} in {}", response.txid);
        Ok(response.txid)
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

    async fn sign_message(&self, message: &str) -> Result<String> {
        let response = call(
            "sign_message",
            READ_TIMEOUT,
            self.rpc.sign_message(message.as_bytes()),
        )
        .await?;
        Ok(response.signature)
    }

    async fn reset_router(&self, _scope: ResetRouterScope) -> Result<()> {
        Err(LnClientError::unsupported("reset_router", BACKEND))
    }

    fn get_storage_dir(&self) -> Result<Option<PathBuf>> {
        Ok(None)
    }

    async fn get_network_graph(&self, node_ids: &[String]) -> Result<NetworkGraph> {
        const OPERATION: &str = "get_network_graph";
        let mut nodes = vec![];
        for node_id in node_ids {
            validate::public_key(OPERATION, node_id)?;
            nodes.push(call(OPERATION, READ_TIMEOUT, self.rpc.get_node_info(node_id)).await?);
        }
        Ok(NetworkGraph::Array(nodes))
    }

    async fn get_node_status(&self) -> Result<NodeStatus> {
        let info = call("get_node_status", READ_TIMEOUT, self.rpc.get_info()).await?;
        Ok(NodeStatus {
            is_running: true,
            synced_to_chain: info.synced_to_chain,
            block_height: info.block_height,
        })
    }

    async fn get_log_output(&self, _max_len: usize) -> Result<Vec<u8>> {
        Err(LnClientError::unsupported("get_log_output", BACKEND))
    }

    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }
}

async fn call<T, F>(operation: &'static str, budget: Duration, future: F) -> Result<T>
where
    F: Future<Output = RpcResult<T>>,
{
    timed(operation, budget, async {
        future.await.map_err(|e| rpc_error(operation, e))
    })
    .await
}

fn rpc_error(operation: &'static str, error: RpcError) -> LnClientError {
    match error {
        RpcError::Status { message, .. } => LnClientError::rejected(operation, message),
        RpcError::Transport(e) => LnClientError::transport(operation, e),
    }
}

/// A send can reach the node and still fail to route; the node reports that in-band.
fn payment_result(operation: &'static str, response: SendResponse) -> Result<PayInvoiceResponse> {
    if !response.payment_error.is_empty() {
        return Err(LnClientError::rejected(operation, response.payment_error));
    }
    if response.payment_preimage.is_empty() {
        return Err(LnClientError::rejected(
            operation,
            "payment completed without a preimage",
        ));
    }
    Ok(PayInvoiceResponse {
        preimage: hex::encode(&response.payment_preimage),
        fee: response.payment_route.map(|route| route.total_fees_msat),
    })
}
