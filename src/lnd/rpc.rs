use std::{fs::File, io::Read};

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use reqwest::{
    header::{HeaderValue, CONTENT_TYPE},
    Certificate, Client, ClientBuilder, Method, RequestBuilder, Response,
};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

use super::types::{
    AddInvoiceRequest, AddInvoiceResponse, ChannelBalanceResponse, ChannelPoint, ErrorResponse,
    GetInfoResponse, Invoice, ListChannelsResponse, ListInvoiceRequest, ListInvoiceResponse,
    ListPaymentsRequest, ListPaymentsResponse, ListPeersResponse, NewAddressResponse,
    OpenChannelRequest, SendCoinsResponse, SendRequest, SendResponse, SignMessageResponse,
    WalletBalanceResponse,
};

#[derive(Error, Debug)]
pub enum RpcError {
    /// The node answered with an error status.
    #[error("status {code}: {message}")]
    Status { code: i32, message: String },
    #[error(transparent)]
    Transport(#[from] anyhow::Error),
}

pub type RpcResult<T> = Result<T, RpcError>;

/// The slice of the LND API the hub needs.
#[async_trait]
pub trait LndRpc: Send + Sync {
    async fn get_info(&self) -> RpcResult<GetInfoResponse>;

    async fn channel_balance(&self) -> RpcResult<ChannelBalanceResponse>;

    async fn wallet_balance(&self) -> RpcResult<WalletBalanceResponse>;

    async fn add_invoice(&self, request: AddInvoiceRequest) -> RpcResult<AddInvoiceResponse>;

    /// `payment_hash` is hex.
    async fn lookup_invoice(&self, payment_hash: &str) -> RpcResult<Invoice>;

    async fn list_invoices(&self, request: ListInvoiceRequest) -> RpcResult<ListInvoiceResponse>;

    async fn list_payments(&self, request: ListPaymentsRequest)
        -> RpcResult<ListPaymentsResponse>;

    async fn send_payment_sync(&self, request: SendRequest) -> RpcResult<SendResponse>;

    async fn sign_message(&self, message: &[u8]) -> RpcResult<SignMessageResponse>;

    async fn new_address(&self) -> RpcResult<NewAddressResponse>;

    async fn send_coins(&self, address: &str, send_all: bool) -> RpcResult<SendCoinsResponse>;

    async fn connect_peer(&self, pubkey: &str, host: &str) -> RpcResult<()>;

    async fn disconnect_peer(&self, pubkey: &str) -> RpcResult<()>;

    async fn list_peers(&self) -> RpcResult<ListPeersResponse>;

    async fn list_channels(&self) -> RpcResult<ListChannelsResponse>;

    async fn open_channel(&self, request: OpenChannelRequest) -> RpcResult<ChannelPoint>;

    async fn close_channel(&self, funding_txid: &str, output_index: u32, force: bool)
        -> RpcResult<()>;

    async fn get_node_info(&self, pubkey: &str) -> RpcResult<Value>;
}

/// Talks to the LND REST gateway over TLS, authenticated with a macaroon.
pub struct LndRestClient {
    host: String,
    client: Client,
    macaroon: String,
}

impl LndRestClient {
    pub fn new(host: &str, cert_path: &str, macaroon_path: &str) -> anyhow::Result<LndRestClient> {
        let macaroon = read_file(macaroon_path)?;
        let cert = Certificate::from_pem(&read_file(cert_path)?)?;
        LndRestClient::with_credentials(host, Some(cert), &macaroon)
    }

    pub fn with_credentials(
        host: &str,
        cert: Option<Certificate>,
        macaroon: &[u8],
    ) -> anyhow::Result<LndRestClient> {
        // The node certificate is usually issued for an IP address so stay on native tls
        // with SNI turned off.
        let mut builder = ClientBuilder::new().tls_sni(false).use_native_tls();
        if let Some(cert) = cert {
            builder = builder.add_root_certificate(cert);
        }
        let host = if host.starts_with("http://") || host.starts_with("https://") {
            host.trim_end_matches('/').to_string()
        } else {
            format!("https://{}", host.trim_end_matches('/'))
        };
        Ok(LndRestClient {
            host,
            client: builder.build()?,
            macaroon: hex::encode(macaroon),
        })
    }

    fn request(&self, method: Method, route: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}{}", self.host, route))
            .header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
            .header("Grpc-Metadata-macaroon", &self.macaroon)
    }

    async fn get<T: DeserializeOwned>(&self, route: &str, query: &[(&str, String)]) -> RpcResult<T> {
        let response = self
            .request(Method::GET, route)
            .query(query)
            .send()
            .await
            .map_err(anyhow::Error::from)?;
        deserialize(response).await
    }

    async fn post<B: Serialize, T: DeserializeOwned>(&self, route: &str, body: &B) -> RpcResult<T> {
        let response = self
            .request(Method::POST, route)
            .json(body)
            .send()
            .await
            .map_err(anyhow::Error::from)?;
        deserialize(response).await
    }

    async fn delete<T: DeserializeOwned>(&self, route: &str) -> RpcResult<T> {
        let response = self
            .request(Method::DELETE, route)
            .send()
            .await
            .map_err(anyhow::Error::from)?;
        deserialize(response).await
    }
}

#[async_trait]
impl LndRpc for LndRestClient {
    async fn get_info(&self) -> RpcResult<GetInfoResponse> {
        self.get("/v1/getinfo", &[]).await
    }

    async fn channel_balance(&self) -> RpcResult<ChannelBalanceResponse> {
        self.get("/v1/balance/channels", &[]).await
    }

    async fn wallet_balance(&self) -> RpcResult<WalletBalanceResponse> {
        self.get("/v1/balance/blockchain", &[]).await
    }

    async fn add_invoice(&self, request: AddInvoiceRequest) -> RpcResult<AddInvoiceResponse> {
        self.post("/v1/invoices", &request).await
    }

    async fn lookup_invoice(&self, payment_hash: &str) -> RpcResult<Invoice> {
        self.get(&format!("/v1/invoice/{payment_hash}"), &[]).await
    }

    async fn list_invoices(&self, request: ListInvoiceRequest) -> RpcResult<ListInvoiceResponse> {
        let mut query = vec![("reversed", request.reversed.to_string())];
        push_nonzero(&mut query, "num_max_invoices", request.num_max_invoices);
        push_nonzero(&mut query, "index_offset", request.index_offset);
        push_nonzero(&mut query, "creation_date_start", request.creation_date_start);
        push_nonzero(&mut query, "creation_date_end", request.creation_date_end);
        if request.pending_only {
            query.push(("pending_only", "true".to_string()));
        }
        self.get("/v1/invoices", &query).await
    }

    async fn list_payments(
        &self,
        request: ListPaymentsRequest,
    ) -> RpcResult<ListPaymentsResponse> {
        let mut query = vec![
            ("reversed", request.reversed.to_string()),
            ("include_incomplete", request.include_incomplete.to_string()),
        ];
        push_nonzero(&mut query, "max_payments", request.max_payments);
        push_nonzero(&mut query, "index_offset", request.index_offset);
        push_nonzero(&mut query, "creation_date_start", request.creation_date_start);
        push_nonzero(&mut query, "creation_date_end", request.creation_date_end);
        self.get("/v1/payments", &query).await
    }

    async fn send_payment_sync(&self, request: SendRequest) -> RpcResult<SendResponse> {
        self.post("/v1/channels/transactions", &request).await
    }

    async fn sign_message(&self, message: &[u8]) -> RpcResult<SignMessageResponse> {
        use base64::{engine::general_purpose, Engine};
        self.post(
            "/v1/signmessage",
            &json!({ "msg": general_purpose::STANDARD.encode(message) }),
        )
        .await
    }

    async fn new_address(&self) -> RpcResult<NewAddressResponse> {
        // Native segwit.
        self.get("/v1/newaddress", &[("type", "0".to_string())])
            .await
    }

    async fn send_coins(&self, address: &str, send_all: bool) -> RpcResult<SendCoinsResponse> {
        self.post(
            "/v1/transactions",
            &json!({ "addr": address, "send_all": send_all }),
        )
        .await
    }

    async fn connect_peer(&self, pubkey: &str, host: &str) -> RpcResult<()> {
        let _: Value = self
            .post(
                "/v1/peers",
                &json!({ "addr": { "pubkey": pubkey, "host": host }, "perm": false }),
            )
            .await?;
        Ok(())
    }

    async fn disconnect_peer(&self, pubkey: &str) -> RpcResult<()> {
        let _: Value = self.delete(&format!("/v1/peers/{pubkey}")).await?;
        Ok(())
    }

    async fn list_peers(&self) -> RpcResult<ListPeersResponse> {
        self.get("/v1/peers", &[]).await
    }

    async fn list_channels(&self) -> RpcResult<ListChannelsResponse> {
        self.get("/v1/channels", &[]).await
    }

    async fn open_channel(&self, request: OpenChannelRequest) -> RpcResult<ChannelPoint> {
        self.post("/v1/channels", &request).await
    }

    async fn close_channel(
        &self,
        funding_txid: &str,
        output_index: u32,
        force: bool,
    ) -> RpcResult<()> {
        // Closing is a server stream that stays open until the close confirms. The first
        // update tells us whether the close was accepted.
        let mut response = self
            .request(
                Method::DELETE,
                &format!("/v1/channels/{funding_txid}/{output_index}"),
            )
            .query(&[("force", force.to_string())])
            .send()
            .await
            .map_err(anyhow::Error::from)?;
        let status = response.status();
        let chunk = response
            .chunk()
            .await
            .map_err(anyhow::Error::from)?
            .unwrap_or_default();
        let update: Value = serde_json::from_slice(&chunk).unwrap_or(Value::Null);
        if let Some(error) = update.get("error") {
            return Err(status_error(error.clone()));
        }
        if !status.is_success() {
            return Err(status_error(update));
        }
        Ok(())
    }

    async fn get_node_info(&self, pubkey: &str) -> RpcResult<Value> {
        self.get(&format!("/v1/graph/node/{pubkey}"), &[]).await
    }
}

fn push_nonzero(query: &mut Vec<(&str, String)>, key: &'static str, value: u64) {
    if value > 0 {
        query.push((key, value.to_string()));
    }
}

fn status_error(body: Value) -> RpcError {
    let error: ErrorResponse = serde_json::from_value(body.clone()).unwrap_or_default();
    RpcError::Status {
        code: error.code,
        message: if error.message.is_empty() {
            body.to_string()
        } else {
            error.message
        },
    }
}

async fn deserialize<T: DeserializeOwned>(response: Response) -> RpcResult<T> {
    let status = response.status();
    let body = response.text().await.map_err(anyhow::Error::from)?;
    if status.is_success() {
        serde_json::from_str(&body)
            .with_context(|| format!("unexpected response body: {body}"))
            .map_err(RpcError::Transport)
    } else {
        match serde_json::from_str::<Value>(&body) {
            Ok(value) => Err(status_error(value)),
            Err(_) => Err(RpcError::Status {
                code: status.as_u16() as i32,
                message: body,
            }),
        }
    }
}

fn read_file(path: &str) -> anyhow::Result<Vec<u8>> {
    let mut file = File::open(path).map_err(|e| anyhow!("{path}: {e}"))?;
    let mut buffer = Vec::new();
    file.read_to_end(&mut buffer)?;
    Ok(buffer)
}
