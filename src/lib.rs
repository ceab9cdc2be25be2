pub mod bolt11;
pub mod cashu;
pub mod keysend;
pub mod lnclient;
pub mod lnd;
pub mod phoenixd;
pub mod transactions;

use std::sync::Arc;

use cashu::CashuClient;
use lnclient::LnClient;
use lnd::LndClient;
use log::info;
use phoenixd::PhoenixdClient;
use settings::{BackendType, Settings};

pub const VERSION: &str = concat!("lnclient-hub v", env!("CARGO_PKG_VERSION"));

pub fn log_error(e: &anyhow::Error) {
    for cause in e.chain() {
        log::error!("{}", cause);
    }
}

/// Build the client for the configured backend. The hub holds on to the result for
/// its whole lifetime.
pub async fn connect(settings: &Settings) -> anyhow::Result<Arc<dyn LnClient>> {
    let client: Arc<dyn LnClient> = match settings.ln_backend_type {
        BackendType::Lnd => Arc::new(LndClient::connect(settings).await?),
        BackendType::Phoenix => Arc::new(PhoenixdClient::connect(settings).await?),
        BackendType::Cashu => Arc::new(CashuClient::connect(settings).await?),
    };
    info!("Connected to {} backend", settings.ln_backend_type);
    Ok(client)
}
