use std::{collections::BTreeMap, fmt, path::Path};

use anyhow::anyhow;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::bolt11::DecodeError;

#[derive(Error, Debug)]
pub enum WalletError {
    #[error("mint unreachable: {0}")]
    Transport(#[from] anyhow::Error),
    #[error("mint refused the request: {0}")]
    Mint(String),
    #[error("insufficient funds: need {needed} sat, have {available} sat")]
    InsufficientFunds { needed: u64, available: u64 },
    #[error("no quote {0}")]
    QuoteNotFound(String),
    /// The mint accepted the melt but has not settled the payment yet. The inputs stay
    /// reserved until the melt is resolved.
    #[error("payment for melt quote {0} is pending")]
    PaymentPending(String),
    #[error("invalid mint url {0}")]
    MintUrl(String),
    #[error("wallet storage: {0}")]
    Storage(#[from] std::io::Error),
    #[error("wallet database: {0}")]
    Database(#[from] cdk::cdk_database::Error),
    #[error(transparent)]
    Invoice(#[from] DecodeError),
}

impl From<cdk::Error> for WalletError {
    fn from(error: cdk::Error) -> Self {
        match error {
            cdk::Error::HttpError(Some(status), message) if (400..500).contains(&status) => {
                WalletError::Mint(format!("{status}: {message}"))
            }
            cdk::Error::HttpError(status, message) => {
                WalletError::Transport(anyhow!("http status {status:?}: {message}"))
            }
            cdk::Error::UnknownQuote => WalletError::QuoteNotFound("unknown to the wallet".into()),
            cdk::Error::Database(e) => WalletError::Database(e),
            e => WalletError::Mint(e.to_string()),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum QuoteKind {
    /// Tokens are issued once the quote invoice is paid.
    Mint,
    /// Tokens are spent to pay an invoice.
    Melt,
}

impl fmt::Display for QuoteKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QuoteKind::Mint => write!(f, "mint"),
            QuoteKind::Melt => write!(f, "melt"),
        }
    }
}

/// A quote the wallet has asked a mint for, with its local settlement state.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Quote {
    pub id: String,
    pub kind: QuoteKind,
    pub payment_request: String,
    pub payment_hash: String,
    /// Sats the wallet is credited (mint) or charged (melt, including the fee reserve).
    pub quote_amount: u64,
    pub paid: bool,
    #[serde(default)]
    pub preimage: String,
    pub created_at: i64,
    /// Zero until paid.
    #[serde(default)]
    pub settled_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeltResult {
    pub preimage: String,
}

/// An ecash wallet bound to one mint.
#[async_trait]
pub trait EcashWallet: Send + Sync {
    fn mint_url(&self) -> &str;

    /// Where the wallet keeps its proofs and quotes.
    fn work_dir(&self) -> &Path;

    /// Spendable sats per mint.
    async fn balance_by_mint(&self) -> Result<BTreeMap<String, u64>, WalletError>;

    async fn request_mint(&self, amount_sat: u64) -> Result<Quote, WalletError>;

    async fn quote_by_payment_hash(&self, payment_hash: &str)
        -> Result<Option<Quote>, WalletError>;

    async fn quote_by_payment_request(
        &self,
        payment_request: &str,
    ) -> Result<Option<Quote>, WalletError>;

    async fn quotes(&self) -> Result<Vec<Quote>, WalletError>;

    /// Ask the mint whether the quote was paid and claim the tokens if so. Returns the
    /// minted amount, or `None` when the quote is unpaid or its tokens were already
    /// claimed. Claiming is idempotent: concurrent calls for one quote mint at most once.
    /// A claim that has reached the mint runs to completion even if the caller stops
    /// waiting for it.
    async fn mint_tokens(&self, quote_id: &str) -> Result<Option<u64>, WalletError>;

    /// Pay an invoice with tokens. Inputs of a melt the mint reports as pending stay
    /// reserved and are settled or released once the mint resolves the quote.
    async fn melt(&self, invoice: &str) -> Result<MeltResult, WalletError>;
}
