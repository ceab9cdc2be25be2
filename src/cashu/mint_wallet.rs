use std::{
    collections::{BTreeMap, HashMap},
    io::{self, ErrorKind},
    path::{Path, PathBuf},
    str::FromStr,
    sync::Arc,
};

use anyhow::anyhow;
use async_trait::async_trait;
use cdk::{
    amount::SplitTarget,
    mint_url::MintUrl,
    nuts::{nut00::KnownMethod, CurrencyUnit, MeltQuoteState, PaymentMethod},
    wallet::{
        types::{Transaction, TransactionDirection, TransactionStatus},
        MeltConfirmOptions, MeltOutcome, MeltQuote, MintConnector, MintQuote, Wallet,
        WalletBuilder,
    },
};
use cdk_sqlite::WalletSqliteDatabase;
use log::{debug, info, warn};
use rand::{thread_rng, RngCore};
use tokio::sync::Mutex;

use super::wallet::{EcashWallet, MeltResult, Quote, QuoteKind, WalletError};
use crate::bolt11::{self, DecodeError};

const SEED_FILE: &str = "secret_seed";
const DATABASE_FILE: &str = "cashu.sqlite";

/// A wallet holding tokens of a single mint. Proofs, quotes and the blinded outputs of
/// every mint and melt in flight live in a sqlite database in the work directory, so an
/// exchange cut short by a crash or a timeout is finished on the next recovery pass.
///
/// Claims, melts and recovery passes hold the operation lock for their whole run.
#[derive(Clone)]
pub struct MintWallet {
    mint_url: String,
    work_dir: PathBuf,
    wallet: Wallet,
    operation: Arc<Mutex<()>>,
}

impl MintWallet {
    pub async fn load(work_dir: impl AsRef<Path>, mint_url: &str) -> Result<MintWallet, WalletError> {
        MintWallet::open(work_dir.as_ref(), mint_url, None).await
    }

    /// Same as [`MintWallet::load`] but talks to the mint through `connector`.
    pub async fn with_connector(
        work_dir: impl AsRef<Path>,
        mint_url: &str,
        connector: Arc<dyn MintConnector + Send + Sync>,
    ) -> Result<MintWallet, WalletError> {
        MintWallet::open(work_dir.as_ref(), mint_url, Some(connector)).await
    }

    async fn open(
        work_dir: &Path,
        mint_url: &str,
        connector: Option<Arc<dyn MintConnector + Send + Sync>>,
    ) -> Result<MintWallet, WalletError> {
        tokio::fs::create_dir_all(work_dir).await?;
        let url = MintUrl::from_str(mint_url)
            .map_err(|e| WalletError::MintUrl(format!("{mint_url}: {e}")))?;
        let seed = load_seed(work_dir).await?;
        let localstore = WalletSqliteDatabase::new(work_dir.join(DATABASE_FILE)).await?;
        let mut builder = WalletBuilder::new()
            .mint_url(url)
            .unit(CurrencyUnit::Sat)
            .localstore(Arc::new(localstore))
            .seed(seed);
        if let Some(connector) = connector {
            builder = builder.shared_client(connector);
        }
        let wallet = MintWallet {
            mint_url: mint_url.trim_end_matches('/').to_string(),
            work_dir: work_dir.to_path_buf(),
            wallet: builder.build()?,
            operation: Arc::new(Mutex::new(())),
        };
        if let Err(e) = wallet.recover().await {
            warn!("Could not finish pending operations with mint {mint_url}: {e}");
        }
        info!(
            "Loaded cashu wallet from {} for mint {mint_url}",
            work_dir.display()
        );
        Ok(wallet)
    }

    /// Finish or roll back mints and melts left in flight, asking the mint how each
    /// one ended, then release orphaned pending proofs the mint reports unspent.
    async fn recover(&self) -> Result<(), WalletError> {
        let report = self.wallet.recover_incomplete_sagas().await?;
        if !report.is_empty() {
            info!(
                "Cashu recovery: {} completed, {} rolled back, {} still pending, {} failed",
                report.recovered, report.compensated, report.skipped, report.failed
            );
        }
        let pending = u64::from(self.wallet.check_all_pending_proofs().await?);
        if pending > 0 {
            debug!("{pending} sat of orphaned proofs are still pending at the mint");
        }
        Ok(())
    }

    /// A recovery pass that never waits: skipped while an operation holds the lock.
    async fn reconcile(&self) {
        let Ok(_operation) = self.operation.try_lock() else {
            debug!("Cashu operation in progress, skipping recovery");
            return;
        };
        if let Err(e) = self.recover().await {
            warn!("Could not finish pending operations with mint {}: {e}", self.mint_url);
        }
    }

    async fn claim(&self, quote_id: &str) -> Result<Option<u64>, WalletError> {
        let _operation = self.operation.lock().await;
        let not_found = || WalletError::QuoteNotFound(quote_id.to_string());
        let stored = self
            .wallet
            .localstore
            .get_mint_quote(quote_id)
            .await?
            .ok_or_else(not_found)?;
        if stored.mint_url != self.wallet.mint_url {
            return Err(not_found());
        }
        // Also completes an earlier claim of this quote that never got its signatures.
        let quote = self.wallet.check_mint_quote_status(quote_id).await?;
        if u64::from(quote.amount_mintable()) == 0 {
            debug!("Mint quote {quote_id} is {}, nothing to mint", quote.state);
            return Ok(None);
        }
        let proofs = self.wallet.mint(quote_id, SplitTarget::None, None).await?;
        Ok(Some(proofs.iter().map(|proof| u64::from(proof.amount)).sum()))
    }

    async fn load_quotes(&self) -> Result<Vec<Quote>, WalletError> {
        let completed = completed_by_quote(self.wallet.list_transactions(None).await?);
        let mut quotes = vec![];
        for quote in self.wallet.localstore.get_mint_quotes().await? {
            if quote.mint_url != self.wallet.mint_url || quote.payment_method != PaymentMethod::BOLT11
            {
                continue;
            }
            let settled = completed
                .get(&quote.id)
                .filter(|tx| tx.direction == TransactionDirection::Incoming);
            match mint_entry(&quote, settled) {
                Ok(entry) => quotes.push(entry),
                Err(e) => warn!("Skipping mint quote {}: {e}", quote.id),
            }
        }
        for quote in self.wallet.localstore.get_melt_quotes().await? {
            if quote.mint_url.as_ref() != Some(&self.wallet.mint_url) {
                continue;
            }
            let settled = completed
                .get(&quote.id)
                .filter(|tx| tx.direction == TransactionDirection::Outgoing);
            // Quotes that were never paid or whose melt was rolled back are not payments.
            if settled.is_none() && !matches!(quote.state, MeltQuoteState::Paid | MeltQuoteState::Pending)
            {
                continue;
            }
            match melt_entry(&quote, settled) {
                Ok(entry) => quotes.push(entry),
                Err(e) => warn!("Skipping melt quote {}: {e}", quote.id),
            }
        }
        quotes.sort_by_key(|quote| quote.created_at);
        Ok(quotes)
    }
}

#[async_trait]
impl EcashWallet for MintWallet {
    fn mint_url(&self) -> &str {
        &self.mint_url
    }

    fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    async fn balance_by_mint(&self) -> Result<BTreeMap<String, u64>, WalletError> {
        let balance = self.wallet.total_balance().await?;
        Ok(BTreeMap::from([(self.mint_url.clone(), u64::from(balance))]))
    }

    async fn request_mint(&self, amount_sat: u64) -> Result<Quote, WalletError> {
        let quote = self
            .wallet
            .mint_quote(
                PaymentMethod::Known(KnownMethod::Bolt11),
                Some(amount_sat.into()),
                None,
                None,
            )
            .await?;
        Ok(mint_entry(&quote, None)?)
    }

    async fn quote_by_payment_hash(
        &self,
        payment_hash: &str,
    ) -> Result<Option<Quote>, WalletError> {
        Ok(self
            .load_quotes()
            .await?
            .into_iter()
            .find(|quote| quote.payment_hash == payment_hash))
    }

    async fn quote_by_payment_request(
        &self,
        payment_request: &str,
    ) -> Result<Option<Quote>, WalletError> {
        Ok(self
            .load_quotes()
            .await?
            .into_iter()
            .filter(|quote| quote.payment_request == payment_request)
            .max_by_key(|quote| quote.paid))
    }

    async fn quotes(&self) -> Result<Vec<Quote>, WalletError> {
        self.reconcile().await;
        self.load_quotes().await
    }

    async fn mint_tokens(&self, quote_id: &str) -> Result<Option<u64>, WalletError> {
        let wallet = self.clone();
        let quote_id = quote_id.to_string();
        // Detached, so the exchange with the mint outlives a caller that stops waiting.
        let claim = tokio::spawn(async move {
            let minted = wallet.claim(&quote_id).await;
            if let Ok(Some(amount)) = minted {
                info!("Minted {amount} sat for quote {quote_id}");
            }
            minted
        });
        claim
            .await
            .map_err(|e| WalletError::Transport(anyhow!("mint task failed: {e}")))?
    }

    async fn melt(&self, invoice: &str) -> Result<MeltResult, WalletError> {
        let decoded = bolt11::decode(invoice)?;
        let _operation = self.operation.lock().await;
        if let Err(e) = self.recover().await {
            warn!("Could not finish pending operations before melting: {e}");
        }

        let quote = self
            .wallet
            .melt_quote(PaymentMethod::Known(KnownMethod::Bolt11), invoice, None, None)
            .await?;
        let needed = u64::from(quote.amount) + u64::from(quote.fee_reserve);
        let prepared = match self.wallet.prepare_melt(&quote.id, HashMap::new()).await {
            Ok(prepared) => prepared,
            Err(cdk::Error::InsufficientFunds) => {
                return Err(WalletError::InsufficientFunds {
                    needed,
                    available: u64::from(self.wallet.total_balance().await?),
                })
            }
            Err(e) => return Err(e.into()),
        };
        debug!(
            "Melting {needed} sat with quote {} for invoice {}",
            quote.id, decoded.payment_hash
        );

        let finalized = match prepared
            .confirm_prefer_async_with_options(MeltConfirmOptions::skip_swap())
            .await?
        {
            MeltOutcome::Paid(finalized) => finalized,
            MeltOutcome::Pending(_) => {
                info!(
                    "Melt quote {} for invoice {} is pending, inputs stay reserved",
                    quote.id, decoded.payment_hash
                );
                return Err(WalletError::PaymentPending(quote.id));
            }
        };
        if finalized.state() != MeltQuoteState::Paid {
            return Err(WalletError::Mint(format!(
                "melt quote {} was not paid ({:?})",
                quote.id,
                finalized.state()
            )));
        }
        match finalized.payment_proof().filter(|preimage| !preimage.is_empty()) {
            Some(preimage) => Ok(MeltResult {
                preimage: preimage.to_string(),
            }),
            None => Err(WalletError::Mint(format!(
                "melt quote {} was paid without a preimage",
                quote.id
            ))),
        }
    }
}

async fn load_seed(work_dir: &Path) -> Result<[u8; 64], WalletError> {
    let path = work_dir.join(SEED_FILE);
    match tokio::fs::read(&path).await {
        Ok(seed) => seed.try_into().map_err(|_| {
            WalletError::Storage(io::Error::new(
                ErrorKind::InvalidData,
                format!("invalid seed file at {}", path.display()),
            ))
        }),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            let mut seed = [0u8; 64];
            thread_rng().fill_bytes(&mut seed);
            tokio::fs::write(&path, seed).await?;
            info!("Generated cashu wallet seed: {}", path.display());
            Ok(seed)
        }
        Err(e) => Err(e.into()),
    }
}

fn completed_by_quote(transactions: Vec<Transaction>) -> HashMap<String, Transaction> {
    transactions
        .into_iter()
        .filter(|tx| tx.status == TransactionStatus::Completed)
        .filter_map(|tx| Some((tx.quote_id.clone()?, tx)))
        .collect()
}

fn mint_entry(quote: &MintQuote, settled: Option<&Transaction>) -> Result<Quote, DecodeError> {
    let decoded = bolt11::decode(&quote.request)?;
    Ok(Quote {
        id: quote.id.clone(),
        kind: QuoteKind::Mint,
        payment_request: quote.request.clone(),
        payment_hash: decoded.payment_hash,
        quote_amount: quote
            .amount
            .map(u64::from)
            .unwrap_or(decoded.amount_msat as u64 / 1000),
        paid: settled.is_some(),
        preimage: String::new(),
        created_at: decoded.created_at,
        settled_at: settled.map(|tx| tx.timestamp as i64).unwrap_or_default(),
    })
}

/// Charged amount is the invoice plus the fee the melt actually cost, or the reserve
/// while the melt is unsettled.
fn melt_entry(quote: &MeltQuote, settled: Option<&Transaction>) -> Result<Quote, DecodeError> {
    let decoded = bolt11::decode(&quote.request)?;
    let fee = settled.map(|tx| tx.fee).unwrap_or(quote.fee_reserve);
    Ok(Quote {
        id: quote.id.clone(),
        kind: QuoteKind::Melt,
        payment_request: quote.request.clone(),
        payment_hash: decoded.payment_hash,
        quote_amount: u64::from(quote.amount) + u64::from(fee),
        paid: settled.is_some(),
        preimage: quote
            .payment_proof
            .clone()
            .or_else(|| settled.and_then(|tx| tx.payment_proof.clone()))
            .unwrap_or_default(),
        created_at: settled
            .map(|tx| tx.timestamp as i64)
            .unwrap_or(decoded.created_at),
        settled_at: settled.map(|tx| tx.timestamp as i64).unwrap_or_default(),
    })
}
