use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use api::{ListTransactionsParams, Transaction, TransactionType};
use lnclient_hub::{
    cashu::{CashuClient, EcashWallet, MintWallet, MINT_CHECK_WINDOW_SECS},
    lnclient::{LnClient, LnClientError},
};
use test_utils::{build_invoice, BuiltInvoice, TestInvoice, TEST_PUBLIC_KEY};
use time::OffsetDateTime;

use crate::mocks::{
    mock_mint::{MeltMode, MockMint, MELT_FEE, MELT_PREIMAGE, MINT_URL},
    mock_wallet::MockEcashWallet,
};

fn now() -> i64 {
    OffsetDateTime::now_utc().unix_timestamp()
}

fn cashu_client(wallet: MockEcashWallet) -> (Arc<MockEcashWallet>, CashuClient) {
    let wallet = Arc::new(wallet);
    (wallet.clone(), CashuClient::new(wallet))
}

#[tokio::test]
async fn test_young_unpaid_quote_is_checked_once_on_lookup() {
    let (wallet, client) = cashu_client(MockEcashWallet::default());
    let quote = wallet.add_mint_quote("young", 21, now() - 60);

    let transaction = client.lookup_invoice(&quote.payment_hash).await.unwrap();
    assert_eq!(wallet.mint_calls(), 1);
    assert_eq!(transaction.payment_hash, quote.payment_hash);
    assert_eq!(transaction.amount, 21_000);
    assert_eq!(transaction.settled_at, None);
}

#[tokio::test]
async fn test_old_unpaid_quote_is_not_checked() {
    let (wallet, client) = cashu_client(MockEcashWallet::default());
    let quote = wallet.add_mint_quote("old", 21, now() - MINT_CHECK_WINDOW_SECS - 3600);

    let transaction = client.lookup_invoice(&quote.payment_hash).await.unwrap();
    assert_eq!(wallet.mint_calls(), 0);
    assert_eq!(transaction.settled_at, None);
}

#[tokio::test]
async fn test_paid_quote_settles_on_lookup() {
    let (wallet, client) = cashu_client(MockEcashWallet {
        quotes_paid: true,
        ..Default::default()
    });
    let quote = wallet.add_mint_quote("paid", 8, now() - 10);

    let transaction = client.lookup_invoice(&quote.payment_hash).await.unwrap();
    assert!(transaction.settled_at.is_some());
    assert_eq!(transaction.transaction_type, TransactionType::Incoming);

    // Settled quotes are not checked again.
    client.lookup_invoice(&quote.payment_hash).await.unwrap();
    assert_eq!(wallet.mint_calls(), 1);
}

#[tokio::test]
async fn test_lookup_unknown_invoice() {
    let (wallet, client) = cashu_client(MockEcashWallet::default());
    let payment_hash = "ab".repeat(32);

    let error = client.lookup_invoice(&payment_hash).await.unwrap_err();
    assert!(matches!(error, LnClientError::BackendRejection { .. }));
    assert_eq!(error.payment_hash(), Some(payment_hash.as_str()));
    assert_eq!(wallet.mint_calls(), 0);
}

#[tokio::test]
async fn test_list_transactions_checks_only_young_quotes() {
    let (wallet, client) = cashu_client(MockEcashWallet::default());
    let young = wallet.add_mint_quote("young", 1, now() - 60);
    wallet.add_mint_quote("old", 2, now() - 2 * MINT_CHECK_WINDOW_SECS);

    let transactions = client
        .list_transactions(ListTransactionsParams {
            unpaid: true,
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(wallet.mint_calls(), 1);
    assert_eq!(transactions.len(), 2);
    assert_eq!(transactions[0].payment_hash, young.payment_hash);

    let transactions = client
        .list_transactions(ListTransactionsParams::default())
        .await
        .unwrap();
    assert!(transactions.is_empty());
}

#[tokio::test]
async fn test_balance_and_validation() {
    let (_, client) = cashu_client(MockEcashWallet {
        balance: 21,
        ..Default::default()
    });

    assert_eq!(client.get_balance().await.unwrap(), 21_000);
    let balances = client.get_balances().await.unwrap();
    assert_eq!(balances.lightning.total_spendable, 21_000);
    assert_eq!(balances.onchain.spendable, 0);

    assert!(matches!(
        client.make_invoice(999, "", "", 0).await,
        Err(LnClientError::Validation { .. })
    ));
    assert!(matches!(
        client.make_invoice(1000, "", "1234", 0).await,
        Err(LnClientError::Validation { .. })
    ));

    let info = client.get_info().await.unwrap();
    assert_eq!(info.alias, "NWC (Cashu)");
    assert_eq!(info.network, "bitcoin");
}

#[tokio::test]
async fn test_node_operations_are_unsupported() {
    let (_, client) = cashu_client(MockEcashWallet::default());

    let error = client
        .send_keysend(1000, TEST_PUBLIC_KEY, None, &[])
        .await
        .unwrap_err();
    assert!(error.is_unsupported());
    assert!(client.list_peers().await.unwrap_err().is_unsupported());
    assert!(client.get_onchain_balance().await.unwrap_err().is_unsupported());
    assert!(client.get_node_status().await.unwrap_err().is_unsupported());
    assert_eq!(
        client.get_storage_dir().unwrap(),
        Some(PathBuf::from("/tmp/mock-cashu"))
    );
}

async fn mint_wallet(mint: &Arc<MockMint>, dir: &Path) -> Arc<MintWallet> {
    Arc::new(
        MintWallet::with_connector(dir, MINT_URL, mint.clone())
            .await
            .unwrap(),
    )
}

/// A client whose wallet already holds `amount_sat` of ecash from `mint`.
async fn funded_client(mint: &Arc<MockMint>, dir: &Path, amount_sat: i64) -> CashuClient {
    let client = CashuClient::new(mint_wallet(mint, dir).await);
    let made = client.make_invoice(amount_sat * 1000, "", "", 0).await.unwrap();
    mint.pay_invoice(&made.payment_hash);
    let looked_up = client.lookup_invoice(&made.payment_hash).await.unwrap();
    assert!(looked_up.settled_at.is_some());
    client
}

fn invoice_for(amount_msat: u64) -> BuiltInvoice {
    build_invoice(TestInvoice {
        amount_msat: Some(amount_msat),
        created_at: now() as u64,
        ..Default::default()
    })
}

async fn outgoing(client: &CashuClient, payment_hash: &str) -> Option<Transaction> {
    client
        .list_transactions(ListTransactionsParams::default())
        .await
        .unwrap()
        .into_iter()
        .find(|t| t.transaction_type == TransactionType::Outgoing && t.payment_hash == payment_hash)
}

#[tokio::test]
async fn test_mint_wallet_round_trip() {
    let mint = Arc::new(MockMint::default());
    let dir = tempfile::tempdir().unwrap();
    let client = CashuClient::new(mint_wallet(&mint, dir.path()).await);

    let made = client.make_invoice(21_000, "", "", 0).await.unwrap();
    assert_eq!(made.amount, 21_000);
    assert_eq!(made.settled_at, None);

    // Unpaid at the mint: nothing is issued.
    let looked_up = client.lookup_invoice(&made.payment_hash).await.unwrap();
    assert_eq!(looked_up.settled_at, None);
    assert_eq!(mint.issued(), 0);

    mint.pay_invoice(&made.payment_hash);
    let looked_up = client.lookup_invoice(&made.payment_hash).await.unwrap();
    assert!(looked_up.settled_at.is_some());
    assert_eq!(mint.issued(), 1);
    assert_eq!(client.get_balance().await.unwrap(), 21_000);

    let invoice = invoice_for(5000);
    let paid = client.send_payment_sync(&invoice.bolt11).await.unwrap();
    assert_eq!(paid.preimage, MELT_PREIMAGE);
    // The reserve is held back during the melt, only the charged fee is kept.
    assert_eq!(paid.fee, Some(MELT_FEE as i64 * 1000));
    assert_eq!(client.get_balance().await.unwrap(), 15_000);

    let transactions = client
        .list_transactions(ListTransactionsParams::default())
        .await
        .unwrap();
    assert_eq!(transactions.len(), 2);
    let sent = outgoing(&client, &invoice.payment_hash).await.unwrap();
    assert_eq!(sent.preimage.as_deref(), Some(MELT_PREIMAGE));
    assert_eq!(sent.fees_paid, 1000);

    // Everything survives a restart.
    let reloaded = mint_wallet(&mint, dir.path()).await;
    assert_eq!(
        reloaded.balance_by_mint().await.unwrap().values().sum::<u64>(),
        15
    );
    assert_eq!(reloaded.quotes().await.unwrap().len(), 2);

    let too_much = invoice_for(100_000);
    match client.send_payment_sync(&too_much.bolt11).await {
        Err(LnClientError::BackendRejection { payment_hash, .. }) => {
            assert_eq!(payment_hash, Some(too_much.payment_hash.clone()))
        }
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(client.get_balance().await.unwrap(), 15_000);
}

#[tokio::test]
async fn test_concurrent_lookups_mint_once() {
    let mint = Arc::new(MockMint::default());
    let dir = tempfile::tempdir().unwrap();
    let client = Arc::new(CashuClient::new(mint_wallet(&mint, dir.path()).await));

    let made = client.make_invoice(64_000, "", "", 0).await.unwrap();
    mint.pay_invoice(&made.payment_hash);

    let lookups: Vec<_> = (0..4)
        .map(|_| {
            let client = client.clone();
            let payment_hash = made.payment_hash.clone();
            tokio::spawn(async move { client.lookup_invoice(&payment_hash).await })
        })
        .collect();
    for lookup in lookups {
        lookup.await.unwrap().unwrap();
    }
    let looked_up = client.lookup_invoice(&made.payment_hash).await.unwrap();
    assert!(looked_up.settled_at.is_some());

    assert_eq!(mint.issued(), 1);
    assert_eq!(client.get_balance().await.unwrap(), 64_000);
}

#[tokio::test]
async fn test_slow_mint_reply_settles_after_lookup_gives_up() {
    let mint = Arc::new(MockMint::default());
    let dir = tempfile::tempdir().unwrap();
    let client = CashuClient::new(mint_wallet(&mint, dir.path()).await);

    let made = client.make_invoice(21_000, "", "", 0).await.unwrap();
    mint.pay_invoice(&made.payment_hash);
    // Longer than a lookup waits for the mint.
    mint.delay_mint_response(Duration::from_secs(6));

    let looked_up = client.lookup_invoice(&made.payment_hash).await.unwrap();
    assert_eq!(looked_up.settled_at, None);
    assert_eq!(mint.issued(), 1);

    tokio::time::sleep(Duration::from_secs(3)).await;
    let looked_up = client.lookup_invoice(&made.payment_hash).await.unwrap();
    assert!(looked_up.settled_at.is_some());
    assert_eq!(mint.issued(), 1);
    assert_eq!(client.get_balance().await.unwrap(), 21_000);
}

#[tokio::test]
async fn test_lost_mint_reply_is_recovered_on_next_lookup() {
    let mint = Arc::new(MockMint::default());
    let dir = tempfile::tempdir().unwrap();
    let client = CashuClient::new(mint_wallet(&mint, dir.path()).await);

    let made = client.make_invoice(21_000, "", "", 0).await.unwrap();
    mint.pay_invoice(&made.payment_hash);
    mint.drop_next_mint_response();

    let looked_up = client.lookup_invoice(&made.payment_hash).await.unwrap();
    assert_eq!(looked_up.settled_at, None);
    assert_eq!(mint.issued(), 1);
    assert_eq!(client.get_balance().await.unwrap(), 0);

    // The outputs sent with the lost request are replayed and the mint signs them again.
    let looked_up = client.lookup_invoice(&made.payment_hash).await.unwrap();
    assert!(looked_up.settled_at.is_some());
    assert_eq!(mint.issued(), 1);
    assert_eq!(client.get_balance().await.unwrap(), 21_000);
}

#[tokio::test]
async fn test_pending_melt_keeps_inputs_reserved_until_settled() {
    let mint = Arc::new(MockMint::default());
    let dir = tempfile::tempdir().unwrap();
    let client = funded_client(&mint, dir.path(), 64).await;
    mint.set_melt_mode(MeltMode::Pending);

    let invoice = invoice_for(5000);
    match client.send_payment_sync(&invoice.bolt11).await {
        Err(LnClientError::Transport { payment_hash, .. }) => {
            assert_eq!(payment_hash, Some(invoice.payment_hash.clone()))
        }
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(client.get_balance().await.unwrap(), 0);

    // Still in flight: the inputs are neither spendable nor released.
    assert!(outgoing(&client, &invoice.payment_hash)
        .await
        .map_or(true, |t| t.settled_at.is_none()));
    assert_eq!(client.get_balance().await.unwrap(), 0);

    mint.settle_melts();
    let sent = outgoing(&client, &invoice.payment_hash).await.unwrap();
    assert!(sent.settled_at.is_some());
    assert_eq!(sent.preimage.as_deref(), Some(MELT_PREIMAGE));
    assert_eq!(sent.fees_paid, 1000);
    assert_eq!(client.get_balance().await.unwrap(), 58_000);
}

#[tokio::test]
async fn test_cancelled_melt_is_resolved_with_the_mint() {
    let mint = Arc::new(MockMint::default());
    let dir = tempfile::tempdir().unwrap();
    let client = funded_client(&mint, dir.path(), 64).await;
    mint.set_melt_mode(MeltMode::Hold);

    let invoice = invoice_for(5000);
    let sent = tokio::time::timeout(
        Duration::from_secs(1),
        client.send_payment_sync(&invoice.bolt11),
    )
    .await;
    assert!(sent.is_err());
    assert_eq!(client.get_balance().await.unwrap(), 0);

    mint.settle_melts();
    let sent = outgoing(&client, &invoice.payment_hash).await.unwrap();
    assert!(sent.settled_at.is_some());
    assert_eq!(client.get_balance().await.unwrap(), 58_000);

    // Nothing is left to finish on a restart.
    let reloaded = mint_wallet(&mint, dir.path()).await;
    assert_eq!(
        reloaded.balance_by_mint().await.unwrap().values().sum::<u64>(),
        58
    );
}

#[tokio::test]
async fn test_melt_paid_without_preimage_is_rejected() {
    let mint = Arc::new(MockMint::default());
    let dir = tempfile::tempdir().unwrap();
    let client = funded_client(&mint, dir.path(), 21).await;
    mint.set_melt_mode(MeltMode::PaidWithoutPreimage);

    let invoice = invoice_for(5000);
    match client.send_payment_sync(&invoice.bolt11).await {
        Err(LnClientError::BackendRejection {
            payment_hash,
            message,
            ..
        }) => {
            assert_eq!(payment_hash, Some(invoice.payment_hash.clone()));
            assert!(message.contains("without a preimage"));
        }
        other => panic!("unexpected {other:?}"),
    }
}
