use std::sync::Arc;

use api::{ListTransactionsParams, TransactionType};
use lnclient_hub::{
    lnclient::{LnClient, LnClientError},
    phoenixd::PhoenixdClient,
};
use serde_json::json;
use test_utils::{build_invoice, TestInvoice, TestSettingsBuilder, TEST_PUBLIC_KEY};
use time::{macros::datetime, OffsetDateTime};

use crate::mocks::mock_phoenixd::{MockPhoenixd, MOCK_PASSWORD};

async fn start() -> (Arc<MockPhoenixd>, PhoenixdClient) {
    let mock = Arc::new(MockPhoenixd::default());
    let url = mock.start();
    let settings = TestSettingsBuilder::new()
        .with_phoenixd(&url, MOCK_PASSWORD)
        .build();
    let client = PhoenixdClient::connect(&settings).await.unwrap();
    (mock, client)
}

#[tokio::test]
async fn test_info_and_balance() {
    let (_, client) = start().await;

    let info = client.get_info().await.unwrap();
    assert_eq!(info.alias, "Phoenix");
    assert_eq!(info.pubkey, TEST_PUBLIC_KEY);
    assert_eq!(info.network, "testnet");
    assert_eq!(info.block_height, 2_500_000);

    let balance = client.get_balance().await.unwrap();
    assert_eq!(balance, 51_000_000);
    let balances = client.get_balances().await.unwrap();
    assert_eq!(balances.lightning.total_spendable, balance);
    assert_eq!(balances.lightning.next_max_spendable_mpp, balance);
    assert_eq!(balances.onchain.total, 0);

    let connection = client.get_node_connection_info().await.unwrap();
    assert_eq!(connection.pubkey, TEST_PUBLIC_KEY);
    assert_eq!(connection.port, 0);
}

#[tokio::test]
async fn test_wrong_password_is_rejected() {
    let mock = Arc::new(MockPhoenixd::default());
    let url = mock.start();
    let client = PhoenixdClient::new(&url, "wrong").unwrap();
    match client.get_info().await {
        Err(LnClientError::BackendRejection { message, .. }) => assert!(message.contains("401")),
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn test_make_invoice_tags_todays_date() {
    let (mock, client) = start().await;

    let made = client.make_invoice(21_000, "coffee", "", 600).await.unwrap();
    let today = OffsetDateTime::now_utc().date().to_string();
    let form = mock.last_created();
    assert_eq!(form.get("externalId"), Some(&today));
    assert_eq!(form.get("amountSat").map(String::as_str), Some("21"));
    assert_eq!(form.get("description").map(String::as_str), Some("coffee"));
    assert_eq!(form.get("expirySeconds").map(String::as_str), Some("600"));

    assert_eq!(made.transaction_type, TransactionType::Incoming);
    assert_eq!(made.amount, 21_000);
    assert_eq!(made.description, "coffee");
    assert_eq!(made.expires_at, Some(made.created_at + 600));
    assert_eq!(made.metadata.unwrap()["external_id"], json!(today));

    let hash = hex::encode([8u8; 32]);
    let made = client.make_invoice(5000, "ignored", &hash, 0).await.unwrap();
    let form = mock.last_created();
    assert_eq!(form.get("descriptionHash"), Some(&hash));
    assert!(!form.contains_key("description"));
    assert!(!form.contains_key("expirySeconds"));
    assert_eq!(made.description_hash, hash);

    assert!(matches!(
        client.make_invoice(5000, "", "zz", 0).await,
        Err(LnClientError::Validation { .. })
    ));
    assert_eq!(mock.created.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn test_lookup_invoice() {
    let (mock, client) = start().await;
    let invoice = build_invoice(TestInvoice {
        amount_msat: Some(3000),
        ..Default::default()
    });
    mock.incoming.lock().unwrap().push(json!({
        "paymentHash": invoice.payment_hash,
        "preimage": invoice.preimage,
        "externalId": "2023-11-14",
        "invoice": invoice.bolt11,
        "isPaid": true,
        "receivedSat": 3,
        "fees": 0,
        "completedAt": 1_700_000_050_000i64,
        "createdAt": 1_700_000_000_000i64,
    }));

    let transaction = client.lookup_invoice(&invoice.payment_hash).await.unwrap();
    assert_eq!(transaction.amount, 3000);
    assert_eq!(transaction.settled_at, Some(1_700_000_050));
    assert_eq!(transaction.preimage, Some(invoice.preimage.clone()));

    let missing = "ee".repeat(32);
    let error = client.lookup_invoice(&missing).await.unwrap_err();
    assert!(matches!(error, LnClientError::BackendRejection { .. }));
    assert_eq!(error.payment_hash(), Some(missing.as_str()));
}

#[tokio::test]
async fn test_list_transactions() {
    let (mock, client) = start().await;
    let incoming = build_invoice(TestInvoice::default());
    mock.incoming.lock().unwrap().push(json!({
        "paymentHash": incoming.payment_hash,
        "preimage": incoming.preimage,
        "invoice": incoming.bolt11,
        "isPaid": true,
        "receivedSat": 1,
        "completedAt": 1_709_251_300_000i64,
        "createdAt": 1_709_251_200_000i64,
    }));
    mock.outgoing.lock().unwrap().extend([
        json!({
            "paymentHash": "0a".repeat(32),
            "preimage": "0b".repeat(32),
            "isPaid": true,
            "sent": 10,
            "fees": 1,
            "completedAt": 1_709_251_500_000i64,
            "createdAt": 1_709_251_400_000i64,
        }),
        json!({
            "paymentHash": "0c".repeat(32),
            "isPaid": false,
            "sent": 10,
            "completedAt": 1_709_251_600_000i64,
            "createdAt": 1_709_251_600_000i64,
        }),
    ]);

    let day = datetime!(2024-03-01 00:00 UTC).unix_timestamp() as u64;
    let transactions = client
        .list_transactions(ListTransactionsParams {
            from: day,
            until: day + 86_399,
            limit: 20,
            ..Default::default()
        })
        .await
        .unwrap();
    // The failed outgoing payment is dropped.
    assert_eq!(transactions.len(), 2);
    assert_eq!(transactions[0].transaction_type, TransactionType::Outgoing);
    assert_eq!(transactions[0].amount, 10_000);
    assert_eq!(transactions[0].fees_paid, 1000);
    assert_eq!(transactions[0].settled_at, Some(1_709_251_500));
    assert_eq!(transactions[1].payment_hash, incoming.payment_hash);

    let query = mock.incoming_queries.lock().unwrap()[0].clone();
    assert_eq!(query.get("externalId").map(String::as_str), Some("2024-03-01"));
    assert_eq!(query.get("from"), Some(&(day * 1000).to_string()));
    assert_eq!(query.get("to"), Some(&((day + 86_399) * 1000).to_string()));
    assert_eq!(query.get("limit").map(String::as_str), Some("20"));
    assert_eq!(query.get("all").map(String::as_str), Some("false"));
    let query = mock.outgoing_queries.lock().unwrap()[0].clone();
    assert!(!query.contains_key("externalId"));

    client
        .list_transactions(ListTransactionsParams {
            from: day,
            until: day + 2 * 86_400,
            transaction_type: Some(TransactionType::Incoming),
            ..Default::default()
        })
        .await
        .unwrap();
    let query = mock.incoming_queries.lock().unwrap()[1].clone();
    assert!(!query.contains_key("externalId"));
    assert_eq!(mock.outgoing_queries.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_pay_invoice() {
    let (mock, client) = start().await;
    let invoice = build_invoice(TestInvoice::default());
    *mock.pay_response.lock().unwrap() = json!({
        "paymentHash": invoice.payment_hash,
        "paymentId": "f0a0",
        "paymentPreimage": invoice.preimage,
        "routingFeeSat": 3,
        "recipientAmountSat": 1,
    });

    let paid = client.send_payment_sync(&invoice.bolt11).await.unwrap();
    assert_eq!(paid.preimage, invoice.preimage);
    assert_eq!(paid.fee, Some(3000));

    *mock.pay_response.lock().unwrap() = json!({
        "paymentHash": invoice.payment_hash,
        "reason": "no route",
    });
    let error = client.send_payment_sync(&invoice.bolt11).await.unwrap_err();
    assert!(matches!(error, LnClientError::BackendRejection { .. }));
    assert_eq!(error.payment_hash(), Some(invoice.payment_hash.as_str()));
}

#[tokio::test]
async fn test_node_operations_are_unsupported() {
    let (_, client) = start().await;

    let error = client
        .send_keysend(1000, TEST_PUBLIC_KEY, None, &[])
        .await
        .unwrap_err();
    assert!(error.is_unsupported());
    assert_eq!(error.operation(), "send_keysend");
    assert!(client.list_channels().await.unwrap_err().is_unsupported());
    assert!(client.get_new_onchain_address().await.unwrap_err().is_unsupported());
    assert!(client.sign_message("hi").await.unwrap_err().is_unsupported());
    assert!(client
        .reset_router(api::ResetRouterScope::All)
        .await
        .unwrap_err()
        .is_unsupported());
    assert_eq!(client.get_storage_dir().unwrap(), None);
}
