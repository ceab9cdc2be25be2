use api::{Transaction, TransactionType};
use serde_json::json;

use super::types::{IncomingPayment, OutgoingPayment};
use crate::{
    bolt11::{self, DecodeError},
    transactions::{millis_to_secs, sat_to_msat},
};

pub fn incoming_to_transaction(payment: &IncomingPayment) -> Result<Transaction, DecodeError> {
    let mut transaction = Transaction {
        transaction_type: TransactionType::Incoming,
        invoice: payment.invoice.clone(),
        description: payment.description.clone(),
        description_hash: String::new(),
        preimage: (payment.is_paid && !payment.preimage.is_empty())
            .then(|| payment.preimage.clone()),
        payment_hash: payment.payment_hash.clone(),
        amount: sat_to_msat(payment.received_sat),
        fees_paid: sat_to_msat(payment.fees),
        created_at: millis_to_secs(payment.created_at),
        expires_at: None,
        settled_at: settled_at(payment.is_paid, payment.completed_at),
        metadata: payment
            .external_id
            .as_ref()
            .map(|id| json!({ "external_id": id })),
    };
    fill_from_invoice(&mut transaction)?;
    Ok(transaction)
}

/// `None` for attempts that completed without paying.
pub fn outgoing_to_transaction(
    payment: &OutgoingPayment,
) -> Result<Option<Transaction>, DecodeError> {
    if payment.completed_at.is_some() && !payment.is_paid {
        return Ok(None);
    }
    let mut transaction = Transaction {
        transaction_type: TransactionType::Outgoing,
        invoice: payment.invoice.clone(),
        description: String::new(),
        description_hash: String::new(),
        preimage: (payment.is_paid && !payment.preimage.is_empty())
            .then(|| payment.preimage.clone()),
        payment_hash: payment.payment_hash.clone(),
        amount: sat_to_msat(payment.sent),
        fees_paid: sat_to_msat(payment.fees),
        created_at: millis_to_secs(payment.created_at),
        expires_at: None,
        settled_at: settled_at(payment.is_paid, payment.completed_at),
        metadata: None,
    };
    fill_from_invoice(&mut transaction)?;
    Ok(Some(transaction))
}

fn settled_at(is_paid: bool, completed_at: Option<i64>) -> Option<i64> {
    completed_at.filter(|_| is_paid).map(millis_to_secs)
}

/// The backend leaves out expiry and description hash, the invoice has both.
pub(super) fn fill_from_invoice(transaction: &mut Transaction) -> Result<(), DecodeError> {
    if transaction.invoice.is_empty() {
        return Ok(());
    }
    let decoded = bolt11::decode(&transaction.invoice)?;
    if transaction.description.is_empty() {
        transaction.description = decoded.description.clone();
    }
    transaction.description_hash = decoded.description_hash.clone();
    transaction.expires_at = decoded.expires_at();
    if transaction.created_at == 0 {
        transaction.created_at = decoded.created_at;
    }
    if transaction.amount == 0 {
        transaction.amount = decoded.amount_msat;
    }
    Ok(())
}
