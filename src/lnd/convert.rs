use api::{Transaction, TransactionType};

use super::types::{Invoice, InvoiceState, Payment, PaymentStatus};
use crate::{
    bolt11::{self, DecodeError},
    transactions::expires_at,
};

pub fn invoice_to_transaction(invoice: &Invoice) -> Transaction {
    let settled = invoice.state == InvoiceState::Settled;
    Transaction {
        transaction_type: TransactionType::Incoming,
        invoice: invoice.payment_request.clone(),
        description: invoice.memo.clone(),
        description_hash: hex::encode(&invoice.description_hash),
        preimage: (settled && !invoice.r_preimage.is_empty())
            .then(|| hex::encode(&invoice.r_preimage)),
        payment_hash: hex::encode(&invoice.r_hash),
        amount: invoice.value_msat,
        // The receiver pays no routing fee.
        fees_paid: 0,
        created_at: invoice.creation_date,
        expires_at: expires_at(invoice.creation_date, invoice.expiry),
        settled_at: (settled && invoice.settle_date > 0).then_some(invoice.settle_date),
        metadata: None,
    }
}

/// Failed payments are not part of the history. Keysend payments carry no invoice so
/// description and expiry stay empty for them.
pub fn payment_to_transaction(payment: &Payment) -> Result<Option<Transaction>, DecodeError> {
    if payment.status == PaymentStatus::Failed {
        return Ok(None);
    }
    let succeeded = payment.status == PaymentStatus::Succeeded;
    let created_at = if payment.creation_time_ns > 0 {
        payment.creation_time_ns / 1_000_000_000
    } else {
        payment.creation_date
    };
    let mut transaction = Transaction {
        transaction_type: TransactionType::Outgoing,
        invoice: payment.payment_request.clone(),
        description: String::new(),
        description_hash: String::new(),
        preimage: (succeeded && !payment.payment_preimage.is_empty())
            .then(|| payment.payment_preimage.clone()),
        payment_hash: payment.payment_hash.clone(),
        amount: payment.value_msat,
        fees_paid: payment.fee_msat,
        created_at,
        expires_at: None,
        settled_at: succeeded.then(|| payment.settled_at().unwrap_or(created_at)),
        metadata: None,
    };
    if !payment.payment_request.is_empty() {
        let decoded = bolt11::decode(&payment.payment_request)?;
        transaction.description = decoded.description.clone();
        transaction.description_hash = decoded.description_hash.clone();
        transaction.expires_at = decoded.expires_at();
    }
    Ok(Some(transaction))
}
