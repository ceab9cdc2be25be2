use api::{Transaction, TransactionType};

use super::wallet::{Quote, QuoteKind};
use crate::{
    bolt11::{self, DecodeError},
    transactions::sat_to_msat,
};

/// Amount, timestamps and description all come from the quote invoice.
/// The fee is what the quote charged over the invoice amount and may be negative.
pub fn quote_to_transaction(quote: &Quote) -> Result<Transaction, DecodeError> {
    let decoded = bolt11::decode(&quote.payment_request)?;
    let settled = quote.paid && quote.settled_at > 0;
    Ok(Transaction {
        transaction_type: match quote.kind {
            QuoteKind::Mint => TransactionType::Incoming,
            QuoteKind::Melt => TransactionType::Outgoing,
        },
        invoice: quote.payment_request.clone(),
        description: decoded.description.clone(),
        description_hash: decoded.description_hash.clone(),
        preimage: (settled && !quote.preimage.is_empty()).then(|| quote.preimage.clone()),
        payment_hash: decoded.payment_hash.clone(),
        amount: decoded.amount_msat,
        fees_paid: sat_to_msat(quote.quote_amount as i64) - decoded.amount_msat,
        created_at: decoded.created_at,
        expires_at: decoded.expires_at(),
        settled_at: settled.then_some(quote.settled_at),
        metadata: None,
    })
}
