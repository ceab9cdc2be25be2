//! Helpers shared by the per-backend normalizers, plus the merge step that
//! turns independently fetched incoming and outgoing legs into one listing.

use api::{ListTransactionsParams, MillisatAmount, Transaction};

pub fn sat_to_msat(sat: i64) -> MillisatAmount {
    sat * 1000
}

pub fn millis_to_secs(millis: i64) -> i64 {
    millis / 1000
}

/// Expiry is only meaningful when the backend reports one.
pub fn expires_at(created_at: i64, expiry: i64) -> Option<i64> {
    (expiry > 0).then_some(created_at + expiry)
}

/// Newest first. Records created in the same second keep the order they were fetched in.
pub fn sort_transactions(transactions: &mut [Transaction]) {
    transactions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
}

/// Concatenate both legs and sort. Each leg was already windowed by the backend so the
/// result is deliberately not truncated to the requested page size.
pub fn merge_transactions(
    incoming: Vec<Transaction>,
    outgoing: Vec<Transaction>,
) -> Vec<Transaction> {
    let mut transactions = incoming;
    transactions.extend(outgoing);
    sort_transactions(&mut transactions);
    transactions
}

/// For backends where every record is already local: filter, sort and window in memory.
pub fn paginate_locally(
    transactions: Vec<Transaction>,
    params: &ListTransactionsParams,
) -> Vec<Transaction> {
    let mut transactions: Vec<Transaction> = transactions
        .into_iter()
        .filter(|t| params.includes(t.transaction_type))
        .filter(|t| params.unpaid || t.is_settled())
        .filter(|t| params.from == 0 || t.created_at >= params.from as i64)
        .filter(|t| params.until == 0 || t.created_at <= params.until as i64)
        .collect();
    sort_transactions(&mut transactions);
    let transactions = transactions.into_iter().skip(params.offset as usize);
    if params.limit == 0 {
        transactions.collect()
    } else {
        transactions.take(params.limit as usize).collect()
    }
}
