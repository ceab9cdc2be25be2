use std::str::FromStr;

use bitcoin::hashes::Hash;
use lightning_invoice::{Bolt11Invoice, Bolt11InvoiceDescription};
use thiserror::Error;

/// Backend data that could not be parsed, usually a BOLT11 invoice.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("cannot decode {input}: {message}")]
pub struct DecodeError {
    pub input: String,
    pub message: String,
}

/// The parts of a BOLT11 invoice the normalizers care about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedInvoice {
    pub payment_hash: String,
    /// Zero for invoices without an amount.
    pub amount_msat: i64,
    pub created_at: i64,
    pub expiry: i64,
    pub description: String,
    pub description_hash: String,
    pub payee: String,
}

impl DecodedInvoice {
    pub fn expires_at(&self) -> Option<i64> {
        crate::transactions::expires_at(self.created_at, self.expiry)
    }
}

pub fn decode(invoice: &str) -> Result<DecodedInvoice, DecodeError> {
    let bolt11 = Bolt11Invoice::from_str(&invoice.trim().to_lowercase()).map_err(|e| DecodeError {
        input: invoice.to_string(),
        message: format!("invalid bolt11 invoice: {e}"),
    })?;
    let (description, description_hash) = match bolt11.description() {
        Bolt11InvoiceDescription::Direct(description) => {
            (description.clone().into_inner(), String::new())
        }
        Bolt11InvoiceDescription::Hash(hash) => (String::new(), hex::encode(hash.0.into_inner())),
    };
    let payee = bolt11
        .payee_pub_key()
        .copied()
        .unwrap_or_else(|| bolt11.recover_payee_pub_key());
    Ok(DecodedInvoice {
        payment_hash: hex::encode(bolt11.payment_hash().into_inner()),
        amount_msat: bolt11.amount_milli_satoshis().unwrap_or_default() as i64,
        created_at: bolt11.duration_since_epoch().as_secs() as i64,
        expiry: bolt11.expiry_time().as_secs() as i64,
        description,
        description_hash,
        payee: payee.to_string(),
    })
}
