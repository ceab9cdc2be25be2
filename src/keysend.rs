use std::collections::BTreeMap;

use api::{MillisatAmount, TlvRecord};
use bitcoin::{
    hashes::{sha256, Hash},
    secp256k1::PublicKey,
};
use lightning::ln::{PaymentHash, PaymentPreimage};
use rand::random;

use crate::lnclient::{validate, LnClientError, Result};

/// Custom record type receivers read the keysend preimage from.
pub const KEYSEND_CUSTOM_RECORD: u64 = 5482373484;

/// A spontaneous payment ready to hand to a backend. Building one never touches the network.
#[derive(Clone, Debug)]
pub struct KeysendPayment {
    pub destination: PublicKey,
    pub amount_msat: MillisatAmount,
    pub preimage: PaymentPreimage,
    pub payment_hash: PaymentHash,
    pub custom_records: BTreeMap<u64, Vec<u8>>,
}

impl KeysendPayment {
    /// A fresh random preimage is generated when none (or an empty one) is given.
    pub fn new(
        amount_msat: MillisatAmount,
        destination: &str,
        preimage: Option<&str>,
        custom_records: &[TlvRecord],
    ) -> Result<KeysendPayment> {
        const OPERATION: &str = "send_keysend";
        if amount_msat <= 0 {
            return Err(LnClientError::validation(
                OPERATION,
                format!("amount must be positive, got {amount_msat}"),
            ));
        }
        let destination = validate::public_key(OPERATION, destination)?;
        let preimage = match preimage.filter(|p| !p.is_empty()) {
            Some(preimage) => PaymentPreimage(validate::hex32(OPERATION, "preimage", preimage)?),
            None => PaymentPreimage(random()),
        };
        let payment_hash = PaymentHash(sha256::Hash::hash(&preimage.0).into_inner());

        let mut records: BTreeMap<u64, Vec<u8>> = custom_records
            .iter()
            .map(|r| (r.record_type, r.value.clone()))
            .collect();
        records.insert(KEYSEND_CUSTOM_RECORD, preimage.0.to_vec());

        Ok(KeysendPayment {
            destination,
            amount_msat,
            preimage,
            payment_hash,
            custom_records: records,
        })
    }

    pub fn preimage_hex(&self) -> String {
        hex::encode(self.preimage.0)
    }

    pub fn payment_hash_hex(&self) -> String {
        hex::encode(self.payment_hash.0)
    }
}
