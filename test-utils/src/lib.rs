use std::{str::FromStr, time::Duration};

use bitcoin::hashes::{sha256, Hash};
use bitcoin::secp256k1::{Secp256k1, SecretKey};
use clap::{builder::OsStr, Parser};
use lightning::ln::{PaymentHash, PaymentSecret};
use lightning_invoice::{Currency, InvoiceBuilder};
use settings::{BackendType, Settings};

/// Secret key 1. Its public key is the generator point.
pub const TEST_PRIVATE_KEY: &str =
    "0000000000000000000000000000000000000000000000000000000000000001";
pub const TEST_PUBLIC_KEY: &str =
    "0279be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798";

pub struct TestSettingsBuilder {
    settings: Settings,
}

impl TestSettingsBuilder {
    pub fn new() -> TestSettingsBuilder {
        let settings = Settings::parse_from::<Vec<OsStr>, OsStr>(vec![]);
        TestSettingsBuilder { settings }
    }

    pub fn with_backend(mut self, backend: BackendType) -> TestSettingsBuilder {
        self.settings.ln_backend_type = backend;
        self
    }

    pub fn with_phoenixd(mut self, address: &str, password: &str) -> TestSettingsBuilder {
        self.settings.ln_backend_type = BackendType::Phoenix;
        self.settings.phoenixd_address = Some(address.to_string());
        self.settings.phoenixd_authorization = Some(password.to_string());
        self
    }

    pub fn with_cashu_mint(mut self, mint_url: &str) -> TestSettingsBuilder {
        self.settings.ln_backend_type = BackendType::Cashu;
        self.settings.cashu_mint_url = mint_url.to_string();
        self
    }

    pub fn with_work_dir(mut self, work_dir: &str) -> TestSettingsBuilder {
        self.settings.work_dir = work_dir.to_string();
        self
    }

    pub fn build(self) -> Settings {
        self.settings
    }
}

impl Default for TestSettingsBuilder {
    fn default() -> Self {
        TestSettingsBuilder::new()
    }
}

/// What goes into a regtest invoice signed with [`TEST_PRIVATE_KEY`].
#[derive(Debug, Clone)]
pub struct TestInvoice {
    pub amount_msat: Option<u64>,
    pub description: String,
    /// Takes precedence over `description`.
    pub description_hash: Option<[u8; 32]>,
    pub created_at: u64,
    pub expiry: u64,
}

impl Default for TestInvoice {
    fn default() -> Self {
        TestInvoice {
            amount_msat: Some(1000),
            description: "test".to_string(),
            description_hash: None,
            created_at: 1_700_000_000,
            expiry: 3600,
        }
    }
}

pub struct BuiltInvoice {
    pub bolt11: String,
    /// Hex.
    pub payment_hash: String,
    /// Hex.
    pub preimage: String,
}

pub fn build_invoice(invoice: TestInvoice) -> BuiltInvoice {
    let preimage: [u8; 32] = rand::random();
    let payment_hash = PaymentHash(sha256::Hash::hash(&preimage).into_inner());
    let secp_ctx = Secp256k1::new();
    let private_key = SecretKey::from_str(TEST_PRIVATE_KEY).unwrap();
    let sign = |hash: &bitcoin::secp256k1::Message| {
        secp_ctx.sign_ecdsa_recoverable(hash, &private_key)
    };

    let builder = InvoiceBuilder::new(Currency::Regtest)
        .payment_hash(sha256::Hash::from_inner(payment_hash.0))
        .payment_secret(PaymentSecret(rand::random()))
        .duration_since_epoch(Duration::from_secs(invoice.created_at))
        .expiry_time(Duration::from_secs(invoice.expiry))
        .min_final_cltv_expiry_delta(144);
    let builder = match invoice.amount_msat {
        Some(amount_msat) => builder.amount_milli_satoshis(amount_msat),
        None => builder,
    };
    let bolt11 = match invoice.description_hash {
        Some(hash) => builder
            .description_hash(sha256::Hash::from_inner(hash))
            .build_signed(sign),
        None => builder.description(invoice.description).build_signed(sign),
    }
    .unwrap();

    BuiltInvoice {
        bolt11: bolt11.to_string(),
        payment_hash: hex::encode(payment_hash.0),
        preimage: hex::encode(preimage),
    }
}
