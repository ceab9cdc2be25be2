use std::str::FromStr;

use anyhow::Result;
use api::{ListTransactionsParams, TlvRecord, TransactionType};
use clap::{Parser, Subcommand};
use lnclient_hub::{connect, lnclient::LnClient, log_error};
use log::LevelFilter;
use logger::HubLogger;
use serde::Serialize;
use settings::Settings;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(flatten)]
    settings: Settings,
    /// Command to run.
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch information about the backend node.
    GetInfo,
    /// Fetch onchain and lightning balances.
    GetBalances,
    /// Create an invoice.
    MakeInvoice {
        /// Amount in millisatoshis.
        #[arg(long)]
        amount_msat: i64,
        #[arg(long, default_value = "")]
        description: String,
        /// Hex encoded sha256 of the description.
        #[arg(long, default_value = "")]
        description_hash: String,
        /// Seconds until the invoice expires. Zero for the backend default.
        #[arg(long, default_value_t = 0)]
        expiry: i64,
    },
    /// Look up an invoice by its payment hash.
    LookupInvoice {
        #[arg(long)]
        payment_hash: String,
    },
    /// List incoming and outgoing payments, newest first.
    ListTransactions {
        /// Unix timestamp of the window start.
        #[arg(long, default_value_t = 0)]
        from: u64,
        /// Unix timestamp of the window end.
        #[arg(long, default_value_t = 0)]
        until: u64,
        #[arg(long, default_value_t = 0)]
        limit: u64,
        #[arg(long, default_value_t = 0)]
        offset: u64,
        /// Include invoices and payments that have not settled.
        #[arg(long)]
        unpaid: bool,
        /// incoming or outgoing
        #[arg(long)]
        r#type: Option<String>,
    },
    /// Pay a bolt11 invoice and wait for the result.
    PayInvoice {
        #[arg(long)]
        invoice: String,
    },
    /// Send a spontaneous payment.
    Keysend {
        /// Public key of the receiving node.
        #[arg(long)]
        destination: String,
        #[arg(long)]
        amount_msat: i64,
        /// Hex encoded 32 byte preimage. A random one is used when left out.
        #[arg(long)]
        preimage: Option<String>,
        /// Custom records as [type=hexvalue].
        #[arg(long)]
        record: Vec<String>,
    },
    /// Sign a message with the node key.
    SignMessage {
        #[arg(long)]
        message: String,
    },
}

fn main() {
    let args = Args::parse();
    HubLogger::init(
        &args.settings.node_id,
        &args.settings.ln_backend_type.to_string(),
        LevelFilter::from_str(&args.settings.log_level).unwrap_or(LevelFilter::Info),
    );

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Error starting runtime: {e}");
            std::process::exit(1);
        }
    };
    if let Err(e) = runtime.block_on(run_command(args)) {
        log_error(&e);
        eprintln!("Error executing command: {e}");
        std::process::exit(1);
    }
}

async fn run_command(args: Args) -> Result<()> {
    let client = connect(&args.settings).await?;
    let output = match args.command {
        Command::GetInfo => to_json(&client.get_info().await?)?,
        Command::GetBalances => to_json(&client.get_balances().await?)?,
        Command::MakeInvoice {
            amount_msat,
            description,
            description_hash,
            expiry,
        } => to_json(
            &client
                .make_invoice(amount_msat, &description, &description_hash, expiry)
                .await?,
        )?,
        Command::LookupInvoice { payment_hash } => {
            to_json(&client.lookup_invoice(&payment_hash).await?)?
        }
        Command::ListTransactions {
            from,
            until,
            limit,
            offset,
            unpaid,
            r#type,
        } => {
            let transaction_type = r#type
                .map(|t| TransactionType::from_str(&t))
                .transpose()
                .map_err(anyhow::Error::msg)?;
            let params = ListTransactionsParams {
                from,
                until,
                limit,
                offset,
                unpaid,
                transaction_type,
            };
            to_json(&client.list_transactions(params).await?)?
        }
        Command::PayInvoice { invoice } => to_json(&client.send_payment_sync(&invoice).await?)?,
        Command::Keysend {
            destination,
            amount_msat,
            preimage,
            record,
        } => {
            let records = record
                .iter()
                .map(|r| parse_record(r))
                .collect::<Result<Vec<TlvRecord>>>()?;
            to_json(
                &client
                    .send_keysend(amount_msat, &destination, preimage.as_deref(), &records)
                    .await?,
            )?
        }
        Command::SignMessage { message } => to_json(&client.sign_message(&message).await?)?,
    };
    println!("{output}");
    client.shutdown().await?;
    Ok(())
}

fn to_json<T: Serialize>(value: &T) -> Result<String> {
    Ok(serde_json::to_string_pretty(value)?)
}

fn parse_record(record: &str) -> Result<TlvRecord> {
    let (record_type, value) = record
        .split_once('=')
        .ok_or_else(|| anyhow::anyhow!("custom record {record} is not type=hexvalue"))?;
    Ok(TlvRecord {
        record_type: record_type.parse()?,
        value: hex::decode(value)?,
    })
}
