mod backend_type;

pub use backend_type::BackendType;
use clap::{builder::OsStr, Parser};

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Settings {
    #[arg(long, default_value = "LND", env = "HUB_LN_BACKEND_TYPE")]
    pub ln_backend_type: BackendType,

    /// host:port of the LND REST gateway.
    #[arg(long, env = "HUB_LND_ADDRESS")]
    pub lnd_address: Option<String>,
    #[arg(long, env = "HUB_LND_CERT_FILE")]
    pub lnd_cert_file: Option<String>,
    #[arg(long, env = "HUB_LND_MACAROON_FILE")]
    pub lnd_macaroon_file: Option<String>,

    /// Base URL of the phoenixd HTTP API.
    #[arg(long, env = "HUB_PHOENIXD_ADDRESS")]
    pub phoenixd_address: Option<String>,
    /// The http-password from phoenix.conf.
    #[arg(long, env = "HUB_PHOENIXD_AUTHORIZATION")]
    pub phoenixd_authorization: Option<String>,

    #[arg(
        long,
        default_value = "https://8333.space:3338",
        env = "HUB_CASHU_MINT_URL"
    )]
    pub cashu_mint_url: String,

    #[arg(long, default_value = "/var/lib/nwc-hub", env = "HUB_WORK_DIR")]
    pub work_dir: String,
    #[arg(long, default_value = "info", env = "HUB_LOG_LEVEL")]
    pub log_level: String,
    #[arg(long, default_value = "one", env = "HUB_NODE_ID")]
    pub node_id: String,
}

impl Settings {
    pub fn load() -> Settings {
        Settings::parse()
    }

    /// Directory the cashu wallet keeps its proofs and quotes in.
    pub fn cashu_dir(&self) -> String {
        format!("{}/cashu", self.work_dir)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Settings::parse_from::<Vec<OsStr>, OsStr>(vec![])
    }
}
