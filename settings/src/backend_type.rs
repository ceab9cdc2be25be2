use std::{fmt, str::FromStr};

/// Lightning backend the hub talks to. Chosen once at startup.
#[derive(Copy, PartialEq, Eq, Clone, Debug)]
pub enum BackendType {
    /// Full routing node reached over its RPC gateway.
    Lnd,
    /// Remote phoenixd service over HTTP with basic auth.
    Phoenix,
    /// Ecash wallet backed by a Cashu mint.
    Cashu,
}

impl fmt::Display for BackendType {
    fn fmt(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        write!(
            formatter,
            "{}",
            match self {
                BackendType::Lnd => "LND",
                BackendType::Phoenix => "PHOENIX",
                BackendType::Cashu => "CASHU",
            }
        )
    }
}

impl FromStr for BackendType {
    type Err = &'static str;

    fn from_str(input: &str) -> Result<BackendType, Self::Err> {
        match input {
            "LND" => Ok(BackendType::Lnd),
            "PHOENIX" => Ok(BackendType::Phoenix),
            "CASHU" => Ok(BackendType::Cashu),
            _ => Err("not a valid value, must be one of: LND, PHOENIX or CASHU"),
        }
    }
}
