use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Name the upstream service uses for the shared public network.
pub const PUBLIC_NETWORK: &str = "public";

/// Target storage network of a job.
///
/// Parsed once when a job is decoded. `Public` needs no access check,
/// `Named` networks are private and require the user to be authorized
/// before any side effect.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Network {
    Public,
    Named(String),
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("network name must not be empty")]
pub struct NetworkParseError;

impl Network {
    pub fn is_public(&self) -> bool {
        matches!(self, Network::Public)
    }

    pub fn as_str(&self) -> &str {
        match self {
            Network::Public => PUBLIC_NETWORK,
            Network::Named(name) => name,
        }
    }
}

impl FromStr for Network {
    type Err = NetworkParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" => Err(NetworkParseError),
            PUBLIC_NETWORK => Ok(Network::Public),
            name => Ok(Network::Named(name.to_string())),
        }
    }
}

impl TryFrom<String> for Network {
    type Error = NetworkParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if value == PUBLIC_NETWORK {
            return Ok(Network::Public);
        }
        if value.is_empty() {
            return Err(NetworkParseError);
        }
        Ok(Network::Named(value))
    }
}

impl From<Network> for String {
    fn from(value: Network) -> Self {
        match value {
            Network::Public => PUBLIC_NETWORK.to_string(),
            Network::Named(name) => name,
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_public() {
        assert_eq!("public".parse::<Network>(), Ok(Network::Public));
        assert!(Network::Public.is_public());
    }

    #[test]
    fn test_parse_named() {
        let net: Network = "acme-private".parse().unwrap();
        assert_eq!(net, Network::Named("acme-private".into()));
        assert!(!net.is_public());
        assert_eq!(net.to_string(), "acme-private");
    }

    #[test]
    fn test_empty_rejected() {
        assert_eq!("".parse::<Network>(), Err(NetworkParseError));
        assert!(serde_json::from_str::<Network>("\"\"").is_err());
    }

    #[test]
    fn test_serde_as_plain_string() {
        let json = serde_json::to_string(&Network::Public).unwrap();
        assert_eq!(json, "\"public\"");
        let back: Network = serde_json::from_str("\"lab\"").unwrap();
        assert_eq!(back, Network::Named("lab".into()));
    }
}
