//! Signing keys for naming records.
//!
//! Keys are held as libp2p identity keypairs. Ed25519 keys are exchanged
//! with the content store in the libp2p protobuf encoding. libp2p cannot
//! export RSA private keys, so those travel as PKCS#8 PEM instead.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use libp2p_identity::Keypair;
use rand::rngs::OsRng;
use rsa::RsaPrivateKey;
use rsa::pkcs8::{DecodePrivateKey, EncodePrivateKey, LineEnding};

pub const ED25519_BITS: u32 = 256;
pub const RSA_MIN_BITS: u32 = 2048;
pub const RSA_MAX_BITS: u32 = 4096;

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum KeyError {
    #[error("unsupported key type '{0}'")]
    UnsupportedType(String),
    #[error("invalid rsa key size {0}, expected {RSA_MIN_BITS}..={RSA_MAX_BITS} bits")]
    InvalidSize(u32),
    #[error("malformed key encoding: {0}")]
    Malformed(&'static str),
    #[error("rsa: {0}")]
    Rsa(#[from] rsa::Error),
    #[error("pkcs8: {0}")]
    Pkcs8(#[from] rsa::pkcs8::Error),
    #[error(transparent)]
    Decoding(#[from] libp2p_identity::DecodingError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyType {
    Ed25519,
    Rsa,
}

/// A validated key generation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeySpec {
    pub key_type: KeyType,
    pub bits: u32,
}

impl KeySpec {
    pub const ED25519: KeySpec = KeySpec {
        key_type: KeyType::Ed25519,
        bits: ED25519_BITS,
    };

    /// Validates a requested key type and size.
    ///
    /// Ed25519 keys are always 256 bits and ignore `size`. RSA keys must be
    /// between 2048 and 4096 bits.
    pub fn parse(key_type: &str, size: u32) -> Result<Self, KeyError> {
        match key_type {
            "ed25519" => Ok(Self::ED25519),
            "rsa" if (RSA_MIN_BITS..=RSA_MAX_BITS).contains(&size) => Ok(Self {
                key_type: KeyType::Rsa,
                bits: size,
            }),
            "rsa" => Err(KeyError::InvalidSize(size)),
            other => Err(KeyError::UnsupportedType(other.to_string())),
        }
    }
}

/// Serialized private key formats, named the way Kubo's `key/import` does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyFormat {
    Libp2pProtobuf,
    Pkcs8Pem,
}

impl KeyFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyFormat::Libp2pProtobuf => "libp2p-protobuf-cleartext",
            KeyFormat::Pkcs8Pem => "pem-pkcs8-cleartext",
        }
    }
}

impl FromStr for KeyFormat {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "libp2p-protobuf-cleartext" => Ok(KeyFormat::Libp2pProtobuf),
            "pem-pkcs8-cleartext" => Ok(KeyFormat::Pkcs8Pem),
            _ => Err(KeyError::Malformed("unknown key format")),
        }
    }
}

/// A private key serialized for storage or import.
#[derive(Clone)]
pub struct ExportedKey {
    pub format: KeyFormat,
    pub bytes: Vec<u8>,
}

/// A private signing key.
#[derive(Clone)]
pub struct PrivateKey {
    keypair: Keypair,
    rsa_pem: Option<String>,
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrivateKey")
            .field("key_type", &self.key_type())
            .field("peer_id", &self.peer_id())
            .finish_non_exhaustive()
    }
}

impl PrivateKey {
    /// Generates a fresh key. RSA generation is CPU heavy, async callers
    /// should run it on a blocking thread.
    pub fn generate(spec: KeySpec) -> Result<Self, KeyError> {
        match spec.key_type {
            KeyType::Ed25519 => Ok(Self {
                keypair: Keypair::generate_ed25519(),
                rsa_pem: None,
            }),
            KeyType::Rsa => Self::from_rsa(&RsaPrivateKey::new(&mut OsRng, spec.bits as usize)?),
        }
    }

    fn from_rsa(key: &RsaPrivateKey) -> Result<Self, KeyError> {
        let pem = key.to_pkcs8_pem(LineEnding::LF)?;
        let mut der = key.to_pkcs8_der()?.as_bytes().to_vec();
        Ok(Self {
            keypair: Keypair::rsa_from_pkcs8(&mut der)?,
            rsa_pem: Some(pem.to_string()),
        })
    }

    pub fn key_type(&self) -> KeyType {
        match self.rsa_pem {
            Some(_) => KeyType::Rsa,
            None => KeyType::Ed25519,
        }
    }

    pub fn export(&self) -> Result<ExportedKey, KeyError> {
        match &self.rsa_pem {
            Some(pem) => Ok(ExportedKey {
                format: KeyFormat::Pkcs8Pem,
                bytes: pem.as_bytes().to_vec(),
            }),
            None => Ok(ExportedKey {
                format: KeyFormat::Libp2pProtobuf,
                bytes: self.keypair.to_protobuf_encoding()?,
            }),
        }
    }

    pub fn import(format: KeyFormat, bytes: &[u8]) -> Result<Self, KeyError> {
        match format {
            KeyFormat::Libp2pProtobuf => Ok(Self {
                keypair: Keypair::from_protobuf_encoding(bytes)?,
                rsa_pem: None,
            }),
            KeyFormat::Pkcs8Pem => {
                let pem = std::str::from_utf8(bytes)
                    .map_err(|_| KeyError::Malformed("pem document is not utf-8"))?;
                Self::from_rsa(&RsaPrivateKey::from_pkcs8_pem(pem)?)
            }
        }
    }

    /// Base58 peer id derived from the public key.
    pub fn peer_id(&self) -> String {
        self.keypair.public().to_peer_id().to_base58()
    }
}

/// Issues and stores named private keys.
#[async_trait]
pub trait KeyStore: Send + Sync + 'static {
    /// Generates a key for `spec` and stores it under `name`.
    ///
    /// Fails when a key with that name already exists.
    async fn create_key(&self, name: &str, spec: KeySpec) -> anyhow::Result<PrivateKey>;

    async fn get_private_key(&self, name: &str) -> anyhow::Result<PrivateKey>;
}
