//! Subscriber authentication vector source
//!
//! The engine obtains one AKA vector (RAND, AUTN, XRES, CK, IK) per
//! challenge from a [`VectorSource`]. Production deployments implement the
//! trait over their HSS/UDM client; [`StaticVectorSource`] serves vectors
//! provisioned in configuration.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;
use thiserror::Error;

use crate::config::{ConfigError, Subscriber};

/// Errors reported by a vector source
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VectorError {
    #[error("Subscriber not found: {0}")]
    NotFound(String),

    #[error("Subscriber {0} belongs to another PLMN")]
    WrongPlmn(String),

    #[error("Vector source transport error: {0}")]
    Transport(String),
}

impl VectorError {
    /// Short label for logs and the audit trail
    pub fn kind(&self) -> &'static str {
        match self {
            VectorError::NotFound(_) => "not_found",
            VectorError::WrongPlmn(_) => "wrong_plmn",
            VectorError::Transport(_) => "transport",
        }
    }
}

/// One AKA authentication vector
#[derive(Clone, PartialEq, Eq)]
pub struct AuthVector {
    pub rand: [u8; 16],
    pub autn: [u8; 16],
    /// Expected response, 4-16 bytes
    pub xres: Vec<u8>,
    pub ck: [u8; 16],
    pub ik: [u8; 16],
    /// Subscriber MSISDN, returned with a successful authentication
    pub msisdn: Option<String>,
}

impl std::fmt::Debug for AuthVector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthVector")
            .field("rand", &hex::encode(self.rand))
            .field("msisdn", &self.msisdn)
            .finish_non_exhaustive()
    }
}

fn decode_field<const N: usize>(imsi: &str, name: &str, value: &str) -> Result<[u8; N], ConfigError> {
    let bytes = hex::decode(value).map_err(|e| {
        ConfigError::Invalid(format!("Subscriber {}: invalid {} hex: {}", imsi, name, e))
    })?;
    <[u8; N]>::try_from(bytes.as_slice()).map_err(|_| {
        ConfigError::Invalid(format!(
            "Subscriber {}: {} must be {} bytes, got {}",
            imsi,
            name,
            N,
            bytes.len()
        ))
    })
}

impl TryFrom<&Subscriber> for AuthVector {
    type Error = ConfigError;

    fn try_from(subscriber: &Subscriber) -> Result<Self, Self::Error> {
        let imsi = subscriber.imsi.as_str();
        if imsi.is_empty() || !imsi.chars().all(|c| c.is_ascii_digit()) {
            return Err(ConfigError::Invalid(format!("Invalid IMSI: {}", imsi)));
        }

        let xres = hex::decode(&subscriber.xres).map_err(|e| {
            ConfigError::Invalid(format!("Subscriber {}: invalid xres hex: {}", imsi, e))
        })?;
        if !(4..=16).contains(&xres.len()) {
            return Err(ConfigError::Invalid(format!(
                "Subscriber {}: xres must be 4-16 bytes, got {}",
                imsi,
                xres.len()
            )));
        }

        Ok(AuthVector {
            rand: decode_field(imsi, "rand", &subscriber.rand)?,
            autn: decode_field(imsi, "autn", &subscriber.autn)?,
            xres,
            ck: decode_field(imsi, "ck", &subscriber.ck)?,
            ik: decode_field(imsi, "ik", &subscriber.ik)?,
            msisdn: subscriber.msisdn.clone(),
        })
    }
}

/// Source of authentication vectors
///
/// Implementations must be thread-safe; the engine calls `fetch_vector`
/// while holding the session lock, so one call per challenge.
#[async_trait]
pub trait VectorSource: Send + Sync {
    /// Fetch a fresh vector for the subscriber with this IMSI
    async fn fetch_vector(&self, imsi: &str) -> Result<AuthVector, VectorError>;
}

/// In-memory vector source keyed by IMSI
///
/// Returns the same vector for every fetch, which is only suitable for
/// lab use and tests.
#[derive(Debug, Default)]
pub struct StaticVectorSource {
    vectors: RwLock<HashMap<String, AuthVector>>,
}

impl StaticVectorSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from configured subscribers
    pub fn from_config(subscribers: &[Subscriber]) -> Result<Self, ConfigError> {
        let source = Self::new();
        for subscriber in subscribers {
            source.insert(&subscriber.imsi, AuthVector::try_from(subscriber)?);
        }
        Ok(source)
    }

    /// Provision or replace a subscriber's vector
    pub fn insert(&self, imsi: &str, vector: AuthVector) {
        if let Ok(mut vectors) = self.vectors.write() {
            vectors.insert(imsi.to_string(), vector);
        }
    }

    pub fn len(&self) -> usize {
        self.vectors.read().map(|v| v.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl VectorSource for StaticVectorSource {
    async fn fetch_vector(&self, imsi: &str) -> Result<AuthVector, VectorError> {
        let vectors = self
            .vectors
            .read()
            .map_err(|_| VectorError::Transport("vector table poisoned".to_string()))?;
        vectors
            .get(imsi)
            .cloned()
            .ok_or_else(|| VectorError::NotFound(imsi.to_string()))
    }
}
