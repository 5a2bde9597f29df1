//! Signing-rate sources.
//!
//! Signing-rate statistics are computed elsewhere (the data API aggregates
//! them per protocol version); the ejector only consumes them through
//! [`SigningRateLookup`].

use crate::chain::{QuorumId, ValidatorId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Protocol version a signing-rate source reports on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolVersion {
    V1,
    V2,
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::V1 => write!(f, "v1"),
            Self::V2 => write!(f, "v2"),
        }
    }
}

/// Per-validator signing statistics over a time window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorSigningRate {
    pub validator_id: ValidatorId,
    pub signed_batches: u64,
    pub unsigned_batches: u64,
    pub signed_bytes: u64,
    pub unsigned_bytes: u64,
    /// Average latency of the signed batches.
    #[serde(default)]
    pub signing_latency: Duration,
}

impl ValidatorSigningRate {
    /// An empty record for `validator_id`.
    pub fn new(validator_id: ValidatorId) -> Self {
        Self {
            validator_id,
            signed_batches: 0,
            unsigned_batches: 0,
            signed_bytes: 0,
            unsigned_bytes: 0,
            signing_latency: Duration::ZERO,
        }
    }
}

/// Signing-rate lookup errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LookupError {
    #[error("Signing-rate source unavailable: {0}")]
    Unavailable(String),

    #[error("Malformed signing-rate response: {0}")]
    Malformed(String),

    #[error("Signing-rate lookup timed out after {0:?}")]
    Timeout(Duration),
}

/// Source of per-validator signing rates.
#[async_trait]
pub trait SigningRateLookup: Send + Sync {
    /// Signing rates over the window of length `time_span` ending now.
    ///
    /// An empty `quorums` slice means every quorum. With `omit_perfect_signers`
    /// set, validators that signed every batch assigned to them are left out.
    async fn get_signing_rates(
        &self,
        time_span: Duration,
        quorums: &[QuorumId],
        protocol_version: ProtocolVersion,
        omit_perfect_signers: bool,
    ) -> Result<Vec<ValidatorSigningRate>, LookupError>;
}
