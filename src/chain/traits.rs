//! Trait abstractions for chain operations.
//!
//! The ejection manager and its tests only ever see these traits; concrete
//! RPC-backed implementations live with the contract bindings, outside this
//! crate.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Quorum identifier (an 8-bit integer on-chain).
pub type QuorumId = u8;

/// A validator's stake in each quorum it belongs to, as a fraction of 1.0.
///
/// Ordered so that per-quorum throttle fills always run in ascending quorum order.
pub type StakeFractions = BTreeMap<QuorumId, f64>;

/// Errors produced when parsing hex identifiers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdParseError {
    #[error("Invalid hex: {0}")]
    InvalidHex(String),

    #[error("Expected {expected} bytes, got {actual}")]
    WrongLength { expected: usize, actual: usize },
}

fn decode_fixed<const N: usize>(s: &str) -> Result<[u8; N], IdParseError> {
    let trimmed = s.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    let bytes = hex::decode(digits).map_err(|e| IdParseError::InvalidHex(e.to_string()))?;
    if bytes.len() != N {
        return Err(IdParseError::WrongLength {
            expected: N,
            actual: bytes.len(),
        });
    }
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes);
    Ok(out)
}

/// Chain address of a validator (20 bytes).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ValidatorAddress([u8; 20]);

impl ValidatorAddress {
    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    /// Get bytes.
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }
}

impl fmt::Display for ValidatorAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl FromStr for ValidatorAddress {
    type Err = IdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        decode_fixed::<20>(s).map(Self)
    }
}

impl TryFrom<String> for ValidatorAddress {
    type Error = IdParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ValidatorAddress> for String {
    fn from(address: ValidatorAddress) -> Self {
        address.to_string()
    }
}

/// Operator ID used by signing-rate sources (32 bytes).
///
/// Ordering is byte-lexicographic, which matches the ordering of the hex form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ValidatorId([u8; 32]);

impl ValidatorId {
    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for ValidatorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl FromStr for ValidatorId {
    type Err = IdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        decode_fixed::<32>(s).map(Self)
    }
}

impl TryFrom<String> for ValidatorId {
    type Error = IdParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ValidatorId> for String {
    fn from(id: ValidatorId) -> Self {
        id.to_string()
    }
}

/// Result type for chain operations.
pub type ChainResult<T> = Result<T, ChainError>;

/// Chain operation errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChainError {
    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("Transaction reverted: {0}")]
    Reverted(String),

    #[error("Chain call timed out after {0:?}")]
    Timeout(Duration),
}

/// Submits and inspects ejection transactions.
///
/// Every method is blocking network I/O from the caller's point of view and may
/// fail; callers bound each call with a timeout.
#[async_trait]
pub trait EjectionTransactor: Send + Sync {
    /// Start ejection proceedings against a validator.
    async fn start_ejection(&self, address: &ValidatorAddress) -> ChainResult<()>;

    /// Check whether an ejection is currently in progress on-chain.
    async fn is_ejection_in_progress(&self, address: &ValidatorAddress) -> ChainResult<bool>;

    /// Check whether the validator is still a member of any quorum.
    async fn is_validator_present_in_any_quorum(
        &self,
        address: &ValidatorAddress,
    ) -> ChainResult<bool>;

    /// Complete a previously started ejection.
    async fn complete_ejection(&self, address: &ValidatorAddress) -> ChainResult<()>;
}

/// Chain identity and current stake of a validator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidatorStake {
    pub address: ValidatorAddress,
    pub stake_fractions: StakeFractions,
}

/// Resolves operator IDs reported by signing-rate sources to chain state.
#[async_trait]
pub trait ValidatorDirectory: Send + Sync {
    /// Look up a validator's address and per-quorum stake fractions.
    ///
    /// Returns `Ok(None)` if the validator is not registered.
    async fn validator_stake(&self, id: &ValidatorId) -> ChainResult<Option<ValidatorStake>>;
}
