//! Signing-rate snapshots for offline rehearsals.
//!
//! A snapshot is a JSON document holding what the data API and the chain would
//! report at one moment: per-version signing rates plus the address and stake
//! of every validator that appears in them.
//!
//! ```json
//! {
//!   "validators": [
//!     { "validator_id": "0x…", "address": "0x…", "stake_fractions": { "0": 0.02 } }
//!   ],
//!   "v1": [ { "validator_id": "0x…", "signed_batches": 0, "unsigned_batches": 12,
//!            "signed_bytes": 0, "unsigned_bytes": 4096 } ],
//!   "v2": []
//! }
//! ```

use super::traits::*;
use crate::chain::{
    ChainResult, QuorumId, StakeFractions, ValidatorAddress, ValidatorDirectory, ValidatorId,
    ValidatorStake,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Snapshot loading errors.
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("Failed to read snapshot '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse snapshot '{path}': {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Validator entry of a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotValidator {
    pub validator_id: ValidatorId,
    pub address: ValidatorAddress,
    pub stake_fractions: StakeFractions,
}

/// Point-in-time view of signing rates and validator stakes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SigningRateSnapshot {
    #[serde(default)]
    pub validators: Vec<SnapshotValidator>,
    #[serde(default)]
    pub v1: Vec<ValidatorSigningRate>,
    #[serde(default)]
    pub v2: Vec<ValidatorSigningRate>,
}

impl SigningRateSnapshot {
    /// Load a snapshot from a JSON file.
    pub fn load(path: &Path) -> Result<Self, SnapshotError> {
        let contents = std::fs::read_to_string(path).map_err(|source| SnapshotError::Io {
            path: path.display().to_string(),
            source,
        })?;
        serde_json::from_str(&contents).map_err(|source| SnapshotError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    /// Signing-rate source serving this snapshot's records for `version`.
    pub fn lookup(&self, version: ProtocolVersion) -> SnapshotSigningRateLookup {
        let rates = match version {
            ProtocolVersion::V1 => self.v1.clone(),
            ProtocolVersion::V2 => self.v2.clone(),
        };
        SnapshotSigningRateLookup {
            version,
            rates: Arc::new(rates),
        }
    }

    /// Validator directory backed by this snapshot.
    pub fn directory(&self) -> SnapshotDirectory {
        let validators = self
            .validators
            .iter()
            .map(|v| {
                (
                    v.validator_id,
                    ValidatorStake {
                        address: v.address,
                        stake_fractions: v.stake_fractions.clone(),
                    },
                )
            })
            .collect();
        SnapshotDirectory {
            validators: Arc::new(validators),
        }
    }
}

/// Signing-rate source over a fixed snapshot.
#[derive(Clone)]
pub struct SnapshotSigningRateLookup {
    version: ProtocolVersion,
    rates: Arc<Vec<ValidatorSigningRate>>,
}

#[async_trait]
impl SigningRateLookup for SnapshotSigningRateLookup {
    async fn get_signing_rates(
        &self,
        _time_span: Duration,
        _quorums: &[QuorumId],
        protocol_version: ProtocolVersion,
        omit_perfect_signers: bool,
    ) -> Result<Vec<ValidatorSigningRate>, LookupError> {
        if protocol_version != self.version {
            return Err(LookupError::Unavailable(format!(
                "snapshot source serves {}, asked for {}",
                self.version, protocol_version
            )));
        }

        Ok(self
            .rates
            .iter()
            .filter(|rate| !omit_perfect_signers || rate.unsigned_batches > 0)
            .cloned()
            .collect())
    }
}

/// Validator directory over a fixed snapshot.
#[derive(Clone)]
pub struct SnapshotDirectory {
    validators: Arc<HashMap<ValidatorId, ValidatorStake>>,
}

#[async_trait]
impl ValidatorDirectory for SnapshotDirectory {
    async fn validator_stake(&self, id: &ValidatorId) -> ChainResult<Option<ValidatorStake>> {
        Ok(self.validators.get(id).cloned())
    }
}
