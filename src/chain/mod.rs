//! Chain boundary for the ejector.
//!
//! - Trait abstractions for ejection transactions and validator lookups
//! - Mock implementations for tests
//! - A dry-run transactor for offline rehearsals

pub mod dry_run;
pub mod mock;
pub mod traits;

pub use dry_run::DryRunTransactor;
pub use traits::{
    ChainError, ChainResult, EjectionTransactor, QuorumId, StakeFractions, ValidatorAddress,
    ValidatorDirectory, ValidatorId, ValidatorStake,
};
