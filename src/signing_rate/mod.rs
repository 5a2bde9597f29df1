//! Signing-rate inputs of the ejector.
//!
//! - Lookup trait and record types
//! - Cross-version merge and severity ranking
//! - Snapshot-backed sources for rehearsals
//! - Mock source for tests

pub mod merge;
pub mod mock;
pub mod snapshot;
pub mod traits;

pub use merge::{combine_signing_rates, merge_signing_rates, rank_by_severity};
pub use snapshot::SigningRateSnapshot;
pub use traits::{LookupError, ProtocolVersion, SigningRateLookup, ValidatorSigningRate};
