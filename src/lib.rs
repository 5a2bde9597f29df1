//! Ejector - Validator Ejection Lifecycle Manager
//!
//! Removes validators that stop signing batches from a data-availability
//! network's active set, via on-chain ejection transactions.
//!
//! Key principles:
//! - Only total non-signers are ejected
//! - Ejected stake per quorum is throttled by a leaky bucket
//! - Validators that keep cancelling their ejection are blacklisted
//! - No persistence: state is rebuilt from the chain on demand

pub mod chain;
pub mod clock;
pub mod config;
pub mod ejection;
pub mod signing_rate;
