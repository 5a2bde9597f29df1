//! Merging and ranking of signing rates across protocol versions.
//!
//! A validator serves every protocol version at once, so its records from each
//! source are summed before any ejection decision. The ranked order decides
//! who consumes the remaining throttle budget first.

use super::traits::ValidatorSigningRate;
use crate::chain::ValidatorId;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::time::Duration;

/// Combine two records for the same validator.
///
/// Counts are summed. Latency is the average of both latencies weighted by
/// signed batches, or zero if neither record has signed batches.
pub fn combine_signing_rates(
    a: &ValidatorSigningRate,
    b: &ValidatorSigningRate,
) -> ValidatorSigningRate {
    ValidatorSigningRate {
        validator_id: a.validator_id,
        signed_batches: a.signed_batches.saturating_add(b.signed_batches),
        unsigned_batches: a.unsigned_batches.saturating_add(b.unsigned_batches),
        signed_bytes: a.signed_bytes.saturating_add(b.signed_bytes),
        unsigned_bytes: a.unsigned_bytes.saturating_add(b.unsigned_bytes),
        signing_latency: weighted_latency(a, b),
    }
}

fn weighted_latency(a: &ValidatorSigningRate, b: &ValidatorSigningRate) -> Duration {
    let total = a.signed_batches as u128 + b.signed_batches as u128;
    if total == 0 {
        return Duration::ZERO;
    }

    let weighted = a.signing_latency.as_nanos() * a.signed_batches as u128
        + b.signing_latency.as_nanos() * b.signed_batches as u128;
    let nanos = weighted / total;
    Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
}

/// Merge records from several sources into one record per validator, ranked
/// worst offender first (see [`rank_by_severity`]).
pub fn merge_signing_rates<I>(sources: I) -> Vec<ValidatorSigningRate>
where
    I: IntoIterator<Item = Vec<ValidatorSigningRate>>,
{
    let mut merged: HashMap<ValidatorId, ValidatorSigningRate> = HashMap::new();

    for source in sources {
        for rate in source {
            match merged.get_mut(&rate.validator_id) {
                Some(existing) => *existing = combine_signing_rates(existing, &rate),
                None => {
                    merged.insert(rate.validator_id, rate);
                }
            }
        }
    }

    let mut ranked: Vec<_> = merged.into_values().collect();
    rank_by_severity(&mut ranked);
    ranked
}

/// Sort descending by unsigned bytes, then unsigned batches descending, then
/// validator ID ascending.
pub fn rank_by_severity(rates: &mut [ValidatorSigningRate]) {
    rates.sort_by(compare_severity);
}

fn compare_severity(a: &ValidatorSigningRate, b: &ValidatorSigningRate) -> Ordering {
    b.unsigned_bytes
        .cmp(&a.unsigned_bytes)
        .then_with(|| b.unsigned_batches.cmp(&a.unsigned_batches))
        .then_with(|| a.validator_id.cmp(&b.validator_id))
}
