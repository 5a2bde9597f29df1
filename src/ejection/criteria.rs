//! Ejection criteria.
//!
//! Only validators that signed nothing in the window despite having batches
//! assigned are ejected. Partial signers are left alone.

use crate::signing_rate::ValidatorSigningRate;

/// Check if a validator should be ejected.
pub fn is_ejectable(rate: &ValidatorSigningRate) -> bool {
    rate.signed_batches == 0 && rate.unsigned_batches > 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::ValidatorId;

    fn rate(signed: u64, unsigned: u64) -> ValidatorSigningRate {
        ValidatorSigningRate {
            signed_batches: signed,
            unsigned_batches: unsigned,
            ..ValidatorSigningRate::new(ValidatorId::from_bytes([7; 32]))
        }
    }

    #[test]
    fn test_non_signer_is_ejectable() {
        assert!(is_ejectable(&rate(0, 1)));
        assert!(is_ejectable(&rate(0, 500)));
    }

    #[test]
    fn test_partial_signer_is_not_ejectable() {
        assert!(!is_ejectable(&rate(1, 500)));
    }

    #[test]
    fn test_idle_validator_is_not_ejectable() {
        // No batches assigned at all.
        assert!(!is_ejectable(&rate(0, 0)));
    }

    #[test]
    fn test_perfect_signer_is_not_ejectable() {
        assert!(!is_ejectable(&rate(10, 0)));
    }
}
