//! Leaky Bucket Throttle
//!
//! Caps how much stake can be ejected from a quorum per time window.
//!
//! ## Model
//!
//! - Capacity is `leak_rate * bucket_duration`
//! - The level drains continuously at `leak_rate` units per second
//! - Consumers fill the bucket; a fill that no longer fits is rejected
//! - A fill can be reverted, clamping the level at zero
//!
//! Time is passed in by the caller so the bucket can be driven by an
//! injected clock. Time moving backwards is an error.

use std::time::{Duration, SystemTime};

/// What happens when a fill would push the level past capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverfillBehavior {
    /// Reject any fill that does not fit.
    NotPermitted,
    /// Accept a fill that does not fit as long as the bucket has any free
    /// capacity left.
    OncePermitted,
}

/// Leaky bucket errors.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LeakyBucketError {
    #[error("Time moved backwards: now is {behind:?} before the previous update")]
    TimeMovedBackward { behind: Duration },

    #[error("Invalid amount {0}: must be finite and > 0")]
    InvalidAmount(f64),

    #[error("Invalid bucket parameters: {0}")]
    InvalidParameters(String),
}

/// Continuous leaky bucket with float fill levels.
#[derive(Debug, Clone)]
pub struct LeakyBucket {
    leak_rate: f64,
    capacity: f64,
    overfill: OverfillBehavior,
    fill_level: f64,
    last_update: SystemTime,
}

impl LeakyBucket {
    /// Create a bucket draining `leak_rate` units per second with room for
    /// `bucket_duration` worth of leakage.
    pub fn new(
        leak_rate: f64,
        bucket_duration: Duration,
        start_full: bool,
        overfill: OverfillBehavior,
        now: SystemTime,
    ) -> Result<Self, LeakyBucketError> {
        if !leak_rate.is_finite() || leak_rate <= 0.0 {
            return Err(LeakyBucketError::InvalidParameters(format!(
                "leak rate must be finite and > 0, got {}",
                leak_rate
            )));
        }
        if bucket_duration.is_zero() {
            return Err(LeakyBucketError::InvalidParameters(
                "bucket duration must be > 0".to_string(),
            ));
        }

        let capacity = leak_rate * bucket_duration.as_secs_f64();
        Ok(Self {
            leak_rate,
            capacity,
            overfill,
            fill_level: if start_full { capacity } else { 0.0 },
            last_update: now,
        })
    }

    /// Try to add `amount` to the bucket.
    ///
    /// Returns `Ok(false)` if the fill was rejected; the level is unchanged.
    pub fn fill(&mut self, now: SystemTime, amount: f64) -> Result<bool, LeakyBucketError> {
        check_amount(amount)?;
        self.leak(now)?;

        let new_level = self.fill_level + amount;
        if new_level <= self.capacity {
            self.fill_level = new_level;
            return Ok(true);
        }

        match self.overfill {
            OverfillBehavior::NotPermitted => Ok(false),
            OverfillBehavior::OncePermitted => {
                if self.fill_level >= self.capacity {
                    return Ok(false);
                }
                self.fill_level = new_level;
                Ok(true)
            }
        }
    }

    /// Undo a previous fill of `amount`. The level never drops below zero.
    pub fn revert_fill(&mut self, now: SystemTime, amount: f64) -> Result<(), LeakyBucketError> {
        check_amount(amount)?;
        self.leak(now)?;

        self.fill_level = (self.fill_level - amount).max(0.0);
        Ok(())
    }

    /// Current level after draining up to `now`.
    pub fn fill_level(&mut self, now: SystemTime) -> Result<f64, LeakyBucketError> {
        self.leak(now)?;
        Ok(self.fill_level)
    }

    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    fn leak(&mut self, now: SystemTime) -> Result<(), LeakyBucketError> {
        let elapsed = now.duration_since(self.last_update).map_err(|e| {
            LeakyBucketError::TimeMovedBackward {
                behind: e.duration(),
            }
        })?;

        let leaked = elapsed.as_secs_f64() * self.leak_rate;
        self.fill_level = (self.fill_level - leaked).max(0.0);
        self.last_update = now;
        Ok(())
    }
}

fn check_amount(amount: f64) -> Result<(), LeakyBucketError> {
    if !amount.is_finite() || amount <= 0.0 {
        return Err(LeakyBucketError::InvalidAmount(amount));
    }
    Ok(())
}
