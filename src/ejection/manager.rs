//! Ejection Lifecycle Manager
//!
//! Decides when to start an ejection, throttles how much stake can be ejected
//! per quorum and time window, and finalizes ejections once their on-chain
//! delay has passed.
//!
//! Lifecycle per validator address:
//!
//! ```text
//! NotTracked --begin_ejection--> Pending --finalize_ejections--> Completed
//!                                   |                         \-> Cancelled (counted, may blacklist)
//!                                   |                         \-> RemovedElsewhere
//!                                   \-- before finalization time: unchanged
//! ```
//!
//! The stake of a tracked ejection is refunded to the throttle whenever the
//! ejection does not end with a completion submitted by this manager, even if
//! it was found already in progress on-chain and never charged. Only a
//! self-completed ejection keeps its budget consumed.
//!
//! The manager is not thread safe; wrap it in a
//! [`ThreadedEjectionManager`](super::threaded::ThreadedEjectionManager) to
//! share it.

use super::leaky_bucket::{LeakyBucket, LeakyBucketError, OverfillBehavior};
use crate::chain::{
    ChainError, ChainResult, EjectionTransactor, QuorumId, StakeFractions, ValidatorAddress,
};
use crate::clock::Clock;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tracing::{debug, error, info, warn};

/// Ejection manager errors.
///
/// Chain failures are handled internally and never surface here; these are
/// invariant violations the caller cannot recover from.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EjectionManagerError {
    #[error("Throttle error: {0}")]
    Throttle(#[from] LeakyBucketError),

    #[error("Invalid manager settings: {0}")]
    InvalidSettings(String),
}

/// Tuning parameters of the ejection lifecycle.
#[derive(Debug, Clone, PartialEq)]
pub struct ManagerSettings {
    /// Time between starting an ejection and completing it.
    pub ejection_finalization_delay: Duration,
    /// Minimum time between two attempts against the same validator.
    pub ejection_retry_delay: Duration,
    /// Cancellations tolerated before a validator is blacklisted.
    pub max_consecutive_failed_ejection_attempts: u32,
    /// Fraction of a quorum's stake that may be ejected per throttle period.
    pub ejection_rate_limit: f64,
    pub ejection_throttle_time_period: Duration,
    /// Start with a full throttle, so nothing is ejected until it leaks.
    pub start_ejection_throttle_full: bool,
    /// Bound on every chain call.
    pub chain_call_timeout: Duration,
}

impl Default for ManagerSettings {
    fn default() -> Self {
        Self {
            ejection_finalization_delay: Duration::from_secs(60 * 60),
            ejection_retry_delay: Duration::from_secs(24 * 60 * 60),
            max_consecutive_failed_ejection_attempts: 5,
            ejection_rate_limit: 0.05,
            ejection_throttle_time_period: Duration::from_secs(24 * 60 * 60),
            start_ejection_throttle_full: false,
            chain_call_timeout: Duration::from_secs(30),
        }
    }
}

/// Tracking record for an active ejection.
#[derive(Debug, Clone, PartialEq)]
pub struct InProgressEjection {
    /// Completion is attempted once the clock is strictly past this time.
    pub finalization_time: SystemTime,
    /// Stake fractions supplied when the ejection began. Refunded to the
    /// throttle if the ejection is not completed by this manager.
    pub stake_fractions: StakeFractions,
}

/// Ejection lifecycle state machine.
pub struct EjectionManager {
    settings: ManagerSettings,
    clock: Arc<dyn Clock>,
    transactor: Arc<dyn EjectionTransactor>,
    throttles: HashMap<QuorumId, LeakyBucket>,
    in_progress: BTreeMap<ValidatorAddress, InProgressEjection>,
    recent_attempts: HashMap<ValidatorAddress, SystemTime>,
    failed_attempts: HashMap<ValidatorAddress, u32>,
    blacklist: HashSet<ValidatorAddress>,
}

impl EjectionManager {
    /// Create a manager. `do_not_eject` seeds the blacklist.
    ///
    /// The throttle for quorum 0 is built immediately so bad throttle
    /// parameters are reported here rather than on the first ejection.
    pub fn new(
        settings: ManagerSettings,
        clock: Arc<dyn Clock>,
        transactor: Arc<dyn EjectionTransactor>,
        do_not_eject: impl IntoIterator<Item = ValidatorAddress>,
    ) -> Result<Self, EjectionManagerError> {
        if settings.max_consecutive_failed_ejection_attempts == 0 {
            return Err(EjectionManagerError::InvalidSettings(
                "max_consecutive_failed_ejection_attempts must be > 0".to_string(),
            ));
        }
        if !(settings.ejection_rate_limit > 0.0 && settings.ejection_rate_limit <= 1.0) {
            return Err(EjectionManagerError::InvalidSettings(format!(
                "ejection_rate_limit must be in (0, 1], got {}",
                settings.ejection_rate_limit
            )));
        }

        let mut manager = Self {
            settings,
            clock,
            transactor,
            throttles: HashMap::new(),
            in_progress: BTreeMap::new(),
            recent_attempts: HashMap::new(),
            failed_attempts: HashMap::new(),
            blacklist: do_not_eject.into_iter().collect(),
        };

        let now = manager.clock.now();
        manager.throttle(0, now)?;

        Ok(manager)
    }

    /// Start ejecting a validator if every guard allows it.
    ///
    /// Skips are not errors: an invalid stake map, a blacklisted or already
    /// tracked validator, a recent attempt, a failed chain read, a full
    /// throttle, or a failed start transaction all leave the call a no-op
    /// (the last one still records the attempt time).
    pub async fn begin_ejection(
        &mut self,
        address: ValidatorAddress,
        stake_fractions: StakeFractions,
    ) -> Result<(), EjectionManagerError> {
        if stake_fractions.is_empty() {
            debug!(validator = %address, "no stake supplied, skipping");
            return Ok(());
        }
        if let Some((quorum, fraction)) = stake_fractions
            .iter()
            .find(|(_, fraction)| !is_valid_fraction(**fraction))
        {
            warn!(
                validator = %address,
                quorum = *quorum,
                fraction = *fraction,
                "stake fraction outside (0, 1], skipping"
            );
            return Ok(());
        }
        if self.blacklist.contains(&address) {
            debug!(validator = %address, "validator is blacklisted, skipping");
            return Ok(());
        }
        if self.in_progress.contains_key(&address) {
            debug!(validator = %address, "ejection already tracked, skipping");
            return Ok(());
        }
        if self.attempted_recently(&address) {
            debug!(validator = %address, "ejection attempted recently, skipping");
            return Ok(());
        }

        let timeout = self.settings.chain_call_timeout;
        let already_in_progress =
            match bounded(timeout, self.transactor.is_ejection_in_progress(&address)).await {
                Ok(in_progress) => in_progress,
                Err(e) => {
                    error!(validator = %address, error = %e, "failed to check ejection status");
                    return Ok(());
                }
            };

        if already_in_progress {
            info!(
                validator = %address,
                "ejection already in progress on-chain, will attempt to finalize"
            );
            self.track(address, stake_fractions);
            return Ok(());
        }

        if !self.charge_throttles(&address, &stake_fractions)? {
            return Ok(());
        }

        let started = bounded(timeout, self.transactor.start_ejection(&address)).await;
        if let Err(e) = started {
            error!(validator = %address, error = %e, "failed to start ejection");
            self.refund_throttles(&stake_fractions)?;
            let now = self.clock.now();
            self.recent_attempts.insert(address, now);
            return Ok(());
        }

        info!(validator = %address, "started ejection proceedings");
        self.track(address, stake_fractions);
        Ok(())
    }

    /// Complete every tracked ejection whose finalization time has passed.
    pub async fn finalize_ejections(&mut self) -> Result<(), EjectionManagerError> {
        self.clean_recent_attempts();

        let now = self.clock.now();
        let due: Vec<ValidatorAddress> = self
            .in_progress
            .iter()
            .filter(|(_, ejection)| now > ejection.finalization_time)
            .map(|(address, _)| *address)
            .collect();

        for address in due {
            if !self.try_complete(&address).await {
                self.clean_up_failed_ejection(&address)?;
            }
        }

        Ok(())
    }

    pub fn is_blacklisted(&self, address: &ValidatorAddress) -> bool {
        self.blacklist.contains(address)
    }

    pub fn in_progress(&self, address: &ValidatorAddress) -> Option<&InProgressEjection> {
        self.in_progress.get(address)
    }

    pub fn in_progress_count(&self) -> usize {
        self.in_progress.len()
    }

    pub fn blacklisted_count(&self) -> usize {
        self.blacklist.len()
    }

    /// Consecutive cancellations observed for `address`.
    pub fn failed_attempts(&self, address: &ValidatorAddress) -> u32 {
        self.failed_attempts.get(address).copied().unwrap_or(0)
    }

    /// Current throttle level of `quorum`, as a fraction of its stake.
    pub fn throttle_fill_level(&mut self, quorum: QuorumId) -> Result<f64, EjectionManagerError> {
        let now = self.clock.now();
        Ok(self.throttle(quorum, now)?.fill_level(now)?)
    }

    fn attempted_recently(&self, address: &ValidatorAddress) -> bool {
        let Some(last) = self.recent_attempts.get(address) else {
            return false;
        };
        match self.clock.now().duration_since(*last) {
            Ok(age) => age < self.settings.ejection_retry_delay,
            Err(_) => true,
        }
    }

    fn clean_recent_attempts(&mut self) {
        let now = self.clock.now();
        let retry_delay = self.settings.ejection_retry_delay;
        self.recent_attempts.retain(|_, last| match now.duration_since(*last) {
            Ok(age) => age <= retry_delay,
            Err(_) => true,
        });
    }

    fn track(&mut self, address: ValidatorAddress, stake_fractions: StakeFractions) {
        let now = self.clock.now();
        self.recent_attempts.insert(address, now);
        self.in_progress.insert(
            address,
            InProgressEjection {
                finalization_time: now + self.settings.ejection_finalization_delay,
                stake_fractions,
            },
        );
    }

    /// Fill every quorum's throttle in ascending quorum order. On the first
    /// rejection, revert the fills already made and return false.
    fn charge_throttles(
        &mut self,
        address: &ValidatorAddress,
        stake_fractions: &StakeFractions,
    ) -> Result<bool, EjectionManagerError> {
        let now = self.clock.now();
        let mut charged: Vec<(QuorumId, f64)> = Vec::with_capacity(stake_fractions.len());

        for (&quorum, &fraction) in stake_fractions {
            if self.throttle(quorum, now)?.fill(now, fraction)? {
                charged.push((quorum, fraction));
                continue;
            }

            for (charged_quorum, charged_fraction) in charged {
                self.throttle(charged_quorum, now)?
                    .revert_fill(now, charged_fraction)?;
            }
            warn!(
                validator = %address,
                quorum,
                "throttle prevents ejection, skipping"
            );
            return Ok(false);
        }

        Ok(true)
    }

    fn refund_throttles(&mut self, stake_fractions: &StakeFractions) -> Result<(), EjectionManagerError> {
        let now = self.clock.now();
        for (&quorum, &fraction) in stake_fractions {
            self.throttle(quorum, now)?.revert_fill(now, fraction)?;
        }
        Ok(())
    }

    /// Returns true only if this manager completed the ejection.
    async fn try_complete(&mut self, address: &ValidatorAddress) -> bool {
        let timeout = self.settings.chain_call_timeout;

        let status = bounded(timeout, self.transactor.is_ejection_in_progress(address)).await;
        match status {
            Err(e) => {
                error!(
                    validator = %address,
                    error = %e,
                    "failed to check ejection status, will not finalize"
                );
                return false;
            }
            Ok(false) => {
                self.handle_aborted_ejection(address).await;
                return false;
            }
            Ok(true) => {}
        }

        let completed = bounded(timeout, self.transactor.complete_ejection(address)).await;
        if let Err(e) = completed {
            error!(validator = %address, error = %e, "failed to complete ejection");
            return false;
        }

        info!(validator = %address, "completed ejection");
        self.in_progress.remove(address);
        self.failed_attempts.remove(address);
        true
    }

    /// The ejection is no longer in progress on-chain. Either the validator
    /// cancelled it or someone else already removed the validator.
    async fn handle_aborted_ejection(&mut self, address: &ValidatorAddress) {
        let timeout = self.settings.chain_call_timeout;
        let present = match bounded(
            timeout,
            self.transactor.is_validator_present_in_any_quorum(address),
        )
        .await
        {
            Ok(present) => present,
            Err(e) => {
                error!(validator = %address, error = %e, "failed to check quorum membership");
                return;
            }
        };

        if !present {
            info!(validator = %address, "validator no longer present in any quorum");
            return;
        }

        let attempts = self.failed_attempts.entry(*address).or_insert(0);
        *attempts += 1;
        let attempts = *attempts;
        warn!(validator = %address, attempts, "ejection was cancelled by validator");

        if attempts >= self.settings.max_consecutive_failed_ejection_attempts {
            error!(
                validator = %address,
                attempts,
                "too many cancelled ejections, blacklisting validator"
            );
            self.blacklist.insert(*address);
            self.failed_attempts.remove(address);
        }
    }

    /// Drop tracking and refund the recorded stake. Ejections found already in
    /// progress on-chain were never charged; their refund is absorbed by the
    /// bucket clamping at zero.
    fn clean_up_failed_ejection(&mut self, address: &ValidatorAddress) -> Result<(), EjectionManagerError> {
        let Some(ejection) = self.in_progress.remove(address) else {
            return Ok(());
        };
        self.refund_throttles(&ejection.stake_fractions)
    }

    fn throttle(
        &mut self,
        quorum: QuorumId,
        now: SystemTime,
    ) -> Result<&mut LeakyBucket, EjectionManagerError> {
        use std::collections::hash_map::Entry;

        match self.throttles.entry(quorum) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let period = self.settings.ejection_throttle_time_period;
                let leak_rate = self.settings.ejection_rate_limit / period.as_secs_f64();
                let bucket = LeakyBucket::new(
                    leak_rate,
                    period,
                    self.settings.start_ejection_throttle_full,
                    OverfillBehavior::OncePermitted,
                    now,
                )?;
                Ok(entry.insert(bucket))
            }
        }
    }
}

fn is_valid_fraction(fraction: f64) -> bool {
    fraction > 0.0 && fraction <= 1.0
}

/// Run a chain call with a deadline.
async fn bounded<T>(
    timeout: Duration,
    call: impl Future<Output = ChainResult<T>>,
) -> ChainResult<T> {
    tokio::time::timeout(timeout, call)
        .await
        .unwrap_or(Err(ChainError::Timeout(timeout)))
}
