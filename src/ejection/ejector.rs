//! Periodic ejection driver.
//!
//! Every `ejection_period` the ejector:
//! 1. Finalizes ejections whose delay has passed
//! 2. Fetches signing rates from every protocol version
//! 3. Merges and ranks them, worst offender first
//! 4. Resolves each ejectable validator and asks the manager to eject it
//!
//! If any signing-rate source fails, no candidates are evaluated that tick: a
//! validator signing on one version would otherwise look like a non-signer.

use super::criteria::is_ejectable;
use super::threaded::{ThreadedEjectionManager, ThreadedManagerError};
use crate::chain::{ChainError, QuorumId, ValidatorDirectory, ValidatorStake};
use crate::signing_rate::{
    merge_signing_rates, LookupError, ProtocolVersion, SigningRateLookup, ValidatorSigningRate,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// Ejector errors. Any of these stops the driver.
#[derive(Debug, thiserror::Error)]
pub enum EjectorError {
    #[error("Ejection manager failed: {0}")]
    Manager(#[from] ThreadedManagerError),

    #[error("No signing-rate sources configured")]
    NoSources,

    #[error("Invalid ejector settings: {0}")]
    InvalidSettings(String),
}

/// Driver timing and scope.
#[derive(Debug, Clone, PartialEq)]
pub struct EjectorSettings {
    pub ejection_period: Duration,
    /// Length of the signing-rate window ending at each tick.
    pub ejection_criteria_time_window: Duration,
    /// Quorums to query; empty means all.
    pub quorums: Vec<QuorumId>,
    /// Bound on each signing-rate and directory call.
    pub call_timeout: Duration,
}

/// Outcome of one tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickSummary {
    /// Validators passing the ejection criteria.
    pub candidates: usize,
    /// Candidates handed to the manager.
    pub attempts: usize,
    /// Ejections tracked by the manager after the tick.
    pub in_progress: usize,
    /// Set when candidate evaluation was skipped because a source failed.
    pub sources_failed: bool,
}

/// Periodic ejection driver.
pub struct Ejector {
    settings: EjectorSettings,
    manager: ThreadedEjectionManager,
    sources: Vec<(ProtocolVersion, Arc<dyn SigningRateLookup>)>,
    directory: Arc<dyn ValidatorDirectory>,
}

impl Ejector {
    pub fn new(
        settings: EjectorSettings,
        manager: ThreadedEjectionManager,
        sources: Vec<(ProtocolVersion, Arc<dyn SigningRateLookup>)>,
        directory: Arc<dyn ValidatorDirectory>,
    ) -> Result<Self, EjectorError> {
        if sources.is_empty() {
            return Err(EjectorError::NoSources);
        }
        if settings.ejection_period.is_zero() {
            return Err(EjectorError::InvalidSettings(
                "ejection_period must be > 0".to_string(),
            ));
        }
        Ok(Self {
            settings,
            manager,
            sources,
            directory,
        })
    }

    /// Run ticks until `shutdown` flips to true or its sender is dropped.
    ///
    /// The first tick runs immediately. A tick in flight is abandoned when
    /// shutdown is signalled.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<(), EjectorError> {
        let mut interval = tokio::time::interval(self.settings.ejection_period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            period = ?self.settings.ejection_period,
            window = ?self.settings.ejection_criteria_time_window,
            "ejector started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                _ = interval.tick() => {}
                result = shutdown.changed() => {
                    if result.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
            }

            tokio::select! {
                result = self.tick() => {
                    if let Err(e) = result {
                        error!(error = %e, "ejector stopping");
                        return Err(e);
                    }
                }
                result = shutdown.changed() => {
                    if result.is_err() || *shutdown.borrow() {
                        info!("shutdown requested mid-tick");
                        break;
                    }
                }
            }
        }

        info!("ejector stopped");
        Ok(())
    }

    /// Run one finalize-then-evaluate pass.
    pub async fn tick(&self) -> Result<TickSummary, EjectorError> {
        self.manager.finalize_ejections().await?;

        let mut summary = TickSummary::default();

        match self.fetch_signing_rates().await {
            Some(sources) => {
                let ranked = merge_signing_rates(sources);
                for rate in ranked.iter().filter(|rate| is_ejectable(rate)) {
                    summary.candidates += 1;
                    let Some(stake) = self.resolve(rate).await else {
                        continue;
                    };
                    self.manager
                        .begin_ejection(stake.address, stake.stake_fractions)
                        .await?;
                    summary.attempts += 1;
                }
            }
            None => summary.sources_failed = true,
        }

        summary.in_progress = self.manager.status().await?.in_progress;
        info!(
            candidates = summary.candidates,
            attempts = summary.attempts,
            in_progress = summary.in_progress,
            sources_failed = summary.sources_failed,
            "ejection tick complete"
        );
        Ok(summary)
    }

    /// Query every source concurrently. `None` if any of them failed.
    async fn fetch_signing_rates(&self) -> Option<Vec<Vec<ValidatorSigningRate>>> {
        let timeout = self.settings.call_timeout;
        let window = self.settings.ejection_criteria_time_window;
        let quorums = &self.settings.quorums;

        let lookups = self.sources.iter().map(|(version, source)| async move {
            let result = tokio::time::timeout(
                timeout,
                source.get_signing_rates(window, quorums, *version, true),
            )
            .await
            .unwrap_or(Err(LookupError::Timeout(timeout)));
            (*version, result)
        });

        let mut rates = Vec::with_capacity(self.sources.len());
        let mut failed = false;
        for (version, result) in futures::future::join_all(lookups).await {
            match result {
                Ok(records) => {
                    debug!(version = %version, records = records.len(), "fetched signing rates");
                    rates.push(records);
                }
                Err(e) => {
                    warn!(version = %version, error = %e, "signing-rate source failed");
                    failed = true;
                }
            }
        }

        if failed {
            warn!("skipping candidate evaluation this tick");
            return None;
        }
        Some(rates)
    }

    async fn resolve(&self, rate: &ValidatorSigningRate) -> Option<ValidatorStake> {
        let timeout = self.settings.call_timeout;
        let id = rate.validator_id;

        let result = tokio::time::timeout(timeout, self.directory.validator_stake(&id))
            .await
            .unwrap_or(Err(ChainError::Timeout(timeout)));

        match result {
            Ok(Some(stake)) => Some(stake),
            Ok(None) => {
                warn!(validator_id = %id, "non-signing validator not found in directory");
                None
            }
            Err(e) => {
                warn!(validator_id = %id, error = %e, "failed to look up validator stake");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::mock::{MockEjectionTransactor, MockValidatorDirectory};
    use crate::chain::{StakeFractions, ValidatorAddress, ValidatorId};
    use crate::clock::ManualClock;
    use crate::ejection::manager::{EjectionManager, ManagerSettings};
    use crate::signing_rate::mock::MockSigningRateLookup;
    use std::time::SystemTime;

    struct Harness {
        ejector: Ejector,
        clock: ManualClock,
        chain: MockEjectionTransactor,
        directory: MockValidatorDirectory,
        v1: MockSigningRateLookup,
        v2: MockSigningRateLookup,
    }

    fn settings() -> EjectorSettings {
        EjectorSettings {
            ejection_period: Duration::from_secs(300),
            ejection_criteria_time_window: Duration::from_secs(24 * 60 * 60),
            quorums: vec![0, 1],
            call_timeout: Duration::from_secs(1),
        }
    }

    fn harness() -> Harness {
        let clock = ManualClock::new(SystemTime::UNIX_EPOCH + Duration::from_secs(1_000_000));
        let chain = MockEjectionTransactor::new();
        let manager = EjectionManager::new(
            ManagerSettings::default(),
            Arc::new(clock.clone()),
            Arc::new(chain.clone()),
            Vec::new(),
        )
        .unwrap();
        let (handle, _task) = ThreadedEjectionManager::spawn(manager);

        let directory = MockValidatorDirectory::new();
        let v1 = MockSigningRateLookup::default();
        let v2 = MockSigningRateLookup::default();

        let ejector = Ejector::new(
            settings(),
            handle,
            vec![
                (ProtocolVersion::V1, Arc::new(v1.clone()) as Arc<dyn SigningRateLookup>),
                (ProtocolVersion::V2, Arc::new(v2.clone()) as Arc<dyn SigningRateLookup>),
            ],
            Arc::new(directory.clone()),
        )
        .unwrap();

        Harness {
            ejector,
            clock,
            chain,
            directory,
            v1,
            v2,
        }
    }

    fn id(byte: u8) -> ValidatorId {
        ValidatorId::from_bytes([byte; 32])
    }

    fn addr(byte: u8) -> ValidatorAddress {
        ValidatorAddress::from_bytes([byte; 20])
    }

    fn register(h: &Harness, byte: u8, fraction: f64) {
        let stake_fractions: StakeFractions = [(0, fraction)].into_iter().collect();
        h.directory.insert(
            id(byte),
            ValidatorStake {
                address: addr(byte),
                stake_fractions,
            },
        );
    }

    fn rate(byte: u8, signed: u64, unsigned: u64, unsigned_bytes: u64) -> ValidatorSigningRate {
        ValidatorSigningRate {
            signed_batches: signed,
            unsigned_batches: unsigned,
            unsigned_bytes,
            ..ValidatorSigningRate::new(id(byte))
        }
    }

    #[test]
    fn test_new_requires_sources() {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap();
        let _guard = runtime.enter();
        let manager = EjectionManager::new(
            ManagerSettings::default(),
            Arc::new(ManualClock::new(SystemTime::UNIX_EPOCH)),
            Arc::new(MockEjectionTransactor::new()),
            Vec::new(),
        )
        .unwrap();
        let (handle, _task) = ThreadedEjectionManager::spawn(manager);

        let result = Ejector::new(
            settings(),
            handle,
            Vec::new(),
            Arc::new(MockValidatorDirectory::new()),
        );
        assert!(matches!(result, Err(EjectorError::NoSources)));
    }

    #[tokio::test]
    async fn test_new_rejects_zero_period() {
        let manager = EjectionManager::new(
            ManagerSettings::default(),
            Arc::new(ManualClock::new(SystemTime::UNIX_EPOCH)),
            Arc::new(MockEjectionTransactor::new()),
            Vec::new(),
        )
        .unwrap();
        let (handle, _task) = ThreadedEjectionManager::spawn(manager);

        let result = Ejector::new(
            EjectorSettings {
                ejection_period: Duration::ZERO,
                ..settings()
            },
            handle,
            vec![(
                ProtocolVersion::V1,
                Arc::new(MockSigningRateLookup::default()) as Arc<dyn SigningRateLookup>,
            )],
            Arc::new(MockValidatorDirectory::new()),
        );
        assert!(matches!(result, Err(EjectorError::InvalidSettings(_))));
    }

    #[tokio::test]
    async fn test_tick_ejects_non_signers() {
        let h = harness();
        register(&h, 1, 0.01);
        register(&h, 2, 0.01);
        h.v1.set_rates(vec![rate(1, 0, 5, 500), rate(2, 3, 5, 500)]);

        let summary = h.ejector.tick().await.unwrap();
        assert_eq!(summary.candidates, 1);
        assert_eq!(summary.attempts, 1);
        assert_eq!(summary.in_progress, 1);
        assert_eq!(h.chain.start_count(&addr(1)), 1);
        assert_eq!(h.chain.start_count(&addr(2)), 0);
    }

    #[tokio::test]
    async fn test_tick_queries_sources_with_window() {
        let h = harness();
        h.ejector.tick().await.unwrap();

        for (source, version) in [(&h.v1, ProtocolVersion::V1), (&h.v2, ProtocolVersion::V2)] {
            let requests = source.requests();
            assert_eq!(requests.len(), 1);
            assert_eq!(requests[0].time_span, Duration::from_secs(24 * 60 * 60));
            assert_eq!(requests[0].quorums, vec![0, 1]);
            assert_eq!(requests[0].protocol_version, version);
            assert!(requests[0].omit_perfect_signers);
        }
    }

    #[tokio::test]
    async fn test_signer_on_other_version_is_spared() {
        let h = harness();
        register(&h, 1, 0.01);
        h.v1.set_rates(vec![rate(1, 0, 5, 500)]);
        h.v2.set_rates(vec![rate(1, 4, 0, 0)]);

        let summary = h.ejector.tick().await.unwrap();
        assert_eq!(summary.candidates, 0);
        assert!(h.chain.calls().is_empty());
    }

    #[tokio::test]
    async fn test_failing_source_skips_evaluation() {
        let h = harness();
        register(&h, 1, 0.01);
        h.v1.set_rates(vec![rate(1, 0, 5, 500)]);
        h.v2.set_fail(true);

        let summary = h.ejector.tick().await.unwrap();
        assert!(summary.sources_failed);
        assert_eq!(summary.candidates, 0);
        assert_eq!(h.chain.start_count(&addr(1)), 0);
    }

    #[tokio::test]
    async fn test_worst_offender_wins_throttle() {
        let h = harness();
        register(&h, 1, 0.01);
        register(&h, 2, 0.06);
        h.v1.set_rates(vec![rate(1, 0, 5, 100)]);
        h.v2.set_rates(vec![rate(2, 0, 5, 900)]);

        let summary = h.ejector.tick().await.unwrap();
        assert_eq!(summary.candidates, 2);
        assert_eq!(h.chain.start_count(&addr(2)), 1);
        // Validator 2 overfilled the throttle, so validator 1 is held back.
        assert_eq!(h.chain.start_count(&addr(1)), 0);
    }

    #[tokio::test]
    async fn test_unknown_validator_is_skipped() {
        let h = harness();
        register(&h, 2, 0.01);
        h.v1.set_rates(vec![rate(1, 0, 5, 900), rate(2, 0, 5, 100)]);

        let summary = h.ejector.tick().await.unwrap();
        assert_eq!(summary.candidates, 2);
        assert_eq!(summary.attempts, 1);
        assert_eq!(h.chain.start_count(&addr(2)), 1);
    }

    #[tokio::test]
    async fn test_directory_failure_is_skipped() {
        let h = harness();
        register(&h, 1, 0.01);
        h.directory.set_fail(true);
        h.v1.set_rates(vec![rate(1, 0, 5, 900)]);

        let summary = h.ejector.tick().await.unwrap();
        assert_eq!(summary.attempts, 0);
        assert!(h.chain.calls().is_empty());
    }

    #[tokio::test]
    async fn test_tick_finalizes_due_ejections() {
        let h = harness();
        register(&h, 1, 0.01);
        h.v1.set_rates(vec![rate(1, 0, 5, 900)]);
        h.ejector.tick().await.unwrap();

        h.v1.set_rates(Vec::new());
        h.clock.advance(Duration::from_secs(60 * 60 + 1));
        let summary = h.ejector.tick().await.unwrap();

        assert_eq!(h.chain.complete_count(&addr(1)), 1);
        assert_eq!(summary.in_progress, 0);
    }

    #[tokio::test]
    async fn test_manager_failure_stops_run() {
        let h = harness();
        register(&h, 1, 0.01);
        h.v1.set_rates(vec![rate(1, 0, 5, 900)]);
        h.clock.set(SystemTime::UNIX_EPOCH);

        let (_tx, rx) = watch::channel(false);
        let result = tokio::time::timeout(Duration::from_secs(5), h.ejector.run(rx))
            .await
            .unwrap();
        assert!(matches!(result, Err(EjectorError::Manager(_))));
    }

    #[tokio::test]
    async fn test_shutdown_stops_run() {
        let h = harness();
        let (tx, rx) = watch::channel(false);
        let ejector = Arc::new(h.ejector);

        let runner = {
            let ejector = Arc::clone(&ejector);
            tokio::spawn(async move { ejector.run(rx).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        tx.send(true).unwrap();

        let result = tokio::time::timeout(Duration::from_secs(5), runner)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
        // The immediate first tick ran before shutdown.
        assert_eq!(h.v1.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_dropped_shutdown_sender_stops_run() {
        let h = harness();
        let (tx, rx) = watch::channel(false);
        drop(tx);

        let result = tokio::time::timeout(Duration::from_secs(5), h.ejector.run(rx))
            .await
            .unwrap();
        assert!(result.is_ok());
    }
}
