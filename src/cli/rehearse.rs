//! Offline rehearsal of the ejection pipeline.
//!
//! Replays a signing-rate snapshot through the real ejector, manager and
//! throttle on a simulated clock. Chain writes go to a [`DryRunTransactor`], so
//! nothing is submitted anywhere. The outcome is printed as JSON on stdout.

use super::logging;
use ejector::chain::{DryRunTransactor, ValidatorAddress};
use ejector::clock::ManualClock;
use ejector::config::{default_config_path, EjectionConfig, EjectorConfig};
use ejector::ejection::{EjectionManager, Ejector, ThreadedEjectionManager};
use ejector::signing_rate::{ProtocolVersion, SigningRateLookup, SigningRateSnapshot};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::SystemTime;

/// Outcome of one rehearsed tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RehearsedTick {
    pub tick: u32,
    pub candidates: usize,
    pub attempts: usize,
    pub in_progress: usize,
}

/// Outcome of a rehearsal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RehearsalReport {
    pub ticks: Vec<RehearsedTick>,
    /// Validators whose ejection completed.
    pub ejected: Vec<ValidatorAddress>,
    /// Ejections still waiting for finalization at the end.
    pub in_progress: usize,
}

/// Rehearse ejections against a snapshot
pub async fn execute(
    config_path: Option<String>,
    snapshot_path: String,
    ticks: u32,
) -> Result<(), Box<dyn std::error::Error>> {
    let config_path = config_path
        .map(PathBuf::from)
        .unwrap_or_else(default_config_path);

    let config = EjectorConfig::load(&config_path)?;
    logging::init(&config.logging.level);
    config.ejector.validate()?;

    let snapshot = SigningRateSnapshot::load(&PathBuf::from(&snapshot_path))?;
    tracing::info!(
        config = %config_path.display(),
        snapshot = %snapshot_path,
        ticks,
        "starting rehearsal"
    );

    let report = rehearse(&config.ejector, &snapshot, ticks).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(())
}

/// Run `ticks` ejector ticks, advancing the simulated clock by one ejection
/// period after each.
pub async fn rehearse(
    policy: &EjectionConfig,
    snapshot: &SigningRateSnapshot,
    ticks: u32,
) -> Result<RehearsalReport, Box<dyn std::error::Error>> {
    let clock = ManualClock::new(SystemTime::now());
    let transactor = Arc::new(DryRunTransactor::new());

    let manager = EjectionManager::new(
        policy.manager_settings(),
        Arc::new(clock.clone()),
        transactor.clone(),
        policy.do_not_eject.iter().copied(),
    )?;
    let (handle, _task) = ThreadedEjectionManager::spawn(manager);

    let sources: Vec<(ProtocolVersion, Arc<dyn SigningRateLookup>)> = vec![
        (ProtocolVersion::V1, Arc::new(snapshot.lookup(ProtocolVersion::V1))),
        (ProtocolVersion::V2, Arc::new(snapshot.lookup(ProtocolVersion::V2))),
    ];
    let ejector = Ejector::new(
        policy.ejector_settings(),
        handle.clone(),
        sources,
        Arc::new(snapshot.directory()),
    )?;

    let mut rehearsed = Vec::with_capacity(ticks as usize);
    for tick in 1..=ticks {
        let summary = ejector.tick().await?;
        rehearsed.push(RehearsedTick {
            tick,
            candidates: summary.candidates,
            attempts: summary.attempts,
            in_progress: summary.in_progress,
        });
        clock.advance(policy.ejection_period);
    }

    Ok(RehearsalReport {
        ticks: rehearsed,
        ejected: transactor.ejected(),
        in_progress: handle.status().await?.in_progress,
    })
}
