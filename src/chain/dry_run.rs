//! Transactor that never touches the chain.
//!
//! Used by `ejector rehearse` to replay signing-rate snapshots through the full
//! ejection lifecycle. Writes are logged and applied to an in-memory model of
//! the ejection contract so that later reads observe them.

use super::traits::*;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Mutex;
use tracing::info;

/// Dry-run ejection transactor.
#[derive(Default)]
pub struct DryRunTransactor {
    state: Mutex<DryRunState>,
}

#[derive(Default)]
struct DryRunState {
    in_progress: HashSet<ValidatorAddress>,
    removed: HashSet<ValidatorAddress>,
}

impl DryRunTransactor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validators whose ejection was completed during this run.
    pub fn ejected(&self) -> Vec<ValidatorAddress> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let mut ejected: Vec<_> = state.removed.iter().copied().collect();
        ejected.sort();
        ejected
    }
}

#[async_trait]
impl EjectionTransactor for DryRunTransactor {
    async fn start_ejection(&self, address: &ValidatorAddress) -> ChainResult<()> {
        info!(validator = %address, "dry run: start ejection");
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.in_progress.insert(*address);
        Ok(())
    }

    async fn is_ejection_in_progress(&self, address: &ValidatorAddress) -> ChainResult<bool> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        Ok(state.in_progress.contains(address))
    }

    async fn is_validator_present_in_any_quorum(
        &self,
        address: &ValidatorAddress,
    ) -> ChainResult<bool> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        Ok(!state.removed.contains(address))
    }

    async fn complete_ejection(&self, address: &ValidatorAddress) -> ChainResult<()> {
        info!(validator = %address, "dry run: complete ejection");
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.in_progress.remove(address);
        state.removed.insert(*address);
        Ok(())
    }
}
