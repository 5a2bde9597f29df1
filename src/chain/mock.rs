//! Mock chain clients for testing.
//!
//! `MockEjectionTransactor` keeps a tiny in-memory model of the ejection
//! contract: starting an ejection marks it in progress, completing it removes
//! the validator from every quorum. Tests flip the model directly to simulate
//! cancellations or removals performed by other actors.

use super::traits::*;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

/// A call observed by [`MockEjectionTransactor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactorCall {
    StartEjection(ValidatorAddress),
    IsEjectionInProgress(ValidatorAddress),
    IsValidatorPresentInAnyQuorum(ValidatorAddress),
    CompleteEjection(ValidatorAddress),
}

/// Mock ejection transactor for testing.
#[derive(Clone, Default)]
pub struct MockEjectionTransactor {
    state: Arc<Mutex<MockState>>,
}

#[derive(Default)]
struct MockState {
    in_progress: HashSet<ValidatorAddress>,
    removed: HashSet<ValidatorAddress>,
    calls: Vec<TransactorCall>,
    fail_start: bool,
    fail_complete: bool,
    fail_in_progress_check: bool,
    fail_presence_check: bool,
}

impl MockEjectionTransactor {
    /// Create new mock transactor. Every validator starts present with no ejection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark an ejection as in progress (or not) on-chain.
    pub fn set_ejection_in_progress(&self, address: ValidatorAddress, in_progress: bool) {
        let mut s = self.state.lock().unwrap();
        if in_progress {
            s.in_progress.insert(address);
        } else {
            s.in_progress.remove(&address);
        }
    }

    /// Mark a validator as present in (or absent from) all quorums.
    pub fn set_validator_present(&self, address: ValidatorAddress, present: bool) {
        let mut s = self.state.lock().unwrap();
        if present {
            s.removed.remove(&address);
        } else {
            s.removed.insert(address);
        }
    }

    /// Make `start_ejection` fail.
    pub fn set_fail_start(&self, fail: bool) {
        self.state.lock().unwrap().fail_start = fail;
    }

    /// Make `complete_ejection` fail.
    pub fn set_fail_complete(&self, fail: bool) {
        self.state.lock().unwrap().fail_complete = fail;
    }

    /// Make `is_ejection_in_progress` fail.
    pub fn set_fail_in_progress_check(&self, fail: bool) {
        self.state.lock().unwrap().fail_in_progress_check = fail;
    }

    /// Make `is_validator_present_in_any_quorum` fail.
    pub fn set_fail_presence_check(&self, fail: bool) {
        self.state.lock().unwrap().fail_presence_check = fail;
    }

    /// All calls observed so far, in order.
    pub fn calls(&self) -> Vec<TransactorCall> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Forget recorded calls.
    pub fn clear_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }

    /// Number of `start_ejection` calls for `address`.
    pub fn start_count(&self, address: &ValidatorAddress) -> usize {
        self.count(|call| *call == TransactorCall::StartEjection(*address))
    }

    /// Number of `complete_ejection` calls for `address`.
    pub fn complete_count(&self, address: &ValidatorAddress) -> usize {
        self.count(|call| *call == TransactorCall::CompleteEjection(*address))
    }

    fn count(&self, predicate: impl Fn(&TransactorCall) -> bool) -> usize {
        let s = self.state.lock().unwrap();
        s.calls.iter().filter(|call| predicate(call)).count()
    }
}

#[async_trait]
impl EjectionTransactor for MockEjectionTransactor {
    async fn start_ejection(&self, address: &ValidatorAddress) -> ChainResult<()> {
        let mut s = self.state.lock().unwrap();
        s.calls.push(TransactorCall::StartEjection(*address));
        if s.fail_start {
            return Err(ChainError::Reverted("start ejection rejected".to_string()));
        }
        s.in_progress.insert(*address);
        Ok(())
    }

    async fn is_ejection_in_progress(&self, address: &ValidatorAddress) -> ChainResult<bool> {
        let mut s = self.state.lock().unwrap();
        s.calls.push(TransactorCall::IsEjectionInProgress(*address));
        if s.fail_in_progress_check {
            return Err(ChainError::Rpc("ejection status unavailable".to_string()));
        }
        Ok(s.in_progress.contains(address))
    }

    async fn is_validator_present_in_any_quorum(
        &self,
        address: &ValidatorAddress,
    ) -> ChainResult<bool> {
        let mut s = self.state.lock().unwrap();
        s.calls
            .push(TransactorCall::IsValidatorPresentInAnyQuorum(*address));
        if s.fail_presence_check {
            return Err(ChainError::Rpc("quorum membership unavailable".to_string()));
        }
        Ok(!s.removed.contains(address))
    }

    async fn complete_ejection(&self, address: &ValidatorAddress) -> ChainResult<()> {
        let mut s = self.state.lock().unwrap();
        s.calls.push(TransactorCall::CompleteEjection(*address));
        if s.fail_complete {
            return Err(ChainError::Reverted("complete ejection rejected".to_string()));
        }
        s.in_progress.remove(address);
        s.removed.insert(*address);
        Ok(())
    }
}

/// Mock validator directory for testing.
#[derive(Clone, Default)]
pub struct MockValidatorDirectory {
    state: Arc<Mutex<DirectoryState>>,
}

#[derive(Default)]
struct DirectoryState {
    validators: HashMap<ValidatorId, ValidatorStake>,
    fail: bool,
}

impl MockValidatorDirectory {
    /// Create an empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a validator (for test setup).
    pub fn insert(&self, id: ValidatorId, stake: ValidatorStake) {
        self.state.lock().unwrap().validators.insert(id, stake);
    }

    /// Make every lookup fail.
    pub fn set_fail(&self, fail: bool) {
        self.state.lock().unwrap().fail = fail;
    }
}

#[async_trait]
impl ValidatorDirectory for MockValidatorDirectory {
    async fn validator_stake(&self, id: &ValidatorId) -> ChainResult<Option<ValidatorStake>> {
        let s = self.state.lock().unwrap();
        if s.fail {
            return Err(ChainError::Rpc("directory unavailable".to_string()));
        }
        Ok(s.validators.get(id).cloned())
    }
}
