//! Mock signing-rate source for testing.

use super::traits::*;
use crate::chain::QuorumId;
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Arguments of one `get_signing_rates` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupRequest {
    pub time_span: Duration,
    pub quorums: Vec<QuorumId>,
    pub protocol_version: ProtocolVersion,
    pub omit_perfect_signers: bool,
}

/// Mock signing-rate lookup returning a fixed set of records.
#[derive(Clone, Default)]
pub struct MockSigningRateLookup {
    state: Arc<Mutex<MockState>>,
}

#[derive(Default)]
struct MockState {
    rates: Vec<ValidatorSigningRate>,
    fail: bool,
    requests: Vec<LookupRequest>,
}

impl MockSigningRateLookup {
    pub fn new(rates: Vec<ValidatorSigningRate>) -> Self {
        let lookup = Self::default();
        lookup.set_rates(rates);
        lookup
    }

    /// Replace the records returned by later calls.
    pub fn set_rates(&self, rates: Vec<ValidatorSigningRate>) {
        self.state.lock().unwrap().rates = rates;
    }

    /// Make every lookup fail.
    pub fn set_fail(&self, fail: bool) {
        self.state.lock().unwrap().fail = fail;
    }

    /// All requests observed so far.
    pub fn requests(&self) -> Vec<LookupRequest> {
        self.state.lock().unwrap().requests.clone()
    }
}

#[async_trait]
impl SigningRateLookup for MockSigningRateLookup {
    async fn get_signing_rates(
        &self,
        time_span: Duration,
        quorums: &[QuorumId],
        protocol_version: ProtocolVersion,
        omit_perfect_signers: bool,
    ) -> Result<Vec<ValidatorSigningRate>, LookupError> {
        let mut s = self.state.lock().unwrap();
        s.requests.push(LookupRequest {
            time_span,
            quorums: quorums.to_vec(),
            protocol_version,
            omit_perfect_signers,
        });
        if s.fail {
            return Err(LookupError::Unavailable("mock source down".to_string()));
        }
        Ok(s.rates.clone())
    }
}
