//! Serialized access to an [`EjectionManager`].
//!
//! The manager is owned by a single tokio task. Handles send requests over a
//! bounded channel and wait for the reply on a oneshot, so callers on any task
//! observe the manager one request at a time.

use super::manager::{EjectionManager, EjectionManagerError};
use crate::chain::{StakeFractions, ValidatorAddress};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

const REQUEST_QUEUE_DEPTH: usize = 32;

/// Errors returned through a [`ThreadedEjectionManager`] handle.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ThreadedManagerError {
    #[error("Ejection manager task has stopped")]
    ManagerClosed,

    #[error(transparent)]
    Manager(#[from] EjectionManagerError),
}

/// Counters reported by the manager task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ManagerStatus {
    pub in_progress: usize,
    pub blacklisted: usize,
}

enum Request {
    BeginEjection {
        address: ValidatorAddress,
        stake_fractions: StakeFractions,
        response: oneshot::Sender<Result<(), EjectionManagerError>>,
    },
    FinalizeEjections {
        response: oneshot::Sender<Result<(), EjectionManagerError>>,
    },
    Status {
        response: oneshot::Sender<ManagerStatus>,
    },
}

/// Cloneable handle to an ejection manager running on its own task.
#[derive(Clone)]
pub struct ThreadedEjectionManager {
    requests: mpsc::Sender<Request>,
}

impl std::fmt::Debug for ThreadedEjectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadedEjectionManager")
            .field("requests", &"<mpsc::Sender>")
            .finish()
    }
}

impl ThreadedEjectionManager {
    /// Move `manager` onto a new task.
    ///
    /// The task exits once every handle has been dropped.
    pub fn spawn(manager: EjectionManager) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(REQUEST_QUEUE_DEPTH);
        let task = tokio::spawn(serve(manager, rx));
        (Self { requests: tx }, task)
    }

    /// See [`EjectionManager::begin_ejection`].
    pub async fn begin_ejection(
        &self,
        address: ValidatorAddress,
        stake_fractions: StakeFractions,
    ) -> Result<(), ThreadedManagerError> {
        let (response, reply) = oneshot::channel();
        self.send(Request::BeginEjection {
            address,
            stake_fractions,
            response,
        })
        .await?;
        Ok(reply.await.map_err(|_| ThreadedManagerError::ManagerClosed)??)
    }

    /// See [`EjectionManager::finalize_ejections`].
    pub async fn finalize_ejections(&self) -> Result<(), ThreadedManagerError> {
        let (response, reply) = oneshot::channel();
        self.send(Request::FinalizeEjections { response }).await?;
        Ok(reply.await.map_err(|_| ThreadedManagerError::ManagerClosed)??)
    }

    pub async fn status(&self) -> Result<ManagerStatus, ThreadedManagerError> {
        let (response, reply) = oneshot::channel();
        self.send(Request::Status { response }).await?;
        reply.await.map_err(|_| ThreadedManagerError::ManagerClosed)
    }

    async fn send(&self, request: Request) -> Result<(), ThreadedManagerError> {
        self.requests
            .send(request)
            .await
            .map_err(|_| ThreadedManagerError::ManagerClosed)
    }
}

async fn serve(mut manager: EjectionManager, mut requests: mpsc::Receiver<Request>) {
    while let Some(request) = requests.recv().await {
        match request {
            Request::BeginEjection {
                address,
                stake_fractions,
                response,
            } => {
                let result = manager.begin_ejection(address, stake_fractions).await;
                let _ = response.send(result);
            }
            Request::FinalizeEjections { response } => {
                let result = manager.finalize_ejections().await;
                let _ = response.send(result);
            }
            Request::Status { response } => {
                let _ = response.send(ManagerStatus {
                    in_progress: manager.in_progress_count(),
                    blacklisted: manager.blacklisted_count(),
                });
            }
        }
    }
    tracing::debug!("ejection manager task stopped");
}
