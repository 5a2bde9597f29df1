//! Ejection lifecycle.
//!
//! - Ejection criteria for signing-rate records
//! - Per-quorum leaky bucket throttle
//! - Lifecycle manager and its single-task actor
//! - Periodic driver

pub mod criteria;
pub mod ejector;
pub mod leaky_bucket;
pub mod manager;
pub mod threaded;

pub use criteria::is_ejectable;
pub use ejector::{Ejector, EjectorError, EjectorSettings, TickSummary};
pub use leaky_bucket::{LeakyBucket, LeakyBucketError, OverfillBehavior};
pub use manager::{EjectionManager, EjectionManagerError, InProgressEjection, ManagerSettings};
pub use threaded::{ManagerStatus, ThreadedEjectionManager, ThreadedManagerError};
