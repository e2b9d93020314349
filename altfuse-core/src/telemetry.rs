//! Telemetry publishing for periodic fusion tasks
//!
//! The estimator never shares its mutable state. Whoever drives the cycle
//! owns the filter; consumers (plots, loggers, radios) receive owned
//! [`Snapshot`]s through a bounded single-producer single-consumer queue.
//!
//! ```text
//! driver ── tick(z) ──→ FusionTask ── Snapshot ──→ spsc::Queue ──→ consumer
//!                       (owns EKF)     (owned copy)   (bounded)
//! ```
//!
//! [`FusionTask::tick`] never blocks: when the consumer falls behind, the
//! newest snapshot is dropped and counted. Scheduling (timers, threads,
//! interrupts) stays with the caller.
//!
//! ```rust
//! use heapless::spsc::Queue;
//! use altfuse_core::{FusionTask, fusion::altitude::{AglModel, baro, sonar}};
//!
//! let mut queue: Queue<altfuse_core::Snapshot, 4> = Queue::new();
//! let (producer, mut consumer) = queue.split();
//!
//! let ekf = AglModel::default().filter(0.0, 10.0, 0.2).unwrap();
//! let mut task = FusionTask::new(ekf, producer);
//!
//! task.tick(&[baro(250.0), sonar(250.0)]).unwrap();
//!
//! let snapshot = consumer.dequeue().unwrap();
//! assert_eq!(snapshot.update_count, 1);
//! ```

use heapless::spsc::Producer;

use crate::errors::FusionResult;
use crate::fusion::ekf::ExtendedKalmanFilter;
use crate::fusion::matrix::{Matrix, Vector};
use crate::fusion::model::EstimationModel;

/// Owned copy of the estimate after a completed cycle
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Snapshot {
    /// State estimate `x`
    pub state: Vector,
    /// Covariance `P`
    pub covariance: Matrix,
    /// Successful updates so far
    pub update_count: u32,
}

impl Snapshot {
    /// Variance of state component `index`, if present
    pub fn variance(&self, index: usize) -> Option<f64> {
        self.covariance.get(index, index)
    }
}

/// Periodic task owning a filter and publishing its snapshots
///
/// `N` is the queue capacity type parameter (usable capacity `N − 1`).
pub struct FusionTask<'q, Mdl: EstimationModel, const N: usize> {
    filter: ExtendedKalmanFilter<Mdl>,
    publisher: Producer<'q, Snapshot, N>,
    cycles: u32,
    dropped: u32,
    failures: u32,
}

impl<'q, Mdl: EstimationModel, const N: usize> FusionTask<'q, Mdl, N> {
    /// Take ownership of `filter` and publish into `publisher`
    pub fn new(filter: ExtendedKalmanFilter<Mdl>, publisher: Producer<'q, Snapshot, N>) -> Self {
        Self {
            filter,
            publisher,
            cycles: 0,
            dropped: 0,
            failures: 0,
        }
    }

    /// Run one predict/update cycle and publish the result
    ///
    /// A failed step is counted and returned; nothing is published for it.
    pub fn tick(&mut self, measurement: &[f64]) -> FusionResult<Vector> {
        self.cycles = self.cycles.wrapping_add(1);

        let state = match self.filter.step(measurement) {
            Ok(state) => state,
            Err(err) => {
                self.failures = self.failures.saturating_add(1);
                return Err(err);
            }
        };

        if self.publisher.enqueue(self.filter.snapshot()).is_err() {
            self.dropped = self.dropped.saturating_add(1);
            log_warn!(
                "telemetry queue full, snapshot dropped (cycle {}, {} dropped)",
                self.cycles,
                self.dropped
            );
        }

        Ok(state)
    }

    /// Read-only access to the filter
    pub fn filter(&self) -> &ExtendedKalmanFilter<Mdl> {
        &self.filter
    }

    /// Mutable access for reconfiguration between cycles
    pub fn filter_mut(&mut self) -> &mut ExtendedKalmanFilter<Mdl> {
        &mut self.filter
    }

    /// Cycles attempted
    pub fn cycles(&self) -> u32 {
        self.cycles
    }

    /// Snapshots dropped because the queue was full
    pub fn dropped(&self) -> u32 {
        self.dropped
    }

    /// Cycles whose step returned an error
    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// Give the filter back, ending the task
    pub fn into_filter(self) -> ExtendedKalmanFilter<Mdl> {
        self.filter
    }
}
