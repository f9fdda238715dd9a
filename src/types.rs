//! Shared identifiers and the task model used across the pipeline.

use std::thread;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::SlotError;

/// Sequence number assigned to a task by the producer.
pub type TaskId = u64;
/// Position of a task in dispatch order.
pub type SlotIndex = usize;
/// Outcome stored for one dispatched task.
pub type Slot = Result<i32, SlotError>;

/// Upper bound (exclusive) of the simulated computation result.
pub const RESULT_RANGE: i32 = 100;

/// Unit of simulated work that yields one integer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Task {
    /// Stable task identifier for logging and validation.
    pub id: TaskId,
    /// How long the task blocks its thread before answering.
    pub work: Duration,
    seed: u64,
    fault: bool,
}

impl Task {
    pub fn new(id: TaskId, work: Duration, seed: u64) -> Self {
        Self {
            id,
            work,
            seed,
            fault: false,
        }
    }

    /// Mark the task so it terminates abnormally instead of answering.
    pub fn faulted(mut self) -> Self {
        self.fault = true;
        self
    }

    pub fn is_faulted(&self) -> bool {
        self.fault
    }

    /// The value `run` will return, computed without blocking.
    pub fn expected_value(&self) -> i32 {
        StdRng::seed_from_u64(self.seed).gen_range(0..RESULT_RANGE)
    }

    /// Block for the work interval, then yield the result.
    pub fn run(self) -> i32 {
        if !self.work.is_zero() {
            thread::sleep(self.work);
        }
        if self.fault {
            panic!("task {} failed", self.id);
        }
        self.expected_value()
    }
}
