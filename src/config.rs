//! Run configuration: task count, work interval, and execution strategy.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{PipelineError, Result};
use crate::types::TaskId;

/// Largest task count a single run accepts.
pub const MAX_TASKS: usize = 1024;
/// Largest worker count for the pool strategy.
pub const MAX_POOL_WORKERS: usize = 1024;

/// How the dispatcher executes each dequeued task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Run on the dispatcher thread and block it.
    Inline,
    /// Launch every task on its own thread; no pooling.
    AsyncPerTask,
    /// Hand tasks to a fixed set of worker threads.
    Pool { workers: usize },
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::Inline => f.write_str("inline"),
            Strategy::AsyncPerTask => f.write_str("async-per-task"),
            Strategy::Pool { workers } => write!(f, "pool:{workers}"),
        }
    }
}

impl FromStr for Strategy {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "inline" => Ok(Strategy::Inline),
            "async" | "async-per-task" => Ok(Strategy::AsyncPerTask),
            other => match other.strip_prefix("pool:") {
                Some(n) => n
                    .parse::<usize>()
                    .map(|workers| Strategy::Pool { workers })
                    .map_err(|_| PipelineError::config(format!("invalid pool size: {n}"))),
                None => Err(PipelineError::config(format!("unknown strategy: {other}"))),
            },
        }
    }
}

/// What a dequeue attempt does when the queue is momentarily empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DequeueMode {
    /// Count the attempt as empty and move on. Attempts are never retried,
    /// so a dispatcher that outruns the producer comes up short.
    #[default]
    Skip,
    /// Wait for the producer to push an item or close the queue.
    Wait,
}

impl FromStr for DequeueMode {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "skip" => Ok(DequeueMode::Skip),
            "wait" => Ok(DequeueMode::Wait),
            other => Err(PipelineError::config(format!("unknown dequeue mode: {other}"))),
        }
    }
}

/// Ordering of the producer and dispatcher within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schedule {
    /// Producer finishes before the dispatcher starts.
    Sequential,
    /// Both run on their own threads; the dispatcher starts after `head_start`.
    Concurrent { head_start: Duration },
}

impl Default for Schedule {
    fn default() -> Self {
        Schedule::Concurrent {
            head_start: Duration::from_millis(10),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    pub tasks: usize,
    pub work: Duration,
    pub strategy: Strategy,
    pub schedule: Schedule,
    pub dequeue: DequeueMode,
    pub seed: u64,
    /// Task ids forced to terminate abnormally.
    pub faults: Vec<TaskId>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            tasks: 10,
            work: Duration::from_secs(1),
            strategy: Strategy::AsyncPerTask,
            schedule: Schedule::default(),
            dequeue: DequeueMode::default(),
            seed: 0,
            faults: Vec::new(),
        }
    }
}

impl PipelineConfig {
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder::new()
    }

    pub fn validate(&self) -> Result<()> {
        if self.tasks > MAX_TASKS {
            return Err(PipelineError::config(format!(
                "tasks too large (max {MAX_TASKS})"
            )));
        }
        if let Strategy::Pool { workers } = self.strategy {
            if workers == 0 {
                return Err(PipelineError::config("pool workers must be > 0"));
            }
            if workers > MAX_POOL_WORKERS {
                return Err(PipelineError::config(format!(
                    "pool workers too large (max {MAX_POOL_WORKERS})"
                )));
            }
        }
        if let Some(id) = self.faults.iter().find(|&&id| id >= self.tasks as TaskId) {
            return Err(PipelineError::config(format!(
                "fault id {id} out of range for {} tasks",
                self.tasks
            )));
        }
        Ok(())
    }
}

/// Parse a task count; negative or non-numeric values are config errors.
pub fn parse_task_count(arg: &str) -> Result<usize> {
    match arg.trim().parse::<i64>() {
        Ok(n) if n < 0 => Err(PipelineError::config(format!(
            "task count must not be negative: {n}"
        ))),
        Ok(n) => usize::try_from(n)
            .map_err(|_| PipelineError::config(format!("task count out of range: {n}"))),
        Err(_) => Err(PipelineError::config(format!("invalid task count: {arg}"))),
    }
}

#[derive(Debug, Default)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: PipelineConfig::default(),
        }
    }

    pub fn tasks(mut self, n: usize) -> Self {
        self.config.tasks = n;
        self
    }

    pub fn work(mut self, work: Duration) -> Self {
        self.config.work = work;
        self
    }

    pub fn strategy(mut self, strategy: Strategy) -> Self {
        self.config.strategy = strategy;
        self
    }

    pub fn schedule(mut self, schedule: Schedule) -> Self {
        self.config.schedule = schedule;
        self
    }

    pub fn dequeue(mut self, mode: DequeueMode) -> Self {
        self.config.dequeue = mode;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.config.seed = seed;
        self
    }

    pub fn fault(mut self, id: TaskId) -> Self {
        self.config.faults.push(id);
        self
    }

    pub fn build(self) -> Result<PipelineConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
