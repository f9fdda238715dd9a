//! One producer/dispatcher run, from an empty queue to a resolved result set.

use std::fmt;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::collector::{ResultSet, collect};
use crate::config::{PipelineConfig, Schedule, Strategy};
use crate::dispatcher::{Dispatched, Dispatcher, Spawner, ThreadSpawner};
use crate::error::{PipelineError, Result};
use crate::producer::Producer;
use crate::task_queue::TaskQueue;
use crate::types::Task;

/// Lifecycle of a run. There is no retry state; a short run stays short.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Idle,
    ProducingAndDispatching,
    AllDispatched,
    AllResolved,
    Done,
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunPhase::Idle => "idle",
            RunPhase::ProducingAndDispatching => "producing-and-dispatching",
            RunPhase::AllDispatched => "all-dispatched",
            RunPhase::AllResolved => "all-resolved",
            RunPhase::Done => "done",
        };
        f.write_str(name)
    }
}

/// Outcome of a completed run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub strategy: Strategy,
    /// Number of tasks the run was configured for.
    pub expected: usize,
    pub results: ResultSet,
    /// Dequeue attempts that found the queue empty.
    pub shortfall: usize,
    pub elapsed: Duration,
}

impl RunReport {
    pub fn is_complete(&self) -> bool {
        self.shortfall == 0 && self.results.failures().is_empty()
    }

    /// One entry per expected task: a value, an error marker, or `missing`.
    pub fn render_slots(&self) -> Vec<String> {
        let mut lines: Vec<String> = self
            .results
            .iter()
            .map(|slot| match slot {
                Ok(value) => value.to_string(),
                Err(e) => format!("error({e})"),
            })
            .collect();
        lines.resize(self.expected.max(lines.len()), "missing".to_string());
        lines
    }
}

pub struct Pipeline {
    config: PipelineConfig,
    spawner: Arc<dyn Spawner>,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        Self::with_spawner(config, Arc::new(ThreadSpawner))
    }

    /// Use a custom thread launcher for the async-per-task strategy.
    pub fn with_spawner(config: PipelineConfig, spawner: Arc<dyn Spawner>) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, spawner })
    }

    pub fn run(&self) -> Result<RunReport> {
        let cfg = &self.config;
        let mut phase = RunPhase::Idle;
        debug!(%phase, tasks = cfg.tasks, strategy = %cfg.strategy, "run configured");

        let queue: Arc<TaskQueue<Task>> = Arc::new(TaskQueue::new());
        let producer = Producer::new(cfg.tasks, cfg.work, cfg.seed, cfg.faults.clone());
        let dispatcher =
            Dispatcher::with_spawner(cfg.strategy, cfg.dequeue, Arc::clone(&self.spawner));

        let start = Instant::now();
        phase = advance(phase, RunPhase::ProducingAndDispatching);
        let dispatched = match cfg.schedule {
            Schedule::Sequential => {
                producer.run(&queue);
                dispatcher.run(&queue, cfg.tasks)
            }
            Schedule::Concurrent { head_start } => {
                self.run_concurrently(producer, dispatcher, &queue, head_start)?
            }
        };
        phase = advance(phase, RunPhase::AllDispatched);

        let shortfall = dispatched.empty_attempts();
        if shortfall > 0 {
            warn!(
                shortfall,
                attempts = dispatched.attempts(),
                dispatched = dispatched.dispatched(),
                expected = cfg.tasks,
                "dispatcher found the queue empty; run is short"
            );
        }
        if !queue.is_empty() {
            debug!(leftover = queue.len(), "tasks left in queue after dispatch");
        }

        let results = collect(dispatched);
        phase = advance(phase, RunPhase::AllResolved);

        let report = RunReport {
            strategy: cfg.strategy,
            expected: cfg.tasks,
            results,
            shortfall,
            elapsed: start.elapsed(),
        };
        advance(phase, RunPhase::Done);
        info!(
            results = report.results.len(),
            failures = report.results.failures().len(),
            shortfall = report.shortfall,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "run finished"
        );
        Ok(report)
    }

    fn run_concurrently(
        &self,
        producer: Producer,
        dispatcher: Dispatcher,
        queue: &Arc<TaskQueue<Task>>,
        head_start: Duration,
    ) -> Result<Dispatched> {
        let attempts = self.config.tasks;

        let producer_thread = {
            let queue = Arc::clone(queue);
            thread::Builder::new()
                .name("producer".to_string())
                .spawn(move || producer.run(&queue))
                .map_err(|source| PipelineError::Spawn {
                    name: "producer",
                    source,
                })?
        };

        if !head_start.is_zero() {
            thread::sleep(head_start);
        }

        let dispatcher_thread = {
            let queue = Arc::clone(queue);
            thread::Builder::new()
                .name("dispatcher".to_string())
                .spawn(move || dispatcher.run(&queue, attempts))
        };
        let dispatcher_thread = match dispatcher_thread {
            Ok(handle) => handle,
            Err(source) => {
                // The producer never blocks, so joining it cannot hang.
                let _ = producer_thread.join();
                return Err(PipelineError::Spawn {
                    name: "dispatcher",
                    source,
                });
            }
        };

        let produced = producer_thread.join();
        if produced.is_err() {
            // A dead producer never closes the queue; waiting dispatchers need it closed.
            queue.close();
        }
        // Join the dispatcher on every path so its pool is not left detached.
        let dispatched = dispatcher_thread
            .join()
            .map_err(|_| PipelineError::ThreadPanicked("dispatcher"))?;
        let pushed = produced.map_err(|_| PipelineError::ThreadPanicked("producer"))?;
        debug!(pushed, dispatched = dispatched.dispatched(), "producer and dispatcher joined");
        Ok(dispatched)
    }
}

fn advance(from: RunPhase, to: RunPhase) -> RunPhase {
    debug!(%from, %to, "run phase");
    to
}
