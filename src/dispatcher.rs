//! Pops tasks from the shared queue and executes them under a strategy.
//!
//! The dispatcher makes a fixed number of dequeue attempts. Under
//! [`DequeueMode::Skip`] an attempt that finds the queue empty is not retried,
//! so a dispatcher that outruns the producer ends the run short. The shortfall
//! is reported through [`Dispatched::empty_attempts`] rather than hidden.

use std::io;
use std::panic;
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::{debug, warn};

use crate::config::{DequeueMode, Strategy};
use crate::error::{SlotError, panic_message};
use crate::task_queue::TaskQueue;
use crate::types::{Slot, SlotIndex, Task};

/// Creates the execution thread for one task under the async-per-task strategy.
pub trait Spawner: Send + Sync {
    fn spawn(&self, index: SlotIndex, task: Task) -> io::Result<JoinHandle<i32>>;
}

/// Spawns one named OS thread per task.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSpawner;

impl Spawner for ThreadSpawner {
    fn spawn(&self, index: SlotIndex, task: Task) -> io::Result<JoinHandle<i32>> {
        thread::Builder::new()
            .name(format!("task-{index}"))
            .spawn(move || task.run())
    }
}

/// A result that may not be available yet. Resolving consumes it.
pub enum Handle {
    Ready(Slot),
    Thread(JoinHandle<i32>),
    Pooled(Receiver<Slot>),
}

impl Handle {
    /// Block until the task behind this handle has finished.
    pub fn resolve(self) -> Slot {
        match self {
            Handle::Ready(slot) => slot,
            Handle::Thread(handle) => handle
                .join()
                .map_err(|payload| SlotError::Panicked(panic_message(payload.as_ref()))),
            Handle::Pooled(reply) => reply.recv().unwrap_or(Err(SlotError::Disconnected)),
        }
    }
}

/// Run a task on the current thread, turning a panic into a slot error.
fn run_isolated(task: Task) -> Slot {
    panic::catch_unwind(move || task.run())
        .map_err(|payload| SlotError::Panicked(panic_message(payload.as_ref())))
}

struct Job {
    task: Task,
    reply: SyncSender<Slot>,
}

/// Fixed set of worker threads draining a job queue.
pub struct WorkerPool {
    jobs: Arc<TaskQueue<Job>>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    fn start(size: usize) -> io::Result<Self> {
        let jobs: Arc<TaskQueue<Job>> = Arc::new(TaskQueue::new());
        let mut workers = Vec::with_capacity(size);
        for worker_id in 0..size {
            let queue = Arc::clone(&jobs);
            let spawned = thread::Builder::new()
                .name(format!("pool-worker-{worker_id}"))
                .spawn(move || {
                    while let Some(job) = queue.pop_blocking_or_closed() {
                        // The collector may have stopped listening; nothing to do then.
                        let _ = job.reply.send(run_isolated(job.task));
                    }
                });
            match spawned {
                Ok(handle) => workers.push(handle),
                Err(e) => {
                    WorkerPool { jobs, workers }.shutdown();
                    return Err(e);
                }
            }
        }
        debug!(size, "worker pool started");
        Ok(Self { jobs, workers })
    }

    fn submit(&self, task: Task) -> Handle {
        let (reply, result) = mpsc::sync_channel(1);
        match self.jobs.push(Job { task, reply }) {
            Ok(()) => Handle::Pooled(result),
            Err(_) => Handle::Ready(Err(SlotError::Disconnected)),
        }
    }

    /// Let workers drain the remaining jobs, then join them.
    pub fn shutdown(mut self) {
        self.jobs.close();
        for worker in std::mem::take(&mut self.workers) {
            if worker.join().is_err() {
                warn!("pool worker panicked");
            }
        }
    }
}

impl Drop for WorkerPool {
    // Workers wait on the job queue until it closes; a pool dropped without
    // `shutdown` must still release them. They exit after draining.
    fn drop(&mut self) {
        self.jobs.close();
    }
}

enum Executor<'a> {
    Inline,
    PerTask(&'a dyn Spawner),
    Pool(WorkerPool),
    Unavailable(String),
}

impl Executor<'_> {
    fn execute(&self, index: SlotIndex, task: Task) -> Handle {
        match self {
            Executor::Inline => Handle::Ready(run_isolated(task)),
            Executor::PerTask(spawner) => match spawner.spawn(index, task) {
                Ok(handle) => Handle::Thread(handle),
                Err(e) => {
                    warn!(index, error = %e, "failed to launch task thread");
                    Handle::Ready(Err(SlotError::SpawnFailed(e.to_string())))
                }
            },
            Executor::Pool(pool) => pool.submit(task),
            Executor::Unavailable(reason) => {
                Handle::Ready(Err(SlotError::SpawnFailed(reason.clone())))
            }
        }
    }
}

/// Output of one dispatcher pass, consumed by the collector.
pub struct Dispatched {
    handles: Vec<Handle>,
    attempts: usize,
    empty_attempts: usize,
    pool: Option<WorkerPool>,
}

impl Dispatched {
    /// Number of tasks that were dequeued and given a slot.
    pub fn dispatched(&self) -> usize {
        self.handles.len()
    }

    pub fn attempts(&self) -> usize {
        self.attempts
    }

    /// Attempts that found the queue empty.
    pub fn empty_attempts(&self) -> usize {
        self.empty_attempts
    }

    pub(crate) fn into_parts(self) -> (Vec<Handle>, Option<WorkerPool>) {
        (self.handles, self.pool)
    }
}

pub struct Dispatcher {
    strategy: Strategy,
    mode: DequeueMode,
    spawner: Arc<dyn Spawner>,
}

impl Dispatcher {
    #[allow(dead_code)]
    pub fn new(strategy: Strategy, mode: DequeueMode) -> Self {
        Self::with_spawner(strategy, mode, Arc::new(ThreadSpawner))
    }

    pub fn with_spawner(strategy: Strategy, mode: DequeueMode, spawner: Arc<dyn Spawner>) -> Self {
        Self {
            strategy,
            mode,
            spawner,
        }
    }

    /// Make exactly `attempts` dequeue attempts and dispatch what was found.
    pub fn run(&self, queue: &TaskQueue<Task>, attempts: usize) -> Dispatched {
        let executor = match self.strategy {
            Strategy::Inline => Executor::Inline,
            Strategy::AsyncPerTask => Executor::PerTask(self.spawner.as_ref()),
            Strategy::Pool { workers } => match WorkerPool::start(workers) {
                Ok(pool) => Executor::Pool(pool),
                Err(e) => {
                    warn!(workers, error = %e, "failed to start worker pool");
                    Executor::Unavailable(e.to_string())
                }
            },
        };

        self.drain(executor, queue, attempts)
    }

    fn drain(&self, executor: Executor<'_>, queue: &TaskQueue<Task>, attempts: usize) -> Dispatched {
        let mut handles = Vec::with_capacity(attempts);
        let mut empty_attempts = 0;
        for attempt in 0..attempts {
            let next = match self.mode {
                DequeueMode::Skip => queue.try_pop(),
                DequeueMode::Wait => queue.pop_blocking_or_closed(),
            };
            let Some(task) = next else {
                empty_attempts += 1;
                debug!(attempt, "queue empty, attempt skipped");
                continue;
            };
            let index = handles.len();
            debug!(index, task = task.id, strategy = %self.strategy, "dispatching task");
            handles.push(executor.execute(index, task));
        }

        let pool = match executor {
            Executor::Pool(pool) => Some(pool),
            _ => None,
        };
        Dispatched {
            handles,
            attempts,
            empty_attempts,
            pool,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use crate::collector::collect;

    /// Fails to launch the tasks at the given indices.
    pub(crate) struct FailingSpawner {
        pub(crate) fail_at: HashSet<SlotIndex>,
    }

    impl Spawner for FailingSpawner {
        fn spawn(&self, index: SlotIndex, task: Task) -> io::Result<JoinHandle<i32>> {
            if self.fail_at.contains(&index) {
                return Err(io::Error::other("thread limit reached"));
            }
            ThreadSpawner.spawn(index, task)
        }
    }

    /// Counts launches to verify each task executes once.
    struct CountingSpawner {
        launched: AtomicUsize,
        ids: Mutex<Vec<u64>>,
    }

    impl Spawner for CountingSpawner {
        fn spawn(&self, index: SlotIndex, task: Task) -> io::Result<JoinHandle<i32>> {
            self.launched.fetch_add(1, Ordering::SeqCst);
            self.ids.lock().expect("ids mutex poisoned").push(task.id);
            ThreadSpawner.spawn(index, task)
        }
    }

    fn filled_queue(tasks: &[Task]) -> TaskQueue<Task> {
        let queue = TaskQueue::new();
        for task in tasks {
            queue.push(task.clone()).expect("task queue closed");
        }
        queue
    }

    /// Later tasks finish first so completion order is the reverse of dispatch order.
    fn staggered_tasks(count: u64) -> Vec<Task> {
        (0..count)
            .map(|id| Task::new(id, Duration::from_millis(5 * (count - id)), 1000 + id))
            .collect()
    }

    fn assert_index_aligned(strategy: Strategy) {
        let tasks = staggered_tasks(6);
        let queue = filled_queue(&tasks);
        let dispatched = Dispatcher::new(strategy, DequeueMode::Skip).run(&queue, tasks.len());
        assert_eq!(dispatched.empty_attempts(), 0);
        let results = collect(dispatched);
        let expected: Vec<i32> = tasks.iter().map(Task::expected_value).collect();
        assert_eq!(results.values(), expected, "strategy {strategy}");
    }

    #[test]
    fn inline_results_follow_dispatch_order() {
        assert_index_aligned(Strategy::Inline);
    }

    #[test]
    fn async_results_follow_dispatch_order() {
        assert_index_aligned(Strategy::AsyncPerTask);
    }

    #[test]
    fn pool_results_follow_dispatch_order() {
        assert_index_aligned(Strategy::Pool { workers: 3 });
    }

    #[test]
    fn empty_attempts_are_counted_not_retried() {
        let tasks = staggered_tasks(3);
        let queue = filled_queue(&tasks);
        let dispatched = Dispatcher::new(Strategy::Inline, DequeueMode::Skip).run(&queue, 5);
        assert_eq!(dispatched.attempts(), 5);
        assert_eq!(dispatched.dispatched(), 3);
        assert_eq!(dispatched.empty_attempts(), 2);
        assert_eq!(collect(dispatched).len(), 3);
    }

    #[test]
    fn wait_mode_picks_up_late_tasks() {
        let queue = Arc::new(TaskQueue::new());
        let producer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(30));
                for id in 0..4 {
                    queue
                        .push(Task::new(id, Duration::ZERO, id))
                        .expect("task queue closed");
                }
                queue.close();
            })
        };
        let dispatched = Dispatcher::new(Strategy::Inline, DequeueMode::Wait).run(&queue, 4);
        producer.join().expect("producer thread panicked");
        assert_eq!(dispatched.empty_attempts(), 0);
        assert_eq!(collect(dispatched).len(), 4);
    }

    #[test]
    fn spawn_failure_is_recorded_in_place() {
        let tasks = staggered_tasks(4);
        let queue = filled_queue(&tasks);
        let spawner = Arc::new(FailingSpawner {
            fail_at: HashSet::from([2]),
        });
        let dispatcher = Dispatcher::with_spawner(Strategy::AsyncPerTask, DequeueMode::Skip, spawner);
        let results = collect(dispatcher.run(&queue, 4));
        assert_eq!(results.len(), 4);
        assert!(matches!(results.get(2), Some(Err(SlotError::SpawnFailed(_)))));
        for index in [0, 1, 3] {
            assert_eq!(results.get(index), Some(&Ok(tasks[index].expected_value())));
        }
    }

    #[test]
    fn each_task_launches_exactly_once() {
        let tasks: Vec<Task> = (0..8).map(|id| Task::new(id, Duration::ZERO, id)).collect();
        let queue = filled_queue(&tasks);
        let spawner = Arc::new(CountingSpawner {
            launched: AtomicUsize::new(0),
            ids: Mutex::new(Vec::new()),
        });
        let dispatcher = Dispatcher::with_spawner(
            Strategy::AsyncPerTask,
            DequeueMode::Skip,
            Arc::clone(&spawner) as Arc<dyn Spawner>,
        );
        let results = collect(dispatcher.run(&queue, 8));
        assert_eq!(results.len(), 8);
        assert_eq!(spawner.launched.load(Ordering::SeqCst), 8);
        let ids = spawner.ids.lock().expect("ids mutex poisoned").clone();
        assert_eq!(ids, (0..8).collect::<Vec<u64>>());
        assert!(queue.is_empty());
    }

    #[test]
    fn panicking_task_is_isolated_under_every_strategy() {
        for strategy in [
            Strategy::Inline,
            Strategy::AsyncPerTask,
            Strategy::Pool { workers: 2 },
        ] {
            let mut tasks = staggered_tasks(3);
            tasks[1] = tasks[1].clone().faulted();
            let queue = filled_queue(&tasks);
            let results = collect(Dispatcher::new(strategy, DequeueMode::Skip).run(&queue, 3));
            assert_eq!(
                results.get(1),
                Some(&Err(SlotError::Panicked("task 1 failed".into()))),
                "strategy {strategy}"
            );
            assert_eq!(results.get(0), Some(&Ok(tasks[0].expected_value())));
            assert_eq!(results.get(2), Some(&Ok(tasks[2].expected_value())));
        }
    }

    #[test]
    fn dropped_pool_dispatch_releases_workers() {
        let tasks = staggered_tasks(3);
        let queue = filled_queue(&tasks);
        let dispatched =
            Dispatcher::new(Strategy::Pool { workers: 8 }, DequeueMode::Skip).run(&queue, 3);
        let jobs = Arc::downgrade(&dispatched.pool.as_ref().expect("pool started").jobs);

        // Never collected: every worker holds the job queue until it exits.
        drop(dispatched);
        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while jobs.upgrade().is_some() {
            assert!(
                std::time::Instant::now() < deadline,
                "pool workers still running after drop"
            );
            thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn unavailable_pool_marks_every_dispatched_slot() {
        let tasks = staggered_tasks(3);
        let queue = filled_queue(&tasks);
        let dispatcher = Dispatcher::new(Strategy::Pool { workers: 2 }, DequeueMode::Skip);
        let dispatched = dispatcher.drain(Executor::Unavailable("no threads left".into()), &queue, 4);
        assert_eq!(dispatched.empty_attempts(), 1);
        assert!(dispatched.pool.is_none());

        let results = collect(dispatched);
        assert_eq!(results.len(), 3);
        for slot in results.iter() {
            assert_eq!(slot, &Err(SlotError::SpawnFailed("no threads left".into())));
        }
    }

    #[test]
    fn lost_reply_resolves_as_disconnected() {
        let (reply, result) = mpsc::sync_channel::<Slot>(1);
        drop(reply);
        assert_eq!(Handle::Pooled(result).resolve(), Err(SlotError::Disconnected));

        let pool = WorkerPool::start(1).expect("pool start");
        pool.jobs.close();
        let handle = pool.submit(Task::new(0, Duration::ZERO, 0));
        assert_eq!(handle.resolve(), Err(SlotError::Disconnected));
        pool.shutdown();
    }
}
