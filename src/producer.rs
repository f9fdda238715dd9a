//! Fills the shared queue with a fixed number of tasks.

use std::time::Duration;

use tracing::{debug, warn};

use crate::task_queue::TaskQueue;
use crate::types::{Task, TaskId};

pub struct Producer {
    count: usize,
    work: Duration,
    seed: u64,
    faults: Vec<TaskId>,
}

impl Producer {
    pub fn new(count: usize, work: Duration, seed: u64, faults: Vec<TaskId>) -> Self {
        Self {
            count,
            work,
            seed,
            faults,
        }
    }

    /// Build the task that will carry `id`.
    pub fn task(&self, id: TaskId) -> Task {
        let task = Task::new(id, self.work, self.seed.wrapping_add(id));
        if self.faults.contains(&id) {
            task.faulted()
        } else {
            task
        }
    }

    /// Push every task, then close the queue. Returns how many were accepted.
    pub fn run(&self, queue: &TaskQueue<Task>) -> usize {
        let mut pushed = 0;
        for id in 0..self.count as TaskId {
            let task = self.task(id);
            if task.is_faulted() {
                debug!(task = id, "task will terminate abnormally");
            }
            match queue.push(task) {
                Ok(()) => pushed += 1,
                Err(task) => {
                    warn!(task = task.id, "queue closed before producer finished");
                    break;
                }
            }
        }
        queue.close();
        debug!(pushed, "producer done");
        pushed
    }
}
