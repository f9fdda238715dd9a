//! Unbounded FIFO shared by the producer, the dispatcher and pool workers.
//!
//! Closing is one-way. A closed queue rejects new items but still hands out
//! whatever was queued before the close, so waiting consumers drain it and
//! then observe `None`.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard};

pub struct TaskQueue<T> {
    state: Mutex<State<T>>,
    ready: Condvar,
}

struct State<T> {
    items: VecDeque<T>,
    closed: bool,
}

impl<T> TaskQueue<T> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                items: VecDeque::new(),
                closed: false,
            }),
            ready: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State<T>> {
        self.state.lock().expect("task queue mutex poisoned")
    }

    /// Append an item and wake one waiting consumer. A closed queue hands the
    /// item back untouched.
    pub fn push(&self, item: T) -> Result<(), T> {
        let mut state = self.lock();
        if state.closed {
            return Err(item);
        }
        state.items.push_back(item);
        drop(state);
        self.ready.notify_one();
        Ok(())
    }

    /// Take the oldest item if one is queued right now.
    pub fn try_pop(&self) -> Option<T> {
        self.lock().items.pop_front()
    }

    /// Take the oldest item, waiting for one to arrive. Returns `None` once
    /// the queue is closed and empty.
    pub fn pop_blocking_or_closed(&self) -> Option<T> {
        let state = self.lock();
        let mut state = self
            .ready
            .wait_while(state, |state| state.items.is_empty() && !state.closed)
            .expect("task queue mutex poisoned");
        state.items.pop_front()
    }

    /// Reject further pushes and release every waiting consumer.
    pub fn close(&self) {
        self.lock().closed = true;
        self.ready.notify_all();
    }

    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().items.is_empty()
    }
}

impl<T> Default for TaskQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}
