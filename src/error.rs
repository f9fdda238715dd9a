//! Error types for pipeline runs and individual result slots.

use std::any::Any;
use std::io;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, PipelineError>;

/// Failures that abort a whole run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("config error: {0}")]
    Config(String),

    #[error("failed to spawn {name} thread: {source}")]
    Spawn {
        name: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("{0} thread panicked")]
    ThreadPanicked(&'static str),
}

impl PipelineError {
    pub fn config<S: Into<String>>(msg: S) -> Self {
        PipelineError::Config(msg.into())
    }
}

/// Failure recorded in place of a single task's result.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SlotError {
    /// The execution thread for this task could not be created.
    #[error("spawn failed: {0}")]
    SpawnFailed(String),

    /// The task terminated abnormally before producing a result.
    #[error("task panicked: {0}")]
    Panicked(String),

    /// A pool worker dropped the reply channel without answering.
    #[error("result channel disconnected")]
    Disconnected,
}

/// Extract a readable message from a panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
