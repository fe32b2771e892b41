//! Pluggable function executors.
//!
//! The bridge never loads code from disk; a host-visible
//! `(functionName, modulePath)` pair is a stable identifier resolved
//! through an [`ExecutorRegistry`] built before the bridge starts. A lookup
//! miss is reported to the host as a failed result, the same way an
//! executor error is.

pub mod math;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::mpsc;

use crate::cache::CacheKey;
use crate::logging::LogLevel;
use crate::protocol::{LogEvent, WorkerMessage};

/// Error type returned by executors. Arbitrary business logic gets to fail
/// with whatever error it likes; the worker renders the chain into the
/// `exception` text of the failed frame.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// The argument bundle handed to an executor.
///
/// `cache` is this function's snapshot from the cache store, passed by
/// value: mutating it has no effect on the store. To persist a new cache,
/// return a mapping containing a `cache` field.
#[derive(Debug)]
pub struct Invocation {
    pub request_id: String,
    pub function_arguments: Value,
    pub cache: Value,
    pub log: LogForwarder,
}

/// Handle an executor can use to emit log events through the bridge logger.
///
/// Sends never raise back to the caller; if the channel is closed or full
/// the event is dropped.
#[derive(Debug, Clone)]
pub struct LogForwarder {
    sender: mpsc::Sender<WorkerMessage>,
}

impl LogForwarder {
    pub(crate) fn new(sender: mpsc::Sender<WorkerMessage>) -> Self {
        Self { sender }
    }

    pub fn log(&self, level: LogLevel, context: &str, values: Vec<Value>) {
        let event = LogEvent {
            level,
            context: context.to_string(),
            values,
        };
        let _ = self.sender.try_send(WorkerMessage::Log(event));
    }
}

/// A function the bridge can run on behalf of the host.
///
/// Returns `None` or a mapping; a `cache` field in the mapping becomes the
/// new persisted cache for this function and is stripped from the visible
/// result.
pub trait Executor: Send + Sync {
    fn call(&self, invocation: &Invocation) -> Result<Option<Value>, BoxError>;
}

impl<F> Executor for F
where
    F: Fn(&Invocation) -> Result<Option<Value>, BoxError> + Send + Sync,
{
    fn call(&self, invocation: &Invocation) -> Result<Option<Value>, BoxError> {
        self(invocation)
    }
}

/// Maps `(functionName, modulePath)` identifiers to executors. Built once
/// at startup and shared read-only with every worker.
#[derive(Default)]
pub struct ExecutorRegistry {
    executors: HashMap<CacheKey, Arc<dyn Executor>>,
}

impl ExecutorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        function_name: &str,
        module_path: &str,
        executor: impl Executor + 'static,
    ) {
        self.executors.insert(
            CacheKey::new(function_name, module_path),
            Arc::new(executor),
        );
    }

    pub fn resolve(&self, key: &CacheKey) -> Option<Arc<dyn Executor>> {
        self.executors.get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.executors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.executors.is_empty()
    }
}

impl fmt::Debug for ExecutorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutorRegistry")
            .field("functions", &self.executors.keys().collect::<Vec<_>>())
            .finish()
    }
}
