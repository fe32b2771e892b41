//! One worker per spawned request.
//!
//! A worker owns everything it touches: the request, a cloned cache
//! snapshot, and a write end of the shared message channel. Its observable
//! protocol is fixed:
//!
//! 1. `Handshake`: always the first message, sent before any user code
//!    runs, so the reader's spawn barrier is released promptly.
//! 2. Zero or more `Log` events.
//! 3. Exactly one `Result`, success or failure. Resolution misses,
//!    executor errors, and executor panics all end up here; a worker never
//!    takes the process down.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinError;

use crate::cache::CacheKey;
use crate::error::format_error_chain;
use crate::executor::{ExecutorRegistry, Invocation, LogForwarder};
use crate::logging::LogLevel;
use crate::protocol::{AdditionalData, Request, ResponseFrame, WorkerMessage, WorkerResult};

const WORKER_LOG_CONTEXT: &str = "worker";

/// Everything a worker needs, passed by value at spawn time.
pub struct WorkerContext {
    pub request: Request,
    pub cache_snapshot: Value,
    pub registry: Arc<ExecutorRegistry>,
    pub messages: mpsc::Sender<WorkerMessage>,
}

/// Run one request to completion.
pub async fn run(ctx: WorkerContext) {
    let WorkerContext {
        request,
        cache_snapshot,
        registry,
        messages,
    } = ctx;

    // The handshake unblocks the reader's spawn barrier and must precede
    // everything else, including executor resolution.
    let handshake = WorkerMessage::Handshake {
        request_id: request.request_id.clone(),
    };
    if messages.send(handshake).await.is_err() {
        return;
    }

    let log = LogForwarder::new(messages.clone());
    log.log(
        LogLevel::Information,
        WORKER_LOG_CONTEXT,
        vec![format!(
            "Worker initialized to process request {}",
            request.request_id
        )
        .into()],
    );

    let message = match invoke(&request, cache_snapshot, registry, log).await {
        Ok(result) => success_message(&request, result),
        Err(exception) => failure_message(&request, exception),
    };

    let _ = messages.send(message).await;
}

/// Resolve and invoke the target function on the blocking pool.
async fn invoke(
    request: &Request,
    cache_snapshot: Value,
    registry: Arc<ExecutorRegistry>,
    log: LogForwarder,
) -> Result<Option<Value>, String> {
    let key = CacheKey::new(&request.function_name, &request.module_path);
    let executor = registry
        .resolve(&key)
        .ok_or_else(|| format!("no executor registered for {}", key))?;

    log.log(
        LogLevel::Information,
        WORKER_LOG_CONTEXT,
        vec![
            format!(
                "Executing function {}() from {} for request {} with the following arguments.",
                request.function_name, request.module_path, request.request_id
            )
            .into(),
            request.function_arguments.clone(),
        ],
    );

    let invocation = Invocation {
        request_id: request.request_id.clone(),
        function_arguments: request.function_arguments.clone(),
        cache: cache_snapshot,
        log,
    };

    match tokio::task::spawn_blocking(move || executor.call(&invocation)).await {
        Ok(Ok(result)) => Ok(result),
        Ok(Err(error)) => Err(format_error_chain(error.as_ref())),
        Err(join_error) => Err(describe_join_failure(join_error)),
    }
}

fn success_message(request: &Request, result: Option<Value>) -> WorkerMessage {
    // A returned `cache` field is bookkeeping for the store, not part of
    // the payload the host sees.
    let (payload, cache) = match result {
        Some(Value::Object(mut entries)) => {
            let cache = entries.remove("cache");
            (Value::Object(entries), cache)
        }
        Some(other) => (other, None),
        None => (Value::Null, None),
    };

    WorkerMessage::Result(WorkerResult {
        response: ResponseFrame::success(request.request_id.clone(), payload),
        additional_data: AdditionalData {
            request_id: request.request_id.clone(),
            module_path: request.module_path.clone(),
            function_name: request.function_name.clone(),
            function_arguments: request.function_arguments.clone(),
            cache,
        },
    })
}

fn failure_message(request: &Request, exception: String) -> WorkerMessage {
    WorkerMessage::Result(WorkerResult {
        response: ResponseFrame::failure(request.request_id.clone(), exception),
        additional_data: AdditionalData {
            request_id: request.request_id.clone(),
            module_path: request.module_path.clone(),
            function_name: request.function_name.clone(),
            function_arguments: request.function_arguments.clone(),
            cache: None,
        },
    })
}

fn describe_join_failure(error: JoinError) -> String {
    if error.is_panic() {
        match error.into_panic().downcast::<String>() {
            Ok(message) => format!("function panicked: {}", message),
            Err(payload) => match payload.downcast::<&'static str>() {
                Ok(message) => format!("function panicked: {}", message),
                Err(_) => "function panicked".to_string(),
            },
        }
    } else {
        "function execution was cancelled".to_string()
    }
}
