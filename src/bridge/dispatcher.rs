use std::sync::Arc;

use serde_json::json;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::bridge::worker::{self, WorkerContext};
use crate::cache::{CacheKey, CacheStore};
use crate::executor::ExecutorRegistry;
use crate::logging::Logger;
use crate::protocol::{Request, WorkerMessage};

const DISPATCHER_LOG_CONTEXT: &str = "dispatcher";

/// Dequeues pending requests and starts one worker per request.
///
/// Starting is fire-and-forget: the dispatcher never waits for a worker to
/// finish, it only attaches a fresh cache snapshot and moves on. Completion
/// becomes observable through the worker's messages on the shared channel.
pub struct SpawnDispatcher {
    registry: Arc<ExecutorRegistry>,
    cache: Arc<CacheStore>,
    logger: Arc<Logger>,
    messages: mpsc::Sender<WorkerMessage>,
    shutdown: CancellationToken,
}

impl SpawnDispatcher {
    pub fn new(
        registry: Arc<ExecutorRegistry>,
        cache: Arc<CacheStore>,
        logger: Arc<Logger>,
        messages: mpsc::Sender<WorkerMessage>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            registry,
            cache,
            logger,
            messages,
            shutdown,
        }
    }

    pub async fn run(self, mut requests: mpsc::Receiver<Request>) {
        self.logger.information(
            DISPATCHER_LOG_CONTEXT,
            &["Dispatcher is listening for spawn requests...".into()],
        );

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                received = requests.recv() => match received {
                    Some(request) => self.spawn_worker(request).await,
                    None => break,
                },
            }
        }

        self.logger.information(
            DISPATCHER_LOG_CONTEXT,
            &["Dispatcher has stopped.".into()],
        );
    }

    async fn spawn_worker(&self, request: Request) {
        let key = CacheKey::new(&request.function_name, &request.module_path);
        let snapshot = self.cache.get_or_create(&key).await;

        self.logger.information(
            DISPATCHER_LOG_CONTEXT,
            &[
                "Spawning worker with the following data.".into(),
                json!({
                    "request_id": &request.request_id,
                    "function_name": &request.function_name,
                    "module_path": &request.module_path,
                    "function_arguments": &request.function_arguments,
                    "cache": &snapshot,
                }),
            ],
        );
        tracing::debug!(request_id = %request.request_id, key = %key, "spawning worker");

        let ctx = WorkerContext {
            request,
            cache_snapshot: snapshot,
            registry: self.registry.clone(),
            messages: self.messages.clone(),
        };
        tokio::spawn(worker::run(ctx));
    }
}
