use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncWrite;
use tokio::sync::mpsc;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::cache::{CacheKey, CacheStore};
use crate::logging::Logger;
use crate::protocol::{self, WorkerMessage, WorkerResult};

const MULTIPLEXER_LOG_CONTEXT: &str = "multiplexer";

/// Drains the shared channel carrying traffic from every live worker.
///
/// Messages from concurrently running workers arrive interleaved and are
/// correlated purely by the request id each one carries; there is no
/// per-request channel. Log events go to the logger, handshakes release the
/// spawn barrier, and results are framed onto the output channel before
/// their cache update is committed to the store.
pub struct ResponseMultiplexer<W> {
    logger: Arc<Logger>,
    cache: Arc<CacheStore>,
    spawn_ack: Arc<Notify>,
    shutdown: CancellationToken,
    drain_timeout: Duration,
    output: W,
}

impl<W: AsyncWrite + Unpin> ResponseMultiplexer<W> {
    pub fn new(
        logger: Arc<Logger>,
        cache: Arc<CacheStore>,
        spawn_ack: Arc<Notify>,
        shutdown: CancellationToken,
        drain_timeout: Duration,
        output: W,
    ) -> Self {
        Self {
            logger,
            cache,
            spawn_ack,
            shutdown,
            drain_timeout,
            output,
        }
    }

    pub async fn run(mut self, mut messages: mpsc::Receiver<WorkerMessage>) {
        self.logger.information(
            MULTIPLEXER_LOG_CONTEXT,
            &["Listening for worker responses...".into()],
        );

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    self.drain(&mut messages).await;
                    break;
                }
                received = messages.recv() => match received {
                    Some(message) => self.route(message).await,
                    None => break,
                },
            }
        }

        self.logger.information(
            MULTIPLEXER_LOG_CONTEXT,
            &["Multiplexer has stopped.".into()],
        );
    }

    /// Consume whatever already-spawned workers still produce after
    /// shutdown began, until the channel closes or goes idle for the
    /// configured drain window.
    async fn drain(&mut self, messages: &mut mpsc::Receiver<WorkerMessage>) {
        loop {
            match tokio::time::timeout(self.drain_timeout, messages.recv()).await {
                Ok(Some(message)) => self.route(message).await,
                Ok(None) => break,
                Err(_) => {
                    self.logger.warning(
                        MULTIPLEXER_LOG_CONTEXT,
                        &["Drain window elapsed with workers still running; remaining messages are dropped.".into()],
                    );
                    break;
                }
            }
        }
    }

    async fn route(&mut self, message: WorkerMessage) {
        match message {
            WorkerMessage::Log(event) => {
                self.logger.log(event.level, &event.context, &event.values);
            }
            WorkerMessage::Handshake { request_id } => {
                self.logger.information(
                    MULTIPLEXER_LOG_CONTEXT,
                    &[format!("Worker for request {} has spawned.", request_id).into()],
                );
                self.spawn_ack.notify_one();
            }
            WorkerMessage::Result(result) => self.deliver(result).await,
        }
    }

    /// Write the host-facing frame, then commit any returned cache.
    async fn deliver(&mut self, result: WorkerResult) {
        let WorkerResult {
            response,
            additional_data,
        } = result;

        self.logger.information(
            MULTIPLEXER_LOG_CONTEXT,
            &[format!("Writing response for request {} to output.", response.request_id).into()],
        );

        if let Err(error) = protocol::write_frame(&mut self.output, &response).await {
            self.logger.error(
                MULTIPLEXER_LOG_CONTEXT,
                &[format!(
                    "An error occurred while writing the response for request {}: {}",
                    response.request_id, error
                )
                .into()],
            );
            tracing::warn!(request_id = %response.request_id, error = %error, "failed to write response frame");
        }

        if let Some(cache) = additional_data.cache {
            if cache.is_object() {
                let key = CacheKey::new(
                    &additional_data.function_name,
                    &additional_data.module_path,
                );
                self.cache.set(key, cache).await;
            }
        }
    }
}
