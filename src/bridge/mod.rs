//! Orchestration core of the bridge process.
//!
//! Three loops share the process:
//! - the **reader** (this module) consumes one request per input line and
//!   enforces the spawn barrier,
//! - the [`SpawnDispatcher`] turns queued requests into workers,
//! - the [`ResponseMultiplexer`] merges every worker's traffic back onto
//!   the single output channel.
//!
//! # Spawn barrier
//!
//! After queueing a request the reader does not touch the input channel
//! again until the spawned worker's handshake has been observed. Without
//! the barrier a blocking read would starve process creation; with it,
//! every request is at least accepted for execution before the next line
//! is read. The barrier throttles spawning only; any number of
//! already-spawned workers may be executing concurrently.

pub mod dispatcher;
pub mod multiplexer;
pub mod worker;

pub use dispatcher::SpawnDispatcher;
pub use multiplexer::ResponseMultiplexer;

use std::sync::Arc;

use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite};
use tokio::sync::{mpsc, Notify};
use tokio_util::sync::CancellationToken;

use crate::cache::CacheStore;
use crate::config::BridgeConfig;
use crate::error::{BridgeError, Result};
use crate::executor::ExecutorRegistry;
use crate::logging::Logger;
use crate::protocol::Request;

const BRIDGE_LOG_CONTEXT: &str = "bridge";

/// The bridge process: reader, dispatcher, multiplexer, and cache store
/// wired together around one shutdown token.
pub struct Bridge {
    config: BridgeConfig,
    logger: Arc<Logger>,
    cache: Arc<CacheStore>,
    registry: Arc<ExecutorRegistry>,
    shutdown: CancellationToken,
    disposed: bool,
}

enum InputEvent {
    Request(Request),
    Exit,
    Skipped,
}

impl Bridge {
    pub fn new(config: BridgeConfig, logger: Arc<Logger>, registry: Arc<ExecutorRegistry>) -> Self {
        Self {
            config,
            logger,
            cache: Arc::new(CacheStore::new()),
            registry,
            shutdown: CancellationToken::new(),
            disposed: false,
        }
    }

    /// Token cancelled when the bridge shuts down. Hand a clone to signal
    /// handlers or anything else that should be able to stop the bridge.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Run the bridge until the host requests exit, the input channel
    /// closes, or the shutdown token is cancelled.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Disposed`] when called on a disposed bridge.
    pub async fn run<R, W>(&mut self, input: R, output: W) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        if self.disposed {
            return Err(BridgeError::Disposed);
        }

        self.logger
            .information(BRIDGE_LOG_CONTEXT, &["Initializing bridge...".into()]);

        let (request_tx, request_rx) = mpsc::channel(self.config.queue_capacity);
        let (message_tx, message_rx) = mpsc::channel(self.config.channel_capacity);
        let spawn_ack = Arc::new(Notify::new());

        let dispatcher = SpawnDispatcher::new(
            self.registry.clone(),
            self.cache.clone(),
            self.logger.clone(),
            message_tx,
            self.shutdown.clone(),
        );
        let dispatcher_handle = tokio::spawn(dispatcher.run(request_rx));

        let multiplexer = ResponseMultiplexer::new(
            self.logger.clone(),
            self.cache.clone(),
            spawn_ack.clone(),
            self.shutdown.clone(),
            self.config.drain_timeout(),
            output,
        );
        let multiplexer_handle = tokio::spawn(multiplexer.run(message_rx));

        self.read_requests(input, request_tx, spawn_ack).await;

        // Ending the reader ends the bridge. The dispatcher stops on
        // cancellation; the multiplexer drains already-spawned workers for
        // a bounded window before the channel is torn down.
        self.shutdown.cancel();

        if let Err(error) = dispatcher_handle.await {
            tracing::error!(error = %error, "dispatcher task failed");
        }
        if let Err(error) = multiplexer_handle.await {
            tracing::error!(error = %error, "multiplexer task failed");
        }

        self.logger
            .information(BRIDGE_LOG_CONTEXT, &["Bridge has stopped.".into()]);
        Ok(())
    }

    /// Release the bridge. Further `run` or `dispose` calls are usage
    /// errors.
    pub fn dispose(&mut self) -> Result<()> {
        if self.disposed {
            return Err(BridgeError::Disposed);
        }
        self.disposed = true;
        self.shutdown.cancel();
        self.logger
            .information(BRIDGE_LOG_CONTEXT, &["Bridge has been disposed.".into()]);
        Ok(())
    }

    async fn read_requests<R: AsyncBufRead + Unpin>(
        &self,
        input: R,
        requests: mpsc::Sender<Request>,
        spawn_ack: Arc<Notify>,
    ) {
        let mut lines = input.lines();

        loop {
            let line = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                line = lines.next_line() => line,
            };

            let line = match line {
                Ok(Some(line)) => line,
                Ok(None) => {
                    self.logger
                        .warning(BRIDGE_LOG_CONTEXT, &["Input channel has closed.".into()]);
                    break;
                }
                Err(error) => {
                    self.logger.error(
                        BRIDGE_LOG_CONTEXT,
                        &[format!("An error occurred while reading from input: {}", error).into()],
                    );
                    break;
                }
            };

            match self.parse_line(&line) {
                InputEvent::Skipped => continue,
                InputEvent::Exit => {
                    self.logger
                        .warning(BRIDGE_LOG_CONTEXT, &["Received exit request.".into()]);
                    break;
                }
                InputEvent::Request(request) => {
                    self.logger.information(
                        BRIDGE_LOG_CONTEXT,
                        &[format!("Queueing request {} for execution.", request.request_id).into()],
                    );

                    if requests.send(request).await.is_err() {
                        // dispatcher is gone; nothing can execute anymore
                        break;
                    }

                    self.logger.information(
                        BRIDGE_LOG_CONTEXT,
                        &["Waiting for worker to spawn...".into()],
                    );

                    tokio::select! {
                        _ = self.shutdown.cancelled() => break,
                        _ = spawn_ack.notified() => {}
                    }

                    self.logger.information(
                        BRIDGE_LOG_CONTEXT,
                        &["Worker spawned successfully.".into()],
                    );
                }
            }
        }
    }

    fn parse_line(&self, line: &str) -> InputEvent {
        let line = line.trim();
        if line.is_empty() {
            self.logger.warning(
                BRIDGE_LOG_CONTEXT,
                &["Line read from input is empty.".into()],
            );
            return InputEvent::Skipped;
        }

        let value: Value = match serde_json::from_str(line) {
            Ok(value) => value,
            Err(error) => {
                // malformed input is skipped, never treated as an error
                self.logger.information(
                    BRIDGE_LOG_CONTEXT,
                    &[format!("Could not parse line as JSON: {}", error).into()],
                );
                return InputEvent::Skipped;
            }
        };

        if value.get("exit").and_then(Value::as_bool) == Some(true) {
            return InputEvent::Exit;
        }

        match serde_json::from_value(value) {
            Ok(request) => InputEvent::Request(request),
            Err(error) => {
                self.logger.information(
                    BRIDGE_LOG_CONTEXT,
                    &[format!("Line is not a valid request: {}", error).into()],
                );
                InputEvent::Skipped
            }
        }
    }
}
