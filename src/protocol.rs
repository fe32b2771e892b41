//! Wire types exchanged with the host and between bridge components.
//!
//! The host writes one JSON object per input line and reads back
//! sentinel-framed JSON documents. Workers talk to the multiplexer over one
//! shared channel using [`WorkerMessage`]; everything a worker sends crosses
//! that boundary by value.

use std::io;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::logging::LogLevel;

/// Marker written immediately before a response document.
pub const RESPONSE_START: &str = "<------------------- START ------------------->";
/// Marker written immediately after a response document.
pub const RESPONSE_END: &str = "<------------------- END ------------------->";

/// One execution request, parsed from a single input line.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Request {
    pub request_id: String,
    pub function_name: String,
    pub module_path: String,
    #[serde(default)]
    pub function_arguments: Value,
}

/// Host-facing payload of a completed request, serialized between the
/// response sentinels.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseFrame {
    #[serde(rename = "hasSucceeded")]
    pub has_succeeded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exception: Option<String>,
    pub request_id: String,
}

impl ResponseFrame {
    pub fn success(request_id: impl Into<String>, result: Value) -> Self {
        Self {
            has_succeeded: true,
            result: Some(result),
            exception: None,
            request_id: request_id.into(),
        }
    }

    pub fn failure(request_id: impl Into<String>, exception: impl Into<String>) -> Self {
        Self {
            has_succeeded: false,
            result: None,
            exception: Some(exception.into()),
            request_id: request_id.into(),
        }
    }
}

/// Bookkeeping a worker attaches to its result. Detached by the multiplexer
/// before the frame is written; `cache` is only present when the invoked
/// function explicitly returned one.
#[derive(Debug, Clone)]
pub struct AdditionalData {
    pub request_id: String,
    pub module_path: String,
    pub function_name: String,
    pub function_arguments: Value,
    pub cache: Option<Value>,
}

/// A log event forwarded from a worker to the bridge logger.
#[derive(Debug, Clone)]
pub struct LogEvent {
    pub level: LogLevel,
    pub context: String,
    pub values: Vec<Value>,
}

/// A worker's final report: the host-facing frame plus detached bookkeeping.
#[derive(Debug, Clone)]
pub struct WorkerResult {
    pub response: ResponseFrame,
    pub additional_data: AdditionalData,
}

/// Everything a worker may send over the shared channel.
///
/// The handshake must be the worker's first message; exactly one `Result`
/// follows, after zero or more log events.
#[derive(Debug, Clone)]
pub enum WorkerMessage {
    Handshake { request_id: String },
    Log(LogEvent),
    Result(WorkerResult),
}

/// Write one response frame as a single unbroken
/// `START + JSON + END` write, followed by a flush. No separator is emitted
/// between consecutive frames, so consumers scan for the sentinels.
pub async fn write_frame<W: AsyncWrite + Unpin>(
    output: &mut W,
    frame: &ResponseFrame,
) -> io::Result<()> {
    let body = serde_json::to_string(frame)
        .map_err(|error| io::Error::new(io::ErrorKind::InvalidData, error))?;
    let framed = format!("{}{}{}", RESPONSE_START, body, RESPONSE_END);

    output.write_all(framed.as_bytes()).await?;
    output.flush().await
}
