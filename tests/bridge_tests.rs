use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt, BufReader, DuplexStream};
use tokio::task::JoinHandle;
use tokio::time::timeout;

use fnbridge::bridge::Bridge;
use fnbridge::config::BridgeConfig;
use fnbridge::error::BridgeError;
use fnbridge::executor::{math::AddFunction, BoxError, ExecutorRegistry, Invocation};
use fnbridge::logging::Logger;
use fnbridge::protocol::{ResponseFrame, RESPONSE_END, RESPONSE_START};

const WAIT: Duration = Duration::from_secs(5);

fn add_registry() -> ExecutorRegistry {
    let mut registry = ExecutorRegistry::new();
    registry.register("add", "Math.py", AddFunction);
    registry
}

fn failing(_: &Invocation) -> Result<Option<Value>, BoxError> {
    Err("executor failure".into())
}

fn panicking(_: &Invocation) -> Result<Option<Value>, BoxError> {
    panic!("executor panicked hard");
}

fn returns_null(_: &Invocation) -> Result<Option<Value>, BoxError> {
    Ok(None)
}

fn slow_echo(invocation: &Invocation) -> Result<Option<Value>, BoxError> {
    std::thread::sleep(Duration::from_millis(300));
    Ok(Some(json!({ "echo": invocation.function_arguments.clone() })))
}

/// A bridge wired to in-memory input/output channels.
struct TestBridge {
    input: DuplexStream,
    output: DuplexStream,
    buffer: String,
    handle: JoinHandle<fnbridge::error::Result<()>>,
    _log_dir: tempfile::TempDir,
}

async fn start_bridge(registry: ExecutorRegistry) -> TestBridge {
    let log_dir = tempfile::tempdir().unwrap();
    let logger = Arc::new(Logger::new(log_dir.path()).unwrap());
    let config = BridgeConfig::new(log_dir.path()).with_drain_timeout_ms(500);
    let mut bridge = Bridge::new(config, logger, Arc::new(registry));

    let (input, bridge_input) = duplex(64 * 1024);
    let (bridge_output, output) = duplex(64 * 1024);
    let handle =
        tokio::spawn(async move { bridge.run(BufReader::new(bridge_input), bridge_output).await });

    TestBridge {
        input,
        output,
        buffer: String::new(),
        handle,
        _log_dir: log_dir,
    }
}

impl TestBridge {
    async fn send_line(&mut self, line: &str) {
        self.input.write_all(line.as_bytes()).await.unwrap();
        self.input.write_all(b"\n").await.unwrap();
    }

    fn take_raw_frame(&mut self) -> Option<String> {
        let start = self.buffer.find(RESPONSE_START)?;
        let body_start = start + RESPONSE_START.len();
        let end = self.buffer[body_start..].find(RESPONSE_END)? + body_start;
        let body = self.buffer[body_start..end].to_string();
        self.buffer = self.buffer[end + RESPONSE_END.len()..].to_string();
        Some(body)
    }

    async fn next_raw_frame(&mut self) -> String {
        loop {
            if let Some(body) = self.take_raw_frame() {
                return body;
            }
            let mut chunk = vec![0u8; 4096];
            let read = timeout(WAIT, self.output.read(&mut chunk))
                .await
                .expect("timed out waiting for a response frame")
                .unwrap();
            assert!(read > 0, "output channel closed while waiting for a frame");
            self.buffer
                .push_str(std::str::from_utf8(&chunk[..read]).unwrap());
        }
    }

    async fn next_frame(&mut self) -> ResponseFrame {
        let body = self.next_raw_frame().await;
        serde_json::from_str(&body).expect("frame body is valid JSON")
    }

    async fn expect_output_closed(&mut self) {
        let mut chunk = [0u8; 256];
        let read = timeout(WAIT, self.output.read(&mut chunk))
            .await
            .expect("timed out waiting for the output channel to close")
            .unwrap();
        assert_eq!(
            read,
            0,
            "expected no further output, got {:?}",
            std::str::from_utf8(&chunk[..read])
        );
    }
}

#[tokio::test]
async fn test_add_request_round_trip() {
    let mut bridge = start_bridge(add_registry()).await;

    bridge
        .send_line(r#"{"requestId":"r1","functionName":"add","modulePath":"Math.py","functionArguments":{"a":2,"b":3}}"#)
        .await;

    let frame = bridge.next_frame().await;
    assert!(frame.has_succeeded);
    assert_eq!(frame.request_id, "r1");
    assert_eq!(frame.result, Some(json!({ "isCached": false, "total": 5 })));
    assert!(frame.exception.is_none());
}

#[tokio::test]
async fn test_second_identical_request_hits_cache() {
    let mut bridge = start_bridge(add_registry()).await;

    bridge
        .send_line(r#"{"requestId":"r1","functionName":"add","modulePath":"Math.py","functionArguments":{"a":2,"b":3}}"#)
        .await;
    let first = bridge.next_frame().await;
    assert_eq!(first.result, Some(json!({ "isCached": false, "total": 5 })));

    // give the multiplexer a moment to commit the returned cache
    tokio::time::sleep(Duration::from_millis(100)).await;

    bridge
        .send_line(r#"{"requestId":"r2","functionName":"add","modulePath":"Math.py","functionArguments":{"a":2,"b":3}}"#)
        .await;
    let second = bridge.next_frame().await;
    assert_eq!(second.request_id, "r2");
    assert_eq!(second.result, Some(json!({ "isCached": true, "total": 5 })));
}

#[tokio::test]
async fn test_cache_entries_are_keyed_by_function_and_module() {
    let mut registry = add_registry();
    registry.register("add", "Other.py", AddFunction);
    let mut bridge = start_bridge(registry).await;

    bridge
        .send_line(r#"{"requestId":"r1","functionName":"add","modulePath":"Math.py","functionArguments":{"a":2,"b":3}}"#)
        .await;
    bridge.next_frame().await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    // same function name, different module: separate cache entry
    bridge
        .send_line(r#"{"requestId":"r2","functionName":"add","modulePath":"Other.py","functionArguments":{"a":2,"b":3}}"#)
        .await;
    let frame = bridge.next_frame().await;
    assert_eq!(frame.result, Some(json!({ "isCached": false, "total": 5 })));
}

#[tokio::test]
async fn test_failing_executor_reports_exception() {
    let mut registry = ExecutorRegistry::new();
    registry.register("boom", "Jobs.py", failing);
    let mut bridge = start_bridge(registry).await;

    bridge
        .send_line(r#"{"requestId":"r1","functionName":"boom","modulePath":"Jobs.py","functionArguments":null}"#)
        .await;

    let frame = bridge.next_frame().await;
    assert!(!frame.has_succeeded);
    assert_eq!(frame.request_id, "r1");
    assert!(frame.result.is_none());
    assert!(frame.exception.as_deref().unwrap().contains("executor failure"));
}

#[tokio::test]
async fn test_executor_panic_is_contained() {
    let mut registry = add_registry();
    registry.register("panic", "Jobs.py", panicking);
    let mut bridge = start_bridge(registry).await;

    bridge
        .send_line(r#"{"requestId":"r1","functionName":"panic","modulePath":"Jobs.py","functionArguments":null}"#)
        .await;
    let failed = bridge.next_frame().await;
    assert!(!failed.has_succeeded);
    assert!(failed.exception.as_deref().unwrap().contains("panicked"));

    // the bridge keeps serving requests afterwards
    bridge
        .send_line(r#"{"requestId":"r2","functionName":"add","modulePath":"Math.py","functionArguments":{"a":1,"b":1}}"#)
        .await;
    let next = bridge.next_frame().await;
    assert!(next.has_succeeded);
    assert_eq!(next.request_id, "r2");
}

#[tokio::test]
async fn test_unknown_function_reports_failure() {
    let mut bridge = start_bridge(add_registry()).await;

    bridge
        .send_line(r#"{"requestId":"r1","functionName":"missing","modulePath":"Math.py","functionArguments":null}"#)
        .await;

    let frame = bridge.next_frame().await;
    assert!(!frame.has_succeeded);
    assert!(frame
        .exception
        .as_deref()
        .unwrap()
        .contains("no executor registered"));
}

#[tokio::test]
async fn test_blank_and_malformed_lines_are_skipped() {
    let mut bridge = start_bridge(add_registry()).await;

    bridge.send_line("").await;
    bridge.send_line("   ").await;
    bridge.send_line("{not json").await;
    bridge.send_line(r#""just a string""#).await;
    bridge
        .send_line(r#"{"requestId":"r9","functionName":"add","modulePath":"Math.py","functionArguments":{"a":4,"b":4}}"#)
        .await;

    let frame = bridge.next_frame().await;
    assert_eq!(frame.request_id, "r9");
    assert_eq!(frame.result, Some(json!({ "isCached": false, "total": 8 })));
}

#[tokio::test]
async fn test_exit_stops_reading_further_lines() {
    let mut bridge = start_bridge(add_registry()).await;

    // the request after the exit line must never be executed
    bridge.send_line(r#"{"exit":true}"#).await;
    bridge
        .send_line(r#"{"requestId":"r1","functionName":"add","modulePath":"Math.py","functionArguments":{"a":2,"b":3}}"#)
        .await;

    bridge.expect_output_closed().await;
    let result = timeout(WAIT, bridge.handle).await.unwrap().unwrap();
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_exit_drains_inflight_worker() {
    let mut registry = ExecutorRegistry::new();
    registry.register("slow", "Jobs.py", slow_echo);
    let mut bridge = start_bridge(registry).await;

    bridge
        .send_line(r#"{"requestId":"r-slow","functionName":"slow","modulePath":"Jobs.py","functionArguments":{"n":1}}"#)
        .await;
    bridge.send_line(r#"{"exit":true}"#).await;

    // the worker spawned before the exit still gets its frame delivered
    let frame = bridge.next_frame().await;
    assert_eq!(frame.request_id, "r-slow");
    assert!(frame.has_succeeded);

    bridge.expect_output_closed().await;
    let result = timeout(WAIT, bridge.handle).await.unwrap().unwrap();
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_end_of_input_stops_the_bridge() {
    let bridge = start_bridge(add_registry()).await;
    let TestBridge {
        input,
        mut output,
        handle,
        _log_dir,
        ..
    } = bridge;

    drop(input);

    let mut chunk = [0u8; 64];
    let read = timeout(WAIT, output.read(&mut chunk)).await.unwrap().unwrap();
    assert_eq!(read, 0);

    let result = timeout(WAIT, handle).await.unwrap().unwrap();
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_concurrent_workers_complete_independently() {
    let mut registry = add_registry();
    registry.register("slow", "Jobs.py", slow_echo);
    let mut bridge = start_bridge(registry).await;

    bridge
        .send_line(r#"{"requestId":"r-slow","functionName":"slow","modulePath":"Jobs.py","functionArguments":{"n":1}}"#)
        .await;
    // the barrier only waits for the handshake, so this is read while the
    // slow worker is still executing
    bridge
        .send_line(r#"{"requestId":"r-fast","functionName":"add","modulePath":"Math.py","functionArguments":{"a":2,"b":3}}"#)
        .await;

    let first = bridge.next_frame().await;
    let second = bridge.next_frame().await;

    assert_eq!(first.request_id, "r-fast");
    assert!(first.has_succeeded);
    assert_eq!(second.request_id, "r-slow");
    assert_eq!(second.result, Some(json!({ "echo": { "n": 1 } })));
}

#[tokio::test]
async fn test_null_result_serializes_as_null() {
    let mut registry = ExecutorRegistry::new();
    registry.register("noop", "Jobs.py", returns_null);
    let mut bridge = start_bridge(registry).await;

    bridge
        .send_line(r#"{"requestId":"rn","functionName":"noop","modulePath":"Jobs.py","functionArguments":null}"#)
        .await;

    let body = bridge.next_raw_frame().await;
    assert_eq!(body, r#"{"hasSucceeded":true,"result":null,"request_id":"rn"}"#);
}

#[tokio::test]
async fn test_frames_are_back_to_back_without_separator() {
    let mut bridge = start_bridge(add_registry()).await;

    bridge
        .send_line(r#"{"requestId":"r1","functionName":"add","modulePath":"Math.py","functionArguments":{"a":1,"b":1}}"#)
        .await;
    bridge
        .send_line(r#"{"requestId":"r2","functionName":"add","modulePath":"Math.py","functionArguments":{"a":2,"b":2}}"#)
        .await;

    let mut raw = String::new();
    while raw.matches(RESPONSE_END).count() < 2 {
        let mut chunk = vec![0u8; 4096];
        let read = timeout(WAIT, bridge.output.read(&mut chunk))
            .await
            .expect("timed out waiting for both frames")
            .unwrap();
        assert!(read > 0);
        raw.push_str(std::str::from_utf8(&chunk[..read]).unwrap());
    }

    assert!(raw.starts_with(RESPONSE_START));
    assert!(raw.ends_with(RESPONSE_END));
    assert!(!raw.contains('\n'));
    let joined = format!("{}{}", RESPONSE_END, RESPONSE_START);
    assert!(raw.contains(&joined), "frames are separated: {}", raw);
}

#[tokio::test]
async fn test_shutdown_token_stops_the_bridge() {
    let log_dir = tempfile::tempdir().unwrap();
    let logger = Arc::new(Logger::new(log_dir.path()).unwrap());
    let config = BridgeConfig::new(log_dir.path()).with_drain_timeout_ms(250);
    let mut bridge = Bridge::new(config, logger, Arc::new(add_registry()));
    let token = bridge.shutdown_token();

    let (_input, bridge_input) = duplex(1024);
    let (bridge_output, mut output) = duplex(1024);
    let handle =
        tokio::spawn(async move { bridge.run(BufReader::new(bridge_input), bridge_output).await });

    token.cancel();

    let mut chunk = [0u8; 64];
    let read = timeout(WAIT, output.read(&mut chunk)).await.unwrap().unwrap();
    assert_eq!(read, 0);
    let result = timeout(WAIT, handle).await.unwrap().unwrap();
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_disposed_bridge_rejects_run_and_dispose() {
    let log_dir = tempfile::tempdir().unwrap();
    let logger = Arc::new(Logger::new(log_dir.path()).unwrap());
    let mut bridge = Bridge::new(
        BridgeConfig::new(log_dir.path()),
        logger,
        Arc::new(ExecutorRegistry::new()),
    );

    assert!(!bridge.is_disposed());
    bridge.dispose().unwrap();
    assert!(bridge.is_disposed());
    assert!(matches!(bridge.dispose(), Err(BridgeError::Disposed)));

    let (_input, bridge_input) = duplex(1024);
    let (bridge_output, _output) = duplex(1024);
    let result = bridge.run(BufReader::new(bridge_input), bridge_output).await;
    assert!(matches!(result, Err(BridgeError::Disposed)));
}
