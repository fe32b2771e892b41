use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use serde_json::json;
use tokio::io::{duplex, AsyncRead, AsyncReadExt, AsyncWriteExt, BufReader};

use fnbridge::bridge::Bridge;
use fnbridge::config::{BridgeConfig, DEFAULT_LOG_DIRECTORY};
use fnbridge::executor::{math::AddFunction, ExecutorRegistry};
use fnbridge::logging::Logger;
use fnbridge::protocol::{RESPONSE_END, RESPONSE_START};

#[derive(Parser, Debug)]
#[command(name = "send-request")]
#[command(about = "Drives an in-process bridge through the line protocol")]
struct Args {
    /// First operand for the add function
    #[arg(long, default_value_t = 2)]
    a: i64,

    /// Second operand for the add function
    #[arg(long, default_value_t = 3)]
    b: i64,

    /// Directory the bridge log file is written to
    #[arg(long, default_value = DEFAULT_LOG_DIRECTORY)]
    log_dir: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = BridgeConfig::new(args.log_dir);
    let logger = Arc::new(Logger::new(&config.log_directory)?);

    let mut registry = ExecutorRegistry::new();
    registry.register("add", "Math.py", AddFunction);

    let mut bridge = Bridge::new(config, logger, Arc::new(registry));

    let (mut host_input, bridge_input) = duplex(8 * 1024);
    let (bridge_output, mut host_output) = duplex(8 * 1024);
    let bridge_handle =
        tokio::spawn(async move { bridge.run(BufReader::new(bridge_input), bridge_output).await });

    // The same request twice: the second response is served from the cache.
    let mut buffer = String::new();
    for request_id in ["demo-1", "demo-2"] {
        let request = json!({
            "requestId": request_id,
            "functionName": "add",
            "modulePath": "Math.py",
            "functionArguments": { "a": args.a, "b": args.b },
        });
        host_input
            .write_all(format!("{}\n", request).as_bytes())
            .await?;

        let frame = next_frame(&mut host_output, &mut buffer).await?;
        println!("{} -> {}", request_id, frame);
    }

    host_input.write_all(b"{\"exit\":true}\n").await?;
    bridge_handle.await??;

    Ok(())
}

/// Read until one sentinel-framed document is buffered, returning its body.
async fn next_frame(
    output: &mut (impl AsyncRead + Unpin),
    buffer: &mut String,
) -> Result<String, Box<dyn std::error::Error>> {
    loop {
        if let Some(start) = buffer.find(RESPONSE_START) {
            let body_start = start + RESPONSE_START.len();
            if let Some(length) = buffer[body_start..].find(RESPONSE_END) {
                let body = buffer[body_start..body_start + length].to_string();
                buffer.replace_range(..body_start + length + RESPONSE_END.len(), "");
                return Ok(body);
            }
        }

        let mut chunk = [0u8; 4096];
        let read = output.read(&mut chunk).await?;
        if read == 0 {
            return Err("bridge output closed before a full frame arrived".into());
        }
        buffer.push_str(std::str::from_utf8(&chunk[..read])?);
    }
}
