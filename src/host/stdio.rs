//! Stdin/stdout JSON adapter for the editor bridge.
//!
//! Reads newline-delimited [`InboundFrame`] objects from stdin, feeds them to
//! an [`EditorBridge`], and writes [`OutputLine`]s (frames for the embedded
//! editor and diagnostic events) as newline-delimited JSON to stdout.
//!
//! Stdout is exclusively reserved for the JSON protocol; all diagnostic
//! output (tracing, logs) must be routed to stderr.

use crate::config::BridgeConfig;
use crate::error::{BridgeError, Result};
use crate::host::bridge::{EditorBridge, InboundFrame};
use crate::host::channel::EmbeddedTransport;
use crate::host::contract::{EventEnvelope, EventLevel, WireFrame};
use crate::host::events::Diagnostics;
use crate::host::gateway::{AuthService, ProjectGateway};
use crate::host::lock;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufWriter};
use tokio::sync::{broadcast, mpsc};

/// Capacity of the outbound line queue.
const OUTPUT_CAPACITY: usize = 256;

/// Capacity of the inbound frame queue.
const INBOUND_CAPACITY: usize = 64;

/// How long to wait for buffered events to drain on shutdown.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// One line written to stdout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "channel", rename_all = "snake_case")]
pub enum OutputLine {
    /// A frame addressed to the embedded editor.
    Embedded { frame: WireFrame },
    /// A diagnostic event.
    Event { event: EventEnvelope },
}

/// Transport whose target is whatever peer speaks on stdin.
///
/// The peer counts as attached once a frame from the expected origin has
/// been read.
#[derive(Debug)]
pub struct StdioTransport {
    origin: Mutex<Option<String>>,
    line_tx: mpsc::Sender<OutputLine>,
}

impl StdioTransport {
    #[must_use]
    pub fn new(line_tx: mpsc::Sender<OutputLine>) -> Self {
        Self {
            origin: Mutex::new(None),
            line_tx,
        }
    }

    pub fn attach(&self, origin: &str) {
        let mut current = lock(&self.origin);
        if current.as_deref() != Some(origin) {
            tracing::info!(origin, "embedded peer attached");
            *current = Some(origin.to_owned());
        }
    }
}

impl EmbeddedTransport for StdioTransport {
    fn attached_origin(&self) -> Option<String> {
        lock(&self.origin).clone()
    }

    fn post(&self, frame: &WireFrame) -> Result<()> {
        self.line_tx
            .try_send(OutputLine::Embedded {
                frame: frame.clone(),
            })
            .map_err(|e| BridgeError::Channel(format!("stdout queue rejected frame: {e}")))
    }
}

/// Run the bridge over stdin/stdout until stdin closes.
pub async fn run_stdio_bridge(
    config: &BridgeConfig,
    gateway: Arc<dyn ProjectGateway>,
    auth: Arc<dyn AuthService>,
) -> Result<()> {
    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    serve(config, gateway, auth, stdin, tokio::io::stdout()).await
}

/// Run the bridge over any line reader and writer.
///
/// Three concurrent tasks operate in parallel:
///
/// 1. **Reader** -- parses inbound lines on the current task and queues
///    them for the bridge.
/// 2. **Bridge** -- [`EditorBridge::run`] dispatching the queued frames.
/// 3. **Writer** -- serializes outbound frames and forwarded events, one
///    JSON object per line.
///
/// When the reader hits EOF the bridge is shut down, buffered events are
/// drained and the writer is flushed.
pub async fn serve<R, W>(
    config: &BridgeConfig,
    gateway: Arc<dyn ProjectGateway>,
    auth: Arc<dyn AuthService>,
    reader: R,
    writer: W,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (line_tx, line_rx) = mpsc::channel(OUTPUT_CAPACITY);
    let writer_handle = tokio::spawn(run_writer(writer, line_rx));

    let transport = Arc::new(StdioTransport::new(line_tx.clone()));
    let bridge = EditorBridge::new(config, transport.clone(), gateway, auth);
    let diagnostics = bridge.diagnostics().clone();

    let event_handle = tokio::spawn(forward_events(bridge.subscribe_events(), line_tx));

    let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_CAPACITY);
    let bridge_handle = tokio::spawn(Arc::clone(&bridge).run(inbound_rx));

    let reader_result = run_reader(
        reader,
        &transport,
        &config.embed.expected_origin,
        &diagnostics,
        inbound_tx,
    )
    .await;

    let _ = bridge_handle.await;

    // Dropping the last handles closes the event broadcast and the line
    // queue, which lets the forwarder and then the writer finish.
    drop(diagnostics);
    drop(bridge);
    drop(transport);
    if tokio::time::timeout(DRAIN_TIMEOUT, event_handle).await.is_err() {
        tracing::warn!("event forwarder did not drain in time");
    }
    match tokio::time::timeout(DRAIN_TIMEOUT, writer_handle).await {
        Ok(Ok(Ok(()))) => {}
        Ok(Ok(Err(e))) => tracing::warn!(error = %e, "stdout writer stopped with error"),
        Ok(Err(e)) => tracing::warn!(error = %e, "stdout writer task failed"),
        Err(_) => tracing::warn!("stdout writer did not finish in time"),
    }

    reader_result
}

/// Read lines, attach the peer and queue frames for the bridge.
async fn run_reader<R>(
    mut reader: R,
    transport: &StdioTransport,
    expected_origin: &str,
    diagnostics: &Diagnostics,
    inbound_tx: mpsc::Sender<InboundFrame>,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = String::new();

    loop {
        line.clear();
        let bytes_read = reader
            .read_line(&mut line)
            .await
            .map_err(|e| BridgeError::Channel(format!("failed to read from stdin: {e}")))?;

        // EOF
        if bytes_read == 0 {
            tracing::info!("stdin closed (EOF); shutting down stdio bridge");
            break;
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let frame: InboundFrame = match serde_json::from_str(trimmed) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(error = %e, raw_line = %trimmed, "failed to parse inbound line");
                diagnostics.emit(
                    EventLevel::Warn,
                    "stdio.parse_error",
                    serde_json::json!({ "error": e.to_string() }),
                );
                continue;
            }
        };

        if frame.origin == expected_origin {
            transport.attach(&frame.origin);
        }
        if inbound_tx.send(frame).await.is_err() {
            tracing::warn!("bridge stopped accepting frames; closing reader");
            break;
        }
    }

    Ok(())
}

async fn forward_events(
    mut event_rx: broadcast::Receiver<EventEnvelope>,
    line_tx: mpsc::Sender<OutputLine>,
) {
    loop {
        match event_rx.recv().await {
            Ok(event) => {
                if line_tx.send(OutputLine::Event { event }).await.is_err() {
                    tracing::warn!("stdout writer gone; stopping event forwarder");
                    break;
                }
            }
            Err(broadcast::error::RecvError::Lagged(n)) => {
                tracing::warn!(lagged = n, "event forwarder lagged; some events were dropped");
            }
            Err(broadcast::error::RecvError::Closed) => {
                tracing::debug!("event broadcast channel closed; stopping event forwarder");
                break;
            }
        }
    }
}

async fn run_writer<W>(writer: W, mut line_rx: mpsc::Receiver<OutputLine>) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut writer = BufWriter::new(writer);
    while let Some(line) = line_rx.recv().await {
        match serde_json::to_string(&line) {
            Ok(json) => write_line(&mut writer, &json).await?,
            Err(e) => tracing::error!(error = %e, "failed to serialize output line; skipping"),
        }
    }
    Ok(())
}

/// Write a single JSON line to the buffered writer and flush.
async fn write_line<W: AsyncWrite + Unpin>(writer: &mut BufWriter<W>, json: &str) -> Result<()> {
    writer
        .write_all(json.as_bytes())
        .await
        .map_err(|e| BridgeError::Channel(format!("failed to write to stdout: {e}")))?;
    writer
        .write_all(b"\n")
        .await
        .map_err(|e| BridgeError::Channel(format!("failed to write newline to stdout: {e}")))?;
    writer
        .flush()
        .await
        .map_err(|e| BridgeError::Channel(format!("failed to flush stdout: {e}")))?;
    Ok(())
}
