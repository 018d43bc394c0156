//! Boundary sinks carrying simulation output out of the worker thread.

use std::io::Write;
use std::sync::mpsc;

use citypulse_core::{Boundary, BufferId, OutboundMessage, SnapshotFrame, StatusCounts};
use serde::Serialize;
use tracing::warn;

/// Forwards every message over an unbounded std channel.
///
/// Sending never blocks. Once the receiver is gone, messages are dropped and
/// a single warning is logged.
#[derive(Debug)]
pub struct ChannelBoundary {
    sender: mpsc::Sender<OutboundMessage>,
    disconnected: bool,
}

impl ChannelBoundary {
    pub fn new(sender: mpsc::Sender<OutboundMessage>) -> Self {
        Self {
            sender,
            disconnected: false,
        }
    }

    /// Create a boundary together with the receiving end for the consumer.
    pub fn channel() -> (Self, mpsc::Receiver<OutboundMessage>) {
        let (tx, rx) = mpsc::channel();
        (Self::new(tx), rx)
    }
}

impl Boundary for ChannelBoundary {
    fn emit(&mut self, message: OutboundMessage) {
        if self.disconnected {
            return;
        }
        if let Err(mpsc::SendError(message)) = self.sender.send(message) {
            warn!(
                kind = message.kind(),
                "boundary consumer disconnected; dropping further messages"
            );
            self.disconnected = true;
        }
    }
}

#[derive(Serialize)]
#[serde(tag = "type", rename = "snapshot")]
struct SnapshotSummary {
    n: usize,
    buffer: BufferId,
    counts: Option<StatusCounts>,
}

impl SnapshotSummary {
    fn of(frame: &SnapshotFrame) -> Self {
        Self {
            n: frame.n,
            buffer: frame.buffer,
            counts: frame.status_counts().ok(),
        }
    }
}

/// Writes one JSON object per line.
///
/// Snapshots are reduced to a status histogram unless `full_snapshots` is
/// set. Metrics and alerts are flushed immediately.
pub struct JsonLinesBoundary<W: Write + Send> {
    writer: W,
    full_snapshots: bool,
    failed: bool,
}

impl<W: Write + Send> JsonLinesBoundary<W> {
    pub fn new(writer: W, full_snapshots: bool) -> Self {
        Self {
            writer,
            full_snapshots,
            failed: false,
        }
    }

    fn write_line(&mut self, message: &OutboundMessage) -> std::io::Result<()> {
        match message {
            OutboundMessage::Snapshot(frame) if !self.full_snapshots => {
                serde_json::to_writer(&mut self.writer, &SnapshotSummary::of(frame))?;
            }
            _ => serde_json::to_writer(&mut self.writer, message)?,
        }
        self.writer.write_all(b"\n")?;
        if !matches!(message, OutboundMessage::Snapshot(_)) {
            self.writer.flush()?;
        }
        Ok(())
    }
}

impl<W: Write + Send> Boundary for JsonLinesBoundary<W> {
    fn emit(&mut self, message: OutboundMessage) {
        if self.failed {
            return;
        }
        if let Err(err) = self.write_line(&message) {
            warn!(%err, "failed to write boundary output; dropping further messages");
            self.failed = true;
        }
    }
}

impl<W: Write + Send> Drop for JsonLinesBoundary<W> {
    fn drop(&mut self) {
        let _ = self.writer.flush();
    }
}
