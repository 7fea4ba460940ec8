//! Hand-off of sealed segments to the reporting pipeline.

use crate::segment::TraceSegment;
use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracewire_core::{Error, Result};
use tracing::{debug, info, warn};

/// Receives sealed segments. Implementations must never block the caller.
pub trait ReportSink: Send + Sync {
    fn submit(&self, segment: TraceSegment) -> Result<()>;
}

/// Bounded queue in front of the exporter. A full queue rejects the segment.
pub struct ChannelSink {
    tx: mpsc::Sender<TraceSegment>,
    dropped: AtomicU64,
}

impl ChannelSink {
    pub fn bounded(capacity: usize) -> (Self, mpsc::Receiver<TraceSegment>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                tx,
                dropped: AtomicU64::new(0),
            },
            rx,
        )
    }

    /// Segments rejected because the queue was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl ReportSink for ChannelSink {
    fn submit(&self, segment: TraceSegment) -> Result<()> {
        match self.tx.try_send(segment) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(segment)) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(
                    segment = %segment.segment_id,
                    dropped,
                    "Report queue full, dropping segment"
                );
                Err(Error::ReportQueueFull)
            }
            Err(TrySendError::Closed(_)) => Err(Error::ReportChannelClosed),
        }
    }
}

/// Ships segments to a backend.
#[async_trait]
pub trait SegmentExporter: Send + Sync {
    async fn export(&self, segment: TraceSegment) -> Result<()>;
}

/// Writes each segment as JSON to the diagnostic log.
#[derive(Debug, Default)]
pub struct LogExporter;

#[async_trait]
impl SegmentExporter for LogExporter {
    async fn export(&self, segment: TraceSegment) -> Result<()> {
        let json = serde_json::to_string(&segment)?;
        debug!(segment = %segment.segment_id, trace = %segment.trace_id, %json, "Segment exported");
        Ok(())
    }
}

/// Drain the queue into `exporter` until the channel closes or `shutdown` fires.
///
/// On shutdown, already queued segments are still exported. The task yields
/// the number of segments exported successfully.
pub fn spawn_reporter(
    mut rx: mpsc::Receiver<TraceSegment>,
    exporter: Arc<dyn SegmentExporter>,
    mut shutdown: oneshot::Receiver<()>,
) -> JoinHandle<u64> {
    tokio::spawn(async move {
        let mut exported = 0u64;
        loop {
            tokio::select! {
                next = rx.recv() => match next {
                    Some(segment) => exported += export_one(exporter.as_ref(), segment).await,
                    None => break,
                },
                _ = &mut shutdown => {
                    while let Ok(segment) = rx.try_recv() {
                        exported += export_one(exporter.as_ref(), segment).await;
                    }
                    break;
                }
            }
        }
        info!(exported, "Segment reporter stopped");
        exported
    })
}

async fn export_one(exporter: &dyn SegmentExporter, segment: TraceSegment) -> u64 {
    let segment_id = segment.segment_id.clone();
    match exporter.export(segment).await {
        Ok(()) => 1,
        Err(e) => {
            warn!(segment = %segment_id, error = %e, "Failed to export segment");
            0
        }
    }
}
