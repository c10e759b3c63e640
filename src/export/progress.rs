//! Progress delivery and cancellation primitives
//!
//! Progress is a bounded channel of events, not a synchronous callback: a
//! slow listener drops events instead of stalling chunk processing.

use crate::export::types::{ExportProgress, ExportStage};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::trace;

/// Fire-and-forget progress sender with a monotonic guard. Events whose
/// percentage would regress are suppressed; events the listener cannot keep
/// up with are dropped.
#[derive(Clone)]
pub struct ProgressSender {
    tx: mpsc::Sender<ExportProgress>,
    last_pct: Arc<AtomicU8>,
}

impl ProgressSender {
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<ExportProgress>) {
        let (tx, rx) = mpsc::channel(capacity);
        (
            Self {
                tx,
                last_pct: Arc::new(AtomicU8::new(0)),
            },
            rx,
        )
    }

    /// Emit a progress event. Never blocks and never fails the pipeline.
    pub fn emit(&self, stage: ExportStage, progress: u8, message: impl Into<String>) {
        let progress = progress.min(100);
        let last = self.last_pct.load(Ordering::Acquire);
        // Terminal error events may repeat a percentage; anything else must
        // move forward
        if progress < last && stage != ExportStage::Error {
            return;
        }
        self.last_pct.store(progress.max(last), Ordering::Release);

        let event = ExportProgress {
            stage,
            progress,
            message: message.into(),
            eta_secs: None,
        };
        if self.tx.try_send(event).is_err() {
            trace!(stage = %stage, progress, "progress listener behind, event dropped");
        }
    }
}

/// Idempotent cancellation token shared between a session and its running
/// job. Cheap to clone; cancelling twice is harmless.
#[derive(Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_progress_is_monotonic() {
        let (sender, mut rx) = ProgressSender::channel(16);
        sender.emit(ExportStage::Preparing, 10, "start");
        sender.emit(ExportStage::Processing, 30, "work");
        sender.emit(ExportStage::Preparing, 20, "regression");
        sender.emit(ExportStage::Completed, 100, "done");
        drop(sender);

        let mut seen = Vec::new();
        while let Some(event) = rx.recv().await {
            seen.push(event.progress);
        }
        assert_eq!(seen, vec![10, 30, 100]);
    }

    #[tokio::test]
    async fn test_full_channel_drops_instead_of_blocking() {
        let (sender, mut rx) = ProgressSender::channel(1);
        sender.emit(ExportStage::Preparing, 10, "a");
        sender.emit(ExportStage::Processing, 30, "b");
        sender.emit(ExportStage::Processing, 40, "c");
        drop(sender);

        let first = rx.recv().await.unwrap();
        assert_eq!(first.progress, 10);
    }

    #[test]
    fn test_cancel_is_idempotent() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
        token.cancel();
        token.cancel();
        assert!(token.is_cancelled());
        assert!(token.clone().is_cancelled());
    }
}
