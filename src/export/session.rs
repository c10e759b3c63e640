//! One-job-at-a-time export session

use crate::error::{ErrorDetail, ReportError, Result};
use crate::export::pipeline::{ExportJob, ExportPipeline};
use crate::export::progress::{CancelToken, ProgressSender};
use crate::export::types::{ExportConfig, ExportProgress, ExportResult};
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

#[derive(Default)]
struct SessionState {
    in_flight: bool,
    cancel: Option<CancelToken>,
    progress: Option<ExportProgress>,
    last_result: Option<ExportResult>,
    last_error: Option<ErrorDetail>,
    last_batch: Option<Vec<ExportResult>>,
}

/// Tracks at most one export (or batch) per caller session.
///
/// The busy flag is flipped check-and-set under the lock, so two concurrent
/// starts cannot both pass. A cancelled job leaves the last result and error
/// untouched and releases the session for the next job.
pub struct ExportSessionManager {
    state: Arc<Mutex<SessionState>>,
    channel_capacity: usize,
}

impl ExportSessionManager {
    pub fn new(channel_capacity: usize) -> Self {
        Self {
            state: Arc::new(Mutex::new(SessionState::default())),
            channel_capacity,
        }
    }

    /// Run one export through the pipeline on behalf of this session
    pub async fn start_export(
        &self,
        pipeline: &ExportPipeline,
        data: Value,
        config: ExportConfig,
    ) -> Result<ExportResult> {
        let (token, sender) = self.begin()?;
        let outcome = pipeline.export(data, &config, Some(&sender), &token).await;
        drop(sender);
        self.finish_single(&outcome);
        outcome
    }

    /// Run a batch sequentially on behalf of this session
    pub async fn start_batch(
        &self,
        pipeline: &ExportPipeline,
        jobs: Vec<ExportJob>,
    ) -> Result<Vec<ExportResult>> {
        let (token, sender) = self.begin()?;
        let outcome = pipeline.export_batch(jobs, Some(&sender), &token).await;
        drop(sender);

        let mut state = self.state.lock();
        match &outcome {
            Ok(results) => {
                state.last_error = results
                    .iter()
                    .rev()
                    .find_map(|r| r.error.clone());
                state.last_batch = Some(results.clone());
            }
            // Cancellation leaves prior results untouched
            Err(ReportError::Cancelled) => {}
            Err(err) => {
                state.last_error = Some(err.detail(Value::Null));
            }
        }
        state.in_flight = false;
        state.cancel = None;
        outcome
    }

    /// Signal cancellation to the running job, if any. Idempotent; harmless
    /// when nothing is running.
    pub fn cancel(&self) {
        let state = self.state.lock();
        if let Some(token) = &state.cancel {
            debug!("export cancellation requested");
            token.cancel();
        }
    }

    pub fn is_busy(&self) -> bool {
        self.state.lock().in_flight
    }

    /// Latest progress snapshot observed from the running (or last) job
    pub fn progress(&self) -> Option<ExportProgress> {
        self.state.lock().progress.clone()
    }

    pub fn last_result(&self) -> Option<ExportResult> {
        self.state.lock().last_result.clone()
    }

    pub fn last_error(&self) -> Option<ErrorDetail> {
        self.state.lock().last_error.clone()
    }

    pub fn last_batch(&self) -> Option<Vec<ExportResult>> {
        self.state.lock().last_batch.clone()
    }

    /// Atomically claim the session and wire up the progress listener
    fn begin(&self) -> Result<(CancelToken, ProgressSender)> {
        let token = {
            let mut state = self.state.lock();
            if state.in_flight {
                return Err(ReportError::ExportInProgress);
            }
            state.in_flight = true;
            state.progress = None;
            let token = CancelToken::new();
            state.cancel = Some(token.clone());
            token
        };

        let (sender, mut rx) = ProgressSender::channel(self.channel_capacity);
        let snapshot = Arc::clone(&self.state);
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                snapshot.lock().progress = Some(event);
            }
        });

        Ok((token, sender))
    }

    fn finish_single(&self, outcome: &Result<ExportResult>) {
        let mut state = self.state.lock();
        match outcome {
            Ok(result) => {
                state.last_error = result.error.clone();
                state.last_result = Some(result.clone());
            }
            // Neither success nor failure is recorded for a cancelled job
            Err(ReportError::Cancelled) => {}
            Err(err) => {
                state.last_error = Some(err.detail(Value::Null));
            }
        }
        state.in_flight = false;
        state.cancel = None;
    }
}

impl Default for ExportSessionManager {
    fn default() -> Self {
        Self::new(64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExportSettings;
    use crate::export::formats::{ChartRenderer, ChartSpec};
    use crate::export::types::ExportFormat;
    use serde_json::json;
    use std::time::Duration;

    /// Renderer that takes long enough to cancel mid-flight
    struct SlowRenderer;

    impl ChartRenderer for SlowRenderer {
        fn render_svg(&self, _spec: &ChartSpec) -> crate::error::Result<String> {
            std::thread::sleep(Duration::from_millis(200));
            Ok("<svg/>".to_string())
        }

        fn render_png(&self, _spec: &ChartSpec) -> crate::error::Result<Vec<u8>> {
            std::thread::sleep(Duration::from_millis(200));
            Ok(vec![0])
        }
    }

    fn slow_pipeline(dir: &std::path::Path) -> Arc<ExportPipeline> {
        Arc::new(
            ExportPipeline::new(ExportSettings {
                output_dir: dir.to_string_lossy().into_owned(),
                ..ExportSettings::default()
            })
            .with_renderer(Arc::new(SlowRenderer)),
        )
    }

    #[tokio::test]
    async fn test_simple_export_records_result() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = ExportPipeline::new(ExportSettings {
            output_dir: dir.path().to_string_lossy().into_owned(),
            ..ExportSettings::default()
        });
        let session = ExportSessionManager::default();

        let result = session
            .start_export(&pipeline, json!([{"a": 1}]), ExportConfig::default())
            .await
            .unwrap();
        assert!(result.success);
        assert!(session.last_result().unwrap().success);
        assert!(!session.is_busy());
        assert!(session.last_error().is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_second_start_while_busy_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = slow_pipeline(dir.path());
        let session = Arc::new(ExportSessionManager::default());

        let config = ExportConfig {
            format: ExportFormat::Svg,
            ..ExportConfig::default()
        };
        let handle = {
            let session = Arc::clone(&session);
            let pipeline = Arc::clone(&pipeline);
            let config = config.clone();
            tokio::spawn(async move {
                session
                    .start_export(&pipeline, json!([{"a": 1}]), config)
                    .await
            })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(session.is_busy());
        let err = session
            .start_export(&pipeline, json!([{"a": 2}]), config)
            .await
            .unwrap_err();
        assert!(matches!(err, ReportError::ExportInProgress));

        handle.await.unwrap().unwrap();
        assert!(!session.is_busy());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_cancel_leaves_session_reusable() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = slow_pipeline(dir.path());
        let session = Arc::new(ExportSessionManager::default());

        let config = ExportConfig {
            format: ExportFormat::Png,
            ..ExportConfig::default()
        };
        let handle = {
            let session = Arc::clone(&session);
            let pipeline = Arc::clone(&pipeline);
            let config = config.clone();
            tokio::spawn(async move {
                session
                    .start_export(&pipeline, json!([{"a": 1}]), config)
                    .await
            })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        session.cancel();
        session.cancel(); // idempotent

        let outcome = handle.await.unwrap();
        assert!(matches!(outcome, Err(ReportError::Cancelled)));

        // No terminal state recorded, session is free again
        assert!(session.last_result().is_none());
        assert!(session.last_error().is_none());
        assert!(!session.is_busy());

        let retry = session
            .start_export(&pipeline, json!([{"a": 1}]), ExportConfig::default())
            .await
            .unwrap();
        assert!(retry.success);
    }

    #[tokio::test]
    async fn test_batch_records_results() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = ExportPipeline::new(ExportSettings {
            output_dir: dir.path().to_string_lossy().into_owned(),
            ..ExportSettings::default()
        });
        let session = ExportSessionManager::default();

        let jobs = vec![
            ExportJob {
                label: "one".to_string(),
                data: json!([{"a": 1}]),
                config: ExportConfig::default(),
            },
            ExportJob {
                label: "two".to_string(),
                data: Value::Null,
                config: ExportConfig::default(),
            },
        ];
        let results = session.start_batch(&pipeline, jobs).await.unwrap();
        assert_eq!(results.len(), 2);
        assert!(results[0].success);
        assert!(!results[1].success);
        assert_eq!(session.last_batch().unwrap().len(), 2);
        assert!(session.last_error().is_some());
        assert!(!session.is_busy());
    }
}
