//! Export job state machine

use crate::config::ExportSettings;
use crate::error::{ReportError, Result};
use crate::export::chunker::process_chunks;
use crate::export::formats::{
    build_workbook, chart_spec, column_order, count_items, render_document, rows_to_csv,
    tabular_rows, workbook_to_xml, BasicChartRenderer, ChartRenderer,
};
use crate::export::progress::{CancelToken, ProgressSender};
use crate::export::types::{
    ExportConfig, ExportFormat, ExportMetadata, ExportProgress, ExportResult, ExportStage,
};
use crate::report::templates::TemplateRegistry;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info};
use uuid::Uuid;

/// Compression is reported, not performed; this is the fixed ratio attached
/// when callers request it
const PLACEHOLDER_COMPRESSION_RATIO: f64 = 0.7;

/// One job in a batch export
#[derive(Debug, Clone)]
pub struct ExportJob {
    pub label: String,
    pub data: Value,
    pub config: ExportConfig,
}

/// Converts in-memory report payloads into downloadable artifacts.
///
/// Stages run strictly ordered with monotonically non-decreasing progress:
/// preparing(10) -> processing(30) -> formatting(40-60) ->
/// finalizing(85-95) -> completed(100), with `error` reachable from any
/// stage. Failures are folded into the returned `ExportResult`; only
/// cancellation propagates as an error so the session can leave its state
/// untouched.
pub struct ExportPipeline {
    settings: ExportSettings,
    templates: Arc<TemplateRegistry>,
    renderer: Arc<dyn ChartRenderer>,
}

impl ExportPipeline {
    pub fn new(settings: ExportSettings) -> Self {
        Self {
            settings,
            templates: crate::report::templates::standard_registry(),
            renderer: Arc::new(BasicChartRenderer),
        }
    }

    pub fn with_renderer(mut self, renderer: Arc<dyn ChartRenderer>) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn with_templates(mut self, templates: Arc<TemplateRegistry>) -> Self {
        self.templates = templates;
        self
    }

    pub fn settings(&self) -> &ExportSettings {
        &self.settings
    }

    /// Run one export job to completion, cancellation or failure
    pub async fn export(
        &self,
        data: Value,
        config: &ExportConfig,
        progress: Option<&ProgressSender>,
        cancel: &CancelToken,
    ) -> Result<ExportResult> {
        match self.run(data, config, progress, cancel).await {
            Ok(result) => Ok(result),
            Err(ReportError::Cancelled) => {
                info!(format = %config.format, "export cancelled");
                Err(ReportError::Cancelled)
            }
            Err(err) => {
                error!(format = %config.format, error = %err, "export failed");
                if let Some(progress) = progress {
                    progress.emit(ExportStage::Error, 100, err.to_string());
                }
                Ok(ExportResult::failure(
                    config.format,
                    err.detail(serde_json::json!({"format": config.format.to_string()})),
                ))
            }
        }
    }

    async fn run(
        &self,
        data: Value,
        config: &ExportConfig,
        progress: Option<&ProgressSender>,
        cancel: &CancelToken,
    ) -> Result<ExportResult> {
        let started = Instant::now();
        let deadline = config
            .options
            .deadline_secs
            .map(|secs| started + Duration::from_secs(secs));

        if data.is_null() {
            return Err(ReportError::Validation(
                "export data must be present".to_string(),
            ));
        }

        emit(progress, ExportStage::Preparing, 10, "preparing export");
        check_interrupts(cancel, deadline)?;

        let data = self.templates.apply(config.template.as_deref(), data);
        let record_count = count_items(&data);

        emit(
            progress,
            ExportStage::Processing,
            30,
            format!("processing {} records", record_count),
        );
        check_interrupts(cancel, deadline)?;

        let bytes = match config.format {
            ExportFormat::Csv => {
                self.render_csv(&data, config, record_count, progress, cancel, deadline)
                    .await?
            }
            ExportFormat::Excel => {
                emit(progress, ExportStage::Formatting, 50, "building workbook");
                workbook_to_xml(&build_workbook(&data))
            }
            ExportFormat::Pdf => {
                emit(progress, ExportStage::Formatting, 55, "rendering document");
                render_document(&data, "Report", &config.options)
            }
            ExportFormat::Svg => {
                emit(progress, ExportStage::Formatting, 60, "rendering chart");
                let spec = chart_spec(&data, "Report", &config.options);
                self.renderer.render_svg(&spec)?.into_bytes()
            }
            ExportFormat::Png => {
                emit(progress, ExportStage::Formatting, 60, "rendering chart");
                let spec = chart_spec(&data, "Report", &config.options);
                self.renderer.render_png(&spec)?
            }
        };
        check_interrupts(cancel, deadline)?;

        emit(progress, ExportStage::Finalizing, 90, "writing artifact");
        let filename = self.artifact_name(config);
        let path = PathBuf::from(&self.settings.output_dir).join(&filename);
        tokio::fs::create_dir_all(&self.settings.output_dir).await?;
        tokio::fs::write(&path, &bytes).await?;
        check_interrupts(cancel, deadline)?;

        emit(progress, ExportStage::Completed, 100, "export completed");
        info!(format = %config.format, file = %filename, bytes = bytes.len(), "export completed");

        Ok(ExportResult {
            success: true,
            download_url: Some(format!("/{}/{}", self.settings.output_dir, filename)),
            filename: Some(filename),
            file_size: Some(bytes.len() as u64),
            format: config.format,
            error: None,
            metadata: Some(ExportMetadata {
                record_count,
                processing_time_ms: started.elapsed().as_millis() as u64,
                compression_ratio: config
                    .options
                    .compression
                    .then_some(PLACEHOLDER_COMPRESSION_RATIO),
            }),
        })
    }

    /// CSV rendering; datasets past the optimization threshold go through
    /// the chunked worker pool, with per-chunk progress re-emission
    async fn render_csv(
        &self,
        data: &Value,
        config: &ExportConfig,
        record_count: usize,
        progress: Option<&ProgressSender>,
        cancel: &CancelToken,
        deadline: Option<Instant>,
    ) -> Result<Vec<u8>> {
        let rows = tabular_rows(data);
        let columns = column_order(&rows);

        if record_count <= self.settings.optimization_threshold {
            emit(progress, ExportStage::Formatting, 45, "formatting rows");
            return Ok(rows_to_csv(&rows, &columns, &config.options).into_bytes());
        }

        // Chunked path: render chunks without headers on the worker pool,
        // then stitch in submission order behind a single header
        let options = config.options.clone();
        let chunk_columns = columns.clone();
        let mut headerless = options.clone();
        headerless.include_header = false;

        let pieces = process_chunks(
            rows,
            &self.settings,
            progress,
            cancel,
            deadline,
            move |chunk| rows_to_csv(&chunk, &chunk_columns, &headerless),
        )
        .await?;

        emit(progress, ExportStage::Formatting, 60, "assembling output");
        let mut out = String::new();
        if options.include_header {
            let header_only = rows_to_csv(&[], &columns, &options);
            out.push_str(&header_only);
        }
        for piece in pieces {
            out.push_str(&piece);
        }
        Ok(out.into_bytes())
    }

    /// Sequential batch execution. One job's failure never stops the rest;
    /// progress reports the overall batch percentage and the current label.
    pub async fn export_batch(
        &self,
        jobs: Vec<ExportJob>,
        progress: Option<&ProgressSender>,
        cancel: &CancelToken,
    ) -> Result<Vec<ExportResult>> {
        let total = jobs.len().max(1);
        let mut results = Vec::with_capacity(jobs.len());

        for (index, job) in jobs.into_iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(ReportError::Cancelled);
            }
            emit(
                progress,
                ExportStage::Processing,
                (index * 100 / total) as u8,
                format!("exporting {}", job.label),
            );
            // Per-job progress would interleave with the batch percentage,
            // so jobs in a batch report only at the batch level
            let result = self.export(job.data, &job.config, None, cancel).await?;
            results.push(result);
        }

        emit(progress, ExportStage::Completed, 100, "batch completed");
        Ok(results)
    }

    fn artifact_name(&self, config: &ExportConfig) -> String {
        let extension = config.format.extension();
        match &config.filename {
            Some(name) if name.ends_with(&format!(".{}", extension)) => name.clone(),
            Some(name) => format!("{}.{}", name, extension),
            None => format!("report_{}.{}", Uuid::new_v4(), extension),
        }
    }
}

fn check_interrupts(cancel: &CancelToken, deadline: Option<Instant>) -> Result<()> {
    if cancel.is_cancelled() {
        return Err(ReportError::Cancelled);
    }
    if let Some(deadline) = deadline {
        if Instant::now() >= deadline {
            return Err(ReportError::DeadlineExceeded);
        }
    }
    Ok(())
}

fn emit(progress: Option<&ProgressSender>, stage: ExportStage, pct: u8, message: impl Into<String>) {
    if let Some(progress) = progress {
        progress.emit(stage, pct, message);
    }
}

/// Drain helper for tests and simple callers: collect all pending events
pub fn drain_progress(rx: &mut tokio::sync::mpsc::Receiver<ExportProgress>) -> Vec<ExportProgress> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
