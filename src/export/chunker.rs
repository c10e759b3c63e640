//! Chunked processing with an ordered, bounded worker pool

use crate::config::ExportSettings;
use crate::error::{ReportError, Result};
use crate::export::progress::{CancelToken, ProgressSender};
use crate::export::types::ExportStage;
use futures::stream::{self, StreamExt};
use std::time::{Duration, Instant};
use tracing::debug;

/// Process `items` in fixed-size chunks on a bounded worker pool.
///
/// `buffered` preserves submission order, so results are aggregated and
/// progress is re-emitted in order even when chunks finish out of order.
/// Cancellation and the deadline are checked between chunks; every
/// `yield_every_chunks` chunks control is yielded back to the scheduler, and
/// a resident-memory gate pauses briefly when the process grows past the
/// configured ceiling.
pub async fn process_chunks<T, R, F>(
    items: Vec<T>,
    settings: &ExportSettings,
    progress: Option<&ProgressSender>,
    cancel: &CancelToken,
    deadline: Option<Instant>,
    processor: F,
) -> Result<Vec<R>>
where
    T: Send + 'static,
    R: Send + 'static,
    F: Fn(Vec<T>) -> R + Clone + Send + Sync + 'static,
{
    let total_items = items.len();
    let chunk_size = settings.chunk_size.max(1);
    let total_chunks = total_items.div_ceil(chunk_size);

    let mut chunks: Vec<Vec<T>> = Vec::with_capacity(total_chunks);
    let mut items = items;
    while items.len() > chunk_size {
        let rest = items.split_off(chunk_size);
        chunks.push(std::mem::replace(&mut items, rest));
    }
    if !items.is_empty() {
        chunks.push(items);
    }

    let workers = settings.worker_count.max(1);
    let mut pool = stream::iter(chunks.into_iter().map(|chunk| {
        let processor = processor.clone();
        tokio::task::spawn_blocking(move || processor(chunk))
    }))
    .buffered(workers);

    let mut results = Vec::with_capacity(total_chunks);
    let mut completed = 0usize;
    while let Some(joined) = pool.next().await {
        let result = joined
            .map_err(|e| ReportError::Processing(format!("chunk worker failed: {}", e)))?;
        results.push(result);
        completed += 1;

        if cancel.is_cancelled() {
            return Err(ReportError::Cancelled);
        }
        if let Some(deadline) = deadline {
            if Instant::now() >= deadline {
                return Err(ReportError::DeadlineExceeded);
            }
        }

        if let Some(progress) = progress {
            // Chunk processing spans the 30-60% band
            let pct = 30 + (completed * 30 / total_chunks.max(1)) as u8;
            progress.emit(
                ExportStage::Processing,
                pct,
                format!("processed chunk {}/{}", completed, total_chunks),
            );
        }

        if completed % settings.yield_every_chunks.max(1) == 0 {
            tokio::task::yield_now().await;
        }
        if let Some(resident) = resident_memory_bytes() {
            if resident > settings.max_memory_bytes {
                debug!(resident, ceiling = settings.max_memory_bytes, "memory gate pausing");
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        }
    }

    Ok(results)
}

/// Resident set size from /proc/self/statm; `None` where unavailable
pub fn resident_memory_bytes() -> Option<u64> {
    #[cfg(target_os = "linux")]
    {
        let statm = std::fs::read_to_string("/proc/self/statm").ok()?;
        let pages: u64 = statm.split_whitespace().nth(1)?.parse().ok()?;
        Some(pages * 4096)
    }
    #[cfg(not(target_os = "linux"))]
    {
        None
    }
}
