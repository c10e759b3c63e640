//! Export pipeline: format conversion, chunked processing, progress
//! reporting, cancellation and the per-session job manager

pub mod chunker;
pub mod formats;
pub mod pipeline;
pub mod progress;
pub mod session;
pub mod types;

pub use pipeline::{ExportJob, ExportPipeline};
pub use progress::{CancelToken, ProgressSender};
pub use session::ExportSessionManager;
pub use types::{
    ExportConfig, ExportFormat, ExportMetadata, ExportOptions, ExportProgress, ExportResult,
    ExportStage,
};
