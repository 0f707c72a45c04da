//! Cabinet ingestion: a bounded worker pool running upload and startup
//! recovery pipelines, and the `LogService` that owns it.

#![forbid(unsafe_code)]

pub mod pipeline;
pub mod pool;
pub mod service;

pub use pipeline::{log_url, Upload, UploadParts};
pub use pool::WorkerPool;
pub use service::{IngestConfig, LoadSummary, LogService, Skipped, DEFAULT_PUBLIC_URL, DEFAULT_WORKERS};
