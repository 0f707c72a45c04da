//! The log service: registry, pool and pipeline behind one owned object.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use cabinet_core::{now_utc, CabinetError, Session, SessionId};
use cabinet_persist::{load_manifest, SessionDir};
use cabinet_stats::{ReportProfile, ReportRenderer};
use cabinet_store::LogRegistry;
use chrono::{DateTime, Utc};
use metrics::counter;
use tracing::{info, warn};

use crate::pipeline::{Pipeline, UploadParts};
use crate::pool::WorkerPool;

pub const DEFAULT_WORKERS: usize = 8;
pub const DEFAULT_PUBLIC_URL: &str = "https://logs.iitmotorsports.org";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestConfig {
    /// Directory holding one subdirectory per session.
    pub root: PathBuf,
    pub workers: usize,
    /// Base for the report's link back to the raw log.
    pub public_url: String,
}

impl IngestConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into(), workers: DEFAULT_WORKERS, public_url: DEFAULT_PUBLIC_URL.to_string() }
    }
}

/// Why a directory under the root was not loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Skipped {
    pub name: String,
    pub reason: String,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LoadSummary {
    pub loaded: Vec<SessionId>,
    pub skipped: Vec<Skipped>,
}

pub struct LogService {
    config: IngestConfig,
    registry: Arc<LogRegistry>,
    pipeline: Arc<Pipeline>,
    pool: WorkerPool,
}

impl LogService {
    /// Must be called from within a Tokio runtime.
    pub fn new(config: IngestConfig, renderer: Arc<dyn ReportRenderer>, profile: ReportProfile) -> Self {
        let registry = Arc::new(LogRegistry::new());
        let pipeline = Arc::new(Pipeline {
            root: config.root.clone(),
            public_url: config.public_url.clone(),
            registry: Arc::clone(&registry),
            renderer,
            profile,
        });
        let pool = WorkerPool::new(config.workers);
        Self { config, registry, pipeline, pool }
    }

    pub fn config(&self) -> &IngestConfig { &self.config }
    pub fn root(&self) -> &Path { &self.config.root }
    pub fn registry(&self) -> &Arc<LogRegistry> { &self.registry }

    /// Accept an upload: allocate an id, queue the pipeline, and return the
    /// provisional session. Size and report flag converge once the job runs.
    pub fn post_new_log(&self, created_at: DateTime<Utc>, parts: UploadParts) -> Result<Session, CabinetError> {
        let id = self.registry.allocate_id();
        let session = Session::provisional(id, created_at, now_utc());
        let pipeline = Arc::clone(&self.pipeline);
        let job = session.clone();
        if let Err(e) = self.pool.submit(move || pipeline.upload(job, parts)) {
            self.registry.release(id);
            return Err(e);
        }
        info!(id, created_at = %session.created_at, "upload accepted");
        Ok(session)
    }

    /// Scan the root, publish every valid session, and queue a recovery job
    /// for each. Invalid directories are skipped with a warning.
    pub fn load_from_disk(&self) -> Result<LoadSummary> {
        let root = self.root();
        if !root.exists() {
            fs::create_dir_all(root).with_context(|| format!("creating {}", root.display()))?;
            info!(root = %root.display(), "created storage root");
        }
        let mut found = Vec::new();
        let mut summary = LoadSummary::default();
        for entry in fs::read_dir(root).with_context(|| format!("reading {}", root.display()))? {
            let entry = entry.with_context(|| format!("reading {}", root.display()))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            let id = name.parse::<SessionId>().ok().filter(|id| id.to_string() == name);
            let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
            match (id, is_dir) {
                (Some(id), true) => found.push(id),
                (Some(id), false) => {
                    // A file named like a session would block that session's directory.
                    self.registry.reserve(id);
                    skip(&mut summary, name, "not a directory");
                }
                (None, true) => skip(&mut summary, name, "name is not a session id"),
                (None, false) => skip(&mut summary, name, "not a directory"),
            }
        }
        found.sort_unstable();

        for id in found {
            let dir = SessionDir::new(root, id);
            let session = match validate(&dir) {
                Ok(s) => s,
                Err(reason) => {
                    // Keep the id out of circulation so uploads never write into it.
                    self.registry.reserve(id);
                    skip(&mut summary, id.to_string(), &reason);
                    continue;
                }
            };
            self.registry.publish(session.clone());
            let pipeline = Arc::clone(&self.pipeline);
            if let Err(e) = self.pool.submit(move || pipeline.recover(session)) {
                warn!(id, error = %e, "recovery not queued");
            }
            summary.loaded.push(id);
        }
        info!(loaded = summary.loaded.len(), skipped = summary.skipped.len(), "startup scan complete");
        Ok(summary)
    }

    pub fn get(&self, id: SessionId) -> Option<Arc<Session>> { self.registry.get(id) }
    pub fn list(&self) -> Vec<Arc<Session>> { self.registry.list() }

    pub async fn wait_idle(&self) { self.pool.wait_idle().await }

    /// Reject new uploads and wait for queued and running jobs.
    pub async fn shutdown(&self) {
        self.pool.shutdown().await;
        info!(sessions = self.registry.len(), "log service stopped");
    }
}

fn validate(dir: &SessionDir) -> Result<Session, String> {
    let manifest = load_manifest(&dir.manifest()).map_err(|e| format!("{:#}", e))?;
    if manifest.id != dir.id() {
        return Err(format!("manifest id {} does not match directory", manifest.id));
    }
    if !dir.has_log() {
        return Err(format!("missing primary log {}", dir.log().display()));
    }
    Ok(Session::from(manifest))
}

fn skip(summary: &mut LoadSummary, name: String, reason: &str) {
    warn!(dir = %name, reason, "skipping directory");
    counter!("recovery_skipped_total", 1u64);
    summary.skipped.push(Skipped { name, reason: reason.to_string() });
}
