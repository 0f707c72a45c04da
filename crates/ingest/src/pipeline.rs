//! Per-session pipeline steps run on pool workers.
//!
//! Upload: persist manifest -> persist raw files -> report -> archive -> publish.
//! Recovery: report (only when absent) -> archive (only when absent) -> publish.

use std::io::{Cursor, Read};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use cabinet_core::{human_readable_bytes, Session, SessionId};
use cabinet_persist::{ensure_archive, file_len, save_manifest, stream_to_file, SessionDir};
use cabinet_stats::{generate_report, ReportError, ReportHeader, ReportProfile, ReportRenderer};
use cabinet_store::LogRegistry;
use metrics::counter;
use tracing::{debug, error, info, warn};

pub type Upload = Box<dyn Read + Send>;

/// Byte streams accepted with one upload. Statistics and tag map are
/// both-or-neither, which the type enforces.
pub struct UploadParts {
    pub log: Upload,
    pub stats: Option<(Upload, Upload)>,
}

impl UploadParts {
    pub fn from_bytes(log: Vec<u8>, stats: Option<(Vec<u8>, Vec<u8>)>) -> Self {
        Self {
            log: Box::new(Cursor::new(log)),
            stats: stats.map(|(s, m)| (Box::new(Cursor::new(s)) as Upload, Box::new(Cursor::new(m)) as Upload)),
        }
    }
}

/// Link to the raw log under the public file route.
pub fn log_url(base: &str, id: SessionId) -> String {
    format!("{}/files/{}/{}.txt", base.trim_end_matches('/'), id, id)
}

pub(crate) struct Pipeline {
    pub root: PathBuf,
    pub public_url: String,
    pub registry: Arc<LogRegistry>,
    pub renderer: Arc<dyn ReportRenderer>,
    pub profile: ReportProfile,
}

impl Pipeline {
    pub fn dir(&self, id: SessionId) -> SessionDir { SessionDir::new(&self.root, id) }

    pub fn upload(&self, session: Session, parts: UploadParts) {
        let dir = self.dir(session.id);
        let mut reservation = Reservation { registry: &self.registry, dir: &dir, armed: true };
        if let Err(e) = persist(&dir, &session, parts) {
            error!(id = session.id, error = %format!("{:#}", e), "upload aborted; session not published");
            counter!("ingest_job_failures_total", 1u64);
            return;
        }
        debug!(id = session.id, "upload persisted");
        self.registry.publish(session.clone());
        reservation.armed = false;
        self.finalize(&dir, session);
    }

    pub fn recover(&self, session: Session) {
        let dir = self.dir(session.id);
        self.finalize(&dir, session);
    }

    /// Report, archive and publish. Failures are logged and never stop the
    /// session from being republished.
    fn finalize(&self, dir: &SessionDir, mut session: Session) {
        let has_report = if dir.has_report() {
            true
        } else if dir.has_stats() {
            match self.render(dir, &session) {
                Ok(()) => true,
                Err(e) => {
                    warn!(id = session.id, error = %e, "report generation failed");
                    counter!("ingest_job_failures_total", 1u64);
                    false
                }
            }
        } else {
            false
        };
        session.has_report = session.has_report || has_report;

        let archive = dir.archive();
        match ensure_archive(dir.path(), &archive) {
            Ok(true) => debug!(id = session.id, "archive written"),
            Ok(false) => debug!(id = session.id, "archive already present"),
            Err(e) => {
                warn!(id = session.id, error = %format!("{:#}", e), "archiving failed");
                counter!("ingest_job_failures_total", 1u64);
            }
        }
        session.size_human = human_readable_bytes(file_len(&archive));

        info!(id = session.id, has_report = session.has_report, size = %session.size_human, "session ready");
        self.registry.publish(session);
    }

    fn render(&self, dir: &SessionDir, session: &Session) -> Result<(), ReportError> {
        let header = ReportHeader {
            id: session.id,
            created_at: session.created_at,
            uploaded_at: session.uploaded_at,
            log_url: log_url(&self.public_url, session.id),
        };
        let report = generate_report(&dir.stats(), &dir.stats_map(), header, &self.profile, self.renderer.as_ref(), &dir.report())?;
        debug!(id = session.id, rows = report.rows.len(), charts = report.charts.len(), "report written");
        Ok(())
    }
}

/// Returns an upload's id to the registry if the job ends, by error or by
/// unwinding, before the session is published. An id whose directory path is
/// occupied by something other than a directory stays reserved.
struct Reservation<'a> {
    registry: &'a LogRegistry,
    dir: &'a SessionDir,
    armed: bool,
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let path = self.dir.path();
        if path.exists() && !path.is_dir() {
            warn!(id = self.dir.id(), path = %path.display(), "session path is occupied; keeping id reserved");
            return;
        }
        self.registry.release(self.dir.id());
    }
}

/// Write manifest, raw log, and the optional statistics pair.
fn persist(dir: &SessionDir, session: &Session, parts: UploadParts) -> Result<()> {
    let UploadParts { mut log, stats } = parts;
    save_manifest(dir, &session.manifest()).context("saving manifest")?;
    dir.clear_derived()?;
    let n = stream_to_file(&mut log, &dir.log()).context("saving log")?;
    debug!(id = session.id, bytes = n, "log saved");
    if let Some((mut s, mut m)) = stats {
        stream_to_file(&mut s, &dir.stats()).context("saving statistics")?;
        stream_to_file(&mut m, &dir.stats_map()).context("saving tag map")?;
    }
    Ok(())
}
