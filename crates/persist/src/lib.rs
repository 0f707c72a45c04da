//! Cabinet persistence: one directory per session under the storage root.
//!
//! ```text
//! <root>/<id>/manifest.json
//! <root>/<id>/<id>.txt        primary raw log
//! <root>/<id>/<id>.stats      optional time-series records
//! <root>/<id>/<id>.map.stats  optional tag map (present iff .stats is)
//! <root>/<id>/<id>.xlsx       derived report
//! <root>/<id>/<id>.zip        archive of the directory
//! ```

#![forbid(unsafe_code)]

use std::fs::{self, File};
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use cabinet_core::{Manifest, SessionId};
use metrics::histogram;

pub mod archive;

pub use archive::{archive_dir, ensure_archive, file_len};

pub const MANIFEST_FILE: &str = "manifest.json";

/// Paths of one session's files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionDir {
    id: SessionId,
    dir: PathBuf,
}

impl SessionDir {
    pub fn new(root: &Path, id: SessionId) -> Self {
        Self { id, dir: root.join(id.to_string()) }
    }

    pub fn id(&self) -> SessionId { self.id }
    pub fn path(&self) -> &Path { &self.dir }

    pub fn manifest(&self) -> PathBuf { self.dir.join(MANIFEST_FILE) }
    pub fn log(&self) -> PathBuf { self.file("txt") }
    pub fn stats(&self) -> PathBuf { self.file("stats") }
    pub fn stats_map(&self) -> PathBuf { self.file("map.stats") }
    pub fn report(&self) -> PathBuf { self.file("xlsx") }
    pub fn archive(&self) -> PathBuf { self.file("zip") }

    fn file(&self, ext: &str) -> PathBuf { self.dir.join(format!("{}.{}", self.id, ext)) }

    pub fn has_log(&self) -> bool { self.log().is_file() }
    pub fn has_stats(&self) -> bool { self.stats().is_file() && self.stats_map().is_file() }
    pub fn has_report(&self) -> bool { self.report().exists() }

    /// Remove optional inputs and derived artifacts left over from an earlier
    /// use of this directory, so a fresh upload starts clean.
    pub fn clear_derived(&self) -> Result<()> {
        for p in [self.stats(), self.stats_map(), self.report(), self.archive()] {
            match fs::remove_file(&p) {
                Ok(()) => tracing::debug!(path = %p.display(), "removed stale file"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e).with_context(|| format!("removing {}", p.display())),
            }
        }
        Ok(())
    }
}

/// Write `manifest.json`, creating the session directory if needed.
pub fn save_manifest(dir: &SessionDir, manifest: &Manifest) -> Result<()> {
    fs::create_dir_all(dir.path()).with_context(|| format!("creating {}", dir.path().display()))?;
    let path = dir.manifest();
    let mut w = BufWriter::new(File::create(&path).with_context(|| format!("creating {}", path.display()))?);
    serde_json::to_writer_pretty(&mut w, manifest).context("encoding manifest")?;
    w.flush().with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

pub fn load_manifest(path: &Path) -> Result<Manifest> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    serde_json::from_reader(std::io::BufReader::new(file)).with_context(|| format!("decoding {}", path.display()))
}

/// Stream `src` into `path`, truncating any existing file. Returns bytes written.
pub fn stream_to_file<R: Read + ?Sized>(src: &mut R, path: &Path) -> Result<u64> {
    let started = Instant::now();
    let mut w = BufWriter::new(File::create(path).with_context(|| format!("creating {}", path.display()))?);
    let n = std::io::copy(src, &mut w).with_context(|| format!("writing {}", path.display()))?;
    w.flush().with_context(|| format!("flushing {}", path.display()))?;
    histogram!("persist_write_ms", started.elapsed().as_secs_f64() * 1000.0);
    Ok(n)
}
