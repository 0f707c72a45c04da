//! Archiver: zip a session directory into a single file next to its contents.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::time::Instant;

use anyhow::{Context, Result};
use metrics::histogram;
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Zip every regular file under `dir` (paths relative to `dir`) into
/// `archive`, skipping the archive itself. Overwrites an existing archive.
pub fn archive_dir(dir: &Path, archive: &Path) -> Result<usize> {
    let started = Instant::now();
    let file = File::create(archive).with_context(|| format!("creating {}", archive.display()))?;
    let mut zip = ZipWriter::new(BufWriter::new(file));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut entries = 0usize;
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.with_context(|| format!("walking {}", dir.display()))?;
        if !entry.file_type().is_file() || entry.path() == archive {
            continue;
        }
        let rel = entry.path().strip_prefix(dir).context("entry outside archive root")?;
        let name = rel.components().map(|c| c.as_os_str().to_string_lossy()).collect::<Vec<_>>().join("/");
        zip.start_file(name, options)?;
        let mut src = File::open(entry.path()).with_context(|| format!("opening {}", entry.path().display()))?;
        std::io::copy(&mut src, &mut zip).with_context(|| format!("archiving {}", entry.path().display()))?;
        entries += 1;
    }
    let mut out = zip.finish().context("finishing archive")?;
    out.flush().context("flushing archive")?;
    histogram!("archive_ms", started.elapsed().as_secs_f64() * 1000.0);
    Ok(entries)
}

/// Build `archive` from `dir` unless it already exists. Returns whether a new
/// archive was written. A failed build removes its partial output so a later
/// attempt starts from scratch.
pub fn ensure_archive(dir: &Path, archive: &Path) -> Result<bool> {
    if archive.exists() {
        return Ok(false);
    }
    match archive_dir(dir, archive) {
        Ok(_) => Ok(true),
        Err(e) => {
            let _ = fs::remove_file(archive);
            Err(e)
        }
    }
}

/// Byte length of `path`, or zero if it cannot be read.
pub fn file_len(path: &Path) -> u64 {
    fs::metadata(path).map(|m| m.len()).unwrap_or(0)
}
