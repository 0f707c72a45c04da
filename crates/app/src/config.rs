use std::net::SocketAddr;
use std::path::PathBuf;

use cabinet_core::SessionId;
use cabinet_ingest::{IngestConfig, DEFAULT_PUBLIC_URL, DEFAULT_WORKERS};
use clap::{Parser, Subcommand, ValueEnum};

/// Name of the directory under `--dir` that holds session directories.
pub const LOGS_DIR: &str = "logs";

#[derive(Parser, Debug)]
#[command(name = "cabinet", version, about = "Cabinet telemetry log server")]
pub struct Cli {
    /// Output format
    #[arg(short = 'o', long = "output", value_enum, global = true, default_value_t = Output::Human)]
    pub output: Output,

    /// Storage parent directory; sessions live under <dir>/logs (default: working directory)
    #[arg(long = "dir", env = "CABINET_DIR", global = true)]
    pub dir: Option<PathBuf>,

    /// Concurrent pipeline workers
    #[arg(long = "workers", env = "CABINET_WORKERS", global = true, default_value_t = DEFAULT_WORKERS)]
    pub workers: usize,

    /// Base URL for links back to raw logs
    #[arg(long = "public-url", env = "CABINET_PUBLIC_URL", global = true, default_value = DEFAULT_PUBLIC_URL)]
    pub public_url: String,

    /// HTTP listen address
    #[arg(long = "bind", env = "CABINET_BIND", global = true, default_value = "0.0.0.0:80")]
    pub bind: SocketAddr,

    /// Tracing filter directives, e.g. `info,cabinet_ingest=debug`
    #[arg(long = "log", env = "CABINET_LOG", global = true, default_value = "info")]
    pub log: String,

    /// Expose Prometheus metrics on this host:port
    #[arg(long = "metrics-addr", env = "CABINET_METRICS_ADDR", global = true)]
    pub metrics_addr: Option<String>,

    /// Largest accepted upload body, in MiB
    #[arg(long = "max-upload-mb", env = "CABINET_MAX_UPLOAD_MB", global = true, default_value_t = 256)]
    pub max_upload_mb: usize,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum Output { Human, Json }

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Recover sessions from disk, then serve HTTP (default)
    Serve,
    /// Recover sessions from disk and print them newest first
    Ls,
    /// Render a report from a statistics file and its tag map
    Render {
        stats: PathBuf,
        map: PathBuf,
        out: PathBuf,
        /// Session id shown in the report title
        #[arg(long = "id", default_value_t = 0)]
        id: SessionId,
    },
}

impl Cli {
    pub fn command(&self) -> Commands { self.command.clone().unwrap_or(Commands::Serve) }

    pub fn root(&self) -> PathBuf {
        let parent = self.dir.clone().unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));
        parent.join(LOGS_DIR)
    }

    pub fn ingest_config(&self) -> IngestConfig {
        IngestConfig { root: self.root(), workers: self.workers.max(1), public_url: self.public_url.clone() }
    }

    pub fn max_upload_bytes(&self) -> usize { self.max_upload_mb.saturating_mul(1024 * 1024) }
}
