use std::sync::Arc;

use anyhow::{Context, Result};
use cabinet_app::telemetry::{init_metrics, init_tracing};
use cabinet_app::{serve, Cli, Commands, Output};
use cabinet_core::now_utc;
use cabinet_ingest::{log_url, LogService};
use cabinet_stats::{generate_report, ReportHeader, ReportProfile};
use cabinet_xlsx::XlsxRenderer;
use clap::Parser;
use tracing::info;

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log);
    init_metrics(cli.metrics_addr.as_deref());

    match cli.command() {
        Commands::Serve => {
            let service = Arc::new(LogService::new(cli.ingest_config(), Arc::new(XlsxRenderer::new()), ReportProfile::reference()));
            service.load_from_disk().context("startup recovery")?;
            serve(service, cli.bind, cli.max_upload_bytes()).await?;
        }
        Commands::Ls => {
            let service = LogService::new(cli.ingest_config(), Arc::new(XlsxRenderer::new()), ReportProfile::reference());
            let summary = service.load_from_disk().context("startup recovery")?;
            service.wait_idle().await;
            let sessions: Vec<_> = service.list().iter().map(|s| s.as_ref().clone()).collect();
            match cli.output {
                Output::Human => {
                    for s in &sessions {
                        let report = if s.has_report { "report" } else { "-" };
                        println!("{:>5}  {}  {}  {:>10}  {}", s.id, s.created_at.format("%Y-%m-%d %H:%M:%S"), s.uploaded_at.format("%Y-%m-%d %H:%M:%S"), s.size_human, report);
                    }
                    for skip in &summary.skipped {
                        eprintln!("skipped {}: {}", skip.name, skip.reason);
                    }
                }
                Output::Json => println!("{}", serde_json::to_string_pretty(&sessions)?),
            }
            service.shutdown().await;
        }
        Commands::Render { stats, map, out, id } => {
            let now = now_utc();
            let header = ReportHeader { id, created_at: now, uploaded_at: now, log_url: log_url(&cli.public_url, id) };
            let report = generate_report(&stats, &map, header, &ReportProfile::reference(), &XlsxRenderer::new(), &out)
                .with_context(|| format!("rendering {}", out.display()))?;
            info!(out = %out.display(), rows = report.rows.len(), charts = report.charts.len(), "report written");
            match cli.output {
                Output::Human => {
                    for s in &report.summary {
                        println!("{}: {}", s.title, s.display());
                    }
                }
                Output::Json => {
                    let summary: serde_json::Map<String, serde_json::Value> =
                        report.summary.iter().map(|s| (s.title.clone(), serde_json::json!(s.value))).collect();
                    println!("{}", serde_json::to_string_pretty(&summary)?);
                }
            }
        }
    }
    Ok(())
}
