//! Report driver: turns a dense table plus aggregates into the renderer's
//! input, and runs the parse -> normalize -> render pipeline for one session.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::time::Instant;

use cabinet_core::{CabinetError, SessionId};
use chrono::{DateTime, Utc};
use metrics::histogram;
use tracing::debug;

use crate::profile::ReportProfile;
use crate::table::{read_tag_map, DenseTable, ParseError, SampleTable, Trackers};

/// Identity block printed at the top of the overview page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportHeader {
    pub id: SessionId,
    pub created_at: DateTime<Utc>,
    pub uploaded_at: DateTime<Utc>,
    /// Deep link back to the session's raw log.
    pub log_url: String,
}

impl ReportHeader {
    pub fn title(&self) -> String { format!("Log #{}", self.id) }
}

/// `MM/DD/YYYY hh:mm:ss AM` in UTC.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.format("%m/%d/%Y %I:%M:%S %p").to_string()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryValue {
    pub title: String,
    pub suffix: String,
    pub value: Option<i64>,
}

impl SummaryValue {
    pub fn display(&self) -> String {
        match self.value {
            Some(v) => format!("{}{}", v, self.suffix),
            None => "N/A".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportRow {
    pub timestamp: i64,
    /// Whole seconds since the first sample, rounded up.
    pub elapsed_secs: i64,
    pub values: Vec<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChartSeries {
    pub name: String,
    /// Index into `Report::columns`.
    pub column: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chart {
    pub title: String,
    pub series: Vec<ChartSeries>,
}

/// Everything a renderer needs; no spreadsheet specifics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    pub header: ReportHeader,
    pub summary: Vec<SummaryValue>,
    /// Column labels, one per tag-map entry.
    pub columns: Vec<String>,
    pub rows: Vec<ReportRow>,
    pub charts: Vec<Chart>,
}

/// Writes a `Report` to a file. Implementations own all visual layout.
pub trait ReportRenderer: Send + Sync {
    fn render(&self, report: &Report, out: &Path) -> anyhow::Result<()>;
}

#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error("render failed: {0:#}")]
    Render(anyhow::Error),
}

impl From<ReportError> for CabinetError {
    fn from(e: ReportError) -> Self {
        match e {
            ReportError::Parse(ParseError::Io(io)) => CabinetError::storage(io),
            ReportError::Parse(p) => CabinetError::parse(p),
            ReportError::Render(r) => CabinetError::storage(r),
        }
    }
}

impl Report {
    pub fn build(header: ReportHeader, table: &DenseTable, trackers: &Trackers, profile: &ReportProfile) -> Self {
        let summary = profile
            .summary
            .iter()
            .map(|s| SummaryValue { title: s.title.clone(), suffix: s.suffix.clone(), value: trackers.get(&s.statistic) })
            .collect();

        let offset = table.rows.first().map(|r| r.timestamp).unwrap_or_default();
        let rows = table
            .rows
            .iter()
            .map(|r| ReportRow { timestamp: r.timestamp, elapsed_secs: elapsed_secs(r.timestamp, offset), values: r.values.clone() })
            .collect::<Vec<_>>();

        let charts = if rows.is_empty() {
            Vec::new()
        } else {
            profile
                .charts
                .iter()
                .filter_map(|spec| {
                    let series: Vec<ChartSeries> = spec
                        .statistics
                        .iter()
                        .filter_map(|stat| table.column_for(stat).map(|column| ChartSeries { name: stat.clone(), column }))
                        .collect();
                    (!series.is_empty()).then(|| Chart { title: spec.title.clone(), series })
                })
                .collect()
        };

        Report { header, summary, columns: table.columns.iter().map(|c| c.label.clone()).collect(), rows, charts }
    }
}

/// Whole seconds from `offset` to `ts`, rounded up. Widened so timestamps at
/// opposite ends of the `i64` range cannot overflow.
fn elapsed_secs(ts: i64, offset: i64) -> i64 {
    let millis = i128::from(ts) - i128::from(offset);
    let secs = (millis + 999).div_euclid(1000);
    i64::try_from(secs).unwrap_or(if secs < 0 { i64::MIN } else { i64::MAX })
}

/// Parse `stats` with the tag map at `tag_map`, normalize, aggregate per
/// `profile`, and render to `out`. Nothing is written unless rendering runs.
pub fn generate_report(
    stats: &Path,
    tag_map: &Path,
    header: ReportHeader,
    profile: &ReportProfile,
    renderer: &dyn ReportRenderer,
    out: &Path,
) -> Result<Report, ReportError> {
    let t0 = Instant::now();
    let tags = read_tag_map(BufReader::new(File::open(tag_map).map_err(ParseError::Io)?))?;
    let mut trackers = profile.trackers();
    let mut table = SampleTable::parse(BufReader::new(File::open(stats).map_err(ParseError::Io)?), &tags, &mut trackers)?;
    table.normalize(&tags);
    let report = Report::build(header, &table.dense(&tags), &trackers, profile);
    debug!(id = report.header.id, rows = report.rows.len(), columns = report.columns.len(), "report built");
    renderer.render(&report, out).map_err(ReportError::Render)?;
    histogram!("report_render_ms", t0.elapsed().as_secs_f64() * 1000.0);
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::{MOTOR_SPEED, STATE_OF_CHARGE};
    use crate::table::TagMap;
    use chrono::TimeZone;
    use std::sync::Mutex;

    fn header() -> ReportHeader {
        let t = Utc.timestamp_opt(1_650_000_000, 0).unwrap();
        ReportHeader { id: 12, created_at: t, uploaded_at: t, log_url: "https://example.org/files/12/12.txt".into() }
    }

    fn tag_map() -> TagMap {
        [("0", MOTOR_SPEED), ("1", STATE_OF_CHARGE), ("2", "steer")].iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    fn build(input: &str) -> Report {
        let tm = tag_map();
        let profile = ReportProfile::reference();
        let mut trackers = profile.trackers();
        let mut t = SampleTable::parse(input.as_bytes(), &tm, &mut trackers).unwrap();
        t.normalize(&tm);
        Report::build(header(), &t.dense(&tm), &trackers, &profile)
    }

    #[test]
    fn summary_carries_aggregates_and_suffixes() {
        let r = build("1000 0 30\n1000 1 95\n2500 0 42\n4000 1 90\n4000 0 12\n");
        assert_eq!(r.summary[0].display(), "42 MPH");
        assert_eq!(r.summary[1].display(), "90%");
        // never observed
        assert_eq!(r.summary[2].value, None);
        assert_eq!(r.summary[2].display(), "N/A");
    }

    #[test]
    fn rows_have_elapsed_seconds_rounded_up() {
        let r = build("1000 0 1\n2500 0 2\n4000 0 3\n");
        let elapsed: Vec<i64> = r.rows.iter().map(|r| r.elapsed_secs).collect();
        assert_eq!(elapsed, vec![0, 2, 3]);
        assert_eq!(r.columns, vec![MOTOR_SPEED.to_string(), STATE_OF_CHARGE.to_string(), "steer".to_string()]);
    }

    #[test]
    fn extreme_timestamps_do_not_overflow() {
        let r = build("-9000000000000000000 0 1\n9000000000000000000 0 2\n");
        assert_eq!(r.rows.len(), 2);
        assert_eq!(r.rows[0].elapsed_secs, 0);
        assert_eq!(r.rows[1].elapsed_secs, 18_000_000_000_000_000);
        assert_eq!(elapsed_secs(i64::MAX, i64::MIN), 18_446_744_073_709_552);
    }

    #[test]
    fn charts_drop_unknown_statistics() {
        let r = build("0 0 1\n");
        let titles: Vec<&str> = r.charts.iter().map(|c| c.title.as_str()).collect();
        assert_eq!(titles, vec!["Speed", "Steering", "State of Charge"]);
        assert_eq!(r.charts[0].series, vec![ChartSeries { name: MOTOR_SPEED.into(), column: 0 }]);
    }

    #[test]
    fn empty_stream_has_no_rows_or_charts() {
        let r = build("");
        assert!(r.rows.is_empty());
        assert!(r.charts.is_empty());
        assert_eq!(r.summary.len(), 6);
    }

    #[test]
    fn header_formatting() {
        let h = header();
        assert_eq!(h.title(), "Log #12");
        assert_eq!(format_timestamp(&Utc.timestamp_opt(1_650_000_000, 0).unwrap()), "04/15/2022 05:20:00 AM");
    }

    struct Capture(Mutex<Option<Report>>);

    impl ReportRenderer for Capture {
        fn render(&self, report: &Report, out: &Path) -> anyhow::Result<()> {
            std::fs::write(out, b"report")?;
            *self.0.lock().unwrap() = Some(report.clone());
            Ok(())
        }
    }

    #[test]
    fn generate_report_from_files() {
        let dir = tempfile::tempdir().unwrap();
        let stats = dir.path().join("1.stats");
        let map = dir.path().join("1.map.stats");
        let out = dir.path().join("1.xlsx");
        std::fs::write(&stats, "0 0 5\n0 1 80\n1000 0 7\n").unwrap();
        std::fs::write(&map, r#"{"0": "mtr_spd", "1": "bms_soc"}"#).unwrap();
        let renderer = Capture(Mutex::new(None));
        let report = generate_report(&stats, &map, header(), &ReportProfile::reference(), &renderer, &out).unwrap();
        assert!(out.exists());
        assert_eq!(report.rows.len(), 2);
        assert_eq!(report.rows[1].values, vec![7, 80]);
        assert_eq!(renderer.0.lock().unwrap().as_ref(), Some(&report));
    }

    #[test]
    fn parse_failure_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let stats = dir.path().join("1.stats");
        let map = dir.path().join("1.map.stats");
        let out = dir.path().join("1.xlsx");
        std::fs::write(&stats, "0 0 five\n").unwrap();
        std::fs::write(&map, r#"{"0": "mtr_spd"}"#).unwrap();
        let renderer = Capture(Mutex::new(None));
        let err = generate_report(&stats, &map, header(), &ReportProfile::reference(), &renderer, &out).unwrap_err();
        assert!(matches!(err, ReportError::Parse(ParseError::Record { line: 1, .. })));
        assert!(!out.exists());
        assert!(matches!(CabinetError::from(err), CabinetError::Parse(_)));
    }
}
