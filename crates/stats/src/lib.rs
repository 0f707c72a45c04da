//! Cabinet statistics: parse a `timestamp tag value` stream, forward-fill it
//! into a dense table, aggregate tracked statistics, and drive a report
//! renderer with the result.

#![forbid(unsafe_code)]

pub mod profile;
pub mod report;
pub mod table;
pub mod tracking;

pub use profile::{ChartSpec, ReportProfile, SummarySpec};
pub use report::{generate_report, Chart, ChartSeries, Report, ReportError, ReportHeader, ReportRenderer, ReportRow, SummaryValue};
pub use table::{read_tag_map, Column, DenseRow, DenseTable, ParseError, SampleTable, TagMap, Trackers};
pub use tracking::{Tracker, TrackingKind};
