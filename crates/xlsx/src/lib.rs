//! Cabinet xlsx renderer: lays a `Report` out as a workbook with an
//! `Overview` page, a `Raw` data page, and a `Visual` page of line charts.

#![forbid(unsafe_code)]

use std::path::Path;

use anyhow::{Context, Result};
use cabinet_stats::report::format_timestamp;
use cabinet_stats::{Report, ReportRenderer};
use rust_xlsxwriter::{
    Chart, ChartLegendPosition, ChartType, Color, Format, FormatAlign, FormatBorder, FormatUnderline, Url, Workbook,
    Worksheet,
};
use tracing::debug;

pub const OVERVIEW_PAGE: &str = "Overview";
pub const RAW_PAGE: &str = "Raw";
pub const VISUAL_PAGE: &str = "Visual";

/// First sheet column holding a statistic (after `Timestamp` and `Time (Seconds)`).
const FIRST_VALUE_COL: u16 = 2;
/// Charts are laid out two per row on the visual page.
const CHART_COLS: u16 = 15;
const CHART_ROWS: u32 = 26;
const MAX_COL: u16 = 16_383;
const MAX_ROW: u32 = 1_048_575;

#[derive(Debug, Clone, Default)]
pub struct XlsxRenderer {
    /// Footer text shown next to the title block.
    pub credit: Option<String>,
}

impl XlsxRenderer {
    pub fn new() -> Self { Self { credit: Some("Cabinet Logging System".to_string()) } }
}

impl ReportRenderer for XlsxRenderer {
    fn render(&self, report: &Report, out: &Path) -> Result<()> {
        let mut workbook = Workbook::new();
        overview(workbook.add_worksheet(), report, self.credit.as_deref()).context("overview page")?;
        raw(workbook.add_worksheet(), report).context("raw page")?;
        visual(workbook.add_worksheet(), report).context("visual page")?;
        workbook.save(out).with_context(|| format!("saving workbook {}", out.display()))?;
        debug!(id = report.header.id, path = %out.display(), "workbook saved");
        Ok(())
    }
}

/// Sheet column of the `i`th statistic.
fn value_col(i: usize) -> Result<u16> {
    u16::try_from(i)
        .ok()
        .and_then(|i| FIRST_VALUE_COL.checked_add(i))
        .filter(|c| *c <= MAX_COL)
        .with_context(|| format!("statistic column {} exceeds the sheet width", i))
}

/// Sheet row of the `r`th data row, below the header.
fn data_row(r: usize) -> Result<u32> {
    u32::try_from(r)
        .ok()
        .and_then(|r| r.checked_add(1))
        .filter(|row| *row <= MAX_ROW)
        .with_context(|| format!("data row {} exceeds the sheet height", r))
}

fn bold_centered() -> Format {
    Format::new().set_bold().set_align(FormatAlign::Center).set_border(FormatBorder::Medium)
}

fn boxed() -> Format {
    Format::new().set_border(FormatBorder::Medium)
}

fn link() -> Format {
    Format::new().set_underline(FormatUnderline::Single).set_font_color(Color::RGB(0x6495ED)).set_border(FormatBorder::Medium)
}

fn overview(sheet: &mut Worksheet, report: &Report, credit: Option<&str>) -> Result<()> {
    sheet.set_name(OVERVIEW_PAGE)?;
    let h = &report.header;

    // Title block, B2:E5
    sheet.merge_range(1, 1, 1, 4, &h.title(), &bold_centered())?;
    sheet.write_string_with_format(2, 1, "Created:", &boxed())?;
    sheet.merge_range(2, 2, 2, 4, &format_timestamp(&h.created_at), &boxed())?;
    sheet.write_string_with_format(3, 1, "Uploaded:", &boxed())?;
    sheet.merge_range(3, 2, 3, 4, &format_timestamp(&h.uploaded_at), &boxed())?;
    sheet.merge_range(4, 1, 4, 4, "", &link())?;
    sheet.write_url_with_format(4, 1, Url::new(h.log_url.as_str()).set_text("Open Log"), &link())?;

    // Aggregates, B7 onwards
    sheet.merge_range(6, 1, 6, 4, OVERVIEW_PAGE, &bold_centered())?;
    for (i, s) in report.summary.iter().enumerate() {
        let row = 7 + i as u32;
        sheet.merge_range(row, 1, row, 2, &format!("{}:", s.title), &boxed())?;
        sheet.merge_range(row, 3, row, 4, &s.display(), &boxed())?;
    }

    if let Some(credit) = credit {
        let fmt = Format::new()
            .set_font_size(9)
            .set_font_color(Color::RGB(0xBB0200))
            .set_align(FormatAlign::Center)
            .set_align(FormatAlign::VerticalCenter)
            .set_border(FormatBorder::Medium);
        sheet.merge_range(1, 6, 7, 9, credit, &fmt)?;
    }

    // Menu, G10:J13
    sheet.merge_range(9, 6, 9, 9, "Menu", &bold_centered())?;
    let menu = [
        (OVERVIEW_PAGE, "An overview of the session"),
        (VISUAL_PAGE, "Graphical rendering of data"),
        (RAW_PAGE, "Raw recorded data"),
    ];
    for (i, (page, description)) in menu.iter().enumerate() {
        let row = 10 + i as u32;
        sheet.write_url_with_format(row, 6, Url::new(format!("internal:'{}'!A1", page)).set_text(*page), &link())?;
        sheet.merge_range(row, 7, row, 9, description, &boxed())?;
    }
    sheet.set_column_width(1, 18)?;
    Ok(())
}

fn raw(sheet: &mut Worksheet, report: &Report) -> Result<()> {
    sheet.set_name(RAW_PAGE)?;
    let header = Format::new().set_bold();
    sheet.write_string_with_format(0, 0, "Timestamp", &header)?;
    sheet.write_string_with_format(0, 1, "Time (Seconds)", &header)?;
    for (i, label) in report.columns.iter().enumerate() {
        sheet.write_string_with_format(0, value_col(i)?, label, &header)?;
    }
    for (r, row) in report.rows.iter().enumerate() {
        let sheet_row = data_row(r)?;
        sheet.write_number(sheet_row, 0, row.timestamp as f64)?;
        sheet.write_number(sheet_row, 1, row.elapsed_secs as f64)?;
        for (c, value) in row.values.iter().enumerate() {
            sheet.write_number(sheet_row, value_col(c)?, *value as f64)?;
        }
    }
    Ok(())
}

fn visual(sheet: &mut Worksheet, report: &Report) -> Result<()> {
    sheet.set_name(VISUAL_PAGE)?;
    if report.rows.is_empty() {
        return Ok(());
    }
    let last_row = data_row(report.rows.len() - 1)?;
    for (i, spec) in report.charts.iter().enumerate() {
        let mut chart = Chart::new(ChartType::Line);
        chart.title().set_name(spec.title.as_str());
        chart.x_axis().set_name("Time (seconds)");
        chart.y_axis().set_name("Value");
        chart.legend().set_position(ChartLegendPosition::Bottom);
        for s in &spec.series {
            let col = value_col(s.column)?;
            chart
                .add_series()
                .set_name(s.name.as_str())
                .set_categories((RAW_PAGE, 1, 1, last_row, 1))
                .set_values((RAW_PAGE, 1, col, last_row, col))
                .set_smooth(true);
        }
        let anchor_row = u32::try_from(i / 2).ok().and_then(|r| r.checked_mul(CHART_ROWS)).context("too many charts")?;
        let anchor_col = if i % 2 == 0 { 0 } else { CHART_COLS };
        sheet.insert_chart(anchor_row, anchor_col, &chart)?;
    }
    Ok(())
}
