//! Sample table: timestamp-bucketed readings parsed from a `timestamp tag value`
//! stream, forward-filled into a dense table over the tag map's columns.

use std::collections::BTreeMap;
use std::io::{BufRead, Read};

use rustc_hash::FxHashMap;

use crate::tracking::{Tracker, TrackingKind};

/// Internal statistic tag -> display label. Defines the report's columns.
pub type TagMap = BTreeMap<String, String>;

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("line {line}: {reason}")]
    Record { line: usize, reason: String },
    #[error("unreadable tag map: {0}")]
    TagMap(#[source] serde_json::Error),
    #[error("reading statistics: {0}")]
    Io(#[from] std::io::Error),
}

/// Parse a JSON object of `tag -> label` pairs.
pub fn read_tag_map<R: Read>(reader: R) -> Result<TagMap, ParseError> {
    serde_json::from_reader(reader).map_err(ParseError::TagMap)
}

/// Trackers keyed by statistic name (the label a tag maps to).
#[derive(Debug, Clone, Default)]
pub struct Trackers {
    by_statistic: FxHashMap<String, Tracker>,
}

impl Trackers {
    pub fn new() -> Self { Self::default() }

    pub fn track(&mut self, statistic: impl Into<String>, kind: TrackingKind) {
        self.by_statistic.insert(statistic.into(), Tracker::new(kind));
    }

    /// Feed a reading; untracked statistics are ignored.
    pub fn post(&mut self, statistic: &str, value: i64) {
        if let Some(t) = self.by_statistic.get_mut(statistic) {
            t.post(value);
        }
    }

    pub fn get(&self, statistic: &str) -> Option<i64> {
        self.by_statistic.get(statistic).and_then(Tracker::get)
    }

    pub fn is_tracked(&self, statistic: &str) -> bool { self.by_statistic.contains_key(statistic) }

    pub fn len(&self) -> usize { self.by_statistic.len() }
    pub fn is_empty(&self) -> bool { self.by_statistic.is_empty() }
}

/// Timestamp -> (tag -> value), iterated in ascending timestamp order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SampleTable {
    rows: BTreeMap<i64, FxHashMap<String, i64>>,
}

/// One column of the dense table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub tag: String,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DenseRow {
    pub timestamp: i64,
    /// One value per column, in column order.
    pub values: Vec<i64>,
}

/// Normalized table with a value in every cell.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DenseTable {
    pub columns: Vec<Column>,
    pub rows: Vec<DenseRow>,
}

impl DenseTable {
    /// Index of the column whose label matches `statistic`, ignoring case.
    pub fn column_for(&self, statistic: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.label.eq_ignore_ascii_case(statistic))
    }
}

impl SampleTable {
    pub fn new() -> Self { Self::default() }

    pub fn insert(&mut self, timestamp: i64, tag: impl Into<String>, value: i64) {
        self.rows.entry(timestamp).or_default().insert(tag.into(), value);
    }

    pub fn get(&self, timestamp: i64, tag: &str) -> Option<i64> {
        self.rows.get(&timestamp).and_then(|r| r.get(tag)).copied()
    }

    pub fn timestamps(&self) -> impl Iterator<Item = i64> + '_ { self.rows.keys().copied() }

    pub fn len(&self) -> usize { self.rows.len() }
    pub fn is_empty(&self) -> bool { self.rows.is_empty() }

    /// Stream records into a table, posting each raw value to the tracker of
    /// the statistic its tag maps to. Aggregates therefore see the original
    /// record order, before any gaps are filled. Blank lines are ignored; any
    /// malformed record aborts the whole parse.
    pub fn parse<R: BufRead>(reader: R, tags: &TagMap, trackers: &mut Trackers) -> Result<Self, ParseError> {
        let mut table = SampleTable::new();
        for (idx, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let (timestamp, tag, value) = parse_record(&line, idx + 1)?;
            if let Some(statistic) = tags.get(tag) {
                trackers.post(statistic, value);
            }
            table.insert(timestamp, tag, value);
        }
        Ok(table)
    }

    /// Forward-fill: every tag of `tags` missing at a timestamp takes the
    /// previous timestamp's value, or zero at the first timestamp.
    pub fn normalize(&mut self, tags: &TagMap) {
        let mut carry = vec![0i64; tags.len()];
        for row in self.rows.values_mut() {
            for (i, tag) in tags.keys().enumerate() {
                match row.get(tag) {
                    Some(v) => carry[i] = *v,
                    None => {
                        row.insert(tag.clone(), carry[i]);
                    }
                }
            }
        }
    }

    pub fn is_dense(&self, tags: &TagMap) -> bool {
        self.rows.values().all(|row| tags.keys().all(|t| row.contains_key(t)))
    }

    /// Project onto the tag map's columns. Expects a normalized table.
    pub fn dense(&self, tags: &TagMap) -> DenseTable {
        let columns = tags
            .iter()
            .map(|(tag, label)| Column { tag: tag.clone(), label: label.clone() })
            .collect();
        let rows = self
            .rows
            .iter()
            .map(|(ts, row)| DenseRow {
                timestamp: *ts,
                values: tags.keys().map(|t| row.get(t).copied().unwrap_or_default()).collect(),
            })
            .collect();
        DenseTable { columns, rows }
    }
}

fn parse_record(line: &str, line_no: usize) -> Result<(i64, &str, i64), ParseError> {
    let bad = |reason: String| ParseError::Record { line: line_no, reason };
    let mut parts = line.split_whitespace();
    let (Some(ts), Some(tag), Some(value)) = (parts.next(), parts.next(), parts.next()) else {
        return Err(bad(format!("expected `timestamp tag value`, got {:?}", line)));
    };
    if parts.next().is_some() {
        return Err(bad(format!("trailing fields in {:?}", line)));
    }
    let ts = ts.parse::<i64>().map_err(|e| bad(format!("timestamp {:?}: {}", ts, e)))?;
    let value = value.parse::<i64>().map_err(|e| bad(format!("value {:?}: {}", value, e)))?;
    Ok((ts, tag, value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn tags(pairs: &[(&str, &str)]) -> TagMap {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    fn parse(input: &str, tag_map: &TagMap) -> Result<SampleTable, ParseError> {
        SampleTable::parse(input.as_bytes(), tag_map, &mut Trackers::new())
    }

    #[test]
    fn forward_fill_carries_previous_value() {
        let tm = tags(&[("a", "A"), ("b", "B")]);
        let mut t = parse("0 a 5\n0 b 9\n10 a 7\n", &tm).unwrap();
        t.normalize(&tm);
        assert_eq!(t.get(10, "a"), Some(7));
        assert_eq!(t.get(10, "b"), Some(9));
        assert!(t.is_dense(&tm));
    }

    #[test]
    fn first_timestamp_fills_zero() {
        let tm = tags(&[("a", "A"), ("b", "B")]);
        let mut t = parse("5 a 1\n6 b 2\n", &tm).unwrap();
        t.normalize(&tm);
        assert_eq!(t.get(5, "b"), Some(0));
        assert_eq!(t.get(6, "a"), Some(1));
    }

    #[test]
    fn rows_iterate_in_timestamp_order() {
        let tm = tags(&[("a", "A")]);
        let mut t = parse("30 a 3\n10 a 1\n20 a 2\n", &tm).unwrap();
        t.normalize(&tm);
        let dense = t.dense(&tm);
        let ts: Vec<i64> = dense.rows.iter().map(|r| r.timestamp).collect();
        assert_eq!(ts, vec![10, 20, 30]);
        assert_eq!(dense.rows[2].values, vec![3]);
    }

    #[test]
    fn tags_outside_map_are_kept_raw_but_not_columns() {
        let tm = tags(&[("a", "A")]);
        let mut t = parse("0 a 1\n0 zz 4\n", &tm).unwrap();
        t.normalize(&tm);
        assert_eq!(t.get(0, "zz"), Some(4));
        let dense = t.dense(&tm);
        assert_eq!(dense.columns.len(), 1);
        assert_eq!(dense.rows[0].values, vec![1]);
    }

    #[test]
    fn trackers_see_raw_stream_order() {
        let tm = tags(&[("1", "mtr_spd"), ("2", "bms_soc")]);
        let mut trackers = Trackers::new();
        trackers.track("mtr_spd", TrackingKind::Max);
        trackers.track("bms_soc", TrackingKind::Last);
        let input = "0 1 3\n0 2 90\n5 1 9\n10 2 88\n10 1 4\n";
        SampleTable::parse(input.as_bytes(), &tm, &mut trackers).unwrap();
        assert_eq!(trackers.get("mtr_spd"), Some(9));
        assert_eq!(trackers.get("bms_soc"), Some(88));
    }

    #[test]
    fn malformed_record_aborts() {
        let tm = tags(&[("a", "A")]);
        let err = parse("0 a 1\n1 a x\n2 a 3\n", &tm).unwrap_err();
        assert!(matches!(err, ParseError::Record { line: 2, .. }), "{err}");
        assert!(matches!(parse("0 a\n", &tm), Err(ParseError::Record { line: 1, .. })));
        assert!(matches!(parse("0 a 1 2\n", &tm), Err(ParseError::Record { .. })));
        assert!(matches!(parse("t a 1\n", &tm), Err(ParseError::Record { .. })));
    }

    #[test]
    fn blank_lines_are_ignored() {
        let tm = tags(&[("a", "A")]);
        let t = parse("\n0 a 1\n   \n1 a 2\n", &tm).unwrap();
        assert_eq!(t.len(), 2);
    }

    #[test]
    fn tag_map_parses_json_object() {
        let tm = read_tag_map(r#"{ "0": "mtr_spd", "1": "bms_soc" }"#.as_bytes()).unwrap();
        assert_eq!(tm.get("1").map(String::as_str), Some("bms_soc"));
        assert!(matches!(read_tag_map("[1, 2]".as_bytes()), Err(ParseError::TagMap(_))));
    }

    #[test]
    fn column_lookup_ignores_case() {
        let tm = tags(&[("0", "MTR_SPD")]);
        let dense = SampleTable::new().dense(&tm);
        assert_eq!(dense.column_for("mtr_spd"), Some(0));
        assert_eq!(dense.column_for("steer"), None);
    }

    fn records() -> impl Strategy<Value = Vec<(i64, u8, i64)>> {
        proptest::collection::vec((0i64..50, 0u8..4, -100i64..100), 0..60)
    }

    proptest! {
        #[test]
        fn normalization_is_idempotent_and_dense(recs in records()) {
            let tm = tags(&[("t0", "A"), ("t1", "B"), ("t2", "C")]);
            let input: String = recs.iter().map(|(ts, tag, v)| format!("{} t{} {}\n", ts, tag, v)).collect();
            let mut once = parse(&input, &tm).unwrap();
            once.normalize(&tm);
            let mut twice = once.clone();
            twice.normalize(&tm);
            prop_assert!(once.is_dense(&tm));
            prop_assert_eq!(once.dense(&tm), twice.dense(&tm));
            prop_assert_eq!(once, twice);
        }
    }
}
