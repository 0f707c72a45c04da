//! Which statistics are aggregated, how the summary labels them, and which
//! statistics are charted together.

use smallvec::{smallvec, SmallVec};

use crate::table::Trackers;
use crate::tracking::TrackingKind;

pub const MOTOR_SPEED: &str = "mtr_spd";
pub const STATE_OF_CHARGE: &str = "bms_soc";
pub const MC0_CURRENT: &str = "mc0_dc_i";
pub const MC1_CURRENT: &str = "mc1_dc_i";
pub const MC0_MOTOR_TEMP: &str = "mc0_mtr_tmp";
pub const MC1_MOTOR_TEMP: &str = "mc1_mtr_tmp";

/// One summary line: `title: <aggregate of statistic><suffix>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummarySpec {
    pub title: String,
    pub suffix: String,
    pub statistic: String,
    pub kind: TrackingKind,
}

/// A line chart over one or more statistics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChartSpec {
    pub title: String,
    pub statistics: SmallVec<[String; 4]>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportProfile {
    pub summary: Vec<SummarySpec>,
    pub charts: Vec<ChartSpec>,
}

impl ReportProfile {
    /// Fresh trackers for one report run, one per summarized statistic.
    pub fn trackers(&self) -> Trackers {
        let mut t = Trackers::new();
        for s in &self.summary {
            t.track(s.statistic.clone(), s.kind);
        }
        t
    }

    /// The vehicle telemetry profile: peak speed, remaining charge, and the
    /// motor controllers' peak currents and temperatures.
    pub fn reference() -> Self {
        fn summary(title: &str, suffix: &str, statistic: &str, kind: TrackingKind) -> SummarySpec {
            SummarySpec { title: title.into(), suffix: suffix.into(), statistic: statistic.into(), kind }
        }
        fn chart(title: &str, statistics: &[&str]) -> ChartSpec {
            ChartSpec { title: title.into(), statistics: statistics.iter().map(|s| s.to_string()).collect() }
        }
        Self {
            summary: vec![
                summary("Top Speed", " MPH", MOTOR_SPEED, TrackingKind::Max),
                summary("Remaining Battery", "%", STATE_OF_CHARGE, TrackingKind::Last),
                summary("MC0 Top Current", " A", MC0_CURRENT, TrackingKind::Max),
                summary("MC1 Top Current", " A", MC1_CURRENT, TrackingKind::Max),
                summary("M0 Top Temp", " \u{02DA}C", MC0_MOTOR_TEMP, TrackingKind::Max),
                summary("M1 Top Temp", " \u{02DA}C", MC1_MOTOR_TEMP, TrackingKind::Max),
            ],
            charts: vec![
                chart("Speed", &[MOTOR_SPEED]),
                chart("Throttle", &["pdl_0", "pdl_avg", "pdl_1"]),
                chart("MC Current", &[MC0_CURRENT, MC1_CURRENT]),
                chart("MC Voltage", &["mc0_dc_v", "mc1_dc_v"]),
                chart("Steering", &["steer"]),
                ChartSpec { title: "State of Charge".into(), statistics: smallvec![STATE_OF_CHARGE.to_string()] },
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_profile_tracks_six_statistics() {
        let p = ReportProfile::reference();
        let t = p.trackers();
        assert_eq!(t.len(), 6);
        assert!(t.is_tracked(MOTOR_SPEED));
        assert!(t.is_tracked(STATE_OF_CHARGE));
        assert!(!t.is_tracked("steer"));
        let last: Vec<_> = p.summary.iter().filter(|s| s.kind == TrackingKind::Last).map(|s| s.statistic.as_str()).collect();
        assert_eq!(last, vec![STATE_OF_CHARGE]);
    }
}
