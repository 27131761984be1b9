use crate::{
    identity::FixturePerson,
    priority::TierSet,
    types::OperatorId,
};
use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use std::fmt;

// ── Time windows ───────────────────────────────────────────────────

/// Daily opening window, start inclusive and end exclusive.
/// A window whose end precedes its start wraps past midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl TimeWindow {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        Self { start, end }
    }

    /// Build from whole hours and minutes. None if either end is not a
    /// valid clock time.
    pub fn hm(start: (u32, u32), end: (u32, u32)) -> Option<Self> {
        let at = |(h, m): (u32, u32)| NaiveTime::from_hms_opt(h, m, 0);
        Some(Self::new(at(start)?, at(end)?))
    }

    pub fn contains(&self, t: NaiveTime) -> bool {
        if self.start <= self.end {
            t >= self.start && t < self.end
        } else {
            t >= self.start || t < self.end
        }
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start.format("%H:%M"), self.end.format("%H:%M"))
    }
}

// ── Per-area policy ────────────────────────────────────────────────

/// Policy for one area. Owned by the administration surface; the desk
/// reads a fresh copy at the start of every operation and never caches it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AreaConfig {
    /// None = turns may be issued at any time.
    pub issuance_hours: Option<TimeWindow>,
    /// None = operators may call at any time.
    pub attention_hours: Option<TimeWindow>,
    pub identity_required: bool,
    pub allow_multiple_active: bool,
    /// Turns one person may take per area per day. 0 = unlimited.
    pub max_turns_per_day: u32,
    pub enabled_tiers: TierSet,
    pub derivation_allowed: bool,
    pub close_reason_required: bool,
    pub call_timeout_secs: u32,
    /// Sweep yesterday's leftovers when the first turn of the day is issued.
    pub expire_stale_turns: bool,
}

impl Default for AreaConfig {
    fn default() -> Self {
        Self {
            issuance_hours: TimeWindow::hm((7, 0), (12, 30)),
            attention_hours: TimeWindow::hm((7, 30), (12, 30)),
            identity_required: true,
            allow_multiple_active: false,
            max_turns_per_day: 3,
            enabled_tiers: TierSet::default(),
            derivation_allowed: false,
            close_reason_required: true,
            call_timeout_secs: 10,
            expire_stale_turns: true,
        }
    }
}

impl AreaConfig {
    /// No time windows, no quota. Handy when hours are not under test.
    pub fn always_open() -> Self {
        Self {
            issuance_hours: None,
            attention_hours: None,
            max_turns_per_day: 0,
            ..Self::default()
        }
    }

    pub fn issuing_at(&self, t: NaiveTime) -> bool {
        self.issuance_hours.map_or(true, |w| w.contains(t))
    }

    pub fn attending_at(&self, t: NaiveTime) -> bool {
        self.attention_hours.map_or(true, |w| w.contains(t))
    }

    pub fn quota_reached(&self, turns_today: u32) -> bool {
        self.max_turns_per_day > 0 && turns_today >= self.max_turns_per_day
    }
}

// ── Runner settings ────────────────────────────────────────────────

/// Which identity directory backs the admission gate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResolverSettings {
    /// Static people list, inline or in a JSON file.
    Fixture {
        #[serde(default)]
        path: Option<String>,
        #[serde(default)]
        people: Vec<FixturePerson>,
    },
    /// External person directory reached over its own database connection.
    Directory { database: String },
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self::Fixture {
            path: None,
            people: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerSettings {
    #[serde(default = "default_database")]
    pub database: String,
    #[serde(default)]
    pub resolver: ResolverSettings,
    #[serde(default)]
    pub setup: Option<String>,
}

fn default_database() -> String {
    "turnero.db".into()
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self {
            database: default_database(),
            resolver: ResolverSettings::default(),
            setup: None,
        }
    }
}

impl RunnerSettings {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        Ok(serde_json::from_str(&content)?)
    }
}

// ── Office setup ───────────────────────────────────────────────────

/// Everything needed to stand up an office from scratch: operators,
/// close reasons, and areas with their procedures and counters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OfficeSetup {
    #[serde(default)]
    pub operators: Vec<OperatorSetup>,
    #[serde(default)]
    pub close_reasons: Vec<CloseReasonSetup>,
    #[serde(default)]
    pub areas: Vec<AreaSetup>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperatorSetup {
    pub operator_id: OperatorId,
    pub display_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloseReasonSetup {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AreaSetup {
    pub name: String,
    #[serde(default)]
    pub config: AreaConfig,
    #[serde(default)]
    pub procedures: Vec<String>,
    #[serde(default)]
    pub counters: Vec<CounterSetup>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CounterSetup {
    pub name: String,
    /// Procedure names this counter serves. Empty = all of the area's.
    #[serde(default)]
    pub procedures: Vec<String>,
    #[serde(default)]
    pub operator_id: Option<OperatorId>,
}

impl OfficeSetup {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        Ok(serde_json::from_str(&content)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn window_is_start_inclusive_end_exclusive() {
        let w = TimeWindow::hm((7, 30), (12, 30)).unwrap();
        assert!(!w.contains(t(7, 29)));
        assert!(w.contains(t(7, 30)));
        assert!(w.contains(t(12, 29)));
        assert!(!w.contains(t(12, 30)));
        assert!(!w.contains(t(13, 0)));
    }

    #[test]
    fn window_can_wrap_midnight() {
        let w = TimeWindow::hm((22, 0), (2, 0)).unwrap();
        assert!(w.contains(t(23, 15)));
        assert!(w.contains(t(1, 59)));
        assert!(!w.contains(t(2, 0)));
        assert!(!w.contains(t(12, 0)));
    }

    #[test]
    fn invalid_clock_times_build_no_window() {
        assert_eq!(TimeWindow::hm((24, 0), (12, 30)), None);
        assert_eq!(TimeWindow::hm((7, 30), (12, 60)), None);
        assert!(TimeWindow::hm((0, 0), (23, 59)).is_some());
    }

    #[test]
    fn zero_quota_means_unlimited() {
        let cfg = AreaConfig::always_open();
        assert!(!cfg.quota_reached(1_000));
        let cfg = AreaConfig { max_turns_per_day: 1, ..AreaConfig::default() };
        assert!(!cfg.quota_reached(0));
        assert!(cfg.quota_reached(1));
    }

    #[test]
    fn partial_config_json_fills_defaults() {
        let cfg: AreaConfig =
            serde_json::from_str(r#"{ "derivation_allowed": true, "issuance_hours": null }"#)
                .unwrap();
        assert!(cfg.derivation_allowed);
        assert_eq!(cfg.issuance_hours, None);
        assert_eq!(cfg.max_turns_per_day, 3);
        assert_eq!(cfg.attention_hours, TimeWindow::hm((7, 30), (12, 30)));
    }

    #[test]
    fn setup_file_parses() {
        let json = r#"{
            "operators": [{ "operator_id": 10, "display_name": "Ana" }],
            "close_reasons": [{ "name": "Resolved" }],
            "areas": [{
                "name": "Licencias",
                "procedures": ["Renewal", "First issue"],
                "counters": [{ "name": "M1", "procedures": ["Renewal"], "operator_id": 10 }]
            }]
        }"#;
        let setup: OfficeSetup = serde_json::from_str(json).unwrap();
        assert_eq!(setup.areas[0].counters[0].operator_id, Some(10));
        assert_eq!(setup.areas[0].config, AreaConfig::default());
    }
}
