//! Shared office fixture for the integration tests.
#![allow(dead_code)]

use chrono::NaiveDate;
use std::sync::Arc;
use turnero_core::{
    clock::FixedClock,
    config::AreaConfig,
    event::RecordingNotifier,
    identity::{FixtureResolver, PersonRecord},
    priority::ManualFlags,
    types::{AreaId, CloseReasonId, CounterId, Day, OperatorId, ProcedureId, Timestamp},
    DeskEngine, DeskResult, FinishRequest, IssueRequest, Issued,
};

/// Monday 2 March 2026.
pub fn day() -> Day {
    NaiveDate::from_ymd_opt(2026, 3, 2).unwrap()
}

pub fn at(h: u32, m: u32) -> Timestamp {
    day().and_hms_opt(h, m, 0).unwrap()
}

/// 40 years old on the test day.
pub const JUAN: &str = "100";
/// 70 years old on the test day.
pub const ELSA: &str = "200";
/// 30 years old on the test day.
pub const LUIS: &str = "300";

pub const OP_A: OperatorId = 10;
pub const OP_B: OperatorId = 11;

pub fn directory() -> FixtureResolver {
    let person = |given: &str, family: &str, born: (i32, u32, u32)| PersonRecord {
        given_name: given.into(),
        family_name: family.into(),
        birthdate: NaiveDate::from_ymd_opt(born.0, born.1, born.2),
        sex: None,
    };
    FixtureResolver::new()
        .with_person(JUAN, person("JUAN", "GOMEZ", (1985, 6, 1)))
        .with_person(ELSA, person("ELSA", "ROMERO", (1956, 1, 10)))
        .with_person(LUIS, person("LUIS", "SOSA", (1995, 11, 20)))
}

/// Open all day, anonymous turns allowed, no quota.
pub fn relaxed() -> AreaConfig {
    AreaConfig {
        identity_required: false,
        ..AreaConfig::always_open()
    }
}

pub struct Office {
    pub engine: DeskEngine,
    pub events: Arc<RecordingNotifier>,
    pub clock: Arc<FixedClock>,
    pub area: AreaId,
    pub procedure: ProcedureId,
    pub other_procedure: ProcedureId,
    /// Unrestricted, not bound to anyone.
    pub counter: CounterId,
    pub resolved: CloseReasonId,
}

/// One area with two procedures, one counter, two operators and one
/// close reason, with the clock at 09:00 on the test day.
pub fn office(config: AreaConfig) -> Office {
    let _ = env_logger::builder().is_test(true).try_init();
    let clock = Arc::new(FixedClock::new(at(9, 0)));
    let (engine, events) = DeskEngine::build_test(clock.clone(), directory()).unwrap();
    let s = &engine.store;
    let area = s.insert_area("Licencias").unwrap();
    s.upsert_area_config(area, &config).unwrap();
    let procedure = s.insert_procedure(area, "Renewal").unwrap();
    let other_procedure = s.insert_procedure(area, "First license").unwrap();
    s.insert_operator(OP_A, "Ana").unwrap();
    s.insert_operator(OP_B, "Raul").unwrap();
    let counter = s.insert_counter(area, "M1", None).unwrap();
    let resolved = s.insert_close_reason("Resolved", None, 0).unwrap();
    Office {
        engine,
        events,
        clock,
        area,
        procedure,
        other_procedure,
        counter,
        resolved,
    }
}

impl Office {
    pub fn issue(&self, identity: Option<&str>) -> DeskResult<Issued> {
        self.issue_with(identity, ManualFlags::default())
    }

    pub fn issue_with(&self, identity: Option<&str>, flags: ManualFlags) -> DeskResult<Issued> {
        self.engine.issue(&IssueRequest {
            area_id: self.area,
            procedure_id: self.procedure,
            identity_number: identity.map(str::to_string),
            flags,
        })
    }

    /// Issue an anonymous turn one minute after the previous one.
    pub fn walk_in(&self) -> turnero_core::model::Turn {
        self.clock.advance(chrono::Duration::minutes(1));
        self.issue(None).unwrap().turn
    }

    pub fn resolved(&self) -> FinishRequest {
        FinishRequest {
            close_reason_id: Some(self.resolved),
            ..FinishRequest::default()
        }
    }
}
