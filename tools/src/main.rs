//! turnero-runner: headless front desk for turnero-core.
//!
//! Usage:
//!   turnero-runner --settings runner.json
//!   turnero-runner --db office.db --setup office.json
//!   turnero-runner --simulate --seed 12345 --operators 4 --requests 200
//!
//! Without --simulate the runner reads one JSON command per line on stdin
//! and answers one JSON line on stdout:
//!   {"type":"next_and_claim","area_id":1,"operator_id":10,"counter_id":1}
//!   -> {"ok":{...turn...}}  or  {"error":{"kind":"...","reason":"..."}}

mod people;
mod rng;
mod simulate;

use anyhow::Result;
use serde::Deserialize;
use std::env;
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use turnero_core::{
    clock::SystemClock,
    config::{OfficeSetup, RunnerSettings},
    engine::DEFAULT_BOARD_LIMIT,
    event::LogNotifier,
    identity::build_resolver,
    store::DeskStore,
    types::{AreaId, CloseReasonId, CounterId, OperatorId, TurnId},
    DeskEngine, DeskError, DeskResult, FinishRequest, IssueRequest,
};

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum IpcCommand {
    Issue(IssueRequest),
    NextAndClaim {
        area_id: AreaId,
        operator_id: OperatorId,
        #[serde(default)]
        counter_id: Option<CounterId>,
    },
    Claim {
        turn_id: TurnId,
        operator_id: OperatorId,
        #[serde(default)]
        counter_id: Option<CounterId>,
    },
    Recall {
        turn_id: TurnId,
        operator_id: OperatorId,
    },
    Start {
        turn_id: TurnId,
    },
    Finish {
        turn_id: TurnId,
        #[serde(default)]
        close_reason_id: Option<CloseReasonId>,
        #[serde(default)]
        consult_priority: i16,
        #[serde(default)]
        notes: Option<String>,
    },
    MarkNoShow {
        turn_id: TurnId,
    },
    Derive {
        turn_id: TurnId,
        from_operator_id: OperatorId,
        to_operator_id: OperatorId,
        #[serde(default)]
        reason: Option<String>,
    },
    Sweep {
        area_id: AreaId,
    },
    Turn {
        turn_id: TurnId,
    },
    Board {
        area_id: AreaId,
        #[serde(default)]
        limit: Option<u32>,
    },
    Quit,
}

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let mut settings = match str_arg(&args, "--settings") {
        Some(path) => RunnerSettings::load(path)?,
        None => RunnerSettings::default(),
    };
    if let Some(db) = str_arg(&args, "--db") {
        settings.database = db.to_string();
    }
    if let Some(setup) = str_arg(&args, "--setup") {
        settings.setup = Some(setup.to_string());
    }

    if args.iter().any(|a| a == "--simulate") {
        return run_simulation(&args, &settings);
    }

    let store = DeskStore::open(&settings.database)?;
    store.migrate()?;
    if let Some(path) = &settings.setup {
        if store.areas()?.is_empty() {
            let setup = OfficeSetup::load(path)?;
            store.apply_setup(&setup)?;
        } else {
            log::info!("Database already has areas; not applying {path}");
        }
    }
    let resolver = build_resolver(&settings.resolver)?;
    let engine = DeskEngine::new(store, Arc::new(SystemClock), resolver, Arc::new(LogNotifier));
    log::info!("Serving operator commands on stdin (db: {})", settings.database);
    run_ipc_loop(&engine)
}

fn run_ipc_loop(engine: &DeskEngine) -> Result<()> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut handle = stdin.lock();
    let mut buffer = String::new();

    loop {
        buffer.clear();
        let bytes_read = handle.read_line(&mut buffer)?;
        if bytes_read == 0 {
            break; // EOF
        }
        if buffer.trim().is_empty() {
            continue;
        }

        match handle_line(engine, &buffer) {
            Some(reply) => {
                writeln!(stdout, "{reply}")?;
                stdout.flush()?;
            }
            None => break,
        }
    }
    Ok(())
}

/// One request line in, one reply out. None when the client quits.
fn handle_line(engine: &DeskEngine, line: &str) -> Option<serde_json::Value> {
    let cmd: IpcCommand = match serde_json::from_str(line) {
        Ok(c) => c,
        Err(e) => {
            return Some(serde_json::json!({
                "error": { "kind": "bad_request", "reason": e.to_string() }
            }));
        }
    };
    if matches!(cmd, IpcCommand::Quit) {
        return None;
    }
    Some(match dispatch(engine, cmd) {
        Ok(value) => serde_json::json!({ "ok": value }),
        Err(e) => error_reply(&e),
    })
}

fn dispatch(engine: &DeskEngine, cmd: IpcCommand) -> DeskResult<serde_json::Value> {
    let value = match cmd {
        IpcCommand::Issue(req) => serde_json::to_value(engine.issue(&req)?)?,
        IpcCommand::NextAndClaim {
            area_id,
            operator_id,
            counter_id,
        } => serde_json::to_value(engine.next_and_claim(area_id, operator_id, counter_id)?)?,
        IpcCommand::Claim {
            turn_id,
            operator_id,
            counter_id,
        } => serde_json::to_value(engine.claim(turn_id, operator_id, counter_id)?)?,
        IpcCommand::Recall {
            turn_id,
            operator_id,
        } => serde_json::to_value(engine.recall(turn_id, operator_id)?)?,
        IpcCommand::Start { turn_id } => serde_json::to_value(engine.start(turn_id)?)?,
        IpcCommand::Finish {
            turn_id,
            close_reason_id,
            consult_priority,
            notes,
        } => {
            let req = FinishRequest {
                close_reason_id,
                consult_priority,
                notes,
            };
            serde_json::to_value(engine.finish(turn_id, &req)?)?
        }
        IpcCommand::MarkNoShow { turn_id } => serde_json::to_value(engine.mark_no_show(turn_id)?)?,
        IpcCommand::Derive {
            turn_id,
            from_operator_id,
            to_operator_id,
            reason,
        } => serde_json::to_value(engine.derive(
            turn_id,
            from_operator_id,
            to_operator_id,
            reason.as_deref(),
        )?)?,
        IpcCommand::Sweep { area_id } => serde_json::json!({ "expired": engine.sweep(area_id)? }),
        IpcCommand::Turn { turn_id } => serde_json::json!({
            "turn": engine.turn(turn_id)?,
            "snapshot": engine.snapshot(turn_id)?,
            "waiting_ahead": engine.waiting_ahead(turn_id)?,
            "call_overdue": engine.call_overdue(turn_id)?,
        }),
        IpcCommand::Board { area_id, limit } => serde_json::to_value(
            engine.call_board(area_id, limit.unwrap_or(DEFAULT_BOARD_LIMIT))?,
        )?,
        IpcCommand::Quit => serde_json::Value::Null,
    };
    Ok(value)
}

fn error_reply(e: &DeskError) -> serde_json::Value {
    let mut body = serde_json::json!({ "kind": e.kind(), "reason": e.to_string() });
    match e {
        DeskError::AdmissionDenied { reason } => body["denial"] = serde_json::json!(reason),
        DeskError::ConfigViolation { rule } => body["rule"] = serde_json::json!(rule),
        _ => {}
    }
    serde_json::json!({ "error": body })
}

fn run_simulation(args: &[String], settings: &RunnerSettings) -> Result<()> {
    let seed = parse_arg(args, "--seed", 42u64);
    let operators = parse_arg(args, "--operators", 4usize);
    let requests = parse_arg(args, "--requests", 120usize);
    let people = parse_arg(args, "--people", 80usize);
    let db = match str_arg(args, "--db") {
        Some(db) => db.to_string(),
        None => env::temp_dir()
            .join(format!("turnero-sim-{seed}-{}.db", unix_secs()))
            .to_string_lossy()
            .into_owned(),
    };
    let setup = match &settings.setup {
        Some(path) => OfficeSetup::load(path)?,
        None => simulate::demo_setup(operators),
    };
    let day = chrono::Local::now().date_naive();

    println!("turnero-runner: simulated office day");
    println!("  seed:      {seed}");
    println!("  day:       {day}");
    println!("  requests:  {requests}");
    println!("  people:    {people}");
    println!("  operators: {}", setup.operators.len());
    println!("  db:        {db}");
    println!();

    let report = simulate::run(
        &simulate::SimOptions {
            seed,
            requests,
            people,
            db,
            day,
        },
        &setup,
    )?;
    print_summary(&report);
    Ok(())
}

fn print_summary(report: &simulate::SimReport) {
    println!("=== DAY SUMMARY ===");
    println!("  turns issued:     {}", report.issued);
    println!("  repeat requests:  {}", report.repeats);
    for (kind, n) in &report.denials {
        println!("  refused ({kind}): {n}");
    }
    println!("  left pending:     {}", report.left_pending);
    println!(
        "  numbering:        {}",
        if report.numbering_contiguous { "contiguous" } else { "GAPS" }
    );
    println!();
    println!("=== OPERATORS ===");
    for op in &report.operators {
        println!(
            "  #{:<3} served {:>3} | no-show {:>2} | derived {:>2} | recalls {:>2} | lost races {:>2}{}",
            op.operator_id,
            op.served,
            op.no_shows,
            op.derived,
            op.recalls,
            op.conflicts,
            op.stopped_by
                .as_ref()
                .map(|k| format!(" | stopped: {k}"))
                .unwrap_or_default()
        );
    }
    println!();
    println!("=== EVENTS ===");
    for (name, n) in &report.events {
        println!("  {name:<18} {n}");
    }
}

fn parse_arg<T: std::str::FromStr + Copy>(args: &[String], flag: &str, default: T) -> T {
    args.windows(2)
        .find(|w| w[0] == flag)
        .and_then(|w| w[1].parse().ok())
        .unwrap_or(default)
}

fn str_arg<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2)
        .find(|w| w[0] == flag)
        .map(|w| w[1].as_str())
}

fn unix_secs() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use turnero_core::{
        clock::FixedClock,
        config::{AreaConfig, AreaSetup, CloseReasonSetup, OperatorSetup},
        error::{DenialReason, ViolatedRule},
        identity::FixtureResolver,
    };

    /// One anonymous-friendly area with two procedures and one operator.
    fn desk() -> (DeskEngine, AreaId, i64, CloseReasonId) {
        let nine = NaiveDate::from_ymd_opt(2026, 3, 2)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap();
        let (engine, _events) =
            DeskEngine::build_test(Arc::new(FixedClock::new(nine)), FixtureResolver::new()).unwrap();
        let setup = OfficeSetup {
            operators: vec![OperatorSetup {
                operator_id: 10,
                display_name: "Ana".into(),
            }],
            close_reasons: vec![CloseReasonSetup {
                name: "Resolved".into(),
                description: None,
            }],
            areas: vec![AreaSetup {
                name: "Licencias".into(),
                config: AreaConfig {
                    identity_required: false,
                    ..AreaConfig::always_open()
                },
                procedures: vec!["Renewal".into()],
                counters: vec![],
            }],
        };
        let applied = engine.store.apply_setup(&setup).unwrap();
        let area = applied.areas["Licencias"];
        let procedure = applied.procedures[&("Licencias".to_string(), "Renewal".to_string())];
        let resolved = applied.close_reasons["Resolved"];
        (engine, area, procedure, resolved)
    }

    fn reply(engine: &DeskEngine, line: &str) -> serde_json::Value {
        handle_line(engine, line).expect("only quit ends the session")
    }

    #[test]
    fn operator_day_over_json_lines() {
        let (engine, area, procedure, resolved) = desk();

        let issued = reply(
            &engine,
            &format!(r#"{{"type":"issue","area_id":{area},"procedure_id":{procedure}}}"#),
        );
        assert_eq!(issued["ok"]["created"], true);
        assert_eq!(issued["ok"]["turn"]["visible_number"], 1);
        let turn_id = issued["ok"]["turn"]["turn_id"].as_i64().unwrap();

        let called = reply(
            &engine,
            &format!(r#"{{"type":"next_and_claim","area_id":{area},"operator_id":10}}"#),
        );
        assert_eq!(called["ok"]["status"], "called");
        assert_eq!(called["ok"]["turn_id"], turn_id);

        let recalled = reply(
            &engine,
            &format!(r#"{{"type":"recall","turn_id":{turn_id},"operator_id":10}}"#),
        );
        assert_eq!(recalled["ok"]["status"], "called");

        let started = reply(&engine, &format!(r#"{{"type":"start","turn_id":{turn_id}}}"#));
        assert_eq!(started["ok"]["status"], "in_progress");

        let missing_reason = reply(&engine, &format!(r#"{{"type":"finish","turn_id":{turn_id}}}"#));
        assert_eq!(missing_reason["error"]["kind"], "config_violation");
        assert_eq!(missing_reason["error"]["rule"], "close_reason_required");

        let derive = reply(
            &engine,
            &format!(
                r#"{{"type":"derive","turn_id":{turn_id},"from_operator_id":10,"to_operator_id":10}}"#
            ),
        );
        assert_eq!(derive["error"]["rule"], "derivation_disabled");

        let finished = reply(
            &engine,
            &format!(
                r#"{{"type":"finish","turn_id":{turn_id},"close_reason_id":{resolved},"consult_priority":1,"notes":" ok "}}"#
            ),
        );
        assert_eq!(finished["ok"]["status"], "completed");
        assert_eq!(finished["ok"]["notes"], "ok");

        let no_show = reply(&engine, &format!(r#"{{"type":"mark_no_show","turn_id":{turn_id}}}"#));
        assert_eq!(no_show["error"]["kind"], "invalid_transition");
        assert!(no_show["error"]["reason"].as_str().unwrap().contains("completed"));

        let view = reply(&engine, &format!(r#"{{"type":"turn","turn_id":{turn_id}}}"#));
        assert_eq!(view["ok"]["turn"]["status"], "completed");
        assert_eq!(view["ok"]["snapshot"]["display_name"], "N° 1");
        assert_eq!(view["ok"]["waiting_ahead"], 0);
        assert_eq!(view["ok"]["call_overdue"], false);

        let board = reply(&engine, &format!(r#"{{"type":"board","area_id":{area}}}"#));
        assert_eq!(board["ok"].as_array().unwrap().len(), 2);
        let board = reply(&engine, &format!(r#"{{"type":"board","area_id":{area},"limit":1}}"#));
        assert_eq!(board["ok"].as_array().unwrap().len(), 1);

        let empty = reply(
            &engine,
            &format!(r#"{{"type":"next_and_claim","area_id":{area},"operator_id":10}}"#),
        );
        assert!(empty["ok"].is_null());

        let sweep = reply(&engine, &format!(r#"{{"type":"sweep","area_id":{area}}}"#));
        assert_eq!(sweep["ok"]["expired"], 0);
    }

    #[test]
    fn unreadable_lines_are_bad_requests() {
        let (engine, ..) = desk();
        for line in [
            "{not json",
            r#"{"type":"teleport","turn_id":1}"#,
            r#"{"type":"start"}"#,
        ] {
            let answer = reply(&engine, line);
            assert_eq!(answer["error"]["kind"], "bad_request", "{line}");
            assert!(answer["error"]["reason"].is_string());
        }
    }

    #[test]
    fn quit_ends_the_session() {
        let (engine, ..) = desk();
        assert!(handle_line(&engine, r#"{"type":"quit"}"#).is_none());
    }

    #[test]
    fn unknown_turn_is_reported_not_found() {
        let (engine, ..) = desk();
        let answer = reply(&engine, r#"{"type":"start","turn_id":999}"#);
        assert_eq!(answer["error"]["kind"], "not_found");
        assert_eq!(answer["error"]["reason"], "turn '999' not found");
    }

    #[test]
    fn error_replies_carry_kind_reason_and_detail() {
        let denied = error_reply(&DeskError::denied(DenialReason::IdentityRequired));
        assert_eq!(denied["error"]["kind"], "admission_denied");
        assert_eq!(denied["error"]["denial"], "identity_required");
        assert_eq!(
            denied["error"]["reason"],
            "Admission denied: an identity number is required"
        );
        assert!(denied["error"].get("rule").is_none());

        let violation = error_reply(&DeskError::violation(ViolatedRule::DerivationDisabled));
        assert_eq!(violation["error"]["kind"], "config_violation");
        assert_eq!(violation["error"]["rule"], "derivation_disabled");
        assert!(violation["error"]["reason"]
            .as_str()
            .unwrap()
            .contains("derivation is disabled"));
        assert!(violation["error"].get("denial").is_none());

        let conflict = error_reply(&DeskError::ConcurrencyConflict { turn_id: 4 });
        assert_eq!(conflict["error"]["kind"], "concurrency_conflict");
    }

    #[test]
    fn issue_denial_reaches_the_client() {
        let (engine, area, ..) = desk();
        let answer = reply(
            &engine,
            &format!(r#"{{"type":"issue","area_id":{area},"procedure_id":999}}"#),
        );
        assert_eq!(answer["error"]["kind"], "admission_denied");
        assert_eq!(answer["error"]["denial"], "procedure_unavailable");
    }
}
