//! Seeded synthetic office day.
//!
//! A kiosk issues requests first; then every operator runs on its own
//! thread with its own connection, calling `next_and_claim` until its
//! queue is empty. Lost claim races are retried, as a real desk would.
//! Operators work side by side, so each keeps its own clock, starting
//! when the kiosk closes.

use crate::{
    people,
    rng::{ActorRng, KIOSK_SLOT, OPERATOR_BASE, PEOPLE_SLOT},
};
use anyhow::{anyhow, Result};
use chrono::{Duration, NaiveDate, NaiveDateTime};
use std::{collections::BTreeMap, sync::Arc, thread};
use turnero_core::{
    clock::{Clock, FixedClock},
    config::{AreaConfig, AreaSetup, CloseReasonSetup, CounterSetup, OfficeSetup, OperatorSetup},
    event::RecordingNotifier,
    identity::{FixturePerson, FixtureResolver},
    priority::ManualFlags,
    store::DeskStore,
    types::{AreaId, CloseReasonId, CounterId, OperatorId},
    DeskEngine, FinishRequest, IssueRequest,
};

pub struct SimOptions {
    pub seed: u64,
    pub requests: usize,
    pub people: usize,
    pub db: String,
    pub day: NaiveDate,
}

#[derive(Debug, Default)]
pub struct OperatorTally {
    pub operator_id: OperatorId,
    pub served: usize,
    pub no_shows: usize,
    pub derived: usize,
    pub recalls: usize,
    pub conflicts: usize,
    pub stopped_by: Option<String>,
}

#[derive(Debug, Default)]
pub struct SimReport {
    pub issued: usize,
    pub repeats: usize,
    pub denials: BTreeMap<&'static str, usize>,
    pub operators: Vec<OperatorTally>,
    pub left_pending: usize,
    pub numbering_contiguous: bool,
    pub events: BTreeMap<&'static str, usize>,
}

/// Two areas, one counter per operator, derivation on in the first area.
pub fn demo_setup(operators: usize) -> OfficeSetup {
    let operators: Vec<OperatorSetup> = (1..=operators.max(1) as i64)
        .map(|id| OperatorSetup {
            operator_id: id,
            display_name: format!("Operator {id}"),
        })
        .collect();
    let counters_for = |area_index: usize| -> Vec<CounterSetup> {
        operators
            .iter()
            .enumerate()
            .filter(|(i, _)| i % 2 == area_index)
            .map(|(_, op)| CounterSetup {
                name: format!("M{}", op.operator_id),
                procedures: Vec::new(),
                operator_id: Some(op.operator_id),
            })
            .collect()
    };
    OfficeSetup {
        close_reasons: ["Resolved", "Missing documents", "Referred elsewhere"]
            .iter()
            .map(|name| CloseReasonSetup {
                name: name.to_string(),
                description: None,
            })
            .collect(),
        areas: vec![
            AreaSetup {
                name: "Licencias".into(),
                config: AreaConfig {
                    derivation_allowed: true,
                    ..AreaConfig::default()
                },
                procedures: vec!["Renewal".into(), "First license".into(), "Duplicate".into()],
                counters: counters_for(0),
            },
            AreaSetup {
                name: "Rentas".into(),
                config: AreaConfig {
                    identity_required: false,
                    ..AreaConfig::default()
                },
                procedures: vec!["Fee payment".into(), "Inquiry".into()],
                counters: counters_for(1),
            },
        ],
        operators,
    }
}

/// Where each operator sits: the first counter bound to them, else the
/// first area, serving from no particular counter.
fn seat_operators(setup: &OfficeSetup, store: &DeskStore) -> Result<Vec<(OperatorId, AreaId, Option<CounterId>)>> {
    let areas = store.areas()?;
    let first_area = areas
        .first()
        .map(|a| a.area_id)
        .ok_or_else(|| anyhow!("setup has no areas"))?;
    let mut seats = Vec::new();
    for op in &setup.operators {
        let mut seat = (op.operator_id, first_area, None);
        'search: for area in &setup.areas {
            for counter in &area.counters {
                if counter.operator_id == Some(op.operator_id) {
                    let area_id = areas
                        .iter()
                        .find(|a| a.name == area.name)
                        .map(|a| a.area_id)
                        .ok_or_else(|| anyhow!("area {} missing after setup", area.name))?;
                    let counter_id = store.counter_named(area_id, &counter.name)?;
                    seat = (op.operator_id, area_id, counter_id);
                    break 'search;
                }
            }
        }
        seats.push(seat);
    }
    Ok(seats)
}

pub fn run(opts: &SimOptions, setup: &OfficeSetup) -> Result<SimReport> {
    let store = DeskStore::open(&opts.db)?;
    store.migrate()?;
    store.apply_setup(setup)?;

    let opening: NaiveDateTime = opts
        .day
        .and_hms_opt(7, 45, 0)
        .ok_or_else(|| anyhow!("invalid opening time"))?;
    let clock = Arc::new(FixedClock::new(opening));

    let mut people_rng = ActorRng::new(opts.seed, PEOPLE_SLOT, "people");
    let population = people::generate(&mut people_rng, opts.people.max(1), opts.day);
    let resolver = FixtureResolver::from_people(&population);
    let notifier = Arc::new(RecordingNotifier::new());
    let engine = DeskEngine::new(store, clock.clone(), Arc::new(resolver), notifier.clone());

    let mut report = SimReport::default();
    run_kiosk(&engine, &clock, opts, &population, &mut report)?;

    let seats = seat_operators(setup, &engine.store)?;
    let all_ops: Vec<OperatorId> = seats.iter().map(|s| s.0).collect();
    let reasons: Vec<CloseReasonId> = engine
        .store
        .close_reasons()?
        .iter()
        .map(|r| r.close_reason_id)
        .collect();

    let shift_start = clock.now();
    let mut handles = Vec::new();
    for (index, (operator_id, area_id, counter_id)) in seats.into_iter().enumerate() {
        let clock = Arc::new(FixedClock::new(shift_start));
        let desk = engine.fork_with_clock(clock.clone())?;
        let others: Vec<OperatorId> = all_ops.iter().copied().filter(|o| *o != operator_id).collect();
        let reasons = reasons.clone();
        let mut rng = ActorRng::new(
            opts.seed,
            OPERATOR_BASE + index as u64,
            format!("operator-{operator_id}"),
        );
        let handle = thread::Builder::new()
            .name(rng.name.clone())
            .spawn(move || {
                run_operator(&desk, &clock, &mut rng, operator_id, area_id, counter_id, &others, &reasons)
            })?;
        handles.push(handle);
    }
    for handle in handles {
        let tally = handle
            .join()
            .map_err(|_| anyhow!("operator thread panicked"))??;
        report.operators.push(tally);
    }

    let today = clock.today();
    report.numbering_contiguous = true;
    for area in engine.store.areas()? {
        report.left_pending += engine.pending_queue(area.area_id)?.len();
        let numbers = engine.store.visible_numbers(area.area_id, today)?;
        let expected: Vec<u32> = (1..=numbers.len() as u32).collect();
        if numbers != expected {
            log::warn!("Area {} numbering has gaps: {numbers:?}", area.name);
            report.numbering_contiguous = false;
        }
    }
    for name in notifier.type_names() {
        *report.events.entry(name).or_default() += 1;
    }
    Ok(report)
}

fn run_kiosk(
    engine: &DeskEngine,
    clock: &FixedClock,
    opts: &SimOptions,
    population: &[FixturePerson],
    report: &mut SimReport,
) -> Result<()> {
    let mut rng = ActorRng::new(opts.seed, KIOSK_SLOT, "kiosk");
    let areas = engine.store.areas()?;
    let mut menu = Vec::new();
    for area in &areas {
        for procedure in engine.store.procedures(area.area_id)? {
            menu.push((area.area_id, procedure.procedure_id));
        }
    }
    if menu.is_empty() {
        return Err(anyhow!("setup offers no procedures"));
    }

    for _ in 0..opts.requests {
        clock.advance(Duration::seconds(5 + rng.next_u64_below(40) as i64));
        let Some(&(area_id, procedure_id)) = rng.pick(&menu) else {
            continue;
        };
        let identity_number = if rng.chance(0.05) {
            None
        } else {
            rng.pick(population).map(|p| p.identity_number.clone())
        };
        let req = IssueRequest {
            area_id,
            procedure_id,
            identity_number,
            flags: ManualFlags {
                expecting: rng.chance(0.03),
                reduced_mobility: rng.chance(0.03),
            },
        };
        match engine.issue(&req) {
            Ok(issued) if issued.created => report.issued += 1,
            Ok(_) => report.repeats += 1,
            Err(e) => *report.denials.entry(e.kind()).or_default() += 1,
        }
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn run_operator(
    desk: &DeskEngine,
    clock: &FixedClock,
    rng: &mut ActorRng,
    operator_id: OperatorId,
    area_id: AreaId,
    counter_id: Option<CounterId>,
    others: &[OperatorId],
    reasons: &[CloseReasonId],
) -> Result<OperatorTally> {
    let mut tally = OperatorTally {
        operator_id,
        ..OperatorTally::default()
    };
    let derivation_allowed = desk.store.area_config(area_id)?.derivation_allowed;

    loop {
        let turn = match desk.next_and_claim(area_id, operator_id, counter_id) {
            Ok(Some(turn)) => turn,
            Ok(None) => break,
            Err(e) if e.is_retryable() => {
                tally.conflicts += 1;
                continue;
            }
            Err(e) => {
                log::warn!("{}: stopping: {e}", rng.name);
                tally.stopped_by = Some(e.kind().to_string());
                break;
            }
        };
        clock.advance(Duration::seconds(10 + rng.next_u64_below(20) as i64));

        if rng.chance(0.2) {
            desk.recall(turn.turn_id, operator_id)?;
            tally.recalls += 1;
        }
        if rng.chance(0.08) {
            desk.mark_no_show(turn.turn_id)?;
            tally.no_shows += 1;
            continue;
        }
        desk.start(turn.turn_id)?;
        clock.advance(Duration::seconds(60 + rng.next_u64_below(240) as i64));

        if derivation_allowed && rng.chance(0.05) {
            if let Some(&to) = rng.pick(others) {
                desk.derive(turn.turn_id, operator_id, to, Some("needs a specialist"))?;
                tally.derived += 1;
                continue;
            }
        }
        desk.finish(
            turn.turn_id,
            &FinishRequest {
                close_reason_id: rng.pick(reasons).copied(),
                consult_priority: rng.next_u64_below(3) as i16,
                notes: None,
            },
        )?;
        tally.served += 1;
    }
    Ok(tally)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn default_day_drains_every_queue_within_attention_hours() {
        let dir = tempdir().unwrap();
        let opts = SimOptions {
            seed: 42,
            requests: 120,
            people: 80,
            db: dir.path().join("sim.db").to_string_lossy().into_owned(),
            day: NaiveDate::from_ymd_opt(2026, 3, 2).unwrap(),
        };
        let report = run(&opts, &demo_setup(4)).unwrap();

        assert_eq!(report.left_pending, 0);
        assert!(report.numbering_contiguous);
        assert_eq!(report.operators.len(), 4);
        for op in &report.operators {
            assert_eq!(op.stopped_by, None, "operator {} stopped early", op.operator_id);
        }
        let closed: usize = report.operators.iter().map(|o| o.served + o.no_shows).sum();
        assert_eq!(closed, report.issued);
    }
}
