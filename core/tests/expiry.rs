//! Expiry of stale turns from earlier days.

mod common;

use chrono::Duration;
use common::*;
use turnero_core::{
    config::AreaConfig,
    event::TurnEvent,
    model::{TicketStatus, TurnStatus},
};

fn next_morning() -> chrono::NaiveDateTime {
    at(9, 0) + Duration::days(1)
}

#[test]
fn first_issue_of_the_day_expires_yesterdays_pending_turns() {
    let office = office(AreaConfig {
        expire_stale_turns: true,
        ..relaxed()
    });
    let stale = office.walk_in();
    let called = office.walk_in();
    office.engine.claim(called.turn_id, OP_A, None).unwrap();

    office.clock.set(next_morning());
    office.events.clear();
    let fresh = office.issue(None).unwrap().turn;

    assert_eq!(office.engine.turn(stale.turn_id).unwrap().status, TurnStatus::NoShow);
    assert_eq!(office.engine.turn(called.turn_id).unwrap().status, TurnStatus::NoShow);
    let ticket = office.engine.store.get_ticket(stale.ticket_id).unwrap().unwrap();
    assert_eq!(ticket.status, TicketStatus::Cancelled);

    // Numbering restarts and the new turn is alone in the queue.
    assert_eq!(fresh.visible_number, 1);
    assert_eq!(office.engine.next(office.area).unwrap().unwrap().turn_id, fresh.turn_id);

    assert_eq!(
        office.events.type_names(),
        vec!["turn_no_show", "turn_no_show", "turn_created"]
    );
    match &office.events.events()[0].event {
        TurnEvent::TurnNoShow { expired, .. } => assert!(*expired),
        other => panic!("unexpected event {other:?}"),
    }
}

#[test]
fn sweep_is_idempotent() {
    let office = office(relaxed());
    let stale = office.walk_in();
    let busy = office.walk_in();
    office.engine.claim(busy.turn_id, OP_A, None).unwrap();
    office.engine.start(busy.turn_id).unwrap();

    office.clock.set(next_morning());
    assert_eq!(office.engine.sweep(office.area).unwrap(), 1);
    let after_first = (
        office.engine.turn(stale.turn_id).unwrap(),
        office.engine.turn(busy.turn_id).unwrap(),
    );
    let events_after_first = office.events.events().len();

    assert_eq!(office.engine.sweep(office.area).unwrap(), 0);
    let after_second = (
        office.engine.turn(stale.turn_id).unwrap(),
        office.engine.turn(busy.turn_id).unwrap(),
    );
    assert_eq!(after_first, after_second);
    assert_eq!(office.events.events().len(), events_after_first);

    // In-progress work is never expired.
    assert_eq!(after_second.1.status, TurnStatus::InProgress);
}

#[test]
fn todays_turns_are_left_alone() {
    let office = office(relaxed());
    let turn = office.walk_in();
    assert_eq!(office.engine.sweep(office.area).unwrap(), 0);
    assert_eq!(office.engine.turn(turn.turn_id).unwrap().status, TurnStatus::Pending);
}

#[test]
fn admission_skips_the_sweep_when_disabled() {
    let office = office(AreaConfig {
        expire_stale_turns: false,
        ..relaxed()
    });
    let stale = office.walk_in();

    office.clock.set(next_morning());
    office.issue(None).unwrap();
    assert_eq!(office.engine.turn(stale.turn_id).unwrap().status, TurnStatus::Pending);

    assert_eq!(office.engine.sweep(office.area).unwrap(), 1);
    assert_eq!(office.engine.turn(stale.turn_id).unwrap().status, TurnStatus::NoShow);
}

#[test]
fn sweep_only_touches_its_own_area() {
    let office = office(relaxed());
    let store = &office.engine.store;
    let other_area = store.insert_area("Rentas").unwrap();
    store.upsert_area_config(other_area, &relaxed()).unwrap();
    let other_procedure = store.insert_procedure(other_area, "Fee payment").unwrap();
    let elsewhere = office
        .engine
        .issue(&turnero_core::IssueRequest {
            area_id: other_area,
            procedure_id: other_procedure,
            ..Default::default()
        })
        .unwrap()
        .turn;

    office.clock.set(next_morning());
    assert_eq!(office.engine.sweep(office.area).unwrap(), 0);
    assert_eq!(office.engine.turn(elsewhere.turn_id).unwrap().status, TurnStatus::Pending);
    assert_eq!(office.engine.sweep(other_area).unwrap(), 1);
}
