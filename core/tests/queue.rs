//! Queue selection order, counter restrictions, waiting position, call board.

mod common;

use chrono::Duration;
use common::*;
use turnero_core::{
    config::AreaConfig,
    priority::{ManualFlags, PriorityTier},
    IssueRequest,
};

#[test]
fn empty_queue() {
    let office = office(relaxed());
    assert!(office.engine.next(office.area).unwrap().is_none());
    assert!(office
        .engine
        .next_and_claim(office.area, OP_A, Some(office.counter))
        .unwrap()
        .is_none());
}

#[test]
fn higher_tier_first_then_arrival() {
    let office = office(AreaConfig {
        identity_required: false,
        allow_multiple_active: true,
        ..AreaConfig::always_open()
    });
    let early = office.walk_in();
    office.clock.advance(Duration::minutes(1));
    let senior = office.issue(Some(ELSA)).unwrap().turn;
    office.clock.advance(Duration::minutes(1));
    let flagged = office
        .issue_with(
            None,
            ManualFlags {
                expecting: false,
                reduced_mobility: true,
            },
        )
        .unwrap()
        .turn;
    let late = office.walk_in();
    assert_eq!(senior.priority, PriorityTier::Senior);
    assert_eq!(flagged.priority, PriorityTier::ReducedMobility);

    let order: Vec<_> = office
        .engine
        .pending_queue(office.area)
        .unwrap()
        .iter()
        .map(|t| t.turn_id)
        .collect();
    assert_eq!(order, vec![flagged.turn_id, senior.turn_id, early.turn_id, late.turn_id]);

    for expected in [flagged.turn_id, senior.turn_id, early.turn_id, late.turn_id] {
        let next = office.engine.next(office.area).unwrap().unwrap();
        assert_eq!(next.turn_id, expected);
        let claimed = office.engine.next_and_claim(office.area, OP_A, None).unwrap().unwrap();
        assert_eq!(claimed.turn_id, expected);
    }
}

#[test]
fn same_instant_falls_back_to_issue_order() {
    let office = office(relaxed());
    let a = office.issue(None).unwrap().turn;
    let b = office.issue(None).unwrap().turn;
    assert_eq!(a.created_at, b.created_at);
    assert_eq!(office.engine.next(office.area).unwrap().unwrap().turn_id, a.turn_id);
}

#[test]
fn restricted_counter_skips_procedures_it_does_not_serve() {
    let office = office(relaxed());
    let store = &office.engine.store;
    let counter = store.insert_counter(office.area, "M2", None).unwrap();
    store.restrict_counter(counter, office.other_procedure).unwrap();

    let renewal = office.walk_in();
    office.clock.advance(Duration::minutes(1));
    let first_license = office
        .engine
        .issue(&IssueRequest {
            area_id: office.area,
            procedure_id: office.other_procedure,
            ..IssueRequest::default()
        })
        .unwrap()
        .turn;

    assert_eq!(office.engine.next(office.area).unwrap().unwrap().turn_id, renewal.turn_id);
    assert_eq!(
        office.engine.next_for_counter(office.area, counter).unwrap().unwrap().turn_id,
        first_license.turn_id
    );
    let claimed = office
        .engine
        .next_and_claim(office.area, OP_A, Some(counter))
        .unwrap()
        .unwrap();
    assert_eq!(claimed.turn_id, first_license.turn_id);
    assert!(office
        .engine
        .next_and_claim(office.area, OP_A, Some(counter))
        .unwrap()
        .is_none());
    // The unrestricted counter still sees the renewal.
    assert_eq!(
        office.engine.next_for_counter(office.area, office.counter).unwrap().unwrap().turn_id,
        renewal.turn_id
    );
}

#[test]
fn waiting_ahead_counts_who_goes_first() {
    let office = office(AreaConfig {
        identity_required: false,
        ..AreaConfig::always_open()
    });
    let first = office.walk_in();
    let second = office.walk_in();
    office.clock.advance(Duration::minutes(1));
    let senior = office.issue(Some(ELSA)).unwrap().turn;

    assert_eq!(office.engine.waiting_ahead(senior.turn_id).unwrap(), 0);
    assert_eq!(office.engine.waiting_ahead(first.turn_id).unwrap(), 1);
    assert_eq!(office.engine.waiting_ahead(second.turn_id).unwrap(), 2);

    office.engine.next_and_claim(office.area, OP_A, None).unwrap();
    assert_eq!(office.engine.waiting_ahead(senior.turn_id).unwrap(), 0);
    assert_eq!(office.engine.waiting_ahead(second.turn_id).unwrap(), 1);
}

#[test]
fn call_board_shows_latest_calls_first() {
    let office = office(AreaConfig {
        identity_required: false,
        ..AreaConfig::always_open()
    });
    let anonymous = office.walk_in();
    office.clock.advance(Duration::minutes(1));
    let named = office.issue(Some(JUAN)).unwrap().turn;

    office.clock.set(at(9, 30));
    office.engine.claim(anonymous.turn_id, OP_A, Some(office.counter)).unwrap();
    office.clock.set(at(9, 31));
    office.engine.claim(named.turn_id, OP_B, None).unwrap();
    office.clock.set(at(9, 32));
    office.engine.recall(anonymous.turn_id, OP_A).unwrap();

    let board = office.engine.call_board(office.area, 5).unwrap();
    assert_eq!(board.len(), 3);
    assert_eq!(board[0].turn_id, anonymous.turn_id);
    assert_eq!(board[0].display_name, format!("N° {}", anonymous.visible_number));
    assert_eq!(board[0].counter_name.as_deref(), Some("M1"));
    assert_eq!(board[0].called_at, at(9, 32));
    assert_eq!(board[1].display_name, "JUAN GOMEZ");
    assert_eq!(board[1].counter_name, None);
    assert_eq!(board[1].procedure_name, "Renewal");

    assert_eq!(office.engine.call_board(office.area, 1).unwrap().len(), 1);
}
