//! Turn state machine: claim, recall, start, finish, no-show.
//!
//! Every transition is a compare-and-swap on the turn's status inside a
//! write transaction. A guard failure leaves turn and ticket untouched.

use crate::{
    config::AreaConfig,
    engine::DeskEngine,
    error::{DeskError, DeskResult, ViolatedRule},
    event::TurnEvent,
    model::{Counter, Turn, TurnStatus},
    store::DeskStore,
    types::{AreaId, CloseReasonId, CounterId, OperatorId, Timestamp, TurnId},
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FinishRequest {
    #[serde(default)]
    pub close_reason_id: Option<CloseReasonId>,
    #[serde(default)]
    pub consult_priority: i16,
    #[serde(default)]
    pub notes: Option<String>,
}

pub(crate) fn invalid(turn: &Turn, action: &'static str, expected: &str) -> DeskError {
    DeskError::InvalidTransition {
        turn_id: turn.turn_id,
        action,
        reason: format!("turn is {}, expected {expected}", turn.status),
    }
}

/// Reject a claim outside the area's attention window.
pub(crate) fn check_attention_hours(
    config: &AreaConfig,
    turn_id: TurnId,
    now: Timestamp,
) -> DeskResult<()> {
    if config.attending_at(now.time()) {
        return Ok(());
    }
    let window = config
        .attention_hours
        .map(|w| w.to_string())
        .unwrap_or_default();
    Err(DeskError::InvalidTransition {
        turn_id,
        action: "claim",
        reason: format!("outside attention hours {window}"),
    })
}

/// The counter an operator wants to call from must be usable by them in
/// this area.
pub(crate) fn check_counter(
    store: &DeskStore,
    counter_id: CounterId,
    area_id: AreaId,
    operator_id: OperatorId,
) -> DeskResult<Counter> {
    let counter = store.require_counter(counter_id)?;
    if counter.area_id != area_id {
        return Err(DeskError::violation(ViolatedRule::CounterOutsideArea));
    }
    if !counter.active {
        return Err(DeskError::violation(ViolatedRule::CounterInactive));
    }
    if counter.operator_id.is_some_and(|bound| bound != operator_id) {
        return Err(DeskError::violation(ViolatedRule::CounterBoundToOtherOperator));
    }
    Ok(counter)
}

impl DeskEngine {
    /// PENDING → CALLED for a specific turn.
    pub fn claim(
        &self,
        turn_id: TurnId,
        operator_id: OperatorId,
        counter_id: Option<CounterId>,
    ) -> DeskResult<Turn> {
        let now = self.clock().now();
        let turn = self.store.with_write_tx(|s| {
            let turn = s.require_turn(turn_id)?;
            if turn.status != TurnStatus::Pending {
                return Err(invalid(&turn, "claim", "pending"));
            }
            let config = s.area_config(turn.area_id)?;
            check_attention_hours(&config, turn_id, now)?;
            s.require_active_operator(operator_id)?;
            if let Some(cid) = counter_id {
                let counter = check_counter(s, cid, turn.area_id, operator_id)?;
                if !counter.serves(turn.procedure_id) {
                    return Err(DeskError::violation(ViolatedRule::ProcedureNotServedByCounter));
                }
            }
            self.claim_in_tx(s, turn_id, operator_id, counter_id, now)
        })?;
        self.after_claim(&turn, operator_id);
        Ok(turn)
    }

    /// Compare-and-swap claim plus its ledger entry. Caller holds the
    /// write transaction.
    pub(crate) fn claim_in_tx(
        &self,
        s: &DeskStore,
        turn_id: TurnId,
        operator_id: OperatorId,
        counter_id: Option<CounterId>,
        now: Timestamp,
    ) -> DeskResult<Turn> {
        if !s.claim_pending(turn_id, operator_id, counter_id, now)? {
            return Err(DeskError::ConcurrencyConflict { turn_id });
        }
        s.append_call_event(turn_id, operator_id, counter_id, now)?;
        let turn = s.require_turn(turn_id)?;
        s.refresh_ticket_status(turn.ticket_id)?;
        Ok(turn)
    }

    pub(crate) fn after_claim(&self, turn: &Turn, operator_id: OperatorId) {
        log::info!(
            "Turn {} (N° {}) called by operator {operator_id}",
            turn.turn_id,
            turn.visible_number
        );
        if let Some(snapshot) = self.snapshot_for_event(turn.turn_id) {
            self.emit(TurnEvent::TurnCalled {
                turn: snapshot,
                operator_id,
                recall: false,
            });
        }
    }

    /// Announce a called turn again. No state change.
    pub fn recall(&self, turn_id: TurnId, operator_id: OperatorId) -> DeskResult<Turn> {
        let now = self.clock().now();
        let turn = self.store.with_write_tx(|s| {
            let turn = s.require_turn(turn_id)?;
            if turn.status != TurnStatus::Called {
                return Err(invalid(&turn, "recall", "called"));
            }
            s.require_active_operator(operator_id)?;
            s.append_call_event(turn_id, operator_id, turn.counter_id, now)?;
            Ok(turn)
        })?;
        log::info!("Turn {turn_id} recalled by operator {operator_id}");
        if let Some(snapshot) = self.snapshot_for_event(turn_id) {
            self.emit(TurnEvent::TurnCalled {
                turn: snapshot,
                operator_id,
                recall: true,
            });
        }
        Ok(turn)
    }

    /// CALLED → IN_PROGRESS. The returned turn carries the start time.
    pub fn start(&self, turn_id: TurnId) -> DeskResult<Turn> {
        let now = self.clock().now();
        let turn = self.store.with_write_tx(|s| {
            let turn = s.require_turn(turn_id)?;
            if turn.status != TurnStatus::Called {
                return Err(invalid(&turn, "start", "called"));
            }
            if !s.start_called(turn_id, now)? {
                return Err(DeskError::ConcurrencyConflict { turn_id });
            }
            let turn = s.require_turn(turn_id)?;
            s.refresh_ticket_status(turn.ticket_id)?;
            Ok(turn)
        })?;
        log::info!("Turn {turn_id} in progress");
        if let Some(snapshot) = self.snapshot_for_event(turn_id) {
            self.emit(TurnEvent::TurnInProgress { turn: snapshot });
        }
        Ok(turn)
    }

    /// IN_PROGRESS → COMPLETED.
    pub fn finish(&self, turn_id: TurnId, req: &FinishRequest) -> DeskResult<Turn> {
        let now = self.clock().now();
        let (turn, reason_name) = self.store.with_write_tx(|s| {
            let turn = s.require_turn(turn_id)?;
            if turn.status != TurnStatus::InProgress {
                return Err(invalid(&turn, "finish", "in_progress"));
            }
            let config = s.area_config(turn.area_id)?;
            let reason = match req.close_reason_id {
                Some(id) => match s.close_reason(id)? {
                    Some(r) if r.active => Some(r),
                    _ => return Err(DeskError::not_found("close reason", id)),
                },
                None if config.close_reason_required => {
                    return Err(DeskError::violation(ViolatedRule::CloseReasonRequired));
                }
                None => None,
            };
            let notes = req
                .notes
                .as_deref()
                .map(str::trim)
                .filter(|n| !n.is_empty());
            if !s.complete_in_progress(turn_id, req.close_reason_id, req.consult_priority, notes, now)? {
                return Err(DeskError::ConcurrencyConflict { turn_id });
            }
            let turn = s.require_turn(turn_id)?;
            s.refresh_ticket_status(turn.ticket_id)?;
            Ok((turn, reason.map(|r| r.name)))
        })?;
        log::info!("Turn {turn_id} completed");
        if let Some(snapshot) = self.snapshot_for_event(turn_id) {
            self.emit(TurnEvent::TurnCompleted {
                turn: snapshot,
                close_reason: reason_name,
            });
        }
        Ok(turn)
    }

    /// PENDING or CALLED → NO_SHOW.
    pub fn mark_no_show(&self, turn_id: TurnId) -> DeskResult<Turn> {
        let now = self.clock().now();
        let turn = self.store.with_write_tx(|s| {
            let turn = s.require_turn(turn_id)?;
            if !turn.status.can_transition(TurnStatus::NoShow) {
                return Err(invalid(&turn, "mark no-show for", "pending or called"));
            }
            if !s.mark_no_show(turn_id, now)? {
                return Err(DeskError::ConcurrencyConflict { turn_id });
            }
            let turn = s.require_turn(turn_id)?;
            s.refresh_ticket_status(turn.ticket_id)?;
            Ok(turn)
        })?;
        log::info!("Turn {turn_id} marked no-show");
        if let Some(snapshot) = self.snapshot_for_event(turn_id) {
            self.emit(TurnEvent::TurnNoShow {
                turn: snapshot,
                expired: false,
            });
        }
        Ok(turn)
    }
}
