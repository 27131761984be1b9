//! Derivation: one operator hands a turn to another.
//!
//! The destination operator is written to the ledger for audit only. The
//! turn goes back to the area's general pool, unassigned, keeping its
//! original creation time and therefore its place in line.

use crate::{
    engine::DeskEngine,
    error::{DeskError, DeskResult, ViolatedRule},
    event::TurnEvent,
    lifecycle::invalid,
    model::{DerivationRecord, TurnStatus},
    types::{OperatorId, TurnId},
};

impl DeskEngine {
    pub fn derive(
        &self,
        turn_id: TurnId,
        from_operator_id: OperatorId,
        to_operator_id: OperatorId,
        reason: Option<&str>,
    ) -> DeskResult<DerivationRecord> {
        let now = self.clock().now();
        let reason = reason.map(str::trim).filter(|r| !r.is_empty());
        let record = self.store.with_write_tx(|s| {
            let turn = s.require_turn(turn_id)?;
            let config = s.area_config(turn.area_id)?;
            if !config.derivation_allowed {
                return Err(DeskError::violation(ViolatedRule::DerivationDisabled));
            }
            if !turn.status.can_transition(TurnStatus::Derived) {
                return Err(invalid(&turn, "derive", "called or in_progress"));
            }
            s.require_active_operator(from_operator_id)?;
            s.require_active_operator(to_operator_id)?;
            if !s.requeue_derived(turn_id)? {
                return Err(DeskError::ConcurrencyConflict { turn_id });
            }
            let record = s.append_derivation(turn_id, from_operator_id, to_operator_id, reason, now)?;
            s.refresh_ticket_status(turn.ticket_id)?;
            Ok(record)
        })?;
        log::info!(
            "Turn {turn_id} derived from operator {from_operator_id} to {to_operator_id}; back in queue"
        );
        if let Some(snapshot) = self.snapshot_for_event(turn_id) {
            self.emit(TurnEvent::TurnUpdated {
                turn: snapshot,
                change: "derived".into(),
            });
        }
        Ok(record)
    }
}
