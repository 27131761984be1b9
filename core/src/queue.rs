//! Queue selection and the operator's "call next" action.
//!
//! ORDER: highest ticket tier first, then earliest creation time, then
//! lowest turn id. Selection reads outside any transaction; the claim
//! that follows re-validates PENDING with a compare-and-swap, so a
//! stale pick surfaces as ConcurrencyConflict and never as a double claim.

use crate::{
    engine::DeskEngine,
    error::DeskResult,
    lifecycle::{check_attention_hours, check_counter},
    model::{Turn, TurnStatus},
    types::{AreaId, CounterId, OperatorId, TurnId},
};

impl DeskEngine {
    /// The pending turn the area would call next, if any.
    pub fn next(&self, area_id: AreaId) -> DeskResult<Option<Turn>> {
        self.store.next_pending(area_id, None)
    }

    /// Like `next`, narrowed to the procedures a counter serves.
    pub fn next_for_counter(&self, area_id: AreaId, counter_id: CounterId) -> DeskResult<Option<Turn>> {
        self.store.next_pending(area_id, Some(counter_id))
    }

    /// Pending turns of the area in call order.
    pub fn pending_queue(&self, area_id: AreaId) -> DeskResult<Vec<Turn>> {
        self.store.pending_queue(area_id)
    }

    /// How many pending turns will be called before this one.
    /// Zero for a turn that is no longer pending.
    pub fn waiting_ahead(&self, turn_id: TurnId) -> DeskResult<u32> {
        let turn = self.store.require_turn(turn_id)?;
        if turn.status != TurnStatus::Pending {
            return Ok(0);
        }
        self.store.waiting_ahead(&turn)
    }

    /// Pick the head of the queue and claim it.
    ///
    /// `Ok(None)` means nothing is waiting. `ConcurrencyConflict` means
    /// another operator claimed the picked turn first; the caller should
    /// simply call again.
    pub fn next_and_claim(
        &self,
        area_id: AreaId,
        operator_id: OperatorId,
        counter_id: Option<CounterId>,
    ) -> DeskResult<Option<Turn>> {
        let now = self.clock().now();
        let config = self.store.area_config(area_id)?;
        self.store.require_area(area_id)?;
        self.store.require_active_operator(operator_id)?;
        if let Some(cid) = counter_id {
            check_counter(&self.store, cid, area_id, operator_id)?;
        }

        let Some(candidate) = self.store.next_pending(area_id, counter_id)? else {
            log::debug!("Area {area_id}: nothing pending for operator {operator_id}");
            return Ok(None);
        };
        check_attention_hours(&config, candidate.turn_id, now)?;

        let turn = self.store.with_write_tx(|s| {
            self.claim_in_tx(s, candidate.turn_id, operator_id, counter_id, now)
        });
        match turn {
            Ok(turn) => {
                self.after_claim(&turn, operator_id);
                Ok(Some(turn))
            }
            Err(e) => {
                if e.is_retryable() {
                    log::warn!(
                        "Operator {operator_id} lost turn {} to another operator",
                        candidate.turn_id
                    );
                }
                Err(e)
            }
        }
    }
}
