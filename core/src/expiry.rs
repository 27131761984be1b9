//! Expiry sweeper: yesterday's leftovers become no-shows.
//!
//! Runs on demand only, usually from the admission gate, so an idle area
//! costs nothing. Running it twice changes nothing the second time.

use crate::{
    engine::DeskEngine,
    error::DeskResult,
    event::TurnEvent,
    types::{AreaId, Day},
};

impl DeskEngine {
    /// Expire the area's stale turns against the clock's today.
    pub fn sweep(&self, area_id: AreaId) -> DeskResult<usize> {
        self.sweep_before(area_id, self.clock().today())
    }

    /// Turn every PENDING or CALLED turn of the area issued before `today`
    /// into NO_SHOW. Returns how many changed.
    pub fn sweep_before(&self, area_id: AreaId, today: Day) -> DeskResult<usize> {
        let now = self.clock().now();
        let expired = self.store.with_write_tx(|s| {
            let ids = s.stale_turn_ids(area_id, today)?;
            if ids.is_empty() {
                return Ok(ids);
            }
            s.expire_stale(area_id, today, now)?;
            for ticket_id in s.tickets_of(&ids)? {
                s.refresh_ticket_status(ticket_id)?;
            }
            Ok(ids)
        })?;
        if expired.is_empty() {
            return Ok(0);
        }
        log::debug!("Area {area_id}: expired {} stale turns before {today}", expired.len());
        for turn_id in &expired {
            if let Some(turn) = self.snapshot_for_event(*turn_id) {
                self.emit(TurnEvent::TurnNoShow { turn, expired: true });
            }
        }
        Ok(expired.len())
    }
}
