//! The desk engine: every operator and kiosk action enters here.
//!
//! OPERATION SHAPE (every mutating operation, in this order):
//!   1. Read the area's config fresh from the store.
//!   2. Validate inputs that do not depend on racing rows.
//!   3. Open a write transaction, re-read the rows it mutates, apply
//!      compare-and-swap updates, append ledger rows.
//!   4. Commit.
//!   5. Emit the lifecycle event to the Notifier.
//!
//! RULES:
//!   - Config is never cached across operations.
//!   - Events go out only after commit and never fail an operation.
//!   - Time comes only from the Clock.
//!   - The engine never runs SQL; the store does.

use crate::{
    clock::{Clock, FixedClock},
    error::DeskResult,
    event::{EventEnvelope, Notifier, RecordingNotifier, TurnEvent, TurnSnapshot},
    identity::{FixtureResolver, IdentityResolver},
    model::{BoardEntry, CallEvent, DerivationRecord, Turn, TurnStatus},
    store::DeskStore,
    types::{AreaId, TurnId},
};
use std::sync::Arc;

/// Call board size when the caller does not ask for one.
pub const DEFAULT_BOARD_LIMIT: u32 = 5;

pub struct DeskEngine {
    pub store: DeskStore,
    clock:     Arc<dyn Clock>,
    resolver:  Arc<dyn IdentityResolver>,
    notifier:  Arc<dyn Notifier>,
}

impl DeskEngine {
    pub fn new(
        store: DeskStore,
        clock: Arc<dyn Clock>,
        resolver: Arc<dyn IdentityResolver>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            store,
            clock,
            resolver,
            notifier,
        }
    }

    /// Build a test engine: migrated in-memory store, pinned clock,
    /// fixture directory, and a notifier that records everything.
    pub fn build_test(
        clock: Arc<FixedClock>,
        resolver: FixtureResolver,
    ) -> DeskResult<(Self, Arc<RecordingNotifier>)> {
        let store = DeskStore::in_memory()?;
        store.migrate()?;
        let notifier = Arc::new(RecordingNotifier::new());
        let engine = Self::new(store, clock, Arc::new(resolver), notifier.clone());
        Ok((engine, notifier))
    }

    /// A second engine over a fresh connection to the same database,
    /// sharing clock, resolver and notifier. One per concurrent actor.
    pub fn fork(&self) -> DeskResult<Self> {
        self.fork_with_clock(self.clock.clone())
    }

    /// Like `fork`, with the actor keeping its own time. Simulated
    /// operators work in parallel, so each needs a clock of its own.
    pub fn fork_with_clock(&self, clock: Arc<dyn Clock>) -> DeskResult<Self> {
        Ok(Self {
            store:    self.store.reopen()?,
            clock,
            resolver: self.resolver.clone(),
            notifier: self.notifier.clone(),
        })
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    pub(crate) fn resolver(&self) -> &dyn IdentityResolver {
        self.resolver.as_ref()
    }

    /// Hand an event to the notifier. Runs after commit.
    pub(crate) fn emit(&self, event: TurnEvent) {
        let envelope = EventEnvelope::new(event, self.clock.now());
        self.notifier.notify(&envelope);
    }

    /// Snapshot for an event, or None if the read fails. A failed read
    /// only costs the event; the committed operation stands.
    pub(crate) fn snapshot_for_event(&self, turn_id: TurnId) -> Option<TurnSnapshot> {
        match self.store.turn_snapshot(turn_id) {
            Ok(s) => Some(s),
            Err(e) => {
                log::warn!("No event for turn {turn_id}: snapshot failed: {e}");
                None
            }
        }
    }

    // ── Queries (the poll path) ────────────────────────────────────

    pub fn turn(&self, turn_id: TurnId) -> DeskResult<Turn> {
        self.store.require_turn(turn_id)
    }

    pub fn snapshot(&self, turn_id: TurnId) -> DeskResult<TurnSnapshot> {
        self.store.turn_snapshot(turn_id)
    }

    /// Today's latest announcements for the area's monitor.
    pub fn call_board(&self, area_id: AreaId, limit: u32) -> DeskResult<Vec<BoardEntry>> {
        self.store.call_board(area_id, self.clock.today(), limit)
    }

    pub fn call_events(&self, turn_id: TurnId) -> DeskResult<Vec<CallEvent>> {
        self.store.call_events(turn_id)
    }

    pub fn derivations(&self, turn_id: TurnId) -> DeskResult<Vec<DerivationRecord>> {
        self.store.derivations(turn_id)
    }

    /// True when a called turn has gone unanswered past the area's call
    /// timeout. The desk never recalls on its own; this tells the operator
    /// when a recall is due.
    pub fn call_overdue(&self, turn_id: TurnId) -> DeskResult<bool> {
        let turn = self.store.require_turn(turn_id)?;
        if turn.status != TurnStatus::Called {
            return Ok(false);
        }
        let config = self.store.area_config(turn.area_id)?;
        let Some(last) = self.store.last_call_at(turn_id)? else {
            return Ok(false);
        };
        let timeout = chrono::Duration::seconds(i64::from(config.call_timeout_secs));
        Ok(self.clock.now() - last >= timeout)
    }
}
