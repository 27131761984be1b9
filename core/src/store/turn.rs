use super::DeskStore;
use crate::{
    error::{DeskError, DeskResult},
    event::TurnSnapshot,
    model::{Ticket, TicketStatus, Turn, TurnStatus},
    priority::PriorityTier,
    types::{
        AreaId, CloseReasonId, CounterId, Day, OperatorId, PersonId, ProcedureId, TicketId,
        Timestamp, TurnId,
    },
};
use rusqlite::{params, OptionalExtension};

/// Turn columns plus the owning ticket's priority. Keep in sync with `turn_row`.
const TURN_SELECT: &str = "SELECT t.turn_id, t.ticket_id, t.procedure_id, t.area_id,
        t.visible_number, t.turn_day, t.counter_id, t.operator_id, t.status,
        k.priority, t.created_at, t.called_at, t.started_at, t.finished_at,
        t.close_reason_id, t.consult_priority, t.notes
    FROM turn t JOIN ticket k ON k.ticket_id = t.ticket_id";

/// Queue order: highest tier first, then arrival.
const QUEUE_ORDER: &str = "ORDER BY k.priority DESC, t.created_at ASC, t.turn_id ASC";

/// Procedures a counter serves. With a NULL counter, or a counter without
/// restrictions, everything qualifies.
const SERVED_BY_COUNTER: &str = "(NOT EXISTS (SELECT 1 FROM counter_procedure cp
                                    WHERE cp.counter_id = ?2)
     OR EXISTS (SELECT 1 FROM counter_procedure cp
                WHERE cp.counter_id = ?2 AND cp.procedure_id = t.procedure_id))";

fn turn_row(r: &rusqlite::Row<'_>) -> rusqlite::Result<Turn> {
    Ok(Turn {
        turn_id: r.get(0)?,
        ticket_id: r.get(1)?,
        procedure_id: r.get(2)?,
        area_id: r.get(3)?,
        visible_number: r.get(4)?,
        turn_day: r.get(5)?,
        counter_id: r.get(6)?,
        operator_id: r.get(7)?,
        status: r.get(8)?,
        priority: r.get(9)?,
        created_at: r.get(10)?,
        called_at: r.get(11)?,
        started_at: r.get(12)?,
        finished_at: r.get(13)?,
        close_reason_id: r.get(14)?,
        consult_priority: r.get(15)?,
        notes: r.get(16)?,
    })
}

impl DeskStore {
    // ── Sequence ───────────────────────────────────────────────────

    /// Next visible number for (area, day), starting at 1.
    /// A single upsert statement, so two connections can never read the
    /// same value.
    pub fn allocate_visible_number(&self, area_id: AreaId, day: Day) -> DeskResult<u32> {
        let number: u32 = self.conn.query_row(
            "INSERT INTO turn_sequence (area_id, turn_day, last_number) VALUES (?1, ?2, 1)
             ON CONFLICT(area_id, turn_day) DO UPDATE SET last_number = last_number + 1
             RETURNING last_number",
            params![area_id, day],
            |r| r.get(0),
        )?;
        log::debug!("Allocated number {number} for area {area_id} on {day}");
        Ok(number)
    }

    /// Visible numbers issued for (area, day), ascending.
    pub fn visible_numbers(&self, area_id: AreaId, day: Day) -> DeskResult<Vec<u32>> {
        let mut stmt = self.conn.prepare(
            "SELECT visible_number FROM turn WHERE area_id = ?1 AND turn_day = ?2
             ORDER BY visible_number ASC",
        )?;
        let rows = stmt.query_map(params![area_id, day], |r| r.get(0))?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    // ── Tickets ────────────────────────────────────────────────────

    pub fn insert_ticket(
        &self,
        person_id: Option<PersonId>,
        area_id: AreaId,
        priority: PriorityTier,
        created_at: Timestamp,
    ) -> DeskResult<Ticket> {
        self.conn.execute(
            "INSERT INTO ticket (person_id, area_id, priority, created_at, status)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![person_id, area_id, priority, created_at, TicketStatus::Pending],
        )?;
        Ok(Ticket {
            ticket_id: self.conn.last_insert_rowid(),
            person_id,
            area_id,
            priority,
            created_at,
            status: TicketStatus::Pending,
        })
    }

    pub fn get_ticket(&self, ticket_id: TicketId) -> DeskResult<Option<Ticket>> {
        let row = self
            .conn
            .query_row(
                "SELECT ticket_id, person_id, area_id, priority, created_at, status
                 FROM ticket WHERE ticket_id = ?1",
                params![ticket_id],
                |r| {
                    Ok(Ticket {
                        ticket_id: r.get(0)?,
                        person_id: r.get(1)?,
                        area_id: r.get(2)?,
                        priority: r.get(3)?,
                        created_at: r.get(4)?,
                        status: r.get(5)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    pub fn require_ticket(&self, ticket_id: TicketId) -> DeskResult<Ticket> {
        self.get_ticket(ticket_id)?
            .ok_or_else(|| DeskError::not_found("ticket", ticket_id))
    }

    /// Recompute a ticket's status from the turns it owns.
    pub fn refresh_ticket_status(&self, ticket_id: TicketId) -> DeskResult<TicketStatus> {
        let mut stmt = self
            .conn
            .prepare("SELECT status FROM turn WHERE ticket_id = ?1")?;
        let statuses = stmt
            .query_map(params![ticket_id], |r| r.get::<_, TurnStatus>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        let status = TicketStatus::mirror(&statuses);
        self.conn.execute(
            "UPDATE ticket SET status = ?1 WHERE ticket_id = ?2",
            params![status, ticket_id],
        )?;
        Ok(status)
    }

    // ── Turns ──────────────────────────────────────────────────────

    pub fn insert_turn(
        &self,
        ticket: &Ticket,
        procedure_id: ProcedureId,
        visible_number: u32,
        turn_day: Day,
    ) -> DeskResult<Turn> {
        self.conn.execute(
            "INSERT INTO turn (ticket_id, procedure_id, area_id, visible_number, turn_day,
                               status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                ticket.ticket_id,
                procedure_id,
                ticket.area_id,
                visible_number,
                turn_day,
                TurnStatus::Pending,
                ticket.created_at,
            ],
        )?;
        self.require_turn(self.conn.last_insert_rowid())
    }

    pub fn get_turn(&self, turn_id: TurnId) -> DeskResult<Option<Turn>> {
        let row = self
            .conn
            .query_row(
                &format!("{TURN_SELECT} WHERE t.turn_id = ?1"),
                params![turn_id],
                turn_row,
            )
            .optional()?;
        Ok(row)
    }

    pub fn require_turn(&self, turn_id: TurnId) -> DeskResult<Turn> {
        self.get_turn(turn_id)?
            .ok_or_else(|| DeskError::not_found("turn", turn_id))
    }

    /// The person's oldest active turn in the area, if any.
    pub fn active_turn_for(&self, person_id: PersonId, area_id: AreaId) -> DeskResult<Option<Turn>> {
        let row = self
            .conn
            .query_row(
                &format!(
                    "{TURN_SELECT}
                     WHERE k.person_id = ?1 AND t.area_id = ?2
                       AND t.status IN ('pending', 'called', 'in_progress')
                     ORDER BY t.created_at ASC, t.turn_id ASC LIMIT 1"
                ),
                params![person_id, area_id],
                turn_row,
            )
            .optional()?;
        Ok(row)
    }

    /// Turns the person took in the area on `day`, whatever became of them.
    pub fn turns_on_day_for(&self, person_id: PersonId, area_id: AreaId, day: Day) -> DeskResult<u32> {
        let n: u32 = self.conn.query_row(
            "SELECT COUNT(*) FROM turn t JOIN ticket k ON k.ticket_id = t.ticket_id
             WHERE k.person_id = ?1 AND t.area_id = ?2 AND t.turn_day = ?3",
            params![person_id, area_id, day],
            |r| r.get(0),
        )?;
        Ok(n)
    }

    // ── Queue ──────────────────────────────────────────────────────

    /// Head of the area's pending queue, optionally narrowed to what a
    /// counter serves.
    pub fn next_pending(&self, area_id: AreaId, counter_id: Option<CounterId>) -> DeskResult<Option<Turn>> {
        let row = self
            .conn
            .query_row(
                &format!(
                    "{TURN_SELECT}
                     WHERE t.area_id = ?1 AND t.status = 'pending' AND {SERVED_BY_COUNTER}
                     {QUEUE_ORDER} LIMIT 1"
                ),
                params![area_id, counter_id],
                turn_row,
            )
            .optional()?;
        Ok(row)
    }

    /// Pending turns of the area in the order they will be called.
    pub fn pending_queue(&self, area_id: AreaId) -> DeskResult<Vec<Turn>> {
        let mut stmt = self.conn.prepare(&format!(
            "{TURN_SELECT} WHERE t.area_id = ?1 AND t.status = 'pending' {QUEUE_ORDER}"
        ))?;
        let rows = stmt.query_map(params![area_id], turn_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Pending turns in the same area that the queue would pick first.
    pub fn waiting_ahead(&self, turn: &Turn) -> DeskResult<u32> {
        let n: u32 = self.conn.query_row(
            "SELECT COUNT(*) FROM turn t JOIN ticket k ON k.ticket_id = t.ticket_id
             WHERE t.area_id = ?1 AND t.status = 'pending' AND t.turn_id <> ?2
               AND (k.priority > ?3
                    OR (k.priority = ?3 AND (t.created_at < ?4
                        OR (t.created_at = ?4 AND t.turn_id < ?2))))",
            params![turn.area_id, turn.turn_id, turn.priority, turn.created_at],
            |r| r.get(0),
        )?;
        Ok(n)
    }

    // ── Compare-and-swap transitions ───────────────────────────────
    //
    // Each returns true when this connection won the row. False means
    // the status was no longer the expected one.

    pub fn claim_pending(
        &self,
        turn_id: TurnId,
        operator_id: OperatorId,
        counter_id: Option<CounterId>,
        at: Timestamp,
    ) -> DeskResult<bool> {
        let n = self.conn.execute(
            "UPDATE turn SET status = 'called', operator_id = ?2, counter_id = ?3, called_at = ?4
             WHERE turn_id = ?1 AND status = 'pending'",
            params![turn_id, operator_id, counter_id, at],
        )?;
        Ok(n == 1)
    }

    pub fn start_called(&self, turn_id: TurnId, at: Timestamp) -> DeskResult<bool> {
        let n = self.conn.execute(
            "UPDATE turn SET status = 'in_progress', started_at = ?2
             WHERE turn_id = ?1 AND status = 'called'",
            params![turn_id, at],
        )?;
        Ok(n == 1)
    }

    pub fn complete_in_progress(
        &self,
        turn_id: TurnId,
        close_reason_id: Option<CloseReasonId>,
        consult_priority: i16,
        notes: Option<&str>,
        at: Timestamp,
    ) -> DeskResult<bool> {
        let n = self.conn.execute(
            "UPDATE turn SET status = 'completed', finished_at = ?2, close_reason_id = ?3,
                             consult_priority = ?4, notes = ?5
             WHERE turn_id = ?1 AND status = 'in_progress'",
            params![turn_id, at, close_reason_id, consult_priority, notes],
        )?;
        Ok(n == 1)
    }

    pub fn mark_no_show(&self, turn_id: TurnId, at: Timestamp) -> DeskResult<bool> {
        let n = self.conn.execute(
            "UPDATE turn SET status = 'no_show', finished_at = ?2
             WHERE turn_id = ?1 AND status IN ('pending', 'called')",
            params![turn_id, at],
        )?;
        Ok(n == 1)
    }

    /// Return a called or in-progress turn to the pool, unassigned.
    /// It keeps its creation time, so it regains its queue position.
    pub fn requeue_derived(&self, turn_id: TurnId) -> DeskResult<bool> {
        let n = self.conn.execute(
            "UPDATE turn SET status = 'pending', operator_id = NULL, counter_id = NULL,
                             called_at = NULL, started_at = NULL
             WHERE turn_id = ?1 AND status IN ('called', 'in_progress')",
            params![turn_id],
        )?;
        Ok(n == 1)
    }

    // ── Expiry ─────────────────────────────────────────────────────

    /// Pending or called turns of the area issued before `today`.
    pub fn stale_turn_ids(&self, area_id: AreaId, today: Day) -> DeskResult<Vec<TurnId>> {
        let mut stmt = self.conn.prepare(
            "SELECT turn_id FROM turn
             WHERE area_id = ?1 AND turn_day < ?2 AND status IN ('pending', 'called')
             ORDER BY turn_id ASC",
        )?;
        let rows = stmt.query_map(params![area_id, today], |r| r.get(0))?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Bulk no-show for stale turns. Returns how many rows changed.
    pub fn expire_stale(&self, area_id: AreaId, today: Day, at: Timestamp) -> DeskResult<usize> {
        let n = self.conn.execute(
            "UPDATE turn SET status = 'no_show', finished_at = ?3
             WHERE area_id = ?1 AND turn_day < ?2 AND status IN ('pending', 'called')",
            params![area_id, today, at],
        )?;
        Ok(n)
    }

    /// Tickets owning any of the given turns.
    pub fn tickets_of(&self, turn_ids: &[TurnId]) -> DeskResult<Vec<TicketId>> {
        let mut out = Vec::new();
        let mut stmt = self
            .conn
            .prepare("SELECT ticket_id FROM turn WHERE turn_id = ?1")?;
        for turn_id in turn_ids {
            let ticket_id: TicketId = stmt.query_row(params![turn_id], |r| r.get(0))?;
            if !out.contains(&ticket_id) {
                out.push(ticket_id);
            }
        }
        Ok(out)
    }

    // ── Public view ────────────────────────────────────────────────

    pub fn turn_snapshot(&self, turn_id: TurnId) -> DeskResult<TurnSnapshot> {
        let row = self
            .conn
            .query_row(
                "SELECT t.turn_id, t.visible_number, t.status, p.given_name, p.family_name,
                        t.procedure_id, pr.name, t.area_id, a.name, t.counter_id, c.name,
                        k.priority, t.created_at
                 FROM turn t
                 JOIN ticket k ON k.ticket_id = t.ticket_id
                 JOIN procedure pr ON pr.procedure_id = t.procedure_id
                 JOIN area a ON a.area_id = t.area_id
                 LEFT JOIN person p ON p.person_id = k.person_id
                 LEFT JOIN counter c ON c.counter_id = t.counter_id
                 WHERE t.turn_id = ?1",
                params![turn_id],
                |r| {
                    let visible_number: u32 = r.get(1)?;
                    let given: Option<String> = r.get(3)?;
                    let family: Option<String> = r.get(4)?;
                    Ok(TurnSnapshot {
                        turn_id: r.get(0)?,
                        visible_number,
                        status: r.get(2)?,
                        display_name: display_name(given, family, visible_number),
                        procedure_id: r.get(5)?,
                        procedure_name: r.get(6)?,
                        area_id: r.get(7)?,
                        area_name: r.get(8)?,
                        counter_id: r.get(9)?,
                        counter_name: r.get(10)?,
                        priority: r.get(11)?,
                        created_at: r.get(12)?,
                    })
                },
            )
            .optional()?;
        row.ok_or_else(|| DeskError::not_found("turn", turn_id))
    }
}

/// What the monitor shows for a turn: the person's name, or the number
/// when the turn was issued without identity.
pub(super) fn display_name(given: Option<String>, family: Option<String>, number: u32) -> String {
    let name = format!(
        "{} {}",
        given.unwrap_or_default(),
        family.unwrap_or_default()
    );
    let name = name.trim();
    if name.is_empty() {
        format!("N° {number}")
    } else {
        name.to_string()
    }
}
