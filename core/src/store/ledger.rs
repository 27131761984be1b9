//! Append-only audit rows: call events and derivations.

use super::{turn::display_name, DeskStore};
use crate::{
    error::DeskResult,
    model::{BoardEntry, CallEvent, DerivationRecord},
    types::{AreaId, CounterId, Day, OperatorId, Timestamp, TurnId},
};
use rusqlite::{params, OptionalExtension};

impl DeskStore {
    pub fn append_call_event(
        &self,
        turn_id: TurnId,
        operator_id: OperatorId,
        counter_id: Option<CounterId>,
        at: Timestamp,
    ) -> DeskResult<CallEvent> {
        self.conn.execute(
            "INSERT INTO call_event (turn_id, operator_id, counter_id, called_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![turn_id, operator_id, counter_id, at],
        )?;
        Ok(CallEvent {
            call_event_id: self.conn.last_insert_rowid(),
            turn_id,
            operator_id,
            counter_id,
            called_at: at,
        })
    }

    /// Every announcement of a turn, oldest first.
    pub fn call_events(&self, turn_id: TurnId) -> DeskResult<Vec<CallEvent>> {
        let mut stmt = self.conn.prepare(
            "SELECT call_event_id, turn_id, operator_id, counter_id, called_at
             FROM call_event WHERE turn_id = ?1
             ORDER BY called_at ASC, call_event_id ASC",
        )?;
        let rows = stmt.query_map(params![turn_id], |r| {
            Ok(CallEvent {
                call_event_id: r.get(0)?,
                turn_id: r.get(1)?,
                operator_id: r.get(2)?,
                counter_id: r.get(3)?,
                called_at: r.get(4)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn last_call_at(&self, turn_id: TurnId) -> DeskResult<Option<Timestamp>> {
        let at: Option<Option<Timestamp>> = self
            .conn
            .query_row(
                "SELECT MAX(called_at) FROM call_event WHERE turn_id = ?1",
                params![turn_id],
                |r| r.get(0),
            )
            .optional()?;
        Ok(at.flatten())
    }

    pub fn append_derivation(
        &self,
        turn_id: TurnId,
        from_operator_id: OperatorId,
        to_operator_id: OperatorId,
        reason: Option<&str>,
        at: Timestamp,
    ) -> DeskResult<DerivationRecord> {
        self.conn.execute(
            "INSERT INTO derivation (turn_id, from_operator_id, to_operator_id, derived_at, reason)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![turn_id, from_operator_id, to_operator_id, at, reason],
        )?;
        Ok(DerivationRecord {
            derivation_id: self.conn.last_insert_rowid(),
            turn_id,
            from_operator_id,
            to_operator_id,
            derived_at: at,
            reason: reason.map(str::to_string),
        })
    }

    pub fn derivations(&self, turn_id: TurnId) -> DeskResult<Vec<DerivationRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT derivation_id, turn_id, from_operator_id, to_operator_id, derived_at, reason
             FROM derivation WHERE turn_id = ?1
             ORDER BY derived_at ASC, derivation_id ASC",
        )?;
        let rows = stmt.query_map(params![turn_id], |r| {
            Ok(DerivationRecord {
                derivation_id: r.get(0)?,
                turn_id: r.get(1)?,
                from_operator_id: r.get(2)?,
                to_operator_id: r.get(3)?,
                derived_at: r.get(4)?,
                reason: r.get(5)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Most recent announcements of the day in an area, newest first.
    pub fn call_board(&self, area_id: AreaId, day: Day, limit: u32) -> DeskResult<Vec<BoardEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT t.turn_id, t.visible_number, p.given_name, p.family_name, pr.name,
                    c.name, t.status, e.called_at
             FROM call_event e
             JOIN turn t ON t.turn_id = e.turn_id
             JOIN ticket k ON k.ticket_id = t.ticket_id
             JOIN procedure pr ON pr.procedure_id = t.procedure_id
             LEFT JOIN person p ON p.person_id = k.person_id
             LEFT JOIN counter c ON c.counter_id = e.counter_id
             WHERE t.area_id = ?1 AND t.turn_day = ?2
             ORDER BY e.called_at DESC, e.call_event_id DESC
             LIMIT ?3",
        )?;
        let rows = stmt.query_map(params![area_id, day, limit], |r| {
            let visible_number: u32 = r.get(1)?;
            Ok(BoardEntry {
                turn_id: r.get(0)?,
                visible_number,
                display_name: display_name(r.get(2)?, r.get(3)?, visible_number),
                procedure_name: r.get(4)?,
                counter_name: r.get(5)?,
                status: r.get(6)?,
                called_at: r.get(7)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }
}
