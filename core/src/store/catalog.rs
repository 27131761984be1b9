use super::DeskStore;
use crate::{
    config::{AreaConfig, OfficeSetup, TimeWindow},
    error::{DeskError, DeskResult},
    model::{Area, CloseReason, Counter, Operator, Procedure},
    priority::TierSet,
    types::{AreaId, CloseReasonId, CounterId, OperatorId, ProcedureId},
};
use rusqlite::{params, OptionalExtension};
use std::collections::HashMap;

/// Ids assigned while applying an `OfficeSetup`, keyed by name.
#[derive(Debug, Clone, Default)]
pub struct AppliedSetup {
    pub areas: HashMap<String, AreaId>,
    /// (area name, procedure name) -> id
    pub procedures: HashMap<(String, String), ProcedureId>,
    /// (area name, counter name) -> id
    pub counters: HashMap<(String, String), CounterId>,
    pub close_reasons: HashMap<String, CloseReasonId>,
}

fn window_from(start: Option<chrono::NaiveTime>, end: Option<chrono::NaiveTime>) -> Option<TimeWindow> {
    match (start, end) {
        (Some(s), Some(e)) => Some(TimeWindow::new(s, e)),
        _ => None,
    }
}

impl DeskStore {
    // ── Area ───────────────────────────────────────────────────────

    pub fn insert_area(&self, name: &str) -> DeskResult<AreaId> {
        self.conn
            .execute("INSERT INTO area (name, active) VALUES (?1, 1)", params![name])?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn set_area_active(&self, area_id: AreaId, active: bool) -> DeskResult<()> {
        self.conn.execute(
            "UPDATE area SET active = ?1 WHERE area_id = ?2",
            params![active, area_id],
        )?;
        Ok(())
    }

    pub fn area(&self, area_id: AreaId) -> DeskResult<Option<Area>> {
        let row = self
            .conn
            .query_row(
                "SELECT area_id, name, active FROM area WHERE area_id = ?1",
                params![area_id],
                |r| {
                    Ok(Area {
                        area_id: r.get(0)?,
                        name: r.get(1)?,
                        active: r.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    pub fn require_area(&self, area_id: AreaId) -> DeskResult<Area> {
        self.area(area_id)?
            .ok_or_else(|| DeskError::not_found("area", area_id))
    }

    pub fn areas(&self) -> DeskResult<Vec<Area>> {
        let mut stmt = self
            .conn
            .prepare("SELECT area_id, name, active FROM area ORDER BY name ASC")?;
        let rows = stmt.query_map([], |r| {
            Ok(Area {
                area_id: r.get(0)?,
                name: r.get(1)?,
                active: r.get(2)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    // ── Area config ────────────────────────────────────────────────

    /// Written only by the administration surface and by setup.
    pub fn upsert_area_config(&self, area_id: AreaId, c: &AreaConfig) -> DeskResult<()> {
        self.conn.execute(
            "INSERT INTO area_config (
                area_id, issuance_start, issuance_end, attention_start, attention_end,
                identity_required, allow_multiple_active, max_turns_per_day,
                tier_senior, tier_expecting, tier_reduced_mobility,
                derivation_allowed, close_reason_required, call_timeout_secs,
                expire_stale_turns
             ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15)
             ON CONFLICT(area_id) DO UPDATE SET
                issuance_start = excluded.issuance_start,
                issuance_end = excluded.issuance_end,
                attention_start = excluded.attention_start,
                attention_end = excluded.attention_end,
                identity_required = excluded.identity_required,
                allow_multiple_active = excluded.allow_multiple_active,
                max_turns_per_day = excluded.max_turns_per_day,
                tier_senior = excluded.tier_senior,
                tier_expecting = excluded.tier_expecting,
                tier_reduced_mobility = excluded.tier_reduced_mobility,
                derivation_allowed = excluded.derivation_allowed,
                close_reason_required = excluded.close_reason_required,
                call_timeout_secs = excluded.call_timeout_secs,
                expire_stale_turns = excluded.expire_stale_turns",
            params![
                area_id,
                c.issuance_hours.map(|w| w.start),
                c.issuance_hours.map(|w| w.end),
                c.attention_hours.map(|w| w.start),
                c.attention_hours.map(|w| w.end),
                c.identity_required,
                c.allow_multiple_active,
                c.max_turns_per_day,
                c.enabled_tiers.senior,
                c.enabled_tiers.expecting,
                c.enabled_tiers.reduced_mobility,
                c.derivation_allowed,
                c.close_reason_required,
                c.call_timeout_secs,
                c.expire_stale_turns,
            ],
        )?;
        Ok(())
    }

    /// Current policy for an area. An area without a config row runs
    /// on the defaults.
    pub fn area_config(&self, area_id: AreaId) -> DeskResult<AreaConfig> {
        let row = self
            .conn
            .query_row(
                "SELECT issuance_start, issuance_end, attention_start, attention_end,
                        identity_required, allow_multiple_active, max_turns_per_day,
                        tier_senior, tier_expecting, tier_reduced_mobility,
                        derivation_allowed, close_reason_required, call_timeout_secs,
                        expire_stale_turns
                 FROM area_config WHERE area_id = ?1",
                params![area_id],
                |r| {
                    Ok(AreaConfig {
                        issuance_hours: window_from(r.get(0)?, r.get(1)?),
                        attention_hours: window_from(r.get(2)?, r.get(3)?),
                        identity_required: r.get(4)?,
                        allow_multiple_active: r.get(5)?,
                        max_turns_per_day: r.get(6)?,
                        enabled_tiers: TierSet {
                            senior: r.get(7)?,
                            expecting: r.get(8)?,
                            reduced_mobility: r.get(9)?,
                        },
                        derivation_allowed: r.get(10)?,
                        close_reason_required: r.get(11)?,
                        call_timeout_secs: r.get(12)?,
                        expire_stale_turns: r.get(13)?,
                    })
                },
            )
            .optional()?;
        Ok(row.unwrap_or_else(|| {
            log::debug!("Area {area_id} has no config row; using defaults");
            AreaConfig::default()
        }))
    }

    // ── Procedure ──────────────────────────────────────────────────

    pub fn insert_procedure(&self, area_id: AreaId, name: &str) -> DeskResult<ProcedureId> {
        self.conn.execute(
            "INSERT INTO procedure (area_id, name, active) VALUES (?1, ?2, 1)",
            params![area_id, name],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn set_procedure_active(&self, procedure_id: ProcedureId, active: bool) -> DeskResult<()> {
        self.conn.execute(
            "UPDATE procedure SET active = ?1 WHERE procedure_id = ?2",
            params![active, procedure_id],
        )?;
        Ok(())
    }

    pub fn procedure(&self, procedure_id: ProcedureId) -> DeskResult<Option<Procedure>> {
        let row = self
            .conn
            .query_row(
                "SELECT procedure_id, area_id, name, active FROM procedure WHERE procedure_id = ?1",
                params![procedure_id],
                |r| {
                    Ok(Procedure {
                        procedure_id: r.get(0)?,
                        area_id: r.get(1)?,
                        name: r.get(2)?,
                        active: r.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    pub fn procedures(&self, area_id: AreaId) -> DeskResult<Vec<Procedure>> {
        let mut stmt = self.conn.prepare(
            "SELECT procedure_id, area_id, name, active FROM procedure
             WHERE area_id = ?1 ORDER BY name ASC",
        )?;
        let rows = stmt.query_map(params![area_id], |r| {
            Ok(Procedure {
                procedure_id: r.get(0)?,
                area_id: r.get(1)?,
                name: r.get(2)?,
                active: r.get(3)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    // ── Operator ───────────────────────────────────────────────────

    pub fn insert_operator(&self, operator_id: OperatorId, display_name: &str) -> DeskResult<()> {
        self.conn.execute(
            "INSERT INTO operator (operator_id, display_name, active) VALUES (?1, ?2, 1)
             ON CONFLICT(operator_id) DO UPDATE SET display_name = excluded.display_name",
            params![operator_id, display_name],
        )?;
        Ok(())
    }

    pub fn set_operator_active(&self, operator_id: OperatorId, active: bool) -> DeskResult<()> {
        self.conn.execute(
            "UPDATE operator SET active = ?1 WHERE operator_id = ?2",
            params![active, operator_id],
        )?;
        Ok(())
    }

    pub fn operator(&self, operator_id: OperatorId) -> DeskResult<Option<Operator>> {
        let row = self
            .conn
            .query_row(
                "SELECT operator_id, display_name, active FROM operator WHERE operator_id = ?1",
                params![operator_id],
                |r| {
                    Ok(Operator {
                        operator_id: r.get(0)?,
                        display_name: r.get(1)?,
                        active: r.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    /// An operator that exists and may act. Anything else is NotFound.
    pub fn require_active_operator(&self, operator_id: OperatorId) -> DeskResult<Operator> {
        match self.operator(operator_id)? {
            Some(op) if op.active => Ok(op),
            _ => Err(DeskError::not_found("operator", operator_id)),
        }
    }

    // ── Counter ────────────────────────────────────────────────────

    pub fn insert_counter(
        &self,
        area_id: AreaId,
        name: &str,
        operator_id: Option<OperatorId>,
    ) -> DeskResult<CounterId> {
        self.conn.execute(
            "INSERT INTO counter (area_id, name, active, operator_id) VALUES (?1, ?2, 1, ?3)",
            params![area_id, name, operator_id],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Add a procedure to the counter's restriction set.
    pub fn restrict_counter(&self, counter_id: CounterId, procedure_id: ProcedureId) -> DeskResult<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO counter_procedure (counter_id, procedure_id) VALUES (?1, ?2)",
            params![counter_id, procedure_id],
        )?;
        Ok(())
    }

    pub fn set_counter_active(&self, counter_id: CounterId, active: bool) -> DeskResult<()> {
        self.conn.execute(
            "UPDATE counter SET active = ?1 WHERE counter_id = ?2",
            params![active, counter_id],
        )?;
        Ok(())
    }

    pub fn counter(&self, counter_id: CounterId) -> DeskResult<Option<Counter>> {
        let row = self
            .conn
            .query_row(
                "SELECT counter_id, area_id, name, active, operator_id FROM counter
                 WHERE counter_id = ?1",
                params![counter_id],
                |r| {
                    Ok(Counter {
                        counter_id: r.get(0)?,
                        area_id: r.get(1)?,
                        name: r.get(2)?,
                        active: r.get(3)?,
                        operator_id: r.get(4)?,
                        procedures: Vec::new(),
                    })
                },
            )
            .optional()?;
        let Some(mut counter) = row else {
            return Ok(None);
        };
        let mut stmt = self.conn.prepare(
            "SELECT procedure_id FROM counter_procedure WHERE counter_id = ?1
             ORDER BY procedure_id ASC",
        )?;
        counter.procedures = stmt
            .query_map(params![counter_id], |r| r.get(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Some(counter))
    }

    pub fn counter_named(&self, area_id: AreaId, name: &str) -> DeskResult<Option<CounterId>> {
        let id = self
            .conn
            .query_row(
                "SELECT counter_id FROM counter WHERE area_id = ?1 AND name = ?2",
                params![area_id, name],
                |r| r.get(0),
            )
            .optional()?;
        Ok(id)
    }

    pub fn require_counter(&self, counter_id: CounterId) -> DeskResult<Counter> {
        self.counter(counter_id)?
            .ok_or_else(|| DeskError::not_found("counter", counter_id))
    }

    // ── Close reason ───────────────────────────────────────────────

    pub fn insert_close_reason(
        &self,
        name: &str,
        description: Option<&str>,
        sort_order: i32,
    ) -> DeskResult<CloseReasonId> {
        self.conn.execute(
            "INSERT INTO close_reason (name, description, active, sort_order)
             VALUES (?1, ?2, 1, ?3)",
            params![name, description, sort_order],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn set_close_reason_active(&self, id: CloseReasonId, active: bool) -> DeskResult<()> {
        self.conn.execute(
            "UPDATE close_reason SET active = ?1 WHERE close_reason_id = ?2",
            params![active, id],
        )?;
        Ok(())
    }

    pub fn close_reason(&self, id: CloseReasonId) -> DeskResult<Option<CloseReason>> {
        let row = self
            .conn
            .query_row(
                "SELECT close_reason_id, name, description, active, sort_order
                 FROM close_reason WHERE close_reason_id = ?1",
                params![id],
                close_reason_row,
            )
            .optional()?;
        Ok(row)
    }

    /// Active reasons in display order.
    pub fn close_reasons(&self) -> DeskResult<Vec<CloseReason>> {
        let mut stmt = self.conn.prepare(
            "SELECT close_reason_id, name, description, active, sort_order
             FROM close_reason WHERE active = 1 ORDER BY sort_order ASC, name ASC",
        )?;
        let rows = stmt.query_map([], close_reason_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    // ── Setup ──────────────────────────────────────────────────────

    /// Create everything an `OfficeSetup` describes, in one transaction.
    pub fn apply_setup(&self, setup: &OfficeSetup) -> DeskResult<AppliedSetup> {
        self.with_write_tx(|s| {
            let mut applied = AppliedSetup::default();
            for op in &setup.operators {
                s.insert_operator(op.operator_id, &op.display_name)?;
            }
            for (i, reason) in setup.close_reasons.iter().enumerate() {
                let id = s.insert_close_reason(&reason.name, reason.description.as_deref(), i as i32)?;
                applied.close_reasons.insert(reason.name.clone(), id);
            }
            for area in &setup.areas {
                let area_id = s.insert_area(&area.name)?;
                s.upsert_area_config(area_id, &area.config)?;
                applied.areas.insert(area.name.clone(), area_id);

                for proc_name in &area.procedures {
                    let id = s.insert_procedure(area_id, proc_name)?;
                    applied
                        .procedures
                        .insert((area.name.clone(), proc_name.clone()), id);
                }
                for counter in &area.counters {
                    let counter_id = s.insert_counter(area_id, &counter.name, counter.operator_id)?;
                    for proc_name in &counter.procedures {
                        let key = (area.name.clone(), proc_name.clone());
                        let procedure_id = *applied
                            .procedures
                            .get(&key)
                            .ok_or_else(|| DeskError::not_found("procedure", proc_name))?;
                        s.restrict_counter(counter_id, procedure_id)?;
                    }
                    applied
                        .counters
                        .insert((area.name.clone(), counter.name.clone()), counter_id);
                }
            }
            log::info!(
                "Applied setup: {} areas, {} procedures, {} counters",
                applied.areas.len(),
                applied.procedures.len(),
                applied.counters.len()
            );
            Ok(applied)
        })
    }
}

fn close_reason_row(r: &rusqlite::Row<'_>) -> rusqlite::Result<CloseReason> {
    Ok(CloseReason {
        close_reason_id: r.get(0)?,
        name: r.get(1)?,
        description: r.get(2)?,
        active: r.get(3)?,
        sort_order: r.get(4)?,
    })
}
