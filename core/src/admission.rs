//! Admission gate: decides whether a turn may be issued, and issues it.
//!
//! CHECK ORDER (fixed):
//!   1. Area exists and is active; procedure belongs to it and is active.
//!   2. Stale turns from earlier days are expired (if the area says so).
//!   3. Issuance hours.
//!   4. Identity: required? resolvable?
//!   5. Inside the write transaction: duplicate active turn (returned as-is),
//!      then the daily quota, then number allocation and creation.

use crate::{
    engine::DeskEngine,
    error::{DenialReason, DeskError, DeskResult},
    event::TurnEvent,
    identity::normalize_identity,
    model::{Person, Ticket, Turn},
    priority::{classify, ManualFlags},
    types::{AreaId, ProcedureId},
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IssueRequest {
    pub area_id: AreaId,
    pub procedure_id: ProcedureId,
    /// Raw identity number as typed. Blank counts as absent.
    #[serde(default)]
    pub identity_number: Option<String>,
    #[serde(default)]
    pub flags: ManualFlags,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issued {
    pub ticket: Ticket,
    pub turn: Turn,
    /// False when the person already had an active turn and got it back.
    pub created: bool,
}

impl DeskEngine {
    pub fn issue(&self, req: &IssueRequest) -> DeskResult<Issued> {
        let result = self.try_issue(req);
        if let Err(e) = &result {
            log::warn!("Issue refused in area {}: {e}", req.area_id);
        }
        result
    }

    fn try_issue(&self, req: &IssueRequest) -> DeskResult<Issued> {
        let area = self.store.require_area(req.area_id)?;
        if !area.active {
            return Err(DeskError::denied(DenialReason::AreaInactive));
        }
        match self.store.procedure(req.procedure_id)? {
            Some(p) if p.area_id == area.area_id && p.active => {}
            _ => return Err(DeskError::denied(DenialReason::ProcedureUnavailable)),
        }

        let config = self.store.area_config(area.area_id)?;
        if config.expire_stale_turns {
            self.sweep(area.area_id)?;
        }

        let now = self.clock().now();
        if !config.issuing_at(now.time()) {
            return Err(DeskError::denied(DenialReason::OutsideIssuanceHours));
        }

        let identity = req
            .identity_number
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty());
        let resolved = match identity {
            None if config.identity_required => {
                return Err(DeskError::denied(DenialReason::IdentityRequired));
            }
            None => None,
            Some(raw) => {
                let dni = normalize_identity(raw)
                    .ok_or(DeskError::denied(DenialReason::IdentityNotFound))?;
                let record = self
                    .resolver()
                    .lookup(&dni)?
                    .ok_or(DeskError::denied(DenialReason::IdentityNotFound))?;
                Some((dni, record))
            }
        };

        let today = now.date();
        let outcome = self.store.with_write_tx(|s| {
            let person: Option<Person> = match &resolved {
                Some((dni, record)) => Some(s.upsert_person(dni, record)?),
                None => None,
            };

            if let Some(p) = &person {
                if !config.allow_multiple_active {
                    if let Some(existing) = s.active_turn_for(p.person_id, area.area_id)? {
                        let ticket = s.require_ticket(existing.ticket_id)?;
                        return Ok(Issued {
                            ticket,
                            turn: existing,
                            created: false,
                        });
                    }
                }
                let taken = s.turns_on_day_for(p.person_id, area.area_id, today)?;
                if config.quota_reached(taken) {
                    return Err(DeskError::denied(DenialReason::DailyQuotaReached));
                }
            }

            let priority = classify(
                &config.enabled_tiers,
                person.as_ref().and_then(|p| p.birthdate),
                &req.flags,
                today,
            );
            let number = s.allocate_visible_number(area.area_id, today)?;
            let ticket = s.insert_ticket(
                person.as_ref().map(|p| p.person_id),
                area.area_id,
                priority,
                now,
            )?;
            let turn = s.insert_turn(&ticket, req.procedure_id, number, today)?;
            Ok(Issued {
                ticket,
                turn,
                created: true,
            })
        })?;

        if outcome.created {
            log::info!(
                "Issued turn {} (N° {}) in area {} at tier {:?}",
                outcome.turn.turn_id,
                outcome.turn.visible_number,
                area.area_id,
                outcome.turn.priority
            );
            if let Some(turn) = self.snapshot_for_event(outcome.turn.turn_id) {
                self.emit(TurnEvent::TurnCreated { turn });
            }
        } else {
            log::info!(
                "Returning active turn {} to repeat request in area {}",
                outcome.turn.turn_id,
                area.area_id
            );
        }
        Ok(outcome)
    }
}
