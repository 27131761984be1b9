//! Entities of the desk: areas, counters, people, tickets and turns.
//!
//! Rows are never physically deleted. A turn in a terminal status is
//! immutable; it stays behind for reporting.

use crate::{
    priority::PriorityTier,
    types::{
        AreaId, CloseReasonId, CounterId, Day, OperatorId, PersonId, ProcedureId, TicketId,
        Timestamp, TurnId,
    },
};
use serde::{Deserialize, Serialize};
use std::fmt;

// ── Turn status ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnStatus {
    Pending,
    Called,
    InProgress,
    Completed,
    NoShow,
    /// Transient: a derived turn re-enters Pending in the same transaction.
    Derived,
}

impl TurnStatus {
    pub const ACTIVE: [TurnStatus; 3] = [Self::Pending, Self::Called, Self::InProgress];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Called => "called",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::NoShow => "no_show",
            Self::Derived => "derived",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "called" => Some(Self::Called),
            "in_progress" => Some(Self::InProgress),
            "completed" => Some(Self::Completed),
            "no_show" => Some(Self::NoShow),
            "derived" => Some(Self::Derived),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::NoShow)
    }

    pub fn is_active(&self) -> bool {
        Self::ACTIVE.contains(self)
    }

    /// The complete edge set of the turn lifecycle.
    pub fn can_transition(self, to: TurnStatus) -> bool {
        use TurnStatus::*;
        matches!(
            (self, to),
            (Pending, Called)
                | (Called, InProgress)
                | (InProgress, Completed)
                | (Pending, NoShow)
                | (Called, NoShow)
                | (Called, Derived)
                | (InProgress, Derived)
                | (Derived, Pending)
        )
    }
}

impl fmt::Display for TurnStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Ticket status ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    Pending,
    InProgress,
    Completed,
    Cancelled,
}

impl TicketStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "in_progress" => Some(Self::InProgress),
            "completed" => Some(Self::Completed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// A ticket mirrors the turns it owns.
    pub fn mirror(turns: &[TurnStatus]) -> Self {
        let any = |wanted: &[TurnStatus]| turns.iter().any(|s| wanted.contains(s));
        if any(&[TurnStatus::Called, TurnStatus::InProgress]) {
            Self::InProgress
        } else if any(&[TurnStatus::Pending, TurnStatus::Derived]) {
            Self::Pending
        } else if any(&[TurnStatus::Completed]) {
            Self::Completed
        } else {
            Self::Cancelled
        }
    }
}

// ── Catalog entities ───────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Area {
    pub area_id: AreaId,
    pub name: String,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Procedure {
    pub procedure_id: ProcedureId,
    pub area_id: AreaId,
    pub name: String,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counter {
    pub counter_id: CounterId,
    pub area_id: AreaId,
    pub name: String,
    pub active: bool,
    pub operator_id: Option<OperatorId>,
    /// Procedures served. Empty = every procedure of the area.
    pub procedures: Vec<ProcedureId>,
}

impl Counter {
    pub fn serves(&self, procedure_id: ProcedureId) -> bool {
        self.procedures.is_empty() || self.procedures.contains(&procedure_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operator {
    pub operator_id: OperatorId,
    pub display_name: String,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloseReason {
    pub close_reason_id: CloseReasonId,
    pub name: String,
    pub description: Option<String>,
    pub active: bool,
    pub sort_order: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Person {
    pub person_id: PersonId,
    pub identity_number: String,
    pub given_name: String,
    pub family_name: String,
    pub birthdate: Option<Day>,
    pub sex: Option<String>,
}

// ── Tickets and turns ──────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    pub ticket_id: TicketId,
    pub person_id: Option<PersonId>,
    pub area_id: AreaId,
    pub priority: PriorityTier,
    pub created_at: Timestamp,
    pub status: TicketStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub turn_id: TurnId,
    pub ticket_id: TicketId,
    pub procedure_id: ProcedureId,
    pub area_id: AreaId,
    pub visible_number: u32,
    pub turn_day: Day,
    pub counter_id: Option<CounterId>,
    pub operator_id: Option<OperatorId>,
    pub status: TurnStatus,
    /// Copied from the owning ticket.
    pub priority: PriorityTier,
    pub created_at: Timestamp,
    pub called_at: Option<Timestamp>,
    pub started_at: Option<Timestamp>,
    pub finished_at: Option<Timestamp>,
    pub close_reason_id: Option<CloseReasonId>,
    pub consult_priority: i16,
    pub notes: Option<String>,
}

/// Appended every time a turn is announced, including recalls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallEvent {
    pub call_event_id: i64,
    pub turn_id: TurnId,
    pub operator_id: OperatorId,
    pub counter_id: Option<CounterId>,
    pub called_at: Timestamp,
}

/// Audit entry for an operator-to-operator handoff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivationRecord {
    pub derivation_id: i64,
    pub turn_id: TurnId,
    pub from_operator_id: OperatorId,
    pub to_operator_id: OperatorId,
    pub derived_at: Timestamp,
    pub reason: Option<String>,
}

/// One line of the waiting-room monitor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardEntry {
    pub turn_id: TurnId,
    pub visible_number: u32,
    pub display_name: String,
    pub procedure_name: String,
    pub counter_name: Option<String>,
    pub status: TurnStatus,
    pub called_at: Timestamp,
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [TurnStatus; 6] = [
        TurnStatus::Pending,
        TurnStatus::Called,
        TurnStatus::InProgress,
        TurnStatus::Completed,
        TurnStatus::NoShow,
        TurnStatus::Derived,
    ];

    #[test]
    fn terminal_statuses_have_no_exits() {
        for from in ALL.iter().filter(|s| s.is_terminal()) {
            for to in ALL {
                assert!(!from.can_transition(to), "{from} -> {to} must not exist");
            }
        }
    }

    #[test]
    fn status_strings_round_trip() {
        for s in ALL {
            assert_eq!(TurnStatus::parse(s.as_str()), Some(s));
        }
        assert_eq!(TurnStatus::parse("llamando"), None);
    }

    #[test]
    fn ticket_mirrors_its_turns() {
        use TurnStatus::*;
        assert_eq!(TicketStatus::mirror(&[Pending]), TicketStatus::Pending);
        assert_eq!(TicketStatus::mirror(&[Completed, Called]), TicketStatus::InProgress);
        assert_eq!(TicketStatus::mirror(&[Completed, NoShow]), TicketStatus::Completed);
        assert_eq!(TicketStatus::mirror(&[NoShow]), TicketStatus::Cancelled);
    }

    #[test]
    fn unrestricted_counter_serves_everything() {
        let mut counter = Counter {
            counter_id: 1,
            area_id: 1,
            name: "M1".into(),
            active: true,
            operator_id: None,
            procedures: vec![],
        };
        assert!(counter.serves(99));
        counter.procedures = vec![3];
        assert!(counter.serves(3));
        assert!(!counter.serves(99));
    }
}
