//! Shared primitive types used across the whole desk.

/// Row identifiers. Every entity is keyed by a SQLite rowid.
pub type AreaId = i64;
pub type ProcedureId = i64;
pub type CounterId = i64;
pub type OperatorId = i64;
pub type PersonId = i64;
pub type TicketId = i64;
pub type TurnId = i64;
pub type CloseReasonId = i64;

/// Local office wall-clock time. The desk never deals in UTC.
pub type Timestamp = chrono::NaiveDateTime;

/// A calendar day in office-local time. Visible numbers restart every day.
pub type Day = chrono::NaiveDate;
