use crate::types::TurnId;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Why the admission gate refused to issue a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DenialReason {
    AreaInactive,
    ProcedureUnavailable,
    OutsideIssuanceHours,
    IdentityRequired,
    IdentityNotFound,
    DailyQuotaReached,
}

impl fmt::Display for DenialReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::AreaInactive => "the area is not taking turns",
            Self::ProcedureUnavailable => "the procedure is not offered by this area",
            Self::OutsideIssuanceHours => "turns are not being issued at this time",
            Self::IdentityRequired => "an identity number is required",
            Self::IdentityNotFound => "identity number not found in the directory",
            Self::DailyQuotaReached => "daily turn quota reached for this person",
        };
        f.write_str(text)
    }
}

/// Area policy rule an operation ran into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolatedRule {
    CloseReasonRequired,
    DerivationDisabled,
    CounterInactive,
    CounterOutsideArea,
    CounterBoundToOtherOperator,
    ProcedureNotServedByCounter,
}

impl fmt::Display for ViolatedRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::CloseReasonRequired => "a close reason is required to finish a turn",
            Self::DerivationDisabled => "derivation is disabled for this area",
            Self::CounterInactive => "the counter is not active",
            Self::CounterOutsideArea => "the counter belongs to another area",
            Self::CounterBoundToOtherOperator => "the counter is assigned to another operator",
            Self::ProcedureNotServedByCounter => "the counter does not serve this procedure",
        };
        f.write_str(text)
    }
}

#[derive(Error, Debug)]
pub enum DeskError {
    #[error("Admission denied: {reason}")]
    AdmissionDenied { reason: DenialReason },

    #[error("Cannot {action} turn {turn_id}: {reason}")]
    InvalidTransition {
        turn_id: TurnId,
        action: &'static str,
        reason: String,
    },

    #[error("Configuration violation: {rule}")]
    ConfigViolation { rule: ViolatedRule },

    #[error("{entity} '{id}' not found")]
    NotFound { entity: &'static str, id: String },

    #[error("Turn {turn_id} was claimed by another operator")]
    ConcurrencyConflict { turn_id: TurnId },

    #[error("Identity lookup unavailable: {0}")]
    LookupUnavailable(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DeskError {
    pub fn denied(reason: DenialReason) -> Self {
        Self::AdmissionDenied { reason }
    }

    pub fn violation(rule: ViolatedRule) -> Self {
        Self::ConfigViolation { rule }
    }

    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Stable machine-readable kind, safe to match on across releases.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::AdmissionDenied { .. } => "admission_denied",
            Self::InvalidTransition { .. } => "invalid_transition",
            Self::ConfigViolation { .. } => "config_violation",
            Self::NotFound { .. } => "not_found",
            Self::ConcurrencyConflict { .. } => "concurrency_conflict",
            Self::LookupUnavailable(_) => "lookup_unavailable",
            Self::Database(_) => "database",
            Self::Serialization(_) => "serialization",
        }
    }

    /// Only a lost claim race is worth re-attempting as-is.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ConcurrencyConflict { .. })
    }
}

pub type DeskResult<T> = Result<T, DeskError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_are_stable() {
        assert_eq!(
            DeskError::denied(DenialReason::DailyQuotaReached).kind(),
            "admission_denied"
        );
        assert_eq!(
            DeskError::violation(ViolatedRule::DerivationDisabled).kind(),
            "config_violation"
        );
        assert_eq!(DeskError::not_found("turn", 7).kind(), "not_found");
        assert!(DeskError::ConcurrencyConflict { turn_id: 1 }.is_retryable());
        assert!(!DeskError::LookupUnavailable("down".into()).is_retryable());
    }

    #[test]
    fn messages_carry_the_reason() {
        let err = DeskError::denied(DenialReason::IdentityRequired);
        assert_eq!(err.to_string(), "Admission denied: an identity number is required");
        let err = DeskError::not_found("turn", 42);
        assert_eq!(err.to_string(), "turn '42' not found");
    }
}
