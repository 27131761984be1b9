//! Priority classification.
//!
//! Tiers are totally ordered; the queue always serves the highest tier
//! first. Only the senior tier is derived automatically (from birthdate).
//! Expecting and reduced-mobility must be flagged by whoever issues the turn.

use crate::types::Day;
use chrono::Datelike;
use serde::{Deserialize, Serialize};

pub const SENIOR_AGE: u32 = 65;

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum PriorityTier {
    #[default]
    Normal,
    Senior,
    Expecting,
    ReducedMobility,
}

impl PriorityTier {
    pub fn level(self) -> u8 {
        match self {
            Self::Normal => 0,
            Self::Senior => 1,
            Self::Expecting => 2,
            Self::ReducedMobility => 3,
        }
    }

    pub fn from_level(level: u8) -> Option<Self> {
        match level {
            0 => Some(Self::Normal),
            1 => Some(Self::Senior),
            2 => Some(Self::Expecting),
            3 => Some(Self::ReducedMobility),
            _ => None,
        }
    }
}

/// Which non-normal tiers an area honours. Normal is always enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierSet {
    pub senior: bool,
    pub expecting: bool,
    pub reduced_mobility: bool,
}

impl Default for TierSet {
    fn default() -> Self {
        Self {
            senior: true,
            expecting: true,
            reduced_mobility: true,
        }
    }
}

impl TierSet {
    pub fn none() -> Self {
        Self {
            senior: false,
            expecting: false,
            reduced_mobility: false,
        }
    }

    pub fn enables(&self, tier: PriorityTier) -> bool {
        match tier {
            PriorityTier::Normal => true,
            PriorityTier::Senior => self.senior,
            PriorityTier::Expecting => self.expecting,
            PriorityTier::ReducedMobility => self.reduced_mobility,
        }
    }
}

/// Conditions declared at the kiosk or by staff.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManualFlags {
    #[serde(default)]
    pub expecting: bool,
    #[serde(default)]
    pub reduced_mobility: bool,
}

/// Whole years between `birthdate` and `today`.
/// A birthday later this year has not counted yet; future birthdates give 0.
pub fn age_on(birthdate: Day, today: Day) -> u32 {
    let mut years = today.year() - birthdate.year();
    if (today.month(), today.day()) < (birthdate.month(), birthdate.day()) {
        years -= 1;
    }
    years.max(0) as u32
}

pub fn auto_tier(tiers: &TierSet, birthdate: Option<Day>, today: Day) -> PriorityTier {
    match birthdate {
        Some(b) if tiers.senior && age_on(b, today) >= SENIOR_AGE => PriorityTier::Senior,
        _ => PriorityTier::Normal,
    }
}

pub fn manual_tier(tiers: &TierSet, flags: &ManualFlags) -> PriorityTier {
    if flags.reduced_mobility && tiers.reduced_mobility {
        PriorityTier::ReducedMobility
    } else if flags.expecting && tiers.expecting {
        PriorityTier::Expecting
    } else {
        PriorityTier::Normal
    }
}

/// Final tier: the highest enabled tier that applies.
pub fn classify(
    tiers: &TierSet,
    birthdate: Option<Day>,
    flags: &ManualFlags,
    today: Day,
) -> PriorityTier {
    auto_tier(tiers, birthdate, today).max(manual_tier(tiers, flags))
}
