//! Identity resolution: maps an identity number (DNI) to a person.
//!
//! The admission gate only ever sees the `IdentityResolver` trait.
//! Which directory sits behind it is decided once, from settings,
//! by `build_resolver`.

use crate::{
    config::ResolverSettings,
    error::{DeskError, DeskResult},
    types::Day,
};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, sync::Arc, sync::Mutex};

/// Identity numbers are stored as exactly this many digits.
pub const IDENTITY_DIGITS: usize = 8;

/// What the directory knows about a person.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonRecord {
    pub given_name: String,
    pub family_name: String,
    pub birthdate: Option<Day>,
    pub sex: Option<String>,
}

pub trait IdentityResolver: Send + Sync {
    /// `Ok(None)` means the directory answered and has no such person.
    /// Transport failures are `DeskError::LookupUnavailable`.
    fn lookup(&self, identity_number: &str) -> DeskResult<Option<PersonRecord>>;
}

/// Strip separators, require digits, left-pad to 8 and keep the first 8.
/// Returns None for anything that cannot be an identity number.
pub fn normalize_identity(raw: &str) -> Option<String> {
    let digits: String = raw
        .chars()
        .filter(|c| !matches!(c, '.' | ',' | ' ' | '\t'))
        .collect();
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let mut padded = format!("{digits:0>width$}", width = IDENTITY_DIGITS);
    padded.truncate(IDENTITY_DIGITS);
    Some(padded)
}

/// Split a directory full name of the form "FAMILY, GIVEN".
/// Without a comma the whole string is taken as the family name.
pub fn split_full_name(full: &str) -> (String, String) {
    match full.trim().split_once(',') {
        Some((family, given)) => (family.trim().to_string(), given.trim().to_string()),
        None => (full.trim().to_string(), String::new()),
    }
}

// ── Fixture directory ──────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixturePerson {
    pub identity_number: String,
    pub given_name: String,
    pub family_name: String,
    #[serde(default)]
    pub birthdate: Option<Day>,
    #[serde(default)]
    pub sex: Option<String>,
}

/// In-memory directory for tests, demos and offline kiosks.
#[derive(Debug, Clone, Default)]
pub struct FixtureResolver {
    people: HashMap<String, PersonRecord>,
}

impl FixtureResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_person(mut self, identity_number: &str, record: PersonRecord) -> Self {
        self.insert(identity_number, record);
        self
    }

    pub fn insert(&mut self, identity_number: &str, record: PersonRecord) {
        if let Some(key) = normalize_identity(identity_number) {
            self.people.insert(key, record);
        } else {
            log::warn!("Ignoring fixture person with invalid identity '{identity_number}'");
        }
    }

    pub fn from_people(people: &[FixturePerson]) -> Self {
        let mut resolver = Self::new();
        for p in people {
            resolver.insert(
                &p.identity_number,
                PersonRecord {
                    given_name: p.given_name.clone(),
                    family_name: p.family_name.clone(),
                    birthdate: p.birthdate,
                    sex: p.sex.clone(),
                },
            );
        }
        resolver
    }

    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        let people: Vec<FixturePerson> = serde_json::from_str(&content)?;
        Ok(Self::from_people(&people))
    }

    pub fn len(&self) -> usize {
        self.people.len()
    }

    pub fn is_empty(&self) -> bool {
        self.people.is_empty()
    }
}

impl IdentityResolver for FixtureResolver {
    fn lookup(&self, identity_number: &str) -> DeskResult<Option<PersonRecord>> {
        Ok(normalize_identity(identity_number).and_then(|key| self.people.get(&key).cloned()))
    }
}

// ── Remote directory ───────────────────────────────────────────────

/// The external person directory, reached over its own read-only
/// connection. Expects a `person_directory(dni, full_name, birthdate, sex)`
/// table. Any failure talking to it is `LookupUnavailable`, never NotFound.
pub struct DirectoryResolver {
    conn: Mutex<Connection>,
}

impl DirectoryResolver {
    pub fn open(path: &str) -> DeskResult<Self> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_URI,
        )
        .map_err(|e| DeskError::LookupUnavailable(format!("cannot open directory {path}: {e}")))?;
        Ok(Self::from_connection(conn))
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }
}

impl IdentityResolver for DirectoryResolver {
    fn lookup(&self, identity_number: &str) -> DeskResult<Option<PersonRecord>> {
        let Some(dni) = normalize_identity(identity_number) else {
            return Ok(None);
        };
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let row = conn
            .query_row(
                "SELECT full_name, birthdate, sex FROM person_directory WHERE dni = ?1",
                params![dni],
                |r| {
                    Ok((
                        r.get::<_, String>(0)?,
                        r.get::<_, Option<Day>>(1)?,
                        r.get::<_, Option<String>>(2)?,
                    ))
                },
            )
            .optional()
            .map_err(|e| {
                log::warn!("Directory lookup for {dni} failed: {e}");
                DeskError::LookupUnavailable(e.to_string())
            })?;
        Ok(row.map(|(full_name, birthdate, sex)| {
            let (family_name, given_name) = split_full_name(&full_name);
            PersonRecord {
                given_name,
                family_name,
                birthdate,
                sex,
            }
        }))
    }
}

/// Build the configured resolver. Business logic never sees which one it got.
pub fn build_resolver(settings: &ResolverSettings) -> anyhow::Result<Arc<dyn IdentityResolver>> {
    match settings {
        ResolverSettings::Fixture { path, people } => {
            let mut resolver = match path {
                Some(p) => FixtureResolver::load(p)?,
                None => FixtureResolver::new(),
            };
            for p in people {
                resolver.insert(
                    &p.identity_number,
                    PersonRecord {
                        given_name: p.given_name.clone(),
                        family_name: p.family_name.clone(),
                        birthdate: p.birthdate,
                        sex: p.sex.clone(),
                    },
                );
            }
            log::info!("Identity resolver: fixture with {} people", resolver.len());
            Ok(Arc::new(resolver))
        }
        ResolverSettings::Directory { database } => {
            let resolver = DirectoryResolver::open(database)?;
            log::info!("Identity resolver: directory at {database}");
            Ok(Arc::new(resolver))
        }
    }
}
