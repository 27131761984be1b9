use super::DeskStore;
use crate::{
    error::DeskResult,
    identity::PersonRecord,
    model::Person,
    types::PersonId,
};
use rusqlite::{params, OptionalExtension};

const PERSON_SELECT: &str = "SELECT person_id, identity_number, given_name, family_name, birthdate, sex
                             FROM person";

fn person_row(r: &rusqlite::Row<'_>) -> rusqlite::Result<Person> {
    Ok(Person {
        person_id: r.get(0)?,
        identity_number: r.get(1)?,
        given_name: r.get(2)?,
        family_name: r.get(3)?,
        birthdate: r.get(4)?,
        sex: r.get(5)?,
    })
}

impl DeskStore {
    /// Create or refresh the local copy of a directory record.
    /// `identity_number` must already be normalized.
    pub fn upsert_person(&self, identity_number: &str, record: &PersonRecord) -> DeskResult<Person> {
        let person_id: PersonId = self.conn.query_row(
            "INSERT INTO person (identity_number, given_name, family_name, birthdate, sex)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(identity_number) DO UPDATE SET
                given_name = excluded.given_name,
                family_name = excluded.family_name,
                birthdate = excluded.birthdate,
                sex = excluded.sex
             RETURNING person_id",
            params![
                identity_number,
                record.given_name,
                record.family_name,
                record.birthdate,
                record.sex,
            ],
            |r| r.get(0),
        )?;
        Ok(Person {
            person_id,
            identity_number: identity_number.to_string(),
            given_name: record.given_name.clone(),
            family_name: record.family_name.clone(),
            birthdate: record.birthdate,
            sex: record.sex.clone(),
        })
    }

    pub fn get_person(&self, person_id: PersonId) -> DeskResult<Option<Person>> {
        let row = self
            .conn
            .query_row(
                &format!("{PERSON_SELECT} WHERE person_id = ?1"),
                params![person_id],
                person_row,
            )
            .optional()?;
        Ok(row)
    }

    pub fn person_by_identity(&self, identity_number: &str) -> DeskResult<Option<Person>> {
        let row = self
            .conn
            .query_row(
                &format!("{PERSON_SELECT} WHERE identity_number = ?1"),
                params![identity_number],
                person_row,
            )
            .optional()?;
        Ok(row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn record(given: &str) -> PersonRecord {
        PersonRecord {
            given_name: given.into(),
            family_name: "PEREZ".into(),
            birthdate: NaiveDate::from_ymd_opt(1950, 5, 1),
            sex: Some("F".into()),
        }
    }

    #[test]
    fn upsert_keeps_one_row_per_identity() {
        let store = DeskStore::in_memory().unwrap();
        store.migrate().unwrap();
        let first = store.upsert_person("20123456", &record("ANA")).unwrap();
        let second = store.upsert_person("20123456", &record("ANA MARIA")).unwrap();
        assert_eq!(first.person_id, second.person_id);

        let stored = store.person_by_identity("20123456").unwrap().unwrap();
        assert_eq!(stored.given_name, "ANA MARIA");
        assert_eq!(stored.birthdate, NaiveDate::from_ymd_opt(1950, 5, 1));
        assert_eq!(store.get_person(first.person_id).unwrap(), Some(stored));
    }
}
