//! Synthetic citizens for the traffic simulator.
//!
//! Generation is deterministic: the same stream yields the same people,
//! identity numbers included.

use crate::rng::ActorRng;
use chrono::{Datelike, Duration, NaiveDate};
use turnero_core::identity::FixturePerson;

/// Identity numbers start here and go up by one per person.
const FIRST_IDENTITY: u64 = 20_000_000;

/// Share of the population old enough for the senior tier.
const SENIOR_SHARE: f64 = 0.25;

pub fn generate(rng: &mut ActorRng, count: usize, today: NaiveDate) -> Vec<FixturePerson> {
    (0..count)
        .map(|i| {
            let female = rng.chance(0.5);
            let given = rng.pick(if female { GIVEN_F } else { GIVEN_M }).copied().unwrap_or("ANA");
            let family = rng.pick(FAMILY).copied().unwrap_or("GOMEZ");
            FixturePerson {
                identity_number: (FIRST_IDENTITY + i as u64).to_string(),
                given_name: given.to_string(),
                family_name: family.to_string(),
                birthdate: Some(birthdate(rng, today)),
                sex: Some(if female { "F" } else { "M" }.to_string()),
            }
        })
        .collect()
}

fn birthdate(rng: &mut ActorRng, today: NaiveDate) -> NaiveDate {
    let age = if rng.chance(SENIOR_SHARE) {
        65 + rng.next_u64_below(30)
    } else {
        18 + rng.next_u64_below(47)
    };
    let day_of_year = rng.next_u64_below(365) as i64;
    let year_start = NaiveDate::from_ymd_opt(today.year() - age as i32, 1, 1).unwrap_or(today);
    year_start + Duration::days(day_of_year)
}

const GIVEN_F: &[&str] = &[
    "ANA", "MARIA", "LUCIA", "SOFIA", "CARMEN", "ROSA", "JULIA", "ELENA", "PAULA", "LAURA",
    "MARTA", "SILVIA", "NORMA", "GRACIELA", "BEATRIZ", "VALENTINA",
];

const GIVEN_M: &[&str] = &[
    "JUAN", "CARLOS", "JOSE", "LUIS", "MIGUEL", "JORGE", "PEDRO", "RAUL", "DIEGO", "PABLO",
    "MARTIN", "HECTOR", "RICARDO", "SERGIO", "OSCAR", "TOMAS",
];

const FAMILY: &[&str] = &[
    "GOMEZ", "FERNANDEZ", "RODRIGUEZ", "LOPEZ", "MARTINEZ", "GARCIA", "PEREZ", "SANCHEZ",
    "ROMERO", "SOSA", "ALVAREZ", "TORRES", "RUIZ", "RAMIREZ", "FLORES", "BENITEZ", "ACOSTA",
    "MEDINA", "HERRERA", "SUAREZ", "AGUIRRE", "GIMENEZ", "GUTIERREZ", "PEREYRA",
];

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::PEOPLE_SLOT;

    #[test]
    fn generation_is_deterministic_and_unique() {
        let today = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        let a = generate(&mut ActorRng::new(9, PEOPLE_SLOT, "people"), 50, today);
        let b = generate(&mut ActorRng::new(9, PEOPLE_SLOT, "people"), 50, today);
        assert_eq!(a.len(), 50);
        for (x, y) in a.iter().zip(&b) {
            assert_eq!(x.identity_number, y.identity_number);
            assert_eq!(x.birthdate, y.birthdate);
            assert_eq!(x.family_name, y.family_name);
        }
        assert_eq!(a[0].identity_number, "20000000");
        assert_eq!(a[49].identity_number, "20000049");
        assert!(a.iter().all(|p| p.birthdate.is_some_and(|b| b < today)));
    }
}
