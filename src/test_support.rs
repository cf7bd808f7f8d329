//! Deterministic demo data for seeding, tests and benchmarks.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rustc_hash::FxHashSet;

use crate::model::{Contact, NewContact};
use crate::ContactStore;

const NAMES: [(&str, &str); 6] = [
    ("Rahul", "Sharma"),
    ("Priya", "Patel"),
    ("Amit", "Kumar"),
    ("Sneha", "Singh"),
    ("Rohit", "Gupta"),
    ("Kavya", "Verma"),
];

const EMAIL_DOMAINS: [&str; 3] = ["gmail.com", "yahoo.com", "hotmail.com"];
const MOBILE_PREFIXES: [&str; 6] = ["98", "97", "96", "95", "94", "93"];

/// Which fields a seeded contact carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeedShape {
    Both,
    EmailOnly,
    PhoneOnly,
}

impl SeedShape {
    /// Shape for position `index` of `count`: first third both, then email only, then phone only.
    fn for_index(index: usize, count: usize) -> Self {
        match index * 3 / count.max(1) {
            0 => SeedShape::Both,
            1 => SeedShape::EmailOnly,
            _ => SeedShape::PhoneOnly,
        }
    }
}

/// Counts of stored contacts by which fields they carry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Census {
    pub both: usize,
    pub email_only: usize,
    pub phone_only: usize,
}

impl Census {
    pub fn total(&self) -> usize {
        self.both + self.email_only + self.phone_only
    }
}

pub fn census(contacts: &[Contact]) -> Census {
    let mut census = Census::default();
    for contact in contacts {
        match (&contact.phone_number, &contact.email) {
            (Some(_), Some(_)) => census.both += 1,
            (None, Some(_)) => census.email_only += 1,
            (Some(_), None) => census.phone_only += 1,
            (None, None) => {}
        }
    }
    census
}

fn random_phone(rng: &mut StdRng) -> String {
    let prefix = MOBILE_PREFIXES[rng.random_range(0..MOBILE_PREFIXES.len())];
    let remaining: u32 = rng.random_range(10_000_000..100_000_000);
    format!("+91{prefix}{remaining}")
}

fn email_for(index: usize, rng: &mut StdRng) -> String {
    let (first, last) = NAMES[index % NAMES.len()];
    let domain = EMAIL_DOMAINS[rng.random_range(0..EMAIL_DOMAINS.len())];
    let round = index / NAMES.len();
    if round == 0 {
        format!("{}.{}@{domain}", first.to_lowercase(), last.to_lowercase())
    } else {
        format!("{}.{}{round}@{domain}", first.to_lowercase(), last.to_lowercase())
    }
}

/// Generate `count` distinct primary contacts.
///
/// No two generated contacts share a phone or an email, so seeding never
/// creates an identity that `identify` would have merged.
pub fn generate_contacts(count: usize, seed: u64) -> Vec<NewContact> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut phones = FxHashSet::default();
    let mut contacts = Vec::with_capacity(count);

    for index in 0..count {
        let mut next_phone = |rng: &mut StdRng| loop {
            let phone = random_phone(rng);
            if phones.insert(phone.clone()) {
                break phone;
            }
        };
        let contact = match SeedShape::for_index(index, count) {
            SeedShape::Both => {
                NewContact::primary(Some(next_phone(&mut rng)), Some(email_for(index, &mut rng)))
            }
            SeedShape::EmailOnly => NewContact::primary(None, Some(email_for(index, &mut rng))),
            SeedShape::PhoneOnly => NewContact::primary(Some(next_phone(&mut rng)), None),
        };
        contacts.push(contact);
    }
    contacts
}

/// Create `count` demo contacts in `store` and return them.
pub fn seed_store(
    store: &mut dyn ContactStore,
    count: usize,
    seed: u64,
) -> anyhow::Result<Vec<Contact>> {
    generate_contacts(count, seed)
        .into_iter()
        .map(|fields| store.create(fields))
        .collect()
}

/// Generate `count` identify requests drawn from a shared pool of values.
///
/// `overlap_probability` is the chance a request reuses a value seen before,
/// which is what drives enrichment and consolidation.
pub fn generate_observations(
    count: usize,
    overlap_probability: f64,
    seed: u64,
) -> Vec<(Option<String>, Option<String>)> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut seen_phones: Vec<String> = Vec::new();
    let mut seen_emails: Vec<String> = Vec::new();
    let mut observations = Vec::with_capacity(count);

    for index in 0..count {
        let phone = if rng.random_bool(0.8) {
            if !seen_phones.is_empty() && rng.random_bool(overlap_probability) {
                Some(seen_phones[rng.random_range(0..seen_phones.len())].clone())
            } else {
                let phone = random_phone(&mut rng);
                seen_phones.push(phone.clone());
                Some(phone)
            }
        } else {
            None
        };

        let email = if phone.is_none() || rng.random_bool(0.7) {
            if !seen_emails.is_empty() && rng.random_bool(overlap_probability) {
                Some(seen_emails[rng.random_range(0..seen_emails.len())].clone())
            } else {
                let email = email_for(index, &mut rng);
                seen_emails.push(email.clone());
                Some(email)
            }
        } else {
            None
        };

        observations.push((phone, email));
    }
    observations
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Store;

    #[test]
    fn test_generation_is_deterministic() {
        assert_eq!(generate_contacts(9, 7), generate_contacts(9, 7));
        assert_eq!(
            generate_observations(50, 0.5, 3),
            generate_observations(50, 0.5, 3)
        );
    }

    #[test]
    fn test_default_mix_matches_seeding_tool() {
        let mut store = Store::new();
        let created = seed_store(&mut store, 6, 42).unwrap();
        assert_eq!(
            census(&created),
            Census {
                both: 2,
                email_only: 2,
                phone_only: 2
            }
        );
        assert!(created.iter().all(|c| c.is_primary()));
        assert_eq!(created[0].email.as_deref().map(|e| e.starts_with("rahul.sharma@")), Some(true));
        assert!(created[0].phone_number.as_deref().unwrap().starts_with("+91"));
    }

    #[test]
    fn test_values_are_unique_across_rounds() {
        let contacts = generate_contacts(60, 1);
        let mut emails = FxHashSet::default();
        for email in contacts.iter().filter_map(|c| c.email.clone()) {
            assert!(emails.insert(email));
        }
    }

    #[test]
    fn test_observations_always_carry_a_field() {
        for (phone, email) in generate_observations(200, 0.3, 9) {
            assert!(phone.is_some() || email.is_some());
        }
    }
}
