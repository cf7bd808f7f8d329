//! # Link Decision Engine
//!
//! Decides what a matched observation does to the identity: nothing, fill a
//! missing field on an existing contact, or add a new secondary under the
//! canonical root. At most one mutation results per observation.

use crate::error::Result;
use crate::matcher::Observation;
use crate::model::{Contact, ContactField, ContactId, ContactPatch, NewContact};
use crate::store::ContactStore;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkAction {
    NoOp,
    Enrich {
        contact_id: ContactId,
        field: ContactField,
        value: String,
    },
    CreateSecondary {
        phone_number: Option<String>,
        email: Option<String>,
        linked_id: ContactId,
    },
}

/// Why a [`LinkAction`] was chosen, for logging and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkRule {
    ExactMatch,
    EnrichPhoneOnly,
    EnrichEmailOnly,
    ConflictingPhone,
    ConflictingEmail,
    NewCombination,
}

/// Pick the action for `observation` given the contacts it matched.
///
/// `matches` must be in ascending id order; the first contact carrying the
/// observed phone (or email) is the one the phone (or email) rules inspect.
/// Rules are tried in [`LinkRule`] declaration order.
pub fn decide(
    canonical: ContactId,
    matches: &[Contact],
    observation: &Observation,
) -> (LinkAction, LinkRule) {
    let phone = observation.phone();
    let email = observation.email();

    if matches.iter().any(|c| c.has_exact_pair(phone, email)) {
        return (LinkAction::NoOp, LinkRule::ExactMatch);
    }

    let phone_match = phone.and_then(|p| {
        matches
            .iter()
            .find(|c| c.phone_number.as_deref() == Some(p))
    });
    let email_match = email.and_then(|e| matches.iter().find(|c| c.email.as_deref() == Some(e)));

    // Enrichment only fills in a value no matched contact carries yet; an
    // observation bridging two known values is recorded as a new secondary.
    if let (Some(found), Some(email), None) = (phone_match, email, email_match) {
        if found.email.is_none() {
            return (
                LinkAction::Enrich {
                    contact_id: found.id,
                    field: ContactField::Email,
                    value: email.to_string(),
                },
                LinkRule::EnrichPhoneOnly,
            );
        }
    }

    if let (Some(found), Some(phone), None) = (email_match, phone, phone_match) {
        if found.phone_number.is_none() {
            return (
                LinkAction::Enrich {
                    contact_id: found.id,
                    field: ContactField::PhoneNumber,
                    value: phone.to_string(),
                },
                LinkRule::EnrichEmailOnly,
            );
        }
    }

    let create = LinkAction::CreateSecondary {
        phone_number: phone.map(str::to_string),
        email: email.map(str::to_string),
        linked_id: canonical,
    };

    if let (Some(found), Some(email)) = (phone_match, email) {
        if found.email.as_deref().is_some_and(|existing| existing != email) {
            return (create, LinkRule::ConflictingPhone);
        }
    }

    if let (Some(found), Some(phone)) = (email_match, phone) {
        if found
            .phone_number
            .as_deref()
            .is_some_and(|existing| existing != phone)
        {
            return (create, LinkRule::ConflictingEmail);
        }
    }

    (create, LinkRule::NewCombination)
}

/// Carry out `action` against the store.
pub fn apply(store: &mut dyn ContactStore, action: &LinkAction) -> Result<Option<Contact>> {
    match action {
        LinkAction::NoOp => Ok(None),
        LinkAction::Enrich {
            contact_id,
            field,
            value,
        } => {
            let patch = match field {
                ContactField::Email => ContactPatch::email(value.clone()),
                ContactField::PhoneNumber => ContactPatch::phone_number(value.clone()),
            };
            let updated = store.update_by_id(*contact_id, patch)?;
            debug!(contact_id = %contact_id, field = %field, "enriched contact");
            Ok(Some(updated))
        }
        LinkAction::CreateSecondary {
            phone_number,
            email,
            linked_id,
        } => {
            let created = store.create(NewContact::secondary(
                phone_number.clone(),
                email.clone(),
                *linked_id,
            ))?;
            debug!(contact_id = %created.id, linked_id = %linked_id, "created secondary contact");
            Ok(Some(created))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn contact(id: u64, phone: Option<&str>, email: Option<&str>) -> Contact {
        Contact::from_new(
            ContactId(id),
            NewContact::primary(phone.map(String::from), email.map(String::from)),
            Utc::now(),
        )
        .unwrap()
    }

    fn observe(phone: Option<&str>, email: Option<&str>) -> Observation {
        Observation::new(phone.map(String::from), email.map(String::from)).unwrap()
    }

    #[test]
    fn test_exact_match_is_noop() {
        let matches = vec![contact(1, Some("123"), Some("a@x.com"))];
        let (action, rule) = decide(ContactId(1), &matches, &observe(Some("123"), Some("a@x.com")));
        assert_eq!(action, LinkAction::NoOp);
        assert_eq!(rule, LinkRule::ExactMatch);
    }

    #[test]
    fn test_exact_match_with_absent_email() {
        let matches = vec![contact(1, Some("123"), None)];
        let (action, _) = decide(ContactId(1), &matches, &observe(Some("123"), None));
        assert_eq!(action, LinkAction::NoOp);
    }

    #[test]
    fn test_phone_only_record_is_enriched() {
        let matches = vec![contact(1, Some("123"), None)];
        let (action, rule) = decide(ContactId(1), &matches, &observe(Some("123"), Some("new@x.com")));
        assert_eq!(rule, LinkRule::EnrichPhoneOnly);
        assert_eq!(
            action,
            LinkAction::Enrich {
                contact_id: ContactId(1),
                field: ContactField::Email,
                value: "new@x.com".to_string(),
            }
        );
    }

    #[test]
    fn test_email_only_record_is_enriched() {
        let matches = vec![contact(4, None, Some("a@x.com"))];
        let (action, rule) = decide(ContactId(4), &matches, &observe(Some("777"), Some("a@x.com")));
        assert_eq!(rule, LinkRule::EnrichEmailOnly);
        assert!(matches!(
            action,
            LinkAction::Enrich { contact_id: ContactId(4), field: ContactField::PhoneNumber, .. }
        ));
    }

    #[test]
    fn test_conflicting_phone_creates_secondary() {
        let matches = vec![contact(1, Some("123"), Some("a@x.com"))];
        let (action, rule) = decide(ContactId(1), &matches, &observe(Some("123"), Some("b@x.com")));
        assert_eq!(rule, LinkRule::ConflictingPhone);
        assert_eq!(
            action,
            LinkAction::CreateSecondary {
                phone_number: Some("123".to_string()),
                email: Some("b@x.com".to_string()),
                linked_id: ContactId(1),
            }
        );
    }

    #[test]
    fn test_conflicting_email_creates_secondary() {
        let matches = vec![contact(2, Some("555"), Some("a@x.com"))];
        let (_, rule) = decide(ContactId(2), &matches, &observe(Some("999"), Some("a@x.com")));
        assert_eq!(rule, LinkRule::ConflictingEmail);
    }

    #[test]
    fn test_single_field_partial_match_is_new_combination() {
        let matches = vec![contact(1, Some("123"), Some("a@x.com"))];
        let (action, rule) = decide(ContactId(1), &matches, &observe(Some("123"), None));
        assert_eq!(rule, LinkRule::NewCombination);
        assert!(matches!(action, LinkAction::CreateSecondary { email: None, .. }));
    }

    #[test]
    fn test_bridge_between_known_values_creates_secondary() {
        let matches = vec![contact(1, Some("A"), None), contact(2, None, Some("B"))];
        let (action, rule) = decide(ContactId(1), &matches, &observe(Some("A"), Some("B")));
        assert_eq!(rule, LinkRule::NewCombination);
        assert_eq!(
            action,
            LinkAction::CreateSecondary {
                phone_number: Some("A".to_string()),
                email: Some("B".to_string()),
                linked_id: ContactId(1),
            }
        );
    }

    #[test]
    fn test_first_phone_match_decides() {
        // The earliest contact with the phone already has an email, so the later
        // phone-only record is not enriched.
        let matches = vec![
            contact(1, Some("123"), Some("a@x.com")),
            contact(2, Some("123"), None),
        ];
        let (_, rule) = decide(ContactId(1), &matches, &observe(Some("123"), Some("b@x.com")));
        assert_eq!(rule, LinkRule::ConflictingPhone);
    }

    #[test]
    fn test_canonical_root_is_link_target() {
        let matches = vec![contact(7, Some("123"), Some("a@x.com"))];
        let (action, _) = decide(ContactId(3), &matches, &observe(Some("123"), Some("z@x.com")));
        assert!(matches!(
            action,
            LinkAction::CreateSecondary { linked_id: ContactId(3), .. }
        ));
    }
}
