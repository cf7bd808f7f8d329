//! # Contact Filters
//!
//! Typed predicates the identity pipeline hands to a [`ContactStore`](crate::store::ContactStore).
//! Stores use [`ContactFilter::matches`] as the final word and may narrow the
//! scan with their own indexes first.

use crate::model::{Contact, ContactId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContactFilter {
    ByPhone(String),
    ByEmail(String),
    Or(Vec<ContactFilter>),
    IdIn(Vec<ContactId>),
    /// The contact itself or any contact linked to it.
    IdOrLinkedIdEquals(ContactId),
    LinkedIdEquals(ContactId),
}

impl ContactFilter {
    /// Disjunction of phone/email equality, skipping absent fields.
    ///
    /// Returns `None` when neither field is present so a caller can never
    /// end up matching on null.
    pub fn phone_or_email(phone: Option<&str>, email: Option<&str>) -> Option<Self> {
        let mut clauses = Vec::with_capacity(2);
        if let Some(phone) = phone {
            clauses.push(ContactFilter::ByPhone(phone.to_string()));
        }
        if let Some(email) = email {
            clauses.push(ContactFilter::ByEmail(email.to_string()));
        }
        match clauses.len() {
            0 => None,
            1 => clauses.pop(),
            _ => Some(ContactFilter::Or(clauses)),
        }
    }

    pub fn matches(&self, contact: &Contact) -> bool {
        match self {
            ContactFilter::ByPhone(phone) => contact.phone_number.as_deref() == Some(phone.as_str()),
            ContactFilter::ByEmail(email) => contact.email.as_deref() == Some(email.as_str()),
            ContactFilter::Or(filters) => filters.iter().any(|f| f.matches(contact)),
            ContactFilter::IdIn(ids) => ids.contains(&contact.id),
            ContactFilter::IdOrLinkedIdEquals(id) => {
                contact.id == *id || contact.linked_id == Some(*id)
            }
            ContactFilter::LinkedIdEquals(id) => contact.linked_id == Some(*id),
        }
    }
}
