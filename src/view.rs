//! # View Builder
//!
//! Aggregates a canonical root and its members into the response shape
//! returned by `identify`.

use crate::error::{IdentifyError, Result};
use crate::model::{Contact, ContactId};
use crate::query::ContactFilter;
use crate::store::ContactStore;
use serde::{Deserialize, Serialize};

/// Aggregated identity for one canonical root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityView {
    #[serde(with = "id_as_string")]
    pub primary_contact_id: ContactId,
    pub emails: Vec<String>,
    pub phone_numbers: Vec<String>,
    pub secondary_contact_ids: Vec<ContactId>,
}

/// Top-level `identify` response body: `{"contact": {...}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentifyResponse {
    pub contact: IdentityView,
}

impl From<IdentityView> for IdentifyResponse {
    fn from(contact: IdentityView) -> Self {
        Self { contact }
    }
}

impl IdentityView {
    /// View of a lone primary with no members.
    pub fn single(contact: &Contact) -> Self {
        Self::from_members(contact, &[])
    }

    /// Assemble a view from the root and its members (any order).
    pub fn from_members(root: &Contact, members: &[Contact]) -> Self {
        let mut members: Vec<&Contact> = members.iter().filter(|c| c.id != root.id).collect();
        members.sort_by_key(|c| c.id);

        let mut emails = Vec::new();
        let mut phone_numbers = Vec::new();
        for contact in std::iter::once(root).chain(members.iter().copied()) {
            if let Some(email) = &contact.email {
                if !emails.contains(email) {
                    emails.push(email.clone());
                }
            }
            if let Some(phone) = &contact.phone_number {
                if !phone_numbers.contains(phone) {
                    phone_numbers.push(phone.clone());
                }
            }
        }

        let secondary_contact_ids = members
            .iter()
            .filter(|c| c.is_secondary())
            .map(|c| c.id)
            .collect();

        Self {
            primary_contact_id: root.id,
            emails,
            phone_numbers,
            secondary_contact_ids,
        }
    }
}

/// Reload the chain rooted at `canonical` and aggregate it.
pub fn build_view(store: &dyn ContactStore, canonical: ContactId) -> Result<IdentityView> {
    let family = store.find_many(&ContactFilter::IdOrLinkedIdEquals(canonical))?;
    let root = family
        .iter()
        .find(|c| c.id == canonical)
        .ok_or(IdentifyError::NotFound(canonical))?;
    if !root.is_primary() {
        return Err(IdentifyError::DataIntegrity(format!(
            "canonical contact {canonical} is not primary"
        )));
    }
    Ok(IdentityView::from_members(root, &family))
}

mod id_as_string {
    use crate::model::ContactId;
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(id: &ContactId, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(id)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<ContactId, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map(ContactId).map_err(D::Error::custom)
    }
}
