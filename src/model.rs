//! # Data Model
//!
//! Core data structures for contact identity consolidation.
//! A [`Contact`] is either the primary (root) of an identity chain or a
//! secondary linked directly to that root.

use anyhow::{anyhow, bail, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Compact identifier for contacts, assigned monotonically by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContactId(pub u64);

impl fmt::Display for ContactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Role of a contact within its identity chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkPrecedence {
    #[default]
    Primary,
    Secondary,
}

impl fmt::Display for LinkPrecedence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkPrecedence::Primary => write!(f, "primary"),
            LinkPrecedence::Secondary => write!(f, "secondary"),
        }
    }
}

/// A stored contact observation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    pub id: ContactId,
    pub email: Option<String>,
    pub phone_number: Option<String>,
    pub link_precedence: LinkPrecedence,
    /// Root this contact is merged into; `None` for primaries.
    pub linked_id: Option<ContactId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Contact {
    /// Materialize a new contact from creation fields.
    pub fn from_new(id: ContactId, fields: NewContact, now: DateTime<Utc>) -> Result<Self> {
        let contact = Self {
            id,
            email: fields.email,
            phone_number: fields.phone_number,
            link_precedence: fields.link_precedence,
            linked_id: fields.linked_id,
            created_at: now,
            updated_at: now,
        };
        contact.validate()?;
        Ok(contact)
    }

    pub fn is_primary(&self) -> bool {
        self.link_precedence == LinkPrecedence::Primary
    }

    pub fn is_secondary(&self) -> bool {
        self.link_precedence == LinkPrecedence::Secondary
    }

    /// True when both fields equal the given pair, absence included.
    pub fn has_exact_pair(&self, phone: Option<&str>, email: Option<&str>) -> bool {
        self.phone_number.as_deref() == phone && self.email.as_deref() == email
    }

    /// Check the per-record invariants.
    pub fn validate(&self) -> Result<()> {
        if self.email.is_none() && self.phone_number.is_none() {
            bail!("contact {} has neither email nor phone number", self.id);
        }
        match (self.link_precedence, self.linked_id) {
            (LinkPrecedence::Primary, None) => {}
            (LinkPrecedence::Secondary, Some(linked)) if linked != self.id => {}
            (LinkPrecedence::Secondary, Some(_)) => {
                bail!("contact {} is linked to itself", self.id)
            }
            (precedence, linked) => bail!(
                "contact {} has precedence {} with linked id {:?}",
                self.id,
                precedence,
                linked
            ),
        }
        Ok(())
    }

    /// Apply a partial update in place, refusing illegal transitions.
    pub fn apply(&mut self, patch: &ContactPatch, now: DateTime<Utc>) -> Result<()> {
        if patch.link_precedence == Some(LinkPrecedence::Primary) && self.is_secondary() {
            return Err(anyhow!(
                "contact {} cannot be promoted back to primary",
                self.id
            ));
        }
        if let Some(email) = &patch.email {
            self.email = Some(email.clone());
        }
        if let Some(phone) = &patch.phone_number {
            self.phone_number = Some(phone.clone());
        }
        if let Some(precedence) = patch.link_precedence {
            self.link_precedence = precedence;
        }
        if let Some(linked) = patch.linked_id {
            self.linked_id = Some(linked);
        }
        self.updated_at = now;
        self.validate()
    }
}

/// Fields for creating a contact; the store assigns id and timestamps.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NewContact {
    pub email: Option<String>,
    pub phone_number: Option<String>,
    pub link_precedence: LinkPrecedence,
    pub linked_id: Option<ContactId>,
}

impl NewContact {
    pub fn primary(phone_number: Option<String>, email: Option<String>) -> Self {
        Self {
            email,
            phone_number,
            link_precedence: LinkPrecedence::Primary,
            linked_id: None,
        }
    }

    pub fn secondary(
        phone_number: Option<String>,
        email: Option<String>,
        linked_id: ContactId,
    ) -> Self {
        Self {
            email,
            phone_number,
            link_precedence: LinkPrecedence::Secondary,
            linked_id: Some(linked_id),
        }
    }
}

/// Partial update. `None` leaves a field untouched; fields are never cleared.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ContactPatch {
    pub email: Option<String>,
    pub phone_number: Option<String>,
    pub link_precedence: Option<LinkPrecedence>,
    pub linked_id: Option<ContactId>,
}

impl ContactPatch {
    pub fn email(email: impl Into<String>) -> Self {
        Self {
            email: Some(email.into()),
            ..Self::default()
        }
    }

    pub fn phone_number(phone: impl Into<String>) -> Self {
        Self {
            phone_number: Some(phone.into()),
            ..Self::default()
        }
    }

    /// Demote a root into a secondary of `root`.
    pub fn demote_to(root: ContactId) -> Self {
        Self {
            link_precedence: Some(LinkPrecedence::Secondary),
            linked_id: Some(root),
            ..Self::default()
        }
    }

    /// Repoint an existing secondary at `root`.
    pub fn relink_to(root: ContactId) -> Self {
        Self {
            linked_id: Some(root),
            ..Self::default()
        }
    }
}

/// Which contact field an enrichment fills.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContactField {
    Email,
    PhoneNumber,
}

impl fmt::Display for ContactField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContactField::Email => write!(f, "email"),
            ContactField::PhoneNumber => write!(f, "phoneNumber"),
        }
    }
}
