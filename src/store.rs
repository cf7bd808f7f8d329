//! # Store Module
//!
//! The [`ContactStore`] contract the identity pipeline runs against, plus the
//! in-memory [`Store`] implementation.
//!
//! Stores are transactional: [`ContactStore::begin`] opens a unit of work that
//! is either made durable by [`ContactStore::commit`] or undone entirely by
//! [`ContactStore::rollback`]. Outside a transaction every write commits
//! immediately.

use crate::index::ContactIndex;
use crate::model::{Contact, ContactId, ContactPatch, LinkPrecedence, NewContact};
use crate::query::ContactFilter;
use anyhow::{anyhow, bail, Result};
use chrono::Utc;
use std::collections::BTreeMap;

/// Storage operations required by the identity pipeline.
pub trait ContactStore: Send {
    fn get_by_id(&self, id: ContactId) -> Result<Option<Contact>>;

    /// All contacts satisfying `filter`, ordered by ascending id.
    fn find_many(&self, filter: &ContactFilter) -> Result<Vec<Contact>>;

    /// Insert a new contact with a freshly assigned id.
    fn create(&mut self, fields: NewContact) -> Result<Contact>;

    fn update_by_id(&mut self, id: ContactId, patch: ContactPatch) -> Result<Contact>;

    /// Apply `patch` to every contact matching `filter`; returns the count.
    fn update_many(&mut self, filter: &ContactFilter, patch: ContactPatch) -> Result<usize>;

    /// Import a fully formed contact, keeping its id and timestamps.
    fn insert_contact(&mut self, contact: Contact) -> Result<()>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn begin(&mut self) -> Result<()>;

    fn commit(&mut self) -> Result<()>;

    fn rollback(&mut self) -> Result<()>;
}

/// Reject a secondary that would duplicate an existing member of the same root.
///
/// A retried create after an ambiguous failure lands here instead of adding a
/// second identical row.
pub(crate) fn ensure_unique_member(store: &dyn ContactStore, fields: &NewContact) -> Result<()> {
    let Some(root) = fields.linked_id else {
        return Ok(());
    };
    let duplicate = store
        .find_many(&ContactFilter::LinkedIdEquals(root))?
        .into_iter()
        .find(|member| {
            member.has_exact_pair(fields.phone_number.as_deref(), fields.email.as_deref())
        });
    if let Some(existing) = duplicate {
        bail!(
            "contact {} already links ({:?}, {:?}) to root {}",
            existing.id,
            fields.phone_number,
            fields.email,
            root
        );
    }
    Ok(())
}

/// Refuse links that would point a contact at anything but an existing primary.
pub(crate) fn ensure_links_to_primary(store: &dyn ContactStore, contact: &Contact) -> Result<()> {
    let Some(root) = contact.linked_id else {
        return Ok(());
    };
    match store.get_by_id(root)? {
        Some(target) if target.link_precedence == LinkPrecedence::Primary => Ok(()),
        Some(_) => bail!("contact {} would link to non-primary {}", contact.id, root),
        None => bail!("contact {} would link to missing contact {}", contact.id, root),
    }
}

#[derive(Debug, Clone)]
struct UndoLog {
    /// Pre-images in write order; `None` marks a contact created in this transaction.
    entries: Vec<(ContactId, Option<Contact>)>,
    next_contact_id: u64,
}

/// In-memory contact store.
#[derive(Debug, Clone)]
pub struct Store {
    contacts: BTreeMap<ContactId, Contact>,
    index: ContactIndex,
    /// Next id to hand out; ids start at 1
    next_contact_id: u64,
    undo: Option<UndoLog>,
}

impl Store {
    pub fn new() -> Self {
        Self {
            contacts: BTreeMap::new(),
            index: ContactIndex::new(),
            next_contact_id: 1,
            undo: None,
        }
    }

    pub fn next_contact_id(&self) -> u64 {
        self.next_contact_id
    }

    pub fn set_next_contact_id(&mut self, next: u64) {
        self.next_contact_id = self.next_contact_id.max(next);
    }

    /// Iterate all contacts in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Contact> {
        self.contacts.values()
    }

    pub fn in_transaction(&self) -> bool {
        self.undo.is_some()
    }

    fn write(&mut self, contact: Contact) -> Option<Contact> {
        let previous = self.contacts.insert(contact.id, contact.clone());
        self.index.replace(previous.as_ref(), &contact);
        if let Some(undo) = &mut self.undo {
            undo.entries.push((contact.id, previous.clone()));
        }
        previous
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl ContactStore for Store {
    fn get_by_id(&self, id: ContactId) -> Result<Option<Contact>> {
        Ok(self.contacts.get(&id).cloned())
    }

    fn find_many(&self, filter: &ContactFilter) -> Result<Vec<Contact>> {
        Ok(self
            .index
            .candidates(filter)
            .into_iter()
            .filter_map(|id| self.contacts.get(&id))
            .filter(|contact| filter.matches(contact))
            .cloned()
            .collect())
    }

    fn create(&mut self, fields: NewContact) -> Result<Contact> {
        ensure_unique_member(self, &fields)?;
        let contact = Contact::from_new(ContactId(self.next_contact_id), fields, Utc::now())?;
        ensure_links_to_primary(self, &contact)?;
        self.next_contact_id += 1;
        self.write(contact.clone());
        Ok(contact)
    }

    fn update_by_id(&mut self, id: ContactId, patch: ContactPatch) -> Result<Contact> {
        let mut contact = self
            .contacts
            .get(&id)
            .cloned()
            .ok_or_else(|| anyhow!("contact {} not found", id))?;
        contact.apply(&patch, Utc::now())?;
        if patch.linked_id.is_some() {
            ensure_links_to_primary(self, &contact)?;
        }
        self.write(contact.clone());
        Ok(contact)
    }

    fn update_many(&mut self, filter: &ContactFilter, patch: ContactPatch) -> Result<usize> {
        let targets: Vec<ContactId> = self.find_many(filter)?.iter().map(|c| c.id).collect();
        for id in &targets {
            self.update_by_id(*id, patch.clone())?;
        }
        Ok(targets.len())
    }

    fn insert_contact(&mut self, contact: Contact) -> Result<()> {
        contact.validate()?;
        if self.contacts.contains_key(&contact.id) {
            bail!("contact {} already exists", contact.id);
        }
        self.set_next_contact_id(contact.id.0 + 1);
        self.write(contact);
        Ok(())
    }

    fn len(&self) -> usize {
        self.contacts.len()
    }

    fn begin(&mut self) -> Result<()> {
        if self.undo.is_some() {
            bail!("transaction already open");
        }
        self.undo = Some(UndoLog {
            entries: Vec::new(),
            next_contact_id: self.next_contact_id,
        });
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        self.undo
            .take()
            .map(|_| ())
            .ok_or_else(|| anyhow!("no open transaction to commit"))
    }

    fn rollback(&mut self) -> Result<()> {
        let undo = self
            .undo
            .take()
            .ok_or_else(|| anyhow!("no open transaction to roll back"))?;
        for (id, previous) in undo.entries.into_iter().rev() {
            if let Some(current) = self.contacts.remove(&id) {
                self.index.remove(&current);
            }
            if let Some(previous) = previous {
                self.index.insert(&previous);
                self.contacts.insert(id, previous);
            }
        }
        self.next_contact_id = undo.next_contact_id;
        Ok(())
    }
}
