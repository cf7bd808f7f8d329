//! # Indexing Module
//!
//! Secondary indexes over contacts (phone, email, linked root) used by both
//! store implementations to answer [`ContactFilter`] lookups without a scan.

use crate::model::{Contact, ContactId};
use crate::query::ContactFilter;
use hashbrown::HashMap;
use std::collections::BTreeSet;

type IdSet = BTreeSet<ContactId>;

#[derive(Debug, Clone, Default)]
pub struct ContactIndex {
    by_phone: HashMap<String, IdSet>,
    by_email: HashMap<String, IdSet>,
    /// root id -> ids of contacts whose `linked_id` is that root
    by_linked: HashMap<ContactId, IdSet>,
}

impl ContactIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, contact: &Contact) {
        if let Some(phone) = &contact.phone_number {
            self.by_phone
                .entry(phone.clone())
                .or_default()
                .insert(contact.id);
        }
        if let Some(email) = &contact.email {
            self.by_email
                .entry(email.clone())
                .or_default()
                .insert(contact.id);
        }
        if let Some(linked) = contact.linked_id {
            self.by_linked.entry(linked).or_default().insert(contact.id);
        }
    }

    pub fn remove(&mut self, contact: &Contact) {
        if let Some(phone) = &contact.phone_number {
            remove_from(&mut self.by_phone, phone.as_str(), contact.id);
        }
        if let Some(email) = &contact.email {
            remove_from(&mut self.by_email, email.as_str(), contact.id);
        }
        if let Some(linked) = contact.linked_id {
            remove_from(&mut self.by_linked, &linked, contact.id);
        }
    }

    /// Swap the index entries of `old` for those of `new`.
    pub fn replace(&mut self, old: Option<&Contact>, new: &Contact) {
        if let Some(old) = old {
            self.remove(old);
        }
        self.insert(new);
    }

    /// Superset of the ids that can satisfy `filter`, in ascending order.
    ///
    /// `IdIn` ids are returned as given; callers still need to load and
    /// re-check each candidate.
    pub fn candidates(&self, filter: &ContactFilter) -> IdSet {
        match filter {
            ContactFilter::ByPhone(phone) => {
                self.by_phone.get(phone.as_str()).cloned().unwrap_or_default()
            }
            ContactFilter::ByEmail(email) => {
                self.by_email.get(email.as_str()).cloned().unwrap_or_default()
            }
            ContactFilter::Or(filters) => filters
                .iter()
                .flat_map(|f| self.candidates(f))
                .collect(),
            ContactFilter::IdIn(ids) => ids.iter().copied().collect(),
            ContactFilter::IdOrLinkedIdEquals(id) => {
                let mut ids = self.linked_to(*id);
                ids.insert(*id);
                ids
            }
            ContactFilter::LinkedIdEquals(id) => self.linked_to(*id),
        }
    }

    fn linked_to(&self, root: ContactId) -> IdSet {
        self.by_linked.get(&root).cloned().unwrap_or_default()
    }

    pub fn clear(&mut self) {
        self.by_phone.clear();
        self.by_email.clear();
        self.by_linked.clear();
    }
}

fn remove_from<K, Q>(map: &mut HashMap<K, IdSet>, key: &Q, id: ContactId)
where
    K: std::hash::Hash + Eq + std::borrow::Borrow<Q>,
    Q: std::hash::Hash + Eq + ?Sized,
{
    let emptied = match map.get_mut(key) {
        Some(ids) => {
            ids.remove(&id);
            ids.is_empty()
        }
        None => false,
    };
    if emptied {
        map.remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NewContact;
    use chrono::Utc;

    fn primary(id: u64, phone: Option<&str>, email: Option<&str>) -> Contact {
        Contact::from_new(
            ContactId(id),
            NewContact::primary(phone.map(String::from), email.map(String::from)),
            Utc::now(),
        )
        .unwrap()
    }

    #[test]
    fn test_or_candidates_are_a_union() {
        let mut index = ContactIndex::new();
        index.insert(&primary(1, Some("123"), None));
        index.insert(&primary(2, None, Some("a@x.com")));
        index.insert(&primary(3, Some("999"), Some("b@x.com")));

        let filter = ContactFilter::phone_or_email(Some("123"), Some("a@x.com")).unwrap();
        let ids: Vec<_> = index.candidates(&filter).into_iter().collect();
        assert_eq!(ids, vec![ContactId(1), ContactId(2)]);
    }

    #[test]
    fn test_replace_moves_linked_entry() {
        let mut index = ContactIndex::new();
        let mut member = Contact::from_new(
            ContactId(4),
            NewContact::secondary(Some("123".to_string()), None, ContactId(2)),
            Utc::now(),
        )
        .unwrap();
        index.insert(&member);

        let old = member.clone();
        member.linked_id = Some(ContactId(1));
        index.replace(Some(&old), &member);

        assert!(index
            .candidates(&ContactFilter::LinkedIdEquals(ContactId(2)))
            .is_empty());
        assert!(index
            .candidates(&ContactFilter::LinkedIdEquals(ContactId(1)))
            .contains(&ContactId(4)));
    }
}
