use anyhow::bail;
use unicontact::model::{Contact, ContactId, ContactPatch, NewContact};
use unicontact::query::ContactFilter;
use unicontact::ContactStore;

#[allow(dead_code)]
pub fn some(value: &str) -> Option<String> {
    Some(value.to_string())
}

/// Store wrapper whose creates start failing after a fixed number succeed.
#[allow(dead_code)]
pub struct FailingStore<S> {
    pub inner: S,
    creates_left: usize,
}

#[allow(dead_code)]
impl<S: ContactStore> FailingStore<S> {
    pub fn new(inner: S, creates_before_failure: usize) -> Self {
        Self {
            inner,
            creates_left: creates_before_failure,
        }
    }
}

impl<S: ContactStore> ContactStore for FailingStore<S> {
    fn get_by_id(&self, id: ContactId) -> anyhow::Result<Option<Contact>> {
        self.inner.get_by_id(id)
    }

    fn find_many(&self, filter: &ContactFilter) -> anyhow::Result<Vec<Contact>> {
        self.inner.find_many(filter)
    }

    fn create(&mut self, fields: NewContact) -> anyhow::Result<Contact> {
        if self.creates_left == 0 {
            bail!("injected create failure");
        }
        self.creates_left -= 1;
        self.inner.create(fields)
    }

    fn update_by_id(&mut self, id: ContactId, patch: ContactPatch) -> anyhow::Result<Contact> {
        self.inner.update_by_id(id, patch)
    }

    fn update_many(&mut self, filter: &ContactFilter, patch: ContactPatch) -> anyhow::Result<usize> {
        self.inner.update_many(filter, patch)
    }

    fn insert_contact(&mut self, contact: Contact) -> anyhow::Result<()> {
        self.inner.insert_contact(contact)
    }

    fn len(&self) -> usize {
        self.inner.len()
    }

    fn begin(&mut self) -> anyhow::Result<()> {
        self.inner.begin()
    }

    fn commit(&mut self) -> anyhow::Result<()> {
        self.inner.commit()
    }

    fn rollback(&mut self) -> anyhow::Result<()> {
        self.inner.rollback()
    }
}

/// Every secondary points straight at an existing primary.
#[allow(dead_code)]
pub fn assert_depth_one(store: &dyn ContactStore, ids: impl IntoIterator<Item = ContactId>) {
    for id in ids {
        let contact = store
            .get_by_id(id)
            .unwrap()
            .unwrap_or_else(|| panic!("contact {id} missing"));
        match contact.linked_id {
            None => assert!(contact.is_primary(), "contact {id} unlinked but secondary"),
            Some(root) => {
                assert!(contact.is_secondary(), "contact {id} linked but primary");
                let target = store.get_by_id(root).unwrap().expect("link target exists");
                assert!(target.is_primary(), "contact {id} links to non-primary {root}");
            }
        }
    }
}
