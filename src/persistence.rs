//! # Persistent Store
//!
//! RocksDB-backed [`ContactStore`]. Contacts live in the `contacts` column
//! family keyed by big-endian id; the phone/email/linked indexes are kept in
//! memory and rebuilt from disk on open.
//!
//! Inside a transaction all writes are staged and land in a single
//! [`WriteBatch`] on commit, so an `identify` call is either fully applied or
//! not at all.

use crate::index::ContactIndex;
use crate::model::{Contact, ContactId, ContactPatch, NewContact};
use crate::query::ContactFilter;
use crate::store::{ensure_links_to_primary, ensure_unique_member, ContactStore};
use anyhow::{anyhow, bail, Result};
use chrono::Utc;
use lru::LruCache;
use parking_lot::Mutex;
use rocksdb::{checkpoint::Checkpoint, ColumnFamilyDescriptor, IteratorMode, Options, WriteBatch, DB};
use std::collections::BTreeMap;
use std::num::NonZeroUsize;
use std::path::Path;
use tracing::{debug, info};

const CF_CONTACTS: &str = "contacts";
const CF_METADATA: &str = "metadata";

const KEY_NEXT_CONTACT_ID: &[u8] = b"next_contact_id";
const KEY_MANIFEST: &[u8] = b"manifest";

const STORAGE_FORMAT_VERSION: u32 = 1;

#[derive(Debug, serde::Serialize, serde::Deserialize)]
struct StorageManifest {
    format_version: u32,
    app_version: String,
}

#[derive(Debug, Clone, Copy)]
pub struct PersistentOpenOptions {
    pub repair: bool,
    pub cache_capacity: usize,
}

impl Default for PersistentOpenOptions {
    fn default() -> Self {
        Self {
            repair: false,
            cache_capacity: crate::config::DEFAULT_CACHE_CAPACITY,
        }
    }
}

/// Writes staged by an open transaction.
#[derive(Debug)]
struct PendingWrites {
    writes: BTreeMap<ContactId, Contact>,
    next_contact_id: u64,
    contact_count: usize,
}

pub struct PersistentStore {
    db: DB,
    index: ContactIndex,
    cache: Mutex<LruCache<ContactId, Contact>>,
    next_contact_id: u64,
    contact_count: usize,
    pending: Option<PendingWrites>,
}

impl PersistentStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_options(path, PersistentOpenOptions::default())
    }

    pub fn open_with_options(
        path: impl AsRef<Path>,
        options: PersistentOpenOptions,
    ) -> Result<Self> {
        if options.repair {
            repair_db(path.as_ref())?;
        }
        let db = open_db(path.as_ref())?;
        validate_or_init_manifest(&db)?;

        let capacity = NonZeroUsize::new(options.cache_capacity)
            .ok_or_else(|| anyhow!("cache capacity must be non-zero"))?;
        let mut store = Self {
            db,
            index: ContactIndex::new(),
            cache: Mutex::new(LruCache::new(capacity)),
            next_contact_id: 1,
            contact_count: 0,
            pending: None,
        };
        store.load_contacts_into_index()?;
        if let Some(next) = load_metadata::<u64>(&store.db, KEY_NEXT_CONTACT_ID)? {
            store.next_contact_id = store.next_contact_id.max(next);
        }
        info!(
            path = %path.as_ref().display(),
            contacts = store.contact_count,
            next_contact_id = store.next_contact_id,
            "opened contact store"
        );
        Ok(store)
    }

    pub fn next_contact_id(&self) -> u64 {
        self.next_contact_id
    }

    /// Drop every contact and reset id assignment.
    pub fn reset_data(&mut self) -> Result<()> {
        if self.pending.is_some() {
            bail!("cannot reset while a transaction is open");
        }
        clear_cf(&self.db, CF_CONTACTS)?;
        remove_metadata_key(&self.db, KEY_NEXT_CONTACT_ID)?;
        self.index.clear();
        self.cache.lock().clear();
        self.next_contact_id = 1;
        self.contact_count = 0;
        Ok(())
    }

    pub fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }

    pub fn checkpoint(&self, path: impl AsRef<Path>) -> Result<()> {
        let checkpoint = Checkpoint::new(&self.db)?;
        checkpoint.create_checkpoint(path)?;
        Ok(())
    }

    fn load_contacts_into_index(&mut self) -> Result<()> {
        let contacts_cf = self
            .db
            .cf_handle(CF_CONTACTS)
            .ok_or_else(|| anyhow!("missing contacts column family"))?;
        let mut highest = 0;
        for entry in self.db.iterator_cf(contacts_cf, IteratorMode::Start) {
            let (_key, value) = entry?;
            let contact: Contact = bincode::deserialize(&value)?;
            highest = highest.max(contact.id.0);
            self.index.insert(&contact);
            self.contact_count += 1;
        }
        self.next_contact_id = self.next_contact_id.max(highest + 1);
        Ok(())
    }

    /// Read the last committed version, bypassing staged writes.
    fn load_committed(&self, id: ContactId) -> Result<Option<Contact>> {
        if let Some(contact) = self.cache.lock().get(&id) {
            return Ok(Some(contact.clone()));
        }
        let contacts_cf = self
            .db
            .cf_handle(CF_CONTACTS)
            .ok_or_else(|| anyhow!("missing contacts column family"))?;
        let Some(bytes) = self.db.get_cf(contacts_cf, id.0.to_be_bytes())? else {
            return Ok(None);
        };
        let contact: Contact = bincode::deserialize(&bytes)?;
        self.cache.lock().put(id, contact.clone());
        Ok(Some(contact))
    }

    /// Stage `contact`, or write it through when no transaction is open.
    /// In-memory index and count only change once the write is accepted.
    fn write(&mut self, contact: Contact) -> Result<()> {
        let previous = self.get_by_id(contact.id)?;
        match &mut self.pending {
            Some(pending) => {
                pending.writes.insert(contact.id, contact.clone());
            }
            None => {
                let mut writes = BTreeMap::new();
                writes.insert(contact.id, contact.clone());
                self.write_batch(writes)?;
            }
        }
        self.index.replace(previous.as_ref(), &contact);
        if previous.is_none() {
            self.contact_count += 1;
        }
        Ok(())
    }

    /// Write a contact that takes the id `next_contact_id - 1`, restoring the
    /// id counter if the write fails.
    fn write_new(&mut self, contact: Contact, previous_next_id: u64) -> Result<()> {
        if let Err(err) = self.write(contact) {
            self.next_contact_id = previous_next_id;
            return Err(err);
        }
        Ok(())
    }

    fn write_batch(&self, writes: BTreeMap<ContactId, Contact>) -> Result<()> {
        let contacts_cf = self
            .db
            .cf_handle(CF_CONTACTS)
            .ok_or_else(|| anyhow!("missing contacts column family"))?;
        let metadata_cf = self
            .db
            .cf_handle(CF_METADATA)
            .ok_or_else(|| anyhow!("missing metadata column family"))?;

        let mut batch = WriteBatch::default();
        for contact in writes.values() {
            batch.put_cf(contacts_cf, contact.id.0.to_be_bytes(), bincode::serialize(contact)?);
        }
        batch.put_cf(
            metadata_cf,
            KEY_NEXT_CONTACT_ID,
            bincode::serialize(&self.next_contact_id)?,
        );
        self.db.write(batch)?;

        let mut cache = self.cache.lock();
        for (id, contact) in writes {
            cache.put(id, contact);
        }
        Ok(())
    }
}

impl ContactStore for PersistentStore {
    fn get_by_id(&self, id: ContactId) -> Result<Option<Contact>> {
        if let Some(contact) = self.pending.as_ref().and_then(|p| p.writes.get(&id)) {
            return Ok(Some(contact.clone()));
        }
        self.load_committed(id)
    }

    fn find_many(&self, filter: &ContactFilter) -> Result<Vec<Contact>> {
        let mut contacts = Vec::new();
        for id in self.index.candidates(filter) {
            if let Some(contact) = self.get_by_id(id)? {
                if filter.matches(&contact) {
                    contacts.push(contact);
                }
            }
        }
        Ok(contacts)
    }

    fn create(&mut self, fields: NewContact) -> Result<Contact> {
        ensure_unique_member(self, &fields)?;
        let contact = Contact::from_new(ContactId(self.next_contact_id), fields, Utc::now())?;
        ensure_links_to_primary(self, &contact)?;
        let previous_next_id = self.next_contact_id;
        self.next_contact_id += 1;
        self.write_new(contact.clone(), previous_next_id)?;
        Ok(contact)
    }

    fn update_by_id(&mut self, id: ContactId, patch: ContactPatch) -> Result<Contact> {
        let mut contact = self
            .get_by_id(id)?
            .ok_or_else(|| anyhow!("contact {} not found", id))?;
        contact.apply(&patch, Utc::now())?;
        if patch.linked_id.is_some() {
            ensure_links_to_primary(self, &contact)?;
        }
        self.write(contact.clone())?;
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
        if self.get_by_id(contact.id)?.is_some() {
            bail!("contact {} already exists", contact.id);
        }
        let previous_next_id = self.next_contact_id;
        self.next_contact_id = self.next_contact_id.max(contact.id.0 + 1);
        self.write_new(contact, previous_next_id)
    }

    fn len(&self) -> usize {
        self.contact_count
    }

    fn begin(&mut self) -> Result<()> {
        if self.pending.is_some() {
            bail!("transaction already open");
        }
        self.pending = Some(PendingWrites {
            writes: BTreeMap::new(),
            next_contact_id: self.next_contact_id,
            contact_count: self.contact_count,
        });
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        let pending = self
            .pending
            .take()
            .ok_or_else(|| anyhow!("no open transaction to commit"))?;
        if pending.writes.is_empty() {
            return Ok(());
        }
        debug!(writes = pending.writes.len(), "committing contact batch");
        if let Err(err) = self.write_batch(pending.writes.clone()) {
            self.pending = Some(pending);
            self.rollback()?;
            return Err(err);
        }
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        let pending = self
            .pending
            .take()
            .ok_or_else(|| anyhow!("no open transaction to roll back"))?;
        for (id, staged) in &pending.writes {
            self.index.remove(staged);
            if let Some(committed) = self.load_committed(*id)? {
                self.index.insert(&committed);
            }
        }
        self.next_contact_id = pending.next_contact_id;
        self.contact_count = pending.contact_count;
        debug!(discarded = pending.writes.len(), "rolled back contact batch");
        Ok(())
    }
}

fn open_db(path: &Path) -> Result<DB> {
    let mut options = Options::default();
    options.create_if_missing(true);
    options.create_missing_column_families(true);
    options.set_paranoid_checks(true);
    let cfs = vec![
        ColumnFamilyDescriptor::new(CF_CONTACTS, Options::default()),
        ColumnFamilyDescriptor::new(CF_METADATA, Options::default()),
    ];
    Ok(DB::open_cf_descriptors(&options, path, cfs)?)
}

fn repair_db(path: &Path) -> Result<()> {
    let mut options = Options::default();
    options.create_if_missing(true);
    DB::repair(&options, path)?;
    Ok(())
}

fn validate_or_init_manifest(db: &DB) -> Result<()> {
    let metadata_cf = db
        .cf_handle(CF_METADATA)
        .ok_or_else(|| anyhow!("missing metadata column family"))?;
    if let Some(bytes) = db.get_cf(metadata_cf, KEY_MANIFEST)? {
        let manifest: StorageManifest = bincode::deserialize(&bytes)?;
        if manifest.format_version != STORAGE_FORMAT_VERSION {
            return Err(anyhow!(
                "storage format version mismatch: expected {}, found {}",
                STORAGE_FORMAT_VERSION,
                manifest.format_version
            ));
        }
        return Ok(());
    }

    let manifest = StorageManifest {
        format_version: STORAGE_FORMAT_VERSION,
        app_version: env!("CARGO_PKG_VERSION").to_string(),
    };
    let bytes = bincode::serialize(&manifest)?;
    db.put_cf(metadata_cf, KEY_MANIFEST, bytes)?;
    Ok(())
}

fn load_metadata<T: serde::de::DeserializeOwned>(db: &DB, key: &[u8]) -> Result<Option<T>> {
    let metadata_cf = db
        .cf_handle(CF_METADATA)
        .ok_or_else(|| anyhow!("missing metadata column family"))?;
    if let Some(bytes) = db.get_cf(metadata_cf, key)? {
        Ok(Some(bincode::deserialize(&bytes)?))
    } else {
        Ok(None)
    }
}

fn clear_cf(db: &DB, cf_name: &str) -> Result<()> {
    let cf = db
        .cf_handle(cf_name)
        .ok_or_else(|| anyhow!("missing column family {cf_name}"))?;
    let keys: Vec<Vec<u8>> = db
        .iterator_cf(cf, IteratorMode::Start)
        .map(|entry| entry.map(|(key, _)| key.to_vec()))
        .collect::<Result<Vec<_>, _>>()?;
    if keys.is_empty() {
        return Ok(());
    }
    let mut batch = WriteBatch::default();
    for key in keys {
        batch.delete_cf(cf, key);
    }
    db.write(batch)?;
    Ok(())
}

fn remove_metadata_key(db: &DB, key: &[u8]) -> Result<()> {
    let metadata_cf = db
        .cf_handle(CF_METADATA)
        .ok_or_else(|| anyhow!("missing metadata column family"))?;
    db.delete_cf(metadata_cf, key)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn phone(value: &str) -> Option<String> {
        Some(value.to_string())
    }

    #[test]
    fn persistent_store_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path();

        let root_id = {
            let mut store = PersistentStore::open(path).unwrap();
            let root = store.create(NewContact::primary(phone("123"), None)).unwrap();
            store
                .create(NewContact::secondary(
                    phone("123"),
                    Some("b@x.com".to_string()),
                    root.id,
                ))
                .unwrap();
            store.flush().unwrap();
            root.id
        };

        let store = PersistentStore::open(path).unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.next_contact_id(), 3);
        let family = store
            .find_many(&ContactFilter::IdOrLinkedIdEquals(root_id))
            .unwrap();
        assert_eq!(family.len(), 2);
    }

    #[test]
    fn staged_writes_are_visible_then_discarded() {
        let dir = tempdir().unwrap();
        let mut store = PersistentStore::open(dir.path()).unwrap();
        let root = store.create(NewContact::primary(phone("123"), None)).unwrap();

        store.begin().unwrap();
        store
            .update_by_id(root.id, ContactPatch::email("a@x.com"))
            .unwrap();
        let staged = store
            .find_many(&ContactFilter::ByEmail("a@x.com".to_string()))
            .unwrap();
        assert_eq!(staged.len(), 1);
        store.rollback().unwrap();

        assert!(store
            .find_many(&ContactFilter::ByEmail("a@x.com".to_string()))
            .unwrap()
            .is_empty());
        assert_eq!(store.get_by_id(root.id).unwrap().unwrap().email, None);
    }

    #[test]
    fn uncommitted_transaction_does_not_survive_reopen() {
        let dir = tempdir().unwrap();
        {
            let mut store = PersistentStore::open(dir.path()).unwrap();
            store.create(NewContact::primary(phone("1"), None)).unwrap();
            store.begin().unwrap();
            store.create(NewContact::primary(phone("2"), None)).unwrap();
        }
        let store = PersistentStore::open(dir.path()).unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.next_contact_id(), 2);
    }

    #[test]
    fn failed_write_through_leaves_memory_state_alone() {
        let dir = tempdir().unwrap();
        let mut store = PersistentStore::open(dir.path()).unwrap();
        let root = store.create(NewContact::primary(phone("1"), None)).unwrap();

        // Without the contacts column family every disk write fails, while
        // `root` is still served from the cache.
        store.db.drop_cf(CF_CONTACTS).unwrap();

        assert!(store
            .update_by_id(root.id, ContactPatch::email("a@x.com"))
            .is_err());
        assert!(store
            .index
            .candidates(&ContactFilter::ByEmail("a@x.com".to_string()))
            .is_empty());
        assert_eq!(store.get_by_id(root.id).unwrap().unwrap().email, None);

        assert!(store.create(NewContact::primary(phone("2"), None)).is_err());
        assert_eq!(store.next_contact_id(), 2);
        assert_eq!(store.len(), 1);
        assert!(store
            .index
            .candidates(&ContactFilter::ByPhone("2".to_string()))
            .is_empty());
    }

    #[test]
    fn reset_clears_everything() {
        let dir = tempdir().unwrap();
        let mut store = PersistentStore::open(dir.path()).unwrap();
        store.create(NewContact::primary(phone("1"), None)).unwrap();
        store.reset_data().unwrap();
        assert!(store.is_empty());
        assert_eq!(store.next_contact_id(), 1);
        assert!(store
            .find_many(&ContactFilter::ByPhone("1".to_string()))
            .unwrap()
            .is_empty());
    }
}
