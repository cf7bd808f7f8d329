//! # Unicontact
//!
//! Contact identity consolidation. Every observation of a phone number and/or
//! an email is linked into a forest of identity chains: one primary contact per
//! identity, every other contact a secondary pointing straight at it.
//!
//! Observations that bridge two identities merge them, with the oldest
//! primary surviving. Each call to [`Unicontact::identify`] returns the
//! aggregated view of the identity the observation belongs to.

pub mod config;
pub mod consolidate;
pub mod decision;
pub mod error;
pub mod http;
pub mod index;
pub mod linker;
pub mod matcher;
pub mod model;
pub mod persistence;
pub mod query;
pub mod resolver;
pub mod store;
pub mod test_support;
pub mod view;

// Re-export main types for convenience
pub use config::UniContactConfig;
pub use error::IdentifyError;
pub use linker::LinkOutcome;
pub use matcher::Observation;
pub use model::{Contact, ContactId, LinkPrecedence};
pub use persistence::PersistentStore;
pub use store::{ContactStore, Store};
pub use view::{IdentifyResponse, IdentityView};

use tracing::{debug, error, instrument, warn};

/// Main API for identity reconciliation.
pub struct Unicontact {
    store: Box<dyn ContactStore>,
    max_chain_hops: Option<usize>,
}

impl Unicontact {
    /// Create an instance backed by an in-memory store.
    pub fn new() -> Self {
        Self::with_store(Store::new())
    }

    /// Create an instance with a custom store implementation.
    pub fn with_store<S>(store: S) -> Self
    where
        S: ContactStore + 'static,
    {
        Self {
            store: Box::new(store),
            max_chain_hops: None,
        }
    }

    /// Cap root walks at `hops` instead of the store size.
    pub fn with_max_chain_hops(mut self, hops: Option<usize>) -> Self {
        self.max_chain_hops = hops;
        self
    }

    pub fn store(&self) -> &dyn ContactStore {
        self.store.as_ref()
    }

    pub fn store_mut(&mut self) -> &mut dyn ContactStore {
        self.store.as_mut()
    }

    /// Get the number of contacts in the store.
    pub fn contact_count(&self) -> usize {
        self.store.len()
    }

    /// Link an observation and return the identity it belongs to.
    ///
    /// All reads and writes of one call run inside a single store transaction;
    /// on any failure the store is rolled back and no partial write survives.
    pub fn identify(
        &mut self,
        phone_number: Option<String>,
        email: Option<String>,
    ) -> Result<IdentifyResponse, IdentifyError> {
        self.identify_detailed(phone_number, email)
            .map(|outcome| outcome.view.into())
    }

    /// Like [`identify`](Self::identify), also reporting what the call changed.
    #[instrument(
        level = "debug",
        skip_all,
        fields(has_phone = phone_number.is_some(), has_email = email.is_some())
    )]
    pub fn identify_detailed(
        &mut self,
        phone_number: Option<String>,
        email: Option<String>,
    ) -> Result<LinkOutcome, IdentifyError> {
        let observation = Observation::new(phone_number, email)?;

        self.store.begin()?;
        match linker::link_observation(self.store.as_mut(), &observation, self.max_chain_hops) {
            Ok(outcome) => {
                self.store.commit()?;
                debug!(
                    primary = %outcome.view.primary_contact_id,
                    secondaries = outcome.view.secondary_contact_ids.len(),
                    "identify committed"
                );
                Ok(outcome)
            }
            Err(err) => {
                if let Err(rollback_err) = self.store.rollback() {
                    error!(error = %rollback_err, "rollback failed");
                }
                if err.is_integrity_fault() {
                    error!(error = %err, "identify aborted on corrupted contact chain");
                } else {
                    warn!(error = %err, "identify failed");
                }
                Err(err)
            }
        }
    }
}

impl Default for Unicontact {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn some(value: &str) -> Option<String> {
        Some(value.to_string())
    }

    #[test]
    fn test_identify_rejects_empty_request() {
        let mut engine = Unicontact::new();
        let err = engine.identify(None, some("   ")).unwrap_err();
        assert!(err.is_client_error());
        assert_eq!(engine.contact_count(), 0);
    }

    #[test]
    fn test_identify_is_idempotent() {
        let mut engine = Unicontact::new();
        let first = engine.identify(some("123"), some("a@x.com")).unwrap();
        let second = engine.identify(some("123"), some("a@x.com")).unwrap();
        assert_eq!(first, second);
        assert_eq!(engine.contact_count(), 1);
    }

    #[derive(Clone, Default)]
    struct CapturedLogs(std::sync::Arc<parking_lot::Mutex<Vec<u8>>>);

    impl std::io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_identify_span_omits_contact_values() {
        let logs = CapturedLogs::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            let mut engine = Unicontact::new();
            engine
                .identify(some("5550199"), some("private@example.com"))
                .unwrap();
        });

        let output = String::from_utf8(logs.0.lock().clone()).unwrap();
        assert!(output.contains("has_phone=true"));
        assert!(output.contains("has_email=true"));
        assert!(!output.contains("5550199"));
        assert!(!output.contains("private@example.com"));
    }

    #[test]
    fn test_failed_identify_leaves_store_untouched() {
        let mut store = Store::new();
        let root = Contact::from_new(
            ContactId(1),
            model::NewContact::primary(some("1"), None),
            chrono::Utc::now(),
        )
        .unwrap();
        store.insert_contact(root).unwrap();
        // Secondary pointing at a contact that does not exist.
        let orphan = Contact {
            id: ContactId(2),
            email: some("o@x.com"),
            phone_number: None,
            link_precedence: LinkPrecedence::Secondary,
            linked_id: Some(ContactId(9)),
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        };
        store.insert_contact(orphan).unwrap();
        let mut engine = Unicontact::with_store(store);

        let err = engine.identify(some("1"), some("o@x.com")).unwrap_err();
        assert!(err.is_integrity_fault());
        assert_eq!(engine.contact_count(), 2);
        let root = engine.store().get_by_id(ContactId(1)).unwrap().unwrap();
        assert!(root.is_primary());
        assert_eq!(root.email, None);
    }
}
