//! # Root Resolver
//!
//! Follows `linked_id` from any contact to the primary at the root of its
//! chain. The walk is iterative and bounded: it fails on a revisited id or
//! once it has taken more hops than there are contacts in the store.

use crate::error::{IdentifyError, Result};
use crate::model::ContactId;
use crate::store::ContactStore;
use rustc_hash::FxHashSet;
use tracing::error;

/// Upper bound on hops for a walk over `store`.
pub fn hop_limit(store: &dyn ContactStore, max_chain_hops: Option<usize>) -> usize {
    let known = store.len().max(1);
    match max_chain_hops {
        Some(cap) => known.min(cap.max(1)),
        None => known,
    }
}

/// Resolve `contact_id` to the id of its canonical primary.
pub fn resolve_root(
    store: &dyn ContactStore,
    contact_id: ContactId,
    max_hops: usize,
) -> Result<ContactId> {
    let mut visited = FxHashSet::default();
    let mut current = contact_id;

    loop {
        if !visited.insert(current) {
            error!(start = %contact_id, at = %current, "cycle in contact chain");
            return Err(IdentifyError::DataIntegrity(format!(
                "cycle in chain starting at contact {contact_id} (revisited {current})"
            )));
        }
        if visited.len() > max_hops + 1 {
            error!(start = %contact_id, max_hops, "contact chain exceeds hop limit");
            return Err(IdentifyError::DataIntegrity(format!(
                "chain starting at contact {contact_id} exceeds {max_hops} hops"
            )));
        }

        let contact = store
            .get_by_id(current)?
            .ok_or(IdentifyError::NotFound(current))?;

        if contact.is_primary() {
            if contact.linked_id.is_some() {
                return Err(IdentifyError::DataIntegrity(format!(
                    "primary contact {current} carries a linked id"
                )));
            }
            return Ok(contact.id);
        }

        current = contact.linked_id.ok_or_else(|| {
            IdentifyError::DataIntegrity(format!("secondary contact {current} has no linked id"))
        })?;
    }
}
