//! # Chain Consolidator
//!
//! Union of identity chains. The oldest root (by `created_at`, then id) wins;
//! every other root is demoted and all of its members are repointed at the
//! winner in the same step. Any contact still reaching the winner through
//! another secondary (imported legacy data) is relinked directly, so every
//! touched identity leaves at depth 1.

use crate::error::{IdentifyError, Result};
use crate::model::{Contact, ContactId, ContactPatch};
use crate::query::ContactFilter;
use crate::resolver::resolve_root;
use crate::store::ContactStore;
use rustc_hash::FxHashSet;
use std::collections::BTreeSet;
use tracing::{info, warn};

/// Outcome of a consolidation pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Consolidation {
    pub canonical: ContactId,
    /// Former roots demoted into `canonical`, in merge order.
    pub demoted: Vec<ContactId>,
    /// Members repointed from a demoted root to `canonical`.
    pub rewired: usize,
    /// Contacts that reached `canonical` through another secondary.
    pub flattened: usize,
}

/// Distinct roots of `matches`, ascending.
pub fn distinct_roots(
    store: &dyn ContactStore,
    matches: &[Contact],
    max_hops: usize,
) -> Result<BTreeSet<ContactId>> {
    matches
        .iter()
        .map(|contact| resolve_root(store, contact.id, max_hops))
        .collect()
}

/// Merge every chain touched by `matches` into one and return the canonical root.
pub fn consolidate(
    store: &mut dyn ContactStore,
    matches: &[Contact],
    max_hops: usize,
) -> Result<Consolidation> {
    let roots = distinct_roots(store, matches, max_hops)?;
    let mut ids = roots.into_iter();
    let first = ids.next().ok_or_else(|| {
        IdentifyError::DataIntegrity("consolidation requires at least one match".to_string())
    })?;
    let rest: Vec<ContactId> = ids.collect();
    if rest.is_empty() {
        let flattened = flatten_chains(store, first)?;
        return Ok(Consolidation {
            canonical: first,
            demoted: Vec::new(),
            rewired: 0,
            flattened,
        });
    }

    let mut candidates = Vec::with_capacity(rest.len() + 1);
    candidates.push(first);
    candidates.extend(rest);
    let mut roots = store.find_many(&ContactFilter::IdIn(candidates.clone()))?;
    if let Some(missing) = candidates
        .iter()
        .find(|id| !roots.iter().any(|root| root.id == **id))
    {
        return Err(IdentifyError::NotFound(*missing));
    }
    roots.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));

    let canonical = roots[0].id;
    let mut demoted = Vec::with_capacity(roots.len() - 1);
    let mut rewired = 0;
    for losing in &roots[1..] {
        store.update_by_id(losing.id, ContactPatch::demote_to(canonical))?;
        rewired += store.update_many(
            &ContactFilter::LinkedIdEquals(losing.id),
            ContactPatch::relink_to(canonical),
        )?;
        demoted.push(losing.id);
    }
    let flattened = flatten_chains(store, canonical)?;

    info!(
        canonical = %canonical,
        demoted = ?demoted,
        rewired,
        flattened,
        "consolidated identity chains"
    );
    Ok(Consolidation {
        canonical,
        demoted,
        rewired,
        flattened,
    })
}

/// Relink every contact hanging below a secondary of `canonical` straight to
/// `canonical`. Returns how many contacts moved.
pub fn flatten_chains(store: &mut dyn ContactStore, canonical: ContactId) -> Result<usize> {
    let mut frontier: Vec<ContactId> = store
        .find_many(&ContactFilter::LinkedIdEquals(canonical))?
        .iter()
        .map(|contact| contact.id)
        .collect();
    let mut seen = FxHashSet::default();
    seen.insert(canonical);
    let mut flattened = 0;

    while let Some(member) = frontier.pop() {
        if !seen.insert(member) {
            continue;
        }
        for nested in store.find_many(&ContactFilter::LinkedIdEquals(member))? {
            if seen.contains(&nested.id) {
                return Err(IdentifyError::DataIntegrity(format!(
                    "cycle below contact {canonical} through {}",
                    nested.id
                )));
            }
            store.update_by_id(nested.id, ContactPatch::relink_to(canonical))?;
            flattened += 1;
            frontier.push(nested.id);
        }
    }

    if flattened > 0 {
        warn!(canonical = %canonical, flattened, "relinked nested secondaries");
    }
    Ok(flattened)
}
