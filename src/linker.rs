//! # Identity Linker
//!
//! The read-match-mutate-reload pipeline behind `identify`:
//! match finder, root resolution and consolidation, link decision, view.
//! Runs against whatever store it is handed; transaction scoping is the
//! caller's job.

use crate::consolidate::{consolidate, Consolidation};
use crate::decision::{apply, decide, LinkAction, LinkRule};
use crate::error::Result;
use crate::matcher::{find_matches, Observation};
use crate::model::{ContactId, NewContact};
use crate::resolver::hop_limit;
use crate::store::ContactStore;
use crate::view::{build_view, IdentityView};
use tracing::debug;

/// Everything one pipeline run did, alongside the resulting view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkOutcome {
    pub view: IdentityView,
    /// `None` when the observation created a brand-new primary.
    pub consolidation: Option<Consolidation>,
    pub action: LinkAction,
    pub rule: Option<LinkRule>,
    /// Id of the primary created when nothing matched.
    pub created_primary: Option<ContactId>,
}

/// Link `observation` into the contact graph held by `store`.
pub fn link_observation(
    store: &mut dyn ContactStore,
    observation: &Observation,
    max_chain_hops: Option<usize>,
) -> Result<LinkOutcome> {
    let matches = find_matches(store, observation)?;

    if matches.is_empty() {
        let created = store.create(NewContact::primary(
            observation.phone_number.clone(),
            observation.email.clone(),
        ))?;
        debug!(contact_id = %created.id, "no match, created primary contact");
        return Ok(LinkOutcome {
            view: IdentityView::single(&created),
            consolidation: None,
            action: LinkAction::NoOp,
            rule: None,
            created_primary: Some(created.id),
        });
    }

    debug!(matches = matches.len(), "found existing contacts");
    let max_hops = hop_limit(store, max_chain_hops);
    let consolidation = consolidate(store, &matches, max_hops)?;
    let canonical = consolidation.canonical;

    let (action, rule) = decide(canonical, &matches, observation);
    debug!(canonical = %canonical, ?rule, "link decision");
    apply(store, &action)?;

    let view = build_view(store, canonical)?;
    Ok(LinkOutcome {
        view,
        consolidation: Some(consolidation),
        action,
        rule: Some(rule),
        created_primary: None,
    })
}
