//! # Match Finder
//!
//! Normalizes an incoming observation and collects every stored contact that
//! shares its phone number or its email.

use crate::error::{IdentifyError, Result};
use crate::model::Contact;
use crate::query::ContactFilter;
use crate::store::ContactStore;

/// A (phone, email) observation. Blank fields count as absent.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Observation {
    pub phone_number: Option<String>,
    pub email: Option<String>,
}

impl Observation {
    /// Trim both fields and reject an observation that carries neither.
    pub fn new(phone_number: Option<String>, email: Option<String>) -> Result<Self> {
        let observation = Self {
            phone_number: normalize_field(phone_number),
            email: normalize_field(email),
        };
        if observation.phone_number.is_none() && observation.email.is_none() {
            return Err(IdentifyError::InvalidInput);
        }
        Ok(observation)
    }

    pub fn phone(&self) -> Option<&str> {
        self.phone_number.as_deref()
    }

    pub fn email(&self) -> Option<&str> {
        self.email.as_deref()
    }
}

fn normalize_field(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Contacts whose phone equals the observed phone OR whose email equals the
/// observed email, ordered by ascending id.
pub fn find_matches(store: &dyn ContactStore, observation: &Observation) -> Result<Vec<Contact>> {
    let filter = ContactFilter::phone_or_email(observation.phone(), observation.email())
        .ok_or(IdentifyError::InvalidInput)?;
    Ok(store.find_many(&filter)?)
}
