//! Request fingerprints for duplicate suppression.
//!
//! A fingerprint identifies "the same logical request" based on:
//! - The acting user
//! - The action identity (endpoint or intent, e.g. `answer.add`)
//! - Distinguishing payload fields (target ids, content)
//!
//! Volatile fields such as timestamps or request ids are excluded so two
//! clicks on the same submit button produce the same fingerprint.
//!
//! Fingerprints are SHA-256 digests, so every instance sharing a store
//! computes the same value for the same request.

use crate::domain::actor::UserId;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

/// A digest identifying one logical request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    /// Compute a fingerprint from request components.
    ///
    /// # Arguments
    /// * `user` - The acting user
    /// * `action` - Action identity (endpoint or intent)
    /// * `fields` - Distinguishing payload fields (sorted by the map)
    pub fn new(user: &UserId, action: &str, fields: &BTreeMap<String, String>) -> Self {
        let mut hasher = Sha256::new();

        // Length prefixes keep ("ab", "c") and ("a", "bc") apart
        update_component(&mut hasher, user.as_str());
        update_component(&mut hasher, action);
        for (name, value) in fields {
            update_component(&mut hasher, name);
            update_component(&mut hasher, value);
        }

        Fingerprint(hasher.finalize().into())
    }

    /// Fingerprint with no payload fields.
    pub fn simple(user: &UserId, action: &str) -> Self {
        Self::new(user, action, &BTreeMap::new())
    }

    /// Rebuild a fingerprint from its raw digest.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Fingerprint(bytes)
    }

    /// Get the raw digest.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

fn update_component(hasher: &mut Sha256, component: &str) {
    hasher.update((component.len() as u64).to_le_bytes());
    hasher.update(component.as_bytes());
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

/// Incrementally collects the fields of a request before fingerprinting.
#[derive(Debug, Clone)]
pub struct FingerprintBuilder {
    user: UserId,
    action: String,
    fields: BTreeMap<String, String>,
    excluded: Arc<BTreeSet<String>>,
}

impl FingerprintBuilder {
    /// Start a fingerprint with no excluded fields.
    pub fn new(user: &UserId, action: impl Into<String>) -> Self {
        Self::with_excluded(user, action, Arc::new(BTreeSet::new()))
    }

    /// Start a fingerprint that drops the given field names.
    pub fn with_excluded(
        user: &UserId,
        action: impl Into<String>,
        excluded: Arc<BTreeSet<String>>,
    ) -> Self {
        Self {
            user: user.clone(),
            action: action.into(),
            fields: BTreeMap::new(),
            excluded,
        }
    }

    /// Add a distinguishing field. Later values for the same name win.
    pub fn field(mut self, name: impl Into<String>, value: impl fmt::Display) -> Self {
        self.fields.insert(name.into(), value.to_string());
        self
    }

    /// Add every top-level field of a serializable request body.
    ///
    /// Objects contribute one field per key. String values are used as-is,
    /// other values by their JSON text. A non-object body is stored under
    /// the `body` field.
    ///
    /// # Errors
    /// Returns the serialization error if the payload cannot be represented
    /// as JSON.
    pub fn payload<T: Serialize + ?Sized>(mut self, payload: &T) -> Result<Self, serde_json::Error> {
        match serde_json::to_value(payload)? {
            serde_json::Value::Object(map) => {
                for (name, value) in map {
                    self.fields.insert(name, json_text(value));
                }
            }
            other => {
                self.fields.insert("body".to_string(), json_text(other));
            }
        }
        Ok(self)
    }

    /// Compute the fingerprint.
    pub fn build(self) -> Fingerprint {
        if self.excluded.is_empty() {
            return Fingerprint::new(&self.user, &self.action, &self.fields);
        }

        let fields: BTreeMap<String, String> = self
            .fields
            .into_iter()
            .filter(|(name, _)| !self.excluded.contains(name))
            .collect();
        Fingerprint::new(&self.user, &self.action, &fields)
    }
}

fn json_text(value: serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s,
        other => other.to_string(),
    }
}
