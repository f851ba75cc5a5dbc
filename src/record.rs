//! The record model shared by every synchronized collection.
//!
//! Every entity that flows through a mirror is a [`Record`]: an opaque,
//! collection-specific payload plus the three mandatory base fields
//! (`id`, `created`, `updated`). No network I/O occurs here.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// The three mandatory fields carried by every synchronized record.
///
/// `id` is unique within its collection and stable for the record's
/// lifetime. `created` is immutable; `updated` is monotonically
/// non-decreasing across updates to the same id. Both timestamps are
/// server-formatted strings and are never interpreted locally.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Base {
    /// Unique, stable record identifier.
    pub id: String,
    /// Server-assigned creation timestamp.
    #[serde(default)]
    pub created: String,
    /// Server-assigned last-update timestamp.
    #[serde(default)]
    pub updated: String,
}

/// A typed, synchronizable record belonging to one named collection.
///
/// Implementors flatten a [`Base`] into their serde representation so the
/// wire form is a single flat JSON object.
pub trait Record: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Name of the backend collection this record type lives in.
    const COLLECTION: &'static str;

    /// The mandatory base fields.
    fn base(&self) -> &Base;

    /// The record's unique id within its collection.
    fn id(&self) -> &str {
        &self.base().id
    }
}

/// The kind of change a live notification describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordAction {
    /// A record now exists that did not before.
    Create,
    /// An existing record's payload changed; its id did not.
    Update,
    /// The record no longer exists.
    Delete,
}

/// One live notification from an Event Source: an action plus the full
/// record it applies to (the record's pre-deletion state for deletes).
#[derive(Debug, Clone)]
pub struct RecordEvent<R> {
    /// What happened.
    pub action: RecordAction,
    /// The record the action applies to.
    pub record: R,
}
