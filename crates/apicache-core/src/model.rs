//! Entity model types.
//!
//! A [`Model`] is a marker type naming a kind of remote resource; its
//! `Properties` carry the actual data. The cache stores one [`Entity`] per id
//! and hands out clones, so an entity held by a caller is an immutable
//! snapshot of the moment it was read.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use uuid::Uuid;

/// A kind of entity served by a remote API.
pub trait Model: Send + Sync + 'static {
    type Properties: Clone
        + fmt::Debug
        + PartialEq
        + Serialize
        + DeserializeOwned
        + Send
        + Sync
        + 'static;

    /// Resource name, e.g. `"notes"`.
    const SCHEME: &'static str;

    /// Deletion timestamp for soft-deletable models.
    fn deleted_at(_properties: &Self::Properties) -> Option<DateTime<Utc>> {
        None
    }
}

/// Models whose deletion leaves a tombstone that can be restored.
pub trait SoftDeletable: Model {}

/// A cached entity snapshot.
pub struct Entity<M: Model> {
    pub id: Uuid,
    pub properties: M::Properties,
    pub last_updated: DateTime<Utc>,
}

impl<M: Model> Entity<M> {
    pub fn new(id: Uuid, properties: M::Properties) -> Self {
        Self {
            id,
            properties,
            last_updated: Utc::now(),
        }
    }

    pub fn is_deleted(&self) -> bool {
        M::deleted_at(&self.properties).is_some()
    }

    pub fn deleted_at(&self) -> Option<DateTime<Utc>> {
        M::deleted_at(&self.properties)
    }
}

impl<M: Model> Clone for Entity<M> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            properties: self.properties.clone(),
            last_updated: self.last_updated,
        }
    }
}

impl<M: Model> fmt::Debug for Entity<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entity")
            .field("scheme", &M::SCHEME)
            .field("id", &self.id)
            .field("properties", &self.properties)
            .field("last_updated", &self.last_updated)
            .finish()
    }
}

// Identity-based equality: two snapshots of the same entity are equal even
// if their properties differ.
impl<M: Model> PartialEq for Entity<M> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<M: Model> Eq for Entity<M> {}

impl<M: Model> Hash for Entity<M> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl<M: Model> PartialOrd for Entity<M>
where
    M::Properties: Ord,
{
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<M: Model> Ord for Entity<M>
where
    M::Properties: Ord,
{
    fn cmp(&self, other: &Self) -> Ordering {
        self.properties
            .cmp(&other.properties)
            .then_with(|| self.id.cmp(&other.id))
    }
}

/// Wire shape of an entity: its id next to its flattened properties.
#[derive(Serialize, Deserialize)]
#[serde(bound = "")]
pub struct ModelContainer<M: Model> {
    pub id: Uuid,
    #[serde(flatten)]
    pub properties: M::Properties,
}

impl<M: Model> ModelContainer<M> {
    pub fn new(id: Uuid, properties: M::Properties) -> Self {
        Self { id, properties }
    }
}

impl<M: Model> Clone for ModelContainer<M> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            properties: self.properties.clone(),
        }
    }
}

impl<M: Model> fmt::Debug for ModelContainer<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelContainer")
            .field("id", &self.id)
            .field("properties", &self.properties)
            .finish()
    }
}

impl<M: Model> PartialEq for ModelContainer<M> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.properties == other.properties
    }
}

impl<M: Model> From<Entity<M>> for ModelContainer<M> {
    fn from(entity: Entity<M>) -> Self {
        Self::new(entity.id, entity.properties)
    }
}
