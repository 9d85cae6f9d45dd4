//! Model store: the canonical id→entity mapping of a cache.
//!
//! Entities of every model type share one map. Each slot is type-erased and
//! tagged with its model's `TypeId`; typed accessors only return entities of
//! the requested model, so a lookup with the wrong model type yields `None`
//! instead of a bad cast.

use std::any::{Any, TypeId};
use std::collections::HashMap;

use chrono::Utc;
use tracing::debug;
use uuid::Uuid;

use crate::model::{Entity, Model};

struct Slot {
    model: TypeId,
    scheme: &'static str,
    entity: Box<dyn Any + Send + Sync>,
}

impl Slot {
    fn new<M: Model>(entity: Entity<M>) -> Self {
        Self {
            model: TypeId::of::<M>(),
            scheme: M::SCHEME,
            entity: Box::new(entity),
        }
    }

    fn get<M: Model>(&self) -> Option<&Entity<M>> {
        self.entity.downcast_ref::<Entity<M>>()
    }

    fn get_mut<M: Model>(&mut self) -> Option<&mut Entity<M>> {
        self.entity.downcast_mut::<Entity<M>>()
    }
}

#[derive(Default)]
pub struct ModelStore {
    slots: HashMap<Uuid, Slot>,
}

impl ModelStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or update an entity, refreshing its `last_updated` timestamp.
    ///
    /// An entity of a different model type stored under the same id is
    /// replaced.
    pub fn upsert<M: Model>(&mut self, id: Uuid, properties: M::Properties) -> Entity<M> {
        if let Some(existing) = self.slots.get_mut(&id).and_then(Slot::get_mut::<M>) {
            existing.properties = properties;
            existing.last_updated = Utc::now();
            return existing.clone();
        }

        let entity = Entity::<M>::new(id, properties);
        if let Some(replaced) = self.slots.insert(id, Slot::new(entity.clone())) {
            debug!(
                id = %id,
                old_scheme = replaced.scheme,
                new_scheme = M::SCHEME,
                "Replaced entity of a different model type"
            );
        }
        entity
    }

    /// Remove an entity of any model type. Returns whether one was stored.
    pub fn remove(&mut self, id: &Uuid) -> bool {
        self.slots.remove(id).is_some()
    }

    pub fn get<M: Model>(&self, id: &Uuid) -> Option<Entity<M>> {
        self.slots.get(id).and_then(Slot::get::<M>).cloned()
    }

    pub fn contains(&self, id: &Uuid) -> bool {
        self.slots.contains_key(id)
    }

    /// All entities of model `M`.
    pub fn all<M: Model>(&self) -> HashMap<Uuid, Entity<M>> {
        self.iter::<M>().map(|e| (e.id, e.clone())).collect()
    }

    /// Iterate over entities of model `M` without cloning them.
    pub fn iter<M: Model>(&self) -> impl Iterator<Item = &Entity<M>> + '_ {
        let model = TypeId::of::<M>();
        self.slots
            .values()
            .filter(move |slot| slot.model == model)
            .filter_map(Slot::get::<M>)
    }

    /// Number of stored entities across all model types.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn clear(&mut self) {
        self.slots.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Note, NoteProps, Tag};

    #[test]
    fn test_upsert_inserts_then_updates_in_place() {
        let mut store = ModelStore::new();
        let id = Uuid::new_v4();

        let first = store.upsert::<Note>(id, NoteProps::titled("draft"));
        assert_eq!(first.properties.title, "draft");

        let second = store.upsert::<Note>(id, NoteProps::titled("final"));
        assert_eq!(second.properties.title, "final");
        assert!(second.last_updated >= first.last_updated);

        assert_eq!(store.len(), 1);
        assert_eq!(
            store.get::<Note>(&id).map(|e| e.properties.title),
            Some("final".to_string())
        );
    }

    #[test]
    fn test_get_with_wrong_model_type() {
        let mut store = ModelStore::new();
        let id = Uuid::new_v4();
        store.upsert::<Note>(id, NoteProps::titled("note"));

        assert!(store.get::<Tag>(&id).is_none());
        assert!(store.contains(&id));
    }

    #[test]
    fn test_upsert_replaces_other_model_type() {
        let mut store = ModelStore::new();
        let id = Uuid::new_v4();
        store.upsert::<Note>(id, NoteProps::titled("note"));
        store.upsert::<Tag>(id, "label".to_string());

        assert!(store.get::<Note>(&id).is_none());
        assert_eq!(store.get::<Tag>(&id).map(|e| e.properties), Some("label".to_string()));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_all_filters_by_model_type() {
        let mut store = ModelStore::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        store.upsert::<Note>(a, NoteProps::titled("a"));
        store.upsert::<Note>(b, NoteProps::titled("b"));
        store.upsert::<Tag>(Uuid::new_v4(), "tag".to_string());

        let notes = store.all::<Note>();
        assert_eq!(notes.len(), 2);
        assert!(notes.contains_key(&a));
        assert!(notes.contains_key(&b));
        assert_eq!(store.all::<Tag>().len(), 1);
    }

    #[test]
    fn test_remove_and_clear() {
        let mut store = ModelStore::new();
        let id = Uuid::new_v4();
        store.upsert::<Note>(id, NoteProps::titled("a"));

        assert!(store.remove(&id));
        assert!(!store.remove(&id));

        store.upsert::<Note>(id, NoteProps::titled("a"));
        store.clear();
        assert!(store.is_empty());
    }
}
