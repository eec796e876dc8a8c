//! One-shot entity and resource promises.
//!
//! A promise waits for a specific entity to bear a specific component set.
//! Promises are only re-checked for entities that changed since they were
//! last resolved; the dirty queue is an [`IndexSet`], so firing order is
//! deterministic (entity change order, then registration order within an
//! entity). A fired promise is retired and never fires again.

use indexmap::{IndexMap, IndexSet};

use crate::comp::CompId;
use crate::entity::Store;
use crate::world::Resources;
use crate::{Entity, World};

type EntityFn = Box<dyn FnOnce(&mut World, Entity)>;
type ResourceFn = Box<dyn FnOnce(&mut World)>;

struct EntityPromise {
    comps: Vec<CompId>,
    f:     EntityFn,
}

struct ResourcePromise {
    resources: Vec<CompId>,
    f:         ResourceFn,
}

#[derive(Default)]
pub(crate) struct Registry {
    by_entity:       IndexMap<Entity, Vec<EntityPromise>>,
    resources:       Vec<ResourcePromise>,
    dirty:           IndexSet<Entity>,
    resources_dirty: bool,
}

impl Registry {
    pub(crate) fn mark_changed(&mut self, entity: Entity) { self.dirty.insert(entity); }

    pub(crate) fn mark_resources_changed(&mut self) { self.resources_dirty = true; }

    fn take_dirty(&mut self) -> Vec<Entity> {
        std::mem::take(&mut self.dirty).into_iter().collect()
    }

    /// Extracts the callbacks of promises on `entity` that are now satisfied.
    fn satisfied(&mut self, entity: Entity, store: &Store) -> Vec<EntityFn> {
        let Some(list) = self.by_entity.get_mut(&entity) else { return Vec::new() };
        let mut fired = Vec::new();
        let mut index = 0;
        while index < list.len() {
            if list[index].comps.iter().all(|&comp| store.has(entity, comp)) {
                fired.push(list.remove(index).f);
            } else {
                index += 1;
            }
        }
        if list.is_empty() {
            self.by_entity.shift_remove(&entity);
        }
        fired
    }

    fn satisfied_resources(&mut self, resources: &Resources) -> Vec<ResourceFn> {
        let mut fired = Vec::new();
        let mut index = 0;
        while index < self.resources.len() {
            if self.resources[index].resources.iter().all(|&res| resources.contains(res)) {
                fired.push(self.resources.remove(index).f);
            } else {
                index += 1;
            }
        }
        fired
    }
}

impl World {
    /// Calls `f` once, as soon as `entity` bears every kind in `comps`.
    ///
    /// If the entity already satisfies the set, `f` runs immediately;
    /// otherwise it runs during a later [`update`](World::update), after the
    /// entity changed.
    pub fn when_entity_has(
        &mut self,
        entity: Entity,
        comps: &[CompId],
        f: impl FnOnce(&mut World, Entity) + 'static,
    ) {
        let satisfied =
            self.entities.get(entity).map_or(false, |record| record.has_all(comps));
        if satisfied {
            f(self, entity);
            return;
        }
        self.promises
            .by_entity
            .entry(entity)
            .or_default()
            .push(EntityPromise { comps: comps.to_vec(), f: Box::new(f) });
    }

    /// Calls `f` once, as soon as every resource in `resources` exists.
    pub fn when_resources(&mut self, resources: &[CompId], f: impl FnOnce(&mut World) + 'static) {
        if resources.iter().all(|&res| self.resources.contains(res)) {
            f(self);
            return;
        }
        self.promises
            .resources
            .push(ResourcePromise { resources: resources.to_vec(), f: Box::new(f) });
    }

    /// Fires every satisfied promise against the entities that changed since
    /// the last resolution. Changes made by promise callbacks (or later in
    /// the tick) accumulate for the next resolution.
    pub(crate) fn resolve_promises(&mut self) {
        let dirty = self.promises.take_dirty();
        for entity in dirty {
            let fired = self.promises.satisfied(entity, &self.entities);
            for f in fired {
                log::trace!("entity promise fired for {entity}");
                f(self, entity);
            }
        }

        if std::mem::take(&mut self.promises.resources_dirty) {
            let fired = self.promises.satisfied_resources(&self.resources);
            for f in fired {
                log::trace!("resource promise fired");
                f(self);
            }
        }
    }
}
