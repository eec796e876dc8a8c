//! The world stores all runtime state: the kind registry, entities and their
//! components, the resource table, the query cache, the schedule, the init
//! resolver and the promise registry.
//!
//! Every mutating component or resource operation updates the store, the
//! query cache and the promise dirty set in one logical step, so callers
//! never observe a partially updated cache.

use std::any::Any;

use indexmap::IndexMap;

use crate::comp::{self, CompId};
use crate::{entity, Entity};

mod builder;
pub use builder::Builder;

pub mod init;
pub use init::{Gate, InitSpec, Outcome};

pub(crate) mod promise;

pub(crate) mod query;

pub(crate) mod sched;
pub use sched::Phase;

#[cfg(test)]
mod tests;

/// The table of global singleton values, keyed by resource kind.
///
/// Lookups never block: an absent resource simply means "not yet".
#[derive(Default)]
pub(crate) struct Resources {
    values: IndexMap<CompId, Box<dyn Any>>,
}

impl Resources {
    pub(crate) fn contains(&self, id: CompId) -> bool { self.values.contains_key(&id) }

    fn insert(&mut self, id: CompId, value: Box<dyn Any>) { self.values.insert(id, value); }

    fn remove(&mut self, id: CompId) -> Option<Box<dyn Any>> { self.values.shift_remove(&id) }

    fn get(&self, id: CompId) -> Option<&dyn Any> { self.values.get(&id).map(Box::as_ref) }

    fn get_mut(&mut self, id: CompId) -> Option<&mut dyn Any> {
        self.values.get_mut(&id).map(Box::as_mut)
    }

    fn ids(&self) -> impl Iterator<Item = CompId> + '_ { self.values.keys().copied() }
}

/// The data structure that stores all runtime state.
pub struct World {
    pub(crate) registry:  comp::Registry,
    pub(crate) entities:  entity::Store,
    pub(crate) resources: Resources,
    pub(crate) cache:     query::Cache,
    pub(crate) sched:     sched::Schedule,
    pub(crate) inits:     init::Resolver,
    pub(crate) promises:  promise::Registry,
}

impl World {
    /// Advances exactly one tick: progress the init resolver, resolve entity
    /// and resource promises, then run every active system in phase order.
    ///
    /// Callable with nothing registered; an empty tick is a no-op.
    pub fn update(&mut self) {
        log::trace!("tick start");
        self.advance_inits();
        self.resolve_promises();
        self.activate_ready_systems();
        self.run_systems();
    }

    /// Defines a new component (or resource) kind.
    /// `ctor` is used by the `ensure` operations.
    ///
    /// Panics if a kind named `name` is already defined.
    pub fn define_component<T: 'static>(
        &mut self,
        name: &str,
        ctor: impl Fn() -> T + 'static,
    ) -> comp::Def<T> {
        self.registry.define(name, false, ctor)
    }

    /// Defines a marker kind: an entity bearing it is hidden from every
    /// system cache except caches whose signature names the marker.
    pub fn define_marker<T: 'static>(
        &mut self,
        name: &str,
        ctor: impl Fn() -> T + 'static,
    ) -> comp::Def<T> {
        self.registry.define(name, true, ctor)
    }

    /// Registers per-kind serialization hooks for the networking layer.
    /// The core dispatches on [`CompId`] and never interprets the bytes.
    pub fn register_serde<T: 'static>(
        &mut self,
        def: comp::Def<T>,
        serialize: impl Fn(&T) -> Vec<u8> + 'static,
        deserialize: impl Fn(&[u8]) -> T + 'static,
    ) {
        self.registry.get(def.id()).check_type::<T>();
        self.registry.set_serde(def.id(), comp::Serde {
            serialize:   Box::new(move |value| {
                serialize(value.downcast_ref::<T>().expect("TypeId mismatch"))
            }),
            deserialize: Box::new(move |bytes| Box::new(deserialize(bytes)) as Box<dyn Any>),
        });
    }

    /// Creates a new entity with no components.
    pub fn create_entity(&mut self) -> Entity { self.entities.create() }

    /// Attaches a component to an entity.
    ///
    /// Panics if the entity already has that kind; use
    /// [`ensure_component`](Self::ensure_component) for idempotent semantics.
    pub fn add_component<T: 'static>(
        &mut self,
        entity: Entity,
        def: comp::Def<T>,
        value: T,
    ) -> &mut T {
        let id = def.id();
        let kind = self.registry.get(id);
        kind.check_type::<T>();
        let marker = kind.is_marker();
        {
            let record = self.entities.record_mut(entity);
            if record.has(id) {
                panic!("entity {entity} already has component `{}`", self.registry.name(id));
            }
            record.insert(id, Box::new(value), marker);
        }
        self.on_comp_added(entity, id, marker);
        self.component_value_mut(entity, id)
    }

    /// Returns the existing component, or constructs it with the registered
    /// constructor. Calling this twice never duplicates the effect.
    pub fn ensure_component<T: 'static>(&mut self, entity: Entity, def: comp::Def<T>) -> &mut T {
        let id = def.id();
        let kind = self.registry.get(id);
        kind.check_type::<T>();
        if !self.entities.record(entity).has(id) {
            let marker = kind.is_marker();
            let value = (kind.ctor)();
            self.entities.record_mut(entity).insert(id, value, marker);
            self.on_comp_added(entity, id, marker);
        }
        self.component_value_mut(entity, id)
    }

    /// Detaches a component, panicking if the entity does not have it.
    pub fn remove_component<T: 'static>(&mut self, entity: Entity, def: comp::Def<T>) -> T {
        match self.try_remove_component(entity, def) {
            Some(value) => value,
            None => panic!(
                "cannot remove component `{}` from entity {entity}: not present",
                self.registry.name(def.id()),
            ),
        }
    }

    /// Detaches a component, returning `None` if the entity does not have it.
    pub fn try_remove_component<T: 'static>(
        &mut self,
        entity: Entity,
        def: comp::Def<T>,
    ) -> Option<T> {
        let id = def.id();
        let kind = self.registry.get(id);
        kind.check_type::<T>();
        let marker = kind.is_marker();
        let value = self.entities.record_mut(entity).take(id, marker)?;
        self.on_comp_removed(entity, id, marker);
        Some(*value.downcast::<T>().expect("TypeId mismatch"))
    }

    /// Gets a shared reference to a component, if present.
    pub fn get_component<T: 'static>(&self, entity: Entity, def: comp::Def<T>) -> Option<&T> {
        self.registry.get(def.id()).check_type::<T>();
        let value = self.entities.get(entity)?.value(def.id())?;
        Some(value.downcast_ref::<T>().expect("TypeId mismatch"))
    }

    /// Gets a mutable reference to a component, if present.
    pub fn get_component_mut<T: 'static>(
        &mut self,
        entity: Entity,
        def: comp::Def<T>,
    ) -> Option<&mut T> {
        self.registry.get(def.id()).check_type::<T>();
        let record = self.entities.record_mut(entity);
        let value = record.value_mut(def.id())?;
        Some(value.downcast_mut::<T>().expect("TypeId mismatch"))
    }

    fn component_value_mut<T: 'static>(&mut self, entity: Entity, id: CompId) -> &mut T {
        self.entities
            .record_mut(entity)
            .value_mut(id)
            .and_then(|value| value.downcast_mut::<T>())
            .expect("component was just inserted")
    }

    fn resource_value_mut<T: 'static>(&mut self, id: CompId) -> &mut T {
        self.resources
            .get_mut(id)
            .and_then(|value| value.downcast_mut::<T>())
            .expect("resource was just inserted")
    }

    /// Creates a resource, panicking if it already exists.
    pub fn add_resource<T: 'static>(&mut self, def: comp::Def<T>, value: T) -> &mut T {
        let id = def.id();
        self.registry.get(id).check_type::<T>();
        if self.resources.contains(id) {
            panic!("resource `{}` already exists", self.registry.name(id));
        }
        self.resources.insert(id, Box::new(value));
        self.on_resource_added(id);
        self.resource_value_mut(id)
    }

    /// Returns the existing resource, or constructs it with the registered
    /// constructor.
    pub fn ensure_resource<T: 'static>(&mut self, def: comp::Def<T>) -> &mut T {
        let id = def.id();
        let kind = self.registry.get(id);
        kind.check_type::<T>();
        if !self.resources.contains(id) {
            let value = (kind.ctor)();
            self.resources.insert(id, value);
            self.on_resource_added(id);
        }
        self.resource_value_mut(id)
    }

    /// Removes a resource, panicking if it does not exist.
    pub fn remove_resource<T: 'static>(&mut self, def: comp::Def<T>) -> T {
        match self.try_remove_resource(def) {
            Some(value) => value,
            None => panic!(
                "cannot remove resource `{}`: it does not exist",
                self.registry.name(def.id()),
            ),
        }
    }

    /// Removes a resource, returning `None` if it does not exist.
    pub fn try_remove_resource<T: 'static>(&mut self, def: comp::Def<T>) -> Option<T> {
        self.registry.get(def.id()).check_type::<T>();
        let value = self.resources.remove(def.id())?;
        Some(*value.downcast::<T>().expect("TypeId mismatch"))
    }

    /// Looks up a resource. Absence is not an error; it means "not yet" —
    /// poll again or use [`when_resources`](Self::when_resources).
    pub fn get_resource<T: 'static>(&self, def: comp::Def<T>) -> Option<&T> {
        self.registry.get(def.id()).check_type::<T>();
        let value = self.resources.get(def.id())?;
        Some(value.downcast_ref::<T>().expect("TypeId mismatch"))
    }

    /// Looks up a resource mutably.
    pub fn get_resource_mut<T: 'static>(&mut self, def: comp::Def<T>) -> Option<&mut T> {
        self.registry.get(def.id()).check_type::<T>();
        let value = self.resources.get_mut(def.id())?;
        Some(value.downcast_mut::<T>().expect("TypeId mismatch"))
    }

    /// Iterates over the resource kinds that currently exist.
    pub fn resources(&self) -> impl Iterator<Item = (&str, CompId)> + '_ {
        self.resources.ids().map(|id| (self.registry.name(id), id))
    }

    fn on_resource_added(&mut self, id: CompId) {
        self.cache.mark_resource_seen(id);
        self.promises.mark_resources_changed();
    }

    /// Registers a system into a phase.
    ///
    /// `comps` is the required component signature; `None` declares a
    /// resource-only system, which is invoked with an empty entity slice.
    /// The system stays pending until every required resource has existed at
    /// least once and every required kind has been seen on some entity.
    ///
    /// Panics if a system named `name` is already registered.
    pub fn add_system(
        &mut self,
        name: &str,
        phase: Phase,
        comps: Option<&[CompId]>,
        resources: &[CompId],
        callback: impl FnMut(&mut World, &[Entity]) + 'static,
    ) {
        for &resource in resources {
            self.demand_resource(resource);
        }
        let comps = comps.map(<[CompId]>::to_vec);
        let comps_has_marker = comps
            .as_ref()
            .map_or(false, |comps| comps.iter().any(|&id| self.registry.get(id).is_marker()));
        let callback: sched::SystemFn = Box::new(callback);
        self.sched.register(name, sched::SystemDef {
            phase,
            comps,
            comps_has_marker,
            resources: resources.to_vec(),
            callback: std::rc::Rc::new(std::cell::RefCell::new(callback)),
            active: false,
        });
        self.cache.register_system();
    }

    /// Serializes one component of one entity through its registered hooks.
    /// Returns `None` if the entity does not bear the kind.
    ///
    /// Panics if the kind has no hooks registered.
    pub fn serialize_component(&self, entity: Entity, id: CompId) -> Option<Vec<u8>> {
        let kind = self.registry.get(id);
        let serde = match &kind.serde {
            Some(serde) => serde,
            None => panic!("component `{}` has no serde hooks", self.registry.name(id)),
        };
        let value = self.entities.record(entity).value(id)?;
        Some((serde.serialize)(value))
    }

    /// Deserializes bytes into one component of one entity.
    /// An existing value is overwritten in place; an absent one is attached
    /// with full cache and promise maintenance.
    pub fn deserialize_component(&mut self, entity: Entity, id: CompId, bytes: &[u8]) {
        let kind = self.registry.get(id);
        let serde = match &kind.serde {
            Some(serde) => serde,
            None => panic!("component `{}` has no serde hooks", self.registry.name(id)),
        };
        let value = (serde.deserialize)(bytes);
        let marker = kind.is_marker();
        let record = self.entities.record_mut(entity);
        if record.has(id) {
            record.replace(id, value);
        } else {
            record.insert(id, value, marker);
            self.on_comp_added(entity, id, marker);
        }
    }
}
