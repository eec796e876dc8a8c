//! Entity identifiers and per-entity records.
//!
//! An entity starts with nothing but an id
//! and incrementally gains and loses components over its lifetime.
//! Each record keeps a bitset of the kinds it currently bears
//! (so membership tests are a single bit read),
//! the boxed component values,
//! and the list of system caches it currently appears in.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::num::NonZeroU32;

use bitvec::prelude::BitVec;
use indexmap::IndexMap;

use crate::comp::CompId;
use crate::world::sched::SystemId;

/// An opaque entity identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Entity(NonZeroU32);

impl Entity {
    /// The numeric value of this id.
    pub fn id(self) -> u32 { self.0.get() }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result { write!(f, "#{}", self.0) }
}

/// The components currently attached to one entity.
pub(crate) struct Record {
    /// Kind membership, indexed by [`CompId`].
    comps:              BitVec,
    values:             HashMap<CompId, Box<dyn Any>>,
    /// Caches this entity currently appears in, maintained by the query cache.
    pub(crate) systems: Vec<SystemId>,
    /// Number of marker kinds present. Nonzero means the entity is hidden.
    markers:            u32,
}

impl Record {
    fn new() -> Self {
        Self { comps: BitVec::new(), values: HashMap::new(), systems: Vec::new(), markers: 0 }
    }

    pub(crate) fn has(&self, id: CompId) -> bool {
        self.comps.get(id.index()).map_or(false, |bit| *bit)
    }

    pub(crate) fn has_all(&self, ids: &[CompId]) -> bool {
        ids.iter().all(|&id| self.has(id))
    }

    /// Whether a marker kind hides this entity from non-marker caches.
    pub(crate) fn hidden(&self) -> bool { self.markers > 0 }

    /// Attaches a value. The caller must have checked that `id` is absent.
    pub(crate) fn insert(&mut self, id: CompId, value: Box<dyn Any>, marker: bool) {
        debug_assert!(!self.has(id), "insert on a kind that is already present");
        if self.comps.len() <= id.index() {
            self.comps.resize(id.index() + 1, false);
        }
        self.comps.set(id.index(), true);
        self.values.insert(id, value);
        if marker {
            self.markers += 1;
        }
    }

    pub(crate) fn take(&mut self, id: CompId, marker: bool) -> Option<Box<dyn Any>> {
        let value = self.values.remove(&id)?;
        self.comps.set(id.index(), false);
        if marker {
            self.markers = self.markers.checked_sub(1).expect("marker count out of sync");
        }
        Some(value)
    }

    pub(crate) fn value(&self, id: CompId) -> Option<&dyn Any> {
        self.values.get(&id).map(Box::as_ref)
    }

    pub(crate) fn value_mut(&mut self, id: CompId) -> Option<&mut dyn Any> {
        self.values.get_mut(&id).map(Box::as_mut)
    }

    /// Overwrites a present value in place; presence and caches are unaffected.
    pub(crate) fn replace(&mut self, id: CompId, value: Box<dyn Any>) {
        debug_assert!(self.has(id), "replace on a kind that is absent");
        self.values.insert(id, value);
    }
}

/// Allocates entity ids and owns all records.
///
/// Records are kept in insertion order so that one-time scans
/// (system activation, init component-set checks) are deterministic.
pub(crate) struct Store {
    records: IndexMap<Entity, Record>,
    next:    u32,
}

impl Default for Store {
    fn default() -> Self { Self { records: IndexMap::new(), next: 1 } }
}

impl Store {
    pub(crate) fn create(&mut self) -> Entity {
        let id = NonZeroU32::new(self.next).expect("entity id overflow");
        self.next = self.next.checked_add(1).expect("entity id overflow");
        let entity = Entity(id);
        self.records.insert(entity, Record::new());
        entity
    }

    pub(crate) fn get(&self, entity: Entity) -> Option<&Record> { self.records.get(&entity) }

    pub(crate) fn record(&self, entity: Entity) -> &Record {
        match self.records.get(&entity) {
            Some(record) => record,
            None => panic!("entity {entity} does not exist"),
        }
    }

    pub(crate) fn record_mut(&mut self, entity: Entity) -> &mut Record {
        match self.records.get_mut(&entity) {
            Some(record) => record,
            None => panic!("entity {entity} does not exist"),
        }
    }

    pub(crate) fn has(&self, entity: Entity, id: CompId) -> bool {
        self.records.get(&entity).map_or(false, |record| record.has(id))
    }

    /// Whether at least one entity bears every kind in `ids`.
    pub(crate) fn any_with(&self, ids: &[CompId]) -> bool {
        self.records.values().any(|record| record.has_all(ids))
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = (Entity, &mut Record)> + '_ {
        self.records.iter_mut().map(|(&entity, record)| (entity, record))
    }
}
