//! Incrementally maintained query cache.
//!
//! For every active system the cache keeps the list of entities currently
//! matching its signature, and every record keeps the reverse index
//! (the systems it belongs to). Both sides are updated on every component
//! add/remove; a full scan happens only once, when a pending system activates.
//!
//! Maintenance cost is proportional to the systems interested in the mutated
//! kind, never to the total number of systems or entities.

use bitvec::prelude::BitVec;

use crate::comp::CompId;
use crate::entity::Record;
use crate::world::sched::{Schedule, SystemId};
use crate::{Entity, World};

fn mark(bits: &mut BitVec, index: usize) {
    if bits.len() <= index {
        bits.resize(index + 1, false);
    }
    bits.set(index, true);
}

fn is_marked(bits: &BitVec, index: usize) -> bool {
    bits.get(index).map_or(false, |bit| *bit)
}

#[derive(Default)]
pub(crate) struct Cache {
    /// Cached entity list per system, indexed by [`SystemId`].
    entities:       Vec<Vec<Entity>>,
    /// Active systems interested in each kind, indexed by [`CompId`].
    interest:       Vec<Vec<SystemId>>,
    /// Kinds that have been attached to some entity at least once.
    seen_comps:     BitVec,
    /// Resource kinds that have existed at least once.
    seen_resources: BitVec,
}

impl Cache {
    /// Reserves the cache slot for a newly registered system.
    pub(crate) fn register_system(&mut self) { self.entities.push(Vec::new()); }

    pub(crate) fn entities(&self, id: SystemId) -> &[Entity] {
        self.entities.get(id.index()).expect("cache slot registered with the system")
    }

    pub(crate) fn comp_seen(&self, id: CompId) -> bool { is_marked(&self.seen_comps, id.index()) }

    pub(crate) fn resource_seen(&self, id: CompId) -> bool {
        is_marked(&self.seen_resources, id.index())
    }

    pub(crate) fn mark_resource_seen(&mut self, id: CompId) {
        mark(&mut self.seen_resources, id.index());
    }

    fn interested(&self, id: CompId) -> &[SystemId] {
        self.interest.get(id.index()).map_or(&[], Vec::as_slice)
    }

    fn register_interest(&mut self, comp: CompId, system: SystemId) {
        if self.interest.len() <= comp.index() {
            self.interest.resize_with(comp.index() + 1, Vec::new);
        }
        self.interest[comp.index()].push(system);
    }

    fn insert(&mut self, system: SystemId, entity: Entity, record: &mut Record) {
        self.entities[system.index()].push(entity);
        record.systems.push(system);
    }

    fn splice(&mut self, system: SystemId, entity: Entity) {
        let list = &mut self.entities[system.index()];
        if let Some(position) = list.iter().position(|&cached| cached == entity) {
            // ordering among remaining entities need not be preserved
            list.swap_remove(position);
        }
    }

    /// Maintains the cache after `entity` gained the kind `id`.
    /// The record must already reflect the addition.
    pub(crate) fn comp_added(
        &mut self,
        sched: &Schedule,
        entity: Entity,
        record: &mut Record,
        id: CompId,
        marker: bool,
    ) {
        mark(&mut self.seen_comps, id.index());

        if marker {
            // the entity just became hidden: purge it from every cache whose
            // signature names no marker
            let mut kept = Vec::new();
            for &system in &record.systems {
                if sched.system(system).comps_has_marker {
                    kept.push(system);
                } else {
                    self.splice(system, entity);
                }
            }
            record.systems = kept;
        }

        for system in self.interested(id).to_vec() {
            if record.systems.contains(&system) {
                continue;
            }
            if sched.system(system).matches(record) {
                self.insert(system, entity, record);
            }
        }
    }

    /// Maintains the cache after `entity` lost the kind `id`.
    /// The record must already reflect the removal.
    pub(crate) fn comp_removed(
        &mut self,
        sched: &Schedule,
        entity: Entity,
        record: &mut Record,
        id: CompId,
        marker: bool,
    ) {
        if marker && !record.hidden() {
            // the entity became visible again: recompute its memberships from
            // scratch against every active system
            for &system in &record.systems {
                self.splice(system, entity);
            }
            record.systems.clear();
            for (system, def) in sched.active() {
                if def.matches(record) {
                    self.entities[system.index()].push(entity);
                    record.systems.push(system);
                }
            }
            return;
        }

        for system in self.interested(id).to_vec() {
            if let Some(position) = record.systems.iter().position(|&cached| cached == system) {
                record.systems.swap_remove(position);
                self.splice(system, entity);
            }
        }
    }
}

impl World {
    /// Records that the kind `id` was attached to `entity` and updates the
    /// cache and the promise dirty set in the same step.
    pub(crate) fn on_comp_added(&mut self, entity: Entity, id: CompId, marker: bool) {
        self.cache.comp_added(&self.sched, entity, self.entities.record_mut(entity), id, marker);
        self.promises.mark_changed(entity);
    }

    pub(crate) fn on_comp_removed(&mut self, entity: Entity, id: CompId, marker: bool) {
        self.cache.comp_removed(&self.sched, entity, self.entities.record_mut(entity), id, marker);
        self.promises.mark_changed(entity);
    }

    /// Activates every pending system whose signature has been fully seen:
    /// each required resource has existed at some point, and each required
    /// kind has been attached to some entity at least once.
    pub(crate) fn activate_ready_systems(&mut self) {
        let ready: Vec<SystemId> = self
            .sched
            .pending()
            .filter(|(_, def)| {
                def.resources.iter().all(|&res| self.cache.resource_seen(res))
                    && def
                        .comps
                        .as_ref()
                        .map_or(true, |comps| comps.iter().all(|&c| self.cache.comp_seen(c)))
            })
            .map(|(id, _)| id)
            .collect();

        for id in ready {
            self.activate_system(id);
        }
    }

    /// One-time population scan for a newly activated system.
    fn activate_system(&mut self, id: SystemId) {
        log::debug!("system `{}` activated", self.sched.name(id));
        let def = self.sched.system_mut(id);
        def.active = true;

        let Some(comps) = def.comps.clone() else { return };
        for &comp in &comps {
            self.cache.register_interest(comp, id);
        }

        let def = self.sched.system(id);
        for (entity, record) in self.entities.iter_mut() {
            if def.matches(record) && !record.systems.contains(&id) {
                self.cache.insert(id, entity, record);
            }
        }
    }
}
