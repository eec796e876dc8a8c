//! Phase-ordered system scheduling.
//!
//! Phases are a fixed, totally ordered list supplied through
//! [`Builder`](crate::world::Builder); systems register into exactly one phase
//! and run in registration order within it.
//! A system stays *pending* (skipped at one set-membership check per tick)
//! until every kind in its signature has been seen at least once;
//! pending systems are never removed from their phase's ordering list,
//! so activation order stays deterministic.

use std::cell::RefCell;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::comp::CompId;
use crate::entity::Record;
use crate::{Entity, World};

/// An ordered bucket that determines relative execution order of systems.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Phase(pub(crate) u32);

impl Phase {
    pub(crate) fn index(self) -> usize { self.0 as usize }
}

/// Uniquely identifies a registered system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct SystemId(u32);

impl SystemId {
    pub(crate) fn index(self) -> usize { self.0 as usize }

    fn from_index(index: usize) -> Self {
        Self(index.try_into().expect("too many systems"))
    }
}

pub(crate) type SystemFn = Box<dyn FnMut(&mut World, &[Entity])>;

pub(crate) struct SystemDef {
    pub(crate) phase:            Phase,
    /// `None` means the system is resource-only and owns no entity cache.
    pub(crate) comps:            Option<Vec<CompId>>,
    /// Whether the signature names at least one marker kind.
    pub(crate) comps_has_marker: bool,
    pub(crate) resources:        Vec<CompId>,
    pub(crate) callback:         Rc<RefCell<SystemFn>>,
    pub(crate) active:           bool,
}

impl SystemDef {
    /// Whether `record` belongs in this system's cache.
    /// Hidden entities only match signatures that name one of their markers.
    pub(crate) fn matches(&self, record: &Record) -> bool {
        let Some(comps) = &self.comps else { return false };
        record.has_all(comps) && (!record.hidden() || self.comps_has_marker)
    }
}

struct PhaseDef {
    name:    String,
    systems: Vec<SystemId>,
}

/// All registered phases and systems.
#[derive(Default)]
pub(crate) struct Schedule {
    phases:  Vec<PhaseDef>,
    systems: IndexMap<String, SystemDef>,
}

impl Schedule {
    pub(crate) fn add_phase(&mut self, name: &str) -> Phase {
        if self.phases.iter().any(|phase| phase.name == name) {
            panic!("a phase named `{name}` is already defined");
        }
        let index = self.phases.len();
        self.phases.push(PhaseDef { name: name.to_string(), systems: Vec::new() });
        Phase(index.try_into().expect("too many phases"))
    }

    pub(crate) fn register(&mut self, name: &str, def: SystemDef) -> SystemId {
        if self.systems.contains_key(name) {
            panic!("a system named `{name}` is already registered");
        }
        let phase = match self.phases.get_mut(def.phase.index()) {
            Some(phase) => phase,
            None => panic!("phase {:?} does not belong to this world", def.phase),
        };
        let id = SystemId::from_index(self.systems.len());
        phase.systems.push(id);
        self.systems.insert(name.to_string(), def);
        id
    }

    pub(crate) fn system(&self, id: SystemId) -> &SystemDef {
        let (_, def) = self.systems.get_index(id.index()).expect("invalid system id");
        def
    }

    pub(crate) fn system_mut(&mut self, id: SystemId) -> &mut SystemDef {
        let (_, def) = self.systems.get_index_mut(id.index()).expect("invalid system id");
        def
    }

    pub(crate) fn name(&self, id: SystemId) -> &str {
        let (name, _) = self.systems.get_index(id.index()).expect("invalid system id");
        name
    }

    pub(crate) fn phase_count(&self) -> usize { self.phases.len() }

    pub(crate) fn phase_systems(&self, index: usize) -> &[SystemId] {
        &self.phases[index].systems
    }

    /// Systems not yet activated, in registration order.
    pub(crate) fn pending(&self) -> impl Iterator<Item = (SystemId, &SystemDef)> + '_ {
        self.systems
            .values()
            .enumerate()
            .filter(|(_, def)| !def.active)
            .map(|(index, def)| (SystemId::from_index(index), def))
    }

    /// Active systems, in registration order.
    pub(crate) fn active(&self) -> impl Iterator<Item = (SystemId, &SystemDef)> + '_ {
        self.systems
            .values()
            .enumerate()
            .filter(|(_, def)| def.active)
            .map(|(index, def)| (SystemId::from_index(index), def))
    }
}

impl World {
    /// Runs every active system, phase by phase, in registration order.
    ///
    /// Each system receives a snapshot of its cached entity list taken before
    /// the call, so a callback that mutates other entities never changes the
    /// list it is being iterated with.
    pub(crate) fn run_systems(&mut self) {
        for phase_index in 0..self.sched.phase_count() {
            let system_ids = self.sched.phase_systems(phase_index).to_vec();
            for id in system_ids {
                let (callback, snapshot) = {
                    let def = self.sched.system(id);
                    if !def.active {
                        continue;
                    }
                    let snapshot = match def.comps {
                        Some(_) => self.cache.entities(id).to_vec(),
                        None => Vec::new(),
                    };
                    (Rc::clone(&def.callback), snapshot)
                };
                log::trace!(
                    "running system `{}` on {} entities",
                    self.sched.name(id),
                    snapshot.len(),
                );
                let mut callback = callback.borrow_mut();
                (&mut **callback)(self, &snapshot);
            }
        }
    }
}
