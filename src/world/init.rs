//! Dependency-driven initialization.
//!
//! Init routines come in two pools: *lazy* routines stay dormant until
//! something demands one of the resources they provide, and *eager* routines
//! queue immediately, waiting only on their declared prerequisites.
//! Promotion and prerequisite propagation run as an explicit worklist over a
//! provider index (resource kind → providing routine), so a demanded resource
//! transitively wakes the whole chain of lazy providers beneath it.
//!
//! A routine may complete asynchronously: instead of returning
//! [`Outcome::Ready`] it returns [`Outcome::Deferred`] with a [`Gate`] that
//! whatever finishes the work opens later. The routine's provided resources
//! are guaranteed absent until then, and their presence is asserted the tick
//! the gate opens — a completed routine that failed to provide is fatal.

use std::cell::Cell;
use std::rc::Rc;

use bitvec::prelude::BitVec;
use indexmap::IndexMap;
use itertools::Itertools;

use crate::comp::CompId;
use crate::World;

/// A completion flag handed out by a deferred init routine.
///
/// Clones share the flag; opening any clone completes the routine
/// on the next tick.
#[derive(Clone, Default)]
pub struct Gate(Rc<Cell<bool>>);

impl Gate {
    /// Creates a closed gate.
    pub fn new() -> Self { Self::default() }

    /// Marks the routine as complete.
    pub fn open(&self) { self.0.set(true); }

    pub(crate) fn is_open(&self) -> bool { self.0.get() }
}

/// What an init routine reports when it returns.
pub enum Outcome {
    /// The routine did all of its work synchronously;
    /// its provided resources are asserted immediately.
    Ready,
    /// The routine scheduled asynchronous work;
    /// the resolver polls the gate each tick.
    Deferred(Gate),
}

pub type InitFn = Box<dyn FnOnce(&mut World) -> Outcome>;

/// Registration arguments for [`World::register_init`].
pub struct InitSpec {
    /// Diagnostic name, used in logs and fatal messages.
    pub name:              String,
    /// Resources that must exist before the routine starts.
    pub require_resources: Vec<CompId>,
    /// If set, at least one entity bearing all of these kinds must exist
    /// before the routine starts.
    pub require_comps:     Option<Vec<CompId>>,
    /// Resources the routine guarantees to create. At most one routine may
    /// provide any given resource.
    pub provide_resources: Vec<CompId>,
    /// Eager routines queue at registration;
    /// lazy routines wait until a provided resource is demanded.
    pub eager:             bool,
    pub f:                 InitFn,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Registered, not yet demanded.
    Lazy,
    /// Demanded (or eager), waiting on prerequisites.
    Pending,
    /// Invoked; a deferred routine is still running behind its gate.
    Started,
    /// Completed and verified to have provided its resources.
    Finished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct InitId(usize);

struct Reg {
    name:              String,
    state:             State,
    require_resources: Vec<CompId>,
    require_comps:     Option<Vec<CompId>>,
    provide_resources: Vec<CompId>,
    gate:              Option<Gate>,
    f:                 Option<InitFn>,
}

#[derive(Default)]
pub(crate) struct Resolver {
    regs:     Vec<Reg>,
    /// Resource kind → the unique routine providing it.
    provider: IndexMap<CompId, InitId>,
    /// Resource kinds demanded while absent.
    demanded: BitVec,
}

impl Resolver {
    fn reg(&self, id: InitId) -> &Reg { self.regs.get(id.0).expect("invalid init id") }

    fn reg_mut(&mut self, id: InitId) -> &mut Reg {
        self.regs.get_mut(id.0).expect("invalid init id")
    }

    /// Marks `resource` as demanded; returns false if it already was.
    fn demand(&mut self, resource: CompId) -> bool {
        let index = resource.index();
        if self.demanded.len() <= index {
            self.demanded.resize(index + 1, false);
        }
        if self.demanded[index] {
            return false;
        }
        self.demanded.set(index, true);
        true
    }

    fn is_demanded(&self, resource: CompId) -> bool {
        self.demanded.get(resource.index()).map_or(false, |bit| *bit)
    }
}

impl World {
    /// Registers an init routine. Panics if one of its provided resources
    /// already has a provider.
    pub fn register_init(&mut self, spec: InitSpec) {
        for &resource in &spec.provide_resources {
            if let Some(&prev) = self.inits.provider.get(&resource) {
                panic!(
                    "resource `{}` already has init provider `{}`",
                    self.registry.name(resource),
                    self.inits.reg(prev).name,
                );
            }
        }

        let id = InitId(self.inits.regs.len());
        let state = if spec.eager { State::Pending } else { State::Lazy };
        let require_resources = spec.require_resources.clone();
        let demanded = spec.provide_resources.iter().any(|&resource| {
            self.inits.is_demanded(resource) && !self.resources.contains(resource)
        });
        for &resource in &spec.provide_resources {
            self.inits.provider.insert(resource, id);
        }
        self.inits.regs.push(Reg {
            name: spec.name,
            state,
            require_resources: spec.require_resources,
            require_comps: spec.require_comps,
            provide_resources: spec.provide_resources,
            gate: None,
            f: Some(spec.f),
        });

        if spec.eager {
            for resource in require_resources {
                self.demand_resource(resource);
            }
        } else if demanded {
            // something demanded one of our resources before we registered
            self.promote(id);
        }
    }

    /// Registers a lazy routine with no required component set.
    pub fn add_lazy_init(
        &mut self,
        name: &str,
        require_resources: &[CompId],
        provide_resources: &[CompId],
        f: impl FnOnce(&mut World) -> Outcome + 'static,
    ) {
        self.register_init(InitSpec {
            name:              name.to_string(),
            require_resources: require_resources.to_vec(),
            require_comps:     None,
            provide_resources: provide_resources.to_vec(),
            eager:             false,
            f:                 Box::new(f),
        });
    }

    /// Declares that `resource` is needed. If it does not exist yet and a
    /// lazy routine provides it, that routine (and transitively the lazy
    /// providers of its own requirements) is promoted to pending.
    pub(crate) fn demand_resource(&mut self, resource: CompId) {
        let mut work = vec![resource];
        while let Some(resource) = work.pop() {
            if self.resources.contains(resource) {
                continue;
            }
            if !self.inits.demand(resource) {
                continue;
            }
            let Some(&id) = self.inits.provider.get(&resource) else { continue };
            if self.inits.reg(id).state == State::Lazy {
                log::debug!(
                    "init routine `{}` promoted: resource `{}` demanded",
                    self.inits.reg(id).name,
                    self.registry.name(resource),
                );
                self.inits.reg_mut(id).state = State::Pending;
                work.extend(self.inits.reg(id).require_resources.iter().copied());
            }
        }
    }

    fn promote(&mut self, id: InitId) {
        log::debug!("init routine `{}` promoted at registration", self.inits.reg(id).name);
        self.inits.reg_mut(id).state = State::Pending;
        let requires = self.inits.reg(id).require_resources.clone();
        for resource in requires {
            self.demand_resource(resource);
        }
    }

    /// Advances the resolver by one tick: completed gates are verified, and
    /// pending routines whose prerequisites hold are started. Starting a
    /// routine may satisfy further routines within the same tick, so the
    /// start pass loops until it makes no progress.
    pub(crate) fn advance_inits(&mut self) {
        let completed: Vec<InitId> = self
            .inits
            .regs
            .iter()
            .enumerate()
            .filter(|(_, reg)| {
                reg.state == State::Started
                    && reg.gate.as_ref().map_or(false, Gate::is_open)
            })
            .map(|(index, _)| InitId(index))
            .collect();
        for id in completed {
            self.finish_init(id);
        }

        loop {
            let ready: Vec<InitId> = self
                .inits
                .regs
                .iter()
                .enumerate()
                .filter(|(_, reg)| {
                    reg.state == State::Pending
                        && reg
                            .require_resources
                            .iter()
                            .all(|&resource| self.resources.contains(resource))
                        && reg
                            .require_comps
                            .as_ref()
                            .map_or(true, |comps| self.entities.any_with(comps))
                })
                .map(|(index, _)| InitId(index))
                .collect();
            if ready.is_empty() {
                break;
            }

            for id in ready {
                let reg = self.inits.reg_mut(id);
                reg.state = State::Started;
                let f = reg.f.take().expect("pending routine has not been invoked");
                log::debug!("init routine `{}` started", reg.name);
                match f(self) {
                    Outcome::Ready => self.finish_init(id),
                    Outcome::Deferred(gate) => self.inits.reg_mut(id).gate = Some(gate),
                }
            }
        }
    }

    /// Verifies that a completed routine created everything it declared.
    fn finish_init(&mut self, id: InitId) {
        let missing: Vec<&str> = self
            .inits
            .reg(id)
            .provide_resources
            .iter()
            .filter(|&&resource| !self.resources.contains(resource))
            .map(|&resource| self.registry.name(resource))
            .collect();
        if !missing.is_empty() {
            panic!(
                "init routine `{}` completed without providing resources: {}",
                self.inits.reg(id).name,
                missing.iter().join(", "),
            );
        }
        let reg = self.inits.reg_mut(id);
        reg.state = State::Finished;
        reg.gate = None;
        log::debug!("init routine `{}` finished", reg.name);
    }
}
