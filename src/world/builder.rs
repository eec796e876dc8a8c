//! World construction.

use crate::world::{init, promise, query, sched, Resources, World};
use crate::{comp, entity};

/// Builds a [`World`] with a fixed, totally ordered phase list.
///
/// The exact phase set is a configuration concern of the surrounding game;
/// the core only guarantees that ticks walk the phases in the order they
/// were declared here.
#[derive(Default)]
pub struct Builder {
    sched: sched::Schedule,
}

impl Builder {
    pub fn new() -> Self { Self::default() }

    /// Declares the next phase in tick order.
    ///
    /// Panics if a phase named `name` was already declared.
    pub fn phase(&mut self, name: &str) -> sched::Phase { self.sched.add_phase(name) }

    pub fn build(self) -> World {
        World {
            registry:  comp::Registry::default(),
            entities:  entity::Store::default(),
            resources: Resources::default(),
            cache:     query::Cache::default(),
            sched:     self.sched,
            inits:     init::Resolver::default(),
            promises:  promise::Registry::default(),
        }
    }
}
