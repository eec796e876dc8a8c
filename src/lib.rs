//! A dynamic, name-keyed ECS-like runtime.
//!
//! # What is this?
//! kinec is the generic core a family of small games runs on:
//! named data ("components") attach dynamically to numeric entity ids,
//! global singletons ("resources") live in a world-level table,
//! and "systems" are callbacks that run once per tick against the entities
//! matching their component and resource signature, bucketed into ordered
//! execution phases.
//!
//! Unlike a statically typed ECS, component kinds here are defined at
//! runtime by name — the registry interns each name into a small integer id,
//! so two plugins can coexist without compile-time coordination, and a
//! duplicate name is caught as a fatal configuration error at startup.
//!
//! # Cached queries
//! Query results are maintained incrementally: every component add or remove
//! updates the affected system caches in the same step, so a tick never
//! rescans all entities. A system whose signature has not been fully seen
//! yet stays *pending* and costs one membership check per tick. Entities
//! bearing a *marker* kind (e.g. a dead flag) are hidden from every cache
//! except those whose signature names the marker.
//!
//! # Initialization and promises
//! Expensive setup registers as an *init routine*: lazy routines stay
//! dormant until a system or another routine demands one of the resources
//! they provide, eager routines queue immediately, and both wait on their
//! declared prerequisites before running (possibly finishing asynchronously
//! behind a [`world::Gate`]). One-shot *entity promises* fire a callback as
//! soon as a specific entity acquires a specific component set, checked only
//! against entities that changed since the last tick.
//!
//! The runtime is a single logical thread driven by discrete calls to
//! [`World::update`]; there is no parallel system execution and no locking.

pub mod comp;

pub mod entity;
pub use entity::Entity;

pub mod world;
pub use world::{Builder, Phase, World};

#[cfg(test)]
pub(crate) mod test_util;
