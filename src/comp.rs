//! Component and resource kinds.
//!
//! Kinds are defined dynamically by name rather than by Rust type:
//! the registry interns each name into an incrementing [`CompId`],
//! so membership tests never hash strings at steady state.
//! A kind registered as a *marker* hides its bearer from every system cache
//! except caches whose signature names a marker the entity bears.
//!
//! Resources reuse the same kind registry;
//! their values live in the world-level resource table instead of on entities.

use std::any::{type_name, Any, TypeId};
use std::fmt;
use std::marker::PhantomData;

use indexmap::IndexMap;

/// Identifies a registered component or resource kind.
///
/// Ids are indices into the kind registry, assigned in definition order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CompId(pub(crate) u32);

impl CompId {
    pub(crate) fn index(self) -> usize { self.0 as usize }
}

impl fmt::Display for CompId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result { write!(f, "#{}", self.0) }
}

/// A typed handle to a registered kind, returned by
/// [`World::define_component`](crate::World::define_component).
///
/// The handle is `Copy` and only carries the [`CompId`];
/// the constructor and metadata stay in the registry.
pub struct Def<T: 'static> {
    id:  CompId,
    _ty: PhantomData<fn() -> T>,
}

impl<T: 'static> Def<T> {
    pub(crate) fn new(id: CompId) -> Self { Self { id, _ty: PhantomData } }

    /// The untyped id of this kind, used in system and init signatures.
    pub fn id(self) -> CompId { self.id }
}

impl<T: 'static> Clone for Def<T> {
    fn clone(&self) -> Self { *self }
}
impl<T: 'static> Copy for Def<T> {}

impl<T: 'static> fmt::Debug for Def<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_tuple("Def").field(&self.id).field(&type_name::<T>()).finish()
    }
}

/// Serialization hooks for one kind, registered by the networking layer.
/// The core dispatches on [`CompId`] and never interprets the bytes.
pub(crate) struct Serde {
    pub(crate) serialize:   Box<dyn Fn(&dyn Any) -> Vec<u8>>,
    pub(crate) deserialize: Box<dyn Fn(&[u8]) -> Box<dyn Any>>,
}

/// Metadata for one registered kind.
pub(crate) struct Kind {
    ty:               TypeId,
    ty_name:          &'static str,
    marker:           bool,
    pub(crate) ctor:  Box<dyn Fn() -> Box<dyn Any>>,
    pub(crate) serde: Option<Serde>,
}

impl Kind {
    pub(crate) fn is_marker(&self) -> bool { self.marker }

    /// Asserts that `T` is the value type this kind was defined with.
    pub(crate) fn check_type<T: 'static>(&self) {
        assert!(
            self.ty == TypeId::of::<T>(),
            "kind was defined with value type {} but accessed as {}",
            self.ty_name,
            type_name::<T>(),
        );
    }
}

/// Interns kind names and stores per-kind metadata.
#[derive(Default)]
pub(crate) struct Registry {
    kinds: IndexMap<String, Kind>,
}

impl Registry {
    pub(crate) fn define<T: 'static>(
        &mut self,
        name: &str,
        marker: bool,
        ctor: impl Fn() -> T + 'static,
    ) -> Def<T> {
        if self.kinds.contains_key(name) {
            panic!("a component kind named `{name}` is already defined");
        }
        let kind = Kind {
            ty: TypeId::of::<T>(),
            ty_name: type_name::<T>(),
            marker,
            ctor: Box::new(move || Box::new(ctor()) as Box<dyn Any>),
            serde: None,
        };
        let (index, _) = self.kinds.insert_full(name.to_string(), kind);
        Def::new(CompId(index.try_into().expect("too many component kinds")))
    }

    pub(crate) fn get(&self, id: CompId) -> &Kind {
        match self.kinds.get_index(id.index()) {
            Some((_, kind)) => kind,
            None => panic!("component id {id} is not registered"),
        }
    }

    pub(crate) fn name(&self, id: CompId) -> &str {
        match self.kinds.get_index(id.index()) {
            Some((name, _)) => name,
            None => panic!("component id {id} is not registered"),
        }
    }

    pub(crate) fn set_serde(&mut self, id: CompId, serde: Serde) {
        let (_, kind) = match self.kinds.get_index_mut(id.index()) {
            Some(entry) => entry,
            None => panic!("component id {id} is not registered"),
        };
        kind.serde = Some(serde);
    }
}
