#![allow(dead_code)]

//! Utilities shared by unit tests.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;

use indexmap::IndexSet;

pub(crate) fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Records events and ensures that they are in the correct order.
pub(crate) struct EventTracer<T: fmt::Debug + Eq + Hash> {
    dependencies: HashMap<T, Vec<T>>,
    seen:         RefCell<IndexSet<T>>,
}

impl<T: fmt::Debug + Eq + Hash> EventTracer<T> {
    /// Creates an event tracer that ensures `a` executes after `b`
    /// for each `(a, b)` input.
    pub(crate) fn new(orders: impl IntoIterator<Item = (T, T)>) -> Self {
        let mut dependencies: HashMap<T, Vec<T>> = HashMap::new();
        for (before, after) in orders {
            dependencies.entry(after).or_default().push(before);
        }
        Self { dependencies, seen: RefCell::new(IndexSet::new()) }
    }

    /// Records that `event` has happened.
    ///
    /// # Panics
    /// Panics if the same `event` was sent twice or a dependency is not satisfied.
    pub(crate) fn trace(&self, event: T) {
        let mut seen = self.seen.borrow_mut();

        if let Some(deps) = self.dependencies.get(&event) {
            for dep in deps {
                assert!(seen.contains(dep), "{event:?} should happen after {dep:?}");
            }
        }

        let (index, new) = seen.insert_full(event);
        assert!(
            new,
            "{:?} is traced twice",
            seen.get_index(index).expect("insert_full should return valid index")
        );
    }

    /// Returns the events observed in this tracer.
    pub(crate) fn get_events(self) -> Vec<T> {
        self.seen.into_inner().into_iter().collect()
    }
}
