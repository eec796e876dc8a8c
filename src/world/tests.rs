use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::test_util::{self, EventTracer};
use crate::world::{init, Builder, InitSpec, Outcome, Phase};
use crate::{Entity, World};

struct Pos {
    x: i32,
    y: i32,
}

struct Vel(i32);

struct Dead;

fn world_with_phase() -> (World, Phase) {
    test_util::init_logger();
    let mut builder = Builder::new();
    let phase = builder.phase("world");
    (builder.build(), phase)
}

/// Collects the snapshot a system receives on every invocation.
fn collect_system(
    world: &mut World,
    name: &str,
    phase: Phase,
    comps: &[crate::comp::CompId],
) -> Rc<RefCell<Vec<Vec<Entity>>>> {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let capture = Rc::clone(&seen);
    world.add_system(name, phase, Some(comps), &[], move |_, entities| {
        let mut sorted = entities.to_vec();
        sorted.sort();
        capture.borrow_mut().push(sorted);
    });
    seen
}

#[test]
fn test_empty_update_is_noop() {
    let (mut world, _) = world_with_phase();
    world.update();
    world.update();
}

#[test]
fn test_move_right_scenario() {
    let (mut world, phase) = world_with_phase();
    let pos = world.define_component("pos", || Pos { x: 0, y: 0 });

    let seen = collect_system(&mut world, "moveRight", phase, &[pos.id()]);

    let e1 = world.create_entity();
    world.add_component(e1, pos, Pos { x: 0, y: 0 });
    world.update();

    assert_eq!(*seen.borrow(), vec![vec![e1]]);
}

#[test]
#[should_panic(expected = "already has component `pos`")]
fn test_strict_add_rejects_duplicates() {
    let (mut world, _) = world_with_phase();
    let pos = world.define_component("pos", || Pos { x: 0, y: 0 });
    let e1 = world.create_entity();
    world.add_component(e1, pos, Pos { x: 1, y: 1 });
    world.add_component(e1, pos, Pos { x: 2, y: 2 });
}

#[test]
fn test_ensure_component_is_idempotent() {
    let (mut world, _) = world_with_phase();
    let pos = world.define_component("pos", || Pos { x: 7, y: 8 });
    let e1 = world.create_entity();

    world.ensure_component(e1, pos).x = 100;
    let again = world.ensure_component(e1, pos);
    assert_eq!(again.x, 100);
    assert_eq!(again.y, 8);
}

#[test]
#[should_panic(expected = "cannot remove component `vel` from entity #1: not present")]
fn test_strict_remove_rejects_absent() {
    let (mut world, _) = world_with_phase();
    let vel = world.define_component("vel", || Vel(0));
    let e1 = world.create_entity();
    world.remove_component(e1, vel);
}

#[test]
fn test_try_remove_component() {
    let (mut world, _) = world_with_phase();
    let vel = world.define_component("vel", || Vel(0));
    let e1 = world.create_entity();

    assert!(world.try_remove_component(e1, vel).is_none());
    world.add_component(e1, vel, Vel(3));
    let removed = world.try_remove_component(e1, vel).expect("vel was added");
    assert_eq!(removed.0, 3);
    assert!(world.get_component(e1, vel).is_none());
}

#[test]
fn test_cache_tracks_adds_and_removes() {
    let (mut world, phase) = world_with_phase();
    let pos = world.define_component("pos", || Pos { x: 0, y: 0 });
    let vel = world.define_component("vel", || Vel(0));

    let seen = collect_system(&mut world, "mover", phase, &[pos.id(), vel.id()]);

    let e1 = world.create_entity();
    let e2 = world.create_entity();
    world.add_component(e1, pos, Pos { x: 0, y: 0 });
    world.add_component(e1, vel, Vel(1));
    world.add_component(e2, pos, Pos { x: 0, y: 0 });
    world.update();

    world.add_component(e2, vel, Vel(2));
    world.update();

    world.remove_component(e1, vel);
    world.update();

    assert_eq!(*seen.borrow(), vec![vec![e1], vec![e1, e2], vec![e2]]);
}

#[test]
fn test_marker_hides_entity_from_caches() {
    let (mut world, phase) = world_with_phase();
    let pos = world.define_component("pos", || Pos { x: 0, y: 0 });
    let vel = world.define_component("vel", || Vel(0));
    let dead = world.define_marker("dead", || Dead);

    let movers = collect_system(&mut world, "mover", phase, &[pos.id(), vel.id()]);
    let reapers = collect_system(&mut world, "reaper", phase, &[dead.id()]);

    let e1 = world.create_entity();
    world.add_component(e1, pos, Pos { x: 0, y: 0 });
    world.add_component(e1, vel, Vel(1));
    world.update();

    // pos and vel are still present, but the marker hides the entity
    world.add_component(e1, dead, Dead);
    world.update();

    // removing the marker readmits the entity to every matching cache
    world.remove_component(e1, dead);
    world.update();

    assert_eq!(*movers.borrow(), vec![vec![e1], vec![], vec![e1]]);
    // the reaper system activates on the tick the marker is first seen
    assert_eq!(*reapers.borrow(), vec![vec![e1], vec![]]);
}

#[test]
fn test_entity_promise_fires_exactly_once() {
    let (mut world, _) = world_with_phase();
    let pos = world.define_component("pos", || Pos { x: 0, y: 0 });
    let vel = world.define_component("vel", || Vel(0));

    let fired = Rc::new(Cell::new(0));
    let capture = Rc::clone(&fired);
    let e1 = world.create_entity();
    world.when_entity_has(e1, &[pos.id(), vel.id()], move |_, entity| {
        assert_eq!(entity.id(), 1);
        capture.set(capture.get() + 1);
    });

    world.add_component(e1, pos, Pos { x: 0, y: 0 });
    world.update();
    assert_eq!(fired.get(), 0);

    world.add_component(e1, vel, Vel(1));
    world.update();
    assert_eq!(fired.get(), 1);

    world.update();
    assert_eq!(fired.get(), 1);
}

#[test]
fn test_entity_promise_resolves_immediately_when_satisfied() {
    let (mut world, _) = world_with_phase();
    let pos = world.define_component("pos", || Pos { x: 0, y: 0 });

    let e1 = world.create_entity();
    world.add_component(e1, pos, Pos { x: 0, y: 0 });

    let fired = Rc::new(Cell::new(0));
    let capture = Rc::clone(&fired);
    world.when_entity_has(e1, &[pos.id()], move |_, _| capture.set(capture.get() + 1));
    assert_eq!(fired.get(), 1);
}

#[test]
fn test_resource_promise() {
    let (mut world, _) = world_with_phase();
    let config = world.define_component("config", || 0_u64);

    let fired = Rc::new(Cell::new(0));
    let capture = Rc::clone(&fired);
    world.when_resources(&[config.id()], move |world| {
        assert_eq!(*world.get_resource(config).expect("promise fired"), 42);
        capture.set(capture.get() + 1);
    });

    world.update();
    assert_eq!(fired.get(), 0);

    world.add_resource(config, 42_u64);
    world.update();
    assert_eq!(fired.get(), 1);
    world.update();
    assert_eq!(fired.get(), 1);
}

#[test]
fn test_lazy_init_promotion() {
    let (mut world, phase) = world_with_phase();
    let q = world.define_component("q", || 0_i32);
    let r = world.define_component("r", || 0_i32);

    let runs = Rc::new(Cell::new(0));
    let capture = Rc::clone(&runs);
    world.add_lazy_init("provide_r", &[q.id()], &[r.id()], move |world| {
        capture.set(capture.get() + 1);
        let base = *world.get_resource(q).expect("required resource exists");
        world.add_resource(r, base + 1);
        Outcome::Ready
    });

    // nothing demands `r` yet; the routine stays lazy
    world.update();
    assert!(world.get_resource(r).is_none());

    // a system depending on `r` promotes the routine, but `q` is still absent
    world.add_system("needs_r", phase, None, &[r.id()], |_, _| {});
    world.update();
    world.update();
    assert!(world.get_resource(r).is_none());
    assert_eq!(runs.get(), 0);

    world.add_resource(q, 10);
    world.update();
    assert_eq!(*world.get_resource(r).expect("init routine ran"), 11);
    assert_eq!(runs.get(), 1);

    // a finished routine never runs again
    world.update();
    assert_eq!(runs.get(), 1);
}

#[test]
fn test_lazy_init_chain_resolves_in_one_tick() {
    let (mut world, phase) = world_with_phase();
    let q = world.define_component("q", || 0_i32);
    let r = world.define_component("r", || 0_i32);

    world.add_lazy_init("provide_q", &[], &[q.id()], move |world| {
        world.add_resource(q, 5);
        Outcome::Ready
    });
    world.add_lazy_init("provide_r", &[q.id()], &[r.id()], move |world| {
        let base = *world.get_resource(q).expect("provide_q ran first");
        world.add_resource(r, base * 2);
        Outcome::Ready
    });

    // demanding `r` transitively promotes the provider of `q`
    world.add_system("needs_r", phase, None, &[r.id()], |_, _| {});
    world.update();
    assert_eq!(*world.get_resource(r).expect("chain resolved"), 10);
}

#[test]
fn test_lazy_init_registered_after_demand() {
    let (mut world, phase) = world_with_phase();
    let r = world.define_component("r", || 0_i32);

    // the demand arrives before the provider is registered
    world.add_system("needs_r", phase, None, &[r.id()], |_, _| {});
    world.add_lazy_init("provide_r", &[], &[r.id()], move |world| {
        world.add_resource(r, 1);
        Outcome::Ready
    });

    world.update();
    assert_eq!(*world.get_resource(r).expect("late provider promoted"), 1);
}

#[test]
fn test_eager_init_waits_for_component_set() {
    let (mut world, _) = world_with_phase();
    let anchor = world.define_component("anchor", || ());
    let level = world.define_component("level", || 0_i32);

    world.register_init(InitSpec {
        name:              "level_gen".to_string(),
        require_resources: Vec::new(),
        require_comps:     Some(vec![anchor.id()]),
        provide_resources: vec![level.id()],
        eager:             true,
        f:                 Box::new(move |world| {
            world.add_resource(level, 1);
            Outcome::Ready
        }),
    });

    world.update();
    assert!(world.get_resource(level).is_none());

    let e1 = world.create_entity();
    world.add_component(e1, anchor, ());
    world.update();
    assert_eq!(*world.get_resource(level).expect("anchor entity exists"), 1);
}

#[test]
fn test_deferred_init_completes_through_gate() {
    let (mut world, _) = world_with_phase();
    let assets = world.define_component("assets", || 0_i32);

    let gate = init::Gate::new();
    let handle = gate.clone();
    world.register_init(InitSpec {
        name:              "load_assets".to_string(),
        require_resources: Vec::new(),
        require_comps:     None,
        provide_resources: vec![assets.id()],
        eager:             true,
        f:                 Box::new(move |_| Outcome::Deferred(gate)),
    });

    // started but not complete: provided resources are guaranteed absent
    world.update();
    world.update();
    assert!(world.get_resource(assets).is_none());

    // the "asynchronous" work finishes
    world.add_resource(assets, 9);
    handle.open();
    world.update();
    assert_eq!(*world.get_resource(assets).expect("gate opened"), 9);
}

#[test]
#[should_panic(expected = "init routine `broken` completed without providing resources: r")]
fn test_init_must_provide_declared_resources() {
    let (mut world, _) = world_with_phase();
    let r = world.define_component("r", || 0_i32);

    world.register_init(InitSpec {
        name:              "broken".to_string(),
        require_resources: Vec::new(),
        require_comps:     None,
        provide_resources: vec![r.id()],
        eager:             true,
        f:                 Box::new(|_| Outcome::Ready),
    });
    world.update();
}

#[test]
#[should_panic(expected = "resource `r` already has init provider `first`")]
fn test_duplicate_init_provider_panics() {
    let (mut world, _) = world_with_phase();
    let r = world.define_component("r", || 0_i32);

    world.add_lazy_init("first", &[], &[r.id()], |_| Outcome::Ready);
    world.add_lazy_init("second", &[], &[r.id()], |_| Outcome::Ready);
}

#[test]
#[should_panic(expected = "a system named `dup` is already registered")]
fn test_duplicate_system_name_panics() {
    let (mut world, phase) = world_with_phase();
    world.add_system("dup", phase, None, &[], |_, _| {});
    world.add_system("dup", phase, None, &[], |_, _| {});
}

#[test]
#[should_panic(expected = "a phase named `world` is already defined")]
fn test_duplicate_phase_name_panics() {
    let mut builder = Builder::new();
    builder.phase("world");
    builder.phase("world");
}

#[test]
fn test_resource_ops() {
    let (mut world, _) = world_with_phase();
    let config = world.define_component("config", || 5_u64);

    assert!(world.get_resource(config).is_none());
    assert_eq!(*world.ensure_resource(config), 5);
    *world.get_resource_mut(config).expect("ensured above") = 6;
    assert_eq!(*world.ensure_resource(config), 6);

    let names: Vec<&str> = world.resources().map(|(name, _)| name).collect();
    assert_eq!(names, vec!["config"]);

    assert_eq!(world.remove_resource(config), 6);
    assert!(world.try_remove_resource(config).is_none());
    assert!(world.resources().next().is_none());
}

#[test]
#[should_panic(expected = "resource `config` already exists")]
fn test_duplicate_resource_panics() {
    let (mut world, _) = world_with_phase();
    let config = world.define_component("config", || 0_u64);
    world.add_resource(config, 1_u64);
    world.add_resource(config, 2_u64);
}

#[test]
fn test_phase_and_registration_order() {
    test_util::init_logger();
    let mut builder = Builder::new();
    let pre = builder.phase("pre-world");
    let post = builder.phase("post-world");
    let mut world = builder.build();

    let tracer = Rc::new(EventTracer::new([("pre_b", "post_a"), ("pre_a", "pre_b")]));
    for (name, phase) in [("post_a", post), ("pre_a", pre), ("pre_b", pre)] {
        let tracer = Rc::clone(&tracer);
        world.add_system(name, phase, None, &[], move |_, _| tracer.trace(name));
    }
    world.update();

    drop(world); // release the Rc clones captured by the callbacks
    assert_eq!(
        Rc::try_unwrap(tracer).ok().expect("all callbacks dropped").get_events(),
        vec!["pre_a", "pre_b", "post_a"],
    );
}

#[test]
fn test_resource_only_system_activation_is_sticky() {
    let (mut world, phase) = world_with_phase();
    let config = world.define_component("config", || 0_u64);

    let runs = Rc::new(Cell::new(0));
    let capture = Rc::clone(&runs);
    world.add_system("settle", phase, None, &[config.id()], move |_, entities| {
        assert!(entities.is_empty());
        capture.set(capture.get() + 1);
    });

    world.update();
    assert_eq!(runs.get(), 0);

    world.add_resource(config, 1_u64);
    world.update();
    assert_eq!(runs.get(), 1);

    // activation is based on the resource having existed, not existing now
    world.remove_resource(config);
    world.update();
    assert_eq!(runs.get(), 2);
}

#[test]
fn test_callback_mutation_does_not_affect_snapshot() {
    let (mut world, phase) = world_with_phase();
    let pos = world.define_component("pos", || Pos { x: 0, y: 0 });

    let seen = Rc::new(RefCell::new(Vec::new()));
    let capture = Rc::clone(&seen);
    world.add_system("cull", phase, Some(&[pos.id()]), &[], move |world, entities| {
        let mut sorted = entities.to_vec();
        sorted.sort();
        capture.borrow_mut().push(sorted);
        // mutating another entity must not change the list being iterated
        for &entity in entities {
            if entity.id() == 2 {
                world.remove_component(entity, pos);
            }
        }
    });

    let e1 = world.create_entity();
    let e2 = world.create_entity();
    world.add_component(e1, pos, Pos { x: 0, y: 0 });
    world.add_component(e2, pos, Pos { x: 0, y: 0 });

    world.update();
    world.update();
    assert_eq!(*seen.borrow(), vec![vec![e1, e2], vec![e1]]);
}

#[test]
fn test_serde_hooks_dispatch_by_id() {
    let (mut world, _) = world_with_phase();
    let hp = world.define_component("hp", || 0_u32);
    world.register_serde(
        hp,
        |value| value.to_le_bytes().to_vec(),
        |bytes| u32::from_le_bytes(bytes.try_into().expect("u32 payload")),
    );

    let e1 = world.create_entity();
    let e2 = world.create_entity();
    world.add_component(e1, hp, 1234_u32);

    let bytes = world.serialize_component(e1, hp.id()).expect("hp present on e1");
    assert!(world.serialize_component(e2, hp.id()).is_none());

    world.deserialize_component(e2, hp.id(), &bytes);
    assert_eq!(*world.get_component(e2, hp).expect("deserialized"), 1234);

    // deserializing onto a bearer overwrites in place
    world.deserialize_component(e1, hp.id(), &5678_u32.to_le_bytes());
    assert_eq!(*world.get_component(e1, hp).expect("still present"), 5678);
}

#[test]
fn test_systems_activate_in_registration_order() {
    let (mut world, phase) = world_with_phase();
    let pos = world.define_component("pos", || Pos { x: 0, y: 0 });

    let first = collect_system(&mut world, "first", phase, &[pos.id()]);
    let second = collect_system(&mut world, "second", phase, &[pos.id()]);

    let e1 = world.create_entity();
    world.add_component(e1, pos, Pos { x: 0, y: 0 });
    world.update();

    // both activated on the same tick and saw the pre-existing entity
    assert_eq!(*first.borrow(), vec![vec![e1]]);
    assert_eq!(*second.borrow(), vec![vec![e1]]);
}
