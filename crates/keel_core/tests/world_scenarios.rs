//! End-to-end frame behavior of a world: handles, hierarchy, messaging,
//! spatial queries, async updates and snapshots.

use keel_core::math::{Aabb, Transform, Vec3};
use keel_core::snapshot;
use keel_core::spatial::{Region, ALL_CATEGORIES};
use keel_core::time::TimeStep;
use keel_core::world::{
    Component, Context, DeliveryPhase, Message, MessageTarget, ObjectDesc, ObjectHandle,
    TransformPreservation, TypeRegistry, UpdatePhase, World, WorldDesc, WorldError, WorldEvent,
    WorldModule,
};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

type Log = Arc<Mutex<Vec<String>>>;

#[derive(Debug)]
struct Tagged(&'static str);

keel_core::impl_message!(Tagged);

/// Logs every update and every `Tagged` message with the frame it saw it in.
struct Recorder {
    log: Log,
}

impl Component for Recorder {
    const TYPE_NAME: &'static str = "recorder";
    const UPDATE_PHASES: &'static [UpdatePhase] = &[
        UpdatePhase::PreAsync,
        UpdatePhase::PostAsync,
        UpdatePhase::PostTransform,
    ];

    fn update(&mut self, phase: UpdatePhase, ctx: &mut Context<'_>) {
        let entry = format!("{}:{}", ctx.clock().ticks(), phase.name());
        self.log.lock().unwrap().push(entry);
    }

    fn on_message(&mut self, message: &mut dyn Message, ctx: &mut Context<'_>) -> bool {
        let Some(Tagged(tag)) = message.downcast_ref::<Tagged>() else {
            return false;
        };
        let entry = format!("{}:msg:{}", ctx.clock().ticks(), tag);
        self.log.lock().unwrap().push(entry);
        true
    }
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
struct Inventory {
    items: Vec<String>,
}

impl Component for Inventory {
    const TYPE_NAME: &'static str = "inventory";
}

fn fixed_step(name: &str) -> WorldDesc {
    WorldDesc {
        time_step: TimeStep::Fixed(Duration::from_millis(10)),
        ..WorldDesc::new(name)
    }
}

fn world_with(registry: TypeRegistry, desc: WorldDesc) -> World {
    World::new(desc, Arc::new(registry)).unwrap()
}

fn recorder_world() -> (World, ObjectHandle, Log) {
    let mut registry = TypeRegistry::new();
    registry.register_component::<Recorder>().unwrap();
    let mut world = world_with(registry, fixed_step("recorder"));

    let log = Log::default();
    let object = world.create_object(ObjectDesc::new("listener")).unwrap();
    world
        .create_component(object, Recorder { log: log.clone() })
        .unwrap();
    (world, object, log)
}

fn messages(log: &Log) -> Vec<String> {
    log.lock()
        .unwrap()
        .iter()
        .filter(|entry| entry.contains(":msg:"))
        .cloned()
        .collect()
}

#[test]
fn stale_handle_stays_invalid_after_slot_reuse() {
    let mut world = world_with(TypeRegistry::new(), WorldDesc::new("reuse"));
    let first = world.create_object(ObjectDesc::new("first")).unwrap();
    assert!(world.delete_object(first));
    assert!(!world.is_valid(first));
    world.update().unwrap();

    let second = world.create_object(ObjectDesc::new("second")).unwrap();
    assert_eq!(second.index(), first.index());
    assert_ne!(second.generation(), first.generation());
    assert!(world.object(first).is_none());
    assert_eq!(world.object(second).map(|o| o.name()), Some("second"));
    assert!(!world.delete_object(first));
}

#[test]
fn reparenting_under_a_descendant_is_rejected() {
    let mut world = world_with(TypeRegistry::new(), WorldDesc::new("cycle"));
    let a = world.create_object(ObjectDesc::new("a")).unwrap();
    let b = world.create_object(ObjectDesc::new("b").with_parent(a)).unwrap();
    let c = world.create_object(ObjectDesc::new("c").with_parent(b)).unwrap();

    let result = world.add_child(c, a);
    assert!(matches!(result, Err(WorldError::CycleDetected { .. })));
    assert!(matches!(world.add_child(a, a), Err(WorldError::CycleDetected { .. })));

    assert_eq!(world.object(a).unwrap().parent(), None);
    assert_eq!(world.object(b).unwrap().parent(), Some(a));
    assert_eq!(world.object(c).unwrap().parent(), Some(b));
    assert_eq!(world.object(a).unwrap().children(), &[b]);
    assert_eq!(world.find_child_by_path(a, "b/c"), Some(c));
}

#[test]
fn objects_created_under_a_parent_are_linked_to_it() {
    let mut world = world_with(TypeRegistry::new(), WorldDesc::new("linked"));
    let root = world
        .create_object(ObjectDesc::new("root").with_position(Vec3::X))
        .unwrap();
    let child = world
        .create_object(ObjectDesc::new("child").with_parent(root).with_position(Vec3::Y))
        .unwrap();

    let object = world.object(child).unwrap();
    assert_eq!(object.parent(), Some(root));
    assert_eq!(world.object(root).unwrap().children(), &[child]);
    let global = world.global_transform(child).unwrap();
    assert!(global.position.abs_diff_eq(Vec3::new(1.0, 1.0, 0.0), 1e-6));

    assert!(matches!(
        world.set_parent(root, Some(child), TransformPreservation::PreserveLocal),
        Err(WorldError::CycleDetected { .. })
    ));
    assert_eq!(world.object(root).unwrap().parent(), None);
}

#[test]
fn child_global_is_parent_times_local() {
    let mut world = world_with(TypeRegistry::new(), WorldDesc::new("compose"));
    let parent = world
        .create_object(ObjectDesc::new("parent").with_position(Vec3::X))
        .unwrap();
    let child = world
        .create_object(ObjectDesc::new("child").with_position(Vec3::Y))
        .unwrap();

    world.add_child(parent, child).unwrap();
    let global = world.global_transform(child).unwrap();
    assert!(global.position.abs_diff_eq(Vec3::new(1.0, 1.0, 0.0), 1e-6));

    // Detaching keeps the object where it is in the world.
    assert!(world.detach_child(parent, child).unwrap());
    assert_eq!(world.object(child).unwrap().parent(), None);
    let local = world.local_transform(child).unwrap();
    assert!(local.position.abs_diff_eq(Vec3::new(1.0, 1.0, 0.0), 1e-6));
}

#[test]
fn global_transforms_are_recomputed_lazily() {
    let mut world = world_with(TypeRegistry::new(), WorldDesc::new("lazy"));
    let root = world.create_object(ObjectDesc::new("root")).unwrap();
    let child = world
        .create_object(ObjectDesc::new("child").with_parent(root).with_position(Vec3::Y))
        .unwrap();
    world.update().unwrap();

    world.set_local_position(root, Vec3::new(5.0, 0.0, 0.0)).unwrap();
    assert!(world.object(child).unwrap().is_dirty());

    let before = world.objects().recompute_count();
    let global = world.global_transform(root).unwrap();
    assert_eq!(global.position, Vec3::new(5.0, 0.0, 0.0));
    assert_eq!(world.objects().recompute_count(), before + 1);

    world.global_transform(root).unwrap();
    assert_eq!(world.objects().recompute_count(), before + 1);
    assert!(world.object(child).unwrap().is_dirty());

    world.update().unwrap();
    assert!(!world.object(child).unwrap().is_dirty());
    assert_eq!(
        world.object(child).unwrap().cached_global_transform().position,
        Vec3::new(5.0, 1.0, 0.0)
    );
}

#[test]
fn delayed_message_arrives_in_its_phase() {
    let (mut world, object, log) = recorder_world();
    world.post_message(
        object,
        Tagged("late"),
        Duration::from_millis(35),
        DeliveryPhase::PostAsync,
    );

    for _ in 0..3 {
        world.update().unwrap();
    }
    assert!(messages(&log).is_empty());
    assert_eq!(world.pending_messages(DeliveryPhase::PostAsync), 1);

    world.update().unwrap();
    let frame: Vec<String> = log
        .lock()
        .unwrap()
        .iter()
        .filter(|entry| entry.starts_with("4:"))
        .cloned()
        .collect();
    assert_eq!(
        frame,
        ["4:pre_async", "4:msg:late", "4:post_async", "4:post_transform"]
    );
    assert_eq!(world.pending_messages(DeliveryPhase::PostAsync), 0);
}

#[test]
fn equal_due_messages_keep_post_order() {
    let (mut world, object, log) = recorder_world();
    for tag in ["a", "b", "c"] {
        world.post_message(object, Tagged(tag), Duration::ZERO, DeliveryPhase::PostTransform);
    }
    world.update().unwrap();
    assert_eq!(messages(&log), ["1:msg:a", "1:msg:b", "1:msg:c"]);
}

#[test]
fn send_message_is_synchronous_and_reports_handling() {
    let (mut world, object, log) = recorder_world();
    // Not initialized yet, so nobody handles it.
    assert!(!world.send_message(object, &mut Tagged("early")));

    world.update().unwrap();
    assert!(world.send_message(MessageTarget::Event(object), &mut Tagged("now")));
    assert_eq!(messages(&log), ["1:msg:now"]);
}

#[test]
fn messages_posted_from_other_threads_are_delivered() {
    let (mut world, object, log) = recorder_world();
    let sender = world.message_sender();

    std::thread::spawn(move || {
        assert!(sender.post(object, Tagged("remote"), Duration::ZERO, DeliveryPhase::NextFrame));
    })
    .join()
    .unwrap();

    world.update().unwrap();
    world.update().unwrap();
    assert_eq!(messages(&log).len(), 1);
    assert!(messages(&log)[0].ends_with(":msg:remote"));
}

#[test]
fn region_queries_return_exactly_the_overlapping_objects() {
    let mut world = world_with(TypeRegistry::new(), WorldDesc::new("spatial"));
    let unit = Aabb::from_center_half_extents(Vec3::ZERO, Vec3::splat(0.5));
    let near = world
        .create_object(ObjectDesc::new("near").with_bounds(unit))
        .unwrap();
    let beside = world
        .create_object(ObjectDesc::new("beside").with_position(Vec3::new(3.0, 0.0, 0.0)).with_bounds(unit))
        .unwrap();
    let far = world
        .create_object(ObjectDesc::new("far").with_position(Vec3::new(500.0, 0.0, 0.0)).with_bounds(unit))
        .unwrap();

    let query_box = Region::from(Aabb::new(Vec3::splat(-1.0), Vec3::splat(1.0)));
    let found: Vec<ObjectHandle> = world.find_in_region(&query_box, ALL_CATEGORIES).collect();
    assert_eq!(found, vec![near]);

    let wide = Region::from(Aabb::new(Vec3::splat(-1.0), Vec3::new(4.0, 1.0, 1.0)));
    let mut found: Vec<ObjectHandle> = world.find_in_region(&wide, ALL_CATEGORIES).collect();
    found.sort_by_key(|handle| handle.index());
    assert_eq!(found, vec![near, beside]);

    let empty = Region::from(Aabb::new(Vec3::splat(1000.0), Vec3::splat(1001.0)));
    assert_eq!(world.find_in_region(&empty, ALL_CATEGORIES).count(), 0);

    // Moved objects are re-indexed by the transform phase.
    world.set_local_position(far, Vec3::ZERO).unwrap();
    world.update().unwrap();
    assert_eq!(world.find_in_region(&query_box, ALL_CATEGORIES).count(), 2);

    world.delete_object(near);
    assert_eq!(world.find_in_region(&query_box, ALL_CATEGORIES).collect::<Vec<_>>(), vec![far]);
}

#[test]
fn deleting_an_object_invalidates_its_components() {
    let mut registry = TypeRegistry::new();
    registry.register_serializable_component::<Inventory>().unwrap();
    let mut world = world_with(registry, WorldDesc::new("delete"));
    let events = world.subscribe_events();

    let parent = world.create_object(ObjectDesc::new("parent")).unwrap();
    let child = world.create_object(ObjectDesc::new("child").with_parent(parent)).unwrap();
    let item = world.create_component(child, Inventory::default()).unwrap();
    world.update().unwrap();
    assert!(world.is_component_active(item));

    assert!(world.delete_object(parent));
    assert!(!world.is_valid(child));
    assert!(!world.is_component_valid(item));
    world.update().unwrap();
    assert!(!world.is_component_valid(item));
    assert!(world.component::<Inventory>(item).is_none());
    assert!(world.objects().is_empty());

    let seen: Vec<WorldEvent> = events.try_iter().collect();
    assert!(seen.contains(&WorldEvent::ComponentDeleted { component: item, owner: child }));
    assert!(seen.contains(&WorldEvent::ObjectDeleted(child)));
    assert!(seen.contains(&WorldEvent::ObjectDeleted(parent)));
}

#[test]
fn deleting_a_component_detaches_it_from_its_owner() {
    let mut registry = TypeRegistry::new();
    registry.register_serializable_component::<Inventory>().unwrap();
    let mut world = world_with(registry, WorldDesc::new("detach"));
    let owner = world.create_object(ObjectDesc::new("owner")).unwrap();
    let first = world.create_component(owner, Inventory::default()).unwrap();
    let kept = Inventory {
        items: vec!["map".to_owned()],
    };
    let second = world.create_component(owner, kept.clone()).unwrap();
    world.update().unwrap();

    assert!(world.delete_component(first));
    assert!(!world.is_component_valid(first));
    assert_eq!(world.object(owner).unwrap().components(), &[second]);
    world.update().unwrap();

    assert_eq!(world.component::<Inventory>(second), Some(&kept));
    assert!(!world.delete_component(first));
}

#[test]
fn delayed_delete_waits_for_its_due_time() {
    let mut world = world_with(TypeRegistry::new(), fixed_step("delayed"));
    let doomed = world.create_object(ObjectDesc::new("doomed")).unwrap();
    world.delete_object_delayed(doomed, Duration::from_millis(25));

    world.update().unwrap();
    world.update().unwrap();
    assert!(world.is_valid(doomed));
    world.update().unwrap();
    assert!(!world.is_valid(doomed));
}

/// Counts its own async updates and nudges its owner along +X.
macro_rules! async_counter {
    ($name:ident, $type_name:literal) => {
        struct $name {
            runs: Arc<AtomicU32>,
        }

        impl Component for $name {
            const TYPE_NAME: &'static str = $type_name;
            const UPDATE_PHASES: &'static [UpdatePhase] = &[UpdatePhase::Async];

            fn update(&mut self, _phase: UpdatePhase, ctx: &mut Context<'_>) {
                self.runs.fetch_add(1, Ordering::Relaxed);
                if let Some(owner) = ctx.owner() {
                    let position = ctx.object(owner).map_or(Vec3::ZERO, |o| o.local_transform().position);
                    ctx.set_local_position(owner, position + Vec3::X);
                }
            }
        }
    };
}

async_counter!(Walker, "walker");
async_counter!(Swimmer, "swimmer");
async_counter!(Flyer, "flyer");

#[test]
fn async_updates_run_on_workers_and_apply_their_commands() {
    let mut registry = TypeRegistry::new();
    registry.register_component::<Walker>().unwrap();
    registry.register_component::<Swimmer>().unwrap();
    registry.register_component::<Flyer>().unwrap();
    let desc = WorldDesc {
        worker_threads: 2,
        ..WorldDesc::new("parallel")
    };
    let mut world = world_with(registry, desc);

    let runs = Arc::new(AtomicU32::new(0));
    let mut movers = Vec::new();
    for i in 0..4 {
        let walker = world.create_object(ObjectDesc::new(format!("walker{i}"))).unwrap();
        world.create_component(walker, Walker { runs: runs.clone() }).unwrap();
        let swimmer = world.create_object(ObjectDesc::new(format!("swimmer{i}"))).unwrap();
        world.create_component(swimmer, Swimmer { runs: runs.clone() }).unwrap();
        let flyer = world.create_object(ObjectDesc::new(format!("flyer{i}"))).unwrap();
        world.create_component(flyer, Flyer { runs: runs.clone() }).unwrap();
        movers.extend([walker, swimmer, flyer]);
    }

    for _ in 0..3 {
        world.update().unwrap();
    }
    assert_eq!(runs.load(Ordering::Relaxed), 12 * 3);
    for mover in movers {
        assert_eq!(
            world.global_transform(mover).unwrap().position,
            Vec3::new(3.0, 0.0, 0.0)
        );
    }
}

#[test]
fn snapshot_round_trip_restores_handles_and_state() {
    let registry = {
        let mut registry = TypeRegistry::new();
        registry.register_serializable_component::<Inventory>().unwrap();
        Arc::new(registry)
    };
    let mut source = World::new(WorldDesc::new("source"), registry.clone()).unwrap();

    // Leave a hole so restored indices are not simply sequential.
    let gone = source.create_object(ObjectDesc::new("gone")).unwrap();
    source.delete_object(gone);
    source.update().unwrap();

    let base = source
        .create_object(ObjectDesc::new("base").with_global_key("hq").with_position(Vec3::X))
        .unwrap();
    let tower = source
        .create_object(
            ObjectDesc::new("tower")
                .with_parent(base)
                .with_position(Vec3::Y)
                .with_team(3)
                .inactive(),
        )
        .unwrap();
    let stash = Inventory {
        items: vec!["rope".to_owned(), "lamp".to_owned()],
    };
    let item = source.create_component(tower, stash.clone()).unwrap();
    source.update().unwrap();

    let mut bytes = Vec::new();
    snapshot::write_world(&source, &mut bytes).unwrap();

    let mut restored = World::new(WorldDesc::new("restored"), registry).unwrap();
    let summary = snapshot::read_world(&mut restored, bytes.as_slice()).unwrap();
    assert_eq!(summary.world_name, "source");
    assert_eq!(summary.objects, 2);
    assert_eq!(summary.components, 1);
    assert_eq!(summary.skipped_components, 0);

    assert_eq!(restored.object_by_global_key("hq"), Some(base));
    let object = restored.object(tower).unwrap();
    assert_eq!(object.name(), "tower");
    assert_eq!(object.parent(), Some(base));
    assert_eq!(object.team_id(), 3);
    assert!(!object.is_active());
    assert_eq!(restored.component::<Inventory>(item), Some(&stash));
    assert_eq!(restored.component_owner(item), Some(tower));
    assert!(!restored.is_valid(gone));

    let global = restored.global_transform(tower).unwrap();
    assert!(global.position.abs_diff_eq(Vec3::new(1.0, 1.0, 0.0), 1e-6));

    restored.set_active(tower, true).unwrap();
    restored.update().unwrap();
    assert!(restored.is_component_active(item));

    // Loading over live objects is refused.
    let again = snapshot::read_world(&mut restored, bytes.as_slice());
    assert!(matches!(again, Err(snapshot::SnapshotError::WorldNotEmpty)));
}

#[test]
fn snapshot_rejects_foreign_data() {
    let mut world = world_with(TypeRegistry::new(), WorldDesc::new("foreign"));
    let result = snapshot::read_world(&mut world, &b"NOPE\x01\x00\x00\x00"[..]);
    assert!(matches!(result, Err(snapshot::SnapshotError::BadMagic(_))));
}

#[test]
fn truncated_snapshot_leaves_the_world_empty() {
    let registry = {
        let mut registry = TypeRegistry::new();
        registry.register_serializable_component::<Inventory>().unwrap();
        Arc::new(registry)
    };
    let mut source = World::new(WorldDesc::new("source"), registry.clone()).unwrap();
    let base = source
        .create_object(ObjectDesc::new("base").with_global_key("hq"))
        .unwrap();
    source.create_component(base, Inventory::default()).unwrap();
    let mut bytes = Vec::new();
    snapshot::write_world(&source, &mut bytes).unwrap();

    let mut target = World::new(WorldDesc::new("target"), registry).unwrap();
    let cut = &bytes[..bytes.len() - 3];
    let result = snapshot::read_world(&mut target, cut);
    assert!(matches!(result, Err(snapshot::SnapshotError::Io(_))));
    assert!(target.objects().is_empty());
    assert_eq!(target.object_by_global_key("hq"), None);
    assert!(!target.is_valid(base));

    let summary = snapshot::read_world(&mut target, bytes.as_slice()).unwrap();
    assert_eq!(summary.objects, 1);
    assert_eq!(summary.components, 1);
    assert_eq!(target.object_by_global_key("hq"), Some(base));
    assert_eq!(target.object(base).unwrap().components().len(), 1);
}

#[test]
fn running_out_of_object_slots_halts_the_world() {
    let desc = WorldDesc {
        max_objects: 1,
        ..fixed_step("cramped")
    };
    let mut world = world_with(TypeRegistry::new(), desc);
    world.create_object(ObjectDesc::new("only")).unwrap();
    assert!(!world.is_halted());

    let overflow = world.create_object(ObjectDesc::new("one too many"));
    assert!(matches!(
        overflow,
        Err(WorldError::CapacityExceeded { what: "object", limit: 1 })
    ));
    assert!(world.is_halted());
    assert!(matches!(world.update(), Err(WorldError::Halted { .. })));
    assert!(matches!(world.update(), Err(WorldError::Halted { .. })));
    assert_eq!(world.clock().ticks(), 0);
}

#[test]
fn running_out_of_component_slots_halts_the_world() {
    let mut registry = TypeRegistry::new();
    registry.register_serializable_component::<Inventory>().unwrap();
    let desc = WorldDesc {
        max_components_per_type: 2,
        ..fixed_step("crowded")
    };
    let mut world = world_with(registry, desc);
    let owner = world.create_object(ObjectDesc::new("owner")).unwrap();
    for _ in 0..2 {
        world.create_component(owner, Inventory::default()).unwrap();
    }
    world.update().unwrap();

    let overflow = world.create_component(owner, Inventory::default());
    assert!(matches!(
        overflow,
        Err(WorldError::CapacityExceeded { what: "component", limit: 2 })
    ));
    assert_eq!(world.object(owner).unwrap().components().len(), 2);
    assert!(matches!(world.update(), Err(WorldError::Halted { .. })));
}

static LEDGER_INITS: AtomicUsize = AtomicUsize::new(0);
static LEDGER_DEINITS: AtomicUsize = AtomicUsize::new(0);

#[derive(Default)]
struct Ledger {
    ticks: u32,
    objects_seen: usize,
}

impl WorldModule for Ledger {
    const TYPE_NAME: &'static str = "ledger";
    const UPDATE_PHASES: &'static [UpdatePhase] = &[UpdatePhase::PostTransform];

    fn initialize(&mut self, _ctx: &mut Context<'_>) {
        LEDGER_INITS.fetch_add(1, Ordering::SeqCst);
    }

    fn deinitialize(&mut self, _ctx: &mut Context<'_>) {
        LEDGER_DEINITS.fetch_add(1, Ordering::SeqCst);
    }

    fn update(&mut self, _phase: UpdatePhase, ctx: &mut Context<'_>) {
        self.ticks += 1;
        self.objects_seen = ctx.objects().len();
    }

    fn world_clear(&mut self) {
        self.objects_seen = 0;
    }
}

#[test]
fn module_lifecycle() {
    let mut registry = TypeRegistry::new();
    registry.register_module::<Ledger>().unwrap();
    let mut world = world_with(registry, WorldDesc::new("modules"));

    assert!(world.module::<Ledger>().is_none());
    world.update().unwrap();

    world.get_or_create_module::<Ledger>().unwrap();
    world.get_or_create_module::<Ledger>().unwrap();
    assert_eq!(LEDGER_INITS.load(Ordering::SeqCst), 1);

    world.create_object(ObjectDesc::new("one")).unwrap();
    world.create_object(ObjectDesc::new("two")).unwrap();
    world.update().unwrap();
    world.update().unwrap();
    let ledger = world.module::<Ledger>().unwrap();
    assert_eq!(ledger.ticks, 2);
    assert_eq!(ledger.objects_seen, 2);

    world.clear();
    assert!(world.objects().is_empty());
    assert_eq!(world.module::<Ledger>().unwrap().objects_seen, 0);

    assert!(world.delete_module::<Ledger>());
    assert!(!world.delete_module::<Ledger>());
    assert_eq!(LEDGER_DEINITS.load(Ordering::SeqCst), 1);
}

#[test]
fn unregistered_types_are_reported() {
    let mut world = world_with(TypeRegistry::new(), WorldDesc::new("bare"));
    let object = world.create_object(ObjectDesc::new("object")).unwrap();
    let result = world.create_component(object, Inventory::default());
    assert!(matches!(result, Err(WorldError::UnregisteredComponent("inventory"))));
    assert!(matches!(
        world.get_or_create_module::<Ledger>(),
        Err(WorldError::UnregisteredModule("ledger"))
    ));
}

#[test]
fn setting_a_global_transform_under_a_parent() {
    let mut world = world_with(TypeRegistry::new(), WorldDesc::new("global"));
    let parent = world
        .create_object(ObjectDesc::new("parent").with_position(Vec3::new(10.0, 0.0, 0.0)))
        .unwrap();
    let child = world.create_object(ObjectDesc::new("child").with_parent(parent)).unwrap();

    world
        .set_global_transform(child, Transform::from_translation(Vec3::new(12.0, 0.0, 0.0)))
        .unwrap();
    let local = world.local_transform(child).unwrap();
    assert!(local.position.abs_diff_eq(Vec3::new(2.0, 0.0, 0.0), 1e-5));
}
