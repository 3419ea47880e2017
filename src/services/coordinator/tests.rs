//! Tests for the Coordinator module

use super::*;
use crate::domain::category::{Category, CategorySet, TempBand};
use crate::domain::record::{ViolationDetail, ViolationKind};
use crate::domain::rules::Rule;
use crate::domain::temperature::Climate;
use crate::domain::types::{Direction, Metric, SensorReading};
use crate::io::create_egress_channel;
use crate::io::egress_channel::EgressMessage;
use crate::services::setup::{install, World};
use proptest::prelude::*;
use rustc_hash::FxHashSet;

const W_PLAIN: u128 = 1;
const W_ROOM: u128 = 2;
const W_FROZEN: u128 = 3;
const T_PLAIN: u128 = 10;
const T_FROZEN: u128 = 11;
const T_AMBIENT: u128 = 12;

fn fid(n: u128) -> FacilityId {
    FacilityId::from_u128(n)
}

fn tag(n: u128) -> ItemTag {
    ItemTag::from_u128(n)
}

fn goods(n: u128, cats: CategorySet) -> Item {
    Item::new(tag(n), cats)
}

/// Three warehouses, three trucks all docked at the plain warehouse
fn create_test_coordinator(policy: RulePolicy, items: Vec<Item>) -> Coordinator {
    let mut coordinator = Coordinator::new(policy, Arc::new(Metrics::new()), 42);
    let world = World {
        warehouses: vec![
            Facility::warehouse(fid(W_PLAIN), Climate::Uncontrolled),
            Facility::warehouse(fid(W_ROOM), Climate::Controlled(TempBand::Room)),
            Facility::warehouse(fid(W_FROZEN), Climate::Controlled(TempBand::Frozen)),
        ],
        trucks: vec![],
        items,
    };
    install(&mut coordinator, world).unwrap();
    for (id, climate) in [
        (T_PLAIN, Climate::Uncontrolled),
        (T_FROZEN, Climate::Controlled(TempBand::Frozen)),
        (T_AMBIENT, Climate::Controlled(TempBand::Ambient)),
    ] {
        coordinator.add_truck(Facility::truck(fid(id), climate)).unwrap();
        coordinator.dock(fid(id), fid(W_PLAIN)).unwrap();
    }
    coordinator
}

fn assert_single_subscription(coordinator: &Coordinator) {
    for item in coordinator.items() {
        assert_eq!(coordinator.channels().subscription_count(item.tag()), 1, "{}", item.tag());
    }
}

#[test]
fn test_load_moves_item_and_updates_aggregate() {
    let mut c = create_test_coordinator(RulePolicy::strict(), vec![goods(1, CategorySet::of(&[Category::Edible]))]);

    let outcome = c.load(Tick(0), tag(1), fid(T_PLAIN)).unwrap();

    assert!(outcome.loaded);
    assert!(!outcome.would_reject());
    assert!(outcome.violations.is_empty());
    let movement = outcome.movement.unwrap();
    assert_eq!(movement.direction, Direction::Load);
    assert_eq!(movement.source, fid(W_PLAIN));
    assert_eq!(movement.destination, fid(T_PLAIN));
    assert_eq!(c.location_of(tag(1)), Some(fid(T_PLAIN)));
    assert!(c.facility(fid(T_PLAIN)).unwrap().aggregate().contains(Category::Edible));
    assert_single_subscription(&c);
}

#[test]
fn test_hazardous_onto_edible_truck_rejected_when_enforced() {
    let items = vec![
        goods(1, CategorySet::of(&[Category::Edible])),
        goods(2, CategorySet::of(&[Category::Hazardous])),
    ];
    let mut c = create_test_coordinator(RulePolicy::strict(), items);
    c.load(Tick(0), tag(1), fid(T_PLAIN)).unwrap();
    let aggregate_before = c.facility(fid(T_PLAIN)).unwrap().aggregate();

    let outcome = c.load(Tick(0), tag(2), fid(T_PLAIN)).unwrap();

    assert!(!outcome.loaded);
    assert!(!outcome.check.colocation_ok);
    assert!(outcome.check.temperature_ok);
    assert!(outcome.check.enforced_reject);
    assert!(outcome.movement.is_none());
    assert_eq!(outcome.violations.len(), 1);
    assert!(matches!(
        outcome.violations[0].detail,
        ViolationDetail::LoadCheckFailed { colocation_ok: false, enforced: true, .. }
    ));
    // State untouched
    assert_eq!(c.location_of(tag(2)), Some(fid(W_PLAIN)));
    assert_eq!(c.facility(fid(T_PLAIN)).unwrap().aggregate(), aggregate_before);
    assert!(!c.facility(fid(T_PLAIN)).unwrap().aggregate().contains(Category::Hazardous));
}

#[test]
fn test_unenforced_incompatible_load_proceeds_and_reports() {
    let items = vec![
        goods(1, CategorySet::of(&[Category::Edible])),
        goods(2, CategorySet::of(&[Category::Hazardous])),
    ];
    let mut c = create_test_coordinator(RulePolicy::default(), items);
    c.load(Tick(0), tag(1), fid(T_PLAIN)).unwrap();

    let outcome = c.load(Tick(0), tag(2), fid(T_PLAIN)).unwrap();

    assert!(outcome.loaded);
    assert!(outcome.would_reject());
    assert_eq!(c.location_of(tag(2)), Some(fid(T_PLAIN)));

    let kinds: Vec<&ViolationDetail> = outcome.violations.iter().map(|v| &v.detail).collect();
    assert!(matches!(kinds[0], ViolationDetail::LoadCheckFailed { enforced: false, .. }));
    // The edible item aboard objects to the hazardous newcomer
    let colocation: Vec<_> = outcome
        .violations
        .iter()
        .filter(|v| matches!(v.detail, ViolationDetail::Colocation { .. }))
        .collect();
    assert_eq!(colocation.len(), 1);
    assert_eq!(colocation[0].item, tag(1));
    assert_eq!(colocation[0].location, fid(T_PLAIN));
}

#[test]
fn test_fragile_then_bulky_rejected_before_aggregate_update() {
    let items = vec![
        goods(1, CategorySet::of(&[Category::Fragile])),
        goods(2, CategorySet::of(&[Category::Bulky])),
    ];
    let mut c = create_test_coordinator(RulePolicy::strict(), items);

    assert!(c.load(Tick(0), tag(1), fid(T_PLAIN)).unwrap().loaded);
    let outcome = c.load(Tick(0), tag(2), fid(T_PLAIN)).unwrap();

    assert!(!outcome.loaded);
    assert!(!outcome.check.colocation_ok);
    let aggregate = c.facility(fid(T_PLAIN)).unwrap().aggregate();
    assert!(aggregate.contains(Category::Fragile));
    assert!(!aggregate.contains(Category::Bulky));
    assert_eq!(c.items_at(fid(T_PLAIN)), vec![tag(1)]);
}

#[test]
fn test_temperature_enforcement_on_load() {
    let frozen = goods(1, CategorySet::EMPTY.with_band(TempBand::Frozen));
    let mut policy = RulePolicy::default();
    policy.enforce_temperature = true;
    let mut c = create_test_coordinator(policy, vec![frozen]);
    // Placed at the frozen warehouse; bring trucks there
    assert_eq!(c.location_of(tag(1)), Some(fid(W_FROZEN)));
    c.dock(fid(T_PLAIN), fid(W_FROZEN)).unwrap();
    c.dock(fid(T_FROZEN), fid(W_FROZEN)).unwrap();

    let rejected = c.load(Tick(0), tag(1), fid(T_PLAIN)).unwrap();
    assert!(!rejected.loaded);
    assert!(!rejected.check.temperature_ok);
    assert!(rejected.check.colocation_ok);

    let accepted = c.load(Tick(0), tag(1), fid(T_FROZEN)).unwrap();
    assert!(accepted.loaded);
}

#[test]
fn test_load_caller_errors() {
    let items = vec![goods(1, CategorySet::EMPTY), goods(2, CategorySet::EMPTY.with_band(TempBand::Room))];
    let mut c = create_test_coordinator(RulePolicy::default(), items);

    assert_eq!(
        c.load(Tick(0), tag(99), fid(T_PLAIN)).unwrap_err(),
        MovementError::UnknownItem(tag(99))
    );
    assert_eq!(
        c.load(Tick(0), tag(1), fid(W_ROOM)).unwrap_err(),
        MovementError::NotATruck(fid(W_ROOM))
    );
    // Item 2 sits at the room warehouse; no truck docked there
    assert_eq!(
        c.load(Tick(0), tag(2), fid(T_PLAIN)).unwrap_err(),
        MovementError::NotDocked { truck: fid(T_PLAIN), warehouse: fid(W_ROOM) }
    );

    c.load(Tick(0), tag(1), fid(T_PLAIN)).unwrap();
    assert_eq!(
        c.load(Tick(0), tag(1), fid(T_PLAIN)).unwrap_err(),
        MovementError::NotAtWarehouse { item: tag(1), at: Some(fid(T_PLAIN)) }
    );
}

#[test]
fn test_unload_to_dock_and_reset_when_empty() {
    let items = vec![
        goods(1, CategorySet::of(&[Category::Fragile])),
        goods(2, CategorySet::of(&[Category::Dry])),
    ];
    let mut c = create_test_coordinator(RulePolicy::default(), items);
    c.load(Tick(0), tag(1), fid(T_PLAIN)).unwrap();
    c.load(Tick(0), tag(2), fid(T_PLAIN)).unwrap();
    c.relocate(Tick(0), fid(T_PLAIN)).unwrap();
    let dock = c.dock_of(fid(T_PLAIN)).unwrap();

    let first = c.unload(Tick(1), tag(1)).unwrap();
    assert!(!first.truck_emptied);
    assert_eq!(first.movement.destination, dock);
    assert_eq!(first.movement.direction, Direction::Unload);
    assert!(!c.facility(fid(T_PLAIN)).unwrap().aggregate().is_empty());

    let second = c.unload(Tick(1), tag(2)).unwrap();
    assert!(second.truck_emptied);
    assert!(second.violations.is_empty());
    assert!(c.facility(fid(T_PLAIN)).unwrap().aggregate().is_empty());
    assert_eq!(c.location_of(tag(2)), Some(dock));
    assert_single_subscription(&c);
}

#[test]
fn test_unload_item_in_warehouse_is_caller_error() {
    let mut c = create_test_coordinator(RulePolicy::default(), vec![goods(1, CategorySet::EMPTY)]);
    assert_eq!(
        c.unload(Tick(0), tag(1)).unwrap_err(),
        MovementError::NotOnTruck { item: tag(1), at: Some(fid(W_PLAIN)) }
    );
}

#[test]
fn test_unload_from_wrong_truck_reports_and_completes() {
    let mut c = create_test_coordinator(RulePolicy::default(), vec![goods(1, CategorySet::of(&[Category::Edible]))]);
    c.load(Tick(0), tag(1), fid(T_PLAIN)).unwrap();

    let outcome = c.unload_from(Tick(1), tag(1), fid(T_AMBIENT)).unwrap();

    assert_eq!(outcome.violations.len(), 1);
    let record = &outcome.violations[0];
    assert_eq!(record.kind, ViolationKind::InconsistentState);
    assert_eq!(
        record.detail,
        ViolationDetail::MissingSubscription { expected: fid(T_AMBIENT), actual: Some(fid(T_PLAIN)) }
    );
    assert_eq!(c.location_of(tag(1)), Some(fid(W_PLAIN)));
    // The truck the item really left is empty and reset too
    assert!(c.facility(fid(T_PLAIN)).unwrap().aggregate().is_empty());
    assert_single_subscription(&c);
}

#[test]
fn test_relocate_filters_by_climate_when_enforced() {
    let mut policy = RulePolicy::default();
    policy.enforce_temperature = true;
    let mut c = create_test_coordinator(policy, vec![]);

    for t in 0..20 {
        let record = c.relocate(Tick(t), fid(T_FROZEN)).unwrap();
        assert!(!record.fallback);
        assert_eq!(record.to, fid(W_FROZEN));
        assert_eq!(c.dock_of(fid(T_FROZEN)), Some(fid(W_FROZEN)));

        // Ambient trucks unload anywhere controlled except frozen
        let ambient = c.relocate(Tick(t), fid(T_AMBIENT)).unwrap();
        assert_eq!(ambient.to, fid(W_ROOM));
    }
}

#[test]
fn test_relocate_falls_back_when_nothing_admissible() {
    let mut policy = RulePolicy::default();
    policy.enforce_temperature = true;
    let mut c = Coordinator::new(policy, Arc::new(Metrics::new()), 1);
    c.add_warehouse(Facility::warehouse(fid(W_ROOM), Climate::Controlled(TempBand::Room))).unwrap();
    c.add_truck(Facility::truck(fid(T_FROZEN), Climate::Controlled(TempBand::Frozen))).unwrap();
    c.dock(fid(T_FROZEN), fid(W_ROOM)).unwrap();

    let record = c.relocate(Tick(0), fid(T_FROZEN)).unwrap();
    assert!(record.fallback);
    assert_eq!(record.from, fid(W_ROOM));
    assert_eq!(record.to, fid(W_ROOM));
}

#[test]
fn test_relocate_undocked_truck_is_error() {
    let mut c = Coordinator::new(RulePolicy::default(), Arc::new(Metrics::new()), 1);
    c.add_truck(Facility::truck(fid(T_PLAIN), Climate::Uncontrolled)).unwrap();
    assert_eq!(c.relocate(Tick(0), fid(T_PLAIN)).unwrap_err(), MovementError::Undocked(fid(T_PLAIN)));
}

#[test]
fn test_publish_routes_to_location_only() {
    let items = vec![
        goods(1, CategorySet::of(&[Category::Dry])),
        goods(2, CategorySet::of(&[Category::Dry]).with_band(TempBand::Room)),
    ];
    let c = create_test_coordinator(RulePolicy::default(), items);
    assert_eq!(c.location_of(tag(2)), Some(fid(W_ROOM)));

    let wet = SensorReading::new(Tick(0), fid(W_PLAIN), Metric::Humidity, 90.0);
    let violations = c.publish(&wet);
    assert_eq!(violations.len(), 1);
    assert_eq!(violations[0].item, tag(1));
    assert_eq!(violations[0].rules(), &[Rule::Dry]);

    let dry = SensorReading::new(Tick(0), fid(W_PLAIN), Metric::Humidity, 30.0);
    assert!(c.publish(&dry).is_empty());
}

#[test]
fn test_broadcast_reaches_every_facility() {
    let frozen_misplaced = goods(1, CategorySet::EMPTY.with_band(TempBand::Frozen));
    let mut c = Coordinator::new(RulePolicy::default(), Arc::new(Metrics::new()), 3);
    c.add_warehouse(Facility::warehouse(fid(W_ROOM), Climate::Controlled(TempBand::Room))).unwrap();
    c.add_truck(Facility::truck(fid(T_PLAIN), Climate::Uncontrolled)).unwrap();
    c.dock(fid(T_PLAIN), fid(W_ROOM)).unwrap();
    c.add_item(frozen_misplaced, fid(W_ROOM)).unwrap();

    let outcome = c.broadcast_sensors(Tick(0));

    assert_eq!(outcome.readings, 8 + 6);
    // Room temperatures are always too warm for frozen goods
    let temp: Vec<_> = outcome.violations.iter().filter(|v| v.rules().contains(&Rule::Temp)).collect();
    assert_eq!(temp.len(), 1);
    assert_eq!(temp[0].item, tag(1));
}

#[test]
fn test_parallel_and_sequential_broadcast_agree() {
    let items: Vec<Item> = (0..40)
        .map(|n| {
            let cats = match n % 4 {
                0 => CategorySet::of(&[Category::Dry]),
                1 => CategorySet::of(&[Category::Medicinal]),
                2 => CategorySet::of(&[Category::Fragile]),
                _ => CategorySet::EMPTY.with_band(TempBand::Cool),
            };
            goods(100 + n, cats)
        })
        .collect();
    let mut parallel = create_test_coordinator(RulePolicy::default(), items.clone());
    for n in (100..140).step_by(4) {
        parallel.load(Tick(0), tag(n + 2), fid(T_PLAIN)).unwrap();
    }
    let parallel = parallel.with_parallel_sensors(true);
    let mut sequential = create_test_coordinator(RulePolicy::default(), items).with_parallel_sensors(false);
    for n in (100..140).step_by(4) {
        sequential.load(Tick(0), tag(n + 2), fid(T_PLAIN)).unwrap();
    }

    for t in 0..5 {
        let a = parallel.broadcast_sensors(Tick(t));
        let b = sequential.broadcast_sensors(Tick(t));
        assert_eq!(a.readings, b.readings);
        assert_eq!(a.violations, b.violations);
    }
}

#[test]
fn test_run_tick_unloads_before_loads() {
    // Hazardous item on the truck blocks edible goods until it is unloaded
    let items = vec![
        goods(1, CategorySet::of(&[Category::Hazardous])),
        goods(2, CategorySet::of(&[Category::Edible])),
    ];
    let mut c = create_test_coordinator(RulePolicy::strict(), items);
    c.load(Tick(0), tag(1), fid(T_PLAIN)).unwrap();

    let plan = TickPlan {
        // Listed load first on purpose; phases still run unload first
        loads: vec![(tag(2), fid(T_PLAIN))],
        unloads: vec![tag(1)],
        relocations: vec![fid(T_PLAIN)],
        broadcast_sensors: false,
    };
    let report = c.run_tick(Tick(1), &plan);

    assert_eq!(report.unloads, 1);
    assert_eq!(report.loads, 1);
    assert_eq!(report.loads_rejected, 0);
    assert_eq!(report.relocations.len(), 1);
    assert!(report.errors.is_empty());
    assert_eq!(report.movements[0].direction, Direction::Unload);
    assert_eq!(report.movements[1].direction, Direction::Load);
    let aggregate = c.facility(fid(T_PLAIN)).unwrap().aggregate();
    assert!(aggregate.contains(Category::Edible));
    assert!(!aggregate.contains(Category::Hazardous));
}

#[test]
fn test_run_tick_collects_caller_errors() {
    let mut c = create_test_coordinator(RulePolicy::default(), vec![goods(1, CategorySet::EMPTY)]);
    let plan = TickPlan {
        unloads: vec![tag(1)],
        loads: vec![(tag(42), fid(T_PLAIN))],
        relocations: vec![],
        broadcast_sensors: true,
    };

    let report = c.run_tick(Tick(0), &plan);

    assert_eq!(report.errors.len(), 2);
    assert_eq!(report.readings, 3 * 8 + 3 * 6);
    assert_eq!(c.metrics.ticks_total(), 1);
}

#[tokio::test]
async fn test_records_forwarded_to_egress() {
    let metrics = Arc::new(Metrics::new());
    let (sender, mut rx) = create_egress_channel(64, metrics);
    let items = vec![
        goods(1, CategorySet::of(&[Category::Edible])),
        goods(2, CategorySet::of(&[Category::Hazardous])),
    ];
    let mut c = create_test_coordinator(RulePolicy::default(), items).with_egress(sender);

    c.load(Tick(0), tag(1), fid(T_PLAIN)).unwrap();
    c.load(Tick(0), tag(2), fid(T_PLAIN)).unwrap();
    c.relocate(Tick(0), fid(T_PLAIN)).unwrap();

    let mut kinds = Vec::new();
    while let Ok(msg) = rx.try_recv() {
        kinds.push(msg.as_str());
        if let EgressMessage::Violation(payload) = &msg {
            assert_eq!(payload.record.kind, ViolationKind::RuleViolation);
        }
    }
    assert_eq!(
        kinds,
        vec!["movement", "violation", "violation", "movement", "relocation"]
    );
}

fn category_set() -> impl Strategy<Value = CategorySet> {
    (any::<[bool; 7]>(), proptest::option::of(0usize..5)).prop_map(|(flags, band)| {
        let cats = Category::ALL.into_iter().zip(flags).filter(|(_, on)| *on).map(|(c, _)| c);
        CategorySet::new(cats, band.map(|b| TempBand::ALL[b]))
    })
}

#[derive(Debug, Clone)]
enum Op {
    Load { item: usize, truck: usize },
    Unload { item: usize },
    UnloadFrom { item: usize, truck: usize },
    Relocate { truck: usize },
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0usize..12, 0usize..3).prop_map(|(item, truck)| Op::Load { item, truck }),
        (0usize..12).prop_map(|item| Op::Unload { item }),
        (0usize..12, 0usize..3).prop_map(|(item, truck)| Op::UnloadFrom { item, truck }),
        (0usize..3).prop_map(|truck| Op::Relocate { truck }),
    ]
}

proptest! {
    #[test]
    fn prop_item_always_on_exactly_one_channel(
        cats in proptest::collection::vec(category_set(), 12),
        ops in proptest::collection::vec(op(), 1..60),
        strict in any::<bool>(),
    ) {
        let items: Vec<Item> = cats.into_iter().enumerate().map(|(n, c)| goods(n as u128 + 1, c)).collect();
        let policy = if strict { RulePolicy::strict() } else { RulePolicy::default() };
        let mut c = create_test_coordinator(policy, items);
        let trucks = [fid(T_PLAIN), fid(T_FROZEN), fid(T_AMBIENT)];

        for (step, op) in ops.into_iter().enumerate() {
            let tick = Tick(step as u64);
            // Caller errors are fine here; only the invariant matters
            let _ = match op {
                Op::Load { item, truck } => c.load(tick, tag(item as u128 + 1), trucks[truck]).map(|_| ()),
                Op::Unload { item } => c.unload(tick, tag(item as u128 + 1)).map(|_| ()),
                Op::UnloadFrom { item, truck } => {
                    c.unload_from(tick, tag(item as u128 + 1), trucks[truck]).map(|_| ())
                }
                Op::Relocate { truck } => c.relocate(tick, trucks[truck]).map(|_| ()),
            };

            let mut seen = FxHashSet::default();
            for item in c.items() {
                prop_assert_eq!(c.channels().subscription_count(item.tag()), 1);
                prop_assert!(seen.insert(item.tag()));
            }
            // Empty trucks always carry an empty aggregate
            for &truck in &trucks {
                if c.items_at(truck).is_empty() {
                    prop_assert!(c.facility(truck).unwrap().aggregate().is_empty());
                }
            }
        }
    }
}
