use proptest::prelude::*;
use tessel_geom::Vec3;
use tessel_runtime::{OperationKind, TileWorld};
use tessel_tiles::{MeshMode, Orientation, PlaceRequest, StoreConfig};

#[derive(Debug, Clone)]
enum Op {
    Place { x: i8, z: i8, mode: u8, orient: u8 },
    Remove { x: i8, z: i8, orient: u8 },
    Remode { x: i8, z: i8, mode: u8 },
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (any::<i8>(), any::<i8>(), 0u8..6, 0u8..3)
            .prop_map(|(x, z, mode, orient)| Op::Place { x, z, mode, orient }),
        (any::<i8>(), any::<i8>(), 0u8..3).prop_map(|(x, z, orient)| Op::Remove { x, z, orient }),
        (any::<i8>(), any::<i8>(), 0u8..6).prop_map(|(x, z, mode)| Op::Remode { x, z, mode }),
    ]
}

fn pos(x: i8, z: i8) -> Vec3 {
    // Spread across several regions on both sides of the origin.
    Vec3::new(f32::from(x) * 3.5, 0.0, f32::from(z) * 1.25)
}

fn small_chunks() -> StoreConfig {
    StoreConfig {
        chunk_capacity: 4,
        ..StoreConfig::default()
    }
}

fn check(w: &TileWorld) {
    let visible: usize = w.registries().iter().map(|r| r.instance_count()).sum();
    assert_eq!(w.store().count(), w.lookup().count());
    assert_eq!(w.store().count(), visible);
    assert_eq!(w.store().count(), w.tracker().tracked_count());
    for reg in w.registries().iter() {
        assert_eq!(reg.listed_chunks(), reg.chunk_counter());
        assert_eq!(reg.listed_chunks(), reg.live_chunks());
        for (_, chunk) in reg.iter_chunks() {
            assert!(chunk.audit().is_clean());
            assert!(!chunk.is_empty());
        }
    }
    for (key, loc) in w.lookup().iter() {
        let chunk = w.registries().chunk(loc.chunk).unwrap();
        assert_eq!(chunk.instance(loc.slot).unwrap().key, key);
    }
}

fn apply(w: &mut TileWorld, op: &Op) {
    match *op {
        Op::Place { x, z, mode, orient } => {
            let req = PlaceRequest::new(
                pos(x, z),
                MeshMode::from_u8(mode).unwrap(),
                Orientation::from_u8(orient).unwrap(),
            );
            w.place(req).unwrap();
        }
        Op::Remove { x, z, orient } => {
            w.remove_at(pos(x, z), Orientation::from_u8(orient).unwrap())
                .unwrap();
        }
        Op::Remode { x, z, mode } => {
            let key = w.key_for(pos(x, z), Orientation::Floor).unwrap();
            w.set_mesh_mode(key, MeshMode::from_u8(mode).unwrap());
        }
    }
}

proptest! {
    #[test]
    fn counts_agree_after_every_operation(ops in proptest::collection::vec(op(), 1..200)) {
        let mut w = TileWorld::new(small_chunks()).unwrap();
        for op in &ops {
            apply(&mut w, op);
            check(&w);
        }
    }

    #[test]
    fn rebuild_reproduces_the_same_tiles(ops in proptest::collection::vec(op(), 1..120)) {
        let mut w = TileWorld::new(small_chunks()).unwrap();
        for op in &ops {
            apply(&mut w, op);
        }
        let before: Vec<_> = w.iter().map(|v| (v.key, v.record)).collect();
        w.rebuild_indexes();
        check(&w);
        let after: Vec<_> = w.iter().map(|v| (v.key, v.record)).collect();
        prop_assert_eq!(before, after);
    }

    #[test]
    fn aborted_operation_restores_prior_tiles(
        setup in proptest::collection::vec(op(), 0..60),
        stroke in proptest::collection::vec(op(), 1..60),
    ) {
        let mut w = TileWorld::new(small_chunks()).unwrap();
        for op in &setup {
            apply(&mut w, op);
        }
        let mut before: Vec<_> = w.iter().map(|v| (v.key, v.record)).collect();
        w.begin_operation(OperationKind::Paint).unwrap();
        for op in &stroke {
            apply(&mut w, op);
        }
        w.abort_operation().unwrap();
        check(&w);
        let mut after: Vec<_> = w.iter().map(|v| (v.key, v.record)).collect();
        before.sort_by_key(|(k, _)| *k);
        after.sort_by_key(|(k, _)| *k);
        prop_assert_eq!(before, after);
    }
}
