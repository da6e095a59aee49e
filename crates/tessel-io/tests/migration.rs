use tessel_geom::QuantizedPos;
use tessel_io::{
    ColumnarData, LegacyTile, LoadSource, SceneError, SceneFile, legacy_scene_to_string,
    load_scene_str, resolve_scene, scene_to_string,
};
use tessel_store::ColumnarTileStore;
use tessel_tiles::{
    MeshMode, Orientation, StoreConfig, TileError, TileFlags, TileKeyCodec, TileRecord,
    TransformOverride,
};

fn codec() -> TileKeyCodec {
    StoreConfig::default().codec()
}

fn records(n: i64) -> Vec<TileRecord> {
    (0..n)
        .map(|i| TileRecord {
            position: QuantizedPos::new(i * 1000, 0, (i % 7) * 250),
            mesh_mode: MeshMode::ALL[(i as usize) % MeshMode::COUNT],
            orientation: Orientation::ALL[(i as usize) % Orientation::COUNT],
            transform: (i % 5 == 0).then(|| TransformOverride {
                spin_degrees: i as f32,
                ..TransformOverride::default()
            }),
            flags: TileFlags((i % 3) as u16),
        })
        .collect()
}

fn store_of(records: &[TileRecord]) -> ColumnarTileStore {
    let c = codec();
    records
        .iter()
        .map(|r| (c.encode_quantized(r.position, r.orientation).unwrap(), *r))
        .collect()
}

#[test]
fn fifty_legacy_tiles_migrate_to_fifty_columnar_rows() {
    let c = codec();
    let legacy = records(50);
    let text = legacy_scene_to_string(&legacy, &c).unwrap();

    let load = load_scene_str(&text, &c).unwrap();
    assert_eq!(load.source, LoadSource::MigratedFromLegacy { count: 50 });
    assert!(load.source.needs_save());
    assert_eq!(load.records, legacy);

    let saved = scene_to_string(&store_of(&load.records), &c).unwrap();
    let reloaded = load_scene_str(&saved, &c).unwrap();
    assert_eq!(reloaded.source, LoadSource::Columnar);
    assert_eq!(reloaded.records.len(), 50);
    assert!(!saved.contains("[[legacy]]"));
}

#[test]
fn columnar_save_keeps_sparse_transforms() {
    let c = codec();
    let recs = records(12);
    let data = ColumnarData::from_store(&store_of(&recs), &c);
    assert_eq!(data.len(), 12);
    assert_eq!(data.transforms.len(), 3);
    assert_eq!(data.transform_index.iter().filter(|&&t| t == -1).count(), 9);
    assert_eq!(data.to_records(&c).unwrap(), recs);
}

#[test]
fn both_layouts_present_is_reported_as_partial() {
    let c = codec();
    let recs = records(4);
    let scene = SceneFile {
        format_version: 2,
        legacy: recs[..2].iter().map(|r| LegacyTile::from_record(r, &c)).collect(),
        columnar: ColumnarData::from_records(&recs, &c),
    };
    let load = resolve_scene(&scene, &c).unwrap();
    assert_eq!(
        load.source,
        LoadSource::PartialMigration {
            legacy: 2,
            columnar: 4
        }
    );
    assert_eq!(load.records.len(), 4);
}

#[test]
fn empty_file_loads_as_empty() {
    let load = load_scene_str("", &codec()).unwrap();
    assert_eq!(load.source, LoadSource::Empty);
    assert!(load.records.is_empty());
}

#[test]
fn hand_written_legacy_scene_parses() {
    let text = r#"
        [[legacy]]
        position = [1.0, 0.0, 2.5]
        mesh_mode = 2
        orientation = 1

        [[legacy]]
        position = [-3.25, 1.0, 0.0]
    "#;
    let load = load_scene_str(text, &codec()).unwrap();
    assert_eq!(load.source, LoadSource::MigratedFromLegacy { count: 2 });
    assert_eq!(load.records[0].mesh_mode, MeshMode::Box);
    assert_eq!(load.records[0].orientation, Orientation::Ceiling);
    assert_eq!(load.records[1].position, QuantizedPos::new(-3250, 1000, 0));
}

#[test]
fn invalid_orientation_fails_fast() {
    let text = r#"
        [[legacy]]
        position = [0.0, 0.0, 0.0]
        orientation = 200
    "#;
    match load_scene_str(text, &codec()) {
        Err(SceneError::Tile(TileError::InvalidOrientation(200))) => {}
        other => panic!("unexpected: {other:?}"),
    }
}

#[test]
fn dangling_transform_index_is_rejected() {
    let c = codec();
    let mut data = ColumnarData::from_records(&records(1), &c);
    data.transform_index[0] = 7;
    assert!(matches!(data.to_records(&c), Err(SceneError::Columnar(_))));
}

#[test]
fn future_versions_are_rejected() {
    let text = "format_version = 99\n";
    assert!(matches!(
        load_scene_str(text, &codec()),
        Err(SceneError::Version(99))
    ));
}
