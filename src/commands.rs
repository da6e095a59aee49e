use std::error::Error;
use std::path::Path;
use std::time::{Duration, Instant};

use fastnoise_lite::{FastNoiseLite, NoiseType};
use tessel_audit::{IntegrityChecker, IntegrityReport};
use tessel_geom::{TileBounds, Vec3};
use tessel_io::{LoadSource, load_scene, save_scene};
use tessel_runtime::{FillProgress, OperationKind, TileWorld};
use tessel_tiles::{MeshMode, Orientation, PlaceRequest, StoreConfig};

pub type CmdResult<T> = Result<T, Box<dyn Error>>;

pub fn load_config(path: Option<&Path>) -> CmdResult<StoreConfig> {
    match path {
        Some(p) => {
            let config = StoreConfig::from_path(p)?;
            log::info!("loaded store config from {}", p.display());
            Ok(config)
        }
        None => Ok(StoreConfig::default()),
    }
}

/// Loads a scene file into a fully indexed world.
pub fn open_world(config: &StoreConfig, scene: &Path) -> CmdResult<(TileWorld, LoadSource)> {
    let load = load_scene(scene, &config.codec())?;
    let world = TileWorld::from_records(config.clone(), load.records)?;
    Ok((world, load.source))
}

fn save_world(world: &TileWorld, path: &Path) -> CmdResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    save_scene(path, world.store(), world.codec())?;
    Ok(())
}

pub fn build_report(config: &StoreConfig, scene: &Path) -> CmdResult<IntegrityReport> {
    let (world, source) = open_world(config, scene)?;
    let mut report = IntegrityChecker::from_config(config).check(&world);
    match source {
        LoadSource::Empty | LoadSource::Columnar => {}
        LoadSource::MigratedFromLegacy { .. } => {
            report.note(format!("{}; save to complete the migration", source));
        }
        LoadSource::PartialMigration { .. } => report.note(format!("warning: {}", source)),
    }
    Ok(report)
}

pub fn report(config: &StoreConfig, scene: &Path) -> CmdResult<bool> {
    let report = build_report(config, scene)?;
    print!("{}", report.render());
    Ok(report.is_healthy())
}

pub fn migrate(config: &StoreConfig, input: &Path, output: &Path) -> CmdResult<()> {
    let (world, source) = open_world(config, input)?;
    save_world(&world, output)?;
    println!("{}: {} -> {} ({} tiles)", source, input.display(), output.display(), world.count());
    Ok(())
}

pub fn generate(
    config: &StoreConfig,
    output: &Path,
    size: u32,
    seed: i32,
    step: f32,
    mesh_mode: MeshMode,
) -> CmdResult<()> {
    let mut world = TileWorld::new(config.clone())?;
    let mut terrain = FastNoiseLite::with_seed(seed);
    terrain.set_noise_type(Some(NoiseType::OpenSimplex2));
    terrain.set_frequency(Some(0.04));
    for x in 0..size {
        for z in 0..size {
            let (wx, wz) = (x as f32 * step, z as f32 * step);
            let h = terrain.get_noise_2d(wx, wz);
            // Heights snap to whole steps so neighbouring tiles line up.
            let y = (h * 4.0).round() * step;
            let req = PlaceRequest::new(Vec3::new(wx, y, wz), mesh_mode, Orientation::Floor);
            world.place(req)?;
        }
    }
    save_world(&world, output)?;
    let stats = world.stats();
    println!(
        "generated {} tiles in {} chunks -> {}",
        stats.tiles,
        stats.chunks(),
        output.display()
    );
    Ok(())
}

pub fn fill(
    config: &StoreConfig,
    scene: &Path,
    bounds: TileBounds,
    step: f32,
    template: PlaceRequest,
) -> CmdResult<()> {
    let (mut world, _) = open_world(config, scene)?;
    let mut job = world.start_fill(bounds, step, template)?;
    world.begin_operation(OperationKind::AreaFill)?;
    let interval = Duration::from_millis(config.fill_step_interval_ms);
    let outcome = loop {
        match job.step(&mut world, Instant::now()) {
            Ok(FillProgress::Done(outcome)) => break outcome,
            Ok(FillProgress::Stepped { remaining, .. }) => {
                log::debug!("fill: {} of {} cells left", remaining, job.total());
            }
            Ok(FillProgress::Throttled) => std::thread::sleep(interval),
            Err(e) => {
                world.abort_operation()?;
                return Err(e.into());
            }
        }
    };
    let summary = world.commit_operation()?;
    save_world(&world, scene)?;
    println!(
        "filled {} cells ({} new, {} replaced), net {:+} tiles",
        outcome.touched(),
        outcome.placed,
        outcome.replaced,
        summary.net
    );
    Ok(())
}

pub fn erase(config: &StoreConfig, scene: &Path, bounds: TileBounds) -> CmdResult<()> {
    let (mut world, _) = open_world(config, scene)?;
    world.begin_operation(OperationKind::AreaErase)?;
    let removed = match world.erase_area(bounds) {
        Ok(n) => n,
        Err(e) => {
            world.abort_operation()?;
            return Err(e.into());
        }
    };
    world.commit_operation()?;
    save_world(&world, scene)?;
    println!("erased {} tiles, {} remain", removed, world.count());
    Ok(())
}
