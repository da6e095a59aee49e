use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use tessel_geom::{TileBounds, Vec3};
use tessel_tiles::{MeshMode, Orientation};

#[derive(Parser, Debug)]
#[command(name = "tessel", about = "Inspect, migrate and edit chunked tile scenes")]
pub struct Cli {
    /// Store configuration (TOML); defaults are used when omitted
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
    /// Also write a debug log to this file
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,
    /// Raise log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Load a scene, rebuild its indexes and print the integrity report
    Report { scene: PathBuf },
    /// Rewrite a scene in the columnar layout
    Migrate { input: PathBuf, output: PathBuf },
    /// Generate a noise heightfield scene
    Gen {
        output: PathBuf,
        /// Tiles per side
        #[arg(long, default_value_t = 64)]
        size: u32,
        #[arg(long, default_value_t = 1337)]
        seed: i32,
        /// Grid spacing in world units
        #[arg(long, default_value_t = 1.0)]
        step: f32,
        #[arg(long, default_value = "square", value_parser = parse_mesh_mode)]
        mesh_mode: MeshMode,
    },
    /// Fill a box with tiles in throttled steps, then save
    Fill {
        scene: PathBuf,
        #[command(flatten)]
        area: AreaArgs,
        #[arg(long, default_value_t = 1.0)]
        step: f32,
        #[arg(long, default_value = "square", value_parser = parse_mesh_mode)]
        mesh_mode: MeshMode,
        /// Orientation index (0-17)
        #[arg(long, default_value = "0", value_parser = parse_orientation)]
        orientation: Orientation,
    },
    /// Remove every tile inside a box, then save
    Erase {
        scene: PathBuf,
        #[command(flatten)]
        area: AreaArgs,
    },
    /// Re-run the report whenever the scene file changes
    Watch { scene: PathBuf },
}

#[derive(Args, Debug)]
pub struct AreaArgs {
    /// Minimum corner (X Y Z)
    #[arg(long, required = true, num_args = 3, value_names = ["X", "Y", "Z"], allow_hyphen_values = true)]
    pub min: Vec<f32>,
    /// Maximum corner (X Y Z)
    #[arg(long, required = true, num_args = 3, value_names = ["X", "Y", "Z"], allow_hyphen_values = true)]
    pub max: Vec<f32>,
}

impl AreaArgs {
    pub fn bounds(&self) -> TileBounds {
        let v = |c: &[f32]| Vec3::new(c[0], c[1], c[2]);
        TileBounds::new(v(&self.min), v(&self.max))
    }
}

fn parse_mesh_mode(s: &str) -> Result<MeshMode, String> {
    MeshMode::ALL
        .iter()
        .copied()
        .find(|m| m.name() == s)
        .ok_or_else(|| {
            let names: Vec<&str> = MeshMode::ALL.iter().map(|m| m.name()).collect();
            format!("unknown mesh mode '{}' (expected one of {})", s, names.join(", "))
        })
}

fn parse_orientation(s: &str) -> Result<Orientation, String> {
    let v: u8 = s.parse().map_err(|e| format!("{e}"))?;
    Orientation::from_u8(v).map_err(|e| e.to_string())
}
