mod cli;
mod commands;
mod watch;

use std::fs::File;
use std::path::Path;
use std::process::ExitCode;

use clap::Parser;
use simplelog::{
    ColorChoice, CombinedLogger, ConfigBuilder, LevelFilter, TermLogger, TerminalMode, WriteLogger,
};
use tessel_tiles::PlaceRequest;

use crate::cli::{Cli, Command};
use crate::commands::CmdResult;

fn init_logging(verbose: u8, log_file: Option<&Path>) -> CmdResult<()> {
    let level = match verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    match log_file {
        Some(path) => {
            let config = ConfigBuilder::new().set_target_level(LevelFilter::Error).build();
            CombinedLogger::init(vec![
                TermLogger::new(level, config.clone(), TerminalMode::Mixed, ColorChoice::Auto),
                WriteLogger::new(LevelFilter::Trace, config, File::create(path)?),
            ])?;
        }
        None => {
            env_logger::Builder::from_env(
                env_logger::Env::default().default_filter_or(level.as_str().to_ascii_lowercase()),
            )
            .init();
        }
    }
    Ok(())
}

fn run(cli: Cli) -> CmdResult<bool> {
    let config = commands::load_config(cli.config.as_deref())?;
    match cli.command {
        Command::Report { scene } => commands::report(&config, &scene),
        Command::Migrate { input, output } => {
            commands::migrate(&config, &input, &output).map(|_| true)
        }
        Command::Gen {
            output,
            size,
            seed,
            step,
            mesh_mode,
        } => commands::generate(&config, &output, size, seed, step, mesh_mode).map(|_| true),
        Command::Fill {
            scene,
            area,
            step,
            mesh_mode,
            orientation,
        } => {
            let template = PlaceRequest::new(area.bounds().min, mesh_mode, orientation);
            commands::fill(&config, &scene, area.bounds(), step, template).map(|_| true)
        }
        Command::Erase { scene, area } => {
            commands::erase(&config, &scene, area.bounds()).map(|_| true)
        }
        Command::Watch { scene } => watch::watch(&config, &scene).map(|_| true),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(e) = init_logging(cli.verbose, cli.log_file.as_deref()) {
        eprintln!("failed to initialise logging: {e}");
        return ExitCode::FAILURE;
    }
    match run(cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(2),
        Err(e) => {
            log::error!("{e}");
            ExitCode::FAILURE
        }
    }
}
