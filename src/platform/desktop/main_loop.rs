use std::{
    path::{Path, PathBuf},
    time::{Duration, Instant},
};

use anyhow::{bail, Context};
use clap::{App, AppSettings, Arg, ArgMatches, SubCommand};
use log::{error, info, LevelFilter};

use crate::{floating_type_mod::FT, write_statistics, FluidSimulation};

use super::vtk_exporter::{write_boundary_file, VtkExporter};

const CARGO_PKG_AUTHORS: &str = env!("CARGO_PKG_AUTHORS");
const CARGO_PKG_VERSION: &str = env!("CARGO_PKG_VERSION");
const CARGO_PKG_DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

const OUTPUT_BASENAME: &str = "fluid";

pub fn start() {
    let matches = App::new("Free Surface SPH Simulation")
        .version(CARGO_PKG_VERSION)
        .author(CARGO_PKG_AUTHORS)
        .about(CARGO_PKG_DESCRIPTION)
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .arg(
            Arg::with_name("v")
                .short("v")
                .multiple(true)
                .global(true)
                .help("Sets the level of verbosity"),
        )
        .subcommand(
            SubCommand::with_name("run")
                .about("Run simulation of the given scene")
                .arg(
                    Arg::with_name("SCENE_CONFIG")
                        .help("Scene setup")
                        .required(true)
                        .index(1),
                )
                .arg(
                    Arg::with_name("MAX_SECONDS")
                        .long("max-seconds")
                        .short("s")
                        .takes_value(true)
                        .default_value("1.0")
                        .help("Stop simulation after the given amount of simulated seconds"),
                )
                .arg(
                    Arg::with_name("TIMESTEP")
                        .long("timestep")
                        .short("t")
                        .takes_value(true)
                        .help("Fixed time step (defaults to the largest stable time step)"),
                )
                .arg(
                    Arg::with_name("OUTPUT")
                        .long("output")
                        .short("o")
                        .takes_value(true)
                        .help("Folder for VTK snapshots"),
                )
                .arg(
                    Arg::with_name("EXPORT_EVERY")
                        .long("export-every")
                        .short("e")
                        .takes_value(true)
                        .default_value("100")
                        .help("Write a snapshot every N steps"),
                )
                .arg(
                    Arg::with_name("STATISTICS_ENABLED")
                        .help("Track performance of individual steps")
                        .short("p")
                        .long("statistics")
                        .takes_value(false),
                ),
        )
        .subcommand(
            SubCommand::with_name("boundary")
                .about("Generate the boundary particles of a scene and write them to a VTK file")
                .arg(
                    Arg::with_name("SCENE_CONFIG")
                        .help("Scene setup")
                        .required(true)
                        .index(1),
                )
                .arg(
                    Arg::with_name("OUTPUT")
                        .long("output")
                        .short("o")
                        .takes_value(true)
                        .required(true)
                        .help("Output folder"),
                ),
        )
        .get_matches();

    init_logging(matches.occurrences_of("v"));

    let result = if let Some(run_matches) = matches.subcommand_matches("run") {
        run_simulation(run_matches)
    } else if let Some(boundary_matches) = matches.subcommand_matches("boundary") {
        export_boundary(boundary_matches)
    } else {
        unreachable!()
    };

    if let Err(err) = result {
        error!("{:#}", err);
        std::process::exit(1);
    }
}

/** `RUST_LOG` takes precedence over the `-v` count. */
fn init_logging(verbosity: u64) {
    let level = match verbosity {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();
}

fn parse_value<T>(matches: &ArgMatches, name: &str) -> anyhow::Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    matches
        .value_of(name)
        .map(|s| s.parse::<T>().with_context(|| format!("invalid value `{}` for {}", s, name)))
        .transpose()
}

fn run_simulation(matches: &ArgMatches) -> anyhow::Result<()> {
    let scene_file = matches.value_of("SCENE_CONFIG").context("missing scene config")?;
    let max_seconds: FT = parse_value(matches, "MAX_SECONDS")?.unwrap_or(1.);
    let timestep: Option<FT> = parse_value(matches, "TIMESTEP")?;
    let export_every: usize = parse_value(matches, "EXPORT_EVERY")?.unwrap_or(100);
    let output: Option<PathBuf> = matches.value_of("OUTPUT").map(PathBuf::from);
    let counters_enabled = matches.is_present("STATISTICS_ENABLED");

    if export_every == 0 {
        bail!("--export-every has to be at least 1");
    }

    let mut fluid_simulation = FluidSimulation::from_scene_file(scene_file, counters_enabled)?;

    let dt = timestep.unwrap_or_else(|| fluid_simulation.max_timestep());
    if dt <= 0. {
        bail!("time step has to be positive, got {}", dt);
    }
    if dt > fluid_simulation.max_timestep() {
        info!(
            "time step {} exceeds the stable time step {}",
            dt,
            fluid_simulation.max_timestep()
        );
    }
    info!("simulating {}s with dt = {}", max_seconds, dt);

    let mut vtk_exporter = match &output {
        Some(folder) => {
            let exporter = VtkExporter::new(folder, OUTPUT_BASENAME)?;
            let boundary_path = write_boundary_file(folder, OUTPUT_BASENAME, &fluid_simulation)?;
            info!("wrote boundary particles to `{}`", boundary_path.display());
            Some(exporter)
        }
        None => None,
    };

    let mut total_duration = Duration::from_nanos(0);
    let mut step_number: u32 = 0;

    if let Some(vtk_exporter) = &mut vtk_exporter {
        vtk_exporter.add_snapshot(&fluid_simulation)?;
    }

    while fluid_simulation.time() < max_seconds {
        let a = Instant::now();
        fluid_simulation.advance(dt);
        total_duration += Instant::now() - a;
        step_number += 1;

        if step_number as usize % export_every == 0 {
            if let Some(vtk_exporter) = &mut vtk_exporter {
                vtk_exporter.add_snapshot(&fluid_simulation)?;
            }
            info!(
                "{:06}: t = {:.4}s, {} fluid particles, {:.3}msec AVG",
                step_number,
                fluid_simulation.time(),
                fluid_simulation.num_fluid_particles(),
                (total_duration / step_number).as_secs_f32() * 1000.
            );
        }
    }

    info!(
        "finished {} steps in {:.2}s",
        step_number,
        total_duration.as_secs_f32()
    );

    if counters_enabled {
        print!("{}", write_statistics(&fluid_simulation));
    }

    Ok(())
}

fn export_boundary(matches: &ArgMatches) -> anyhow::Result<()> {
    let scene_file = matches.value_of("SCENE_CONFIG").context("missing scene config")?;
    let output = Path::new(matches.value_of("OUTPUT").context("missing output folder")?);

    let fluid_simulation = FluidSimulation::from_scene_file(scene_file, false)?;
    let path = write_boundary_file(output, OUTPUT_BASENAME, &fluid_simulation)?;
    info!(
        "wrote {} boundary particles to `{}`",
        fluid_simulation.num_boundary_particles(),
        path.display()
    );
    Ok(())
}
