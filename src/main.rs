use lbm_cavity_rs::{
    Config, ExecutionMode, KernelParams, LBMSolver, VTKWriter, build_executor, init_fields,
};
use anyhow::{Result, bail};
use log::info;
use std::env;

fn print_usage(program: &str) {
    eprintln!("Usage: {} <config.json> [-cpu | -gpu]", program);
    eprintln!("  config.json - JSON file containing simulation parameters");
    eprintln!("  -cpu        - run every step on the host (default)");
    eprintln!("  -gpu        - run every step on the GPU");
    eprintln!("  -help       - print this message");
    eprintln!("NOTE: -cpu and -gpu are mutually exclusive");
}

/// Config path and execution mode from the command line
fn parse_args(args: &[String]) -> Result<Option<(String, ExecutionMode)>> {
    let mut config_path = None;
    let mut mode = None;

    for arg in args.iter().skip(1) {
        let selected = match arg.as_str() {
            "-help" | "--help" | "-h" => return Ok(None),
            "-cpu" => ExecutionMode::Host,
            "-gpu" => ExecutionMode::Accelerator,
            flag if flag.starts_with('-') => bail!("unknown flag {}", flag),
            path => {
                if config_path.replace(path.to_string()).is_some() {
                    bail!("more than one configuration file given");
                }
                continue;
            }
        };
        if mode.replace(selected).is_some() {
            bail!("-cpu and -gpu are mutually exclusive, give only one");
        }
    }

    match config_path {
        Some(path) => Ok(Some((path, mode.unwrap_or_default()))),
        None => bail!("missing configuration file"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let program = args.first().map(String::as_str).unwrap_or("lbm-sim");
    let (config_path, mode) = match parse_args(&args) {
        Ok(Some(parsed)) => parsed,
        Ok(None) => {
            print_usage(program);
            return Ok(());
        }
        Err(err) => {
            print_usage(program);
            return Err(err);
        }
    };

    info!("Loading configuration from: {}", config_path);
    let config = Config::from_file(&config_path)?;

    info!("Simulation parameters:");
    info!("  Cavity: {0}x{0}x{0} (+ halo)", config.domain.xlength);
    info!("  Tau (relaxation time): {}", config.physics.tau);
    info!("  Wall velocity: {:?}", config.physics.wall_velocity);
    info!("  Reynolds number: {:.2}", config.reynolds_number());
    info!("  Timesteps: {}", config.simulation.timesteps);
    info!("  Timesteps per plotting: {}", config.simulation.timesteps_per_plotting);
    info!("  Execution path: {:?}", mode);

    let fields = init_fields(config.domain.xlength, mode)?;
    let executor = build_executor(mode, KernelParams::from_config(&config), &fields).await?;
    let writer = VTKWriter::new(&config.output)?;

    let mut solver = LBMSolver::new(config.simulation.clone(), fields, executor, writer)?.with_progress()?;
    let summary = solver.run()?;
    solver.finish();

    info!("Simulation complete.");
    info!("Wrote {} snapshots to: {}", summary.snapshots.len(), config.output.output_directory);
    if let Some(mlups) = summary.average_mlups {
        println!("Average MLUPS: {:.3}", mlups);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        std::iter::once("lbm-sim").chain(list.iter().copied()).map(String::from).collect()
    }

    #[test]
    fn defaults_to_host() {
        let (path, mode) = parse_args(&args(&["lbm.json"])).unwrap().unwrap();
        assert_eq!(path, "lbm.json");
        assert_eq!(mode, ExecutionMode::Host);
    }

    #[test]
    fn gpu_flag_selects_accelerator() {
        let (_, mode) = parse_args(&args(&["lbm.json", "-gpu"])).unwrap().unwrap();
        assert_eq!(mode, ExecutionMode::Accelerator);
    }

    #[test]
    fn flags_are_mutually_exclusive() {
        assert!(parse_args(&args(&["lbm.json", "-gpu", "-cpu"])).is_err());
        assert!(parse_args(&args(&["lbm.json", "-gpu", "-gpu"])).is_err());
    }

    #[test]
    fn help_and_missing_config() {
        assert!(parse_args(&args(&["-help"])).unwrap().is_none());
        assert!(parse_args(&args(&["-cpu"])).is_err());
        assert!(parse_args(&args(&["lbm.json", "-fast"])).is_err());
    }
}
