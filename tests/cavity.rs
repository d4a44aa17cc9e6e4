//! End-to-end host runs of the cavity writing real output files.

use lbm_cavity_rs::{
    Config, ExecutionMode, KernelParams, LBMSolver, Phase, VTKWriter, build_executor, init_fields,
};

fn config(dir: &std::path::Path, timesteps: usize, per_plotting: usize, verbose: bool) -> Config {
    let json = format!(
        r#"{{
            "domain": {{ "xlength": 4 }},
            "physics": {{ "tau": 1.2, "wall_velocity": [0.05, 0.0, 0.0] }},
            "simulation": {{
                "timesteps": {timesteps},
                "timesteps_per_plotting": {per_plotting},
                "verbose": {verbose}
            }},
            "output": {{ "output_directory": "{dir}", "file_prefix": "lbm-img" }}
        }}"#,
        dir = dir.join("img").display(),
    );
    let config: Config = serde_json::from_str(&json).unwrap();
    config.validate().unwrap();
    config
}

fn run(config: &Config) -> lbm_cavity_rs::RunSummary {
    let fields = init_fields(config.domain.xlength, ExecutionMode::Host).unwrap();
    let executor = pollster::block_on(build_executor(
        ExecutionMode::Host,
        KernelParams::from_config(config),
        &fields,
    ))
    .unwrap();
    let writer = VTKWriter::new(&config.output).unwrap();

    let mut solver = LBMSolver::new(config.simulation.clone(), fields, executor, writer).unwrap();
    let summary = solver.run().unwrap();
    assert_eq!(solver.phase(), Phase::Done);
    solver.finish();
    summary
}

#[test]
fn test_host_run_writes_snapshots_on_cadence() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path(), 10, 3, false);

    let summary = run(&config);
    assert_eq!(summary.snapshots, vec![0, 3, 6, 9]);
    assert!(summary.average_mlups.is_some());

    let img = dir.path().join("img");
    for t in [0, 3, 6, 9] {
        assert!(img.join(format!("lbm-img_{:06}.vtk", t)).exists(), "missing snapshot {}", t);
    }
    for t in [1, 2, 4, 5, 7, 8] {
        assert!(!img.join(format!("lbm-img_{:06}.vtk", t)).exists(), "unexpected snapshot {}", t);
    }

    let collection = std::fs::read_to_string(img.join("lbm-img.pvd")).unwrap();
    assert_eq!(collection.matches("<DataSet").count(), 4);
    assert!(!img.join("collide-field.txt").exists());
}

#[test]
fn test_verbose_run_dumps_fields() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path(), 4, 10, true);

    run(&config);

    let img = dir.path().join("img");
    let flags = std::fs::read_to_string(img.join("flag-field.txt")).unwrap();
    assert_eq!(flags.lines().count(), 1 + 216);
    // (0, 5, 0) sits on the lid
    assert!(flags.lines().any(|line| line == "0 5 0 2"));
    assert!(flags.lines().any(|line| line == "3 3 3 0"));

    let field = std::fs::read_to_string(img.join("collide-field.txt")).unwrap();
    assert_eq!(field.lines().count(), 1 + 216);
}

#[test]
fn test_lid_drives_velocity_into_latest_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path(), 21, 20, false);
    run(&config);

    let snapshot = std::fs::read_to_string(dir.path().join("img/lbm-img_000020.vtk")).unwrap();
    let velocities: Vec<f32> = snapshot
        .split("VECTORS Velocity float\n")
        .nth(1)
        .unwrap()
        .lines()
        .take(64)
        .map(|line| line.split_whitespace().next().unwrap().parse().unwrap())
        .collect();

    // Points run x fastest, then y, then z; the layer below the lid is y = 3.
    let top_layer_max = (0..4)
        .flat_map(|z| (0..4).map(move |x| z * 16 + 3 * 4 + x))
        .map(|i| velocities[i])
        .fold(f32::MIN, f32::max);
    assert!(top_layer_max > 0.0);
}
