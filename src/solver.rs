use anyhow::{Result, ensure};
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info};
use crate::{
    config::SimulationConfig,
    executor::StepExecutor,
    fields::Fields,
    topology::ExecutionMode,
};

const MLUPS_EXPONENT: f64 = 1.0e6;

/// Receives host-resident, synchronized fields from the solver.
pub trait SnapshotSink {
    /// Periodic output at `timestep`.
    fn write_snapshot(&mut self, fields: &Fields, timestep: usize) -> Result<()>;

    /// Verbose post-run dump.
    fn write_final(&mut self, _fields: &Fields) -> Result<()> {
        Ok(())
    }

    /// Called once after the last write.
    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Init,
    Running,
    Drain,
    Done,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub timesteps: usize,
    /// Timesteps after which a snapshot was written
    pub snapshots: Vec<usize>,
    /// Host path only
    pub average_mlups: Option<f64>,
}

pub struct LBMSolver<S: SnapshotSink> {
    settings: SimulationConfig,
    fields: Fields,
    executor: Box<dyn StepExecutor>,
    sink: S,
    progress: ProgressBar,
    phase: Phase,
    mlups_sum: f64,
}

impl<S: SnapshotSink> LBMSolver<S> {
    pub fn new(
        settings: SimulationConfig,
        fields: Fields,
        executor: Box<dyn StepExecutor>,
        sink: S,
    ) -> Result<Self> {
        ensure!(settings.timesteps >= 1, "timesteps must be at least 1");
        ensure!(settings.timesteps_per_plotting >= 1, "timesteps_per_plotting must be at least 1");
        ensure!(
            executor.mode() == fields.mode(),
            "{:?} executor cannot run a {:?}-mode flag field",
            executor.mode(),
            fields.mode()
        );

        Ok(Self {
            settings,
            fields,
            executor,
            sink,
            progress: ProgressBar::hidden(),
            phase: Phase::Init,
            mlups_sum: 0.0,
        })
    }

    /// Show a progress bar over the timesteps.
    pub fn with_progress(mut self) -> Result<Self> {
        let style = ProgressStyle::with_template(
            "{spinner} [{elapsed_precise}] {bar:40} {pos}/{len} steps ({per_sec})",
        )?;
        self.progress = ProgressBar::new(self.settings.timesteps as u64).with_style(style);
        Ok(self)
    }

    pub fn run(&mut self) -> Result<RunSummary> {
        ensure!(self.phase == Phase::Init, "solver already ran (phase {:?})", self.phase);

        let timesteps = self.settings.timesteps;
        let node_count = self.fields.grid().node_count() as f64;
        let mut snapshots = Vec::new();

        info!("Starting LBM simulation for {} timesteps in {:?} mode", timesteps, self.executor.mode());
        self.phase = Phase::Running;

        for t in 0..timesteps {
            debug!("Time step: #{}", t);

            if let Some(elapsed) = self.executor.advance(&mut self.fields)? {
                let seconds = elapsed.as_secs_f64();
                if seconds > 0.0 {
                    let mlups = node_count / (MLUPS_EXPONENT * seconds);
                    self.mlups_sum += mlups;
                    if self.settings.verbose {
                        info!("MLUPS: {:.3}", mlups);
                    }
                }
            }

            if t % self.settings.timesteps_per_plotting == 0 {
                self.executor.synchronize(&mut self.fields)?;
                self.sink.write_snapshot(&self.fields, t)?;
                snapshots.push(t);
            }

            self.progress.inc(1);
        }
        self.progress.finish_and_clear();

        self.phase = Phase::Drain;
        if self.settings.verbose {
            self.executor.synchronize(&mut self.fields)?;
            self.sink.write_final(&self.fields)?;
        }
        self.sink.finish()?;

        let average_mlups = match self.executor.mode() {
            ExecutionMode::Host => Some(self.mlups_sum / timesteps as f64),
            ExecutionMode::Accelerator => None,
        };
        if let Some(mlups) = average_mlups {
            info!("Average MLUPS: {:.3}", mlups);
        }

        self.phase = Phase::Done;
        info!("Simulation completed {} timesteps, {} snapshots", timesteps, snapshots.len());

        Ok(RunSummary { timesteps, snapshots, average_mlups })
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn get_sink(&self) -> &S {
        &self.sink
    }

    /// Release the executor's resources and hand back the host fields.
    pub fn finish(self) -> Fields {
        self.executor.release();
        self.fields
    }
}
