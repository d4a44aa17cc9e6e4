use anyhow::{Context, Result, ensure};
use log::warn;
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use crate::{Float, lattice::D3Q19};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub domain: DomainConfig,
    pub physics: PhysicsConfig,
    pub simulation: SimulationConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainConfig {
    /// Interior side length of the cavity
    pub xlength: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhysicsConfig {
    pub tau: Float, // relaxation time
    pub wall_velocity: [Float; 3],
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    pub timesteps: usize,
    pub timesteps_per_plotting: usize,
    /// Per-step throughput logging plus final field dumps
    #[serde(default)]
    pub verbose: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    pub output_directory: String,
    pub file_prefix: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            output_directory: "img".to_string(),
            file_prefix: "lbm-img".to_string(),
        }
    }
}

/// Above this lattice Mach number compressibility errors become noticeable.
const MACH_WARNING: Float = 0.1;

impl Config {
    pub fn from_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read configuration file {}", path))?;
        let config: Config = serde_json::from_str(&content)
            .with_context(|| format!("invalid configuration in {}", path))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject parameters the solver cannot run with.
    pub fn validate(&self) -> Result<()> {
        ensure!(self.domain.xlength >= 1, "xlength must be at least 1");
        ensure!(
            self.physics.tau.is_finite() && self.physics.tau > 0.5,
            "tau must be greater than 0.5 for a positive viscosity, got {}",
            self.physics.tau
        );
        ensure!(
            self.physics.wall_velocity.iter().all(|v| v.is_finite()),
            "wall velocity must be finite, got {:?}",
            self.physics.wall_velocity
        );
        ensure!(self.simulation.timesteps >= 1, "timesteps must be at least 1");
        ensure!(
            self.simulation.timesteps_per_plotting >= 1,
            "timesteps_per_plotting must be at least 1"
        );

        let mach = self.mach_number();
        ensure!(mach < 1.0, "wall velocity exceeds the lattice speed of sound (Ma = {:.3})", mach);
        if mach >= MACH_WARNING {
            warn!("Lattice Mach number {:.3} is high, expect compressibility errors", mach);
        }

        Ok(())
    }

    pub fn wall_velocity(&self) -> Vector3<Float> {
        Vector3::from(self.physics.wall_velocity)
    }

    /// Lattice kinematic viscosity `cs^2 (tau - 1/2)`
    pub fn viscosity(&self) -> Float {
        D3Q19::CS2 * (self.physics.tau - 0.5)
    }

    pub fn mach_number(&self) -> Float {
        self.wall_velocity().norm() / D3Q19::CS2.sqrt()
    }

    /// Reynolds number of the lid-driven flow
    pub fn reynolds_number(&self) -> Float {
        self.wall_velocity().norm() * self.domain.xlength as Float / self.viscosity()
    }
}
