use std::time::{Duration, Instant};
use anyhow::{Result, ensure};
use nalgebra::Vector3;
use crate::{
    Float,
    config::Config,
    fields::Fields,
    gpu::AcceleratorExecutor,
    kernels,
    topology::ExecutionMode,
};

/// One way of advancing the simulation by a single timestep.
///
/// The solver picks an implementation once, before the first step, and
/// never looks at the execution mode again.
pub trait StepExecutor {
    fn mode(&self) -> ExecutionMode;

    /// Advance `fields` by one timestep.
    ///
    /// Returns the wall-clock time spent in kernel work when the path
    /// measures its own throughput.
    fn advance(&mut self, fields: &mut Fields) -> Result<Option<Duration>>;

    /// Make the host copies in `fields` authoritative.
    fn synchronize(&mut self, fields: &mut Fields) -> Result<()>;

    /// Free any resources held outside of `fields`.
    fn release(self: Box<Self>);
}

/// Relaxation time and lid velocity shared by both paths.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KernelParams {
    pub tau: Float,
    pub wall_velocity: Vector3<Float>,
}

impl KernelParams {
    pub fn from_config(config: &Config) -> Self {
        Self {
            tau: config.physics.tau,
            wall_velocity: config.wall_velocity(),
        }
    }
}

/// Runs streaming, collision and boundary treatment on host buffers.
#[derive(Debug, Clone)]
pub struct HostExecutor {
    params: KernelParams,
}

impl HostExecutor {
    pub fn new(params: KernelParams, fields: &Fields) -> Result<Self> {
        ensure!(
            fields.mode() == ExecutionMode::Host,
            "host executor needs a host-mode flag field, got {:?}",
            fields.mode()
        );
        Ok(Self { params })
    }
}

impl StepExecutor for HostExecutor {
    fn mode(&self) -> ExecutionMode {
        ExecutionMode::Host
    }

    fn advance(&mut self, fields: &mut Fields) -> Result<Option<Duration>> {
        let start = Instant::now();

        let (collide, stream) = fields.distributions.split_mut();
        kernels::stream(collide, stream, &fields.flags);

        // Collision must see the freshly streamed buffer.
        fields.distributions.swap();

        kernels::collide(fields.distributions.collide_mut(), &fields.flags, self.params.tau);
        kernels::treat_boundary(
            fields.distributions.collide_mut(),
            &fields.flags,
            &self.params.wall_velocity,
        );

        Ok(Some(start.elapsed()))
    }

    fn synchronize(&mut self, _fields: &mut Fields) -> Result<()> {
        Ok(())
    }

    fn release(self: Box<Self>) {}
}

/// Build the executor for `mode`, establishing device copies if needed.
pub async fn build_executor(
    mode: ExecutionMode,
    params: KernelParams,
    fields: &Fields,
) -> Result<Box<dyn StepExecutor>> {
    Ok(match mode {
        ExecutionMode::Host => Box::new(HostExecutor::new(params, fields)?),
        ExecutionMode::Accelerator => Box::new(AcceleratorExecutor::new(params, fields).await?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::init_fields;

    fn params() -> KernelParams {
        KernelParams { tau: 1.0, wall_velocity: Vector3::new(0.05, 0.0, 0.0) }
    }

    #[test]
    fn host_executor_rejects_accelerator_flags() {
        let fields = init_fields(2, ExecutionMode::Accelerator).unwrap();
        assert!(HostExecutor::new(params(), &fields).is_err());
    }

    #[test]
    fn host_step_reports_its_duration() {
        let mut fields = init_fields(2, ExecutionMode::Host).unwrap();
        let mut executor = HostExecutor::new(params(), &fields).unwrap();
        assert_eq!(executor.mode(), ExecutionMode::Host);
        assert!(executor.advance(&mut fields).unwrap().is_some());
    }

    #[test]
    fn host_step_swaps_buffers() {
        let mut fields = init_fields(2, ExecutionMode::Host).unwrap();
        let before_collide = fields.distributions.collide().as_ptr();
        let before_stream = fields.distributions.stream().as_ptr();

        let mut executor = HostExecutor::new(params(), &fields).unwrap();
        executor.advance(&mut fields).unwrap();

        assert_eq!(fields.distributions.collide().as_ptr(), before_stream);
        assert_eq!(fields.distributions.stream().as_ptr(), before_collide);
        // The buffer that held the initial state is now the scratch buffer.
        assert_eq!(&fields.distributions.stream()[..19], &crate::lattice::D3Q19::WEIGHTS[..]);
    }

    #[test]
    fn synchronize_is_a_no_op_on_host() {
        let mut fields = init_fields(2, ExecutionMode::Host).unwrap();
        let snapshot = fields.clone();
        let mut executor = HostExecutor::new(params(), &fields).unwrap();
        executor.synchronize(&mut fields).unwrap();
        assert_eq!(fields, snapshot);
    }
}
