pub mod config;
pub mod grid;
pub mod lattice;
pub mod topology;
pub mod fields;
pub mod kernels;
pub mod executor;
pub mod gpu;
pub mod solver;
pub mod output;

pub use config::Config;
pub use grid::Grid;
pub use lattice::D3Q19;
pub use topology::{CellFlag, ExecutionMode, FlagField, classify};
pub use fields::{DistributionPair, Fields, init_fields};
pub use executor::{HostExecutor, KernelParams, StepExecutor, build_executor};
pub use gpu::{AcceleratorExecutor, DeviceFields, GPUContext};
pub use solver::{LBMSolver, Phase, RunSummary, SnapshotSink};
pub use output::VTKWriter;

pub type Float = f32;
