use anyhow::{Context, Result};
use log::debug;
use crate::{
    Float,
    grid::Grid,
    lattice::D3Q19,
    topology::{ExecutionMode, FlagField},
};

/// The two distribution buffers a host step ping-pongs between.
///
/// `collide` always holds the current state. Streaming writes `stream`, and
/// [`DistributionPair::swap`] then exchanges the two buffers by ownership so
/// the freshly streamed data becomes `collide`.
#[derive(Debug, Clone, PartialEq)]
pub struct DistributionPair {
    collide: Vec<Float>,
    stream: Vec<Float>,
}

impl DistributionPair {
    pub fn collide(&self) -> &[Float] {
        &self.collide
    }

    pub fn stream(&self) -> &[Float] {
        &self.stream
    }

    pub fn collide_mut(&mut self) -> &mut [Float] {
        &mut self.collide
    }

    pub fn stream_mut(&mut self) -> &mut [Float] {
        &mut self.stream
    }

    /// Read `collide` while writing `stream`.
    pub fn split_mut(&mut self) -> (&[Float], &mut [Float]) {
        (&self.collide, &mut self.stream)
    }

    /// Exchange buffer identities without touching their contents.
    #[inline]
    pub fn swap(&mut self) {
        std::mem::swap(&mut self.collide, &mut self.stream);
    }

    /// Populations of one node in the `collide` buffer
    #[inline]
    pub fn node(&self, index: usize) -> &[Float] {
        &self.collide[index * D3Q19::Q..(index + 1) * D3Q19::Q]
    }
}

/// Everything a run owns on the host side.
#[derive(Debug, Clone, PartialEq)]
pub struct Fields {
    pub distributions: DistributionPair,
    pub flags: FlagField,
}

impl Fields {
    #[inline]
    pub fn grid(&self) -> &Grid {
        self.flags.grid()
    }

    #[inline]
    pub fn mode(&self) -> ExecutionMode {
        self.flags.mode()
    }
}

fn allocate(len: usize, what: &str) -> Result<Vec<Float>> {
    let mut buffer = Vec::new();
    buffer
        .try_reserve_exact(len)
        .with_context(|| format!("failed to allocate {} field ({} values)", what, len))?;
    Ok(buffer)
}

/// Allocate and initialise all fields for a cavity of side `xlength`.
///
/// `collide` starts at the rest equilibrium (the lattice weights at every
/// node), `stream` starts zeroed and the flag field is classified for `mode`.
pub fn init_fields(xlength: usize, mode: ExecutionMode) -> Result<Fields> {
    let grid = Grid::new(xlength)?;
    let len = grid
        .node_count()
        .checked_mul(D3Q19::Q)
        .context("distribution field size overflows")?;

    let flags = FlagField::classify(grid, mode)?;

    let mut collide = allocate(len, "collide")?;
    for _ in 0..grid.node_count() {
        collide.extend_from_slice(&D3Q19::WEIGHTS);
    }

    let mut stream = allocate(len, "stream")?;
    stream.resize(len, 0.0);

    debug!(
        "Initialised {} nodes ({} populations per field) in {:?} mode",
        grid.node_count(), len, mode
    );

    Ok(Fields {
        distributions: DistributionPair { collide, stream },
        flags,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collide_starts_at_the_weights() {
        for mode in [ExecutionMode::Host, ExecutionMode::Accelerator] {
            let fields = init_fields(3, mode).unwrap();
            let grid = *fields.grid();
            assert_eq!(fields.distributions.collide().len(), grid.node_count() * D3Q19::Q);

            for idx in 0..grid.node_count() {
                let node = fields.distributions.node(idx);
                for (value, weight) in node.iter().zip(D3Q19::WEIGHTS.iter()) {
                    assert_eq!(value.to_bits(), weight.to_bits());
                }
            }
        }
    }

    #[test]
    fn stream_starts_zeroed() {
        let fields = init_fields(2, ExecutionMode::Host).unwrap();
        assert_eq!(fields.distributions.stream().len(), 64 * D3Q19::Q);
        assert!(fields.distributions.stream().iter().all(|&v| v.to_bits() == 0));
    }

    #[test]
    fn flags_follow_mode() {
        let fields = init_fields(2, ExecutionMode::Accelerator).unwrap();
        assert_eq!(fields.mode(), ExecutionMode::Accelerator);
        assert_eq!(fields.flags.as_slice().len(), 64);
    }

    #[test]
    fn initialisation_is_idempotent() {
        let first = init_fields(4, ExecutionMode::Host).unwrap();
        let second = init_fields(4, ExecutionMode::Host).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn zero_extent_is_rejected() {
        assert!(init_fields(0, ExecutionMode::Host).is_err());
    }

    #[test]
    fn swap_exchanges_identities_without_copying() {
        let mut fields = init_fields(1, ExecutionMode::Host).unwrap();
        fields.distributions.stream_mut()[0] = 42.0;

        let collide_before = fields.distributions.collide().to_vec();
        let stream_before = fields.distributions.stream().to_vec();
        let collide_ptr = fields.distributions.collide().as_ptr();
        let stream_ptr = fields.distributions.stream().as_ptr();

        fields.distributions.swap();

        assert_eq!(fields.distributions.collide(), stream_before.as_slice());
        assert_eq!(fields.distributions.stream(), collide_before.as_slice());
        assert_eq!(fields.distributions.collide().as_ptr(), stream_ptr);
        assert_eq!(fields.distributions.stream().as_ptr(), collide_ptr);
    }
}
