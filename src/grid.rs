use anyhow::{Context, Result, ensure};

/// Cubic lattice of side `xlength` surrounded by a one-node halo.
///
/// Every component addresses nodes through this type, so there is exactly
/// one coordinate/index mapping: `index = x + y * step + z * step^2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Grid {
    xlength: usize,
    step: usize,
    node_count: usize,
}

impl Grid {
    pub fn new(xlength: usize) -> Result<Self> {
        ensure!(xlength >= 1, "grid extent must be at least 1, got {}", xlength);

        let step = xlength
            .checked_add(2)
            .with_context(|| format!("grid extent {} overflows the node count", xlength))?;
        let node_count = step
            .checked_mul(step)
            .and_then(|n| n.checked_mul(step))
            .with_context(|| format!("grid extent {} overflows the node count", xlength))?;

        Ok(Self { xlength, step, node_count })
    }

    /// Interior side length `L`
    #[inline]
    pub fn xlength(&self) -> usize {
        self.xlength
    }

    /// Stored side length `L + 2`
    #[inline]
    pub fn step(&self) -> usize {
        self.step
    }

    /// Highest coordinate on any axis (`L + 1`)
    #[inline]
    pub fn last(&self) -> usize {
        self.step - 1
    }

    #[inline]
    pub fn node_count(&self) -> usize {
        self.node_count
    }

    #[inline]
    pub fn index(&self, x: usize, y: usize, z: usize) -> usize {
        debug_assert!(x < self.step && y < self.step && z < self.step);
        x + y * self.step + z * self.step * self.step
    }

    #[inline]
    pub fn coords(&self, index: usize) -> (usize, usize, usize) {
        debug_assert!(index < self.node_count);
        let x = index % self.step;
        let y = (index / self.step) % self.step;
        let z = index / (self.step * self.step);
        (x, y, z)
    }

    /// Index of the node at `(x, y, z) + offset`, if it lies inside the grid.
    #[inline]
    pub fn neighbor(&self, x: usize, y: usize, z: usize, offset: [i32; 3]) -> Option<usize> {
        let shift = |coord: usize, delta: i32| -> Option<usize> {
            let moved = coord.checked_add_signed(delta as isize)?;
            (moved < self.step).then_some(moved)
        };

        Some(self.index(shift(x, offset[0])?, shift(y, offset[1])?, shift(z, offset[2])?))
    }

    /// Flat-index distance covered by moving along `offset`.
    ///
    /// Only meaningful for interior nodes, whose neighbours all exist.
    #[inline]
    pub fn stride(&self, offset: [i32; 3]) -> isize {
        let step = self.step as isize;
        offset[0] as isize + offset[1] as isize * step + offset[2] as isize * step * step
    }

    /// True when every coordinate lies in `[1, L]`
    #[inline]
    pub fn is_interior(&self, x: usize, y: usize, z: usize) -> bool {
        (1..=self.xlength).contains(&x)
            && (1..=self.xlength).contains(&y)
            && (1..=self.xlength).contains(&z)
    }

    /// All node coordinates in storage order (x fastest).
    pub fn coordinates(&self) -> impl Iterator<Item = (usize, usize, usize)> + use<> {
        let step = self.step;
        (0..step).flat_map(move |z| {
            (0..step).flat_map(move |y| (0..step).map(move |x| (x, y, z)))
        })
    }
}
