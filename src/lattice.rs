use nalgebra::Vector3;
use crate::Float;

/// D3Q19 Lattice-Boltzmann model constants
///
/// Directions are ordered so that `i` and `Q - 1 - i` always point in
/// opposite directions, with the rest population in the middle.
pub struct D3Q19;

impl D3Q19 {
    /// Number of discrete velocities
    pub const Q: usize = 19;

    /// Spatial dimension
    pub const D: usize = 3;

    /// Index of the rest population
    pub const REST: usize = 9;

    /// Discrete velocities
    pub const VELOCITIES: [[i32; 3]; 19] = [
        [0, -1, -1], [-1, 0, -1], [0, 0, -1], [1, 0, -1], [0, 1, -1],
        [-1, -1, 0], [0, -1, 0], [1, -1, 0], [-1, 0, 0],
        [0, 0, 0],
        [1, 0, 0], [-1, 1, 0], [0, 1, 0], [1, 1, 0],
        [0, -1, 1], [-1, 0, 1], [0, 0, 1], [1, 0, 1], [0, 1, 1],
    ];

    /// Weights for each direction
    pub const WEIGHTS: [Float; 19] = [
        1.0/36.0, 1.0/36.0, 2.0/36.0, 1.0/36.0, 1.0/36.0,
        1.0/36.0, 2.0/36.0, 1.0/36.0, 2.0/36.0,
        12.0/36.0,
        2.0/36.0, 1.0/36.0, 2.0/36.0, 1.0/36.0,
        1.0/36.0, 1.0/36.0, 2.0/36.0, 1.0/36.0, 1.0/36.0,
    ];

    /// Speed of sound squared
    pub const CS2: Float = 1.0 / 3.0;

    /// Direction pointing the opposite way of `i`
    #[inline]
    pub const fn inverse(i: usize) -> usize {
        Self::Q - 1 - i
    }

    #[inline]
    pub fn velocity(i: usize) -> Vector3<Float> {
        let c = Self::VELOCITIES[i];
        Vector3::new(c[0] as Float, c[1] as Float, c[2] as Float)
    }

    /// Second-order equilibrium distribution for direction `i`
    pub fn equilibrium(i: usize, density: Float, velocity: &Vector3<Float>) -> Float {
        let cu = Self::velocity(i).dot(velocity);
        let u2 = velocity.norm_squared();

        Self::WEIGHTS[i] * density * (1.0 + cu / Self::CS2
            + cu * cu / (2.0 * Self::CS2 * Self::CS2)
            - u2 / (2.0 * Self::CS2))
    }

    /// Density of one node's populations
    #[inline]
    pub fn density(f: &[Float]) -> Float {
        f.iter().sum()
    }

    /// Density and velocity of one node's populations
    pub fn moments(f: &[Float]) -> (Float, Vector3<Float>) {
        debug_assert_eq!(f.len(), Self::Q);

        let density = Self::density(f);
        let mut momentum = Vector3::zeros();
        for (i, &fi) in f.iter().enumerate() {
            momentum += Self::velocity(i) * fi;
        }

        if density > 1e-10 {
            (density, momentum / density)
        } else {
            (density, Vector3::zeros())
        }
    }
}
