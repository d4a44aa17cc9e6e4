//! Host-side streaming, collision and boundary kernels.
//!
//! All three work on node-major buffers (`Q * node + i`) and dispatch on the
//! flag field only through [`CellFlag::is_fluid`] and
//! [`CellFlag::is_moving_wall`], so they accept either flag encoding.

use nalgebra::Vector3;
use crate::{
    Float,
    lattice::D3Q19,
    topology::{CellFlag, FlagField},
};

const Q: usize = D3Q19::Q;

/// Pull populations from neighbouring nodes of `collide` into `stream`.
///
/// Only fluid nodes are written; their neighbours always exist because
/// fluid nodes are interior.
pub fn stream(collide: &[Float], stream: &mut [Float], flags: &FlagField) {
    let grid = flags.grid();
    let strides: [isize; Q] = std::array::from_fn(|i| grid.stride(D3Q19::VELOCITIES[i]));

    for (node, &flag) in flags.as_slice().iter().enumerate() {
        if !flag.is_fluid() {
            continue;
        }
        for i in 0..Q {
            let source = node.wrapping_add_signed(-strides[i]);
            stream[Q * node + i] = collide[Q * source + i];
        }
    }
}

/// BGK relaxation of every fluid node towards its local equilibrium.
pub fn collide(collide: &mut [Float], flags: &FlagField, tau: Float) {
    let omega = 1.0 / tau;

    for (node, &flag) in flags.as_slice().iter().enumerate() {
        if !flag.is_fluid() {
            continue;
        }
        let f = &mut collide[Q * node..Q * (node + 1)];
        let (density, velocity) = D3Q19::moments(f);
        for (i, fi) in f.iter_mut().enumerate() {
            let f_eq = D3Q19::equilibrium(i, density, &velocity);
            *fi += omega * (f_eq - *fi);
        }
    }
}

/// Half-way bounce-back on every boundary node next to fluid.
///
/// Lid nodes add the momentum of the moving wall to each reflected
/// population.
pub fn treat_boundary(collide: &mut [Float], flags: &FlagField, wall_velocity: &Vector3<Float>) {
    let grid = flags.grid();

    for (node, &flag) in flags.as_slice().iter().enumerate() {
        if flag.is_fluid() {
            continue;
        }
        let (x, y, z) = grid.coords(node);
        for i in 0..Q {
            let Some(neighbor) = grid.neighbor(x, y, z, D3Q19::VELOCITIES[i]) else {
                continue;
            };
            if !flags.get(neighbor).is_fluid() {
                continue;
            }
            collide[Q * node + i] = reflected(collide, neighbor, i, flag, wall_velocity);
        }
    }
}

#[inline]
fn reflected(
    collide: &[Float],
    neighbor: usize,
    i: usize,
    flag: CellFlag,
    wall_velocity: &Vector3<Float>,
) -> Float {
    let f = &collide[Q * neighbor..Q * (neighbor + 1)];
    let bounced = f[D3Q19::inverse(i)];

    if flag.is_moving_wall() {
        let density = D3Q19::density(f);
        bounced + 2.0 * D3Q19::WEIGHTS[i] * density * D3Q19::velocity(i).dot(wall_velocity) / D3Q19::CS2
    } else {
        bounced
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use crate::{fields::init_fields, topology::ExecutionMode};

    fn host_step(fields: &mut crate::fields::Fields, tau: Float, wall: &Vector3<Float>) {
        let (src, dst) = fields.distributions.split_mut();
        stream(src, dst, &fields.flags);
        fields.distributions.swap();
        collide(fields.distributions.collide_mut(), &fields.flags, tau);
        treat_boundary(fields.distributions.collide_mut(), &fields.flags, wall);
    }

    fn fluid_mass(fields: &crate::fields::Fields) -> f64 {
        (0..fields.grid().node_count())
            .filter(|&n| fields.flags.get(n).is_fluid())
            .map(|n| D3Q19::density(fields.distributions.node(n)) as f64)
            .sum()
    }

    #[test]
    fn streaming_moves_populations_by_one_node() {
        let mut fields = init_fields(3, ExecutionMode::Host).unwrap();
        let grid = *fields.grid();
        let source = grid.index(2, 2, 2);
        let east = 10;
        assert_eq!(D3Q19::VELOCITIES[east], [1, 0, 0]);

        fields.distributions.collide_mut()[Q * source + east] = 7.0;
        let (src, dst) = fields.distributions.split_mut();
        stream(src, dst, &fields.flags);

        let target = grid.index(3, 2, 2);
        assert_eq!(fields.distributions.stream()[Q * target + east], 7.0);
        assert_ne!(fields.distributions.stream()[Q * source + east], 7.0);
    }

    #[test]
    fn streaming_leaves_boundary_nodes_alone() {
        let mut fields = init_fields(2, ExecutionMode::Host).unwrap();
        let (src, dst) = fields.distributions.split_mut();
        stream(src, dst, &fields.flags);

        let corner = fields.grid().index(0, 0, 0);
        assert!(fields.distributions.stream()[Q * corner..Q * (corner + 1)].iter().all(|&v| v == 0.0));
    }

    #[test]
    fn rest_state_is_a_fixed_point() {
        let mut fields = init_fields(4, ExecutionMode::Host).unwrap();
        let wall = Vector3::zeros();
        for _ in 0..3 {
            host_step(&mut fields, 1.2, &wall);
        }

        let grid = *fields.grid();
        for (x, y, z) in grid.coordinates().filter(|&(x, y, z)| grid.is_interior(x, y, z)) {
            let node = fields.distributions.node(grid.index(x, y, z));
            for (value, weight) in node.iter().zip(D3Q19::WEIGHTS.iter()) {
                assert_relative_eq!(*value, *weight, epsilon = 1e-6);
            }
        }
    }

    #[test]
    fn bounce_back_conserves_mass() {
        let mut fields = init_fields(4, ExecutionMode::Host).unwrap();
        let grid = *fields.grid();
        // every neighbour of (2, 2, 2) is fluid
        let node = grid.index(2, 2, 2);
        fields.distributions.collide_mut()[Q * node + 8] += 0.01;

        let before = fluid_mass(&fields);
        for _ in 0..5 {
            host_step(&mut fields, 0.8, &Vector3::zeros());
        }
        assert_relative_eq!(fluid_mass(&fields), before, epsilon = 1e-4);
    }

    #[test]
    fn moving_lid_drags_fluid_along() {
        let mut fields = init_fields(4, ExecutionMode::Host).unwrap();
        let wall = Vector3::new(0.05, 0.0, 0.0);
        for _ in 0..10 {
            host_step(&mut fields, 1.0, &wall);
        }

        let grid = *fields.grid();
        let below_lid = grid.index(2, 4, 2);
        let (_, velocity) = D3Q19::moments(fields.distributions.node(below_lid));
        assert!(velocity.x > 0.0, "velocity below lid: {:?}", velocity);

        let bottom = grid.index(2, 1, 2);
        let (_, deep) = D3Q19::moments(fields.distributions.node(bottom));
        assert!(velocity.x > deep.x);
    }

    #[test]
    fn flag_encodings_produce_identical_fields() {
        let wall = Vector3::new(0.08, 0.0, 0.01);
        let mut host = init_fields(3, ExecutionMode::Host).unwrap();
        let mut accelerator = init_fields(3, ExecutionMode::Accelerator).unwrap();

        for _ in 0..6 {
            host_step(&mut host, 0.9, &wall);
            host_step(&mut accelerator, 0.9, &wall);
        }

        assert_eq!(host.distributions.collide(), accelerator.distributions.collide());
    }
}
