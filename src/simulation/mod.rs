pub mod aabb;
pub mod concurrency;
pub mod counters;
pub mod mesh;
pub mod neighborhood_search;
pub mod particle_generator;
pub mod scene;
pub mod sdf;
pub mod simulation_parameters;
pub mod sph_kernels;
pub mod simulation;

pub type IT = i32;

#[cfg(feature = "double-precision")]
pub mod floating_type_mod {
    pub type FT = f64;
    pub use std::f64::consts::PI;
}

#[cfg(not(feature = "double-precision"))]
pub mod floating_type_mod {
    pub type FT = f32;
    pub use std::f32::consts::PI;
}

use floating_type_mod::FT;

use nalgebra::SVector;

pub type V<FT, const D: usize> = SVector<FT, D>;

pub type VI<const D: usize> = V<IT, D>;

pub type V3 = V<FT, 3>;

pub fn vec3f(x: FT, y: FT, z: FT) -> V<FT, 3> {
    [x, y, z].into()
}

/// Flattens a list of points into `[x0, y0, z0, x1, y1, z1, ...]`.
pub fn flatten_points(points: &[V3]) -> Vec<FT> {
    points.iter().flat_map(|p| [p.x, p.y, p.z]).collect()
}

pub use simulation::*;
