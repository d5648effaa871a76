use anyhow::{ensure, Context};
use log::{debug, warn};
use rand::{rngs::StdRng, Rng, SeedableRng};
use rstar::{primitives::GeomWithData, Point, RTree};

use crate::{
    aabb::Aabb,
    concurrency::{par_iter_mut1, par_iter_mut2},
    floating_type_mod::{FT, PI},
    mesh::Mesh,
    sdf::{SignedDistanceField, TriangleTree},
    vec3f, V3,
};

/// Default resolution of the signed distance field along the longest axis of a mesh.
pub const DEFAULT_SDF_CELLS: usize = 64;

/// Number of repulsion/reprojection rounds applied to sampled mesh surfaces.
pub const RELAXATION_ITERATIONS: usize = 10;

const RELAXATION_STEP: FT = 0.01;

/// Expected number of neighbors within the relaxation radius.
const RELAXATION_NEIGHBORS: FT = 10.;

/// The surface sampling is seeded so that scene setups are reproducible.
pub const SURFACE_SAMPLING_SEED: u64 = 0x853c_49e6_748f_ea9b;

/// Positions with one normal each, e.g. static boundary particles.
#[derive(Debug, Clone, Default)]
pub struct ParticleSet {
    pub positions: Vec<V3>,
    pub normals: Vec<V3>,
}

impl ParticleSet {
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn append(&mut self, other: ParticleSet) {
        assert_eq!(other.positions.len(), other.normals.len());
        self.positions.extend(other.positions);
        self.normals.extend(other.normals);
    }
}

/** Lattice index range `ceil(lo / spacing)..=floor(hi / spacing)` per axis. */
fn lattice_range(lo: V3, hi: V3, spacing: FT) -> ([i64; 3], [i64; 3]) {
    let mut min = [0; 3];
    let mut max = [0; 3];
    for d in 0..3 {
        min[d] = (lo[d] / spacing).ceil() as i64;
        max[d] = (hi[d] / spacing).floor() as i64;
    }
    (min, max)
}

fn for_each_lattice_point(lo: V3, hi: V3, spacing: FT, mut f: impl FnMut(V3)) {
    let (min, max) = lattice_range(lo, hi, spacing);
    for z in min[2]..=max[2] {
        for y in min[1]..=max[1] {
            for x in min[0]..=max[0] {
                f(vec3f(x as FT, y as FT, z as FT) * spacing);
            }
        }
    }
}

/**
 * Appends every point of the global lattice `spacing * (x, y, z)` inside the box.
 *
 * The lattice is not aligned to the box, so the fill depends on where the box lies relative to it.
 */
pub fn voxelize_box(bounds: &Aabb, spacing: FT, positions: &mut Vec<V3>) {
    for_each_lattice_point(bounds.min, bounds.max, spacing, |p| positions.push(p));
}

/** Appends every lattice point within `radius` of `center`. */
pub fn voxelize_sphere(center: V3, radius: FT, spacing: FT, positions: &mut Vec<V3>) {
    let r = V3::repeat(radius);
    let radius2 = radius * radius;
    for_each_lattice_point(center - r, center + r, spacing, |p| {
        if (p - center).norm_squared() <= radius2 {
            positions.push(p);
        }
    });
}

/**
 * Appends every lattice point inside the bounds of `mesh` that the generalized winding number
 * classifies as inside. The mesh should be closed, but small holes are tolerated.
 */
pub fn voxelize_mesh(mesh: &Mesh, spacing: FT, positions: &mut Vec<V3>) {
    let bounds = mesh.compute_bounds();
    if !bounds.is_valid() {
        warn!("mesh without volume, no fluid particles generated");
        return;
    }

    let mut candidates = Vec::new();
    for_each_lattice_point(bounds.min, bounds.max, spacing, |p| candidates.push(p));

    let triangles = TriangleTree::new(mesh);
    let mut inside = vec![false; candidates.len()];
    par_iter_mut1(&mut inside, |i, p_inside| {
        *p_inside = triangles.is_inside(candidates[i]);
    });

    let before = positions.len();
    positions.extend(
        candidates
            .iter()
            .zip(inside.iter())
            .filter(|&(_, &inside)| inside)
            .map(|(&p, _)| p),
    );
    debug!(
        "voxelized mesh: {} of {} lattice points inside",
        positions.len() - before,
        candidates.len()
    );
}

/**
 * One particle thick shell on the faces, edges and corners of a box.
 *
 * Every extent is divided into `ceil(extent / (2 * particle_radius))` segments. Normals point out of
 * the box; edge and corner normals are the normalized diagonals.
 */
pub fn generate_surface_particles_box(bounds: &Aabb, particle_radius: FT) -> ParticleSet {
    let origin = bounds.min;
    let extents = bounds.extents();

    let n: [i32; 3] = [0, 1, 2].map(|d| i32::max((extents[d] / (2. * particle_radius)).ceil() as i32, 1));
    let [nx, ny, nz] = n;
    let spacing = vec3f(extents.x / nx as FT, extents.y / ny as FT, extents.z / nz as FT);

    // the direction vectors below point into the box
    let normal_scale: FT = -1.;

    let mut set = ParticleSet::default();
    let mut add = |x: i32, y: i32, z: i32, inward: V3| {
        set.positions
            .push(origin + vec3f(x as FT, y as FT, z as FT).component_mul(&spacing));
        set.normals.push(inward.normalize() * normal_scale);
    };

    // faces
    for x in 1..nx {
        for y in 1..ny {
            add(x, y, 0, vec3f(0., 0., 1.));
            add(x, y, nz, vec3f(0., 0., -1.));
        }
    }
    for x in 1..nx {
        for z in 1..nz {
            add(x, 0, z, vec3f(0., 1., 0.));
            add(x, ny, z, vec3f(0., -1., 0.));
        }
    }
    for y in 1..ny {
        for z in 1..nz {
            add(0, y, z, vec3f(1., 0., 0.));
            add(nx, y, z, vec3f(-1., 0., 0.));
        }
    }

    // edges
    for x in 1..nx {
        add(x, 0, 0, vec3f(0., 1., 1.));
        add(x, ny, 0, vec3f(0., -1., 1.));
        add(x, 0, nz, vec3f(0., 1., -1.));
        add(x, ny, nz, vec3f(0., -1., -1.));
    }
    for y in 1..ny {
        add(0, y, 0, vec3f(1., 0., 1.));
        add(nx, y, 0, vec3f(-1., 0., 1.));
        add(0, y, nz, vec3f(1., 0., -1.));
        add(nx, y, nz, vec3f(-1., 0., -1.));
    }
    for z in 1..nz {
        add(0, 0, z, vec3f(1., 1., 0.));
        add(nx, 0, z, vec3f(-1., 1., 0.));
        add(0, ny, z, vec3f(1., -1., 0.));
        add(nx, ny, z, vec3f(-1., -1., 0.));
    }

    // corners
    for c in 0..8 {
        let (x, y, z) = (c & 1 != 0, c & 2 != 0, c & 4 != 0);
        let sign = |b: bool| if b { 1. } else { -1. };
        add(
            if x { 0 } else { nx },
            if y { 0 } else { ny },
            if z { 0 } else { nz },
            vec3f(sign(x), sign(y), sign(z)),
        );
    }

    set
}

/**
 * Signed distance field used to place surface particles on `mesh`: the mesh bounds are padded by
 * 10% of their extent on every side, but at least by two cells so that flat meshes get a field
 * with some thickness.
 */
pub fn surface_sdf(mesh: &Mesh, cells: usize) -> anyhow::Result<SignedDistanceField> {
    ensure!(cells > 0, "signed distance field needs at least one cell");
    ensure!(
        !mesh.vertices.is_empty() && mesh.num_triangles() > 0,
        "mesh has no triangles"
    );

    let bounds = mesh.compute_bounds();
    let extents = bounds.extents();
    let major_extent = extents[bounds.major_axis()];
    ensure!(
        major_extent > 0. && major_extent.is_finite(),
        "mesh is degenerate, all vertices lie at {:?}",
        bounds.min.as_slice()
    );

    let cell_size = 1.2 * major_extent / cells as FT;
    let padding = extents.map(|e| FT::max(0.1 * e, 2. * cell_size));
    Ok(SignedDistanceField::build(mesh, bounds.expanded(padding), cells))
}

/// Randomly placed points on a mesh surface together with the sampled area.
#[derive(Debug, Clone)]
pub struct SurfaceSamples {
    pub positions: Vec<V3>,
    pub total_area: FT,
}

/**
 * Samples the mesh with an areal density of `1 / (PI * particle_radius^2)`.
 *
 * Each triangle receives `floor(density * area)` uniformly distributed points and one more with a
 * probability equal to the fractional remainder.
 */
pub fn sample_mesh_surface(mesh: &Mesh, particle_radius: FT, rng: &mut impl Rng) -> SurfaceSamples {
    let density = 1. / (PI * particle_radius * particle_radius);
    debug!("surface sampling density = {}", density);

    let mut positions = Vec::new();
    let mut total_area = 0.;

    for t in 0..mesh.num_triangles() {
        let (p0, p1, p2) = mesh.triangle(t);
        let e0 = p1 - p0;
        let e1 = p2 - p0;
        let area = 0.5 * e0.cross(&e1).norm();
        total_area += area;

        let n = density * area;
        let whole = n.floor();
        let count = whole as usize + if rng.gen::<FT>() < n - whole { 1 } else { 0 };

        for _ in 0..count {
            let s: FT = rng.gen();
            let t: FT = rng.gen();
            let ss = s.sqrt();
            positions.push(p0 + e0 * (t * ss) + e1 * (1. - ss));
        }
    }

    debug!("generated {} surface samples", positions.len());
    SurfaceSamples { positions, total_area }
}

/** Radius that contains about ten neighbors for `count` points evenly spread over `area`. */
pub fn relaxation_radius(area: FT, count: usize) -> FT {
    assert!(count > 0);
    (area / count as FT * RELAXATION_NEIGHBORS / PI).sqrt()
}

#[derive(Debug, PartialEq, Clone, Copy)]
struct RelaxationPoint {
    p: V3,
}

impl Point for RelaxationPoint {
    type Scalar = FT;

    const DIMENSIONS: usize = 3;

    fn generate(mut generator: impl FnMut(usize) -> Self::Scalar) -> Self {
        RelaxationPoint {
            p: V3::from_iterator((0..3).map(|d| generator(d))),
        }
    }

    fn nth(&self, index: usize) -> Self::Scalar {
        self.p[index]
    }

    fn nth_mut(&mut self, index: usize) -> &mut Self::Scalar {
        &mut self.p[index]
    }
}

type RelaxationElem = GeomWithData<RelaxationPoint, usize>;

/**
 * Evens out a point cloud on the surface of `sdf`.
 *
 * Every iteration pushes points apart with the weight `0.01 * (1 - r^2 / R^2)^3` for all pairs
 * closer than `radius`, then projects every point back onto the zero level set along the
 * gradient. Returns the average neighbor count of each iteration.
 */
pub fn relax_surface_points(
    positions: &mut [V3],
    radius: FT,
    sdf: &SignedDistanceField,
    iterations: usize,
) -> Vec<FT> {
    let radius2 = radius * radius;
    let mut displacements = vec![V3::zeros(); positions.len()];
    let mut neighbor_counts = vec![0usize; positions.len()];
    let mut avg_neighbors = Vec::with_capacity(iterations);

    if positions.is_empty() {
        return avg_neighbors;
    }

    for iteration in 0..iterations {
        let rtree = RTree::<RelaxationElem>::bulk_load(
            positions
                .iter()
                .enumerate()
                .map(|(idx, &p)| RelaxationElem::new(RelaxationPoint { p }, idx))
                .collect(),
        );

        {
            let positions = &*positions;
            par_iter_mut2(&mut displacements, &mut neighbor_counts, |i, p_displacement, p_count| {
                let pi = positions[i];
                let mut displacement = V3::zeros();
                let mut count = 0;

                for neigh in rtree.locate_within_distance(RelaxationPoint { p: pi }, radius2) {
                    let j = neigh.data;
                    let r = positions[j] - pi;
                    let r2 = r.norm_squared();
                    if j == i || r2 >= radius2 || r2 == 0. {
                        continue;
                    }
                    let w = 1. - r2 / radius2;
                    displacement -= r * (RELAXATION_STEP * w * w * w / r2.sqrt());
                    count += 1;
                }

                *p_displacement = displacement;
                *p_count = count;
            });
        }

        par_iter_mut1(positions, |i, p| {
            let moved = *p + displacements[i];
            let v = sdf.to_voxel_space(moved);
            *p = match sdf.gradient(v).try_normalize(0.) {
                Some(n) => moved - n * sdf.trilinear(v),
                None => moved,
            };
        });

        let avg = neighbor_counts.iter().sum::<usize>() as FT / positions.len() as FT;
        debug!("relaxation iteration {}: avg neighbors = {:.2}", iteration, avg);
        avg_neighbors.push(avg);
    }

    avg_neighbors
}

/** Normalized SDF gradient at every position (zero where the gradient vanishes). */
pub fn surface_normals(positions: &[V3], sdf: &SignedDistanceField) -> Vec<V3> {
    let mut normals = vec![V3::zeros(); positions.len()];
    par_iter_mut1(&mut normals, |i, n| {
        *n = sdf
            .gradient(sdf.to_voxel_space(positions[i]))
            .try_normalize(0.)
            .unwrap_or_else(V3::zeros);
    });
    normals
}

/**
 * Static surface particles evenly distributed over a closed mesh, with normals from the signed
 * distance field. `cells` is the SDF resolution along the longest axis of the mesh.
 */
pub fn generate_surface_particles_mesh(mesh: &Mesh, particle_radius: FT, cells: usize) -> anyhow::Result<ParticleSet> {
    debug!("building signed distance field with {} cells", cells);
    let sdf = surface_sdf(mesh, cells).context("cannot place surface particles")?;

    let mut rng = StdRng::seed_from_u64(SURFACE_SAMPLING_SEED);
    let SurfaceSamples {
        mut positions,
        total_area,
    } = sample_mesh_surface(mesh, particle_radius, &mut rng);

    if !positions.is_empty() {
        let radius = relaxation_radius(total_area, positions.len());
        relax_surface_points(&mut positions, radius, &sdf, RELAXATION_ITERATIONS);
    }

    let normals = surface_normals(&positions, &sdf);
    Ok(ParticleSet { positions, normals })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assert_ft_approx_eq;

    #[test]
    fn box_voxelization_is_inclusive() {
        let spacing = 0.25;
        let bounds = Aabb::new(vec3f(0., 0., 0.), V3::repeat(2. * spacing));
        let mut positions = Vec::new();
        voxelize_box(&bounds, spacing, &mut positions);
        assert_eq!(positions.len(), 27);
        assert!(positions.iter().all(|p| bounds.contains(*p)));
    }

    #[test]
    fn box_voxelization_uses_global_lattice() {
        // shifted by a fraction of the spacing the box only covers two lattice planes per axis
        let spacing = 0.25;
        let bounds = Aabb::new(V3::repeat(0.1), V3::repeat(0.6));
        let mut positions = Vec::new();
        voxelize_box(&bounds, spacing, &mut positions);
        assert_eq!(positions.len(), 8);
        assert!(positions.contains(&V3::repeat(0.25)));
    }

    #[test]
    fn sphere_voxelization() {
        let mut positions = Vec::new();
        voxelize_sphere(vec3f(0., 0., 0.), 1., 1., &mut positions);
        // center plus the six axis neighbors
        assert_eq!(positions.len(), 7);
    }

    #[test]
    fn box_surface_is_a_closed_shell() {
        let bounds = Aabb::new(vec3f(0., 0., 0.), vec3f(1., 1., 1.));
        let set = generate_surface_particles_box(&bounds, 0.125);
        let n = 4;
        assert_eq!(set.len(), 6 * n * n + 2);
        assert_eq!(set.normals.len(), set.len());

        let center = bounds.center();
        for (p, normal) in set.positions.iter().zip(set.normals.iter()) {
            let on_face = (0..3).any(|d| p[d] == bounds.min[d] || p[d] == bounds.max[d]);
            assert!(on_face, "{:?} not on the box surface", p);
            assert_ft_approx_eq(normal.norm(), 1., 1e-5, || "unit normal".into());
            assert!(normal.dot(&(p - center)) > 0., "normal {:?} at {:?} points inwards", normal, p);
        }

        let mut sorted: Vec<[i64; 3]> = set
            .positions
            .iter()
            .map(|p| [0, 1, 2].map(|d| (p[d] * 1000.).round() as i64))
            .collect();
        sorted.sort();
        sorted.dedup();
        assert_eq!(sorted.len(), set.len(), "duplicate shell particles");
    }

    #[test]
    fn box_surface_corner_normals_are_diagonals() {
        let bounds = Aabb::new(vec3f(0., 0., 0.), vec3f(1., 2., 3.));
        let set = generate_surface_particles_box(&bounds, 0.1);
        let idx = set
            .positions
            .iter()
            .position(|p| (p - bounds.max).norm() < 1e-5)
            .unwrap();
        let expected = V3::repeat(1.).normalize();
        assert!((set.normals[idx] - expected).norm() < 1e-5);
    }

    #[test]
    fn relaxation_radius_targets_ten_neighbors() {
        let r = relaxation_radius(PI, 10);
        assert_ft_approx_eq(r, 1., 1e-6, || "radius".into());
    }
}
