use crate::{floating_type_mod::FT, V, V3};

/**
 * Values stored on the nodes of a regular lattice `origin + cell_size * (x, y, z)`.
 *
 * "Voxel space" is the continuous lattice coordinate, i.e. node `(x, y, z)` sits at voxel space
 * position `(x, y, z)`.
 */
#[derive(Debug, Clone)]
pub struct VoxelGrid<T> {
    size: V<usize, 3>,
    origin: V3,
    cell_size: FT,
    data: Vec<T>,
}

impl<T: Clone + Default> VoxelGrid<T> {
    pub fn new(size: V<usize, 3>, origin: V3, cell_size: FT) -> Self {
        assert!(size.iter().all(|&s| s >= 2), "voxel grid needs at least two nodes per axis");
        assert!(cell_size > 0.);
        VoxelGrid {
            size,
            origin,
            cell_size,
            data: vec![T::default(); size.x * size.y * size.z],
        }
    }
}

impl<T> VoxelGrid<T> {
    pub fn size(&self) -> V<usize, 3> {
        self.size
    }

    pub fn origin(&self) -> V3 {
        self.origin
    }

    pub fn cell_size(&self) -> FT {
        self.cell_size
    }

    pub fn data_mut(&mut self) -> &mut [T] {
        &mut self.data
    }

    #[inline(always)]
    fn index(&self, x: usize, y: usize, z: usize) -> usize {
        (z * self.size.y + y) * self.size.x + x
    }

    pub fn node_of_index(&self, idx: usize) -> V<usize, 3> {
        let x = idx % self.size.x;
        let y = (idx / self.size.x) % self.size.y;
        let z = idx / (self.size.x * self.size.y);
        [x, y, z].into()
    }

    pub fn get(&self, x: usize, y: usize, z: usize) -> &T {
        &self.data[self.index(x, y, z)]
    }

    pub fn node_position(&self, node: V<usize, 3>) -> V3 {
        self.origin + node.map(|x| x as FT) * self.cell_size
    }

    pub fn to_voxel_space(&self, p: V3) -> V3 {
        (p - self.origin) / self.cell_size
    }

    pub fn to_world_space(&self, p: V3) -> V3 {
        self.origin + p * self.cell_size
    }
}

impl VoxelGrid<FT> {
    /**
     * Trilinear interpolation at a voxel space position. Positions outside the grid are
     * clamped to the border.
     */
    pub fn trilinear(&self, p: V3) -> FT {
        let mut base = [0usize; 3];
        let mut frac = [0. as FT; 3];
        for d in 0..3 {
            let max_cell = (self.size[d] - 2) as FT;
            let c = FT::min(FT::max(p[d], 0.), max_cell + 1.);
            let b = FT::min(c.floor(), max_cell);
            base[d] = b as usize;
            frac[d] = c - b;
        }

        let [x, y, z] = base;
        let [fx, fy, fz] = frac;

        let lerp = |a: FT, b: FT, t: FT| a + (b - a) * t;

        let c00 = lerp(*self.get(x, y, z), *self.get(x + 1, y, z), fx);
        let c10 = lerp(*self.get(x, y + 1, z), *self.get(x + 1, y + 1, z), fx);
        let c01 = lerp(*self.get(x, y, z + 1), *self.get(x + 1, y, z + 1), fx);
        let c11 = lerp(*self.get(x, y + 1, z + 1), *self.get(x + 1, y + 1, z + 1), fx);

        lerp(lerp(c00, c10, fy), lerp(c01, c11, fy), fz)
    }

    /**
     * Central difference gradient of the trilinear field at a voxel space position.
     *
     * The result is in world units (value per meter). It is NOT normalized.
     */
    pub fn gradient(&self, p: V3) -> V3 {
        let eps: FT = 0.5;
        let inv = 1. / (2. * eps * self.cell_size);

        V3::from_iterator((0..3).map(|d| {
            let mut xp = p;
            let mut xn = p;
            xp[d] += eps;
            xn[d] -= eps;
            (self.trilinear(xp) - self.trilinear(xn)) * inv
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{assert_ft_approx_eq, vec3f};

    fn linear_grid() -> VoxelGrid<FT> {
        // f(x, y, z) = 2x - y + 0.5z in world space
        let mut grid = VoxelGrid::<FT>::new([5, 4, 6].into(), vec3f(-1., 0., 2.), 0.25);
        for idx in 0..grid.data_mut().len() {
            let p = grid.node_position(grid.node_of_index(idx));
            grid.data_mut()[idx] = 2. * p.x - p.y + 0.5 * p.z;
        }
        grid
    }

    #[test]
    fn trilinear_reproduces_linear_fields() {
        let grid = linear_grid();
        for p in [vec3f(-0.9, 0.3, 2.1), vec3f(-0.13, 0.7, 3.0), vec3f(-0.5, 0.5, 2.5)] {
            let v = grid.trilinear(grid.to_voxel_space(p));
            assert_ft_approx_eq(v, 2. * p.x - p.y + 0.5 * p.z, 1e-5, || format!("trilinear at {:?}", p));
        }
    }

    #[test]
    fn gradient_is_in_world_units() {
        let grid = linear_grid();
        let g = grid.gradient(grid.to_voxel_space(vec3f(-0.5, 0.4, 2.6)));
        assert_ft_approx_eq(g.x, 2., 1e-4, || "gradient x".into());
        assert_ft_approx_eq(g.y, -1., 1e-4, || "gradient y".into());
        assert_ft_approx_eq(g.z, 0.5, 1e-4, || "gradient z".into());
    }

    #[test]
    fn voxel_space_round_trip() {
        let grid = linear_grid();
        let p = vec3f(0.1, 0.2, 0.3);
        let q = grid.to_world_space(grid.to_voxel_space(p));
        assert!((p - q).norm() < 1e-5);
    }
}
