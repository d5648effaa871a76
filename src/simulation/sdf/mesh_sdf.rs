use crate::{aabb::Aabb, concurrency::par_iter_mut1, floating_type_mod::FT, mesh::Mesh, V, V3};

use super::{TriangleTree, VoxelGrid};

/**
 * Closest point on triangle `abc` to `p` ("Real-Time Collision Detection", Ericson, 5.1.5).
 */
pub fn closest_point_on_triangle(p: V3, a: V3, b: V3, c: V3) -> V3 {
    let ab = b - a;
    let ac = c - a;
    let ap = p - a;
    let d1 = ab.dot(&ap);
    let d2 = ac.dot(&ap);
    if d1 <= 0. && d2 <= 0. {
        return a;
    }

    let bp = p - b;
    let d3 = ab.dot(&bp);
    let d4 = ac.dot(&bp);
    if d3 >= 0. && d4 <= d3 {
        return b;
    }

    let vc = d1 * d4 - d3 * d2;
    if vc <= 0. && d1 >= 0. && d3 <= 0. {
        let v = d1 / (d1 - d3);
        return a + ab * v;
    }

    let cp = p - c;
    let d5 = ab.dot(&cp);
    let d6 = ac.dot(&cp);
    if d6 >= 0. && d5 <= d6 {
        return c;
    }

    let vb = d5 * d2 - d1 * d6;
    if vb <= 0. && d2 >= 0. && d6 <= 0. {
        let w = d2 / (d2 - d6);
        return a + ac * w;
    }

    let va = d3 * d6 - d5 * d4;
    if va <= 0. && (d4 - d3) >= 0. && (d5 - d6) >= 0. {
        let w = (d4 - d3) / ((d4 - d3) + (d5 - d6));
        return b + (c - b) * w;
    }

    let denom = 1. / (va + vb + vc);
    let v = vb * denom;
    let w = vc * denom;
    a + ab * v + ac * w
}

/**
 * Signed solid angle of triangle `abc` seen from `p` (Van Oosterom & Strackee).
 */
pub(super) fn solid_angle(p: V3, a: V3, b: V3, c: V3) -> FT {
    let a = a - p;
    let b = b - p;
    let c = c - p;
    let la = a.norm();
    let lb = b.norm();
    let lc = c.norm();
    let numerator = a.dot(&b.cross(&c));
    let denominator = la * lb * lc + a.dot(&b) * lc + a.dot(&c) * lb + b.dot(&c) * la;
    2. * FT::atan2(numerator, denominator)
}

/**
 * Signed distance field of a triangle mesh sampled on a voxel grid. Negative inside, positive
 * outside. Open meshes are allowed, the inside test uses the generalized winding number.
 */
#[derive(Debug, Clone)]
pub struct SignedDistanceField {
    grid: VoxelGrid<FT>,
}

impl SignedDistanceField {
    /**
     * Samples the mesh on a grid covering `bounds` with `cells` cells along the longest axis.
     */
    pub fn build(mesh: &Mesh, bounds: Aabb, cells: usize) -> SignedDistanceField {
        assert!(cells > 0);
        assert!(bounds.is_valid(), "cannot build signed distance field over empty bounds");

        let extents = bounds.extents();
        let cell_size = extents[bounds.major_axis()] / cells as FT;
        let size: V<usize, 3> = extents.map(|e| (e / cell_size).ceil() as usize + 1);

        let mut grid = VoxelGrid::<FT>::new(size.map(|s| usize::max(s, 2)), bounds.min, cell_size);

        let triangles = TriangleTree::new(mesh);
        let nodes = grid.clone();
        par_iter_mut1(grid.data_mut(), |idx, value| {
            let p = nodes.node_position(nodes.node_of_index(idx));
            let dist = triangles.unsigned_distance(p);
            *value = if triangles.is_inside(p) { -dist } else { dist };
        });

        SignedDistanceField { grid }
    }

    pub fn grid(&self) -> &VoxelGrid<FT> {
        &self.grid
    }

    pub fn cell_size(&self) -> FT {
        self.grid.cell_size()
    }

    pub fn to_voxel_space(&self, p: V3) -> V3 {
        self.grid.to_voxel_space(p)
    }

    /** Signed distance at a voxel space position. */
    pub fn trilinear(&self, p: V3) -> FT {
        self.grid.trilinear(p)
    }

    /** Unnormalized gradient at a voxel space position. */
    pub fn gradient(&self, p: V3) -> V3 {
        self.grid.gradient(p)
    }

    /** Signed distance at a world space position. */
    pub fn probe(&self, p: V3) -> FT {
        self.trilinear(self.to_voxel_space(p))
    }
}
