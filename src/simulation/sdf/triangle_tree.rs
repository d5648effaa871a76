use rstar::{ParentNode, PointDistance, RTree, RTreeNode, RTreeObject, AABB};

use crate::{
    floating_type_mod::{FT, PI},
    mesh::Mesh,
    V3,
};

use super::mesh_sdf::{closest_point_on_triangle, solid_angle};

// clusters farther away than this many cluster radii are replaced by their dipole
const FAR_FIELD_FACTOR: FT = 3.;

fn to_array(v: V3) -> [FT; 3] {
    [v.x, v.y, v.z]
}

struct MeshTriangle {
    a: V3,
    b: V3,
    c: V3,
    // area times unit normal
    area_normal: V3,
    area: FT,
}

impl MeshTriangle {
    fn new(a: V3, b: V3, c: V3) -> MeshTriangle {
        let area_normal = (b - a).cross(&(c - a)) * 0.5;
        MeshTriangle {
            a,
            b,
            c,
            area_normal,
            area: area_normal.norm(),
        }
    }

    fn centroid(&self) -> V3 {
        (self.a + self.b + self.c) / 3.
    }
}

impl RTreeObject for MeshTriangle {
    type Envelope = AABB<[FT; 3]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_corners(
            to_array(self.a.inf(&self.b).inf(&self.c)),
            to_array(self.a.sup(&self.b).sup(&self.c)),
        )
    }
}

impl PointDistance for MeshTriangle {
    fn distance_2(&self, point: &[FT; 3]) -> FT {
        let p: V3 = (*point).into();
        (closest_point_on_triangle(p, self.a, self.b, self.c) - p).norm_squared()
    }
}

/// Aggregated triangles below one tree node, in pre-order of the tree.
#[derive(Debug, Clone, Copy)]
struct Cluster {
    area_normal: V3,
    center: V3,
    radius: FT,
    // index after the last cluster of this subtree
    end: usize,
}

/**
 * Bounding volume hierarchy over the triangles of a mesh for closest point queries and fast
 * generalized winding numbers.
 *
 * The winding number sums exact solid angles of nearby triangles and approximates distant
 * subtrees by the dipole of their area weighted normals ("Fast Winding Numbers for Soups and
 * Clouds", Barill et al. 2018). Only the inside test relies on it, which has a `0.5` threshold.
 */
pub struct TriangleTree {
    tree: RTree<MeshTriangle>,
    clusters: Vec<Cluster>,
}

impl TriangleTree {
    pub fn new(mesh: &Mesh) -> TriangleTree {
        let triangles = (0..mesh.num_triangles())
            .map(|t| {
                let (a, b, c) = mesh.triangle(t);
                MeshTriangle::new(a, b, c)
            })
            .collect();
        let tree = RTree::bulk_load(triangles);

        let mut clusters = Vec::new();
        build_clusters(tree.root(), &mut clusters);

        TriangleTree { tree, clusters }
    }

    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }

    /** Closest point on the mesh surface, `None` for meshes without triangles. */
    pub fn closest_point(&self, p: V3) -> Option<V3> {
        self.tree
            .nearest_neighbor(&to_array(p))
            .map(|t| closest_point_on_triangle(p, t.a, t.b, t.c))
    }

    pub fn unsigned_distance(&self, p: V3) -> FT {
        self.closest_point(p).map_or(FT::INFINITY, |q| (q - p).norm())
    }

    /**
     * Generalized winding number around `p`: close to 1 inside closed outward facing meshes
     * (-1 for inward facing ones), close to 0 outside.
     */
    pub fn winding_number(&self, p: V3) -> FT {
        if self.is_empty() {
            return 0.;
        }
        self.solid_angle_sum(self.tree.root(), 0, p) / (4. * PI)
    }

    pub fn is_inside(&self, p: V3) -> bool {
        self.winding_number(p).abs() > 0.5
    }

    fn solid_angle_sum(&self, node: &ParentNode<MeshTriangle>, cluster_idx: usize, p: V3) -> FT {
        let cluster = &self.clusters[cluster_idx];
        let d = cluster.center - p;
        let dist = d.norm();
        if dist > FAR_FIELD_FACTOR * cluster.radius {
            return cluster.area_normal.dot(&d) / (dist * dist * dist);
        }

        let mut sum = 0.;
        let mut child_idx = cluster_idx + 1;
        for child in node.children() {
            match child {
                RTreeNode::Leaf(t) => sum += solid_angle(p, t.a, t.b, t.c),
                RTreeNode::Parent(parent) => {
                    sum += self.solid_angle_sum(parent, child_idx, p);
                    child_idx = self.clusters[child_idx].end;
                }
            }
        }
        sum
    }
}

/// Returns total area and the area weighted centroid sum of the subtree.
fn build_clusters(node: &ParentNode<MeshTriangle>, clusters: &mut Vec<Cluster>) -> (FT, V3) {
    let idx = clusters.len();
    clusters.push(Cluster {
        area_normal: V3::zeros(),
        center: V3::zeros(),
        radius: FT::INFINITY,
        end: idx + 1,
    });

    let mut area_normal = V3::zeros();
    let mut area = 0.;
    let mut weighted_centroids = V3::zeros();
    for child in node.children() {
        match child {
            RTreeNode::Leaf(t) => {
                area_normal += t.area_normal;
                area += t.area;
                weighted_centroids += t.centroid() * t.area;
            }
            RTreeNode::Parent(parent) => {
                let child_idx = clusters.len();
                let (child_area, child_centroids) = build_clusters(parent, clusters);
                area_normal += clusters[child_idx].area_normal;
                area += child_area;
                weighted_centroids += child_centroids;
            }
        }
    }

    let envelope = node.envelope();
    let lower: V3 = envelope.lower().into();
    let upper: V3 = envelope.upper().into();
    let center = if area > 0. {
        weighted_centroids / area
    } else {
        (lower + upper) * 0.5
    };
    // farthest corner of the node bounds
    let radius = V3::from_iterator((0..3).map(|d| FT::max(center[d] - lower[d], upper[d] - center[d]))).norm();

    clusters[idx] = Cluster {
        area_normal,
        center,
        radius,
        end: clusters.len(),
    };
    (area, weighted_centroids)
}
