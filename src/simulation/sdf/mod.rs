pub use self::{
    mesh_sdf::{closest_point_on_triangle, SignedDistanceField},
    sdf_plane::SdfPlane,
    triangle_tree::TriangleTree,
    voxel_grid::VoxelGrid,
};

mod mesh_sdf;
mod sdf_plane;
mod triangle_tree;
mod voxel_grid;
