use std::path::Path;

use anyhow::{bail, Context};

use crate::{aabb::Aabb, floating_type_mod::FT, vec3f, V3};

/// Triangle mesh as loaded from disk.
#[derive(Debug, Clone, Default)]
pub struct Mesh {
    pub vertices: Vec<V3>,
    pub triangles: Vec<[u32; 3]>,
}

impl Mesh {
    pub fn new(vertices: Vec<V3>, triangles: Vec<[u32; 3]>) -> Mesh {
        for t in &triangles {
            for &v in t {
                assert!((v as usize) < vertices.len(), "triangle references missing vertex {}", v);
            }
        }
        Mesh { vertices, triangles }
    }

    pub fn compute_bounds(&self) -> Aabb {
        let mut bounds = Aabb::empty();
        for &v in &self.vertices {
            bounds.extend(v);
        }
        bounds
    }

    pub fn triangle(&self, i: usize) -> (V3, V3, V3) {
        let [a, b, c] = self.triangles[i];
        (
            self.vertices[a as usize],
            self.vertices[b as usize],
            self.vertices[c as usize],
        )
    }

    pub fn num_triangles(&self) -> usize {
        self.triangles.len()
    }

    pub fn load_obj(path: impl AsRef<Path>) -> anyhow::Result<Mesh> {
        let path = path.as_ref();
        let source =
            std::fs::read_to_string(path).with_context(|| format!("failed reading mesh file `{}`", path.display()))?;
        Self::parse_obj(&source).with_context(|| format!("failed parsing mesh file `{}`", path.display()))
    }

    /**
     * Minimal Wavefront OBJ reader. Only `v` and `f` records are used; polygons are fan-triangulated
     * and texture/normal indices (`f 1/2/3 ...`) are ignored.
     */
    pub fn parse_obj(source: &str) -> anyhow::Result<Mesh> {
        let mut vertices = Vec::new();
        let mut triangles = Vec::new();

        for (line_idx, line) in source.lines().enumerate() {
            let line_number = line_idx + 1;
            let mut tokens = line.split_whitespace();
            match tokens.next() {
                Some("v") => {
                    let coords = tokens
                        .take(3)
                        .map(|t| t.parse::<FT>())
                        .collect::<Result<Vec<FT>, _>>()
                        .with_context(|| format!("line {}: invalid vertex coordinate", line_number))?;
                    if coords.len() != 3 {
                        bail!("line {}: vertex needs three coordinates", line_number);
                    }
                    vertices.push(vec3f(coords[0], coords[1], coords[2]));
                }
                Some("f") => {
                    let mut face = Vec::new();
                    for token in tokens {
                        let index_str = token.split('/').next().unwrap_or(token);
                        let index: i64 = index_str
                            .parse()
                            .with_context(|| format!("line {}: invalid face index `{}`", line_number, token))?;
                        // OBJ indices are 1-based, negative ones count from the end
                        let resolved = if index < 0 {
                            vertices.len() as i64 + index
                        } else {
                            index - 1
                        };
                        if resolved < 0 || resolved >= vertices.len() as i64 {
                            bail!("line {}: face index {} out of range", line_number, index);
                        }
                        face.push(resolved as u32);
                    }
                    if face.len() < 3 {
                        bail!("line {}: face needs at least three vertices", line_number);
                    }
                    for k in 1..face.len() - 1 {
                        triangles.push([face[0], face[k], face[k + 1]]);
                    }
                }
                _ => {}
            }
        }

        Ok(Mesh { vertices, triangles })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_quad_and_triangle() {
        let source = "\
# a unit quad and one extra triangle
v 0 0 0
v 1 0 0
v 1 1 0
v 0 1 0
vn 0 0 1
f 1/1/1 2/2/1 3/3/1 4/4/1
f -4 -3 -1
";
        let mesh = Mesh::parse_obj(source).unwrap();
        assert_eq!(mesh.vertices.len(), 4);
        assert_eq!(mesh.triangles, vec![[0, 1, 2], [0, 2, 3], [0, 1, 3]]);

        let bounds = mesh.compute_bounds();
        assert_eq!(bounds.min, vec3f(0., 0., 0.));
        assert_eq!(bounds.max, vec3f(1., 1., 0.));
    }

    #[test]
    fn reject_out_of_range_index() {
        let err = Mesh::parse_obj("v 0 0 0\nv 1 0 0\nf 1 2 3\n").unwrap_err();
        assert!(format!("{:#}", err).contains("out of range"));
    }

    #[test]
    fn reject_malformed_vertex() {
        assert!(Mesh::parse_obj("v 0 zero 0\n").is_err());
        assert!(Mesh::parse_obj("v 0 0\n").is_err());
    }
}
