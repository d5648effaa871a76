use crate::{aabb::Aabb, floating_type_mod::FT, vec3f, V3};

/**
 * Half space `dir · x + delta >= 0`. The probe is positive on the side `dir` points to.
 */
#[derive(Debug, Clone, Copy)]
pub struct SdfPlane {
    pub dir: V3,
    pub delta: FT,
}

impl SdfPlane {
    pub fn new(dir: V3, delta: FT) -> SdfPlane {
        Self { dir, delta }
    }

    /**
     * The six walls of a box with their normals pointing into the box, in the
     * order -x, +x, -y, +y, -z, +z.
     */
    pub fn new_boundary_box(bounds: Aabb) -> [SdfPlane; 6] {
        let min = bounds.min;
        let max = bounds.max;
        [
            SdfPlane::new(vec3f(1., 0., 0.), -min.x),
            SdfPlane::new(vec3f(-1., 0., 0.), max.x),
            SdfPlane::new(vec3f(0., 1., 0.), -min.y),
            SdfPlane::new(vec3f(0., -1., 0.), max.y),
            SdfPlane::new(vec3f(0., 0., 1.), -min.z),
            SdfPlane::new(vec3f(0., 0., -1.), max.z),
        ]
    }

    pub fn probe(&self, x: V3) -> FT {
        self.dir.dot(&x) + self.delta
    }

    /** How far `x` lies behind the plane, if it does. */
    pub fn penetration(&self, x: V3) -> Option<FT> {
        let d = -self.probe(x);
        if d > 0. {
            Some(d)
        } else {
            None
        }
    }
}

#[test]
fn boundary_box_planes_face_inwards() {
    let bounds = Aabb::new(vec3f(-1., 0., 2.), vec3f(1., 3., 4.));
    let center = bounds.center();
    for plane in SdfPlane::new_boundary_box(bounds) {
        assert!(plane.probe(center) > 0.);
        assert!(plane.penetration(center).is_none());
    }

    let planes = SdfPlane::new_boundary_box(bounds);
    assert_eq!(planes[0].penetration(vec3f(-1.5, 1., 3.)), Some(0.5));
    assert_eq!(planes[3].penetration(vec3f(0., 3.25, 3.)), Some(0.25));
}
