use serde::{Deserialize, Serialize};

use crate::{floating_type_mod::FT, V3};

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    #[serde(with = "v3_as_array")]
    pub min: V3,
    #[serde(with = "v3_as_array")]
    pub max: V3,
}

impl Aabb {
    pub fn new(min: V3, max: V3) -> Aabb {
        Aabb { min, max }
    }

    /// An inverted box that every `extend` call will overwrite.
    pub fn empty() -> Aabb {
        Aabb {
            min: V3::repeat(FT::INFINITY),
            max: V3::repeat(FT::NEG_INFINITY),
        }
    }

    pub fn extend(&mut self, p: V3) {
        for d in 0..3 {
            self.min[d] = FT::min(self.min[d], p[d]);
            self.max[d] = FT::max(self.max[d], p[d]);
        }
    }

    pub fn extents(&self) -> V3 {
        self.max - self.min
    }

    pub fn center(&self) -> V3 {
        (self.min + self.max) * 0.5
    }

    /// Grows the box by `delta` on every side.
    pub fn expanded(&self, delta: V3) -> Aabb {
        Aabb {
            min: self.min - delta,
            max: self.max + delta,
        }
    }

    pub fn major_axis(&self) -> usize {
        let e = self.extents();
        if e.x >= e.y && e.x >= e.z {
            0
        } else if e.y >= e.z {
            1
        } else {
            2
        }
    }

    pub fn is_valid(&self) -> bool {
        (0..3).all(|d| self.min[d] < self.max[d])
    }

    pub fn contains(&self, p: V3) -> bool {
        (0..3).all(|d| self.min[d] <= p[d] && p[d] <= self.max[d])
    }
}

/// Scene files store vectors as plain `[x, y, z]` sequences.
pub mod v3_as_array {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    use crate::{floating_type_mod::FT, vec3f, V3};

    pub fn serialize<S: Serializer>(v: &V3, serializer: S) -> Result<S::Ok, S::Error> {
        [v.x, v.y, v.z].serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<V3, D::Error> {
        let [x, y, z] = <[FT; 3]>::deserialize(deserializer)?;
        Ok(vec3f(x, y, z))
    }
}

#[test]
fn aabb_major_axis_and_expansion() {
    use crate::vec3f;

    let b = Aabb::new(vec3f(0., 0., 0.), vec3f(1., 3., 2.));
    assert_eq!(b.major_axis(), 1);

    let e = b.expanded(b.extents() * 0.1);
    crate::assert_ft_approx_eq(e.min.y, -0.3, 1e-6, || "expanded min".into());
    crate::assert_ft_approx_eq(e.max.z, 2.2, 1e-6, || "expanded max".into());
    assert!(e.contains(b.center()));
    assert!(!Aabb::empty().is_valid());
}
