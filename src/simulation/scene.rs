use std::path::{Path, PathBuf};

use anyhow::{ensure, Context};
use serde::{Deserialize, Serialize};

use crate::{
    aabb::{v3_as_array, Aabb},
    floating_type_mod::FT,
    simulation_parameters::SimulationSettings,
    V3,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneWorld {
    pub bounds: Aabb,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneSphere {
    #[serde(with = "v3_as_array")]
    pub position: V3,
    pub radius: FT,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MeshKind {
    /// voxelized into fluid particles
    Fluid,
    /// sampled into static surface particles
    Boundary,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneMesh {
    /// Wavefront OBJ file, relative to the scene file.
    pub filename: PathBuf,
    pub kind: MeshKind,
}

/**
 * Scene description as read from a YAML file.
 *
 * ```yaml
 * settings: { particle_radius: 0.01, rest_density: 1000.0, gravity: [0, -9.81, 0] }
 * world: { bounds: { min: [0, 0, 0], max: [1, 1, 1] } }
 * boxes: [ { min: [0.1, 0.1, 0.1], max: [0.4, 0.5, 0.4] } ]
 * spheres: [ { position: [0.7, 0.7, 0.5], radius: 0.1 } ]
 * meshes: [ { filename: bunny.obj, kind: boundary } ]
 * ```
 */
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneConfig {
    #[serde(default)]
    pub settings: SimulationSettings,
    pub world: SceneWorld,
    #[serde(default)]
    pub boxes: Vec<Aabb>,
    #[serde(default)]
    pub spheres: Vec<SceneSphere>,
    #[serde(default)]
    pub meshes: Vec<SceneMesh>,
}

impl SceneConfig {
    pub fn from_yaml(source: &str) -> anyhow::Result<SceneConfig> {
        let scene: SceneConfig = serde_yaml::from_str(source).context("failed parsing scene config")?;
        scene.validate()?;
        Ok(scene)
    }

    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<SceneConfig> {
        let path = path.as_ref();
        let source =
            std::fs::read_to_string(path).with_context(|| format!("failed reading scene file `{}`", path.display()))?;
        Self::from_yaml(&source).with_context(|| format!("invalid scene file `{}`", path.display()))
    }

    fn validate(&self) -> anyhow::Result<()> {
        ensure!(
            self.world.bounds.is_valid(),
            "world bounds are empty: min {:?} max {:?}",
            self.world.bounds.min.as_slice(),
            self.world.bounds.max.as_slice()
        );
        for sphere in &self.spheres {
            ensure!(sphere.radius > 0., "sphere radius has to be positive, got {}", sphere.radius);
        }
        Ok(())
    }
}
