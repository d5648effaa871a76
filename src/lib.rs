/*!
Weakly compressible SPH simulation of free-surface fluids.

The fluid is set up from a YAML scene (boxes, spheres and meshes) and advanced with
[`FluidSimulation::advance`]. Static boundary particles are generated for the world box and for
boundary meshes.
*/

mod platform;
mod simulation;

pub use simulation::*;

pub use platform::start;
