use std::{fmt::Display, path::Path};

use anyhow::Context;
use log::{debug, info, trace};
use num_traits::Float;

use crate::{
    aabb::Aabb,
    concurrency::{par_iter_mut1, par_iter_mut1_gather, par_iter_mut2},
    counters::{PerformanceCounters, ValueCounters},
    flatten_points,
    floating_type_mod::FT,
    mesh::Mesh,
    neighborhood_search::UniformGrid,
    particle_generator::{
        generate_surface_particles_box, generate_surface_particles_mesh, voxelize_box, voxelize_mesh,
        voxelize_sphere, ParticleSet, DEFAULT_SDF_CELLS,
    },
    scene::{MeshKind, SceneConfig},
    sdf::SdfPlane,
    simulation_parameters::{
        Parameters, SimulationParams, COLLAPSE_NUDGE, MIN_INTERACTION_DISTANCE_SQ, RESTITUTION, SURFACE_TENSION,
        VISCOSITY, VISCOSITY_MIN_DENSITY,
    },
    sph_kernels::Kernels,
    V3,
};

macro_rules! decl_particle_vec {
    (pub struct $struct_name:ident { $(pub $field_name:ident: Vec<$field_type:ty> | $default_value:expr),*$(,)?  }) => {
        pub struct $struct_name {
            $(
                pub $field_name : Vec<$field_type>,
            )*
        }

        impl $struct_name {
            pub fn len(&self) -> usize {
                self.position.len()
            }

            pub fn is_empty(&self) -> bool {
                self.position.is_empty()
            }

            /**
             * Reorders every attribute so that the new element `k` is the old element `order[k]`.
             */
            pub fn permute(&mut self, order: &[usize]) {
                $(
                    assert_eq!(self.$field_name.len(), order.len());
                    self.$field_name = order.iter().map(|&i| self.$field_name[i].clone()).collect();
                )*
            }

            pub fn default(len: usize) -> Self {
                Self {
                    $(
                        $field_name: (0..len).map(|_| $default_value).collect::<Vec<$field_type>>(),
                    )*
                }
            }
        }
    }
}

decl_particle_vec! {
    pub struct ParticleVec {
        pub position: Vec<V3> | V3::zeros(),
        pub velocity: Vec<V3> | V3::zeros(),

        // color field gradient scaled by the kernel radius ("Versatile Surface Tension and Adhesion for SPH Fluids")
        pub normal: Vec<V3> | V3::zeros(),

        pub force: Vec<V3> | V3::zeros(),
        pub density: Vec<FT> | 0.,
        pub pressure: Vec<FT> | 0.,
    }
}

/**
 * Symmetric WCSPH pressure force that particle `j` exerts on particle `i`.
 *
 * `r` is `x_i - x_j` and `rn` its length, which has to be non-zero.
 */
#[inline(always)]
pub fn pressure_force(
    params: &SimulationParams,
    kernels: &Kernels,
    r: V3,
    rn: FT,
    pressure_i: FT,
    density_i: FT,
    pressure_j: FT,
    density_j: FT,
) -> V3 {
    let p = pressure_i / (density_i * density_i) + pressure_j / (density_j * density_j);
    -kernels.spiky_grad(r, rn) * (params.particle_mass2 * p * kernels.spiky_grad_constant)
}

/**
 * Weakly compressible free-surface fluid. Fluid particles interact through pressure, viscosity and
 * surface tension and are kept inside the world bounds by six walls. The boundary particles are static
 * and only provided for output.
 */
pub struct FluidSimulation {
    pub particles: ParticleVec,
    boundary: ParticleSet,

    params: SimulationParams,
    kernels: Kernels,
    bounds: Aabb,
    walls: [SdfPlane; 6],
    grid: UniformGrid,

    time: FT,
    step_number: usize,

    pcounters: PerformanceCounters,
    vcounters: ValueCounters,
}

impl FluidSimulation {
    /**
     * Builds the initial particle layout of a scene. Mesh paths are resolved relative to `base_dir`.
     */
    pub fn new(scene: &SceneConfig, base_dir: &Path, counters_enabled: bool) -> anyhow::Result<FluidSimulation> {
        let params = SimulationParams::new(scene.settings)?;
        let bounds = scene.world.bounds;

        let mut fluid_positions = Vec::new();
        let mut boundary = ParticleSet::default();

        for b in &scene.boxes {
            voxelize_box(b, params.particle_diameter, &mut fluid_positions);
        }
        for sphere in &scene.spheres {
            voxelize_sphere(sphere.position, sphere.radius, params.particle_diameter, &mut fluid_positions);
        }
        for scene_mesh in &scene.meshes {
            let path = base_dir.join(&scene_mesh.filename);
            let mesh = Mesh::load_obj(&path)?;
            info!(
                "loaded mesh `{}` ({} vertices, {} triangles)",
                path.display(),
                mesh.vertices.len(),
                mesh.num_triangles()
            );
            match scene_mesh.kind {
                MeshKind::Fluid => voxelize_mesh(&mesh, params.particle_diameter, &mut fluid_positions),
                MeshKind::Boundary => boundary.append(
                    generate_surface_particles_mesh(&mesh, params.particle_radius, DEFAULT_SDF_CELLS)
                        .with_context(|| format!("invalid boundary mesh `{}`", path.display()))?,
                ),
            }
        }

        boundary.append(generate_surface_particles_box(&bounds, params.particle_radius));

        Ok(Self::from_parts(params, bounds, fluid_positions, boundary, counters_enabled))
    }

    /** Loads a scene file and builds the simulation from it. */
    pub fn from_scene_file(path: impl AsRef<Path>, counters_enabled: bool) -> anyhow::Result<FluidSimulation> {
        let path = path.as_ref();
        let scene = SceneConfig::load(path)?;
        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        Self::new(&scene, base_dir, counters_enabled)
            .with_context(|| format!("failed setting up scene `{}`", path.display()))
    }

    pub fn from_parts(
        params: SimulationParams,
        bounds: Aabb,
        fluid_positions: Vec<V3>,
        boundary: ParticleSet,
        counters_enabled: bool,
    ) -> FluidSimulation {
        assert!(bounds.is_valid(), "simulation bounds are empty");
        assert_eq!(boundary.positions.len(), boundary.normals.len());

        debug!("particle_radius = {}", params.particle_radius);
        debug!("kernel_radius = {}", params.kernel_radius);
        debug!("kernel_support_particles = {}", params.kernel_support_particles);
        debug!("rest_density = {}", params.rest_density);
        debug!("particle_mass = {}", params.particle_mass);
        debug!("gravity = {:?}", params.gravity.as_slice());
        debug!("wcsph.gamma = {}", params.wcsph.gamma);
        debug!("wcsph.cs = {}", params.wcsph.cs);
        debug!("wcsph.B = {}", params.wcsph.b);
        debug!("wcsph.viscosity = {}", params.wcsph.viscosity);
        debug!("wcsph.dt = {}", params.wcsph.dt);

        info!(
            "{} fluid particles, {} boundary particles",
            fluid_positions.len(),
            boundary.len()
        );

        let mut particles = ParticleVec::default(fluid_positions.len());
        particles.position = fluid_positions;

        FluidSimulation {
            particles,
            boundary,
            kernels: Kernels::new(params.kernel_radius),
            grid: UniformGrid::new(bounds, params.kernel_radius),
            walls: SdfPlane::new_boundary_box(bounds),
            bounds,
            params,
            time: 0.,
            step_number: 0,
            pcounters: PerformanceCounters::new(counters_enabled),
            vcounters: ValueCounters::new(counters_enabled),
        }
    }

    /**
     * Advances the simulation by `dt`. The particle order changes in every call, so indices must not be
     * kept across calls.
     *
     * `dt` is not checked against `max_timestep`.
     */
    pub fn advance(&mut self, dt: FT) {
        self.time += dt;
        self.step_number += 1;
        trace!("step {} (t = {}, dt = {})", self.step_number, self.time, dt);

        self.pcounters.begin("grid-update");
        let order = self.grid.rebuild(&self.particles.position);
        self.particles.permute(&order);
        self.pcounters.end("grid-update");

        let params = &self.params;
        let kernels = &self.kernels;
        let grid = &self.grid;
        let particles = &mut self.particles;

        self.pcounters.begin("density-update");
        Self::compute_densities(
            params,
            kernels,
            grid,
            &particles.position,
            &mut particles.density,
            &mut particles.pressure,
        );
        self.pcounters.end("density-update");

        self.pcounters.begin("normal-update");
        Self::compute_normals(
            params,
            kernels,
            grid,
            &particles.position,
            &particles.density,
            &mut particles.normal,
        );
        self.pcounters.end("normal-update");

        self.pcounters.begin("force-update");
        let nudged = Self::compute_forces(
            params,
            kernels,
            grid,
            &particles.position,
            &particles.velocity,
            &particles.normal,
            &particles.density,
            &particles.pressure,
            &mut particles.force,
        );
        // coincident particles are separated after the force pass, so every particle saw the same positions
        for &j in &nudged {
            particles.position[j] += V3::repeat(COLLAPSE_NUDGE);
        }
        if !nudged.is_empty() {
            debug!("separated {} coincident particles", nudged.len());
        }
        self.pcounters.end("force-update");

        self.pcounters.begin("integrate");
        Self::integrate(params, dt, &particles.force, &mut particles.velocity, &mut particles.position);
        self.pcounters.end("integrate");

        self.pcounters.begin("collision-update");
        Self::resolve_collisions(&self.walls, &mut particles.position, &mut particles.velocity);
        self.pcounters.end("collision-update");

        if self.pcounters.is_enabled() {
            let max_speed = particles.velocity.iter().map(|v| v.norm()).fold(0., FT::max);
            let avg_density = if particles.is_empty() {
                0.
            } else {
                particles.density.iter().sum::<FT>() / particles.len() as FT
            };
            self.vcounters.add_value("particle-count", particles.len() as FT);
            self.vcounters.add_value("max-speed", max_speed);
            self.vcounters.add_value("avg-density", avg_density);
        }
    }

    /** Visits every `j` with `|x - x_j|^2 < h^2` together with `x - x_j` and the squared distance. */
    #[inline(always)]
    fn for_each_neighbor(
        params: &SimulationParams,
        grid: &UniformGrid,
        position: &[V3],
        x: V3,
        mut f: impl FnMut(usize, V3, FT),
    ) {
        grid.query_radius(x, params.kernel_radius, |j| {
            let r = x - position[j];
            let r2 = r.norm_squared();
            if r2 < params.kernel_radius2 {
                f(j, r, r2);
            }
        });
    }

    /** Density including the self contribution, and Tait pressure. */
    fn compute_densities(
        params: &SimulationParams,
        kernels: &Kernels,
        grid: &UniformGrid,
        position: &[V3],
        density: &mut [FT],
        pressure: &mut [FT],
    ) {
        par_iter_mut2(density, pressure, |i, p_density, p_pressure| {
            let mut sum = 0.;
            Self::for_each_neighbor(params, grid, position, position[i], |_j, _r, r2| {
                sum += kernels.poly6(r2);
            });
            let d = sum * params.particle_mass * kernels.poly6_constant;

            *p_density = d;
            *p_pressure = params.pressure(d);
        });
    }

    fn compute_normals(
        params: &SimulationParams,
        kernels: &Kernels,
        grid: &UniformGrid,
        position: &[V3],
        density: &[FT],
        normal: &mut [V3],
    ) {
        par_iter_mut1(normal, |i, p_normal| {
            let mut n = V3::zeros();
            Self::for_each_neighbor(params, grid, position, position[i], |j, r, r2| {
                n += kernels.poly6_grad(r, r2) / density[j];
            });
            *p_normal = n * (params.kernel_radius * params.particle_mass * kernels.poly6_grad_constant);
        });
    }

    /**
     * Pressure, viscosity, cohesion, curvature and gravity forces.
     *
     * Returns the particles that share their position with a lower index particle. These
     * are skipped here and have to be moved apart by the caller.
     */
    #[allow(clippy::too_many_arguments)]
    fn compute_forces(
        params: &SimulationParams,
        kernels: &Kernels,
        grid: &UniformGrid,
        position: &[V3],
        velocity: &[V3],
        normal: &[V3],
        density: &[FT],
        pressure: &[FT],
        force: &mut [V3],
    ) -> Vec<usize> {
        par_iter_mut1_gather(force, |i, p_force, nudged| {
            let mut force_pressure = V3::zeros();
            let mut force_viscosity = V3::zeros();
            let mut force_cohesion = V3::zeros();
            let mut force_curvature = V3::zeros();

            Self::for_each_neighbor(params, grid, position, position[i], |j, r, r2| {
                if j == i {
                    return;
                }
                if r2 == 0. {
                    if j > i {
                        nudged.push(j);
                    }
                    return;
                }
                if r2 <= MIN_INTERACTION_DISTANCE_SQ {
                    return;
                }

                let rn = r2.sqrt();

                force_pressure += pressure_force(params, kernels, r, rn, pressure[i], density[i], pressure[j], density[j]);

                if density[j] > VISCOSITY_MIN_DENSITY {
                    force_viscosity -= (velocity[i] - velocity[j]) * (kernels.viscosity_laplace(rn) / density[j]);
                }

                // surface tension after Akinci et al. 2013
                let correction = 2. * params.rest_density / (density[i] + density[j]);
                force_cohesion += r * (correction * kernels.surface_tension(rn) / rn);
                force_curvature += (normal[i] - normal[j]) * correction;
            });

            force_viscosity *= VISCOSITY * params.particle_mass * kernels.viscosity_laplace_constant;
            force_cohesion *= -SURFACE_TENSION * params.particle_mass2 * kernels.surface_tension_constant;
            force_curvature *= -SURFACE_TENSION * params.particle_mass;

            *p_force = force_pressure
                + force_cohesion
                + force_curvature
                + force_viscosity
                + params.gravity * params.particle_mass;
        })
    }

    /** Symplectic Euler. */
    fn integrate(params: &SimulationParams, dt: FT, force: &[V3], velocity: &mut [V3], position: &mut [V3]) {
        let inv_mass = 1. / params.particle_mass;
        par_iter_mut2(velocity, position, |i, v, x| {
            *v += force[i] * (inv_mass * dt);
            *x += *v * dt;
        });
    }

    /**
     * Pushes particles back through every wall they penetrate and reflects the normal velocity with
     * the wall restitution. The walls are handled one after another.
     */
    fn resolve_collisions(walls: &[SdfPlane; 6], position: &mut [V3], velocity: &mut [V3]) {
        par_iter_mut2(position, velocity, |_i, x, v| {
            for wall in walls {
                if let Some(d) = wall.penetration(*x) {
                    let n = wall.dir;
                    *x += n * d;
                    *v -= n * ((1. + RESTITUTION) * v.dot(&n));
                }
            }
        });
    }

    pub fn num_fluid_particles(&self) -> usize {
        self.particles.len()
    }

    pub fn num_boundary_particles(&self) -> usize {
        self.boundary.len()
    }

    /// Fluid positions as `[x0, y0, z0, x1, ...]`.
    pub fn fluid_positions(&self) -> Vec<FT> {
        flatten_points(&self.particles.position)
    }

    pub fn boundary_positions(&self) -> Vec<FT> {
        flatten_points(&self.boundary.positions)
    }

    pub fn boundary_normals(&self) -> Vec<FT> {
        flatten_points(&self.boundary.normals)
    }

    pub fn boundary(&self) -> &ParticleSet {
        &self.boundary
    }

    pub fn densities(&self) -> &[FT] {
        &self.particles.density
    }

    pub fn pressures(&self) -> &[FT] {
        &self.particles.pressure
    }

    pub fn velocities(&self) -> &[V3] {
        &self.particles.velocity
    }

    pub fn parameters(&self) -> Parameters {
        self.params.parameters()
    }

    pub fn simulation_params(&self) -> &SimulationParams {
        &self.params
    }

    pub fn kernels(&self) -> &Kernels {
        &self.kernels
    }

    /// Largest stable time step. Informational only, `advance` accepts any `dt`.
    pub fn max_timestep(&self) -> FT {
        self.params.wcsph.dt
    }

    pub fn bounds(&self) -> &Aabb {
        &self.bounds
    }

    pub fn time(&self) -> FT {
        self.time
    }

    pub fn step_number(&self) -> usize {
        self.step_number
    }
}

pub fn is_ft_approx_eq<FT: Float>(a: FT, b: FT, tolerance: FT) -> bool {
    assert!(!a.is_nan());
    assert!(!b.is_nan());
    b <= a + tolerance && b >= a - tolerance
}

pub fn assert_ft_approx_eq<FT: Float + Display>(a: FT, b: FT, tolerance: FT, s: impl FnOnce() -> String) {
    if !is_ft_approx_eq(a, b, tolerance) {
        panic!(
            "{} value not equal with a tolerance of {}:\n\ta={}\n\tb={}\n",
            s(),
            tolerance,
            a,
            b
        );
    }
}

/**
 * Human readable summary of the stage timings and per-step values. Empty sections are left out
 * when the counters were disabled.
 */
pub fn write_statistics(fluid_simulation: &FluidSimulation) -> String {
    let mut s = String::new();

    let simulation_time: f64 = fluid_simulation
        .pcounters
        .iter()
        .map(|(_, counter)| counter.sum().as_secs_f64())
        .sum();

    s += &format!("steps: {}\n", fluid_simulation.step_number);
    s += &format!("simulated time: {}s\n", fluid_simulation.time);
    s += &format!("simulation-time: {:.3}ms\n\n", simulation_time * 1000.);

    for (label, pcounter) in fluid_simulation.pcounters.iter() {
        s += &format!(
            "{}: avg:{:.4}ms total:{:.3}ms\n",
            label,
            pcounter.avg().as_secs_f64() * 1000.,
            pcounter.sum().as_secs_f64() * 1000.
        );
    }
    s += "\n";

    for (label, vcounter) in fluid_simulation.vcounters.iter() {
        s += &format!(
            "{}: min:{} max:{} avg:{}\n",
            label,
            vcounter.min(),
            vcounter.max(),
            vcounter.avg()
        );
    }

    s
}
