use anyhow::ensure;
use log::warn;
use serde::{Deserialize, Serialize};

use crate::{
    aabb::v3_as_array,
    floating_type_mod::{FT, PI},
    vec3f, V3,
};

/// Viscosity coefficient of the explicit Laplacian viscosity force.
pub const VISCOSITY: FT = 0.0005;

/// Surface tension coefficient for the cohesion and curvature forces.
pub const SURFACE_TENSION: FT = 2.;

/// Restitution of the domain walls.
pub const RESTITUTION: FT = 0.5;

/// Neighbors closer than this (squared distance) do not exert forces.
pub const MIN_INTERACTION_DISTANCE_SQ: FT = 0.00001;

/// Offset applied on every axis to separate exactly coincident particles.
pub const COLLAPSE_NUDGE: FT = 1e-5;

/// Neighbors below this density are skipped in the viscosity sum.
pub const VISCOSITY_MIN_DENSITY: FT = 0.0001;

/**
 * User facing settings of a scene. Everything else is derived from these.
 */
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationSettings {
    pub particle_radius: FT,
    /// Rest density in kg/m^3
    pub rest_density: FT,
    #[serde(with = "v3_as_array")]
    pub gravity: V3,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        SimulationSettings {
            particle_radius: 0.01,
            rest_density: 1000.,
            gravity: vec3f(0., -9.81, 0.),
        }
    }
}

/**
 * Constants of the Tait equation of state (WCSPH, "Weakly compressible SPH for free surface flows").
 */
#[derive(Debug, Clone, Copy)]
pub struct WcsphConstants {
    pub gamma: FT,
    /// numerical speed of sound
    pub cs: FT,
    /// stiffness `rest_density * cs^2 / gamma`
    pub b: FT,
    pub viscosity: FT,
    /// largest stable time step
    pub dt: FT,
}

impl WcsphConstants {
    pub const GAMMA: FT = 7.;
    pub const SPEED_OF_SOUND: FT = 10.;
    pub const VISCOSITY: FT = 0.005;

    fn new(rest_density: FT, kernel_radius: FT, particle_mass: FT, gravity: FT) -> WcsphConstants {
        let gamma = Self::GAMMA;
        let cs = Self::SPEED_OF_SOUND;
        let viscosity = Self::VISCOSITY;
        let b = rest_density * cs * cs / gamma;

        // CFL-like bounds for body forces and for the speed of sound
        let dt_force = 0.25 * kernel_radius / (particle_mass * gravity);
        let dt_sound = 0.4 * kernel_radius / (cs * (1. + 0.6 * viscosity));

        WcsphConstants {
            gamma,
            cs,
            b,
            viscosity,
            dt: FT::min(dt_force, dt_sound),
        }
    }

    /**
     * Tait pressure `B * ((rho / rho_0)^7 - 1)`. Not clamped, so the pressure is negative below rest density.
     */
    #[inline(always)]
    pub fn pressure(&self, density: FT, rest_density: FT) -> FT {
        let t = density / rest_density;
        self.b * ((t * t) * (t * t) * (t * t) * t - 1.)
    }
}

/**
 * Derived simulation constants. Computed once at construction and never changed afterwards.
 */
#[derive(Debug, Clone, Copy)]
pub struct SimulationParams {
    pub particle_radius: FT,
    pub particle_diameter: FT,
    pub kernel_radius: FT,
    pub kernel_radius2: FT,
    pub kernel_support_particles: i32,
    pub rest_density: FT,
    pub particle_mass: FT,
    pub particle_mass2: FT,
    pub gravity: V3,
    pub wcsph: WcsphConstants,
}

impl SimulationParams {
    pub fn new(settings: SimulationSettings) -> anyhow::Result<SimulationParams> {
        ensure!(
            settings.particle_radius > 0.,
            "particle radius has to be positive, got {}",
            settings.particle_radius
        );
        ensure!(
            settings.rest_density > 0.,
            "rest density has to be positive, got {}",
            settings.rest_density
        );

        let particle_radius = settings.particle_radius;
        let particle_diameter = 2. * particle_radius;
        let kernel_radius = 4. * particle_radius;
        let kernel_support_particles = ((4. / 3. * PI * kernel_radius * kernel_radius * kernel_radius)
            / (particle_diameter * particle_diameter * particle_diameter))
            .ceil() as i32;
        let rest_density = settings.rest_density;
        let particle_mass = rest_density * particle_diameter * particle_diameter * particle_diameter;

        debug_assert!(kernel_radius >= particle_diameter);

        let kernel_radius2 = kernel_radius * kernel_radius;
        if kernel_radius2 < 10. * MIN_INTERACTION_DISTANCE_SQ {
            warn!(
                "kernel radius {} is close to the minimum interaction distance {}, most neighbors will not exert forces",
                kernel_radius,
                MIN_INTERACTION_DISTANCE_SQ.sqrt()
            );
        }

        Ok(SimulationParams {
            particle_radius,
            particle_diameter,
            kernel_radius,
            kernel_radius2,
            kernel_support_particles,
            rest_density,
            particle_mass,
            particle_mass2: particle_mass * particle_mass,
            gravity: settings.gravity,
            wcsph: WcsphConstants::new(rest_density, kernel_radius, particle_mass, settings.gravity.norm()),
        })
    }

    pub fn pressure(&self, density: FT) -> FT {
        self.wcsph.pressure(density, self.rest_density)
    }

    pub fn parameters(&self) -> Parameters {
        Parameters {
            particle_radius: self.particle_radius,
            particle_diameter: self.particle_diameter,
            kernel_radius: self.kernel_radius,
            kernel_support_particles: self.kernel_support_particles,
            particle_mass: self.particle_mass,
            rest_density: self.rest_density,
        }
    }
}

/// Read-only summary of the simulation parameters for consumers of the simulation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Parameters {
    pub particle_radius: FT,
    pub particle_diameter: FT,
    pub kernel_radius: FT,
    pub kernel_support_particles: i32,
    pub particle_mass: FT,
    pub rest_density: FT,
}
