//! Forces of small particle groups against hand evaluated sums of the individual terms.

use free_surface_sph::{
    aabb::Aabb,
    floating_type_mod::FT,
    particle_generator::ParticleSet,
    pressure_force,
    simulation_parameters::{SimulationParams, SimulationSettings, SURFACE_TENSION, VISCOSITY},
    sph_kernels::Kernels,
    vec3f, FluidSimulation, V3,
};

fn params(rest_density: FT, gravity: V3) -> SimulationParams {
    SimulationParams::new(SimulationSettings {
        rest_density,
        gravity,
        ..Default::default()
    })
    .unwrap()
}

/// Runs the force pass once without moving anything and returns the forces in input order.
fn forces(params: SimulationParams, positions: &[V3], velocities: &[V3]) -> Vec<V3> {
    let bounds = Aabb::new(vec3f(0., 0., 0.), vec3f(1., 1., 1.));
    let mut sim = FluidSimulation::from_parts(params, bounds, positions.to_vec(), ParticleSet::default(), false);
    sim.particles.velocity.copy_from_slice(velocities);
    sim.advance(0.);

    positions
        .iter()
        .map(|x| {
            let i = sim
                .particles
                .position
                .iter()
                .position(|p| p == x)
                .expect("particle moved during a zero step");
            sim.particles.force[i]
        })
        .collect()
}

#[derive(Debug)]
struct Terms {
    pressure: V3,
    viscosity: V3,
    cohesion: V3,
    curvature: V3,
    gravity: V3,
}

impl Terms {
    fn sum(&self) -> V3 {
        self.pressure + self.viscosity + self.cohesion + self.curvature + self.gravity
    }
}

/// Every force term on every particle, summed over all pairs directly.
fn expected_terms(params: &SimulationParams, positions: &[V3], velocities: &[V3]) -> Vec<Terms> {
    let kernels = Kernels::new(params.kernel_radius);
    let m = params.particle_mass;
    let n = positions.len();

    let density: Vec<FT> = (0..n)
        .map(|i| {
            let sum: FT = (0..n)
                .map(|j| kernels.poly6((positions[i] - positions[j]).norm_squared()))
                .sum();
            m * kernels.poly6_constant * sum
        })
        .collect();
    let pressure: Vec<FT> = density.iter().map(|&d| params.pressure(d)).collect();
    let normal: Vec<V3> = (0..n)
        .map(|i| {
            let mut sum = V3::zeros();
            for j in 0..n {
                let r = positions[i] - positions[j];
                sum += kernels.poly6_grad(r, r.norm_squared()) / density[j];
            }
            sum * (params.kernel_radius * m * kernels.poly6_grad_constant)
        })
        .collect();

    (0..n)
        .map(|i| {
            let mut terms = Terms {
                pressure: V3::zeros(),
                viscosity: V3::zeros(),
                cohesion: V3::zeros(),
                curvature: V3::zeros(),
                gravity: params.gravity * m,
            };
            for j in (0..n).filter(|&j| j != i) {
                let r = positions[i] - positions[j];
                let rn = r.norm();
                assert!(rn < params.kernel_radius);
                let k = 2. * params.rest_density / (density[i] + density[j]);

                terms.pressure += pressure_force(params, &kernels, r, rn, pressure[i], density[i], pressure[j], density[j]);
                terms.viscosity += (velocities[j] - velocities[i])
                    * (VISCOSITY * m * kernels.viscosity_laplace_constant * (params.kernel_radius - rn) / density[j]);
                terms.cohesion -=
                    r / rn * (SURFACE_TENSION * m * m * kernels.surface_tension_constant * k * kernels.surface_tension(rn));
                terms.curvature -= (normal[i] - normal[j]) * (SURFACE_TENSION * m * k);
            }
            terms
        })
        .collect()
}

fn assert_vec_approx_eq(actual: V3, expected: V3, tolerance: FT, what: &str) {
    assert!(
        (actual - expected).norm() <= tolerance,
        "{}: got {:?}, expected {:?}",
        what,
        actual.as_slice(),
        expected.as_slice()
    );
}

#[test]
fn resting_pair() {
    let params = params(1000., V3::zeros());
    let x = vec3f(0.5, 0.5, 0.5);
    let positions = [x, x + vec3f(0.026, 0., 0.)];
    let velocities = [V3::zeros(); 2];

    let actual = forces(params, &positions, &velocities);
    let expected = expected_terms(&params, &positions, &velocities);

    for (i, terms) in expected.iter().enumerate() {
        assert_eq!(terms.viscosity, V3::zeros());
        assert!(terms.cohesion.norm() > 0. && terms.curvature.norm() > 0.);
        let scale = terms.pressure.norm() + terms.cohesion.norm() + terms.curvature.norm();
        assert_vec_approx_eq(actual[i], terms.sum(), 1e-4 * scale, "pair force");
    }
    assert_vec_approx_eq(actual[0], -actual[1], 1e-4 * actual[0].norm(), "antisymmetry");
}

#[test]
fn cohesion_branches() {
    // inside half the kernel radius the cohesion kernel changes its form
    let params = params(1000., V3::zeros());
    let x = vec3f(0.5, 0.5, 0.5);
    for distance in [0.012, 0.019, 0.021, 0.034] {
        let positions = [x, x + vec3f(0., 0., distance)];
        let velocities = [V3::zeros(); 2];
        let actual = forces(params, &positions, &velocities);
        let expected = expected_terms(&params, &positions, &velocities);

        let terms = &expected[0];
        let scale = terms.pressure.norm() + terms.cohesion.norm() + terms.curvature.norm();
        assert_vec_approx_eq(actual[0], terms.sum(), 1e-4 * scale, &format!("force at distance {}", distance));
    }
}

#[test]
fn viscosity_of_a_moving_pair() {
    let params = params(1000., V3::zeros());
    let x = vec3f(0.5, 0.5, 0.5);
    let positions = [x, x + vec3f(0.02, 0.01, 0.)];
    let velocities = [vec3f(0., 1., 0.5), vec3f(0., -1., 0.)];
    let at_rest = [V3::zeros(); 2];

    let moving = forces(params, &positions, &velocities);
    let resting = forces(params, &positions, &at_rest);
    let expected = expected_terms(&params, &positions, &velocities);

    // only the viscosity term depends on the velocities
    for i in 0..2 {
        let viscosity = expected[i].viscosity;
        assert!(viscosity.norm() > 0.);
        let tolerance = 1e-3 * viscosity.norm() + 1e-5 * resting[i].norm();
        assert_vec_approx_eq(moving[i] - resting[i], viscosity, tolerance, "viscosity");
    }
    // the pair is slowed down relative to each other
    assert!(expected[0].viscosity.dot(&(velocities[0] - velocities[1])) < 0.);
}

#[test]
fn viscosity_skips_thin_neighbors() {
    // so light that even the densities stay below the viscosity threshold
    let params = params(1e-8, V3::zeros());
    let x = vec3f(0.5, 0.5, 0.5);
    let positions = [x, x + vec3f(0.02, 0., 0.)];

    let moving = forces(params, &positions, &[vec3f(1., 0., 0.), vec3f(-1., 0., 0.)]);
    let resting = forces(params, &positions, &[V3::zeros(); 2]);
    assert_eq!(moving, resting);
}

#[test]
fn three_particles_with_gravity() {
    let params = params(1000., vec3f(0., -9.81, 0.));
    let x = vec3f(0.5, 0.5, 0.5);
    let positions = [x, x + vec3f(0.025, 0., 0.), x + vec3f(0., 0.012, 0.005)];
    let velocities = [vec3f(0.1, 0., 0.), vec3f(0., 0.2, -0.1), vec3f(-0.3, 0., 0.2)];

    let actual = forces(params, &positions, &velocities);
    let expected = expected_terms(&params, &positions, &velocities);

    for (i, terms) in expected.iter().enumerate() {
        // the normals differ in direction, so curvature is not parallel to cohesion
        assert!(terms.curvature.cross(&terms.cohesion).norm() > 0.);
        let scale = terms.pressure.norm()
            + terms.viscosity.norm()
            + terms.cohesion.norm()
            + terms.curvature.norm()
            + terms.gravity.norm();
        assert_vec_approx_eq(actual[i], terms.sum(), 1e-4 * scale, &format!("force on particle {}", i));
    }
}

#[test]
fn nearly_coincident_pair_only_feels_gravity() {
    let gravity = vec3f(0., -9.81, 0.);
    let params = params(1000., gravity);
    let x = vec3f(0.5, 0.5, 0.5);
    // squared distance 4e-6 is below the interaction cutoff
    let positions = [x, x + vec3f(0.002, 0., 0.)];
    let velocities = [vec3f(1., 0., 0.), vec3f(-1., 0., 0.)];

    let actual = forces(params, &positions, &velocities);
    assert_eq!(actual, vec![gravity * params.particle_mass; 2]);
}
