use crate::{
    floating_type_mod::{FT, PI},
    V3,
};

/**
 * Smoothing kernels for a fixed support radius `h`.
 *
 * The kernel functions return the unnormalized shape only; the matching
 * `*_constant` has to be multiplied in by the caller (usually once after
 * summing over all neighbors).
 */
#[derive(Debug, Clone, Copy)]
pub struct Kernels {
    pub h: FT,
    pub h2: FT,

    pub poly6_constant: FT,
    pub poly6_grad_constant: FT,
    pub spiky_grad_constant: FT,
    pub viscosity_laplace_constant: FT,
    pub surface_tension_constant: FT,

    // h^6 / 64
    surface_tension_offset: FT,
}

impl Kernels {
    pub fn new(h: FT) -> Kernels {
        assert!(h > 0., "kernel support radius has to be positive");

        let h2 = h * h;
        let h3 = h2 * h;
        let h6 = h3 * h3;
        let h9 = h6 * h3;

        Kernels {
            h,
            h2,
            poly6_constant: 315. / (64. * PI * h9),
            poly6_grad_constant: -945. / (32. * PI * h9),
            spiky_grad_constant: -45. / (PI * h6),
            viscosity_laplace_constant: 45. / (PI * h6),
            surface_tension_constant: 32. / (PI * h9),
            surface_tension_offset: h6 / 64.,
        }
    }

    /** Density kernel. `r2` is the squared distance. */
    #[inline(always)]
    pub fn poly6(&self, r2: FT) -> FT {
        if r2 >= self.h2 {
            return 0.;
        }
        let v = self.h2 - r2;
        v * v * v
    }

    /** Gradient of the density kernel with respect to `r`. */
    #[inline(always)]
    pub fn poly6_grad(&self, r: V3, r2: FT) -> V3 {
        if r2 >= self.h2 {
            return V3::zeros();
        }
        let v = self.h2 - r2;
        r * (v * v)
    }

    /**
     * Gradient of the spiky kernel. `rn` is `|r|` and has to be non-zero.
     */
    #[inline(always)]
    pub fn spiky_grad(&self, r: V3, rn: FT) -> V3 {
        if rn >= self.h {
            return V3::zeros();
        }
        let v = self.h - rn;
        r * (v * v / rn)
    }

    #[inline(always)]
    pub fn viscosity_laplace(&self, rn: FT) -> FT {
        if rn >= self.h {
            return 0.;
        }
        self.h - rn
    }

    /**
     * Cohesion kernel from "Versatile Surface Tension and Adhesion for SPH Fluids" (Akinci 2013).
     *
     * Repulsive for `r < h/2` and attractive up to `h` once multiplied with a negative coefficient.
     */
    #[inline(always)]
    pub fn surface_tension(&self, rn: FT) -> FT {
        if rn <= 0. || rn >= self.h {
            return 0.;
        }
        let v = self.h - rn;
        let v3r3 = v * v * v * rn * rn * rn;
        if 2. * rn > self.h {
            v3r3
        } else {
            2. * v3r3 - self.surface_tension_offset
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{assert_ft_approx_eq, vec3f};

    fn spiky(h: FT, rn: FT) -> FT {
        if rn >= h {
            return 0.;
        }
        15. / (PI * h * h * h * h * h * h) * (h - rn) * (h - rn) * (h - rn)
    }

    #[test]
    fn poly6_integration_test() {
        let h = 0.04;
        let kernels = Kernels::new(h);
        let grid_size = 80;
        let cube_len = 2. * h / grid_size as FT;
        let cube_volume = cube_len * cube_len * cube_len;

        let mut integral = 0.;
        for z in 0..grid_size {
            for y in 0..grid_size {
                for x in 0..grid_size {
                    let p = vec3f(
                        (x as FT + 0.5) * cube_len - h,
                        (y as FT + 0.5) * cube_len - h,
                        (z as FT + 0.5) * cube_len - h,
                    );
                    integral += kernels.poly6_constant * kernels.poly6(p.norm_squared()) * cube_volume;
                }
            }
        }

        println!("Integration of poly6 kernel with h={:.3}: {}", h, integral);
        assert_ft_approx_eq(integral, 1., 0.01, || "poly6 integral".into());
    }

    #[test]
    fn poly6_gradient_matches_finite_differences() {
        let h = 1.;
        let kernels = Kernels::new(h);
        let eps = 1e-3;

        let w = |p: V3| kernels.poly6_constant * kernels.poly6(p.norm_squared());

        for probe in [vec3f(0.3, 0.1, -0.2), vec3f(-0.5, 0.4, 0.1), vec3f(0.05, -0.6, 0.6)] {
            let analytical = kernels.poly6_grad_constant * kernels.poly6_grad(probe, probe.norm_squared());
            for d in 0..3 {
                let mut xp = probe;
                let mut xn = probe;
                xp[d] += eps;
                xn[d] -= eps;
                let approx = (w(xp) - w(xn)) / (2. * eps);
                assert_ft_approx_eq(analytical[d], approx, 1e-2, || format!("poly6 gradient axis {}", d));
            }
        }
    }

    #[test]
    fn spiky_gradient_matches_finite_differences() {
        let h = 1.;
        let kernels = Kernels::new(h);
        let eps = 1e-3;

        for probe in [vec3f(0.3, 0.1, -0.2), vec3f(-0.5, 0.4, 0.1)] {
            let rn = probe.norm();
            let analytical = kernels.spiky_grad_constant * kernels.spiky_grad(probe, rn);
            for d in 0..3 {
                let mut xp = probe;
                let mut xn = probe;
                xp[d] += eps;
                xn[d] -= eps;
                let approx = (spiky(h, xp.norm()) - spiky(h, xn.norm())) / (2. * eps);
                assert_ft_approx_eq(analytical[d], approx, 1e-2, || format!("spiky gradient axis {}", d));
            }
        }
    }

    #[test]
    fn kernels_vanish_outside_support() {
        let kernels = Kernels::new(0.5);
        let r = vec3f(0.5, 0., 0.);
        assert_eq!(kernels.poly6(0.25), 0.);
        assert_eq!(kernels.poly6_grad(r, 0.25), V3::zeros());
        assert_eq!(kernels.spiky_grad(r, 0.5), V3::zeros());
        assert_eq!(kernels.viscosity_laplace(0.7), 0.);
        assert_eq!(kernels.surface_tension(0.5), 0.);
    }

    #[test]
    fn surface_tension_kernel_is_zero_at_both_ends_and_changes_sign() {
        let h = 1.;
        let kernels = Kernels::new(h);
        assert_eq!(kernels.surface_tension(0.), 0.);
        assert_eq!(kernels.surface_tension(h), 0.);

        // repulsive part close to the center, attractive part further away
        assert!(kernels.surface_tension(0.05) < 0.);
        assert!(kernels.surface_tension(0.75) > 0.);

        // both branches meet at h/2
        let left = 2. * (0.5 as FT).powi(6) - 1. / 64.;
        let right = (0.5 as FT).powi(6);
        assert_ft_approx_eq(left, right, 1e-6, || "branches continuous".into());
    }

    #[test]
    fn coincident_particles_do_not_produce_nan_in_poly6_grad() {
        let kernels = Kernels::new(0.04);
        let g = kernels.poly6_grad(V3::zeros(), 0.);
        assert!(g.iter().all(|x| x.is_finite()));
    }
}
