//! # Quintic reference solver
//!
//! A simple stand-in for a full SCP optimiser. It flies a minimum-jerk (quintic) profile from the
//! initial to the final position, which has zero velocity and zero kinematic acceleration at both
//! ends. When the profile would need more horizontal acceleration than the vehicle has, the
//! displacement is shortened until it fits and the shortfall is reported as the final position
//! relaxation. Samples are then projected onto the boundary of any violated obstacle constraint.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::trace;
use serde::Deserialize;

use super::{
    constraints::{Circle, HalfSpace},
    Solver, SolverInput, SolverOutput, SolverParams,
};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Peak of the normalised minimum-jerk acceleration profile, `10 / sqrt(3)`.
const PEAK_NORM_ACCEL: f64 = 5.773_502_691_896_258;

/// Distance below which a sample is considered to be at a circle's center.
const CENTER_EPS: f64 = 1e-9;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Parameters of the reference solver, loaded from `opt.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct QuinticParams {
    /// Maximum horizontal acceleration of the vehicle.
    ///
    /// Units: meters/second^2
    pub max_horiz_accel_ms2: f64,

    /// Number of passes made over the obstacle constraints when projecting samples.
    pub num_projection_passes: usize,
}

/// Minimum-jerk reference solver.
#[derive(Debug, Default)]
pub struct QuinticSolver {
    params: QuinticParams,

    /// Displacement actually flown, after acceleration limiting.
    disp: [f64; 3],

    /// Number of times the solver has been reset.
    num_resets: u64,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Default for QuinticParams {
    fn default() -> Self {
        Self {
            max_horiz_accel_ms2: 8.0,
            num_projection_passes: 3,
        }
    }
}

impl QuinticSolver {
    pub fn new(params: QuinticParams) -> Self {
        Self {
            params,
            ..Default::default()
        }
    }

    pub fn num_resets(&self) -> u64 {
        self.num_resets
    }

    fn project_sample(&self, params: &SolverParams, n: &mut f64, e: &mut f64) {
        for _ in 0..self.params.num_projection_passes {
            let mut moved = false;

            for i in 0..params.obs.n {
                let c = Circle {
                    sign: params.obs.sign[i],
                    r: params.obs.r[i],
                    c_n: params.obs.c_n[i],
                    c_e: params.obs.c_e[i],
                };

                if c.violation(*n, *e) > 0.0 {
                    let (dn, de) = (*n - c.c_n, *e - c.c_e);
                    let dist = dn.hypot(de);
                    let (un, ue) = if dist < CENTER_EPS {
                        (0.0, 1.0)
                    } else {
                        (dn / dist, de / dist)
                    };

                    *n = c.c_n + un * c.r;
                    *e = c.c_e + ue * c.r;
                    moved = true;
                }
            }

            for i in 0..params.cpos.n {
                let h = HalfSpace {
                    a: params.cpos.a[i],
                    b: params.cpos.b[i],
                };

                let viol = h.violation(*n, *e);
                let norm_sq = h.a[0] * h.a[0] + h.a[1] * h.a[1];
                if viol > 0.0 && norm_sq > 0.0 {
                    *n -= viol / norm_sq * h.a[0];
                    *e -= viol / norm_sq * h.a[1];
                    moved = true;
                }
            }

            if !moved {
                break;
            }
        }
    }
}

impl Solver for QuinticSolver {
    fn init(&mut self, params: &SolverParams, input: &SolverInput) {
        for i in 0..3 {
            self.disp[i] = input.r_f[i] - input.r_i[i];
        }

        let horiz_disp = self.disp[1].hypot(self.disp[2]);
        let peak_accel = PEAK_NORM_ACCEL * horiz_disp / (params.tf * params.tf);

        if peak_accel > self.params.max_horiz_accel_ms2 {
            let scale = self.params.max_horiz_accel_ms2 / peak_accel;
            self.disp[1] *= scale;
            self.disp[2] *= scale;

            trace!(
                "Quintic displacement limited to {:.1} % by acceleration",
                scale * 100.0
            );
        }
    }

    fn run(&mut self, params: &SolverParams, input: &SolverInput, output: &mut SolverOutput) {
        let tf = params.tf;

        for k in 0..params.k {
            let tau = ((k as f64 * params.dt) / tf).min(1.0).max(0.0);
            let tau2 = tau * tau;
            let tau3 = tau2 * tau;

            let pos = 10.0 * tau3 - 15.0 * tau3 * tau + 6.0 * tau3 * tau2;
            let vel = (30.0 * tau2 - 60.0 * tau3 + 30.0 * tau3 * tau) / tf;
            let accl = (60.0 * tau - 180.0 * tau2 + 120.0 * tau3) / (tf * tf);

            for i in 0..3 {
                output.r[i][k] = input.r_i[i] + self.disp[i] * pos;
                output.v[i][k] = self.disp[i] * vel;

                // Thrust acceleration, so gravity is compensated
                output.a[i][k] = self.disp[i] * accl - params.g[i];
            }

            if k > 0 {
                let (mut n, mut e) = (output.r[1][k], output.r[2][k]);
                self.project_sample(params, &mut n, &mut e);
                output.r[1][k] = n;
                output.r[2][k] = e;
            }

            output.s[k] = (0..3)
                .map(|i| output.a[i][k] * output.a[i][k])
                .sum::<f64>()
                .sqrt();
        }

        if params.k > 0 {
            for i in 0..3 {
                output.r_f_relax[i] = input.r_f[i] - output.r[i][params.k - 1];
            }
        }
    }

    fn reset(
        &mut self,
        params: &mut SolverParams,
        input: &mut SolverInput,
        output: &mut SolverOutput,
    ) {
        *params = SolverParams::default();
        *input = SolverInput::default();
        *output = SolverOutput::default();
        self.disp = [0.0; 3];
        self.num_resets += 1;
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::opt::GRAVITY;

    fn problem(tf: f64, k: usize, r_f: [f64; 3]) -> (SolverParams, SolverInput) {
        let params = SolverParams {
            k,
            tf,
            dt: tf / (k as f64 - 1.0),
            g: [-GRAVITY, 0.0, 0.0],
            ..Default::default()
        };
        let input = SolverInput {
            r_f,
            a_i: [GRAVITY, 0.0, 0.0],
            a_f: [GRAVITY, 0.0, 0.0],
            ..Default::default()
        };
        (params, input)
    }

    fn solve(
        solver: &mut QuinticSolver,
        params: &SolverParams,
        input: &SolverInput,
    ) -> SolverOutput {
        let mut output = SolverOutput::default();
        solver.init(params, input);
        solver.run(params, input, &mut output);
        output
    }

    #[test]
    fn test_reaches_goal() {
        let mut solver = QuinticSolver::default();
        let (params, input) = problem(5.0, 20, [0.0, 3.0, 4.0]);
        let o = solve(&mut solver, &params, &input);

        // Start and end at rest, at the boundary positions
        assert_eq!(o.r[1][0], 0.0);
        assert!((o.r[1][19] - 3.0).abs() < 1e-9);
        assert!((o.r[2][19] - 4.0).abs() < 1e-9);
        assert!(o.v[2][0].abs() < 1e-9 && o.v[2][19].abs() < 1e-9);

        // Hovering thrust at both ends
        assert!((o.a[0][0] - GRAVITY).abs() < 1e-9);
        assert!((o.a[0][19] - GRAVITY).abs() < 1e-9);
        assert!((o.s[0] - GRAVITY).abs() < 1e-9);

        assert!(o.r_f_relax.iter().all(|r| r.abs() < 1e-9));
    }

    #[test]
    fn test_acceleration_limit_relaxes_goal() {
        let mut solver = QuinticSolver::new(QuinticParams {
            max_horiz_accel_ms2: 1.0,
            num_projection_passes: 3,
        });

        // 10 m in 1 s would need ~57 m/s^2
        let (params, input) = problem(1.0, 10, [0.0, 0.0, 10.0]);
        let o = solve(&mut solver, &params, &input);

        let relax_sq: f64 = o.r_f_relax.iter().map(|r| r * r).sum();
        assert!(relax_sq > 0.25);

        let max_horiz_accel = (0..10)
            .map(|k| o.a[1][k].hypot(o.a[2][k]))
            .fold(0.0, f64::max);
        assert!(max_horiz_accel <= 1.0 + 1e-9);
    }

    #[test]
    fn test_keep_out_circle_avoided() {
        let mut solver = QuinticSolver::default();
        let (mut params, input) = problem(10.0, 30, [0.0, 0.0, 6.0]);
        params.obs.n = 1;
        params.obs.sign[0] = 1.0;
        params.obs.r[0] = 1.0;
        params.obs.c_n[0] = 0.0;
        params.obs.c_e[0] = 3.0;

        let o = solve(&mut solver, &params, &input);

        for k in 1..30 {
            let dist = o.r[1][k].hypot(o.r[2][k] - 3.0);
            assert!(dist >= 1.0 - 1e-9, "sample {} inside the circle ({})", k, dist);
        }
    }

    #[test]
    fn test_half_space_respected() {
        let mut solver = QuinticSolver::default();
        let (mut params, input) = problem(10.0, 30, [0.0, 2.0, 0.0]);

        // Stay south of 1 m north
        params.cpos.n = 1;
        params.cpos.a[0] = [1.0, 0.0];
        params.cpos.b[0] = 1.0;

        let o = solve(&mut solver, &params, &input);

        assert!((0..30).all(|k| o.r[1][k] <= 1.0 + 1e-9));

        // The goal is unreachable, reported through the relaxation
        assert!((o.r_f_relax[1] - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_reset_clears_buffers() {
        let mut solver = QuinticSolver::default();
        let (mut params, mut input) = problem(5.0, 20, [0.0, 3.0, 4.0]);
        let mut o = solve(&mut solver, &params, &input);

        solver.reset(&mut params, &mut input, &mut o);

        assert_eq!(solver.num_resets(), 1);
        assert_eq!(params, SolverParams::default());
        assert_eq!(input, SolverInput::default());
        assert_eq!(o, SolverOutput::default());
    }
}
