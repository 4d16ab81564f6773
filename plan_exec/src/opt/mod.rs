//! # Optimiser adapter
//!
//! Marshals the scene into the solver's fixed-capacity buffers, runs the solver, and reads the
//! solution back into a [`Trajectory`], canvas path and [`Feasibility`] verdict.
//!
//! ## Frames
//!
//! The solver works in metres with axis 0 up, axis 1 north and axis 2 east. The canvas has `x`
//! east and `y` south, in units of [`GRID_SIZE`] per metre, so a canvas point `(x, y)` is the
//! solver position `(0, -y / GRID_SIZE, x / GRID_SIZE)`. Trajectories sent to the vehicle are in
//! NED.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

mod constraints;
mod quintic;
mod solver;

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::time::Instant;

use comms_if::tlm::Traj3DofSample;
use log::debug;
use serde::Serialize;

use crate::scene::{CanvasPoint, Feasibility, Scene, Trajectory};

pub use constraints::*;
pub use quintic::*;
pub use solver::*;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Maximum number of circular obstacles.
pub const MAX_OBS: usize = 10;

/// Maximum number of linear position constraints.
pub const MAX_CPOS: usize = 20;

/// Maximum number of trajectory samples.
pub const MAX_HORIZON: usize = 50;

/// Minimum number of trajectory samples.
pub const MIN_HORIZON: usize = 5;

/// Canvas units per metre.
pub const GRID_SIZE: f64 = 100.0;

/// Largest squared final position relaxation for which a trajectory is still feasible.
pub const FEASIBILITY_THRESHOLD: f64 = 0.25;

/// A dispatched trajectory freezes planning for this multiple of its final time.
pub const FREEZE_FACTOR: f64 = 1.2;

/// Gravitational acceleration, m/s^2.
pub const GRAVITY: f64 = 9.81;

/// Message given to the user when the trajectory is feasible.
pub const FEASIBLE_MSG: &str = "Trajectory remains feasible!";

/// Message given to the user when the trajectory is not feasible.
pub const INFEASIBLE_MSG: &str = "Increase final time to regain feasibility!";

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Runs a [`Solver`] on scenes.
#[derive(Debug, Default)]
pub struct OptAdapter<S: Solver> {
    solver: S,
    params: SolverParams,
    input: SolverInput,
    output: SolverOutput,
}

/// Result of one solve.
#[derive(Debug, Clone, PartialEq)]
pub struct SolveReport {
    pub trajectory: Trajectory,

    /// Canvas polyline of the trajectory.
    pub path: Vec<CanvasPoint>,

    pub feasibility: Feasibility,

    /// `sum(r_f_relax^2)`, which decides feasibility.
    pub terminal_residual: f64,

    /// Mean absolute difference between squared thrust and squared slack. Diagnostic only.
    pub diagnostic_residual: f64,

    pub solve_duration_ms: f64,

    pub final_time_s: f64,
    pub num_ellipses: usize,
    pub num_linear_constraints: usize,
}

/// Archived summary of a solve.
#[derive(Debug, Clone, Serialize)]
pub struct SolveRecord {
    pub time_s: f64,
    pub k: usize,
    pub final_time_s: f64,
    pub num_ellipses: usize,
    pub num_linear_constraints: usize,
    pub terminal_residual: f64,
    pub diagnostic_residual: f64,
    pub feasible: bool,
    pub solve_duration_ms: f64,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum OptError {
    #[error("Scene has {0} ellipses, more than the optimiser accepts")]
    TooManyEllipses(usize),

    #[error("Scene produces {0} linear constraints, more than the optimiser accepts")]
    TooManyLinearConstraints(usize),

    #[error("Final time must be positive, got {0} s")]
    InvalidFinalTime(f64),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl<S: Solver> OptAdapter<S> {
    pub fn new(solver: S) -> Self {
        Self {
            solver,
            params: SolverParams::default(),
            input: SolverInput::default(),
            output: SolverOutput::default(),
        }
    }

    pub fn solver(&self) -> &S {
        &self.solver
    }

    /// Solve a trajectory for the scene.
    ///
    /// Capacity violations are returned as errors before the solver is touched. A solver which
    /// does not converge is not an error, the verdict in the report reflects it.
    pub fn solve(&mut self, scene: &Scene) -> Result<SolveReport, OptError> {
        let tf = scene.final_time_s;
        if !(tf > 0.0 && tf.is_finite()) {
            return Err(OptError::InvalidFinalTime(tf));
        }

        // ---- MARSHAL ----

        let mut circles = Vec::new();
        let mut half_spaces = Vec::new();

        for obs in scene.obstacles() {
            match obs.to_constraints(&scene.drone.pos, &scene.goal.pos) {
                Constraints::Circle(c) => circles.push(c),
                Constraints::HalfSpaces(h) => half_spaces.extend(h),
            }
        }

        if circles.len() > MAX_OBS {
            return Err(OptError::TooManyEllipses(circles.len()));
        }
        if half_spaces.len() > MAX_CPOS {
            return Err(OptError::TooManyLinearConstraints(half_spaces.len()));
        }

        let k = clamp_horizon(scene.horizon_length);

        let p = &mut self.params;
        p.k = k;
        p.tf = tf;
        p.dt = tf / (k as f64 - 1.0);
        p.g = [-GRAVITY, 0.0, 0.0];

        p.obs.n = circles.len();
        for (i, c) in circles.iter().enumerate() {
            p.obs.sign[i] = c.sign;
            p.obs.r[i] = c.r;
            p.obs.c_n[i] = c.c_n;
            p.obs.c_e[i] = c.c_e;
        }

        p.cpos.n = half_spaces.len();
        for (i, h) in half_spaces.iter().enumerate() {
            p.cpos.a[i] = h.a;
            p.cpos.b[i] = h.b;
        }

        // Start and finish at rest, with thrust cancelling gravity
        let hover = [-p.g[0], -p.g[1], -p.g[2]];
        self.input = SolverInput {
            r_i: canvas_to_solver(&scene.drone.pos),
            v_i: [0.0; 3],
            a_i: hover,
            r_f: canvas_to_solver(&scene.goal.pos),
            v_f: [0.0; 3],
            a_f: hover,
        };

        // ---- SOLVE ----

        let start = Instant::now();
        self.solver.init(&self.params, &self.input);
        self.solver.run(&self.params, &self.input, &mut self.output);
        let solve_duration_ms = util::time::std_duration_to_millis(start.elapsed());

        // ---- READ BACK ----

        let report = self.read_back(solve_duration_ms, circles.len(), half_spaces.len());

        self.solver
            .reset(&mut self.params, &mut self.input, &mut self.output);

        debug!(
            "Solved K = {} in {:.3} ms, terminal residual {:.4}, diagnostic residual {:.4}",
            k, solve_duration_ms, report.terminal_residual, report.diagnostic_residual
        );

        Ok(report)
    }

    fn read_back(
        &self,
        solve_duration_ms: f64,
        num_ellipses: usize,
        num_linear_constraints: usize,
    ) -> SolveReport {
        let (p, o) = (&self.params, &self.output);

        let mut samples = Vec::with_capacity(p.k);
        let mut path = Vec::with_capacity(p.k);
        let mut diagnostic_residual = 0.0;

        for k in 0..p.k {
            samples.push(Traj3DofSample {
                time_s: k as f64 * p.dt,
                pos_ned: [o.r[1][k], o.r[2][k], o.r[0][k]],
                vel_ned: [o.v[1][k], o.v[2][k], o.v[0][k]],
                accl_ned: [o.a[1][k], o.a[2][k], o.a[0][k] - GRAVITY],
            });

            path.push(solver_to_canvas(o.r[1][k], o.r[2][k]));

            let a_sq: f64 = (0..3).map(|i| o.a[i][k] * o.a[i][k]).sum();
            diagnostic_residual += (a_sq - o.s[k] * o.s[k]).abs() / p.k as f64;
        }

        let terminal_residual: f64 = o.r_f_relax.iter().map(|r| r * r).sum();

        SolveReport {
            trajectory: Trajectory {
                dt_s: p.dt,
                samples,
            },
            path,
            feasibility: feasibility_verdict(terminal_residual),
            terminal_residual,
            diagnostic_residual,
            solve_duration_ms,
            final_time_s: p.tf,
            num_ellipses,
            num_linear_constraints,
        }
    }
}

impl SolveReport {
    /// Summary of the report for archiving.
    pub fn to_record(&self, time_s: f64) -> SolveRecord {
        SolveRecord {
            time_s,
            k: self.trajectory.k(),
            final_time_s: self.final_time_s,
            num_ellipses: self.num_ellipses,
            num_linear_constraints: self.num_linear_constraints,
            terminal_residual: self.terminal_residual,
            diagnostic_residual: self.diagnostic_residual,
            feasible: self.feasibility.feasible,
            solve_duration_ms: self.solve_duration_ms,
        }
    }
}

// ------------------------------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Number of samples actually used for a requested horizon length.
pub fn clamp_horizon(horizon_length: u32) -> usize {
    util::maths::clamp(horizon_length as usize, MIN_HORIZON, MAX_HORIZON)
}

/// Feasibility verdict for a terminal residual. Exactly at the threshold is still feasible.
pub fn feasibility_verdict(terminal_residual: f64) -> Feasibility {
    if terminal_residual > FEASIBILITY_THRESHOLD {
        Feasibility {
            feasible: false,
            message: String::from(INFEASIBLE_MSG),
        }
    } else {
        Feasibility {
            feasible: true,
            message: String::from(FEASIBLE_MSG),
        }
    }
}

/// Convert a canvas point to a solver position on the ground plane.
pub fn canvas_to_solver(p: &CanvasPoint) -> [f64; 3] {
    [0.0, -p.y / GRID_SIZE, p.x / GRID_SIZE]
}

/// Convert a solver (north, east) position to a canvas point.
pub fn solver_to_canvas(north: f64, east: f64) -> CanvasPoint {
    CanvasPoint::new(east * GRID_SIZE, -north * GRID_SIZE)
}

/// Convert an NED position to a canvas point, ignoring the down component.
pub fn ned_to_canvas(pos_ned: &[f64; 3]) -> CanvasPoint {
    solver_to_canvas(pos_ned[0], pos_ned[1])
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::scene::{Inclusion, Shape};

    /// Solver which returns a fixed relaxation and counts calls.
    #[derive(Default)]
    struct FixedSolver {
        relax: [f64; 3],
        num_inits: usize,
        num_runs: usize,
        num_resets: usize,
        last_params: Option<SolverParams>,
        last_input: Option<SolverInput>,
    }

    impl Solver for FixedSolver {
        fn init(&mut self, params: &SolverParams, input: &SolverInput) {
            self.num_inits += 1;
            self.last_params = Some(params.clone());
            self.last_input = Some(input.clone());
        }

        fn run(&mut self, params: &SolverParams, _: &SolverInput, output: &mut SolverOutput) {
            self.num_runs += 1;
            for k in 0..params.k {
                output.r[1][k] = 1.0;
                output.r[2][k] = 2.0;
                output.a[0][k] = GRAVITY;
                output.s[k] = GRAVITY;
            }
            output.r_f_relax = self.relax;
        }

        fn reset(&mut self, p: &mut SolverParams, i: &mut SolverInput, o: &mut SolverOutput) {
            self.num_resets += 1;
            *p = SolverParams::default();
            *i = SolverInput::default();
            *o = SolverOutput::default();
        }
    }

    fn adapter(relax: [f64; 3]) -> OptAdapter<FixedSolver> {
        OptAdapter::new(FixedSolver {
            relax,
            ..Default::default()
        })
    }

    #[test]
    fn test_horizon_clamped() {
        let mut scene = Scene::default();
        let mut opt = adapter([0.0; 3]);

        for (requested, expected) in vec![(0, 5), (2, 5), (5, 5), (30, 30), (50, 50), (5000, 50)] {
            scene.horizon_length = requested;
            let report = opt.solve(&scene).unwrap();
            assert_eq!(report.trajectory.k(), expected);
            assert_eq!(report.path.len(), expected);
        }
    }

    #[test]
    fn test_feasibility_threshold() {
        let scene = Scene::default();

        let report = adapter([0.5, 0.0, 0.0]).solve(&scene).unwrap();
        assert_eq!(report.terminal_residual, 0.25);
        assert!(report.feasibility.feasible);
        assert_eq!(report.feasibility.message, FEASIBLE_MSG);

        let report = adapter([0.5, 0.01, 0.0]).solve(&scene).unwrap();
        assert!(!report.feasibility.feasible);
        assert_eq!(report.feasibility.message, INFEASIBLE_MSG);
    }

    #[test]
    fn test_marshal_and_read_back() {
        let mut scene = Scene::default();
        scene.final_time_s = 4.0;
        scene.horizon_length = 5;
        scene.drone.pos = CanvasPoint::new(100.0, 200.0);
        scene.goal.pos = CanvasPoint::new(-300.0, -400.0);
        scene
            .add_ellipse(CanvasPoint::new(50.0, -150.0), 25.0, Inclusion::KeepIn, 0)
            .unwrap();
        scene
            .add(
                Shape::Plane {
                    p1: CanvasPoint::new(0.0, 0.0),
                    p2: CanvasPoint::new(0.0, 100.0),
                },
                Inclusion::KeepOut,
                0,
            )
            .unwrap();

        let mut opt = adapter([0.0; 3]);
        let report = opt.solve(&scene).unwrap();

        let p = opt.solver().last_params.clone().unwrap();
        assert_eq!(p.k, 5);
        assert_eq!(p.dt, 1.0);
        assert_eq!(p.obs.n, 1);
        assert_eq!(
            (p.obs.sign[0], p.obs.r[0], p.obs.c_n[0], p.obs.c_e[0]),
            (-1.0, 0.25, 1.5, 0.5)
        );
        assert_eq!(p.cpos.n, 1);

        let i = opt.solver().last_input.clone().unwrap();
        assert_eq!(i.r_i, [0.0, -2.0, 1.0]);
        assert_eq!(i.r_f, [0.0, 4.0, -3.0]);
        assert_eq!(i.v_i, [0.0; 3]);
        assert_eq!(i.a_i, [GRAVITY, 0.0, 0.0]);
        assert_eq!(i.a_f, [GRAVITY, 0.0, 0.0]);

        let s = &report.trajectory.samples[3];
        assert_eq!(s.time_s, 3.0);
        assert_eq!(s.pos_ned, [1.0, 2.0, 0.0]);
        assert_eq!(s.accl_ned, [0.0, 0.0, 0.0]);
        assert_eq!(report.path[3], CanvasPoint::new(200.0, -100.0));
        assert_eq!(report.diagnostic_residual, 0.0);
    }

    #[test]
    fn test_reset_after_every_solve() {
        let scene = Scene::default();
        let mut opt = adapter([0.0; 3]);

        for n in 1..=3 {
            opt.solve(&scene).unwrap();
            assert_eq!(opt.solver().num_resets, n);
            assert_eq!(opt.solver().num_runs, n);
        }
    }

    #[test]
    fn test_capacity_errors_leave_solver_untouched() {
        let mut scene = Scene::default();
        for i in 0..=MAX_OBS {
            scene
                .add_ellipse(CanvasPoint::new(i as f64 * 10.0, 0.0), 1.0, Inclusion::KeepOut, 0)
                .unwrap();
        }

        let mut opt = adapter([0.0; 3]);
        assert_eq!(opt.solve(&scene), Err(OptError::TooManyEllipses(MAX_OBS + 1)));
        assert_eq!(opt.solver().num_inits, 0);

        let mut scene = Scene::default();
        let vertices: Vec<_> = (0..=MAX_CPOS)
            .map(|i| {
                let a = i as f64 * std::f64::consts::TAU / (MAX_CPOS + 1) as f64;
                CanvasPoint::new(a.cos() * 100.0, a.sin() * 100.0)
            })
            .collect();
        scene.add_polygon(vertices, Inclusion::KeepIn).unwrap();

        assert_eq!(
            opt.solve(&scene),
            Err(OptError::TooManyLinearConstraints(MAX_CPOS + 1))
        );
        assert_eq!(opt.solver().num_inits, 0);
    }

    #[test]
    fn test_invalid_final_time() {
        let mut scene = Scene::default();
        scene.final_time_s = 0.0;

        let mut opt = adapter([0.0; 3]);
        assert_eq!(opt.solve(&scene), Err(OptError::InvalidFinalTime(0.0)));
    }

    #[test]
    fn test_quintic_feasibility_depends_on_final_time() {
        let mut scene = Scene::default();
        scene.goal.pos = CanvasPoint::new(1000.0, 0.0);
        let mut opt = OptAdapter::new(QuinticSolver::default());

        scene.final_time_s = 10.0;
        assert!(opt.solve(&scene).unwrap().feasibility.feasible);

        scene.final_time_s = 1.0;
        assert!(!opt.solve(&scene).unwrap().feasibility.feasible);

        assert_eq!(opt.solver().num_resets(), 2);
    }

    #[test]
    fn test_quintic_keep_out_polygon_away_from_path() {
        let mut scene = Scene::default();
        scene.goal.pos = CanvasPoint::new(200.0, 0.0);
        scene.final_time_s = 5.0;
        let mut opt = OptAdapter::new(QuinticSolver::default());

        let clear = opt.solve(&scene).unwrap();
        assert!(clear.feasibility.feasible);

        // 1m square 10m north of the path
        scene
            .add_polygon(
                vec![
                    CanvasPoint::new(0.0, -1000.0),
                    CanvasPoint::new(100.0, -1000.0),
                    CanvasPoint::new(100.0, -1100.0),
                    CanvasPoint::new(0.0, -1100.0),
                ],
                Inclusion::KeepOut,
            )
            .unwrap();

        let report = opt.solve(&scene).unwrap();
        assert_eq!(report.num_linear_constraints, 1);
        assert!(report.feasibility.feasible);
        assert_eq!(report.terminal_residual, clear.terminal_residual);
        assert_eq!(report.path, clear.path);
    }

    #[test]
    fn test_frame_conversions() {
        let p = CanvasPoint::new(250.0, -125.0);
        let r = canvas_to_solver(&p);
        assert_eq!(r, [0.0, 1.25, 2.5]);
        assert_eq!(solver_to_canvas(r[1], r[2]), p);
        assert_eq!(ned_to_canvas(&[1.25, 2.5, -3.0]), p);
    }
}
