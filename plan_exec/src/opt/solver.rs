//! # Solver boundary
//!
//! The optimiser is used through fixed-capacity parameter, input and output buffers, mirroring
//! how a generated SCP solver exposes its problem. All vectors use the solver axis convention:
//! axis 0 is up, axis 1 is north and axis 2 is east, in metres.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use super::{MAX_CPOS, MAX_HORIZON, MAX_OBS};

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// A trajectory optimiser.
///
/// The adapter always calls `init` then `run` for one solve, reads the output, and then calls
/// `reset`, so every solve starts cold.
pub trait Solver {
    /// Prepare the solver for a new problem.
    fn init(&mut self, params: &SolverParams, input: &SolverInput);

    /// Solve the problem, writing the solution into `output`.
    ///
    /// Failing to converge is not an error, the residual in `output.r_f_relax` reflects it.
    fn run(&mut self, params: &SolverParams, input: &SolverInput, output: &mut SolverOutput);

    /// Clear all buffers and any warm start state.
    fn reset(
        &mut self,
        params: &mut SolverParams,
        input: &mut SolverInput,
        output: &mut SolverOutput,
    );
}

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Problem parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct SolverParams {
    /// Number of samples in the trajectory.
    pub k: usize,

    /// Final time in seconds.
    pub tf: f64,

    /// Time between samples in seconds.
    pub dt: f64,

    /// Gravity vector, m/s^2.
    pub g: [f64; 3],

    /// Circular obstacles.
    pub obs: ObsParams,

    /// Linear position constraints.
    pub cpos: CposParams,
}

/// Circular obstacle constraints, `sign * (|H(r - c)|^2 - R^2) >= 0`.
#[derive(Debug, Clone, PartialEq)]
pub struct ObsParams {
    pub n: usize,

    /// `+1` to stay outside the circle, `-1` to stay inside.
    pub sign: [f64; MAX_OBS],

    /// Radius in metres.
    pub r: [f64; MAX_OBS],

    /// Center north coordinate.
    pub c_n: [f64; MAX_OBS],

    /// Center east coordinate.
    pub c_e: [f64; MAX_OBS],
}

/// Linear position constraints `a[i] . (r_n, r_e) <= b[i]`.
#[derive(Debug, Clone, PartialEq)]
pub struct CposParams {
    pub n: usize,
    pub a: [[f64; 2]; MAX_CPOS],
    pub b: [f64; MAX_CPOS],
}

/// Boundary conditions of the problem.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SolverInput {
    pub r_i: [f64; 3],
    pub v_i: [f64; 3],
    pub a_i: [f64; 3],
    pub r_f: [f64; 3],
    pub v_f: [f64; 3],
    pub a_f: [f64; 3],
}

/// Solution, indexed as `[axis][sample]`. Only the first `k` samples are meaningful.
#[derive(Debug, Clone, PartialEq)]
pub struct SolverOutput {
    pub r: [[f64; MAX_HORIZON]; 3],
    pub v: [[f64; MAX_HORIZON]; 3],
    pub a: [[f64; MAX_HORIZON]; 3],

    /// Thrust magnitude slack per sample.
    pub s: [f64; MAX_HORIZON],

    /// Relaxation on the final position, zero if the goal was reached.
    pub r_f_relax: [f64; 3],
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Default for SolverParams {
    fn default() -> Self {
        Self {
            k: 0,
            tf: 0.0,
            dt: 0.0,
            g: [0.0; 3],
            obs: ObsParams::default(),
            cpos: CposParams::default(),
        }
    }
}

impl Default for ObsParams {
    fn default() -> Self {
        Self {
            n: 0,
            sign: [0.0; MAX_OBS],
            r: [0.0; MAX_OBS],
            c_n: [0.0; MAX_OBS],
            c_e: [0.0; MAX_OBS],
        }
    }
}

impl Default for CposParams {
    fn default() -> Self {
        Self {
            n: 0,
            a: [[0.0; 2]; MAX_CPOS],
            b: [0.0; MAX_CPOS],
        }
    }
}

impl Default for SolverOutput {
    fn default() -> Self {
        Self {
            r: [[0.0; MAX_HORIZON]; 3],
            v: [[0.0; MAX_HORIZON]; 3],
            a: [[0.0; MAX_HORIZON]; 3],
            s: [0.0; MAX_HORIZON],
            r_f_relax: [0.0; 3],
        }
    }
}
