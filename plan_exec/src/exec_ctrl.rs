//! # Execution Controller
//!
//! Decides when a trajectory may be re-planned and when it may be dispatched to the vehicle.
//!
//! Once a trajectory has been executed the planner is frozen for [`FREEZE_FACTOR`] times the
//! final time the trajectory was executed with, during which neither a recompute nor another
//! execute is accepted. Freezing is not a stored state, it is evaluated against the session time
//! passed into each call.
//!
//! The controller never talks to the network itself. Everything the rest of the executable must
//! react to is queued as an [`ExecEvent`] and drained by the main loop once per cycle.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::collections::VecDeque;

use comms_if::tlm::Traj3Dof;
use log::{debug, error, info, warn};
use serde::Serialize;

use util::{
    archive::{ArchiveError, Archiver},
    session::Session,
};

use crate::{
    opt::{OptAdapter, OptError, QuinticSolver, Solver, FREEZE_FACTOR},
    scene::{Feasibility, Scene, Trajectory},
};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Execution controller.
pub struct ExecCtrl<S: Solver = QuinticSolver> {
    adapter: OptAdapter<S>,

    state: ExecState,

    /// The trajectory dispatched by the last execute.
    executed: Option<Trajectory>,

    events: VecDeque<ExecEvent>,

    arch_solves: Option<Archiver>,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum ExecState {
    Idle,

    /// A solve is in progress.
    Planning,

    /// A trajectory was dispatched at `start_s` with the given final time.
    Executing { start_s: f64, final_time_s: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RecomputeOutcome {
    /// The planner is frozen, nothing was solved.
    Frozen,

    Solved { feasible: bool },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ExecuteOutcome {
    Executed,

    /// The latest trajectory is not feasible, or there isn't one.
    RejectedInfeasible,

    RejectedFrozen,
}

/// Notifications raised by the controller for the main loop.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecEvent {
    /// A trajectory must be sent to the vehicle.
    TrajectoryExecuted(Traj3Dof),

    /// The feasibility verdict was updated.
    Feasibility(Feasibility),

    /// The scene's path and trajectory were replaced.
    RefreshGraphics,
}

#[derive(Debug, thiserror::Error)]
pub enum ExecCtrlError {
    #[error("Optimiser error: {0}")]
    OptError(#[from] OptError),

    #[error("A solve is already in progress")]
    AlreadyPlanning,

    #[error("Final time must be positive, got {0} s")]
    InvalidFinalTime(f64),

    #[error("Could not create the solve archive: {0}")]
    ArchiveInitError(ArchiveError),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Default for ExecCtrl<QuinticSolver> {
    fn default() -> Self {
        Self::new(QuinticSolver::default())
    }
}

impl<S: Solver> ExecCtrl<S> {
    pub fn new(solver: S) -> Self {
        Self {
            adapter: OptAdapter::new(solver),
            state: ExecState::Idle,
            executed: None,
            events: VecDeque::new(),
            arch_solves: None,
        }
    }

    /// Start archiving a summary of every solve into the session.
    pub fn init_archive(&mut self, session: &Session) -> Result<(), ExecCtrlError> {
        self.arch_solves = Some(
            Archiver::from_path(session, "solves.csv").map_err(ExecCtrlError::ArchiveInitError)?,
        );
        Ok(())
    }

    pub fn state(&self) -> ExecState {
        self.state
    }

    pub fn solver(&self) -> &S {
        self.adapter.solver()
    }

    /// True while a dispatched trajectory is presumed to still be in flight.
    pub fn is_frozen(&self, now_s: f64) -> bool {
        match self.state {
            ExecState::Executing {
                start_s,
                final_time_s,
            } => (now_s - start_s) < final_time_s * FREEZE_FACTOR,
            _ => false,
        }
    }

    /// Re-plan the trajectory for the current scene.
    ///
    /// On success the scene's trajectory, path and feasibility verdict are replaced.
    pub fn recompute(
        &mut self,
        scene: &mut Scene,
        now_s: f64,
    ) -> Result<RecomputeOutcome, ExecCtrlError> {
        if self.is_frozen(now_s) {
            debug!("Planner frozen, recompute skipped");
            return Ok(RecomputeOutcome::Frozen);
        }

        if self.state == ExecState::Planning {
            return Err(ExecCtrlError::AlreadyPlanning);
        }

        let prev_state = std::mem::replace(&mut self.state, ExecState::Planning);
        let result = self.adapter.solve(scene);
        self.state = prev_state;

        let report = result?;

        if let Some(ref mut arch) = self.arch_solves {
            if let Err(e) = arch.serialise(report.to_record(now_s)) {
                warn!("Could not archive solve: {}", e);
            }
        }

        let feasible = report.feasibility.feasible;
        if !feasible {
            info!("{}", report.feasibility.message);
        }

        scene.trajectory = Some(report.trajectory);
        scene.path.points = report.path;
        scene.feasibility = report.feasibility.clone();

        self.events.push_back(ExecEvent::Feasibility(report.feasibility));
        self.events.push_back(ExecEvent::RefreshGraphics);

        Ok(RecomputeOutcome::Solved { feasible })
    }

    /// Dispatch the latest trajectory to the vehicle.
    pub fn execute(&mut self, scene: &mut Scene, now_s: f64) -> ExecuteOutcome {
        let traj = match scene.trajectory {
            Some(ref t) if scene.feasibility.feasible => t,
            _ => {
                info!("Execution disabled, no feasible trajectory");
                return ExecuteOutcome::RejectedInfeasible;
            }
        };

        if self.is_frozen(now_s) {
            info!("Execution disabled while the previous trajectory is in flight");
            return ExecuteOutcome::RejectedFrozen;
        }

        self.state = ExecState::Executing {
            start_s: now_s,
            final_time_s: scene.final_time_s,
        };
        self.executed = Some(traj.clone());
        self.events
            .push_back(ExecEvent::TrajectoryExecuted(traj.to_packet()));

        info!(
            "Trajectory executed at {:.2} s, planner frozen for {:.2} s",
            now_s,
            scene.final_time_s * FREEZE_FACTOR
        );

        ExecuteOutcome::Executed
    }

    /// Set the final time and recompute.
    pub fn set_final_time(
        &mut self,
        scene: &mut Scene,
        final_time_s: f64,
        now_s: f64,
    ) -> Result<RecomputeOutcome, ExecCtrlError> {
        if !(final_time_s > 0.0 && final_time_s.is_finite()) {
            return Err(ExecCtrlError::InvalidFinalTime(final_time_s));
        }

        scene.final_time_s = final_time_s;
        self.recompute(scene, now_s)
    }

    /// Set the requested horizon length and recompute. The length is clamped when solving.
    pub fn set_horizon_length(
        &mut self,
        scene: &mut Scene,
        horizon_length: u32,
        now_s: f64,
    ) -> Result<RecomputeOutcome, ExecCtrlError> {
        scene.horizon_length = horizon_length;
        self.recompute(scene, now_s)
    }

    /// Step the simulated drone along the executed trajectory.
    ///
    /// Only applies while executing and before any telemetry has been received from the drone.
    /// Returns false once the trajectory has been flown, leaving the drone at its final sample.
    pub fn sim_drone(&self, scene: &mut Scene, now_s: f64) -> bool {
        let start_s = match self.state {
            ExecState::Executing { start_s, .. } => start_s,
            _ => return false,
        };

        if scene.drone.connected {
            return false;
        }

        let traj = match self.executed {
            Some(ref t) => t,
            None => return false,
        };

        let elapsed_s = now_s - start_s;
        if elapsed_s < 0.0 {
            return false;
        }

        match traj.samples.iter().rev().find(|s| s.time_s <= elapsed_s) {
            Some(sample) => {
                scene.drone.pos = crate::opt::ned_to_canvas(&sample.pos_ned);
                elapsed_s <= traj.duration_s()
            }
            None => false,
        }
    }

    /// Return to idle, dropping any executed trajectory and pending events.
    pub fn reset(&mut self) {
        if self.state == ExecState::Planning {
            error!("ExecCtrl reset during a solve");
        }

        self.state = ExecState::Idle;
        self.executed = None;
        self.events.clear();
    }

    /// Take all events raised since the last drain, oldest first.
    pub fn drain_events(&mut self) -> Vec<ExecEvent> {
        self.events.drain(..).collect()
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------
