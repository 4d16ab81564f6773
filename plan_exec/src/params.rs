//! # Planner Executable Parameters
//!
//! This module provides the parameters for the planner executable, loaded from `plan_exec.toml`.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::Deserialize;

use crate::scene::{CanvasPoint, Scene};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct PlanExecParams {
    /// Target period of one cycle of the main loop.
    pub cycle_period_s: f64,

    /// Period of the automatic recompute.
    pub recompute_period_s: f64,

    /// Initial final time of the trajectory.
    pub final_time_s: f64,

    /// Initial requested horizon length.
    pub horizon_length: u32,

    /// Port the drone's telemetry is received on, 0 for none
    pub drone_port: u16,

    /// Port the goal point's telemetry is received on, 0 for none
    pub goal_port: u16,

    /// Address trajectories are sent to
    pub drone_dest_ip: String,
    pub drone_dest_port: u16,

    /// Initial canvas position of the drone
    pub drone_start_pos: [f64; 2],

    /// Initial canvas position of the goal
    pub goal_start_pos: [f64; 2],

    /// Number of consecutive cycle overruns after which a warning becomes an error.
    pub max_consec_cycle_overruns: u64,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl PlanExecParams {
    /// The scene the executable starts with.
    pub fn initial_scene(&self) -> Scene {
        let mut scene = Scene::default();

        scene.final_time_s = self.final_time_s;
        scene.horizon_length = self.horizon_length;

        scene.drone.pos = CanvasPoint::new(self.drone_start_pos[0], self.drone_start_pos[1]);
        scene.drone.port = self.drone_port;
        scene.drone.dest_ip = self.drone_dest_ip.clone();
        scene.drone.dest_port = self.drone_dest_port;

        scene.goal.pos = CanvasPoint::new(self.goal_start_pos[0], self.goal_start_pos[1]);
        scene.goal.port = self.goal_port;

        scene
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::opt::QuinticParams;
    use comms_if::net::NetParams;

    const PARAMS_DIR: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/../params");

    #[test]
    fn test_shipped_params_load() {
        let p: PlanExecParams =
            util::params::load_path(format!("{}/plan_exec.toml", PARAMS_DIR)).unwrap();
        assert!(p.cycle_period_s > 0.0);
        assert!(p.recompute_period_s >= p.cycle_period_s);

        let n: NetParams = util::params::load_path(format!("{}/net.toml", PARAMS_DIR)).unwrap();
        assert!(n.recv_buf_len > 0);

        let o: QuinticParams = util::params::load_path(format!("{}/opt.toml", PARAMS_DIR)).unwrap();
        assert!(o.max_horiz_accel_ms2 > 0.0);
    }

    #[test]
    fn test_initial_scene() {
        let p = PlanExecParams {
            cycle_period_s: 0.1,
            recompute_period_s: 1.0,
            final_time_s: 7.5,
            horizon_length: 25,
            drone_port: 6000,
            goal_port: 0,
            drone_dest_ip: String::from("127.0.0.1"),
            drone_dest_port: 7000,
            drone_start_pos: [10.0, 20.0],
            goal_start_pos: [300.0, -300.0],
            max_consec_cycle_overruns: 10,
        };

        let scene = p.initial_scene();
        assert_eq!(scene.final_time_s, 7.5);
        assert_eq!(scene.horizon_length, 25);
        assert_eq!(scene.drone.pos, CanvasPoint::new(10.0, 20.0));
        assert_eq!(scene.drone.dest_port, 7000);
        assert_eq!(scene.goal.pos, CanvasPoint::new(300.0, -300.0));
        assert_eq!(scene.num_obstacles(), 0);
    }
}
