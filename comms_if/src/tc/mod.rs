//! # Telecommand module
//!
//! Telecommands are the instructions given to the planner executive, either as JSON lines in a
//! timed script or as whitespace separated words typed into the console, for example:
//!
//! ```text
//! add ellipse 150 -200 40 --port 6001
//! set-final-time 8.5
//! execute
//! ```

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use structopt::StructOpt;
use thiserror::Error;

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// A telecommand, i.e. an instruction sent to the planner executive.
///
/// All canvas coordinates are in canvas units, where one metre is `GRID_SIZE` units, `x` points
/// east and `y` points south.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, StructOpt)]
#[serde(rename_all = "snake_case")]
#[structopt(global_setting = structopt::clap::AppSettings::AllowNegativeNumbers)]
pub enum Tc {
    /// Solve the trajectory again from the current scene.
    #[structopt(name = "recompute")]
    Recompute,

    /// Send the current trajectory to the drone, if it is feasible.
    #[structopt(name = "execute")]
    Execute,

    /// Set the final time of the trajectory in seconds.
    #[structopt(name = "set-final-time")]
    SetFinalTime { final_time_s: f64 },

    /// Set the requested number of samples in the trajectory.
    #[structopt(name = "set-horizon")]
    SetHorizon { horizon: u32 },

    /// Add an obstacle or waypoint to the scene.
    #[structopt(name = "add")]
    Add(AddCmd),

    /// Remove the obstacle with the given ID.
    #[structopt(name = "remove")]
    Remove { id: u32 },

    /// Swap an obstacle between keep-out and keep-in.
    #[structopt(name = "flip")]
    Flip { id: u32 },

    /// Duplicate the ellipse with the given ID at the same position.
    #[structopt(name = "duplicate")]
    Duplicate { id: u32 },

    /// Move the goal point to the given canvas position.
    #[structopt(name = "move-goal")]
    MoveGoal { x: f64, y: f64 },

    /// Change the telemetry port of an entity.
    #[structopt(name = "port")]
    Port(PortCmd),

    /// Load a mission file, replacing the current scene.
    #[structopt(name = "load")]
    Load { path: PathBuf },

    /// Save the current scene to a mission file.
    #[structopt(name = "save")]
    Save { path: PathBuf },

    /// Stop the executable.
    #[structopt(name = "exit")]
    Exit,
}

/// Items which can be added to the scene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, StructOpt)]
#[serde(rename_all = "snake_case")]
pub enum AddCmd {
    /// A circular obstacle.
    #[structopt(name = "ellipse")]
    Ellipse {
        x: f64,
        y: f64,
        radius: f64,

        /// Keep the vehicle inside the ellipse rather than outside it.
        #[structopt(long)]
        #[serde(default)]
        keep_in: bool,

        /// Telemetry port the ellipse's position is received on, 0 for none.
        #[structopt(long, default_value = "0")]
        #[serde(default)]
        port: u16,
    },

    /// A polygonal obstacle.
    #[structopt(name = "polygon")]
    Polygon {
        #[structopt(long)]
        #[serde(default)]
        keep_in: bool,

        /// Vertex coordinates as `x0 y0 x1 y1 ...`, at least three vertices.
        #[structopt(required = true)]
        points: Vec<f64>,
    },

    /// A plane, i.e. a line on the canvas splitting it into an allowed and forbidden side.
    #[structopt(name = "plane")]
    Plane {
        x1: f64,
        y1: f64,
        x2: f64,
        y2: f64,

        #[structopt(long)]
        #[serde(default)]
        keep_in: bool,
    },

    /// A waypoint, appended to the end of the waypoint list.
    #[structopt(name = "waypoint")]
    Waypoint { x: f64, y: f64 },
}

/// Telemetry port assignments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, StructOpt)]
#[serde(rename_all = "snake_case")]
pub enum PortCmd {
    /// Set the drone's receive port and the address trajectories are sent to.
    #[structopt(name = "drone")]
    Drone {
        port: u16,
        dest_ip: String,
        dest_port: u16,
    },

    /// Set the goal point's receive port.
    #[structopt(name = "goal")]
    Goal { port: u16 },

    /// Set the receive port of the obstacle with the given ID.
    #[structopt(name = "obstacle")]
    Obstacle { id: u32, port: u16 },
}

/// Possible parsing errors.
#[derive(Debug, Error)]
pub enum TcParseError {
    #[error("TC contains invalid JSON: {0}")]
    InvalidJson(serde_json::Error),

    #[error("Invalid command: {0}")]
    InvalidCommand(String),
}

// ------------------------------------------------------------------------------------------------
// IMPLEMENTATIONS
// ------------------------------------------------------------------------------------------------

impl Tc {
    /// Parse a new TC from a JSON string
    pub fn from_json(json_str: &str) -> Result<Self, TcParseError> {
        serde_json::from_str(json_str).map_err(TcParseError::InvalidJson)
    }

    /// Parse a new TC from a line typed into the console.
    ///
    /// Asking for help (`help`, `--help`) is reported as an `InvalidCommand` error whose message
    /// is the help text.
    pub fn from_console_line(line: &str) -> Result<Self, TcParseError> {
        Tc::from_iter_safe(std::iter::once("tc").chain(line.split_whitespace()))
            .map_err(|e| TcParseError::InvalidCommand(e.message))
    }

    /// Serialise the TC into a JSON string.
    pub fn to_json(&self) -> Result<String, TcParseError> {
        serde_json::to_string(self).map_err(TcParseError::InvalidJson)
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_from_json() {
        assert_eq!(Tc::from_json("\"execute\"").unwrap(), Tc::Execute);
        assert_eq!(
            Tc::from_json(r#"{"set_final_time": {"final_time_s": 7.5}}"#).unwrap(),
            Tc::SetFinalTime { final_time_s: 7.5 }
        );
        assert_eq!(
            Tc::from_json(r#"{"add": {"ellipse": {"x": 10, "y": -20, "radius": 5}}}"#).unwrap(),
            Tc::Add(AddCmd::Ellipse {
                x: 10.0,
                y: -20.0,
                radius: 5.0,
                keep_in: false,
                port: 0
            })
        );

        assert!(matches!(
            Tc::from_json("{\"bogus\": 1}"),
            Err(TcParseError::InvalidJson(_))
        ));
    }

    #[test]
    fn test_json_round_trip() {
        let tc = Tc::Port(PortCmd::Drone {
            port: 5000,
            dest_ip: String::from("127.0.0.1"),
            dest_port: 5001,
        });

        assert_eq!(Tc::from_json(&tc.to_json().unwrap()).unwrap(), tc);
    }

    #[test]
    fn test_from_console_line() {
        assert_eq!(Tc::from_console_line("recompute").unwrap(), Tc::Recompute);
        assert_eq!(
            Tc::from_console_line("  set-horizon   30 ").unwrap(),
            Tc::SetHorizon { horizon: 30 }
        );
        assert_eq!(
            Tc::from_console_line("add ellipse 150 -200 40 --keep-in --port 6001").unwrap(),
            Tc::Add(AddCmd::Ellipse {
                x: 150.0,
                y: -200.0,
                radius: 40.0,
                keep_in: true,
                port: 6001
            })
        );
        assert_eq!(
            Tc::from_console_line("add polygon 0 0 100 0 100 100").unwrap(),
            Tc::Add(AddCmd::Polygon {
                keep_in: false,
                points: vec![0.0, 0.0, 100.0, 0.0, 100.0, 100.0]
            })
        );
        assert_eq!(
            Tc::from_console_line("port obstacle 3 6002").unwrap(),
            Tc::Port(PortCmd::Obstacle { id: 3, port: 6002 })
        );
    }

    #[test]
    fn test_invalid_console_line() {
        assert!(Tc::from_console_line("").is_err());
        assert!(Tc::from_console_line("fly-to-the-moon").is_err());
        assert!(Tc::from_console_line("set-horizon many").is_err());
        assert!(Tc::from_console_line("remove").is_err());
    }
}
