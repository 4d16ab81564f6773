//! # Planner library.
//!
//! This library allows other crates in the workspace (and the benchmarks) to access items defined
//! inside the planner executable crate.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Data store - state shared between the modules of the executable
pub mod data_store;

/// Execution controller - decides when trajectories may be re-planned or sent to the vehicle
pub mod exec_ctrl;

/// Mission file - reads and writes constraint layouts
pub mod mission_file;

/// Optimiser adapter - converts scenes into optimiser problems and solutions into trajectories
pub mod opt;

/// Executable parameters
pub mod params;

/// Scene model - the obstacles, waypoints, goal and drone of a mission
pub mod scene;

/// Telemetry link - per-entity UDP endpoints for live positions and trajectory commands
pub mod tlm_link;

/// Telemetry server - publishes the planner state for monitoring
pub mod tm_server;
