//! # Communications interface crate.
//!
//! Provides all common communications interfaces for the planner software.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

pub mod tc;

/// Binary telemetry and trajectory packets exchanged with the vehicle
pub mod tlm;

/// Network module
pub mod net;
