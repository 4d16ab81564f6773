//! # Data Store

use comms_if::net::NetParams;
use log::{error, info};

use crate::{
    exec_ctrl::{ExecCtrl, ExecCtrlError, RecomputeOutcome},
    scene::Scene,
    tlm_link::TlmLink,
};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Global data store for the executable.
pub struct DataStore {
    // Cycle management
    /// Number of cycles already executed
    pub num_cycles: u128,

    /// Session elapsed time at the start of this cycle
    pub sim_time_s: f64,

    /// Session time of the last automatic recompute
    pub last_recompute_s: f64,

    /// Set when the executable should stop at the end of the cycle
    pub exit: bool,

    // Mission
    pub scene: Scene,
    pub exec_ctrl: ExecCtrl,
    pub tlm_link: TlmLink,

    /// Set when the scene changed and telemetry should be published
    pub refresh: bool,

    /// Latest status message for the user
    pub user_message: String,

    // Monitoring Counters
    /// Number of consecutive cycle overruns
    pub num_consec_cycle_overruns: u64,
}

// ---------------------------------------------------------------------------
// IMPLS
// ---------------------------------------------------------------------------

impl DataStore {
    pub fn new(scene: Scene, net_params: &NetParams) -> Self {
        Self {
            num_cycles: 0,
            sim_time_s: 0.0,
            last_recompute_s: 0.0,
            exit: false,
            user_message: scene.feasibility.message.clone(),
            scene,
            exec_ctrl: ExecCtrl::default(),
            tlm_link: TlmLink::new(net_params),
            refresh: true,
            num_consec_cycle_overruns: 0,
        }
    }

    /// Perform actions required at the start of a cycle.
    pub fn cycle_start(&mut self) {
        self.sim_time_s = util::session::get_elapsed_seconds();
    }

    /// Show a message to the user with the next telemetry.
    pub fn notify<S: Into<String>>(&mut self, message: S) {
        self.user_message = message.into();
        self.refresh = true;
    }

    /// Rebind the telemetry link to the current scene's ports.
    pub fn restart_link(&mut self) {
        info!("Restarting the telemetry link");
        self.tlm_link.start(&self.scene);
    }

    /// Replace the scene, for example after loading a mission.
    ///
    /// The execution controller is reset and the link rebound to the new scene.
    pub fn replace_scene(&mut self, scene: Scene) {
        self.scene = scene;
        self.exec_ctrl.reset();
        self.restart_link();
        self.refresh = true;
    }

    /// Recompute the trajectory now.
    pub fn recompute(&mut self) {
        self.last_recompute_s = self.sim_time_s;
        let result = self.exec_ctrl.recompute(&mut self.scene, self.sim_time_s);
        self.handle_recompute(result);
    }

    /// Report a failed recompute to the user. Successful ones report through exec events.
    pub fn handle_recompute(&mut self, result: Result<RecomputeOutcome, ExecCtrlError>) {
        if let Err(e) = result {
            error!("Recompute aborted: {}", e);
            self.notify(format!("Recompute aborted: {}", e));
        }
    }

    /// True if an automatic recompute is due.
    pub fn is_recompute_due(&self, recompute_period_s: f64) -> bool {
        self.sim_time_s - self.last_recompute_s >= recompute_period_s
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
