//! Main trajectory planner executable entry point.
//!
//! # Architecture
//!
//! The executable runs a single fixed period loop:
//!
//!     - Telecommand processing, from a script or the interactive console
//!     - Telemetry input, moving tracked entities
//!     - Periodic trajectory recompute
//!     - Execution event routing:
//!         - Sending executed trajectories to the drone
//!         - Updating the user message
//!     - Drone simulation while no drone telemetry is received
//!     - Telemetry output to the monitor
//!
//! The solver runs synchronously inside the loop, so at most one solve is ever in flight.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod console;
mod tc_processor;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use color_eyre::{
    eyre::{eyre, WrapErr},
    Report,
};
use log::{debug, error, info, warn};
use std::{
    path::PathBuf,
    sync::mpsc::{self, Receiver, TryRecvError},
    thread,
    time::{Duration, Instant},
};
use structopt::StructOpt;

// Internal
use comms_if::{net::NetParams, tc::Tc};
use plan_lib::{
    data_store::DataStore,
    exec_ctrl::{ExecCtrl, ExecEvent},
    opt::{QuinticParams, QuinticSolver},
    params::PlanExecParams,
    tlm_link::SendOutcome,
    tm_server::TmServer,
};
use util::{
    logger::{logger_init, LevelFilter},
    script_interpreter::{PendingTcs, ScriptInterpreter},
    session::{self, Session},
};

// ---------------------------------------------------------------------------
// STRUCTS
// ---------------------------------------------------------------------------

#[derive(Debug, StructOpt)]
#[structopt(name = "plan_exec", about = "Trajectory planning and execution executive")]
struct Args {
    /// Telecommand script to run, the executable stops at the end of the script.
    #[structopt(parse(from_os_str))]
    script: Option<PathBuf>,

    /// Read telecommands from an interactive console.
    #[structopt(long)]
    console: bool,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Various sources for the telecommands incoming to the exec.
enum TcSource {
    None,
    Console(Receiver<Tc>),
    Script(ScriptInterpreter),
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Executable main function, entry point.
fn main() -> Result<(), Report> {
    color_eyre::install()?;

    let args = Args::from_args();

    // ---- EARLY INITIALISATION ----

    let session = Session::new("plan_exec", "sessions").wrap_err("Failed to create the session")?;

    logger_init(LevelFilter::Debug, &session).wrap_err("Failed to initialise logging")?;

    info!("Trajectory Planner Executable\n");
    info!("Session directory: {:?}\n", session.session_root);
    debug!("CLI arguments: {:?}", args);

    // ---- LOAD PARAMETERS ----

    let exec_params: PlanExecParams =
        util::params::load("plan_exec.toml").wrap_err("Could not load exec params")?;
    let net_params: NetParams =
        util::params::load("net.toml").wrap_err("Could not load net params")?;
    let opt_params: QuinticParams =
        util::params::load("opt.toml").wrap_err("Could not load optimiser params")?;

    info!("Exec parameters loaded");

    // ---- INITIALISE TC SOURCE ----

    let tc_source = match (args.script, args.console) {
        (Some(_), true) => {
            return Err(eyre!("A script and the console cannot be used together"));
        }
        (Some(path), false) => {
            info!("Loading script from {:?}", path);

            let si = ScriptInterpreter::new(&path).wrap_err("Failed to load script")?;

            info!(
                "Loaded script lasts {:.02} s and contains {} TCs\n",
                si.get_duration(),
                si.get_num_tcs()
            );

            TcSource::Script(si)
        }
        (None, true) => {
            info!("Starting the console, type `help` for a list of commands\n");
            let (tx, rx) = mpsc::channel();
            console::spawn(tx);
            TcSource::Console(rx)
        }
        (None, false) => {
            info!("No script or console, running on telemetry only\n");
            TcSource::None
        }
    };

    // ---- INITIALISE DATASTORE ----

    info!("Initialising modules...");

    let mut ds = DataStore::new(exec_params.initial_scene(), &net_params);

    ds.exec_ctrl = ExecCtrl::new(QuinticSolver::new(opt_params));
    ds.exec_ctrl
        .init_archive(&session)
        .wrap_err("Failed to initialise ExecCtrl")?;
    info!("ExecCtrl init complete");

    // ---- INITIALISE NETWORK ----

    info!("Initialising network");

    ds.restart_link();

    let tm_server = match net_params.tm_endpoint {
        Some(ref endpoint) => {
            let s = TmServer::new(endpoint, &net_params)
                .wrap_err("Failed to initialise TmServer")?;
            info!("TmServer publishing to {}", endpoint);
            Some(s)
        }
        None => {
            info!("No TM endpoint configured, telemetry disabled");
            None
        }
    };

    info!("Network initialisation complete");

    // ---- MAIN LOOP ----

    info!("Beginning main loop\n");

    run(&mut ds, tc_source, tm_server.as_ref(), &exec_params);

    // ---- SHUTDOWN ----

    ds.tlm_link.close_all();
    session.exit();

    info!("End of execution");

    Ok(())
}

fn run(
    ds: &mut DataStore,
    mut tc_source: TcSource,
    tm_server: Option<&TmServer>,
    params: &PlanExecParams,
) {
    let cycle_period = Duration::from_secs_f64(params.cycle_period_s);

    ds.cycle_start();
    ds.recompute();

    loop {
        let cycle_start_instant = Instant::now();

        ds.cycle_start();

        // ---- TELECOMMAND PROCESSING ----

        match tc_source {
            TcSource::None => (),
            TcSource::Console(ref rx) => loop {
                match rx.try_recv() {
                    Ok(tc) => tc_processor::exec(ds, &tc),
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        warn!("Console closed");
                        ds.exit = true;
                        break;
                    }
                }
            },
            TcSource::Script(ref mut si) => match si.get_pending_tcs_at(ds.sim_time_s) {
                PendingTcs::None => (),
                PendingTcs::Some(tc_vec) => {
                    for tc in tc_vec.iter() {
                        tc_processor::exec(ds, tc);
                    }
                }
                PendingTcs::EndOfScript => {
                    info!("End of TC script reached, stopping");
                    ds.exit = true;
                }
            },
        }

        // ---- TELEMETRY INPUT ----

        if !ds.tlm_link.poll(&mut ds.scene).is_empty() {
            ds.refresh = true;
        }

        // ---- PLANNING ----

        if ds.is_recompute_due(params.recompute_period_s) {
            ds.recompute();
        }

        route_exec_events(ds);

        // ---- SIMULATION ----

        if ds.exec_ctrl.sim_drone(&mut ds.scene, ds.sim_time_s) {
            ds.refresh = true;
        }

        // ---- TELEMETRY OUTPUT ----

        if ds.refresh {
            if let Some(s) = tm_server {
                if let Err(e) = s.send(ds) {
                    warn!("TmServer error: {}", e);
                }
            }
            ds.refresh = false;
        }

        if ds.exit {
            break;
        }

        // ---- CYCLE MANAGEMENT ----

        let cycle_dur = Instant::now() - cycle_start_instant;

        match cycle_period.checked_sub(cycle_dur) {
            Some(d) => {
                ds.num_consec_cycle_overruns = 0;
                thread::sleep(d);
            }
            None => {
                warn!(
                    "Cycle overran by {:.06} s",
                    cycle_dur.as_secs_f64() - cycle_period.as_secs_f64()
                );
                ds.num_consec_cycle_overruns += 1;

                if ds.num_consec_cycle_overruns == params.max_consec_cycle_overruns {
                    error!(
                        "{} consecutive cycle overruns, the solver may be too slow for the cycle \
                        period",
                        ds.num_consec_cycle_overruns
                    );
                }
            }
        }

        ds.num_cycles += 1;
    }
}

/// Act on everything the execution controller raised this cycle.
fn route_exec_events(ds: &mut DataStore) {
    for event in ds.exec_ctrl.drain_events() {
        match event {
            ExecEvent::TrajectoryExecuted(traj) => {
                match ds.tlm_link.send_trajectory(&ds.scene, &traj) {
                    Ok(SendOutcome::Sent(len)) => info!("Trajectory sent to the drone ({} bytes)", len),
                    Ok(outcome) => debug!("Trajectory not sent: {:?}", outcome),
                    Err(e) => warn!("{}", e),
                }

                session::save_with_timestamp("executed_traj.json", traj);
            }
            ExecEvent::Feasibility(feasibility) => {
                ds.user_message = feasibility.message;
            }
            ExecEvent::RefreshGraphics => ds.refresh = true,
        }
    }
}
