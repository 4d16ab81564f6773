//! # Telecommand processor module
//!
//! The telecommand processor handles TCs coming from the script or the console.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{debug, error, info, warn};

// Internal
use comms_if::tc::{AddCmd, PortCmd, Tc};
use plan_lib::{
    data_store::DataStore,
    exec_ctrl::ExecuteOutcome,
    mission_file,
    scene::{CanvasPoint, Inclusion, ObstacleId, Shape},
};

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Execute a telecommand.
///
/// Mutates the datastore to send commands to different modules.
pub(crate) fn exec(ds: &mut DataStore, tc: &Tc) {
    let now_s = ds.sim_time_s;

    debug!("Executing TC: {:?}", tc);

    match tc {
        Tc::Recompute => ds.recompute(),
        Tc::Execute => match ds.exec_ctrl.execute(&mut ds.scene, now_s) {
            ExecuteOutcome::Executed => ds.notify("Trajectory executed"),
            ExecuteOutcome::RejectedInfeasible => {
                ds.notify("Cannot execute, the trajectory is not feasible")
            }
            ExecuteOutcome::RejectedFrozen => {
                ds.notify("Cannot execute while the previous trajectory is in flight")
            }
        },
        Tc::SetFinalTime { final_time_s } => {
            let result = ds
                .exec_ctrl
                .set_final_time(&mut ds.scene, *final_time_s, now_s);
            ds.handle_recompute(result);
        }
        Tc::SetHorizon { horizon } => {
            let result = ds
                .exec_ctrl
                .set_horizon_length(&mut ds.scene, *horizon, now_s);
            ds.handle_recompute(result);
        }
        Tc::Add(cmd) => add(ds, cmd),
        Tc::Remove { id } => {
            let id = ObstacleId(*id);
            match ds.scene.remove(id) {
                Ok(_) => {
                    ds.tlm_link.remove_obstacle_endpoint(id);
                    ds.refresh = true;
                    info!("Removed obstacle {}", id.0);
                }
                Err(e) => warn!("Cannot remove obstacle: {}", e),
            }
        }
        Tc::Flip { id } => match ds.scene.flip_direction(ObstacleId(*id)) {
            Ok(inclusion) => {
                ds.refresh = true;
                info!("Obstacle {} is now {:?}", id, inclusion);
            }
            Err(e) => warn!("Cannot flip obstacle: {}", e),
        },
        Tc::Duplicate { id } => duplicate(ds, ObstacleId(*id)),
        Tc::MoveGoal { x, y } => {
            ds.scene.goal.pos = CanvasPoint::new(*x, *y);
            ds.refresh = true;
        }
        Tc::Port(cmd) => {
            if set_port(ds, cmd) {
                ds.restart_link();
                ds.recompute();
            }
        }
        Tc::Load { path } => match mission_file::load(path, &ds.scene) {
            Ok(scene) => {
                ds.replace_scene(scene);
                ds.recompute();
            }
            Err(e) => {
                error!("Cannot load mission {:?}: {}", path, e);
                ds.notify(format!("Could not load {}: {}", path.display(), e));
            }
        },
        Tc::Save { path } => {
            if let Err(e) = mission_file::save(path, &ds.scene) {
                error!("Cannot save mission {:?}: {}", path, e);
                ds.notify(format!("Could not save {}: {}", path.display(), e));
            }
        }
        Tc::Exit => {
            info!("Exit requested");
            ds.exit = true;
        }
    }
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

fn add(ds: &mut DataStore, cmd: &AddCmd) {
    let (shape, inclusion, port) = match cmd {
        AddCmd::Ellipse {
            x,
            y,
            radius,
            keep_in,
            port,
        } => (
            Shape::Ellipse {
                center: CanvasPoint::new(*x, *y),
                radius: *radius,
            },
            Inclusion::from_keep_in(*keep_in),
            *port,
        ),
        AddCmd::Polygon { keep_in, points } => {
            if points.len() % 2 != 0 {
                warn!("Polygon needs an even number of coordinates, got {}", points.len());
                return;
            }

            let vertices = points
                .chunks(2)
                .map(|c| CanvasPoint::new(c[0], c[1]))
                .collect();

            (
                Shape::Polygon { vertices },
                Inclusion::from_keep_in(*keep_in),
                0,
            )
        }
        AddCmd::Plane {
            x1,
            y1,
            x2,
            y2,
            keep_in,
        } => (
            Shape::Plane {
                p1: CanvasPoint::new(*x1, *y1),
                p2: CanvasPoint::new(*x2, *y2),
            },
            Inclusion::from_keep_in(*keep_in),
            0,
        ),
        AddCmd::Waypoint { x, y } => {
            ds.scene.add_waypoint(CanvasPoint::new(*x, *y));
            ds.refresh = true;
            return;
        }
    };

    if let Err(e) = ds.scene.check_capacity(&shape, inclusion) {
        warn!("Obstacle not added: {}", e);
        ds.notify(format!("Obstacle not added: {}", e));
        return;
    }

    match ds.scene.add(shape, inclusion, port) {
        Ok(id) => {
            info!("Added obstacle {}", id.0);
            ds.refresh = true;
            if port != 0 {
                ds.restart_link();
            }
        }
        Err(e) => warn!("Obstacle not added: {}", e),
    }
}

fn duplicate(ds: &mut DataStore, id: ObstacleId) {
    let (shape, inclusion) = match ds.scene.get(id) {
        Some(obs) => (obs.shape.clone(), obs.inclusion),
        None => {
            warn!("Cannot duplicate obstacle {}, it does not exist", id.0);
            return;
        }
    };

    if let Err(e) = ds.scene.check_capacity(&shape, inclusion) {
        warn!("Obstacle not duplicated: {}", e);
        ds.notify(format!("Obstacle not duplicated: {}", e));
        return;
    }

    match ds.scene.duplicate(id) {
        Ok(new_id) => {
            info!("Duplicated obstacle {} as {}", id.0, new_id.0);
            ds.refresh = true;
        }
        Err(e) => warn!("Cannot duplicate obstacle: {}", e),
    }
}

/// Apply a port change, returns true if anything changed.
fn set_port(ds: &mut DataStore, cmd: &PortCmd) -> bool {
    match cmd {
        PortCmd::Drone {
            port,
            dest_ip,
            dest_port,
        } => {
            let drone = &mut ds.scene.drone;
            let changed =
                drone.port != *port || drone.dest_ip != *dest_ip || drone.dest_port != *dest_port;

            drone.port = *port;
            drone.dest_ip = dest_ip.clone();
            drone.dest_port = *dest_port;

            changed
        }
        PortCmd::Goal { port } => {
            let changed = ds.scene.goal.port != *port;
            ds.scene.goal.port = *port;
            changed
        }
        PortCmd::Obstacle { id, port } => {
            let id = ObstacleId(*id);
            match ds.scene.get(id).map(|o| o.port) {
                Some(old) => {
                    if let Err(e) = ds.scene.set_port(id, *port) {
                        warn!("Cannot set obstacle port: {}", e);
                        return false;
                    }
                    old != *port
                }
                None => {
                    warn!("Cannot set the port of obstacle {}, it does not exist", id.0);
                    false
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
