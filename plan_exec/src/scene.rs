//! # Scene Model
//!
//! The scene is the authoritative collection of mission entities: obstacles, waypoints, the goal
//! point, the drone, the latest path and trajectory, and the mission settings. Everything else in
//! the planner refers to obstacles through [`ObstacleId`] handles, never through references held
//! across cycles.
//!
//! All positions are canvas points, in canvas units (`GRID_SIZE` units per metre) with `x`
//! pointing east and `y` pointing south.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use comms_if::tlm::{Traj3Dof, Traj3DofSample};
use log::debug;
use nalgebra::Point2;
use serde::{Deserialize, Serialize};

use crate::opt::{MAX_CPOS, MAX_OBS};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Default trajectory duration in seconds.
pub const DEFAULT_FINAL_TIME_S: f64 = 5.0;

/// Default number of requested trajectory samples.
pub const DEFAULT_HORIZON_LENGTH: u32 = 20;

/// Message shown while no trajectory has been solved.
const NO_TRAJECTORY_MSG: &str = "No trajectory computed yet";

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// A point on the canvas.
pub type CanvasPoint = Point2<f64>;

/// Stable handle to an obstacle in a [`Scene`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObstacleId(pub u32);

/// An obstacle on the canvas.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Obstacle {
    pub id: ObstacleId,
    pub shape: Shape,
    pub inclusion: Inclusion,

    /// Telemetry port for tracking the obstacle's position, 0 if not tracked.
    pub port: u16,
}

/// The ordered waypoint list.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Waypoints {
    pub points: Vec<CanvasPoint>,
    pub port: u16,
}

/// The goal the trajectory must reach.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GoalPoint {
    pub pos: CanvasPoint,
    pub port: u16,
}

/// The vehicle being planned for.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Drone {
    pub pos: CanvasPoint,

    /// Port telemetry from the drone is received on.
    pub port: u16,

    /// Address trajectories are sent to.
    pub dest_ip: String,
    pub dest_port: u16,

    /// True once any telemetry has been received. While false the drone's position is simulated.
    pub connected: bool,
}

/// Canvas polyline of the latest solved trajectory.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PathPoints {
    pub points: Vec<CanvasPoint>,
    pub port: u16,
}

/// A solved trajectory in the vehicle NED frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Trajectory {
    /// Time between samples in seconds.
    pub dt_s: f64,

    pub samples: Vec<Traj3DofSample>,
}

/// Verdict on the latest solve.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Feasibility {
    pub feasible: bool,

    /// Message to display to the user.
    pub message: String,
}

/// The mission scene.
#[derive(Debug, Clone, Serialize)]
pub struct Scene {
    obstacles: Vec<Obstacle>,

    #[serde(skip)]
    next_id: u32,

    pub waypoints: Waypoints,
    pub goal: GoalPoint,
    pub drone: Drone,
    pub path: PathPoints,
    pub trajectory: Option<Trajectory>,
    pub feasibility: Feasibility,

    /// Duration of the trajectory in seconds.
    pub final_time_s: f64,

    /// Requested number of samples, clamped when solving.
    pub horizon_length: u32,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Obstacle geometry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Shape {
    Ellipse { center: CanvasPoint, radius: f64 },
    Polygon { vertices: Vec<CanvasPoint> },
    Plane { p1: CanvasPoint, p2: CanvasPoint },
}

/// Which side of an obstacle the vehicle must stay on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Inclusion {
    /// Avoid the inside of the region.
    KeepOut,

    /// Stay inside the region.
    KeepIn,
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum SceneError {
    #[error("No obstacle with ID {0:?}")]
    UnknownObstacle(ObstacleId),

    #[error("Obstacle {0:?} is not an ellipse")]
    NotAnEllipse(ObstacleId),

    #[error("A polygon needs at least 3 vertices, got {0}")]
    DegeneratePolygon(usize),

    #[error("A plane needs two distinct points")]
    DegeneratePlane,

    #[error("Ellipse radius must be positive, got {0}")]
    InvalidRadius(f64),

    #[error("Adding this obstacle would exceed capacity ({0} ellipses, {1} linear constraints)")]
    CapacityExceeded(usize, usize),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Default for Scene {
    fn default() -> Self {
        Self {
            obstacles: Vec::new(),
            next_id: 0,
            waypoints: Waypoints::default(),
            goal: GoalPoint {
                pos: CanvasPoint::new(300.0, -300.0),
                port: 0,
            },
            drone: Drone {
                pos: CanvasPoint::origin(),
                port: 0,
                dest_ip: String::new(),
                dest_port: 0,
                connected: false,
            },
            path: PathPoints::default(),
            trajectory: None,
            feasibility: Feasibility {
                feasible: false,
                message: String::from(NO_TRAJECTORY_MSG),
            },
            final_time_s: DEFAULT_FINAL_TIME_S,
            horizon_length: DEFAULT_HORIZON_LENGTH,
        }
    }
}

impl Scene {
    /// Build an empty scene which keeps the settings and non-persisted entities of `base`.
    ///
    /// Obstacles, waypoints, path points and any solved trajectory are cleared.
    pub fn fresh_from(base: &Scene) -> Self {
        Self {
            goal: base.goal.clone(),
            drone: Drone {
                connected: false,
                ..base.drone.clone()
            },
            final_time_s: base.final_time_s,
            horizon_length: base.horizon_length,
            ..Default::default()
        }
    }

    // ---- OBSTACLES ----

    /// All obstacles in insertion order.
    pub fn obstacles(&self) -> impl Iterator<Item = &Obstacle> {
        self.obstacles.iter()
    }

    /// All ellipses in insertion order.
    pub fn ellipses(&self) -> impl Iterator<Item = &Obstacle> {
        self.obstacles.iter().filter(|o| o.is_ellipse())
    }

    /// All polygons in insertion order.
    pub fn polygons(&self) -> impl Iterator<Item = &Obstacle> {
        self.obstacles
            .iter()
            .filter(|o| matches!(o.shape, Shape::Polygon { .. }))
    }

    /// All planes in insertion order.
    pub fn planes(&self) -> impl Iterator<Item = &Obstacle> {
        self.obstacles
            .iter()
            .filter(|o| matches!(o.shape, Shape::Plane { .. }))
    }

    pub fn num_obstacles(&self) -> usize {
        self.obstacles.len()
    }

    pub fn num_ellipses(&self) -> usize {
        self.ellipses().count()
    }

    /// Number of linear constraints the polygons and planes produce.
    pub fn num_linear_constraints(&self) -> usize {
        self.obstacles.iter().map(|o| o.num_linear_constraints()).sum()
    }

    pub fn get(&self, id: ObstacleId) -> Option<&Obstacle> {
        self.obstacles.iter().find(|o| o.id == id)
    }

    pub fn get_mut(&mut self, id: ObstacleId) -> Option<&mut Obstacle> {
        self.obstacles.iter_mut().find(|o| o.id == id)
    }

    /// Check that a shape can be added without exceeding the optimiser's capacity.
    pub fn check_capacity(&self, shape: &Shape, inclusion: Inclusion) -> Result<(), SceneError> {
        let new_ellipses = match shape {
            Shape::Ellipse { .. } => 1,
            _ => 0,
        };
        let new_constraints = shape.num_linear_constraints(inclusion);

        let num_ellipses = self.num_ellipses() + new_ellipses;
        let num_constraints = self.num_linear_constraints() + new_constraints;

        if num_ellipses > MAX_OBS || num_constraints > MAX_CPOS {
            Err(SceneError::CapacityExceeded(num_ellipses, num_constraints))
        } else {
            Ok(())
        }
    }

    /// Add an obstacle, returning its new handle.
    ///
    /// Capacity is not checked here, loading a mission must reproduce the file even if it is over
    /// capacity. The optimiser refuses to solve such a scene.
    pub fn add(
        &mut self,
        shape: Shape,
        inclusion: Inclusion,
        port: u16,
    ) -> Result<ObstacleId, SceneError> {
        shape.validate()?;

        Ok(self.insert_unchecked(shape, inclusion, port))
    }

    /// Insert an obstacle without validating its geometry.
    ///
    /// Mission files are reproduced as written, so degenerate shapes read from a file are kept.
    pub(crate) fn insert_unchecked(
        &mut self,
        shape: Shape,
        inclusion: Inclusion,
        port: u16,
    ) -> ObstacleId {
        let id = ObstacleId(self.next_id);
        self.next_id += 1;

        self.obstacles.push(Obstacle {
            id,
            shape,
            inclusion,
            port,
        });

        id
    }

    pub fn add_ellipse(
        &mut self,
        center: CanvasPoint,
        radius: f64,
        inclusion: Inclusion,
        port: u16,
    ) -> Result<ObstacleId, SceneError> {
        self.add(Shape::Ellipse { center, radius }, inclusion, port)
    }

    pub fn add_polygon(
        &mut self,
        vertices: Vec<CanvasPoint>,
        inclusion: Inclusion,
    ) -> Result<ObstacleId, SceneError> {
        self.add(Shape::Polygon { vertices }, inclusion, 0)
    }

    pub fn add_plane(
        &mut self,
        p1: CanvasPoint,
        p2: CanvasPoint,
        inclusion: Inclusion,
    ) -> Result<ObstacleId, SceneError> {
        self.add(Shape::Plane { p1, p2 }, inclusion, 0)
    }

    /// Remove an obstacle, returning it.
    pub fn remove(&mut self, id: ObstacleId) -> Result<Obstacle, SceneError> {
        let idx = self
            .obstacles
            .iter()
            .position(|o| o.id == id)
            .ok_or(SceneError::UnknownObstacle(id))?;

        Ok(self.obstacles.remove(idx))
    }

    /// Swap an obstacle between keep-out and keep-in.
    pub fn flip_direction(&mut self, id: ObstacleId) -> Result<Inclusion, SceneError> {
        let obs = self.get_mut(id).ok_or(SceneError::UnknownObstacle(id))?;
        obs.flip_direction();
        Ok(obs.inclusion)
    }

    /// Duplicate an ellipse in place. The copy keeps the geometry and inclusion but is untracked.
    pub fn duplicate(&mut self, id: ObstacleId) -> Result<ObstacleId, SceneError> {
        let obs = self.get(id).ok_or(SceneError::UnknownObstacle(id))?;

        if !obs.is_ellipse() {
            return Err(SceneError::NotAnEllipse(id));
        }

        let (shape, inclusion) = (obs.shape.clone(), obs.inclusion);
        self.add(shape, inclusion, 0)
    }

    pub fn set_port(&mut self, id: ObstacleId, port: u16) -> Result<(), SceneError> {
        self.get_mut(id).ok_or(SceneError::UnknownObstacle(id))?.port = port;
        Ok(())
    }

    /// Move the center of an ellipse, returns false if the handle is stale or not an ellipse.
    pub fn move_ellipse(&mut self, id: ObstacleId, pos: CanvasPoint) -> bool {
        match self.get_mut(id) {
            Some(Obstacle {
                shape: Shape::Ellipse { center, .. },
                ..
            }) => {
                *center = pos;
                true
            }
            _ => {
                debug!("Ignoring move of {:?}, not a live ellipse", id);
                false
            }
        }
    }

    // ---- WAYPOINTS AND PATH ----

    pub fn add_waypoint(&mut self, point: CanvasPoint) {
        self.waypoints.points.push(point);
    }

    /// Clear the solved trajectory and path, for example after the scene geometry was replaced.
    pub fn clear_solution(&mut self) {
        self.trajectory = None;
        self.path.points.clear();
        self.feasibility = Feasibility {
            feasible: false,
            message: String::from(NO_TRAJECTORY_MSG),
        };
    }
}

impl Obstacle {
    pub fn is_ellipse(&self) -> bool {
        matches!(self.shape, Shape::Ellipse { .. })
    }

    pub fn flip_direction(&mut self) {
        self.inclusion = self.inclusion.flipped();
    }

    /// Number of linear (half-space) constraints this obstacle contributes.
    pub fn num_linear_constraints(&self) -> usize {
        self.shape.num_linear_constraints(self.inclusion)
    }
}

impl Shape {
    /// Number of linear constraints the shape produces with the given inclusion.
    ///
    /// A keep-in polygon bounds every edge, a keep-out polygon is reduced to a single separating
    /// edge.
    pub fn num_linear_constraints(&self, inclusion: Inclusion) -> usize {
        match (self, inclusion) {
            (Shape::Ellipse { .. }, _) => 0,
            (Shape::Polygon { vertices }, Inclusion::KeepIn) => vertices.len(),
            (Shape::Polygon { vertices }, Inclusion::KeepOut) => vertices.len().min(1),
            (Shape::Plane { .. }, _) => 1,
        }
    }

    fn validate(&self) -> Result<(), SceneError> {
        match self {
            Shape::Ellipse { radius, .. } => {
                if *radius > 0.0 && radius.is_finite() {
                    Ok(())
                } else {
                    Err(SceneError::InvalidRadius(*radius))
                }
            }
            Shape::Polygon { vertices } => {
                if vertices.len() >= 3 {
                    Ok(())
                } else {
                    Err(SceneError::DegeneratePolygon(vertices.len()))
                }
            }
            Shape::Plane { p1, p2 } => {
                if p1 != p2 {
                    Ok(())
                } else {
                    Err(SceneError::DegeneratePlane)
                }
            }
        }
    }
}

impl Inclusion {
    pub fn flipped(self) -> Self {
        match self {
            Inclusion::KeepOut => Inclusion::KeepIn,
            Inclusion::KeepIn => Inclusion::KeepOut,
        }
    }

    pub fn from_keep_in(keep_in: bool) -> Self {
        if keep_in {
            Inclusion::KeepIn
        } else {
            Inclusion::KeepOut
        }
    }

    pub fn is_keep_in(self) -> bool {
        self == Inclusion::KeepIn
    }
}

impl Trajectory {
    /// Number of samples in the trajectory.
    pub fn k(&self) -> usize {
        self.samples.len()
    }

    /// Total duration of the trajectory in seconds.
    pub fn duration_s(&self) -> f64 {
        self.samples.last().map(|s| s.time_s).unwrap_or(0.0)
    }

    /// Build the packet sent to the vehicle.
    pub fn to_packet(&self) -> Traj3Dof {
        Traj3Dof {
            samples: self.samples.clone(),
        }
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    fn pt(x: f64, y: f64) -> CanvasPoint {
        CanvasPoint::new(x, y)
    }

    #[test]
    fn test_add_remove() {
        let mut scene = Scene::default();

        let e0 = scene.add_ellipse(pt(0.0, 0.0), 10.0, Inclusion::KeepOut, 0).unwrap();
        let p0 = scene
            .add_polygon(vec![pt(0.0, 0.0), pt(10.0, 0.0), pt(0.0, 10.0)], Inclusion::KeepIn)
            .unwrap();
        let e1 = scene.add_ellipse(pt(5.0, 5.0), 2.0, Inclusion::KeepIn, 6000).unwrap();

        assert_ne!(e0, e1);
        assert_eq!(scene.num_obstacles(), 3);
        assert_eq!(scene.num_ellipses(), 2);
        assert_eq!(scene.num_linear_constraints(), 3);

        // Per-kind iteration keeps insertion order
        let ids: Vec<_> = scene.ellipses().map(|o| o.id).collect();
        assert_eq!(ids, vec![e0, e1]);

        assert_eq!(scene.remove(p0).unwrap().inclusion, Inclusion::KeepIn);
        assert_eq!(scene.remove(p0), Err(SceneError::UnknownObstacle(p0)));
        assert_eq!(scene.num_linear_constraints(), 0);

        // Handles are never reused
        let e2 = scene.add_ellipse(pt(1.0, 1.0), 1.0, Inclusion::KeepOut, 0).unwrap();
        assert!(e2 != e0 && e2 != e1 && e2 != p0);
    }

    #[test]
    fn test_invalid_shapes() {
        let mut scene = Scene::default();

        assert_eq!(
            scene.add_polygon(vec![pt(0.0, 0.0), pt(1.0, 1.0)], Inclusion::KeepOut),
            Err(SceneError::DegeneratePolygon(2))
        );
        assert_eq!(
            scene.add_plane(pt(1.0, 1.0), pt(1.0, 1.0), Inclusion::KeepOut),
            Err(SceneError::DegeneratePlane)
        );
        assert_eq!(
            scene.add_ellipse(pt(1.0, 1.0), 0.0, Inclusion::KeepOut, 0),
            Err(SceneError::InvalidRadius(0.0))
        );
        assert_eq!(scene.num_obstacles(), 0);
    }

    #[test]
    fn test_flip_and_duplicate() {
        let mut scene = Scene::default();

        let e = scene.add_ellipse(pt(3.0, 4.0), 5.0, Inclusion::KeepOut, 6001).unwrap();
        let p = scene.add_plane(pt(0.0, 0.0), pt(1.0, 0.0), Inclusion::KeepOut).unwrap();

        assert_eq!(scene.flip_direction(e), Ok(Inclusion::KeepIn));
        assert_eq!(scene.flip_direction(p), Ok(Inclusion::KeepIn));
        assert_eq!(scene.flip_direction(p), Ok(Inclusion::KeepOut));

        let d = scene.duplicate(e).unwrap();
        let dup = scene.get(d).unwrap();
        assert_eq!(dup.shape, scene.get(e).unwrap().shape);
        assert_eq!(dup.inclusion, Inclusion::KeepIn);
        assert_eq!(dup.port, 0);

        assert_eq!(scene.duplicate(p), Err(SceneError::NotAnEllipse(p)));
    }

    #[test]
    fn test_move_ellipse() {
        let mut scene = Scene::default();

        let e = scene.add_ellipse(pt(0.0, 0.0), 5.0, Inclusion::KeepOut, 0).unwrap();
        let p = scene.add_plane(pt(0.0, 0.0), pt(1.0, 0.0), Inclusion::KeepOut).unwrap();

        assert!(scene.move_ellipse(e, pt(7.0, 8.0)));
        assert_eq!(
            scene.get(e).unwrap().shape,
            Shape::Ellipse { center: pt(7.0, 8.0), radius: 5.0 }
        );

        assert!(!scene.move_ellipse(p, pt(7.0, 8.0)));
        scene.remove(e).unwrap();
        assert!(!scene.move_ellipse(e, pt(1.0, 1.0)));
    }

    #[test]
    fn test_capacity() {
        let mut scene = Scene::default();

        for i in 0..MAX_OBS {
            let shape = Shape::Ellipse { center: pt(i as f64, 0.0), radius: 1.0 };
            assert!(scene.check_capacity(&shape, Inclusion::KeepOut).is_ok());
            scene.add(shape, Inclusion::KeepOut, 0).unwrap();
        }

        let shape = Shape::Ellipse { center: pt(0.0, 0.0), radius: 1.0 };
        assert_eq!(
            scene.check_capacity(&shape, Inclusion::KeepOut),
            Err(SceneError::CapacityExceeded(MAX_OBS + 1, 0))
        );

        let big_polygon = Shape::Polygon {
            vertices: (0..=MAX_CPOS).map(|i| pt(i as f64, (i * i) as f64)).collect(),
        };
        assert!(scene.check_capacity(&big_polygon, Inclusion::KeepIn).is_err());

        // Only one edge of a keep-out polygon is constrained
        assert!(scene.check_capacity(&big_polygon, Inclusion::KeepOut).is_ok());
    }

    #[test]
    fn test_fresh_from_keeps_settings() {
        let mut scene = Scene::default();
        scene.final_time_s = 9.0;
        scene.horizon_length = 33;
        scene.drone.dest_ip = String::from("10.0.0.2");
        scene.drone.connected = true;
        scene.add_waypoint(pt(1.0, 2.0));
        scene.add_ellipse(pt(0.0, 0.0), 5.0, Inclusion::KeepOut, 0).unwrap();

        let fresh = Scene::fresh_from(&scene);
        assert_eq!(fresh.final_time_s, 9.0);
        assert_eq!(fresh.horizon_length, 33);
        assert_eq!(fresh.drone.dest_ip, "10.0.0.2");
        assert!(!fresh.drone.connected);
        assert_eq!(fresh.num_obstacles(), 0);
        assert!(fresh.waypoints.points.is_empty());
    }
}
