//! # Mission File
//!
//! Reads and writes `.cst` constraint layouts. The layout is a big-endian stream following Qt
//! data stream conventions, where a `bool` is a single byte and a point is two `f64`s:
//!
//! ```text
//! u32 n_ellipses, { bool keep_in, point center, f64 radius, u16 port } * n_ellipses
//! u32 n_polygons, { bool keep_in, u32 n, point * n, u16 port } * n_polygons
//! u32 n_planes,   { bool keep_in, point p1, point p2, u16 port } * n_planes
//! u32 n_waypoints, point * n_waypoints, u16 port
//! point drone, u16 port
//! u32 n_path, point * n_path, u16 port
//! ```
//!
//! No version tag is written. Reader and writer both assume [`STREAM_VERSION`].

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::{
    fs,
    io::{self, Cursor, Read, Write},
    path::Path,
};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use log::{info, warn};

use crate::scene::{CanvasPoint, Inclusion, Scene, Shape};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Data stream version the layout follows (Qt 5.8).
pub const STREAM_VERSION: u32 = 18;

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum MissionFileError {
    #[error("Could not read the mission file: {0}")]
    FileReadError(io::Error),

    #[error("Could not write the mission file: {0}")]
    FileWriteError(io::Error),

    #[error("Mission file ended while reading {0}")]
    Truncated(&'static str),
}

// ------------------------------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Save the scene to the given path, replacing any existing file.
pub fn save<P: AsRef<Path>>(path: P, scene: &Scene) -> Result<(), MissionFileError> {
    let buf = to_bytes(scene).map_err(MissionFileError::FileWriteError)?;

    fs::write(path.as_ref(), buf).map_err(MissionFileError::FileWriteError)?;

    info!(
        "Mission saved to {:?} ({} obstacles)",
        path.as_ref(),
        scene.num_obstacles()
    );

    Ok(())
}

/// Load a mission from the given path.
///
/// The mission is read into a new scene built from `current` with [`Scene::fresh_from`], so the
/// goal, the drone's destination and the mission settings carry over. The caller only replaces
/// its scene if this succeeds.
pub fn load<P: AsRef<Path>>(path: P, current: &Scene) -> Result<Scene, MissionFileError> {
    let buf = fs::read(path.as_ref()).map_err(MissionFileError::FileReadError)?;

    let scene = from_bytes(&buf, current)?;

    info!(
        "Mission loaded from {:?} ({} obstacles, {} waypoints)",
        path.as_ref(),
        scene.num_obstacles(),
        scene.waypoints.points.len()
    );

    Ok(scene)
}

/// Encode the scene.
pub fn to_bytes(scene: &Scene) -> io::Result<Vec<u8>> {
    let mut w = Vec::new();

    w.write_u32::<BigEndian>(scene.num_ellipses() as u32)?;
    for obs in scene.ellipses() {
        if let Shape::Ellipse { ref center, radius } = obs.shape {
            write_bool(&mut w, obs.inclusion.is_keep_in())?;
            write_point(&mut w, center)?;
            w.write_f64::<BigEndian>(radius)?;
            w.write_u16::<BigEndian>(obs.port)?;
        }
    }

    w.write_u32::<BigEndian>(scene.polygons().count() as u32)?;
    for obs in scene.polygons() {
        if let Shape::Polygon { ref vertices } = obs.shape {
            write_bool(&mut w, obs.inclusion.is_keep_in())?;
            write_points(&mut w, vertices)?;
            w.write_u16::<BigEndian>(obs.port)?;
        }
    }

    w.write_u32::<BigEndian>(scene.planes().count() as u32)?;
    for obs in scene.planes() {
        if let Shape::Plane { ref p1, ref p2 } = obs.shape {
            write_bool(&mut w, obs.inclusion.is_keep_in())?;
            write_point(&mut w, p1)?;
            write_point(&mut w, p2)?;
            w.write_u16::<BigEndian>(obs.port)?;
        }
    }

    write_points(&mut w, &scene.waypoints.points)?;
    w.write_u16::<BigEndian>(scene.waypoints.port)?;

    write_point(&mut w, &scene.drone.pos)?;
    w.write_u16::<BigEndian>(scene.drone.port)?;

    write_points(&mut w, &scene.path.points)?;
    w.write_u16::<BigEndian>(scene.path.port)?;

    Ok(w)
}

/// Decode a scene, starting from a fresh copy of `current`.
///
/// Obstacles are kept exactly as written, including degenerate shapes the editor would refuse.
pub fn from_bytes(buf: &[u8], current: &Scene) -> Result<Scene, MissionFileError> {
    let mut scene = Scene::fresh_from(current);
    let mut r = Cursor::new(buf);

    let num_ellipses = read_u32(&mut r, "ellipses")?;
    for _ in 0..num_ellipses {
        let inclusion = read_inclusion(&mut r, "an ellipse")?;
        let center = read_point(&mut r, "an ellipse")?;
        let radius = read_f64(&mut r, "an ellipse")?;
        let port = read_u16(&mut r, "an ellipse")?;

        scene.insert_unchecked(Shape::Ellipse { center, radius }, inclusion, port);
    }

    let num_polygons = read_u32(&mut r, "polygons")?;
    for _ in 0..num_polygons {
        let inclusion = read_inclusion(&mut r, "a polygon")?;
        let vertices = read_points(&mut r, "a polygon")?;
        let port = read_u16(&mut r, "a polygon")?;

        scene.insert_unchecked(Shape::Polygon { vertices }, inclusion, port);
    }

    let num_planes = read_u32(&mut r, "planes")?;
    for _ in 0..num_planes {
        let inclusion = read_inclusion(&mut r, "a plane")?;
        let p1 = read_point(&mut r, "a plane")?;
        let p2 = read_point(&mut r, "a plane")?;
        let port = read_u16(&mut r, "a plane")?;

        scene.insert_unchecked(Shape::Plane { p1, p2 }, inclusion, port);
    }

    scene.waypoints.points = read_points(&mut r, "waypoints")?;
    scene.waypoints.port = read_u16(&mut r, "waypoints")?;

    scene.drone.pos = read_point(&mut r, "the drone")?;
    scene.drone.port = read_u16(&mut r, "the drone")?;

    scene.path.points = read_points(&mut r, "the path")?;
    scene.path.port = read_u16(&mut r, "the path")?;

    let remaining = buf.len() as u64 - r.position();
    if remaining > 0 {
        warn!("Ignoring {} trailing bytes in the mission file", remaining);
    }

    Ok(scene)
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

fn write_bool<W: Write>(w: &mut W, value: bool) -> io::Result<()> {
    w.write_u8(value as u8)
}

fn write_point<W: Write>(w: &mut W, p: &CanvasPoint) -> io::Result<()> {
    w.write_f64::<BigEndian>(p.x)?;
    w.write_f64::<BigEndian>(p.y)
}

fn write_points<W: Write>(w: &mut W, points: &[CanvasPoint]) -> io::Result<()> {
    w.write_u32::<BigEndian>(points.len() as u32)?;
    for p in points {
        write_point(w, p)?;
    }
    Ok(())
}

fn read_u32<R: Read>(r: &mut R, what: &'static str) -> Result<u32, MissionFileError> {
    r.read_u32::<BigEndian>()
        .map_err(|_| MissionFileError::Truncated(what))
}

fn read_u16<R: Read>(r: &mut R, what: &'static str) -> Result<u16, MissionFileError> {
    r.read_u16::<BigEndian>()
        .map_err(|_| MissionFileError::Truncated(what))
}

fn read_f64<R: Read>(r: &mut R, what: &'static str) -> Result<f64, MissionFileError> {
    r.read_f64::<BigEndian>()
        .map_err(|_| MissionFileError::Truncated(what))
}

/// Any nonzero byte is true.
fn read_inclusion<R: Read>(r: &mut R, what: &'static str) -> Result<Inclusion, MissionFileError> {
    let keep_in = r.read_u8().map_err(|_| MissionFileError::Truncated(what))? != 0;
    Ok(Inclusion::from_keep_in(keep_in))
}

fn read_point<R: Read>(r: &mut R, what: &'static str) -> Result<CanvasPoint, MissionFileError> {
    Ok(CanvasPoint::new(read_f64(r, what)?, read_f64(r, what)?))
}

fn read_points<R: Read>(
    r: &mut R,
    what: &'static str,
) -> Result<Vec<CanvasPoint>, MissionFileError> {
    let n = read_u32(r, what)?;

    // Not preallocated, a corrupt count must fail on the data rather than on allocation
    let mut points = Vec::new();
    for _ in 0..n {
        points.push(read_point(r, what)?);
    }

    Ok(points)
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------
