//! # Obstacle constraints
//!
//! Conversion of scene obstacles into the circle and half-space constraints the solver accepts.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::Serialize;
use std::cmp::Ordering;

use super::canvas_to_solver;
use crate::scene::{CanvasPoint, Inclusion, Obstacle, Shape};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// A circular constraint in the solver's horizontal plane.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Circle {
    /// `+1` keep out, `-1` keep in.
    pub sign: f64,
    pub r: f64,
    pub c_n: f64,
    pub c_e: f64,
}

/// A half-space `a . (r_n, r_e) <= b` in the solver's horizontal plane.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HalfSpace {
    pub a: [f64; 2],
    pub b: f64,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum Constraints {
    Circle(Circle),
    HalfSpaces(Vec<HalfSpace>),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Obstacle {
    /// The constraints this obstacle places on a trajectory flown from `start` to `goal`.
    ///
    /// Planes allow the left of `p1 -> p2` (as seen on a north-up map) when keep-out, and the
    /// right when keep-in. Keep-in polygons produce one half-space per edge with the inside
    /// allowed. The outside of a polygon is not convex, so a keep-out polygon is reduced to the
    /// single edge whose outer side gives the start and goal the most clearance.
    pub fn to_constraints(&self, start: &CanvasPoint, goal: &CanvasPoint) -> Constraints {
        match self.shape {
            Shape::Ellipse { ref center, radius } => {
                let r = canvas_to_solver(center);
                Constraints::Circle(Circle {
                    sign: match self.inclusion {
                        Inclusion::KeepOut => 1.0,
                        Inclusion::KeepIn => -1.0,
                    },
                    r: radius / super::GRID_SIZE,
                    c_n: r[1],
                    c_e: r[2],
                })
            }
            Shape::Plane { ref p1, ref p2 } => Constraints::HalfSpaces(vec![HalfSpace::from_edge(
                p1,
                p2,
                self.inclusion == Inclusion::KeepOut,
            )]),
            Shape::Polygon { ref vertices } => {
                let ccw = signed_area(vertices) > 0.0;

                // Interior is on the left of every edge of a counter-clockwise polygon
                let allow_left = ccw == self.inclusion.is_keep_in();

                let edges = vertices
                    .iter()
                    .zip(vertices.iter().cycle().skip(1))
                    .map(|(a, b)| HalfSpace::from_edge(a, b, allow_left));

                match self.inclusion {
                    Inclusion::KeepIn => Constraints::HalfSpaces(edges.collect()),
                    Inclusion::KeepOut => {
                        let ends = [canvas_to_solver(start), canvas_to_solver(goal)];
                        let ends = [[ends[0][1], ends[0][2]], [ends[1][1], ends[1][2]]];

                        Constraints::HalfSpaces(
                            edges
                                .max_by(|x, y| {
                                    x.clearance(&ends)
                                        .partial_cmp(&y.clearance(&ends))
                                        .unwrap_or(Ordering::Equal)
                                })
                                .into_iter()
                                .collect(),
                        )
                    }
                }
            }
        }
    }
}

impl HalfSpace {
    /// Build the half-space bounded by the line through two canvas points.
    pub fn from_edge(p1: &CanvasPoint, p2: &CanvasPoint, allow_left: bool) -> Self {
        let r1 = canvas_to_solver(p1);
        let r2 = canvas_to_solver(p2);
        let (p1_n, p1_e) = (r1[1], r1[2]);
        let (d_n, d_e) = (r2[1] - p1_n, r2[2] - p1_e);

        // Left of the edge is where d_e * (n - p1_n) - d_n * (e - p1_e) > 0
        let a = [-d_e, d_n];
        let b = a[0] * p1_n + a[1] * p1_e;

        if allow_left {
            Self { a, b }
        } else {
            Self {
                a: [-a[0], -a[1]],
                b: -b,
            }
        }
    }

    /// Amount by which a (north, east) position violates the constraint, negative if satisfied.
    pub fn violation(&self, n: f64, e: f64) -> f64 {
        self.a[0] * n + self.a[1] * e - self.b
    }

    /// Smallest distance of the (north, east) points inside the allowed side, negative if any
    /// point is outside it.
    fn clearance(&self, points: &[[f64; 2]]) -> f64 {
        let norm = self.a[0].hypot(self.a[1]);
        if norm == 0.0 {
            return f64::NEG_INFINITY;
        }

        points
            .iter()
            .map(|p| -self.violation(p[0], p[1]) / norm)
            .fold(f64::INFINITY, f64::min)
    }
}

impl Circle {
    /// Amount by which a (north, east) position violates the constraint, negative if satisfied.
    pub fn violation(&self, n: f64, e: f64) -> f64 {
        let dist = (n - self.c_n).hypot(e - self.c_e);
        self.sign * (self.r - dist)
    }
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Signed area of a polygon in the north-up (east, north) plane, positive when counter-clockwise.
fn signed_area(vertices: &[CanvasPoint]) -> f64 {
    let area2: f64 = vertices
        .iter()
        .zip(vertices.iter().cycle().skip(1))
        .map(|(a, b)| {
            let (ra, rb) = (canvas_to_solver(a), canvas_to_solver(b));
            ra[2] * rb[1] - rb[2] * ra[1]
        })
        .sum();

    area2 * 0.5
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::scene::ObstacleId;

    fn obstacle(shape: Shape, inclusion: Inclusion) -> Obstacle {
        Obstacle {
            id: ObstacleId(0),
            shape,
            inclusion,
            port: 0,
        }
    }

    /// Constraints for a trajectory which starts and ends at the canvas origin.
    fn at_origin(o: &Obstacle) -> Constraints {
        o.to_constraints(&CanvasPoint::origin(), &CanvasPoint::origin())
    }

    fn half_spaces(c: Constraints) -> Vec<HalfSpace> {
        match c {
            Constraints::HalfSpaces(h) => h,
            c => panic!("Expected half-spaces, got {:?}", c),
        }
    }

    #[test]
    fn test_ellipse_constraint() {
        let keep_out = obstacle(
            Shape::Ellipse { center: CanvasPoint::new(200.0, -100.0), radius: 50.0 },
            Inclusion::KeepOut,
        );

        assert_eq!(
            at_origin(&keep_out),
            Constraints::Circle(Circle { sign: 1.0, r: 0.5, c_n: 1.0, c_e: 2.0 })
        );

        let mut keep_in = keep_out.clone();
        keep_in.flip_direction();
        match at_origin(&keep_in) {
            Constraints::Circle(c) => {
                assert_eq!(c.sign, -1.0);
                assert!(c.violation(1.0, 2.0) < 0.0);
                assert!(c.violation(3.0, 2.0) > 0.0);
            }
            c => panic!("Expected a circle, got {:?}", c),
        }
    }

    #[test]
    fn test_plane_sides() {
        // Pointing east, the left side is north, which is negative canvas y
        let plane = obstacle(
            Shape::Plane { p1: CanvasPoint::new(0.0, 0.0), p2: CanvasPoint::new(100.0, 0.0) },
            Inclusion::KeepOut,
        );

        let h = half_spaces(at_origin(&plane));
        assert_eq!(h.len(), 1);
        assert!(h[0].violation(0.5, 0.5) < 0.0);
        assert!(h[0].violation(-0.5, 0.5) > 0.0);

        let mut flipped = plane.clone();
        flipped.flip_direction();
        let h = half_spaces(at_origin(&flipped));
        assert!(h[0].violation(0.5, 0.5) > 0.0);
        assert!(h[0].violation(-0.5, 0.5) < 0.0);
    }

    #[test]
    fn test_polygon_sides_independent_of_winding() {
        // A 1m square with corners at (0, 0) and (1, 1) in (north, east)
        let square = vec![
            CanvasPoint::new(0.0, 0.0),
            CanvasPoint::new(100.0, 0.0),
            CanvasPoint::new(100.0, -100.0),
            CanvasPoint::new(0.0, -100.0),
        ];
        let mut reversed = square.clone();
        reversed.reverse();

        // South west of the square, looking north east
        let start = CanvasPoint::new(-300.0, 200.0);
        let goal = CanvasPoint::new(-200.0, 300.0);

        for vertices in vec![square, reversed] {
            let keep_in = half_spaces(
                obstacle(Shape::Polygon { vertices: vertices.clone() }, Inclusion::KeepIn)
                    .to_constraints(&start, &goal),
            );
            assert_eq!(keep_in.len(), 4);
            assert!(keep_in.iter().all(|h| h.violation(0.5, 0.5) < 0.0));
            assert!(keep_in.iter().any(|h| h.violation(2.0, 0.5) > 0.0));

            let keep_out = half_spaces(
                obstacle(Shape::Polygon { vertices }, Inclusion::KeepOut)
                    .to_constraints(&start, &goal),
            );
            assert_eq!(keep_out.len(), 1);
            assert!(keep_out[0].violation(0.5, 0.5) > 0.0);
        }
    }

    #[test]
    fn test_keep_out_polygon_separates_start_and_goal() {
        // 1m square 10m north of an east-west path
        let square = Shape::Polygon {
            vertices: vec![
                CanvasPoint::new(0.0, -1000.0),
                CanvasPoint::new(100.0, -1000.0),
                CanvasPoint::new(100.0, -1100.0),
                CanvasPoint::new(0.0, -1100.0),
            ],
        };
        let start = CanvasPoint::new(0.0, 0.0);
        let goal = CanvasPoint::new(200.0, 0.0);

        let h = half_spaces(obstacle(square, Inclusion::KeepOut).to_constraints(&start, &goal));
        assert_eq!(h.len(), 1);

        // The south edge is kept, the whole path lies on its allowed side
        assert_eq!(h[0].violation(10.0, 0.0), 0.0);
        for e in vec![0.0, 1.0, 2.0] {
            assert!(h[0].violation(0.0, e) < 0.0);
        }
        assert!(h[0].violation(10.5, 0.5) > 0.0);
    }

    #[test]
    fn test_degenerate_polygon_constraints() {
        let start = CanvasPoint::new(0.0, 0.0);
        let goal = CanvasPoint::new(100.0, 0.0);

        let empty = obstacle(Shape::Polygon { vertices: vec![] }, Inclusion::KeepOut);
        assert_eq!(half_spaces(empty.to_constraints(&start, &goal)).len(), 0);
        assert_eq!(empty.num_linear_constraints(), 0);

        let point = obstacle(
            Shape::Polygon { vertices: vec![CanvasPoint::new(50.0, 50.0)] },
            Inclusion::KeepOut,
        );
        let h = half_spaces(point.to_constraints(&start, &goal));
        assert_eq!(h.len(), point.num_linear_constraints());
        assert!(h[0].violation(0.0, 0.0) <= 0.0);
    }
}
