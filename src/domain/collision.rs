//! Collision detection based on basic shapes.

use super::{Angle, Position};

pub trait HasCollision {
    fn shape(&self) -> Shape;
}

/// Rectangle of `2 * half_x` by `2 * half_z`, yawed by `rotation` about its center.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Shape {
    position: Position,
    half_x: f64,
    half_z: f64,
    rotation: Angle,
}

impl Shape {
    pub fn rectangle(position: Position, half_x: f64, half_z: f64, rotation: Angle) -> Self {
        Shape {
            position,
            half_x,
            half_z,
            rotation,
        }
    }

    pub fn position(&self) -> Position {
        self.position
    }

    /// Radius of the smallest circle around the center that contains the shape.
    pub fn bounding_radius(&self) -> f64 {
        self.half_x.hypot(self.half_z)
    }

    pub fn contains(&self, point: Position) -> bool {
        let local = (point - self.position).unrotate_vector(self.rotation);
        local.x().abs() <= self.half_x + f64::EPSILON
            && local.z().abs() <= self.half_z + f64::EPSILON
    }

    /// Separating axis test. Touching edges count as intersecting.
    pub fn has_intersection(&self, other: &Shape) -> bool {
        let axes = [self.axes(), other.axes()];
        axes.iter().flatten().all(|axis| {
            let (min, max) = self.project(*axis);
            let (other_min, other_max) = other.project(*axis);
            max + f64::EPSILON >= other_min && other_max + f64::EPSILON >= min
        })
    }

    pub fn corners(&self) -> [Position; 4] {
        let (half_x, half_z) = (self.half_x, self.half_z);
        [
            Position::new(-half_x, -half_z),
            Position::new(half_x, -half_z),
            Position::new(half_x, half_z),
            Position::new(-half_x, half_z),
        ]
        .map(|c| self.position + c.rotate_vector(self.rotation))
    }

    fn axes(&self) -> [Position; 2] {
        [
            Position::new(1.0, 0.0).rotate_vector(self.rotation),
            Position::new(0.0, 1.0).rotate_vector(self.rotation),
        ]
    }

    fn project(&self, axis: Position) -> (f64, f64) {
        self.corners()
            .iter()
            .map(|c| c.x() * axis.x() + c.z() * axis.z())
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(min, max), p| {
                (min.min(p), max.max(p))
            })
    }
}

#[cfg(test)]
mod tests {
    use std::f64::consts::PI;

    use approx::assert_abs_diff_eq;
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::overlapping(Position::new(1.5, 0.0), 0.0, true)]
    #[case::touching(Position::new(2.0, 0.0), 0.0, true)]
    #[case::apart(Position::new(2.1, 0.0), 0.0, false)]
    #[case::rotated_corner_reaches(Position::new(2.3, 0.0), 0.25 * PI, true)]
    #[case::rotated_apart(Position::new(2.5, 0.0), 0.25 * PI, false)]
    #[case::diagonal_gap(Position::new(1.9, 1.9), 0.25 * PI, false)]
    fn test_rectangle_intersection(
        #[case] position: Position,
        #[case] rotation: f64,
        #[case] expected: bool,
    ) {
        let a = Shape::rectangle(Position::default(), 1.0, 1.0, Angle::new(0.0));
        let b = Shape::rectangle(position, 1.0, 1.0, Angle::new(rotation));
        assert_eq!(a.has_intersection(&b), expected);
        assert_eq!(b.has_intersection(&a), expected);
    }

    #[test]
    fn test_rotated_rectangle_contains() {
        let rectangle = Shape::rectangle(Position::new(1.0, 1.0), 2.0, 0.5, Angle::new(0.5 * PI));
        assert!(rectangle.contains(Position::new(1.0, 2.9)));
        assert!(!rectangle.contains(Position::new(2.9, 1.0)));
    }

    #[test]
    fn test_bounding_radius() {
        let rectangle = Shape::rectangle(Position::default(), 3.0, 4.0, Angle::new(1.0));
        assert_abs_diff_eq!(rectangle.bounding_radius(), 5.0);
    }
}
