//! State and shape of the cargo vehicle.

use nalgebra::Vector3;

use super::{Angle, Pose, Position, Shape, Speed};

/// Mutable driving state. Only the drivetrain writes it, once per frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, PartialOrd)]
pub struct VehicleState {
    pub position: Position,
    pub heading: Angle,
    pub speed: Speed,
    pub gear: i8,
    /// Smoothed steering input in `[-1, 1]`, positive turns left.
    pub turn_input: f64,
    pub drift_angle: Angle,
    /// Seconds of forced braking left.
    pub auto_brake_timer: f64,
}

impl VehicleState {
    pub fn new(position: Position, heading: Angle) -> Self {
        Self {
            position,
            heading,
            ..Default::default()
        }
    }

    pub fn pose(&self) -> Pose {
        Pose::new(self.position, self.heading)
    }

    /// Direction of travel, which differs from the heading while drifting.
    pub fn travel_direction(&self) -> Angle {
        self.heading + self.drift_angle
    }

    /// World space velocity in meters per second.
    pub fn linear_velocity(&self) -> Vector3<f64> {
        Position::new(0.0, self.speed.meters_per_second())
            .rotate_vector(self.travel_direction())
            .to_vector(0.0)
    }

    pub fn gear_label(&self) -> String {
        match self.gear {
            -1 => "R".to_string(),
            0 => "N".to_string(),
            gear => gear.to_string(),
        }
    }
}

/// Boxes making up the vehicle's footprint, as offsets from the vehicle origin in the local
/// frame (local -z is the front).
#[derive(Clone, Debug, PartialEq, PartialOrd)]
pub struct VehicleGeometry {
    pub cab_center: Position,
    pub cab_half_x: f64,
    pub cab_half_z: f64,
    pub bed_center: Position,
    pub bed_half_x: f64,
    pub bed_half_z: f64,
    /// Perimeter used for the enclosure wall check.
    pub perimeter_front: f64,
    pub perimeter_back: f64,
    pub perimeter_half_width: f64,
    pub perimeter_spacing: f64,
}

impl Default for VehicleGeometry {
    fn default() -> Self {
        Self {
            cab_center: Position::new(0.0, -2.2),
            cab_half_x: 1.1,
            cab_half_z: 0.9,
            bed_center: Position::new(0.0, 0.9),
            bed_half_x: 1.2,
            bed_half_z: 2.2,
            perimeter_front: 3.2,
            perimeter_back: 3.2,
            perimeter_half_width: 1.2,
            perimeter_spacing: 0.4,
        }
    }
}

impl VehicleGeometry {
    pub fn boxes(&self, pose: &Pose) -> [Shape; 2] {
        [
            Shape::rectangle(
                pose.transform_point(self.cab_center),
                self.cab_half_x,
                self.cab_half_z,
                pose.heading,
            ),
            Shape::rectangle(
                pose.transform_point(self.bed_center),
                self.bed_half_x,
                self.bed_half_z,
                pose.heading,
            ),
        ]
    }

    /// Radius around the vehicle origin enclosing both boxes.
    pub fn bounding_radius(&self) -> f64 {
        self.boxes(&Pose::default())
            .iter()
            .flat_map(Shape::corners)
            .map(|c| c.length())
            .fold(0.0, f64::max)
    }

    /// Evenly spaced sample points along the footprint outline, in the local frame.
    pub fn perimeter_samples(&self) -> Vec<Position> {
        let front = -self.perimeter_front;
        let back = self.perimeter_back;
        let half_width = self.perimeter_half_width;
        let spacing = self.perimeter_spacing.max(0.01);

        let corners = [
            Position::new(-half_width, front),
            Position::new(half_width, front),
            Position::new(half_width, back),
            Position::new(-half_width, back),
        ];

        let mut samples = vec![];
        for (i, start) in corners.iter().enumerate() {
            let end = corners[(i + 1) % corners.len()];
            let edge = end - *start;
            let steps = (edge.length() / spacing).ceil().max(1.0) as usize;
            samples.extend((0..steps).map(|s| *start + edge.scale(s as f64 / steps as f64)));
        }
        samples
    }
}

/// Held input flags for a frame.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct DriveInput {
    pub forward: bool,
    pub reverse: bool,
    pub brake: bool,
    pub left: bool,
    pub right: bool,
}

impl DriveInput {
    /// Raw steering direction, positive to the left.
    pub fn steering(&self) -> f64 {
        match (self.left, self.right) {
            (true, false) => 1.0,
            (false, true) => -1.0,
            _ => 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::f64::consts::PI;

    use approx::assert_abs_diff_eq;
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_linear_velocity_points_forward() {
        let mut state = VehicleState::new(Position::default(), Angle::new(0.5 * PI));
        state.speed = Speed::new(-10.0);
        let velocity = state.linear_velocity();
        assert_abs_diff_eq!(velocity.x, -4.4704, epsilon = 1e-9);
        assert_abs_diff_eq!(velocity.z, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_perimeter_samples_cover_outline() {
        let geometry = VehicleGeometry {
            perimeter_front: 2.0,
            perimeter_back: 1.0,
            perimeter_half_width: 1.0,
            perimeter_spacing: 1.0,
            ..Default::default()
        };
        let samples = geometry.perimeter_samples();
        assert_eq!(samples.len(), 10);
        assert!(samples.contains(&Position::new(-1.0, -2.0)));
        assert!(samples.contains(&Position::new(1.0, 1.0)));
        assert!(samples
            .iter()
            .all(|s| s.z() >= -2.0 && s.z() <= 1.0 && s.x().abs() <= 1.0));
    }

    #[test]
    fn test_bounding_radius_encloses_boxes() {
        let geometry = VehicleGeometry::default();
        let radius = geometry.bounding_radius();
        assert_abs_diff_eq!(radius, 1.2_f64.hypot(3.1), epsilon = 1e-9);
    }

    #[test]
    fn test_gear_label() {
        let mut state = VehicleState::default();
        assert_eq!(state.gear_label(), "N");
        state.gear = -1;
        assert_eq!(state.gear_label(), "R");
        state.gear = 3;
        assert_eq!(state.gear_label(), "3");
    }
}
