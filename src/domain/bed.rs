//! Cargo bed geometry in the vehicle frame.
//!
//! The interior is a box open at the rear (local +z). The side walls sit at `left_x()` and
//! `right_x()`, the front wall at `front_z()`.

use nalgebra::Vector3;

use super::{ConfigError, Pose, Position};

#[derive(Clone, Debug, PartialEq)]
pub struct CargoBed {
    /// Center of the interior floor area, relative to the vehicle origin.
    pub center: Position,
    pub inner_half_x: f64,
    pub inner_half_z: f64,
    /// Height of the floor surface above the ground.
    pub floor_top: f64,
    pub floor_thickness: f64,
    pub wall_height: f64,
    pub wall_thickness: f64,
    /// Height of the placement volume above the floor.
    pub stack_height: f64,
}

impl Default for CargoBed {
    fn default() -> Self {
        Self {
            center: Position::new(0.0, 0.9),
            inner_half_x: 1.05,
            inner_half_z: 2.0,
            floor_top: 1.1,
            floor_thickness: 0.2,
            wall_height: 0.8,
            wall_thickness: 0.1,
            stack_height: 2.0,
        }
    }
}

impl CargoBed {
    pub fn left_x(&self) -> f64 {
        self.center.x() - self.inner_half_x
    }

    pub fn right_x(&self) -> f64 {
        self.center.x() + self.inner_half_x
    }

    pub fn front_z(&self) -> f64 {
        self.center.z() - self.inner_half_z
    }

    /// Open edge of the bed.
    pub fn rear_z(&self) -> f64 {
        self.center.z() + self.inner_half_z
    }

    pub fn capacity(&self) -> f64 {
        4.0 * self.inner_half_x * self.inner_half_z * self.stack_height
    }

    /// Whether a footprint centered at `local` with the given half extents lies inside the
    /// walls and in front of the open rear edge.
    pub fn contains_footprint(&self, local: Position, half_x: f64, half_z: f64) -> bool {
        local.x() - half_x >= self.left_x()
            && local.x() + half_x <= self.right_x()
            && local.z() - half_z >= self.front_z()
            && local.z() + half_z <= self.rear_z()
    }

    /// World space bounds of the placement volume for a vehicle at `pose`.
    pub fn cargo_bounds(&self, pose: &Pose) -> CargoBounds {
        let corners = [
            Position::new(self.left_x(), self.front_z()),
            Position::new(self.right_x(), self.front_z()),
            Position::new(self.right_x(), self.rear_z()),
            Position::new(self.left_x(), self.rear_z()),
        ]
        .map(|c| pose.transform_point(c));

        let (min_x, max_x) = min_max(corners.iter().map(Position::x));
        let (min_z, max_z) = min_max(corners.iter().map(Position::z));
        CargoBounds {
            min: Vector3::new(min_x, self.floor_top, min_z),
            max: Vector3::new(max_x, self.floor_top + self.stack_height, max_z),
        }
    }

    /// Floor and the three walls as boxes in the vehicle frame.
    pub fn parts(&self) -> [BedPart; 4] {
        let wall_center_y = self.floor_top + self.wall_height / 2.0;
        let wall_half_y = self.wall_height / 2.0;
        let half_thickness = self.wall_thickness / 2.0;
        let (cx, cz) = (self.center.x(), self.center.z());
        [
            BedPart {
                kind: BedPartKind::Floor,
                local_center: Vector3::new(cx, self.floor_top - self.floor_thickness / 2.0, cz),
                half_extents: Vector3::new(
                    self.inner_half_x + self.wall_thickness,
                    self.floor_thickness / 2.0,
                    self.inner_half_z + self.wall_thickness,
                ),
            },
            BedPart {
                kind: BedPartKind::LeftWall,
                local_center: Vector3::new(self.left_x() - half_thickness, wall_center_y, cz),
                half_extents: Vector3::new(half_thickness, wall_half_y, self.inner_half_z),
            },
            BedPart {
                kind: BedPartKind::RightWall,
                local_center: Vector3::new(self.right_x() + half_thickness, wall_center_y, cz),
                half_extents: Vector3::new(half_thickness, wall_half_y, self.inner_half_z),
            },
            BedPart {
                kind: BedPartKind::FrontWall,
                local_center: Vector3::new(cx, wall_center_y, self.front_z() - half_thickness),
                half_extents: Vector3::new(
                    self.inner_half_x + self.wall_thickness,
                    wall_half_y,
                    half_thickness,
                ),
            },
        ]
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.inner_half_x <= 0.0
            || self.inner_half_z <= 0.0
            || self.wall_height <= 0.0
            || self.wall_thickness <= 0.0
            || self.floor_thickness <= 0.0
            || self.stack_height <= 0.0
        {
            return Err(ConfigError::NonPositive("cargo bed dimension"));
        }
        Ok(())
    }
}

fn min_max(values: impl Iterator<Item = f64>) -> (f64, f64) {
    values.fold((f64::INFINITY, f64::NEG_INFINITY), |(min, max), v| {
        (min.min(v), max.max(v))
    })
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CargoBounds {
    pub min: Vector3<f64>,
    pub max: Vector3<f64>,
}

impl CargoBounds {
    pub fn contains(&self, point: &Vector3<f64>) -> bool {
        (0..3).all(|i| point[i] >= self.min[i] && point[i] <= self.max[i])
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub enum BedPartKind {
    Floor,
    LeftWall,
    RightWall,
    FrontWall,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BedPart {
    pub kind: BedPartKind,
    pub local_center: Vector3<f64>,
    pub half_extents: Vector3<f64>,
}
