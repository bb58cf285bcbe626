//! Basic building blocks.
//!
//! The ground plane is spanned by x and z, y points up. A yaw of zero looks along local -z, so a
//! rotation by `angle` maps the local vector `(x, z)` onto
//! `(x cos + z sin, -x sin + z cos)`.

use std::{
    f64::consts::PI,
    ops::{Add, Neg, Sub},
};

use nalgebra::{UnitQuaternion, Vector3};

pub const MPH_TO_METERS_PER_SECOND: f64 = 0.44704;

#[derive(Clone, Copy, Debug, Default, PartialEq, PartialOrd)]
pub struct Position {
    x: f64,
    z: f64,
}

impl Position {
    pub const fn new(x: f64, z: f64) -> Self {
        Self { x, z }
    }

    pub fn x(&self) -> f64 {
        self.x
    }

    pub fn z(&self) -> f64 {
        self.z
    }

    pub fn distance(&self, position: Self) -> f64 {
        self.distance_squared(position).sqrt()
    }

    pub fn distance_squared(&self, position: Self) -> f64 {
        (self.x - position.x).powi(2) + (self.z - position.z).powi(2)
    }

    pub fn length(&self) -> f64 {
        self.distance(Position::default())
    }

    pub fn scale(&self, factor: f64) -> Position {
        Position::new(self.x * factor, self.z * factor)
    }

    /// Rotates a local vector into the frame of something yawed by `angle`.
    pub fn rotate_vector(&self, angle: Angle) -> Position {
        let (sin, cos) = angle.0.sin_cos();
        Position::new(
            self.x * cos + self.z * sin,
            -self.x * sin + self.z * cos,
        )
    }

    /// Inverse of [`Position::rotate_vector`].
    pub fn unrotate_vector(&self, angle: Angle) -> Position {
        self.rotate_vector(-angle)
    }

    pub fn to_vector(self, y: f64) -> Vector3<f64> {
        Vector3::new(self.x, y, self.z)
    }
}

impl From<Vector3<f64>> for Position {
    fn from(value: Vector3<f64>) -> Self {
        Self::new(value.x, value.z)
    }
}

impl From<Position> for (f64, f64) {
    fn from(value: Position) -> Self {
        (value.x, value.z)
    }
}

impl Add for Position {
    type Output = Position;

    fn add(self, rhs: Self) -> Self::Output {
        Self {
            x: self.x + rhs.x,
            z: self.z + rhs.z,
        }
    }
}

impl Sub for Position {
    type Output = Position;

    fn sub(self, rhs: Self) -> Self::Output {
        Self {
            x: self.x - rhs.x,
            z: self.z - rhs.z,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, PartialOrd)]
pub struct Angle(f64);

impl Angle {
    pub const fn new(radians: f64) -> Self {
        Self(radians)
    }

    pub fn to_deg(self) -> f64 {
        (self.0 * (180.0 / PI) + 360.0) % 360.0
    }

    pub fn radians(self) -> f64 {
        self.0
    }

    /// Rotation about the up axis.
    pub fn to_rotation(self) -> UnitQuaternion<f64> {
        UnitQuaternion::from_axis_angle(&Vector3::y_axis(), self.0)
    }
}

impl Neg for Angle {
    type Output = Self;

    fn neg(self) -> Self::Output {
        Angle(-self.0)
    }
}

impl Add for Angle {
    type Output = Angle;

    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl Sub for Angle {
    type Output = Angle;

    fn sub(self, rhs: Self) -> Self::Output {
        Self(self.0 - rhs.0)
    }
}

impl From<Angle> for f64 {
    fn from(value: Angle) -> Self {
        value.0
    }
}

impl From<Angle> for f32 {
    fn from(value: Angle) -> Self {
        value.0 as f32
    }
}

/// Signed vehicle speed in miles per hour. Negative values drive forward, positive values reverse.
#[derive(Clone, Copy, Debug, Default, PartialEq, PartialOrd)]
pub struct Speed(f64);

impl Speed {
    pub const fn new(mph: f64) -> Self {
        Self(mph)
    }

    pub fn mph(self) -> f64 {
        self.0
    }

    pub fn meters_per_second(self) -> f64 {
        self.0 * MPH_TO_METERS_PER_SECOND
    }

    pub fn is_reverse(self) -> bool {
        self.0 > 0.0
    }
}

impl Add for Speed {
    type Output = Speed;

    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl From<Speed> for f64 {
    fn from(value: Speed) -> Self {
        value.0
    }
}

/// Position and heading of something standing on the ground plane.
#[derive(Clone, Copy, Debug, Default, PartialEq, PartialOrd)]
pub struct Pose {
    pub position: Position,
    pub heading: Angle,
}

impl Pose {
    pub const fn new(position: Position, heading: Angle) -> Self {
        Self { position, heading }
    }

    /// Maps a point given in this pose's local frame into the world.
    pub fn transform_point(&self, local: Position) -> Position {
        self.position + local.rotate_vector(self.heading)
    }

    /// Maps a world point into this pose's local frame.
    pub fn inverse_transform_point(&self, world: Position) -> Position {
        (world - self.position).unrotate_vector(self.heading)
    }

    /// Bit pattern used as an exact cache key.
    pub fn key(&self) -> [u64; 3] {
        [
            self.position.x.to_bits(),
            self.position.z.to_bits(),
            self.heading.0.to_bits(),
        ]
    }
}
