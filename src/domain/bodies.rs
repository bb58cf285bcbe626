//! Seam towards the rigid-body engine.
//!
//! The engine integrates and resolves contacts on its own. The core only reads body state and
//! writes corrections through this trait. Every accessor tolerates handles the engine no longer
//! knows about: reads return `None` and writes do nothing.

use nalgebra::{UnitQuaternion, Vector3};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct BodyHandle(pub u64);

/// How the engine moves a body.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BodyMode {
    /// Integrated from forces and contacts.
    Dynamic,
    /// Driven by the caller, pushes dynamic bodies but is not pushed back.
    Kinematic,
}

#[derive(Clone, Debug, PartialEq)]
pub struct BodySpec {
    pub translation: Vector3<f64>,
    pub rotation: UnitQuaternion<f64>,
    pub half_extents: Vector3<f64>,
    pub mass: f64,
    pub mode: BodyMode,
    /// Continuous collision detection with the given prediction distance.
    pub ccd_prediction: Option<f64>,
}

pub trait RigidBodies {
    fn create_body(&mut self, spec: &BodySpec) -> BodyHandle;

    fn remove_body(&mut self, handle: BodyHandle);

    fn mode(&self, handle: BodyHandle) -> Option<BodyMode>;

    fn set_mode(&mut self, handle: BodyHandle, mode: BodyMode);

    fn translation(&self, handle: BodyHandle) -> Option<Vector3<f64>>;

    fn set_translation(&mut self, handle: BodyHandle, translation: Vector3<f64>);

    fn rotation(&self, handle: BodyHandle) -> Option<UnitQuaternion<f64>>;

    fn set_rotation(&mut self, handle: BodyHandle, rotation: UnitQuaternion<f64>);

    fn linear_velocity(&self, handle: BodyHandle) -> Option<Vector3<f64>>;

    fn set_linear_velocity(&mut self, handle: BodyHandle, velocity: Vector3<f64>);

    fn angular_velocity(&self, handle: BodyHandle) -> Option<Vector3<f64>>;

    fn set_angular_velocity(&mut self, handle: BodyHandle, velocity: Vector3<f64>);

    /// Pose a kinematic body moves to during the next engine step.
    fn set_kinematic_target(
        &mut self,
        handle: BodyHandle,
        translation: Vector3<f64>,
        rotation: UnitQuaternion<f64>,
    );

    fn stop(&mut self, handle: BodyHandle) {
        self.set_linear_velocity(handle, Vector3::zeros());
        self.set_angular_velocity(handle, Vector3::zeros());
    }
}
