//! Test utils.

use std::collections::BTreeMap;

use nalgebra::{UnitQuaternion, Vector3};

use crate::domain::{BodyHandle, BodyMode, BodySpec, RigidBodies};

#[derive(Clone, Debug, PartialEq)]
pub struct MockBody {
    pub spec: BodySpec,
    pub mode: BodyMode,
    pub translation: Vector3<f64>,
    pub rotation: UnitQuaternion<f64>,
    pub linear_velocity: Vector3<f64>,
    pub angular_velocity: Vector3<f64>,
    pub kinematic_target: Option<(Vector3<f64>, UnitQuaternion<f64>)>,
}

/// Rigid bodies without contacts or gravity. Stepping moves dynamic bodies along their velocity
/// and kinematic bodies onto their target, which keeps tests exact.
#[derive(Clone, Debug, Default)]
pub struct MockBodies {
    bodies: BTreeMap<BodyHandle, MockBody>,
    next_handle: u64,
}

impl MockBodies {
    pub fn len(&self) -> usize {
        self.bodies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bodies.is_empty()
    }

    pub fn body(&self, handle: BodyHandle) -> Option<&MockBody> {
        self.bodies.get(&handle)
    }

    pub fn kinematic_target(
        &self,
        handle: BodyHandle,
    ) -> Option<(Vector3<f64>, UnitQuaternion<f64>)> {
        self.body(handle).and_then(|body| body.kinematic_target)
    }

    pub fn ccd_prediction(&self, handle: BodyHandle) -> Option<f64> {
        self.body(handle).and_then(|body| body.spec.ccd_prediction)
    }

    pub fn step(&mut self, dt: f64) {
        for body in self.bodies.values_mut() {
            match body.mode {
                BodyMode::Dynamic => body.translation += body.linear_velocity * dt,
                BodyMode::Kinematic => {
                    if let Some((translation, rotation)) = body.kinematic_target.take() {
                        body.translation = translation;
                        body.rotation = rotation;
                    }
                }
            }
        }
    }
}

impl RigidBodies for MockBodies {
    fn create_body(&mut self, spec: &BodySpec) -> BodyHandle {
        let handle = BodyHandle(self.next_handle);
        self.next_handle += 1;
        self.bodies.insert(
            handle,
            MockBody {
                spec: spec.clone(),
                mode: spec.mode,
                translation: spec.translation,
                rotation: spec.rotation,
                linear_velocity: Vector3::zeros(),
                angular_velocity: Vector3::zeros(),
                kinematic_target: None,
            },
        );
        handle
    }

    fn remove_body(&mut self, handle: BodyHandle) {
        self.bodies.remove(&handle);
    }

    fn mode(&self, handle: BodyHandle) -> Option<BodyMode> {
        self.body(handle).map(|body| body.mode)
    }

    fn set_mode(&mut self, handle: BodyHandle, mode: BodyMode) {
        if let Some(body) = self.bodies.get_mut(&handle) {
            body.mode = mode;
        }
    }

    fn translation(&self, handle: BodyHandle) -> Option<Vector3<f64>> {
        self.body(handle).map(|body| body.translation)
    }

    fn set_translation(&mut self, handle: BodyHandle, translation: Vector3<f64>) {
        if let Some(body) = self.bodies.get_mut(&handle) {
            body.translation = translation;
        }
    }

    fn rotation(&self, handle: BodyHandle) -> Option<UnitQuaternion<f64>> {
        self.body(handle).map(|body| body.rotation)
    }

    fn set_rotation(&mut self, handle: BodyHandle, rotation: UnitQuaternion<f64>) {
        if let Some(body) = self.bodies.get_mut(&handle) {
            body.rotation = rotation;
        }
    }

    fn linear_velocity(&self, handle: BodyHandle) -> Option<Vector3<f64>> {
        self.body(handle).map(|body| body.linear_velocity)
    }

    fn set_linear_velocity(&mut self, handle: BodyHandle, velocity: Vector3<f64>) {
        if let Some(body) = self.bodies.get_mut(&handle) {
            body.linear_velocity = velocity;
        }
    }

    fn angular_velocity(&self, handle: BodyHandle) -> Option<Vector3<f64>> {
        self.body(handle).map(|body| body.angular_velocity)
    }

    fn set_angular_velocity(&mut self, handle: BodyHandle, velocity: Vector3<f64>) {
        if let Some(body) = self.bodies.get_mut(&handle) {
            body.angular_velocity = velocity;
        }
    }

    fn set_kinematic_target(
        &mut self,
        handle: BodyHandle,
        translation: Vector3<f64>,
        rotation: UnitQuaternion<f64>,
    ) {
        if let Some(body) = self.bodies.get_mut(&handle) {
            body.kinematic_target = Some((translation, rotation));
        }
    }
}
