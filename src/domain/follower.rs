//! Keeps the bodies of the cargo bed glued to the vehicle.
//!
//! Floor and walls are independent kinematic bodies. Every frame their world pose is composed
//! from the vehicle pose and their fixed offset in the vehicle frame, then handed to the engine
//! as the target for the coming step.

use nalgebra::{UnitQuaternion, Vector3};
use tracing::debug;

use super::{
    BedPart, BedPartKind, BodyHandle, BodyMode, BodySpec, CargoBed, Pose, Position, RigidBodies,
};

/// Mass handed to the engine for bed parts. Kinematic bodies ignore it.
const PART_MASS: f64 = 1.0;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ContainerFollower {
    parts: Vec<(BedPart, BodyHandle)>,
}

impl ContainerFollower {
    /// Creates one kinematic body per bed part at the vehicle's current pose.
    pub fn spawn(bed: &CargoBed, pose: &Pose, bodies: &mut impl RigidBodies) -> Self {
        let parts = bed
            .parts()
            .into_iter()
            .map(|part| {
                let (translation, rotation) = world_pose(&part, pose);
                let handle = bodies.create_body(&BodySpec {
                    translation,
                    rotation,
                    half_extents: part.half_extents,
                    mass: PART_MASS,
                    mode: BodyMode::Kinematic,
                    ccd_prediction: None,
                });
                (part, handle)
            })
            .collect();
        Self { parts }
    }

    /// Pushes the composed world pose of every part as its kinematic target.
    pub fn follow(&self, pose: &Pose, bodies: &mut impl RigidBodies) {
        for (part, handle) in &self.parts {
            let (translation, rotation) = world_pose(part, pose);
            bodies.set_kinematic_target(*handle, translation, rotation);
        }
    }

    /// Moves every part to `pose` at once, without sweeping through the world.
    pub fn teleport(&self, pose: &Pose, bodies: &mut impl RigidBodies) {
        for (part, handle) in &self.parts {
            let (translation, rotation) = world_pose(part, pose);
            bodies.set_translation(*handle, translation);
            bodies.set_rotation(*handle, rotation);
            bodies.stop(*handle);
        }
        debug!(?pose, "cargo bed teleported");
    }

    pub fn despawn(self, bodies: &mut impl RigidBodies) {
        for (_, handle) in self.parts {
            bodies.remove_body(handle);
        }
    }

    pub fn handle(&self, kind: BedPartKind) -> Option<BodyHandle> {
        self.parts
            .iter()
            .find(|(part, _)| part.kind == kind)
            .map(|(_, handle)| *handle)
    }

    pub fn handles(&self) -> impl Iterator<Item = BodyHandle> + '_ {
        self.parts.iter().map(|(_, handle)| *handle)
    }
}

fn world_pose(part: &BedPart, pose: &Pose) -> (Vector3<f64>, UnitQuaternion<f64>) {
    let local = part.local_center;
    let position = pose.transform_point(Position::new(local.x, local.z));
    (position.to_vector(local.y), pose.heading.to_rotation())
}

#[cfg(test)]
mod tests {
    use std::f64::consts::PI;

    use approx::assert_abs_diff_eq;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::domain::Angle;
    use crate::tests::MockBodies;

    #[test]
    fn test_spawn_creates_kinematic_parts() {
        let mut bodies = MockBodies::default();
        let follower =
            ContainerFollower::spawn(&CargoBed::default(), &Pose::default(), &mut bodies);
        assert_eq!(follower.handles().count(), 4);
        for handle in follower.handles() {
            assert_eq!(bodies.mode(handle), Some(BodyMode::Kinematic));
        }
        let floor = follower.handle(BedPartKind::Floor).unwrap();
        assert_abs_diff_eq!(
            bodies.translation(floor).unwrap(),
            Vector3::new(0.0, 1.0, 0.9),
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_follow_composes_vehicle_pose() {
        let mut bodies = MockBodies::default();
        let bed = CargoBed::default();
        let follower = ContainerFollower::spawn(&bed, &Pose::default(), &mut bodies);

        let pose = Pose::new(Position::new(5.0, 5.0), Angle::new(PI));
        follower.follow(&pose, &mut bodies);

        let left = follower.handle(BedPartKind::LeftWall).unwrap();
        let (translation, rotation) = bodies.kinematic_target(left).unwrap();
        // Turned around, the left wall ends up on the world's +x side, behind the origin.
        assert_abs_diff_eq!(translation.x, 5.0 + 1.1, epsilon = 1e-12);
        assert_abs_diff_eq!(translation.y, 1.5, epsilon = 1e-12);
        assert_abs_diff_eq!(translation.z, 5.0 - 0.9, epsilon = 1e-12);
        assert_abs_diff_eq!(rotation.angle(), PI, epsilon = 1e-12);
        // Nothing moves until the engine steps.
        assert_abs_diff_eq!(
            bodies.translation(left).unwrap(),
            Vector3::new(-1.1, 1.5, 0.9),
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_teleport_and_despawn() {
        let mut bodies = MockBodies::default();
        let follower =
            ContainerFollower::spawn(&CargoBed::default(), &Pose::default(), &mut bodies);
        let front = follower.handle(BedPartKind::FrontWall).unwrap();

        follower.teleport(&Pose::new(Position::new(0.0, -20.0), Angle::new(0.0)), &mut bodies);
        assert_abs_diff_eq!(bodies.translation(front).unwrap().z, -20.0 - 1.15, epsilon = 1e-12);

        follower.despawn(&mut bodies);
        assert!(bodies.is_empty());
    }
}
