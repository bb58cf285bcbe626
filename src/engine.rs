//! Rigid-body engine backed by rapier.
//!
//! Everything runs in `f32` on rapier's side. Values are converted at the boundary of the
//! [`RigidBodies`] implementation so the domain keeps working in `f64`.

use std::collections::BTreeMap;

use nalgebra::{Quaternion, UnitQuaternion, Vector3};
use rapier3d::na;
use rapier3d::prelude::*;
use tracing::debug;

use crate::domain::{BodyHandle, BodyMode, BodySpec, RigidBodies};

pub const GRAVITY: f64 = 9.81;

/// Half extents of the ground slab the world stands on.
const GROUND_HALF_EXTENTS: [Real; 3] = [1000.0, 0.5, 1000.0];

pub struct RapierEngine {
    gravity: Vector<Real>,
    rigid_body_set: RigidBodySet,
    collider_set: ColliderSet,
    integration_parameters: IntegrationParameters,
    physics_pipeline: PhysicsPipeline,
    island_manager: IslandManager,
    broad_phase: DefaultBroadPhase,
    narrow_phase: NarrowPhase,
    impulse_joint_set: ImpulseJointSet,
    multibody_joint_set: MultibodyJointSet,
    ccd_solver: CCDSolver,
    query_pipeline: QueryPipeline,
    substeps: u32,
    handles: BTreeMap<BodyHandle, RigidBodyHandle>,
    next_handle: u64,
    /// Kinematic targets of the coming step, reached in equal parts over the substeps.
    targets: BTreeMap<BodyHandle, Isometry<Real>>,
}

impl Default for RapierEngine {
    fn default() -> Self {
        Self::new(4)
    }
}

impl RapierEngine {
    /// Creates an engine with a flat ground at y = 0 that splits every step into `substeps`.
    pub fn new(substeps: u32) -> Self {
        let mut collider_set = ColliderSet::new();
        let [hx, hy, hz] = GROUND_HALF_EXTENTS;
        collider_set.insert(
            ColliderBuilder::cuboid(hx, hy, hz)
                .translation(vector![0.0, -hy, 0.0])
                .build(),
        );
        Self {
            gravity: vector![0.0, -GRAVITY as Real, 0.0],
            rigid_body_set: RigidBodySet::new(),
            collider_set,
            integration_parameters: IntegrationParameters::default(),
            physics_pipeline: PhysicsPipeline::new(),
            island_manager: IslandManager::new(),
            broad_phase: DefaultBroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            impulse_joint_set: ImpulseJointSet::new(),
            multibody_joint_set: MultibodyJointSet::new(),
            ccd_solver: CCDSolver::new(),
            query_pipeline: QueryPipeline::new(),
            substeps: substeps.max(1),
            handles: BTreeMap::new(),
            next_handle: 0,
            targets: BTreeMap::new(),
        }
    }

    pub fn body_count(&self) -> usize {
        self.handles.len()
    }

    /// Advances the simulation by `dt` seconds.
    pub fn step(&mut self, dt: f64) {
        let substeps = self.substeps;
        self.integration_parameters.dt = (dt / substeps as f64) as Real;

        let starts: Vec<_> = self
            .targets
            .iter()
            .filter_map(|(handle, target)| {
                let raw = *self.handles.get(handle)?;
                let body = self.rigid_body_set.get(raw)?;
                body.is_kinematic().then_some((raw, *body.position(), *target))
            })
            .collect();
        self.targets.clear();

        for substep in 1..=substeps {
            let t = substep as Real / substeps as Real;
            for (raw, start, target) in &starts {
                if let Some(body) = self.rigid_body_set.get_mut(*raw) {
                    body.set_next_kinematic_position(start.lerp_slerp(target, t));
                }
            }
            self.physics_pipeline.step(
                &self.gravity,
                &self.integration_parameters,
                &mut self.island_manager,
                &mut self.broad_phase,
                &mut self.narrow_phase,
                &mut self.rigid_body_set,
                &mut self.collider_set,
                &mut self.impulse_joint_set,
                &mut self.multibody_joint_set,
                &mut self.ccd_solver,
                Some(&mut self.query_pipeline),
                &(),
                &(),
            );
        }
    }

    fn body(&self, handle: BodyHandle) -> Option<&RigidBody> {
        self.rigid_body_set.get(*self.handles.get(&handle)?)
    }

    fn body_mut(&mut self, handle: BodyHandle) -> Option<&mut RigidBody> {
        self.rigid_body_set.get_mut(*self.handles.get(&handle)?)
    }
}

impl RigidBodies for RapierEngine {
    fn create_body(&mut self, spec: &BodySpec) -> BodyHandle {
        let builder = match spec.mode {
            BodyMode::Dynamic => RigidBodyBuilder::dynamic(),
            BodyMode::Kinematic => RigidBodyBuilder::kinematic_position_based(),
        };
        let builder = builder.position(to_isometry(&spec.translation, &spec.rotation));
        let builder = match spec.ccd_prediction {
            Some(prediction) => builder
                .ccd_enabled(true)
                .soft_ccd_prediction(prediction as Real),
            None => builder,
        };
        let raw = self.rigid_body_set.insert(builder.build());

        let half = to_vector(&spec.half_extents);
        let volume = 8.0 * half.x * half.y * half.z;
        let collider = ColliderBuilder::cuboid(half.x, half.y, half.z)
            .density(spec.mass as Real / volume)
            .friction(0.7)
            .restitution(0.0)
            .build();
        self.collider_set
            .insert_with_parent(collider, raw, &mut self.rigid_body_set);

        let handle = BodyHandle(self.next_handle);
        self.next_handle += 1;
        self.handles.insert(handle, raw);
        debug!(?handle, mode = ?spec.mode, "rigid body created");
        handle
    }

    fn remove_body(&mut self, handle: BodyHandle) {
        self.targets.remove(&handle);
        if let Some(raw) = self.handles.remove(&handle) {
            self.rigid_body_set.remove(
                raw,
                &mut self.island_manager,
                &mut self.collider_set,
                &mut self.impulse_joint_set,
                &mut self.multibody_joint_set,
                true,
            );
        }
    }

    fn mode(&self, handle: BodyHandle) -> Option<BodyMode> {
        self.body(handle).map(|body| {
            if body.is_kinematic() {
                BodyMode::Kinematic
            } else {
                BodyMode::Dynamic
            }
        })
    }

    fn set_mode(&mut self, handle: BodyHandle, mode: BodyMode) {
        let body_type = match mode {
            BodyMode::Dynamic => RigidBodyType::Dynamic,
            BodyMode::Kinematic => RigidBodyType::KinematicPositionBased,
        };
        if let Some(body) = self.body_mut(handle) {
            body.set_body_type(body_type, true);
        }
    }

    fn translation(&self, handle: BodyHandle) -> Option<Vector3<f64>> {
        self.body(handle).map(|body| from_vector(body.translation()))
    }

    fn set_translation(&mut self, handle: BodyHandle, translation: Vector3<f64>) {
        if let Some(body) = self.body_mut(handle) {
            body.set_translation(to_vector(&translation), true);
        }
    }

    fn rotation(&self, handle: BodyHandle) -> Option<UnitQuaternion<f64>> {
        self.body(handle).map(|body| from_rotation(body.rotation()))
    }

    fn set_rotation(&mut self, handle: BodyHandle, rotation: UnitQuaternion<f64>) {
        if let Some(body) = self.body_mut(handle) {
            body.set_rotation(to_rotation(&rotation), true);
        }
    }

    fn linear_velocity(&self, handle: BodyHandle) -> Option<Vector3<f64>> {
        self.body(handle).map(|body| from_vector(body.linvel()))
    }

    fn set_linear_velocity(&mut self, handle: BodyHandle, velocity: Vector3<f64>) {
        if let Some(body) = self.body_mut(handle) {
            body.set_linvel(to_vector(&velocity), true);
        }
    }

    fn angular_velocity(&self, handle: BodyHandle) -> Option<Vector3<f64>> {
        self.body(handle).map(|body| from_vector(body.angvel()))
    }

    fn set_angular_velocity(&mut self, handle: BodyHandle, velocity: Vector3<f64>) {
        if let Some(body) = self.body_mut(handle) {
            body.set_angvel(to_vector(&velocity), true);
        }
    }

    fn set_kinematic_target(
        &mut self,
        handle: BodyHandle,
        translation: Vector3<f64>,
        rotation: UnitQuaternion<f64>,
    ) {
        if self.handles.contains_key(&handle) {
            self.targets
                .insert(handle, to_isometry(&translation, &rotation));
        }
    }
}

fn to_vector(v: &Vector3<f64>) -> Vector<Real> {
    vector![v.x as Real, v.y as Real, v.z as Real]
}

fn from_vector(v: &Vector<Real>) -> Vector3<f64> {
    Vector3::new(v.x as f64, v.y as f64, v.z as f64)
}

fn to_rotation(q: &UnitQuaternion<f64>) -> Rotation<Real> {
    na::UnitQuaternion::new_normalize(na::Quaternion::new(
        q.w as Real,
        q.i as Real,
        q.j as Real,
        q.k as Real,
    ))
}

fn from_rotation(q: &Rotation<Real>) -> UnitQuaternion<f64> {
    UnitQuaternion::new_normalize(Quaternion::new(
        q.w as f64,
        q.i as f64,
        q.j as f64,
        q.k as f64,
    ))
}

fn to_isometry(translation: &Vector3<f64>, rotation: &UnitQuaternion<f64>) -> Isometry<Real> {
    Isometry::from_parts(to_vector(translation).into(), to_rotation(rotation))
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::domain::{
        CargoBed, CargoStabilizer, ContainerFollower, ItemDefinition, ItemId, ItemPhase, Pose,
        StabilizerConfig, VehicleFrame,
    };

    const DT: f64 = 1.0 / 60.0;

    fn crate_spec(y: f64, mode: BodyMode) -> BodySpec {
        BodySpec {
            translation: Vector3::new(0.0, y, 0.0),
            rotation: UnitQuaternion::identity(),
            half_extents: Vector3::new(0.2, 0.2, 0.2),
            mass: 10.0,
            mode,
            ccd_prediction: Some(0.2),
        }
    }

    #[test]
    fn test_dynamic_body_comes_to_rest_on_the_ground() {
        let mut engine = RapierEngine::default();
        let body = engine.create_body(&crate_spec(2.0, BodyMode::Dynamic));
        for _ in 0..180 {
            engine.step(DT);
        }
        let translation = engine.translation(body).unwrap();
        assert_abs_diff_eq!(translation.y, 0.2, epsilon = 0.02);
        assert!(engine.linear_velocity(body).unwrap().norm() < 0.05);
    }

    #[test]
    fn test_kinematic_body_reaches_its_target() {
        let mut engine = RapierEngine::default();
        let body = engine.create_body(&crate_spec(2.0, BodyMode::Kinematic));
        let rotation = UnitQuaternion::from_axis_angle(&Vector3::y_axis(), 0.5);
        engine.set_kinematic_target(body, Vector3::new(1.0, 2.0, -3.0), rotation);
        engine.step(DT);
        assert_abs_diff_eq!(
            engine.translation(body).unwrap(),
            Vector3::new(1.0, 2.0, -3.0),
            epsilon = 1e-5
        );
        assert_abs_diff_eq!(engine.rotation(body).unwrap().angle(), 0.5, epsilon = 1e-5);

        // Without a new target it stays put.
        engine.step(DT);
        assert_abs_diff_eq!(
            engine.translation(body).unwrap(),
            Vector3::new(1.0, 2.0, -3.0),
            epsilon = 1e-5
        );
    }

    #[test]
    fn test_mode_switch_and_removal() {
        let mut engine = RapierEngine::default();
        let body = engine.create_body(&crate_spec(2.0, BodyMode::Kinematic));
        assert_eq!(engine.mode(body), Some(BodyMode::Kinematic));
        engine.set_mode(body, BodyMode::Dynamic);
        assert_eq!(engine.mode(body), Some(BodyMode::Dynamic));

        engine.remove_body(body);
        assert_eq!(engine.mode(body), None);
        assert_eq!(engine.translation(body), None);
        assert_eq!(engine.body_count(), 0);
        engine.set_linear_velocity(body, Vector3::new(1.0, 0.0, 0.0));
        engine.step(DT);
    }

    /// Runs the cargo side of the frame for a vehicle parked at the origin.
    fn run_parked(
        stabilizer: &mut CargoStabilizer,
        follower: &ContainerFollower,
        engine: &mut RapierEngine,
        now: &mut f64,
        frames: usize,
    ) -> Vec<ItemId> {
        let mut fallen = vec![];
        for _ in 0..frames {
            *now += DT;
            let frame = VehicleFrame::new(*now, Pose::default(), Vector3::zeros());
            follower.follow(&frame.pose, engine);
            fallen.extend(stabilizer.pre_step(&frame, engine).fallen);
            engine.step(DT);
            fallen.extend(stabilizer.post_step(&frame, engine).fallen);
        }
        fallen
    }

    fn place_crate(stabilizer: &mut CargoStabilizer, bed: &CargoBed) -> ItemId {
        let definition = ItemDefinition::new("crate", Vector3::new(0.4, 0.4, 0.4), 10.0);
        let id = stabilizer.add_item(definition);
        stabilizer.pick_up(id).unwrap();
        let offset = Vector3::new(0.0, bed.floor_top + 0.21, 0.9);
        stabilizer
            .place(id, offset, UnitQuaternion::identity(), 0.0)
            .unwrap();
        id
    }

    #[test]
    fn test_placed_item_settles_in_the_bed() {
        let mut engine = RapierEngine::default();
        let bed = CargoBed::default();
        let follower = ContainerFollower::spawn(&bed, &Pose::default(), &mut engine);
        let mut stabilizer = CargoStabilizer::new(bed.clone(), StabilizerConfig::default());

        let id = place_crate(&mut stabilizer, &bed);

        let mut now = 0.0;
        let fallen = run_parked(&mut stabilizer, &follower, &mut engine, &mut now, 120);
        assert!(fallen.is_empty());
        assert_eq!(stabilizer.phase(id), Some(ItemPhase::Dynamic));

        let body = stabilizer.item(id).unwrap().body().unwrap();
        let translation = engine.translation(body).unwrap();
        assert!(stabilizer.cargo_bounds(&Pose::default()).contains(&translation));
        assert_abs_diff_eq!(translation.y, bed.floor_top + 0.2, epsilon = 0.03);
    }

    #[test]
    fn test_item_pushed_off_the_back_falls() {
        let mut engine = RapierEngine::default();
        let bed = CargoBed::default();
        let follower = ContainerFollower::spawn(&bed, &Pose::default(), &mut engine);
        let mut stabilizer = CargoStabilizer::new(bed.clone(), StabilizerConfig::default());

        let id = place_crate(&mut stabilizer, &bed);
        let mut now = 0.0;
        run_parked(&mut stabilizer, &follower, &mut engine, &mut now, 30);
        assert_eq!(stabilizer.phase(id), Some(ItemPhase::Dynamic));

        let body = stabilizer.item(id).unwrap().body().unwrap();
        let behind = Vector3::new(0.0, bed.floor_top + 0.3, bed.rear_z() + 1.0);
        engine.set_translation(body, behind);
        let fallen = run_parked(&mut stabilizer, &follower, &mut engine, &mut now, 90);
        assert_eq!(fallen, vec![id]);
        assert!(stabilizer.is_fallen(id));
    }
}
