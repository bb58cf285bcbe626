//! Supervision of the cargo items riding in the bed.
//!
//! The rigid-body engine integrates the items, but thin walls moving at driving speed are more
//! than it can be trusted with. Around every engine step the stabilizer therefore
//!
//! * moves items through their lifecycle as scheduled deadlines come due,
//! * drives settling and teleporting items along with the vehicle,
//! * clamps items that crossed a wall back inside before the step,
//! * caps velocities relative to the vehicle before and after the step,
//! * teleports items still outside a wall after the step,
//! * and gives up on items that left the bed for good.
//!
//! Item positions are kept in the vehicle frame: x and z relative to the vehicle origin and
//! heading, y measured from the ground.

use std::collections::BTreeMap;
use std::fmt;

use nalgebra::{UnitQuaternion, Vector3};
use tracing::{debug, info, warn};

use super::{
    BodyHandle, BodyMode, BodySpec, CargoBed, CargoBounds, CargoError, CargoItem, ConfigError,
    ItemDefinition, ItemId, ItemPhase, Pose, Position, RigidBodies, ScheduledAction,
    ScheduledActions,
};

#[derive(Clone, Debug, PartialEq)]
pub struct StabilizerConfig {
    /// Seconds between placement and body creation.
    pub spawn_delay: f64,
    /// Seconds a new body stays kinematic.
    pub settle_window: f64,
    /// Seconds a teleported body stays kinematic.
    pub teleport_window: f64,
    /// Distance kept from a wall when pushing an item back inside.
    pub safety_margin: f64,
    /// Ceiling of the item velocity relative to the vehicle, in m/s.
    pub max_relative_speed: f64,
    /// Ceiling of the angular speed, in rad/s.
    pub max_angular_speed: f64,
    pub min_vertical_velocity: f64,
    pub max_vertical_velocity: f64,
    /// An item whose center sinks this far below the floor top is lost.
    pub fallen_drop: f64,
    /// An item whose center is this far outside the bed's outer walls is lost.
    pub fallen_margin: f64,
    /// CCD prediction distance as a share of the item's smallest dimension.
    pub ccd_factor: f64,
}

impl Default for StabilizerConfig {
    fn default() -> Self {
        Self {
            spawn_delay: 0.1,
            settle_window: 0.25,
            teleport_window: 0.15,
            safety_margin: 0.02,
            max_relative_speed: 6.0,
            max_angular_speed: 4.0,
            min_vertical_velocity: -12.0,
            max_vertical_velocity: 4.0,
            fallen_drop: 0.5,
            fallen_margin: 1.5,
            ccd_factor: 0.5,
        }
    }
}

impl StabilizerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            (self.spawn_delay, "spawn delay"),
            (self.settle_window, "settle window"),
            (self.teleport_window, "teleport window"),
            (self.max_relative_speed, "relative speed ceiling"),
            (self.max_angular_speed, "angular speed ceiling"),
            (self.fallen_drop, "fallen drop"),
            (self.fallen_margin, "fallen margin"),
            (self.ccd_factor, "ccd factor"),
        ];
        if let Some((_, name)) = positive.iter().find(|(value, _)| *value <= 0.0) {
            return Err(ConfigError::NonPositive(*name));
        }
        if self.safety_margin < 0.0 {
            return Err(ConfigError::NonPositive("safety margin"));
        }
        if self.min_vertical_velocity > 0.0 || self.max_vertical_velocity < 0.0 {
            return Err(ConfigError::VerticalRange {
                min: self.min_vertical_velocity,
                max: self.max_vertical_velocity,
            });
        }
        Ok(())
    }
}

/// The vehicle as seen by one stabilizer pass.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VehicleFrame {
    /// Simulation time in seconds.
    pub now: f64,
    pub pose: Pose,
    /// World space velocity in m/s.
    pub velocity: Vector3<f64>,
}

impl VehicleFrame {
    pub fn new(now: f64, pose: Pose, velocity: Vector3<f64>) -> Self {
        Self {
            now,
            pose,
            velocity,
        }
    }

    /// World pose of something resting at a vehicle-local pose.
    pub fn to_world(
        &self,
        offset: Vector3<f64>,
        rotation: UnitQuaternion<f64>,
    ) -> (Vector3<f64>, UnitQuaternion<f64>) {
        let position = self.pose.transform_point(Position::new(offset.x, offset.z));
        (
            position.to_vector(offset.y),
            self.pose.heading.to_rotation() * rotation,
        )
    }

    pub fn to_local(
        &self,
        translation: Vector3<f64>,
        rotation: UnitQuaternion<f64>,
    ) -> (Vector3<f64>, UnitQuaternion<f64>) {
        let local = self
            .pose
            .inverse_transform_point(Position::new(translation.x, translation.z));
        (
            local.to_vector(translation.y),
            self.pose.heading.to_rotation().inverse() * rotation,
        )
    }

    fn direction_to_world(&self, local: Vector3<f64>) -> Vector3<f64> {
        self.pose.heading.to_rotation() * local
    }

    fn direction_to_local(&self, world: Vector3<f64>) -> Vector3<f64> {
        self.pose.heading.to_rotation().inverse() * world
    }
}

/// What a pass did, so the caller can react without polling every item.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StabilizerReport {
    pub spawned: Vec<ItemId>,
    pub settled: Vec<ItemId>,
    pub restored: Vec<ItemId>,
    pub clamped: Vec<ItemId>,
    pub teleported: Vec<ItemId>,
    pub capped: Vec<ItemId>,
    pub fallen: Vec<ItemId>,
}

impl StabilizerReport {
    pub fn is_quiet(&self) -> bool {
        *self == Self::default()
    }
}

/// Walls an item crossed, with its corrected vehicle-local position.
#[derive(Clone, Copy, Debug, PartialEq)]
struct Breach {
    corrected: Vector3<f64>,
    /// Outward wall normals in the vehicle frame, zero where no wall was crossed.
    outward: Vector3<f64>,
}

pub type FallenCallback = Box<dyn FnMut(ItemId) + Send + Sync>;

pub struct CargoStabilizer {
    bed: CargoBed,
    config: StabilizerConfig,
    items: BTreeMap<ItemId, CargoItem>,
    actions: ScheduledActions,
    next_id: u32,
    on_fallen: Option<FallenCallback>,
    /// Items that changed phase during the frame in progress.
    transitioned: Vec<ItemId>,
}

impl fmt::Debug for CargoStabilizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CargoStabilizer")
            .field("bed", &self.bed)
            .field("config", &self.config)
            .field("items", &self.items)
            .field("actions", &self.actions)
            .finish_non_exhaustive()
    }
}

impl CargoStabilizer {
    pub fn new(bed: CargoBed, config: StabilizerConfig) -> Self {
        Self {
            bed,
            config,
            items: BTreeMap::new(),
            actions: ScheduledActions::new(),
            next_id: 0,
            on_fallen: None,
            transitioned: vec![],
        }
    }

    pub fn bed(&self) -> &CargoBed {
        &self.bed
    }

    pub fn config(&self) -> &StabilizerConfig {
        &self.config
    }

    /// Registers the function called the first time an item falls out.
    pub fn on_fallen(&mut self, callback: impl FnMut(ItemId) + Send + Sync + 'static) {
        self.on_fallen = Some(Box::new(callback));
    }

    pub fn items(&self) -> impl Iterator<Item = &CargoItem> + '_ {
        self.items.values()
    }

    pub fn item(&self, id: ItemId) -> Option<&CargoItem> {
        self.items.get(&id)
    }

    pub fn phase(&self, id: ItemId) -> Option<ItemPhase> {
        self.item(id).map(CargoItem::phase)
    }

    pub fn is_fallen(&self, id: ItemId) -> bool {
        self.item(id).is_some_and(CargoItem::is_fallen)
    }

    pub fn any_fallen(&self) -> bool {
        self.items().any(CargoItem::is_fallen)
    }

    pub fn cargo_bounds(&self, pose: &Pose) -> CargoBounds {
        self.bed.cargo_bounds(pose)
    }

    pub fn floor_top(&self) -> f64 {
        self.bed.floor_top
    }

    /// Volume of all items currently placed in the bed.
    pub fn packed_volume(&self) -> f64 {
        self.placed().map(|item| item.definition().volume).sum()
    }

    pub fn payload_mass(&self) -> f64 {
        self.placed().map(|item| item.definition().mass).sum()
    }

    pub fn fill_ratio(&self) -> f64 {
        self.packed_volume() / self.bed.capacity()
    }

    fn placed(&self) -> impl Iterator<Item = &CargoItem> + '_ {
        self.items().filter(|item| item.phase().is_placed())
    }

    /// Starts tracking a ground pickup handed over by the item catalog.
    pub fn add_item(&mut self, definition: ItemDefinition) -> ItemId {
        let id = ItemId(self.next_id);
        self.next_id += 1;
        self.items.insert(id, CargoItem::new(id, definition));
        id
    }

    pub fn pick_up(&mut self, id: ItemId) -> Result<(), CargoError> {
        self.item_mut(id)?.pick_up()
    }

    /// Commits a held item at a vehicle-local pose. The body is created once the spawn delay
    /// has passed.
    pub fn place(
        &mut self,
        id: ItemId,
        offset: Vector3<f64>,
        rotation: UnitQuaternion<f64>,
        now: f64,
    ) -> Result<(), CargoError> {
        let item = self.items.get(&id).ok_or(CargoError::UnknownItem(id))?;
        if item.phase() != ItemPhase::Held {
            return Err(CargoError::UnexpectedPhase {
                id,
                expected: ItemPhase::Held,
                actual: item.phase(),
            });
        }
        let half = projected_half_extents(&rotation, &item.definition().half_extents());
        if !self.fits(&offset, &half) {
            debug!(%id, ?offset, "placement outside the cargo bed");
            return Err(CargoError::OutOfBounds(id));
        }

        let item = self.item_mut(id)?;
        item.advance(ItemPhase::Held, ItemPhase::PendingBody)?;
        item.set_local_pose(offset, rotation);
        let at = now + self.config.spawn_delay;
        self.actions.schedule(at, ScheduledAction::SpawnBody(id));
        info!(%id, at, "item placed");
        Ok(())
    }

    /// Stops tracking an item and deletes its body.
    pub fn remove_item(
        &mut self,
        id: ItemId,
        bodies: &mut impl RigidBodies,
    ) -> Result<CargoItem, CargoError> {
        let mut item = self.items.remove(&id).ok_or(CargoError::UnknownItem(id))?;
        self.actions.cancel(id);
        if let Some(body) = item.body() {
            bodies.remove_body(body);
            item.set_body(None);
        }
        Ok(item)
    }

    /// Drops every item and body, as at the start of a round.
    pub fn reset(&mut self, bodies: &mut impl RigidBodies) {
        for body in self.items.values().filter_map(CargoItem::body) {
            bodies.remove_body(body);
        }
        self.items.clear();
        self.actions.clear();
        self.transitioned.clear();
        info!("cargo reset");
    }

    /// Runs right before the engine step.
    pub fn pre_step(
        &mut self,
        frame: &VehicleFrame,
        bodies: &mut impl RigidBodies,
    ) -> StabilizerReport {
        let mut report = StabilizerReport::default();
        self.transitioned.clear();
        self.run_due_actions(frame, bodies, &mut report);

        for id in self.items.keys().copied().collect::<Vec<_>>() {
            let Some(item) = self.items.get(&id) else {
                continue;
            };
            let Some(body) = item.body() else {
                continue;
            };
            let carried = match item.phase() {
                ItemPhase::Settling => true,
                ItemPhase::Dynamic => item.is_teleporting(),
                _ => continue,
            };
            if carried {
                let (translation, rotation) =
                    frame.to_world(item.local_offset(), item.local_rotation());
                bodies.set_kinematic_target(body, translation, rotation);
            } else {
                self.correct_before_step(id, body, frame, bodies, &mut report);
            }
        }
        report
    }

    /// Runs right after the engine step.
    pub fn post_step(
        &mut self,
        frame: &VehicleFrame,
        bodies: &mut impl RigidBodies,
    ) -> StabilizerReport {
        let mut report = StabilizerReport::default();
        for id in self.items.keys().copied().collect::<Vec<_>>() {
            let Some(item) = self.items.get(&id) else {
                continue;
            };
            let Some(body) = item.body() else {
                continue;
            };
            if item.phase() != ItemPhase::Dynamic || item.is_teleporting() {
                continue;
            }
            self.correct_after_step(id, body, frame, bodies, &mut report);
        }
        report
    }

    fn correct_before_step(
        &mut self,
        id: ItemId,
        body: BodyHandle,
        frame: &VehicleFrame,
        bodies: &mut impl RigidBodies,
        report: &mut StabilizerReport,
    ) {
        let (Some(translation), Some(rotation)) = (bodies.translation(body), bodies.rotation(body))
        else {
            return;
        };
        let (local, local_rotation) = frame.to_local(translation, rotation);
        if self.check_fallen(id, &local, report) {
            return;
        }

        if let Some(breach) = self.breach(id, &local, &local_rotation) {
            debug!(%id, ?local, corrected = ?breach.corrected, "clamping item back inside");
            let (corrected, _) = frame.to_world(breach.corrected, local_rotation);
            bodies.set_translation(body, corrected);
            if let Some(velocity) = bodies.linear_velocity(body) {
                let relative = frame.direction_to_local(velocity - frame.velocity);
                let outward = relative.component_mul(&breach.outward);
                let kept = relative - breach.outward.component_mul(&outward.map(|v| v.max(0.0)));
                bodies.set_linear_velocity(body, frame.velocity + frame.direction_to_world(kept));
            }
            report.clamped.push(id);
        }

        if self.apply_ceilings(body, frame, bodies) {
            report.capped.push(id);
        }
    }

    fn correct_after_step(
        &mut self,
        id: ItemId,
        body: BodyHandle,
        frame: &VehicleFrame,
        bodies: &mut impl RigidBodies,
        report: &mut StabilizerReport,
    ) {
        if self.apply_ceilings(body, frame, bodies) {
            report.capped.push(id);
        }
        let (Some(translation), Some(rotation)) = (bodies.translation(body), bodies.rotation(body))
        else {
            return;
        };
        let (mut local, local_rotation) = frame.to_local(translation, rotation);
        if self.check_fallen(id, &local, report) {
            return;
        }

        if let Some(breach) = self.breach(id, &local, &local_rotation) {
            let previous = bodies.mode(body).unwrap_or(BodyMode::Dynamic);
            bodies.set_mode(body, BodyMode::Kinematic);
            bodies.stop(body);
            let (corrected, _) = frame.to_world(breach.corrected, local_rotation);
            bodies.set_translation(body, corrected);
            local = breach.corrected;

            let at = frame.now + self.config.teleport_window;
            self.actions
                .schedule(at, ScheduledAction::RestoreMode(id, previous));
            if let Some(item) = self.items.get_mut(&id) {
                item.set_teleporting(true);
            }
            warn!(%id, ?local, until = at, "item teleported back into the bed");
            report.teleported.push(id);
        }

        if let Some(item) = self.items.get_mut(&id) {
            item.set_local_pose(local, local_rotation);
        }
    }

    fn run_due_actions(
        &mut self,
        frame: &VehicleFrame,
        bodies: &mut impl RigidBodies,
        report: &mut StabilizerReport,
    ) {
        for action in self.actions.drain_due(frame.now) {
            let id = action.item();
            let Some(item) = self.items.get_mut(&id) else {
                continue;
            };
            match action {
                ScheduledAction::SpawnBody(_) => {
                    if item.advance(ItemPhase::PendingBody, ItemPhase::Settling).is_err() {
                        continue;
                    }
                    let definition = item.definition();
                    let (translation, rotation) =
                        frame.to_world(item.local_offset(), item.local_rotation());
                    let body = bodies.create_body(&BodySpec {
                        translation,
                        rotation,
                        half_extents: definition.half_extents(),
                        mass: definition.mass,
                        mode: BodyMode::Kinematic,
                        ccd_prediction: Some(
                            definition.smallest_dimension() * self.config.ccd_factor,
                        ),
                    });
                    bodies.stop(body);
                    item.set_body(Some(body));
                    let at = frame.now + self.config.settle_window;
                    self.actions.schedule(at, ScheduledAction::EndSettling(id));
                    self.transitioned.push(id);
                    info!(%id, ?body, "item body spawned");
                    report.spawned.push(id);
                }
                ScheduledAction::EndSettling(_) => {
                    if item.advance(ItemPhase::Settling, ItemPhase::Dynamic).is_err() {
                        continue;
                    }
                    if let Some(body) = item.body() {
                        bodies.set_mode(body, BodyMode::Dynamic);
                        bodies.set_linear_velocity(body, frame.velocity);
                        bodies.set_angular_velocity(body, Vector3::zeros());
                    }
                    self.transitioned.push(id);
                    info!(%id, "item settled");
                    report.settled.push(id);
                }
                ScheduledAction::RestoreMode(_, mode) => {
                    if item.phase() != ItemPhase::Dynamic || !item.is_teleporting() {
                        continue;
                    }
                    if let Some(body) = item.body() {
                        bodies.set_mode(body, mode);
                        bodies.set_linear_velocity(body, frame.velocity);
                        bodies.set_angular_velocity(body, Vector3::zeros());
                    }
                    item.set_teleporting(false);
                    debug!(%id, ?mode, "teleport window over");
                    report.restored.push(id);
                }
            }
        }
    }

    /// Marks the item fallen when `local` is out of reach. Items that changed phase earlier in
    /// the frame are looked at again next frame.
    fn check_fallen(
        &mut self,
        id: ItemId,
        local: &Vector3<f64>,
        report: &mut StabilizerReport,
    ) -> bool {
        if self.transitioned.contains(&id) || !self.is_lost(local) {
            return false;
        }
        let Some(item) = self.items.get_mut(&id) else {
            return false;
        };
        if !item.mark_fallen() {
            return true;
        }
        self.actions.cancel(id);
        self.transitioned.push(id);
        warn!(%id, ?local, "item fell out of the cargo bed");
        report.fallen.push(id);
        if let Some(callback) = self.on_fallen.as_mut() {
            callback(id);
        }
        true
    }

    fn is_lost(&self, local: &Vector3<f64>) -> bool {
        let outer = self.bed.wall_thickness + self.config.fallen_margin;
        local.y < self.bed.floor_top - self.config.fallen_drop
            || local.x < self.bed.left_x() - outer
            || local.x > self.bed.right_x() + outer
            || local.z < self.bed.front_z() - outer
            || local.z > self.bed.rear_z() + outer
    }

    /// Wall planes crossed by the item's box. Only items still above the bed floor area are
    /// held back, the open rear edge lets everything else go.
    fn breach(
        &self,
        id: ItemId,
        local: &Vector3<f64>,
        rotation: &UnitQuaternion<f64>,
    ) -> Option<Breach> {
        if local.z > self.bed.rear_z() {
            return None;
        }
        let half = self
            .items
            .get(&id)
            .map(|item| projected_half_extents(rotation, &item.definition().half_extents()))?;
        let margin = self.config.safety_margin;
        let mut corrected = *local;
        let mut outward = Vector3::zeros();

        if local.x + half.x > self.bed.right_x() {
            corrected.x = self.bed.right_x() - half.x - margin;
            outward.x = 1.0;
        } else if local.x - half.x < self.bed.left_x() {
            corrected.x = self.bed.left_x() + half.x + margin;
            outward.x = -1.0;
        }
        if local.z - half.z < self.bed.front_z() {
            corrected.z = self.bed.front_z() + half.z + margin;
            outward.z = -1.0;
        }

        (outward != Vector3::zeros()).then_some(Breach { corrected, outward })
    }

    /// Caps the velocity relative to the vehicle and the angular speed. Returns whether
    /// anything changed.
    fn apply_ceilings(
        &self,
        body: BodyHandle,
        frame: &VehicleFrame,
        bodies: &mut impl RigidBodies,
    ) -> bool {
        let mut changed = false;
        if let Some(velocity) = bodies.linear_velocity(body) {
            let mut relative = velocity - frame.velocity;
            let speed = relative.norm();
            if speed > self.config.max_relative_speed {
                relative *= self.config.max_relative_speed / speed;
            }
            let mut capped = frame.velocity + relative;
            capped.y = capped.y.clamp(
                self.config.min_vertical_velocity,
                self.config.max_vertical_velocity,
            );
            if capped != velocity {
                bodies.set_linear_velocity(body, capped);
                changed = true;
            }
        }
        if let Some(angular) = bodies.angular_velocity(body) {
            let speed = angular.norm();
            if speed > self.config.max_angular_speed {
                let scale = self.config.max_angular_speed / speed;
                bodies.set_angular_velocity(body, angular * scale);
                changed = true;
            }
        }
        changed
    }

    fn fits(&self, offset: &Vector3<f64>, half: &Vector3<f64>) -> bool {
        let bottom = offset.y - half.y;
        let top = offset.y + half.y;
        self.bed
            .contains_footprint(Position::new(offset.x, offset.z), half.x, half.z)
            && bottom >= self.bed.floor_top - self.config.safety_margin
            && top <= self.bed.floor_top + self.bed.stack_height
    }

    fn item_mut(&mut self, id: ItemId) -> Result<&mut CargoItem, CargoError> {
        self.items.get_mut(&id).ok_or(CargoError::UnknownItem(id))
    }
}

/// Half extents of a box rotated by `rotation`, measured along the frame axes.
pub fn projected_half_extents(
    rotation: &UnitQuaternion<f64>,
    half: &Vector3<f64>,
) -> Vector3<f64> {
    rotation.to_rotation_matrix().matrix().abs() * half
}
