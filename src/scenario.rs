//! Demo round: a loaded hauler drives down a street lined with buildings into a delivery bay.
//!
//! The street and the cargo are generated from a seed, so a headless run is reproducible. A
//! scripted driver weaves down the street, the bay's arrival triggers the auto-brake, and the
//! app exits after a fixed time with a summary of the round.

use bevy::{app::AppExit, prelude::*};
use nalgebra::{UnitQuaternion, Vector3};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::{
    domain::{
        Angle, CargoStabilizer, Collider, EnclosureWallBound, ItemDefinition, ItemId, Position,
        StaticWorld,
    },
    resource::{DriveInputRes, DrivetrainRes, StabilizerRes, WorldRes},
    simulator::{AutoBrake, FrameSet, ItemFallen, ScriptedDriver, SimClock},
};

const STREET_HALF_WIDTH: f64 = 8.0;
const STREET_LENGTH: i32 = 140;
const BLOCK_SPACING: usize = 8;
/// Where the delivery bay starts.
const BAY_Z: f64 = -150.0;
const BAY_DEPTH: f64 = 20.0;
const BAY_HALF_WIDTH: f64 = 6.0;
const WALL_THICKNESS: f64 = 0.5;
const AUTO_BRAKE_SECONDS: f64 = 3.0;

pub struct Scenario {
    pub seed: u64,
    /// Seconds until the app exits.
    pub duration: f64,
}

impl Default for Scenario {
    fn default() -> Self {
        Self {
            seed: 5,
            duration: 30.0,
        }
    }
}

impl Plugin for Scenario {
    fn build(&self, app: &mut App) {
        app.insert_resource(Script {
            seed: self.seed,
            duration: self.duration,
            arrived: false,
            lost: vec![],
        })
        .init_resource::<ScriptedDriver>()
        .add_systems(Startup, set_up)
        .add_systems(Update, drive_script.in_set(FrameSet::Autopilot))
        .add_systems(
            Update,
            (watch_cargo, finish).chain().after(FrameSet::Simulate),
        );
    }
}

#[derive(Resource, Debug)]
struct Script {
    seed: u64,
    duration: f64,
    arrived: bool,
    lost: Vec<ItemId>,
}

fn set_up(
    script: Res<Script>,
    mut world: ResMut<WorldRes>,
    mut stabilizer: ResMut<StabilizerRes>,
) {
    let mut rng = ChaCha8Rng::seed_from_u64(script.seed);
    **world = create_world(&mut rng);
    let loaded = load_cargo(&mut stabilizer, &mut rng);
    info!(
        items = loaded.len(),
        volume = stabilizer.packed_volume(),
        "cargo loaded"
    );
}

/// Street of randomly sized buildings on both sides, closed off by the delivery bay.
fn create_world(rng: &mut impl Rng) -> StaticWorld {
    let mut world = StaticWorld::new(50.0);

    for z in (10..=STREET_LENGTH).step_by(BLOCK_SPACING) {
        for side in [-1.0, 1.0] {
            let width = rng.random_range(3.0..6.0);
            let depth = rng.random_range(3.0..6.0);
            let setback = rng.random_range(1.0..3.0);
            world.insert_collider(Collider::new(
                Position::new(
                    side * (STREET_HALF_WIDTH + setback + width / 2.0),
                    -(z as f64) + rng.random_range(-1.5..1.5),
                ),
                Angle::new(rng.random_range(-0.15..0.15)),
                width,
                depth,
            ));
        }
    }

    let back = BAY_Z - BAY_DEPTH;
    world.set_enclosure_walls(vec![
        EnclosureWallBound::new(
            -BAY_HALF_WIDTH - WALL_THICKNESS,
            -BAY_HALF_WIDTH,
            back,
            BAY_Z,
        ),
        EnclosureWallBound::new(
            BAY_HALF_WIDTH,
            BAY_HALF_WIDTH + WALL_THICKNESS,
            back,
            BAY_Z,
        ),
        EnclosureWallBound::new(
            -BAY_HALF_WIDTH - WALL_THICKNESS,
            BAY_HALF_WIDTH + WALL_THICKNESS,
            back - WALL_THICKNESS,
            back,
        ),
    ]);
    world
}

/// Packs a row of random boxes into the bed, front to back.
fn load_cargo(stabilizer: &mut CargoStabilizer, rng: &mut impl Rng) -> Vec<ItemId> {
    const SLOTS_X: [f64; 3] = [-0.65, 0.0, 0.65];
    const SLOTS_Z: [f64; 3] = [-0.5, 0.5, 1.5];

    let floor_top = stabilizer.floor_top();
    let mut loaded = vec![];
    for (row, z) in SLOTS_Z.iter().enumerate() {
        for (column, x) in SLOTS_X.iter().enumerate() {
            let size = Vector3::new(
                rng.random_range(0.3..0.6),
                rng.random_range(0.3..0.7),
                rng.random_range(0.3..0.8),
            );
            let definition = ItemDefinition::new(
                format!("box {row}-{column}"),
                size,
                rng.random_range(5.0..30.0),
            );
            let id = stabilizer.add_item(definition);
            let offset = Vector3::new(*x, floor_top + size.y / 2.0 + 0.01, *z);
            let placed = stabilizer
                .pick_up(id)
                .and_then(|()| stabilizer.place(id, offset, UnitQuaternion::identity(), 0.0));
            match placed {
                Ok(()) => loaded.push(id),
                Err(error) => warn!(%error, "skipping cargo item"),
            }
        }
    }
    loaded
}

fn drive_script(
    clock: Res<SimClock>,
    drivetrain: Res<DrivetrainRes>,
    mut script: ResMut<Script>,
    mut input: ResMut<DriveInputRes>,
    mut brake: EventWriter<AutoBrake>,
) {
    let position = drivetrain.state().position;
    if !script.arrived && position.z() < BAY_Z {
        script.arrived = true;
        brake.send(AutoBrake(AUTO_BRAKE_SECONDS));
        info!(z = position.z(), "arrived at the delivery bay");
    }

    let weave = (clock.now * 0.4).sin();
    input.forward = !script.arrived;
    input.brake = false;
    // Steer back towards the middle of the street while weaving.
    input.left = weave > 0.7 && position.x() > -2.0;
    input.right = weave < -0.7 && position.x() < 2.0;
}

fn watch_cargo(mut events: EventReader<ItemFallen>, mut script: ResMut<Script>) {
    for ItemFallen(id) in events.read() {
        script.lost.push(*id);
    }
}

fn finish(
    clock: Res<SimClock>,
    script: Res<Script>,
    drivetrain: Res<DrivetrainRes>,
    stabilizer: Res<StabilizerRes>,
    mut exit: EventWriter<AppExit>,
) {
    if clock.now < script.duration {
        return;
    }
    let state = drivetrain.state();
    info!(
        frames = clock.frame,
        x = state.position.x(),
        z = state.position.z(),
        speed_mph = state.speed.mph(),
        gear = %state.gear_label(),
        fill_ratio = stabilizer.fill_ratio(),
        payload = stabilizer.payload_mass(),
        lost = script.lost.len(),
        "round over"
    );
    if !script.lost.is_empty() {
        warn!(lost = ?script.lost, "cargo was lost on the way");
    }
    exit.send(AppExit);
}
