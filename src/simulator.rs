//! Simulation of the hauler driving through the world with its cargo.
//!
//! Every frame runs the same fixed sequence: the drivetrain proposes and commits a pose (vetted
//! by the collision broker), the cargo bed is pushed after the vehicle, the cargo is corrected,
//! the engine steps and the cargo is corrected again. Items lost on the way are announced with
//! [`ItemFallen`].

use bevy::prelude::*;

use crate::{
    domain::{
        CargoStabilizer, CollisionBroker, ContainerFollower, Drivetrain, FrameCache, ItemId,
        Pose, SimulationConfig, StabilizerReport, StaticWorld, VehicleFrame, VehicleState,
    },
    engine::RapierEngine,
    resource::{
        BrokerRes, DriveInputRes, DrivetrainRes, EngineRes, FollowerRes, StabilizerRes, WorldRes,
    },
};

/// Tile edge length of the default world store.
const TILE_SIZE: f64 = 50.0;

/// Groups of per-frame systems, run in this order.
#[derive(SystemSet, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FrameSet {
    /// Scripted drivers fill in the drive input.
    Autopilot,
    /// Player input overrides it.
    Input,
    Simulate,
}

/// Present while a system in [`FrameSet::Autopilot`] writes the drive input. Without it, letting
/// go of every key clears the input.
#[derive(Resource, Clone, Copy, Debug, Default)]
pub struct ScriptedDriver;

#[derive(Default)]
pub struct Simulator {
    pub config: SimulationConfig,
}

impl Plugin for Simulator {
    fn build(&self, app: &mut App) {
        let config = match self.config.validate() {
            Ok(()) => self.config.clone(),
            Err(error) => {
                error!(%error, "invalid simulation config, falling back to defaults");
                SimulationConfig::default()
            }
        };

        let mut engine = RapierEngine::default();
        let follower = ContainerFollower::spawn(&config.bed, &Pose::default(), &mut engine);

        app.configure_sets(
            Update,
            (FrameSet::Autopilot, FrameSet::Input, FrameSet::Simulate).chain(),
        )
        .add_event::<ItemFallen>()
        .add_event::<AutoBrake>()
        .add_event::<ResetRound>()
        .init_resource::<DriveInputRes>()
        .init_resource::<SimClock>()
        .insert_resource(DrivetrainRes::from(Drivetrain::new(
            config.drivetrain.clone(),
            VehicleState::default(),
        )))
        .insert_resource(BrokerRes::from(CollisionBroker::new(
            config.geometry.clone(),
            config.broker,
        )))
        .insert_resource(WorldRes::from(StaticWorld::new(TILE_SIZE)))
        .insert_resource(StabilizerRes::from(CargoStabilizer::new(
            config.bed.clone(),
            config.stabilizer.clone(),
        )))
        .insert_resource(FollowerRes::from(follower))
        .insert_resource(EngineRes::from(engine))
        .add_systems(
            Update,
            (
                (reset_round, apply_auto_brake, advance_clock),
                drive,
                follow,
                stabilize_before_step,
                step_engine,
                stabilize_after_step,
            )
                .chain()
                .in_set(FrameSet::Simulate),
        );
    }
}

/// Sent the first time an item falls out of the bed.
#[derive(Event, Clone, Copy, Debug, PartialEq, Eq)]
pub struct ItemFallen(pub ItemId);

/// Forces the vehicle to brake for the given number of seconds.
#[derive(Event, Clone, Copy, Debug, PartialEq)]
pub struct AutoBrake(pub f64);

/// Clears the cargo and puts the vehicle back at the start.
#[derive(Event, Clone, Copy, Debug, Default, PartialEq)]
pub struct ResetRound;

/// Simulation time, advanced by the clamped frame time.
#[derive(Resource, Debug, Default)]
pub struct SimClock {
    pub frame: u64,
    /// Seconds since start.
    pub now: f64,
    /// Length of the current frame.
    pub dt: f64,
    cache: FrameCache,
}

fn advance_clock(time: Res<Time>, drivetrain: Res<DrivetrainRes>, mut clock: ResMut<SimClock>) {
    let dt = drivetrain.config().clamp_dt(time.delta_seconds_f64());
    clock.frame += 1;
    clock.now += dt;
    clock.dt = dt;
}

fn apply_auto_brake(mut events: EventReader<AutoBrake>, mut drivetrain: ResMut<DrivetrainRes>) {
    for AutoBrake(seconds) in events.read() {
        info!(seconds, "auto-brake engaged");
        drivetrain.trigger_auto_brake(*seconds);
    }
}

fn reset_round(
    mut events: EventReader<ResetRound>,
    mut clock: ResMut<SimClock>,
    mut drivetrain: ResMut<DrivetrainRes>,
    mut stabilizer: ResMut<StabilizerRes>,
    follower: Res<FollowerRes>,
    mut engine: ResMut<EngineRes>,
) {
    if events.read().count() == 0 {
        return;
    }
    let start = Pose::default();
    drivetrain.reset(start);
    stabilizer.reset(&mut **engine);
    follower.teleport(&start, &mut **engine);
    clock.cache = FrameCache::default();
    info!("round reset");
}

fn drive(
    input: Res<DriveInputRes>,
    world: Res<WorldRes>,
    broker: Res<BrokerRes>,
    stabilizer: Res<StabilizerRes>,
    mut clock: ResMut<SimClock>,
    mut drivetrain: ResMut<DrivetrainRes>,
) {
    drivetrain.set_payload_mass(stabilizer.payload_mass());

    let frame = clock.frame;
    let mut cache = std::mem::take(&mut clock.cache);
    let report = drivetrain.update_driving(&input, clock.dt, |current, candidate| {
        let previous = std::mem::take(&mut cache);
        let (allowed, next) =
            broker.can_occupy_cached(&**world, frame, current, candidate, previous);
        cache = next;
        allowed
    });
    clock.cache = cache;

    if report.rotation_vetoed {
        debug!(frame, "turn blocked");
    }
    if report.translation_blocked {
        debug!(frame, speed = drivetrain.state().speed.mph(), "move blocked");
    }
    if let Some((from, to)) = report.gear_change {
        debug!(from, to, "gear change");
    }
}

fn follow(
    drivetrain: Res<DrivetrainRes>,
    follower: Res<FollowerRes>,
    mut engine: ResMut<EngineRes>,
) {
    follower.follow(&drivetrain.state().pose(), &mut **engine);
}

fn vehicle_frame(clock: &SimClock, drivetrain: &Drivetrain) -> VehicleFrame {
    let state = drivetrain.state();
    VehicleFrame::new(clock.now, state.pose(), state.linear_velocity())
}

fn stabilize_before_step(
    clock: Res<SimClock>,
    drivetrain: Res<DrivetrainRes>,
    mut stabilizer: ResMut<StabilizerRes>,
    mut engine: ResMut<EngineRes>,
    mut fallen: EventWriter<ItemFallen>,
) {
    let frame = vehicle_frame(&clock, &drivetrain);
    let report = stabilizer.pre_step(&frame, &mut **engine);
    announce(&report, &mut fallen);
}

fn step_engine(clock: Res<SimClock>, mut engine: ResMut<EngineRes>) {
    engine.step(clock.dt);
}

fn stabilize_after_step(
    clock: Res<SimClock>,
    drivetrain: Res<DrivetrainRes>,
    mut stabilizer: ResMut<StabilizerRes>,
    mut engine: ResMut<EngineRes>,
    mut fallen: EventWriter<ItemFallen>,
) {
    let frame = vehicle_frame(&clock, &drivetrain);
    let report = stabilizer.post_step(&frame, &mut **engine);
    announce(&report, &mut fallen);
}

fn announce(report: &StabilizerReport, fallen: &mut EventWriter<ItemFallen>) {
    for id in &report.teleported {
        debug!(%id, "item held back by teleport");
    }
    for id in &report.fallen {
        warn!(%id, "item lost");
        fallen.send(ItemFallen(*id));
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use bevy::time::TimeUpdateStrategy;
    use nalgebra::{UnitQuaternion, Vector3};
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::domain::{
        Angle, BedPartKind, Collider, DriveInput, ItemDefinition, ItemPhase, Position,
        RigidBodies,
    };

    fn app() -> App {
        let mut app = App::new();
        app.add_plugins(MinimalPlugins)
            .insert_resource(TimeUpdateStrategy::ManualDuration(Duration::from_secs_f64(
                1.0 / 60.0,
            )))
            .add_plugins(Simulator::default());
        app
    }

    fn run(app: &mut App, frames: usize) {
        for _ in 0..frames {
            app.update();
        }
    }

    #[test]
    fn test_forward_input_moves_vehicle_and_bed() {
        let mut app = app();
        **app.world.resource_mut::<DriveInputRes>() = DriveInput {
            forward: true,
            ..Default::default()
        };
        run(&mut app, 60);

        let state = *app.world.resource::<DrivetrainRes>().state();
        assert!(state.position.z() < -1.0);
        assert!(state.gear >= 1);
        assert!(app.world.resource::<SimClock>().frame >= 60);

        let floor = app
            .world
            .resource::<FollowerRes>()
            .handle(BedPartKind::Floor)
            .unwrap();
        let translation = app.world.resource::<EngineRes>().translation(floor).unwrap();
        assert!((translation.z - (state.position.z() + 0.9)).abs() < 0.5);
    }

    #[test]
    fn test_obstacle_stops_vehicle() {
        let mut app = app();
        app.world
            .resource_mut::<WorldRes>()
            .insert_collider(Collider::new(
                Position::new(0.0, -8.0),
                Angle::new(0.0),
                6.0,
                1.0,
            ));
        **app.world.resource_mut::<DriveInputRes>() = DriveInput {
            forward: true,
            ..Default::default()
        };
        run(&mut app, 240);

        let state = *app.world.resource::<DrivetrainRes>().state();
        assert!(state.position.z() < -2.0);
        // The cab's front edge stays behind the near face of the obstacle.
        assert!(state.position.z() - 3.1 >= -7.5);
    }

    #[test]
    fn test_lost_item_is_announced_once_and_reset_clears_it() {
        let mut app = app();
        let id = {
            let mut stabilizer = app.world.resource_mut::<StabilizerRes>();
            let id = stabilizer.add_item(ItemDefinition::new(
                "crate",
                Vector3::new(0.4, 0.4, 0.4),
                10.0,
            ));
            stabilizer.pick_up(id).unwrap();
            stabilizer
                .place(id, Vector3::new(0.0, 1.31, 0.9), UnitQuaternion::identity(), 0.0)
                .unwrap();
            id
        };
        run(&mut app, 30);
        assert_eq!(
            app.world.resource::<StabilizerRes>().phase(id),
            Some(ItemPhase::Dynamic)
        );

        let body = app.world.resource::<StabilizerRes>().item(id).unwrap().body().unwrap();
        app.world
            .resource_mut::<EngineRes>()
            .set_translation(body, Vector3::new(0.0, 0.2, 6.0));
        run(&mut app, 1);

        let mut reader = app.world.resource::<Events<ItemFallen>>().get_reader();
        let events = app.world.resource::<Events<ItemFallen>>();
        assert_eq!(
            reader.read(events).copied().collect::<Vec<_>>(),
            vec![ItemFallen(id)]
        );
        run(&mut app, 1);
        let events = app.world.resource::<Events<ItemFallen>>();
        assert_eq!(reader.read(events).count(), 0);
        assert!(app.world.resource::<StabilizerRes>().is_fallen(id));

        app.world.send_event(ResetRound);
        run(&mut app, 1);
        assert_eq!(app.world.resource::<StabilizerRes>().item(id), None);
        assert_eq!(
            app.world.resource::<DrivetrainRes>().state().position,
            Position::new(0.0, 0.0)
        );
    }

    #[test]
    fn test_auto_brake_event_stops_vehicle() {
        let mut app = app();
        **app.world.resource_mut::<DriveInputRes>() = DriveInput {
            forward: true,
            ..Default::default()
        };
        run(&mut app, 60);
        assert!(app.world.resource::<DrivetrainRes>().state().speed.mph() < -5.0);
        app.world.send_event(AutoBrake(2.0));
        run(&mut app, 60);
        assert_eq!(
            app.world.resource::<DrivetrainRes>().state().speed.mph(),
            0.0
        );
    }
}
