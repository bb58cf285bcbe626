use std::time::Duration;

use bevy::{app::ScheduleRunnerPlugin, input::InputPlugin, log::LogPlugin, prelude::*};

use cargo_hauler::{controller, scenario, simulator};

const FRAME_TIME: Duration = Duration::from_nanos(16_666_667);

fn main() {
    App::new()
        .add_plugins(MinimalPlugins.set(ScheduleRunnerPlugin::run_loop(Duration::ZERO)))
        .add_plugins((LogPlugin::default(), InputPlugin))
        .insert_resource(bevy::time::TimeUpdateStrategy::ManualDuration(FRAME_TIME))
        .add_plugins(controller::Controller)
        .add_plugins(simulator::Simulator::default())
        .add_plugins(scenario::Scenario::default())
        .run();
}
