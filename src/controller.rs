//! Controller steering the vehicle.
//!
//! The vehicle is driven by the keyboard: arrow keys for throttle, reverse and steering, space
//! to brake. Keys only take over while one of them is held, so a scripted driver can run in
//! between. With no scripted driver around, releasing every key stops all input.

use bevy::prelude::*;

use crate::{
    domain::DriveInput,
    resource::DriveInputRes,
    simulator::{FrameSet, ScriptedDriver},
};

pub struct Controller;

impl Plugin for Controller {
    fn build(&self, app: &mut App) {
        app.init_resource::<DriveInputRes>()
            .add_systems(Update, control.in_set(FrameSet::Input));
    }
}

fn control(
    keys: Res<ButtonInput<KeyCode>>,
    scripted: Option<Res<ScriptedDriver>>,
    mut input: ResMut<DriveInputRes>,
) {
    let held = keys_to_input(&keys);
    if held != DriveInput::default() || scripted.is_none() {
        **input = held;
    }
}

fn keys_to_input(keys: &ButtonInput<KeyCode>) -> DriveInput {
    DriveInput {
        forward: keys.pressed(KeyCode::ArrowUp),
        reverse: keys.pressed(KeyCode::ArrowDown),
        brake: keys.pressed(KeyCode::Space),
        left: keys.pressed(KeyCode::ArrowLeft),
        right: keys.pressed(KeyCode::ArrowRight),
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_held_keys_map_to_input() {
        let mut keys = ButtonInput::<KeyCode>::default();
        keys.press(KeyCode::ArrowUp);
        keys.press(KeyCode::ArrowLeft);
        assert_eq!(
            keys_to_input(&keys),
            DriveInput {
                forward: true,
                left: true,
                ..Default::default()
            }
        );
    }

    fn press(app: &mut App, key: KeyCode) {
        app.world.resource_mut::<ButtonInput<KeyCode>>().press(key);
    }

    fn release(app: &mut App, key: KeyCode) {
        app.world.resource_mut::<ButtonInput<KeyCode>>().release(key);
    }

    #[test]
    fn test_keys_override_scripted_input_only_while_held() {
        let mut app = App::new();
        app.init_resource::<ButtonInput<KeyCode>>()
            .init_resource::<ScriptedDriver>()
            .add_plugins(Controller);
        let scripted = DriveInput {
            forward: true,
            ..Default::default()
        };
        **app.world.resource_mut::<DriveInputRes>() = scripted;

        app.update();
        assert_eq!(**app.world.resource::<DriveInputRes>(), scripted);

        press(&mut app, KeyCode::Space);
        app.update();
        assert_eq!(
            **app.world.resource::<DriveInputRes>(),
            DriveInput {
                brake: true,
                ..Default::default()
            }
        );
    }

    #[test]
    fn test_releasing_keys_clears_input_without_scripted_driver() {
        let mut app = App::new();
        app.init_resource::<ButtonInput<KeyCode>>()
            .add_plugins(Controller);

        press(&mut app, KeyCode::ArrowUp);
        press(&mut app, KeyCode::ArrowRight);
        app.update();
        assert_eq!(
            **app.world.resource::<DriveInputRes>(),
            DriveInput {
                forward: true,
                right: true,
                ..Default::default()
            }
        );

        release(&mut app, KeyCode::ArrowUp);
        release(&mut app, KeyCode::ArrowRight);
        app.update();
        assert_eq!(**app.world.resource::<DriveInputRes>(), DriveInput::default());
    }
}
