//! Kinematic drivetrain of a heavy cargo vehicle: automatic gearbox, speed dependent steering
//! about a sliding pivot, drift, and collision vetoes on every pose change.

use tracing::debug;

use super::{Angle, ConfigError, DriveInput, Pose, Position, Speed, VehicleState};

/// Outcome of a single [`Drivetrain::update_driving`] call.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct DriveReport {
    pub rotation_vetoed: bool,
    pub translation_blocked: bool,
    pub gear_change: Option<(i8, i8)>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Drivetrain {
    config: DrivetrainConfig,
    state: VehicleState,
    payload_mass: f64,
}

impl Drivetrain {
    pub fn new(config: DrivetrainConfig, state: VehicleState) -> Self {
        Self {
            config,
            state,
            payload_mass: 0.0,
        }
    }

    pub fn state(&self) -> &VehicleState {
        &self.state
    }

    pub fn config(&self) -> &DrivetrainConfig {
        &self.config
    }

    pub fn payload_mass(&self) -> f64 {
        self.payload_mass
    }

    /// Cargo mass slowing the vehicle down, in kilograms.
    pub fn set_payload_mass(&mut self, mass: f64) {
        self.payload_mass = mass.max(0.0);
    }

    /// Forces braking for `seconds`, e.g. when arriving at a destination.
    pub fn trigger_auto_brake(&mut self, seconds: f64) {
        self.state.auto_brake_timer = self.state.auto_brake_timer.max(seconds);
    }

    /// Puts the vehicle back to a standstill at `pose`.
    pub fn reset(&mut self, pose: Pose) {
        self.state = VehicleState::new(pose.position, pose.heading);
    }

    /// Advances the vehicle by one frame.
    ///
    /// `can_occupy` is asked with the current and the candidate pose before any pose change is
    /// committed. A rejected rotation restores position, heading, turn input and drift exactly;
    /// a rejected translation discards the move and halves the speed.
    pub fn update_driving(
        &mut self,
        input: &DriveInput,
        dt: f64,
        mut can_occupy: impl FnMut(&Pose, &Pose) -> bool,
    ) -> DriveReport {
        let dt = self.config.clamp_dt(dt);
        let mut report = DriveReport::default();

        let input = if self.state.auto_brake_timer > 0.0 {
            self.state.auto_brake_timer = (self.state.auto_brake_timer - dt).max(0.0);
            DriveInput {
                brake: true,
                ..Default::default()
            }
        } else {
            *input
        };

        self.update_speed(&input, dt);

        let gear = self.config.gear_for(self.state.gear, self.state.speed);
        if gear != self.state.gear {
            debug!(
                from = self.state.gear,
                to = gear,
                speed = self.state.speed.mph(),
                "gear change"
            );
            report.gear_change = Some((self.state.gear, gear));
            self.state.gear = gear;
        }

        let before = self.state;
        if self.steer(&input, dt) {
            let current = before.pose();
            if !can_occupy(&current, &self.state.pose()) {
                debug!(heading = f64::from(before.heading), "rotation vetoed");
                self.state.position = before.position;
                self.state.heading = before.heading;
                self.state.turn_input = before.turn_input;
                self.state.drift_angle = before.drift_angle;
                report.rotation_vetoed = true;
            }
        }

        let distance = self.state.speed.meters_per_second() * dt;
        if distance != 0.0 {
            let current = self.state.pose();
            let candidate = Pose::new(
                current.position
                    + Position::new(0.0, distance).rotate_vector(self.state.travel_direction()),
                current.heading,
            );
            if can_occupy(&current, &candidate) {
                self.state.position = candidate.position;
            } else {
                self.state.speed =
                    Speed::new(self.state.speed.mph() * self.config.impact_speed_factor);
                report.translation_blocked = true;
            }
        }

        report
    }

    /// Integrates speed for one frame and clamps it to the drivable range.
    pub fn update_speed(&mut self, input: &DriveInput, dt: f64) {
        let config = &self.config;
        let speed = self.state.speed.mph();
        let braking_step = config.brake_deceleration * dt;

        let speed = if input.brake {
            approach(speed, 0.0, braking_step)
        } else if input.forward {
            if speed > 0.0 {
                approach(speed, 0.0, braking_step)
            } else {
                speed - config.acceleration_for_gear(self.state.gear) * self.load_scale() * dt
            }
        } else if input.reverse {
            if speed < 0.0 {
                approach(speed, 0.0, braking_step)
            } else {
                speed + config.reverse_acceleration * self.load_scale() * dt
            }
        } else if speed.abs() < config.stationary_threshold {
            0.0
        } else {
            approach(speed, 0.0, config.coast_deceleration * dt)
        };

        self.state.speed = Speed::new(speed.clamp(-config.max_speed, config.max_reverse_speed()));
    }

    fn load_scale(&self) -> f64 {
        1.0 / (1.0 + self.config.load_factor * self.payload_mass)
    }

    /// Smooths the turn input, accumulates drift and rotates about the pivot. Returns whether the
    /// pose changed.
    fn steer(&mut self, input: &DriveInput, dt: f64) -> bool {
        let config = &self.config;
        let state = &mut self.state;
        let steering = input.steering();

        state.turn_input +=
            (steering - state.turn_input) * (1.0 - (-config.turn_smoothing * dt).exp());
        state.turn_input = state.turn_input.clamp(-1.0, 1.0);

        let abs_speed = state.speed.mph().abs();
        let direction = if state.speed.is_reverse() { -1.0 } else { 1.0 };

        let drift = f64::from(state.drift_angle);
        let drift = if input.brake && steering != 0.0 && abs_speed > config.drift_speed_threshold {
            (drift + steering * direction * config.drift_rate * dt)
                .clamp(-config.max_drift_angle, config.max_drift_angle)
        } else {
            let decayed = drift * (-config.drift_decay * dt).exp();
            if decayed.abs() < 1e-6 {
                0.0
            } else {
                decayed
            }
        };
        state.drift_angle = Angle::new(drift);

        if abs_speed < config.stationary_threshold {
            return false;
        }

        let speed_scale = (abs_speed / config.full_turn_speed).clamp(0.0, 1.0);
        let drift_boost = if config.max_drift_angle > 0.0 {
            1.0 + config.drift_turn_boost * drift.abs() / config.max_drift_angle
        } else {
            1.0
        };
        let delta =
            state.turn_input * config.max_turn_rate * speed_scale * direction * drift_boost * dt;
        if delta == 0.0 {
            return false;
        }

        let pivot_blend = (abs_speed / config.pivot_full_speed).clamp(0.0, 1.0);
        let pivot_offset = Position::new(0.0, pivot_blend * config.pivot_rear_offset);
        let pivot = state.position + pivot_offset.rotate_vector(state.heading);

        state.heading = state.heading + Angle::new(delta);
        state.position = pivot - pivot_offset.rotate_vector(state.heading);
        true
    }
}

fn approach(value: f64, target: f64, step: f64) -> f64 {
    if value > target {
        (value - step).max(target)
    } else {
        (value + step).min(target)
    }
}

/// Tuning of the drivetrain. Speeds are in mph, accelerations in mph per second, angles in
/// radians.
#[derive(Clone, Debug, PartialEq)]
pub struct DrivetrainConfig {
    pub max_speed: f64,
    /// Acceleration per forward gear, first gear first.
    pub gear_acceleration: Vec<f64>,
    /// Speed needed to shift up into each forward gear.
    pub upshift_thresholds: Vec<f64>,
    /// Speed needed to stay in each forward gear.
    pub downshift_thresholds: Vec<f64>,
    pub reverse_acceleration: f64,
    pub brake_deceleration: f64,
    pub coast_deceleration: f64,
    /// Positive speed above which the gearbox reports reverse.
    pub reverse_gear_threshold: f64,
    /// Below this speed the vehicle counts as standing still.
    pub stationary_threshold: f64,
    pub max_turn_rate: f64,
    /// Speed at which the full turn rate is available.
    pub full_turn_speed: f64,
    pub turn_smoothing: f64,
    /// Distance of the high speed pivot behind the vehicle center, in meters.
    pub pivot_rear_offset: f64,
    /// Speed at which the pivot reaches its rear offset.
    pub pivot_full_speed: f64,
    pub drift_speed_threshold: f64,
    pub drift_rate: f64,
    pub max_drift_angle: f64,
    pub drift_decay: f64,
    pub drift_turn_boost: f64,
    pub impact_speed_factor: f64,
    pub max_dt: f64,
    /// Acceleration loss per kilogram of payload.
    pub load_factor: f64,
}

impl Default for DrivetrainConfig {
    fn default() -> Self {
        Self {
            max_speed: 55.0,
            gear_acceleration: vec![14.0, 10.0, 7.0, 5.0, 3.5],
            upshift_thresholds: vec![0.5, 12.0, 22.0, 32.0, 42.0],
            downshift_thresholds: vec![0.2, 9.0, 18.0, 28.0, 38.0],
            reverse_acceleration: 6.0,
            brake_deceleration: 35.0,
            coast_deceleration: 4.0,
            reverse_gear_threshold: 0.05,
            stationary_threshold: 0.05,
            max_turn_rate: 1.2,
            full_turn_speed: 8.0,
            turn_smoothing: 8.0,
            pivot_rear_offset: 1.5,
            pivot_full_speed: 25.0,
            drift_speed_threshold: 15.0,
            drift_rate: 0.6,
            max_drift_angle: 0.35,
            drift_decay: 3.0,
            drift_turn_boost: 0.3,
            impact_speed_factor: 0.5,
            max_dt: 0.05,
            load_factor: 0.0005,
        }
    }
}

impl DrivetrainConfig {
    pub fn max_reverse_speed(&self) -> f64 {
        self.max_speed * 0.3
    }

    /// Frame time usable for integration. Hitches are cut to `max_dt`, garbage becomes zero.
    pub fn clamp_dt(&self, dt: f64) -> f64 {
        if dt.is_finite() {
            dt.clamp(0.0, self.max_dt)
        } else {
            0.0
        }
    }

    /// Neutral and reverse pull like first gear.
    pub fn acceleration_for_gear(&self, gear: i8) -> f64 {
        let index = (gear.max(1) as usize - 1).min(self.gear_acceleration.len().saturating_sub(1));
        self.gear_acceleration.get(index).copied().unwrap_or_default()
    }

    /// Gear for `speed` given the gear of the previous frame. Entering a gear from below needs its
    /// upshift threshold, staying in it only its lower downshift threshold.
    pub fn gear_for(&self, previous: i8, speed: Speed) -> i8 {
        if speed.mph() > self.reverse_gear_threshold {
            return -1;
        }

        let abs_speed = speed.mph().abs();
        let mut gear = 0;
        for (index, (up, down)) in self
            .upshift_thresholds
            .iter()
            .zip(&self.downshift_thresholds)
            .enumerate()
        {
            let candidate = index as i8 + 1;
            let threshold = if previous >= candidate { down } else { up };
            if abs_speed >= *threshold {
                gear = candidate;
            } else {
                break;
            }
        }
        gear
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let gears = self.gear_acceleration.len();
        if gears == 0 || gears > i8::MAX as usize {
            return Err(ConfigError::GearCount(gears));
        }
        if self.upshift_thresholds.len() != gears || self.downshift_thresholds.len() != gears {
            return Err(ConfigError::GearTableLength {
                gears,
                upshift: self.upshift_thresholds.len(),
                downshift: self.downshift_thresholds.len(),
            });
        }
        for gear in 0..gears {
            let (up, down) = (self.upshift_thresholds[gear], self.downshift_thresholds[gear]);
            if down > up {
                return Err(ConfigError::InvertedHysteresis {
                    gear: gear + 1,
                    upshift: up,
                    downshift: down,
                });
            }
            if gear > 0 && up <= self.upshift_thresholds[gear - 1] {
                return Err(ConfigError::UnorderedThresholds(gear + 1));
            }
        }
        if self.max_speed <= 0.0 || self.max_dt <= 0.0 {
            return Err(ConfigError::NonPositive("drivetrain speed or time step"));
        }
        Ok(())
    }
}
