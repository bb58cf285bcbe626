use thiserror::Error;

use super::{BrokerConfig, CargoBed, DrivetrainConfig, StabilizerConfig, VehicleGeometry};

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("the drivetrain needs between 1 and 127 forward gears, got {0}")]
    GearCount(usize),
    #[error(
        "gear tables disagree: {gears} accelerations, {upshift} upshift and {downshift} \
         downshift thresholds"
    )]
    GearTableLength {
        gears: usize,
        upshift: usize,
        downshift: usize,
    },
    #[error("gear {gear} downshifts at {downshift} mph, above its upshift at {upshift} mph")]
    InvertedHysteresis {
        gear: usize,
        upshift: f64,
        downshift: f64,
    },
    #[error("upshift threshold of gear {0} is not above the one of the gear below")]
    UnorderedThresholds(usize),
    #[error("{0} must be positive")]
    NonPositive(&'static str),
    #[error("vertical velocity range [{min}, {max}] must contain zero")]
    VerticalRange { min: f64, max: f64 },
    #[error("the vehicle needs at least one ring of neighbouring tiles, got {0}")]
    NeighbourRings(i32),
}

/// Every tunable of the simulation in one place.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SimulationConfig {
    pub drivetrain: DrivetrainConfig,
    pub geometry: VehicleGeometry,
    pub broker: BrokerConfig,
    pub bed: CargoBed,
    pub stabilizer: StabilizerConfig,
}

impl SimulationConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.drivetrain.validate()?;
        if self.broker.neighbour_rings < 1 {
            return Err(ConfigError::NeighbourRings(self.broker.neighbour_rings));
        }
        self.bed.validate()?;
        self.stabilizer.validate()
    }
}
