//! The domain module encapsulates the core rules of the hauler. It defines the vehicle, its
//! drivetrain and the cargo it carries, along with the rules that keep the vehicle out of the
//! static world and the cargo inside the bed.
//!
//! Static geometry and the rigid-body engine are reached through the [`WorldGeometry`] and
//! [`RigidBodies`] traits only, so the logic here does not depend on how either is provided.

mod basis;
mod bed;
mod bodies;
mod broker;
mod cargo;
mod collision;
mod config;
mod drivetrain;
mod follower;
mod schedule;
mod stabilizer;
mod vehicle;
mod world;

pub use basis::{Angle, Pose, Position, Speed, MPH_TO_METERS_PER_SECOND};
pub use bed::{BedPart, BedPartKind, CargoBed, CargoBounds};
pub use bodies::{BodyHandle, BodyMode, BodySpec, RigidBodies};
pub use broker::{BrokerConfig, CollisionBroker, EscapePolicy, FrameCache};
pub use cargo::{CargoError, CargoItem, ItemDefinition, ItemId, ItemPhase};
pub use collision::{HasCollision, Shape};
pub use config::{ConfigError, SimulationConfig};
pub use drivetrain::{DriveReport, Drivetrain, DrivetrainConfig};
pub use follower::ContainerFollower;
pub use schedule::{ScheduledAction, ScheduledActions};
pub use stabilizer::{
    projected_half_extents, CargoStabilizer, FallenCallback, StabilizerConfig, StabilizerReport,
    VehicleFrame,
};
pub use vehicle::{DriveInput, VehicleGeometry, VehicleState};
pub use world::{Collider, EnclosureWallBound, StaticWorld, TileKey, WorldGeometry};
