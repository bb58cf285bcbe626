//! Cargo items and their lifecycle.

use std::fmt;

use nalgebra::{UnitQuaternion, Vector3};
use thiserror::Error;

use super::BodyHandle;

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct ItemId(pub u32);

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "item#{}", self.0)
    }
}

/// What the item catalog hands over for an item.
#[derive(Clone, Debug, PartialEq)]
pub struct ItemDefinition {
    pub name: String,
    /// Full extents of the item's bounding box.
    pub size: Vector3<f64>,
    pub mass: f64,
    /// Volume the item counts as when packed.
    pub volume: f64,
}

impl ItemDefinition {
    pub fn new(name: impl Into<String>, size: Vector3<f64>, mass: f64) -> Self {
        Self {
            name: name.into(),
            size,
            mass,
            volume: size.x * size.y * size.z,
        }
    }

    pub fn half_extents(&self) -> Vector3<f64> {
        self.size / 2.0
    }

    pub fn smallest_dimension(&self) -> f64 {
        self.size.min()
    }
}

/// Lifecycle of a cargo item. Transitions only ever move to the right:
/// `Ground → Held → PendingBody → Settling → Dynamic → Fallen`.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub enum ItemPhase {
    /// Lying in the world as a pickup.
    Ground,
    /// Shown as a placement preview.
    Held,
    /// Placed, waiting for its rigid body.
    PendingBody,
    /// Body exists but is kinematic and rides along with the vehicle.
    Settling,
    /// Simulated by the engine.
    Dynamic,
    /// Lost. Terminal.
    Fallen,
}

impl ItemPhase {
    pub fn is_placed(self) -> bool {
        matches!(
            self,
            ItemPhase::PendingBody | ItemPhase::Settling | ItemPhase::Dynamic
        )
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct CargoItem {
    id: ItemId,
    definition: ItemDefinition,
    phase: ItemPhase,
    body: Option<BodyHandle>,
    /// Last known position relative to the vehicle, y measured from the ground.
    local_offset: Vector3<f64>,
    /// Last known rotation relative to the vehicle.
    local_rotation: UnitQuaternion<f64>,
    /// Set while a teleport holds the body kinematic.
    teleporting: bool,
}

impl CargoItem {
    pub fn new(id: ItemId, definition: ItemDefinition) -> Self {
        Self {
            id,
            definition,
            phase: ItemPhase::Ground,
            body: None,
            local_offset: Vector3::zeros(),
            local_rotation: UnitQuaternion::identity(),
            teleporting: false,
        }
    }

    pub fn id(&self) -> ItemId {
        self.id
    }

    pub fn definition(&self) -> &ItemDefinition {
        &self.definition
    }

    pub fn phase(&self) -> ItemPhase {
        self.phase
    }

    pub fn body(&self) -> Option<BodyHandle> {
        self.body
    }

    pub fn local_offset(&self) -> Vector3<f64> {
        self.local_offset
    }

    pub fn local_rotation(&self) -> UnitQuaternion<f64> {
        self.local_rotation
    }

    pub fn is_fallen(&self) -> bool {
        self.phase == ItemPhase::Fallen
    }

    pub fn is_teleporting(&self) -> bool {
        self.teleporting
    }

    /// Turns a ground pickup into a placement preview.
    pub fn pick_up(&mut self) -> Result<(), CargoError> {
        self.advance(ItemPhase::Ground, ItemPhase::Held)
    }

    pub(crate) fn advance(&mut self, from: ItemPhase, to: ItemPhase) -> Result<(), CargoError> {
        if self.phase == ItemPhase::Fallen {
            return Err(CargoError::Fallen(self.id));
        }
        if self.phase != from {
            return Err(CargoError::UnexpectedPhase {
                id: self.id,
                expected: from,
                actual: self.phase,
            });
        }
        self.phase = to;
        Ok(())
    }

    pub(crate) fn set_body(&mut self, body: Option<BodyHandle>) {
        self.body = body;
    }

    pub(crate) fn set_local_pose(&mut self, offset: Vector3<f64>, rotation: UnitQuaternion<f64>) {
        self.local_offset = offset;
        self.local_rotation = rotation;
    }

    pub(crate) fn set_teleporting(&mut self, teleporting: bool) {
        self.teleporting = teleporting;
    }

    pub(crate) fn mark_fallen(&mut self) -> bool {
        if self.phase == ItemPhase::Fallen {
            return false;
        }
        self.phase = ItemPhase::Fallen;
        self.teleporting = false;
        true
    }
}

#[derive(Error, Debug, PartialEq)]
pub enum CargoError {
    #[error("unknown cargo item {0}")]
    UnknownItem(ItemId),
    #[error("{id} is {actual:?}, expected {expected:?}")]
    UnexpectedPhase {
        id: ItemId,
        expected: ItemPhase,
        actual: ItemPhase,
    },
    #[error("{0} does not fit inside the cargo bed at the requested position")]
    OutOfBounds(ItemId),
    #[error("{0} has fallen out of the cargo bed")]
    Fallen(ItemId),
}
