//! Vehicle dynamics and cargo containment for a cargo hauling game.
//!
//! [`domain`] holds the engine-independent rules. The remaining modules wire them into a Bevy
//! app driven by a rapier rigid-body engine.

#[cfg(test)]
mod tests;

pub mod controller;
pub mod domain;
pub mod engine;
pub mod resource;
pub mod scenario;
pub mod simulator;
