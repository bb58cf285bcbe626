//! The resource module encapsulates domain entities for use with Bevy.

use std::ops::{Deref, DerefMut};

use bevy::ecs::system::Resource;

use crate::{domain, engine::RapierEngine};

macro_rules! resource {
    ($name:ident, $target:ty) => {
        #[derive(Resource)]
        pub struct $name($target);

        impl Deref for $name {
            type Target = $target;

            fn deref(&self) -> &Self::Target {
                &self.0
            }
        }

        impl DerefMut for $name {
            fn deref_mut(&mut self) -> &mut Self::Target {
                &mut self.0
            }
        }

        impl From<$target> for $name {
            fn from(value: $target) -> Self {
                Self(value)
            }
        }
    };
}

resource!(DriveInputRes, domain::DriveInput);
resource!(DrivetrainRes, domain::Drivetrain);
resource!(BrokerRes, domain::CollisionBroker);
resource!(WorldRes, domain::StaticWorld);
resource!(StabilizerRes, domain::CargoStabilizer);
resource!(FollowerRes, domain::ContainerFollower);
resource!(EngineRes, RapierEngine);

impl Default for DriveInputRes {
    fn default() -> Self {
        Self(domain::DriveInput::default())
    }
}
