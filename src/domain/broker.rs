//! Vets vehicle poses against the static world.
//!
//! Static obstacles are checked in two phases: a bounding circle test culls colliders of the
//! surrounding tiles, then the cab and bed boxes are tested exactly against what is left.
//! Enclosure walls are checked by sampling points along the vehicle outline.

use tracing::debug;

use super::{Collider, HasCollision, Pose, Position, VehicleGeometry, WorldGeometry};

/// Which moves are allowed while the vehicle already penetrates an enclosure wall.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum EscapePolicy {
    /// Any move that does not add penetrating samples.
    #[default]
    NonIncreasing,
    /// Only moves that remove penetrating samples.
    StrictlyDecreasing,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BrokerConfig {
    /// Rings of neighbouring tiles searched around the vehicle tile.
    pub neighbour_rings: i32,
    pub escape_policy: EscapePolicy,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            neighbour_rings: 1,
            escape_policy: EscapePolicy::default(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct CollisionBroker {
    geometry: VehicleGeometry,
    config: BrokerConfig,
    bounding_radius: f64,
    perimeter: Vec<Position>,
}

impl CollisionBroker {
    pub fn new(geometry: VehicleGeometry, config: BrokerConfig) -> Self {
        Self {
            bounding_radius: geometry.bounding_radius(),
            perimeter: geometry.perimeter_samples(),
            geometry,
            config,
        }
    }

    pub fn geometry(&self) -> &VehicleGeometry {
        &self.geometry
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    /// Whether the vehicle may move from `current` to `candidate`.
    pub fn can_occupy(&self, world: &dyn WorldGeometry, current: &Pose, candidate: &Pose) -> bool {
        !self.hits_static(world, candidate) && self.walls_allow(world, current, candidate)
    }

    /// Memoized [`CollisionBroker::can_occupy`]. The cache is consumed and handed back so that
    /// independent callers never share one by accident.
    pub fn can_occupy_cached(
        &self,
        world: &dyn WorldGeometry,
        frame: u64,
        current: &Pose,
        candidate: &Pose,
        cache: FrameCache,
    ) -> (bool, FrameCache) {
        let cache = if cache.frame == frame {
            cache
        } else {
            FrameCache::new(frame)
        };
        if let Some(result) = cache.lookup(current, candidate) {
            return (result, cache);
        }
        let result = self.can_occupy(world, current, candidate);
        (result, cache.with(current, candidate, result))
    }

    /// Colliders around `pose` that survive the bounding circle test.
    pub fn candidates<'w>(&self, world: &'w dyn WorldGeometry, pose: &Pose) -> Vec<&'w Collider> {
        let tile = world.tile_of(pose.position);
        tile.neighbourhood(self.config.neighbour_rings)
            .flat_map(|t| world.tile_colliders(t).iter().flatten())
            .filter(|collider| {
                let reach = self.bounding_radius + collider.bounding_radius();
                collider.position().distance_squared(pose.position) <= reach * reach
            })
            .collect()
    }

    pub fn hits_static(&self, world: &dyn WorldGeometry, pose: &Pose) -> bool {
        let boxes = self.geometry.boxes(pose);
        self.candidates(world, pose).into_iter().any(|collider| {
            let shape = collider.shape();
            boxes.iter().any(|b| b.has_intersection(&shape))
        })
    }

    /// Number of outline samples inside any enclosure wall.
    pub fn wall_penetrations(&self, world: &dyn WorldGeometry, pose: &Pose) -> usize {
        let walls = world.enclosure_walls();
        self.perimeter
            .iter()
            .map(|p| pose.transform_point(*p))
            .filter(|p| walls.iter().any(|w| w.contains(*p)))
            .count()
    }

    fn walls_allow(&self, world: &dyn WorldGeometry, current: &Pose, candidate: &Pose) -> bool {
        if world.enclosure_walls().is_empty() {
            return true;
        }
        let next = self.wall_penetrations(world, candidate);
        if next == 0 {
            return true;
        }
        let now = self.wall_penetrations(world, current);
        let allowed = now > 0
            && match self.config.escape_policy {
                EscapePolicy::NonIncreasing => next <= now,
                EscapePolicy::StrictlyDecreasing => next < now,
            };
        if now > 0 {
            debug!(now, next, allowed, "escape check against enclosure walls");
        }
        allowed
    }
}

/// Results of one frame's pose queries, keyed by frame id and the exact bits of both poses.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FrameCache {
    frame: u64,
    entries: Vec<([u64; 3], [u64; 3], bool)>,
}

impl FrameCache {
    pub fn new(frame: u64) -> Self {
        Self {
            frame,
            entries: vec![],
        }
    }

    pub fn frame(&self) -> u64 {
        self.frame
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn lookup(&self, current: &Pose, candidate: &Pose) -> Option<bool> {
        let key = (current.key(), candidate.key());
        self.entries
            .iter()
            .find(|(c, n, _)| (*c, *n) == key)
            .map(|(_, _, result)| *result)
    }

    fn with(mut self, current: &Pose, candidate: &Pose, result: bool) -> Self {
        self.entries.push((current.key(), candidate.key(), result));
        self
    }
}
