//! Static world geometry as seen by the vehicle.
//!
//! The world streamer owns the colliders. The core only reads them, tile by tile, and treats a
//! disposed collider slot as absent.

use std::collections::BTreeMap;

use tracing::debug;

use super::{Angle, HasCollision, Position, Shape};

/// Read-only view onto the streamed world.
pub trait WorldGeometry {
    /// Edge length of a square world tile.
    fn tile_size(&self) -> f64;

    /// Collider slots of a tile. `None` marks a collider that has been disposed. Tiles that are
    /// not loaded yield an empty slice.
    fn tile_colliders(&self, tile: TileKey) -> &[Option<Collider>];

    /// Wall segments of the currently active destination enclosure, if any.
    fn enclosure_walls(&self) -> &[EnclosureWallBound];

    fn tile_of(&self, position: Position) -> TileKey {
        TileKey::containing(position, self.tile_size())
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct TileKey {
    pub x: i32,
    pub z: i32,
}

impl TileKey {
    pub const fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }

    pub fn containing(position: Position, tile_size: f64) -> Self {
        Self {
            x: (position.x() / tile_size).floor() as i32,
            z: (position.z() / tile_size).floor() as i32,
        }
    }

    /// This tile and the ring of tiles around it.
    pub fn neighbourhood(&self, rings: i32) -> impl Iterator<Item = TileKey> + '_ {
        (-rings..=rings)
            .flat_map(move |dx| {
                (-rings..=rings).map(move |dz| TileKey::new(self.x + dx, self.z + dz))
            })
    }
}

/// Rectangular footprint of a static obstacle.
#[derive(Clone, Debug, PartialEq, PartialOrd)]
pub struct Collider {
    position: Position,
    rotation: Angle,
    width: f64,
    depth: f64,
    bounding_radius: f64,
}

impl Collider {
    pub fn new(position: Position, rotation: Angle, width: f64, depth: f64) -> Self {
        Self {
            position,
            rotation,
            width,
            depth,
            bounding_radius: (width / 2.0).hypot(depth / 2.0),
        }
    }

    pub fn position(&self) -> Position {
        self.position
    }

    pub fn rotation(&self) -> Angle {
        self.rotation
    }

    pub fn width(&self) -> f64 {
        self.width
    }

    pub fn depth(&self) -> f64 {
        self.depth
    }

    pub fn bounding_radius(&self) -> f64 {
        self.bounding_radius
    }
}

impl HasCollision for Collider {
    fn shape(&self) -> Shape {
        Shape::rectangle(self.position, self.width / 2.0, self.depth / 2.0, self.rotation)
    }
}

/// Axis aligned bounds of one enclosure wall segment.
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd)]
pub struct EnclosureWallBound {
    pub min_x: f64,
    pub max_x: f64,
    pub min_z: f64,
    pub max_z: f64,
}

impl EnclosureWallBound {
    pub fn new(min_x: f64, max_x: f64, min_z: f64, max_z: f64) -> Self {
        Self {
            min_x: min_x.min(max_x),
            max_x: min_x.max(max_x),
            min_z: min_z.min(max_z),
            max_z: min_z.max(max_z),
        }
    }

    pub fn contains(&self, position: Position) -> bool {
        position.x() >= self.min_x
            && position.x() <= self.max_x
            && position.z() >= self.min_z
            && position.z() <= self.max_z
    }
}

/// In-memory world store, filled by the streamer and read through [`WorldGeometry`].
#[derive(Clone, Debug, PartialEq)]
pub struct StaticWorld {
    tile_size: f64,
    tiles: BTreeMap<TileKey, Vec<Option<Collider>>>,
    enclosure_walls: Vec<EnclosureWallBound>,
}

impl StaticWorld {
    pub fn new(tile_size: f64) -> Self {
        Self {
            tile_size,
            tiles: BTreeMap::new(),
            enclosure_walls: vec![],
        }
    }

    /// Adds a collider to the tile containing its center and returns its slot.
    pub fn insert_collider(&mut self, collider: Collider) -> (TileKey, usize) {
        let tile = TileKey::containing(collider.position(), self.tile_size);
        let slots = self.tiles.entry(tile).or_default();
        slots.push(Some(collider));
        (tile, slots.len() - 1)
    }

    /// Disposes a single collider. Its slot stays in place so other slot indices remain valid.
    pub fn dispose_collider(&mut self, tile: TileKey, slot: usize) {
        if let Some(collider) = self.tiles.get_mut(&tile).and_then(|s| s.get_mut(slot)) {
            *collider = None;
        }
    }

    pub fn unload_tile(&mut self, tile: TileKey) {
        if let Some(slots) = self.tiles.remove(&tile) {
            debug!(?tile, colliders = slots.len(), "unloaded world tile");
        }
    }

    pub fn set_enclosure_walls(&mut self, walls: Vec<EnclosureWallBound>) {
        self.enclosure_walls = walls;
    }

    pub fn clear_enclosure_walls(&mut self) {
        self.enclosure_walls.clear();
    }
}

impl WorldGeometry for StaticWorld {
    fn tile_size(&self) -> f64 {
        self.tile_size
    }

    fn tile_colliders(&self, tile: TileKey) -> &[Option<Collider>] {
        self.tiles.get(&tile).map(Vec::as_slice).unwrap_or_default()
    }

    fn enclosure_walls(&self) -> &[EnclosureWallBound] {
        &self.enclosure_walls
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(Position::new(0.5, 0.5), TileKey::new(0, 0))]
    #[case(Position::new(-0.5, 0.5), TileKey::new(-1, 0))]
    #[case(Position::new(25.0, -40.0), TileKey::new(1, -2))]
    fn test_tile_containing(#[case] position: Position, #[case] expected: TileKey) {
        assert_eq!(TileKey::containing(position, 20.0), expected);
    }

    #[test]
    fn test_neighbourhood() {
        let tiles = TileKey::new(2, -1).neighbourhood(1).collect::<Vec<_>>();
        assert_eq!(tiles.len(), 9);
        assert!(tiles.contains(&TileKey::new(1, -2)));
        assert!(tiles.contains(&TileKey::new(3, 0)));
    }

    #[test]
    fn test_disposed_collider_is_absent() {
        let mut world = StaticWorld::new(10.0);
        let (tile, slot) = world.insert_collider(Collider::new(
            Position::new(1.0, 1.0),
            Angle::new(0.0),
            2.0,
            2.0,
        ));
        world.insert_collider(Collider::new(
            Position::new(3.0, 1.0),
            Angle::new(0.0),
            2.0,
            2.0,
        ));
        world.dispose_collider(tile, slot);

        let slots = world.tile_colliders(tile);
        assert_eq!(slots.len(), 2);
        assert!(slots[0].is_none());
        assert!(slots[1].is_some());
    }

    #[test]
    fn test_unloaded_tile_is_empty() {
        let mut world = StaticWorld::new(10.0);
        let (tile, _) = world.insert_collider(Collider::new(
            Position::new(1.0, 1.0),
            Angle::new(0.0),
            2.0,
            2.0,
        ));
        world.unload_tile(tile);
        assert!(world.tile_colliders(tile).is_empty());
        assert!(world.tile_colliders(TileKey::new(7, 7)).is_empty());
    }

    #[test]
    fn test_enclosure_wall_bound_normalizes_corners() {
        let wall = EnclosureWallBound::new(2.0, -2.0, 1.0, 0.0);
        assert!(wall.contains(Position::new(0.0, 0.5)));
        assert!(!wall.contains(Position::new(0.0, 1.5)));
    }
}
