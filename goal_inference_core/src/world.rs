use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{Key, KeyId, Orientation, Position, map::Grid};

/// Errors raised while building or mutating a [`World`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WorldError {
    #[error("{what} at {pos} lies outside the {width}x{height} grid")]
    OutOfBounds {
        what: &'static str,
        pos: Position,
        width: usize,
        height: usize,
    },
    #[error("two {orientation:?} barriers share cell {pos}")]
    DuplicateBarrier {
        pos: Position,
        orientation: Orientation,
    },
    #[error("door at {pos} shares a corner with a barrier of the other orientation")]
    DoorsShareCorner { pos: Position },
    #[error("two keys share cell {pos}")]
    DuplicateKey { pos: Position },
    #[error("door at {pos} needs key {key_id}, which is not in the world")]
    OrphanDoorKey { pos: Position, key_id: KeyId },
    #[error("main door at {pos} has no approach cell on the grid")]
    MainDoorOnBorder { pos: Position },
    #[error("no removable door at {pos}")]
    DoorNotFound { pos: Position },
    #[error("cell {pos} already holds a key")]
    CellOccupied { pos: Position },
    #[error("a {width}x{height} grid is too large")]
    TooLarge { width: usize, height: usize },
}

/// An impassable wall segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wall {
    pub pos: Position,
    pub orientation: Orientation,
}

/// A lockable door. Crossing it with the matching key opens it for good.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Door {
    pub pos: Position,
    pub orientation: Orientation,
    pub key_id: KeyId,
}

/// The rendezvous door. It only opens once both agents wait at it with its key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MainDoor {
    pub pos: Position,
    pub orientation: Orientation,
    pub key_id: KeyId,
    #[serde(default)]
    pub is_open: bool,
}

impl MainDoor {
    /// Cell on the far side of the door edge (above or left of it).
    ///
    /// Returns `None` when the door sits on the first row/column.
    pub fn near_cell(&self) -> Option<Position> {
        match self.orientation {
            Orientation::Horizontal => {
                self.pos.y.checked_sub(1).map(|y| Position::new(self.pos.x, y))
            }
            Orientation::Vertical => {
                self.pos.x.checked_sub(1).map(|x| Position::new(x, self.pos.y))
            }
        }
    }
}

/// What occupies a cell edge in the barrier index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Barrier {
    Wall,
    Door { key_id: KeyId, main: bool },
}

/// Declarative description of a world, as stored on disk or in the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldLayout {
    pub width: usize,
    pub height: usize,
    pub knower_start: Position,
    pub watcher_start: Position,
    pub keys: Vec<Key>,
    #[serde(default)]
    pub doors: Vec<Door>,
    pub main_door: MainDoor,
    #[serde(default)]
    pub walls: Vec<Wall>,
}

/// The grid, its barriers and the keys lying on the floor.
///
/// Cloning a world is a deep copy; batch runs clone one per game so no two
/// games share barrier or key indices.
#[derive(Debug, Clone)]
pub struct World {
    width: usize,
    height: usize,
    knower_start: Position,
    watcher_start: Position,
    horizontal: Grid<Option<Barrier>>,
    vertical: Grid<Option<Barrier>>,
    keys: Grid<Option<KeyId>>,
    main_door: MainDoor,
    spent: Vec<Key>,
}

impl World {
    /// Validates a layout and builds its lookup indices.
    pub fn new(layout: WorldLayout) -> Result<Self, WorldError> {
        let WorldLayout {
            width,
            height,
            knower_start,
            watcher_start,
            keys,
            doors,
            main_door,
            walls,
        } = layout;

        if width.checked_mul(height).is_none() {
            return Err(WorldError::TooLarge { width, height });
        }

        let mut world = World {
            width,
            height,
            knower_start,
            watcher_start,
            horizontal: Grid::new(width, height),
            vertical: Grid::new(width, height),
            keys: Grid::new(width, height),
            main_door,
            spent: Vec::new(),
        };

        world.check_bounds("knower start", knower_start)?;
        world.check_bounds("watcher start", watcher_start)?;

        let barriers = doors
            .iter()
            .map(|d| {
                (
                    d.pos,
                    d.orientation,
                    Barrier::Door {
                        key_id: d.key_id,
                        main: false,
                    },
                )
            })
            .chain(std::iter::once((
                main_door.pos,
                main_door.orientation,
                Barrier::Door {
                    key_id: main_door.key_id,
                    main: true,
                },
            )))
            .chain(walls.iter().map(|w| (w.pos, w.orientation, Barrier::Wall)));

        for (pos, orientation, barrier) in barriers {
            world.check_bounds("barrier", pos)?;
            let index = world.index_mut(orientation);
            if index[pos].is_some() {
                return Err(WorldError::DuplicateBarrier { pos, orientation });
            }
            index.set(pos, Some(barrier)).map_err(|_| WorldError::OutOfBounds {
                what: "barrier",
                pos,
                width,
                height,
            })?;
        }

        let door_edges = doors
            .iter()
            .map(|d| (d.pos, d.orientation))
            .chain(std::iter::once((main_door.pos, main_door.orientation)));
        for (pos, orientation) in door_edges {
            let other = match orientation {
                Orientation::Horizontal => &world.vertical,
                Orientation::Vertical => &world.horizontal,
            };
            if other[pos].is_some() {
                return Err(WorldError::DoorsShareCorner { pos });
            }
        }

        for key in &keys {
            world.check_bounds("key", key.pos)?;
            if world.keys[key.pos].is_some() {
                return Err(WorldError::DuplicateKey { pos: key.pos });
            }
            world.keys.set(key.pos, Some(key.id)).map_err(|_| WorldError::OutOfBounds {
                what: "key",
                pos: key.pos,
                width,
                height,
            })?;
        }

        let key_ids: BTreeSet<KeyId> = keys.iter().map(|k| k.id).collect();
        let door_keys = doors
            .iter()
            .map(|d| (d.pos, d.key_id))
            .chain(std::iter::once((main_door.pos, main_door.key_id)));
        for (pos, key_id) in door_keys {
            if !key_ids.contains(&key_id) {
                return Err(WorldError::OrphanDoorKey { pos, key_id });
            }
        }

        if main_door.near_cell().is_none() {
            return Err(WorldError::MainDoorOnBorder { pos: main_door.pos });
        }

        Ok(world)
    }

    fn check_bounds(&self, what: &'static str, pos: Position) -> Result<(), WorldError> {
        if self.contains(pos) {
            Ok(())
        } else {
            Err(WorldError::OutOfBounds {
                what,
                pos,
                width: self.width,
                height: self.height,
            })
        }
    }

    fn index(&self, orientation: Orientation) -> &Grid<Option<Barrier>> {
        match orientation {
            Orientation::Horizontal => &self.horizontal,
            Orientation::Vertical => &self.vertical,
        }
    }

    fn index_mut(&mut self, orientation: Orientation) -> &mut Grid<Option<Barrier>> {
        match orientation {
            Orientation::Horizontal => &mut self.horizontal,
            Orientation::Vertical => &mut self.vertical,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn contains(&self, pos: Position) -> bool {
        pos.x < self.width && pos.y < self.height
    }

    pub fn knower_start(&self) -> Position {
        self.knower_start
    }

    pub fn watcher_start(&self) -> Position {
        self.watcher_start
    }

    pub fn main_door(&self) -> &MainDoor {
        &self.main_door
    }

    /// Marks the main door as open. It stays in the barrier index.
    pub fn open_main_door(&mut self) {
        self.main_door.is_open = true;
    }

    /// Barrier on the given edge, if any.
    pub fn barrier(&self, pos: Position, orientation: Orientation) -> Option<Barrier> {
        self.index(orientation).get(pos).copied().flatten()
    }

    /// Key lying at `pos`, if any.
    pub fn key_at(&self, pos: Position) -> Option<Key> {
        self.keys
            .get(pos)
            .copied()
            .flatten()
            .map(|id| Key::new(pos, id))
    }

    /// All keys on the floor, in row-major order.
    pub fn floor_keys(&self) -> Vec<Key> {
        self.keys
            .occupied()
            .map(|(pos, id)| Key::new(pos, *id))
            .collect()
    }

    /// Closed doors other than the main door, in row-major order.
    pub fn doors(&self) -> Vec<Door> {
        let collect = |orientation: Orientation| {
            self.index(orientation)
                .occupied()
                .filter_map(move |(pos, barrier)| match barrier {
                    Barrier::Door {
                        key_id,
                        main: false,
                    } => Some(Door {
                        pos,
                        orientation,
                        key_id: *key_id,
                    }),
                    _ => None,
                })
                .collect::<Vec<_>>()
        };
        let mut doors = collect(Orientation::Horizontal);
        doors.extend(collect(Orientation::Vertical));
        doors
    }

    /// Neighbors reachable in one step from `pos` while holding `held`.
    ///
    /// A move is legal when its edge is free, or carries a non-main door
    /// whose key is held. Crossed doors are returned so the caller can decide
    /// whether to open them. Order is left, right, up, down.
    pub fn accessible_neighbors(
        &self,
        pos: Position,
        held: Option<KeyId>,
    ) -> Vec<(Position, Option<Door>)> {
        if !self.contains(pos) {
            return Vec::new();
        }
        let Position { x, y } = pos;
        let mut candidates = Vec::with_capacity(4);
        if x > 0 {
            candidates.push((Position::new(x - 1, y), pos, Orientation::Vertical));
        }
        if x + 1 < self.width {
            let to = Position::new(x + 1, y);
            candidates.push((to, to, Orientation::Vertical));
        }
        if y > 0 {
            candidates.push((Position::new(x, y - 1), pos, Orientation::Horizontal));
        }
        if y + 1 < self.height {
            let to = Position::new(x, y + 1);
            candidates.push((to, to, Orientation::Horizontal));
        }

        candidates
            .into_iter()
            .filter_map(|(to, edge, orientation)| match self.barrier(edge, orientation) {
                None => Some((to, None)),
                Some(Barrier::Door {
                    key_id,
                    main: false,
                }) if Some(key_id) == held => Some((
                    to,
                    Some(Door {
                        pos: edge,
                        orientation,
                        key_id,
                    }),
                )),
                Some(_) => None,
            })
            .collect()
    }

    /// Removes an opened door from the barrier index.
    pub fn remove_door(&mut self, door: &Door) -> Result<(), WorldError> {
        let index = self.index_mut(door.orientation);
        match index.get(door.pos) {
            Some(Some(Barrier::Door {
                key_id,
                main: false,
            })) if *key_id == door.key_id => {
                index.take(door.pos);
                debug!(pos = %door.pos, key_id = door.key_id, "door opened");
                Ok(())
            }
            _ => Err(WorldError::DoorNotFound { pos: door.pos }),
        }
    }

    /// Opens `door` with `key`: the door leaves the barrier index and the key
    /// is retired to the spent ledger.
    pub fn open_door(&mut self, door: &Door, key: Key) -> Result<(), WorldError> {
        self.remove_door(door)?;
        self.spent.push(key);
        Ok(())
    }

    /// Keys consumed by doors so far.
    pub fn spent_keys(&self) -> &[Key] {
        &self.spent
    }

    /// Places a key on the floor.
    pub fn add_key(&mut self, key: Key) -> Result<(), WorldError> {
        self.check_bounds("key", key.pos)?;
        if self.keys[key.pos].is_some() {
            return Err(WorldError::CellOccupied { pos: key.pos });
        }
        self.keys
            .set(key.pos, Some(key.id))
            .map_err(|_| WorldError::OutOfBounds {
                what: "key",
                pos: key.pos,
                width: self.width,
                height: self.height,
            })
    }

    /// Lifts the key at `pos` off the floor.
    pub fn remove_key(&mut self, pos: Position) -> Option<Key> {
        self.keys.take(pos).map(|id| Key::new(pos, id))
    }

    /// Whether `pos`, holding `held`, is at the main door with its key.
    ///
    /// Both the door cell and the cell across the door edge qualify.
    pub fn at_goal(&self, pos: Position, held: Option<KeyId>) -> bool {
        held == Some(self.main_door.key_id)
            && (pos == self.main_door.pos || Some(pos) == self.main_door.near_cell())
    }

    /// Cell the knower must reach: across the main door edge.
    pub fn knower_goal(&self) -> Position {
        self.main_door.near_cell().unwrap_or(self.main_door.pos)
    }

    /// Cell the watcher must reach: the main door cell itself.
    pub fn watcher_goal(&self) -> Position {
        self.main_door.pos
    }

    /// Reconstructs a layout describing the current state of the world.
    pub fn layout(&self) -> WorldLayout {
        let walls = [Orientation::Horizontal, Orientation::Vertical]
            .into_iter()
            .flat_map(|orientation| {
                self.index(orientation)
                    .occupied()
                    .filter(|(_, barrier)| matches!(barrier, Barrier::Wall))
                    .map(move |(pos, _)| Wall { pos, orientation })
                    .collect::<Vec<_>>()
            })
            .collect();
        WorldLayout {
            width: self.width,
            height: self.height,
            knower_start: self.knower_start,
            watcher_start: self.watcher_start,
            keys: self.floor_keys(),
            doors: self.doors(),
            main_door: self.main_door,
            walls,
        }
    }
}
