use std::fmt;

use serde::{Deserialize, Serialize};

pub mod agent;
pub mod belief;
pub mod catalog;
pub mod config;
pub mod error;
pub mod map;
pub mod pathfinder;
pub mod session;
pub mod world;

pub use agent::{Agent, AgentBody, Direction, HumanInput, Knower, Watcher, WatcherMode};
pub use belief::{Beliefs, Prediction};
pub use config::{SessionConfig, Selection, UpdateCriterion, WatcherConfig};
pub use error::Error;
pub use session::{Session, SessionOutcome, TurnRecord};
pub use world::{Barrier, Door, MainDoor, Wall, World, WorldLayout};

/// Identifier shared by a key and the doors it opens.
pub type KeyId = u32;

/// Represents a 2D coordinate. `y` grows downwards.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Position {
    pub x: usize,
    pub y: usize,
}

impl Position {
    pub const fn new(x: usize, y: usize) -> Self {
        Position { x, y }
    }
}

impl From<(usize, usize)> for Position {
    fn from((x, y): (usize, usize)) -> Self {
        Position { x, y }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Which cell edge a barrier sits on.
///
/// A horizontal barrier at `(x, y)` blocks the edge between `(x, y - 1)` and
/// `(x, y)`; a vertical one blocks the edge between `(x - 1, y)` and `(x, y)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Orientation {
    Horizontal,
    Vertical,
}

/// A key lying on the floor or carried by an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Key {
    pub pos: Position,
    pub id: KeyId,
}

impl Key {
    pub const fn new(pos: Position, id: KeyId) -> Self {
        Key { pos, id }
    }
}
