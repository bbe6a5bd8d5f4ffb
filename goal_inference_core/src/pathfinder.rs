//! Breadth-first route planning over position plus key-possession state.
//!
//! Search nodes carry the hypothetical history needed to apply the door and
//! key rules (keys spent on doors, keys dropped when swapping), but two nodes
//! are considered the same search state whenever their position and held key
//! agree. This keeps the state space at `cells x key ids`; the returned route
//! is *a* shortest route consistent with one valid drop history.

use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};

use tracing::debug;

use crate::{KeyId, Position, world::{Door, World}};

/// A hypothetical agent state reached during a search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchState {
    pub pos: Position,
    pub held: Option<KeyId>,
    /// Keys spent on doors along this history; those doors stay open.
    pub used: BTreeSet<KeyId>,
    /// Keys put down along this history, by the cell they were left in.
    pub dropped: BTreeMap<Position, KeyId>,
}

impl SearchState {
    /// A fresh state with no history.
    pub fn new(pos: Position, held: Option<KeyId>) -> Self {
        SearchState {
            pos,
            held,
            used: BTreeSet::new(),
            dropped: BTreeMap::new(),
        }
    }

    /// The projection search states are deduplicated on.
    fn identity(&self) -> (Position, Option<KeyId>) {
        (self.pos, self.held)
    }
}

struct ArenaNode {
    state: SearchState,
    parent: Option<usize>,
}

/// Shortest-route planner over a read-only world view.
#[derive(Debug, Clone, Copy)]
pub struct Pathfinder<'w> {
    world: &'w World,
    key_agnostic: bool,
}

impl<'w> Pathfinder<'w> {
    pub fn new(world: &'w World) -> Self {
        Pathfinder {
            world,
            key_agnostic: false,
        }
    }

    /// In key-agnostic mode an agent holding any key may use every key id
    /// lying on the floor. Only meant for reachability checks.
    pub fn key_agnostic(mut self, enabled: bool) -> Self {
        self.key_agnostic = enabled;
        self
    }

    /// States reachable from `state` in one move, staying put included.
    pub fn successors(&self, state: &SearchState) -> Vec<SearchState> {
        let mut key_ids: BTreeSet<Option<KeyId>> = state.used.iter().copied().map(Some).collect();
        key_ids.insert(state.held);
        if self.key_agnostic && state.held.is_some() {
            key_ids.extend(self.world.floor_keys().into_iter().map(|k| Some(k.id)));
        }

        let mut options: Vec<(Position, Option<Door>)> = Vec::new();
        for key_id in key_ids {
            for (pos, door) in self.world.accessible_neighbors(state.pos, key_id) {
                if !options.iter().any(|(p, _)| *p == pos) {
                    options.push((pos, door));
                }
            }
        }
        options.push((state.pos, None));

        options
            .into_iter()
            .map(|(pos, door)| self.step(state, pos, door))
            .collect()
    }

    /// Applies the door and key rules for moving from `from` into `pos`.
    pub fn step(&self, from: &SearchState, pos: Position, door: Option<Door>) -> SearchState {
        let mut held = from.held;
        let mut used = from.used.clone();
        let mut dropped = from.dropped.clone();

        if let Some(door) = door {
            if self.key_agnostic {
                // The door's own id marks it open; the held key is kept.
                if !used.contains(&door.key_id) && held.is_some() {
                    used.insert(door.key_id);
                }
            } else if Some(door.key_id) == held {
                used.insert(door.key_id);
                held = None;
            }
        }

        // A key dropped here earlier wins over whatever the floor held originally.
        let picked = match dropped.remove(&pos) {
            Some(id) => Some(id),
            None => self.world.key_at(pos).map(|k| k.id).filter(|id| {
                Some(*id) != held && !used.contains(id) && !dropped.values().any(|d| d == id)
            }),
        };

        if let Some(new_id) = picked {
            if let Some(old_id) = held {
                dropped.insert(pos, old_id);
            }
            held = Some(new_id);
        }

        SearchState {
            pos,
            held,
            used,
            dropped,
        }
    }

    /// Shortest sequence of states from `start` to a state at `goal` holding
    /// `goal_key`. The start state is not part of the sequence.
    ///
    /// Returns `None` when no such state is reachable.
    pub fn search(
        &self,
        start: SearchState,
        goal: Position,
        goal_key: Option<KeyId>,
    ) -> Option<Vec<SearchState>> {
        let mut arena = vec![ArenaNode {
            state: start,
            parent: None,
        }];
        let mut seen: HashSet<(Position, Option<KeyId>)> = HashSet::new();
        seen.insert(arena[0].state.identity());
        let mut queue = VecDeque::from([0usize]);

        while let Some(current) = queue.pop_front() {
            if arena[current].state.identity() == (goal, goal_key) {
                debug!(expanded = arena.len(), "route found");
                return Some(Self::unwind(arena, current));
            }
            for child in self.successors(&arena[current].state) {
                if seen.insert(child.identity()) {
                    arena.push(ArenaNode {
                        state: child,
                        parent: Some(current),
                    });
                    queue.push_back(arena.len() - 1);
                }
            }
        }

        debug!(expanded = arena.len(), %goal, ?goal_key, "goal unreachable");
        None
    }

    fn unwind(arena: Vec<ArenaNode>, mut index: usize) -> Vec<SearchState> {
        let mut states = Vec::new();
        while let Some(parent) = arena[index].parent {
            states.push(arena[index].state.clone());
            index = parent;
        }
        states.reverse();
        states
    }

    /// Positions of the shortest route from `(start, held)` to `(goal, goal_key)`.
    pub fn shortest_path(
        &self,
        start: Position,
        held: Option<KeyId>,
        goal: Position,
        goal_key: Option<KeyId>,
    ) -> Option<Vec<Position>> {
        self.search(SearchState::new(start, held), goal, goal_key)
            .map(|states| states.into_iter().map(|s| s.pos).collect())
    }

    /// Number of moves from `start` to the goal state, if reachable.
    pub fn distance(
        &self,
        start: SearchState,
        goal: Position,
        goal_key: Option<KeyId>,
    ) -> Option<usize> {
        self.search(start, goal, goal_key).map(|states| states.len())
    }
}

/// Shortest route for an agent at `start` holding `held`.
pub fn shortest_path(
    world: &World,
    start: Position,
    held: Option<KeyId>,
    goal: Position,
    goal_key: Option<KeyId>,
) -> Option<Vec<Position>> {
    Pathfinder::new(world).shortest_path(start, held, goal, goal_key)
}

/// The knower's route from its start, empty-handed, to the near side of the
/// main door holding the main door's key.
pub fn knower_route(world: &World) -> Option<Vec<Position>> {
    shortest_path(
        world,
        world.knower_start(),
        None,
        world.knower_goal(),
        Some(world.main_door().key_id),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Key, Orientation, world::tests::small_layout};

    #[test]
    fn picks_up_key_in_place_before_heading_for_the_door() {
        let world = World::new(small_layout()).unwrap();
        let finder = Pathfinder::new(&world);
        let states = finder
            .search(SearchState::new(Position::new(0, 0), None), Position::new(2, 1), Some(0))
            .unwrap();

        assert_eq!(states[0].pos, Position::new(0, 0));
        assert_eq!(states[0].held, Some(0));
        let last = states.last().unwrap();
        assert_eq!(last.pos, Position::new(2, 1));
        assert_eq!(last.held, Some(0));
        // one pickup turn plus a three-step walk
        assert_eq!(states.len(), 4);
    }

    #[test]
    fn knower_route_matches_explicit_query() {
        let world = World::new(small_layout()).unwrap();
        let route = knower_route(&world).unwrap();
        assert_eq!(
            Some(route),
            shortest_path(&world, Position::new(0, 0), None, Position::new(2, 1), Some(0))
        );
    }

    #[test]
    fn start_already_at_goal_gives_empty_route() {
        let world = World::new(small_layout()).unwrap();
        let at_door = Position::new(2, 1);
        let path = shortest_path(&world, at_door, Some(0), at_door, Some(0));
        assert_eq!(path, Some(vec![]));
    }

    #[test]
    fn unreachable_goal_is_none() {
        let world = World::new(small_layout()).unwrap();
        // the main door never opens during search
        let path = shortest_path(&world, Position::new(0, 0), None, Position::new(0, 3), None);
        assert_eq!(path, None);
    }

    #[test]
    fn door_consumes_key_and_stays_open_for_the_history() {
        let mut layout = small_layout();
        layout.keys.push(Key::new(Position::new(3, 0), 7));
        layout.doors.push(crate::world::Door {
            pos: Position::new(1, 0),
            orientation: Orientation::Vertical,
            key_id: 7,
        });
        layout.walls.push(crate::world::Wall {
            pos: Position::new(1, 1),
            orientation: Orientation::Vertical,
        });
        let world = World::new(layout).unwrap();
        let finder = Pathfinder::new(&world);

        // from the right side, fetch key 7, cross into the left column and
        // pick up key 0 on the far side of the door
        let states = finder
            .search(SearchState::new(Position::new(2, 0), None), Position::new(0, 1), Some(0))
            .unwrap();
        let crossed = states.iter().position(|s| s.pos == Position::new(0, 0)).unwrap();
        assert!(states[crossed].used.contains(&7));
        assert_eq!(states[crossed].held, Some(0));
        assert_eq!(states.len(), 5);
    }

    #[test]
    fn swapping_keys_drops_the_old_one_where_the_new_one_was() {
        let mut layout = small_layout();
        layout.keys.push(Key::new(Position::new(1, 0), 4));
        let world = World::new(layout).unwrap();
        let finder = Pathfinder::new(&world);

        let holding_zero = SearchState::new(Position::new(0, 0), Some(0));
        let swapped = finder.step(&holding_zero, Position::new(1, 0), None);
        assert_eq!(swapped.held, Some(4));
        assert_eq!(swapped.dropped.get(&Position::new(1, 0)), Some(&0));

        // stepping back onto the drop cell picks the dropped key up again
        let back = finder.step(
            &SearchState { pos: Position::new(2, 0), ..swapped.clone() },
            Position::new(1, 0),
            None,
        );
        assert_eq!(back.held, Some(0));
        assert_eq!(back.dropped.get(&Position::new(1, 0)), Some(&4));
    }

    #[test]
    fn key_agnostic_mode_lets_any_key_open_doors() {
        let mut layout = small_layout();
        layout.keys.push(Key::new(Position::new(3, 3), 7));
        layout.doors.push(crate::world::Door {
            pos: Position::new(1, 0),
            orientation: Orientation::Vertical,
            key_id: 7,
        });
        layout.walls.push(crate::world::Wall {
            pos: Position::new(1, 1),
            orientation: Orientation::Vertical,
        });
        let world = World::new(layout).unwrap();

        let strict = Pathfinder::new(&world).shortest_path(
            Position::new(0, 0),
            None,
            Position::new(3, 0),
            Some(0),
        );
        assert_eq!(strict, None);
        let relaxed = Pathfinder::new(&world)
            .key_agnostic(true)
            .shortest_path(Position::new(0, 0), None, Position::new(3, 0), Some(0));
        assert!(relaxed.is_some());
    }

    #[test]
    fn key_agnostic_door_crossing_marks_the_door_key_used() {
        let mut layout = small_layout();
        layout.keys.push(Key::new(Position::new(3, 3), 7));
        let world = World::new(layout).unwrap();
        let door = crate::world::Door {
            pos: Position::new(1, 0),
            orientation: Orientation::Vertical,
            key_id: 7,
        };
        let from = SearchState::new(Position::new(0, 0), Some(0));

        let next = Pathfinder::new(&world)
            .key_agnostic(true)
            .step(&from, Position::new(1, 0), Some(door));
        assert_eq!(next.held, Some(0));
        assert_eq!(next.used, BTreeSet::from([7]));

        // without a key in hand nothing is recorded
        let empty = SearchState::new(Position::new(0, 0), None);
        let next = Pathfinder::new(&world)
            .key_agnostic(true)
            .step(&empty, Position::new(1, 0), Some(door));
        assert!(next.used.is_empty());
    }
}
