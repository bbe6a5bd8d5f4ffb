//! Built-in 20x20 worlds and their key-assignment variants.

use std::collections::BTreeSet;

use itertools::Itertools;

use crate::{
    Key, KeyId, Orientation, Position,
    world::{Door, MainDoor, Wall, World, WorldError, WorldLayout},
};

const SIZE: usize = 20;
const DIVIDER_ROW: usize = 10;
const MAIN_DOOR_COLUMN: usize = 9;

fn wall(x: usize, y: usize, orientation: Orientation) -> Wall {
    Wall {
        pos: Position::new(x, y),
        orientation,
    }
}

fn key(x: usize, y: usize, id: KeyId) -> Key {
    Key::new(Position::new(x, y), id)
}

/// Upper and lower halves joined only by the main door.
fn divided(keys: Vec<Key>, doors: Vec<Door>, extra_walls: Vec<Wall>) -> WorldLayout {
    let mut walls: Vec<Wall> = (0..SIZE)
        .filter(|&x| x != MAIN_DOOR_COLUMN)
        .map(|x| wall(x, DIVIDER_ROW, Orientation::Horizontal))
        .collect();
    walls.extend(extra_walls);

    WorldLayout {
        width: SIZE,
        height: SIZE,
        knower_start: Position::new(9, 2),
        watcher_start: Position::new(9, 18),
        keys,
        doors,
        main_door: MainDoor {
            pos: Position::new(MAIN_DOOR_COLUMN, DIVIDER_ROW),
            orientation: Orientation::Horizontal,
            key_id: 1,
            is_open: false,
        },
        walls,
    }
}

fn two_key_layout(extra_walls: Vec<Wall>) -> WorldLayout {
    divided(
        vec![key(2, 2, 1), key(2, 7, 2), key(2, 12, 1), key(18, 12, 2)],
        vec![],
        extra_walls,
    )
}

/// Adds a locked room in the top right corner holding a third key.
fn three_key_layout(extra_walls: Vec<Wall>) -> WorldLayout {
    let mut walls = vec![
        wall(16, 1, Orientation::Vertical),
        wall(16, 3, Orientation::Vertical),
    ];
    for y in [1, 4] {
        walls.extend((16..SIZE).map(|x| wall(x, y, Orientation::Horizontal)));
    }
    walls.extend(extra_walls);

    divided(
        vec![
            key(2, 2, 1),
            key(2, 7, 2),
            key(18, 2, 3),
            key(2, 12, 1),
            key(18, 12, 2),
            key(2, 18, 3),
        ],
        vec![Door {
            pos: Position::new(16, 2),
            orientation: Orientation::Vertical,
            key_id: 2,
        }],
        walls,
    )
}

/// Short wall stubs near the keys on the left.
fn obstacles() -> Vec<Wall> {
    vec![
        wall(5, 1, Orientation::Vertical),
        wall(5, 2, Orientation::Vertical),
        wall(5, 3, Orientation::Vertical),
        wall(4, 7, Orientation::Vertical),
        wall(4, 6, Orientation::Vertical),
        wall(3, 6, Orientation::Horizontal),
        wall(2, 6, Orientation::Horizontal),
    ]
}

/// The four base layouts, in catalog order.
pub fn base_layouts() -> Vec<WorldLayout> {
    vec![
        two_key_layout(vec![]),
        three_key_layout(vec![]),
        two_key_layout(obstacles()),
        three_key_layout(obstacles()),
    ]
}

/// Variants of `layout` with every assignment of distinct key ids to its
/// doors, main door last. Assignments whose main door key is not on the
/// floor are skipped.
pub fn key_assignments(layout: &WorldLayout) -> Vec<WorldLayout> {
    let floor_ids: BTreeSet<KeyId> = layout.keys.iter().map(|k| k.id).collect();
    let candidate_ids: Vec<KeyId> = layout
        .doors
        .iter()
        .map(|d| d.key_id)
        .chain(std::iter::once(layout.main_door.key_id))
        .chain(floor_ids.iter().copied())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    candidate_ids
        .iter()
        .copied()
        .permutations(layout.doors.len() + 1)
        .filter_map(|ids| {
            let (&main_id, door_ids) = ids.split_last()?;
            if !floor_ids.contains(&main_id) {
                return None;
            }
            let mut variant = layout.clone();
            for (door, &id) in variant.doors.iter_mut().zip(door_ids) {
                door.key_id = id;
            }
            variant.main_door.key_id = main_id;
            Some(variant)
        })
        .collect()
}

/// Every catalog world, each an independent copy.
pub fn generate_worlds() -> Result<Vec<World>, WorldError> {
    base_layouts()
        .iter()
        .flat_map(key_assignments)
        .map(World::new)
        .collect()
}
