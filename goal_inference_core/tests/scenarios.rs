use goal_inference_core::{
    Key, MainDoor, Orientation, Position, Session, SessionConfig, SessionOutcome, Wall, World,
    WorldLayout, catalog::generate_worlds, pathfinder::{Pathfinder, SearchState, knower_route},
};

fn four_by_four() -> World {
    World::new(WorldLayout {
        width: 4,
        height: 4,
        knower_start: Position::new(0, 0),
        watcher_start: Position::new(2, 3),
        keys: vec![Key::new(Position::new(0, 0), 0)],
        doors: vec![],
        main_door: MainDoor {
            pos: Position::new(2, 2),
            orientation: Orientation::Horizontal,
            key_id: 0,
            is_open: false,
        },
        walls: [0, 1, 3]
            .into_iter()
            .map(|x| Wall {
                pos: Position::new(x, 2),
                orientation: Orientation::Horizontal,
            })
            .collect(),
    })
    .expect("valid layout")
}

#[test]
fn knower_picks_up_the_key_before_leaving_the_start_cell() {
    let world = four_by_four();
    let states = Pathfinder::new(&world)
        .search(
            SearchState::new(world.knower_start(), None),
            world.knower_goal(),
            Some(0),
        )
        .expect("route exists");

    let first_move = states
        .iter()
        .position(|s| s.pos != Position::new(0, 0))
        .expect("knower leaves the start cell");
    assert!(first_move > 0);
    assert!(states[..first_move].iter().any(|s| s.held == Some(0)));

    let last = states.last().expect("non-empty route");
    assert_eq!(last.pos, Position::new(2, 1));
    assert_eq!(last.held, Some(0));
}

#[test]
fn replay_scores_every_watcher_move() {
    let world = four_by_four();
    let knower_moves = knower_route(&world).expect("route exists");
    let watcher_moves = vec![Position::new(2, 3); 3];
    let mut session = Session::replay(
        &world,
        knower_moves,
        watcher_moves,
        SessionConfig::default(),
    )
    .expect("session");

    assert_eq!(session.run().expect("replay runs"), SessionOutcome::RoundLimit { rounds: 3 });

    let diagnostics = session.watcher().expect("watcher").diagnostics();
    assert_eq!(diagnostics.log_likelihood.len(), 3);
    // no key on the watcher's side, so its four options are equally likely
    for ll in &diagnostics.log_likelihood {
        assert!((ll - 0.25f64.ln()).abs() < 1e-9);
    }

    assert!(diagnostics.action_prob[0].is_nan());
    assert!(diagnostics.goal_prob[0].is_nan());
    // staying on the key cell: path lengths 4, 5 and 5 for stay, right and down
    assert!((diagnostics.action_prob[1] - 10.0 / 28.0).abs() < 1e-9);
    assert!((diagnostics.goal_prob[1] - 10.0 / 28.0).abs() < 1e-9);

    let surprisal = diagnostics.action_surprisal();
    assert!((surprisal[1] + (10.0f64 / 28.0).log2()).abs() < 1e-9);
    let surprisal = diagnostics.goal_surprisal();
    assert!(surprisal[0].is_nan());
    assert!((surprisal[1] + (10.0f64 / 28.0).log2()).abs() < 1e-9);
    let mean = diagnostics.mean_log_likelihood().expect("scored moves");
    assert!((mean - 0.25f64.ln()).abs() < 1e-9);
}

#[test]
fn replay_stops_when_watcher_moves_run_out() {
    let world = four_by_four();
    let mut session = Session::replay(
        &world,
        vec![],
        vec![Position::new(3, 3), Position::new(3, 3)],
        SessionConfig::default(),
    )
    .expect("session");

    assert_eq!(session.run().expect("replay runs"), SessionOutcome::RoundLimit { rounds: 2 });
    let positions: Vec<Position> = session.records().iter().map(|r| r.watcher_pos).collect();
    assert_eq!(positions, vec![Position::new(3, 3), Position::new(3, 3)]);
    // an empty knower script idles at the start
    assert!(session.records().iter().all(|r| r.knower_pos == Position::new(0, 0)));
}

#[test]
fn illegal_replayed_move_is_an_error() {
    let world = four_by_four();
    let mut session = Session::replay(
        &world,
        vec![],
        vec![Position::new(0, 0)],
        SessionConfig::default(),
    )
    .expect("session");
    assert!(session.run().is_err());
}

#[test]
fn model_session_on_a_catalog_world_terminates() {
    let worlds = generate_worlds().expect("catalog is valid");
    let mut session = Session::model(&worlds[0], SessionConfig::default()).expect("session");
    let outcome = session.run().expect("session runs");

    assert_eq!(outcome, SessionOutcome::Solved { rounds: 22 });
    assert_eq!(session.records().len(), 22);
    assert!(session.world().main_door().is_open);
    // the catalog world itself is untouched
    assert!(!worlds[0].main_door().is_open);
    assert_eq!(worlds[0].floor_keys().len(), 4);
}
