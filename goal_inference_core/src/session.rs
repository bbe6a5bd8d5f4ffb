use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    Error, KeyId, Position,
    agent::{Agent, AgentBody, HumanInput, Knower, Watcher, WatcherMode},
    config::SessionConfig,
    world::World,
};

/// Snapshot of both agents taken after each watcher move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnRecord {
    pub round: usize,
    pub watcher_pos: Position,
    pub knower_pos: Position,
    pub watcher_key: Option<KeyId>,
    pub knower_key: Option<KeyId>,
}

impl TurnRecord {
    fn new(round: usize, watcher: &AgentBody, knower: &AgentBody) -> Self {
        TurnRecord {
            round,
            watcher_pos: watcher.pos,
            knower_pos: knower.pos,
            watcher_key: watcher.held(),
            knower_key: knower.held(),
        }
    }
}

/// How a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SessionOutcome {
    /// Both agents met at the main door with its key.
    Solved { rounds: usize },
    /// The round cap was hit first.
    RoundLimit { rounds: usize },
}

/// One game between a watcher and a knower on a private copy of a world.
///
/// Agents strictly alternate, watcher first.
#[derive(Debug)]
pub struct Session {
    world: World,
    /// Watcher first, knower second.
    agents: [Agent; 2],
    turn: usize,
    rounds: usize,
    max_rounds: usize,
    records: Vec<TurnRecord>,
    outcome: Option<SessionOutcome>,
}

impl Session {
    /// Sets up a session on `world`, which the session takes ownership of.
    pub fn new(
        world: World,
        knower: Knower,
        mode: WatcherMode,
        config: SessionConfig,
    ) -> Result<Self, Error> {
        let watcher = Watcher::new(&world, knower.body(), mode, config.watcher)?;
        info!(?config, watcher = ?watcher.mode(), "session created");
        Ok(Session {
            world,
            agents: [Agent::Watcher(watcher), Agent::Knower(knower)],
            turn: 0,
            rounds: 0,
            max_rounds: config.max_rounds,
            records: Vec::new(),
            outcome: None,
        })
    }

    /// A planning knower against a model watcher, on a copy of `world`.
    pub fn model(world: &World, config: SessionConfig) -> Result<Self, Error> {
        let world = world.clone();
        let knower = Knower::planned(&world);
        Session::new(world, knower, WatcherMode::Model, config)
    }

    /// A planning knower against a human-controlled watcher.
    pub fn human(
        world: &World,
        input: Box<dyn HumanInput>,
        config: SessionConfig,
    ) -> Result<Self, Error> {
        let world = world.clone();
        let knower = Knower::planned(&world);
        Session::new(world, knower, WatcherMode::Human(input), config)
    }

    /// Replays recorded moves of both agents, scoring the watcher's.
    ///
    /// The session stops after the recorded watcher moves run out.
    pub fn replay(
        world: &World,
        knower_moves: Vec<Position>,
        watcher_moves: Vec<Position>,
        config: SessionConfig,
    ) -> Result<Self, Error> {
        let world = world.clone();
        let knower = Knower::scripted(world.knower_start(), knower_moves);
        let config = SessionConfig {
            max_rounds: config.max_rounds.min(watcher_moves.len()),
            ..config
        };
        Session::new(world, knower, WatcherMode::Replay(watcher_moves), config)
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn agents(&self) -> &[Agent; 2] {
        &self.agents
    }

    pub fn watcher(&self) -> Option<&Watcher> {
        self.agents.iter().find_map(Agent::as_watcher)
    }

    pub fn knower(&self) -> Option<&Knower> {
        self.agents.iter().find_map(Agent::as_knower)
    }

    pub fn records(&self) -> &[TurnRecord] {
        &self.records
    }

    /// Watcher moves made so far.
    pub fn rounds(&self) -> usize {
        self.rounds
    }

    pub fn outcome(&self) -> Option<SessionOutcome> {
        self.outcome
    }

    /// Plays a single turn. Returns the outcome once the session is over.
    pub fn step(&mut self) -> Result<Option<SessionOutcome>, Error> {
        if self.outcome.is_some() {
            return Ok(self.outcome);
        }

        let watcher_turn = self.turn % 2 == 0;
        if watcher_turn && self.rounds >= self.max_rounds {
            info!(rounds = self.rounds, "round limit reached");
            self.outcome = Some(SessionOutcome::RoundLimit {
                rounds: self.rounds,
            });
            return Ok(self.outcome);
        }

        let [watcher, knower] = &mut self.agents;
        if watcher_turn {
            let to = watcher.take_turn(&mut self.world, knower.body())?;
            self.rounds += 1;
            debug!(round = self.rounds, %to, "watcher moved");
            self.records
                .push(TurnRecord::new(self.rounds, watcher.body(), knower.body()));
        } else {
            let to = knower.take_turn(&mut self.world, watcher.body())?;
            debug!(round = self.rounds, %to, "knower moved");
        }
        self.turn += 1;

        if watcher.body().at_goal(&self.world) && knower.body().at_goal(&self.world) {
            self.world.open_main_door();
            info!(rounds = self.rounds, "main door opened");
            self.outcome = Some(SessionOutcome::Solved {
                rounds: self.rounds,
            });
        }
        Ok(self.outcome)
    }

    /// Plays until the main door opens or the round cap is hit.
    pub fn run(&mut self) -> Result<SessionOutcome, Error> {
        loop {
            if let Some(outcome) = self.step()? {
                return Ok(outcome);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Direction, world::tests::small_layout};

    fn small_world() -> World {
        World::new(small_layout()).unwrap()
    }

    #[test]
    fn agents_alternate_watcher_first() {
        let mut session = Session::model(&small_world(), SessionConfig::default()).unwrap();
        session.step().unwrap();
        assert_eq!(session.rounds(), 1);
        assert_eq!(session.records().len(), 1);
        session.step().unwrap();
        assert_eq!(session.rounds(), 1);
        assert_eq!(session.knower().unwrap().body().held(), Some(0));
    }

    #[test]
    fn round_cap_stops_an_unsolvable_session() {
        // the watcher never reaches the door: it holds no key and none is on its side
        let config = SessionConfig {
            max_rounds: 7,
            ..SessionConfig::default()
        };
        let mut session = Session::model(&small_world(), config).unwrap();
        assert_eq!(session.run().unwrap(), SessionOutcome::RoundLimit { rounds: 7 });
        assert_eq!(session.records().len(), 7);
        assert!(!session.world().main_door().is_open);
        assert!(session.knower().unwrap().body().at_goal(session.world()));
    }

    #[test]
    fn session_works_on_its_own_copy_of_the_world() {
        let world = small_world();
        let mut session = Session::model(&world, SessionConfig::default()).unwrap();
        session.step().unwrap();
        session.step().unwrap();
        assert!(session.world().key_at(Position::new(0, 0)).is_none());
        assert!(world.key_at(Position::new(0, 0)).is_some());
    }

    #[test]
    fn human_session_records_each_watcher_move() {
        let input = std::iter::repeat(Direction::Stay).take(3);
        let config = SessionConfig {
            max_rounds: 3,
            ..SessionConfig::default()
        };
        let mut session = Session::human(&small_world(), Box::new(input), config).unwrap();
        assert_eq!(session.run().unwrap(), SessionOutcome::RoundLimit { rounds: 3 });
        assert!(session.records().iter().all(|r| r.watcher_pos == Position::new(2, 3)));
    }

    #[test]
    fn records_serialize_with_optional_keys() {
        let record = TurnRecord {
            round: 1,
            watcher_pos: Position::new(2, 3),
            knower_pos: Position::new(0, 0),
            watcher_key: None,
            knower_key: Some(0),
        };
        let json = serde_json::to_value(record).unwrap();
        assert_eq!(json["knower_key"], 0);
        assert!(json["watcher_key"].is_null());
    }
}
