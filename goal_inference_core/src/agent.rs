use std::fmt;

use rand::{SeedableRng, rngs::StdRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{
    Error, Key, KeyId, Position,
    belief::{self, Beliefs, Prediction},
    config::{Selection, UpdateCriterion, WatcherConfig},
    pathfinder::knower_route,
    world::{Door, World},
};

/// Failures in choosing or executing a move.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AgentError {
    #[error("move from {from} to {to} is not legal")]
    IllegalMove { from: Position, to: Position },
    #[error("replay move list exhausted after {moves} moves")]
    ReplayExhausted { moves: usize },
    #[error("human input closed")]
    InputClosed,
    #[error("no move to choose from at {pos}")]
    NoMove { pos: Position },
}

/// A single step requested by a human player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
    Stay,
}

impl Direction {
    /// Keyboard mapping: `w`/`a`/`s`/`d` to move, space to stay.
    pub fn from_key(key: char) -> Option<Self> {
        match key {
            'w' => Some(Direction::Up),
            's' => Some(Direction::Down),
            'a' => Some(Direction::Left),
            'd' => Some(Direction::Right),
            ' ' => Some(Direction::Stay),
            _ => None,
        }
    }

    /// Target cell, or `None` when it would leave the grid on the low side.
    pub fn apply(self, pos: Position) -> Option<Position> {
        match self {
            Direction::Up => pos.y.checked_sub(1).map(|y| Position::new(pos.x, y)),
            Direction::Down => Some(Position::new(pos.x, pos.y + 1)),
            Direction::Left => pos.x.checked_sub(1).map(|x| Position::new(x, pos.y)),
            Direction::Right => Some(Position::new(pos.x + 1, pos.y)),
            Direction::Stay => Some(pos),
        }
    }
}

/// Source of human moves. Blocks until the player decides.
pub trait HumanInput {
    /// Next requested direction, `None` once the input is closed.
    fn next_direction(&mut self) -> Option<Direction>;
}

impl<I: Iterator<Item = Direction>> HumanInput for I {
    fn next_direction(&mut self) -> Option<Direction> {
        self.next()
    }
}

/// Position and inventory shared by both agents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentBody {
    pub pos: Position,
    pub key: Option<Key>,
}

impl AgentBody {
    pub fn new(pos: Position) -> Self {
        AgentBody { pos, key: None }
    }

    /// Id of the carried key, if any.
    pub fn held(&self) -> Option<KeyId> {
        self.key.map(|k| k.id)
    }

    /// Legal destinations: accessible neighbors plus staying put.
    pub fn options(&self, world: &World) -> Vec<(Position, Option<Door>)> {
        let mut options = world.accessible_neighbors(self.pos, self.held());
        options.push((self.pos, None));
        options
    }

    pub fn can_move_to(&self, world: &World, to: Position) -> bool {
        self.options(world).iter().any(|(p, _)| *p == to)
    }

    pub fn at_goal(&self, world: &World) -> bool {
        world.at_goal(self.pos, self.held())
    }

    /// Moves to `to`, opening a crossed door with the carried key and
    /// swapping for any key found on arrival.
    pub fn execute(&mut self, world: &mut World, to: Position) -> Result<Position, Error> {
        let (_, door) = self
            .options(world)
            .into_iter()
            .find(|(p, _)| *p == to)
            .ok_or(AgentError::IllegalMove { from: self.pos, to })?;

        if let Some(door) = door {
            let key = self
                .key
                .take()
                .ok_or(AgentError::IllegalMove { from: self.pos, to })?;
            world.open_door(&door, key)?;
        }

        self.pos = to;
        if let Some(found) = world.remove_key(to) {
            if let Some(mut old) = self.key.take() {
                old.pos = to;
                world.add_key(old)?;
            }
            debug!(pos = %to, key_id = found.id, "key picked up");
            self.key = Some(found);
        }
        Ok(self.pos)
    }
}

/// The agent that knows which key opens the main door and walks a fixed route.
#[derive(Debug, Clone)]
pub struct Knower {
    body: AgentBody,
    moves: Vec<Position>,
    cursor: usize,
}

impl Knower {
    /// A knower following its shortest route from the world's knower start.
    ///
    /// If the main door cannot be reached the move list is empty and the
    /// knower idles where it stands.
    pub fn planned(world: &World) -> Self {
        let moves = knower_route(world).unwrap_or_else(|| {
            warn!(start = %world.knower_start(), "no route to the main door, knower will idle");
            Vec::new()
        });
        debug!(moves = moves.len(), "knower route planned");
        Knower::scripted(world.knower_start(), moves)
    }

    /// A knower replaying a given move list.
    pub fn scripted(start: Position, moves: Vec<Position>) -> Self {
        Knower {
            body: AgentBody::new(start),
            moves,
            cursor: 0,
        }
    }

    pub fn body(&self) -> &AgentBody {
        &self.body
    }

    pub fn moves(&self) -> &[Position] {
        &self.moves
    }

    /// Next move from the list; the last one repeats once the list is exhausted.
    pub fn choose_move(&mut self) -> Position {
        match self.moves.get(self.cursor) {
            Some(&next) => {
                if self.cursor + 1 < self.moves.len() {
                    self.cursor += 1;
                }
                next
            }
            None => self.body.pos,
        }
    }

    pub fn take_turn(&mut self, world: &mut World) -> Result<Position, Error> {
        let to = self.choose_move();
        self.body.execute(world, to)
    }
}

/// How the watcher decides on its moves.
pub enum WatcherMode {
    /// Acts on its own inferred move distribution.
    Model,
    /// Waits for a human player.
    Human(Box<dyn HumanInput>),
    /// Replays recorded moves, scoring each against the model.
    Replay(Vec<Position>),
}

impl fmt::Debug for WatcherMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WatcherMode::Model => write!(f, "Model"),
            WatcherMode::Human(_) => write!(f, "Human"),
            WatcherMode::Replay(moves) => f.debug_tuple("Replay").field(&moves.len()).finish(),
        }
    }
}

/// Per-step scores of a replayed watcher.
///
/// `action_prob` and `goal_prob` are `NaN` for the first step, before any
/// prediction of the knower exists.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Diagnostics {
    /// Natural log of the model's probability of each recorded watcher move.
    pub log_likelihood: Vec<f64>,
    /// Predicted probability of the knower's observed position.
    pub action_prob: Vec<f64>,
    /// Likelihood of the knower's observed position under the leading goal.
    pub goal_prob: Vec<f64>,
}

impl Diagnostics {
    pub fn action_surprisal(&self) -> Vec<f64> {
        self.action_prob.iter().map(|p| -p.log2()).collect()
    }

    pub fn goal_surprisal(&self) -> Vec<f64> {
        self.goal_prob.iter().map(|p| -p.log2()).collect()
    }

    pub fn mean_log_likelihood(&self) -> Option<f64> {
        if self.log_likelihood.is_empty() {
            None
        } else {
            Some(self.log_likelihood.iter().sum::<f64>() / self.log_likelihood.len() as f64)
        }
    }
}

/// The agent that infers the knower's goal from its movement.
#[derive(Debug)]
pub struct Watcher {
    body: AgentBody,
    mode: WatcherMode,
    config: WatcherConfig,
    beliefs: Beliefs,
    prediction: Option<Prediction>,
    num_moves: usize,
    rng: Option<StdRng>,
    diagnostics: Diagnostics,
}

impl Watcher {
    /// A watcher at the world's watcher start with beliefs initialized from
    /// the knower's current state.
    pub fn new(
        world: &World,
        knower: &AgentBody,
        mode: WatcherMode,
        config: WatcherConfig,
    ) -> Result<Self, Error> {
        let beliefs = belief::init_beliefs(world, knower, config.alpha)?;
        let rng = match config.selection {
            Selection::Argmax => None,
            Selection::Sample { seed } => Some(StdRng::seed_from_u64(seed)),
        };
        Ok(Watcher {
            body: AgentBody::new(world.watcher_start()),
            mode,
            config,
            beliefs,
            prediction: None,
            num_moves: 0,
            rng,
            diagnostics: Diagnostics::default(),
        })
    }

    pub fn body(&self) -> &AgentBody {
        &self.body
    }

    pub fn mode(&self) -> &WatcherMode {
        &self.mode
    }

    pub fn beliefs(&self) -> &Beliefs {
        &self.beliefs
    }

    /// Prediction of the knower's next position made on the last turn.
    pub fn prediction(&self) -> Option<&Prediction> {
        self.prediction.as_ref()
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    /// Goal with the highest current belief.
    pub fn leading_goal(&self) -> Option<KeyId> {
        belief::most_likely(&self.beliefs)
    }

    fn should_update(&self, knower: &AgentBody) -> bool {
        let Some(prediction) = &self.prediction else {
            return false;
        };
        match self.config.update {
            UpdateCriterion::Turn(n) => self.num_moves % n.max(1) == 0,
            UpdateCriterion::Action(threshold) => prediction.probability(knower.pos) < threshold,
            UpdateCriterion::Goal(threshold) => match self.leading_goal() {
                Some(goal) => prediction.likelihood(goal, knower.pos) < threshold,
                None => false,
            },
        }
    }

    /// Picks the next destination. Does not touch the world.
    pub fn choose_move(&mut self, world: &World, knower: &AgentBody) -> Result<Position, Error> {
        if let WatcherMode::Human(input) = &mut self.mode {
            self.num_moves += 1;
            loop {
                let direction = input.next_direction().ok_or(AgentError::InputClosed)?;
                match direction.apply(self.body.pos) {
                    Some(to) if self.body.can_move_to(world, to) => return Ok(to),
                    _ => debug!(?direction, "ignoring illegal human move"),
                }
            }
        }

        if self.should_update(knower) {
            if let Some(prediction) = &self.prediction {
                self.beliefs = belief::update_beliefs(knower, prediction, &self.beliefs)?;
            }
        }

        let alpha = self.config.alpha;
        let distribution =
            belief::choose_move_given_beliefs(world, &self.body, &self.beliefs, alpha)?;

        let next = match &self.mode {
            WatcherMode::Replay(moves) => {
                let next = *moves
                    .get(self.num_moves)
                    .ok_or(AgentError::ReplayExhausted { moves: moves.len() })?;
                let p = distribution.get(&next).copied().unwrap_or(0.0);
                self.diagnostics.log_likelihood.push(p.ln());
                let (action_prob, goal_prob) = match (&self.prediction, self.leading_goal()) {
                    (Some(prediction), Some(goal)) => (
                        prediction.probability(knower.pos),
                        prediction.likelihood(goal, knower.pos),
                    ),
                    _ => (f64::NAN, f64::NAN),
                };
                self.diagnostics.action_prob.push(action_prob);
                self.diagnostics.goal_prob.push(goal_prob);
                next
            }
            _ => {
                let picked = match self.rng.as_mut() {
                    Some(rng) => belief::sample(&distribution, rng),
                    None => belief::most_likely(&distribution),
                };
                picked.ok_or(AgentError::NoMove { pos: self.body.pos })?
            }
        };

        self.prediction = Some(belief::predict_knower_move(world, knower, &self.beliefs, alpha)?);
        self.num_moves += 1;
        Ok(next)
    }

    pub fn take_turn(&mut self, world: &mut World, knower: &AgentBody) -> Result<Position, Error> {
        let to = self.choose_move(world, knower)?;
        self.body.execute(world, to)
    }
}

/// Either participant of a game, dispatched by value.
#[derive(Debug)]
pub enum Agent {
    Knower(Knower),
    Watcher(Watcher),
}

impl Agent {
    pub fn body(&self) -> &AgentBody {
        match self {
            Agent::Knower(knower) => knower.body(),
            Agent::Watcher(watcher) => watcher.body(),
        }
    }

    /// Chooses and executes one move. `other` is the opposite agent.
    pub fn take_turn(&mut self, world: &mut World, other: &AgentBody) -> Result<Position, Error> {
        match self {
            Agent::Knower(knower) => knower.take_turn(world),
            Agent::Watcher(watcher) => watcher.take_turn(world, other),
        }
    }

    pub fn as_knower(&self) -> Option<&Knower> {
        match self {
            Agent::Knower(knower) => Some(knower),
            Agent::Watcher(_) => None,
        }
    }

    pub fn as_watcher(&self) -> Option<&Watcher> {
        match self {
            Agent::Watcher(watcher) => Some(watcher),
            Agent::Knower(_) => None,
        }
    }
}
