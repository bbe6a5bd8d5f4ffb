//! Bayesian goal inference for the watcher.
//!
//! Goals are key ids: "the knower ends up at the main door holding this key".
//! Every likelihood comes from shortest-path lengths turned into weights
//! `1 - len / total`, sharpened by the rationality exponent `alpha` and
//! renormalized. Every distribution handed out here sums to one within
//! [`TOLERANCE`]; anything else is reported as an error.

use std::collections::{BTreeMap, BTreeSet};

use rand::{
    Rng,
    distr::{Distribution, weighted::WeightedIndex},
};
use tracing::debug;

use crate::{
    KeyId, Position,
    agent::AgentBody,
    pathfinder::{Pathfinder, SearchState},
    world::World,
};

/// Allowed deviation of a distribution's total from one.
pub const TOLERANCE: f64 = 1e-4;

/// Probability of each candidate goal.
pub type Beliefs = BTreeMap<KeyId, f64>;

/// Probability of each candidate next position.
pub type MoveDistribution = BTreeMap<Position, f64>;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BeliefError {
    #[error("no candidate {0} to distribute probability over")]
    Empty(&'static str),
    #[error("{what} sums to {sum}, not 1")]
    NotNormalized { what: &'static str, sum: f64 },
    #[error("observed knower position {pos} had zero predicted probability")]
    ZeroProbabilityObservation { pos: Position },
}

/// Forward prediction of the knower's next position.
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    /// Marginal over goals, weighted by the beliefs used to build it.
    pub p_next: MoveDistribution,
    /// Per-goal likelihood of each next position.
    pub p_next_given_goal: BTreeMap<KeyId, MoveDistribution>,
}

impl Prediction {
    /// Predicted probability of `pos`, zero when it was not a candidate.
    pub fn probability(&self, pos: Position) -> f64 {
        self.p_next.get(&pos).copied().unwrap_or(0.0)
    }

    /// Likelihood of `pos` under `goal`, zero when unknown.
    pub fn likelihood(&self, goal: KeyId, pos: Position) -> f64 {
        self.p_next_given_goal
            .get(&goal)
            .and_then(|dist| dist.get(&pos))
            .copied()
            .unwrap_or(0.0)
    }
}

/// Fails unless `dist` sums to one within [`TOLERANCE`].
pub fn check_normalized<K>(what: &'static str, dist: &BTreeMap<K, f64>) -> Result<(), BeliefError> {
    let sum: f64 = dist.values().sum();
    if (sum - 1.0).abs() < TOLERANCE {
        Ok(())
    } else {
        Err(BeliefError::NotNormalized { what, sum })
    }
}

/// Turns path lengths into a normalized distribution.
///
/// Shorter paths weigh more. Unreachable entries (`None`) get zero mass; if
/// every entry is unreachable, or the reachable weights vanish (a single
/// reachable entry, or all lengths zero), mass is spread uniformly instead.
pub fn length_distribution<K: Ord + Clone>(
    what: &'static str,
    lengths: &BTreeMap<K, Option<usize>>,
    alpha: f64,
) -> Result<BTreeMap<K, f64>, BeliefError> {
    if lengths.is_empty() {
        return Err(BeliefError::Empty(what));
    }

    let reachable: Vec<(&K, usize)> = lengths
        .iter()
        .filter_map(|(k, len)| len.map(|len| (k, len)))
        .collect();
    if reachable.is_empty() {
        let p = 1.0 / lengths.len() as f64;
        let dist: BTreeMap<K, f64> = lengths.keys().map(|k| (k.clone(), p)).collect();
        check_normalized(what, &dist)?;
        return Ok(dist);
    }

    let total: usize = reachable.iter().map(|(_, len)| len).sum();
    let raw: Vec<(&K, f64)> = reachable
        .iter()
        .map(|(k, len)| {
            let w = if total == 0 {
                0.0
            } else {
                1.0 - *len as f64 / total as f64
            };
            (*k, w)
        })
        .collect();
    let top = raw.iter().map(|(_, w)| *w).fold(0.0, f64::max);

    let mut dist: BTreeMap<K, f64> = lengths.keys().map(|k| (k.clone(), 0.0)).collect();
    if top > 0.0 {
        // Scaled by the top weight so large alphas cannot underflow every entry.
        let weights: Vec<(&K, f64)> = raw
            .iter()
            .map(|(k, w)| (*k, (w / top).powf(alpha)))
            .collect();
        let mass: f64 = weights.iter().map(|(_, w)| w).sum();
        for (k, w) in weights {
            dist.insert(k.clone(), w / mass);
        }
    } else {
        let p = 1.0 / reachable.len() as f64;
        for (k, _) in &reachable {
            dist.insert((*k).clone(), p);
        }
    }

    check_normalized(what, &dist)?;
    Ok(dist)
}

/// Likelihood of each next position of `body` if it is heading for `goal`
/// holding `goal_key`. Staying put is always a candidate.
pub fn move_likelihoods(
    world: &World,
    body: &AgentBody,
    goal: Position,
    goal_key: KeyId,
    alpha: f64,
) -> Result<MoveDistribution, BeliefError> {
    let finder = Pathfinder::new(world);
    let here = SearchState::new(body.pos, body.held());

    let lengths: BTreeMap<Position, Option<usize>> = body
        .options(world)
        .into_iter()
        .map(|(pos, door)| {
            let next = finder.step(&here, pos, door);
            let len = finder.distance(next, goal, Some(goal_key)).map(|d| d + 1);
            (pos, len)
        })
        .collect();

    length_distribution("next positions", &lengths, alpha)
}

/// Goals the knower could be pursuing: every key id on the floor plus the
/// one it carries.
pub fn candidate_goals(world: &World, knower: &AgentBody) -> BTreeSet<KeyId> {
    world
        .floor_keys()
        .into_iter()
        .map(|k| k.id)
        .chain(knower.held())
        .collect()
}

/// Prior over the knower's goal from its shortest route to the main door
/// holding each candidate key.
pub fn init_beliefs(world: &World, knower: &AgentBody, alpha: f64) -> Result<Beliefs, BeliefError> {
    let finder = Pathfinder::new(world);
    let lengths: BTreeMap<KeyId, Option<usize>> = candidate_goals(world, knower)
        .into_iter()
        .map(|goal| {
            let start = SearchState::new(knower.pos, knower.held());
            (goal, finder.distance(start, world.knower_goal(), Some(goal)))
        })
        .collect();
    debug!(?lengths, "knower route lengths per goal");

    let beliefs = length_distribution("goals", &lengths, alpha)?;
    debug!(?beliefs, "initial beliefs");
    Ok(beliefs)
}

/// Forward prediction of the knower's next position, marginalized over
/// `beliefs`.
pub fn predict_knower_move(
    world: &World,
    knower: &AgentBody,
    beliefs: &Beliefs,
    alpha: f64,
) -> Result<Prediction, BeliefError> {
    let mut p_next = MoveDistribution::new();
    let mut p_next_given_goal = BTreeMap::new();

    for (&goal, &belief) in beliefs {
        let likelihoods = move_likelihoods(world, knower, world.knower_goal(), goal, alpha)?;
        for (&pos, &p) in &likelihoods {
            *p_next.entry(pos).or_insert(0.0) += belief * p;
        }
        p_next_given_goal.insert(goal, likelihoods);
    }

    check_normalized("knower move prediction", &p_next)?;
    Ok(Prediction {
        p_next,
        p_next_given_goal,
    })
}

/// Bayes' rule on the knower's observed position.
///
/// `prediction` must be the one built from `beliefs` before the knower moved.
pub fn update_beliefs(
    knower: &AgentBody,
    prediction: &Prediction,
    beliefs: &Beliefs,
) -> Result<Beliefs, BeliefError> {
    let observed = knower.pos;
    let evidence = prediction.probability(observed);
    if evidence <= 0.0 {
        return Err(BeliefError::ZeroProbabilityObservation { pos: observed });
    }

    let posterior: Beliefs = beliefs
        .iter()
        .map(|(&goal, &prior)| (goal, prediction.likelihood(goal, observed) * prior / evidence))
        .collect();

    check_normalized("posterior beliefs", &posterior)?;
    debug!(%observed, ?posterior, "beliefs updated");
    Ok(posterior)
}

/// The watcher's own next-move distribution: head for the main door holding
/// each candidate key, weighted by how likely the knower is to bring it.
pub fn choose_move_given_beliefs(
    world: &World,
    watcher: &AgentBody,
    beliefs: &Beliefs,
    alpha: f64,
) -> Result<MoveDistribution, BeliefError> {
    let mut p_next = MoveDistribution::new();
    for (&goal, &belief) in beliefs {
        let likelihoods = move_likelihoods(world, watcher, world.watcher_goal(), goal, alpha)?;
        for (pos, p) in likelihoods {
            *p_next.entry(pos).or_insert(0.0) += belief * p;
        }
    }

    check_normalized("watcher move distribution", &p_next)?;
    Ok(p_next)
}

/// Entry with the highest probability; ties go to the first in key order.
pub fn most_likely<K: Clone>(dist: &BTreeMap<K, f64>) -> Option<K> {
    let mut best: Option<(&K, f64)> = None;
    for (k, &p) in dist {
        if best.is_none_or(|(_, top)| p > top) {
            best = Some((k, p));
        }
    }
    best.map(|(k, _)| k.clone())
}

/// Draws an entry from `dist`. `None` when it has no positive weight.
pub fn sample<K: Clone, R: Rng>(dist: &BTreeMap<K, f64>, rng: &mut R) -> Option<K> {
    let index = WeightedIndex::new(dist.values()).ok()?;
    dist.keys().nth(index.sample(rng)).cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Key, Orientation, world::{MainDoor, Wall, WorldLayout}};
    use rand::{SeedableRng, rngs::StdRng};

    /// 5x4 world with keys 1 and 2 mirrored around a knower at (2, 0).
    fn mirrored_world() -> World {
        World::new(WorldLayout {
            width: 5,
            height: 4,
            knower_start: Position::new(2, 0),
            watcher_start: Position::new(2, 3),
            keys: vec![
                Key::new(Position::new(0, 0), 1),
                Key::new(Position::new(4, 0), 2),
            ],
            doors: vec![],
            main_door: MainDoor {
                pos: Position::new(2, 2),
                orientation: Orientation::Horizontal,
                key_id: 1,
                is_open: false,
            },
            walls: [0, 1, 3, 4]
                .into_iter()
                .map(|x| Wall {
                    pos: Position::new(x, 2),
                    orientation: Orientation::Horizontal,
                })
                .collect(),
        })
        .unwrap()
    }

    fn body(x: usize, y: usize) -> AgentBody {
        AgentBody::new(Position::new(x, y))
    }

    #[test]
    fn equidistant_goals_split_evenly() {
        let world = mirrored_world();
        let beliefs = init_beliefs(&world, &body(2, 0), 1.0).unwrap();
        assert_eq!(beliefs.len(), 2);
        assert!((beliefs[&1] - 0.5).abs() < 1e-6);
        assert!((beliefs[&2] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn closer_goal_is_favoured_and_alpha_sharpens() {
        let world = mirrored_world();
        let soft = init_beliefs(&world, &body(1, 0), 1.0).unwrap();
        let sharp = init_beliefs(&world, &body(1, 0), 8.0).unwrap();
        assert!(soft[&1] > soft[&2]);
        assert!(sharp[&1] > soft[&1]);
        let flat = init_beliefs(&world, &body(1, 0), 0.0).unwrap();
        assert!((flat[&1] - 0.5).abs() < 1e-9);
    }

    #[test]
    fn huge_alpha_still_favours_the_closer_goal() {
        let world = mirrored_world();
        let beliefs = init_beliefs(&world, &body(1, 0), 5000.0).unwrap();
        assert!(beliefs[&1] > 0.99);
        assert!(beliefs[&2] < 0.01);
    }

    #[test]
    fn init_beliefs_is_deterministic() {
        let world = mirrored_world();
        let first = init_beliefs(&world, &body(1, 1), 2.0).unwrap();
        let second = init_beliefs(&world, &body(1, 1), 2.0).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn zero_lengths_fall_back_to_uniform() {
        let lengths = BTreeMap::from([(1u32, Some(0)), (2u32, Some(0))]);
        let dist = length_distribution("goals", &lengths, 1.0).unwrap();
        assert_eq!(dist[&1], 0.5);
        assert_eq!(dist[&2], 0.5);
    }

    #[test]
    fn unreachable_entries_get_no_mass() {
        let lengths = BTreeMap::from([(1u32, Some(3)), (2u32, None), (3u32, Some(5))]);
        let dist = length_distribution("goals", &lengths, 1.0).unwrap();
        assert_eq!(dist[&2], 0.0);
        assert!(dist[&1] > dist[&3]);

        let none = BTreeMap::from([(1u32, None), (2u32, None)]);
        let dist = length_distribution("goals", &none, 1.0).unwrap();
        assert_eq!(dist[&1], 0.5);
    }

    #[test]
    fn empty_candidate_set_is_an_error() {
        let lengths: BTreeMap<KeyId, Option<usize>> = BTreeMap::new();
        assert_eq!(
            length_distribution("goals", &lengths, 1.0),
            Err(BeliefError::Empty("goals"))
        );
    }

    #[test]
    fn prediction_marginalizes_over_beliefs() {
        let world = mirrored_world();
        let knower = body(2, 0);
        let beliefs = Beliefs::from([(1, 0.5), (2, 0.5)]);
        let prediction = predict_knower_move(&world, &knower, &beliefs, 1.0).unwrap();

        check_normalized("p_next", &prediction.p_next).unwrap();
        for dist in prediction.p_next_given_goal.values() {
            check_normalized("likelihood", dist).unwrap();
        }
        // heading left is the best move for key 1, right for key 2
        let left = Position::new(1, 0);
        let right = Position::new(3, 0);
        assert!(prediction.likelihood(1, left) > prediction.likelihood(1, right));
        assert!(prediction.likelihood(2, right) > prediction.likelihood(2, left));
        assert!((prediction.probability(left) - prediction.probability(right)).abs() < 1e-9);
    }

    #[test]
    fn observed_move_shifts_beliefs_towards_its_goal() {
        let world = mirrored_world();
        let mut knower = body(2, 0);
        let beliefs = init_beliefs(&world, &knower, 1.0).unwrap();
        let prediction = predict_knower_move(&world, &knower, &beliefs, 1.0).unwrap();

        knower.pos = Position::new(1, 0);
        let posterior = update_beliefs(&knower, &prediction, &beliefs).unwrap();
        check_normalized("posterior", &posterior).unwrap();
        assert!(posterior[&1] > beliefs[&1]);
        assert!(posterior[&2] < beliefs[&2]);
    }

    #[test]
    fn zero_probability_observation_is_rejected() {
        let world = mirrored_world();
        let mut knower = body(2, 0);
        let beliefs = init_beliefs(&world, &knower, 1.0).unwrap();
        let prediction = predict_knower_move(&world, &knower, &beliefs, 1.0).unwrap();

        knower.pos = Position::new(4, 3);
        assert_eq!(
            update_beliefs(&knower, &prediction, &beliefs),
            Err(BeliefError::ZeroProbabilityObservation {
                pos: Position::new(4, 3)
            })
        );
    }

    #[test]
    fn watcher_distribution_is_normalized() {
        let world = mirrored_world();
        let beliefs = Beliefs::from([(1, 0.8), (2, 0.2)]);
        let dist = choose_move_given_beliefs(&world, &body(2, 3), &beliefs, 1.0).unwrap();
        check_normalized("watcher", &dist).unwrap();
        assert!(dist.contains_key(&Position::new(2, 3)));
    }

    #[test]
    fn most_likely_prefers_first_on_ties() {
        let dist = BTreeMap::from([(1u32, 0.4), (2u32, 0.4), (3u32, 0.2)]);
        assert_eq!(most_likely(&dist), Some(1));
        assert_eq!(most_likely(&BTreeMap::<u32, f64>::new()), None);
    }

    #[test]
    fn sampling_only_returns_supported_entries() {
        let dist = BTreeMap::from([(1u32, 0.0), (2u32, 0.3), (3u32, 0.7)]);
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..200 {
            let k = sample(&dist, &mut rng).unwrap();
            assert_ne!(k, 1);
        }
        let empty = BTreeMap::from([(1u32, 0.0), (2u32, 0.0)]);
        assert_eq!(sample(&empty, &mut rng), None);
        assert_eq!(sample(&BTreeMap::<u32, f64>::new(), &mut rng), None);
    }
}
