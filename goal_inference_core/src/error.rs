use crate::{
    agent::AgentError, belief::BeliefError, config::ConfigError, world::WorldError,
};

/// Any failure surfaced by the engine.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    #[error("invalid world: {0}")]
    World(#[from] WorldError),
    #[error("belief engine: {0}")]
    Belief(#[from] BeliefError),
    #[error("agent: {0}")]
    Agent(#[from] AgentError),
    #[error("config: {0}")]
    Config(#[from] ConfigError),
}
