use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, anyhow};
use clap::{Args, Parser, Subcommand};
use goal_inference_core::{
    AgentBody, Barrier, Beliefs, KeyId, Orientation, Position, Selection, Session, SessionConfig,
    SessionOutcome, TurnRecord, UpdateCriterion, World, WorldLayout,
    catalog::generate_worlds,
    pathfinder::knower_route,
};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Parser, Debug)]
#[command(
    name = "goal-inference",
    version,
    about = "Key and door goal inference simulator",
    long_about = None
)]
struct Cli {
    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List the built-in worlds
    Worlds,

    /// Print the knower's route through a world
    Plan {
        #[command(flatten)]
        world: WorldArgs,
    },

    /// Play a planning knower against a model watcher
    Simulate {
        #[command(flatten)]
        world: WorldArgs,

        /// Rationality exponent of the watcher's model
        #[arg(long)]
        alpha: Option<f64>,

        /// When beliefs are updated: turn:N, action:P or goal:P
        #[arg(long, value_name = "CRITERION")]
        update: Option<UpdateCriterion>,

        /// Watcher moves before giving up
        #[arg(long)]
        max_rounds: Option<usize>,

        /// Sample watcher moves instead of taking the most likely one
        #[arg(long)]
        sample: bool,

        /// Seed for --sample
        #[arg(long, default_value_t = 0)]
        seed: u64,

        /// JSON session config; flags given on the command line win
        #[arg(long, value_name = "CONFIG_FILE")]
        config: Option<PathBuf>,

        /// Print the trace as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args, Debug)]
struct WorldArgs {
    /// Catalog index of the world
    #[arg(short, long, default_value_t = 0)]
    world: usize,

    /// JSON layout to load instead of a catalog world
    #[arg(short, long, value_name = "LAYOUT_FILE", conflicts_with = "world")]
    layout: Option<PathBuf>,
}

#[derive(Serialize)]
struct Report<'a> {
    outcome: SessionOutcome,
    config: SessionConfig,
    records: &'a [TurnRecord],
    beliefs: Option<&'a Beliefs>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if cli.verbose { "debug" } else { "info" })
    });
    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Worlds => list_worlds(),
        Commands::Plan { world } => plan(&world),
        Commands::Simulate {
            world,
            alpha,
            update,
            max_rounds,
            sample,
            seed,
            config,
            json,
        } => {
            let mut config = match config {
                Some(path) => load_config(&path)?,
                None => SessionConfig::default(),
            };
            if let Some(alpha) = alpha {
                config.watcher.alpha = alpha;
            }
            if let Some(update) = update {
                config.watcher.update = update;
            }
            if let Some(max_rounds) = max_rounds {
                config.max_rounds = max_rounds;
            }
            if sample {
                config.watcher.selection = Selection::Sample { seed };
            }
            simulate(&world, config, json)
        }
    }
}

fn load_config(path: &Path) -> Result<SessionConfig> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("reading config file {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing config file {}", path.display()))
}

fn load_world(args: &WorldArgs) -> Result<World> {
    if let Some(path) = &args.layout {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading layout file {}", path.display()))?;
        let layout: WorldLayout = serde_json::from_str(&text)
            .with_context(|| format!("parsing layout file {}", path.display()))?;
        return World::new(layout).with_context(|| format!("invalid layout {}", path.display()));
    }

    let worlds = generate_worlds().context("building the world catalog")?;
    let count = worlds.len();
    worlds
        .into_iter()
        .nth(args.world)
        .ok_or_else(|| anyhow!("no world {}, the catalog has {count}", args.world))
}

fn list_worlds() -> Result<()> {
    let worlds = generate_worlds().context("building the world catalog")?;
    println!("{:>5}  {:>8}  {:>4}  {:>5}", "world", "main key", "keys", "doors");
    for (index, world) in worlds.iter().enumerate() {
        println!(
            "{:>5}  {:>8}  {:>4}  {:>5}",
            index,
            world.main_door().key_id,
            world.floor_keys().len(),
            world.doors().len()
        );
    }
    Ok(())
}

fn plan(args: &WorldArgs) -> Result<()> {
    let world = load_world(args)?;
    let Some(route) = knower_route(&world) else {
        println!("no route to the main door from {}", world.knower_start());
        return Ok(());
    };

    info!(moves = route.len(), "route planned");
    let steps: Vec<String> = route.iter().map(Position::to_string).collect();
    println!("{} moves: {}", route.len(), steps.join(" "));
    println!();
    print!("{}", render(&world, &[], &route));
    Ok(())
}

fn simulate(args: &WorldArgs, config: SessionConfig, json: bool) -> Result<()> {
    let world = load_world(args)?;
    let mut session = Session::model(&world, config).context("setting up the session")?;
    let outcome = session.run().context("running the session")?;
    let beliefs = session.watcher().map(|w| w.beliefs());

    if json {
        let report = Report {
            outcome,
            config,
            records: session.records(),
            beliefs,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    for record in session.records() {
        println!(
            "round {:>3}  watcher {} key {}  knower {} key {}",
            record.round,
            record.watcher_pos,
            key_label(record.watcher_key),
            record.knower_pos,
            key_label(record.knower_key),
        );
    }
    match outcome {
        SessionOutcome::Solved { rounds } => println!("main door opened after {rounds} rounds"),
        SessionOutcome::RoundLimit { rounds } => println!("gave up after {rounds} rounds"),
    }
    if let Some(beliefs) = beliefs {
        for (goal, p) in beliefs {
            println!("P(goal = key {goal}) = {p:.3}");
        }
    }
    let bodies: Vec<(char, AgentBody)> = session
        .agents()
        .iter()
        .zip(['W', 'K'])
        .map(|(agent, glyph)| (glyph, *agent.body()))
        .collect();
    println!();
    print!("{}", render(session.world(), &bodies, &[]));
    Ok(())
}

fn key_label(key: Option<KeyId>) -> String {
    key.map_or_else(|| "-".to_string(), |id| id.to_string())
}

fn barrier_glyph(barrier: Option<Barrier>, wall: char) -> char {
    match barrier {
        None => ' ',
        Some(Barrier::Wall) => wall,
        Some(Barrier::Door { main: true, .. }) => 'M',
        Some(Barrier::Door { key_id, .. }) => char::from_digit(key_id % 10, 10).unwrap_or('?'),
    }
}

/// Plain-text map. Barriers sit on the lines between cells: walls as `-`
/// and `|`, doors as the last digit of their key id, the main door as `M`.
/// Cells show agents, then floor keys, then route markers.
fn render(world: &World, agents: &[(char, AgentBody)], route: &[Position]) -> String {
    let mut out = String::new();
    for y in 0..world.height() {
        for x in 0..world.width() {
            let pos = Position::new(x, y);
            out.push('+');
            out.push(barrier_glyph(world.barrier(pos, Orientation::Horizontal), '-'));
        }
        out.push_str("+\n");

        for x in 0..world.width() {
            let pos = Position::new(x, y);
            out.push(barrier_glyph(world.barrier(pos, Orientation::Vertical), '|'));
            let cell = agents
                .iter()
                .find(|(_, body)| body.pos == pos)
                .map(|(glyph, _)| *glyph)
                .or_else(|| {
                    world
                        .key_at(pos)
                        .and_then(|k| char::from_digit(k.id % 10, 10))
                })
                .or_else(|| route.contains(&pos).then_some('*'))
                .unwrap_or('.');
            out.push(cell);
        }
        out.push_str("|\n");
    }
    for _ in 0..world.width() {
        out.push_str("+-");
    }
    out.push_str("+\n");
    out
}
