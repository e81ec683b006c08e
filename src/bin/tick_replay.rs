//! Tick Replay
//!
//! Drives a small world through random interception sites with randomly
//! cancelling listeners, then prints what the tracker fired, committed and
//! rolled back.

use std::path::PathBuf;

use clap::Parser;
use glam::Vec3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use phase_tracker::cause::{Contributor, DamageSource};
use phase_tracker::core::types::{BlockPos, BlockState, EntityId, EntityKind, EntitySnapshot};
use phase_tracker::phase::phases::WORLD_TICK;
use phase_tracker::sites::{BreakBlockSite, ExplodeSite, KillEntitySite, PlaceBlockSite};
use phase_tracker::tracker::TrackerStats;
use phase_tracker::{CauseTracker, MutationSite, Order, Result, SimWorld, SimulationHost, TrackerConfig};

/// Replay random mutations through the phase tracker
#[derive(Parser, Debug)]
#[command(name = "tick_replay")]
#[command(about = "Run random block and entity mutations through the phase tracker")]
struct Args {
    /// Random seed for deterministic runs
    #[arg(long)]
    seed: Option<u64>,

    /// Number of ticks to simulate
    #[arg(long, default_value_t = 50)]
    ticks: u64,

    /// Tracker config file (TOML)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Chance that a listener cancels any given event
    #[arg(long, default_value_t = 0.25)]
    cancel_chance: f64,

    /// Output format: json or text
    #[arg(long, default_value = "json")]
    format: String,
}

#[derive(Serialize)]
struct TickSummary {
    tick: u64,
    site: &'static str,
    transactions: usize,
    events: usize,
    cancelled_events: usize,
    committed: usize,
    rolled_back: usize,
    restore_failures: usize,
}

#[derive(Serialize)]
struct ReplaySummary {
    seed: u64,
    ticks: u64,
    blocks_remaining: usize,
    entities_remaining: usize,
    stats: TrackerStats,
    per_tick: Vec<TickSummary>,
}

const AREA: i32 = 8;

fn random_pos(rng: &mut StdRng) -> BlockPos {
    BlockPos::new(rng.gen_range(-AREA..=AREA), rng.gen_range(0..4), rng.gen_range(-AREA..=AREA))
}

fn build_world(rng: &mut StdRng) -> (SimWorld, Vec<EntityId>) {
    let mut world = SimWorld::new();
    world.fill(BlockPos::new(-AREA, -1, -AREA), BlockPos::new(AREA, -1, AREA), BlockState::Bedrock);
    world.fill(BlockPos::new(-AREA, 0, -AREA), BlockPos::new(AREA, 1, AREA), BlockState::Dirt);
    world.fill(BlockPos::new(-AREA, 2, -AREA), BlockPos::new(AREA, 2, AREA), BlockState::Stone);

    let mut entities = Vec::new();
    for kind in [EntityKind::Player, EntityKind::Villager, EntityKind::Villager, EntityKind::Zombie] {
        let pos = random_pos(rng);
        let snapshot = EntitySnapshot::new(kind, Vec3::new(pos.x as f32 + 0.5, 3.0, pos.z as f32 + 0.5));
        if world.spawn_entity(snapshot).is_ok() {
            entities.push(snapshot.id);
        }
    }
    (world, entities)
}

fn pick_site(rng: &mut StdRng, actors: &[EntityId]) -> Box<dyn MutationSite<SimWorld>> {
    let actor = actors[rng.gen_range(0..actors.len())];
    match rng.gen_range(0..10) {
        0..=3 => Box::new(BreakBlockSite::new(random_pos(rng)).by(Contributor::Player(actor))),
        4..=6 => Box::new(
            PlaceBlockSite::new(random_pos(rng), BlockState::Planks).by(Contributor::Entity(actor)),
        ),
        7..=8 => Box::new(ExplodeSite::new(random_pos(rng), rng.gen_range(1.5f32..3.5))),
        _ => Box::new(KillEntitySite::new(actor, DamageSource::Generic)),
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let seed = args.seed.unwrap_or_else(rand::random);
    let mut rng = StdRng::seed_from_u64(seed);
    let config = match &args.config {
        Some(path) => TrackerConfig::load(path)?,
        None => TrackerConfig::default(),
    };

    let (world, actors) = build_world(&mut rng);
    let mut tracker = CauseTracker::with_config(config, world)?;

    // Listener gets its own stream so cancellations don't shift site choices
    let mut listener_rng = StdRng::seed_from_u64(seed.wrapping_add(1));
    let cancel_chance = args.cancel_chance.clamp(0.0, 1.0);
    tracker.bus_mut().register(None, Order::Default, move |event| {
        if listener_rng.gen_bool(cancel_chance) {
            event.set_cancelled(true);
        }
    });

    tracing::info!("Replaying {} ticks with seed {}", args.ticks, seed);

    let mut per_tick = Vec::with_capacity(args.ticks as usize);
    for _ in 0..args.ticks {
        tracker.host_mut().advance_tick();
        let tick = tracker.host().tick();
        let mut site = pick_site(&mut rng, &actors);
        let name = site.name();

        let report = tracker.run_phase(WORLD_TICK, |_| {}, |t| site.intercept(t))?;
        per_tick.push(TickSummary {
            tick,
            site: name,
            transactions: report.transaction_count(),
            events: report.events_fired,
            cancelled_events: report.events_cancelled,
            committed: report.committed,
            rolled_back: report.cancelled,
            restore_failures: report.restore_failures,
        });
    }

    let summary = ReplaySummary {
        seed,
        ticks: args.ticks,
        blocks_remaining: tracker.host().block_count(),
        entities_remaining: tracker.host().entity_count(),
        stats: tracker.stats().clone(),
        per_tick,
    };

    match args.format.as_str() {
        "text" => {
            println!("Tick Replay (seed {})", summary.seed);
            println!("======================");
            for t in &summary.per_tick {
                println!(
                    "[{:>4}] {:<12} {:>3} tx  {:>2} event(s)  {:>2} cancelled  {:>3} committed  {:>3} rolled back",
                    t.tick, t.site, t.transactions, t.events, t.cancelled_events, t.committed, t.rolled_back
                );
            }
            println!();
            println!("Events fired:      {}", summary.stats.events_fired);
            println!("Events cancelled:  {}", summary.stats.events_cancelled);
            println!("Restore failures:  {}", summary.stats.restore_failures);
            println!("Blocks remaining:  {}", summary.blocks_remaining);
            println!("Entities remaining: {}", summary.entities_remaining);
        }
        _ => println!("{}", serde_json::to_string_pretty(&summary)?),
    }

    Ok(())
}
