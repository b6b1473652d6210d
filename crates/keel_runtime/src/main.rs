//! Keel Runtime
//!
//! Boots logging, loads runtime settings and drives every configured world
//! on its own thread, then round-trips the first world through a snapshot.

mod demo;

use anyhow::{anyhow, Context as _, Result};
use keel_core::world::{TypeRegistry, World, WorldDesc};
use keel_metrics::FrameTimer;
use keel_services::RuntimeSettings;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

const TARGETS_PER_WORLD: usize = 12;

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    tracing::info!("Keel v{}", keel_core::VERSION);
    let settings_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("keel.json"));
    let settings = RuntimeSettings::load(&settings_path)
        .with_context(|| format!("loading {}", settings_path.display()))?;
    let registry = Arc::new(demo::registry()?);

    let worlds = thread::scope(|scope| -> Result<Vec<World>> {
        let runs: Vec<_> = settings
            .worlds
            .iter()
            .map(|desc| -> Result<_> {
                let registry = Arc::clone(&registry);
                let desc = desc.clone();
                let name = desc.name.clone();
                let thread = thread::Builder::new()
                    .name(format!("world-{name}"))
                    .spawn_scoped(scope, move || run_world(desc, registry, settings.frames))
                    .with_context(|| format!("spawning thread for world '{name}'"))?;
                Ok((name, thread))
            })
            .collect::<Result<_>>()?;

        runs.into_iter()
            .map(|(name, thread)| {
                thread
                    .join()
                    .map_err(|_| anyhow!("world '{name}' panicked"))?
                    .with_context(|| format!("running world '{name}'"))
            })
            .collect::<Result<Vec<_>>>()
    })?;

    if let (Some(path), Some(world)) = (&settings.snapshot_path, worlds.first()) {
        round_trip(world, &registry, path)?;
    }

    tracing::info!(worlds = worlds.len(), "runtime finished");
    Ok(())
}

fn run_world(desc: WorldDesc, registry: Arc<TypeRegistry>, frames: u64) -> Result<World> {
    let mut world = World::new(desc, registry)?;
    demo::populate(&mut world, TARGETS_PER_WORLD)?;

    let mut timer = FrameTimer::new(120);
    for _ in 0..frames {
        timer.time(|| world.update())?;
    }

    let remaining = world
        .module::<demo::Navigation>()
        .map_or(0, demo::Navigation::targets_in_arena);
    tracing::info!(
        world = world.name(),
        frames = world.update_counter(),
        objects = world.objects().len(),
        targets = remaining,
        updates_per_second = timer.updates_per_second(),
        average_ms = timer.average_ms(),
        "world stopped"
    );
    for phase in world.profiler().phases() {
        tracing::debug!(
            world = world.name(),
            phase,
            average_us = world.profiler().average(phase).as_micros() as u64,
            "phase timing"
        );
    }
    for (counter, value) in world.counters().iter() {
        tracing::debug!(world = world.name(), counter, value, "counter");
    }
    Ok(world)
}

fn round_trip(world: &World, registry: &Arc<TypeRegistry>, path: &Path) -> Result<()> {
    keel_services::save_world(world, path)?;

    let desc = WorldDesc::new(format!("{}-reloaded", world.name()));
    let mut reloaded = World::new(desc, Arc::clone(registry))?;
    let summary = keel_services::load_world(&mut reloaded, path)?;
    if summary.objects != world.objects().len() {
        return Err(anyhow!(
            "snapshot restored {} of {} objects",
            summary.objects,
            world.objects().len()
        ));
    }
    reloaded.update()?;
    tracing::info!(
        from = %summary.world_name,
        objects = summary.objects,
        components = summary.components,
        "snapshot reloaded"
    );
    Ok(())
}
