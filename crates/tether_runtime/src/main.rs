//! Tether Runtime
//!
//! Boots the managed heap, installs the root registry and walks a few proxy
//! scenarios across forced collections, logging what the collector did.
//!
//! Usage: `tether [settings.json]` (filter output with `RUST_LOG`).

mod settings;

use anyhow::{ensure, Context, Result};
use settings::RuntimeSettings;
use std::path::Path;
use std::sync::Arc;
use tether_core::{sentinel, Proxy, Record, Sentinel};
use tether_heap::ManagedRuntime;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    tracing::info!("Tether v{}", tether_core::VERSION);

    let settings = match std::env::args().nth(1) {
        Some(path) => RuntimeSettings::load(Path::new(&path))?,
        None => RuntimeSettings::default(),
    };
    tracing::debug!(?settings, "settings loaded");

    let runtime = ManagedRuntime::started(settings.heap.clone());
    let installed = sentinel::install(runtime.clone()).context("installing root registry")?;

    rewrite_through_root(&installed)?;
    update_module_bindings(&installed)?;
    aliases_across_collections(&installed, &settings)?;

    let gc = runtime.stats();
    let registry = installed.registry().stats();
    tracing::info!(
        collections = gc.collections,
        allocated = gc.allocated,
        copied = gc.objects_copied,
        freed = gc.objects_freed,
        live = gc.live_objects,
        avg_pause_ms = gc.average_pause_ms,
        metrics = tether_metrics::ENABLED,
        "collector"
    );
    tracing::info!(
        entries = registry.entries,
        registered = registry.registered,
        released = registry.released,
        relocated = registry.relocated,
        "root registry"
    );

    drop(installed);
    sentinel::shutdown();
    runtime.shutdown();
    Ok(())
}

/// A child index follows whatever its root array holds now.
fn rewrite_through_root(sentinel: &Arc<Sentinel>) -> Result<()> {
    let mut numbers = sentinel.new_value(&vec![1i64, 2, 3])?;
    let second = numbers.index(1);
    ensure!(second.unbox_as::<i64>()? == 2, "unexpected {}", second.name());

    numbers.set(&vec![10i64, 20, 30])?;
    let now = second.unbox_as::<i64>()?;
    ensure!(now == 20, "{} did not follow its root", second.name());
    tracing::info!(path = %second.name(), value = now, "child re-resolved after root write");

    numbers.set(&vec![7i64])?;
    match second.resolve_value() {
        Err(err) if err.is_path_resolution() => {
            tracing::info!(%err, "stale path reported instead of a stale value")
        }
        other => anyhow::bail!("expected a path error, got {other:?}"),
    }
    Ok(())
}

/// Globals are children of `Main`.
fn update_module_bindings(sentinel: &Arc<Sentinel>) -> Result<()> {
    let main = sentinel.main()?;
    let config = Record::mutable("Config")
        .field("x", 5i64)
        .field("name", "demo");
    main.field("config").set(&config)?;

    let mut x = main.field("config").field("x");
    x.set(&42i64)?;
    ensure!(main.field("config").field("x").unbox_as::<i64>()? == 42);
    ensure!(main.field("config").field("name").unbox_as::<String>()? == "demo");

    tracing::info!(
        bindings = ?main.field_names()?,
        fields = ?main.field("config").field_names()?,
        "module updated"
    );
    Ok(())
}

/// Many proxies share one pin; forced collections move the value under them.
fn aliases_across_collections(sentinel: &Arc<Sentinel>, settings: &RuntimeSettings) -> Result<()> {
    let root = sentinel.new_value(&vec![4i64, 5, 6])?;
    let aliases: Vec<Proxy> = (0..settings.demo.alias_count).map(|_| root.clone()).collect();
    let first = root.anchor().raw()?;

    for _ in 0..settings.demo.collections {
        sentinel.collect_garbage();
    }

    for alias in &aliases {
        ensure!(alias.unbox_as::<Vec<i64>>()? == vec![4, 5, 6], "alias lost its value");
    }
    tracing::info!(
        aliases = aliases.len(),
        holders = sentinel.registry().count(root.anchor().id()),
        from = %first,
        to = %root.anchor().raw()?,
        "aliases survived relocation"
    );
    Ok(())
}
