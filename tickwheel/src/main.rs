use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use anyhow::Result;
use tickwheel::prelude::*;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Initialize structured logging.
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_target(false)
        .init();

    // 2. Load configuration (tickwheel.toml / TICKWHEEL_* env, falling back
    //    to the 0.6 s default).
    let config = SchedulerConfig::load("tickwheel")?;
    let clock = TickClock::new(config);

    // 3. Watch the announcement stream.
    spawn_event_listener(&clock);

    // 4. Register events exercising each firing policy.
    register_demo_events(&clock);

    // 5. After ten seconds, smoothly drop to a one-second heartbeat.
    let handle = clock.clone();
    tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_secs(10)).await;
        handle.change_interval(TimeUnit::Second.to_duration(1.0), true);
    });

    // 6. Run until Ctrl+C.
    clock.run().await
}

/// Prints every `SchedulerEvent` the clock announces.
fn spawn_event_listener(clock: &TickClock) {
    let mut rx = clock.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = rx.recv().await {
            info!("[EVENT] => {:?}", event);
        }
    });
}

/// Registers one event per firing policy against a shared counter.
fn register_demo_events(clock: &TickClock) {
    let ticks = Arc::new(AtomicU32::new(0));
    let registry = clock.registry();

    let t = ticks.clone();
    registry.register_recurring("pulse", move || {
        let n = t.fetch_add(1, Ordering::Relaxed) + 1;
        if n % 10 == 0 {
            info!("[PULSE] => {} ticks so far", n);
        }
    });

    registry.register_once("intro", || {
        info!("[INTRO] => first tick; this message will not repeat");
    });

    let t = ticks.clone();
    registry.register_periodic("beat", 5, false, move || {
        info!("[BEAT] => every fifth tick (tick {})", t.load(Ordering::Relaxed));
    });

    // A one-shot registered from inside a callback: fires on the step
    // after "beat" first does.
    let registry_handle = registry.clone();
    registry.register_periodic("beat-follow-up", 5, true, move || {
        registry_handle.register_once("echo", || info!("[ECHO] => scheduled mid-step"));
    });
}
