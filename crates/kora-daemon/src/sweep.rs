//! Background hold-release sweep.
//!
//! Balance caches are already revalidated lazily on every read; the
//! sweep exists so holds mature close to their `available_at` even for
//! users nobody is reading. Each run covers the window since the last
//! one and the first run starts from zero to catch entries that matured
//! while the daemon was down. Sweep and lazy read fold the same entries,
//! so they always agree.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::DaemonState;

/// Run the sweep until shutdown.
pub async fn run_hold_sweep(state: Arc<DaemonState>) {
    let interval = std::time::Duration::from_secs(state.config.sweep.interval_secs);
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let mut shutdown_rx = state.shutdown_tx.subscribe();
    let mut since: u64 = 0;

    info!(interval_secs = state.config.sweep.interval_secs, "hold sweep started");
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = shutdown_rx.recv() => {
                debug!("hold sweep stopping");
                return;
            }
        }

        let until = unix_now();
        match state.engine.sweep_matured_holds(since, until).await {
            Ok(swept) => {
                if swept > 0 {
                    info!(swept, since, until, "hold sweep refreshed balances");
                    state.event_bus.emit_now(
                        "HoldSweepCompleted",
                        serde_json::json!({ "users_swept": swept, "until": until }),
                    );
                }
                since = until;
            }
            Err(e) => {
                // Keep the old window so the next run retries it.
                warn!(error = %e, "hold sweep failed");
            }
        }
    }
}

pub fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
