//! Kite Game Server - headless simulation runner
//!
//! Boots a single authoritative match, fills it with bots and logs the
//! relay stream. A real deployment points its transport collaborator at
//! the same command and relay channels this runner uses.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use kite_game::config::Config;
use kite_game::game::r#match::{GameMatch, MatchRegistry, MatchRules};
use kite_game::relay::protocol::{GameEvent, MatchCmd, RelayMsg};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = Config::from_env()?;

    // Initialize tracing
    init_tracing(&config.log_level);

    info!("Starting Kite Game Server");

    let registry = Arc::new(MatchRegistry::new());

    let match_id = Uuid::new_v4();
    let seed = config.rng_seed.unwrap_or_else(rand::random);
    let rules = MatchRules {
        min_players: config.min_players,
        max_players: config.max_players,
        duration_secs: config.match_duration_secs,
    };

    let (game, handle) = GameMatch::new(match_id, seed, rules);
    registry.insert(handle.clone());
    info!(match_id = %match_id, seed, "Match created");

    let match_task = tokio::spawn(game.run());

    // Fill the lobby with bots; they ready up on spawn
    for _ in 0..config.bot_fill.min(config.max_players) {
        handle.cmd_tx.send(MatchCmd::AddBot).await?;
    }

    // Stand in for the external relay: log everything it would broadcast
    let mut relay_rx = handle.relay_tx.subscribe();
    let relay_task = tokio::spawn(async move {
        loop {
            match relay_rx.recv().await {
                Ok(msg) => log_relay(&msg),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(lagged_count = n, "Relay logger lagged, skipping {} messages", n);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    tokio::select! {
        _ = shutdown_signal() => {
            info!("Shutdown signal received");
        }
        _ = match_task => {
            info!(match_id = %match_id, "Match task finished");
        }
    }

    registry.remove(&match_id);
    relay_task.abort();

    info!("Server shutdown complete");
    Ok(())
}

fn log_relay(msg: &RelayMsg) {
    match msg {
        RelayMsg::PhaseChanged { phase } => info!(?phase, "Phase changed"),
        RelayMsg::CountdownTick { seconds_remaining } => {
            info!(seconds_remaining, "Countdown");
        }
        RelayMsg::PlayerJoined { player } => {
            info!(user_id = %player.user_id, name = %player.display_name, "Player joined");
        }
        RelayMsg::PlayerLeft { user_id, reason } => {
            info!(user_id = %user_id, reason = %reason, "Player left");
        }
        RelayMsg::Snapshot { tick, events, .. } => {
            debug!(tick, "Snapshot");
            for event in events {
                log_event(event);
            }
        }
        RelayMsg::MatchOver { rankings } => {
            info!("Match over");
            for (place, entry) in rankings.iter().enumerate() {
                info!(
                    place = place + 1,
                    name = %entry.display_name,
                    score = entry.score,
                    cuts = entry.cuts,
                    "Final standing"
                );
            }
        }
        RelayMsg::Error { code, message } => warn!(code = %code, message = %message, "Match error"),
    }
}

fn log_event(event: &GameEvent) {
    match event {
        GameEvent::PickupCollected { user_id, pickup_id, .. } => {
            info!(user_id = %user_id, pickup_id, "Pickup collected");
        }
        GameEvent::DuelStart { a, b, .. } => info!(a = %a, b = %b, "Duel started"),
        GameEvent::DuelProgress { progress, leader, .. } => {
            debug!(progress, leader = %leader, "Duel progress");
        }
        GameEvent::DuelEnd { a, b, reason } => {
            info!(a = %a, b = %b, reason = %reason, "Duel ended");
        }
        GameEvent::CutResolved { winner, loser } => {
            info!(winner = %winner, loser = %loser, "Line cut");
        }
    }
}

/// Initialize tracing/logging
fn init_tracing(log_level: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown");
        }
        _ = terminate => {
            info!("Received terminate signal, starting graceful shutdown");
        }
    }
}
