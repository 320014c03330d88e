//! Match state and authoritative tick loop

use std::collections::{BTreeMap, HashMap};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tokio::sync::{broadcast, mpsc};
use tokio::time::interval;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::relay::protocol::{
    GameEvent, MatchCmd, MatchPhase, PlayerInfo, RankingEntry, RelayMsg, WindState,
};
use crate::util::time::{tick_delta, SIMULATION_TPS, SNAPSHOT_TPS, TICK_DURATION_MICROS};

use super::bot::BotManager;
use super::duel::DuelTracker;
use super::kite::{Anchor, Kite, KitePhysics, KiteTuning};
use super::pickup::{Pickup, PickupField};
use super::snapshot::SnapshotBuilder;
use super::TickInput;

/// Seconds of countdown before a round starts
const COUNTDOWN_SECS: f32 = 5.0;

/// Seconds rankings stay up before the match tears down
const FINISH_GRACE_SECS: f32 = 5.0;

/// Seconds a disconnected player is retained before purge
const DISCONNECT_GRACE_SECS: f32 = 10.0;

/// Score for collecting a pickup
const PICKUP_SCORE_BONUS: u32 = 25;

const WIND_SPEED_RANGE: (f32, f32) = (0.2, 3.0);
const WIND_CHANGE_RANGE: (f32, f32) = (5.0, 15.0);

/// Ticks between bookkeeping prune sweeps
const PRUNE_INTERVAL_TICKS: u64 = 60;

/// Place a slot's anchor on the ground, spread evenly across the world
pub(crate) fn anchor_for_slot(slot: usize, max_players: usize, tuning: &KiteTuning) -> Anchor {
    let spread = tuning.world_width / (max_players + 1) as f32;
    Anchor {
        x: spread * (slot + 1) as f32,
        y: 0.0,
    }
}

/// Per-match rules fixed at creation
#[derive(Debug, Clone, Copy)]
pub struct MatchRules {
    pub min_players: usize,
    pub max_players: usize,
    pub duration_secs: f32,
}

impl Default for MatchRules {
    fn default() -> Self {
        Self {
            min_players: 2,
            max_players: 6,
            duration_secs: 180.0,
        }
    }
}

/// Player state in a match (authoritative). Bot-owned records are
/// structurally identical to human ones; `BotManager::is_bot` is the
/// only discriminator.
#[derive(Debug, Clone)]
pub struct PlayerState {
    pub user_id: Uuid,
    pub display_name: String,
    pub kite: Kite,
    pub anchor: Anchor,
    pub anchor_slot: usize,
    pub score: u32,
    pub cuts: u32,
    pub connected: bool,
    pub ready: bool,
    pub last_input_seq: u32,
    /// Countdown to respawn after a cut
    pub respawn_timer: Option<f32>,
    /// Countdown to purge after an unconsented disconnect
    pub disconnect_timer: Option<f32>,
}

impl PlayerState {
    pub fn new(
        user_id: Uuid,
        display_name: String,
        anchor_slot: usize,
        anchor: Anchor,
        tuning: &KiteTuning,
    ) -> Self {
        Self {
            user_id,
            display_name,
            kite: Kite::spawned(anchor, tuning),
            anchor,
            anchor_slot,
            score: 0,
            cuts: 0,
            connected: true,
            ready: false,
            last_input_seq: 0,
            respawn_timer: None,
            disconnect_timer: None,
        }
    }
}

/// Match state (owned by the match task)
pub struct MatchState {
    pub id: Uuid,
    pub seed: u64,
    pub phase: MatchPhase,
    pub tick: u64,
    /// Seconds of simulated play time
    pub game_time: f32,
    pub remaining_time: f32,
    pub countdown_remaining: f32,
    pub finish_grace: f32,
    pub players: BTreeMap<Uuid, PlayerState>,
    /// Latest clamped input per player; absent means neutral
    pub inputs: HashMap<Uuid, TickInput>,
    pub wind: WindState,
    pub pickups: PickupField,
    pub duels: DuelTracker,
    pub bots: BotManager,
    pub tuning: KiteTuning,
    pub rules: MatchRules,
    pub rng: ChaCha8Rng,
    /// Discrete events queued for the relay
    pub events: Vec<GameEvent>,
}

impl MatchState {
    pub fn new(id: Uuid, seed: u64, rules: MatchRules) -> Self {
        let tuning = KiteTuning::default();
        Self {
            id,
            seed,
            phase: MatchPhase::Waiting,
            tick: 0,
            game_time: 0.0,
            remaining_time: rules.duration_secs,
            countdown_remaining: COUNTDOWN_SECS,
            finish_grace: FINISH_GRACE_SECS,
            players: BTreeMap::new(),
            inputs: HashMap::new(),
            wind: WindState::default(),
            pickups: PickupField::new(tuning.world_width, tuning.world_height),
            duels: DuelTracker::new(),
            bots: BotManager::new(seed),
            tuning,
            rules,
            rng: ChaCha8Rng::seed_from_u64(seed),
            events: Vec::new(),
        }
    }

    /// Connected, ready players (bots count: they ready on spawn)
    pub fn ready_count(&self) -> usize {
        self.players
            .values()
            .filter(|p| p.connected && p.ready)
            .count()
    }

    /// Connected humans, for occupancy decisions and logging
    pub fn real_player_count(&self) -> usize {
        self.players
            .values()
            .filter(|p| p.connected && !self.bots.is_bot(&p.user_id))
            .count()
    }

    fn next_open_slot(&self) -> usize {
        (0..self.rules.max_players)
            .find(|slot| !self.players.values().any(|p| p.anchor_slot == *slot))
            .unwrap_or(0)
    }
}

/// Handle to a running match
#[derive(Clone)]
pub struct MatchHandle {
    pub id: Uuid,
    pub cmd_tx: mpsc::Sender<MatchCmd>,
    pub relay_tx: broadcast::Sender<RelayMsg>,
    pub player_count: Arc<std::sync::atomic::AtomicUsize>,
}

impl MatchHandle {
    pub fn player_count(&self) -> usize {
        self.player_count.load(std::sync::atomic::Ordering::Relaxed)
    }
}

/// Registry of all active matches
pub struct MatchRegistry {
    matches: DashMap<Uuid, MatchHandle>,
}

impl MatchRegistry {
    pub fn new() -> Self {
        Self {
            matches: DashMap::new(),
        }
    }

    pub fn get(&self, id: &Uuid) -> Option<MatchHandle> {
        self.matches.get(id).map(|m| m.value().clone())
    }

    pub fn insert(&self, handle: MatchHandle) {
        self.matches.insert(handle.id, handle);
    }

    pub fn remove(&self, id: &Uuid) -> Option<MatchHandle> {
        self.matches.remove(id).map(|(_, h)| h)
    }

    pub fn active_matches(&self) -> usize {
        self.matches.len()
    }

    pub fn total_players(&self) -> usize {
        self.matches.iter().map(|m| m.value().player_count()).sum()
    }

    /// Find a match with available slots
    pub fn find_available_match(&self, max_players: usize) -> Option<MatchHandle> {
        for entry in self.matches.iter() {
            if entry.value().player_count() < max_players {
                return Some(entry.value().clone());
            }
        }
        None
    }
}

impl Default for MatchRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// The authoritative game match
pub struct GameMatch {
    state: MatchState,
    cmd_rx: mpsc::Receiver<MatchCmd>,
    relay_tx: broadcast::Sender<RelayMsg>,
    snapshot_builder: SnapshotBuilder,
    player_count: Arc<std::sync::atomic::AtomicUsize>,
}

impl GameMatch {
    /// Create a new match
    pub fn new(id: Uuid, seed: u64, rules: MatchRules) -> (Self, MatchHandle) {
        let (cmd_tx, cmd_rx) = mpsc::channel(256);
        let (relay_tx, _) = broadcast::channel(64);
        let player_count = Arc::new(std::sync::atomic::AtomicUsize::new(0));

        let handle = MatchHandle {
            id,
            cmd_tx,
            relay_tx: relay_tx.clone(),
            player_count: player_count.clone(),
        };

        let snapshot_interval = SIMULATION_TPS / SNAPSHOT_TPS;
        let game_match = Self {
            state: MatchState::new(id, seed, rules),
            cmd_rx,
            relay_tx,
            snapshot_builder: SnapshotBuilder::new(snapshot_interval),
            player_count,
        };

        (game_match, handle)
    }

    pub fn state(&self) -> &MatchState {
        &self.state
    }

    /// Run the authoritative tick loop. Dropping every command sender
    /// tears the match down.
    pub async fn run(mut self) {
        info!(match_id = %self.state.id, "Match started");

        let tick_duration = Duration::from_micros(TICK_DURATION_MICROS);
        let mut tick_interval = interval(tick_duration);
        tick_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tick_interval.tick().await;

            // Drain boundary commands
            loop {
                match self.cmd_rx.try_recv() {
                    Ok(cmd) => self.handle_cmd(cmd),
                    Err(mpsc::error::TryRecvError::Empty) => break,
                    Err(mpsc::error::TryRecvError::Disconnected) => {
                        info!(match_id = %self.state.id, "Command channel closed, ending match");
                        return;
                    }
                }
            }

            // A fault in one tick must not take the whole match down
            let tick = self.state.tick;
            if let Err(panic) = catch_unwind(AssertUnwindSafe(|| self.run_tick())) {
                let detail = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                error!(match_id = %self.state.id, tick, detail = %detail, "Tick panicked, continuing");
            }

            self.snapshot_builder.queue(self.state.events.drain(..));
            if self.snapshot_builder.should_send() {
                let snapshot = self.snapshot_builder.build(
                    self.state.tick,
                    &self.state.wind,
                    &self.state.players,
                    &self.state.pickups,
                    &self.state.duels,
                );
                let _ = self.relay_tx.send(snapshot);
            }

            if self.state.phase == MatchPhase::Finished && self.state.finish_grace <= 0.0 {
                info!(match_id = %self.state.id, "Match complete");
                break;
            }

            if self.state.players.is_empty() && self.state.phase != MatchPhase::Waiting {
                info!(match_id = %self.state.id, "All players left, ending match");
                break;
            }
        }
    }

    /// Apply one boundary command
    pub fn handle_cmd(&mut self, cmd: MatchCmd) {
        match cmd {
            MatchCmd::Join {
                user_id,
                display_name,
            } => self.handle_join(user_id, display_name),
            MatchCmd::Ready {
                user_id,
                display_name,
            } => self.handle_ready(user_id, display_name),
            MatchCmd::Input {
                user_id,
                seq,
                timestamp: _,
                pull,
                steer,
            } => self.handle_input(user_id, seq, pull, steer),
            MatchCmd::Leave { user_id, consented } => self.handle_leave(user_id, consented),
            MatchCmd::AddBot => self.handle_add_bot(),
            MatchCmd::RemoveBots => self.handle_remove_bots(),
        }
    }

    fn handle_join(&mut self, user_id: Uuid, display_name: String) {
        if let Some(player) = self.state.players.get_mut(&user_id) {
            if player.connected {
                warn!(user_id = %user_id, "Player already in match");
                return;
            }
            // Rejoin within the disconnect grace window
            player.connected = true;
            player.disconnect_timer = None;
            info!(match_id = %self.state.id, user_id = %user_id, "Player reconnected");
            return;
        }

        if self.state.players.len() >= self.state.rules.max_players {
            let _ = self.relay_tx.send(RelayMsg::Error {
                code: "match_full".to_string(),
                message: "Match is full".to_string(),
            });
            return;
        }

        let slot = self.state.next_open_slot();
        let anchor = anchor_for_slot(slot, self.state.rules.max_players, &self.state.tuning);
        let mut player =
            PlayerState::new(user_id, display_name, slot, anchor, &self.state.tuning);

        // Hot-join: anyone arriving after the lobby is folded into the
        // next tick without restarting the countdown
        if self.state.phase != MatchPhase::Waiting {
            player.ready = true;
        }

        let info = PlayerInfo {
            user_id,
            display_name: player.display_name.clone(),
            anchor_x: anchor.x,
            anchor_y: anchor.y,
        };
        self.state.players.insert(user_id, player);
        self.sync_player_count();

        let _ = self.relay_tx.send(RelayMsg::PlayerJoined { player: info });

        info!(
            match_id = %self.state.id,
            user_id = %user_id,
            player_count = self.state.players.len(),
            real_players = self.state.real_player_count(),
            "Player joined match"
        );

        self.maybe_start_countdown();
    }

    fn handle_ready(&mut self, user_id: Uuid, display_name: String) {
        if let Some(player) = self.state.players.get_mut(&user_id) {
            player.ready = true;
            if !display_name.is_empty() {
                player.display_name = display_name;
            }
            self.maybe_start_countdown();
        }
    }

    fn handle_input(&mut self, user_id: Uuid, seq: u32, pull: bool, steer: f32) {
        if let Some(player) = self.state.players.get_mut(&user_id) {
            if player.connected && seq > player.last_input_seq {
                player.last_input_seq = seq;
                self.state
                    .inputs
                    .insert(user_id, TickInput::clamped(seq, pull, steer));
            }
        }
    }

    fn handle_leave(&mut self, user_id: Uuid, consented: bool) {
        if consented {
            self.purge_player(user_id, "left");
            return;
        }

        // Disconnection is not an error: flag and retain for the grace
        // window so the player can rejoin
        if let Some(player) = self.state.players.get_mut(&user_id) {
            player.connected = false;
            player.disconnect_timer = Some(DISCONNECT_GRACE_SECS);
            let _ = self.relay_tx.send(RelayMsg::PlayerLeft {
                user_id,
                reason: "disconnected".to_string(),
            });
            info!(match_id = %self.state.id, user_id = %user_id, "Player disconnected");
        }
    }

    fn handle_add_bot(&mut self) {
        let state = &mut self.state;
        match state
            .bots
            .spawn(&mut state.players, state.rules.max_players, &state.tuning)
        {
            Ok(user_id) => {
                let player = &state.players[&user_id];
                let info = PlayerInfo {
                    user_id,
                    display_name: player.display_name.clone(),
                    anchor_x: player.anchor.x,
                    anchor_y: player.anchor.y,
                };
                self.sync_player_count();
                let _ = self.relay_tx.send(RelayMsg::PlayerJoined { player: info });
                info!(match_id = %self.state.id, user_id = %user_id, "Bot spawned");
                self.maybe_start_countdown();
            }
            Err(err) => {
                warn!(match_id = %state.id, error = %err, "Bot spawn rejected");
                let _ = self.relay_tx.send(RelayMsg::Error {
                    code: "match_full".to_string(),
                    message: err.to_string(),
                });
            }
        }
    }

    fn handle_remove_bots(&mut self) {
        for user_id in self.state.bots.remove_all() {
            self.state.players.remove(&user_id);
            self.state.inputs.remove(&user_id);
            let _ = self.relay_tx.send(RelayMsg::PlayerLeft {
                user_id,
                reason: "removed".to_string(),
            });
        }
        self.sync_player_count();
    }

    fn purge_player(&mut self, user_id: Uuid, reason: &str) {
        if self.state.players.remove(&user_id).is_some() {
            self.state.bots.remove(&user_id);
            self.state.inputs.remove(&user_id);
            self.sync_player_count();
            let _ = self.relay_tx.send(RelayMsg::PlayerLeft {
                user_id,
                reason: reason.to_string(),
            });
            info!(match_id = %self.state.id, user_id = %user_id, reason, "Player removed");
        }
    }

    fn sync_player_count(&self) {
        self.player_count.store(
            self.state.players.len(),
            std::sync::atomic::Ordering::Relaxed,
        );
    }

    fn maybe_start_countdown(&mut self) {
        if self.state.phase == MatchPhase::Waiting
            && self.state.ready_count() >= self.state.rules.min_players
        {
            self.state.phase = MatchPhase::Countdown;
            self.state.countdown_remaining = COUNTDOWN_SECS;
            let _ = self.relay_tx.send(RelayMsg::PhaseChanged {
                phase: MatchPhase::Countdown,
            });
            let _ = self.relay_tx.send(RelayMsg::CountdownTick {
                seconds_remaining: COUNTDOWN_SECS as u32,
            });
        }
    }

    /// Run a single simulation tick
    pub fn run_tick(&mut self) {
        self.state.tick += 1;

        match self.state.phase {
            MatchPhase::Waiting => {
                // Do nothing, wait for players
            }
            MatchPhase::Countdown => {
                let before = self.state.countdown_remaining.ceil();
                self.state.countdown_remaining -= tick_delta();
                if self.state.countdown_remaining <= 0.0 {
                    self.start_round();
                } else {
                    let after = self.state.countdown_remaining.ceil();
                    if after < before {
                        let _ = self.relay_tx.send(RelayMsg::CountdownTick {
                            seconds_remaining: after as u32,
                        });
                    }
                }
            }
            MatchPhase::Playing => self.tick_playing(),
            MatchPhase::Finished => {
                self.state.finish_grace -= tick_delta();
            }
        }
    }

    fn start_round(&mut self) {
        self.state.phase = MatchPhase::Playing;
        self.state.remaining_time = self.state.rules.duration_secs;
        let _ = self.relay_tx.send(RelayMsg::PhaseChanged {
            phase: MatchPhase::Playing,
        });
        info!(match_id = %self.state.id, tick = self.state.tick, "Round started");
    }

    /// One Playing tick, in strict order: clock, wind, bot inputs,
    /// physics and pickup claims, duels, pickup upkeep, pruning.
    fn tick_playing(&mut self) {
        let dt = tick_delta();

        // 1. Clock and round countdown
        self.state.game_time += dt;
        self.state.remaining_time -= dt;
        if self.state.remaining_time <= 0.0 {
            self.finish_round();
            return;
        }

        // 2. Wind
        self.state.wind.change_timer -= dt;
        if self.state.wind.change_timer <= 0.0 {
            self.state.wind.speed = self
                .state
                .rng
                .gen_range(WIND_SPEED_RANGE.0..WIND_SPEED_RANGE.1);
            self.state.wind.direction = if self.state.rng.gen_bool(0.5) { 1.0 } else { -1.0 };
            self.state.wind.change_timer = self
                .state
                .rng
                .gen_range(WIND_CHANGE_RANGE.0..WIND_CHANGE_RANGE.1);
        }

        // 3. Bot inputs from the current snapshot
        let pickup_snapshot: Vec<Pickup> = self.state.pickups.active().to_vec();
        {
            let state = &mut self.state;
            state.bots.update_all(
                &state.players,
                &pickup_snapshot,
                &state.duels,
                &state.tuning,
                &mut state.inputs,
                dt,
            );
        }

        // 4. Physics for every connected player, crediting pickups
        self.step_players(&pickup_snapshot, dt);

        // 5. Duels across all live pairs
        {
            let state = &mut self.state;
            state
                .duels
                .update(&mut state.players, &state.inputs, dt, &mut state.events);
        }

        // 6. Pickup expiry, respawn countdowns and top-up
        {
            let state = &mut self.state;
            state.pickups.tick(dt, state.game_time, &mut state.rng);
        }

        // 7. Disconnect grace countdowns and periodic bookkeeping prune
        self.tick_disconnects(dt);
        if self.state.tick % PRUNE_INTERVAL_TICKS == 0 {
            self.prune_bookkeeping();
        }
    }

    fn step_players(&mut self, pickup_snapshot: &[Pickup], dt: f32) {
        let ids: Vec<Uuid> = self.state.players.keys().copied().collect();
        for id in ids {
            let state = &mut self.state;
            let Some(player) = state.players.get_mut(&id) else {
                continue;
            };
            if !player.connected {
                continue;
            }

            if !player.kite.alive {
                if let Some(timer) = player.respawn_timer.as_mut() {
                    *timer -= dt;
                    if *timer <= 0.0 {
                        player.respawn_timer = None;
                        player.kite = Kite::spawned(player.anchor, &state.tuning);
                    }
                }
                continue;
            }

            let input = state
                .inputs
                .get(&id)
                .copied()
                .unwrap_or_else(TickInput::neutral);
            let (next, collected) = KitePhysics::step(
                &player.kite,
                player.anchor,
                &input,
                &state.wind,
                pickup_snapshot,
                state.game_time,
                dt,
                &state.tuning,
            );
            player.kite = next;

            for pickup_id in collected {
                // Check-then-set: the first claimant this tick wins
                if let Some(pickup) = state.pickups.claim(pickup_id) {
                    player.score += PICKUP_SCORE_BONUS;
                    state.events.push(GameEvent::PickupCollected {
                        user_id: id,
                        pickup_id,
                        x: pickup.x,
                        y: pickup.y,
                    });
                }
            }
        }
    }

    fn tick_disconnects(&mut self, dt: f32) {
        let expired: Vec<Uuid> = self
            .state
            .players
            .values_mut()
            .filter_map(|player| {
                let timer = player.disconnect_timer.as_mut()?;
                *timer -= dt;
                (*timer <= 0.0).then_some(player.user_id)
            })
            .collect();
        for user_id in expired {
            self.purge_player(user_id, "timeout");
        }
    }

    /// Drop input-map entries for players no longer in the match
    fn prune_bookkeeping(&mut self) {
        let players = &self.state.players;
        self.state.inputs.retain(|id, _| players.contains_key(id));
    }

    fn finish_round(&mut self) {
        self.state.phase = MatchPhase::Finished;
        self.state.finish_grace = FINISH_GRACE_SECS;
        // Transient contest state does not outlive the round
        self.state.duels.clear();
        self.state.inputs.clear();

        let rankings = self.rankings();
        let _ = self.relay_tx.send(RelayMsg::PhaseChanged {
            phase: MatchPhase::Finished,
        });
        let _ = self.relay_tx.send(RelayMsg::MatchOver { rankings });
        self.snapshot_builder.force_next();

        info!(match_id = %self.state.id, tick = self.state.tick, "Round over");
    }

    /// Final standings, score descending with deterministic tie order
    pub fn rankings(&self) -> Vec<RankingEntry> {
        let mut rankings: Vec<RankingEntry> = self
            .state
            .players
            .values()
            .map(|p| RankingEntry {
                user_id: p.user_id,
                display_name: p.display_name.clone(),
                score: p.score,
                cuts: p.cuts,
            })
            .collect();
        rankings.sort_by(|a, b| {
            b.score
                .cmp(&a.score)
                .then(b.cuts.cmp(&a.cuts))
                .then(a.user_id.cmp(&b.user_id))
        });
        rankings
    }
}
