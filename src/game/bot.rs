//! Rule-based bot opponents
//!
//! Bots are ordinary player records driven by a decision engine that
//! produces one clamped input per tick, so every other component sees
//! them exactly as it sees humans.

use std::collections::{BTreeMap, HashMap};

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use uuid::Uuid;

use super::duel::DuelTracker;
use super::kite::{Anchor, Kite, KiteTuning};
use super::pickup::Pickup;
use super::r#match::{anchor_for_slot, PlayerState};
use super::TickInput;

/// Randomized seconds between deciding and committing an input
const REACTION_DELAY_RANGE: (f32, f32) = (0.15, 0.45);

/// Chance of deliberately going for the second-closest pickup
const SECOND_CHOICE_CHANCE: f64 = 0.3;

/// Effective reach as a fraction of the maximum line length
const REACH_FRACTION: f32 = 0.9;

/// A pickup this far above the kite is worth pulling toward
const PICKUP_ABOVE_MARGIN: f32 = 10.0;

/// Horizontal offset that maps to full steer
const STEER_GAIN: f32 = 60.0;

const ALTITUDE_RANGE: (f32, f32) = (0.35, 0.80);
const ALTITUDE_SHIFT_RANGE: (f32, f32) = (4.0, 9.0);
const ALTITUDE_DEADBAND: f32 = 40.0;
const CEILING_MARGIN: f32 = 80.0;

const WANDER_SHIFT_RANGE: (f32, f32) = (1.0, 3.0);
const EDGE_MARGIN: f32 = 150.0;

const DUEL_PULL_CHANCE_LOSING: f64 = 0.85;
const DUEL_PULL_CHANCE_LEADING: f64 = 0.45;
const DUEL_STEER_JITTER: f32 = 0.3;

/// Restricted world snapshot a bot decides from
pub struct BotView<'a> {
    pub kite: Kite,
    pub anchor: Anchor,
    /// Positions of alive, connected opponents
    pub opponents: Vec<(f32, f32)>,
    pub pickups: &'a [Pickup],
    /// Set when the bot is in a duel; true when it is leading
    pub duel_leading: Option<bool>,
    pub tuning: &'a KiteTuning,
}

/// Single-bot decision engine
pub struct BotBrain {
    rng: ChaCha8Rng,
    seq: u32,
    current: TickInput,
    /// Queued decision waiting out the reaction delay
    pending: Option<TickInput>,
    reaction_timer: f32,
    target_altitude: f32,
    altitude_timer: f32,
    wander_steer: f32,
    wander_timer: f32,
}

impl BotBrain {
    pub fn new(seed: u64, tuning: &KiteTuning) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let target_altitude =
            rng.gen_range(ALTITUDE_RANGE.0..ALTITUDE_RANGE.1) * tuning.world_height;
        let altitude_timer = rng.gen_range(ALTITUDE_SHIFT_RANGE.0..ALTITUDE_SHIFT_RANGE.1);
        let wander_steer = rng.gen_range(-1.0..1.0);
        let wander_timer = rng.gen_range(WANDER_SHIFT_RANGE.0..WANDER_SHIFT_RANGE.1);
        Self {
            rng,
            seq: 0,
            current: TickInput::neutral(),
            pending: None,
            reaction_timer: 0.0,
            target_altitude,
            altitude_timer,
            wander_steer,
            wander_timer,
        }
    }

    /// Produce this tick's input. Decisions are queued behind the
    /// reaction delay; the committed input repeats until the next
    /// decision lands.
    pub fn decide(&mut self, view: &BotView<'_>, dt: f32) -> TickInput {
        self.advance_idle_timers(view.tuning, dt);
        self.seq = self.seq.wrapping_add(1);

        if !view.kite.alive {
            self.pending = None;
            self.current = TickInput::neutral();
            return TickInput {
                seq: self.seq,
                ..self.current
            };
        }

        match self.pending {
            Some(decision) => {
                self.reaction_timer -= dt;
                if self.reaction_timer <= 0.0 {
                    self.current = decision;
                    self.pending = None;
                }
                // A new decision is rejected while one is pending
            }
            None => {
                let decision = self.evaluate(view);
                self.pending = Some(decision);
                self.reaction_timer =
                    self.rng.gen_range(REACTION_DELAY_RANGE.0..REACTION_DELAY_RANGE.1);
            }
        }

        TickInput {
            seq: self.seq,
            ..self.current
        }
    }

    fn advance_idle_timers(&mut self, tuning: &KiteTuning, dt: f32) {
        self.altitude_timer -= dt;
        if self.altitude_timer <= 0.0 {
            self.target_altitude =
                self.rng.gen_range(ALTITUDE_RANGE.0..ALTITUDE_RANGE.1) * tuning.world_height;
            self.altitude_timer = self
                .rng
                .gen_range(ALTITUDE_SHIFT_RANGE.0..ALTITUDE_SHIFT_RANGE.1);
        }

        self.wander_timer -= dt;
        if self.wander_timer <= 0.0 {
            self.wander_steer = self.rng.gen_range(-1.0..1.0);
            self.wander_timer = self
                .rng
                .gen_range(WANDER_SHIFT_RANGE.0..WANDER_SHIFT_RANGE.1);
        }
    }

    /// Behaviors in strict priority order: duel, pickup-seeking, idle
    fn evaluate(&mut self, view: &BotView<'_>) -> TickInput {
        if let Some(leading) = view.duel_leading {
            return self.duel_decision(leading);
        }
        if let Some(decision) = self.pickup_decision(view) {
            return decision;
        }
        self.idle_decision(view)
    }

    fn duel_decision(&mut self, leading: bool) -> TickInput {
        let pull_chance = if leading {
            DUEL_PULL_CHANCE_LEADING
        } else {
            DUEL_PULL_CHANCE_LOSING
        };
        TickInput::clamped(
            0,
            self.rng.gen_bool(pull_chance),
            self.rng.gen_range(-DUEL_STEER_JITTER..DUEL_STEER_JITTER),
        )
    }

    fn pickup_decision(&mut self, view: &BotView<'_>) -> Option<TickInput> {
        let reach = view.tuning.max_line_length * REACH_FRACTION;
        let mut reachable: Vec<&Pickup> = view
            .pickups
            .iter()
            .filter(|p| {
                p.active && {
                    let dx = p.x - view.anchor.x;
                    let dy = p.y - view.anchor.y;
                    dx * dx + dy * dy <= reach * reach
                }
            })
            .collect();
        if reachable.is_empty() {
            return None;
        }

        reachable.sort_by(|a, b| {
            let da = (a.x - view.kite.x).powi(2) + (a.y - view.kite.y).powi(2);
            let db = (b.x - view.kite.x).powi(2) + (b.y - view.kite.y).powi(2);
            da.total_cmp(&db)
        });

        // Humans don't always chase the nearest one
        let target = if reachable.len() > 1 && self.rng.gen_bool(SECOND_CHOICE_CHANCE) {
            reachable[1]
        } else {
            reachable[0]
        };

        let steer = (target.x - view.kite.x) / STEER_GAIN;
        let pull = target.y > view.kite.y + PICKUP_ABOVE_MARGIN;
        Some(TickInput::clamped(0, pull, steer))
    }

    fn idle_decision(&mut self, view: &BotView<'_>) -> TickInput {
        let near_ceiling = view.kite.y > view.tuning.world_height - CEILING_MARGIN;
        let pull = !near_ceiling && view.kite.y < self.target_altitude - ALTITUDE_DEADBAND;

        let steer = if view.kite.x < EDGE_MARGIN {
            1.0
        } else if view.kite.x > view.tuning.world_width - EDGE_MARGIN {
            -1.0
        } else {
            self.wander_steer
        };

        TickInput::clamped(0, pull, steer)
    }
}

/// Bot pool spawn failures
#[derive(Debug, thiserror::Error)]
pub enum BotSpawnError {
    #[error("match is full")]
    MatchFull,
}

/// Pool and lifecycle manager for bot-controlled players
pub struct BotManager {
    // BTreeMap so per-tick updates run in a stable order
    brains: BTreeMap<Uuid, BotBrain>,
    /// Per-match spawn counter, drives names and brain seeds
    spawn_counter: u64,
    match_seed: u64,
}

impl BotManager {
    pub fn new(match_seed: u64) -> Self {
        Self {
            brains: BTreeMap::new(),
            spawn_counter: 0,
            match_seed,
        }
    }

    /// Whether this player record is bot-controlled
    pub fn is_bot(&self, id: &Uuid) -> bool {
        self.brains.contains_key(id)
    }

    pub fn count(&self) -> usize {
        self.brains.len()
    }

    /// Spawn a bot into the player collection. Fails when the match is
    /// at capacity; otherwise the bot gets a non-colliding name, the
    /// next open anchor slot and an immediate ready flag.
    pub fn spawn(
        &mut self,
        players: &mut BTreeMap<Uuid, PlayerState>,
        max_players: usize,
        tuning: &KiteTuning,
    ) -> Result<Uuid, BotSpawnError> {
        if players.len() >= max_players {
            return Err(BotSpawnError::MatchFull);
        }

        let display_name = loop {
            self.spawn_counter += 1;
            let candidate = format!("Kite_{:02}", self.spawn_counter);
            if !players.values().any(|p| p.display_name == candidate) {
                break candidate;
            }
        };

        let slot = (0..max_players)
            .find(|slot| !players.values().any(|p| p.anchor_slot == *slot))
            .unwrap_or(0);
        let anchor = anchor_for_slot(slot, max_players, tuning);

        // Seed-derived ids keep whole-match replays reproducible
        let user_id = Uuid::from_u64_pair(self.match_seed, self.spawn_counter);
        let mut player = PlayerState::new(user_id, display_name, slot, anchor, tuning);
        player.ready = true;
        players.insert(user_id, player);

        let seed = self
            .match_seed
            .wrapping_add(self.spawn_counter.wrapping_mul(0x9E37_79B9_7F4A_7C15));
        self.brains.insert(user_id, BotBrain::new(seed, tuning));

        Ok(user_id)
    }

    /// Remove a single bot's brain. The player record is the caller's to
    /// clean up.
    pub fn remove(&mut self, id: &Uuid) -> bool {
        self.brains.remove(id).is_some()
    }

    /// Remove every bot, returning their player ids
    pub fn remove_all(&mut self) -> Vec<Uuid> {
        let ids: Vec<Uuid> = self.brains.keys().copied().collect();
        self.brains.clear();
        ids
    }

    /// Build each bot's restricted view and write its input into the
    /// shared per-tick input map.
    pub fn update_all(
        &mut self,
        players: &BTreeMap<Uuid, PlayerState>,
        pickups: &[Pickup],
        duels: &DuelTracker,
        tuning: &KiteTuning,
        inputs: &mut HashMap<Uuid, TickInput>,
        dt: f32,
    ) {
        for (id, brain) in self.brains.iter_mut() {
            let Some(player) = players.get(id) else {
                continue;
            };

            let opponents: Vec<(f32, f32)> = players
                .values()
                .filter(|p| p.user_id != *id && p.connected && p.kite.alive)
                .map(|p| (p.kite.x, p.kite.y))
                .collect();

            let duel_leading = duels
                .involving(*id)
                .map(|(_, duel)| duel.leader == *id);

            let view = BotView {
                kite: player.kite,
                anchor: player.anchor,
                opponents,
                pickups,
                duel_leading,
                tuning,
            };

            inputs.insert(*id, brain.decide(&view, dt));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::time::tick_delta;

    fn tuning() -> KiteTuning {
        KiteTuning::default()
    }

    fn idle_view(tuning: &KiteTuning) -> BotView<'_> {
        let anchor = Anchor { x: 800.0, y: 0.0 };
        BotView {
            kite: Kite::spawned(anchor, tuning),
            anchor,
            opponents: Vec::new(),
            pickups: &[],
            duel_leading: None,
            tuning,
        }
    }

    #[test]
    fn decisions_wait_out_the_reaction_delay() {
        let tuning = tuning();
        let mut brain = BotBrain::new(7, &tuning);
        let view = idle_view(&tuning);
        let dt = tick_delta();

        // Below the minimum reaction delay every emitted input is still
        // the neutral one the brain started with
        let min_ticks = (REACTION_DELAY_RANGE.0 / dt) as usize;
        let mut inputs = Vec::new();
        for _ in 0..min_ticks {
            inputs.push(brain.decide(&view, dt));
        }
        assert!(inputs.iter().all(|i| !i.pull && i.steer == 0.0));

        // Spawn height sits far below the idle target altitude, so once
        // the queued decision commits the bot pulls
        let max_ticks = (REACTION_DELAY_RANGE.1 / dt) as usize + 2;
        let mut committed = false;
        for _ in 0..max_ticks {
            committed |= brain.decide(&view, dt).pull;
        }
        assert!(committed);
    }

    #[test]
    fn sequence_numbers_advance_every_tick() {
        let tuning = tuning();
        let mut brain = BotBrain::new(3, &tuning);
        let view = idle_view(&tuning);

        let a = brain.decide(&view, tick_delta());
        let b = brain.decide(&view, tick_delta());
        assert_eq!(b.seq, a.seq + 1);
    }

    #[test]
    fn dead_bot_emits_neutral_input() {
        let tuning = tuning();
        let mut brain = BotBrain::new(11, &tuning);
        let mut view = idle_view(&tuning);
        view.kite.alive = false;

        for _ in 0..120 {
            let input = brain.decide(&view, tick_delta());
            assert!(!input.pull);
            assert_eq!(input.steer, 0.0);
        }
    }

    #[test]
    fn seeks_reachable_pickup_above() {
        let tuning = tuning();
        let mut brain = BotBrain::new(5, &tuning);
        let anchor = Anchor { x: 800.0, y: 0.0 };
        let kite = Kite::spawned(anchor, &tuning);
        let pickups = [Pickup {
            id: 1,
            x: kite.x + 120.0,
            y: kite.y + 150.0,
            size: 15.0,
            active: true,
            spawned_at: 0.0,
            lifetime: 20.0,
        }];
        let view = BotView {
            kite,
            anchor,
            opponents: Vec::new(),
            pickups: &pickups,
            duel_leading: None,
            tuning: &tuning,
        };

        // Run long enough for the queued decision to commit
        let mut last = TickInput::neutral();
        for _ in 0..60 {
            last = brain.decide(&view, tick_delta());
        }
        assert!(last.pull, "pickup above the kite should trigger a pull");
        assert!(last.steer > 0.0, "pickup to the right should steer right");
    }

    #[test]
    fn spawn_respects_capacity_and_assigns_unique_slots() {
        let tuning = tuning();
        let mut manager = BotManager::new(99);
        let mut players = BTreeMap::new();

        let max = 4;
        for _ in 0..max {
            manager.spawn(&mut players, max, &tuning).unwrap();
        }
        assert!(matches!(
            manager.spawn(&mut players, max, &tuning),
            Err(BotSpawnError::MatchFull)
        ));

        let mut slots: Vec<usize> = players.values().map(|p| p.anchor_slot).collect();
        slots.sort_unstable();
        assert_eq!(slots, vec![0, 1, 2, 3]);

        let names: std::collections::HashSet<_> =
            players.values().map(|p| p.display_name.clone()).collect();
        assert_eq!(names.len(), max);

        for id in players.keys() {
            assert!(manager.is_bot(id));
            assert!(players[id].ready);
        }
    }

    #[test]
    fn update_all_writes_inputs_for_every_bot() {
        let tuning = tuning();
        let mut manager = BotManager::new(123);
        let mut players = BTreeMap::new();
        for _ in 0..3 {
            manager.spawn(&mut players, 6, &tuning).unwrap();
        }

        let duels = DuelTracker::new();
        let mut inputs = HashMap::new();
        manager.update_all(&players, &[], &duels, &tuning, &mut inputs, tick_delta());

        assert_eq!(inputs.len(), 3);
        for id in players.keys() {
            assert!(inputs.contains_key(id));
        }
    }
}
