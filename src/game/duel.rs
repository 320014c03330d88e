//! Duel tracking - progressive tug-of-war over crossed lines

use std::collections::{BTreeMap, HashMap};

use uuid::Uuid;

use crate::relay::protocol::GameEvent;

use super::line::LineGeometry;
use super::r#match::PlayerState;
use super::TickInput;

/// Seconds of sustained contact for an even duel to resolve
pub const DUEL_DURATION: f32 = 4.0;

/// Progress lost per second while the lines are apart
pub const DUEL_DECAY_RATE: f32 = 0.5;

/// How much a strength advantage accelerates progress
pub const DUEL_STRENGTH_SCALE: f32 = 0.25;

/// Flat strength bonus every side gets for holding a line
pub const PULL_STRENGTH_BONUS: f32 = 0.8;

/// Multiplier on the bonus while actively pulling
pub const PULL_ACTIVE_SCALE: f32 = 2.0;

/// Score awarded for cutting an opponent's line
pub const CUT_SCORE_BONUS: u32 = 150;

/// Seconds a cut kite waits before respawning at its anchor
pub const RESPAWN_DELAY: f32 = 3.0;

/// Progress events are throttled to one per this many contact ticks
pub const DUEL_PROGRESS_EVENT_TICKS: u32 = 6;

/// Tie-break when both sides' strengths are exactly equal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TieBreak {
    LowerId,
    HigherId,
}

/// Policy constant: exact ties go to the lower player id
pub const TIE_BREAK: TieBreak = TieBreak::LowerId;

/// Canonical unordered pair key. `a` is always the lower Uuid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct DuelKey {
    a: Uuid,
    b: Uuid,
}

impl DuelKey {
    pub fn new(x: Uuid, y: Uuid) -> Self {
        debug_assert_ne!(x, y);
        if x < y {
            Self { a: x, b: y }
        } else {
            Self { a: y, b: x }
        }
    }

    pub fn a(&self) -> Uuid {
        self.a
    }

    pub fn b(&self) -> Uuid {
        self.b
    }

    pub fn involves(&self, id: Uuid) -> bool {
        self.a == id || self.b == id
    }

    pub fn other(&self, id: Uuid) -> Uuid {
        if self.a == id {
            self.b
        } else {
            self.a
        }
    }
}

/// Live contest state for one pair
#[derive(Debug, Clone)]
pub struct Duel {
    /// Contest progress in [0, 1]
    pub progress: f32,
    /// Side currently winning
    pub leader: Uuid,
    /// Last line contact point
    pub contact_x: f32,
    pub contact_y: f32,
    /// Contact ticks, drives progress-event throttling
    ticks_in_contact: u32,
}

/// Per-pair duel state machine over the whole match
pub struct DuelTracker {
    // Single authoritative keyed collection; relay views are derived by
    // iteration at snapshot time
    duels: BTreeMap<DuelKey, Duel>,
}

impl DuelTracker {
    pub fn new() -> Self {
        Self {
            duels: BTreeMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.duels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.duels.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&DuelKey, &Duel)> {
        self.duels.iter()
    }

    /// First duel this player is part of, if any
    pub fn involving(&self, id: Uuid) -> Option<(&DuelKey, &Duel)> {
        self.duels.iter().find(|(key, _)| key.involves(id))
    }

    /// Drop all transient duel state (round end)
    pub fn clear(&mut self) {
        self.duels.clear();
    }

    /// Evaluate every live pair once, in stable key order. Mutates player
    /// records on resolution and queues outward events; never does I/O.
    pub fn update(
        &mut self,
        players: &mut BTreeMap<Uuid, PlayerState>,
        inputs: &HashMap<Uuid, TickInput>,
        dt: f32,
        events: &mut Vec<GameEvent>,
    ) {
        // Force-remove duels referencing a missing, disconnected or dead
        // player, regardless of progress
        let stale: Vec<DuelKey> = self
            .duels
            .keys()
            .filter(|key| {
                !Self::eligible(players.get(&key.a)) || !Self::eligible(players.get(&key.b))
            })
            .copied()
            .collect();
        for key in stale {
            self.duels.remove(&key);
            events.push(GameEvent::DuelEnd {
                a: key.a,
                b: key.b,
                reason: "participant_lost".to_string(),
            });
        }

        // BTreeMap keys iterate sorted, so pair order is reproducible
        let ids: Vec<Uuid> = players
            .iter()
            .filter(|(_, p)| Self::eligible(Some(p)))
            .map(|(id, _)| *id)
            .collect();

        for i in 0..ids.len() {
            for j in (i + 1)..ids.len() {
                self.evaluate_pair(ids[i], ids[j], players, inputs, dt, events);
            }
        }
    }

    fn eligible(player: Option<&PlayerState>) -> bool {
        player.is_some_and(|p| p.connected && p.kite.alive)
    }

    #[allow(clippy::too_many_arguments)]
    fn evaluate_pair(
        &mut self,
        id_a: Uuid,
        id_b: Uuid,
        players: &mut BTreeMap<Uuid, PlayerState>,
        inputs: &HashMap<Uuid, TickInput>,
        dt: f32,
        events: &mut Vec<GameEvent>,
    ) {
        let key = DuelKey::new(id_a, id_b);

        // A participant may have been cut earlier this tick
        let (Some(pa), Some(pb)) = (players.get(&key.a()), players.get(&key.b())) else {
            return;
        };
        if !pa.kite.alive || !pb.kite.alive {
            return;
        }

        let contact = LineGeometry::check(&pa.kite, pa.anchor, &pb.kite, pb.anchor);

        if !contact.crossing {
            if let Some(duel) = self.duels.get_mut(&key) {
                duel.progress -= dt * DUEL_DECAY_RATE;
                duel.ticks_in_contact = 0;
                if duel.progress <= 0.0 {
                    self.duels.remove(&key);
                    events.push(GameEvent::DuelEnd {
                        a: key.a(),
                        b: key.b(),
                        reason: "separated".to_string(),
                    });
                }
            }
            return;
        }

        let strength_a = Self::strength(pa, inputs);
        let strength_b = Self::strength(pb, inputs);
        let leader = if strength_a > strength_b {
            key.a()
        } else if strength_b > strength_a {
            key.b()
        } else {
            match TIE_BREAK {
                TieBreak::LowerId => key.a(),
                TieBreak::HigherId => key.b(),
            }
        };

        let duel = self.duels.entry(key).or_insert_with(|| {
            events.push(GameEvent::DuelStart {
                a: key.a(),
                b: key.b(),
                x: contact.x,
                y: contact.y,
            });
            Duel {
                progress: 0.0,
                leader,
                contact_x: contact.x,
                contact_y: contact.y,
                ticks_in_contact: 0,
            }
        });

        duel.leader = leader;
        duel.contact_x = contact.x;
        duel.contact_y = contact.y;
        duel.ticks_in_contact += 1;

        let strength_diff = (strength_a - strength_b).abs();
        duel.progress += (dt / DUEL_DURATION) * (1.0 + strength_diff * DUEL_STRENGTH_SCALE);
        duel.progress = duel.progress.min(1.0);
        debug_assert!((0.0..=1.0).contains(&duel.progress));

        if duel.progress >= 1.0 {
            self.duels.remove(&key);
            self.resolve_cut(key, leader, players, events);
        } else if duel.ticks_in_contact % DUEL_PROGRESS_EVENT_TICKS == 0 {
            events.push(GameEvent::DuelProgress {
                a: key.a(),
                b: key.b(),
                progress: duel.progress,
                leader,
            });
        }
    }

    fn strength(player: &PlayerState, inputs: &HashMap<Uuid, TickInput>) -> f32 {
        let pulling = inputs
            .get(&player.user_id)
            .map(|input| input.pull)
            .unwrap_or(false);
        let bonus = if pulling {
            PULL_STRENGTH_BONUS * PULL_ACTIVE_SCALE
        } else {
            PULL_STRENGTH_BONUS
        };
        player.kite.speed() + bonus
    }

    fn resolve_cut(
        &mut self,
        key: DuelKey,
        winner: Uuid,
        players: &mut BTreeMap<Uuid, PlayerState>,
        events: &mut Vec<GameEvent>,
    ) {
        let loser = key.other(winner);

        if let Some(cut) = players.get_mut(&loser) {
            cut.kite.alive = false;
            cut.respawn_timer = Some(RESPAWN_DELAY);
        }
        if let Some(victor) = players.get_mut(&winner) {
            victor.score += CUT_SCORE_BONUS;
            victor.cuts += 1;
        }

        events.push(GameEvent::CutResolved { winner, loser });
        events.push(GameEvent::DuelEnd {
            a: key.a(),
            b: key.b(),
            reason: "resolved".to_string(),
        });
    }
}

impl Default for DuelTracker {
    fn default() -> Self {
        Self::new()
    }
}
