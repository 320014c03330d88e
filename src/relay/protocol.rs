//! Boundary message definitions for the external relay
//! The core never performs network I/O: a transport collaborator feeds
//! `MatchCmd` values into a match's command channel and broadcasts the
//! `RelayMsg` values that come back out.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Match lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchPhase {
    /// Waiting for players
    Waiting,
    /// Countdown before start
    Countdown,
    /// Round in progress, simulation ticking
    Playing,
    /// Round ended, rankings broadcast
    Finished,
}

/// Commands fed into a match by the boundary collaborators
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MatchCmd {
    /// A player joined the match. Joins while the round is already
    /// playing are hot-joins: folded in on the next tick, no countdown.
    Join {
        user_id: Uuid,
        display_name: String,
    },

    /// A player signalled readiness (may carry a corrected name)
    Ready {
        user_id: Uuid,
        display_name: String,
    },

    /// Player input for the current tick
    Input {
        user_id: Uuid,
        /// Sequence number for client-side prediction reconciliation
        seq: u32,
        /// Client send time in unix millis, for transport latency
        /// accounting; opaque to the simulation
        timestamp: u64,
        /// Reel the line in this tick
        pull: bool,
        /// Steering input (-1.0 = full left, 1.0 = full right)
        steer: f32,
    },

    /// A player left. `consented` leaves are purged immediately;
    /// unconsented disconnects are retained for a grace period.
    Leave {
        user_id: Uuid,
        consented: bool,
    },

    /// Spawn one bot-controlled player
    AddBot,

    /// Remove every bot-controlled player
    RemoveBots,
}

/// Messages produced for the external relay to broadcast
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RelayMsg {
    /// Lifecycle phase transition
    PhaseChanged {
        phase: MatchPhase,
    },

    /// Countdown progress, once per whole second
    CountdownTick {
        seconds_remaining: u32,
    },

    /// Player joined the match
    PlayerJoined {
        player: PlayerInfo,
    },

    /// Player left the match
    PlayerLeft {
        user_id: Uuid,
        reason: String,
    },

    /// Game state snapshot (sent at regular intervals)
    Snapshot {
        /// Server tick number
        tick: u64,
        /// Current wind state
        wind: WindState,
        /// All player states
        players: Vec<PlayerSnapshot>,
        /// Active pickups
        pickups: Vec<PickupSnapshot>,
        /// Live duels, derived from the authoritative duel map
        duels: Vec<DuelSnapshot>,
        /// Events that occurred since the last snapshot
        events: Vec<GameEvent>,
    },

    /// Round over, final standings
    MatchOver {
        /// Rankings sorted by score descending
        rankings: Vec<RankingEntry>,
    },

    /// Error message
    Error {
        code: String,
        message: String,
    },
}

/// Player info for lobby/join
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerInfo {
    pub user_id: Uuid,
    pub display_name: String,
    /// Fixed ground anchor, immutable after placement
    pub anchor_x: f32,
    pub anchor_y: f32,
}

/// Wind state shared by every kite in a match
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindState {
    /// Wind strength
    pub speed: f32,
    /// Blowing direction along the x axis (+1.0 or -1.0)
    pub direction: f32,
    /// Seconds until the next re-roll
    pub change_timer: f32,
}

impl Default for WindState {
    fn default() -> Self {
        Self {
            speed: 1.0,
            direction: 1.0,
            change_timer: 8.0,
        }
    }
}

/// Player state in a snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerSnapshot {
    pub user_id: Uuid,
    /// Position X
    pub x: f32,
    /// Position Y (height above ground)
    pub y: f32,
    /// Current velocity X
    pub vel_x: f32,
    /// Current velocity Y
    pub vel_y: f32,
    /// Visual facing angle in radians
    pub angle: f32,
    /// Is the kite flying
    pub alive: bool,
    /// Cumulative score
    pub score: u32,
    /// Lines cut this round
    pub cuts: u32,
    /// Last processed input sequence
    pub last_input_seq: u32,
}

/// Active pickup in a snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PickupSnapshot {
    pub id: u32,
    pub x: f32,
    pub y: f32,
    pub size: f32,
}

/// Live duel in a snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DuelSnapshot {
    pub a: Uuid,
    pub b: Uuid,
    /// Contest progress in [0, 1]
    pub progress: f32,
    /// Side currently winning the tug-of-war
    pub leader: Uuid,
    /// Last line contact point
    pub x: f32,
    pub y: f32,
}

/// Final standing of one player
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankingEntry {
    pub user_id: Uuid,
    pub display_name: String,
    pub score: u32,
    pub cuts: u32,
}

/// Game events (duels, cuts, pickups)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum GameEvent {
    /// A kite collected a pickup
    PickupCollected {
        user_id: Uuid,
        pickup_id: u32,
        x: f32,
        y: f32,
    },

    /// Two lines crossed, a duel began
    DuelStart {
        a: Uuid,
        b: Uuid,
        x: f32,
        y: f32,
    },

    /// Throttled duel progress update
    DuelProgress {
        a: Uuid,
        b: Uuid,
        progress: f32,
        leader: Uuid,
    },

    /// Duel removed from tracking
    DuelEnd {
        a: Uuid,
        b: Uuid,
        /// "resolved", "separated", "participant_lost"
        reason: String,
    },

    /// A duel resolved into a cut
    CutResolved {
        winner: Uuid,
        loser: Uuid,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_use_snake_case_tags() {
        let cmd = MatchCmd::Input {
            user_id: Uuid::nil(),
            seq: 3,
            timestamp: 1700000000000,
            pull: true,
            steer: -0.5,
        };
        let json = serde_json::to_string(&cmd).unwrap();
        assert!(json.contains("\"type\":\"input\""));

        let back: MatchCmd = serde_json::from_str(&json).unwrap();
        assert!(matches!(back, MatchCmd::Input { seq: 3, pull: true, .. }));
    }

    #[test]
    fn events_round_trip_through_json() {
        let event = GameEvent::CutResolved {
            winner: Uuid::from_bytes([1; 16]),
            loser: Uuid::from_bytes([2; 16]),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"event_type\":\"cut_resolved\""));

        let back: GameEvent = serde_json::from_str(&json).unwrap();
        assert!(matches!(back, GameEvent::CutResolved { .. }));
    }

    #[test]
    fn phase_serializes_to_snake_case() {
        let json = serde_json::to_string(&MatchPhase::Playing).unwrap();
        assert_eq!(json, "\"playing\"");
    }
}
