//! Snapshot assembly for the external relay

use crate::relay::protocol::{
    DuelSnapshot, GameEvent, PickupSnapshot, PlayerSnapshot, RelayMsg, WindState,
};

use super::duel::DuelTracker;
use super::pickup::PickupField;
use super::r#match::PlayerState;
use std::collections::BTreeMap;
use uuid::Uuid;

/// Builds relay snapshots at a fraction of the tick rate. Events are
/// accumulated every tick so nothing is dropped between snapshots.
pub struct SnapshotBuilder {
    /// Tick counter since last snapshot
    ticks_since_snapshot: u32,
    /// Snapshot interval in ticks
    snapshot_interval: u32,
    /// Events queued since the last snapshot went out
    pending_events: Vec<GameEvent>,
}

impl SnapshotBuilder {
    pub fn new(snapshot_interval: u32) -> Self {
        Self {
            ticks_since_snapshot: 0,
            snapshot_interval: snapshot_interval.max(1),
            pending_events: Vec::new(),
        }
    }

    /// Queue this tick's events for the next snapshot
    pub fn queue(&mut self, events: impl IntoIterator<Item = GameEvent>) {
        self.pending_events.extend(events);
    }

    /// Check if it's time to send a snapshot
    pub fn should_send(&mut self) -> bool {
        self.ticks_since_snapshot += 1;
        if self.ticks_since_snapshot >= self.snapshot_interval {
            self.ticks_since_snapshot = 0;
            true
        } else {
            false
        }
    }

    /// Force a snapshot on the next check (round end, cuts)
    pub fn force_next(&mut self) {
        self.ticks_since_snapshot = self.snapshot_interval;
    }

    /// Build a snapshot message. The duel array is derived from the
    /// authoritative duel map here, at serialization time.
    pub fn build(
        &mut self,
        tick: u64,
        wind: &WindState,
        players: &BTreeMap<Uuid, PlayerState>,
        pickups: &PickupField,
        duels: &DuelTracker,
    ) -> RelayMsg {
        let player_snapshots: Vec<PlayerSnapshot> = players
            .values()
            .map(|p| PlayerSnapshot {
                user_id: p.user_id,
                x: p.kite.x,
                y: p.kite.y,
                vel_x: p.kite.vel_x,
                vel_y: p.kite.vel_y,
                angle: p.kite.angle,
                alive: p.kite.alive,
                score: p.score,
                cuts: p.cuts,
                last_input_seq: p.last_input_seq,
            })
            .collect();

        let pickup_snapshots: Vec<PickupSnapshot> = pickups
            .active()
            .iter()
            .map(|p| PickupSnapshot {
                id: p.id,
                x: p.x,
                y: p.y,
                size: p.size,
            })
            .collect();

        let duel_snapshots: Vec<DuelSnapshot> = duels
            .iter()
            .map(|(key, duel)| DuelSnapshot {
                a: key.a(),
                b: key.b(),
                progress: duel.progress,
                leader: duel.leader,
                x: duel.contact_x,
                y: duel.contact_y,
            })
            .collect();

        RelayMsg::Snapshot {
            tick,
            wind: wind.clone(),
            players: player_snapshots,
            pickups: pickup_snapshots,
            duels: duel_snapshots,
            events: std::mem::take(&mut self.pending_events),
        }
    }
}
