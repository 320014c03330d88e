//! Pickup lifecycle: spawning, claims, expiry, respawn

use rand::Rng;
use rand_chacha::ChaCha8Rng;

/// Active pickups never exceed this after the per-tick top-up step
pub const MAX_ACTIVE_PICKUPS: usize = 5;

/// The field is topped up whenever the active count falls below this
pub const MIN_ACTIVE_PICKUPS: usize = 2;

const LIFETIME_RANGE: (f32, f32) = (15.0, 30.0);
const RESPAWN_DELAY_RANGE: (f32, f32) = (4.0, 8.0);
const SIZE_RANGE: (f32, f32) = (12.0, 20.0);
const SPAWN_MARGIN: f32 = 120.0;

/// Sentinel for a queued respawn whose delay has not been rolled yet
const UNROLLED: f32 = f32::INFINITY;

// Pickups spawn in the band of sky kites actually fly in
const SKY_BAND: (f32, f32) = (0.30, 0.85);

/// A floating collectible
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pickup {
    pub id: u32,
    pub x: f32,
    pub y: f32,
    pub size: f32,
    pub active: bool,
    /// Game time the pickup appeared
    pub spawned_at: f32,
    /// Randomized seconds before it despawns on its own
    pub lifetime: f32,
}

/// Authoritative pickup collection for one match
pub struct PickupField {
    pickups: Vec<Pickup>,
    /// Countdown timers for pickups waiting to respawn
    respawn_timers: Vec<f32>,
    /// Per-match id counter
    next_id: u32,
    world_width: f32,
    world_height: f32,
}

impl PickupField {
    pub fn new(world_width: f32, world_height: f32) -> Self {
        Self {
            pickups: Vec::new(),
            respawn_timers: Vec::new(),
            next_id: 0,
            world_width,
            world_height,
        }
    }

    /// All currently active pickups
    pub fn active(&self) -> &[Pickup] {
        &self.pickups
    }

    pub fn active_count(&self) -> usize {
        self.pickups.len()
    }

    /// Claim a pickup by id. Check-then-set: the first claimant this tick
    /// removes it, later claimants get `None`.
    pub fn claim(&mut self, id: u32) -> Option<Pickup> {
        let idx = self.pickups.iter().position(|p| p.id == id)?;
        let mut claimed = self.pickups.swap_remove(idx);
        claimed.active = false;
        self.respawn_timers.push(UNROLLED); // delay rolled on the next tick
        Some(claimed)
    }

    /// Advance lifecycle timers by one tick: fire due respawns, expire
    /// aged-out pickups, then top the field up to the floor.
    pub fn tick(&mut self, dt: f32, game_time: f32, rng: &mut ChaCha8Rng) {
        // Roll fresh delays for newly queued respawns, then count down
        for timer in &mut self.respawn_timers {
            if timer.is_infinite() {
                *timer = rng.gen_range(RESPAWN_DELAY_RANGE.0..RESPAWN_DELAY_RANGE.1);
            }
            *timer -= dt;
        }

        // Fire due respawns. A timer that is due while the field sits at
        // the ceiling holds until a slot frees up.
        let free_slots = MAX_ACTIVE_PICKUPS.saturating_sub(self.pickups.len());
        let mut fired = 0usize;
        self.respawn_timers.retain(|timer| {
            if *timer <= 0.0 && fired < free_slots {
                fired += 1;
                false
            } else {
                true
            }
        });
        for _ in 0..fired {
            self.spawn(game_time, rng);
        }

        // Expire aged-out pickups and queue their respawn
        let respawn_timers = &mut self.respawn_timers;
        self.pickups.retain(|pickup| {
            if game_time - pickup.spawned_at >= pickup.lifetime {
                respawn_timers.push(UNROLLED);
                false
            } else {
                true
            }
        });

        // Top up to the floor
        while self.pickups.len() < MIN_ACTIVE_PICKUPS {
            self.spawn(game_time, rng);
        }

        debug_assert!(self.pickups.len() <= MAX_ACTIVE_PICKUPS);
    }

    fn spawn(&mut self, game_time: f32, rng: &mut ChaCha8Rng) {
        let id = self.next_id;
        self.next_id += 1;

        let x = rng.gen_range(SPAWN_MARGIN..self.world_width - SPAWN_MARGIN);
        let y = rng.gen_range(self.world_height * SKY_BAND.0..self.world_height * SKY_BAND.1);

        self.pickups.push(Pickup {
            id,
            x,
            y,
            size: rng.gen_range(SIZE_RANGE.0..SIZE_RANGE.1),
            active: true,
            spawned_at: game_time,
            lifetime: rng.gen_range(LIFETIME_RANGE.0..LIFETIME_RANGE.1),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn field() -> (PickupField, ChaCha8Rng) {
        (
            PickupField::new(1600.0, 900.0),
            ChaCha8Rng::seed_from_u64(42),
        )
    }

    #[test]
    fn top_up_fills_to_floor_under_ceiling() {
        let (mut field, mut rng) = field();
        field.tick(1.0 / 60.0, 0.0, &mut rng);

        assert!(field.active_count() >= MIN_ACTIVE_PICKUPS);
        assert!(field.active_count() <= MAX_ACTIVE_PICKUPS);
    }

    #[test]
    fn claim_succeeds_exactly_once() {
        let (mut field, mut rng) = field();
        field.tick(1.0 / 60.0, 0.0, &mut rng);

        let id = field.active()[0].id;
        let first = field.claim(id);
        let second = field.claim(id);

        assert!(first.is_some());
        assert!(!first.unwrap().active);
        assert!(second.is_none());
    }

    #[test]
    fn claimed_pickup_respawns_later() {
        let (mut field, mut rng) = field();
        let dt = 1.0 / 60.0;
        field.tick(dt, 0.0, &mut rng);

        let before = field.active_count();
        let id = field.active()[0].id;
        field.claim(id).unwrap();
        assert_eq!(field.active_count(), before - 1);

        // Run past the longest respawn delay; the floor plus the respawn
        // timer restore the field
        let mut game_time = 0.0;
        for _ in 0..((RESPAWN_DELAY_RANGE.1 as u32 + 2) * 60) {
            game_time += dt;
            field.tick(dt, game_time, &mut rng);
        }
        assert!(field.active_count() >= before);
        assert!(field.active_count() <= MAX_ACTIVE_PICKUPS);
    }

    #[test]
    fn expiry_deactivates_and_ceiling_holds() {
        let (mut field, mut rng) = field();
        let dt = 1.0 / 60.0;

        let mut game_time = 0.0;
        let mut seen = std::collections::HashSet::new();
        // Long enough for several lifetimes and respawns to cycle
        for _ in 0..(70 * 60) {
            game_time += dt;
            field.tick(dt, game_time, &mut rng);
            assert!(field.active_count() <= MAX_ACTIVE_PICKUPS);
            for pickup in field.active() {
                assert!(game_time - pickup.spawned_at < pickup.lifetime + dt);
                seen.insert(pickup.id);
            }
        }
        // Ids never recycle, so expiry must have cycled pickups through
        assert!(seen.len() > MAX_ACTIVE_PICKUPS);
    }
}
