//! Kite physics and line-length constraints

use crate::relay::protocol::WindState;
use crate::util::time::BASE_TICK_RATE;

use super::pickup::Pickup;
use super::TickInput;

/// Physics tuning constants, expressed per baseline frame (60 Hz).
/// Prediction must run with the exact same table as the authoritative
/// side or replayed states drift.
#[derive(Debug, Clone, Copy)]
pub struct KiteTuning {
    /// Downward pull per frame
    pub gravity: f32,
    /// Upward impulse per frame while reeling in
    pub pull_impulse: f32,
    /// Amplitude of the bob added to the pull impulse
    pub pull_bob_amp: f32,
    /// Bob frequency in radians per second of game time
    pub pull_bob_freq: f32,
    /// Horizontal impulse per frame at full steer
    pub steer_impulse: f32,
    /// Horizontal force per unit wind speed
    pub wind_force: f32,
    /// Gust strength as a fraction of the base wind force
    pub gust_amp: f32,
    /// Gust frequency in radians per second of game time
    pub gust_freq: f32,
    /// Positional wobble amplitude at full height
    pub wobble_amp: f32,
    /// Wobble frequency in radians per second of game time
    pub wobble_freq: f32,
    /// Velocity retained per frame
    pub damping: f32,
    /// Speed cap in units per frame
    pub max_speed: f32,
    /// Velocity retained when reflecting off a world edge
    pub bounce_damping: f32,
    /// Blend factor easing the visual angle per frame
    pub angle_smooth: f32,
    /// Radians of tilt per unit of horizontal velocity
    pub angle_tilt_scale: f32,
    /// Tilt clamp in radians
    pub max_tilt: f32,
    /// Animation phase advance per frame
    pub anim_rate: f32,
    /// Kite hitbox radius for pickup tests
    pub kite_radius: f32,
    /// Maximum line length from the anchor
    pub max_line_length: f32,
    /// Height a kite spawns at above its anchor
    pub spawn_height: f32,
    /// World bounds
    pub world_width: f32,
    pub world_height: f32,
}

impl Default for KiteTuning {
    fn default() -> Self {
        Self {
            gravity: 0.12,
            pull_impulse: 0.30,
            pull_bob_amp: 0.06,
            pull_bob_freq: 6.0,
            steer_impulse: 0.18,
            wind_force: 0.05,
            gust_amp: 0.4,
            gust_freq: 1.7,
            wobble_amp: 0.35,
            wobble_freq: 3.3,
            damping: 0.985,
            max_speed: 7.0,
            bounce_damping: 0.55,
            angle_smooth: 0.12,
            angle_tilt_scale: 0.12,
            max_tilt: 0.9,
            anim_rate: 0.22,
            kite_radius: 18.0,
            max_line_length: 550.0,
            spawn_height: 140.0,
            world_width: 1600.0,
            world_height: 900.0,
        }
    }
}

/// Fixed ground point a kite's line is tied to
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Anchor {
    pub x: f32,
    pub y: f32,
}

/// Flying object state, owned by its player record
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Kite {
    pub x: f32,
    pub y: f32,
    pub vel_x: f32,
    pub vel_y: f32,
    /// Visual facing angle in radians
    pub angle: f32,
    /// Flutter animation phase
    pub anim_phase: f32,
    pub alive: bool,
}

impl Kite {
    /// Fresh kite hovering above its anchor, used at spawn and respawn
    pub fn spawned(anchor: Anchor, tuning: &KiteTuning) -> Self {
        Self {
            x: anchor.x,
            y: (anchor.y + tuning.spawn_height).min(tuning.world_height),
            vel_x: 0.0,
            vel_y: 0.0,
            angle: 0.0,
            anim_phase: 0.0,
            alive: true,
        }
    }

    pub fn speed(&self) -> f32 {
        (self.vel_x * self.vel_x + self.vel_y * self.vel_y).sqrt()
    }
}

/// Physics system advancing one kite by one timestep
pub struct KitePhysics;

impl KitePhysics {
    /// Advance a kite by `dt` seconds. Pure: no clock reads, no RNG, no
    /// side effects; `game_time` is supplied by the caller so replays
    /// reproduce the authoritative trajectory exactly. Dead kites pass
    /// through unchanged with no pickups.
    #[allow(clippy::too_many_arguments)]
    pub fn step(
        kite: &Kite,
        anchor: Anchor,
        input: &TickInput,
        wind: &WindState,
        pickups: &[Pickup],
        game_time: f32,
        dt: f32,
        tuning: &KiteTuning,
    ) -> (Kite, Vec<u32>) {
        if !kite.alive {
            return (*kite, Vec::new());
        }

        let dtf = dt * BASE_TICK_RATE;
        let steer = input.steer.clamp(-1.0, 1.0);

        let mut vel_x = kite.vel_x;
        let mut vel_y = kite.vel_y;

        vel_y -= tuning.gravity * dtf;

        // Reeling in lifts the kite, with a slight bob keyed on game time
        if input.pull {
            let bob = (game_time * tuning.pull_bob_freq).sin() * tuning.pull_bob_amp;
            vel_y += (tuning.pull_impulse + bob) * dtf;
        }

        vel_x += steer * tuning.steer_impulse * dtf;

        // Wind: base force plus sinusoidal gusting
        let gust = 1.0 + (game_time * tuning.gust_freq).sin() * tuning.gust_amp;
        vel_x += wind.speed * wind.direction * tuning.wind_force * gust * dtf;

        // Damping, then speed clamp
        let damp = tuning.damping.powf(dtf);
        vel_x *= damp;
        vel_y *= damp;

        let speed = (vel_x * vel_x + vel_y * vel_y).sqrt();
        if speed > tuning.max_speed {
            let scale = tuning.max_speed / speed;
            vel_x *= scale;
            vel_y *= scale;
        }

        // Integrate, adding a wind-driven positional wobble that grows
        // with height
        let height_frac = (kite.y / tuning.world_height).clamp(0.0, 1.0);
        let wobble =
            (game_time * tuning.wobble_freq).sin() * tuning.wobble_amp * height_frac * wind.speed;
        let mut x = kite.x + (vel_x + wobble) * dtf;
        let mut y = kite.y + vel_y * dtf;

        // Line length constraint: clamp radially to the anchor and strip
        // the outward velocity component
        let dx = x - anchor.x;
        let dy = y - anchor.y;
        let dist = (dx * dx + dy * dy).sqrt();
        if dist > tuning.max_line_length {
            let scale = tuning.max_line_length / dist;
            x = anchor.x + dx * scale;
            y = anchor.y + dy * scale;

            let nx = dx / dist;
            let ny = dy / dist;
            let outward = vel_x * nx + vel_y * ny;
            if outward > 0.0 {
                vel_x -= outward * nx;
                vel_y -= outward * ny;
            }
        }

        // World bounds, reflecting velocity with damping on each axis
        if x < 0.0 {
            x = 0.0;
            vel_x = -vel_x * tuning.bounce_damping;
        } else if x > tuning.world_width {
            x = tuning.world_width;
            vel_x = -vel_x * tuning.bounce_damping;
        }
        if y < 0.0 {
            y = 0.0;
            vel_y = -vel_y * tuning.bounce_damping;
        } else if y > tuning.world_height {
            y = tuning.world_height;
            vel_y = -vel_y * tuning.bounce_damping;
        }

        // Ease the visual angle toward the drift direction
        let target = (vel_x * tuning.angle_tilt_scale).clamp(-tuning.max_tilt, tuning.max_tilt);
        let blend = (tuning.angle_smooth * dtf).min(1.0);
        let angle = kite.angle + (target - kite.angle) * blend;

        let air_speed = (vel_x * vel_x + vel_y * vel_y).sqrt();
        let anim_phase = (kite.anim_phase + (tuning.anim_rate + air_speed * 0.02) * dtf)
            % std::f32::consts::TAU;

        // Pickup hit tests against the tick's snapshot
        let mut collected = Vec::new();
        for pickup in pickups {
            if !pickup.active {
                continue;
            }
            let pdx = x - pickup.x;
            let pdy = y - pickup.y;
            let reach = tuning.kite_radius + pickup.size;
            if pdx * pdx + pdy * pdy <= reach * reach {
                collected.push(pickup.id);
            }
        }

        let next = Kite {
            x,
            y,
            vel_x,
            vel_y,
            angle,
            anim_phase,
            alive: true,
        };
        (next, collected)
    }
}
