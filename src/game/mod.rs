//! Game simulation modules

pub mod bot;
pub mod duel;
pub mod kite;
pub mod line;
pub mod r#match;
pub mod pickup;
pub mod prediction;
pub mod snapshot;

pub use r#match::{GameMatch, MatchHandle, MatchRegistry, PlayerState};

/// Input state for a single tick, clamped at the boundary
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TickInput {
    pub seq: u32,
    pub pull: bool,
    pub steer: f32,
}

impl TickInput {
    /// Coerce raw boundary values into the valid input range
    pub fn clamped(seq: u32, pull: bool, steer: f32) -> Self {
        let steer = if steer.is_finite() { steer.clamp(-1.0, 1.0) } else { 0.0 };
        Self { seq, pull, steer }
    }

    /// Neutral input used when a player has sent nothing this tick
    pub fn neutral() -> Self {
        Self::default()
    }
}
