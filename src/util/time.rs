//! Time utilities for game simulation

/// Tick rate configuration
pub const SIMULATION_TPS: u32 = 60; // 60 ticks per second
pub const SNAPSHOT_TPS: u32 = 20; // 20 snapshots per second
pub const TICK_DURATION_MICROS: u64 = 1_000_000 / SIMULATION_TPS as u64;

/// Baseline rate the physics constants are tuned against. `KitePhysics`
/// rescales `dt` by this so the tuning stays valid if the effective tick
/// duration ever differs from the simulation rate.
pub const BASE_TICK_RATE: f32 = 60.0;

/// Calculate delta time for physics (in seconds)
pub fn tick_delta() -> f32 {
    1.0 / SIMULATION_TPS as f32
}
