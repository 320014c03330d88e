//! Authoritative simulation core for multiplayer kite-fighting duels.
//!
//! Each match runs one fixed-rate tick loop that advances kite physics,
//! detects line crossings, resolves duels into cuts, manages pickups and
//! drives bot opponents. Transport, rendering and persistence live in
//! external collaborators: they feed sanitized commands into a match's
//! channel and broadcast the relay messages that come back out.

pub mod config;
pub mod game;
pub mod relay;
pub mod util;
