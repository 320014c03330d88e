//! Boundary types consumed and produced by the simulation core

pub mod protocol;
