//! Deterministic lockstep engine for a multi-player Life variant on a
//! toroidal grid. Peers exchange per-turn commands only; every peer runs an
//! identical simulation and cross-checks a world checksum each turn.

#![allow(clippy::new_without_default)]

pub mod command;
pub mod field;
pub mod geometry;
pub mod message;
pub mod pattern;
pub mod peer;
pub mod presets;
pub mod random;
