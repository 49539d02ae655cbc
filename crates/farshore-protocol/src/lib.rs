//! Boundary vocabulary for the Farshore Dominion engine.
//!
//! Everything here is consumed by external collaborators (renderer,
//! persistence, localization) as well as the core crate: typed ids,
//! the hex coordinate system, full-state snapshot records, and
//! victory types. This crate holds no game logic and no mutable
//! state.

mod hex;
mod ids;
mod snapshot;
mod victory;

pub use crate::hex::*;
pub use crate::ids::*;
pub use crate::snapshot::*;
pub use crate::victory::*;
