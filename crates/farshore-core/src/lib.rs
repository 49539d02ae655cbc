//! Deterministic simulation core for Farshore Dominion.
//!
//! The crate owns the full rules of the game: the hex map, the
//! immutable rule catalog and its data-driven effect system, the
//! entity arenas, deterministic combat, and the turn coordinator.
//! Everything observable is a pure function of the initial seed, the
//! catalog, and the sequence of accepted actions; anything stochastic
//! draws from the world's own PRNG so exports replay identically.

pub mod arena;
pub mod city;
pub mod civ;
pub mod combat;
pub mod map;
pub mod rng;
pub mod rules;
pub mod turn;
pub mod unit;
pub mod world;
pub mod yields;

pub use arena::Arena;
pub use city::City;
pub use civ::{Civilization, Research};
pub use map::{GameMap, Tile};
pub use rng::WorldRng;
pub use turn::{Phase, TurnEvent};
pub use unit::Unit;
pub use world::{ActionError, AutosaveHook, ImportError, ProductionOrder, World};
pub use yields::{YieldKind, Yields};
