//! Full-state export records for the persistence layer.
//!
//! The engine's obligation at this boundary is round-trip fidelity:
//! exporting a world and importing the result must reproduce an
//! identical simulation state. Integrity hashing, atomic file
//! replacement, and autosave scheduling belong to the persistence
//! collaborator, not here.

use serde::{Deserialize, Serialize};

use crate::{
    BeliefId, BuildingId, CityId, CivId, Hex, PolicyId, PromotionId, ResourceId, TechId,
    TerrainId, UnitId, UnitTypeId, VictorySettings,
};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorldSnapshot {
    pub turn: u32,
    pub phase: PhaseSnapshot,
    pub map: MapSnapshot,
    pub civs: Vec<CivSnapshot>,
    pub units: Vec<UnitSnapshot>,
    pub cities: Vec<CitySnapshot>,
    #[serde(default)]
    pub victory: VictorySettings,
    /// Seat that owns spawned barbarian units, when the game has one.
    #[serde(default)]
    pub barbarians: Option<CivId>,
    /// PRNG state so stochastic rules replay identically after import.
    pub rng_state: [u8; 32],
}

/// Turn-coordinator phase at the moment of export. Saves are only
/// taken at end-of-turn boundaries, so in practice this is always an
/// `AwaitingActions` for the first civ or `GameOver`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PhaseSnapshot {
    AwaitingActions { civ: CivId },
    ResolvingAi { civ: CivId },
    GameOver { winner: Option<CivId> },
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MapSnapshot {
    pub width: u32,
    pub height: u32,
    pub wrap_horizontal: bool,
    /// Row-major, `width * height` entries.
    pub tiles: Vec<TileSnapshot>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TileSnapshot {
    pub terrain: TerrainId,
    #[serde(default)]
    pub resource: Option<ResourceId>,
    #[serde(default)]
    pub owner: Option<CivId>,
    #[serde(default)]
    pub city: Option<CityId>,
    #[serde(default)]
    pub occupants: Vec<UnitId>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CivSnapshot {
    pub id: CivId,
    pub name: String,
    pub is_ai: bool,
    #[serde(default)]
    pub established: bool,
    pub gold: i32,
    pub culture: i32,
    pub faith: i32,
    pub happiness: i32,
    #[serde(default)]
    pub techs: Vec<TechId>,
    #[serde(default)]
    pub researching: Option<ResearchSnapshot>,
    #[serde(default)]
    pub policies: Vec<PolicyId>,
    #[serde(default)]
    pub beliefs: Vec<BeliefId>,
    #[serde(default)]
    pub relations: Vec<(CivId, i32)>,
    #[serde(default)]
    pub at_war_with: Vec<CivId>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ResearchSnapshot {
    pub tech: TechId,
    pub progress: i32,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UnitSnapshot {
    pub id: UnitId,
    pub kind: UnitTypeId,
    pub owner: CivId,
    pub position: Hex,
    pub health: i32,
    pub moves_left: i32,
    pub attacks_left: i32,
    pub fortified: bool,
    pub experience: i32,
    #[serde(default)]
    pub promotions: Vec<PromotionId>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CitySnapshot {
    pub id: CityId,
    pub name: String,
    pub owner: CivId,
    pub position: Hex,
    pub population: u8,
    pub health: i32,
    pub capturable: bool,
    pub food_stockpile: i32,
    pub production_stockpile: i32,
    #[serde(default)]
    pub buildings: Vec<BuildingId>,
    #[serde(default)]
    pub production_queue: Vec<ProductionItem>,
    #[serde(default)]
    pub garrison: Option<UnitId>,
}

/// One buildable entry in a city's ordered production queue.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ProductionItem {
    Unit { kind: UnitTypeId, progress: i32 },
    Building { building: BuildingId, progress: i32 },
}
