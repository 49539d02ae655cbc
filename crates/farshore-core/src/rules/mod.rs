//! The rule catalog: immutable, loaded-once tables of terrains, unit
//! kinds, buildings, technologies, policies, promotions, and beliefs.
//!
//! Catalog entries never change after load; only entities' adoption
//! of them changes. Malformed data (cyclic or dangling prerequisites,
//! unknown references) is rejected here, at load time, so the rest of
//! the engine never has to handle it.

mod effect;
mod loader;
mod types;

pub use effect::{
    CityFacts, CombinePolicy, CompiledRequirement, ContextTag, Effect, EffectContext,
    EffectIndex, EffectSource, IndexedEffect, Modifier, Requirement, TileFacts, UnitFacts,
};
pub use loader::{load_catalog, CatalogError, CatalogSource};
pub use types::{
    Belief, BuildingType, Catalog, Policy, Promotion, ResourceKind, Technology, TerrainType,
    UnitCategory, UnitType,
};
