use std::collections::HashMap;

use farshore_protocol::{
    BeliefId, BuildingId, DataId, PolicyId, PromotionId, ResourceId, TechId, TerrainId,
    UnitTypeId,
};
use serde::Deserialize;

use crate::rules::{loader::CatalogError, Effect, EffectIndex, Requirement};
use crate::yields::Yields;

/// Compiled, immutable rule tables. Built once by `load_catalog`;
/// shared by reference everywhere else.
#[derive(Debug)]
pub struct Catalog {
    pub terrains: Vec<TerrainType>,
    pub unit_types: Vec<UnitType>,
    pub buildings: Vec<BuildingType>,
    pub techs: Vec<Technology>,
    pub policies: Vec<Policy>,
    pub promotions: Vec<Promotion>,
    pub beliefs: Vec<Belief>,
    pub resources: Vec<ResourceKind>,

    pub terrain_ids: HashMap<DataId, TerrainId>,
    pub unit_type_ids: HashMap<DataId, UnitTypeId>,
    pub building_ids: HashMap<DataId, BuildingId>,
    pub tech_ids: HashMap<DataId, TechId>,
    pub policy_ids: HashMap<DataId, PolicyId>,
    pub promotion_ids: HashMap<DataId, PromotionId>,
    pub belief_ids: HashMap<DataId, BeliefId>,
    pub resource_ids: HashMap<DataId, ResourceId>,

    /// Validated topological orders over the prerequisite DAGs,
    /// computed at load. Their existence proves the graphs are
    /// acyclic, which bounds every prerequisite walk.
    pub tech_order: Vec<TechId>,
    pub promotion_order: Vec<PromotionId>,
    pub policy_order: Vec<PolicyId>,

    pub effect_index: EffectIndex,
}

impl Catalog {
    pub fn terrain(&self, id: TerrainId) -> &TerrainType {
        &self.terrains[id.raw as usize]
    }

    pub fn unit_type(&self, id: UnitTypeId) -> &UnitType {
        &self.unit_types[id.raw as usize]
    }

    pub fn building(&self, id: BuildingId) -> &BuildingType {
        &self.buildings[id.raw as usize]
    }

    pub fn tech(&self, id: TechId) -> &Technology {
        &self.techs[id.raw as usize]
    }

    pub fn policy(&self, id: PolicyId) -> &Policy {
        &self.policies[id.raw as usize]
    }

    pub fn promotion(&self, id: PromotionId) -> &Promotion {
        &self.promotions[id.raw as usize]
    }

    pub fn belief(&self, id: BeliefId) -> &Belief {
        &self.beliefs[id.raw as usize]
    }

    pub fn resource(&self, id: ResourceId) -> &ResourceKind {
        &self.resources[id.raw as usize]
    }

    pub fn terrain_id(&self, data_id: &str) -> Option<TerrainId> {
        self.terrain_ids.get(data_id).copied()
    }

    pub fn unit_type_id(&self, data_id: &str) -> Option<UnitTypeId> {
        self.unit_type_ids.get(data_id).copied()
    }

    pub fn building_id(&self, data_id: &str) -> Option<BuildingId> {
        self.building_ids.get(data_id).copied()
    }

    pub fn tech_id(&self, data_id: &str) -> Option<TechId> {
        self.tech_ids.get(data_id).copied()
    }

    pub fn policy_id(&self, data_id: &str) -> Option<PolicyId> {
        self.policy_ids.get(data_id).copied()
    }

    pub fn promotion_id(&self, data_id: &str) -> Option<PromotionId> {
        self.promotion_ids.get(data_id).copied()
    }
}

/// Combat-relevant unit class. Determines attack reach, counterfire
/// and which applicability predicates match.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitCategory {
    Melee,
    Ranged,
    Mounted,
    Siege,
    Recon,
}

#[derive(Debug, Clone)]
pub struct TerrainType {
    /// Stable identifier string, emitted unchanged for localization.
    pub id: DataId,
    pub move_cost: i32,
    pub impassable: bool,
    /// Rough terrain (hills, forest) grants defense and gates the
    /// open/rough applicability predicates.
    pub rough: bool,
    /// Defense bonus in basis points, applied to the defender only.
    pub defense_bonus_bp: i32,
    pub yields: Yields,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawTerrainType {
    #[serde(default = "default_move_cost")]
    pub move_cost: i32,
    #[serde(default)]
    pub impassable: bool,
    #[serde(default)]
    pub rough: bool,
    #[serde(default)]
    pub defense_bonus_bp: i32,
    #[serde(default)]
    pub yields: Yields,
}

fn default_move_cost() -> i32 {
    1
}

impl RawTerrainType {
    pub fn compile(self, id: DataId) -> TerrainType {
        TerrainType {
            id,
            move_cost: self.move_cost.max(1),
            impassable: self.impassable,
            rough: self.rough,
            defense_bonus_bp: self.defense_bonus_bp,
            yields: self.yields,
        }
    }
}

#[derive(Debug, Clone)]
pub struct UnitType {
    pub id: DataId,
    pub category: UnitCategory,
    /// Base combat strength (melee and defense).
    pub strength: i32,
    /// Ranged strength; 0 for units that only fight in melee.
    pub ranged_strength: i32,
    /// Attack reach in tiles for ranged/siege categories.
    pub range: i32,
    pub moves: i32,
    pub cost: i32,
    pub tech_required: Option<TechId>,
    pub can_found_city: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawUnitType {
    pub category: UnitCategory,
    pub strength: i32,
    #[serde(default)]
    pub ranged_strength: i32,
    #[serde(default)]
    pub range: i32,
    pub moves: i32,
    pub cost: i32,
    #[serde(default)]
    pub tech_required: Option<DataId>,
    #[serde(default)]
    pub can_found_city: bool,
}

impl RawUnitType {
    pub fn compile(
        self,
        id: DataId,
        tech_ids: &HashMap<DataId, TechId>,
    ) -> Result<UnitType, CatalogError> {
        let tech_required = resolve_optional(self.tech_required, tech_ids)?;
        Ok(UnitType {
            id,
            category: self.category,
            strength: self.strength.max(0),
            ranged_strength: self.ranged_strength.max(0),
            range: self.range.max(0),
            moves: self.moves.max(1),
            cost: self.cost.max(1),
            tech_required,
            can_found_city: self.can_found_city,
        })
    }
}

#[derive(Debug, Clone)]
pub struct BuildingType {
    pub id: DataId,
    pub cost: i32,
    pub maintenance: i32,
    pub tech_required: Option<TechId>,
    pub effects: Vec<Effect>,
    pub requirements: Vec<Requirement>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawBuildingType {
    pub cost: i32,
    #[serde(default)]
    pub maintenance: i32,
    #[serde(default)]
    pub tech_required: Option<DataId>,
    #[serde(default)]
    pub effects: Vec<Effect>,
    #[serde(default)]
    pub requirements: Vec<Requirement>,
}

impl RawBuildingType {
    pub fn compile(
        self,
        id: DataId,
        tech_ids: &HashMap<DataId, TechId>,
    ) -> Result<BuildingType, CatalogError> {
        let tech_required = resolve_optional(self.tech_required, tech_ids)?;
        Ok(BuildingType {
            id,
            cost: self.cost.max(1),
            maintenance: self.maintenance.max(0),
            tech_required,
            effects: self.effects,
            requirements: self.requirements,
        })
    }
}

#[derive(Debug, Clone)]
pub struct Technology {
    pub id: DataId,
    pub cost: i32,
    pub prerequisites: Vec<TechId>,
    pub effects: Vec<Effect>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawTechnology {
    pub cost: i32,
    #[serde(default)]
    pub prerequisites: Vec<DataId>,
    #[serde(default)]
    pub effects: Vec<Effect>,
}

impl RawTechnology {
    pub fn compile(
        self,
        id: DataId,
        tech_ids: &HashMap<DataId, TechId>,
    ) -> Result<Technology, CatalogError> {
        Ok(Technology {
            id,
            cost: self.cost.max(1),
            prerequisites: resolve_all(self.prerequisites, tech_ids)?,
            effects: self.effects,
        })
    }
}

#[derive(Debug, Clone)]
pub struct Policy {
    pub id: DataId,
    pub culture_cost: i32,
    pub prerequisites: Vec<PolicyId>,
    pub effects: Vec<Effect>,
    pub requirements: Vec<Requirement>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawPolicy {
    pub culture_cost: i32,
    #[serde(default)]
    pub prerequisites: Vec<DataId>,
    #[serde(default)]
    pub effects: Vec<Effect>,
    #[serde(default)]
    pub requirements: Vec<Requirement>,
}

impl RawPolicy {
    pub fn compile(
        self,
        id: DataId,
        policy_ids: &HashMap<DataId, PolicyId>,
    ) -> Result<Policy, CatalogError> {
        Ok(Policy {
            id,
            culture_cost: self.culture_cost.max(1),
            prerequisites: resolve_all(self.prerequisites, policy_ids)?,
            effects: self.effects,
            requirements: self.requirements,
        })
    }
}

#[derive(Debug, Clone)]
pub struct Promotion {
    pub id: DataId,
    /// Prerequisite promotions; a DAG, validated at load.
    pub prerequisites: Vec<PromotionId>,
    pub effects: Vec<Effect>,
    pub requirements: Vec<Requirement>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawPromotion {
    #[serde(default)]
    pub prerequisites: Vec<DataId>,
    #[serde(default)]
    pub effects: Vec<Effect>,
    #[serde(default)]
    pub requirements: Vec<Requirement>,
}

impl RawPromotion {
    pub fn compile(
        self,
        id: DataId,
        promotion_ids: &HashMap<DataId, PromotionId>,
    ) -> Result<Promotion, CatalogError> {
        Ok(Promotion {
            id,
            prerequisites: resolve_all(self.prerequisites, promotion_ids)?,
            effects: self.effects,
            requirements: self.requirements,
        })
    }
}

#[derive(Debug, Clone)]
pub struct Belief {
    pub id: DataId,
    pub faith_cost: i32,
    pub effects: Vec<Effect>,
    pub requirements: Vec<Requirement>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawBelief {
    pub faith_cost: i32,
    #[serde(default)]
    pub effects: Vec<Effect>,
    #[serde(default)]
    pub requirements: Vec<Requirement>,
}

impl RawBelief {
    pub fn compile(self, id: DataId) -> Belief {
        Belief {
            id,
            faith_cost: self.faith_cost.max(1),
            effects: self.effects,
            requirements: self.requirements,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResourceKind {
    pub id: DataId,
    pub yields: Yields,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawResourceKind {
    #[serde(default)]
    pub yields: Yields,
}

impl RawResourceKind {
    pub fn compile(self, id: DataId) -> ResourceKind {
        ResourceKind {
            id,
            yields: self.yields,
        }
    }
}

fn resolve_optional<T: Copy>(
    data_id: Option<DataId>,
    ids: &HashMap<DataId, T>,
) -> Result<Option<T>, CatalogError> {
    match data_id {
        Some(id) => ids
            .get(&id)
            .copied()
            .map(Some)
            .ok_or(CatalogError::DanglingReference(id)),
        None => Ok(None),
    }
}

fn resolve_all<T: Copy>(
    data_ids: Vec<DataId>,
    ids: &HashMap<DataId, T>,
) -> Result<Vec<T>, CatalogError> {
    data_ids
        .into_iter()
        .map(|id| {
            ids.get(&id)
                .copied()
                .ok_or(CatalogError::DanglingReference(id))
        })
        .collect()
}
