//! Modifier resolution: the data-driven effect system.
//!
//! Every catalog entry (technology, policy, promotion, belief,
//! building) may carry effects gated by applicability predicates.
//! Resolution is a pure function of an entity snapshot, the catalog,
//! and a context tag; it has no mutable state.
//!
//! Percentage values use basis points throughout: 10000 = 100%.
//! Additive effects of the same kind sum their basis points before a
//! single multiplicative application, so three +1500 bp bonuses give
//! x1.45, never x1.15 cubed.

use std::collections::BTreeSet;

use farshore_protocol::{
    BeliefId, BuildingId, PolicyId, PromotionId, TechId, TerrainId, UnitTypeId,
};
use serde::Deserialize;

use crate::rules::{Catalog, UnitCategory};
use crate::yields::{YieldKind, Yields};

/// The situations a modifier query can target.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ContextTag {
    CombatAttack,
    CombatDefend,
    Production,
    Growth,
    Research,
    Happiness,
    Gold,
}

/// How multiple active effects of one kind combine. Declared once per
/// effect kind and applied uniformly by the resolver.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CombinePolicy {
    /// Flat values and basis points each sum.
    Additive,
    /// Presence from any source suffices; extra sources are ignored.
    BoolOr,
    /// The largest declared value wins; sources never stack.
    MaxTake,
}

/// Effect payloads carried by catalog entries.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum Effect {
    /// Combat strength when attacking (basis points).
    AttackStrengthBp { value_bp: i32 },
    /// Combat strength when defending (basis points).
    DefenseStrengthBp { value_bp: i32 },
    /// Combat strength in both roles (basis points).
    CombatStrengthBp { value_bp: i32 },
    /// Extra defense for a city (basis points, defender only).
    CityDefenseBp { value_bp: i32 },

    /// Flat per-turn yield (food, production, gold, science,
    /// culture, faith).
    YieldBonus { kind: YieldKind, value: i32 },
    /// Percentage modifier on a yield accumulator (basis points).
    YieldPercentBp { kind: YieldKind, value_bp: i32 },
    /// Percentage modifier on city growth (basis points).
    GrowthRateBp { value_bp: i32 },
    /// Percentage modifier on research output (basis points).
    ResearchRateBp { value_bp: i32 },
    /// Flat happiness for the owning civilization.
    HappinessBonus { value: i32 },

    /// The unit may attack once more this turn.
    ExtraAttack,
    /// The unit heals after acting ("march").
    HealAfterAction,
    /// Healing per turn while idle; sources do not stack.
    HealingRate { value: i32 },
}

impl Effect {
    pub fn combine_policy(&self) -> CombinePolicy {
        match self {
            Effect::AttackStrengthBp { .. }
            | Effect::DefenseStrengthBp { .. }
            | Effect::CombatStrengthBp { .. }
            | Effect::CityDefenseBp { .. }
            | Effect::YieldBonus { .. }
            | Effect::YieldPercentBp { .. }
            | Effect::GrowthRateBp { .. }
            | Effect::ResearchRateBp { .. }
            | Effect::HappinessBonus { .. } => CombinePolicy::Additive,
            Effect::ExtraAttack | Effect::HealAfterAction => CombinePolicy::BoolOr,
            Effect::HealingRate { .. } => CombinePolicy::MaxTake,
        }
    }

    /// Contexts this effect contributes to.
    fn applies_to(&self, tag: ContextTag) -> bool {
        match self {
            Effect::AttackStrengthBp { .. } => tag == ContextTag::CombatAttack,
            Effect::DefenseStrengthBp { .. } | Effect::CityDefenseBp { .. } => {
                tag == ContextTag::CombatDefend
            }
            Effect::CombatStrengthBp { .. } => {
                matches!(tag, ContextTag::CombatAttack | ContextTag::CombatDefend)
            }
            Effect::ExtraAttack | Effect::HealAfterAction | Effect::HealingRate { .. } => {
                tag == ContextTag::CombatAttack
            }
            Effect::YieldBonus { kind, .. } | Effect::YieldPercentBp { kind, .. } => {
                yield_context(*kind) == Some(tag)
            }
            Effect::GrowthRateBp { .. } => tag == ContextTag::Growth,
            Effect::ResearchRateBp { .. } => tag == ContextTag::Research,
            Effect::HappinessBonus { .. } => tag == ContextTag::Happiness,
        }
    }
}

fn yield_context(kind: YieldKind) -> Option<ContextTag> {
    match kind {
        YieldKind::Food => Some(ContextTag::Growth),
        YieldKind::Production => Some(ContextTag::Production),
        YieldKind::Gold => Some(ContextTag::Gold),
        YieldKind::Science => Some(ContextTag::Research),
        // Culture and faith accrue directly from flat yields; they
        // have no percentage context of their own.
        YieldKind::Culture | YieldKind::Faith => None,
    }
}

/// Applicability predicates, as written in catalog YAML.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum Requirement {
    Always,
    Never,
    HasTech { tech: String },
    HasPolicy { policy: String },
    HasBelief { belief: String },
    CityHasBuilding { building: String },
    CityMinPopulation { value: u8 },
    UnitCategoryIs { category: UnitCategory },
    UnitTypeIs { unit_type: String },
    OnTerrain { terrain: String },
    OnRoughTerrain,
    OnOpenTerrain,
    AdjacentFriendlyUnit,
    Garrisoned,
    AtWar,
    Not { requirement: Box<Requirement> },
    AllOf { requirements: Vec<Requirement> },
    AnyOf { requirements: Vec<Requirement> },
}

/// Predicates with ids resolved at load for fast evaluation.
#[derive(Debug, Clone)]
pub enum CompiledRequirement {
    Always,
    Never,
    HasTech(TechId),
    HasPolicy(PolicyId),
    HasBelief(BeliefId),
    CityHasBuilding(BuildingId),
    CityMinPopulation(u8),
    UnitCategoryIs(UnitCategory),
    UnitTypeIs(UnitTypeId),
    OnTerrain(TerrainId),
    OnRoughTerrain,
    OnOpenTerrain,
    AdjacentFriendlyUnit,
    Garrisoned,
    AtWar,
    Not(Box<CompiledRequirement>),
    AllOf(Vec<CompiledRequirement>),
    AnyOf(Vec<CompiledRequirement>),
}

/// Immutable facts about the subject of a modifier query.
#[derive(Debug, Clone)]
pub struct EffectContext<'a> {
    pub techs: &'a BTreeSet<TechId>,
    pub policies: &'a BTreeSet<PolicyId>,
    pub beliefs: &'a BTreeSet<BeliefId>,
    pub at_war: bool,
    pub city: Option<CityFacts<'a>>,
    pub unit: Option<UnitFacts<'a>>,
    pub tile: Option<TileFacts>,
}

#[derive(Debug, Clone)]
pub struct CityFacts<'a> {
    pub population: u8,
    pub buildings: &'a [BuildingId],
    pub garrisoned: bool,
}

#[derive(Debug, Clone)]
pub struct UnitFacts<'a> {
    pub kind: UnitTypeId,
    pub category: UnitCategory,
    pub promotions: &'a BTreeSet<PromotionId>,
}

#[derive(Debug, Clone, Copy)]
pub struct TileFacts {
    pub terrain: TerrainId,
    pub rough: bool,
    pub adjacent_friendly: bool,
}

impl EffectContext<'_> {
    pub fn satisfies(&self, req: &CompiledRequirement) -> bool {
        match req {
            CompiledRequirement::Always => true,
            CompiledRequirement::Never => false,
            CompiledRequirement::HasTech(id) => self.techs.contains(id),
            CompiledRequirement::HasPolicy(id) => self.policies.contains(id),
            CompiledRequirement::HasBelief(id) => self.beliefs.contains(id),
            CompiledRequirement::CityHasBuilding(id) => self
                .city
                .as_ref()
                .is_some_and(|c| c.buildings.contains(id)),
            CompiledRequirement::CityMinPopulation(min) => {
                self.city.as_ref().is_some_and(|c| c.population >= *min)
            }
            CompiledRequirement::UnitCategoryIs(category) => {
                self.unit.as_ref().is_some_and(|u| u.category == *category)
            }
            CompiledRequirement::UnitTypeIs(kind) => {
                self.unit.as_ref().is_some_and(|u| u.kind == *kind)
            }
            CompiledRequirement::OnTerrain(terrain) => {
                self.tile.is_some_and(|t| t.terrain == *terrain)
            }
            CompiledRequirement::OnRoughTerrain => self.tile.is_some_and(|t| t.rough),
            CompiledRequirement::OnOpenTerrain => self.tile.is_some_and(|t| !t.rough),
            CompiledRequirement::AdjacentFriendlyUnit => {
                self.tile.is_some_and(|t| t.adjacent_friendly)
            }
            CompiledRequirement::Garrisoned => {
                self.city.as_ref().is_some_and(|c| c.garrisoned)
            }
            CompiledRequirement::AtWar => self.at_war,
            CompiledRequirement::Not(inner) => !self.satisfies(inner),
            CompiledRequirement::AllOf(reqs) => reqs.iter().all(|r| self.satisfies(r)),
            CompiledRequirement::AnyOf(reqs) => reqs.iter().any(|r| self.satisfies(r)),
        }
    }
}

/// Which catalog entry an indexed effect came from. The source also
/// acts as the adoption gate: a policy's effects are inert unless the
/// civilization has adopted that policy, and so on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EffectSource {
    Technology(TechId),
    Policy(PolicyId),
    Promotion(PromotionId),
    Belief(BeliefId),
    Building(BuildingId),
}

#[derive(Debug, Clone)]
pub struct IndexedEffect {
    pub source: EffectSource,
    pub effect: Effect,
    pub requirements: Vec<CompiledRequirement>,
}

impl IndexedEffect {
    pub fn is_active(&self, ctx: &EffectContext) -> bool {
        self.source_adopted(ctx) && self.requirements.iter().all(|r| ctx.satisfies(r))
    }

    fn source_adopted(&self, ctx: &EffectContext) -> bool {
        match self.source {
            EffectSource::Technology(id) => ctx.techs.contains(&id),
            EffectSource::Policy(id) => ctx.policies.contains(&id),
            EffectSource::Belief(id) => ctx.beliefs.contains(&id),
            EffectSource::Promotion(id) => self
                .contextual_promotions(ctx)
                .is_some_and(|promotions| promotions.contains(&id)),
            EffectSource::Building(id) => ctx
                .city
                .as_ref()
                .is_some_and(|c| c.buildings.contains(&id)),
        }
    }

    fn contextual_promotions<'a>(
        &self,
        ctx: &'a EffectContext,
    ) -> Option<&'a BTreeSet<PromotionId>> {
        ctx.unit.as_ref().map(|u| u.promotions)
    }
}

/// Net result of a modifier query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Modifier {
    /// Summed flat bonus.
    pub flat: i32,
    /// Summed percentage bonus in basis points; apply once.
    pub percent_bp: i32,
    pub extra_attack: bool,
    pub heal_after_action: bool,
    pub healing_rate: i32,
}

impl Modifier {
    /// Apply the percentage part to a base value, once.
    pub fn scale(&self, base: i32) -> i32 {
        base * (10_000 + self.percent_bp) / 10_000
    }
}

/// Load-time index over every effect in the catalog. Grouping by
/// broad bucket keeps per-query scans proportional to the effects
/// that could possibly match.
#[derive(Debug, Default)]
pub struct EffectIndex {
    combat: Vec<IndexedEffect>,
    economy: Vec<IndexedEffect>,
}

impl EffectIndex {
    pub fn build(catalog: &Catalog) -> Self {
        let mut index = EffectIndex::default();

        for (raw, tech) in catalog.techs.iter().enumerate() {
            let source = EffectSource::Technology(TechId::new(raw as u16));
            index.add_all(source, &tech.effects, &[], catalog);
        }
        for (raw, policy) in catalog.policies.iter().enumerate() {
            let source = EffectSource::Policy(PolicyId::new(raw as u16));
            index.add_all(source, &policy.effects, &policy.requirements, catalog);
        }
        for (raw, promotion) in catalog.promotions.iter().enumerate() {
            let source = EffectSource::Promotion(PromotionId::new(raw as u16));
            index.add_all(source, &promotion.effects, &promotion.requirements, catalog);
        }
        for (raw, belief) in catalog.beliefs.iter().enumerate() {
            let source = EffectSource::Belief(BeliefId::new(raw as u16));
            index.add_all(source, &belief.effects, &belief.requirements, catalog);
        }
        for (raw, building) in catalog.buildings.iter().enumerate() {
            let source = EffectSource::Building(BuildingId::new(raw as u16));
            index.add_all(source, &building.effects, &building.requirements, catalog);
        }

        index
    }

    fn add_all(
        &mut self,
        source: EffectSource,
        effects: &[Effect],
        requirements: &[Requirement],
        catalog: &Catalog,
    ) {
        for effect in effects {
            let indexed = IndexedEffect {
                source,
                effect: effect.clone(),
                requirements: compile_requirements(requirements, catalog),
            };
            match effect {
                Effect::AttackStrengthBp { .. }
                | Effect::DefenseStrengthBp { .. }
                | Effect::CombatStrengthBp { .. }
                | Effect::CityDefenseBp { .. }
                | Effect::ExtraAttack
                | Effect::HealAfterAction
                | Effect::HealingRate { .. } => self.combat.push(indexed),
                _ => self.economy.push(indexed),
            }
        }
    }

    fn bucket(&self, tag: ContextTag) -> &[IndexedEffect] {
        match tag {
            ContextTag::CombatAttack | ContextTag::CombatDefend => &self.combat,
            _ => &self.economy,
        }
    }

    /// The net modifier for a subject in a given context. Pure;
    /// consults only the snapshot in `ctx`.
    pub fn net_modifier(&self, ctx: &EffectContext, tag: ContextTag) -> Modifier {
        let mut out = Modifier::default();
        for indexed in self.bucket(tag) {
            if !indexed.effect.applies_to(tag) || !indexed.is_active(ctx) {
                continue;
            }
            match (&indexed.effect, indexed.effect.combine_policy()) {
                (effect, CombinePolicy::Additive) => match effect {
                    Effect::AttackStrengthBp { value_bp }
                    | Effect::DefenseStrengthBp { value_bp }
                    | Effect::CombatStrengthBp { value_bp }
                    | Effect::CityDefenseBp { value_bp }
                    | Effect::YieldPercentBp { value_bp, .. }
                    | Effect::GrowthRateBp { value_bp }
                    | Effect::ResearchRateBp { value_bp } => out.percent_bp += value_bp,
                    Effect::YieldBonus { value, .. } | Effect::HappinessBonus { value } => {
                        out.flat += value
                    }
                    _ => {}
                },
                (Effect::ExtraAttack, CombinePolicy::BoolOr) => out.extra_attack = true,
                (Effect::HealAfterAction, CombinePolicy::BoolOr) => {
                    out.heal_after_action = true
                }
                (Effect::HealingRate { value }, CombinePolicy::MaxTake) => {
                    out.healing_rate = out.healing_rate.max(*value)
                }
                _ => {}
            }
        }
        out
    }

    /// Sum of all active flat yield bonuses, for city yield totals.
    pub fn flat_yields(&self, ctx: &EffectContext) -> Yields {
        let mut out = Yields::default();
        for indexed in &self.economy {
            if let Effect::YieldBonus { kind, value } = indexed.effect {
                if indexed.is_active(ctx) {
                    *out.get_mut(kind) += value;
                }
            }
        }
        out
    }
}

pub(crate) fn compile_requirements(
    requirements: &[Requirement],
    catalog: &Catalog,
) -> Vec<CompiledRequirement> {
    requirements
        .iter()
        .map(|r| compile_requirement(r, catalog))
        .collect()
}

/// Unknown references inside predicates compile to `Never`: the
/// entry goes inert rather than erroring at use time. Structural
/// catalog references (prerequisites, tech gates) are still hard
/// errors in the loader.
fn compile_requirement(req: &Requirement, catalog: &Catalog) -> CompiledRequirement {
    match req {
        Requirement::Always => CompiledRequirement::Always,
        Requirement::Never => CompiledRequirement::Never,
        Requirement::HasTech { tech } => catalog
            .tech_id(tech)
            .map_or(CompiledRequirement::Never, CompiledRequirement::HasTech),
        Requirement::HasPolicy { policy } => catalog
            .policy_id(policy)
            .map_or(CompiledRequirement::Never, CompiledRequirement::HasPolicy),
        Requirement::HasBelief { belief } => catalog
            .belief_ids
            .get(belief)
            .copied()
            .map_or(CompiledRequirement::Never, CompiledRequirement::HasBelief),
        Requirement::CityHasBuilding { building } => catalog.building_id(building).map_or(
            CompiledRequirement::Never,
            CompiledRequirement::CityHasBuilding,
        ),
        Requirement::CityMinPopulation { value } => {
            CompiledRequirement::CityMinPopulation(*value)
        }
        Requirement::UnitCategoryIs { category } => {
            CompiledRequirement::UnitCategoryIs(*category)
        }
        Requirement::UnitTypeIs { unit_type } => catalog
            .unit_type_id(unit_type)
            .map_or(CompiledRequirement::Never, CompiledRequirement::UnitTypeIs),
        Requirement::OnTerrain { terrain } => catalog
            .terrain_id(terrain)
            .map_or(CompiledRequirement::Never, CompiledRequirement::OnTerrain),
        Requirement::OnRoughTerrain => CompiledRequirement::OnRoughTerrain,
        Requirement::OnOpenTerrain => CompiledRequirement::OnOpenTerrain,
        Requirement::AdjacentFriendlyUnit => CompiledRequirement::AdjacentFriendlyUnit,
        Requirement::Garrisoned => CompiledRequirement::Garrisoned,
        Requirement::AtWar => CompiledRequirement::AtWar,
        Requirement::Not { requirement } => {
            CompiledRequirement::Not(Box::new(compile_requirement(requirement, catalog)))
        }
        Requirement::AllOf { requirements } => {
            CompiledRequirement::AllOf(compile_requirements(requirements, catalog))
        }
        Requirement::AnyOf { requirements } => {
            CompiledRequirement::AnyOf(compile_requirements(requirements, catalog))
        }
    }
}
