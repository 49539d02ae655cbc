use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use farshore_protocol::{
    BuildingId, CityId, CivId, CivSnapshot, Hex, MapSnapshot, ProductionItem, ResearchSnapshot,
    TileSnapshot, UnitId, UnitSnapshot, UnitTypeId, VictorySettings, WorldSnapshot,
};

use crate::{
    arena::Arena,
    city::City,
    civ::{Civilization, Research},
    combat::{
        self, city_strength, effective_strength, resolve_melee, resolve_ranged, XP_MELEE_ATTACK,
        XP_MELEE_DEFEND, XP_RANGED_ATTACK,
    },
    map::{GameMap, Tile},
    rng::WorldRng,
    rules::{Catalog, CityFacts, ContextTag, EffectContext, Modifier, TileFacts, UnitCategory,
        UnitFacts},
    turn::Phase,
    unit::Unit,
};

/// Founding is refused this close to an existing city.
const MIN_CITY_SPACING: i32 = 2;
/// Health a city recovers to when it changes hands.
const CAPTURED_CITY_HEALTH: i32 = 25;
/// Relations penalty for a declaration of war.
const WAR_RELATIONS_PENALTY: i32 = -50;

/// A player action the rules refused. Every variant leaves the world
/// untouched; actions are validated in full before any mutation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ActionError {
    #[error("it is not that civilization's turn")]
    NotYourTurn,
    #[error("the game is over")]
    GameOver,
    #[error("no such unit")]
    UnknownUnit,
    #[error("no such city")]
    UnknownCity,
    #[error("entity belongs to another civilization")]
    NotOwner,
    #[error("unknown catalog id: {0}")]
    UnknownCatalogId(String),
    #[error("tile is off the map")]
    OffMap,
    #[error("tiles are not adjacent")]
    NotAdjacent,
    #[error("target out of range")]
    OutOfRange,
    #[error("no line of sight to target")]
    NoLineOfSight,
    #[error("no movement points left")]
    NoMovesLeft,
    #[error("no attacks left this turn")]
    NoAttacksLeft,
    #[error("terrain is impassable")]
    Impassable,
    #[error("destination is blocked")]
    DestinationBlocked,
    #[error("no valid target on that tile")]
    NoTarget,
    #[error("unit cannot found a city")]
    CannotFoundCity,
    #[error("too close to an existing city")]
    TooCloseToCity,
    #[error("tile belongs to another civilization")]
    ForeignTerritory,
    #[error("prerequisite not satisfied")]
    PrerequisiteMissing,
    #[error("already owned")]
    AlreadyOwned,
    #[error("not enough culture")]
    InsufficientCulture,
    #[error("no promotion slot available")]
    NoPromotionSlot,
    #[error("city is not capturable")]
    CityNotCapturable,
    #[error("unit cannot capture cities")]
    CannotCapture,
}

/// Failures while rebuilding a world from an exported snapshot.
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("snapshot decode error: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("corrupt state: {0}")]
    StateCorruption(String),
}

/// What to start building in a city.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductionOrder {
    Unit(UnitTypeId),
    Building(BuildingId),
}

/// Callback fired after each completed end-of-turn pass, so the
/// persistence layer can schedule saves at the only boundary where
/// the state is guaranteed fully resolved.
pub type AutosaveHook = Box<dyn FnMut(&WorldSnapshot) + Send>;

pub struct World {
    pub catalog: Catalog,
    pub map: GameMap,
    pub civs: Vec<Civilization>,
    pub units: Arena<Unit>,
    pub cities: Arena<City>,
    pub turn: u32,
    pub phase: Phase,
    pub rng: WorldRng,
    pub victory: VictorySettings,
    /// Seat that owns spawned barbarian units. Excluded from victory
    /// conditions; must be an AI seat in `civs`.
    pub barbarians: Option<CivId>,
    autosave: Option<AutosaveHook>,
}

impl fmt::Debug for World {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("World")
            .field("turn", &self.turn)
            .field("phase", &self.phase)
            .field("civs", &self.civs.len())
            .field("units", &self.units.len())
            .field("cities", &self.cities.len())
            .finish_non_exhaustive()
    }
}

impl World {
    pub fn new(
        catalog: Catalog,
        map: GameMap,
        civs: Vec<Civilization>,
        seed: u64,
        victory: VictorySettings,
    ) -> Self {
        assert!(!civs.is_empty(), "a world needs at least one civilization");
        let first = civs[0].id;
        Self {
            catalog,
            map,
            civs,
            units: Arena::default(),
            cities: Arena::default(),
            turn: 1,
            phase: Phase::AwaitingActions { civ: first },
            rng: WorldRng::seed_from_u64(seed),
            victory,
            barbarians: None,
            autosave: None,
        }
    }

    /// Register the end-of-turn save callback. The hook receives the
    /// freshly exported snapshot once per completed turn cycle.
    pub fn set_autosave_hook(&mut self, hook: impl FnMut(&WorldSnapshot) + Send + 'static) {
        self.autosave = Some(Box::new(hook));
    }

    pub fn clear_autosave_hook(&mut self) {
        self.autosave = None;
    }

    pub(crate) fn fire_autosave(&mut self) {
        if let Some(mut hook) = self.autosave.take() {
            debug!(turn = self.turn, "autosave hook");
            hook(&self.export());
            self.autosave = Some(hook);
        }
    }

    pub fn civ(&self, id: CivId) -> &Civilization {
        &self.civs[id.0 as usize]
    }

    pub fn civ_mut(&mut self, id: CivId) -> &mut Civilization {
        &mut self.civs[id.0 as usize]
    }

    /// Place a unit directly, bypassing production. Used by scenario
    /// setup and by completed builds.
    pub fn spawn_unit(&mut self, owner: CivId, kind: UnitTypeId, position: Hex) -> Option<UnitId> {
        let position = self.map.normalize_hex(position)?;
        let moves = self.catalog.unit_type(kind).moves;
        let id = self.units.insert(Unit::new(kind, owner, position, moves));
        self.map.place_unit(position, id);
        self.refresh_garrison(position);
        self.civ_mut(owner).established = true;
        Some(id)
    }

    // ---- actions ------------------------------------------------------

    pub fn found_city(
        &mut self,
        civ: CivId,
        unit_id: UnitId,
        name: String,
    ) -> Result<CityId, ActionError> {
        self.require_turn(civ)?;
        let unit = self.owned_unit(civ, unit_id)?;
        if !self.catalog.unit_type(unit.kind).can_found_city {
            return Err(ActionError::CannotFoundCity);
        }
        if unit.moves_left <= 0 {
            return Err(ActionError::NoMovesLeft);
        }
        let position = unit.position;
        let tile = self.map.get(position).ok_or(ActionError::OffMap)?;
        if tile.owner.is_some_and(|o| o != civ) {
            return Err(ActionError::ForeignTerritory);
        }
        let too_close = self.cities.iter().any(|(_, c)| {
            self.map
                .distance(c.position, position)
                .is_some_and(|d| d <= MIN_CITY_SPACING)
        });
        if too_close {
            return Err(ActionError::TooCloseToCity);
        }

        // The settler is consumed.
        self.units.remove(unit_id);
        self.map.displace_unit(position, unit_id);

        let city_id = self.cities.insert(City::new(name.clone(), position, civ));
        for index in self.map.indices_in_range(position, 1) {
            let hex = self.map.hex_at_index(index).expect("index in bounds");
            let tile = self.map.get_mut(hex).expect("index in bounds");
            if tile.owner.is_none() {
                tile.owner = Some(civ);
            }
        }
        let tile = self.map.get_mut(position).expect("validated above");
        tile.city = Some(city_id);

        info!(city = %name, ?position, civ = civ.0, "city founded");
        Ok(city_id)
    }

    pub fn move_unit(&mut self, civ: CivId, unit_id: UnitId, to: Hex) -> Result<(), ActionError> {
        self.require_turn(civ)?;
        let unit = self.owned_unit(civ, unit_id)?;
        let from = unit.position;
        if unit.moves_left <= 0 {
            return Err(ActionError::NoMovesLeft);
        }
        let to = self.map.normalize_hex(to).ok_or(ActionError::OffMap)?;
        if !self.map.is_adjacent(from, to) {
            return Err(ActionError::NotAdjacent);
        }
        let cost = self
            .map
            .step_cost(from, to, &self.catalog)
            .ok_or(ActionError::Impassable)?;

        let dest = self.map.get(to).ok_or(ActionError::OffMap)?;
        let enemy_present = dest
            .occupants
            .iter()
            .filter_map(|&id| self.units.get(id))
            .any(|u| u.owner != civ);
        let enemy_city = dest
            .city
            .and_then(|id| self.cities.get(id))
            .is_some_and(|c| c.owner != civ);
        if enemy_present || enemy_city {
            return Err(ActionError::DestinationBlocked);
        }

        let unit = self.units.get_mut(unit_id).expect("validated above");
        unit.position = to;
        unit.moves_left = (unit.moves_left - cost).max(0);
        unit.break_fortification();
        self.map.displace_unit(from, unit_id);
        self.map.place_unit(to, unit_id);
        self.refresh_garrison(from);
        self.refresh_garrison(to);
        Ok(())
    }

    /// Melee attack against whatever stands on the adjacent tile.
    /// Both sides deal damage; the attacker advances if it cleared
    /// the tile.
    pub fn attack(&mut self, civ: CivId, attacker_id: UnitId, target: Hex) -> Result<(), ActionError> {
        self.require_turn(civ)?;
        let attacker = self.owned_unit(civ, attacker_id)?;
        if attacker.attacks_left <= 0 {
            return Err(ActionError::NoAttacksLeft);
        }
        let from = attacker.position;
        let target = self.map.normalize_hex(target).ok_or(ActionError::OffMap)?;
        if !self.map.is_adjacent(from, target) {
            return Err(ActionError::NotAdjacent);
        }

        let attack_strength = {
            let attacker = self.units.get(attacker_id).expect("validated above");
            let base = self.catalog.unit_type(attacker.kind).strength;
            let modifier = self.unit_modifier(attacker, ContextTag::CombatAttack);
            effective_strength(base, attacker.health, modifier)
        };

        if let Some(defender_id) = self.enemy_unit_at(civ, target) {
            self.declare_war_if_needed(civ, self.units.get(defender_id).expect("present").owner);

            let defense_strength = self.defender_strength(defender_id, target);
            let outcome = resolve_melee(attack_strength, defense_strength);
            debug!(
                attacker = ?attacker_id,
                defender = ?defender_id,
                attack_strength,
                defense_strength,
                ?outcome,
                "melee exchange"
            );

            let (attacker_died, defender_died) = {
                let (attacker, defender) = self
                    .units
                    .get2_mut(attacker_id, defender_id)
                    .expect("distinct and present");
                defender.experience += XP_MELEE_DEFEND;
                let defender_died = defender.apply_damage(outcome.damage_to_defender);
                attacker.experience += XP_MELEE_ATTACK;
                attacker.attacks_left -= 1;
                attacker.moves_left = 0;
                attacker.break_fortification();
                let attacker_died = attacker.apply_damage(outcome.damage_to_attacker);
                (attacker_died, defender_died)
            };

            if defender_died {
                self.remove_unit(defender_id, target);
            }
            if attacker_died {
                self.remove_unit(attacker_id, from);
            } else if defender_died && self.tile_is_enterable(civ, target) {
                let attacker = self.units.get_mut(attacker_id).expect("survived");
                attacker.position = target;
                self.map.displace_unit(from, attacker_id);
                self.map.place_unit(target, attacker_id);
                self.refresh_garrison(from);
                self.refresh_garrison(target);
            }
            self.apply_post_combat_healing(attacker_id);
            return Ok(());
        }

        if let Some(city_id) = self.enemy_city_at(civ, target) {
            let owner = self.cities.get(city_id).expect("present").owner;
            self.declare_war_if_needed(civ, owner);

            let defense_strength = self.city_defense_strength(city_id);
            let damage = combat::strike_damage(attack_strength, defense_strength);
            let counter = combat::strike_damage(defense_strength, attack_strength);
            debug!(?city_id, attack_strength, defense_strength, damage, counter, "city assault");

            let city = self.cities.get_mut(city_id).expect("present");
            city.apply_damage(damage);

            let attacker_died = {
                let attacker = self.units.get_mut(attacker_id).expect("present");
                attacker.experience += XP_MELEE_ATTACK;
                attacker.attacks_left -= 1;
                attacker.moves_left = 0;
                attacker.break_fortification();
                attacker.apply_damage(counter)
            };
            if attacker_died {
                self.remove_unit(attacker_id, from);
            } else {
                self.apply_post_combat_healing(attacker_id);
            }
            return Ok(());
        }

        Err(ActionError::NoTarget)
    }

    /// Ranged fire: one-way damage, no advance, no counterattack.
    pub fn ranged_attack(
        &mut self,
        civ: CivId,
        attacker_id: UnitId,
        target: Hex,
    ) -> Result<(), ActionError> {
        self.require_turn(civ)?;
        let attacker = self.owned_unit(civ, attacker_id)?;
        let kind = self.catalog.unit_type(attacker.kind);
        if kind.ranged_strength <= 0 || kind.range <= 0 {
            return Err(ActionError::NoTarget);
        }
        if attacker.attacks_left <= 0 {
            return Err(ActionError::NoAttacksLeft);
        }
        let from = attacker.position;
        let target = self.map.normalize_hex(target).ok_or(ActionError::OffMap)?;
        let distance = self.map.distance(from, target).ok_or(ActionError::OffMap)?;
        if distance > kind.range {
            return Err(ActionError::OutOfRange);
        }
        if distance > 1 && !self.map.line_of_sight(from, target, &self.catalog) {
            return Err(ActionError::NoLineOfSight);
        }

        let attack_strength = {
            let attacker = self.units.get(attacker_id).expect("validated above");
            let modifier = self.unit_modifier(attacker, ContextTag::CombatAttack);
            effective_strength(kind.ranged_strength, attacker.health, modifier)
        };

        if let Some(defender_id) = self.enemy_unit_at(civ, target) {
            self.declare_war_if_needed(civ, self.units.get(defender_id).expect("present").owner);
            let defense_strength = self.defender_strength(defender_id, target);
            let damage = resolve_ranged(attack_strength, defense_strength);
            debug!(?attacker_id, ?defender_id, damage, "ranged strike");

            let died = self
                .units
                .get_mut(defender_id)
                .expect("present")
                .apply_damage(damage);
            if died {
                self.remove_unit(defender_id, target);
            }
        } else if let Some(city_id) = self.enemy_city_at(civ, target) {
            let owner = self.cities.get(city_id).expect("present").owner;
            self.declare_war_if_needed(civ, owner);
            let defense_strength = self.city_defense_strength(city_id);
            let damage = resolve_ranged(attack_strength, defense_strength);
            self.cities
                .get_mut(city_id)
                .expect("present")
                .apply_damage(damage);
        } else {
            return Err(ActionError::NoTarget);
        }

        let attacker = self.units.get_mut(attacker_id).expect("present");
        attacker.experience += XP_RANGED_ATTACK;
        attacker.attacks_left -= 1;
        attacker.break_fortification();
        self.apply_post_combat_healing(attacker_id);
        Ok(())
    }

    /// Occupy a city beaten down to zero health. Ownership transfers
    /// only here; bombardment alone never flips a city.
    pub fn capture_city(
        &mut self,
        civ: CivId,
        unit_id: UnitId,
        city_hex: Hex,
    ) -> Result<(), ActionError> {
        self.require_turn(civ)?;
        let unit = self.owned_unit(civ, unit_id)?;
        if unit.moves_left <= 0 {
            return Err(ActionError::NoMovesLeft);
        }
        let category = self.catalog.unit_type(unit.kind).category;
        if matches!(category, UnitCategory::Ranged | UnitCategory::Siege) {
            return Err(ActionError::CannotCapture);
        }
        let from = unit.position;
        let city_hex = self.map.normalize_hex(city_hex).ok_or(ActionError::OffMap)?;
        if !self.map.is_adjacent(from, city_hex) {
            return Err(ActionError::NotAdjacent);
        }
        let city_id = self.enemy_city_at(civ, city_hex).ok_or(ActionError::NoTarget)?;
        {
            let city = self.cities.get(city_id).expect("present");
            if !city.is_capturable() {
                return Err(ActionError::CityNotCapturable);
            }
        }
        // Defenders still standing on the tile must fall first.
        if self.enemy_unit_at(civ, city_hex).is_some() {
            return Err(ActionError::DestinationBlocked);
        }

        let old_owner = {
            let city = self.cities.get_mut(city_id).expect("present");
            let old = city.owner;
            city.owner = civ;
            city.health = CAPTURED_CITY_HEALTH;
            city.population = city.population.saturating_sub(1).max(1);
            city.production_queue.clear();
            city.garrison = None;
            old
        };
        let position = self.cities.get(city_id).expect("present").position;
        for index in self.map.indices_in_range(position, 1) {
            let hex = self.map.hex_at_index(index).expect("index in bounds");
            let tile = self.map.get_mut(hex).expect("index in bounds");
            if tile.owner == Some(old_owner) {
                tile.owner = Some(civ);
            }
        }

        let unit = self.units.get_mut(unit_id).expect("validated above");
        unit.position = city_hex;
        unit.moves_left = 0;
        unit.break_fortification();
        self.map.displace_unit(from, unit_id);
        self.map.place_unit(city_hex, unit_id);
        self.refresh_garrison(from);
        self.refresh_garrison(city_hex);

        info!(?city_id, from = old_owner.0, to = civ.0, "city captured");
        Ok(())
    }

    pub fn set_research(&mut self, civ: CivId, tech: &str) -> Result<(), ActionError> {
        self.require_turn(civ)?;
        let tech_id = self
            .catalog
            .tech_id(tech)
            .ok_or_else(|| ActionError::UnknownCatalogId(tech.to_string()))?;
        let civ_state = self.civ(civ);
        if civ_state.has_tech(tech_id) {
            return Err(ActionError::AlreadyOwned);
        }
        if !civ_state.can_research(tech_id, &self.catalog) {
            return Err(ActionError::PrerequisiteMissing);
        }
        self.civ_mut(civ).researching = Some(Research {
            tech: tech_id,
            progress: 0,
        });
        Ok(())
    }

    pub fn adopt_policy(&mut self, civ: CivId, policy: &str) -> Result<(), ActionError> {
        self.require_turn(civ)?;
        let policy_id = self
            .catalog
            .policy_id(policy)
            .ok_or_else(|| ActionError::UnknownCatalogId(policy.to_string()))?;
        let civ_state = self.civ(civ);
        if civ_state.policies.contains(&policy_id) {
            return Err(ActionError::AlreadyOwned);
        }
        let cost = self.catalog.policy(policy_id).culture_cost;
        if civ_state.culture < cost {
            return Err(ActionError::InsufficientCulture);
        }
        if !self
            .catalog
            .policy(policy_id)
            .prerequisites
            .iter()
            .all(|p| civ_state.policies.contains(p))
        {
            return Err(ActionError::PrerequisiteMissing);
        }
        let civ_state = self.civ_mut(civ);
        civ_state.culture -= cost;
        civ_state.policies.insert(policy_id);
        Ok(())
    }

    pub fn acquire_promotion(
        &mut self,
        civ: CivId,
        unit_id: UnitId,
        promotion: &str,
    ) -> Result<(), ActionError> {
        self.require_turn(civ)?;
        let promotion_id = self
            .catalog
            .promotion_id(promotion)
            .ok_or_else(|| ActionError::UnknownCatalogId(promotion.to_string()))?;
        let unit = self.owned_unit(civ, unit_id)?;
        if unit.promotions.contains(&promotion_id) {
            return Err(ActionError::AlreadyOwned);
        }
        if unit.promotion_slots() == 0 {
            return Err(ActionError::NoPromotionSlot);
        }
        let prereqs = &self.catalog.promotion(promotion_id).prerequisites;
        if !prereqs.iter().all(|p| unit.promotions.contains(p)) {
            return Err(ActionError::PrerequisiteMissing);
        }
        self.units
            .get_mut(unit_id)
            .expect("validated above")
            .promotions
            .insert(promotion_id);
        Ok(())
    }

    pub fn queue_production(
        &mut self,
        civ: CivId,
        city_id: CityId,
        order: ProductionOrder,
    ) -> Result<(), ActionError> {
        self.require_turn(civ)?;
        let city = self.owned_city(civ, city_id)?;
        let item = match order {
            ProductionOrder::Unit(kind) => {
                let unit_type = self.catalog.unit_type(kind);
                if let Some(tech) = unit_type.tech_required {
                    if !self.civ(civ).has_tech(tech) {
                        return Err(ActionError::PrerequisiteMissing);
                    }
                }
                ProductionItem::Unit { kind, progress: 0 }
            }
            ProductionOrder::Building(building) => {
                if city.buildings.contains(&building) {
                    return Err(ActionError::AlreadyOwned);
                }
                let queued = city.production_queue.iter().any(|item| {
                    matches!(item, ProductionItem::Building { building: b, .. } if *b == building)
                });
                if queued {
                    return Err(ActionError::AlreadyOwned);
                }
                if let Some(tech) = self.catalog.building(building).tech_required {
                    if !self.civ(civ).has_tech(tech) {
                        return Err(ActionError::PrerequisiteMissing);
                    }
                }
                ProductionItem::Building {
                    building,
                    progress: 0,
                }
            }
        };
        self.cities
            .get_mut(city_id)
            .expect("validated above")
            .production_queue
            .push(item);
        Ok(())
    }

    pub fn fortify(&mut self, civ: CivId, unit_id: UnitId) -> Result<(), ActionError> {
        self.require_turn(civ)?;
        self.owned_unit(civ, unit_id)?;
        self.units.get_mut(unit_id).expect("validated above").fortify();
        Ok(())
    }

    // ---- modifier plumbing --------------------------------------------

    /// Net modifier for a unit in one context, from the effect index.
    pub fn unit_modifier(&self, unit: &Unit, tag: ContextTag) -> Modifier {
        let civ = self.civ(unit.owner);
        let tile = self.map.get(unit.position);
        let tile_facts = tile.map(|t| TileFacts {
            terrain: t.terrain,
            rough: self.catalog.terrain(t.terrain).rough,
            adjacent_friendly: self.has_adjacent_friendly(unit),
        });
        let ctx = EffectContext {
            techs: &civ.techs,
            policies: &civ.policies,
            beliefs: &civ.beliefs,
            at_war: civ.is_at_war(),
            city: None,
            unit: Some(UnitFacts {
                kind: unit.kind,
                category: self.catalog.unit_type(unit.kind).category,
                promotions: &unit.promotions,
            }),
            tile: tile_facts,
        };
        self.catalog.effect_index.net_modifier(&ctx, tag)
    }

    /// Net modifier for a city in one context.
    pub fn city_modifier(&self, city: &City, tag: ContextTag) -> Modifier {
        let ctx = self.city_context(city);
        self.catalog.effect_index.net_modifier(&ctx, tag)
    }

    pub(crate) fn city_context<'a>(&'a self, city: &'a City) -> EffectContext<'a> {
        let civ = self.civ(city.owner);
        EffectContext {
            techs: &civ.techs,
            policies: &civ.policies,
            beliefs: &civ.beliefs,
            at_war: civ.is_at_war(),
            city: Some(CityFacts {
                population: city.population,
                buildings: &city.buildings,
                garrisoned: city.garrison.is_some(),
            }),
            unit: None,
            tile: None,
        }
    }

    /// Defender strength including terrain, fortification and the
    /// defender's own modifiers. Terrain never helps the attacker.
    fn defender_strength(&self, defender_id: UnitId, at: Hex) -> i32 {
        let defender = self.units.get(defender_id).expect("caller validated");
        let base = self.catalog.unit_type(defender.kind).strength;
        let mut modifier = self.unit_modifier(defender, ContextTag::CombatDefend);
        if let Some(tile) = self.map.get(at) {
            modifier.percent_bp += self.catalog.terrain(tile.terrain).defense_bonus_bp;
        }
        if defender.fortified {
            modifier.percent_bp += 2_500;
        }
        effective_strength(base, defender.health, modifier)
    }

    fn city_defense_strength(&self, city_id: CityId) -> i32 {
        let city = self.cities.get(city_id).expect("caller validated");
        let garrison_strength = city
            .garrison
            .and_then(|id| self.units.get(id))
            .map(|u| self.catalog.unit_type(u.kind).strength);
        let mut modifier = self.city_modifier(city, ContextTag::CombatDefend);
        if let Some(tile) = self.map.get(city.position) {
            modifier.percent_bp += self.catalog.terrain(tile.terrain).defense_bonus_bp;
        }
        city_strength(city.population, garrison_strength, modifier)
    }

    // ---- internals ----------------------------------------------------

    pub(crate) fn require_turn(&self, civ: CivId) -> Result<(), ActionError> {
        match self.phase {
            Phase::AwaitingActions { civ: current } | Phase::ResolvingAi { civ: current }
                if current == civ =>
            {
                Ok(())
            }
            Phase::GameOver { .. } => Err(ActionError::GameOver),
            _ => Err(ActionError::NotYourTurn),
        }
    }

    fn owned_unit(&self, civ: CivId, id: UnitId) -> Result<&Unit, ActionError> {
        let unit = self.units.get(id).ok_or(ActionError::UnknownUnit)?;
        if unit.owner != civ {
            return Err(ActionError::NotOwner);
        }
        Ok(unit)
    }

    fn owned_city(&self, civ: CivId, id: CityId) -> Result<&City, ActionError> {
        let city = self.cities.get(id).ok_or(ActionError::UnknownCity)?;
        if city.owner != civ {
            return Err(ActionError::NotOwner);
        }
        Ok(city)
    }

    fn enemy_unit_at(&self, civ: CivId, hex: Hex) -> Option<UnitId> {
        let tile = self.map.get(hex)?;
        tile.occupants
            .iter()
            .copied()
            .find(|&id| self.units.get(id).is_some_and(|u| u.owner != civ))
    }

    fn enemy_city_at(&self, civ: CivId, hex: Hex) -> Option<CityId> {
        let tile = self.map.get(hex)?;
        let city_id = tile.city?;
        (self.cities.get(city_id)?.owner != civ).then_some(city_id)
    }

    fn tile_is_enterable(&self, civ: CivId, hex: Hex) -> bool {
        let Some(tile) = self.map.get(hex) else {
            return false;
        };
        let hostile_city = tile
            .city
            .and_then(|id| self.cities.get(id))
            .is_some_and(|c| c.owner != civ);
        !hostile_city && self.enemy_unit_at(civ, hex).is_none()
    }

    fn has_adjacent_friendly(&self, unit: &Unit) -> bool {
        self.map.neighbors(unit.position).any(|hex| {
            self.map
                .get(hex)
                .map(|t| {
                    t.occupants
                        .iter()
                        .filter_map(|&id| self.units.get(id))
                        .any(|u| u.owner == unit.owner)
                })
                .unwrap_or(false)
        })
    }

    pub(crate) fn remove_unit(&mut self, id: UnitId, at: Hex) {
        self.units.remove(id);
        self.map.displace_unit(at, id);
        self.refresh_garrison(at);
    }

    /// Keep a city's garrison pointing at a live friendly unit on its
    /// tile, or at nothing.
    fn refresh_garrison(&mut self, hex: Hex) {
        let Some(tile) = self.map.get(hex) else {
            return;
        };
        let Some(city_id) = tile.city else {
            return;
        };
        let Some(city) = self.cities.get(city_id) else {
            return;
        };
        let owner = city.owner;
        let garrison = tile
            .occupants
            .iter()
            .copied()
            .find(|&id| self.units.get(id).is_some_and(|u| u.owner == owner));
        if let Some(city) = self.cities.get_mut(city_id) {
            city.garrison = garrison;
        }
    }

    fn declare_war_if_needed(&mut self, a: CivId, b: CivId) {
        if a == b || self.civ(a).is_at_war_with(b) {
            return;
        }
        info!(aggressor = a.0, target = b.0, "war declared");
        self.civ_mut(a).at_war_with.insert(b);
        self.civ_mut(b).at_war_with.insert(a);
        *self.civ_mut(a).relations.entry(b).or_insert(0) += WAR_RELATIONS_PENALTY;
        *self.civ_mut(b).relations.entry(a).or_insert(0) += WAR_RELATIONS_PENALTY;
    }

    fn apply_post_combat_healing(&mut self, id: UnitId) {
        let Some(unit) = self.units.get(id) else {
            return;
        };
        let modifier = self.unit_modifier(unit, ContextTag::CombatAttack);
        if modifier.heal_after_action {
            let rate = modifier.healing_rate.max(5);
            self.units.get_mut(id).expect("checked above").heal(rate);
        }
    }

    // ---- snapshots ----------------------------------------------------

    pub fn export(&self) -> WorldSnapshot {
        WorldSnapshot {
            turn: self.turn,
            phase: self.phase.to_snapshot(),
            map: MapSnapshot {
                width: self.map.width(),
                height: self.map.height(),
                wrap_horizontal: self.map.wrap_horizontal(),
                tiles: self
                    .map
                    .tiles()
                    .iter()
                    .map(|t| TileSnapshot {
                        terrain: t.terrain,
                        resource: t.resource,
                        owner: t.owner,
                        city: t.city,
                        occupants: t.occupants.clone(),
                    })
                    .collect(),
            },
            civs: self
                .civs
                .iter()
                .map(|c| CivSnapshot {
                    id: c.id,
                    name: c.name.clone(),
                    is_ai: c.is_ai,
                    established: c.established,
                    gold: c.gold,
                    culture: c.culture,
                    faith: c.faith,
                    happiness: c.happiness,
                    techs: c.techs.iter().copied().collect(),
                    researching: c.researching.map(|r| ResearchSnapshot {
                        tech: r.tech,
                        progress: r.progress,
                    }),
                    policies: c.policies.iter().copied().collect(),
                    beliefs: c.beliefs.iter().copied().collect(),
                    relations: c.relations.iter().map(|(&id, &v)| (id, v)).collect(),
                    at_war_with: c.at_war_with.iter().copied().collect(),
                })
                .collect(),
            units: self
                .units
                .iter()
                .map(|(id, u)| UnitSnapshot {
                    id,
                    kind: u.kind,
                    owner: u.owner,
                    position: u.position,
                    health: u.health,
                    moves_left: u.moves_left,
                    attacks_left: u.attacks_left,
                    fortified: u.fortified,
                    experience: u.experience,
                    promotions: u.promotions.iter().copied().collect(),
                })
                .collect(),
            cities: self
                .cities
                .iter()
                .map(|(id, c)| farshore_protocol::CitySnapshot {
                    id,
                    name: c.name.clone(),
                    owner: c.owner,
                    position: c.position,
                    population: c.population,
                    health: c.health,
                    capturable: c.is_capturable(),
                    food_stockpile: c.food_stockpile,
                    production_stockpile: c.production_stockpile,
                    buildings: c.buildings.clone(),
                    production_queue: c.production_queue.clone(),
                    garrison: c.garrison,
                })
                .collect(),
            victory: self.victory,
            barbarians: self.barbarians,
            rng_state: self.rng.state_bytes(),
        }
    }

    pub fn export_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.export())
    }

    pub fn import(catalog: Catalog, snapshot: WorldSnapshot) -> Result<Self, ImportError> {
        let expected = (snapshot.map.width as usize) * (snapshot.map.height as usize);
        if snapshot.map.tiles.len() != expected {
            return Err(ImportError::StateCorruption(format!(
                "map has {} tiles, expected {expected}",
                snapshot.map.tiles.len()
            )));
        }

        let tiles = snapshot
            .map
            .tiles
            .iter()
            .map(|t| {
                check_catalog_ref(t.terrain.raw, catalog.terrains.len(), "terrain")?;
                if let Some(resource) = t.resource {
                    check_catalog_ref(resource.raw, catalog.resources.len(), "resource")?;
                }
                Ok(Tile {
                    terrain: t.terrain,
                    resource: t.resource,
                    owner: t.owner,
                    city: t.city,
                    occupants: t.occupants.clone(),
                })
            })
            .collect::<Result<Vec<_>, ImportError>>()?;
        let map = GameMap::from_tiles(
            snapshot.map.width,
            snapshot.map.height,
            snapshot.map.wrap_horizontal,
            tiles,
        );

        let civ_count = snapshot.civs.len();
        let civs = snapshot
            .civs
            .into_iter()
            .enumerate()
            .map(|(index, c)| {
                if c.id.0 as usize != index {
                    return Err(ImportError::StateCorruption(format!(
                        "civ {} out of order at position {index}",
                        c.id.0
                    )));
                }
                for tech in &c.techs {
                    check_catalog_ref(tech.raw, catalog.techs.len(), "technology")?;
                }
                if let Some(r) = &c.researching {
                    check_catalog_ref(r.tech.raw, catalog.techs.len(), "technology")?;
                }
                for policy in &c.policies {
                    check_catalog_ref(policy.raw, catalog.policies.len(), "policy")?;
                }
                for belief in &c.beliefs {
                    check_catalog_ref(belief.raw, catalog.beliefs.len(), "belief")?;
                }
                Ok(Civilization {
                    id: c.id,
                    name: c.name,
                    is_ai: c.is_ai,
                    established: c.established,
                    gold: c.gold,
                    culture: c.culture,
                    faith: c.faith,
                    happiness: c.happiness,
                    techs: c.techs.into_iter().collect(),
                    researching: c.researching.map(|r| Research {
                        tech: r.tech,
                        progress: r.progress,
                    }),
                    policies: c.policies.into_iter().collect(),
                    beliefs: c.beliefs.into_iter().collect(),
                    relations: c.relations.into_iter().collect(),
                    at_war_with: c.at_war_with.into_iter().collect(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let unit_entries = snapshot
            .units
            .into_iter()
            .map(|u| {
                if !(0..=100).contains(&u.health) {
                    return Err(ImportError::StateCorruption(format!(
                        "unit health {} out of range",
                        u.health
                    )));
                }
                if u.owner.0 as usize >= civ_count {
                    return Err(ImportError::StateCorruption(format!(
                        "unit owned by unknown civ {}",
                        u.owner.0
                    )));
                }
                check_catalog_ref(u.kind.raw, catalog.unit_types.len(), "unit type")?;
                for promotion in &u.promotions {
                    check_catalog_ref(promotion.raw, catalog.promotions.len(), "promotion")?;
                }
                let unit = Unit {
                    kind: u.kind,
                    owner: u.owner,
                    position: u.position,
                    health: u.health,
                    moves_left: u.moves_left,
                    attacks_left: u.attacks_left,
                    fortified: u.fortified,
                    experience: u.experience,
                    promotions: u.promotions.into_iter().collect(),
                };
                Ok((u.id, unit))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let units = Arena::from_entries(unit_entries)
            .ok_or_else(|| ImportError::StateCorruption("duplicate unit id".to_string()))?;

        let city_entries = snapshot
            .cities
            .into_iter()
            .map(|c| {
                if !(0..=100).contains(&c.health) {
                    return Err(ImportError::StateCorruption(format!(
                        "city health {} out of range",
                        c.health
                    )));
                }
                if c.capturable != (c.health == 0) {
                    return Err(ImportError::StateCorruption(format!(
                        "city {:?} capturable flag disagrees with health",
                        c.id
                    )));
                }
                if c.owner.0 as usize >= civ_count {
                    return Err(ImportError::StateCorruption(format!(
                        "city owned by unknown civ {}",
                        c.owner.0
                    )));
                }
                for building in &c.buildings {
                    check_catalog_ref(building.raw, catalog.buildings.len(), "building")?;
                }
                for item in &c.production_queue {
                    match item {
                        ProductionItem::Unit { kind, .. } => {
                            check_catalog_ref(kind.raw, catalog.unit_types.len(), "unit type")?
                        }
                        ProductionItem::Building { building, .. } => {
                            check_catalog_ref(building.raw, catalog.buildings.len(), "building")?
                        }
                    }
                }
                let city = City {
                    name: c.name,
                    owner: c.owner,
                    position: c.position,
                    population: c.population,
                    health: c.health,
                    food_stockpile: c.food_stockpile,
                    production_stockpile: c.production_stockpile,
                    buildings: c.buildings,
                    production_queue: c.production_queue,
                    garrison: c.garrison,
                };
                Ok((c.id, city))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let cities = Arena::from_entries(city_entries)
            .ok_or_else(|| ImportError::StateCorruption("duplicate city id".to_string()))?;

        if let Some(barbarians) = snapshot.barbarians {
            if barbarians.0 as usize >= civ_count {
                return Err(ImportError::StateCorruption(format!(
                    "barbarian seat {} does not exist",
                    barbarians.0
                )));
            }
        }

        let world = World {
            catalog,
            map,
            civs,
            units,
            cities,
            turn: snapshot.turn,
            phase: Phase::from_snapshot(snapshot.phase),
            rng: WorldRng::from_state_bytes(snapshot.rng_state),
            victory: snapshot.victory,
            barbarians: snapshot.barbarians,
            autosave: None,
        };
        world.validate_spatial_index()?;
        Ok(world)
    }

    pub fn import_json(catalog: Catalog, json: &str) -> Result<Self, ImportError> {
        let snapshot: WorldSnapshot = serde_json::from_str(json)?;
        Self::import(catalog, snapshot)
    }

    /// Cross-check the tile occupant index against the arenas. Run on
    /// import so a corrupt save fails loudly instead of desyncing.
    fn validate_spatial_index(&self) -> Result<(), ImportError> {
        for (index, tile) in self.map.tiles().iter().enumerate() {
            let hex = self.map.hex_at_index(index).expect("index in bounds");
            for &occupant in &tile.occupants {
                let Some(unit) = self.units.get(occupant) else {
                    return Err(ImportError::StateCorruption(format!(
                        "tile {hex:?} lists a unit that does not exist"
                    )));
                };
                if unit.position != hex {
                    return Err(ImportError::StateCorruption(format!(
                        "unit on {hex:?} thinks it is at {:?}",
                        unit.position
                    )));
                }
            }
            if let Some(city_id) = tile.city {
                let Some(city) = self.cities.get(city_id) else {
                    return Err(ImportError::StateCorruption(format!(
                        "tile {hex:?} lists a city that does not exist"
                    )));
                };
                if city.position != hex {
                    return Err(ImportError::StateCorruption(format!(
                        "city on {hex:?} thinks it is at {:?}",
                        city.position
                    )));
                }
            }
        }
        for (_, unit) in self.units.iter() {
            if self.map.get(unit.position).is_none() {
                return Err(ImportError::StateCorruption(format!(
                    "unit at {:?} is off the map",
                    unit.position
                )));
            }
        }
        Ok(())
    }
}

/// Imported ids must land inside the catalog tables; anything past the
/// end would panic at first lookup instead of failing the load.
fn check_catalog_ref(raw: u16, len: usize, what: &str) -> Result<(), ImportError> {
    if (raw as usize) < len {
        Ok(())
    } else {
        Err(ImportError::StateCorruption(format!(
            "{what} {raw} past catalog end"
        )))
    }
}
