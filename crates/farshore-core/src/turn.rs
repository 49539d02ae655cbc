//! Turn coordination: the phase machine, the end-of-turn tick, and
//! victory checks.
//!
//! A turn cycles every civilization through `AwaitingActions` (humans)
//! or `ResolvingAi`. When the last civilization finishes, the world
//! tick runs exactly once, the turn counter increments, and control
//! returns to the first civilization.

use tracing::{debug, info};

use farshore_protocol::{
    BuildingId, CityId, CivId, GameResult, Hex, PhaseSnapshot, ProductionItem, ScoreBreakdown,
    TechId, UnitId, UnitTypeId, VictoryType,
};

use crate::{
    rules::{ContextTag, UnitCategory},
    world::{ActionError, World},
};

const FOOD_PER_CITIZEN: i32 = 2;
const BASE_HAPPINESS: i32 = 10;
const IDLE_HEAL: i32 = 5;
const FORTIFIED_HEAL: i32 = 10;
const CITY_HEAL: i32 = 10;
/// Percent chance per turn that a barbarian band appears somewhere.
const BARBARIAN_SPAWN_CHANCE: u32 = 8;
/// Barbarians never appear this close to a city.
const BARBARIAN_CITY_BUFFER: i32 = 3;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    AwaitingActions { civ: CivId },
    ResolvingAi { civ: CivId },
    GameOver { winner: Option<CivId> },
}

impl Phase {
    pub fn to_snapshot(self) -> PhaseSnapshot {
        match self {
            Phase::AwaitingActions { civ } => PhaseSnapshot::AwaitingActions { civ },
            Phase::ResolvingAi { civ } => PhaseSnapshot::ResolvingAi { civ },
            Phase::GameOver { winner } => PhaseSnapshot::GameOver { winner },
        }
    }

    pub fn from_snapshot(snapshot: PhaseSnapshot) -> Self {
        match snapshot {
            PhaseSnapshot::AwaitingActions { civ } => Phase::AwaitingActions { civ },
            PhaseSnapshot::ResolvingAi { civ } => Phase::ResolvingAi { civ },
            PhaseSnapshot::GameOver { winner } => Phase::GameOver { winner },
        }
    }
}

/// What happened during an end-of-turn tick, for the caller's UI or
/// log.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TurnEvent {
    TechDiscovered { civ: CivId, tech: TechId },
    CityGrew { city: CityId, population: u8 },
    CityStarved { city: CityId, population: u8 },
    UnitTrained { city: CityId, unit: UnitId },
    BuildingCompleted { city: CityId, building: BuildingId },
    BarbarianSpawned { unit: UnitId, at: Hex },
    GameEnded(GameResult),
}

impl World {
    pub fn current_civ(&self) -> Option<CivId> {
        match self.phase {
            Phase::AwaitingActions { civ } | Phase::ResolvingAi { civ } => Some(civ),
            Phase::GameOver { .. } => None,
        }
    }

    /// End the acting civilization's turn. AI civilizations after it
    /// resolve immediately; when the cycle wraps, the world tick runs
    /// once, the turn number advances, and control returns to the
    /// first seat. The caller drives the next cycle from there, so no
    /// seat acts twice between two ticks.
    pub fn end_turn(&mut self, civ: CivId) -> Result<Vec<TurnEvent>, ActionError> {
        self.require_turn(civ)?;
        // An AI seat handed control by the previous tick resolves now.
        if self.civs[civ.0 as usize].is_ai {
            self.phase = Phase::ResolvingAi { civ };
            self.resolve_ai(civ);
        }
        let mut events = Vec::new();
        let mut next = civ.0 as usize + 1;
        while next < self.civs.len() {
            let id = CivId(next as u8);
            if self.civs[next].is_ai {
                self.phase = Phase::ResolvingAi { civ: id };
                self.resolve_ai(id);
                next += 1;
            } else {
                self.phase = Phase::AwaitingActions { civ: id };
                return Ok(events);
            }
        }

        events.extend(self.run_world_tick());
        if let Some(result) = self.check_victory() {
            info!(turn = self.turn, ?result.winner, "game over");
            self.phase = Phase::GameOver {
                winner: result.winner,
            };
            events.push(TurnEvent::GameEnded(result));
            self.fire_autosave();
            return Ok(events);
        }
        self.turn += 1;
        debug!(turn = self.turn, "turn advanced");
        self.phase = Phase::AwaitingActions { civ: CivId(0) };
        self.fire_autosave();
        Ok(events)
    }

    /// Minimal stand-in brain: wander each unit one random step and
    /// keep research running. Deterministic given the world seed.
    fn resolve_ai(&mut self, civ: CivId) {
        for unit_id in self.units.ids() {
            let Some(unit) = self.units.get(unit_id) else {
                continue;
            };
            if unit.owner != civ || unit.moves_left <= 0 {
                continue;
            }
            let direction = self.rng.next_below(6) as usize;
            let target = unit.position + Hex::DIRECTIONS[direction];
            let _ = self.move_unit(civ, unit_id, target);
        }
        self.auto_pick_research(civ);
    }

    fn auto_pick_research(&mut self, civ: CivId) {
        if self.civ(civ).researching.is_some() {
            return;
        }
        let pick = self
            .catalog
            .tech_order
            .iter()
            .copied()
            .find(|&tech| self.civ(civ).can_research(tech, &self.catalog));
        if let Some(tech) = pick {
            self.civ_mut(civ).researching = Some(crate::civ::Research { tech, progress: 0 });
        }
    }

    /// The once-per-turn world update: yields, growth, production,
    /// research, healing, and per-turn refresh, in civilization order
    /// then arena order, so replays are stable.
    fn run_world_tick(&mut self) -> Vec<TurnEvent> {
        let mut events = Vec::new();

        for civ_index in 0..self.civs.len() {
            let civ = CivId(civ_index as u8);
            let mut science_total = 0;
            let mut gold_total = 0;
            let mut culture_total = 0;
            let mut faith_total = 0;

            for city_id in self.cities.ids() {
                let Some(city) = self.cities.get(city_id) else {
                    continue;
                };
                if city.owner != civ {
                    continue;
                }
                let base = city.base_yields(&self.map, &self.catalog);
                let growth = self.city_modifier(city, ContextTag::Growth);
                let production = self.city_modifier(city, ContextTag::Production);
                let research = self.city_modifier(city, ContextTag::Research);
                let gold = self.city_modifier(city, ContextTag::Gold);
                let flat = self.catalog.effect_index.flat_yields(&self.city_context(city));

                let food_income =
                    growth.scale(base.food + growth.flat) - FOOD_PER_CITIZEN * city.population as i32;
                let production_income = production.scale(base.production + production.flat);
                science_total += research.scale(base.science + research.flat);
                gold_total += gold.scale(base.gold + gold.flat);
                culture_total += base.culture + flat.culture;
                faith_total += base.faith + flat.faith;

                let city = self.cities.get_mut(city_id).expect("checked above");
                let before = city.population;
                if city.advance_growth(food_income) {
                    let population = city.population;
                    events.push(if population > before {
                        TurnEvent::CityGrew {
                            city: city_id,
                            population,
                        }
                    } else {
                        TurnEvent::CityStarved {
                            city: city_id,
                            population,
                        }
                    });
                }

                let completed = {
                    let city = self.cities.get_mut(city_id).expect("checked above");
                    city.advance_production(production_income, &self.catalog)
                };
                match completed {
                    Some(ProductionItem::Unit { kind, .. }) => {
                        let position = self.cities.get(city_id).expect("checked above").position;
                        if let Some(unit) = self.spawn_unit(civ, kind, position) {
                            events.push(TurnEvent::UnitTrained {
                                city: city_id,
                                unit,
                            });
                        }
                    }
                    Some(ProductionItem::Building { building, .. }) => {
                        self.cities
                            .get_mut(city_id)
                            .expect("checked above")
                            .buildings
                            .push(building);
                        events.push(TurnEvent::BuildingCompleted {
                            city: city_id,
                            building,
                        });
                    }
                    None => {}
                }

                self.heal_city(city_id);
            }

            self.settle_civ_income(civ, gold_total, culture_total, faith_total);
            if let Some(tech) = {
                let catalog = &self.catalog;
                // Split borrow: research mutates only the civ.
                let civ_state = &mut self.civs[civ_index];
                civ_state.advance_research(science_total, catalog)
            } {
                info!(civ = civ.0, tech = %self.catalog.tech(tech).id, "technology discovered");
                events.push(TurnEvent::TechDiscovered { civ, tech });
            }
            if self.civ(civ).is_ai {
                self.auto_pick_research(civ);
            }

            self.refresh_units(civ);
        }

        if let Some(event) = self.roll_barbarian_spawn() {
            events.push(event);
        }

        events
    }

    /// One spawn roll per turn from the world RNG. The roll is drawn
    /// even when no barbarian seat exists so the RNG stream does not
    /// depend on game configuration.
    fn roll_barbarian_spawn(&mut self) -> Option<TurnEvent> {
        let roll = self.rng.next_below(100);
        let civ = self.barbarians?;
        if roll >= BARBARIAN_SPAWN_CHANCE {
            return None;
        }
        let kind = self
            .catalog
            .unit_types
            .iter()
            .enumerate()
            .filter(|(_, u)| {
                u.category == UnitCategory::Melee && u.tech_required.is_none() && u.strength > 0
            })
            .min_by_key(|(_, u)| u.cost)
            .map(|(index, _)| UnitTypeId::new(index as u16))?;

        let mut candidates = Vec::new();
        for index in 0..self.map.tiles().len() {
            let tile = &self.map.tiles()[index];
            if tile.owner.is_some() || tile.city.is_some() || !tile.occupants.is_empty() {
                continue;
            }
            if self.catalog.terrain(tile.terrain).impassable {
                continue;
            }
            let hex = self.map.hex_at_index(index).expect("index in bounds");
            let near_city = self.cities.iter().any(|(_, c)| {
                self.map
                    .distance(c.position, hex)
                    .is_some_and(|d| d < BARBARIAN_CITY_BUFFER)
            });
            if !near_city {
                candidates.push(hex);
            }
        }
        if candidates.is_empty() {
            return None;
        }
        let at = candidates[self.rng.next_below(candidates.len() as u32) as usize];
        let unit = self.spawn_unit(civ, kind, at)?;
        info!(?unit, ?at, "barbarians appeared");
        Some(TurnEvent::BarbarianSpawned { unit, at })
    }

    fn settle_civ_income(&mut self, civ: CivId, gold: i32, culture: i32, faith: i32) {
        let happiness_flat = {
            let city_count = self
                .cities
                .iter()
                .filter(|(_, c)| c.owner == civ)
                .count() as i32;
            let population: i32 = self
                .cities
                .iter()
                .filter(|(_, c)| c.owner == civ)
                .map(|(_, c)| c.population as i32)
                .sum();
            let modifier = {
                let civ_state = self.civ(civ);
                let ctx = crate::rules::EffectContext {
                    techs: &civ_state.techs,
                    policies: &civ_state.policies,
                    beliefs: &civ_state.beliefs,
                    at_war: civ_state.is_at_war(),
                    city: None,
                    unit: None,
                    tile: None,
                };
                self.catalog
                    .effect_index
                    .net_modifier(&ctx, ContextTag::Happiness)
            };
            BASE_HAPPINESS + modifier.flat - city_count - population / 2
        };
        let civ_state = self.civ_mut(civ);
        civ_state.gold += gold;
        civ_state.culture += culture;
        civ_state.faith += faith;
        civ_state.happiness = happiness_flat;
    }

    /// Heal idle units and reset movement and attacks for the new
    /// turn. Units that attacked this turn do not heal unless a
    /// march-style effect says otherwise.
    fn refresh_units(&mut self, civ: CivId) {
        for unit_id in self.units.ids() {
            let Some(unit) = self.units.get(unit_id) else {
                continue;
            };
            if unit.owner != civ {
                continue;
            }
            let modifier = self.unit_modifier(unit, ContextTag::CombatAttack);
            let attacked = unit.attacks_left <= 0;
            let heal = if attacked && !modifier.heal_after_action {
                0
            } else if unit.fortified {
                FORTIFIED_HEAL + modifier.healing_rate
            } else {
                IDLE_HEAL + modifier.healing_rate
            };
            let moves = self.catalog.unit_type(unit.kind).moves;
            let unit = self.units.get_mut(unit_id).expect("checked above");
            unit.heal(heal);
            unit.refresh_for_turn(moves, modifier.extra_attack);
        }
    }

    fn heal_city(&mut self, city_id: CityId) {
        let Some(city) = self.cities.get(city_id) else {
            return;
        };
        let owner = city.owner;
        let position = city.position;
        let besieged = self.map.neighbors(position).any(|hex| {
            self.map
                .get(hex)
                .map(|t| {
                    t.occupants
                        .iter()
                        .filter_map(|&id| self.units.get(id))
                        .any(|u| self.civ(owner).is_at_war_with(u.owner))
                })
                .unwrap_or(false)
        });
        if !besieged {
            self.cities
                .get_mut(city_id)
                .expect("checked above")
                .heal(CITY_HEAL);
        }
    }

    // ---- victory ------------------------------------------------------

    fn check_victory(&self) -> Option<GameResult> {
        // Barbarians hold a seat but never contend for victory.
        let alive: Vec<CivId> = self
            .civs
            .iter()
            .map(|c| c.id)
            .filter(|&id| Some(id) != self.barbarians && self.civ_is_alive(id))
            .collect();
        let contenders = self.civs.len() - usize::from(self.barbarians.is_some());

        if self.victory.domination_enabled && alive.len() == 1 && contenders > 1 {
            return Some(self.game_result(Some(alive[0]), VictoryType::Domination));
        }

        if self.victory.science_enabled {
            let all_techs = self.catalog.techs.len();
            if all_techs > 0 {
                if let Some(civ) = alive
                    .iter()
                    .copied()
                    .find(|&id| self.civ(id).techs.len() == all_techs)
                {
                    return Some(self.game_result(Some(civ), VictoryType::Science));
                }
            }
        }

        if self.victory.culture_enabled {
            let all_policies = self.catalog.policies.len();
            if all_policies > 0 {
                if let Some(civ) = alive
                    .iter()
                    .copied()
                    .find(|&id| self.civ(id).policies.len() == all_policies)
                {
                    return Some(self.game_result(Some(civ), VictoryType::Culture));
                }
            }
        }

        if self.victory.score_enabled
            && self.victory.turn_limit > 0
            && self.turn >= self.victory.turn_limit
        {
            let scores = self.compute_scores();
            let winner = scores
                .iter()
                .filter(|(id, _)| Some(*id) != self.barbarians)
                .max_by_key(|(id, s)| (s.total(), std::cmp::Reverse(id.0)))
                .map(|&(id, _)| id);
            return Some(GameResult {
                winner,
                victory: VictoryType::Score,
                turn: self.turn,
                scores,
            });
        }

        None
    }

    fn civ_is_alive(&self, civ: CivId) -> bool {
        // A seat that never placed anything is still setting up, not
        // eliminated.
        if !self.civ(civ).established {
            return true;
        }
        self.cities.iter().any(|(_, c)| c.owner == civ)
            || self.units.iter().any(|(_, u)| u.owner == civ)
    }

    fn game_result(&self, winner: Option<CivId>, victory: VictoryType) -> GameResult {
        GameResult {
            winner,
            victory,
            turn: self.turn,
            scores: self.compute_scores(),
        }
    }

    pub fn compute_scores(&self) -> Vec<(CivId, ScoreBreakdown)> {
        self.civs
            .iter()
            .map(|civ| {
                let id = civ.id;
                let population: i32 = self
                    .cities
                    .iter()
                    .filter(|(_, c)| c.owner == id)
                    .map(|(_, c)| c.population as i32)
                    .sum();
                let cities = self.cities.iter().filter(|(_, c)| c.owner == id).count() as i32;
                let territory = self
                    .map
                    .tiles()
                    .iter()
                    .filter(|t| t.owner == Some(id))
                    .count() as i32;
                let score = ScoreBreakdown {
                    population: population * 2,
                    cities: cities * 10,
                    techs: civ.techs.len() as i32 * 4,
                    policies: civ.policies.len() as i32 * 3,
                    territory: territory / 3,
                    gold: civ.gold.max(0) / 50,
                };
                (id, score)
            })
            .collect()
    }
}
