use serde::{Deserialize, Serialize};

use farshore_protocol::{BuildingId, CivId, Hex, ProductionItem, UnitId};

use crate::{map::GameMap, rules::Catalog, yields::Yields};

pub const MAX_CITY_HEALTH: i32 = 100;

/// How far out a city works tiles.
const WORK_RADIUS: i32 = 2;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct City {
    pub name: String,
    pub owner: CivId,
    pub position: Hex,
    pub population: u8,
    /// Always in 0..=100. A city at zero is capturable, never
    /// destroyed; it changes hands only when an enemy occupies it.
    pub health: i32,
    pub food_stockpile: i32,
    pub production_stockpile: i32,
    pub buildings: Vec<BuildingId>,
    pub production_queue: Vec<ProductionItem>,
    pub garrison: Option<UnitId>,
}

impl City {
    pub fn new(name: String, position: Hex, owner: CivId) -> Self {
        Self {
            name,
            owner,
            position,
            population: 1,
            health: MAX_CITY_HEALTH,
            food_stockpile: 0,
            production_stockpile: 0,
            buildings: Vec::new(),
            production_queue: Vec::new(),
            garrison: None,
        }
    }

    pub fn is_capturable(&self) -> bool {
        self.health == 0
    }

    pub fn apply_damage(&mut self, damage: i32) {
        self.health = (self.health - damage.max(0)).clamp(0, MAX_CITY_HEALTH);
    }

    pub fn heal(&mut self, amount: i32) {
        self.health = (self.health + amount.max(0)).clamp(0, MAX_CITY_HEALTH);
    }

    /// Food needed in the stockpile before the next citizen arrives.
    pub fn food_for_growth(&self) -> i32 {
        10 + self.population as i32 * 5
    }

    /// Bank food income and grow or starve. Returns true when the
    /// population changed this turn.
    pub fn advance_growth(&mut self, food_income: i32) -> bool {
        self.food_stockpile += food_income;
        if self.food_stockpile >= self.food_for_growth() {
            self.food_stockpile -= self.food_for_growth();
            self.population = self.population.saturating_add(1);
            return true;
        }
        if self.food_stockpile < 0 {
            self.food_stockpile = 0;
            if self.population > 1 {
                self.population -= 1;
                return true;
            }
        }
        false
    }

    /// Apply production income to the head of the queue. A finished
    /// item is popped and returned for the caller to realize.
    pub fn advance_production(
        &mut self,
        income: i32,
        catalog: &Catalog,
    ) -> Option<ProductionItem> {
        self.production_stockpile += income.max(0);
        let head = self.production_queue.first_mut()?;
        let cost = match head {
            ProductionItem::Unit { kind, .. } => catalog.unit_type(*kind).cost,
            ProductionItem::Building { building, .. } => catalog.building(*building).cost,
        };
        match head {
            ProductionItem::Unit { progress, .. } | ProductionItem::Building { progress, .. } => {
                *progress += self.production_stockpile;
                self.production_stockpile = 0;
                if *progress >= cost {
                    return Some(self.production_queue.remove(0));
                }
            }
        }
        None
    }

    /// Raw per-turn yields before any percentage modifiers: the city
    /// center base plus the best owned tiles the population can work.
    pub fn base_yields(&self, map: &GameMap, catalog: &Catalog) -> Yields {
        let mut total = Yields::default();
        total.food += 2;
        total.production += 1;
        total.science += self.population as i32;
        total.culture += 1;

        let center = map.index_of(self.position);
        let mut workable: Vec<(i32, usize)> = map
            .indices_in_range(self.position, WORK_RADIUS)
            .into_iter()
            .filter(|&index| Some(index) != center)
            .filter(|&index| map.tiles()[index].owner == Some(self.owner))
            .map(|index| (self.tile_score(index, map, catalog), index))
            .collect();
        workable.sort_by_key(|&(score, index)| (std::cmp::Reverse(score), index));

        for &(_, index) in workable.iter().take(self.population as usize) {
            total += self.tile_yields(index, map, catalog);
        }

        total.gold += self.buildings.len() as i32; // base trade per building
        for &building in &self.buildings {
            total.gold -= catalog.building(building).maintenance;
        }
        total
    }

    fn tile_yields(&self, index: usize, map: &GameMap, catalog: &Catalog) -> Yields {
        let tile = &map.tiles()[index];
        let mut out = catalog.terrain(tile.terrain).yields;
        if let Some(resource) = tile.resource {
            out += catalog.resource(resource).yields;
        }
        out
    }

    fn tile_score(&self, index: usize, map: &GameMap, catalog: &Catalog) -> i32 {
        let y = self.tile_yields(index, map, catalog);
        y.food * 3 + y.production * 2 + y.gold
    }
}
