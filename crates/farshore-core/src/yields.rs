use std::ops::{Add, AddAssign};

use serde::{Deserialize, Serialize};

/// Which accumulator a yield or effect feeds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum YieldKind {
    Food,
    Production,
    Gold,
    Science,
    Culture,
    Faith,
}

/// Per-turn output bundle for a tile, city, or civilization.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Yields {
    #[serde(default)]
    pub food: i32,
    #[serde(default)]
    pub production: i32,
    #[serde(default)]
    pub gold: i32,
    #[serde(default)]
    pub science: i32,
    #[serde(default)]
    pub culture: i32,
    #[serde(default)]
    pub faith: i32,
}

impl Yields {
    pub fn get(&self, kind: YieldKind) -> i32 {
        match kind {
            YieldKind::Food => self.food,
            YieldKind::Production => self.production,
            YieldKind::Gold => self.gold,
            YieldKind::Science => self.science,
            YieldKind::Culture => self.culture,
            YieldKind::Faith => self.faith,
        }
    }

    pub fn get_mut(&mut self, kind: YieldKind) -> &mut i32 {
        match kind {
            YieldKind::Food => &mut self.food,
            YieldKind::Production => &mut self.production,
            YieldKind::Gold => &mut self.gold,
            YieldKind::Science => &mut self.science,
            YieldKind::Culture => &mut self.culture,
            YieldKind::Faith => &mut self.faith,
        }
    }
}

impl Add for Yields {
    type Output = Yields;

    fn add(self, other: Yields) -> Yields {
        Yields {
            food: self.food + other.food,
            production: self.production + other.production,
            gold: self.gold + other.gold,
            science: self.science + other.science,
            culture: self.culture + other.culture,
            faith: self.faith + other.faith,
        }
    }
}

impl AddAssign for Yields {
    fn add_assign(&mut self, other: Yields) {
        *self = *self + other;
    }
}
