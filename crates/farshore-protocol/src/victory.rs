//! Victory conditions and final-result reporting.

use serde::{Deserialize, Serialize};

use crate::CivId;

/// How a game ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum VictoryType {
    /// Every rival civilization has lost all of its cities.
    Domination,
    /// Researched the entire technology tree first.
    Science,
    /// Adopted every policy branch first.
    Culture,
    /// Highest score when the turn limit is reached.
    Score,
}

/// Result of a completed game.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameResult {
    pub winner: Option<CivId>,
    pub victory: VictoryType,
    pub turn: u32,
    pub scores: Vec<(CivId, ScoreBreakdown)>,
}

/// Components of a civilization's score.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    /// 2 per point of city population.
    pub population: i32,
    /// 10 per city.
    pub cities: i32,
    /// 4 per researched technology.
    pub techs: i32,
    /// 3 per adopted policy.
    pub policies: i32,
    /// 1 per 3 owned tiles.
    pub territory: i32,
    /// 1 per 50 gold in the treasury.
    pub gold: i32,
}

impl ScoreBreakdown {
    pub fn total(&self) -> i32 {
        self.population + self.cities + self.techs + self.policies + self.territory + self.gold
    }
}

/// Which victory conditions are live for a game.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VictorySettings {
    pub domination_enabled: bool,
    pub science_enabled: bool,
    pub culture_enabled: bool,
    pub score_enabled: bool,
    /// Turn at which the score victory triggers (0 = no limit).
    pub turn_limit: u32,
}

impl Default for VictorySettings {
    fn default() -> Self {
        Self {
            domination_enabled: true,
            science_enabled: true,
            culture_enabled: true,
            score_enabled: true,
            turn_limit: 500,
        }
    }
}
