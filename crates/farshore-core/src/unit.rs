use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use farshore_protocol::{CivId, Hex, PromotionId, UnitTypeId};

pub const MAX_HEALTH: i32 = 100;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Unit {
    pub kind: UnitTypeId,
    pub owner: CivId,
    pub position: Hex,
    /// Always in 0..=100. Zero means dead; the world removes the unit
    /// the moment health reaches zero.
    pub health: i32,
    pub moves_left: i32,
    pub attacks_left: i32,
    pub fortified: bool,
    pub experience: i32,
    pub promotions: BTreeSet<PromotionId>,
}

impl Unit {
    pub fn new(kind: UnitTypeId, owner: CivId, position: Hex, moves: i32) -> Self {
        Self {
            kind,
            owner,
            position,
            health: MAX_HEALTH,
            moves_left: moves,
            attacks_left: 1,
            fortified: false,
            experience: 0,
            promotions: BTreeSet::new(),
        }
    }

    pub fn is_alive(&self) -> bool {
        self.health > 0
    }

    /// Subtract damage, clamped into 0..=100. Returns true when the
    /// unit died from this hit.
    pub fn apply_damage(&mut self, damage: i32) -> bool {
        self.health = (self.health - damage.max(0)).clamp(0, MAX_HEALTH);
        self.health == 0
    }

    pub fn heal(&mut self, amount: i32) {
        self.health = (self.health + amount.max(0)).clamp(0, MAX_HEALTH);
    }

    /// Fortifying ends the unit's turn and marks it dug in until it
    /// moves or attacks.
    pub fn fortify(&mut self) {
        self.fortified = true;
        self.moves_left = 0;
    }

    pub fn break_fortification(&mut self) {
        self.fortified = false;
    }

    /// Promotions the unit has earned but not yet picked. Each pick
    /// costs cumulative experience: 10 for the first, 15 more per
    /// pick after that.
    pub fn promotion_slots(&self) -> u32 {
        let mut slots: u32 = 0;
        let mut threshold = 10;
        let mut spent = 0;
        while spent + threshold <= self.experience {
            spent += threshold;
            threshold = 15;
            slots += 1;
        }
        slots.saturating_sub(self.promotions.len() as u32)
    }

    pub fn refresh_for_turn(&mut self, moves: i32, extra_attack: bool) {
        self.moves_left = moves;
        self.attacks_left = if extra_attack { 2 } else { 1 };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scout() -> Unit {
        Unit::new(UnitTypeId::new(0), CivId(0), Hex { q: 0, r: 0 }, 2)
    }

    #[test]
    fn damage_clamps_at_zero_and_reports_death() {
        let mut unit = scout();
        assert!(!unit.apply_damage(60));
        assert_eq!(unit.health, 40);
        assert!(unit.apply_damage(500));
        assert_eq!(unit.health, 0);
    }

    #[test]
    fn healing_never_exceeds_max() {
        let mut unit = scout();
        unit.health = 95;
        unit.heal(20);
        assert_eq!(unit.health, MAX_HEALTH);
    }

    #[test]
    fn promotion_slots_follow_experience_thresholds() {
        let mut unit = scout();
        assert_eq!(unit.promotion_slots(), 0);

        unit.experience = 10;
        assert_eq!(unit.promotion_slots(), 1);

        unit.experience = 25;
        assert_eq!(unit.promotion_slots(), 2);

        unit.promotions.insert(PromotionId::new(0));
        assert_eq!(unit.promotion_slots(), 1);
    }

    #[test]
    fn fortify_spends_remaining_moves() {
        let mut unit = scout();
        unit.fortify();
        assert!(unit.fortified);
        assert_eq!(unit.moves_left, 0);
    }
}
