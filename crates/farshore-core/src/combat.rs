//! Deterministic combat resolution.
//!
//! All functions here are pure math over already-resolved modifiers;
//! the world layer owns target validation, modifier queries, damage
//! application and removal. Keeping the math separate makes the curve
//! testable without a full world.

use serde::{Deserialize, Serialize};

use crate::rules::Modifier;

/// Base damage dealt by equal-strength opponents.
const BASE_DAMAGE: i32 = 30;
pub const MIN_DAMAGE: i32 = 1;
pub const MAX_DAMAGE: i32 = 99;

pub const XP_MELEE_ATTACK: i32 = 5;
pub const XP_MELEE_DEFEND: i32 = 4;
pub const XP_RANGED_ATTACK: i32 = 2;

/// Combat strength after percentage modifiers, scaled by remaining
/// health. A unit at half health fights at three quarters strength.
pub fn effective_strength(base: i32, health: i32, modifier: Modifier) -> i32 {
    let scaled = modifier.scale(base.max(0));
    let health_bp = 5_000 + health.clamp(0, 100) * 50;
    (scaled * health_bp / 10_000).max(1)
}

/// Damage from one strike: linear in the strength ratio, clamped so
/// every hit matters and no single hit is certain death from full
/// health.
pub fn strike_damage(attack: i32, defense: i32) -> i32 {
    let attack = attack.max(1);
    let defense = defense.max(1);
    (BASE_DAMAGE * attack / defense).clamp(MIN_DAMAGE, MAX_DAMAGE)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeleeOutcome {
    pub damage_to_defender: i32,
    pub damage_to_attacker: i32,
}

/// Melee is an exchange: the defender strikes back with the same
/// curve, from its own strength.
pub fn resolve_melee(attack: i32, defense: i32) -> MeleeOutcome {
    MeleeOutcome {
        damage_to_defender: strike_damage(attack, defense),
        damage_to_attacker: strike_damage(defense, attack),
    }
}

/// Ranged fire is one-way; the target never strikes back.
pub fn resolve_ranged(ranged_attack: i32, defense: i32) -> i32 {
    strike_damage(ranged_attack, defense)
}

/// A city's defensive strength: a fixed core plus population, plus
/// half the garrison's strength, then percentage modifiers.
pub fn city_strength(population: u8, garrison_strength: Option<i32>, modifier: Modifier) -> i32 {
    let base = 8 + 2 * population as i32 + garrison_strength.unwrap_or(0) / 2;
    modifier.scale(base).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn percent(bp: i32) -> Modifier {
        Modifier {
            percent_bp: bp,
            ..Modifier::default()
        }
    }

    #[test]
    fn same_kind_bonuses_sum_before_one_application() {
        // Three +15% sources resolve to +45%, not 1.15 cubed.
        let modifier = percent(1500 * 3);
        assert_eq!(modifier.scale(100), 145);
        assert_eq!(effective_strength(100, 100, modifier), 145);
    }

    #[test]
    fn equal_strength_deals_base_damage_both_ways() {
        let outcome = resolve_melee(20, 20);
        assert_eq!(outcome.damage_to_defender, BASE_DAMAGE);
        assert_eq!(outcome.damage_to_attacker, BASE_DAMAGE);
    }

    #[test]
    fn damage_is_clamped_at_both_ends() {
        assert_eq!(strike_damage(1, 1000), MIN_DAMAGE);
        assert_eq!(strike_damage(1000, 1), MAX_DAMAGE);
    }

    #[test]
    fn wounded_units_fight_below_full_strength() {
        let full = effective_strength(20, 100, Modifier::default());
        let half = effective_strength(20, 50, Modifier::default());
        assert_eq!(full, 20);
        assert_eq!(half, 15);
    }

    #[test]
    fn ranged_fire_is_one_way() {
        let damage = resolve_ranged(18, 12);
        assert_eq!(damage, strike_damage(18, 12));
    }

    #[test]
    fn garrison_stiffens_city_defense() {
        let bare = city_strength(3, None, Modifier::default());
        let held = city_strength(3, Some(20), Modifier::default());
        assert_eq!(bare, 14);
        assert_eq!(held, 24);
    }
}
