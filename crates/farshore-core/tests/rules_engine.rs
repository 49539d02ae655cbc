//! End-to-end rules coverage: modifier stacking, terrain-gated
//! promotions, combat exchanges, and city founding and capture.

use farshore_core::{
    rules::{load_catalog, CatalogSource, ContextTag},
    ActionError, City, Civilization, GameMap, World,
};
use farshore_protocol::{CivId, Hex, VictorySettings};

fn world_with_civs(count: u8) -> World {
    let catalog = load_catalog(CatalogSource::Embedded).expect("embedded catalog");
    let plains = catalog.terrain_id("plains").expect("base terrain");
    let map = GameMap::new(16, 12, false, plains);
    let civs = (0..count)
        .map(|i| Civilization::new(CivId(i), format!("Civ {i}"), false))
        .collect();
    World::new(catalog, map, civs, 7, VictorySettings::default())
}

fn paint_terrain(world: &mut World, hex: Hex, name: &str) {
    let id = world.catalog.terrain_id(name).expect("base terrain");
    world.map.get_mut(hex).expect("on map").terrain = id;
}

#[test]
fn same_kind_percentage_bonuses_sum_additively() {
    let mut world = world_with_civs(2);
    let warrior = world.catalog.unit_type_id("warrior").unwrap();
    let a = world
        .spawn_unit(CivId(0), warrior, Hex { q: 5, r: 5 })
        .unwrap();
    // A friend next door satisfies the discipline requirement.
    world.spawn_unit(CivId(0), warrior, Hex { q: 4, r: 5 }).unwrap();

    let shock = world.catalog.promotion_id("shock").unwrap();
    world.units.get_mut(a).unwrap().promotions.insert(shock);
    let honor = world.catalog.policy_id("honor").unwrap();
    let discipline = world.catalog.policy_id("discipline").unwrap();
    world.civ_mut(CivId(0)).policies.extend([honor, discipline]);
    world.civ_mut(CivId(0)).at_war_with.insert(CivId(1));

    // shock +1500 (open terrain) + honor +1000 (at war) +
    // discipline +1500 (adjacent friendly) = +4000, applied once.
    let unit = world.units.get(a).unwrap().clone();
    let modifier = world.unit_modifier(&unit, ContextTag::CombatAttack);
    assert_eq!(modifier.percent_bp, 4000);
    assert_eq!(modifier.scale(100), 140);
}

#[test]
fn shock_and_drill_gate_on_terrain() {
    let mut world = world_with_civs(1);
    let warrior = world.catalog.unit_type_id("warrior").unwrap();
    let open = Hex { q: 5, r: 5 };
    let rough = Hex { q: 9, r: 5 };
    paint_terrain(&mut world, rough, "hills");

    let a = world.spawn_unit(CivId(0), warrior, open).unwrap();
    let b = world.spawn_unit(CivId(0), warrior, rough).unwrap();
    let shock = world.catalog.promotion_id("shock").unwrap();
    let drill = world.catalog.promotion_id("drill").unwrap();
    world
        .units
        .get_mut(a)
        .unwrap()
        .promotions
        .extend([shock, drill]);
    world
        .units
        .get_mut(b)
        .unwrap()
        .promotions
        .extend([shock, drill]);

    let on_open = world.units.get(a).unwrap().clone();
    let on_rough = world.units.get(b).unwrap().clone();
    assert_eq!(
        world.unit_modifier(&on_open, ContextTag::CombatAttack).percent_bp,
        1500
    );
    assert_eq!(
        world.unit_modifier(&on_rough, ContextTag::CombatAttack).percent_bp,
        1500
    );
}

#[test]
fn melee_damages_both_sides_and_terrain_shields_the_defender() {
    let mut world = world_with_civs(2);
    let warrior = world.catalog.unit_type_id("warrior").unwrap();
    let attacker_hex = Hex { q: 5, r: 5 };
    let defender_hex = Hex { q: 6, r: 5 };
    paint_terrain(&mut world, defender_hex, "hills");

    let attacker = world.spawn_unit(CivId(0), warrior, attacker_hex).unwrap();
    let defender = world.spawn_unit(CivId(1), warrior, defender_hex).unwrap();

    world.attack(CivId(0), attacker, defender_hex).unwrap();

    // Strength 8 vs 8 * 1.25 (hills): defender takes 30*8/10 = 24,
    // attacker takes 30*10/8 = 37.
    assert_eq!(world.units.get(defender).unwrap().health, 76);
    assert_eq!(world.units.get(attacker).unwrap().health, 63);
    assert!(world.civ(CivId(0)).is_at_war_with(CivId(1)));
    assert_eq!(world.units.get(attacker).unwrap().attacks_left, 0);
}

#[test]
fn lethal_melee_removes_the_defender_and_the_attacker_advances() {
    let mut world = world_with_civs(2);
    let warrior = world.catalog.unit_type_id("warrior").unwrap();
    let from = Hex { q: 5, r: 5 };
    let target = Hex { q: 6, r: 5 };
    let attacker = world.spawn_unit(CivId(0), warrior, from).unwrap();
    let defender = world.spawn_unit(CivId(1), warrior, target).unwrap();
    world.units.get_mut(defender).unwrap().health = 10;

    world.attack(CivId(0), attacker, target).unwrap();

    assert!(world.units.get(defender).is_none());
    assert_eq!(world.units.get(attacker).unwrap().position, target);
    assert_eq!(
        world.map.get(target).unwrap().occupants,
        vec![attacker]
    );
    assert!(world.map.get(from).unwrap().occupants.is_empty());
}

#[test]
fn ranged_fire_never_draws_a_counterattack() {
    let mut world = world_with_civs(2);
    let archer = world.catalog.unit_type_id("archer").unwrap();
    let warrior = world.catalog.unit_type_id("warrior").unwrap();
    let shooter_hex = Hex { q: 5, r: 5 };
    let target_hex = Hex { q: 7, r: 5 };
    let shooter = world.spawn_unit(CivId(0), archer, shooter_hex).unwrap();
    let target = world.spawn_unit(CivId(1), warrior, target_hex).unwrap();

    world.ranged_attack(CivId(0), shooter, target_hex).unwrap();

    // Ranged 7 vs 8: 30*7/8 = 26, one way.
    assert_eq!(world.units.get(target).unwrap().health, 74);
    assert_eq!(world.units.get(shooter).unwrap().health, 100);
    assert_eq!(world.units.get(shooter).unwrap().position, shooter_hex);
}

#[test]
fn ranged_attacks_respect_range_and_melee_units_cannot_shoot() {
    let mut world = world_with_civs(2);
    let archer = world.catalog.unit_type_id("archer").unwrap();
    let warrior = world.catalog.unit_type_id("warrior").unwrap();
    let shooter = world.spawn_unit(CivId(0), archer, Hex { q: 2, r: 5 }).unwrap();
    let brawler = world.spawn_unit(CivId(0), warrior, Hex { q: 3, r: 5 }).unwrap();
    world.spawn_unit(CivId(1), warrior, Hex { q: 6, r: 5 }).unwrap();

    assert_eq!(
        world.ranged_attack(CivId(0), shooter, Hex { q: 6, r: 5 }),
        Err(ActionError::OutOfRange)
    );
    assert_eq!(
        world.ranged_attack(CivId(0), brawler, Hex { q: 6, r: 5 }),
        Err(ActionError::NoTarget)
    );
}

#[test]
fn promotions_require_their_prerequisites_and_a_slot() {
    let mut world = world_with_civs(1);
    let warrior = world.catalog.unit_type_id("warrior").unwrap();
    let a = world.spawn_unit(CivId(0), warrior, Hex { q: 5, r: 5 }).unwrap();

    // No experience yet, so no slot.
    assert_eq!(
        world.acquire_promotion(CivId(0), a, "shock"),
        Err(ActionError::NoPromotionSlot)
    );

    world.units.get_mut(a).unwrap().experience = 10;
    assert_eq!(
        world.acquire_promotion(CivId(0), a, "shock_2"),
        Err(ActionError::PrerequisiteMissing)
    );
    world.acquire_promotion(CivId(0), a, "shock").unwrap();

    world.units.get_mut(a).unwrap().experience = 25;
    world.acquire_promotion(CivId(0), a, "shock_2").unwrap();

    assert_eq!(
        world.acquire_promotion(CivId(0), a, "no_such_promotion"),
        Err(ActionError::UnknownCatalogId("no_such_promotion".to_string()))
    );
}

#[test]
fn founding_claims_territory_and_respects_foreign_borders() {
    let mut world = world_with_civs(2);
    let settler = world.catalog.unit_type_id("settler").unwrap();

    let spot = Hex { q: 5, r: 5 };
    let a = world.spawn_unit(CivId(0), settler, spot).unwrap();
    let city = world.found_city(CivId(0), a, "Harborview".to_string()).unwrap();

    assert!(world.units.get(a).is_none(), "settler is consumed");
    assert_eq!(world.map.get(spot).unwrap().city, Some(city));
    assert_eq!(world.map.get(spot).unwrap().owner, Some(CivId(0)));
    assert_eq!(world.map.get(Hex { q: 6, r: 5 }).unwrap().owner, Some(CivId(0)));

    // Inside another civilization's borders.
    let foreign = Hex { q: 12, r: 5 };
    world.map.get_mut(foreign).unwrap().owner = Some(CivId(1));
    let b = world.spawn_unit(CivId(0), settler, foreign).unwrap();
    assert_eq!(
        world.found_city(CivId(0), b, "Overreach".to_string()),
        Err(ActionError::ForeignTerritory)
    );

    // Too close to the first city.
    let near = Hex { q: 7, r: 5 };
    let c = world.spawn_unit(CivId(0), settler, near).unwrap();
    assert_eq!(
        world.found_city(CivId(0), c, "Crowded".to_string()),
        Err(ActionError::TooCloseToCity)
    );

    // A warrior cannot found anything.
    let warrior = world.catalog.unit_type_id("warrior").unwrap();
    let d = world.spawn_unit(CivId(0), warrior, Hex { q: 10, r: 9 }).unwrap();
    assert_eq!(
        world.found_city(CivId(0), d, "Camp".to_string()),
        Err(ActionError::CannotFoundCity)
    );
}

#[test]
fn cities_survive_at_zero_health_until_occupied() {
    let mut world = world_with_civs(2);
    let warrior = world.catalog.unit_type_id("warrior").unwrap();
    let city_hex = Hex { q: 6, r: 5 };

    let city_id = world
        .cities
        .insert(City::new("Stronghold".to_string(), city_hex, CivId(1)));
    world.map.get_mut(city_hex).unwrap().city = Some(city_id);
    world.map.get_mut(city_hex).unwrap().owner = Some(CivId(1));
    world.civ_mut(CivId(0)).at_war_with.insert(CivId(1));
    world.civ_mut(CivId(1)).at_war_with.insert(CivId(0));

    let attacker = world.spawn_unit(CivId(0), warrior, Hex { q: 5, r: 5 }).unwrap();

    // Not capturable while it has health, and not enterable either.
    assert_eq!(
        world.capture_city(CivId(0), attacker, city_hex),
        Err(ActionError::CityNotCapturable)
    );
    assert_eq!(
        world.move_unit(CivId(0), attacker, city_hex),
        Err(ActionError::DestinationBlocked)
    );

    world.cities.get_mut(city_id).unwrap().apply_damage(200);
    assert!(world.cities.get(city_id).unwrap().is_capturable());
    assert_eq!(world.cities.get(city_id).unwrap().owner, CivId(1));

    world.capture_city(CivId(0), attacker, city_hex).unwrap();
    let city = world.cities.get(city_id).unwrap();
    assert_eq!(city.owner, CivId(0));
    assert!(city.health > 0);
    assert_eq!(world.units.get(attacker).unwrap().position, city_hex);
    assert_eq!(world.map.get(city_hex).unwrap().owner, Some(CivId(0)));
}

#[test]
fn ranged_units_cannot_occupy_a_fallen_city() {
    let mut world = world_with_civs(2);
    let archer = world.catalog.unit_type_id("archer").unwrap();
    let city_hex = Hex { q: 6, r: 5 };

    let city_id = world
        .cities
        .insert(City::new("Stronghold".to_string(), city_hex, CivId(1)));
    world.map.get_mut(city_hex).unwrap().city = Some(city_id);
    world.cities.get_mut(city_id).unwrap().apply_damage(200);

    let shooter = world.spawn_unit(CivId(0), archer, Hex { q: 5, r: 5 }).unwrap();
    assert_eq!(
        world.capture_city(CivId(0), shooter, city_hex),
        Err(ActionError::CannotCapture)
    );
}
