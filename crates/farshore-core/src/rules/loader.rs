use std::collections::{BTreeMap, HashMap};

use farshore_protocol::{
    BeliefId, BuildingId, CatalogId, DataId, PolicyId, PromotionId, ResourceId, TechId,
    TerrainId, UnitTypeId,
};
use serde::Deserialize;
use thiserror::Error;

use crate::rules::{types::*, Catalog, EffectIndex};

/// Load-time failures. All of these abort startup; none can occur
/// once a catalog has compiled.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("yaml parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("reference to unknown id: {0}")]
    DanglingReference(DataId),
    #[error("cyclic prerequisites involving {0}")]
    CyclicPrerequisite(DataId),
    #[error("utf-8 error: {0}")]
    Utf8(#[from] std::str::Utf8Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub enum CatalogSource<'a> {
    /// The base ruleset compiled into the binary.
    Embedded,
    /// A directory of YAML files with the base ruleset's layout.
    Path(String),
    Bytes {
        terrain: &'a [u8],
        units: &'a [u8],
        buildings: &'a [u8],
        techs: &'a [u8],
        policies: &'a [u8],
        promotions: &'a [u8],
        beliefs: Option<&'a [u8]>,
        resources: Option<&'a [u8]>,
    },
}

#[derive(Debug, Deserialize)]
struct RawCatalog {
    terrains: BTreeMap<DataId, RawTerrainType>,
    units: BTreeMap<DataId, RawUnitType>,
    buildings: BTreeMap<DataId, RawBuildingType>,
    techs: BTreeMap<DataId, RawTechnology>,
    policies: BTreeMap<DataId, RawPolicy>,
    promotions: BTreeMap<DataId, RawPromotion>,
    beliefs: Option<BTreeMap<DataId, RawBelief>>,
    resources: Option<BTreeMap<DataId, RawResourceKind>>,
}

pub fn load_catalog(source: CatalogSource<'_>) -> Result<Catalog, CatalogError> {
    let raw = match source {
        CatalogSource::Embedded => parse_raw(
            include_str!("../../data/base/terrain.yaml"),
            include_str!("../../data/base/units.yaml"),
            include_str!("../../data/base/buildings.yaml"),
            include_str!("../../data/base/techs.yaml"),
            include_str!("../../data/base/policies.yaml"),
            include_str!("../../data/base/promotions.yaml"),
            Some(include_str!("../../data/base/beliefs.yaml")),
            Some(include_str!("../../data/base/resources.yaml")),
        )?,
        CatalogSource::Path(path) => {
            let read = |name: &str| std::fs::read_to_string(format!("{path}/{name}.yaml"));
            let terrain = read("terrain")?;
            let units = read("units")?;
            let buildings = read("buildings")?;
            let techs = read("techs")?;
            let policies = read("policies")?;
            let promotions = read("promotions")?;
            let beliefs = read("beliefs").ok();
            let resources = read("resources").ok();
            parse_raw(
                &terrain,
                &units,
                &buildings,
                &techs,
                &policies,
                &promotions,
                beliefs.as_deref(),
                resources.as_deref(),
            )?
        }
        CatalogSource::Bytes {
            terrain,
            units,
            buildings,
            techs,
            policies,
            promotions,
            beliefs,
            resources,
        } => parse_raw(
            std::str::from_utf8(terrain)?,
            std::str::from_utf8(units)?,
            std::str::from_utf8(buildings)?,
            std::str::from_utf8(techs)?,
            std::str::from_utf8(policies)?,
            std::str::from_utf8(promotions)?,
            beliefs.map(std::str::from_utf8).transpose()?,
            resources.map(std::str::from_utf8).transpose()?,
        )?,
    };

    compile(raw)
}

#[allow(clippy::too_many_arguments)]
fn parse_raw(
    terrain: &str,
    units: &str,
    buildings: &str,
    techs: &str,
    policies: &str,
    promotions: &str,
    beliefs: Option<&str>,
    resources: Option<&str>,
) -> Result<RawCatalog, CatalogError> {
    Ok(RawCatalog {
        terrains: serde_yaml::from_str(terrain)?,
        units: serde_yaml::from_str(units)?,
        buildings: serde_yaml::from_str(buildings)?,
        techs: serde_yaml::from_str(techs)?,
        policies: serde_yaml::from_str(policies)?,
        promotions: serde_yaml::from_str(promotions)?,
        beliefs: beliefs.map(serde_yaml::from_str).transpose()?,
        resources: resources.map(serde_yaml::from_str).transpose()?,
    })
}

fn intern<T>(keys: impl Iterator<Item = DataId>) -> HashMap<DataId, CatalogId<T>> {
    keys.enumerate()
        .map(|(i, k)| (k, CatalogId::new(i as u16)))
        .collect()
}

fn compile(raw: RawCatalog) -> Result<Catalog, CatalogError> {
    let terrain_ids: HashMap<DataId, TerrainId> = intern(raw.terrains.keys().cloned());
    let unit_type_ids: HashMap<DataId, UnitTypeId> = intern(raw.units.keys().cloned());
    let building_ids: HashMap<DataId, BuildingId> = intern(raw.buildings.keys().cloned());
    let tech_ids: HashMap<DataId, TechId> = intern(raw.techs.keys().cloned());
    let policy_ids: HashMap<DataId, PolicyId> = intern(raw.policies.keys().cloned());
    let promotion_ids: HashMap<DataId, PromotionId> = intern(raw.promotions.keys().cloned());
    let belief_ids: HashMap<DataId, BeliefId> = raw
        .beliefs
        .as_ref()
        .map(|b| intern(b.keys().cloned()))
        .unwrap_or_default();
    let resource_ids: HashMap<DataId, ResourceId> = raw
        .resources
        .as_ref()
        .map(|r| intern(r.keys().cloned()))
        .unwrap_or_default();

    let terrains = raw
        .terrains
        .into_iter()
        .map(|(id, t)| t.compile(id))
        .collect::<Vec<_>>();
    let unit_types = raw
        .units
        .into_iter()
        .map(|(id, u)| u.compile(id, &tech_ids))
        .collect::<Result<Vec<_>, _>>()?;
    let buildings = raw
        .buildings
        .into_iter()
        .map(|(id, b)| b.compile(id, &tech_ids))
        .collect::<Result<Vec<_>, _>>()?;
    let techs = raw
        .techs
        .into_iter()
        .map(|(id, t)| t.compile(id, &tech_ids))
        .collect::<Result<Vec<_>, _>>()?;
    let policies = raw
        .policies
        .into_iter()
        .map(|(id, p)| p.compile(id, &policy_ids))
        .collect::<Result<Vec<_>, _>>()?;
    let promotions = raw
        .promotions
        .into_iter()
        .map(|(id, p)| p.compile(id, &promotion_ids))
        .collect::<Result<Vec<_>, _>>()?;
    let beliefs = raw
        .beliefs
        .unwrap_or_default()
        .into_iter()
        .map(|(id, b)| b.compile(id))
        .collect::<Vec<_>>();
    let resources = raw
        .resources
        .unwrap_or_default()
        .into_iter()
        .map(|(id, r)| r.compile(id))
        .collect::<Vec<_>>();

    // Prerequisite graphs must be acyclic so every adoption walk
    // terminates. The surviving topological orders are kept on the
    // catalog as proof and for deterministic iteration.
    let tech_order = topological_order(
        techs.len(),
        |i| techs[i].prerequisites.iter().map(|id| id.raw as usize),
        |i| techs[i].id.clone(),
    )?
    .into_iter()
    .map(|i| TechId::new(i as u16))
    .collect();
    let promotion_order = topological_order(
        promotions.len(),
        |i| promotions[i].prerequisites.iter().map(|id| id.raw as usize),
        |i| promotions[i].id.clone(),
    )?
    .into_iter()
    .map(|i| PromotionId::new(i as u16))
    .collect();
    let policy_order = topological_order(
        policies.len(),
        |i| policies[i].prerequisites.iter().map(|id| id.raw as usize),
        |i| policies[i].id.clone(),
    )?
    .into_iter()
    .map(|i| PolicyId::new(i as u16))
    .collect();

    let mut catalog = Catalog {
        terrains,
        unit_types,
        buildings,
        techs,
        policies,
        promotions,
        beliefs,
        resources,
        terrain_ids,
        unit_type_ids,
        building_ids,
        tech_ids,
        policy_ids,
        promotion_ids,
        belief_ids,
        resource_ids,
        tech_order,
        promotion_order,
        policy_order,
        effect_index: EffectIndex::default(),
    };
    catalog.effect_index = EffectIndex::build(&catalog);
    Ok(catalog)
}

/// Kahn's algorithm over a prerequisite graph. Lower-indexed nodes
/// are emitted first among ties, keeping the order stable across
/// loads. Any leftover node sits on a cycle.
fn topological_order<P, I, N>(
    count: usize,
    prereqs_of: P,
    name_of: N,
) -> Result<Vec<usize>, CatalogError>
where
    P: Fn(usize) -> I,
    I: Iterator<Item = usize>,
    N: Fn(usize) -> DataId,
{
    let mut in_degree = vec![0_usize; count];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); count];
    for node in 0..count {
        for prereq in prereqs_of(node) {
            in_degree[node] += 1;
            dependents[prereq].push(node);
        }
    }

    let mut ready: Vec<usize> = (0..count).filter(|&n| in_degree[n] == 0).collect();
    ready.sort_unstable();
    ready.reverse();

    let mut order = Vec::with_capacity(count);
    while let Some(node) = ready.pop() {
        order.push(node);
        for &dep in &dependents[node] {
            in_degree[dep] -= 1;
            if in_degree[dep] == 0 {
                // Insert keeping the ready stack sorted descending.
                let pos = ready
                    .binary_search_by(|probe| dep.cmp(probe))
                    .unwrap_or_else(|e| e);
                ready.insert(pos, dep);
            }
        }
    }

    if order.len() < count {
        let stuck = (0..count)
            .find(|&n| in_degree[n] > 0)
            .expect("cycle implies a stuck node");
        return Err(CatalogError::CyclicPrerequisite(name_of(stuck)));
    }
    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_catalog_loads() {
        let catalog = load_catalog(CatalogSource::Embedded).expect("embedded catalog");
        assert!(catalog.terrain_id("plains").is_some());
        assert!(catalog.unit_type_id("warrior").is_some());
        assert!(!catalog.tech_order.is_empty());
    }

    #[test]
    fn topological_order_respects_prerequisites() {
        let catalog = load_catalog(CatalogSource::Embedded).expect("embedded catalog");
        let mut seen = std::collections::BTreeSet::new();
        for &tech in &catalog.tech_order {
            for prereq in &catalog.tech(tech).prerequisites {
                assert!(seen.contains(prereq), "prereq must precede dependent");
            }
            seen.insert(tech);
        }
    }

    #[test]
    fn cyclic_tech_prerequisites_are_rejected() {
        let techs = b"alpha: { cost: 10, prerequisites: [beta] }\nbeta: { cost: 10, prerequisites: [alpha] }\n";
        let err = load_catalog(CatalogSource::Bytes {
            terrain: b"plains: { move_cost: 1 }\n",
            units: b"{}",
            buildings: b"{}",
            techs,
            policies: b"{}",
            promotions: b"{}",
            beliefs: None,
            resources: None,
        })
        .expect_err("cycle must be rejected");
        assert!(matches!(err, CatalogError::CyclicPrerequisite(_)));
    }

    #[test]
    fn dangling_reference_is_rejected_at_load() {
        let err = load_catalog(CatalogSource::Bytes {
            terrain: b"plains: { move_cost: 1 }\n",
            units: b"warrior: { category: melee, strength: 8, moves: 2, cost: 40, tech_required: no_such_tech }\n",
            buildings: b"{}",
            techs: b"{}",
            policies: b"{}",
            promotions: b"{}",
            beliefs: None,
            resources: None,
        })
        .expect_err("dangling id must be rejected");
        match err {
            CatalogError::DanglingReference(id) => assert_eq!(id, "no_such_tech"),
            other => panic!("unexpected error: {other}"),
        }
    }
}
