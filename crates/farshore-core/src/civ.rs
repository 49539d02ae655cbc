use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use farshore_protocol::{BeliefId, CivId, PolicyId, TechId};

use crate::rules::Catalog;

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct Research {
    pub tech: TechId,
    pub progress: i32,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Civilization {
    pub id: CivId,
    pub name: String,
    pub is_ai: bool,
    /// Set once the civilization first places a unit or city. A civ
    /// that never got on the board cannot have been wiped out.
    pub established: bool,
    pub gold: i32,
    pub culture: i32,
    pub faith: i32,
    pub happiness: i32,
    pub techs: BTreeSet<TechId>,
    pub researching: Option<Research>,
    pub policies: BTreeSet<PolicyId>,
    pub beliefs: BTreeSet<BeliefId>,
    /// Diplomatic standing toward each other civilization. Negative
    /// is hostile; the AI uses it to pick targets.
    pub relations: BTreeMap<CivId, i32>,
    pub at_war_with: BTreeSet<CivId>,
}

impl Civilization {
    pub fn new(id: CivId, name: String, is_ai: bool) -> Self {
        Self {
            id,
            name,
            is_ai,
            established: false,
            gold: 0,
            culture: 0,
            faith: 0,
            happiness: 0,
            techs: BTreeSet::new(),
            researching: None,
            policies: BTreeSet::new(),
            beliefs: BTreeSet::new(),
            relations: BTreeMap::new(),
            at_war_with: BTreeSet::new(),
        }
    }

    pub fn has_tech(&self, tech: TechId) -> bool {
        self.techs.contains(&tech)
    }

    pub fn is_at_war_with(&self, other: CivId) -> bool {
        self.at_war_with.contains(&other)
    }

    pub fn is_at_war(&self) -> bool {
        !self.at_war_with.is_empty()
    }

    /// A tech is researchable once every prerequisite is owned and it
    /// is not already known.
    pub fn can_research(&self, tech: TechId, catalog: &Catalog) -> bool {
        !self.has_tech(tech)
            && catalog
                .tech(tech)
                .prerequisites
                .iter()
                .all(|&p| self.has_tech(p))
    }

    /// Bank science toward the active tech. A finished tech is added
    /// to the known set and returned; science above the cost is
    /// discarded, so the next pick starts from zero.
    pub fn advance_research(&mut self, science: i32, catalog: &Catalog) -> Option<TechId> {
        let research = self.researching.as_mut()?;
        research.progress += science.max(0);
        let cost = catalog.tech(research.tech).cost;
        if research.progress < cost {
            return None;
        }
        let finished = research.tech;
        self.techs.insert(finished);
        self.researching = None;
        Some(finished)
    }

    pub fn can_adopt_policy(&self, policy: PolicyId, catalog: &Catalog) -> bool {
        !self.policies.contains(&policy)
            && self.culture >= catalog.policy(policy).culture_cost
            && catalog
                .policy(policy)
                .prerequisites
                .iter()
                .all(|p| self.policies.contains(p))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::{load_catalog, CatalogSource};

    #[test]
    fn research_completes_at_cost_and_records_the_tech() {
        let catalog = load_catalog(CatalogSource::Embedded).expect("embedded catalog");
        let tech = catalog.tech_id("bronze_working").expect("base tech");
        let mut civ = Civilization::new(CivId(0), "Farshore".to_string(), false);
        civ.researching = Some(Research { tech, progress: 0 });

        let cost = catalog.tech(tech).cost;
        assert_eq!(civ.advance_research(cost - 1, &catalog), None);
        civ.researching = Some(Research {
            tech,
            progress: cost - 1,
        });
        assert_eq!(civ.advance_research(1, &catalog), Some(tech));
        assert!(civ.has_tech(tech));
        assert!(civ.researching.is_none());
    }

    #[test]
    fn prerequisites_gate_research_selection() {
        let catalog = load_catalog(CatalogSource::Embedded).expect("embedded catalog");
        let iron = catalog.tech_id("iron_working").expect("base tech");
        let bronze = catalog.tech_id("bronze_working").expect("base tech");
        let mut civ = Civilization::new(CivId(0), "Farshore".to_string(), false);

        assert!(!civ.can_research(iron, &catalog));
        civ.techs.insert(bronze);
        assert!(civ.can_research(iron, &catalog));
    }
}
