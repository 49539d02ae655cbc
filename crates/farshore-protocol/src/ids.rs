use std::marker::PhantomData;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Data ids are the strings used in catalog YAML files. They are
/// human-readable and stable across versions; the engine emits them
/// unchanged for localization lookup.
pub type DataId = String;

/// Catalog ids are small integers interned when the catalog is
/// compiled. Fast, deterministic, and type-tagged so a `TechId` can
/// never be passed where a `PromotionId` is expected.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CatalogId<T> {
    pub raw: u16,
    #[serde(skip)]
    _marker: PhantomData<T>,
}

impl<T> CatalogId<T> {
    #[inline]
    pub const fn new(raw: u16) -> Self {
        Self {
            raw,
            _marker: PhantomData,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TerrainTag;
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UnitTypeTag;
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BuildingTag;
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TechTag;
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PolicyTag;
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PromotionTag;
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BeliefTag;
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceTag;

pub type TerrainId = CatalogId<TerrainTag>;
pub type UnitTypeId = CatalogId<UnitTypeTag>;
pub type BuildingId = CatalogId<BuildingTag>;
pub type TechId = CatalogId<TechTag>;
pub type PolicyId = CatalogId<PolicyTag>;
pub type PromotionId = CatalogId<PromotionTag>;
pub type BeliefId = CatalogId<BeliefTag>;
pub type ResourceId = CatalogId<ResourceTag>;

/// Generational handle into an entity arena. The arena for a kind is
/// authoritative; every other reference is a lookup by this id.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId {
    pub index: u32,
    pub generation: u32,
}

impl EntityId {
    #[inline]
    pub const fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    #[inline]
    pub const fn from_raw(raw: u64) -> Self {
        Self {
            index: (raw >> 32) as u32,
            generation: raw as u32,
        }
    }

    #[inline]
    pub const fn to_raw(self) -> u64 {
        ((self.index as u64) << 32) | (self.generation as u64)
    }
}

impl Serialize for EntityId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(self.to_raw())
    }
}

impl<'de> Deserialize<'de> for EntityId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = u64::deserialize(deserializer)?;
        Ok(Self::from_raw(raw))
    }
}

pub type UnitId = EntityId;
pub type CityId = EntityId;

/// Civilization id is a simple index into the world's turn-order list.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CivId(pub u8);
