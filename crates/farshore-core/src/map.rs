use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use farshore_protocol::{CityId, CivId, Hex, ResourceId, TerrainId, UnitId};

use crate::rules::Catalog;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Tile {
    pub terrain: TerrainId,
    pub resource: Option<ResourceId>,
    pub owner: Option<CivId>,
    pub city: Option<CityId>,
    /// Units standing on this tile, in arrival order. The unit arena
    /// is authoritative; this is a spatial index kept in sync by the
    /// world's move/spawn/remove paths.
    #[serde(default)]
    pub occupants: Vec<UnitId>,
}

impl Tile {
    pub fn new(terrain: TerrainId) -> Self {
        Self {
            terrain,
            resource: None,
            owner: None,
            city: None,
            occupants: Vec::new(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct GameMap {
    width: u32,
    height: u32,
    tiles: Vec<Tile>,
    wrap_horizontal: bool,
}

impl GameMap {
    pub fn new(width: u32, height: u32, wrap_horizontal: bool, default_terrain: TerrainId) -> Self {
        let tiles = vec![Tile::new(default_terrain); (width as usize) * (height as usize)];
        Self {
            width,
            height,
            tiles,
            wrap_horizontal,
        }
    }

    pub fn from_tiles(width: u32, height: u32, wrap_horizontal: bool, tiles: Vec<Tile>) -> Self {
        debug_assert_eq!(tiles.len(), (width as usize) * (height as usize));
        Self {
            width,
            height,
            tiles,
            wrap_horizontal,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn wrap_horizontal(&self) -> bool {
        self.wrap_horizontal
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    pub fn tiles(&self) -> &[Tile] {
        &self.tiles
    }

    /// Map a coordinate onto the stored grid: rows clamp, columns wrap
    /// when the map is cylindrical. `None` means off the map.
    pub fn normalize_hex(&self, hex: Hex) -> Option<Hex> {
        if hex.r < 0 || hex.r >= self.height as i32 {
            return None;
        }
        let q = if self.wrap_horizontal {
            hex.q.rem_euclid(self.width as i32)
        } else if hex.q >= 0 && hex.q < self.width as i32 {
            hex.q
        } else {
            return None;
        };
        Some(Hex { q, r: hex.r })
    }

    pub fn index_of(&self, hex: Hex) -> Option<usize> {
        let hex = self.normalize_hex(hex)?;
        Some((hex.r as usize) * (self.width as usize) + (hex.q as usize))
    }

    pub fn hex_at_index(&self, index: usize) -> Option<Hex> {
        if index >= self.tiles.len() {
            return None;
        }
        Some(Hex {
            q: (index % self.width as usize) as i32,
            r: (index / self.width as usize) as i32,
        })
    }

    pub fn get(&self, hex: Hex) -> Option<&Tile> {
        self.index_of(hex).map(|i| &self.tiles[i])
    }

    pub fn get_mut(&mut self, hex: Hex) -> Option<&mut Tile> {
        self.index_of(hex).map(move |i| &mut self.tiles[i])
    }

    pub fn neighbors(&self, hex: Hex) -> impl Iterator<Item = Hex> + '_ {
        hex.neighbors()
            .into_iter()
            .filter_map(|n| self.normalize_hex(n))
    }

    pub fn is_adjacent(&self, a: Hex, b: Hex) -> bool {
        let Some(b) = self.normalize_hex(b) else {
            return false;
        };
        self.neighbors(a).any(|n| n == b)
    }

    /// Wrap-aware distance between two on-map tiles.
    pub fn distance(&self, a: Hex, b: Hex) -> Option<i32> {
        let a = self.normalize_hex(a)?;
        let b = self.normalize_hex(b)?;
        let direct = a.distance(b);
        if !self.wrap_horizontal {
            return Some(direct);
        }
        let width = self.width as i32;
        let east = a.distance(Hex { q: b.q + width, r: b.r });
        let west = a.distance(Hex { q: b.q - width, r: b.r });
        Some(direct.min(east).min(west))
    }

    /// Tile indices within `radius` steps of `center` (inclusive), in
    /// stable index order. Walks the adjacency graph so wrap seams
    /// come out right.
    pub fn indices_in_range(&self, center: Hex, radius: i32) -> Vec<usize> {
        let Some(start) = self.index_of(center) else {
            return Vec::new();
        };
        let radius = radius.max(0);

        let mut dist = vec![i32::MAX; self.len()];
        dist[start] = 0;

        let mut queue = VecDeque::new();
        queue.push_back(start);
        while let Some(index) = queue.pop_front() {
            let d = dist[index];
            if d >= radius {
                continue;
            }
            let hex = self.hex_at_index(index).expect("queued index is in bounds");
            for neighbor in self.neighbors(hex) {
                let n = self.index_of(neighbor).expect("normalized hex has an index");
                if dist[n] <= d + 1 {
                    continue;
                }
                dist[n] = d + 1;
                queue.push_back(n);
            }
        }

        (0..self.len()).filter(|&i| dist[i] <= radius).collect()
    }

    /// Cost in movement points of stepping onto `to` from an adjacent
    /// tile. `None` when the step is illegal.
    pub fn step_cost(&self, from: Hex, to: Hex, catalog: &Catalog) -> Option<i32> {
        if !self.is_adjacent(from, to) {
            return None;
        }
        let tile = self.get(to)?;
        let terrain = catalog.terrain(tile.terrain);
        if terrain.impassable {
            return None;
        }
        Some(terrain.move_cost)
    }

    /// Whether a straight shot from `from` to `to` is unobstructed.
    /// Rough terrain strictly between the endpoints blocks it.
    pub fn line_of_sight(&self, from: Hex, to: Hex, catalog: &Catalog) -> bool {
        let (Some(from), Some(to)) = (self.normalize_hex(from), self.normalize_hex(to)) else {
            return false;
        };
        for hex in Hex::line(from, to) {
            if hex == from || hex == to {
                continue;
            }
            let Some(tile) = self.get(hex) else {
                return false;
            };
            let terrain = catalog.terrain(tile.terrain);
            if terrain.rough || terrain.impassable {
                return false;
            }
        }
        true
    }

    pub fn place_unit(&mut self, hex: Hex, unit: UnitId) {
        if let Some(tile) = self.get_mut(hex) {
            if !tile.occupants.contains(&unit) {
                tile.occupants.push(unit);
            }
        }
    }

    pub fn displace_unit(&mut self, hex: Hex, unit: UnitId) {
        if let Some(tile) = self.get_mut(hex) {
            tile.occupants.retain(|&u| u != unit);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat_map(width: u32, height: u32, wrap: bool) -> GameMap {
        GameMap::new(width, height, wrap, TerrainId::new(0))
    }

    #[test]
    fn normalize_wraps_columns_but_not_rows() {
        let map = flat_map(10, 8, true);
        assert_eq!(
            map.normalize_hex(Hex { q: -1, r: 3 }),
            Some(Hex { q: 9, r: 3 })
        );
        assert_eq!(
            map.normalize_hex(Hex { q: 12, r: 0 }),
            Some(Hex { q: 2, r: 0 })
        );
        assert_eq!(map.normalize_hex(Hex { q: 0, r: -1 }), None);
        assert_eq!(map.normalize_hex(Hex { q: 0, r: 8 }), None);
    }

    #[test]
    fn flat_map_rejects_out_of_bounds_columns() {
        let map = flat_map(10, 8, false);
        assert_eq!(map.normalize_hex(Hex { q: -1, r: 3 }), None);
        assert!(map.get(Hex { q: 9, r: 7 }).is_some());
    }

    #[test]
    fn adjacency_crosses_the_wrap_seam() {
        let map = flat_map(10, 8, true);
        assert!(map.is_adjacent(Hex { q: 0, r: 3 }, Hex { q: 9, r: 3 }));
        assert_eq!(map.distance(Hex { q: 0, r: 3 }, Hex { q: 9, r: 3 }), Some(1));
    }

    #[test]
    fn range_counts_match_hex_geometry_away_from_edges() {
        let map = flat_map(20, 20, false);
        let center = Hex { q: 10, r: 10 };
        assert_eq!(map.indices_in_range(center, 1).len(), 7);
        assert_eq!(map.indices_in_range(center, 2).len(), 19);
    }

    #[test]
    fn occupant_index_tracks_place_and_displace() {
        let mut map = flat_map(4, 4, false);
        let unit = UnitId::new(0, 0);
        let hex = Hex { q: 1, r: 1 };

        map.place_unit(hex, unit);
        map.place_unit(hex, unit);
        assert_eq!(map.get(hex).unwrap().occupants, vec![unit]);

        map.displace_unit(hex, unit);
        assert!(map.get(hex).unwrap().occupants.is_empty());
    }
}
