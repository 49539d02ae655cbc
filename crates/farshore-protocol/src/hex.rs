use serde::{Deserialize, Serialize};

/// Pointy-top axial hex coordinate (q, r); the implicit cube
/// coordinate is `s = -q - r`.
///
/// Every geometry query here is pure and deterministic. The renderer
/// caches vertex positions keyed only by coordinate, so orientation
/// and neighbor order must never change.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Hex {
    pub q: i32,
    pub r: i32,
}

impl Hex {
    /// Neighbor offsets in fixed order: E, NE, NW, W, SW, SE.
    pub const DIRECTIONS: [Hex; 6] = [
        Hex { q: 1, r: 0 },
        Hex { q: 1, r: -1 },
        Hex { q: 0, r: -1 },
        Hex { q: -1, r: 0 },
        Hex { q: -1, r: 1 },
        Hex { q: 0, r: 1 },
    ];

    #[inline]
    pub const fn new(q: i32, r: i32) -> Self {
        Self { q, r }
    }

    #[inline]
    pub const fn s(self) -> i32 {
        -self.q - self.r
    }

    /// The six adjacent coordinates, in `DIRECTIONS` order. Bounds are
    /// the map's concern, not the coordinate system's.
    pub fn neighbors(self) -> impl Iterator<Item = Hex> {
        Self::DIRECTIONS.into_iter().map(move |d| self + d)
    }

    /// Hex grid distance (half the cube L1 norm).
    #[inline]
    pub fn distance(self, other: Hex) -> i32 {
        ((self.q - other.q).abs() + (self.r - other.r).abs() + (self.s() - other.s()).abs()) / 2
    }

    /// All hexes at exactly `radius` distance, in deterministic ring
    /// order starting southwest of `self`.
    pub fn ring(self, radius: i32) -> impl Iterator<Item = Hex> {
        RingIter::new(self, radius)
    }

    /// All hexes with distance `<= radius`, in deterministic
    /// (dq ascending, dr ascending) order. Yields `1 + 3r(r+1)` hexes.
    pub fn range(self, radius: i32) -> impl Iterator<Item = Hex> {
        let radius = radius.max(0);
        (-radius..=radius).flat_map(move |dq| {
            let lo = (-radius).max(-dq - radius);
            let hi = radius.min(-dq + radius);
            (lo..=hi).map(move |dr| Hex::new(self.q + dq, self.r + dr))
        })
    }

    /// Ordered inclusive line from `self` to `other`, for
    /// line-of-sight tracing. Cube-lerp with rounding; ties are broken
    /// deterministically by nudging toward larger q.
    pub fn line(self, other: Hex) -> Vec<Hex> {
        let n = self.distance(other);
        if n == 0 {
            return vec![self];
        }

        let mut out = Vec::with_capacity(n as usize + 1);
        for step in 0..=n {
            let t = step as f64 / n as f64;
            // Epsilon pushes midpoint samples off grid-edge ties.
            let q = self.q as f64 + (other.q - self.q) as f64 * t + 1e-6;
            let r = self.r as f64 + (other.r - self.r) as f64 * t - 2e-6;
            out.push(round_axial(q, r));
        }
        out
    }
}

fn round_axial(qf: f64, rf: f64) -> Hex {
    let sf = -qf - rf;
    let mut q = qf.round();
    let mut r = rf.round();
    let s = sf.round();

    let dq = (q - qf).abs();
    let dr = (r - rf).abs();
    let ds = (s - sf).abs();

    if dq > dr && dq > ds {
        q = -r - s;
    } else if dr > ds {
        r = -q - s;
    }
    Hex::new(q as i32, r as i32)
}

impl std::ops::Add for Hex {
    type Output = Hex;

    fn add(self, other: Hex) -> Hex {
        Hex::new(self.q + other.q, self.r + other.r)
    }
}

impl std::ops::Mul<i32> for Hex {
    type Output = Hex;

    fn mul(self, rhs: i32) -> Hex {
        Hex::new(self.q * rhs, self.r * rhs)
    }
}

struct RingIter {
    radius: i32,
    side: usize,
    step: i32,
    current: Option<Hex>,
}

impl RingIter {
    fn new(center: Hex, radius: i32) -> Self {
        let current = (radius > 0).then(|| center + Hex::DIRECTIONS[4] * radius);
        Self {
            radius,
            side: 0,
            step: 0,
            current,
        }
    }
}

impl Iterator for RingIter {
    type Item = Hex;

    fn next(&mut self) -> Option<Self::Item> {
        let out = self.current?;

        self.step += 1;
        if self.step >= self.radius {
            self.step = 0;
            self.side += 1;
            if self.side >= 6 {
                self.current = None;
                return Some(out);
            }
        }
        self.current = Some(out + Hex::DIRECTIONS[self.side]);
        Some(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distance_is_cube_metric() {
        assert_eq!(Hex::new(0, 0).distance(Hex::new(3, -1)), 3);
        assert_eq!(Hex::new(0, 0).distance(Hex::new(0, 0)), 0);
        assert_eq!(Hex::new(-2, 1).distance(Hex::new(2, -1)), 4);
    }

    #[test]
    fn neighbors_are_all_adjacent() {
        let center = Hex::new(4, -2);
        let neighbors: Vec<_> = center.neighbors().collect();
        assert_eq!(neighbors.len(), 6);
        assert!(neighbors.iter().all(|n| center.distance(*n) == 1));
    }

    #[test]
    fn range_counts_match_hex_formula() {
        let center = Hex::new(0, 0);
        for radius in 0..=4 {
            let count = center.range(radius).count() as i32;
            assert_eq!(count, 1 + 3 * radius * (radius + 1));
        }
    }

    #[test]
    fn ring_hexes_sit_at_exact_radius() {
        let center = Hex::new(1, 1);
        for radius in 1..=3 {
            let ring: Vec<_> = center.ring(radius).collect();
            assert_eq!(ring.len(), (6 * radius) as usize);
            assert!(ring.iter().all(|h| center.distance(*h) == radius));
        }
    }

    #[test]
    fn line_is_ordered_and_inclusive() {
        let a = Hex::new(0, 0);
        let b = Hex::new(4, -2);
        let line = a.line(b);
        assert_eq!(line.first(), Some(&a));
        assert_eq!(line.last(), Some(&b));
        assert_eq!(line.len() as i32, a.distance(b) + 1);
        for pair in line.windows(2) {
            assert_eq!(pair[0].distance(pair[1]), 1);
        }
    }
}
