//! Axis-aligned geometry used as bounding shapes.
//!
//! Regions are closed: two regions that only touch on a boundary intersect, and
//! containment includes the boundary. A [`Point`] behaves like a degenerate
//! [`Region`] whose low and high corners coincide.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A bounding shape that the index can store and query with.
pub trait Shape {
    /// Number of dimensions of the shape.
    fn dimension(&self) -> usize;

    /// Minimal bounding region of the shape.
    fn mbr(&self) -> Region;

    /// Whether the shape intersects `region` (boundary inclusive).
    fn intersects_region(&self, region: &Region) -> bool;

    /// Whether the shape entirely contains `region` (boundary inclusive).
    fn contains_region(&self, region: &Region) -> bool;

    /// Minimum Euclidean distance between the shape and `region`.
    fn minimum_distance(&self, region: &Region) -> f64;

    /// Area (hyper-volume) of the shape.
    fn area(&self) -> f64;
}

/// A point in D-dimensional space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub coords: Vec<f64>,
}

impl Point {
    pub fn new(coords: impl Into<Vec<f64>>) -> Point {
        Point {
            coords: coords.into(),
        }
    }

    /// Coordinate along `dim`, `None` past the last dimension.
    pub fn coord(&self, dim: usize) -> Option<f64> {
        self.coords.get(dim).copied()
    }
}

impl From<Vec<f64>> for Point {
    fn from(coords: Vec<f64>) -> Self {
        Point::new(coords)
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Point{:?}", self.coords)
    }
}

impl Shape for Point {
    fn dimension(&self) -> usize {
        self.coords.len()
    }

    fn mbr(&self) -> Region {
        Region::from_point(self)
    }

    fn intersects_region(&self, region: &Region) -> bool {
        region.contains_point(self)
    }

    fn contains_region(&self, region: &Region) -> bool {
        // Only a degenerate region equal to the point fits inside it.
        self.coords
            .iter()
            .zip(region.low.iter().zip(region.high.iter()))
            .all(|(&c, (&lo, &hi))| lo == c && hi == c)
    }

    fn minimum_distance(&self, region: &Region) -> f64 {
        region.minimum_distance_to_point(self)
    }

    fn area(&self) -> f64 {
        0.0
    }
}

/// An axis-aligned region given by its low and high corners.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub low: Vec<f64>,
    pub high: Vec<f64>,
}

impl Region {
    /// Creates a region from its corners. Coordinates are normalised so that
    /// `low[i] <= high[i]` in every dimension.
    pub fn new(low: impl Into<Vec<f64>>, high: impl Into<Vec<f64>>) -> Region {
        let mut low = low.into();
        let mut high = high.into();
        for (lo, hi) in low.iter_mut().zip(high.iter_mut()) {
            if *lo > *hi {
                std::mem::swap(lo, hi);
            }
        }
        Region { low, high }
    }

    /// Convenience constructor for two-dimensional regions.
    pub fn new_2d(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Region {
        Region::new(vec![min_x, min_y], vec![max_x, max_y])
    }

    pub fn from_point(point: &Point) -> Region {
        Region {
            low: point.coords.clone(),
            high: point.coords.clone(),
        }
    }

    /// The empty region of `dimension` dimensions; combining with it is a no-op.
    pub fn infinite_empty(dimension: usize) -> Region {
        Region {
            low: vec![f64::INFINITY; dimension],
            high: vec![f64::NEG_INFINITY; dimension],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.low.iter().zip(self.high.iter()).any(|(lo, hi)| lo > hi)
    }

    pub fn intersects(&self, other: &Region) -> bool {
        self.low
            .iter()
            .zip(self.high.iter())
            .zip(other.low.iter().zip(other.high.iter()))
            .all(|((&lo, &hi), (&olo, &ohi))| lo <= ohi && olo <= hi)
    }

    pub fn contains(&self, other: &Region) -> bool {
        self.low
            .iter()
            .zip(self.high.iter())
            .zip(other.low.iter().zip(other.high.iter()))
            .all(|((&lo, &hi), (&olo, &ohi))| lo <= olo && ohi <= hi)
    }

    pub fn contains_point(&self, point: &Point) -> bool {
        self.low
            .iter()
            .zip(self.high.iter())
            .zip(point.coords.iter())
            .all(|((&lo, &hi), &c)| lo <= c && c <= hi)
    }

    /// Whether the regions share a boundary coordinate in some dimension.
    pub fn touches(&self, other: &Region) -> bool {
        self.intersects(other)
            && self
                .low
                .iter()
                .zip(self.high.iter())
                .zip(other.low.iter().zip(other.high.iter()))
                .any(|((&lo, &hi), (&olo, &ohi))| lo == ohi || hi == olo || lo == olo || hi == ohi)
    }

    pub fn area(&self) -> f64 {
        if self.is_empty() {
            return 0.0;
        }
        self.low
            .iter()
            .zip(self.high.iter())
            .map(|(lo, hi)| hi - lo)
            .product()
    }

    /// Sum of the edge lengths (the R* "margin").
    pub fn margin(&self) -> f64 {
        if self.is_empty() {
            return 0.0;
        }
        self.low
            .iter()
            .zip(self.high.iter())
            .map(|(lo, hi)| hi - lo)
            .sum()
    }

    pub fn combine(&mut self, other: &Region) {
        for (lo, olo) in self.low.iter_mut().zip(other.low.iter()) {
            *lo = lo.min(*olo);
        }
        for (hi, ohi) in self.high.iter_mut().zip(other.high.iter()) {
            *hi = hi.max(*ohi);
        }
    }

    pub fn combined(&self, other: &Region) -> Region {
        let mut result = self.clone();
        result.combine(other);
        result
    }

    /// Area increase needed for this region to also cover `other`.
    pub fn enlargement(&self, other: &Region) -> f64 {
        self.combined(other).area() - self.area()
    }

    /// Area of the intersection, `0.0` when disjoint.
    pub fn intersecting_area(&self, other: &Region) -> f64 {
        self.low
            .iter()
            .zip(self.high.iter())
            .zip(other.low.iter().zip(other.high.iter()))
            .map(|((&lo, &hi), (&olo, &ohi))| (hi.min(ohi) - lo.max(olo)).max(0.0))
            .product()
    }

    /// The intersection region; empty when the regions are disjoint.
    pub fn intersection(&self, other: &Region) -> Region {
        let low = self
            .low
            .iter()
            .zip(other.low.iter())
            .map(|(a, b)| a.max(*b))
            .collect();
        let high = self
            .high
            .iter()
            .zip(other.high.iter())
            .map(|(a, b)| a.min(*b))
            .collect();
        Region { low, high }
    }

    pub fn center(&self) -> Point {
        Point::new(
            self.low
                .iter()
                .zip(self.high.iter())
                .map(|(lo, hi)| (lo + hi) / 2.0)
                .collect::<Vec<_>>(),
        )
    }

    pub fn minimum_distance_to_point(&self, point: &Point) -> f64 {
        self.low
            .iter()
            .zip(self.high.iter())
            .zip(point.coords.iter())
            .map(|((&lo, &hi), &c)| {
                let d = if c < lo {
                    lo - c
                } else if c > hi {
                    c - hi
                } else {
                    0.0
                };
                d * d
            })
            .sum::<f64>()
            .sqrt()
    }

    pub fn minimum_distance_to_region(&self, other: &Region) -> f64 {
        self.low
            .iter()
            .zip(self.high.iter())
            .zip(other.low.iter().zip(other.high.iter()))
            .map(|((&lo, &hi), (&olo, &ohi))| {
                let d = if ohi < lo {
                    lo - ohi
                } else if olo > hi {
                    olo - hi
                } else {
                    0.0
                };
                d * d
            })
            .sum::<f64>()
            .sqrt()
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Region({:?}, {:?})", self.low, self.high)
    }
}

impl Shape for Region {
    fn dimension(&self) -> usize {
        self.low.len()
    }

    fn mbr(&self) -> Region {
        self.clone()
    }

    fn intersects_region(&self, region: &Region) -> bool {
        self.intersects(region)
    }

    fn contains_region(&self, region: &Region) -> bool {
        self.contains(region)
    }

    fn minimum_distance(&self, region: &Region) -> f64 {
        self.minimum_distance_to_region(region)
    }

    fn area(&self) -> f64 {
        Region::area(self)
    }
}
