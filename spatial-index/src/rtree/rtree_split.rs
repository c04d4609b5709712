//! Node split heuristics.
//!
//! Every heuristic partitions an overflowing node's entries into two groups
//! that both hold at least `min` entries. Results depend only on the input
//! order, never on hashing or randomness.

use crate::config::TreeVariant;
use crate::shape::Region;

use super::rtree_types::ChildEntry;

/// Splits `entries` into two groups of at least `min` entries each.
pub(crate) fn split_entries(
    entries: Vec<ChildEntry>,
    min: usize,
    variant: TreeVariant,
) -> (Vec<ChildEntry>, Vec<ChildEntry>) {
    debug_assert!(entries.len() >= 2 && min >= 1 && 2 * min <= entries.len());

    let first_group = match variant {
        TreeVariant::Linear => {
            let seeds = pick_seeds_linear(&entries);
            distribute(&entries, seeds, min, false)
        }
        TreeVariant::Quadratic => {
            let seeds = pick_seeds_quadratic(&entries);
            distribute(&entries, seeds, min, true)
        }
        TreeVariant::RStar => rstar_distribution(&entries, min),
    };

    let mut first = Vec::with_capacity(entries.len());
    let mut second = Vec::with_capacity(entries.len());
    for (entry, in_first) in entries.into_iter().zip(first_group) {
        if in_first {
            first.push(entry);
        } else {
            second.push(entry);
        }
    }
    (first, second)
}

/// Pair with the greatest normalised separation along any dimension.
fn pick_seeds_linear(entries: &[ChildEntry]) -> (usize, usize) {
    let dimension = entries[0].region.low.len();
    let mut best = (0, 1);
    let mut best_separation = f64::NEG_INFINITY;

    for dim in 0..dimension {
        let mut highest_low = 0;
        let mut lowest_high = 0;
        let mut min_low = f64::INFINITY;
        let mut max_high = f64::NEG_INFINITY;

        for (i, entry) in entries.iter().enumerate() {
            if entry.region.low[dim] > entries[highest_low].region.low[dim] {
                highest_low = i;
            }
            if entry.region.high[dim] < entries[lowest_high].region.high[dim] {
                lowest_high = i;
            }
            min_low = min_low.min(entry.region.low[dim]);
            max_high = max_high.max(entry.region.high[dim]);
        }

        if highest_low == lowest_high {
            lowest_high = if highest_low == 0 { 1 } else { 0 };
        }

        let width = max_high - min_low;
        let gap = entries[highest_low].region.low[dim] - entries[lowest_high].region.high[dim];
        let separation = if width > 0.0 { gap / width } else { 0.0 };

        if separation > best_separation {
            best_separation = separation;
            best = (lowest_high, highest_low);
        }
    }
    best
}

/// Pair that wastes the most area when covered together.
fn pick_seeds_quadratic(entries: &[ChildEntry]) -> (usize, usize) {
    let mut best = (0, 1);
    let mut best_waste = f64::NEG_INFINITY;
    let mut best_margin = f64::NEG_INFINITY;

    for i in 0..entries.len() {
        for j in i + 1..entries.len() {
            let a = &entries[i].region;
            let b = &entries[j].region;
            let combined = a.combined(b);
            let waste = combined.area() - a.area() - b.area();
            // degenerate (zero-area) entries fall back to the margin
            let margin = combined.margin();
            if waste > best_waste || (waste == best_waste && margin > best_margin) {
                best_waste = waste;
                best_margin = margin;
                best = (i, j);
            }
        }
    }
    best
}

/// Assigns the remaining entries around two seeds.
///
/// Returns `true` for every entry of the first group. With `pick_next` the
/// entry with the strongest preference for one group goes first, otherwise
/// entries are taken in input order.
fn distribute(
    entries: &[ChildEntry],
    seeds: (usize, usize),
    min: usize,
    pick_next: bool,
) -> Vec<bool> {
    let mut in_first = vec![false; entries.len()];
    in_first[seeds.0] = true;

    let mut mbrs = [
        entries[seeds.0].region.clone(),
        entries[seeds.1].region.clone(),
    ];
    let mut counts = [1usize, 1usize];
    let mut remaining: Vec<usize> = (0..entries.len())
        .filter(|&i| i != seeds.0 && i != seeds.1)
        .collect();

    while !remaining.is_empty() {
        // a group that needs every remaining entry to reach `min` takes them all
        for group in 0..2 {
            if counts[group] + remaining.len() <= min {
                for &i in &remaining {
                    in_first[i] = group == 0;
                }
                return in_first;
            }
        }

        let position = if pick_next {
            next_entry_position(entries, &remaining, &mbrs)
        } else {
            0
        };
        let index = remaining.remove(position);
        let region = &entries[index].region;
        let group = preferred_group(&mbrs, &counts, region);

        in_first[index] = group == 0;
        mbrs[group].combine(region);
        counts[group] += 1;
    }
    in_first
}

fn next_entry_position(entries: &[ChildEntry], remaining: &[usize], mbrs: &[Region; 2]) -> usize {
    let mut best = 0;
    let mut best_difference = f64::NEG_INFINITY;
    for (position, &i) in remaining.iter().enumerate() {
        let region = &entries[i].region;
        let difference = (mbrs[0].enlargement(region) - mbrs[1].enlargement(region)).abs();
        if difference > best_difference {
            best_difference = difference;
            best = position;
        }
    }
    best
}

/// Least enlargement, then smaller area, then fewer entries, then the first group.
fn preferred_group(mbrs: &[Region; 2], counts: &[usize; 2], region: &Region) -> usize {
    let e0 = mbrs[0].enlargement(region);
    let e1 = mbrs[1].enlargement(region);
    if e0 != e1 {
        return if e0 < e1 { 0 } else { 1 };
    }
    let a0 = mbrs[0].area();
    let a1 = mbrs[1].area();
    if a0 != a1 {
        return if a0 < a1 { 0 } else { 1 };
    }
    if counts[1] < counts[0] {
        1
    } else {
        0
    }
}

/// Orders of the entries along `axis`, by lower then by upper boundary.
fn axis_orders(entries: &[ChildEntry], axis: usize) -> [Vec<usize>; 2] {
    let mut by_low: Vec<usize> = (0..entries.len()).collect();
    by_low.sort_by(|&a, &b| {
        let (ra, rb) = (&entries[a].region, &entries[b].region);
        ra.low[axis]
            .total_cmp(&rb.low[axis])
            .then(ra.high[axis].total_cmp(&rb.high[axis]))
    });

    let mut by_high: Vec<usize> = (0..entries.len()).collect();
    by_high.sort_by(|&a, &b| {
        let (ra, rb) = (&entries[a].region, &entries[b].region);
        ra.high[axis]
            .total_cmp(&rb.high[axis])
            .then(ra.low[axis].total_cmp(&rb.low[axis]))
    });

    [by_low, by_high]
}

/// MBRs of every prefix and every suffix of `order`.
fn prefix_suffix_mbrs(entries: &[ChildEntry], order: &[usize]) -> (Vec<Region>, Vec<Region>) {
    let mut prefix: Vec<Region> = Vec::with_capacity(order.len());
    for &i in order {
        let next = match prefix.last() {
            Some(mbr) => mbr.combined(&entries[i].region),
            None => entries[i].region.clone(),
        };
        prefix.push(next);
    }

    let mut suffix: Vec<Region> = Vec::with_capacity(order.len());
    for &i in order.iter().rev() {
        let next = match suffix.last() {
            Some(mbr) => mbr.combined(&entries[i].region),
            None => entries[i].region.clone(),
        };
        suffix.push(next);
    }
    suffix.reverse();

    (prefix, suffix)
}

/// R* split: the axis with the smallest margin sum, then the distribution on
/// that axis with the least overlap, then the least total area.
fn rstar_distribution(entries: &[ChildEntry], min: usize) -> Vec<bool> {
    let n = entries.len();
    let dimension = entries[0].region.low.len();

    let mut best_axis = 0;
    let mut best_margin = f64::INFINITY;
    for axis in 0..dimension {
        let mut margin = 0.0;
        for order in axis_orders(entries, axis) {
            let (prefix, suffix) = prefix_suffix_mbrs(entries, &order);
            for k in min..=n - min {
                margin += prefix[k - 1].margin() + suffix[k].margin();
            }
        }
        if margin < best_margin {
            best_margin = margin;
            best_axis = axis;
        }
    }

    let mut best_order = Vec::new();
    let mut best_k = min;
    let mut best_overlap = f64::INFINITY;
    let mut best_area = f64::INFINITY;
    for order in axis_orders(entries, best_axis) {
        let (prefix, suffix) = prefix_suffix_mbrs(entries, &order);
        for k in min..=n - min {
            let (a, b) = (&prefix[k - 1], &suffix[k]);
            let overlap = a.intersecting_area(b);
            let area = a.area() + b.area();
            if overlap < best_overlap || (overlap == best_overlap && area < best_area) {
                best_overlap = overlap;
                best_area = area;
                best_k = k;
                best_order = order.clone();
            }
        }
    }

    let mut in_first = vec![false; n];
    for &i in &best_order[..best_k] {
        in_first[i] = true;
    }
    in_first
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point_entry(id: i64, x: f64, y: f64) -> ChildEntry {
        ChildEntry::new(id, Region::new_2d(x, y, x, y), None)
    }

    fn two_clusters() -> Vec<ChildEntry> {
        vec![
            point_entry(1, 0.0, 0.0),
            point_entry(2, 100.0, 100.0),
            point_entry(3, 1.0, 0.5),
            point_entry(4, 101.0, 99.0),
            point_entry(5, 0.5, 1.0),
            point_entry(6, 99.5, 100.5),
        ]
    }

    fn ids(entries: &[ChildEntry]) -> Vec<i64> {
        let mut ids: Vec<i64> = entries.iter().map(|e| e.id).collect();
        ids.sort();
        ids
    }

    const VARIANTS: [TreeVariant; 3] = [
        TreeVariant::Linear,
        TreeVariant::Quadratic,
        TreeVariant::RStar,
    ];

    #[test]
    fn test_split_separates_clusters() {
        for variant in VARIANTS {
            let (a, b) = split_entries(two_clusters(), 2, variant);
            let (low, high) = if ids(&a).contains(&1) { (a, b) } else { (b, a) };
            assert_eq!(ids(&low), vec![1, 3, 5], "{}", variant);
            assert_eq!(ids(&high), vec![2, 4, 6], "{}", variant);
        }
    }

    #[test]
    fn test_split_respects_minimum() {
        // one outlier would attract a single-entry group without the minimum
        let mut entries: Vec<ChildEntry> = (0..8).map(|i| point_entry(i, i as f64, 0.0)).collect();
        entries.push(point_entry(99, 1000.0, 1000.0));
        for variant in VARIANTS {
            let (a, b) = split_entries(entries.clone(), 4, variant);
            assert!(a.len() >= 4 && b.len() >= 4, "{}: {} / {}", variant, a.len(), b.len());
            assert_eq!(a.len() + b.len(), 9);
        }
    }

    #[test]
    fn test_split_is_deterministic() {
        let entries: Vec<ChildEntry> = (0..21)
            .map(|i| {
                let x = ((i * 37) % 23) as f64;
                let y = ((i * 11) % 17) as f64;
                ChildEntry::new(i, Region::new_2d(x, y, x + 1.5, y + 0.5), None)
            })
            .collect();
        for variant in VARIANTS {
            let first = split_entries(entries.clone(), 8, variant);
            let second = split_entries(entries.clone(), 8, variant);
            assert_eq!(first, second);
        }
    }

    #[test]
    fn test_split_identical_entries() {
        let entries: Vec<ChildEntry> = (0..5).map(|i| point_entry(i, 3.0, 3.0)).collect();
        for variant in VARIANTS {
            let (a, b) = split_entries(entries.clone(), 2, variant);
            assert!(a.len() >= 2 && b.len() >= 2);
            let mut all = ids(&a);
            all.extend(ids(&b));
            all.sort();
            assert_eq!(all, vec![0, 1, 2, 3, 4]);
        }
    }
}
