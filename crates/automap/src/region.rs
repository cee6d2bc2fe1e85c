//! Regions: sets of cells stored as non-overlapping rectangles.

use std::collections::{BTreeSet, HashMap, VecDeque};

use automap_core::Rect;
use serde::{Deserialize, Serialize};

/// An ordered set of cells, stored as disjoint rectangles.
///
/// Rectangles are built from horizontal runs merged downwards, and kept sorted
/// by their top-left corner (row-major), so two regions with the same cells
/// always have the same representation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    rects: Vec<Rect>,
}

impl Region {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_rect(rect: Rect) -> Self {
        if rect.is_empty() {
            Self::default()
        } else {
            Self { rects: vec![rect] }
        }
    }

    /// Build a region from arbitrary cells; duplicates are ignored.
    pub fn from_cells(cells: impl IntoIterator<Item = (i32, i32)>) -> Self {
        let set: BTreeSet<(i32, i32)> = cells.into_iter().map(|(x, y)| (y, x)).collect();
        Self::from_sorted_set(&set)
    }

    /// `set` holds `(y, x)` pairs so that iteration is row-major.
    fn from_sorted_set(set: &BTreeSet<(i32, i32)>) -> Self {
        let mut rects: Vec<Rect> = Vec::new();
        // (x, width, bottom) of a rect that may grow by one more row
        let mut growable: HashMap<(i32, i32, i32), usize> = HashMap::new();

        let mut iter = set.iter().peekable();
        while let Some(&(y, x)) = iter.next() {
            let mut width = 1;
            while let Some(&&(ny, nx)) = iter.peek() {
                if ny == y && nx == x + width {
                    width += 1;
                    iter.next();
                } else {
                    break;
                }
            }

            if let Some(idx) = growable.remove(&(x, width, y)) {
                rects[idx].height += 1;
                growable.insert((x, width, y + 1), idx);
            } else {
                rects.push(Rect::new(x, y, width, 1));
                growable.insert((x, width, y + 1), rects.len() - 1);
            }
        }

        Self { rects }
    }

    pub fn rects(&self) -> &[Rect] {
        &self.rects
    }

    pub fn is_empty(&self) -> bool {
        self.rects.is_empty()
    }

    pub fn cell_count(&self) -> usize {
        self.rects.iter().map(Rect::area).sum()
    }

    /// Bounding rectangle (empty for an empty region).
    pub fn bounds(&self) -> Rect {
        self.rects
            .iter()
            .fold(Rect::default(), |acc, rect| acc.union(rect))
    }

    pub fn contains(&self, x: i32, y: i32) -> bool {
        self.rects.iter().any(|r| r.contains(x, y))
    }

    pub fn intersects_rect(&self, rect: &Rect) -> bool {
        self.rects.iter().any(|r| r.intersects(rect))
    }

    /// `true` if every cell lies inside `rect`.
    pub fn is_within(&self, rect: &Rect) -> bool {
        self.rects.iter().all(|r| rect.contains_rect(r))
    }

    pub fn translated(&self, dx: i32, dy: i32) -> Region {
        Region {
            rects: self.rects.iter().map(|r| r.translated(dx, dy)).collect(),
        }
    }

    /// Every cell, in raster order.
    pub fn cells(&self) -> Vec<(i32, i32)> {
        self.cell_set().into_iter().map(|(y, x)| (x, y)).collect()
    }

    fn cell_set(&self) -> BTreeSet<(i32, i32)> {
        self.rects
            .iter()
            .flat_map(|r| r.cells())
            .map(|(x, y)| (y, x))
            .collect()
    }

    pub fn union(&self, other: &Region) -> Region {
        let mut set = self.cell_set();
        set.extend(other.cell_set());
        Self::from_sorted_set(&set)
    }

    pub fn intersection(&self, other: &Region) -> Region {
        let set: BTreeSet<(i32, i32)> = self
            .cell_set()
            .into_iter()
            .filter(|&(y, x)| other.contains(x, y))
            .collect();
        Self::from_sorted_set(&set)
    }

    /// Split into 4-connected components, ordered by their first cell in
    /// raster order.
    pub fn components(&self) -> Vec<Region> {
        let mut remaining = self.cell_set();
        let mut components = Vec::new();

        while let Some(&start) = remaining.iter().next() {
            remaining.remove(&start);
            let mut component = BTreeSet::new();
            let mut queue = VecDeque::from([start]);

            while let Some((y, x)) = queue.pop_front() {
                component.insert((y, x));
                for neighbor in [(y - 1, x), (y + 1, x), (y, x - 1), (y, x + 1)] {
                    if remaining.remove(&neighbor) {
                        queue.push_back(neighbor);
                    }
                }
            }

            components.push(Self::from_sorted_set(&component));
        }

        components
    }
}
