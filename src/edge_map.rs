use crate::{
    field::is_inside,
    tables::{quadrant_slot, AXIS_UV, CELL_EDGES},
    CellId, CellOctree, OctreeCell,
};
use std::collections::HashMap;

/// Canonical identity of a cell edge on the integer lattice.
///
/// Including `len` keeps edges of differently sized cells apart even when
/// they start at the same lattice point.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EdgeKey {
    pub start: [i32; 3],
    pub axis: u8,
    pub len: i32,
}

impl EdgeKey {
    pub fn end(&self) -> [i32; 3] {
        let mut end = self.start;
        end[self.axis as usize] += self.len;
        end
    }

    /// True if the edge lies on a face of the root, whose lattice extent is
    /// `[0, root_size]` on every axis.
    pub fn is_on_boundary(&self, root_size: i32) -> bool {
        let [u, v] = AXIS_UV[self.axis as usize];
        [self.start[u], self.start[v]]
            .iter()
            .any(|&c| c == 0 || c == root_size)
    }
}

/// The leaves sharing one edge.
#[derive(Clone, Debug, PartialEq)]
pub struct EdgeBucket {
    pub key: EdgeKey,
    /// One slot per quadrant around the edge, counter-clockwise when looking
    /// down the edge from its max end.
    pub cells: [Option<CellId>; 4],
    /// Field samples at the start and end of the edge.
    pub samples: [f32; 2],
    /// Number of times a second cell claimed an occupied quadrant.
    pub conflicts: u32,
}

impl EdgeBucket {
    fn new(key: EdgeKey, samples: [f32; 2]) -> Self {
        Self {
            key,
            cells: [None; 4],
            samples,
            conflicts: 0,
        }
    }

    /// True if the edge crosses the surface.
    pub fn is_bipolar(&self) -> bool {
        is_inside(self.samples[0]) != is_inside(self.samples[1])
    }

    pub fn num_cells(&self) -> usize {
        self.cells.iter().flatten().count()
    }

    /// All four quadrants are filled, each exactly once.
    pub fn is_complete(&self) -> bool {
        self.conflicts == 0 && self.cells.iter().all(Option::is_some)
    }
}

/// Edge to leaf adjacency, in insertion order.
#[derive(Clone, Debug, Default)]
pub struct EdgeMap {
    index: HashMap<EdgeKey, usize>,
    buckets: Vec<EdgeBucket>,
}

impl EdgeMap {
    /// Maps the edges of every leaf that carries a dual vertex.
    pub fn from_octree(octree: &CellOctree) -> Self {
        let mut me = Self::default();
        for id in octree.leaf_ids() {
            let cell = octree.cell(id);
            if cell.vertex.is_some() {
                me.insert_cell(id, cell);
            }
        }
        me
    }

    /// Adds `cell` to the buckets of its 12 edges.
    pub fn insert_cell(&mut self, id: CellId, cell: &OctreeCell) {
        let len = cell.lattice_size();
        for (axis, edges) in CELL_EDGES.iter().enumerate() {
            for (i, &[c0, c1]) in edges.iter().enumerate() {
                let key = EdgeKey {
                    start: cell.lattice_corner(c0),
                    axis: axis as u8,
                    len,
                };
                // An edge on the cell's minimum side has the cell on its plus
                // side, and vice versa.
                let slot = quadrant_slot(1 - (i & 1), 1 - (i >> 1));

                let samples = [cell.samples[c0], cell.samples[c1]];
                let buckets = &mut self.buckets;
                let b = *self.index.entry(key).or_insert_with(|| {
                    buckets.push(EdgeBucket::new(key, samples));
                    buckets.len() - 1
                });
                let bucket = &mut self.buckets[b];

                match bucket.cells[slot] {
                    None => bucket.cells[slot] = Some(id),
                    Some(other) if other == id => {}
                    Some(other) => {
                        log::debug!("cells {other} and {id} both claim {key:?}");
                        bucket.conflicts += 1;
                    }
                }
            }
        }
    }

    pub fn get(&self, key: &EdgeKey) -> Option<&EdgeBucket> {
        self.index.get(key).map(|&i| &self.buckets[i])
    }

    pub fn buckets(&self) -> &[EdgeBucket] {
        &self.buckets
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}
