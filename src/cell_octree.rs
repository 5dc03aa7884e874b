use crate::{
    config::{RootExtent, SubdivisionLimits},
    field::{cell_is_homogeneous, ImplicitField},
    tables::CORNER_OFFSETS,
};
use glam::Vec3A;
use ilattice::extent::Extent;

pub type CellId = u32;

/// Depth of the integer lattice used to identify cell corners and edges.
///
/// The root spans `1 << LATTICE_DEPTH` units per axis, so a cell at depth `d`
/// spans `1 << (LATTICE_DEPTH - d)` units.
pub const LATTICE_DEPTH: u8 = 20;

/// Octree stored as an arena of cells. Branches refer to their children by
/// [`CellId`].
#[derive(Debug, Default)]
pub struct CellOctree {
    pub(crate) root_id: CellId,
    pub(crate) all_cells: Vec<OctreeCell>,
}

impl CellOctree {
    /// Creates a tree containing only the (sampled) root leaf.
    pub fn new(root: RootExtent, field: &(impl ImplicitField + ?Sized)) -> Self {
        let root_cell = OctreeCell::new(root.center, root.half_size, 0, [0; 3], field);
        Self {
            root_id: 0,
            all_cells: vec![root_cell],
        }
    }

    /// Samples `field` over `root` and subdivides until `limits` are met.
    pub fn build(
        root: RootExtent,
        limits: SubdivisionLimits,
        field: &(impl ImplicitField + ?Sized),
    ) -> Self {
        let mut me = Self::new(root, field);
        me.subdivide(me.root_id, limits, field);
        log::debug!(
            "built octree: {} cells, {} leaves, depth {}",
            me.all_cells.len(),
            me.leaf_ids().count(),
            me.depth()
        );
        me
    }

    pub fn root_id(&self) -> CellId {
        self.root_id
    }

    pub fn root(&self) -> &OctreeCell {
        &self.all_cells[self.root_id as usize]
    }

    pub fn all_cells(&self) -> &[OctreeCell] {
        &self.all_cells
    }

    pub fn cell(&self, id: CellId) -> &OctreeCell {
        &self.all_cells[id as usize]
    }

    pub fn cell_mut(&mut self, id: CellId) -> &mut OctreeCell {
        &mut self.all_cells[id as usize]
    }

    /// Ids of all leaves, in arena order.
    pub fn leaf_ids(&self) -> impl Iterator<Item = CellId> + '_ {
        self.all_cells
            .iter()
            .enumerate()
            .filter(|(_, c)| c.is_leaf())
            .map(|(i, _)| i as CellId)
    }

    pub fn leaves(&self) -> impl Iterator<Item = &OctreeCell> + '_ {
        self.all_cells.iter().filter(|c| c.is_leaf())
    }

    /// Maximum depth over all cells.
    pub fn depth(&self) -> u8 {
        self.all_cells.iter().map(|c| c.depth).max().unwrap_or(0)
    }

    /// Splits `cell` and its descendants until each leaf is homogeneous or
    /// has reached `limits.min_half_size`.
    ///
    /// Cells shallower than `limits.min_depth` are split regardless of
    /// homogeneity. A sign change strictly inside a cell whose corners agree
    /// is not detected. Calling this on a branch only refines its leaves.
    pub fn subdivide(
        &mut self,
        cell: CellId,
        limits: SubdivisionLimits,
        field: &(impl ImplicitField + ?Sized),
    ) {
        let mut stack = vec![cell];
        while let Some(id) = stack.pop() {
            let cell = &self.all_cells[id as usize];

            if let Some(children) = cell.children {
                stack.extend(children.iter().rev());
                continue;
            }

            if !cell.should_split(limits) {
                continue;
            }

            let children = cell.get_children(field);
            let first_child = self.all_cells.len() as CellId;
            let child_ids: [CellId; 8] = std::array::from_fn(|i| first_child + i as CellId);
            self.all_cells.extend(children);
            self.all_cells[id as usize].children = Some(child_ids);

            // Reverse so that octant 0 is visited first.
            stack.extend(child_ids.iter().rev());
        }
    }
}

#[derive(Clone, Debug)]
pub struct OctreeCell {
    pub center: Vec3A,
    pub half_size: f32,
    pub depth: u8,

    /// Minimum corner on the integer lattice (see [`LATTICE_DEPTH`]).
    pub lattice_min: [i32; 3],

    /// Field samples at the corners, in Z order.
    pub samples: [f32; 8],
    pub children: Option<[CellId; 8]>,

    /// Dual vertex, placed by the QEF solver on non-homogeneous leaves.
    pub vertex: Option<Vec3A>,
    pub qef_error: f32,
}

impl OctreeCell {
    fn new(
        center: Vec3A,
        half_size: f32,
        depth: u8,
        lattice_min: [i32; 3],
        field: &(impl ImplicitField + ?Sized),
    ) -> Self {
        let extent = cell_extent(center, half_size);
        // PERF: siblings share most of their corners; we sample each one anew
        let samples = extent.corners3().map(|p| field.evaluate(p));

        Self {
            center,
            half_size,
            depth,
            lattice_min,
            samples,
            children: None,
            vertex: None,
            qef_error: 0.0,
        }
    }

    #[inline]
    pub fn is_leaf(&self) -> bool {
        self.children.is_none()
    }

    #[inline]
    pub fn is_homogeneous(&self) -> bool {
        cell_is_homogeneous(&self.samples)
    }

    pub fn extent(&self) -> Extent<Vec3A> {
        cell_extent(self.center, self.half_size)
    }

    pub fn min(&self) -> Vec3A {
        self.center - Vec3A::splat(self.half_size)
    }

    pub fn max(&self) -> Vec3A {
        self.center + Vec3A::splat(self.half_size)
    }

    pub fn contains(&self, p: Vec3A) -> bool {
        p.cmpge(self.min()).all() && p.cmple(self.max()).all()
    }

    pub fn volume(&self) -> f32 {
        (2.0 * self.half_size).powi(3)
    }

    /// Edge length of this cell in lattice units.
    #[inline]
    pub fn lattice_size(&self) -> i32 {
        1 << (LATTICE_DEPTH - self.depth)
    }

    /// Lattice coordinates of corner `corner` (Z order).
    pub fn lattice_corner(&self, corner: usize) -> [i32; 3] {
        let size = self.lattice_size();
        let offset = CORNER_OFFSETS[corner];
        [
            self.lattice_min[0] + offset[0] * size,
            self.lattice_min[1] + offset[1] * size,
            self.lattice_min[2] + offset[2] * size,
        ]
    }

    fn should_split(&self, limits: SubdivisionLimits) -> bool {
        if self.half_size <= limits.min_half_size || self.depth >= LATTICE_DEPTH {
            return false;
        }
        self.depth < limits.min_depth || !self.is_homogeneous()
    }

    fn get_children(&self, field: &(impl ImplicitField + ?Sized)) -> [Self; 8] {
        assert!(self.is_leaf());
        let half_size = 0.5 * self.half_size;
        let child_size = self.lattice_size() / 2;
        let child_extents = self.extent().split3(self.center);
        let mut octant = 0;
        child_extents.map(|extent| {
            let offset = CORNER_OFFSETS[octant];
            octant += 1;
            let lattice_min = [
                self.lattice_min[0] + offset[0] * child_size,
                self.lattice_min[1] + offset[1] * child_size,
                self.lattice_min[2] + offset[2] * child_size,
            ];
            Self::new(extent.center(), half_size, self.depth + 1, lattice_min, field)
        })
    }
}

fn cell_extent(center: Vec3A, half_size: f32) -> Extent<Vec3A> {
    Extent::from_min_and_shape(center - Vec3A::splat(half_size), Vec3A::splat(2.0 * half_size))
}
