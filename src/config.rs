use crate::{cell_octree::LATTICE_DEPTH, qef::SolverStrategy, Error};
use glam::Vec3A;

/// Cubic domain to contour.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RootExtent {
    pub center: Vec3A,
    pub half_size: f32,
}

impl RootExtent {
    pub fn new(center: Vec3A, half_size: f32) -> Self {
        Self { center, half_size }
    }
}

impl Default for RootExtent {
    fn default() -> Self {
        Self::new(Vec3A::ZERO, 1.0)
    }
}

/// Stop conditions for [`CellOctree::subdivide`](crate::CellOctree::subdivide).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SubdivisionLimits {
    /// Cells with `half_size <= min_half_size` are never split.
    pub min_half_size: f32,
    /// Cells shallower than this are split even when homogeneous.
    pub min_depth: u8,
}

/// Everything that drives one contouring run.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ContourConfig {
    pub root: RootExtent,
    /// Subdivision stop threshold (default: 1/8 of the default root).
    pub min_half_size: f32,
    /// Forced subdivision depth for coarse roots (default: 2)
    pub min_depth: u8,
    /// How the QEF is minimized (default: SVD pseudoinverse)
    pub solver: SolverStrategy,
    /// Singular values of the QEF matrix below `cutoff * max` are treated as
    /// zero by the SVD strategy (default: 0.05)
    pub singular_value_cutoff: f32,
    /// Bisection steps when searching for an edge crossing (default: 16)
    pub bisection_iterations: u32,
    /// Central difference step for field gradients (default: 0.001)
    pub gradient_delta: f32,
    /// Solve QEFs and triangulate edges on the rayon pool (default: false)
    pub parallel: bool,
}

impl Default for ContourConfig {
    fn default() -> Self {
        Self {
            root: RootExtent::default(),
            min_half_size: 0.125,
            min_depth: 2,
            solver: SolverStrategy::default(),
            singular_value_cutoff: 0.05,
            bisection_iterations: 16,
            gradient_delta: 0.001,
            parallel: false,
        }
    }
}

impl ContourConfig {
    pub fn new(root: RootExtent, min_half_size: f32) -> Self {
        Self {
            root,
            min_half_size,
            ..Default::default()
        }
    }

    pub fn with_solver(mut self, solver: SolverStrategy) -> Self {
        self.solver = solver;
        self
    }

    pub fn with_min_depth(mut self, min_depth: u8) -> Self {
        self.min_depth = min_depth;
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn subdivision_limits(&self) -> SubdivisionLimits {
        SubdivisionLimits {
            min_half_size: self.min_half_size,
            min_depth: self.min_depth,
        }
    }

    /// Number of halvings needed to take the root down to `min_half_size`.
    pub fn max_depth(&self) -> u32 {
        let mut depth = 0;
        let mut half_size = self.root.half_size;
        while half_size > self.min_half_size {
            half_size *= 0.5;
            depth += 1;
        }
        depth
    }

    pub fn validate(&self) -> Result<(), Error> {
        if !self.root.center.is_finite() {
            return Err(Error::NonFiniteRootCenter);
        }
        if !(self.root.half_size.is_finite() && self.root.half_size > 0.0) {
            return Err(Error::InvalidRootExtent(self.root.half_size));
        }
        if !(self.min_half_size.is_finite() && self.min_half_size > 0.0) {
            return Err(Error::InvalidMinHalfSize(self.min_half_size));
        }
        if !(self.gradient_delta.is_finite() && self.gradient_delta > 0.0) {
            return Err(Error::InvalidGradientDelta(self.gradient_delta));
        }
        if !(0.0..1.0).contains(&self.singular_value_cutoff) {
            return Err(Error::InvalidCutoff(self.singular_value_cutoff));
        }
        let needed = self.max_depth();
        if needed > LATTICE_DEPTH as u32 {
            return Err(Error::DepthLimitExceeded {
                needed,
                max: LATTICE_DEPTH,
            });
        }
        Ok(())
    }
}
