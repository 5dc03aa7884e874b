//! Feature-preserving Octree Dual Contouring
//!
//! Extracts a triangle mesh approximating the zero level-set of an implicit
//! field. The domain is subdivided into an octree wherever the field changes
//! sign at cell corners, each non-homogeneous leaf gets one vertex placed by
//! minimizing a Quadric Error Function (which keeps sharp edges and corners),
//! and vertices of the 4 leaves around every sign-changing edge are joined
//! into a quad.
//!
//! ```
//! use glam::Vec3A;
//! use sharp_contour::{contour, sdf_primitives::sphere, ContourConfig, RootExtent};
//!
//! let config = ContourConfig::new(RootExtent::new(Vec3A::ZERO, 4.0), 0.5);
//! let contour = contour(&|p: Vec3A| sphere(3.0, p), &config).unwrap();
//! assert!(!contour.mesh.is_empty());
//! ```
//!
//! # References
//!
//! - Tao Ju, Frank Losasso, Scott Schaefer, Joe Warren ["Dual Contouring of
//!   Hermite Data"](https://www.cs.rice.edu/~jwarren/papers/dualcontour.pdf)
//!
//! # Limitations
//!
//! - A sign change between the corners of a cell is invisible to the
//!   subdivision test; `ContourConfig::min_depth` forces a coarse uniform
//!   split to make that less likely.
//! - There is no bottom-up simplification. Leaves of different sizes don't
//!   share edges, so the surface is left open across such T-junctions (see
//!   [`MeshStats::inconsistent_edges`]).

mod cell_octree;
mod config;
mod dual_mesher;
mod edge_map;
mod error;
mod field;
mod mesh;
mod qef;
mod tables;

pub mod sdf_primitives;

pub use cell_octree::*;
pub use config::*;
pub use dual_mesher::*;
pub use edge_map::*;
pub use error::Error;
pub use field::*;
pub use mesh::*;
pub use qef::*;

/// Result of a full contouring run.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Contour {
    pub mesh: Mesh,
    pub stats: ContourStats,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ContourStats {
    pub cells: usize,
    pub leaves: usize,
    pub depth: u8,
    pub mesh: MeshStats,
}

/// Subdivides, places vertices, and triangulates `field` over `config.root`.
///
/// Only an invalid configuration is an error. Numerical problems along the
/// way are recovered from and show up in the returned statistics or the log.
pub fn contour<F>(field: &F, config: &ContourConfig) -> Result<Contour, Error>
where
    F: ImplicitField + Sync + ?Sized,
{
    config.validate()?;

    let mut octree = CellOctree::build(config.root, config.subdivision_limits(), field);
    QefSolver::from_config(config).resolve_vertices(&mut octree, field, config.parallel);
    let MeshExtraction { mesh, stats } = DualMesher::new(config.parallel).extract_mesh(&octree);

    Ok(Contour {
        mesh,
        stats: ContourStats {
            cells: octree.all_cells().len(),
            leaves: octree.leaves().count(),
            depth: octree.depth(),
            mesh: stats,
        },
    })
}
