use crate::{
    edge_map::{EdgeBucket, EdgeMap},
    field::is_inside,
    mesh::{Mesh, MeshVertexId, NULL_MESH_VERTEX_ID},
    CellOctree,
};
use rayon::prelude::*;

/// Counters describing one extraction.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MeshStats {
    pub vertices: usize,
    pub triangles: usize,
    /// Mapped edges whose endpoints differ in sign.
    pub bipolar_edges: usize,
    /// Bipolar edges on the root boundary, which are left open.
    pub boundary_edges: usize,
    /// Interior bipolar edges without 4 distinct leaves around them. These
    /// only appear where neighbouring leaves differ in size.
    pub inconsistent_edges: usize,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct MeshExtraction {
    pub mesh: Mesh,
    pub stats: MeshStats,
}

/// Connects the dual vertices of a resolved octree into triangles.
///
/// Every bipolar edge shared by 4 equally sized leaves becomes a quad (two
/// triangles). Leaves of differing size don't share edge keys, so the surface
/// is left open across such T-junctions and the edges are counted as
/// inconsistent.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DualMesher {
    pub parallel: bool,
}

enum EdgeOutcome {
    Unipolar,
    Boundary,
    Inconsistent,
    Quad([MeshVertexId; 4]),
}

impl DualMesher {
    pub fn new(parallel: bool) -> Self {
        Self { parallel }
    }

    pub fn extract_mesh(&self, octree: &CellOctree) -> MeshExtraction {
        let mut mesh = Mesh::default();

        // One mesh vertex per placed dual vertex, in arena order.
        let mut mesh_vertex_ids = vec![NULL_MESH_VERTEX_ID; octree.all_cells().len()];
        for id in octree.leaf_ids() {
            if let Some(vertex) = octree.cell(id).vertex {
                mesh_vertex_ids[id as usize] = mesh.positions.len() as MeshVertexId;
                mesh.positions.push(vertex);
            }
        }

        // The map is complete (and read-only) before any edge is triangulated.
        let edge_map = EdgeMap::from_octree(octree);
        let root_size = octree.root().lattice_size();

        let classify = |bucket: &EdgeBucket| classify_edge(bucket, root_size, &mesh_vertex_ids);
        let outcomes: Vec<EdgeOutcome> = if self.parallel {
            edge_map.buckets().par_iter().map(classify).collect()
        } else {
            edge_map.buckets().iter().map(classify).collect()
        };

        let mut stats = MeshStats {
            vertices: mesh.positions.len(),
            ..Default::default()
        };
        for outcome in outcomes {
            match outcome {
                EdgeOutcome::Unipolar => continue,
                EdgeOutcome::Boundary => stats.boundary_edges += 1,
                EdgeOutcome::Inconsistent => stats.inconsistent_edges += 1,
                EdgeOutcome::Quad([q0, q1, q2, q3]) => {
                    // Degenerate triangles are kept.
                    mesh.indices.extend_from_slice(&[q0, q1, q2, q0, q2, q3]);
                }
            }
            stats.bipolar_edges += 1;
        }
        stats.triangles = mesh.num_triangles();

        if stats.inconsistent_edges > 0 {
            log::warn!(
                "{} of {} interior sign-changing edges lack 4 equally sized leaves; \
                 the mesh has holes there",
                stats.inconsistent_edges,
                stats.bipolar_edges - stats.boundary_edges
            );
        }
        log::debug!("extracted mesh: {stats:?}");

        MeshExtraction { mesh, stats }
    }
}

fn classify_edge(
    bucket: &EdgeBucket,
    root_size: i32,
    mesh_vertex_ids: &[MeshVertexId],
) -> EdgeOutcome {
    if !bucket.is_bipolar() {
        return EdgeOutcome::Unipolar;
    }
    if bucket.key.is_on_boundary(root_size) {
        // At most 2 leaves can touch a boundary edge, too few for a facet.
        log::trace!("open boundary edge {:?}", bucket.key);
        return EdgeOutcome::Boundary;
    }
    if !bucket.is_complete() {
        log::debug!(
            "edge {:?} has {} of 4 leaves ({} conflicts)",
            bucket.key,
            bucket.num_cells(),
            bucket.conflicts
        );
        return EdgeOutcome::Inconsistent;
    }

    let quad = bucket
        .cells
        .map(|c| c.map_or(NULL_MESH_VERTEX_ID, |c| mesh_vertex_ids[c as usize]));
    if quad.contains(&NULL_MESH_VERTEX_ID) {
        return EdgeOutcome::Inconsistent;
    }

    // Cells are counter-clockwise around the edge axis, which faces the quad
    // along +axis. Facets face toward increasing field values.
    let field_increases = is_inside(bucket.samples[0]);
    if field_increases {
        EdgeOutcome::Quad(quad)
    } else {
        EdgeOutcome::Quad([quad[3], quad[2], quad[1], quad[0]])
    }
}
