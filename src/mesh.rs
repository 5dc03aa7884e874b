use crate::field::ImplicitField;
use glam::Vec3A;

pub type MeshVertexId = u32;
pub const NULL_MESH_VERTEX_ID: MeshVertexId = MeshVertexId::MAX;

/// Indexed triangle mesh; every 3 indices make one triangle.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Mesh {
    pub positions: Vec<Vec3A>,
    pub indices: Vec<MeshVertexId>,
}

impl Mesh {
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn num_triangles(&self) -> usize {
        self.indices.len() / 3
    }

    pub fn triangles(&self) -> impl Iterator<Item = [Vec3A; 3]> + '_ {
        self.indices
            .chunks_exact(3)
            .map(|t| [t[0], t[1], t[2]].map(|v| self.positions[v as usize]))
    }

    pub fn surface_area(&self) -> f32 {
        self.triangles()
            .map(|[a, b, c]| 0.5 * (b - a).cross(c - a).length())
            .sum()
    }

    /// Volume enclosed by the mesh, positive when triangles wind
    /// counter-clockwise seen from outside. Only meaningful for closed
    /// meshes.
    pub fn signed_volume(&self) -> f32 {
        self.triangles()
            .map(|[a, b, c]| a.dot(b.cross(c)) / 6.0)
            .sum()
    }

    /// Per-vertex normals from the field gradient.
    pub fn vertex_normals(&self, field: &(impl ImplicitField + ?Sized), delta: f32) -> Vec<Vec3A> {
        self.positions
            .iter()
            .map(|&p| field.gradient(p, delta).normalize_or_zero())
            .collect()
    }
}

/// Repair normals for vertices on sharp edges.
///
/// This may add vertices to the mesh in order to allow multiple normals at the
/// same position.
pub fn repair_sharp_normals(
    normal_similarity_threshold: f32,
    tri_indices: &mut [MeshVertexId],
    positions: &mut Vec<Vec3A>,
    normals: &mut Vec<Vec3A>,
) {
    for t in tri_indices.chunks_exact_mut(3) {
        let mut tri = [t[0], t[1], t[2]];
        let n = tri.map(|v| normals[v as usize]);
        let p = tri.map(|v| positions[v as usize]);

        let tri_normal = (p[1] - p[0]).cross(p[2] - p[0]).normalize_or_zero();
        if tri_normal == Vec3A::ZERO {
            // Degenerate triangle; nothing to agree with.
            continue;
        }

        // Force dissident normals to use the triangle's normal.
        for ti in 0..3 {
            if n[ti].dot(tri_normal) < normal_similarity_threshold {
                let new_vert = positions.len() as MeshVertexId;
                positions.push(p[ti]);
                normals.push(tri_normal);
                tri[ti] = new_vert;
            }
        }

        t.copy_from_slice(&tri);
    }
}
