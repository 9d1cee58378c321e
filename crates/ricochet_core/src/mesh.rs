//! Combined geometry for pseudo-instanced drawing
//!
//! A particle mesh is replicated as many times as 16-bit indices allow.
//! Each copy's vertices carry the copy number, so one draw covers a
//! contiguous range of particle slots starting at the batch's id offset.

use bytemuck::{Pod, Zeroable};

use crate::error::MeshError;

/// Vertex limit of a combined mesh (16-bit indices, one value reserved)
pub const MAX_VERTEX_NUM: u32 = 65534;

/// Source geometry for one particle
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MeshData {
    pub positions: Vec<[f32; 3]>,
    pub normals: Vec<[f32; 3]>,
    pub uvs: Vec<[f32; 2]>,
    pub indices: Vec<u16>,
}

impl MeshData {
    /// Axis-aligned cube of edge length `size`, four vertices per face
    pub fn cube(size: f32) -> Self {
        let h = size * 0.5;
        // (normal, tangent u, tangent v) per face
        let faces: [([f32; 3], [f32; 3], [f32; 3]); 6] = [
            ([1.0, 0.0, 0.0], [0.0, 0.0, -1.0], [0.0, 1.0, 0.0]),
            ([-1.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, 1.0, 0.0]),
            ([0.0, 1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, -1.0]),
            ([0.0, -1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]),
            ([0.0, 0.0, 1.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
            ([0.0, 0.0, -1.0], [-1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
        ];
        let corners = [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)];

        let mut mesh = MeshData::default();
        for (n, u, v) in faces {
            let base = mesh.positions.len() as u16;
            for (cu, cv) in corners {
                mesh.positions.push(std::array::from_fn(|i| {
                    (n[i] + u[i] * cu + v[i] * cv) * h
                }));
                mesh.normals.push(n);
                mesh.uvs.push([(cu + 1.0) * 0.5, (1.0 - cv) * 0.5]);
            }
            mesh.indices
                .extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
        }
        mesh
    }

    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    fn validate(&self) -> Result<(), MeshError> {
        if self.positions.is_empty() || self.indices.is_empty() {
            return Err(MeshError::Empty);
        }
        if self.positions.len() > MAX_VERTEX_NUM as usize {
            return Err(MeshError::TooManyVertices {
                vertices: self.positions.len(),
                max: MAX_VERTEX_NUM,
            });
        }
        if let Some(&index) = self
            .indices
            .iter()
            .find(|&&index| index as usize >= self.positions.len())
        {
            return Err(MeshError::IndexOutOfRange {
                index,
                vertices: self.positions.len(),
            });
        }
        Ok(())
    }
}

/// Vertex of a combined mesh
///
/// Must match the vertex layout of the particle render pipeline.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct CombinedVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
    /// Copy number within the combined mesh
    pub instance_id: u32,
}

/// How a pool's slots split into draw batches
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BatchLayout {
    /// Mesh copies in one combined mesh
    pub particles_per_mesh: u32,
    /// Draws needed to cover the whole pool
    pub batch_count: u32,
}

impl BatchLayout {
    pub fn new(vertex_count: u32, capacity: u32) -> Self {
        let particles_per_mesh = (MAX_VERTEX_NUM / vertex_count.max(1)).min(capacity).max(1);
        Self {
            particles_per_mesh,
            batch_count: capacity.div_ceil(particles_per_mesh),
        }
    }

    /// First particle slot drawn by `batch`
    pub fn id_offset(&self, batch: u32) -> u32 {
        batch * self.particles_per_mesh
    }

    pub fn id_offsets(&self) -> impl Iterator<Item = u32> + '_ {
        (0..self.batch_count).map(|batch| self.id_offset(batch))
    }
}

/// Particle mesh replicated for one draw batch
#[derive(Clone, Debug, PartialEq)]
pub struct CombinedMesh {
    pub vertices: Vec<CombinedVertex>,
    pub indices: Vec<u16>,
    pub layout: BatchLayout,
}

impl CombinedMesh {
    /// Replicate `mesh` enough times to cover `capacity` slots in as few
    /// draws as 16-bit indices allow
    pub fn build(mesh: &MeshData, capacity: u32) -> Result<Self, MeshError> {
        mesh.validate()?;

        let vertex_count = mesh.vertex_count();
        let layout = BatchLayout::new(vertex_count as u32, capacity);
        let copies = layout.particles_per_mesh as usize;

        let mut vertices = Vec::with_capacity(vertex_count * copies);
        let mut indices = Vec::with_capacity(mesh.indices.len() * copies);
        for copy in 0..copies {
            for v in 0..vertex_count {
                vertices.push(CombinedVertex {
                    position: mesh.positions[v],
                    normal: mesh.normals.get(v).copied().unwrap_or([0.0, 1.0, 0.0]),
                    uv: mesh.uvs.get(v).copied().unwrap_or([0.0, 0.0]),
                    instance_id: copy as u32,
                });
            }
            let base = (copy * vertex_count) as u16;
            indices.extend(mesh.indices.iter().map(|&index| base + index));
        }

        tracing::debug!(
            "combined particle mesh: {} copies, {} vertices, {} batches",
            copies,
            vertices.len(),
            layout.batch_count
        );
        Ok(Self {
            vertices,
            indices,
            layout,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cube_geometry() {
        let cube = MeshData::cube(2.0);
        assert_eq!(cube.vertex_count(), 24);
        assert_eq!(cube.indices.len(), 36);
        assert!(cube
            .positions
            .iter()
            .all(|p| p.iter().all(|c| c.abs() == 1.0)));
    }

    #[test]
    fn test_layout_for_cube() {
        let layout = BatchLayout::new(24, 65_536);
        assert_eq!(layout.particles_per_mesh, 2730);
        assert_eq!(layout.batch_count, 25);
        assert_eq!(layout.id_offset(3), 8190);

        // Small pools fit in one mesh with no spare copies
        let layout = BatchLayout::new(24, 8);
        assert_eq!(layout.particles_per_mesh, 8);
        assert_eq!(layout.batch_count, 1);
        assert_eq!(layout.id_offsets().collect::<Vec<_>>(), vec![0]);
    }

    #[test]
    fn test_combined_indices_offset_per_copy() {
        let combined = CombinedMesh::build(&MeshData::cube(1.0), 3).unwrap();
        assert_eq!(combined.vertices.len(), 72);
        assert_eq!(combined.indices.len(), 108);

        for (i, vertex) in combined.vertices.iter().enumerate() {
            assert_eq!(vertex.instance_id, (i / 24) as u32);
        }
        // The second copy's first triangle points at the second copy's vertices
        assert_eq!(&combined.indices[36..39], &[24, 25, 26]);
        assert!(combined.indices.iter().all(|&i| (i as usize) < combined.vertices.len()));
    }

    #[test]
    fn test_combined_mesh_stays_in_index_range() {
        let combined = CombinedMesh::build(&MeshData::cube(1.0), 1_000_000).unwrap();
        assert!(combined.vertices.len() <= MAX_VERTEX_NUM as usize);
        assert_eq!(combined.layout.particles_per_mesh, 2730);
    }

    #[test]
    fn test_rejects_bad_meshes() {
        assert_eq!(
            CombinedMesh::build(&MeshData::default(), 8).unwrap_err(),
            MeshError::Empty
        );

        let mut broken = MeshData::cube(1.0);
        broken.indices.push(99);
        assert!(matches!(
            CombinedMesh::build(&broken, 8),
            Err(MeshError::IndexOutOfRange { index: 99, .. })
        ));
    }

    #[test]
    fn test_vertex_layout() {
        assert_eq!(std::mem::size_of::<CombinedVertex>(), 36);
        assert_eq!(std::mem::offset_of!(CombinedVertex, instance_id), 32);
    }
}
