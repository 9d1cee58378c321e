//! Demo scene: a ground slab and a few boxes
//!
//! Everything is an axis-aligned box, so picking is an analytic slab test
//! and the mesh is the unit cube scaled per box.

use bytemuck::{Pod, Zeroable};
use glam::Vec3;
use ricochet_core::MeshData;

/// One axis-aligned box
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SceneBox {
    pub center: Vec3,
    pub size: Vec3,
    pub color: [f32; 3],
}

impl SceneBox {
    fn min(&self) -> Vec3 {
        self.center - self.size * 0.5
    }

    fn max(&self) -> Vec3 {
        self.center + self.size * 0.5
    }

    /// Entry distance and outward face normal of a ray hit
    ///
    /// Rays starting inside the box do not hit it.
    fn intersect(&self, origin: Vec3, dir: Vec3) -> Option<(f32, Vec3)> {
        let inv = dir.recip();
        let t1 = (self.min() - origin) * inv;
        let t2 = (self.max() - origin) * inv;
        let t_min = t1.min(t2);
        let t_max = t1.max(t2);

        let near = t_min.max_element();
        let far = t_max.min_element();
        if near > far || near < 0.0 {
            return None;
        }

        let axis = (0..3)
            .max_by(|&a, &b| t_min[a].total_cmp(&t_min[b]))
            .unwrap_or(1);
        let mut normal = Vec3::ZERO;
        normal[axis] = -dir[axis].signum();
        Some((near, normal))
    }
}

/// Surface point under a ray
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Hit {
    pub position: Vec3,
    pub normal: Vec3,
    pub distance: f32,
}

/// Vertex of the scene mesh
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct SceneVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub color: [f32; 3],
}

#[derive(Clone, Debug, Default)]
pub struct Scene {
    pub boxes: Vec<SceneBox>,
}

impl Scene {
    /// Ground slab with its top face at y = 0 plus a few obstacles
    pub fn demo() -> Self {
        Self {
            boxes: vec![
                SceneBox {
                    center: Vec3::new(0.0, -0.25, 0.0),
                    size: Vec3::new(24.0, 0.5, 24.0),
                    color: [0.35, 0.37, 0.40],
                },
                SceneBox {
                    center: Vec3::new(-3.0, 1.0, -1.0),
                    size: Vec3::new(2.0, 2.0, 2.0),
                    color: [0.80, 0.35, 0.25],
                },
                SceneBox {
                    center: Vec3::new(3.0, 0.75, 0.5),
                    size: Vec3::new(3.0, 1.5, 1.0),
                    color: [0.25, 0.55, 0.80],
                },
                SceneBox {
                    center: Vec3::new(0.0, 2.5, -5.0),
                    size: Vec3::new(8.0, 5.0, 0.5),
                    color: [0.70, 0.70, 0.55],
                },
            ],
        }
    }

    /// Closest box face hit by the ray
    pub fn pick(&self, origin: Vec3, dir: Vec3) -> Option<Hit> {
        self.boxes
            .iter()
            .filter_map(|b| b.intersect(origin, dir))
            .min_by(|a, b| a.0.total_cmp(&b.0))
            .map(|(distance, normal)| Hit {
                position: origin + dir * distance,
                normal,
                distance,
            })
    }

    /// Triangle list of every box, 32-bit indices
    pub fn mesh(&self) -> (Vec<SceneVertex>, Vec<u32>) {
        let cube = MeshData::cube(1.0);
        let mut vertices = Vec::with_capacity(cube.vertex_count() * self.boxes.len());
        let mut indices = Vec::with_capacity(cube.indices.len() * self.boxes.len());

        for b in &self.boxes {
            let base = vertices.len() as u32;
            for (position, normal) in cube.positions.iter().zip(&cube.normals) {
                vertices.push(SceneVertex {
                    position: (Vec3::from(*position) * b.size + b.center).into(),
                    normal: *normal,
                    color: b.color,
                });
            }
            indices.extend(cube.indices.iter().map(|&i| base + i as u32));
        }
        (vertices, indices)
    }
}
