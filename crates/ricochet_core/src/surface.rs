//! Host-side collision surface and the screen-space collision test
//!
//! A [`CollisionSurface`] holds the same data the device captures into its
//! G-buffer: one NDC depth plane and four RGBA attribute planes, of which
//! [`NORMAL_ATTRIBUTE`] carries world normals encoded as `n * 0.5 + 0.5`.

use glam::{Mat4, UVec2, Vec3, Vec4};

use crate::camera::{ndc_in_bounds, ndc_to_pixel, project, SurfaceExtent};

/// Number of attribute planes captured alongside depth
pub const ATTRIBUTE_COUNT: usize = 4;

/// Attribute plane holding encoded world normals
pub const NORMAL_ATTRIBUTE: usize = 2;

/// Depth value of a cleared surface (far plane)
pub const CLEAR_DEPTH: f32 = 1.0;

/// Encode a unit normal the way the scene pass writes it
pub fn encode_normal(normal: Vec3) -> [f32; 4] {
    let n = normal.normalize_or_zero() * 0.5 + Vec3::splat(0.5);
    [n.x, n.y, n.z, 1.0]
}

/// Inverse of [`encode_normal`]
pub fn decode_normal(encoded: [f32; 4]) -> Vec3 {
    Vec4::from(encoded).truncate() * 2.0 - Vec3::ONE
}

/// One captured frame of scene depth and geometry attributes
#[derive(Clone, Debug, PartialEq)]
pub struct CollisionSurface {
    extent: SurfaceExtent,
    depth: Vec<f32>,
    attributes: [Vec<[f32; 4]>; ATTRIBUTE_COUNT],
}

impl CollisionSurface {
    /// Cleared surface: far depth, zeroed attributes
    pub fn new(extent: SurfaceExtent) -> Self {
        let count = extent.pixel_count();
        Self {
            extent,
            depth: vec![CLEAR_DEPTH; count],
            attributes: std::array::from_fn(|_| vec![[0.0; 4]; count]),
        }
    }

    pub fn extent(&self) -> SurfaceExtent {
        self.extent
    }

    pub fn depth(&self) -> &[f32] {
        &self.depth
    }

    pub fn depth_mut(&mut self) -> &mut [f32] {
        &mut self.depth
    }

    /// Read-only attribute plane
    ///
    /// # Panics
    ///
    /// Panics if `index >= ATTRIBUTE_COUNT`.
    pub fn attribute(&self, index: usize) -> &[[f32; 4]] {
        assert!(
            index < ATTRIBUTE_COUNT,
            "attribute index {index} out of range (0..{ATTRIBUTE_COUNT})"
        );
        &self.attributes[index]
    }

    pub fn attribute_mut(&mut self, index: usize) -> &mut [[f32; 4]] {
        assert!(
            index < ATTRIBUTE_COUNT,
            "attribute index {index} out of range (0..{ATTRIBUTE_COUNT})"
        );
        &mut self.attributes[index]
    }

    /// Set depth and normal over the whole surface
    pub fn fill(&mut self, depth: f32, normal: Vec3) {
        self.depth.fill(depth);
        self.attributes[NORMAL_ATTRIBUTE].fill(encode_normal(normal));
    }

    pub fn depth_at(&self, pixel: UVec2) -> f32 {
        self.depth[self.extent.index(self.clamp(pixel))]
    }

    pub fn normal_at(&self, pixel: UVec2) -> Vec3 {
        decode_normal(self.attributes[NORMAL_ATTRIBUTE][self.extent.index(self.clamp(pixel))])
    }

    fn clamp(&self, pixel: UVec2) -> UVec2 {
        pixel.min(UVec2::new(
            self.extent.width.saturating_sub(1),
            self.extent.height.saturating_sub(1),
        ))
    }
}

/// Tunables of the collision response
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CollisionParams {
    /// Velocity scale after reflection
    pub damping: f32,
    /// NDC depth tolerance for touching a surface
    pub depth_epsilon: f32,
}

/// Test one integration step against the surface
///
/// Returns the post-collision velocity, or `None` when the step does not
/// collide: the particle is off-screen or behind the camera, it was already
/// behind the surface before the step, it stays in front of it, or it is
/// moving away from it.
pub fn resolve_collision(
    surface: &CollisionSurface,
    view_proj: &Mat4,
    previous_position: Vec3,
    position: Vec3,
    velocity: Vec3,
    params: CollisionParams,
) -> Option<Vec3> {
    if surface.extent().is_empty() {
        return None;
    }

    let ndc = project(view_proj, position)?;
    if !ndc_in_bounds(ndc) {
        return None;
    }
    let previous_depth = project(view_proj, previous_position)?.z;

    let pixel = ndc_to_pixel(ndc, surface.extent());
    let scene_depth = surface.depth_at(pixel);
    let normal = surface.normal_at(pixel);

    let was_in_front = previous_depth <= scene_depth;
    let touches = ndc.z + params.depth_epsilon >= scene_depth;
    let approaching = velocity.dot(normal) < 0.0;

    if was_in_front && touches && approaching {
        Some(reflect(velocity, normal) * params.damping)
    } else {
        None
    }
}

/// Reflect `v` about the plane with normal `n`
pub fn reflect(v: Vec3, n: Vec3) -> Vec3 {
    v - 2.0 * v.dot(n) * n
}
