//! Camera projection and screen-space addressing
//!
//! Uses the wgpu clip-space conventions: NDC depth in `[0, 1]` with the
//! near plane at 0, and texture rows growing downward.

use glam::{Mat4, UVec2, Vec3, Vec4Swizzles};

/// Pixel dimensions of a render target or collision surface
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct SurfaceExtent {
    pub width: u32,
    pub height: u32,
}

impl SurfaceExtent {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn aspect_ratio(&self) -> f32 {
        if self.height == 0 {
            1.0
        } else {
            self.width as f32 / self.height as f32
        }
    }

    /// Row-major index of a pixel
    pub fn index(&self, pixel: UVec2) -> usize {
        pixel.y as usize * self.width as usize + pixel.x as usize
    }
}

/// What one frame is rendered through: the matrix and the target size
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CameraView {
    pub view_proj: Mat4,
    pub extent: SurfaceExtent,
}

impl CameraView {
    pub fn new(view_proj: Mat4, extent: SurfaceExtent) -> Self {
        Self { view_proj, extent }
    }
}

/// Perspective camera
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Camera {
    pub eye: Vec3,
    pub target: Vec3,
    pub up: Vec3,
    /// Vertical field of view in radians
    pub fov_y: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            eye: Vec3::new(0.0, 4.0, 12.0),
            target: Vec3::ZERO,
            up: Vec3::Y,
            fov_y: 45.0_f32.to_radians(),
            near: 0.1,
            far: 100.0,
        }
    }
}

impl Camera {
    pub fn view(&self) -> Mat4 {
        Mat4::look_at_rh(self.eye, self.target, self.up)
    }

    pub fn projection(&self, aspect_ratio: f32) -> Mat4 {
        Mat4::perspective_rh(self.fov_y, aspect_ratio, self.near, self.far)
    }

    pub fn view_projection(&self, extent: SurfaceExtent) -> Mat4 {
        self.projection(extent.aspect_ratio()) * self.view()
    }

    pub fn camera_view(&self, extent: SurfaceExtent) -> CameraView {
        CameraView::new(self.view_projection(extent), extent)
    }

    /// Same camera reflected across the plane through `point` with `normal`
    pub fn mirrored(&self, point: Vec3, normal: Vec3) -> Self {
        let n = normal.normalize();
        let reflect_point = |p: Vec3| p - 2.0 * (p - point).dot(n) * n;
        let reflect_dir = |d: Vec3| d - 2.0 * d.dot(n) * n;
        Self {
            eye: reflect_point(self.eye),
            target: reflect_point(self.target),
            up: reflect_dir(self.up),
            ..*self
        }
    }

    /// World-space ray through a pixel
    pub fn ray(&self, extent: SurfaceExtent, cursor: glam::Vec2) -> (Vec3, Vec3) {
        let inverse = self.view_projection(extent).inverse();
        let ndc_x = cursor.x / extent.width.max(1) as f32 * 2.0 - 1.0;
        let ndc_y = 1.0 - cursor.y / extent.height.max(1) as f32 * 2.0;
        let near = inverse.project_point3(Vec3::new(ndc_x, ndc_y, 0.0));
        let far = inverse.project_point3(Vec3::new(ndc_x, ndc_y, 1.0));
        (near, (far - near).normalize())
    }
}

/// Project a world position to NDC, or `None` when it is behind the camera
pub fn project(view_proj: &Mat4, position: Vec3) -> Option<Vec3> {
    let clip = *view_proj * position.extend(1.0);
    if clip.w <= 0.0 {
        return None;
    }
    Some(clip.xyz() / clip.w)
}

/// Whether an NDC position lies inside the view volume
pub fn ndc_in_bounds(ndc: Vec3) -> bool {
    ndc.x.abs() <= 1.0 && ndc.y.abs() <= 1.0 && (0.0..=1.0).contains(&ndc.z)
}

/// NDC to pixel coordinates, clamped to the surface
pub fn ndc_to_pixel(ndc: Vec3, extent: SurfaceExtent) -> UVec2 {
    let x = (ndc.x * 0.5 + 0.5) * extent.width as f32;
    let y = (0.5 - ndc.y * 0.5) * extent.height as f32;
    let max_x = extent.width.saturating_sub(1) as f32;
    let max_y = extent.height.saturating_sub(1) as f32;
    UVec2::new(x.clamp(0.0, max_x) as u32, y.clamp(0.0, max_y) as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn looking_down_z() -> Camera {
        Camera {
            eye: Vec3::new(0.0, 0.0, 10.0),
            target: Vec3::ZERO,
            ..Default::default()
        }
    }

    #[test]
    fn test_center_projects_to_middle() {
        let extent = SurfaceExtent::new(64, 32);
        let vp = looking_down_z().view_projection(extent);
        let ndc = project(&vp, Vec3::ZERO).unwrap();
        assert!(ndc.x.abs() < 1e-5 && ndc.y.abs() < 1e-5);
        assert!(ndc_in_bounds(ndc));
        assert_eq!(ndc_to_pixel(ndc, extent), UVec2::new(32, 16));
    }

    #[test]
    fn test_behind_camera_is_rejected() {
        let extent = SurfaceExtent::new(64, 64);
        let vp = looking_down_z().view_projection(extent);
        assert!(project(&vp, Vec3::new(0.0, 0.0, 20.0)).is_none());
    }

    #[test]
    fn test_depth_grows_with_distance() {
        let extent = SurfaceExtent::new(64, 64);
        let vp = looking_down_z().view_projection(extent);
        let near = project(&vp, Vec3::new(0.0, 0.0, 5.0)).unwrap();
        let far = project(&vp, Vec3::new(0.0, 0.0, 4.0)).unwrap();
        assert!(near.z < far.z);
    }

    #[test]
    fn test_pixel_clamps_to_bounds() {
        let extent = SurfaceExtent::new(10, 20);
        assert_eq!(ndc_to_pixel(Vec3::new(1.0, -1.0, 0.5), extent), UVec2::new(9, 19));
        assert_eq!(ndc_to_pixel(Vec3::new(-3.0, 3.0, 0.5), extent), UVec2::new(0, 0));
        assert_eq!(ndc_to_pixel(Vec3::new(5.0, -5.0, 0.5), extent), UVec2::new(9, 19));
    }

    #[test]
    fn test_up_is_top_row() {
        let extent = SurfaceExtent::new(8, 8);
        assert_eq!(ndc_to_pixel(Vec3::new(0.0, 0.9, 0.5), extent).y, 0);
    }

    #[test]
    fn test_ray_through_center_follows_view() {
        let camera = looking_down_z();
        let extent = SurfaceExtent::new(100, 100);
        let (origin, dir) = camera.ray(extent, glam::Vec2::new(50.0, 50.0));
        assert!((dir - Vec3::NEG_Z).length() < 1e-3);
        assert!(origin.z < 10.0 && origin.z > 9.0);
    }

    #[test]
    fn test_mirrored_camera() {
        let camera = looking_down_z();
        let mirror = camera.mirrored(Vec3::ZERO, Vec3::X);
        assert_eq!(mirror.eye, camera.eye);
        let mirror = camera.mirrored(Vec3::new(0.0, 0.0, 2.0), Vec3::Z);
        assert!((mirror.eye - Vec3::new(0.0, 0.0, -6.0)).length() < 1e-5);
        assert!((mirror.target - Vec3::new(0.0, 0.0, 4.0)).length() < 1e-5);
    }
}
