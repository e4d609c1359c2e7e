use super::config_ui;
use glam::{DMat4, DVec2, DVec3, Vec3};
#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};
use serde::{Deserialize, Serialize};
use std::f64::consts::FRAC_PI_2;

/// Orbit camera looking at `target` from `distance` away. World space up is +Y.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Camera {
    target: DVec3,
    /// Rotation around world space up (radians)
    yaw: f64,
    /// Elevation above the horizontal plane (radians)
    pitch: f64,
    distance: f64,
    fov: f64,
    aspect_ratio: f32,
    near_plane: f64,
    far_plane: f64,
}

// Public functions

impl Camera {
    pub fn new(resolution: [f32; 2]) -> Self {
        Self {
            aspect_ratio: calc_aspect_ratio(resolution),
            ..Default::default()
        }
    }

    /// Orbits around the target based on the pixel amount the cursor has moved
    pub fn rotate(&mut self, delta_cursor_position: DVec2) {
        let delta = delta_cursor_position * config_ui::ARC_BALL_SENSITIVITY;
        if !delta.is_finite() {
            return;
        }
        self.yaw -= delta.x;
        self.pitch = clamp_pitch(self.pitch + delta.y);
    }

    /// Move towards/away from the target. `scroll_delta` is number of scroll clicks.
    pub fn scroll_zoom(&mut self, scroll_delta: f64) {
        if scroll_delta == 0. || !scroll_delta.is_finite() {
            return;
        }
        // how far along the vector to the target we want to travel
        let travel_factor = dual_asymptote(scroll_delta);
        self.distance = (self.distance * (1. - travel_factor)).clamp(
            config_ui::MIN_CAMERA_DISTANCE,
            config_ui::MAX_CAMERA_DISTANCE,
        );
    }

    pub fn set_aspect_ratio(&mut self, resolution: [f32; 2]) {
        self.aspect_ratio = calc_aspect_ratio(resolution);
    }

    /// Targets the center of the box and moves far enough away that the whole box is in view
    pub fn frame_bounding_box(&mut self, min: Vec3, max: Vec3) {
        let (min, max) = (min.as_dvec3(), max.as_dvec3());
        let radius = ((max - min).length() / 2.).max(config_ui::MIN_CAMERA_DISTANCE);

        self.target = (min + max) / 2.;
        self.distance = (radius / (self.fov / 2.).sin()).clamp(
            config_ui::MIN_CAMERA_DISTANCE,
            config_ui::MAX_CAMERA_DISTANCE,
        );
        self.far_plane = config_ui::CAMERA_FAR_PLANE.max((self.distance + radius) * 2.);
        debug!(
            "camera framing target {:?} at distance {:.3}",
            self.target, self.distance
        );
    }

    // Getters

    pub fn position(&self) -> DVec3 {
        let direction_to_camera = DVec3::new(
            self.pitch.cos() * self.yaw.sin(),
            self.pitch.sin(),
            self.pitch.cos() * self.yaw.cos(),
        );
        self.target + direction_to_camera * self.distance
    }

    pub fn target(&self) -> DVec3 {
        self.target
    }

    pub fn distance(&self) -> f64 {
        self.distance
    }

    pub fn view_matrix(&self) -> DMat4 {
        DMat4::look_at_rh(self.position(), self.target, DVec3::Y)
    }

    /// Right handed perspective projection with y flipped for vulkan clip space
    pub fn projection_matrix(&self) -> DMat4 {
        let mut projection = DMat4::perspective_rh(
            self.fov,
            self.aspect_ratio as f64,
            self.near_plane,
            self.far_plane,
        );
        projection.y_axis.y *= -1.;
        projection
    }

    pub fn aspect_ratio(&self) -> f32 {
        self.aspect_ratio
    }

    pub fn near_plane(&self) -> f64 {
        self.near_plane
    }

    pub fn far_plane(&self) -> f64 {
        self.far_plane
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            target: DVec3::ZERO,
            yaw: 0.,
            pitch: 0.3,
            distance: config_ui::DEFAULT_CAMERA_DISTANCE,
            fov: config_ui::FIELD_OF_VIEW,
            aspect_ratio: 1.,
            near_plane: config_ui::CAMERA_NEAR_PLANE,
            far_plane: config_ui::CAMERA_FAR_PLANE,
        }
    }
}

/// Keeps the camera from crossing over world space up and doing a disorienting flip
fn clamp_pitch(pitch: f64) -> f64 {
    let max = FRAC_PI_2 - config_ui::VERTICAL_ANGLE_CLAMP;
    pitch.clamp(-max, max)
}

fn calc_aspect_ratio(resolution: [f32; 2]) -> f32 {
    if resolution[1] == 0. {
        return 1.;
    }
    resolution[0] / resolution[1]
}

/// (2^x - 1) / (2^x + 1)
///
/// Has asymptote at y = 1 when x = +∞ and another at y = -1 when x = -∞.
/// Gradient is 1 at x = 0. Inspired by tanh but with lighter gradient falloff.
fn dual_asymptote(x: f64) -> f64 {
    (2_f64.powf(x) - 1.) / (2_f64.powf(x) + 1.)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn view_matrix_puts_target_in_front() {
        let camera = Camera::default();
        let target_view = camera.view_matrix().transform_point3(camera.target());
        // right handed view space looks down -z
        assert!(target_view.x.abs() < 1e-9);
        assert!(target_view.y.abs() < 1e-9);
        assert!((target_view.z + camera.distance()).abs() < 1e-9);
    }

    #[test]
    fn projection_flips_y() {
        let camera = Camera::new([800., 600.]);
        let p = camera.projection_matrix();
        assert!(p.y_axis.y < 0.);
        assert!(p.x_axis.x > 0.);

        // point above the view axis lands in the upper half of vulkan clip space (negative y)
        let clip = p.project_point3(DVec3::new(0., 1., -5.));
        assert!(clip.y < 0.);
    }

    #[test]
    fn aspect_ratio_with_zero_height() {
        let mut camera = Camera::default();
        camera.set_aspect_ratio([1920., 0.]);
        assert_eq!(camera.aspect_ratio(), 1.);
        camera.set_aspect_ratio([1920., 1080.]);
        assert!((camera.aspect_ratio() - 16. / 9.).abs() < 1e-6);
    }

    #[test]
    fn pitch_is_clamped_away_from_poles() {
        let mut camera = Camera::default();
        camera.rotate(DVec2::new(0., 1e6));
        let up_dot = (camera.position() - camera.target()).normalize().dot(DVec3::Y);
        assert!(up_dot < 1.);
        assert!(camera.view_matrix().is_finite());
    }

    #[test]
    fn scroll_zoom_moves_closer_and_clamps() {
        let mut camera = Camera::default();
        let before = camera.distance();
        camera.scroll_zoom(1.);
        assert!(camera.distance() < before);

        for _ in 0..1000 {
            camera.scroll_zoom(10.);
        }
        assert!(camera.distance() >= config_ui::MIN_CAMERA_DISTANCE);
    }

    #[test]
    fn framing_a_box_sees_all_of_it() {
        let mut camera = Camera::new([1., 1.]);
        camera.frame_bounding_box(Vec3::new(10., -1., -1.), Vec3::new(12., 1., 1.));
        assert_eq!(camera.target(), DVec3::new(11., 0., 0.));

        let proj_view = camera.projection_matrix() * camera.view_matrix();
        for corner in [DVec3::new(10., -1., -1.), DVec3::new(12., 1., 1.)] {
            let ndc = proj_view.project_point3(corner);
            assert!(ndc.x.abs() <= 1. && ndc.y.abs() <= 1.);
        }
    }
}
