use std::f64::consts::PI;

/// Vertical field of view in radians
pub const FIELD_OF_VIEW: f64 = PI / 4.;
pub const CAMERA_NEAR_PLANE: f64 = 0.01;
pub const CAMERA_FAR_PLANE: f64 = 1000.;

pub const DEFAULT_CAMERA_DISTANCE: f64 = 5.;
pub const MIN_CAMERA_DISTANCE: f64 = 0.05;
pub const MAX_CAMERA_DISTANCE: f64 = 10_000.;

/// Radians per pixel of cursor movement
pub const ARC_BALL_SENSITIVITY: f64 = 0.005;
/// Limits how close the camera can get to looking straight up or down (radians)
pub const VERTICAL_ANGLE_CLAMP: f64 = 0.01;

/// Seconds between refreshes of the frame time shown in the stats panel
pub const STATS_REFRESH_INTERVAL: f64 = 0.25;
