pub const RENDER_THREAD_WAIT_TIMEOUT_SECONDS: f64 = 2.;

pub const LOCAL_STORAGE_DIR: &str = ".vulkan-renderer";
pub const SAVE_STATE_FILENAME_CAMERA: &str = "camera.vkrsave";

/// Screenshots requested with F12 are written to `screenshot_<frame>.png` in the working directory
pub const SCREENSHOT_FILENAME_PREFIX: &str = "screenshot_";
