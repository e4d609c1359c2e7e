use crate::helper::logger::parse_level_filter;
use log::LevelFilter;
use std::env;

pub const ENGINE_NAME: &str = "vulkan-renderer";
pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Environment variables that can be used to configure the engine
#[allow(non_snake_case)]
pub mod ENV {
    /// Set to a float number to override the scale factor
    pub const SCALE_FACTOR: &str = "VKR_SCALE_FACTOR";
    /// One of error, warn, info, debug, trace or off
    pub const LOG_LEVEL: &str = "VKR_LOG_LEVEL";
    /// Path of a gltf/glb file to load at startup. The first command line argument takes precedence.
    pub const SCENE: &str = "VKR_SCENE";
}

/// Log level filter. Log messages with lower levels than this will not be displayed.
#[cfg(debug_assertions)]
pub const DEFAULT_LOG_LEVEL: LevelFilter = LevelFilter::Debug;
#[cfg(not(debug_assertions))]
pub const DEFAULT_LOG_LEVEL: LevelFilter = LevelFilter::Info;

/// Wherever the app window starts maximized
pub const START_MAXIMIZED: bool = false;
/// Default window size if `START_MAXIMIZED` is false
pub const DEFAULT_WINDOW_SIZE: [u16; 2] = [1280, 720];

/// Prepended to save state files
pub const PRECURSOR_BYTES: [u8; PRECURSOR_BYTE_COUNT] = *b"VKR0";
pub const PRECURSOR_BYTE_COUNT: usize = 4;

/// `DEFAULT_LOG_LEVEL` unless overridden by the `VKR_LOG_LEVEL` environment variable
pub fn log_level() -> LevelFilter {
    log_level_from(env::var(ENV::LOG_LEVEL).ok().as_deref())
}

fn log_level_from(env_value: Option<&str>) -> LevelFilter {
    env_value
        .and_then(parse_level_filter)
        .unwrap_or(DEFAULT_LOG_LEVEL)
}

pub fn scale_factor_override() -> Option<f64> {
    env::var(ENV::SCALE_FACTOR).ok()?.parse::<f64>().ok()
}

/// The first command line argument, falling back to the `VKR_SCENE` environment variable
pub fn scene_path(mut args: impl Iterator<Item = String>) -> Option<String> {
    args.nth(1).or_else(|| env::var(ENV::SCENE).ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_level_falls_back_to_default() {
        assert_eq!(log_level_from(None), DEFAULT_LOG_LEVEL);
        assert_eq!(log_level_from(Some("verbose")), DEFAULT_LOG_LEVEL);
        assert_eq!(log_level_from(Some("trace")), LevelFilter::Trace);
    }

    #[test]
    fn cli_argument_takes_precedence() {
        let args = ["vulkan-renderer", "assets/helmet.glb"].map(String::from);
        assert_eq!(
            scene_path(args.into_iter()).as_deref(),
            Some("assets/helmet.glb")
        );
    }
}
