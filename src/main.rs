mod config;
mod engine;
mod helper;
mod manifest;
mod renderer;
mod scene;
mod user_interface;

use engine::engine_instance::{EngineInstance, WindowSettings};
use helper::{anyhow_panic::anyhow_unwrap, logger::ConsoleLogger};
#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};
use std::{env, path::PathBuf};
use user_interface::overlay::default_root_control;
use winit::event_loop::EventLoop;

static LOGGER: ConsoleLogger = ConsoleLogger;

fn main() {
    if let Err(e) = log::set_logger(&LOGGER) {
        eprintln!("failed to set logger: {}", e);
    }
    log::set_max_level(config::log_level());

    info!("{} v{}", config::ENGINE_NAME, config::ENGINE_VERSION);
    manifest::MANIFEST.log_requirements();

    let scene_path = config::scene_path(env::args()).map(PathBuf::from);

    let event_loop = EventLoop::new();
    let engine_res = EngineInstance::new(
        &event_loop,
        WindowSettings::default(),
        scene_path.as_deref(),
        default_root_control(),
    );
    let mut engine = anyhow_unwrap(engine_res, "initialize engine");

    event_loop.run(move |event, _, control_flow| engine.control_flow(event, control_flow));
}
