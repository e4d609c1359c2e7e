use super::{
    config_engine,
    render_thread::{start_render_thread, FrameTimestamp, RenderThreadChannels, RenderThreadCommand},
    save_states::{load_state_camera, save_state_camera},
};
use crate::{
    config,
    renderer::render_manager::RenderManager,
    scene::{gltf_loader::load_gltf, mesh_optimizer::optimize_mesh, Scene},
    user_interface::{
        camera::Camera,
        control::{Control, FrameStats},
        overlay::Overlay,
    },
};
use anyhow::Context;
use glam::DVec2;
#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};
use single_value_channel::NoReceiverError;
use std::{
    fmt,
    path::{Path, PathBuf},
    sync::{mpsc::SendError, Arc},
    thread::JoinHandle,
    time::Instant,
};
use winit::{
    dpi::{LogicalSize, PhysicalPosition, PhysicalSize},
    event::{
        ElementState, Event, KeyboardInput, MouseButton, MouseScrollDelta, VirtualKeyCode,
        WindowEvent,
    },
    event_loop::{ControlFlow, EventLoop},
    window::{Window, WindowBuilder},
};

/// Pixels of scroll that count as one line of mouse wheel movement
const PIXELS_PER_SCROLL_LINE: f64 = 50.;

#[derive(Clone, Debug, PartialEq)]
pub struct WindowSettings {
    pub width: u16,
    pub height: u16,
    pub title: String,
}

impl Default for WindowSettings {
    fn default() -> Self {
        Self {
            width: config::DEFAULT_WINDOW_SIZE[0],
            height: config::DEFAULT_WINDOW_SIZE[1],
            title: config::ENGINE_NAME.to_string(),
        }
    }
}

impl WindowSettings {
    pub fn validate(&self) -> Result<(), WindowError> {
        if self.width == 0 || self.height == 0 {
            return Err(WindowError::InvalidDimensions {
                width: self.width,
                height: self.height,
            });
        }
        Ok(())
    }
}

pub struct EngineInstance {
    window: Arc<Window>,

    // state
    initialized: bool,
    open: bool,
    scale_factor: f64,
    main_thread_frame_number: u64,
    object_count: usize,
    last_frame_timestamp: Option<FrameTimestamp>,
    frame_time_ms: f64,

    // input
    cursor_position: Option<DVec2>,
    cursor_delta: DVec2,
    rotating: bool,
    scroll_delta: f64,

    // controllers
    camera: Camera,
    overlay: Overlay,

    // render thread
    render_thread: Option<(JoinHandle<()>, RenderThreadChannels)>,
}

impl EngineInstance {
    /// Creates the window and renderer, loads the scene at `scene_path` (if any) and starts the
    /// render thread. `root_control` becomes the root of the overlay control tree.
    pub fn new(
        event_loop: &EventLoop<()>,
        window_settings: WindowSettings,
        scene_path: Option<&Path>,
        root_control: Control,
    ) -> anyhow::Result<Self> {
        window_settings.validate()?;

        let mut window_builder = WindowBuilder::new().with_title(window_settings.title.as_str());
        if config::START_MAXIMIZED {
            window_builder = window_builder.with_maximized(true);
        } else {
            window_builder = window_builder.with_inner_size(LogicalSize::new(
                window_settings.width,
                window_settings.height,
            ));
        }
        let window = Arc::new(
            window_builder
                .build(event_loop)
                .context("creating window")?,
        );

        let scale_factor = config::scale_factor_override().unwrap_or(window.scale_factor());
        let window_size: [u32; 2] = window.inner_size().into();

        let mut camera = match load_state_camera() {
            Ok(camera) => {
                debug!("loaded camera from previous session");
                camera
            }
            Err(e) => {
                warn!("failed to load camera save state ({}). using default camera...", e);
                Camera::default()
            }
        };
        camera.set_aspect_ratio(window.inner_size().into());

        let mut renderer = RenderManager::new(window.clone(), scale_factor as f32, camera)
            .context("initializing renderer")?;

        let mut object_count = 0;
        if let Some(scene_path) = scene_path {
            let scene = load_scene_file(scene_path)?;
            if let Some(bounding_box) = scene.bounding_box() {
                camera.frame_bounding_box(bounding_box.min, bounding_box.max);
                renderer.update_camera(camera);
            }
            object_count = scene.objects.len();
            renderer.load_scene(scene).context("uploading scene")?;
        } else {
            info!("no scene specified. rendering an empty scene...");
        }

        let overlay = Overlay::new(event_loop, scale_factor as f32, window_size, root_control);

        let render_thread = start_render_thread(renderer);

        info!("engine initialized");

        Ok(Self {
            window,

            initialized: true,
            open: true,
            scale_factor,
            main_thread_frame_number: 0,
            object_count,
            last_frame_timestamp: None,
            frame_time_ms: 0.,

            cursor_position: None,
            cursor_delta: DVec2::ZERO,
            rotating: false,
            scroll_delta: 0.,

            camera,
            overlay,

            render_thread: Some(render_thread),
        })
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Stops the render thread (dropping the renderer) and saves the camera. Does nothing if
    /// already shut down.
    pub fn shutdown(&mut self) {
        let Some((render_thread_handle, render_thread_channels)) = self.render_thread.take() else {
            return;
        };
        info!("shutting down engine...");

        stop_render_thread(render_thread_handle, &render_thread_channels);

        if let Err(e) = save_state_camera(&self.camera) {
            warn!("failed to save camera state: {}", e);
        }

        self.initialized = false;
    }

    /// The main loop of the engine. Processes winit events. Pass this function to [`EventLoop::run`].
    pub fn control_flow(&mut self, event: Event<()>, control_flow: &mut ControlFlow) {
        if let Event::LoopDestroyed = event {
            self.shutdown();
            return;
        }
        if let ControlFlow::ExitWithCode(_) = *control_flow {
            // don't do any more processing if we're quitting
            return;
        }
        control_flow.set_poll();

        match event {
            // exit the event loop and close application
            Event::WindowEvent {
                event: WindowEvent::CloseRequested,
                ..
            } => {
                info!("close requested by window");
                self.close(control_flow);
            }

            // process window events and update state
            Event::WindowEvent { event, .. } => {
                if let Err(e) = self.process_input(event, control_flow) {
                    error!("error while processing input: {}", e);
                    self.close(control_flow);
                }
            }

            // per frame logic
            Event::MainEventsCleared => {
                if let Err(e) = self.per_frame_processing() {
                    error!("error during per-frame processing: {}", e);
                    self.close(control_flow);
                }
            }

            _ => (),
        }
    }
}

impl Drop for EngineInstance {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// Private functions

impl EngineInstance {
    fn close(&mut self, control_flow: &mut ControlFlow) {
        self.shutdown();
        self.open = false;
        control_flow.set_exit();
    }

    /// Process window events and update state
    fn process_input(
        &mut self,
        event: WindowEvent,
        control_flow: &mut ControlFlow,
    ) -> Result<(), EngineError> {
        trace!("winit event: {:?}", event);

        let captured_by_overlay = self.overlay.process_event(&event).consumed;

        match event {
            WindowEvent::CursorMoved { position, .. } => self.set_cursor_position(position),
            WindowEvent::CursorLeft { .. } => self.cursor_position = None,

            WindowEvent::MouseInput {
                state,
                button: MouseButton::Left,
                ..
            } => {
                self.rotating = state == ElementState::Pressed && !captured_by_overlay;
            }

            WindowEvent::MouseWheel { delta, .. } => {
                if !captured_by_overlay {
                    self.scroll_delta += scroll_lines(delta);
                }
            }

            WindowEvent::KeyboardInput { input, .. } => {
                if !captured_by_overlay {
                    self.process_keyboard_input(input, control_flow)?;
                }
            }

            WindowEvent::Resized(new_inner_size) => {
                self.update_window_inner_size(new_inner_size)?;
            }

            // dpi change
            WindowEvent::ScaleFactorChanged {
                scale_factor,
                new_inner_size,
            } => {
                self.set_scale_factor(scale_factor)?;
                self.update_window_inner_size(*new_inner_size)?;
            }
            _ => (),
        }

        Ok(())
    }

    fn per_frame_processing(&mut self) -> Result<(), EngineError> {
        let channels = self.channels()?;
        check_channel_updater_result(
            channels.set_render_thread_command(RenderThreadCommand::Run),
        )?;

        self.update_frame_time();

        // overlay controls
        let stats = FrameStats {
            frame_time_ms: self.frame_time_ms,
            object_count: self.object_count,
            camera_position: self.camera.position(),
            display_size: self.window.inner_size().into(),
        };
        let requests = self.overlay.update(&self.window, stats);
        if requests.screenshot {
            self.request_screenshot()?;
        }

        // camera
        if self.rotating {
            self.camera.rotate(self.cursor_delta);
        }
        self.cursor_delta = DVec2::ZERO;
        self.camera.scroll_zoom(std::mem::take(&mut self.scroll_delta));

        let textures_delta = self.overlay.get_and_clear_textures_delta();
        let primitives = self.overlay.mesh_primitives().clone();

        let channels = self.channels()?;
        check_channel_updater_result(channels.update_camera(self.camera))?;
        if !textures_delta.is_empty() {
            check_channel_sender_result(channels.update_overlay_textures(textures_delta))?;
        }
        check_channel_updater_result(channels.set_overlay_primitives(primitives))?;

        self.main_thread_frame_number += 1;
        Ok(())
    }

    fn process_keyboard_input(
        &mut self,
        keyboard_input: KeyboardInput,
        control_flow: &mut ControlFlow,
    ) -> Result<(), EngineError> {
        let Some(key_code) = keyboard_input.virtual_keycode else {
            return Ok(());
        };
        if keyboard_input.state != ElementState::Pressed {
            return Ok(());
        }

        match key_code {
            VirtualKeyCode::Escape => {
                info!("escape pressed. closing window...");
                self.close(control_flow);
            }
            VirtualKeyCode::F12 => self.request_screenshot()?,
            _ => (),
        }
        Ok(())
    }

    fn set_cursor_position(&mut self, position: PhysicalPosition<f64>) {
        let new_position = DVec2::new(position.x, position.y);
        if let Some(previous_position) = self.cursor_position {
            self.cursor_delta += new_position - previous_position;
        }
        self.cursor_position = Some(new_position);
    }

    fn update_window_inner_size(
        &mut self,
        new_inner_size: PhysicalSize<u32>,
    ) -> Result<(), EngineError> {
        self.camera.set_aspect_ratio(new_inner_size.into());
        self.overlay
            .set_display_size(new_inner_size.into(), self.scale_factor as f32);

        check_channel_updater_result(self.channels()?.set_window_just_resized_flag())
    }

    fn set_scale_factor(&mut self, scale_factor: f64) -> Result<(), EngineError> {
        // an environment override takes precedence over the platform
        self.scale_factor = config::scale_factor_override().unwrap_or(scale_factor);
        check_channel_updater_result(
            self.channels()?
                .set_scale_factor(self.scale_factor as f32),
        )
    }

    fn request_screenshot(&mut self) -> Result<(), EngineError> {
        let path = screenshot_path(self.main_thread_frame_number);
        info!("saving screenshot to {:?}", path);
        check_channel_updater_result(self.channels()?.request_screenshot(path))
    }

    /// Average frame time of the render thread since the last check
    fn update_frame_time(&mut self) {
        let Ok(channels) = self.channels_mut() else {
            return;
        };
        let Some(latest) = channels.get_latest_frame_timestamp() else {
            return;
        };
        if let Some(previous) = self.last_frame_timestamp {
            if let Some(frame_time_ms) = average_frame_time_ms(previous, latest) {
                self.frame_time_ms = frame_time_ms;
            }
        }
        self.last_frame_timestamp = Some(latest);
    }

    fn channels(&self) -> Result<&RenderThreadChannels, EngineError> {
        self.render_thread
            .as_ref()
            .map(|(_, channels)| channels)
            .ok_or(EngineError::RenderThreadStopped)
    }

    fn channels_mut(&mut self) -> Result<&mut RenderThreadChannels, EngineError> {
        self.render_thread
            .as_mut()
            .map(|(_, channels)| channels)
            .ok_or(EngineError::RenderThreadStopped)
    }
}

fn stop_render_thread(render_thread_handle: JoinHandle<()>, channels: &RenderThreadChannels) {
    debug!("sending quit command to render thread...");
    let _render_thread_send_res = channels.set_render_thread_command(RenderThreadCommand::Quit);

    debug!(
        "waiting for render thread to quit (timeout = {:.2}s)",
        config_engine::RENDER_THREAD_WAIT_TIMEOUT_SECONDS
    );
    let render_thread_timeout_begin = Instant::now();
    let timeout_millis = (config_engine::RENDER_THREAD_WAIT_TIMEOUT_SECONDS * 1_000.) as u128;
    loop {
        if render_thread_handle.is_finished() {
            if render_thread_handle.join().is_err() {
                error!("render thread panicked");
            } else {
                debug!("render thread quit.");
            }
            break;
        }
        if render_thread_timeout_begin.elapsed().as_millis() > timeout_millis {
            error!(
                "render thread hanging longer than timeout of {:.2}s. continuing now...",
                config_engine::RENDER_THREAD_WAIT_TIMEOUT_SECONDS
            );
            break;
        }
        std::thread::yield_now();
    }
}

/// Loads a gltf/glb file and optimizes its meshes
fn load_scene_file(path: &Path) -> anyhow::Result<Scene> {
    info!("loading scene {:?}...", path);
    let mut scene = load_gltf(path).with_context(|| format!("loading scene {:?}", path))?;

    for object in &mut scene.objects {
        if let Err(e) = optimize_mesh(&mut object.mesh) {
            warn!("failed to optimize mesh of {}: {}", object.name, e);
        }
    }

    info!(
        "scene {:?} has {} objects, {} triangles and {} images",
        path,
        scene.objects.len(),
        scene
            .objects
            .iter()
            .map(|o| o.mesh.triangle_count())
            .sum::<usize>(),
        scene.images.len()
    );
    Ok(scene)
}

fn screenshot_path(frame_number: u64) -> PathBuf {
    PathBuf::from(format!(
        "{}{}.png",
        config_engine::SCREENSHOT_FILENAME_PREFIX,
        frame_number
    ))
}

/// Positive values zoom in
fn scroll_lines(delta: MouseScrollDelta) -> f64 {
    match delta {
        MouseScrollDelta::LineDelta(_, y) => y as f64,
        MouseScrollDelta::PixelDelta(position) => position.y / PIXELS_PER_SCROLL_LINE,
    }
}

fn average_frame_time_ms(previous: FrameTimestamp, latest: FrameTimestamp) -> Option<f64> {
    let frames = latest.frame_num.checked_sub(previous.frame_num)?;
    if frames == 0 {
        return None;
    }
    let elapsed = latest
        .timestamp
        .checked_duration_since(previous.timestamp)?;
    Some(elapsed.as_secs_f64() * 1_000. / frames as f64)
}

// ~~ Errors ~~

#[derive(Debug)]
pub enum EngineError {
    RenderThreadClosedPrematurely,
    /// The engine has been shut down
    RenderThreadStopped,
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::RenderThreadClosedPrematurely => {
                write!(f, "render thread was closed prematurely")
            }
            Self::RenderThreadStopped => write!(f, "render thread has been stopped"),
        }
    }
}

impl std::error::Error for EngineError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WindowError {
    InvalidDimensions { width: u16, height: u16 },
}

impl fmt::Display for WindowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidDimensions { width, height } => write!(
                f,
                "invalid window dimensions {}x{}. width and height must be non-zero",
                width, height
            ),
        }
    }
}

impl std::error::Error for WindowError {}

/// If `thread_send_res` is an error, returns `EngineError::RenderThreadClosedPrematurely`.
/// Otherwise returns `Ok`.
fn check_channel_updater_result<T>(
    thread_send_res: Result<(), NoReceiverError<T>>,
) -> Result<(), EngineError> {
    if let Err(e) = thread_send_res {
        warn!("render thread receiver dropped prematurely ({})", e);
        return Err(EngineError::RenderThreadClosedPrematurely);
    }
    Ok(())
}

/// If `thread_send_res` is an error, returns `EngineError::RenderThreadClosedPrematurely`.
/// Otherwise returns `Ok`.
fn check_channel_sender_result<T>(
    thread_send_res: Result<(), SendError<T>>,
) -> Result<(), EngineError> {
    if let Err(e) = thread_send_res {
        warn!("render thread receiver dropped prematurely ({})", e);
        return Err(EngineError::RenderThreadClosedPrematurely);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use winit::dpi::PhysicalPosition;

    #[test]
    fn zero_dimensions_are_rejected() {
        let settings = WindowSettings {
            width: 0,
            height: 600,
            title: "test".to_string(),
        };
        assert_eq!(
            settings.validate(),
            Err(WindowError::InvalidDimensions {
                width: 0,
                height: 600
            })
        );
        assert!(WindowSettings::default().validate().is_ok());
    }

    #[test]
    fn screenshot_named_by_frame() {
        assert_eq!(screenshot_path(42), PathBuf::from("screenshot_42.png"));
    }

    #[test]
    fn pixel_scroll_converts_to_lines() {
        assert_eq!(scroll_lines(MouseScrollDelta::LineDelta(0., -2.)), -2.);
        assert_eq!(
            scroll_lines(MouseScrollDelta::PixelDelta(PhysicalPosition::new(
                0.,
                PIXELS_PER_SCROLL_LINE * 3.
            ))),
            3.
        );
    }

    #[test]
    fn frame_time_averages_over_frames() {
        let previous = FrameTimestamp::start();
        let latest = FrameTimestamp {
            frame_num: 4,
            timestamp: previous.timestamp + Duration::from_millis(40),
        };
        let frame_time_ms = average_frame_time_ms(previous, latest).unwrap();
        assert!((frame_time_ms - 10.).abs() < 1e-6);

        assert_eq!(average_frame_time_ms(latest, latest), None);
    }
}
