use crate::{
    helper::anyhow_panic::log_anyhow_error_and_sources, renderer::render_manager::RenderManager,
    user_interface::camera::Camera,
};
use egui::{ClippedPrimitive, TexturesDelta};
#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};
use single_value_channel::NoReceiverError;
use std::{
    mem,
    path::PathBuf,
    sync::mpsc::{self, SendError, TryRecvError},
    thread::{self, JoinHandle},
    time::Instant,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RenderThreadCommand {
    Run,
    Quit,
}

#[derive(Copy, Clone, Debug)]
pub struct FrameTimestamp {
    pub frame_num: u64,
    pub timestamp: Instant,
}

impl FrameTimestamp {
    pub fn start() -> Self {
        Self {
            frame_num: 0,
            timestamp: Instant::now(),
        }
    }

    pub fn increment(previous_frame_number: u64) -> Self {
        Self {
            frame_num: previous_frame_number + 1,
            timestamp: Instant::now(),
        }
    }
}

/// Main thread end of the render thread channels
pub struct RenderThreadChannels {
    command_tx: single_value_channel::Updater<RenderThreadCommand>,
    window_resized_tx: single_value_channel::Updater<Option<bool>>,
    scale_factor_tx: single_value_channel::Updater<Option<f32>>,
    camera_tx: single_value_channel::Updater<Option<Camera>>,
    overlay_primitives_tx: single_value_channel::Updater<Option<Vec<ClippedPrimitive>>>,
    screenshot_tx: single_value_channel::Updater<Option<PathBuf>>,
    textures_delta_tx: mpsc::Sender<Vec<TexturesDelta>>,
    frame_timestamp_rx: single_value_channel::Receiver<Option<FrameTimestamp>>,
}

impl RenderThreadChannels {
    pub fn set_render_thread_command(
        &self,
        command: RenderThreadCommand,
    ) -> Result<(), NoReceiverError<RenderThreadCommand>> {
        self.command_tx.update(command)
    }

    pub fn set_window_just_resized_flag(&self) -> Result<(), NoReceiverError<Option<bool>>> {
        self.window_resized_tx.update(Some(true))
    }

    pub fn set_scale_factor(&self, scale_factor: f32) -> Result<(), NoReceiverError<Option<f32>>> {
        self.scale_factor_tx.update(Some(scale_factor))
    }

    pub fn update_camera(&self, camera: Camera) -> Result<(), NoReceiverError<Option<Camera>>> {
        self.camera_tx.update(Some(camera))
    }

    pub fn set_overlay_primitives(
        &self,
        primitives: Vec<ClippedPrimitive>,
    ) -> Result<(), NoReceiverError<Option<Vec<ClippedPrimitive>>>> {
        self.overlay_primitives_tx.update(Some(primitives))
    }

    pub fn request_screenshot(&self, path: PathBuf) -> Result<(), NoReceiverError<Option<PathBuf>>> {
        self.screenshot_tx.update(Some(path))
    }

    pub fn update_overlay_textures(
        &self,
        textures_delta: Vec<TexturesDelta>,
    ) -> Result<(), SendError<Vec<TexturesDelta>>> {
        self.textures_delta_tx.send(textures_delta)
    }

    pub fn get_latest_frame_timestamp(&mut self) -> Option<FrameTimestamp> {
        *self.frame_timestamp_rx.latest()
    }
}

/// Render thread end of the channels
struct RenderThreadReceivers {
    command_rx: single_value_channel::Receiver<RenderThreadCommand>,
    window_resized_rx: single_value_channel::Receiver<Option<bool>>,
    scale_factor_rx: single_value_channel::Receiver<Option<f32>>,
    camera_rx: single_value_channel::Receiver<Option<Camera>>,
    overlay_primitives_rx: single_value_channel::Receiver<Option<Vec<ClippedPrimitive>>>,
    screenshot_rx: single_value_channel::Receiver<Option<PathBuf>>,
    textures_delta_rx: mpsc::Receiver<Vec<TexturesDelta>>,
    frame_timestamp_tx: single_value_channel::Updater<Option<FrameTimestamp>>,
}

/// Moves `renderer` onto a new thread which draws frames until told to quit or a channel
/// disconnects. The renderer is dropped on the render thread.
pub fn start_render_thread(renderer: RenderManager) -> (JoinHandle<()>, RenderThreadChannels) {
    let (command_rx, command_tx) =
        single_value_channel::channel_starting_with(RenderThreadCommand::Run);
    let (window_resized_rx, window_resized_tx) = single_value_channel::channel::<bool>();
    let (scale_factor_rx, scale_factor_tx) = single_value_channel::channel::<f32>();
    let (camera_rx, camera_tx) = single_value_channel::channel::<Camera>();
    let (overlay_primitives_rx, overlay_primitives_tx) =
        single_value_channel::channel::<Vec<ClippedPrimitive>>();
    let (screenshot_rx, screenshot_tx) = single_value_channel::channel::<PathBuf>();
    let (textures_delta_tx, textures_delta_rx) = mpsc::channel::<Vec<TexturesDelta>>();
    let (frame_timestamp_rx, frame_timestamp_tx) =
        single_value_channel::channel::<FrameTimestamp>();

    let receivers = RenderThreadReceivers {
        command_rx,
        window_resized_rx,
        scale_factor_rx,
        camera_rx,
        overlay_primitives_rx,
        screenshot_rx,
        textures_delta_rx,
        frame_timestamp_tx,
    };

    let render_thread_handle = thread::spawn(move || render_loop(renderer, receivers));

    let channels = RenderThreadChannels {
        command_tx,
        window_resized_tx,
        scale_factor_tx,
        camera_tx,
        overlay_primitives_tx,
        screenshot_tx,
        textures_delta_tx,
        frame_timestamp_rx,
    };

    (render_thread_handle, channels)
}

fn render_loop(mut renderer: RenderManager, mut receivers: RenderThreadReceivers) {
    let mut frame_timestamp = FrameTimestamp::start();

    'render_loop: loop {
        if *receivers.command_rx.latest() == RenderThreadCommand::Quit {
            debug!("render thread > quit command received");
            break 'render_loop;
        }

        // apply updates from the main thread

        if mem::take(receivers.window_resized_rx.latest_mut()).is_some() {
            renderer.set_window_resized();
        }
        if let Some(scale_factor) = mem::take(receivers.scale_factor_rx.latest_mut()) {
            renderer.set_scale_factor(scale_factor);
        }
        if let Some(camera) = mem::take(receivers.camera_rx.latest_mut()) {
            renderer.update_camera(camera);
        }
        if let Some(primitives) = mem::take(receivers.overlay_primitives_rx.latest_mut()) {
            renderer.update_overlay_primitives(primitives);
        }
        if let Some(path) = mem::take(receivers.screenshot_rx.latest_mut()) {
            renderer.request_screenshot(path);
        }

        loop {
            match receivers.textures_delta_rx.try_recv() {
                Ok(textures_delta) => renderer.update_overlay_textures(textures_delta),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    debug!("render thread > texture delta sender disconnected. stopping render thread...");
                    break 'render_loop;
                }
            }
        }

        // submit frame rendering commands

        if let Err(e) = renderer.draw_frame() {
            log_anyhow_error_and_sources(&e, "render thread > draw frame");
            break 'render_loop;
        }

        // send new frame timestamp

        frame_timestamp = FrameTimestamp::increment(frame_timestamp.frame_num);
        if let Err(NoReceiverError(_)) = receivers
            .frame_timestamp_tx
            .update(Some(frame_timestamp))
        {
            error!(
                "render thread > frame timestamp receiver disconnected! stopping render thread..."
            );
            break 'render_loop;
        }
    }

    debug!(
        "render thread > exiting after {} frames",
        frame_timestamp.frame_num
    );
}
