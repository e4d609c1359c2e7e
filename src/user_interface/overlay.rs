use super::{
    config_ui,
    control::{Control, ControlHooks, FrameStats, OverlayRequests, PaintContext},
};
use egui::TexturesDelta;
use egui_winit::EventResponse;
#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};
use std::time::Instant;
use winit::{event_loop::EventLoopWindowTarget, window::Window};

/// Controller for the [`egui`] overlay drawn on top of the scene
pub struct Overlay {
    context: egui::Context,
    winit_state: egui_winit::State,
    root: Control,
    mesh_primitives: Vec<egui::ClippedPrimitive>,
    textures_delta_accumulation: Vec<TexturesDelta>,
    display_size: [u32; 2],
}

// Public functions

impl Overlay {
    /// Creates a new [`Overlay`] and initializes the control tree under `root`.
    pub fn new<T>(
        event_loop: &EventLoopWindowTarget<T>,
        scale_factor: f32,
        display_size: [u32; 2],
        mut root: Control,
    ) -> Self {
        let context = egui::Context::default();
        context.set_style(egui::Style {
            // disable sentance wrap by default (horizontal scroll instead)
            wrap: Some(false),
            ..Default::default()
        });

        let mut winit_state = egui_winit::State::new(event_loop);
        // set egui scale factor to platform dpi (by default)
        winit_state.set_pixels_per_point(scale_factor);

        root.initialize();

        Self {
            context,
            winit_state,
            root,
            mesh_primitives: Default::default(),
            textures_delta_accumulation: Default::default(),
            display_size,
        }
    }

    /// Updates context state by winit window event. `consumed` is set if egui wants exclusive use of this event
    /// (e.g. a mouse click on an egui window, or entering text into a text field).
    pub fn process_event(&mut self, event: &winit::event::WindowEvent<'_>) -> EventResponse {
        self.winit_state.on_event(&self.context, event)
    }

    /// Call on window resize or dpi change
    pub fn set_display_size(&mut self, display_size: [u32; 2], scale_factor: f32) {
        self.display_size = display_size;
        if self.winit_state.pixels_per_point() != scale_factor {
            self.winit_state.set_pixels_per_point(scale_factor);
            self.root.refresh_resources();
        }
    }

    /// Runs the control tree for a frame. Returns what the controls requested of the engine.
    pub fn update(&mut self, window: &Window, stats: FrameStats) -> OverlayRequests {
        let mut requests = OverlayRequests::default();

        self.root.pre_update();

        let raw_input = self.winit_state.take_egui_input(window);
        self.context.begin_frame(raw_input);

        let stats = FrameStats {
            display_size: self.display_size,
            ..stats
        };
        let mut paint_context = PaintContext {
            egui: &self.context,
            stats: &stats,
            requests: &mut requests,
        };
        self.root.update(&mut paint_context);

        let egui::FullOutput {
            platform_output,
            repaint_after: _r,
            textures_delta,
            shapes,
        } = self.context.end_frame();
        self.winit_state
            .handle_platform_output(window, &self.context, platform_output);

        // store clipped primitive data for use by the renderer
        self.mesh_primitives = self.context.tessellate(shapes);

        // store required texture changes for the renderer to apply updates
        if !textures_delta.is_empty() {
            self.textures_delta_accumulation.push(textures_delta);
        }

        self.root.post_update();

        requests
    }

    /// Get a reference to the clipped meshes required for rendering
    pub fn mesh_primitives(&self) -> &Vec<egui::ClippedPrimitive> {
        &self.mesh_primitives
    }

    /// Returns texture update info accumulated since the last call to this function.
    pub fn get_and_clear_textures_delta(&mut self) -> Vec<TexturesDelta> {
        std::mem::take(&mut self.textures_delta_accumulation)
    }

    pub fn scale_factor(&self) -> f32 {
        self.winit_state.pixels_per_point()
    }
}

// ~~ Stats Panel ~~

/// Root control showing frame time, object count and camera position with a screenshot button
pub fn default_root_control() -> Control {
    Control::new(StatsPanel::default())
}

#[derive(Default)]
pub struct StatsPanel {
    /// Frame time shown in the panel, only refreshed every `STATS_REFRESH_INTERVAL`
    displayed_frame_time_ms: f64,
    last_refresh: Option<Instant>,
}

impl StatsPanel {
    fn refresh_frame_time(&mut self, frame_time_ms: f64) {
        let due = self.last_refresh.map_or(true, |t| {
            t.elapsed().as_secs_f64() >= config_ui::STATS_REFRESH_INTERVAL
        });
        if due {
            self.displayed_frame_time_ms = frame_time_ms;
            self.last_refresh = Some(Instant::now());
        }
    }
}

impl ControlHooks for StatsPanel {
    fn refresh(&mut self) {
        self.last_refresh = None;
    }

    fn paint(&mut self, context: &mut PaintContext) {
        self.refresh_frame_time(context.stats.frame_time_ms);
        let stats = *context.stats;
        let frame_time_ms = self.displayed_frame_time_ms;
        let mut screenshot_clicked = false;

        egui::Window::new("Stats")
            .resizable(false)
            .default_pos([10., 10.])
            .show(context.egui, |ui| {
                let fps = if frame_time_ms > 0. {
                    1000. / frame_time_ms
                } else {
                    0.
                };
                ui.label(format!("frame time: {:.2} ms ({:.0} fps)", frame_time_ms, fps));
                ui.label(format!(
                    "resolution: {}x{}",
                    stats.display_size[0], stats.display_size[1]
                ));
                ui.label(format!("objects: {}", stats.object_count));
                let p = stats.camera_position;
                ui.label(format!("camera: [{:.2}, {:.2}, {:.2}]", p.x, p.y, p.z));
                ui.separator();
                screenshot_clicked = ui.button("Screenshot").clicked();
            });

        if screenshot_clicked {
            context.requests.screenshot = true;
        }
    }
}
