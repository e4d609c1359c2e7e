pub mod config_renderer;
mod debug_callback;
mod memory;
mod offscreen;
mod overlay_pass;
mod queue_families;
pub mod render_manager;
mod scene_pass;
mod screenshot;
mod shader_compiler;
pub mod shader_interfaces;
mod surface_properties;
mod vulkan_init;
