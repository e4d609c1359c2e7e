use bytemuck::{Pod, Zeroable};

/// Overlay shader push constants. Should match definitions in `overlay.vert` and `overlay.frag`.
#[repr(C)]
#[derive(Clone, Copy, Default, Debug, Pod, Zeroable)]
pub struct OverlayPushConstant {
    /// Framebuffer dimensions in egui points.
    pub screen_size: [f32; 2],
    /// Wherver the render target is in srgb format.
    pub need_srgb_conv: u32,
}

impl OverlayPushConstant {
    pub fn new(screen_size: [f32; 2], need_srgb_conv: bool) -> Self {
        Self {
            screen_size,
            need_srgb_conv: need_srgb_conv as u32,
        }
    }
}
