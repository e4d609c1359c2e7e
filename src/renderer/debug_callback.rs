use ash::vk;
#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};
use std::{borrow::Cow, ffi::CStr};

/// Routes validation layer messages to the matching [`log`] macro
pub unsafe extern "system" fn log_vulkan_debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _user_data: *mut std::os::raw::c_void,
) -> vk::Bool32 {
    if p_callback_data.is_null() {
        return vk::FALSE;
    }
    let callback_data = *p_callback_data;

    let message = if callback_data.p_message.is_null() {
        Cow::from("")
    } else {
        CStr::from_ptr(callback_data.p_message).to_string_lossy()
    };
    let message_id = if callback_data.p_message_id_name.is_null() {
        Cow::from("-")
    } else {
        CStr::from_ptr(callback_data.p_message_id_name).to_string_lossy()
    };

    match message_severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => {
            error!("Vulkan [{:?}] {}:\n{}", message_type, message_id, message);
        }
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => {
            warn!("Vulkan [{:?}] {}: {}", message_type, message_id, message);
        }
        vk::DebugUtilsMessageSeverityFlagsEXT::INFO => {
            info!("Vulkan [{:?}] {}: {}", message_type, message_id, message);
        }
        vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE => {
            trace!("Vulkan [{:?}] {}: {}", message_type, message_id, message);
        }
        _ => trace!(
            "Vulkan [{:?}] (UNKNOWN SEVERITY) {}: {}",
            message_type,
            message_id,
            message
        ),
    }

    vk::FALSE
}
