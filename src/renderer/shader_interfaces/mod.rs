pub mod push_constants;
pub mod uniform_buffers;
pub mod vertex_inputs;
