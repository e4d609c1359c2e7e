pub mod config_engine;
/// Engine entry point
pub mod engine_instance;
mod render_thread;
mod save_states;
