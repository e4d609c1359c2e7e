pub mod camera;
pub mod config_ui;
pub mod control;
pub mod overlay;
