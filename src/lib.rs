pub mod app;
pub mod audio;
pub mod camera;
pub mod config;
pub mod field;
pub mod frame;
pub mod logging;
pub mod reactive;
pub mod render;
pub mod spectrum;
pub mod terminal;
pub mod video;
