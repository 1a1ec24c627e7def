pub mod codec;
pub mod config;
pub mod controls;
pub mod frame;
pub mod mjpeg;
pub mod module_info;
pub mod relay;
pub mod settings;
