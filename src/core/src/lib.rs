pub mod configuration;
pub mod container_management;
pub mod error_handling;
pub mod session_management;
pub mod stream_processing;
pub mod web_interface;
