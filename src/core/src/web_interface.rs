//! HTTP and WebSocket surface of the gateway.
pub mod routes;
pub mod types;
pub mod web_server;

// Re-export commonly used items
pub use routes::*;
pub use web_server::*;
