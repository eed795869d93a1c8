//! API route handlers

pub mod content;
pub mod device;
pub mod system;

pub use content::{download_content, list_content, report_status};
pub use device::authenticate_device;
pub use system::{event_stream, health_check, openapi_spec};
