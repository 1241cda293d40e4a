//! Transport layer for the browser interface.
//!
//! Provides:
//! - Wire protocol (form and JSON bodies)
//! - HTTP router serving the page and the generate/execute endpoints (feature: http)

pub mod protocol;

#[cfg(feature = "http")]
pub mod http;

#[cfg(feature = "http")]
pub use http::{HttpError, create_router};
pub use protocol::{ExecuteRequest, ExecuteResponse, GenerateForm, GenerateResponse};
