//! HTTP API for the review workflow.
//!
//! Exposes the review session, extraction, template mapping and document
//! generation as JSON endpoints under `/api/`. Files travel as base64.

pub mod endpoints;
pub mod error;
pub mod router;
pub mod server;
pub mod types;

pub use router::review_api_router;
pub use server::{start_api_server, ApiServer};
pub use types::ApiContext;
