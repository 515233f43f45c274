//! API endpoint handlers, one module per resource.

pub mod extraction;
pub mod health;
pub mod render;
pub mod sessions;
pub mod templates;

use std::time::Duration;

use serde::Deserialize;

/// Longest a status poll may block.
const MAX_WAIT_MS: u64 = 30_000;

/// `?wait_ms=` on job status polls.
#[derive(Debug, Default, Deserialize)]
pub struct WaitQuery {
    #[serde(default)]
    pub wait_ms: Option<u64>,
}

impl WaitQuery {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.wait_ms.unwrap_or(0).min(MAX_WAIT_MS))
    }
}
