//! The page-level seam between the heuristics and a concrete browser.
//!
//! Everything above this trait (resolver, wizard navigator, dialog dismissal,
//! login) is written against [`PageDriver`] only. The production
//! implementation lives in [`crate::runtime`]; unit tests use an in-memory
//! scripted page.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::locator::{CandidateQuery, Element};
use crate::logging::E2eLogger;
use crate::session::StorageState;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClickOptions {
    /// Skip actionability checks and dispatch the click on the node directly.
    pub force: bool,
}

impl ClickOptions {
    pub fn forced() -> Self {
        Self { force: true }
    }
}

/// Operations the suite needs from a single browser page.
#[async_trait]
pub trait PageDriver: Send + Sync {
    fn logger(&self) -> &E2eLogger;

    async fn goto(&self, url: &str, timeout: Duration) -> Result<(), DriverError>;

    async fn current_url(&self) -> Result<String, DriverError>;

    /// Number of elements currently matching `query`.
    async fn count(&self, query: &CandidateQuery) -> Result<usize, DriverError>;

    /// `Ok(false)` when the element does not exist.
    async fn is_visible(&self, element: &Element) -> Result<bool, DriverError>;

    async fn is_enabled(&self, element: &Element) -> Result<bool, DriverError>;

    async fn is_checked(&self, element: &Element) -> Result<bool, DriverError>;

    async fn attribute(&self, element: &Element, name: &str)
    -> Result<Option<String>, DriverError>;

    async fn input_value(&self, element: &Element) -> Result<String, DriverError>;

    async fn click(&self, element: &Element, options: ClickOptions) -> Result<(), DriverError>;

    /// Put a checkbox, radio or switch into the checked state. Fails with
    /// [`DriverError::NotCheckable`] for any other element.
    async fn check(&self, element: &Element) -> Result<(), DriverError>;

    async fn fill(&self, element: &Element, value: &str) -> Result<(), DriverError>;

    /// Select the `<option>` whose label matches `label` in a native select.
    async fn select_option(&self, element: &Element, label: &str) -> Result<(), DriverError>;

    async fn scroll_into_view(&self, element: &Element) -> Result<(), DriverError>;

    async fn set_input_files(
        &self,
        element: &Element,
        files: &[PathBuf],
    ) -> Result<(), DriverError>;

    /// Press `key` on `element`, or on the focused element when `None`.
    async fn press(&self, element: Option<&Element>, key: &str) -> Result<(), DriverError>;

    async fn scroll_to_bottom(&self) -> Result<(), DriverError>;

    async fn mouse_click(&self, x: f64, y: f64) -> Result<(), DriverError>;

    async fn export_storage_state(&self) -> Result<StorageState, DriverError> {
        Err(DriverError::Unsupported(
            "storage state export not supported".to_string(),
        ))
    }

    async fn import_storage_state(&self, _state: &StorageState) -> Result<(), DriverError> {
        Err(DriverError::Unsupported(
            "storage state import not supported".to_string(),
        ))
    }
}

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("browser driver error: {0}")]
    Message(String),
    #[error("element {0} is not attached to the page")]
    Detached(String),
    #[error("element {0} is not a checkbox, radio or switch")]
    NotCheckable(String),
    #[error("page script failed: {0}")]
    Script(String),
    #[error("navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },
    #[error("timed out after {}ms waiting for {what}", timeout.as_millis())]
    Timeout { what: String, timeout: Duration },
    #[error("browser driver feature unsupported: {0}")]
    Unsupported(String),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl DriverError {
    pub fn timeout(what: impl Into<String>, timeout: Duration) -> Self {
        DriverError::Timeout {
            what: what.into(),
            timeout,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, DriverError::Timeout { .. })
    }
}
