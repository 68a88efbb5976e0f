//! Stored browser session: cookies plus per-origin local storage.
//!
//! The JSON layout is the one Playwright writes for `storageState`, so a file
//! recorded by either tool can be reused by the other.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;
use tokio::time::sleep;

use crate::auth::MANAGER_URL;
use crate::config::E2eConfig;
use crate::driver::{DriverError, PageDriver};
use crate::logging::category;
use crate::wait::POLL_INTERVAL;

const MAX_URL_FAILURES: u32 = 50;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StorageState {
    /// Cookies in CDP `Network.Cookie` shape.
    #[serde(default)]
    pub cookies: Vec<Value>,
    #[serde(default)]
    pub origins: Vec<OriginState>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OriginState {
    pub origin: String,
    #[serde(rename = "localStorage", default)]
    pub local_storage: Vec<StorageEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageEntry {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("failed to access storage state {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("storage state {path} is not valid JSON: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error(transparent)]
    Driver(#[from] DriverError),
    #[error("the browser closed before reaching the manager")]
    Abandoned,
}

impl StorageState {
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, SessionError> {
        let path = path.as_ref();
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| SessionError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        serde_json::from_str(&raw).map_err(|source| SessionError::Json {
            path: path.to_path_buf(),
            source,
        })
    }

    pub async fn save(&self, path: impl AsRef<Path>) -> Result<(), SessionError> {
        let path = path.as_ref();
        let io_err = |source| SessionError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }
        let body = serde_json::to_string_pretty(self).map_err(|source| SessionError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        tokio::fs::write(path, body).await.map_err(io_err)
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty() && self.origins.iter().all(|o| o.local_storage.is_empty())
    }

    /// Local storage entries recorded for `origin`.
    pub fn origin(&self, origin: &str) -> Option<&OriginState> {
        self.origins.iter().find(|entry| entry.origin == origin)
    }
}

/// Record a session by letting the operator sign in by hand.
///
/// Opens the login page, waits without a time limit for the manager root and
/// saves the resulting snapshot to the configured path. Meant for a headed
/// browser.
pub async fn bootstrap_storage_state(
    driver: &dyn PageDriver,
    config: &E2eConfig,
) -> Result<StorageState, SessionError> {
    let logger = driver.logger();
    driver
        .goto(&config.url("/manager/login"), config.navigation_timeout())
        .await?;
    logger.info(
        "complete the login in the open browser to record the session",
        Some(category::SESSION),
        None,
    );

    wait_for_manager(driver).await?;

    let state = driver.export_storage_state().await?;
    state.save(&config.storage_state_path).await?;
    logger.info(
        "storage state saved",
        Some(category::SESSION),
        Some(json!({
            "path": config.storage_state_path.display().to_string(),
            "cookies": state.cookies.len(),
        })),
    );
    Ok(state)
}

/// Poll the URL until the manager root shows up. A browser that keeps failing
/// to report its URL is treated as closed.
async fn wait_for_manager(driver: &dyn PageDriver) -> Result<(), SessionError> {
    let mut failures = 0;
    loop {
        match driver.current_url().await {
            Ok(url) if MANAGER_URL.is_match(&url) => return Ok(()),
            Ok(_) => failures = 0,
            Err(err) => {
                failures += 1;
                if failures >= MAX_URL_FAILURES {
                    driver.logger().error(
                        format!("lost the browser while waiting for login: {err}"),
                        Some(category::SESSION),
                        None,
                    );
                    return Err(SessionError::Abandoned);
                }
            }
        }
        sleep(POLL_INTERVAL).await;
    }
}

/// Load the stored session into the browser when the file exists. Returns
/// whether a snapshot was applied.
pub async fn restore_storage_state(
    driver: &dyn PageDriver,
    path: &Path,
) -> Result<bool, SessionError> {
    if !tokio::fs::try_exists(path).await.unwrap_or(false) {
        driver.logger().debug(
            format!("no storage state at {}", path.display()),
            Some(category::SESSION),
            None,
        );
        return Ok(false);
    }
    let state = StorageState::load(path).await?;
    driver.import_storage_state(&state).await?;
    Ok(true)
}
