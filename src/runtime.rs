//! Chromiumoxide-backed [`PageDriver`].
//!
//! Element queries run in the page through the embedded engine from
//! [`crate::scripts`]; pointer and keyboard input go through CDP so the page
//! sees trusted events. One browser with a single page per driver.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::dom::SetFileInputFilesParams;
use chromiumoxide::cdp::browser_protocol::input::InsertTextParams;
use chromiumoxide::cdp::browser_protocol::network::CookieParam;
use chromiumoxide::error::CdpError;
use chromiumoxide::handler::viewport::Viewport;
use chromiumoxide::layout::Point;
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures_util::StreamExt;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};

use crate::config::E2eConfig;
use crate::driver::{ClickOptions, DriverError, PageDriver};
use crate::locator::{CandidateQuery, Element};
use crate::logging::{E2eLogger, category};
use crate::scripts::{self, arg, invocation, tag_selector};
use crate::session::{OriginState, StorageState};
use crate::wait::POLL_INTERVAL;

const VIEWPORT_WIDTH: u32 = 1280;
const VIEWPORT_HEIGHT: u32 = 720;
const ACTION_TIMEOUT: Duration = Duration::from_secs(10);
const LOCALE: &str = "pt-BR";

#[derive(Debug, Default, Deserialize)]
struct ElementState {
    attached: bool,
    visible: bool,
    enabled: bool,
    checkable: bool,
    checked: bool,
}

#[derive(Debug, Deserialize)]
struct ClickPoint {
    x: f64,
    y: f64,
}

pub struct ChromiumDriver {
    browser: Browser,
    page: Page,
    handler: JoinHandle<()>,
    logger: E2eLogger,
    tags: AtomicU64,
}

impl ChromiumDriver {
    /// Launch Chromium per `config` and open a blank page with the query
    /// engine preinstalled.
    pub async fn launch(config: &E2eConfig) -> Result<Self, DriverError> {
        let logger = E2eLogger::new(config.verbose);
        let browser_config = build_config(config)?;

        let (browser, handler) = Browser::launch(browser_config)
            .await
            .map_err(map_cdp_error)?;
        let handler = spawn_handler(handler);

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(map_cdp_error)?;
        page.evaluate_on_new_document(scripts::LOCATOR_SCRIPT)
            .await
            .map_err(map_cdp_error)?;

        logger.info(
            "browser launched",
            Some(category::RUNTIME),
            Some(json!({
                "headless": config.headless,
                "executable": config.chrome_executable.as_ref().map(|p| p.display().to_string()),
            })),
        );

        Ok(Self {
            browser,
            page,
            handler,
            logger,
            tags: AtomicU64::new(0),
        })
    }

    pub fn page(&self) -> &Page {
        &self.page
    }

    pub async fn close(mut self) -> Result<(), DriverError> {
        let closed = self.browser.close().await.map(|_| ());
        let _ = self.browser.wait().await;
        self.handler.abort();
        closed.map_err(map_cdp_error)
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        args: &[Value],
    ) -> Result<T, DriverError> {
        let result = self
            .page
            .evaluate(invocation(method, args))
            .await
            .map_err(map_cdp_error)?;
        let value = result.value().cloned().unwrap_or(Value::Null);
        Ok(serde_json::from_value(value)?)
    }

    async fn state(&self, element: &Element) -> Result<ElementState, DriverError> {
        self.call("state", &[arg(element)?]).await
    }

    /// Wait until `element` is visible and enabled, the way a user would
    /// before clicking.
    async fn wait_actionable(&self, element: &Element) -> Result<(), DriverError> {
        let result = timeout(ACTION_TIMEOUT, async {
            loop {
                let state = self.state(element).await?;
                if state.attached && state.visible && state.enabled {
                    return Ok::<_, DriverError>(());
                }
                sleep(POLL_INTERVAL).await;
            }
        })
        .await;
        match result {
            Ok(outcome) => outcome,
            Err(_) => match self.state(element).await {
                Ok(state) if !state.attached => Err(DriverError::Detached(element.to_string())),
                _ => Err(DriverError::timeout(
                    format!("{element} to be visible and enabled"),
                    ACTION_TIMEOUT,
                )),
            },
        }
    }

    async fn click_at(&self, element: &Element) -> Result<(), DriverError> {
        let point: ClickPoint = self.call("clickPoint", &[arg(element)?]).await?;
        self.page
            .click(Point {
                x: point.x,
                y: point.y,
            })
            .await
            .map_err(map_cdp_error)?;
        Ok(())
    }

    /// Resolve `element` (or the focused element) to a CDP node handle.
    async fn handle(
        &self,
        element: Option<&Element>,
    ) -> Result<(chromiumoxide::element::Element, String), DriverError> {
        let token = format!("t{}", self.tags.fetch_add(1, Ordering::Relaxed));
        let target = match element {
            Some(element) => arg(element)?,
            None => Value::Null,
        };
        self.call::<bool>("tag", &[target, Value::String(token.clone())])
            .await?;
        let node = self
            .page
            .find_element(tag_selector(&token))
            .await
            .map_err(map_cdp_error)?;
        Ok((node, token))
    }

    async fn untag(&self, token: &str) {
        let _ = self
            .call::<bool>("untag", &[Value::String(token.to_string())])
            .await;
    }

    async fn local_storage(&self) -> Result<Option<OriginState>, DriverError> {
        let state: OriginState = self.call("localStorageEntries", &[]).await?;
        if state.origin == "null" || state.origin.is_empty() {
            return Ok(None);
        }
        Ok(Some(state))
    }
}

#[async_trait]
impl PageDriver for ChromiumDriver {
    fn logger(&self) -> &E2eLogger {
        &self.logger
    }

    async fn goto(&self, url: &str, limit: Duration) -> Result<(), DriverError> {
        self.logger
            .debug(format!("goto {url}"), Some(category::RUNTIME), None);
        match timeout(limit, self.page.goto(url)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(err)) => Err(DriverError::Navigation {
                url: url.to_string(),
                reason: err.to_string(),
            }),
            Err(_) => Err(DriverError::timeout(format!("navigation to {url}"), limit)),
        }
    }

    async fn current_url(&self) -> Result<String, DriverError> {
        Ok(self
            .page
            .url()
            .await
            .map_err(map_cdp_error)?
            .unwrap_or_default())
    }

    async fn count(&self, query: &CandidateQuery) -> Result<usize, DriverError> {
        self.call("count", &[arg(query)?]).await
    }

    async fn is_visible(&self, element: &Element) -> Result<bool, DriverError> {
        Ok(self.state(element).await?.visible)
    }

    async fn is_enabled(&self, element: &Element) -> Result<bool, DriverError> {
        let state = self.state(element).await?;
        if !state.attached {
            return Err(DriverError::Detached(element.to_string()));
        }
        Ok(state.enabled)
    }

    async fn is_checked(&self, element: &Element) -> Result<bool, DriverError> {
        let state = self.state(element).await?;
        if !state.attached {
            return Err(DriverError::Detached(element.to_string()));
        }
        if !state.checkable {
            return Err(DriverError::NotCheckable(element.to_string()));
        }
        Ok(state.checked)
    }

    async fn attribute(
        &self,
        element: &Element,
        name: &str,
    ) -> Result<Option<String>, DriverError> {
        self.call("attribute", &[arg(element)?, Value::String(name.to_string())])
            .await
    }

    async fn input_value(&self, element: &Element) -> Result<String, DriverError> {
        self.call("inputValue", &[arg(element)?]).await
    }

    async fn click(&self, element: &Element, options: ClickOptions) -> Result<(), DriverError> {
        if !options.force {
            self.wait_actionable(element).await?;
        }
        self.logger.debug(
            format!("click {element}"),
            Some(category::RUNTIME),
            Some(json!({ "force": options.force })),
        );
        self.click_at(element).await
    }

    async fn check(&self, element: &Element) -> Result<(), DriverError> {
        let state = self.state(element).await?;
        if !state.attached {
            return Err(DriverError::Detached(element.to_string()));
        }
        if !state.checkable {
            return Err(DriverError::NotCheckable(element.to_string()));
        }
        if state.checked {
            return Ok(());
        }
        self.wait_actionable(element).await?;
        self.click_at(element).await?;
        if !self.state(element).await?.checked {
            return Err(DriverError::Message(format!(
                "clicking {element} did not check it"
            )));
        }
        Ok(())
    }

    async fn fill(&self, element: &Element, value: &str) -> Result<(), DriverError> {
        self.wait_actionable(element).await?;
        self.call::<bool>("prepareFill", &[arg(element)?, Value::String(value.to_string())])
            .await?;
        if !value.is_empty() {
            // insertText goes through the editing pipeline, so maxlength applies.
            self.page
                .execute(InsertTextParams::new(value))
                .await
                .map_err(map_cdp_error)?;
        }
        Ok(())
    }

    async fn select_option(&self, element: &Element, label: &str) -> Result<(), DriverError> {
        self.call::<bool>("selectOption", &[arg(element)?, Value::String(label.to_string())])
            .await?;
        Ok(())
    }

    async fn scroll_into_view(&self, element: &Element) -> Result<(), DriverError> {
        self.call::<bool>("scrollIntoView", &[arg(element)?]).await?;
        Ok(())
    }

    async fn set_input_files(
        &self,
        element: &Element,
        files: &[PathBuf],
    ) -> Result<(), DriverError> {
        let mut absolute = Vec::with_capacity(files.len());
        for file in files {
            absolute.push(std::path::absolute(file)?.display().to_string());
        }

        let (node, token) = self.handle(Some(element)).await?;
        let params = SetFileInputFilesParams::builder()
            .files(absolute)
            .backend_node_id(node.backend_node_id)
            .build()
            .map_err(DriverError::Message)?;
        let result = self.page.execute(params).await.map_err(map_cdp_error);
        self.untag(&token).await;
        result?;
        Ok(())
    }

    async fn press(&self, element: Option<&Element>, key: &str) -> Result<(), DriverError> {
        let (node, token) = self.handle(element).await?;
        let result = node.press_key(key).await.map(|_| ()).map_err(map_cdp_error);
        self.untag(&token).await;
        result
    }

    async fn scroll_to_bottom(&self) -> Result<(), DriverError> {
        self.call::<bool>("scrollToBottom", &[]).await?;
        Ok(())
    }

    async fn mouse_click(&self, x: f64, y: f64) -> Result<(), DriverError> {
        self.page
            .click(Point { x, y })
            .await
            .map_err(map_cdp_error)?;
        Ok(())
    }

    async fn export_storage_state(&self) -> Result<StorageState, DriverError> {
        let cookies = self.page.get_cookies().await.map_err(map_cdp_error)?;
        let cookies = cookies
            .into_iter()
            .map(serde_json::to_value)
            .collect::<Result<Vec<_>, _>>()?;
        let origins = self.local_storage().await?.into_iter().collect();
        Ok(StorageState { cookies, origins })
    }

    async fn import_storage_state(&self, state: &StorageState) -> Result<(), DriverError> {
        let cookies = state
            .cookies
            .iter()
            .cloned()
            .map(serde_json::from_value::<CookieParam>)
            .collect::<Result<Vec<_>, _>>()?;
        if !cookies.is_empty() {
            self.page
                .set_cookies(cookies)
                .await
                .map_err(map_cdp_error)?;
        }

        for origin in &state.origins {
            let entries: Vec<(String, String)> = origin
                .local_storage
                .iter()
                .map(|entry| (entry.name.clone(), entry.value.clone()))
                .collect();
            let seed = scripts::local_storage_seed(&origin.origin, &entries)?;
            self.page
                .evaluate_on_new_document(seed)
                .await
                .map_err(map_cdp_error)?;
        }

        self.logger.debug(
            "storage state imported",
            Some(category::RUNTIME),
            Some(json!({
                "cookies": state.cookies.len(),
                "origins": state.origins.len(),
            })),
        );
        Ok(())
    }
}

fn build_config(config: &E2eConfig) -> Result<BrowserConfig, DriverError> {
    let viewport = Viewport {
        width: VIEWPORT_WIDTH,
        height: VIEWPORT_HEIGHT,
        device_scale_factor: None,
        emulating_mobile: false,
        is_landscape: true,
        has_touch: false,
    };

    let mut builder = BrowserConfig::builder();

    if let Some(path) = &config.chrome_executable {
        builder = builder.chrome_executable(path);
    }

    let builder = builder
        .viewport(viewport)
        .window_size(VIEWPORT_WIDTH, VIEWPORT_HEIGHT)
        .arg(format!("--lang={LOCALE}"));

    let builder = if config.headless {
        builder
    } else {
        builder.with_head()
    };

    builder.build().map_err(DriverError::Message)
}

fn map_cdp_error(err: CdpError) -> DriverError {
    let message = err.to_string();
    if let CdpError::JavascriptException(_) = &err {
        if let Some(rest) = message.split("detached: ").nth(1) {
            return DriverError::Detached(rest.to_string());
        }
        return DriverError::Script(message);
    }
    if message.contains("detached: ") {
        return DriverError::Detached(message);
    }
    DriverError::Message(message)
}

fn spawn_handler(mut handler: chromiumoxide::handler::Handler) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(result) = handler.next().await {
            if let Err(err) = result {
                log::warn!(target: category::RUNTIME, "chromiumoxide handler error: {err}");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::E2eConfigOverrides;

    #[test]
    fn config_builds_with_an_explicit_executable() {
        let config = E2eConfig::default().with_overrides(
            E2eConfigOverrides::default()
                .headless(false)
                .chrome_executable(PathBuf::from("/usr/bin/chromium")),
        );
        assert!(build_config(&config).is_ok());
    }

    #[test]
    fn element_state_parses_engine_output() {
        let state: ElementState = serde_json::from_value(json!({
            "attached": true,
            "visible": true,
            "enabled": false,
            "checkable": true,
            "checked": false,
        }))
        .unwrap();
        assert!(state.attached && state.visible && state.checkable);
        assert!(!state.enabled && !state.checked);
    }

    #[test]
    fn engine_exceptions_for_missing_nodes_become_detached() {
        let err = map_cdp_error(CdpError::msg("Uncaught Error: detached: no element for {}"));
        assert!(matches!(err, DriverError::Detached(_)));
        assert!(matches!(
            map_cdp_error(CdpError::msg("websocket closed")),
            DriverError::Message(_)
        ));
    }
}
