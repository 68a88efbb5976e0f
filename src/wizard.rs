//! Wizard step navigation.
//!
//! Creation flows open on one of several pre-content steps (channels,
//! category, audience segmentation) depending on the post type and on what
//! the tenant has configured. The navigator does not assume an order: each
//! tick it classifies the page from marker elements, performs that step's
//! interaction and clicks "next", until the requested step shows up or the
//! time budget runs out.

use std::time::Duration;

use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use tokio::time::{Instant, sleep};

use crate::content::{body_candidates, title_candidates};
use crate::driver::{ClickOptions, DriverError, PageDriver};
use crate::locator::{CandidateQuery, Element, TextPattern, contains, re};
use crate::logging::category;
use crate::resolver::{
    any_attached, find_first_visible, first_visible, try_check_or_click, try_click,
};
use crate::wait::{EXPECT_TIMEOUT, expect_enabled, expect_visible};

/// Category picked by the suite unless told otherwise.
pub const DEFAULT_CATEGORY: &str = "Einstein - Institucional - Padrão";

const CATEGORY_NEXT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WizardStep {
    Channels,
    Category,
    Segmentation,
    Content,
    Unclassified,
}

/// Marker presence observed on the page at one instant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StepMarkers {
    pub content: bool,
    pub channels: bool,
    pub category: bool,
    pub segmentation: bool,
}

/// Content wins over every other marker, since content pages can still
/// show a channel summary or the selected category.
pub fn classify(markers: &StepMarkers) -> WizardStep {
    if markers.content {
        WizardStep::Content
    } else if markers.channels {
        WizardStep::Channels
    } else if markers.category {
        WizardStep::Category
    } else if markers.segmentation {
        WizardStep::Segmentation
    } else {
        WizardStep::Unclassified
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepAction {
    SelectChannels,
    SelectCategory,
    SelectAudience,
    Finish,
    Wait,
}

pub fn action_for(step: WizardStep) -> StepAction {
    match step {
        WizardStep::Content => StepAction::Finish,
        WizardStep::Channels => StepAction::SelectChannels,
        WizardStep::Category => StepAction::SelectCategory,
        WizardStep::Segmentation => StepAction::SelectAudience,
        WizardStep::Unclassified => StepAction::Wait,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WizardOptions {
    /// Data-collection posts (polls, surveys, quizzes) are app-only, so the
    /// TV channel stays unselected.
    pub data_collection: bool,
    pub timeout: Duration,
    pub poll_interval: Duration,
    pub category_name: String,
}

impl Default for WizardOptions {
    fn default() -> Self {
        Self {
            data_collection: false,
            timeout: Duration::from_secs(30),
            poll_interval: Duration::from_millis(500),
            category_name: DEFAULT_CATEGORY.to_string(),
        }
    }
}

impl WizardOptions {
    pub fn new(data_collection: bool) -> Self {
        Self {
            data_collection,
            ..Default::default()
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[derive(Debug, Error)]
pub enum WizardError {
    #[error("wizard step {step:?} failed: {source}")]
    Step {
        step: WizardStep,
        #[source]
        source: DriverError,
    },
    #[error("expected the segmentation step: {0}")]
    NotSegmentation(#[source] DriverError),
}

pub fn next_button_query() -> CandidateQuery {
    CandidateQuery::role("button", re("pr[oó]ximo"))
}

pub fn next_button() -> Element {
    next_button_query().first()
}

pub fn content_markers() -> Vec<CandidateQuery> {
    let mut markers = title_candidates();
    markers.extend(body_candidates());
    markers.extend([
        CandidateQuery::label(re("pergunta|question")),
        CandidateQuery::role("button", re("selecionar arquivo|choose file")),
        CandidateQuery::role("tab", re("capa")),
        CandidateQuery::role("heading", re("capa")),
        CandidateQuery::text(re("comece a criar sua pesquisa")),
    ]);
    markers
}

pub fn channel_markers() -> Vec<CandidateQuery> {
    vec![
        CandidateQuery::role("heading", re("canais")),
        CandidateQuery::text(re("em quais canais")),
    ]
}

pub fn category_markers(category_name: &str) -> Vec<CandidateQuery> {
    vec![
        CandidateQuery::role("heading", re("editorias")),
        CandidateQuery::text(re("selecione em qual editoria")),
        CandidateQuery::text(contains(category_name)),
    ]
}

pub fn segmentation_markers() -> Vec<CandidateQuery> {
    vec![CandidateQuery::role("heading", re("segmenta[cç][aã]o"))]
}

fn channel_candidates(pattern: &str) -> Vec<CandidateQuery> {
    vec![
        CandidateQuery::role("checkbox", re(pattern)),
        CandidateQuery::label(re(pattern)),
        CandidateQuery::text(re(pattern)),
    ]
}

pub fn app_channel_candidates() -> Vec<CandidateQuery> {
    channel_candidates("aplicativo")
}

pub fn tv_channel_candidates() -> Vec<CandidateQuery> {
    channel_candidates(r"\btv\b")
}

pub fn category_dropdown_candidates() -> Vec<CandidateQuery> {
    vec![
        CandidateQuery::role("combobox", re("editoria")),
        CandidateQuery::label(re("editoria")),
        CandidateQuery::text(re("editoria")),
    ]
}

pub fn category_option_candidates(category_name: &str) -> Vec<CandidateQuery> {
    vec![
        CandidateQuery::role("option", contains(category_name)),
        CandidateQuery::text(contains(category_name)),
    ]
}

pub fn audience_candidates() -> Vec<CandidateQuery> {
    let everyone = re("todos|toda empresa|todos os colaboradores");
    vec![
        CandidateQuery::role("checkbox", everyone.clone()),
        CandidateQuery::role("treeitem", everyone),
        CandidateQuery::text(re("^todos$")),
        CandidateQuery::text(re("todos os colaboradores|toda empresa|toda a empresa")),
    ]
}

pub fn fallback_audience_checkbox() -> Element {
    CandidateQuery::role_any("checkbox")
        .within(CandidateQuery::css("main").first())
        .first()
}

/// Observe every marker. Lookup failures read as "absent".
pub async fn observe_step(driver: &dyn PageDriver, options: &WizardOptions) -> StepMarkers {
    StepMarkers {
        content: first_visible(driver, &content_markers()).await.is_some(),
        channels: any_attached(driver, &channel_markers()).await,
        category: any_attached(driver, &category_markers(&options.category_name)).await,
        segmentation: any_attached(driver, &segmentation_markers()).await,
    }
}

pub async fn current_step(driver: &dyn PageDriver, options: &WizardOptions) -> WizardStep {
    classify(&observe_step(driver, options).await)
}

/// Click the first "próximo" button once it is visible and enabled.
pub async fn click_next(driver: &dyn PageDriver) -> Result<(), DriverError> {
    let next = next_button();
    expect_visible(driver, &next, EXPECT_TIMEOUT).await?;
    expect_enabled(driver, &next, EXPECT_TIMEOUT).await?;
    driver.click(&next, ClickOptions::default()).await
}

/// Select the app channel and, for non data-collection posts, the TV channel.
/// Returns whether the app channel was selected.
pub async fn select_channels(driver: &dyn PageDriver, data_collection: bool) -> bool {
    let app = try_check_or_click(driver, &app_channel_candidates()).await;
    if !data_collection {
        try_check_or_click(driver, &tv_channel_candidates()).await;
    }
    driver.logger().info(
        "selected channels",
        Some(category::WIZARD),
        Some(json!({ "app": app, "tv": !data_collection })),
    );
    app
}

/// Pick the configured category through the dropdown, the category card or a
/// bare option, whichever the page offers. Returns `Ok(false)` when none is
/// present.
pub async fn select_category(
    driver: &dyn PageDriver,
    category_name: &str,
) -> Result<bool, DriverError> {
    let next = next_button();

    if try_click(driver, &category_dropdown_candidates()).await? {
        try_click(driver, &category_option_candidates(category_name)).await?;
        expect_enabled(driver, &next, CATEGORY_NEXT_TIMEOUT).await?;
        return Ok(true);
    }

    let card = CandidateQuery::text(contains(category_name));
    if driver.count(&card).await.unwrap_or(0) > 0 {
        let card = card.first();
        driver.scroll_into_view(&card).await?;
        driver.click(&card, ClickOptions::default()).await?;
        expect_enabled(driver, &next, CATEGORY_NEXT_TIMEOUT).await?;
        return Ok(true);
    }

    let option = CandidateQuery::role("option", contains(category_name));
    if try_click(driver, &[option]).await? {
        expect_enabled(driver, &next, CATEGORY_NEXT_TIMEOUT).await?;
        return Ok(true);
    }

    Ok(false)
}

/// Target the whole company, or failing that the first checkbox in the main
/// area.
pub async fn select_default_segmentation(driver: &dyn PageDriver) -> Result<bool, DriverError> {
    if try_check_or_click(driver, &audience_candidates()).await {
        return Ok(true);
    }

    let fallback = fallback_audience_checkbox();
    if driver.count(fallback.query()).await.unwrap_or(0) > 0 {
        driver.click(&fallback, ClickOptions::default()).await?;
        return Ok(true);
    }
    Ok(false)
}

/// Assert that the segmentation step is on screen.
pub async fn expect_segmentation_step(driver: &dyn PageDriver) -> Result<(), WizardError> {
    let heading = CandidateQuery::role("heading", re("segmenta[cç][aã]o"));
    let target = if driver.count(&heading).await.unwrap_or(0) > 0 {
        heading.first()
    } else {
        CandidateQuery::text(re("segmenta[cç][aã]o"))
            .within(CandidateQuery::css("main").first())
            .first()
    };
    expect_visible(driver, &target, EXPECT_TIMEOUT)
        .await
        .map_err(WizardError::NotSegmentation)
}

async fn perform(
    driver: &dyn PageDriver,
    options: &WizardOptions,
    step: WizardStep,
    action: StepAction,
) -> Result<(), DriverError> {
    match action {
        StepAction::SelectChannels => {
            select_channels(driver, options.data_collection).await;
            click_next(driver).await
        }
        StepAction::SelectCategory => {
            if !select_category(driver, &options.category_name).await? {
                driver.logger().debug(
                    "no category control found",
                    Some(category::WIZARD),
                    Some(json!({ "step": step })),
                );
            }
            click_next(driver).await
        }
        StepAction::SelectAudience => {
            select_default_segmentation(driver).await?;
            click_next(driver).await
        }
        StepAction::Finish => Ok(()),
        StepAction::Wait => {
            sleep(options.poll_interval).await;
            Ok(())
        }
    }
}

/// Walk the wizard until one of `stops` is on screen. Returns the step
/// reached, or `None` once `options.timeout` has elapsed.
///
/// Steps may be revisited; selections made before a failure stay applied.
pub async fn traverse_until(
    driver: &dyn PageDriver,
    options: &WizardOptions,
    stops: &[WizardStep],
) -> Result<Option<WizardStep>, WizardError> {
    let logger = driver.logger();
    let started = Instant::now();

    while started.elapsed() < options.timeout {
        let observed = observe_step(driver, options).await;
        let step = classify(&observed);
        if stops.contains(&step) {
            logger.info(
                format!("reached {step:?} step"),
                Some(category::WIZARD),
                Some(json!({ "elapsed_ms": started.elapsed().as_millis() as u64 })),
            );
            return Ok(Some(step));
        }

        let action = action_for(step);
        if action == StepAction::Finish {
            return Ok(Some(step));
        }
        if action != StepAction::Wait {
            logger.info(
                format!("handling {step:?} step"),
                Some(category::WIZARD),
                Some(json!({ "markers": observed, "action": action })),
            );
        }
        perform(driver, options, step, action)
            .await
            .map_err(|source| WizardError::Step { step, source })?;
    }

    logger.error(
        "wizard did not reach the requested step in time",
        Some(category::WIZARD),
        Some(json!({ "stops": stops, "timeout_ms": options.timeout.as_millis() as u64 })),
    );
    Ok(None)
}

/// Advance to the content step. `Ok(false)` on timeout; callers decide
/// whether that is fatal.
pub async fn advance_to_content(
    driver: &dyn PageDriver,
    options: &WizardOptions,
) -> Result<bool, WizardError> {
    Ok(traverse_until(driver, options, &[WizardStep::Content])
        .await?
        .is_some())
}

/// Button of the wizard step tab named by `pattern`.
pub fn step_button(pattern: TextPattern) -> CandidateQuery {
    CandidateQuery::role("button", pattern)
}

/// First visible "next" button, if any.
pub async fn visible_next(driver: &dyn PageDriver) -> Option<Element> {
    find_first_visible(driver, &next_button_query()).await
}
