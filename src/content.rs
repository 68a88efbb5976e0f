//! Content-step helpers: fields, options, media and publication checks.

use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::json;
use thiserror::Error;
use tokio::time::{Instant, sleep};

use crate::dialog::{DialogError, dismiss_crop_dialog_if_present};
use crate::driver::{ClickOptions, DriverError, PageDriver};
use crate::locator::{CandidateQuery, Element, TextPattern, contains, re};
use crate::logging::category;
use crate::resolver::{find_first_visible, first_visible, try_click, try_fill};
use crate::wait::{expect_visible, poll_until, wait_for_hidden, wait_for_visible};
use crate::wizard::{step_button, visible_next};

/// Text used for every generated title and body.
pub const STANDARD_TEXT: &str = "Teste automatizado_Froes";

const CROP_CHECK_TIMEOUT: Duration = Duration::from_millis(1500);
const SWITCH_VISIBLE_TIMEOUT: Duration = Duration::from_secs(1);
const FILE_INPUT_TIMEOUT: Duration = Duration::from_secs(5);
const PROGRESS_APPEAR_TIMEOUT: Duration = Duration::from_secs(2);
const PROGRESS_POLL: Duration = Duration::from_secs(1);
const PROGRESS_HIDE_TIMEOUT: Duration = Duration::from_secs(10);
const LISTING_TIMEOUT: Duration = Duration::from_secs(30);
const CARD_BUTTON_TIMEOUT: Duration = Duration::from_secs(10);
const CARD_TEXT_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Debug, Error)]
pub enum ContentError {
    #[error(transparent)]
    Driver(#[from] DriverError),
    #[error(transparent)]
    Dialog(#[from] DialogError),
    #[error("could not advance to the {step} step: no visible next button or step tab")]
    StepUnreachable { step: String },
    #[error("media upload did not finish within {}s", .0.as_secs())]
    UploadStalled(Duration),
    #[error("publication '{title}' did not appear in the listing")]
    PublicationMissing {
        title: String,
        #[source]
        source: DriverError,
    },
}

pub fn title_candidates() -> Vec<CandidateQuery> {
    let title = "t[ií]tulo";
    vec![
        CandidateQuery::role("textbox", re(title)),
        CandidateQuery::label(re(title)),
        CandidateQuery::placeholder(re(title)),
        CandidateQuery::css("input[name*=\"title\" i]"),
    ]
}

pub fn body_candidates() -> Vec<CandidateQuery> {
    vec![
        CandidateQuery::role("textbox", re("texto|mensagem|conte[uú]do|corpo|body")),
        CandidateQuery::label(re("mensagem|conte[uú]do|corpo|body")),
        CandidateQuery::placeholder(re("texto|mensagem|conte[uú]do|corpo|body")),
        CandidateQuery::css("textarea"),
    ]
}

fn option_field_candidates() -> Vec<CandidateQuery> {
    let option = "op[cç][aã]o|alternativa";
    vec![
        CandidateQuery::label(re(option)),
        CandidateQuery::placeholder(re(option)),
        CandidateQuery::css("input[name*=\"option\" i]"),
    ]
}

pub async fn title_field(driver: &dyn PageDriver) -> Option<Element> {
    first_visible(driver, &title_candidates()).await
}

pub async fn body_field(driver: &dyn PageDriver) -> Option<Element> {
    first_visible(driver, &body_candidates()).await
}

pub fn publish_button() -> Element {
    CandidateQuery::role("button", re("publicar")).first()
}

/// `"<standard text> - <label> - 2026-10-17 12:00:00.000 UTC"`.
pub fn publication_title(label: &str, now: DateTime<Utc>) -> String {
    format!(
        "{STANDARD_TEXT} - {label} - {}",
        now.format("%Y-%m-%d %H:%M:%S%.3f UTC")
    )
}

/// Fill whichever title and body fields are present. Returns the title used,
/// which identifies the publication in the listing afterwards.
pub async fn fill_title_and_body_for_type(
    driver: &dyn PageDriver,
    label: &str,
) -> Result<String, ContentError> {
    let title = publication_title(label, Utc::now());
    if let Some(field) = title_field(driver).await {
        driver.fill(&field, &title).await?;
    }
    if let Some(field) = body_field(driver).await {
        driver.fill(&field, STANDARD_TEXT).await?;
    }
    driver.logger().info(
        "filled title and body",
        Some(category::CONTENT),
        Some(json!({ "title": title })),
    );
    Ok(title)
}

/// Open the alternatives section and fill one option with `text`. Adds an
/// option when none is offered and, as a last resort, fills the first empty
/// textbox. Returns whether anything was filled.
pub async fn open_alternatives_and_fill(
    driver: &dyn PageDriver,
    text: &str,
) -> Result<bool, ContentError> {
    try_click(
        driver,
        &[
            CandidateQuery::role("button", re("alternativas")),
            CandidateQuery::text(re("alternativas")),
        ],
    )
    .await?;

    if try_fill(driver, &option_field_candidates(), text).await? {
        return Ok(true);
    }

    try_click(
        driver,
        &[
            CandidateQuery::role("button", re("adicionar|nova op[cç][aã]o")),
            CandidateQuery::css("button:has-text(\"Adicionar\")"),
        ],
    )
    .await?;
    if try_fill(driver, &option_field_candidates(), text).await? {
        return Ok(true);
    }

    let textboxes = CandidateQuery::role_any("textbox");
    let count = driver.count(&textboxes).await.unwrap_or(0);
    for index in 0..count {
        let candidate = textboxes.nth(index);
        let Ok(value) = driver.input_value(&candidate).await else {
            continue;
        };
        if value.is_empty() && driver.fill(&candidate, text).await.is_ok() {
            driver.logger().debug(
                format!("filled empty textbox {candidate} as an option"),
                Some(category::CONTENT),
                None,
            );
            return Ok(true);
        }
    }
    Ok(false)
}

/// Attach `file` through the page's file input. When the input only appears
/// after clicking the "choose file" button, click it first. Returns whether
/// the file was attached.
pub async fn upload_media_file(driver: &dyn PageDriver, file: &Path) -> Result<bool, ContentError> {
    let input = CandidateQuery::css("input[type=\"file\"]");
    let files = [file.to_path_buf()];

    if driver.count(&input).await.unwrap_or(0) > 0 {
        driver.set_input_files(&input.first(), &files).await?;
        log_upload(driver, file);
        return Ok(true);
    }

    let chooser = CandidateQuery::role("button", re("selecionar arquivo|choose file"));
    if driver.count(&chooser).await.unwrap_or(0) > 0 {
        driver
            .click(&chooser.first(), ClickOptions::default())
            .await?;
        let appeared = poll_until(Some(FILE_INPUT_TIMEOUT), || {
            let input = &input;
            async move { driver.count(input).await.unwrap_or(0) > 0 }
        })
        .await;
        if appeared {
            driver.set_input_files(&input.first(), &files).await?;
            log_upload(driver, file);
            return Ok(true);
        }
    }

    Ok(false)
}

fn log_upload(driver: &dyn PageDriver, file: &Path) {
    driver.logger().info(
        "attached media",
        Some(category::CONTENT),
        Some(json!({ "file": file.display().to_string() })),
    );
}

/// Turn on the switch, checkbox or text toggle labelled `label`. Returns
/// `Ok(false)` when the option is not offered.
pub async fn enable_option_by_label(
    driver: &dyn PageDriver,
    label: TextPattern,
) -> Result<bool, ContentError> {
    let toggle = CandidateQuery::role("switch", label.clone());
    if driver.count(&toggle).await.unwrap_or(0) > 0 {
        let toggle = toggle.first();
        if wait_for_visible(driver, &toggle, SWITCH_VISIBLE_TIMEOUT).await {
            let state = driver.attribute(&toggle, "aria-checked").await?;
            if state.as_deref() != Some("true") {
                driver.click(&toggle, ClickOptions::default()).await?;
            }
            return Ok(true);
        }
    }

    let checkbox = CandidateQuery::role("checkbox", label.clone());
    if driver.count(&checkbox).await.unwrap_or(0) > 0 {
        let checkbox = checkbox.first();
        if !driver.is_checked(&checkbox).await? {
            driver.click(&checkbox, ClickOptions::default()).await?;
        }
        return Ok(true);
    }

    let text = CandidateQuery::text(label.clone());
    if driver.count(&text).await.unwrap_or(0) > 0 {
        driver.click(&text.first(), ClickOptions::default()).await?;
        return Ok(true);
    }

    driver.logger().debug(
        format!("option {label} not offered"),
        Some(category::CONTENT),
        None,
    );
    Ok(false)
}

/// Turn off partial results on polls when the toggle exists.
pub async fn disable_partial_results_if_present(
    driver: &dyn PageDriver,
) -> Result<bool, ContentError> {
    let label = re("resultados parciais");

    let toggle = CandidateQuery::role("switch", label.clone());
    if driver.count(&toggle).await.unwrap_or(0) > 0 {
        let toggle = toggle.first();
        if driver.attribute(&toggle, "aria-checked").await?.as_deref() == Some("true") {
            driver.click(&toggle, ClickOptions::default()).await?;
        }
        return Ok(true);
    }

    let checkbox = CandidateQuery::role("checkbox", label.clone());
    if driver.count(&checkbox).await.unwrap_or(0) > 0 {
        let checkbox = checkbox.first();
        if driver.is_checked(&checkbox).await? {
            driver.click(&checkbox, ClickOptions::default()).await?;
        }
        return Ok(true);
    }

    let text = CandidateQuery::text(label);
    if driver.count(&text).await.unwrap_or(0) > 0 {
        driver.click(&text.first(), ClickOptions::default()).await?;
        return Ok(true);
    }
    Ok(false)
}

/// Choose how long the publication stays visible. Returns `Ok(false)` when no
/// duration control is found.
pub async fn select_display_duration(
    driver: &dyn PageDriver,
    option: &str,
) -> Result<bool, ContentError> {
    let duration = re("prazo de exibi[cç][aã]o");
    let option_label = contains(option);

    let combo = CandidateQuery::role("combobox", duration.clone());
    if driver.count(&combo).await.unwrap_or(0) > 0 {
        driver.click(&combo.first(), ClickOptions::default()).await?;
        try_click(
            driver,
            &[
                CandidateQuery::role("option", option_label.clone()),
                CandidateQuery::text(option_label),
            ],
        )
        .await?;
        return Ok(true);
    }

    let select = CandidateQuery::label(duration);
    if driver.count(&select).await.unwrap_or(0) > 0 {
        driver.select_option(&select.first(), option).await?;
        return Ok(true);
    }

    let radio = CandidateQuery::role("radio", option_label.clone());
    if driver.count(&radio).await.unwrap_or(0) > 0 {
        driver.click(&radio.first(), ClickOptions::default()).await?;
        return Ok(true);
    }

    let menu = CandidateQuery::role("button", re("sempre|prazo de exibi[cç][aã]o"));
    if driver.count(&menu).await.unwrap_or(0) > 0 {
        driver.click(&menu.first(), ClickOptions::default()).await?;
        let clicked = try_click(
            driver,
            &[
                CandidateQuery::role("menuitem", option_label.clone()),
                CandidateQuery::role("option", option_label.clone()),
                CandidateQuery::text(option_label),
            ],
        )
        .await?;
        if clicked {
            let _ = driver.press(None, "Escape").await;
            let _ = driver.mouse_click(5.0, 5.0).await;
        }
        return Ok(true);
    }

    Ok(false)
}

/// Wait for a media upload progress bar to complete. Returns `Ok(false)` when
/// no progress bar shows up.
pub async fn wait_for_upload_progress(
    driver: &dyn PageDriver,
    timeout: Duration,
) -> Result<bool, ContentError> {
    let bar = CandidateQuery::role_any("progressbar").first();
    if !wait_for_visible(driver, &bar, PROGRESS_APPEAR_TIMEOUT).await {
        return Ok(false);
    }

    let started = Instant::now();
    while started.elapsed() < timeout {
        if !driver.is_visible(&bar).await.unwrap_or(false) {
            return Ok(true);
        }
        let progress = driver
            .attribute(&bar, "aria-valuenow")
            .await
            .ok()
            .flatten()
            .and_then(|value| value.trim().parse::<f64>().ok());
        if progress.is_some_and(|value| value >= 100.0) {
            wait_for_hidden(driver, &bar, PROGRESS_HIDE_TIMEOUT).await;
            return Ok(true);
        }
        sleep(PROGRESS_POLL).await;
    }

    Err(ContentError::UploadStalled(timeout))
}

/// Wait until the communications listing shows a card for `title`.
pub async fn wait_for_publication_card(
    driver: &dyn PageDriver,
    title: &str,
) -> Result<(), ContentError> {
    let listing = CandidateQuery::role("heading", re("comunica[cç][oõ]es")).first();
    expect_visible(driver, &listing, LISTING_TIMEOUT)
        .await
        .map_err(|source| ContentError::PublicationMissing {
            title: title.to_string(),
            source,
        })?;

    let card = CandidateQuery::role("button", contains(title)).first();
    let via = if wait_for_visible(driver, &card, CARD_BUTTON_TIMEOUT).await {
        "card"
    } else {
        let text = CandidateQuery::text(contains(title)).first();
        expect_visible(driver, &text, CARD_TEXT_TIMEOUT)
            .await
            .map_err(|source| ContentError::PublicationMissing {
                title: title.to_string(),
                source,
            })?;
        "text"
    };
    driver.logger().info(
        "publication listed",
        Some(category::CONTENT),
        Some(json!({ "title": title, "via": via })),
    );
    Ok(())
}

async fn click_visible_next(
    driver: &dyn PageDriver,
    crop_timeout: Duration,
) -> Result<bool, ContentError> {
    let Some(next) = visible_next(driver).await else {
        return Ok(false);
    };
    driver.click(&next, ClickOptions::default()).await?;
    if !crop_timeout.is_zero() && dismiss_crop_dialog_if_present(driver, crop_timeout).await? {
        if let Some(next) = visible_next(driver).await {
            driver.click(&next, ClickOptions::default()).await?;
        }
    }
    Ok(true)
}

/// Advance past the current publishing step through "next", or through the
/// step tab matching `step` when "next" is not offered. A crop dialog in the
/// way is dismissed first; with a non-zero `crop_timeout` a dialog raised by
/// the click itself is dismissed too.
pub async fn click_next_or_step(
    driver: &dyn PageDriver,
    step: TextPattern,
    crop_timeout: Duration,
) -> Result<(), ContentError> {
    let tab = step_button(step.clone());

    dismiss_crop_dialog_if_present(driver, CROP_CHECK_TIMEOUT).await?;
    if click_visible_next(driver, crop_timeout).await? {
        return Ok(());
    }
    if let Some(tab) = find_first_visible(driver, &tab).await {
        driver.click(&tab, ClickOptions::default()).await?;
        return Ok(());
    }

    dismiss_crop_dialog_if_present(driver, CROP_CHECK_TIMEOUT).await?;
    let _ = driver.scroll_to_bottom().await;

    if click_visible_next(driver, crop_timeout).await? {
        return Ok(());
    }
    if let Some(tab) = find_first_visible(driver, &tab).await {
        driver.click(&tab, ClickOptions::default()).await?;
        return Ok(());
    }

    Err(ContentError::StepUnreachable {
        step: step.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeNode, FakePage};
    use crate::wizard::next_button_query;
    use chrono::TimeZone;
    use std::path::PathBuf;

    fn page(screen: &str) -> FakePage {
        let page = FakePage::new("https://host/manager/communications/new/simple-communication");
        page.screen(screen);
        page.show(screen);
        page
    }

    #[test]
    fn title_embeds_label_and_utc_timestamp() {
        let now = Utc.with_ymd_and_hms(2026, 3, 9, 14, 5, 7).unwrap();
        assert_eq!(
            publication_title("Post simples - com GIF", now),
            "Teste automatizado_Froes - Post simples - com GIF - 2026-03-09 14:05:07.000 UTC"
        );
    }

    #[tokio::test]
    async fn fills_title_and_body_from_fallback_candidates() {
        let page = page("content");
        page.screen("content")
            .add(title_candidates()[2].clone(), FakeNode::visible())
            .add(body_candidates()[3].clone(), FakeNode::visible());

        let title = fill_title_and_body_for_type(&page, "Quiz").await.unwrap();

        assert!(title.starts_with("Teste automatizado_Froes - Quiz - "));
        assert_eq!(
            page.value_of(&title_candidates()[2].first()),
            Some(title.clone())
        );
        assert_eq!(
            page.value_of(&body_candidates()[3].first()).as_deref(),
            Some(STANDARD_TEXT)
        );
    }

    #[tokio::test]
    async fn alternatives_fall_back_to_the_first_empty_textbox() {
        let page = page("poll");
        let textboxes = CandidateQuery::role_any("textbox");
        let mut filled = FakeNode::visible();
        filled.value = "Pergunta".to_string();
        page.screen("poll")
            .add(textboxes.clone(), filled)
            .add(textboxes.clone(), FakeNode::visible());

        assert!(open_alternatives_and_fill(&page, STANDARD_TEXT).await.unwrap());
        assert_eq!(page.value_of(&textboxes.nth(0)).as_deref(), Some("Pergunta"));
        assert_eq!(page.value_of(&textboxes.nth(1)).as_deref(), Some(STANDARD_TEXT));
    }

    #[tokio::test]
    async fn media_goes_through_the_file_input() {
        let page = page("content");
        let input = CandidateQuery::css("input[type=\"file\"]");
        page.screen("content").add(input.clone(), FakeNode::hidden());

        let file = PathBuf::from("data/media/post-image.png");
        assert!(upload_media_file(&page, &file).await.unwrap());
        assert_eq!(
            page.actions(),
            vec![format!("upload {} <- data/media/post-image.png", input.first())]
        );
    }

    #[tokio::test]
    async fn enabled_switch_is_left_alone() {
        let page = page("options");
        let label = re("destaque com notifica[cç][aã]o");
        page.screen("options").add(
            CandidateQuery::role("switch", label.clone()),
            FakeNode::visible().attr("aria-checked", "true"),
        );

        assert!(enable_option_by_label(&page, label).await.unwrap());
        assert!(page.actions().is_empty());
    }

    #[tokio::test]
    async fn unchecked_checkbox_is_clicked() {
        let page = page("options");
        let label = re("fixar no topo.*app");
        let checkbox = CandidateQuery::role("checkbox", label.clone());
        page.screen("options")
            .add(checkbox.clone(), FakeNode::visible().checkable(false));

        assert!(enable_option_by_label(&page, label).await.unwrap());
        assert!(page.did(&format!("click {}", checkbox.first())));
        assert!(!enable_option_by_label(&page, re("inexistente")).await.unwrap());
    }

    #[tokio::test]
    async fn partial_results_switch_is_turned_off() {
        let page = page("poll");
        let toggle = CandidateQuery::role("switch", re("resultados parciais"));
        page.screen("poll").add(
            toggle.clone(),
            FakeNode::visible().attr("aria-checked", "true"),
        );

        assert!(disable_partial_results_if_present(&page).await.unwrap());
        assert!(page.did(&format!("click {}", toggle.first())));
    }

    #[tokio::test]
    async fn duration_menu_is_closed_after_picking() {
        let page = page("publication");
        let menu = CandidateQuery::role("button", re("sempre|prazo de exibi[cç][aã]o"));
        let item = CandidateQuery::role("menuitem", contains("5 dias"));
        page.screen("publication")
            .add(menu.clone(), FakeNode::visible())
            .add(item.clone(), FakeNode::visible());

        assert!(select_display_duration(&page, "5 dias").await.unwrap());
        assert_eq!(
            page.actions(),
            vec![
                format!("click {}", menu.first()),
                format!("click {}", item.first()),
                "press Escape".to_string(),
                "mouse 5,5".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn native_select_is_used_for_duration() {
        let page = page("publication");
        let select = CandidateQuery::label(re("prazo de exibi[cç][aã]o"));
        page.screen("publication")
            .add(select.clone(), FakeNode::visible().options(&["Sempre", "5 dias"]));

        assert!(select_display_duration(&page, "5 dias").await.unwrap());
        assert!(page.did(&format!("select {} = 5 dias", select.first())));
    }

    #[tokio::test(start_paused = true)]
    async fn step_tab_is_used_when_next_is_missing() {
        let page = page("channels");
        let tab = step_button(re("tv"));
        page.screen("channels").add(tab.clone(), FakeNode::visible());

        click_next_or_step(&page, re("tv"), Duration::ZERO)
            .await
            .unwrap();
        assert!(page.did(&format!("click {}", tab.first())));
    }

    #[tokio::test(start_paused = true)]
    async fn missing_next_and_tab_is_an_error() {
        let page = page("stuck");

        let err = click_next_or_step(&page, re("publica[cç][aã]o"), Duration::ZERO)
            .await
            .expect_err("nothing to click");
        assert!(matches!(err, ContentError::StepUnreachable { .. }));
        assert!(page.did("scroll-bottom"));
    }

    #[tokio::test(start_paused = true)]
    async fn next_is_preferred_over_the_step_tab() {
        let page = page("media");
        page.screen("media")
            .add(next_button_query(), FakeNode::visible().shows("channels"))
            .add(step_button(re("tv")), FakeNode::visible());

        click_next_or_step(&page, re("tv"), Duration::ZERO)
            .await
            .unwrap();
        assert_eq!(page.current_screen(), "channels");
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_upload_is_reported() {
        let page = page("publishing");
        page.screen("publishing").add(
            CandidateQuery::role_any("progressbar"),
            FakeNode::visible().attr("aria-valuenow", "40"),
        );

        let err = wait_for_upload_progress(&page, Duration::from_secs(3))
            .await
            .expect_err("stalled");
        assert!(matches!(err, ContentError::UploadStalled(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn publication_card_is_found_by_text() {
        let page = page("listing");
        let title = "Teste automatizado_Froes - Quiz - 2026-03-09 14:05:07.000 UTC";
        page.screen("listing")
            .add(
                CandidateQuery::role("heading", re("comunica[cç][oõ]es")),
                FakeNode::visible(),
            )
            .add(CandidateQuery::text(contains(title)), FakeNode::visible());

        wait_for_publication_card(&page, title).await.unwrap();
        assert_eq!(page.log_messages().last().map(String::as_str), Some("publication listed"));
    }

    #[tokio::test(start_paused = true)]
    async fn publication_card_button_is_logged_too() {
        let page = page("listing");
        let title = "Teste automatizado_Froes - Enquete - 2026-03-09 14:05:07.000 UTC";
        page.screen("listing")
            .add(
                CandidateQuery::role("heading", re("comunica[cç][oõ]es")),
                FakeNode::visible(),
            )
            .add(CandidateQuery::role("button", contains(title)), FakeNode::visible());

        wait_for_publication_card(&page, title).await.unwrap();
        assert_eq!(page.log_messages().last().map(String::as_str), Some("publication listed"));
    }
}
