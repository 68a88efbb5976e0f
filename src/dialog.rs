//! Modal dismissal.
//!
//! Uploading media opens an image-crop modal whose markup varies between
//! releases (native `<dialog>`, MUI, react-modal). Dismissal follows a fixed
//! priority table evaluated against the active dialog: continue, confirm,
//! close, aria-labelled controls, the last native button, the last
//! role=button element, and finally the keyboard.

use std::time::Duration;

use serde::Serialize;
use serde_json::json;
use thiserror::Error;

use crate::driver::{ClickOptions, DriverError, PageDriver};
use crate::locator::{CandidateQuery, Element, re};
use crate::logging::category;
use crate::resolver::find_first_visible;
use crate::wait::{poll_until, wait_for_detached, wait_for_hidden, wait_for_visible};

pub const DIALOG_SELECTOR: &str =
    "dialog, [role=\"dialog\"], .MuiDialog-root, .MuiModal-root, .ReactModal__Content";

pub const CROP_HEADING: &str = "ajuste de imagem";
pub const CROP_DIALOG_TEXT: &str = "ajuste de imagem|recorte|crop";

pub const CONTINUE_LABEL: &str = r"\bcontinuar\b";
pub const CONFIRM_LABEL: &str =
    r"\b(salvar|aplicar|confirmar|concluir|ok|confirmar recorte|recortar|cortar)\b";
pub const CLOSE_LABEL: &str = r"\b(fechar|cancelar|cancel|close|x)\b";

pub const ARIA_CONFIRM_SELECTOR: &str = "[aria-label*=\"aplicar\" i], [aria-label*=\"confirm\" i], \
     [aria-label*=\"salvar\" i], [title*=\"aplicar\" i], [title*=\"confirm\" i]";

const HEADING_HIDE_TIMEOUT: Duration = Duration::from_secs(10);
const DIALOG_GONE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DismissRule {
    Continue,
    Confirm,
    Close,
    AriaLabelled,
    LastNativeButton,
    LastRoleButton,
    Keyboard,
}

impl DismissRule {
    pub const PRIORITY: [DismissRule; 7] = [
        DismissRule::Continue,
        DismissRule::Confirm,
        DismissRule::Close,
        DismissRule::AriaLabelled,
        DismissRule::LastNativeButton,
        DismissRule::LastRoleButton,
        DismissRule::Keyboard,
    ];

    /// Query for the controls this rule clicks, scoped to `dialog`.
    /// `None` for the keyboard fallback.
    pub fn query(self, dialog: &Element) -> Option<CandidateQuery> {
        let query = match self {
            DismissRule::Continue => CandidateQuery::role("button", re(CONTINUE_LABEL)),
            DismissRule::Confirm => CandidateQuery::role("button", re(CONFIRM_LABEL)),
            DismissRule::Close => CandidateQuery::role("button", re(CLOSE_LABEL)),
            DismissRule::AriaLabelled => CandidateQuery::css(ARIA_CONFIRM_SELECTOR),
            DismissRule::LastNativeButton => CandidateQuery::css("button"),
            DismissRule::LastRoleButton => CandidateQuery::role_any("button"),
            DismissRule::Keyboard => return None,
        };
        Some(dialog.locate(query))
    }

    fn picks_last(self) -> bool {
        matches!(
            self,
            DismissRule::LastNativeButton | DismissRule::LastRoleButton
        )
    }
}

/// Match counts of every rule inside one dialog.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DialogSnapshot {
    pub continue_buttons: usize,
    pub confirm_buttons: usize,
    pub close_buttons: usize,
    pub aria_labelled: usize,
    pub native_buttons: usize,
    pub role_buttons: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DismissPlan {
    pub rule: DismissRule,
    /// Index of the control to click; `None` for the keyboard.
    pub index: Option<usize>,
}

impl DialogSnapshot {
    pub fn count(&self, rule: DismissRule) -> usize {
        match rule {
            DismissRule::Continue => self.continue_buttons,
            DismissRule::Confirm => self.confirm_buttons,
            DismissRule::Close => self.close_buttons,
            DismissRule::AriaLabelled => self.aria_labelled,
            DismissRule::LastNativeButton => self.native_buttons,
            DismissRule::LastRoleButton => self.role_buttons,
            DismissRule::Keyboard => 0,
        }
    }

    /// First rule in priority order with at least one match.
    pub fn plan(&self) -> DismissPlan {
        for rule in DismissRule::PRIORITY {
            let count = self.count(rule);
            if count == 0 {
                continue;
            }
            let index = if rule.picks_last() { count - 1 } else { 0 };
            return DismissPlan {
                rule,
                index: Some(index),
            };
        }
        DismissPlan {
            rule: DismissRule::Keyboard,
            index: None,
        }
    }

    /// Count matches for every rule. A failed count reads as zero.
    pub async fn capture(driver: &dyn PageDriver, dialog: &Element) -> Self {
        let mut counts = [0usize; 6];
        for (slot, rule) in counts.iter_mut().zip(DismissRule::PRIORITY) {
            if let Some(query) = rule.query(dialog) {
                *slot = driver.count(&query).await.unwrap_or(0);
            }
        }
        let [
            continue_buttons,
            confirm_buttons,
            close_buttons,
            aria_labelled,
            native_buttons,
            role_buttons,
        ] = counts;
        Self {
            continue_buttons,
            confirm_buttons,
            close_buttons,
            aria_labelled,
            native_buttons,
            role_buttons,
        }
    }
}

#[derive(Debug, Error)]
pub enum DialogError {
    #[error("failed to dismiss dialog: {0}")]
    Driver(#[from] DriverError),
}

/// Every dialog-like container on the page.
pub fn dialogs() -> CandidateQuery {
    CandidateQuery::css(DIALOG_SELECTOR)
}

/// Dialogs that mention cropping.
pub fn crop_dialogs() -> CandidateQuery {
    dialogs().has_text(re(CROP_DIALOG_TEXT))
}

pub fn crop_heading() -> Element {
    CandidateQuery::text(re(CROP_HEADING)).first()
}

/// Page-wide "continuar" button.
pub fn continue_button() -> Element {
    CandidateQuery::role("button", re(CONTINUE_LABEL)).first()
}

/// Dismiss the image-crop dialog (or any dialog) if one shows up within
/// `timeout`. Returns whether something was dismissed.
///
/// Waiting for the dialog to appear or disappear never fails the call; a
/// click on a dismissal control that fails does.
pub async fn dismiss_crop_dialog_if_present(
    driver: &dyn PageDriver,
    timeout: Duration,
) -> Result<bool, DialogError> {
    let logger = driver.logger();
    let heading = crop_heading();
    let global_continue = continue_button();

    if driver.is_visible(&heading).await.unwrap_or(false)
        && driver.is_visible(&global_continue).await.unwrap_or(false)
    {
        driver.click(&global_continue, ClickOptions::forced()).await?;
        wait_for_hidden(driver, &heading, HEADING_HIDE_TIMEOUT).await;
        logger.info("confirmed image adjustment", Some(category::DIALOG), None);
        return Ok(true);
    }

    if driver.is_visible(&global_continue).await.unwrap_or(false) {
        driver.click(&global_continue, ClickOptions::forced()).await?;
        wait_until_gone(driver, &dialogs().first()).await;
        logger.info("clicked page-level continue", Some(category::DIALOG), None);
        return Ok(true);
    }

    let crop = crop_dialogs();
    let any = dialogs();
    if !wait_for_visible(driver, &crop.first(), timeout).await {
        let appeared = poll_until(Some(timeout), || {
            let any = &any;
            async move { find_first_visible(driver, any).await.is_some() }
        })
        .await;
        if !appeared {
            logger.debug("no dialog to dismiss", Some(category::DIALOG), None);
            return Ok(false);
        }
    }

    let active = match find_first_visible(driver, &crop).await {
        Some(dialog) => dialog,
        None => match find_first_visible(driver, &any).await {
            Some(dialog) => dialog,
            None => return Ok(false),
        },
    };

    let snapshot = DialogSnapshot::capture(driver, &active).await;
    let plan = snapshot.plan();
    logger.info(
        format!("dismissing {active}"),
        Some(category::DIALOG),
        Some(json!({ "plan": plan, "snapshot": snapshot })),
    );

    match (plan.rule.query(&active), plan.index) {
        (Some(query), Some(index)) => {
            driver.click(&query.nth(index), ClickOptions::forced()).await?;
        }
        _ => {
            let _ = driver.press(None, "Enter").await;
            if driver.is_visible(&active).await.unwrap_or(false) {
                let _ = driver.press(None, "Escape").await;
            }
        }
    }

    wait_until_gone(driver, &active).await;
    Ok(true)
}

async fn wait_until_gone(driver: &dyn PageDriver, dialog: &Element) {
    wait_for_hidden(driver, dialog, DIALOG_GONE_TIMEOUT).await;
    wait_for_detached(driver, dialog, DIALOG_GONE_TIMEOUT).await;
}
