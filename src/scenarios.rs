//! End-to-end publishing and validation flows built from the helpers.
//!
//! A [`Suite`] bundles the page, the run configuration and the users file.
//! Every flow logs in first, so each one can run on a fresh browser.

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::ValueEnum;
use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use tokio::time::sleep;

use crate::auth::{LoginError, UsersData, is_login_url, login_as_valid_user};
use crate::config::{E2eConfig, LoginOptions};
use crate::content::{
    ContentError, STANDARD_TEXT, body_field, click_next_or_step,
    disable_partial_results_if_present, enable_option_by_label, fill_title_and_body_for_type,
    open_alternatives_and_fill, publish_button, select_display_duration, title_field,
    upload_media_file, wait_for_publication_card, wait_for_upload_progress,
};
use crate::dialog::{DialogError, dismiss_crop_dialog_if_present};
use crate::driver::{ClickOptions, DriverError, PageDriver};
use crate::locator::{CandidateQuery, re};
use crate::logging::category;
use crate::wait::{EXPECT_TIMEOUT, expect_enabled, expect_visible};
use crate::wizard::{
    WizardError, WizardOptions, WizardStep, advance_to_content, click_next,
    expect_segmentation_step, next_button, traverse_until,
};

pub const SIMPLE_POST_PATH: &str = "/manager/communications/new/simple-communication";
pub const POLL_PATH: &str = "/manager/communications/new/poll";

/// Accepted body length on the content step.
pub const BODY_LIMIT: usize = 10_000;
const OVERLONG_BODY_LENGTH: usize = 10_050;

const GOTO_ATTEMPTS: usize = 3;
const GOTO_RETRY_DELAY: Duration = Duration::from_secs(1);
const MEDIA_CROP_TIMEOUT: Duration = Duration::from_secs(20);
const NEXT_CROP_TIMEOUT: Duration = Duration::from_secs(15);
const VIDEO_UPLOAD_TIMEOUT: Duration = Duration::from_secs(120);
const DISPLAY_DURATION: &str = "5 dias";

/// A communication type reachable from `/manager/communications/new/`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PostType {
    pub name: &'static str,
    pub slug: &'static str,
    /// Polls, surveys and quizzes collect answers and are app-only.
    pub data_collection: bool,
    pub requires_question: bool,
    pub requires_options: bool,
    pub requires_deadline: bool,
}

impl PostType {
    pub fn path(&self) -> String {
        format!("/manager/communications/new/{}", self.slug)
    }
}

pub const POST_TYPES: [PostType; 6] = [
    PostType {
        name: "Post carrossel",
        slug: "carousel-communication",
        data_collection: false,
        requires_question: false,
        requires_options: false,
        requires_deadline: false,
    },
    PostType {
        name: "Post enquete",
        slug: "poll",
        data_collection: true,
        requires_question: true,
        requires_options: true,
        requires_deadline: true,
    },
    PostType {
        name: "Pergunta unica",
        slug: "simple-survey",
        data_collection: true,
        requires_question: true,
        requires_options: false,
        requires_deadline: false,
    },
    PostType {
        name: "Pesquisa",
        slug: "survey",
        data_collection: true,
        requires_question: true,
        requires_options: false,
        requires_deadline: false,
    },
    PostType {
        name: "Quiz",
        slug: "quiz",
        data_collection: true,
        requires_question: true,
        requires_options: true,
        requires_deadline: false,
    },
    PostType {
        name: "Questionario",
        slug: "exam",
        data_collection: true,
        requires_question: true,
        requires_options: true,
        requires_deadline: false,
    },
];

/// Look a post type up by slug or (case-insensitive) name.
pub fn post_type(kind: &str) -> Option<&'static PostType> {
    POST_TYPES
        .iter()
        .find(|post| post.slug == kind || post.name.eq_ignore_ascii_case(kind))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    #[default]
    None,
    Image,
    Gif,
    Video,
}

impl MediaKind {
    /// Label used in the publication title.
    pub fn label(self) -> &'static str {
        match self {
            MediaKind::None => "Post simples - sem midia",
            MediaKind::Image => "Post simples - com imagem",
            MediaKind::Gif => "Post simples - com GIF",
            MediaKind::Video => "Post simples - com video",
        }
    }
}

/// Media files uploaded by the publishing flows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaFixtures {
    pub image: PathBuf,
    pub gif: PathBuf,
    pub video: PathBuf,
}

impl MediaFixtures {
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            image: dir.join("post-image.png"),
            gif: dir.join("simple.gif"),
            video: dir.join("simple.mp4"),
        }
    }

    pub fn path(&self, kind: MediaKind) -> Option<&Path> {
        match kind {
            MediaKind::None => None,
            MediaKind::Image => Some(&self.image),
            MediaKind::Gif => Some(&self.gif),
            MediaKind::Video => Some(&self.video),
        }
    }
}

/// How a validation check ended when it did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    Passed,
    /// The page lacked what the check needs.
    Skipped(String),
}

#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error(transparent)]
    Login(#[from] LoginError),
    #[error(transparent)]
    Wizard(#[from] WizardError),
    #[error(transparent)]
    Content(#[from] ContentError),
    #[error(transparent)]
    Dialog(#[from] DialogError),
    #[error(transparent)]
    Driver(#[from] DriverError),
    #[error("session expired while opening {url}; run `manager-e2e auth-setup` to record a new one")]
    SessionExpired { url: String },
    #[error("navigation to {url} aborted {attempts} times")]
    NavigationFailed {
        url: String,
        attempts: usize,
        #[source]
        source: DriverError,
    },
    #[error("could not reach the {wanted} step of {flow}")]
    StepUnreachable { flow: String, wanted: &'static str },
    #[error("could not attach {}", .0.display())]
    MediaNotAttached(PathBuf),
    #[error("display duration '{0}' not offered")]
    DurationMissing(String),
    #[error("check failed: {0}")]
    Assertion(String),
}

pub struct Suite<'a> {
    driver: &'a dyn PageDriver,
    config: &'a E2eConfig,
    users: &'a UsersData,
    media: MediaFixtures,
}

impl<'a> Suite<'a> {
    pub fn new(driver: &'a dyn PageDriver, config: &'a E2eConfig, users: &'a UsersData) -> Self {
        Self {
            driver,
            config,
            users,
            media: MediaFixtures::in_dir(&config.media_dir),
        }
    }

    pub fn media(&self) -> &MediaFixtures {
        &self.media
    }

    fn wizard(&self, data_collection: bool) -> WizardOptions {
        WizardOptions::new(data_collection).with_timeout(self.config.wizard_timeout())
    }

    pub async fn login(&self) -> Result<(), ScenarioError> {
        login_as_valid_user(self.driver, self.config, self.users, &self.config.login).await?;
        Ok(())
    }

    /// Verify the stored session without ever falling back to an
    /// interactive login.
    pub async fn verify_session(&self) -> Result<(), ScenarioError> {
        let options = LoginOptions {
            allow_interactive_mfa: false,
            ..self.config.login.clone()
        };
        login_as_valid_user(self.driver, self.config, self.users, &options).await?;
        Ok(())
    }

    /// Open `path`, retrying navigations the browser aborted. Landing on
    /// the login page means the stored session is no longer valid.
    pub async fn safe_goto(&self, path: &str) -> Result<(), ScenarioError> {
        let url = self.config.url(path);
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.driver.goto(&url, self.config.navigation_timeout()).await {
                Ok(()) => {
                    if is_login_url(&self.driver.current_url().await?) {
                        return Err(ScenarioError::SessionExpired { url });
                    }
                    return Ok(());
                }
                Err(err) if err.to_string().contains("ERR_ABORTED") => {
                    if attempt >= GOTO_ATTEMPTS {
                        return Err(ScenarioError::NavigationFailed {
                            url,
                            attempts: attempt,
                            source: err,
                        });
                    }
                    self.driver.logger().debug(
                        format!("navigation to {url} aborted, retrying"),
                        Some(category::SCENARIO),
                        Some(json!({ "attempt": attempt })),
                    );
                    sleep(GOTO_RETRY_DELAY).await;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    async fn fill_content(
        &self,
        label: &str,
        flow: &str,
        data_collection: bool,
    ) -> Result<String, ScenarioError> {
        if !advance_to_content(self.driver, &self.wizard(data_collection)).await? {
            return Err(ScenarioError::StepUnreachable {
                flow: flow.to_string(),
                wanted: "content",
            });
        }
        Ok(fill_title_and_body_for_type(self.driver, label).await?)
    }

    async fn publish(&self, title: &str, media: MediaKind) -> Result<(), ScenarioError> {
        self.driver
            .click(&publish_button(), ClickOptions::default())
            .await?;
        if media == MediaKind::Video {
            wait_for_upload_progress(self.driver, VIDEO_UPLOAD_TIMEOUT).await?;
        }
        wait_for_publication_card(self.driver, title).await?;
        self.driver.logger().info(
            "published",
            Some(category::SCENARIO),
            Some(json!({ "title": title })),
        );
        Ok(())
    }

    /// Publish a simple communication, optionally with media. Returns the
    /// publication title.
    pub async fn publish_simple_post(&self, media: MediaKind) -> Result<String, ScenarioError> {
        let driver = self.driver;
        let label = media.label();
        self.login().await?;
        self.safe_goto(SIMPLE_POST_PATH).await?;

        let title = self.fill_content(label, "the simple post", false).await?;

        let mut crop_timeout = Duration::ZERO;
        if let Some(file) = self.media.path(media) {
            if !upload_media_file(driver, file).await? {
                return Err(ScenarioError::MediaNotAttached(file.to_path_buf()));
            }
            dismiss_crop_dialog_if_present(driver, MEDIA_CROP_TIMEOUT).await?;
            let _ = driver.scroll_to_bottom().await;
            crop_timeout = NEXT_CROP_TIMEOUT;
        }

        click_next_or_step(driver, re("tv"), crop_timeout).await?;

        let highlight = re("destaque com notifica[cç][aã]o");
        let options_shown = driver
            .is_visible(&CandidateQuery::text(highlight.clone()).first())
            .await
            .unwrap_or(false);
        if !options_shown {
            click_next_or_step(driver, re("aplicativo"), Duration::ZERO).await?;
        }

        enable_option_by_label(driver, highlight).await?;
        enable_option_by_label(driver, re("fixar no topo.*app")).await?;

        click_next_or_step(driver, re("publica[cç][aã]o"), Duration::ZERO).await?;

        if !select_display_duration(driver, DISPLAY_DURATION).await? {
            return Err(ScenarioError::DurationMissing(DISPLAY_DURATION.to_string()));
        }

        self.publish(&title, media).await?;
        Ok(title)
    }

    /// Publish a poll with one alternative. Partial results are shown or
    /// hidden per `partial_results`. Returns the publication title.
    pub async fn publish_poll(&self, partial_results: bool) -> Result<String, ScenarioError> {
        let driver = self.driver;
        self.login().await?;
        self.safe_goto(POLL_PATH).await?;

        let title = self.fill_content("Post enquete", "the poll", true).await?;
        open_alternatives_and_fill(driver, STANDARD_TEXT).await?;
        click_next(driver).await?;

        if partial_results {
            enable_option_by_label(driver, re("mostrar resultados parciais")).await?;
        } else {
            disable_partial_results_if_present(driver).await?;
        }
        enable_option_by_label(driver, re("destaque com notifica[cç][aã]o")).await?;
        enable_option_by_label(driver, re("fixar no topo.*app")).await?;

        click_next(driver).await?;

        if !select_display_duration(driver, DISPLAY_DURATION).await? {
            driver.logger().debug(
                "no display duration control on the poll",
                Some(category::SCENARIO),
                None,
            );
        }

        self.publish(&title, MediaKind::None).await?;
        Ok(title)
    }

    /// Walk the creation wizard of `post` until it can be filled or its
    /// segmentation step is confirmed. Returns the step that ended the flow.
    pub async fn run_initial_flow(&self, post: &PostType) -> Result<WizardStep, ScenarioError> {
        self.login().await?;
        self.safe_goto(&post.path()).await?;

        let options = self.wizard(post.data_collection);
        let reached = traverse_until(
            self.driver,
            &options,
            &[WizardStep::Content, WizardStep::Segmentation],
        )
        .await?;

        match reached {
            Some(WizardStep::Content) => {
                fill_title_and_body_for_type(self.driver, post.name).await?;
                Ok(WizardStep::Content)
            }
            Some(step) => {
                expect_segmentation_step(self.driver).await?;
                Ok(step)
            }
            None => Err(ScenarioError::StepUnreachable {
                flow: post.name.to_string(),
                wanted: "segmentation",
            }),
        }
    }

    /// Type more than the limit into the body. The field must either cut
    /// the text at the limit or show the "too many characters" message.
    pub async fn check_body_limit(&self) -> Result<CheckOutcome, ScenarioError> {
        let driver = self.driver;
        self.login().await?;
        self.safe_goto(SIMPLE_POST_PATH).await?;
        advance_to_content(driver, &self.wizard(false)).await?;

        let Some(body) = body_field(driver).await else {
            return Ok(CheckOutcome::Skipped("body field not found".to_string()));
        };

        driver.fill(&body, &"a".repeat(OVERLONG_BODY_LENGTH)).await?;
        let length = driver.input_value(&body).await?.chars().count();
        if length > BODY_LIMIT {
            let warning =
                CandidateQuery::text(re("ultrapassa o n[uú]mero m[aá]ximo de caracteres")).first();
            expect_visible(driver, &warning, EXPECT_TIMEOUT)
                .await
                .map_err(|_| {
                    ScenarioError::Assertion(format!(
                        "body kept {length} characters without a limit warning"
                    ))
                })?;
        }
        driver.logger().info(
            "body limit enforced",
            Some(category::SCENARIO),
            Some(json!({ "kept": length })),
        );
        Ok(CheckOutcome::Passed)
    }

    /// With title and body filled, "próximo" must be enabled.
    pub async fn check_title_and_body_enable_next(&self) -> Result<CheckOutcome, ScenarioError> {
        let driver = self.driver;
        self.login().await?;
        self.safe_goto(SIMPLE_POST_PATH).await?;
        advance_to_content(driver, &self.wizard(false)).await?;

        let (Some(title), Some(body)) = (title_field(driver).await, body_field(driver).await) else {
            return Ok(CheckOutcome::Skipped("title or body field not found".to_string()));
        };

        driver.fill(&title, "Titulo preenchido").await?;
        driver.fill(&body, "Corpo preenchido").await?;
        expect_enabled(driver, &next_button(), EXPECT_TIMEOUT).await?;
        Ok(CheckOutcome::Passed)
    }
}
