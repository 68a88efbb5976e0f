//! Login to the manager console, with the Microsoft SSO fallback.

use std::fmt;
use std::path::Path;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tokio::time::{Instant, sleep};

use crate::config::{E2eConfig, LoginOptions};
use crate::driver::{ClickOptions, DriverError, PageDriver};
use crate::locator::{CandidateQuery, Element, contains, re};
use crate::logging::category;
use crate::resolver::first_visible;
use crate::wait::{expect_url, wait_for_enabled, wait_for_url, wait_for_visible};

/// The manager landing page, with or without a trailing slash or query.
pub static MANAGER_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/manager/?($|\?)").expect("static regex"));

static IDENTITY_PROVIDER_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)login\.microsoftonline\.com|login\.live\.com").expect("static regex")
});

pub const LOGIN_PATH_MARKER: &str = "/manager/login";
const IDENTITY_PROVIDER_HOST: &str = "login.microsoftonline.com";

const PASSWORD_LOGIN_WAIT: Duration = Duration::from_secs(8);
const MANAGER_WAIT: Duration = Duration::from_secs(30);
const BANNER_TIMEOUT: Duration = Duration::from_secs(1);
const SSO_BUTTON_TIMEOUT: Duration = Duration::from_secs(5);
const PROVIDER_TIMEOUT: Duration = Duration::from_secs(20);
const ACCOUNT_TIMEOUT: Duration = Duration::from_secs(3);
const PASSWORD_TIMEOUT: Duration = Duration::from_secs(20);
const NEXT_ENABLED_TIMEOUT: Duration = Duration::from_secs(10);
const MFA_AFTER_PASSWORD_TIMEOUT: Duration = Duration::from_secs(20);
const MFA_TIMEOUT: Duration = Duration::from_secs(2);
const STAY_SIGNED_IN_TIMEOUT: Duration = Duration::from_secs(5);
const PROVIDER_POLL: Duration = Duration::from_secs(1);

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Contents of the users file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsersData {
    #[serde(rename = "validUser")]
    pub valid_user: Credentials,
}

#[derive(Debug, Error)]
pub enum LoginError {
    #[error(
        "no authenticated session and interactive login is disabled; run `manager-e2e auth-setup` to record one"
    )]
    SessionRequired,
    #[error(
        "Microsoft sign-in is waiting for MFA approval; run `manager-e2e auth-setup` or approve the request in Authenticator"
    )]
    MfaRequired,
    #[error(
        "Microsoft sign-in did not complete (likely MFA); run `manager-e2e auth-setup` to record a session"
    )]
    MfaIncomplete,
    #[error("Microsoft sign-in did not offer a password field; run `manager-e2e auth-setup` to continue")]
    PasswordUnavailable,
    #[error(transparent)]
    Driver(#[from] DriverError),
    #[error("failed to read users file {path}: {source}")]
    UsersIo {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse users file {path}: {source}")]
    UsersJson {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

pub async fn load_users(path: impl AsRef<Path>) -> Result<UsersData, LoginError> {
    let path = path.as_ref();
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| LoginError::UsersIo {
            path: path.display().to_string(),
            source,
        })?;
    serde_json::from_str(&raw).map_err(|source| LoginError::UsersJson {
        path: path.display().to_string(),
        source,
    })
}

pub fn is_login_url(url: &str) -> bool {
    url.contains(LOGIN_PATH_MARKER)
}

fn email_field() -> Element {
    CandidateQuery::label(contains("E-mail")).first()
}

fn password_field() -> Element {
    CandidateQuery::label(contains("Senha")).first()
}

fn password_input() -> CandidateQuery {
    CandidateQuery::css("input#i0118, input[type=\"password\"], input[name=\"passwd\"]")
}

fn use_password_link() -> CandidateQuery {
    CandidateQuery::role("link", re("use your password instead|usar sua senha|usar senha"))
}

fn mfa_heading() -> Element {
    CandidateQuery::role("heading", re("approve sign in|request wasn.?t sent")).first()
}

fn email_input_candidates() -> Vec<CandidateQuery> {
    vec![
        CandidateQuery::css("#i0116"),
        CandidateQuery::css("input[name=\"loginfmt\"]"),
        CandidateQuery::css("input[type=\"email\"]"),
        CandidateQuery::css("input[placeholder*=\"example\"]"),
        CandidateQuery::role_any("textbox"),
    ]
}

fn provider_next_candidates() -> Vec<CandidateQuery> {
    vec![
        CandidateQuery::css("#idSIButton9"),
        CandidateQuery::role("button", re("next|próximo|avançar|continuar")),
        CandidateQuery::css("input[type=\"submit\"]"),
    ]
}

/// Make sure the browser is on the manager with a signed-in user.
///
/// An existing session short-circuits everything. Otherwise the password form
/// is tried first (unless SSO is preferred or password login is blocked), then
/// the Microsoft flow.
pub async fn login_as_valid_user(
    driver: &dyn PageDriver,
    config: &E2eConfig,
    users: &UsersData,
    options: &LoginOptions,
) -> Result<(), LoginError> {
    let logger = driver.logger();
    driver
        .goto(&config.url("/manager"), config.navigation_timeout())
        .await?;

    let landed = driver.current_url().await?;
    if !is_login_url(&landed) {
        expect_url(driver, &MANAGER_URL, MANAGER_WAIT).await?;
        logger.debug("session already authenticated", Some(category::AUTH), None);
        return Ok(());
    }

    if !options.allow_interactive_mfa {
        return Err(LoginError::SessionRequired);
    }

    driver
        .goto(&config.url("/login"), config.navigation_timeout())
        .await?;

    if !options.prefer_sso_strategy && !password_login_blocked(driver).await {
        let user = &users.valid_user;
        driver.fill(&email_field(), &user.email).await?;
        driver.fill(&password_field(), &user.password).await?;
        driver
            .click(
                &CandidateQuery::css("button[type=\"submit\"]").first(),
                ClickOptions::default(),
            )
            .await?;

        if wait_for_url(driver, &MANAGER_URL, Some(PASSWORD_LOGIN_WAIT)).await {
            logger.info("logged in with password", Some(category::AUTH), None);
            return Ok(());
        }
    }

    let credentials = options.resolve(&users.valid_user);
    logger.info(
        "falling back to Microsoft sign-in",
        Some(category::AUTH),
        Some(json!({ "email": credentials.email })),
    );
    login_with_microsoft(driver, &credentials.email, &credentials.password).await?;

    if driver.current_url().await?.contains(IDENTITY_PROVIDER_HOST) {
        return Err(LoginError::MfaIncomplete);
    }
    expect_url(driver, &MANAGER_URL, MANAGER_WAIT).await?;
    logger.info("logged in through Microsoft", Some(category::AUTH), None);
    Ok(())
}

async fn password_login_blocked(driver: &dyn PageDriver) -> bool {
    let banner = CandidateQuery::text(re("Acesso por senha não autorizado")).first();
    wait_for_visible(driver, &banner, BANNER_TIMEOUT).await
}

async fn login_with_microsoft(
    driver: &dyn PageDriver,
    email: &str,
    password: &str,
) -> Result<(), LoginError> {
    let sso = CandidateQuery::role("button", re("entrar com microsoft")).first();
    if wait_for_visible(driver, &sso, SSO_BUTTON_TIMEOUT).await {
        driver.click(&sso, ClickOptions::default()).await?;
    }

    if !wait_for_url(driver, &IDENTITY_PROVIDER_URL, Some(PROVIDER_TIMEOUT)).await {
        return Err(DriverError::timeout("identity provider redirect", PROVIDER_TIMEOUT).into());
    }

    select_account(driver, email).await?;
    let heading = CandidateQuery::role("heading", re("sign in|entrar")).first();
    wait_for_visible(driver, &heading, PROVIDER_TIMEOUT).await;

    fill_provider_email(driver, email).await;

    let password_field = password_input().first();
    if wait_for_password(driver).await
        && wait_for_visible(driver, &password_field, SSO_BUTTON_TIMEOUT).await
    {
        driver.fill(&password_field, password).await?;
        let sign_in = CandidateQuery::role("button", re("sign in|entrar|login")).first();
        if wait_for_visible(driver, &sign_in, ACCOUNT_TIMEOUT).await {
            driver.click(&sign_in, ClickOptions::default()).await?;
        }
        if wait_for_visible(driver, &mfa_heading(), MFA_AFTER_PASSWORD_TIMEOUT).await {
            return Err(LoginError::MfaRequired);
        }
    } else {
        if wait_for_visible(driver, &mfa_heading(), MFA_TIMEOUT).await {
            return Err(LoginError::MfaRequired);
        }
        return Err(LoginError::PasswordUnavailable);
    }

    handle_stay_signed_in(driver).await?;
    Ok(())
}

async fn select_account(driver: &dyn PageDriver, email: &str) -> Result<(), DriverError> {
    let account = CandidateQuery::role("button", re(regex::escape(email))).first();
    if wait_for_visible(driver, &account, ACCOUNT_TIMEOUT).await {
        return driver.click(&account, ClickOptions::default()).await;
    }

    let another = CandidateQuery::role(
        "button",
        re("use another account|usar outra conta|outra conta"),
    )
    .first();
    if wait_for_visible(driver, &another, ACCOUNT_TIMEOUT).await {
        driver.click(&another, ClickOptions::default()).await?;
    }
    Ok(())
}

/// Type the e-mail on the provider page and move on. Every step is best
/// effort: the provider may already have the account selected.
async fn fill_provider_email(driver: &dyn PageDriver, email: &str) {
    let Some(input) = first_visible(driver, &email_input_candidates()).await else {
        return;
    };

    let _ = driver.click(&input, ClickOptions::default()).await;
    let _ = driver.fill(&input, email).await;
    let _ = driver.press(Some(&input), "Tab").await;

    match first_visible(driver, &provider_next_candidates()).await {
        Some(next) => {
            wait_for_enabled(driver, &next, NEXT_ENABLED_TIMEOUT).await;
            if driver.click(&next, ClickOptions::default()).await.is_err() {
                let _ = driver.press(Some(&input), "Enter").await;
            }
        }
        None => {
            let _ = driver.press(Some(&input), "Enter").await;
        }
    }
}

/// Poll for the password field, following the "use your password" link when
/// the provider offers passwordless sign-in first.
async fn wait_for_password(driver: &dyn PageDriver) -> bool {
    let field = password_input().first();
    let link = use_password_link().first();
    let started = Instant::now();

    while started.elapsed() < PASSWORD_TIMEOUT {
        if driver.is_visible(&field).await.unwrap_or(false) {
            return true;
        }
        if driver.is_visible(&link).await.unwrap_or(false) {
            let _ = driver.click(&link, ClickOptions::forced()).await;
        }
        sleep(PROVIDER_POLL).await;
    }
    false
}

async fn handle_stay_signed_in(driver: &dyn PageDriver) -> Result<(), DriverError> {
    let yes = CandidateQuery::role("button", re("yes|sim")).first();
    if wait_for_visible(driver, &yes, STAY_SIGNED_IN_TIMEOUT).await {
        return driver.click(&yes, ClickOptions::default()).await;
    }
    let no = CandidateQuery::role("button", re("no|não")).first();
    if wait_for_visible(driver, &no, STAY_SIGNED_IN_TIMEOUT).await {
        driver.click(&no, ClickOptions::default()).await?;
    }
    Ok(())
}
