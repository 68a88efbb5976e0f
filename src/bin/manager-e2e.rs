//! manager-e2e CLI.
//!
//! Runs the manager console flows against a local Chromium.
//!
//! Usage examples:
//!   Record a session once (opens a visible browser):
//!     $ cargo run -- auth-setup
//!   Publish a simple post with a GIF:
//!     $ MANAGER_CHROME_BIN=/path/to/chrome cargo run -- publish-simple --media gif
//!   Walk the creation wizard of a quiz:
//!     $ cargo run -- create --kind quiz -v

use std::env;

use anyhow::{Context, Result, anyhow, bail};
use clap::{Args, Parser, Subcommand};
use log::{info, warn};
use manager_e2e::auth::load_users;
use manager_e2e::config::{E2eConfig, E2eConfigOverrides, Verbosity};
use manager_e2e::logging::level_filter;
use manager_e2e::runtime::ChromiumDriver;
use manager_e2e::scenarios::{CheckOutcome, MediaKind, POST_TYPES, Suite, post_type};
use manager_e2e::session::{bootstrap_storage_state, restore_storage_state};

#[derive(Parser)]
#[command(
    name = "manager-e2e",
    author,
    version,
    about = "End-to-end flows for the manager console"
)]
struct Cli {
    /// Increase log verbosity (pass twice for DEBUG).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Show the browser window.
    #[arg(long, global = true)]
    headed: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Sign in by hand and save the session for later runs.
    AuthSetup,
    /// Check that the saved session still opens the manager.
    Login,
    /// Publish a simple communication.
    PublishSimple(PublishArgs),
    /// Walk the creation wizard of one communication type.
    Create(CreateArgs),
    /// Run the content-step validations.
    Validate,
}

#[derive(Args)]
struct PublishArgs {
    #[arg(long, value_enum, default_value_t = MediaKind::None)]
    media: MediaKind,
}

#[derive(Args)]
struct CreateArgs {
    /// Post type slug (`poll`, `quiz`, ...) or display name.
    #[arg(long)]
    kind: String,

    /// For polls, publish with partial results hidden.
    #[arg(long)]
    hide_partial_results: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _ = dotenvy::dotenv();
    let config = build_config(&cli)?;
    init_env_logger(config.verbose);

    match cli.command {
        Command::AuthSetup => auth_setup(config).await,
        command => run(command, config).await,
    }
}

fn build_config(cli: &Cli) -> Result<E2eConfig> {
    let base = E2eConfig::from_env().context("invalid MANAGER_* environment")?;
    let mut overrides = E2eConfigOverrides::default();
    if cli.headed {
        overrides = overrides.headless(false);
    }
    if cli.verbose > 0 {
        overrides = overrides.verbose(verbosity_from_count(cli.verbose));
    }
    Ok(base.with_overrides(overrides))
}

async fn auth_setup(config: E2eConfig) -> Result<()> {
    let config = config.with_overrides(E2eConfigOverrides::default().headless(false));
    let driver = ChromiumDriver::launch(&config)
        .await
        .context("failed to launch Chromium")?;

    let result = bootstrap_storage_state(&driver, &config).await;
    driver.close().await.ok();
    let state = result.context("failed to record the session")?;

    info!(
        "session saved to {} ({} cookies)",
        config.storage_state_path.display(),
        state.cookies.len()
    );
    Ok(())
}

async fn run(command: Command, config: E2eConfig) -> Result<()> {
    let users = load_users(&config.users_path)
        .await
        .with_context(|| format!("failed to load {}", config.users_path.display()))?;

    let driver = ChromiumDriver::launch(&config)
        .await
        .context("failed to launch Chromium")?;
    let restored = restore_storage_state(&driver, &config.storage_state_path).await;
    match restored {
        Ok(true) => info!("restored session from {}", config.storage_state_path.display()),
        Ok(false) => warn!(
            "no session at {}; run `manager-e2e auth-setup` first",
            config.storage_state_path.display()
        ),
        Err(err) => warn!("ignoring unreadable session: {err}"),
    }

    let suite = Suite::new(&driver, &config, &users);
    let result = run_command(&suite, command).await;
    driver.close().await.ok();
    result
}

async fn run_command(suite: &Suite<'_>, command: Command) -> Result<()> {
    match command {
        Command::AuthSetup => bail!("auth-setup records a new session and cannot reuse one"),
        Command::Login => {
            suite.verify_session().await?;
            info!("session is valid");
        }
        Command::PublishSimple(args) => {
            let title = suite.publish_simple_post(args.media).await?;
            info!("published '{title}'");
        }
        Command::Create(args) => {
            let post = post_type(&args.kind).ok_or_else(|| {
                let known: Vec<_> = POST_TYPES.iter().map(|post| post.slug).collect();
                anyhow!("unknown post type '{}'; expected one of {}", args.kind, known.join(", "))
            })?;
            if post.slug == "poll" {
                let title = suite.publish_poll(!args.hide_partial_results).await?;
                info!("published '{title}'");
            } else {
                let step = suite.run_initial_flow(post).await?;
                info!("{} reached the {step:?} step", post.name);
            }
        }
        Command::Validate => {
            report("body limit", suite.check_body_limit().await?);
            report(
                "title and body enable next",
                suite.check_title_and_body_enable_next().await?,
            );
        }
    }
    Ok(())
}

fn report(name: &str, outcome: CheckOutcome) {
    match outcome {
        CheckOutcome::Passed => info!("{name}: passed"),
        CheckOutcome::Skipped(reason) => warn!("{name}: skipped ({reason})"),
    }
}

fn verbosity_from_count(count: u8) -> Verbosity {
    match count {
        0 => Verbosity::Medium,
        _ => Verbosity::Detailed,
    }
}

/// `RUST_LOG` value used when neither the shell nor `.env` sets one.
fn default_log_filter(verbosity: Verbosity) -> String {
    level_filter(verbosity).to_string().to_ascii_lowercase()
}

fn init_env_logger(verbosity: Verbosity) {
    if env::var("RUST_LOG").is_err() {
        unsafe {
            env::set_var("RUST_LOG", default_log_filter(verbosity));
        }
    }

    let _ = env_logger::Builder::from_env(env_logger::Env::default())
        .format_timestamp_secs()
        .try_init();
}
