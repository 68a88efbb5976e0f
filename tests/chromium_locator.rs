use std::env;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, ensure};
use manager_e2e::config::E2eConfigOverrides;
use manager_e2e::dialog::dismiss_crop_dialog_if_present;
use manager_e2e::locator::{CandidateQuery, contains, exact, re};
use manager_e2e::resolver::{first_visible, try_check_or_click, try_fill};
use manager_e2e::wizard::{
    WizardOptions, WizardStep, advance_to_content, channel_markers, current_step,
};
use manager_e2e::{ChromiumDriver, E2eConfig, PageDriver};
use serial_test::serial;

const NAVIGATION: Duration = Duration::from_secs(15);

fn chrome_bin() -> Option<PathBuf> {
    let path = match env::var("MANAGER_CHROME_BIN") {
        Ok(value) if !value.trim().is_empty() => PathBuf::from(value),
        _ => {
            eprintln!("skipping chromium integration test: MANAGER_CHROME_BIN not set");
            return None;
        }
    };
    if !path.exists() {
        eprintln!(
            "skipping chromium integration test: chrome executable not found at {}",
            path.display()
        );
        return None;
    }
    Some(path)
}

fn fixture_url(name: &str) -> String {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name);
    format!("file://{}", path.display())
}

async fn open(name: &str) -> Result<Option<ChromiumDriver>> {
    let _ = env_logger::builder().is_test(true).try_init();

    let Some(chrome) = chrome_bin() else {
        return Ok(None);
    };
    let config = E2eConfig::default().with_overrides(
        E2eConfigOverrides::default()
            .headless(true)
            .chrome_executable(chrome),
    );
    let driver = ChromiumDriver::launch(&config)
        .await
        .context("failed to launch chromium")?;
    driver
        .goto(&fixture_url(name), NAVIGATION)
        .await
        .with_context(|| format!("failed to open fixture {name}"))?;
    Ok(Some(driver))
}

#[tokio::test]
#[serial]
async fn declared_order_wins_and_maxlength_truncates_fill() -> Result<()> {
    let Some(driver) = open("resolver.html").await? else {
        return Ok(());
    };

    let candidates = [
        CandidateQuery::label(exact("Título oculto")),
        CandidateQuery::placeholder(contains("Digite")),
        CandidateQuery::label(exact("Título")),
    ];
    let resolved = first_visible(&driver, &candidates)
        .await
        .context("no candidate resolved")?;
    ensure!(
        resolved == CandidateQuery::placeholder(contains("Digite")).first(),
        "resolved {resolved}"
    );

    ensure!(try_fill(&driver, &candidates, "Teste automatizado_Froes").await?);
    let value = driver.input_value(&resolved).await?;
    ensure!(value == "Teste automa", "unexpected value {value:?}");

    driver.close().await?;
    Ok(())
}

#[tokio::test]
#[serial]
async fn aria_and_native_checkboxes_get_checked() -> Result<()> {
    let Some(driver) = open("resolver.html").await? else {
        return Ok(());
    };

    let app = CandidateQuery::role("checkbox", re("aplicativo"));
    let tv = CandidateQuery::role("checkbox", re(r"\btv\b"));
    ensure!(try_check_or_click(&driver, &[app.clone()]).await);
    ensure!(try_check_or_click(&driver, &[tv.clone()]).await);

    ensure!(driver.is_checked(&app.first()).await?);
    ensure!(driver.is_checked(&tv.first()).await?);

    let duration = CandidateQuery::role("combobox", re("dura[cç][aã]o")).first();
    driver.select_option(&duration, "5 dias").await?;
    ensure!(driver.input_value(&duration).await? == "5 dias");

    driver.close().await?;
    Ok(())
}

#[tokio::test]
#[serial]
async fn cancel_only_crop_dialog_is_closed() -> Result<()> {
    let Some(driver) = open("dialog.html").await? else {
        return Ok(());
    };

    ensure!(dismiss_crop_dialog_if_present(&driver, Duration::from_secs(2)).await?);
    ensure!(driver.count(&CandidateQuery::role_any("dialog")).await? == 0);
    let status = CandidateQuery::text(exact("fechado"));
    ensure!(driver.count(&status).await? == 1);

    ensure!(!dismiss_crop_dialog_if_present(&driver, Duration::from_millis(300)).await?);

    driver.close().await?;
    Ok(())
}

#[tokio::test]
#[serial]
async fn wizard_walks_channels_category_and_segmentation() -> Result<()> {
    let Some(driver) = open("wizard.html").await? else {
        return Ok(());
    };

    let options = WizardOptions::new(false).with_timeout(Duration::from_secs(30));
    ensure!(advance_to_content(&driver, &options).await?, "content step not reached");

    let title = CandidateQuery::label(exact("Título")).first();
    ensure!(driver.is_visible(&title).await?);

    driver.close().await?;
    Ok(())
}

#[tokio::test]
#[serial]
async fn role_queries_skip_nodes_outside_the_accessibility_tree() -> Result<()> {
    let Some(driver) = open("hidden_roles.html").await? else {
        return Ok(());
    };

    for (role, name) in [
        ("heading", "canais"),
        ("heading", "editorias"),
        ("heading", "segmenta[cç][aã]o"),
        ("button", "salvar"),
    ] {
        let count = driver.count(&CandidateQuery::role(role, re(name))).await?;
        ensure!(count == 0, "{role} /{name}/ matched {count} hidden nodes");
    }

    ensure!(driver.count(&CandidateQuery::role_any("heading")).await? == 1);
    ensure!(driver.count(&CandidateQuery::role_any("button")).await? == 1);
    ensure!(driver.count(&CandidateQuery::role_any("option")).await? == 2);
    ensure!(driver.count(&CandidateQuery::text(re("^canais$"))).await? == 1);

    driver.close().await?;
    Ok(())
}

#[tokio::test]
#[serial]
async fn finished_steps_left_hidden_do_not_reclassify_the_wizard() -> Result<()> {
    let Some(driver) = open("wizard_stale.html").await? else {
        return Ok(());
    };

    let options = WizardOptions::new(false).with_timeout(Duration::from_secs(30));
    ensure!(current_step(&driver, &options).await == WizardStep::Channels);
    ensure!(advance_to_content(&driver, &options).await?, "content step not reached");

    ensure!(driver.count(&channel_markers()[0]).await? == 0);
    let title = CandidateQuery::label(exact("Título")).first();
    ensure!(driver.is_visible(&title).await?);

    driver.close().await?;
    Ok(())
}

#[tokio::test]
#[serial]
async fn checking_through_a_label_keeps_a_checked_box_checked() -> Result<()> {
    let Some(driver) = open("resolver.html").await? else {
        return Ok(());
    };

    let tv = CandidateQuery::role("checkbox", re(r"\btv\b"));
    ensure!(try_check_or_click(&driver, &[tv.clone()]).await);
    ensure!(driver.is_checked(&tv.first()).await?);

    let label = CandidateQuery::text(exact("TV"));
    ensure!(driver.is_checked(&label.first()).await?);
    ensure!(try_check_or_click(&driver, &[label]).await);
    ensure!(driver.is_checked(&tv.first()).await?, "label click unchecked the box");

    driver.close().await?;
    Ok(())
}
