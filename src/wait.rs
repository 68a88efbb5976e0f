//! Bounded polling waits.
//!
//! `wait_for_*` report success as a `bool` and swallow driver errors, since a
//! transient failure while polling is indistinguishable from "not yet".
//! `expect_*` are the assertion tier: they turn an unmet condition into
//! [`DriverError::Timeout`].

use std::future::Future;
use std::time::Duration;

use regex::Regex;
use tokio::time::{Instant, sleep};

use crate::driver::{DriverError, PageDriver};
use crate::locator::Element;

pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Default bound for assertions.
pub const EXPECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Poll `condition` until it yields `true`. `None` waits forever. The condition runs at
/// least once, even with a zero timeout.
pub async fn poll_until<F, Fut>(timeout: Option<Duration>, mut condition: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = timeout.map(|timeout| Instant::now() + timeout);
    loop {
        if condition().await {
            return true;
        }
        if let Some(deadline) = deadline {
            if Instant::now() >= deadline {
                return false;
            }
        }
        sleep(POLL_INTERVAL).await;
    }
}

pub async fn wait_for_visible(
    driver: &dyn PageDriver,
    element: &Element,
    timeout: Duration,
) -> bool {
    poll_until(Some(timeout), move || async move {
        driver.is_visible(element).await.unwrap_or(false)
    })
    .await
}

/// A missing element counts as hidden.
pub async fn wait_for_hidden(
    driver: &dyn PageDriver,
    element: &Element,
    timeout: Duration,
) -> bool {
    poll_until(Some(timeout), move || async move {
        match driver.is_visible(element).await {
            Ok(visible) => !visible,
            Err(DriverError::Detached(_)) => true,
            Err(_) => false,
        }
    })
    .await
}

pub async fn wait_for_detached(
    driver: &dyn PageDriver,
    element: &Element,
    timeout: Duration,
) -> bool {
    poll_until(Some(timeout), move || async move {
        match driver.count(element.query()).await {
            Ok(count) => count <= element.index,
            Err(_) => false,
        }
    })
    .await
}

pub async fn wait_for_enabled(
    driver: &dyn PageDriver,
    element: &Element,
    timeout: Duration,
) -> bool {
    poll_until(Some(timeout), move || async move {
        let visible = driver.is_visible(element).await.unwrap_or(false);
        visible && driver.is_enabled(element).await.unwrap_or(false)
    })
    .await
}

pub async fn wait_for_url(
    driver: &dyn PageDriver,
    pattern: &Regex,
    timeout: Option<Duration>,
) -> bool {
    poll_until(timeout, move || async move {
        driver
            .current_url()
            .await
            .map(|url| pattern.is_match(&url))
            .unwrap_or(false)
    })
    .await
}

pub async fn expect_visible(
    driver: &dyn PageDriver,
    element: &Element,
    timeout: Duration,
) -> Result<(), DriverError> {
    if wait_for_visible(driver, element, timeout).await {
        Ok(())
    } else {
        Err(DriverError::timeout(format!("{element} to be visible"), timeout))
    }
}

pub async fn expect_enabled(
    driver: &dyn PageDriver,
    element: &Element,
    timeout: Duration,
) -> Result<(), DriverError> {
    if wait_for_enabled(driver, element, timeout).await {
        Ok(())
    } else {
        Err(DriverError::timeout(format!("{element} to be enabled"), timeout))
    }
}

pub async fn expect_url(
    driver: &dyn PageDriver,
    pattern: &Regex,
    timeout: Duration,
) -> Result<(), DriverError> {
    if wait_for_url(driver, pattern, Some(timeout)).await {
        Ok(())
    } else {
        let current = driver.current_url().await.unwrap_or_default();
        Err(DriverError::timeout(
            format!("URL matching {pattern} (currently {current})"),
            timeout,
        ))
    }
}
