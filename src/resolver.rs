//! Resilient locator resolution.
//!
//! Callers pass an ordered list of candidate queries; the first *visible* match
//! wins. Order is the only ranking: a later candidate never beats an earlier
//! one, even when it matches "better". Lookup failures (a node detached between
//! `count` and `is_visible`, a script error) are treated as "no match" so that
//! one flaky candidate cannot abort the chain.

use serde_json::json;

use crate::driver::{ClickOptions, DriverError, PageDriver};
use crate::locator::{CandidateQuery, Element};
use crate::logging::category;

/// First visible match of a single query, scanning matches in document order.
pub async fn find_first_visible(
    driver: &dyn PageDriver,
    query: &CandidateQuery,
) -> Option<Element> {
    let count = match driver.count(query).await {
        Ok(count) => count,
        Err(err) => {
            driver.logger().debug(
                format!("count failed for {query}"),
                Some(category::RESOLVER),
                Some(json!({ "error": err.to_string() })),
            );
            return None;
        }
    };

    for index in 0..count {
        let element = query.nth(index);
        match driver.is_visible(&element).await {
            Ok(true) => return Some(element),
            Ok(false) => {}
            Err(err) => {
                driver.logger().debug(
                    format!("visibility check failed for {element}"),
                    Some(category::RESOLVER),
                    Some(json!({ "error": err.to_string() })),
                );
            }
        }
    }
    None
}

/// First visible match across `candidates`, tried in declared order.
pub async fn first_visible(
    driver: &dyn PageDriver,
    candidates: &[CandidateQuery],
) -> Option<Element> {
    for (position, query) in candidates.iter().enumerate() {
        if let Some(element) = find_first_visible(driver, query).await {
            driver.logger().debug(
                format!("resolved {element}"),
                Some(category::RESOLVER),
                Some(json!({ "candidate": position, "of": candidates.len() })),
            );
            return Some(element);
        }
    }
    None
}

/// First match across `candidates` that exists in the DOM, visible or not.
pub async fn first_attached(
    driver: &dyn PageDriver,
    candidates: &[CandidateQuery],
) -> Option<Element> {
    for query in candidates {
        if matches!(driver.count(query).await, Ok(count) if count > 0) {
            return Some(query.first());
        }
    }
    None
}

/// Whether any candidate currently has at least one match.
pub async fn any_attached(driver: &dyn PageDriver, candidates: &[CandidateQuery]) -> bool {
    first_attached(driver, candidates).await.is_some()
}

/// Fill the first visible candidate. Errors raised by the fill itself
/// propagate; `Ok(false)` means nothing matched.
pub async fn try_fill(
    driver: &dyn PageDriver,
    candidates: &[CandidateQuery],
    value: &str,
) -> Result<bool, DriverError> {
    match first_visible(driver, candidates).await {
        Some(element) => {
            driver.fill(&element, value).await?;
            Ok(true)
        }
        None => Ok(false),
    }
}

/// Click the first visible candidate. Errors raised by the click propagate.
pub async fn try_click(
    driver: &dyn PageDriver,
    candidates: &[CandidateQuery],
) -> Result<bool, DriverError> {
    match first_visible(driver, candidates).await {
        Some(element) => {
            driver.click(&element, ClickOptions::default()).await?;
            Ok(true)
        }
        None => Ok(false),
    }
}

/// Check the first visible candidate, falling back to a click when it is not
/// checkable. A candidate whose check and click both fail is abandoned for
/// the next one. Never errors.
pub async fn try_check_or_click(driver: &dyn PageDriver, candidates: &[CandidateQuery]) -> bool {
    for query in candidates {
        let Some(element) = find_first_visible(driver, query).await else {
            continue;
        };

        match driver.check(&element).await {
            Ok(()) => return true,
            Err(check_err) => match driver.click(&element, ClickOptions::default()).await {
                Ok(()) => return true,
                Err(click_err) => {
                    driver.logger().debug(
                        format!("could not check or click {element}"),
                        Some(category::RESOLVER),
                        Some(json!({
                            "check": check_err.to_string(),
                            "click": click_err.to_string(),
                        })),
                    );
                }
            },
        }
    }
    false
}
