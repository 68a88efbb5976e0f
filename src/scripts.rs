//! Page-side query engine embedding.
//!
//! The engine lives in `scripts/locator.js` so editors treat it as JavaScript;
//! it is bundled as a string at compile time and installs
//! `window.__managerE2e` once per document.

use serde::Serialize;
use serde_json::Value;

use crate::driver::DriverError;

pub const LOCATOR_SCRIPT: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/scripts/locator.js"
));

/// Attribute `tag` puts on an element so CDP can address it by selector.
pub const TAG_ATTRIBUTE: &str = "data-manager-e2e";

/// Build an expression that installs the engine if needed and calls `method`
/// with JSON-encoded `args`.
pub fn invocation(method: &str, args: &[Value]) -> String {
    let args = args
        .iter()
        .map(Value::to_string)
        .collect::<Vec<_>>()
        .join(", ");
    format!("(() => {{\n{LOCATOR_SCRIPT}\nreturn window.__managerE2e.{method}({args});\n}})()")
}

/// Serialize a query or element argument for [`invocation`].
pub fn arg<T: Serialize>(value: &T) -> Result<Value, DriverError> {
    Ok(serde_json::to_value(value)?)
}

pub fn tag_selector(token: &str) -> String {
    format!("[{TAG_ATTRIBUTE}=\"{token}\"]")
}

/// Script that seeds local storage for `origin` before the page's own scripts
/// run.
pub fn local_storage_seed(
    origin: &str,
    entries: &[(String, String)],
) -> Result<String, DriverError> {
    let origin = serde_json::to_string(origin)?;
    let entries = serde_json::to_string(entries)?;
    Ok(format!(
        "(() => {{ if (window.location.origin !== {origin}) return; \
         for (const [name, value] of {entries}) {{ window.localStorage.setItem(name, value); }} }})()"
    ))
}
