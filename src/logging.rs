//! Decision logging for the heuristics.
//!
//! Every heuristic reports what it decided (which candidate matched, which
//! wizard step was classified, which dismissal rule fired) through the
//! driver's [`E2eLogger`]. Records go to the `log` facade under the target
//! `manager_e2e::<category>`, so `RUST_LOG=manager_e2e::wizard=debug` narrows
//! output to one heuristic. A tap can observe the same records in-process.

use std::fmt;
use std::sync::Arc;

use log::{Level, LevelFilter};
use serde::Serialize;
use serde_json::Value;

use crate::config::Verbosity;

/// Category names used by the library modules.
pub mod category {
    pub const RESOLVER: &str = "resolver";
    pub const WIZARD: &str = "wizard";
    pub const DIALOG: &str = "dialog";
    pub const CONTENT: &str = "content";
    pub const AUTH: &str = "auth";
    pub const SESSION: &str = "session";
    pub const SCENARIO: &str = "scenario";
    pub const RUNTIME: &str = "runtime";
}

const TARGET_ROOT: &str = "manager_e2e";

/// One logged decision.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Decision {
    #[serde(serialize_with = "level_name")]
    pub level: Level,
    pub category: Option<String>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

fn level_name<S: serde::Serializer>(level: &Level, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(level.as_str())
}

impl Decision {
    pub fn target(&self) -> String {
        match &self.category {
            Some(category) => format!("{TARGET_ROOT}::{category}"),
            None => TARGET_ROOT.to_string(),
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)?;
        match &self.data {
            Some(data) if !data.is_null() => write!(f, " {data}"),
            _ => Ok(()),
        }
    }
}

/// Observer called with every decision that passes the verbosity filter.
pub type Tap = Arc<dyn Fn(&Decision) + Send + Sync + 'static>;

/// Most detailed level a verbosity lets through.
pub fn level_filter(verbose: Verbosity) -> LevelFilter {
    match verbose {
        Verbosity::Minimal => LevelFilter::Error,
        Verbosity::Medium => LevelFilter::Info,
        Verbosity::Detailed => LevelFilter::Debug,
    }
}

#[derive(Clone)]
pub struct E2eLogger {
    max_level: LevelFilter,
    tap: Option<Tap>,
}

impl fmt::Debug for E2eLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("E2eLogger")
            .field("max_level", &self.max_level)
            .field("tap", &self.tap.is_some())
            .finish()
    }
}

impl Default for E2eLogger {
    fn default() -> Self {
        Self::new(Verbosity::default())
    }
}

impl E2eLogger {
    pub fn new(verbose: Verbosity) -> Self {
        Self {
            max_level: level_filter(verbose),
            tap: None,
        }
    }

    pub fn with_tap(mut self, tap: Tap) -> Self {
        self.tap = Some(tap);
        self
    }

    pub fn enabled(&self, level: Level) -> bool {
        level <= self.max_level
    }

    fn emit(
        &self,
        level: Level,
        message: impl Into<String>,
        category: Option<&str>,
        data: Option<Value>,
    ) {
        if !self.enabled(level) {
            return;
        }
        let decision = Decision {
            level,
            category: category.map(str::to_string),
            message: message.into(),
            data,
        };
        let target = decision.target();
        log::log!(target: target.as_str(), level, "{decision}");
        if let Some(tap) = &self.tap {
            tap(&decision);
        }
    }

    pub fn error(&self, message: impl Into<String>, category: Option<&str>, data: Option<Value>) {
        self.emit(Level::Error, message, category, data);
    }

    pub fn info(&self, message: impl Into<String>, category: Option<&str>, data: Option<Value>) {
        self.emit(Level::Info, message, category, data);
    }

    pub fn debug(&self, message: impl Into<String>, category: Option<&str>, data: Option<Value>) {
        self.emit(Level::Debug, message, category, data);
    }
}
