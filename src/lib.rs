//! Browser suite for the manager console.
//!
//! The heuristics ([`resolver`], [`wizard`], [`dialog`], [`content`],
//! [`auth`]) are written against the [`driver::PageDriver`] trait;
//! [`runtime::ChromiumDriver`] drives a real Chromium through CDP.

pub mod auth;
pub mod config;
pub mod content;
pub mod dialog;
pub mod driver;
pub mod error;
pub mod locator;
pub mod logging;
pub mod resolver;
pub mod runtime;
pub mod scenarios;
pub mod scripts;
pub mod session;
pub mod wait;
pub mod wizard;

#[cfg(test)]
mod testing;

pub use config::{E2eConfig, E2eConfigOverrides, LoginOptions, Verbosity};
pub use driver::{DriverError, PageDriver};
pub use error::E2eError;
pub use locator::{CandidateQuery, Element, TextPattern};
pub use runtime::ChromiumDriver;
pub use scenarios::Suite;
