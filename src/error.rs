//! Crate-wide error type.

use thiserror::Error;

use crate::auth::LoginError;
use crate::config::ConfigError;
use crate::content::ContentError;
use crate::dialog::DialogError;
use crate::driver::DriverError;
use crate::scenarios::ScenarioError;
use crate::session::SessionError;
use crate::wizard::WizardError;

#[derive(Debug, Error)]
pub enum E2eError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Driver(#[from] DriverError),
    #[error(transparent)]
    Wizard(#[from] WizardError),
    #[error(transparent)]
    Dialog(#[from] DialogError),
    #[error(transparent)]
    Content(#[from] ContentError),
    #[error(transparent)]
    Login(#[from] LoginError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Scenario(#[from] ScenarioError),
}

impl E2eError {
    /// Whether the operator has to record a new session before retrying.
    pub fn needs_auth_setup(&self) -> bool {
        matches!(
            self,
            E2eError::Login(
                LoginError::SessionRequired | LoginError::MfaRequired | LoginError::MfaIncomplete
            ) | E2eError::Scenario(
                ScenarioError::SessionExpired { .. }
                    | ScenarioError::Login(
                        LoginError::SessionRequired
                            | LoginError::MfaRequired
                            | LoginError::MfaIncomplete
                    )
            )
        )
    }
}

pub type Result<T, E = E2eError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn session_problems_point_to_auth_setup() {
        let expired: E2eError = ScenarioError::SessionExpired {
            url: "https://host/manager/communications/new/quiz".to_string(),
        }
        .into();
        assert!(expired.needs_auth_setup());
        assert!(E2eError::from(LoginError::SessionRequired).needs_auth_setup());

        let timeout: E2eError =
            DriverError::timeout("next button", Duration::from_secs(5)).into();
        assert!(!timeout.needs_auth_setup());
    }
}
