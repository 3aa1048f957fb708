use std::time::Duration;

use crate::errors::PlaylabError;
use crate::presenter::DisplayMode;

/// Default Playlab API root.
pub const DEFAULT_BASE_URL: &str = "https://www.playlab.ai/api/v1";

const API_KEY_ENV: &str = "PLAYLAB_API_KEY";
const PROJECT_ID_ENV: &str = "PLAYLAB_PROJECT_ID";
const BASE_URL_ENV: &str = "PLAYLAB_BASE_URL";

/// Configuration for a [`PlaylabClient`](crate::PlaylabClient).
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// API key sent as a bearer token.
    pub api_key: String,
    /// Project (app) that owns the conversations.
    pub project_id: String,
    /// API root, without a trailing slash.
    ///
    /// Useful for proxies or local test servers.
    pub base_url: String,
    /// Optional whole-request timeout. `None` lets streams run as long as the
    /// server keeps them open.
    pub timeout: Option<Duration>,
    /// Echo the exchange through the presenter.
    pub verbose: bool,
    /// How assistant text is rendered.
    pub display: DisplayMode,
}

impl ClientConfig {
    /// Creates a config with defaults for everything but the credentials.
    pub fn new(api_key: impl Into<String>, project_id: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            project_id: project_id.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: None,
            verbose: true,
            display: DisplayMode::Auto,
        }
    }

    /// Builds a config from `PLAYLAB_API_KEY`, `PLAYLAB_PROJECT_ID` and the
    /// optional `PLAYLAB_BASE_URL`.
    pub fn from_env() -> Result<Self, PlaylabError> {
        Self::resolve(None, None)
    }

    /// Uses the explicit values when given and falls back to the environment.
    pub fn resolve(
        api_key: Option<String>,
        project_id: Option<String>,
    ) -> Result<Self, PlaylabError> {
        let api_key = non_blank(api_key).or_else(|| env_value(API_KEY_ENV));
        let project_id = non_blank(project_id).or_else(|| env_value(PROJECT_ID_ENV));
        let mut config = Self::new(
            api_key.unwrap_or_default(),
            project_id.unwrap_or_default(),
        );
        if let Some(base_url) = env_value(BASE_URL_ENV) {
            config.base_url = base_url;
        }
        config.validate()?;
        Ok(config)
    }

    /// Overrides the API base URL.
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Sets or clears the request timeout.
    pub fn timeout(mut self, timeout: impl Into<Option<Duration>>) -> Self {
        self.timeout = timeout.into();
        self
    }

    /// Enables or disables echoing through the presenter.
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Selects the display mode.
    pub fn display(mut self, display: DisplayMode) -> Self {
        self.display = display;
        self
    }

    /// Checks that both credentials are present.
    pub fn validate(&self) -> Result<(), PlaylabError> {
        if self.api_key.trim().is_empty() {
            return Err(PlaylabError::Authentication(format!(
                "API key must be provided either as an argument or through the {API_KEY_ENV} environment variable"
            )));
        }
        if self.project_id.trim().is_empty() {
            return Err(PlaylabError::Validation(format!(
                "project ID must be provided either as an argument or through the {PROJECT_ID_ENV} environment variable"
            )));
        }
        Ok(())
    }

    pub(crate) fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn env_value(key: &str) -> Option<String> {
    non_blank(std::env::var(key).ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_values_win_and_defaults_apply() {
        let config = ClientConfig::resolve(Some("key".into()), Some("proj".into()))
            .expect("explicit config");
        assert_eq!(config.api_key, "key");
        assert_eq!(config.project_id, "proj");
        assert!(config.verbose);
        assert!(config.timeout.is_none());
        assert_eq!(config.display, DisplayMode::Auto);
    }

    #[test]
    fn blank_api_key_is_authentication_error() {
        let err = ClientConfig::new("  ", "proj").validate().expect_err("blank key");
        assert!(matches!(err, PlaylabError::Authentication(msg) if msg.contains(API_KEY_ENV)));
    }

    #[test]
    fn blank_project_is_validation_error() {
        let err = ClientConfig::new("key", "").validate().expect_err("blank project");
        assert!(matches!(err, PlaylabError::Validation(msg) if msg.contains(PROJECT_ID_ENV)));
    }

    #[test]
    fn url_joins_without_double_slashes() {
        let config = ClientConfig::new("k", "p").base_url("http://localhost:9999/api/v1/");
        assert_eq!(
            config.url("/projects/p/conversations"),
            "http://localhost:9999/api/v1/projects/p/conversations"
        );
    }

    #[test]
    fn setters_override_fields() {
        let config = ClientConfig::new("k", "p")
            .timeout(Duration::from_secs(5))
            .verbose(false)
            .display(DisplayMode::Plain);
        assert_eq!(config.timeout, Some(Duration::from_secs(5)));
        assert!(!config.verbose);
        assert_eq!(config.display, DisplayMode::Plain);
    }
}
