//! Generation Request
//!
//! The POST body sent to the pipeline endpoint when a run is started.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// Default locale used when the caller does not pick one.
pub const DEFAULT_LOCALE: &str = "en";

/// Request describing one plan generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// Free-form instruction from the user
    pub prompt: String,
    /// Target grade level (e.g. "5", "K", "9-10")
    pub grade: String,
    /// Subject area
    pub subject: String,
    /// Accessibility profile applied to the generated plan
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accessibility_profile: Option<String>,
    /// Output locale
    #[serde(default = "default_locale")]
    pub locale: String,
}

fn default_locale() -> String {
    DEFAULT_LOCALE.to_string()
}

impl GenerationRequest {
    /// Create a request with the default locale and no accessibility profile.
    pub fn new(
        prompt: impl Into<String>,
        grade: impl Into<String>,
        subject: impl Into<String>,
    ) -> Self {
        Self {
            prompt: prompt.into(),
            grade: grade.into(),
            subject: subject.into(),
            accessibility_profile: None,
            locale: default_locale(),
        }
    }

    /// Set the accessibility profile
    pub fn with_accessibility_profile(mut self, profile: impl Into<String>) -> Self {
        self.accessibility_profile = Some(profile.into());
        self
    }

    /// Set the locale
    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = locale.into();
        self
    }

    /// Reject requests the server would refuse anyway.
    pub fn validate(&self) -> CoreResult<()> {
        if self.prompt.trim().is_empty() {
            return Err(CoreError::validation("prompt is empty"));
        }
        if self.grade.trim().is_empty() {
            return Err(CoreError::validation("grade is empty"));
        }
        if self.subject.trim().is_empty() {
            return Err(CoreError::validation("subject is empty"));
        }
        if self.locale.trim().is_empty() {
            return Err(CoreError::validation("locale is empty"));
        }
        Ok(())
    }
}
