//! Error types for triage-core

use thiserror::Error;

/// Errors raised while loading or validating a team directory.
///
/// Classification, aggregation and SLO evaluation never fail; only turning
/// raw configuration into an [`crate::OrgDirectory`] can.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A required field was absent or empty
    #[error("missing required field `{field}` in {context}")]
    MissingField { field: String, context: String },

    /// Two teams share the same name
    #[error("duplicate team name: {0}")]
    DuplicateTeam(String),

    /// No release carries an `x.y.0` target
    #[error("no release found that has a x.y.0 target version: {0:?}")]
    NoActiveRelease(Vec<String>),

    /// A field is present but unusable
    #[error("invalid value for `{field}`: {reason}")]
    InvalidValue { field: String, reason: String },

    /// YAML parsing error
    #[error("YAML parsing failed: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON parsing error
    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConfigError {
    pub(crate) fn missing(field: &str, context: impl Into<String>) -> Self {
        ConfigError::MissingField {
            field: field.to_string(),
            context: context.into(),
        }
    }
}
