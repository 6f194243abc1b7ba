use std::fmt::{self, Display};

/// Errors produced while validating inbound payloads and model values.
#[derive(Debug)]
pub enum ModelError {
    Json(serde_json::Error),
    MissingProperty(&'static str),
    InvalidProperty {
        key: String,
        value: String,
        reason: String,
    },
    UnknownFunction(String),
    UnrecognizedEvent(String),
}

impl ModelError {
    pub fn invalid_property(
        key: impl Into<String>,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        ModelError::InvalidProperty {
            key: key.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }
}

impl Display for ModelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelError::Json(err) => write!(f, "malformed payload: {err}"),
            ModelError::MissingProperty(key) => {
                write!(f, "missing required property {key}")
            }
            ModelError::InvalidProperty { key, value, reason } => {
                write!(f, "invalid value '{value}' for {key}: {reason}")
            }
            ModelError::UnknownFunction(name) => {
                write!(f, "unknown Function property '{name}'")
            }
            ModelError::UnrecognizedEvent(msg) => {
                write!(f, "unrecognized event: {msg}")
            }
        }
    }
}

impl std::error::Error for ModelError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ModelError::Json(err) => Some(err),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for ModelError {
    fn from(err: serde_json::Error) -> Self {
        ModelError::Json(err)
    }
}

pub type Result<T> = std::result::Result<T, ModelError>;
