//! Error types.
//!
//! Two layers:
//!
//! - [`ServiceError`]: the typed taxonomy the resolution/prediction core surfaces
//!   once every fallback has been exhausted. Each variant knows its HTTP-style
//!   status class and can render the structured error envelope.
//! - [`AppError`]: the binary boundary (message + process exit code).

use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Clone)]
pub struct AppError {
    exit_code: u8,
    message: String,
}

impl AppError {
    pub fn new(exit_code: u8, message: impl Into<String>) -> Self {
        Self {
            exit_code,
            message: message.into(),
        }
    }

    pub fn exit_code(&self) -> u8 {
        self.exit_code
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppError")
            .field("exit_code", &self.exit_code)
            .field("message", &self.message)
            .finish()
    }
}

impl std::error::Error for AppError {}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        let exit_code = match &err {
            ServiceError::Configuration { .. } => 2,
            ServiceError::DataNotFound { .. } | ServiceError::DataValidation { .. } => 3,
            ServiceError::ModelNotFound { .. } | ServiceError::Prediction { .. } => 4,
        };
        AppError::new(exit_code, err.to_string())
    }
}

/// One structured entry of an error's detail list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorDetail {
    pub msg: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub loc: Option<Vec<String>>,
}

impl ErrorDetail {
    pub fn new(msg: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            msg: msg.into(),
            kind: kind.into(),
            loc: None,
        }
    }

    pub fn at(mut self, loc: &[&str]) -> Self {
        self.loc = Some(loc.iter().map(|s| s.to_string()).collect());
        self
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum ServiceError {
    #[error("{message}")]
    DataNotFound {
        message: String,
        details: Vec<ErrorDetail>,
    },

    #[error("{message}")]
    DataValidation {
        message: String,
        details: Vec<ErrorDetail>,
    },

    #[error("{message}")]
    ModelNotFound {
        message: String,
        details: Vec<ErrorDetail>,
    },

    #[error("{message}")]
    Prediction {
        message: String,
        details: Vec<ErrorDetail>,
    },

    #[error("{message}")]
    Configuration {
        message: String,
        details: Vec<ErrorDetail>,
    },
}

impl ServiceError {
    pub fn data_not_found(message: impl Into<String>, details: Vec<ErrorDetail>) -> Self {
        ServiceError::DataNotFound {
            message: message.into(),
            details,
        }
    }

    pub fn data_validation(message: impl Into<String>, details: Vec<ErrorDetail>) -> Self {
        ServiceError::DataValidation {
            message: message.into(),
            details,
        }
    }

    pub fn model_not_found(message: impl Into<String>, details: Vec<ErrorDetail>) -> Self {
        ServiceError::ModelNotFound {
            message: message.into(),
            details,
        }
    }

    pub fn prediction(message: impl Into<String>, details: Vec<ErrorDetail>) -> Self {
        ServiceError::Prediction {
            message: message.into(),
            details,
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        ServiceError::Configuration {
            message: message.into(),
            details: Vec::new(),
        }
    }

    pub fn status_code(&self) -> u16 {
        match self {
            ServiceError::DataNotFound { .. } | ServiceError::ModelNotFound { .. } => 404,
            ServiceError::DataValidation { .. } => 422,
            ServiceError::Prediction { .. } | ServiceError::Configuration { .. } => 500,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ServiceError::DataNotFound { .. } => "DATA_NOT_FOUND",
            ServiceError::DataValidation { .. } => "DATA_VALIDATION_ERROR",
            ServiceError::ModelNotFound { .. } => "MODEL_NOT_FOUND",
            ServiceError::Prediction { .. } => "PREDICTION_ERROR",
            ServiceError::Configuration { .. } => "CONFIGURATION_ERROR",
        }
    }

    pub fn message(&self) -> &str {
        match self {
            ServiceError::DataNotFound { message, .. }
            | ServiceError::DataValidation { message, .. }
            | ServiceError::ModelNotFound { message, .. }
            | ServiceError::Prediction { message, .. }
            | ServiceError::Configuration { message, .. } => message,
        }
    }

    pub fn details(&self) -> &[ErrorDetail] {
        match self {
            ServiceError::DataNotFound { details, .. }
            | ServiceError::DataValidation { details, .. }
            | ServiceError::ModelNotFound { details, .. }
            | ServiceError::Prediction { details, .. }
            | ServiceError::Configuration { details, .. } => details,
        }
    }

    /// Build the structured error payload returned to callers.
    pub fn to_envelope(&self, path: impl Into<String>) -> ErrorEnvelope {
        ErrorEnvelope {
            status: "error",
            code: self.status_code(),
            error_code: self.code(),
            message: self.message().to_string(),
            details: self.details().to_vec(),
            timestamp: Utc::now(),
            path: path.into(),
        }
    }
}

/// Structured error payload (`status`, numeric code, message, details, timestamp, path).
#[derive(Debug, Clone, Serialize)]
pub struct ErrorEnvelope {
    pub status: &'static str,
    pub code: u16,
    pub error_code: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<ErrorDetail>,
    pub timestamp: DateTime<Utc>,
    pub path: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classes_follow_taxonomy() {
        assert_eq!(ServiceError::data_not_found("x", vec![]).status_code(), 404);
        assert_eq!(ServiceError::data_validation("x", vec![]).status_code(), 422);
        assert_eq!(ServiceError::model_not_found("x", vec![]).status_code(), 404);
        assert_eq!(ServiceError::prediction("x", vec![]).status_code(), 500);
        assert_eq!(ServiceError::configuration("x").status_code(), 500);
    }

    #[test]
    fn envelope_carries_details_and_path() {
        let err = ServiceError::model_not_found(
            "No xgboost model or alternative for Testland.",
            vec![ErrorDetail::new("country: Testland, kind: xgboost", "model_not_found")],
        );
        let env = err.to_envelope("/predict/Testland");
        assert_eq!(env.status, "error");
        assert_eq!(env.code, 404);
        assert_eq!(env.error_code, "MODEL_NOT_FOUND");
        assert_eq!(env.details.len(), 1);
        assert_eq!(env.path, "/predict/Testland");

        let json = serde_json::to_value(&env).unwrap();
        assert_eq!(json["details"][0]["type"], "model_not_found");
    }

    #[test]
    fn app_error_exit_codes() {
        let app: AppError = ServiceError::configuration("bad").into();
        assert_eq!(app.exit_code(), 2);
        let app: AppError = ServiceError::data_not_found("none", vec![]).into();
        assert_eq!(app.exit_code(), 3);
        let app: AppError = ServiceError::prediction("boom", vec![]).into();
        assert_eq!(app.exit_code(), 4);
    }
}
