use thiserror::Error;

pub type RosterResult<T> = Result<T, RosterError>;

#[derive(Debug, Error)]
pub enum RosterError {
    /// The session is missing, invalid or expired, or the server refused
    /// an account operation.
    #[error("{message}")]
    Auth { message: String },

    /// A collaborator call failed (network, HTTP status, bad payload).
    #[error("{operation} failed: {message}")]
    Fetch {
        operation: &'static str,
        message: String,
    },

    /// User input was rejected before any request was made.
    #[error("invalid {field}: {message}")]
    Validation {
        field: &'static str,
        message: String,
    },

    /// The roster write lane is held by a running bulk refresh.
    #[error("a refresh is already running for this roster")]
    Busy,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl RosterError {
    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth {
            message: message.into(),
        }
    }

    pub fn fetch(operation: &'static str, message: impl Into<String>) -> Self {
        Self::Fetch {
            operation,
            message: message.into(),
        }
    }

    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            field,
            message: message.into(),
        }
    }

    pub fn not_logged_in() -> Self {
        Self::auth("not logged in; run `cohort-roster login` first")
    }

    /// Whether this error should invalidate the current session.
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Auth { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetch_error_names_the_operation() {
        let err = RosterError::fetch("refresh student", "profile not found");
        assert_eq!(err.to_string(), "refresh student failed: profile not found");
        assert!(!err.is_auth());
    }

    #[test]
    fn auth_error_is_flagged() {
        assert!(RosterError::auth("Invalid or expired token").is_auth());
        assert!(RosterError::not_logged_in().is_auth());
        assert!(!RosterError::Busy.is_auth());
    }

    #[test]
    fn validation_error_mentions_field() {
        let err = RosterError::validation("category", "must not be empty");
        assert!(err.to_string().contains("category"));
    }
}
